//! Project layout checks: descriptor, recommended directories, sources.

use super::rules;
use crate::config::BuilderConfig;
use crate::error::PhaseError;
use crate::models::ValidationReport;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Extensions counted as extension source files.
pub const SOURCE_EXTENSIONS: &[&str] = &["java", "kt"];

/// Annotation that marks a class as a designer component.
pub const DESIGNER_COMPONENT_MARKER: &str = "@DesignerComponent";

/// Every file under `root` whose extension is in `extensions`, sorted.
///
/// A missing root yields an empty list. Symlinked directories are not followed.
pub fn source_files(root: &Path, extensions: &[&str]) -> io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    if !root.is_dir() {
        return Ok(found);
    }

    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            let path = entry.path();
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() {
                let matches = path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| extensions.contains(&ext))
                    .unwrap_or(false);
                if matches {
                    found.push(path);
                }
            }
        }
    }
    found.sort();
    Ok(found)
}

/// Structure phase.
pub fn check_structure(
    project: &Path,
    config: &BuilderConfig,
) -> Result<ValidationReport, PhaseError> {
    let mut report = ValidationReport::new();

    let descriptor = config.descriptor_path(project);
    if descriptor.is_file() {
        let text = fs::read_to_string(&descriptor)?;
        report.merge(rules::check_descriptor(&config.descriptor_file, &text));
    } else {
        report.error(format!("Missing build descriptor: {}", config.descriptor_file));
    }

    for dir in [&config.source_dir, &config.assets_dir, &config.lib_dir] {
        if !project.join(dir).is_dir() {
            report.warning(format!("Recommended directory missing: {}", dir));
        }
    }

    let sources = source_files(&config.source_path(project), SOURCE_EXTENSIONS)?;
    if sources.is_empty() {
        report.warning(format!(
            "No Java or Kotlin source files found in {}",
            config.source_dir
        ));
    } else {
        log::debug!("[Validate] [STRUCTURE] {} source file(s)", sources.len());
        let mut has_component = false;
        for source in &sources {
            // Unreadable (e.g. non UTF-8) files simply don't count as components.
            if let Ok(text) = fs::read_to_string(source) {
                if text.contains(DESIGNER_COMPONENT_MARKER) {
                    has_component = true;
                    break;
                }
            }
        }
        if !has_component {
            report.warning(format!(
                "No source file declares a {} annotation",
                DESIGNER_COMPONENT_MARKER
            ));
        }
    }

    Ok(report)
}

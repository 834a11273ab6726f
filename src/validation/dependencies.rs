//! Library directory checks and dependency scanning.

use crate::config::BuilderConfig;
use crate::error::PhaseError;
use crate::models::{format_size, DependencyDescriptor, ValidationReport};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::io;
use std::path::Path;

/// `gson-2.8.9.jar`, `kotlin-stdlib-1.9.0.jar`, `guava-31.1-jre.jar`
static VERSIONED_JAR_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(.+?)-(\d+(?:\.\d+)*(?:[-.][A-Za-z0-9]+)*)\.jar$").expect("valid jar pattern")
});

/// Split a jar file name into library name and optional version.
pub fn parse_jar_name(file_name: &str) -> (String, Option<String>) {
    if let Some(caps) = VERSIONED_JAR_REGEX.captures(file_name) {
        return (caps[1].to_string(), Some(caps[2].to_string()));
    }
    let name = file_name.strip_suffix(".jar").unwrap_or(file_name);
    (name.to_string(), None)
}

/// Every `.jar` in `lib_dir`, sorted by file name.
pub fn scan_dependencies(lib_dir: &Path) -> io::Result<Vec<DependencyDescriptor>> {
    let mut found = Vec::new();
    for entry in fs::read_dir(lib_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy().into_owned();
        if !file_name.ends_with(".jar") {
            continue;
        }
        let (name, version) = parse_jar_name(&file_name);
        found.push(DependencyDescriptor {
            name,
            version,
            size: entry.metadata()?.len(),
            file_name,
        });
    }
    found.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    Ok(found)
}

/// Dependency phase.
pub fn check_dependencies(
    project: &Path,
    config: &BuilderConfig,
) -> Result<ValidationReport, PhaseError> {
    let mut report = ValidationReport::new();
    let lib_dir = config.lib_path(project);
    if !lib_dir.is_dir() {
        report.error(format!("Library directory missing: {}", config.lib_dir));
        return Ok(report);
    }

    let libraries = scan_dependencies(&lib_dir)?;
    let present = |name: &str| libraries.iter().any(|lib| lib.file_name == name);

    for required in &config.mandatory_libraries {
        if !present(required.as_str()) {
            report.error(format!("Missing required library: {}", required));
        }
    }
    for recommended in &config.recommended_libraries {
        if !present(recommended.as_str()) {
            report.warning(format!("Recommended library missing: {}", recommended));
        }
    }

    for lib in &libraries {
        if lib.size == 0 {
            report.error(format!("Library file is empty: {}", lib.file_name));
        } else if lib.size > config.max_library_size_bytes {
            report.warning(format!(
                "Library file is unusually large: {} ({})",
                lib.file_name,
                format_size(lib.size)
            ));
        }
    }

    log::debug!("[Validate] [DEPS] {} jar(s) in {}", libraries.len(), lib_dir.display());
    Ok(report)
}

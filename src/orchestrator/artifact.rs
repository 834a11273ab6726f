//! Locating the packaged extension in the distribution directory.

use crate::config::ArtifactPolicy;
use crate::models::{format_size, ExtensionArtifact};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};

/// Every regular file in `dist_dir` ending with `suffix`, sorted by file name.
///
/// A missing directory yields no candidates.
pub fn list_candidates(dist_dir: &Path, suffix: &str) -> std::io::Result<Vec<PathBuf>> {
    if !dist_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut candidates = Vec::new();
    for entry in fs::read_dir(dist_dir)? {
        let entry = entry?;
        let path = entry.path();
        let matches = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.ends_with(suffix) && name.len() > suffix.len())
            .unwrap_or(false);
        if matches && entry.file_type()?.is_file() {
            candidates.push(path);
        }
    }
    candidates.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(candidates)
}

/// Pick the build artifact according to `policy`.
///
/// `Ok(None)` means no candidate exists. With `ArtifactPolicy::Unique`, more
/// than one candidate is an error naming all of them.
pub fn discover_artifact(
    dist_dir: &Path,
    suffix: &str,
    policy: ArtifactPolicy,
) -> Result<Option<ExtensionArtifact>, String> {
    let candidates = list_candidates(dist_dir, suffix)
        .map_err(|e| format!("Failed to scan {}: {}", dist_dir.display(), e))?;

    let chosen = match (policy, candidates.len()) {
        (_, 0) => return Ok(None),
        (_, 1) => candidates[0].clone(),
        (ArtifactPolicy::Unique, _) => {
            let names: Vec<String> = candidates
                .iter()
                .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
                .collect();
            return Err(format!(
                "Ambiguous artifact: {} candidates in {}: {}",
                candidates.len(),
                dist_dir.display(),
                names.join(", ")
            ));
        }
        (ArtifactPolicy::Alphabetical, _) => candidates[0].clone(),
        (ArtifactPolicy::NewestModified, _) => newest(&candidates)?,
    };

    describe(&chosen).map(Some)
}

/// Latest modification time wins; the earliest name wins a tie.
fn newest(candidates: &[PathBuf]) -> Result<PathBuf, String> {
    let mut best: Option<(std::time::SystemTime, &PathBuf)> = None;
    for path in candidates {
        let modified = fs::metadata(path)
            .and_then(|m| m.modified())
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        match best {
            Some((time, _)) if modified <= time => {}
            _ => best = Some((modified, path)),
        }
    }
    best.map(|(_, path)| path.clone())
        .ok_or_else(|| "No artifact candidates".to_string())
}

/// Build the artifact description from filesystem metadata.
pub fn describe(path: &Path) -> Result<ExtensionArtifact, String> {
    let metadata =
        fs::metadata(path).map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    let modified: DateTime<Utc> = metadata
        .modified()
        .map_err(|e| format!("No modification time for {}: {}", path.display(), e))?
        .into();
    let created = metadata.created().ok().map(DateTime::<Utc>::from);

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    Ok(ExtensionArtifact {
        name,
        path: path.to_path_buf(),
        size: metadata.len(),
        size_formatted: format_size(metadata.len()),
        modified,
        created,
    })
}

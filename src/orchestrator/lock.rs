//! Per-resource async mutual exclusion.
//!
//! Builds and dry-runs against the same project queue on one lock; history
//! writes queue on a lock of their own, keyed by the history file. Both live in
//! one registry but never share keys, so a build holding its project lock can
//! always record history.

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum LockKey {
    Project(PathBuf),
    File(PathBuf),
}

type Registry = Mutex<HashMap<LockKey, Arc<tokio::sync::Mutex<()>>>>;

static LOCKS: Lazy<Registry> = Lazy::new(|| Mutex::new(HashMap::new()));

/// Resolve symlinks and relative components so two spellings of one project
/// share a lock. Paths that don't exist yet are used as given.
pub fn canonical_key(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn entry(key: LockKey) -> Arc<tokio::sync::Mutex<()>> {
    // A poisoned registry still holds valid Arcs.
    let mut locks = LOCKS.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    // Entries only the registry still references are idle.
    locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    locks
        .entry(key)
        .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
        .clone()
}

/// Wait for exclusive access to a project directory.
pub async fn lock_project(project: &Path) -> OwnedMutexGuard<()> {
    let key = canonical_key(project);
    log::trace!("[Lock] Waiting for project {}", key.display());
    entry(LockKey::Project(key)).lock_owned().await
}

/// Wait for exclusive access to a single file (history store writes).
pub async fn lock_file(file: &Path) -> OwnedMutexGuard<()> {
    // The file may not exist yet; canonicalize its parent instead.
    let key = match (file.parent(), file.file_name()) {
        (Some(parent), Some(name)) if !parent.as_os_str().is_empty() => {
            canonical_key(parent).join(name)
        }
        _ => file.to_path_buf(),
    };
    entry(LockKey::File(key)).lock_owned().await
}

#[cfg(test)]
fn is_registered(project: &Path) -> bool {
    let locks = LOCKS.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    locks.contains_key(&LockKey::Project(canonical_key(project)))
}

//! Build History Management
//!
//! Every build attempt that reached the toolchain is appended to a per-project
//! JSON file (`<project>/.build_history.json` by default). The file holds at
//! most `history_limit` records (never more than [`MAX_HISTORY_RECORDS`]),
//! oldest first; appending past the limit drops the oldest.
//!
//! Persistence never fails the caller: `record` and `load` log and degrade.
//! Writes go through a temp file in the same directory and an atomic rename,
//! under a per-file lock, so concurrent recorders never lose or tear records.

use crate::config::BuilderConfig;
use crate::error::PersistenceError;
use crate::models::{BuildRecord, BuildResult};
use crate::orchestrator::lock;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Upper bound on records kept per project, whatever the configured limit.
pub const MAX_HISTORY_RECORDS: usize = 50;

/// Aggregates over the stored records.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildStats {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Mean duration in milliseconds; 0 when there are no records
    pub average_duration_ms: u64,
    pub last_success: Option<DateTime<Utc>>,
}

/// Bounded, persisted build history of one project.
#[derive(Clone, Debug)]
pub struct HistoryStore {
    path: PathBuf,
    limit: usize,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>, limit: usize) -> Self {
        HistoryStore {
            path: path.into(),
            limit: limit.clamp(1, MAX_HISTORY_RECORDS),
        }
    }

    /// Store at the configured history file inside `project`.
    pub fn for_project(project: &Path, config: &BuilderConfig) -> Self {
        HistoryStore::new(config.history_path(project), config.history_limit)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Append a record derived from `result`. Failures are logged, never returned.
    pub async fn record(&self, result: &BuildResult) {
        self.append(BuildRecord::from_result(result)).await;
    }

    /// Append `record`, truncating to the most recent `limit` entries.
    pub async fn append(&self, record: BuildRecord) {
        let _file_guard = lock::lock_file(&self.path).await;

        let mut records = match self.try_load() {
            Ok(records) => records,
            Err(e) => {
                log::warn!(
                    "[History] Existing history at {} unreadable, starting fresh: {}",
                    self.path.display(),
                    e
                );
                Vec::new()
            }
        };

        records.push(record);
        if records.len() > self.limit {
            let excess = records.len() - self.limit;
            records.drain(..excess);
        }

        match self.write(&records) {
            Ok(()) => log::debug!(
                "[History] {} record(s) in {}",
                records.len(),
                self.path.display()
            ),
            Err(e) => log::warn!("[History] Failed to write {}: {}", self.path.display(), e),
        }
    }

    /// Stored records, oldest first. Empty when absent or unreadable.
    pub fn load(&self) -> Vec<BuildRecord> {
        self.try_load().unwrap_or_else(|e| {
            log::warn!("[History] Failed to load {}: {}", self.path.display(), e);
            Vec::new()
        })
    }

    /// Stored records, or why they could not be read. A missing file is empty history.
    pub fn try_load(&self) -> Result<Vec<BuildRecord>, PersistenceError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    pub fn stats(&self) -> BuildStats {
        let records = self.load();
        if records.is_empty() {
            return BuildStats::default();
        }

        let succeeded = records.iter().filter(|r| r.success).count();
        let total_ms: u64 = records.iter().map(|r| r.duration).sum();
        BuildStats {
            total: records.len(),
            succeeded,
            failed: records.len() - succeeded,
            average_duration_ms: total_ms / records.len() as u64,
            last_success: records
                .iter()
                .rev()
                .find(|r| r.success)
                .map(|r| r.timestamp),
        }
    }

    /// Remove the history file.
    pub async fn clear(&self) -> Result<(), PersistenceError> {
        let _file_guard = lock::lock_file(&self.path).await;
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, records: &[BuildRecord]) -> Result<(), PersistenceError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let json = serde_json::to_string_pretty(records)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::time::Duration;
    use tempfile::tempdir;

    fn result(success: bool, duration_ms: u64, output: &str) -> BuildResult {
        BuildResult {
            project_path: PathBuf::from("/work/ext"),
            target: "package".to_string(),
            success,
            artifact: None,
            duration: Duration::from_millis(duration_ms),
            output: output.to_string(),
            error: if success { None } else { Some("BUILD FAILED".to_string()) },
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_empty_history() {
        let dir = tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("h.json"), 50);
        assert!(store.load().is_empty());
        assert!(store.try_load().unwrap().is_empty());
        assert_eq!(store.stats(), BuildStats::default());
    }

    #[tokio::test]
    async fn test_keeps_last_fifty_in_append_order() {
        let dir = tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("h.json"), 50);
        for i in 0..60u64 {
            store.record(&result(true, i, &format!("run {}", i))).await;
        }

        let records = store.load();
        assert_eq!(records.len(), 50);
        let durations: Vec<u64> = records.iter().map(|r| r.duration).collect();
        assert_eq!(durations, (10..60).collect::<Vec<u64>>());
        assert_eq!(records.last().unwrap().output_excerpt, "run 59");
    }

    #[tokio::test]
    async fn test_limit_above_cap_still_keeps_fifty() {
        let dir = tempdir().unwrap();
        let mut config = BuilderConfig::default();
        config.history_limit = 100;
        let store = HistoryStore::for_project(dir.path(), &config);
        assert_eq!(store.limit(), MAX_HISTORY_RECORDS);
        assert_eq!(HistoryStore::new(dir.path().join("z.json"), 0).limit(), 1);

        for i in 0..60u64 {
            store.record(&result(true, i, "")).await;
        }
        let records = store.load();
        assert_eq!(records.len(), MAX_HISTORY_RECORDS);
        assert_eq!(records.first().unwrap().duration, 10);
    }

    #[tokio::test]
    async fn test_corrupt_file_degrades_and_is_replaced() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("h.json");
        fs::write(&path, "[{ truncated").unwrap();
        let store = HistoryStore::new(&path, 50);

        assert!(store.load().is_empty());
        assert!(matches!(store.try_load(), Err(PersistenceError::Json(_))));

        store.record(&result(false, 5, "x")).await;
        assert_eq!(store.load().len(), 1);
    }

    #[tokio::test]
    async fn test_write_failure_is_not_fatal() {
        let dir = tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("missing-dir").join("h.json"), 50);
        store.record(&result(true, 1, "ok")).await;
        assert!(store.load().is_empty());
    }

    #[tokio::test]
    async fn test_stats_and_clear() {
        let dir = tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("h.json"), 50);
        store.record(&result(true, 100, "")).await;
        store.record(&result(false, 300, "")).await;

        let stats = store.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.average_duration_ms, 200);
        assert!(stats.last_success.is_some());

        store.clear().await.unwrap();
        assert!(store.load().is_empty());
        store.clear().await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_records_are_not_lost() {
        let dir = tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("h.json"), 50);
        let mut handles = Vec::new();
        for i in 0..20u64 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.record(&result(true, i, "")).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(store.load().len(), 20);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]
        #[test]
        fn prop_length_is_min_of_appends_and_limit(appends in 0usize..80) {
            let dir = tempdir().unwrap();
            let store = HistoryStore::new(dir.path().join("h.json"), 50);
            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            rt.block_on(async {
                for i in 0..appends {
                    store.record(&result(i % 2 == 0, i as u64, "")).await;
                }
            });
            let records = store.load();
            prop_assert_eq!(records.len(), appends.min(50));
            if let Some(last) = records.last() {
                prop_assert_eq!(last.duration, appends as u64 - 1);
            }
        }
    }
}

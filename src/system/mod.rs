//! System module: subprocess execution and logging bootstrap.

pub mod process;

use crate::log_collector::LogCollector;
use log::LevelFilter;
use once_cell::sync::OnceCell;
use std::path::PathBuf;

pub use process::{Invocation, OutputChunk, ProcessOutput, ProcessRunner, StreamKind};

static GLOBAL_COLLECTOR: OnceCell<LogCollector> = OnceCell::new();

/// Install a `LogCollector` writing under `log_dir` as the global logger.
///
/// Idempotent: later calls return the collector installed first.
pub fn initialize_logging(
    log_dir: PathBuf,
    level: LevelFilter,
    echo_level: Option<LevelFilter>,
) -> Result<&'static LogCollector, String> {
    GLOBAL_COLLECTOR.get_or_try_init(|| {
        let collector = LogCollector::new(log_dir, level, echo_level)?;
        log::set_boxed_logger(Box::new(collector.clone()))
            .map(|()| log::set_max_level(level))
            .map_err(|e| format!("Failed to register global logger: {}", e))?;
        log::info!("[System] Logging initialized ({})", collector.full_log_path().display());
        Ok(collector)
    })
}

/// Flush all pending log lines to disk. No-op before `initialize_logging`.
pub fn flush_all_logs() {
    if let Some(collector) = GLOBAL_COLLECTOR.get() {
        if let Err(e) = collector.wait_for_empty() {
            eprintln!("[System] Log flush failed: {}", e);
        }
    }
}

/// Default log directory: <data dir>/aix-builder/logs, or ./logs when unknown.
pub fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("aix-builder").join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"))
}

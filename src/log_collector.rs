//! Decoupled logging pipeline for builds and validation runs.
//!
//! ```text
//! log::info!() / toolchain output
//!     |
//! [LogCollector] (non-blocking, implements log::Log)
//!     | (crossbeam unbounded channel)
//!     v
//! [DiskPersister thread]
//!     |-- logs/full/<ts>_full.log      every record
//!     |-- logs/parsed/<ts>_parsed.log  records with target "progress"
//!     `-- stderr echo                  records at or above the echo level
//! ```
//!
//! Writers never block on disk I/O; `flush()` sends a marker down the same
//! channel and waits for the persister to reach it.

use chrono::Local;
use crossbeam_channel::{unbounded, Sender};
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Log target for high-level milestones (parsed progress events, phase changes).
pub const PROGRESS_TARGET: &str = "progress";

/// Log target for raw toolchain output lines.
pub const TOOLCHAIN_TARGET: &str = "toolchain";

enum LogMessage {
    Line(LogLine),
    Flush(std::sync::mpsc::Sender<()>),
}

/// A log line with metadata
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogLine {
    pub message: String,
    pub level: Level,
    /// Whether the line also belongs in the parsed (milestone) log
    pub parsed: bool,
    pub timestamp: String,
}

impl LogLine {
    pub fn new(level: Level, message: String) -> Self {
        LogLine {
            message,
            level,
            parsed: false,
            timestamp: Local::now().format("%H:%M:%S%.3f").to_string(),
        }
    }

    pub fn parsed(level: Level, message: String) -> Self {
        LogLine {
            parsed: true,
            ..LogLine::new(level, message)
        }
    }

    fn formatted(&self) -> String {
        format!("[{}] [{}] {}\n", self.timestamp, self.level, self.message)
    }
}

/// Unified logger that persists to disk on a background thread.
#[derive(Clone)]
pub struct LogCollector {
    tx: Sender<LogMessage>,
    log_dir: PathBuf,
    full_log_path: PathBuf,
    parsed_log_path: PathBuf,
    max_level: LevelFilter,
}

impl LogCollector {
    /// Create the log directories and start the persister thread.
    ///
    /// `echo_level` mirrors records at or above that level to stderr.
    pub fn new(
        log_dir: PathBuf,
        max_level: LevelFilter,
        echo_level: Option<LevelFilter>,
    ) -> Result<Self, String> {
        let full_log_dir = log_dir.join("full");
        let parsed_log_dir = log_dir.join("parsed");
        std::fs::create_dir_all(&full_log_dir)
            .map_err(|e| format!("Failed to create full log dir: {}", e))?;
        std::fs::create_dir_all(&parsed_log_dir)
            .map_err(|e| format!("Failed to create parsed log dir: {}", e))?;

        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let full_log_path = full_log_dir.join(format!("{}_full.log", stamp));
        let parsed_log_path = parsed_log_dir.join(format!("{}_parsed.log", stamp));

        let mut full_file = open_append(&full_log_path)?;
        let mut parsed_file = open_append(&parsed_log_path)?;

        let (tx, rx) = unbounded::<LogMessage>();

        std::thread::Builder::new()
            .name("log-persister".to_string())
            .spawn(move || {
                while let Ok(msg) = rx.recv() {
                    match msg {
                        LogMessage::Line(line) => {
                            let formatted = line.formatted();
                            let _ = full_file.write_all(formatted.as_bytes());
                            if line.parsed {
                                let _ = parsed_file.write_all(formatted.as_bytes());
                            }
                            if let Some(echo) = echo_level {
                                if line.level <= echo {
                                    eprint!("{}", formatted);
                                }
                            }
                        }
                        LogMessage::Flush(done) => {
                            let _ = full_file.flush();
                            let _ = parsed_file.flush();
                            let _ = done.send(());
                        }
                    }
                }
                let _ = full_file.flush();
                let _ = parsed_file.flush();
            })
            .map_err(|e| format!("Failed to start log persister thread: {}", e))?;

        Ok(LogCollector {
            tx,
            log_dir,
            full_log_path,
            parsed_log_path,
            max_level,
        })
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn full_log_path(&self) -> &Path {
        &self.full_log_path
    }

    pub fn parsed_log_path(&self) -> &Path {
        &self.parsed_log_path
    }

    pub fn max_level(&self) -> LevelFilter {
        self.max_level
    }

    /// Queue a line (non-blocking).
    pub fn log_line(&self, line: LogLine) {
        let _ = self.tx.send(LogMessage::Line(line));
    }

    pub fn log_str(&self, message: impl Into<String>) {
        self.log_line(LogLine::new(Level::Info, message.into()));
    }

    pub fn log_parsed(&self, message: impl Into<String>) {
        self.log_line(LogLine::parsed(Level::Info, message.into()));
    }

    /// Block until every line queued before this call is written.
    pub fn wait_for_empty(&self) -> Result<(), String> {
        let (done_tx, done_rx) = std::sync::mpsc::channel::<()>();
        self.tx
            .send(LogMessage::Flush(done_tx))
            .map_err(|e| format!("Failed to send flush marker: {}", e))?;
        done_rx
            .recv()
            .map_err(|e| format!("Flush signal interrupted: {}", e))
    }
}

impl Log for LogCollector {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let message = record.args().to_string();
        if record.target() == PROGRESS_TARGET {
            self.log_line(LogLine::parsed(record.level(), message));
        } else {
            self.log_line(LogLine::new(record.level(), message));
        }
    }

    fn flush(&self) {
        let _ = self.wait_for_empty();
    }
}

fn open_append(path: &Path) -> Result<File, String> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| format!("Failed to open log file {}: {}", path.display(), e))
}

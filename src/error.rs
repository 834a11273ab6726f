//! Unified error type hierarchy for the AIX builder
//!
//! Provides structured error handling with ProcessError, BuildError,
//! PersistenceError, ConfigError and PhaseError.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Failures of a single toolchain subprocess.
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("'{program}' exited with {}: {diagnostic}", exit_description(.code))]
    Exit {
        program: String,
        code: Option<i32>,
        /// Tail of the error stream (or stdout when stderr was empty)
        diagnostic: String,
        /// Everything the process wrote, stdout first
        output: String,
    },

    #[error("'{program}' timed out after {} ms", as_millis(.timeout))]
    Timeout {
        program: String,
        timeout: Duration,
        pid: Option<u32>,
        output: String,
    },

    #[error("'{program}' was cancelled")]
    Cancelled { program: String, output: String },

    #[error("I/O error while supervising '{program}': {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },
}

fn exit_description(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "a signal".to_string(),
    }
}

fn as_millis(timeout: &Duration) -> u128 {
    timeout.as_millis()
}

impl ProcessError {
    /// Output captured before the failure, if any.
    pub fn output(&self) -> &str {
        match self {
            ProcessError::Exit { output, .. }
            | ProcessError::Timeout { output, .. }
            | ProcessError::Cancelled { output, .. } => output,
            ProcessError::Spawn { .. } | ProcessError::Io { .. } => "",
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ProcessError::Timeout { .. })
    }
}

/// Build orchestration errors.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Invalid build phase transition: {0}")]
    InvalidTransition(String),

    #[error("I/O error during build preparation: {0}")]
    Io(#[from] io::Error),
}

/// History file read/write failures. Logged by callers, never fatal.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("History I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("History file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to replace history file: {0}")]
    Persist(#[from] tempfile::PersistError),
}

/// Configuration file parsing and validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Invalid JSON in config: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("IO error during config operations: {0}")]
    IoError(#[from] io::Error),
}

/// Internal fault of a validation phase.
///
/// Phases never propagate these to the caller of the pipeline; the pipeline
/// converts each one into a single error finding.
#[derive(Error, Debug)]
pub enum PhaseError {
    #[error("{0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Other(String),
}

/// Top-level result type for binary-level plumbing.
pub type Result<T> = anyhow::Result<T>;

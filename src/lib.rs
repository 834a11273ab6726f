//! AIX Extension Builder
//!
//! Drives an external toolchain (Apache Ant by default) to compile and package
//! mobile extension projects into `.aix` archives, validates that a project is
//! buildable before and after that process, and keeps a bounded per-project
//! record of build attempts.
//!
//! The system is organized into functional modules:
//! - **error**: Unified error type hierarchy
//! - **models**: Core data structures and types
//! - **config**: Builder settings, loading and validation
//! - **system**: Subprocess execution and logging bootstrap
//! - **log_collector**: Decoupled, non-blocking logging pipeline
//! - **orchestrator**: Build state machine, toolchain invocation, artifact discovery
//! - **validation**: Multi-phase project validation pipeline
//! - **history**: Persisted build history
//! - **report**: Text, JSON and HTML rendering of reports

// Core foundational modules
pub mod error;
pub mod models;

// Settings and layout
pub mod config;

// Subprocess execution, logging bootstrap
pub mod system;

// Robust, decoupled logging system
pub mod log_collector;

// Build orchestration and state management
pub mod orchestrator;

// Project validation phases
pub mod validation;

pub mod history;
pub mod report;

// Re-export the log crate for macro usage
pub use log;

// Re-export logging initialization functions from system module
pub use system::{flush_all_logs, initialize_logging};

pub use log_collector::{LogCollector, LogLine};

// ============================================================================
// PUBLIC RE-EXPORTS FOR CONVENIENCE
// ============================================================================

pub use error::{BuildError, ConfigError, PersistenceError, PhaseError, ProcessError, Result};

pub use models::{
    BuildEvent, BuildRecord, BuildRequest, BuildResult, DependencyDescriptor, ExtensionArtifact,
    ProgressEvent, ValidateOptions, ValidationReport,
};

pub use config::{ArtifactPolicy, BuilderConfig, SettingsManager};

pub use orchestrator::{
    BuildOrchestrator, BuildPhaseState, OptimizeOptions, ProgressParser, SigningOptions,
};

pub use validation::{ValidationPhase, ValidationPipeline};

pub use history::{BuildStats, HistoryStore};

pub use report::{to_document, to_structured, to_text, Reportable};

pub use system::{Invocation, ProcessRunner};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

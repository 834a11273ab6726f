//! Core data types for the AIX builder.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::orchestrator::state::BuildPhaseState;

/// Target invoked when the caller does not name one.
pub const DEFAULT_TARGET: &str = "package";

/// Maximum number of characters of toolchain output kept in a history record.
pub const OUTPUT_EXCERPT_LIMIT: usize = 1000;

/// One build invocation. Ephemeral, created per call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRequest {
    pub project_path: PathBuf,
    pub target: String,
    pub clean: bool,
    pub verbose: bool,
    /// Named build parameters, passed to the toolchain as `-Dname=value`
    pub properties: BTreeMap<String, String>,
    /// Targets that produce no artifact (e.g. coverage runs) opt out explicitly
    pub skip_artifact_discovery: bool,
}

impl BuildRequest {
    pub fn new(project_path: impl Into<PathBuf>) -> Self {
        BuildRequest {
            project_path: project_path.into(),
            target: DEFAULT_TARGET.to_string(),
            clean: false,
            verbose: false,
            properties: BTreeMap::new(),
            skip_artifact_discovery: false,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    pub fn with_clean(mut self, clean: bool) -> Self {
        self.clean = clean;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn skip_artifact_discovery(mut self) -> Self {
        self.skip_artifact_discovery = true;
        self
    }

    /// Property bag serialized as toolchain command-line definitions.
    pub fn property_args(&self) -> Vec<String> {
        self.properties
            .iter()
            .map(|(name, value)| format!("-D{}={}", name, value))
            .collect()
    }
}

/// The packaged extension produced by a successful build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionArtifact {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    pub size_formatted: String,
    pub modified: DateTime<Utc>,
    /// Not every filesystem records creation time
    pub created: Option<DateTime<Utc>>,
}

/// Outcome of one orchestrator invocation. Immutable once returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildResult {
    pub project_path: PathBuf,
    pub target: String,
    pub success: bool,
    pub artifact: Option<ExtensionArtifact>,
    #[serde(rename = "duration_ms", with = "duration_ms")]
    pub duration: Duration,
    pub output: String,
    pub error: Option<String>,
}

impl BuildResult {
    /// Last `limit` characters of the captured output.
    pub fn output_tail(&self, limit: usize) -> &str {
        tail_chars(&self.output, limit)
    }
}

/// One persisted history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRecord {
    pub timestamp: DateTime<Utc>,
    /// Milliseconds
    pub duration: u64,
    pub success: bool,
    pub artifact: Option<ExtensionArtifact>,
    pub output_excerpt: String,
}

impl BuildRecord {
    pub fn from_result(result: &BuildResult) -> Self {
        BuildRecord {
            timestamp: Utc::now(),
            duration: result.duration.as_millis() as u64,
            success: result.success,
            artifact: result.artifact.clone(),
            output_excerpt: result.output_tail(OUTPUT_EXCERPT_LIMIT).to_string(),
        }
    }
}

/// Aggregated findings of a validation run. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub valid: bool,
}

impl ValidationReport {
    pub fn new() -> Self {
        ValidationReport {
            errors: Vec::new(),
            warnings: Vec::new(),
            valid: true,
        }
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
        self.valid = false;
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Append another report's findings after this one's.
    pub fn merge(&mut self, other: ValidationReport) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
        self.valid = self.errors.is_empty();
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// A library jar found in the project's library directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyDescriptor {
    pub name: String,
    pub version: Option<String>,
    pub file_name: String,
    pub size: u64,
}

/// Opt-in validation phases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidateOptions {
    pub build: bool,
    pub code_quality: bool,
}

/// Structured milestone recognised in toolchain output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressEvent {
    CompilationStarted { file_count: u32 },
    ArtifactPackaged { path: PathBuf },
    BuildCompleted { path: PathBuf },
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressEvent::CompilationStarted { file_count } => {
                write!(f, "Compiling {} source file(s)", file_count)
            }
            ProgressEvent::ArtifactPackaged { path } => {
                write!(f, "Packaged {}", path.display())
            }
            ProgressEvent::BuildCompleted { path } => {
                write!(f, "Build completed: {}", path.display())
            }
        }
    }
}

/// Events streamed by the orchestrator while a build runs, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEvent {
    PhaseChanged(BuildPhaseState),
    Progress(ProgressEvent),
    Output(String),
}

/// Human readable size with one decimal (B, KB, MB, GB).
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

/// Last `limit` characters of `text`, never splitting a character.
pub fn tail_chars(text: &str, limit: usize) -> &str {
    let count = text.chars().count();
    if count <= limit {
        return text;
    }
    match text.char_indices().nth(count - limit) {
        Some((index, _)) => &text[index..],
        None => text,
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

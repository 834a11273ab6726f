//! Configuration module for extension build management.
//!
//! `BuilderConfig` names the external tools, the project layout the build
//! descriptor is expected to declare, and the limits the orchestrator and
//! validators enforce. Everything has a default so a missing or partial
//! settings file still yields a usable configuration.
//!
//! # Module Structure
//!
//! - `loader`: Handles loading configurations from files and serialization formats
//! - `validator`: Validates configuration parameters
//!
//! # Settings Management
//!
//! `SettingsManager::load()` reads the global settings file and falls back to
//! defaults (with a warning) when the file is absent or unreadable.

pub mod loader;
pub mod validator;

use crate::error::ConfigError;
use crate::history::MAX_HISTORY_RECORDS;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How a single artifact is chosen when the distribution directory holds
/// several files with the expected suffix.
///
/// Candidates are sorted by file name before any policy applies, so the
/// outcome never depends on directory listing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactPolicy {
    /// Exactly one candidate must exist; several is an error
    #[default]
    Unique,
    /// Most recently modified candidate wins (name breaks ties)
    NewestModified,
    /// First candidate in file name order
    Alphabetical,
}

/// Application configuration for builds and validation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    // External tools
    pub toolchain_command: String,
    pub java_command: String,
    pub kotlin_command: String,

    // Limits
    pub build_timeout_ms: u64,
    pub version_timeout_ms: u64,

    // Project layout
    pub descriptor_file: String,
    pub source_dir: String,
    pub assets_dir: String,
    pub lib_dir: String,
    pub build_dir: String,
    pub dist_dir: String,

    // Artifact discovery
    pub artifact_suffix: String,
    pub artifact_policy: ArtifactPolicy,

    // History
    pub history_file: String,
    pub history_limit: usize,

    // Dependencies
    pub mandatory_libraries: Vec<String>,
    pub recommended_libraries: Vec<String>,
    pub max_library_size_bytes: u64,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        BuilderConfig {
            toolchain_command: "ant".to_string(),
            java_command: "java".to_string(),
            kotlin_command: "kotlinc".to_string(),
            build_timeout_ms: 300_000,
            version_timeout_ms: 5_000,
            descriptor_file: "build.xml".to_string(),
            source_dir: "src".to_string(),
            assets_dir: "assets".to_string(),
            lib_dir: "lib".to_string(),
            build_dir: "build".to_string(),
            dist_dir: "dist".to_string(),
            artifact_suffix: ".aix".to_string(),
            artifact_policy: ArtifactPolicy::Unique,
            history_file: ".build_history.json".to_string(),
            history_limit: MAX_HISTORY_RECORDS,
            mandatory_libraries: vec![
                "appinventor-components.jar".to_string(),
                "android.jar".to_string(),
            ],
            recommended_libraries: vec!["kawa.jar".to_string()],
            max_library_size_bytes: 100 * 1024 * 1024,
        }
    }
}

impl BuilderConfig {
    pub fn build_timeout(&self) -> Duration {
        Duration::from_millis(self.build_timeout_ms)
    }

    pub fn version_timeout(&self) -> Duration {
        Duration::from_millis(self.version_timeout_ms)
    }

    pub fn descriptor_path(&self, project: &Path) -> PathBuf {
        project.join(&self.descriptor_file)
    }

    pub fn source_path(&self, project: &Path) -> PathBuf {
        project.join(&self.source_dir)
    }

    pub fn lib_path(&self, project: &Path) -> PathBuf {
        project.join(&self.lib_dir)
    }

    pub fn build_path(&self, project: &Path) -> PathBuf {
        project.join(&self.build_dir)
    }

    pub fn dist_path(&self, project: &Path) -> PathBuf {
        project.join(&self.dist_dir)
    }

    pub fn history_path(&self, project: &Path) -> PathBuf {
        project.join(&self.history_file)
    }

    /// Validate this configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validator::validate_config(self)
    }
}

/// Loads and saves the global `BuilderConfig`.
pub struct SettingsManager;

impl SettingsManager {
    /// Load the global settings, or defaults if the file doesn't exist.
    ///
    /// An unreadable or malformed file is logged and replaced by defaults
    /// rather than failing the caller. A file that parses but fails
    /// validation is an error.
    pub fn load() -> Result<BuilderConfig, ConfigError> {
        let path = match loader::get_global_settings_path() {
            Ok(path) => path,
            Err(e) => {
                log::warn!("[Config] Cannot resolve settings path, using defaults: {}", e);
                return Ok(BuilderConfig::default());
            }
        };
        Self::load_from(&path)
    }

    /// Load settings from an explicit path with the same fallback rules as `load()`.
    pub fn load_from(path: &Path) -> Result<BuilderConfig, ConfigError> {
        if !path.exists() {
            log::debug!(
                "[Config] No settings file at {}, using defaults",
                path.display()
            );
            return Ok(BuilderConfig::default());
        }

        match loader::load_config_from_file(path) {
            Ok(config) => {
                config.validate()?;
                Ok(config)
            }
            Err(ConfigError::ValidationFailed(msg)) => Err(ConfigError::ValidationFailed(msg)),
            Err(e) => {
                log::warn!(
                    "[Config] [WARNING] Failed to parse {}, falling back to defaults: {}",
                    path.display(),
                    e
                );
                Ok(BuilderConfig::default())
            }
        }
    }

    /// Save settings to the global settings path.
    pub fn save(config: &BuilderConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let path = loader::get_global_settings_path()?;
        loader::save_config_to_file(config, &path)
    }
}

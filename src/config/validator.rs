//! Config validation.

use crate::config::BuilderConfig;
use crate::error::ConfigError;
use crate::history::MAX_HISTORY_RECORDS;

/// Validate a command name (non-empty, no embedded whitespace at the ends).
pub fn validate_command(field: &str, command: &str) -> Result<(), ConfigError> {
    if command.trim().is_empty() {
        return Err(ConfigError::ValidationFailed(format!(
            "{} cannot be empty",
            field
        )));
    }
    if command.trim() != command {
        return Err(ConfigError::ValidationFailed(format!(
            "{} has leading or trailing whitespace: '{}'",
            field, command
        )));
    }
    Ok(())
}

/// Validate a relative project directory name.
pub fn validate_layout_dir(field: &str, dir: &str) -> Result<(), ConfigError> {
    if dir.is_empty() {
        return Err(ConfigError::ValidationFailed(format!(
            "{} cannot be empty",
            field
        )));
    }
    if std::path::Path::new(dir).is_absolute() {
        return Err(ConfigError::ValidationFailed(format!(
            "{} must be relative to the project root, got: {}",
            field, dir
        )));
    }
    Ok(())
}

/// Validate the full configuration.
pub fn validate_config(config: &BuilderConfig) -> Result<(), ConfigError> {
    validate_command("toolchain_command", &config.toolchain_command)?;
    validate_command("java_command", &config.java_command)?;
    validate_command("kotlin_command", &config.kotlin_command)?;

    if config.build_timeout_ms == 0 {
        return Err(ConfigError::ValidationFailed(
            "build_timeout_ms must be greater than zero".to_string(),
        ));
    }
    if config.version_timeout_ms == 0 {
        return Err(ConfigError::ValidationFailed(
            "version_timeout_ms must be greater than zero".to_string(),
        ));
    }

    validate_layout_dir("descriptor_file", &config.descriptor_file)?;
    validate_layout_dir("source_dir", &config.source_dir)?;
    validate_layout_dir("assets_dir", &config.assets_dir)?;
    validate_layout_dir("lib_dir", &config.lib_dir)?;
    validate_layout_dir("build_dir", &config.build_dir)?;
    validate_layout_dir("dist_dir", &config.dist_dir)?;
    validate_layout_dir("history_file", &config.history_file)?;

    if config.build_dir == config.dist_dir {
        return Err(ConfigError::ValidationFailed(format!(
            "build_dir and dist_dir must differ, both are '{}'",
            config.build_dir
        )));
    }

    if !config.artifact_suffix.starts_with('.') || config.artifact_suffix.len() < 2 {
        return Err(ConfigError::ValidationFailed(format!(
            "artifact_suffix must start with '.', got: '{}'",
            config.artifact_suffix
        )));
    }

    if config.history_limit == 0 || config.history_limit > MAX_HISTORY_RECORDS {
        return Err(ConfigError::ValidationFailed(format!(
            "history_limit must be between 1 and {}, got: {}",
            MAX_HISTORY_RECORDS, config.history_limit
        )));
    }

    Ok(())
}

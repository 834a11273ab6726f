//! Real clean -> compile -> package run, followed by an artifact check.

use crate::config::BuilderConfig;
use crate::error::PhaseError;
use crate::models::{tail_chars, ValidationReport};
use crate::orchestrator::{artifact, executor, lock};
use crate::system::ProcessRunner;
use std::path::Path;

/// Targets run in order; the first failure ends the dry-run.
pub const DRY_RUN_TARGETS: &[&str] = &["clean", "compile", "package"];

/// Characters of toolchain diagnostic quoted in a failed-target finding.
const DIAGNOSTIC_EXCERPT: usize = 500;

/// Build dry-run phase. Holds the project lock for the whole sequence.
pub async fn check_build(
    runner: &ProcessRunner,
    project: &Path,
    config: &BuilderConfig,
) -> Result<ValidationReport, PhaseError> {
    let mut report = ValidationReport::new();
    if !config.descriptor_path(project).is_file() {
        report.error(format!(
            "Build dry-run not possible without {}",
            config.descriptor_file
        ));
        return Ok(report);
    }

    let _project_guard = lock::lock_project(project).await;

    for target in DRY_RUN_TARGETS {
        log::info!("[Validate] [DRY-RUN] Running target '{}'", target);
        let invocation = executor::toolchain_invocation(config, project, target, &[], false);
        if let Err(e) = executor::run_target(runner, &invocation, None).await {
            let diagnostic = tail_chars(e.output().trim_end(), DIAGNOSTIC_EXCERPT);
            let mut message = format!("Build target '{}' failed: {}", target, e);
            if !diagnostic.is_empty() && !message.contains(diagnostic) {
                message.push_str(&format!("\n{}", diagnostic));
            }
            report.error(message);
            return Ok(report);
        }
        if *target == "clean" {
            executor::ensure_output_dirs(config, project)?;
        }
    }

    let dist = config.dist_path(project);
    let candidates = artifact::list_candidates(&dist, &config.artifact_suffix)?;
    if candidates.is_empty() {
        report.error(format!(
            "Build dry-run produced no {} artifact in {}",
            config.artifact_suffix, config.dist_dir
        ));
    } else {
        log::info!("[Validate] [DRY-RUN] {} artifact(s) produced", candidates.len());
    }

    Ok(report)
}

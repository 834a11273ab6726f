//! Validation Pipeline - independent phases, aggregated findings.
//!
//! Phases run in order: structure, environment, dependencies, build dry-run
//! (opt-in), code quality (opt-in). A phase that returns an error or panics
//! contributes exactly one error finding, `"<Phase> validation failed: <reason>"`,
//! and never stops a later phase. Reports are merged by concatenation.

pub mod dependencies;
pub mod dry_run;
pub mod environment;
pub mod quality;
pub mod rules;
pub mod structure;

use crate::config::BuilderConfig;
use crate::error::PhaseError;
use crate::models::{DependencyDescriptor, ValidateOptions, ValidationReport};
use crate::system::ProcessRunner;
use futures::future::{BoxFuture, FutureExt};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};

pub use dependencies::scan_dependencies;

/// Everything a phase may inspect.
#[derive(Clone)]
pub struct ValidationContext {
    pub project: PathBuf,
    pub config: BuilderConfig,
    pub runner: ProcessRunner,
}

/// Boxed result of one phase run.
pub type PhaseFuture<'a> = BoxFuture<'a, Result<ValidationReport, PhaseError>>;

/// One validation phase.
pub trait ValidationPhase: Send + Sync {
    /// Capitalized name used in fault findings
    fn name(&self) -> &'static str;

    fn run<'a>(&'a self, ctx: &'a ValidationContext) -> PhaseFuture<'a>;
}

pub struct StructurePhase;

impl ValidationPhase for StructurePhase {
    fn name(&self) -> &'static str {
        "Structure"
    }

    fn run<'a>(&'a self, ctx: &'a ValidationContext) -> PhaseFuture<'a> {
        async move { structure::check_structure(&ctx.project, &ctx.config) }.boxed()
    }
}

pub struct EnvironmentPhase;

impl ValidationPhase for EnvironmentPhase {
    fn name(&self) -> &'static str {
        "Environment"
    }

    fn run<'a>(&'a self, ctx: &'a ValidationContext) -> PhaseFuture<'a> {
        async move {
            let report =
                environment::check_environment(&ctx.runner, &ctx.project, &ctx.config).await;
            Ok(report)
        }
        .boxed()
    }
}

pub struct DependencyPhase;

impl ValidationPhase for DependencyPhase {
    fn name(&self) -> &'static str {
        "Dependency"
    }

    fn run<'a>(&'a self, ctx: &'a ValidationContext) -> PhaseFuture<'a> {
        async move { dependencies::check_dependencies(&ctx.project, &ctx.config) }.boxed()
    }
}

pub struct BuildPhase;

impl ValidationPhase for BuildPhase {
    fn name(&self) -> &'static str {
        "Build"
    }

    fn run<'a>(&'a self, ctx: &'a ValidationContext) -> PhaseFuture<'a> {
        dry_run::check_build(&ctx.runner, &ctx.project, &ctx.config).boxed()
    }
}

pub struct CodeQualityPhase;

impl ValidationPhase for CodeQualityPhase {
    fn name(&self) -> &'static str {
        "Code quality"
    }

    fn run<'a>(&'a self, ctx: &'a ValidationContext) -> PhaseFuture<'a> {
        async move { quality::check_code_quality(&ctx.project, &ctx.config) }.boxed()
    }
}

/// The phases `validate_all` runs for `options`, in order.
pub fn phases_for(options: ValidateOptions) -> Vec<Box<dyn ValidationPhase>> {
    let mut phases: Vec<Box<dyn ValidationPhase>> =
        vec![Box::new(StructurePhase), Box::new(EnvironmentPhase), Box::new(DependencyPhase)];
    if options.build {
        phases.push(Box::new(BuildPhase));
    }
    if options.code_quality {
        phases.push(Box::new(CodeQualityPhase));
    }
    phases
}

/// Run one phase, converting an error or a panic into a single finding.
pub async fn run_guarded(phase: &dyn ValidationPhase, ctx: &ValidationContext) -> ValidationReport {
    log::debug!("[Validate] [PHASE] {}", phase.name());
    match AssertUnwindSafe(phase.run(ctx)).catch_unwind().await {
        Ok(Ok(report)) => report,
        Ok(Err(e)) => fault_report(phase.name(), &e.to_string()),
        Err(panic) => fault_report(phase.name(), &panic_message(panic.as_ref())),
    }
}

fn fault_report(phase: &str, reason: &str) -> ValidationReport {
    log::error!("[Validate] [FAULT] {} phase: {}", phase, reason);
    let mut report = ValidationReport::new();
    report.error(format!("{} validation failed: {}", phase, reason));
    report
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Validates extension projects.
#[derive(Clone)]
pub struct ValidationPipeline {
    config: BuilderConfig,
    runner: ProcessRunner,
}

impl ValidationPipeline {
    pub fn new(config: BuilderConfig) -> Self {
        ValidationPipeline {
            config,
            runner: ProcessRunner::new(),
        }
    }

    pub fn with_runner(mut self, runner: ProcessRunner) -> Self {
        self.runner = runner;
        self
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    fn context(&self, project: &Path) -> ValidationContext {
        ValidationContext {
            project: project.to_path_buf(),
            config: self.config.clone(),
            runner: self.runner.clone(),
        }
    }

    /// Run every phase selected by `options` and merge the findings.
    pub async fn validate_all(&self, project: &Path, options: ValidateOptions) -> ValidationReport {
        self.run_phases(project, &phases_for(options)).await
    }

    /// Run `phases` in order against `project`.
    pub async fn run_phases(
        &self,
        project: &Path,
        phases: &[Box<dyn ValidationPhase>],
    ) -> ValidationReport {
        log::info!("[Validate] [START] {}", project.display());
        let ctx = self.context(project);
        let mut report = ValidationReport::new();
        for phase in phases {
            report.merge(run_guarded(phase.as_ref(), &ctx).await);
        }
        log::info!(
            "[Validate] [DONE] {} error(s), {} warning(s)",
            report.errors.len(),
            report.warnings.len()
        );
        report
    }

    pub async fn validate_structure(&self, project: &Path) -> ValidationReport {
        run_guarded(&StructurePhase, &self.context(project)).await
    }

    pub async fn validate_environment(&self, project: &Path) -> ValidationReport {
        run_guarded(&EnvironmentPhase, &self.context(project)).await
    }

    pub async fn validate_dependencies(&self, project: &Path) -> ValidationReport {
        run_guarded(&DependencyPhase, &self.context(project)).await
    }

    pub async fn validate_build(&self, project: &Path) -> ValidationReport {
        run_guarded(&BuildPhase, &self.context(project)).await
    }

    pub async fn validate_code_quality(&self, project: &Path) -> ValidationReport {
        run_guarded(&CodeQualityPhase, &self.context(project)).await
    }

    /// Libraries in the project's library directory.
    pub fn scan_dependencies(&self, project: &Path) -> std::io::Result<Vec<DependencyDescriptor>> {
        dependencies::scan_dependencies(&self.config.lib_path(project))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    struct PanickingPhase;

    fn explode() -> Result<ValidationReport, PhaseError> {
        panic!("index out of bounds")
    }

    impl ValidationPhase for PanickingPhase {
        fn name(&self) -> &'static str {
            "Exploding"
        }

        fn run<'a>(&'a self, _ctx: &'a ValidationContext) -> PhaseFuture<'a> {
            async move { explode() }.boxed()
        }
    }

    struct FailingPhase;

    impl ValidationPhase for FailingPhase {
        fn name(&self) -> &'static str {
            "Failing"
        }

        fn run<'a>(&'a self, _ctx: &'a ValidationContext) -> PhaseFuture<'a> {
            async move { Err(PhaseError::Other("permission denied".to_string())) }.boxed()
        }
    }

    struct WarningPhase;

    impl ValidationPhase for WarningPhase {
        fn name(&self) -> &'static str {
            "Warning"
        }

        fn run<'a>(&'a self, _ctx: &'a ValidationContext) -> PhaseFuture<'a> {
            async move {
                let mut report = ValidationReport::new();
                report.warning("still ran");
                Ok(report)
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn test_faults_become_single_findings_and_do_not_stop_later_phases() {
        let dir = tempdir().unwrap();
        let pipeline = ValidationPipeline::new(BuilderConfig::default());
        let phases: Vec<Box<dyn ValidationPhase>> =
            vec![Box::new(PanickingPhase), Box::new(FailingPhase), Box::new(WarningPhase)];

        let report = pipeline.run_phases(dir.path(), &phases).await;
        assert_eq!(
            report.errors,
            vec![
                "Exploding validation failed: index out of bounds",
                "Failing validation failed: permission denied",
            ]
        );
        assert_eq!(report.warnings, vec!["still ran"]);
        assert!(!report.valid);
    }

    #[test]
    fn test_phase_selection() {
        let names = |options| -> Vec<&'static str> {
            phases_for(options).iter().map(|p| p.name()).collect()
        };
        assert_eq!(
            names(ValidateOptions::default()),
            vec!["Structure", "Environment", "Dependency"]
        );
        assert_eq!(
            names(ValidateOptions {
                build: true,
                code_quality: true
            }),
            vec!["Structure", "Environment", "Dependency", "Build", "Code quality"]
        );
    }

    #[tokio::test]
    async fn test_missing_descriptor_makes_report_invalid() {
        let dir = tempdir().unwrap();
        let pipeline = ValidationPipeline::new(BuilderConfig::default());
        let report = pipeline.validate_structure(dir.path()).await;
        assert!(!report.valid);
        assert!(report.errors.iter().any(|e| e.contains("build.xml")));
    }
}

//! Build Orchestration: preconditions -> clean -> prepare -> invoke -> artifact discovery.
//!
//! `BuildOrchestrator` drives one toolchain target per call through the
//! `BuildPhaseState` machine, streams `BuildEvent`s to an optional channel and
//! records every attempt that reached the toolchain in the project's history.
//! Builds against the same project are serialized; different projects run
//! concurrently.

pub mod artifact;
pub mod executor;
pub mod lock;
pub mod progress;
pub mod state;

use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::sync::mpsc;

pub use progress::{parse_line, parse_output, ProgressParser};
pub use state::{BuildAttempt, BuildPhaseState};

use crate::config::BuilderConfig;
use crate::error::{BuildError, ProcessError};
use crate::history::HistoryStore;
use crate::log_collector::PROGRESS_TARGET;
use crate::models::{BuildEvent, BuildRequest, BuildResult, ExtensionArtifact};
use crate::system::ProcessRunner;
use crate::validation::rules;

/// Target that runs the test suite with coverage instrumentation.
pub const COVERAGE_TARGET: &str = "test-coverage";
/// Target that packages with the optimizer enabled.
pub const OPTIMIZED_TARGET: &str = "package-optimized";
/// Target that packages and signs.
pub const SIGNED_TARGET: &str = "package-signed";

/// Highest accepted optimization level.
pub const MAX_OPTIMIZE_LEVEL: u8 = 3;

/// Parameters of an optimized build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptimizeOptions {
    pub proguard: bool,
    /// 0 to 3
    pub level: u8,
}

impl Default for OptimizeOptions {
    fn default() -> Self {
        OptimizeOptions {
            proguard: false,
            level: 1,
        }
    }
}

/// Keystore parameters of a signed build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningOptions {
    pub keystore: PathBuf,
    pub alias: String,
    pub store_password: Option<String>,
    pub key_password: Option<String>,
}

/// Drives toolchain builds for extension projects.
#[derive(Clone)]
pub struct BuildOrchestrator {
    config: BuilderConfig,
    runner: ProcessRunner,
    /// Channel for streaming phase changes, progress and raw output
    events: Option<mpsc::UnboundedSender<BuildEvent>>,
    record_history: bool,
}

/// Outcome of the phases after the preconditions held.
struct Completed {
    output: String,
    artifact: Option<ExtensionArtifact>,
}

struct Failure {
    message: String,
    output: String,
}

impl Failure {
    fn new(message: impl Into<String>) -> Self {
        Failure {
            message: message.into(),
            output: String::new(),
        }
    }
}

impl From<ProcessError> for Failure {
    fn from(err: ProcessError) -> Self {
        Failure {
            output: err.output().to_string(),
            message: err.to_string(),
        }
    }
}

impl BuildOrchestrator {
    pub fn new(config: BuilderConfig) -> Self {
        BuildOrchestrator {
            config,
            runner: ProcessRunner::new(),
            events: None,
            record_history: true,
        }
    }

    /// Use `runner` for subprocesses (e.g. one wired to a cancellation signal).
    pub fn with_runner(mut self, runner: ProcessRunner) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_events(mut self, events: mpsc::UnboundedSender<BuildEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Disable history recording.
    pub fn without_history(mut self) -> Self {
        self.record_history = false;
        self
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    pub fn runner(&self) -> &ProcessRunner {
        &self.runner
    }

    /// Build `request.target` for `request.project_path`.
    ///
    /// # Errors
    /// Only precondition failures are errors. Toolchain failures, timeouts and
    /// cancellation produce an unsuccessful `BuildResult`.
    pub async fn build_extension(&self, request: BuildRequest) -> Result<BuildResult, BuildError> {
        self.check_preconditions(&request)?;
        Ok(self.run(request).await)
    }

    /// Run the coverage target. No artifact is expected.
    pub async fn build_with_coverage(
        &self,
        request: BuildRequest,
    ) -> Result<BuildResult, BuildError> {
        let descriptor = self.check_preconditions(&request)?;
        self.require_target(&descriptor, COVERAGE_TARGET)?;

        let request = request
            .with_target(COVERAGE_TARGET)
            .with_property("coverage.enabled", "true")
            .skip_artifact_discovery();
        Ok(self.run(request).await)
    }

    /// Package with the optimizer.
    pub async fn build_optimized(
        &self,
        request: BuildRequest,
        options: OptimizeOptions,
    ) -> Result<BuildResult, BuildError> {
        let descriptor = self.check_preconditions(&request)?;
        if options.level > MAX_OPTIMIZE_LEVEL {
            return Err(BuildError::Precondition(format!(
                "Optimization level must be between 0 and {}, got {}",
                MAX_OPTIMIZE_LEVEL, options.level
            )));
        }
        self.require_target(&descriptor, OPTIMIZED_TARGET)?;

        let request = request
            .with_target(OPTIMIZED_TARGET)
            .with_property("optimize", "true")
            .with_property("proguard", options.proguard.to_string())
            .with_property("optimize.level", options.level.to_string());
        Ok(self.run(request).await)
    }

    /// Package and sign with the given keystore.
    pub async fn sign_extension(
        &self,
        request: BuildRequest,
        options: SigningOptions,
    ) -> Result<BuildResult, BuildError> {
        let descriptor = self.check_preconditions(&request)?;
        if !options.keystore.is_file() {
            return Err(BuildError::Precondition(format!(
                "Keystore not found: {}",
                options.keystore.display()
            )));
        }
        if options.alias.trim().is_empty() {
            return Err(BuildError::Precondition(
                "Keystore alias must not be empty".to_string(),
            ));
        }
        self.require_target(&descriptor, SIGNED_TARGET)?;

        // The toolchain runs from the project root; pass an absolute keystore path.
        let keystore = std::fs::canonicalize(&options.keystore)?;
        let mut request = request
            .with_target(SIGNED_TARGET)
            .with_property("keystore.path", keystore.to_string_lossy())
            .with_property("keystore.alias", options.alias);
        if let Some(password) = options.store_password {
            request = request.with_property("keystore.password", password);
        }
        if let Some(password) = options.key_password {
            request = request.with_property("key.password", password);
        }
        Ok(self.run(request).await)
    }

    /// Project directory and build descriptor must exist. Returns the descriptor path.
    fn check_preconditions(&self, request: &BuildRequest) -> Result<PathBuf, BuildError> {
        let project = &request.project_path;
        if !project.is_dir() {
            return Err(BuildError::Precondition(format!(
                "Project directory not found: {}",
                project.display()
            )));
        }

        let descriptor = self.config.descriptor_path(project);
        if !descriptor.is_file() {
            return Err(BuildError::Precondition(format!(
                "Build descriptor not found: {}",
                descriptor.display()
            )));
        }
        Ok(descriptor)
    }

    fn require_target(&self, descriptor: &Path, target: &str) -> Result<(), BuildError> {
        let text = std::fs::read_to_string(descriptor)?;
        if !rules::declares_target(&text, target) {
            return Err(BuildError::Precondition(format!(
                "{} does not declare a '{}' target",
                self.config.descriptor_file, target
            )));
        }
        Ok(())
    }

    /// Steps after the preconditions: always yields a result, recorded in history.
    async fn run(&self, request: BuildRequest) -> BuildResult {
        let _project_guard = lock::lock_project(&request.project_path).await;
        let started = Instant::now();
        let mut attempt = BuildAttempt::start();

        log::info!(
            "[Build] [START] target '{}' in {}",
            request.target,
            request.project_path.display()
        );

        let outcome = self.drive(&request, &mut attempt).await;
        let duration = started.elapsed();

        let result = match outcome {
            Ok(completed) => {
                log::info!(
                    "[Build] [SUCCESS] '{}' finished in {} ms{}",
                    request.target,
                    duration.as_millis(),
                    completed
                        .artifact
                        .as_ref()
                        .map(|a| format!(": {} ({})", a.name, a.size_formatted))
                        .unwrap_or_default()
                );
                BuildResult {
                    project_path: request.project_path.clone(),
                    target: request.target.clone(),
                    success: true,
                    artifact: completed.artifact,
                    duration,
                    output: completed.output,
                    error: None,
                }
            }
            Err(failure) => {
                attempt.fail(failure.message.clone());
                self.emit(BuildEvent::PhaseChanged(BuildPhaseState::Failed));
                log::error!("[Build] [FAILED] '{}': {}", request.target, failure.message);
                BuildResult {
                    project_path: request.project_path.clone(),
                    target: request.target.clone(),
                    success: false,
                    artifact: None,
                    duration,
                    output: failure.output,
                    error: Some(failure.message),
                }
            }
        };

        if self.record_history {
            HistoryStore::for_project(&request.project_path, &self.config)
                .record(&result)
                .await;
        }
        result
    }

    async fn drive(
        &self,
        request: &BuildRequest,
        attempt: &mut BuildAttempt,
    ) -> Result<Completed, Failure> {
        let project = request.project_path.as_path();

        if request.clean {
            self.advance(attempt, BuildPhaseState::Cleaning)?;
            executor::clean_outputs(&self.config, project)
                .map_err(|e| Failure::new(format!("Failed to clean build outputs: {}", e)))?;
        }

        self.advance(attempt, BuildPhaseState::Preparing)?;
        executor::ensure_output_dirs(&self.config, project)
            .map_err(|e| Failure::new(format!("Failed to create output directories: {}", e)))?;

        self.advance(attempt, BuildPhaseState::Invoking)?;
        let invocation = executor::toolchain_invocation(
            &self.config,
            project,
            &request.target,
            &request.property_args(),
            request.verbose,
        );
        let output = executor::run_target(&self.runner, &invocation, self.events.as_ref())
            .await?
            .combined();

        let artifact = if request.skip_artifact_discovery {
            None
        } else {
            let dist = self.config.dist_path(project);
            match artifact::discover_artifact(
                &dist,
                &self.config.artifact_suffix,
                self.config.artifact_policy,
            ) {
                Ok(Some(found)) => Some(found),
                Ok(None) => {
                    return Err(Failure {
                        message: format!(
                            "Build completed but no {} artifact was found in {}",
                            self.config.artifact_suffix,
                            dist.display()
                        ),
                        output,
                    })
                }
                Err(message) => return Err(Failure { message, output }),
            }
        };

        self.advance(attempt, BuildPhaseState::Succeeded)?;
        Ok(Completed { output, artifact })
    }

    fn advance(&self, attempt: &mut BuildAttempt, next: BuildPhaseState) -> Result<(), Failure> {
        attempt
            .transition_to(next)
            .map_err(|e| Failure::new(e.to_string()))?;
        log::info!(target: PROGRESS_TARGET, "[Build] PHASE TRANSITION: {}", next.as_str());
        self.emit(BuildEvent::PhaseChanged(next));
        Ok(())
    }

    fn emit(&self, event: BuildEvent) {
        if let Some(ref tx) = self.events {
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const DESCRIPTOR: &str = r#"<project name="demo">
  <property name="src.dir" value="src"/>
  <target name="clean"/>
  <target name="compile"/>
  <target name="package"/>
  <target name="test-coverage"/>
</project>"#;

    #[tokio::test]
    async fn test_missing_project_is_precondition_error() {
        let dir = tempdir().unwrap();
        let orchestrator = BuildOrchestrator::new(BuilderConfig::default()).without_history();
        let err = orchestrator
            .build_extension(BuildRequest::new(dir.path().join("absent")))
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::Precondition(_)));
    }

    #[tokio::test]
    async fn test_missing_descriptor_is_precondition_error() {
        let dir = tempdir().unwrap();
        let orchestrator = BuildOrchestrator::new(BuilderConfig::default());
        let err = orchestrator
            .build_extension(BuildRequest::new(dir.path()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Build descriptor not found"));
        // Nothing reached the toolchain, so nothing is recorded.
        assert!(!dir.path().join(".build_history.json").exists());
    }

    #[tokio::test]
    async fn test_specialization_requires_declared_target() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("build.xml"), DESCRIPTOR).unwrap();
        let orchestrator = BuildOrchestrator::new(BuilderConfig::default()).without_history();

        let err = orchestrator
            .build_optimized(BuildRequest::new(dir.path()), OptimizeOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("package-optimized"));
    }

    #[tokio::test]
    async fn test_optimize_level_is_bounded() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("build.xml"), DESCRIPTOR).unwrap();
        let orchestrator = BuildOrchestrator::new(BuilderConfig::default()).without_history();

        let err = orchestrator
            .build_optimized(
                BuildRequest::new(dir.path()),
                OptimizeOptions {
                    proguard: true,
                    level: 4,
                },
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("between 0 and 3"));
    }

    #[tokio::test]
    async fn test_signing_requires_keystore_and_alias() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("build.xml"), DESCRIPTOR).unwrap();
        let orchestrator = BuildOrchestrator::new(BuilderConfig::default()).without_history();

        let missing = SigningOptions {
            keystore: dir.path().join("release.keystore"),
            alias: "release".to_string(),
            store_password: None,
            key_password: None,
        };
        let err = orchestrator
            .sign_extension(BuildRequest::new(dir.path()), missing.clone())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Keystore not found"));

        std::fs::write(dir.path().join("release.keystore"), b"ks").unwrap();
        let blank_alias = SigningOptions {
            alias: "  ".to_string(),
            ..missing
        };
        let err = orchestrator
            .sign_extension(BuildRequest::new(dir.path()), blank_alias)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("alias"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spawn_failure_is_failed_result() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("build.xml"), DESCRIPTOR).unwrap();
        let config = BuilderConfig {
            toolchain_command: dir.path().join("no-such-ant").to_string_lossy().into_owned(),
            ..BuilderConfig::default()
        };
        let (tx, mut rx) = mpsc::unbounded_channel();
        let orchestrator = BuildOrchestrator::new(config).with_events(tx);

        let result = orchestrator
            .build_extension(BuildRequest::new(dir.path()))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("Failed to start"));

        let mut phases = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let BuildEvent::PhaseChanged(phase) = event {
                phases.push(phase);
            }
        }
        assert_eq!(
            phases,
            vec![
                BuildPhaseState::Preparing,
                BuildPhaseState::Invoking,
                BuildPhaseState::Failed
            ]
        );

        let history = HistoryStore::for_project(dir.path(), orchestrator.config()).load();
        assert_eq!(history.len(), 1);
        assert!(!history[0].success);
    }
}

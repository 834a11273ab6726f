//! End-to-end builds against a fake toolchain.

#![cfg(unix)]

mod common;

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use aix_builder::orchestrator::executor;
use aix_builder::{
    BuildError, BuildEvent, BuildOrchestrator, BuildPhaseState, BuildRequest, BuilderConfig,
    HistoryStore, OptimizeOptions, ProgressEvent, SigningOptions,
};
use tempfile::tempdir;
use tokio::sync::mpsc;

#[tokio::test]
async fn test_successful_build_streams_events_and_finds_artifact() {
    let tools = tempdir().unwrap();
    let project = tempdir().unwrap();
    common::scaffold_project(project.path());

    let (tx, mut rx) = mpsc::unbounded_channel();
    let orchestrator = BuildOrchestrator::new(common::fake_config(tools.path())).with_events(tx);
    let result = orchestrator
        .build_extension(BuildRequest::new(project.path()))
        .await
        .unwrap();
    drop(orchestrator);

    assert!(result.success, "build failed: {:?}", result.error);
    let artifact = result.artifact.as_ref().expect("artifact discovered");
    assert_eq!(artifact.name, "com.example.Widget.aix");
    assert_eq!(artifact.size, 2);
    assert!(result.output.contains("BUILD SUCCESSFUL"));

    let mut phases = Vec::new();
    let mut progress = Vec::new();
    while let Some(event) = rx.recv().await {
        match event {
            BuildEvent::PhaseChanged(phase) => phases.push(phase),
            BuildEvent::Progress(event) => progress.push(event),
            BuildEvent::Output(_) => {}
        }
    }
    assert_eq!(
        phases,
        vec![
            BuildPhaseState::Preparing,
            BuildPhaseState::Invoking,
            BuildPhaseState::Succeeded
        ]
    );
    assert_eq!(progress.len(), 3);
    assert_eq!(progress[0], ProgressEvent::CompilationStarted { file_count: 2 });
    assert!(matches!(progress[1], ProgressEvent::ArtifactPackaged { .. }));
    assert!(matches!(progress[2], ProgressEvent::BuildCompleted { .. }));

    let history = HistoryStore::for_project(project.path(), &BuilderConfig::default()).load();
    assert_eq!(history.len(), 1);
    assert!(history[0].success);
    assert_eq!(
        history[0].artifact.as_ref().map(|a| a.name.as_str()),
        Some("com.example.Widget.aix")
    );
}

#[tokio::test]
async fn test_toolchain_failure_is_recorded_not_raised() {
    let tools = tempdir().unwrap();
    let project = tempdir().unwrap();
    common::scaffold_project(project.path());

    let orchestrator = BuildOrchestrator::new(common::fake_config(tools.path()));
    let result = orchestrator
        .build_extension(BuildRequest::new(project.path()).with_target("no-such-target"))
        .await
        .unwrap();

    assert!(!result.success);
    assert!(result.artifact.is_none());
    let error = result.error.unwrap();
    assert!(error.contains("BUILD FAILED"), "{}", error);

    let history = HistoryStore::for_project(project.path(), orchestrator.config()).load();
    assert_eq!(history.len(), 1);
    assert!(!history[0].success);
    assert!(history[0].output_excerpt.contains("BUILD FAILED"));
}

#[tokio::test]
async fn test_missing_descriptor_is_precondition_error() {
    let tools = tempdir().unwrap();
    let project = tempdir().unwrap();

    let orchestrator = BuildOrchestrator::new(common::fake_config(tools.path()));
    let err = orchestrator
        .build_extension(BuildRequest::new(project.path()))
        .await
        .unwrap_err();
    assert!(matches!(err, BuildError::Precondition(_)));
    assert!(common::invocations(project.path()).is_empty());
}

#[tokio::test]
async fn test_clean_twice_is_idempotent() {
    let project = tempdir().unwrap();
    let config = BuilderConfig::default();
    fs::create_dir_all(config.build_path(project.path()).join("classes")).unwrap();
    fs::create_dir_all(config.dist_path(project.path())).unwrap();
    fs::write(config.dist_path(project.path()).join("old.aix"), b"stale").unwrap();

    for _ in 0..2 {
        executor::clean_outputs(&config, project.path()).unwrap();
        executor::ensure_output_dirs(&config, project.path()).unwrap();
        for dir in [config.build_path(project.path()), config.dist_path(project.path())] {
            assert_eq!(fs::read_dir(&dir).unwrap().count(), 0, "{} not empty", dir.display());
        }
    }
}

#[tokio::test]
async fn test_clean_build_twice_succeeds() {
    let tools = tempdir().unwrap();
    let project = tempdir().unwrap();
    common::scaffold_project(project.path());
    let orchestrator = BuildOrchestrator::new(common::fake_config(tools.path()));

    for _ in 0..2 {
        let result = orchestrator
            .build_extension(BuildRequest::new(project.path()).with_clean(true))
            .await
            .unwrap();
        assert!(result.success, "{:?}", result.error);
    }
    assert_eq!(orchestrator.config().history_limit, 50);
    assert_eq!(
        HistoryStore::for_project(project.path(), orchestrator.config())
            .load()
            .len(),
        2
    );
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_timeout_leaves_no_process_behind() {
    let tools = tempdir().unwrap();
    let project = tempdir().unwrap();
    common::scaffold_project(project.path());

    let script = r#"echo $$ > "$PWD/shell.pid"
sleep 30 &
echo $! > "$PWD/child.pid"
wait"#;
    let config = BuilderConfig {
        toolchain_command: common::write_script(tools.path(), "hanging-ant", script)
            .to_string_lossy()
            .into_owned(),
        build_timeout_ms: 500,
        ..BuilderConfig::default()
    };

    let started = Instant::now();
    let result = BuildOrchestrator::new(config)
        .build_extension(BuildRequest::new(project.path()))
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(!result.success);
    assert!(result.error.unwrap().contains("timed out after 500 ms"));

    for pid_file in ["shell.pid", "child.pid"] {
        let pid: i32 = fs::read_to_string(project.path().join(pid_file))
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        assert!(!common::process_alive(pid), "{} ({}) survived the timeout", pid_file, pid);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_builds_on_one_project_are_serialized() {
    let tools = tempdir().unwrap();
    let project = tempdir().unwrap();
    common::scaffold_project(project.path());

    let script = r#"echo "start $$" >> "$PWD/order.log"
sleep 0.3
mkdir -p dist
printf 'PK' > dist/out.aix
echo "end $$" >> "$PWD/order.log""#;
    let config = BuilderConfig {
        toolchain_command: common::write_script(tools.path(), "slow-ant", script)
            .to_string_lossy()
            .into_owned(),
        ..BuilderConfig::default()
    };
    let orchestrator = BuildOrchestrator::new(config);

    let first = orchestrator.clone();
    let second = orchestrator.clone();
    let path_a: PathBuf = project.path().to_path_buf();
    let path_b = path_a.clone();
    let (a, b) = tokio::join!(
        tokio::spawn(async move { first.build_extension(BuildRequest::new(path_a)).await }),
        tokio::spawn(async move { second.build_extension(BuildRequest::new(path_b)).await }),
    );
    assert!(a.unwrap().unwrap().success);
    assert!(b.unwrap().unwrap().success);

    let log = fs::read_to_string(project.path().join("order.log")).unwrap();
    let kinds: Vec<&str> = log.lines().map(|l| l.split(' ').next().unwrap()).collect();
    assert_eq!(kinds, vec!["start", "end", "start", "end"]);

    let history = HistoryStore::for_project(project.path(), orchestrator.config()).load();
    assert_eq!(history.len(), 2);
}

#[tokio::test]
async fn test_coverage_build_passes_flag_and_skips_discovery() {
    let tools = tempdir().unwrap();
    let project = tempdir().unwrap();
    common::scaffold_project(project.path());

    let result = BuildOrchestrator::new(common::fake_config(tools.path()))
        .build_with_coverage(BuildRequest::new(project.path()))
        .await
        .unwrap();
    assert!(result.success, "{:?}", result.error);
    assert!(result.artifact.is_none());
    assert_eq!(result.target, "test-coverage");
    assert_eq!(
        common::invocations(project.path()),
        vec!["test-coverage -Dcoverage.enabled=true"]
    );
}

#[tokio::test]
async fn test_optimized_build_passes_properties() {
    let tools = tempdir().unwrap();
    let project = tempdir().unwrap();
    common::scaffold_project(project.path());

    let result = BuildOrchestrator::new(common::fake_config(tools.path()))
        .build_optimized(
            BuildRequest::new(project.path()),
            OptimizeOptions {
                proguard: true,
                level: 2,
            },
        )
        .await
        .unwrap();
    assert!(result.success, "{:?}", result.error);
    assert_eq!(
        common::invocations(project.path()),
        vec!["package-optimized -Doptimize=true -Doptimize.level=2 -Dproguard=true"]
    );
}

#[tokio::test]
async fn test_signed_build_passes_keystore() {
    let tools = tempdir().unwrap();
    let project = tempdir().unwrap();
    common::scaffold_project(project.path());
    let keystore = tools.path().join("release.keystore");
    fs::write(&keystore, b"keystore").unwrap();

    let result = BuildOrchestrator::new(common::fake_config(tools.path()))
        .sign_extension(
            BuildRequest::new(project.path()),
            SigningOptions {
                keystore: keystore.clone(),
                alias: "release".to_string(),
                store_password: Some("s3cret".to_string()),
                key_password: None,
            },
        )
        .await
        .unwrap();
    assert!(result.success, "{:?}", result.error);

    let calls = common::invocations(project.path());
    assert_eq!(calls.len(), 1);
    let call = &calls[0];
    assert!(call.starts_with("package-signed "));
    assert!(call.contains("-Dkeystore.alias=release"));
    assert!(call.contains("-Dkeystore.password=s3cret"));
    assert!(call.contains(&format!(
        "-Dkeystore.path={}",
        fs::canonicalize(&keystore).unwrap().display()
    )));
    assert!(!call.contains("key.password"));
}

#[tokio::test]
async fn test_ambiguous_artifacts_fail_the_build() {
    let tools = tempdir().unwrap();
    let project = tempdir().unwrap();
    common::scaffold_project(project.path());
    fs::create_dir_all(project.path().join("dist")).unwrap();
    fs::write(project.path().join("dist").join("aaa-old.aix"), b"old").unwrap();

    let result = BuildOrchestrator::new(common::fake_config(tools.path()))
        .build_extension(BuildRequest::new(project.path()))
        .await
        .unwrap();
    assert!(!result.success);
    let error = result.error.unwrap();
    assert!(error.contains("Ambiguous artifact"), "{}", error);
    assert!(error.contains("aaa-old.aix, com.example.Widget.aix"));
}

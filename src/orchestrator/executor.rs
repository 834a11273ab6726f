//! Toolchain target execution shared by builds and validation dry-runs.
//!
//! Integrates with the unified logging pipeline:
//! - raw toolchain lines go to the `toolchain` log target
//! - recognised milestones go to the `progress` target (the parsed log)
//! - both are forwarded to the caller's `BuildEvent` channel, in order

use crate::config::BuilderConfig;
use crate::error::ProcessError;
use crate::log_collector::{PROGRESS_TARGET, TOOLCHAIN_TARGET};
use crate::models::BuildEvent;
use crate::orchestrator::progress::ProgressParser;
use crate::system::{Invocation, OutputChunk, ProcessOutput, ProcessRunner, StreamKind};
use std::io;
use std::path::Path;
use tokio::sync::mpsc;

/// Remove the build and distribution directories. Absent directories are fine.
pub fn clean_outputs(config: &BuilderConfig, project: &Path) -> io::Result<()> {
    for dir in [config.build_path(project), config.dist_path(project)] {
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => log::info!("[Build] [CLEAN] Removed {}", dir.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Create the build and distribution directories if missing.
pub fn ensure_output_dirs(config: &BuilderConfig, project: &Path) -> io::Result<()> {
    std::fs::create_dir_all(config.build_path(project))?;
    std::fs::create_dir_all(config.dist_path(project))?;
    Ok(())
}

/// `<tool> <target> [-Dname=value ...]`, run from the project root.
pub fn toolchain_invocation(
    config: &BuilderConfig,
    project: &Path,
    target: &str,
    property_args: &[String],
    verbose: bool,
) -> Invocation {
    let mut invocation = Invocation::new(&config.toolchain_command, project, config.build_timeout())
        .arg(target)
        .args(property_args.iter().cloned());
    if verbose {
        invocation = invocation.arg("-verbose");
    }
    invocation
}

/// Run one toolchain target, streaming its output through the progress parser.
///
/// Every complete output line is logged; every recognised milestone is logged
/// to the parsed log and sent to `events` as `BuildEvent::Progress`. Raw
/// chunks are sent as `BuildEvent::Output` before the events they complete.
pub async fn run_target(
    runner: &ProcessRunner,
    invocation: &Invocation,
    events: Option<&mpsc::UnboundedSender<BuildEvent>>,
) -> Result<ProcessOutput, ProcessError> {
    log::info!("[Build] [INVOKE] {}", invocation.display_redacted());

    let (chunk_tx, mut chunk_rx) = mpsc::unbounded_channel::<OutputChunk>();
    let execution = runner.execute_streaming(invocation, Some(chunk_tx));

    let consume = async {
        let mut stdout = StreamState::default();
        let mut stderr = StreamState::default();
        while let Some(chunk) = chunk_rx.recv().await {
            if let Some(tx) = events {
                let _ = tx.send(BuildEvent::Output(chunk.text.clone()));
            }
            let state = match chunk.stream {
                StreamKind::Stdout => &mut stdout,
                StreamKind::Stderr => &mut stderr,
            };
            state.feed(&chunk.text, events);
        }
        stdout.finish(events);
        stderr.finish(events);
    };

    // The sender is dropped when execution returns, which ends the consumer.
    let (result, ()) = tokio::join!(execution, consume);
    result
}

/// Line splitting and progress parsing for one output stream.
#[derive(Default)]
struct StreamState {
    parser: ProgressParser,
    line: String,
}

impl StreamState {
    fn feed(&mut self, text: &str, events: Option<&mpsc::UnboundedSender<BuildEvent>>) {
        for event in self.parser.feed(text) {
            emit_progress(event, events);
        }

        self.line.push_str(text);
        while let Some(pos) = self.line.find('\n') {
            let line: String = self.line.drain(..=pos).collect();
            log_toolchain_line(&line);
        }
    }

    fn finish(&mut self, events: Option<&mpsc::UnboundedSender<BuildEvent>>) {
        for event in self.parser.finish() {
            emit_progress(event, events);
        }
        if !self.line.is_empty() {
            log_toolchain_line(&std::mem::take(&mut self.line));
        }
    }
}

fn log_toolchain_line(line: &str) {
    let line = line.trim_end_matches(['\n', '\r']);
    if !line.is_empty() {
        log::debug!(target: TOOLCHAIN_TARGET, "{}", line);
    }
}

fn emit_progress(
    event: crate::models::ProgressEvent,
    events: Option<&mpsc::UnboundedSender<BuildEvent>>,
) {
    log::info!(target: PROGRESS_TARGET, "[Build] [PROGRESS] {}", event);
    if let Some(tx) = events {
        let _ = tx.send(BuildEvent::Progress(event));
    }
}

//! Toolchain subprocess execution: spawn, stream, timeout, forced termination.
//!
//! Every child is started in its own process group. When the timeout elapses
//! or the cancellation signal fires, the whole group is sent SIGKILL and the
//! direct child is reaped before the error is returned, so no process of the
//! group outlives `execute`.

use crate::error::ProcessError;
use crate::models::tail_chars;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

/// Characters of diagnostic text kept in an exit error.
const DIAGNOSTIC_TAIL_CHARS: usize = 2000;

const READ_BUFFER_SIZE: usize = 8 * 1024;

/// A fully described subprocess invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub workdir: PathBuf,
    /// Added on top of the inherited parent environment
    pub env: Vec<(String, String)>,
    pub timeout: Duration,
}

impl Invocation {
    pub fn new(program: impl Into<String>, workdir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Invocation {
            program: program.into(),
            args: Vec::new(),
            workdir: workdir.into(),
            env: Vec::new(),
            timeout,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Command line for log lines, with values of password definitions hidden.
    pub fn display_redacted(&self) -> String {
        let mut parts = vec![self.program.clone()];
        for arg in &self.args {
            match arg.split_once('=') {
                Some((key, _)) if key.to_ascii_lowercase().contains("password") => {
                    parts.push(format!("{}=********", key));
                }
                _ => parts.push(arg.clone()),
            }
        }
        parts.join(" ")
    }
}

/// Which pipe a chunk came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// A raw piece of subprocess output, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputChunk {
    pub stream: StreamKind,
    pub text: String,
}

/// Captured output of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ProcessOutput {
    /// stdout followed by stderr.
    pub fn combined(&self) -> String {
        join_output(&self.stdout, &self.stderr)
    }
}

/// Spawns toolchain commands with a hard timeout and optional cancellation.
#[derive(Clone, Default)]
pub struct ProcessRunner {
    cancel_rx: Option<watch::Receiver<bool>>,
}

impl ProcessRunner {
    pub fn new() -> Self {
        ProcessRunner { cancel_rx: None }
    }

    /// Runner whose waits are aborted once `cancel_rx` observes `true`.
    pub fn with_cancellation(cancel_rx: watch::Receiver<bool>) -> Self {
        ProcessRunner {
            cancel_rx: Some(cancel_rx),
        }
    }

    /// Run to completion and return captured output.
    pub async fn execute(&self, invocation: &Invocation) -> Result<ProcessOutput, ProcessError> {
        self.execute_streaming(invocation, None).await
    }

    /// Run to completion, forwarding every output chunk to `sink` as it arrives.
    pub async fn execute_streaming(
        &self,
        invocation: &Invocation,
        sink: Option<mpsc::UnboundedSender<OutputChunk>>,
    ) -> Result<ProcessOutput, ProcessError> {
        let program = invocation.program.clone();
        log::debug!(
            "[Process] [SPAWN] {} (cwd={}, timeout={} ms)",
            invocation.display_redacted(),
            invocation.workdir.display(),
            invocation.timeout.as_millis()
        );

        let mut child = spawn(invocation)?;
        let pid = child.id();
        let deadline = Instant::now() + invocation.timeout;
        let mut cancel_rx = self.cancel_rx.clone();

        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();
        let mut stdout_bytes: Vec<u8> = Vec::new();
        let mut stderr_bytes: Vec<u8> = Vec::new();
        let mut out_buf = vec![0u8; READ_BUFFER_SIZE];
        let mut err_buf = vec![0u8; READ_BUFFER_SIZE];
        let mut out_text = Utf8Carry::default();
        let mut err_text = Utf8Carry::default();

        // Drain both pipes until they close; the child may still be running afterwards.
        while stdout.is_some() || stderr.is_some() {
            let event = tokio::select! {
                read = read_some(&mut stdout, &mut out_buf), if stdout.is_some() => {
                    Supervision::Read(StreamKind::Stdout, read)
                }
                read = read_some(&mut stderr, &mut err_buf), if stderr.is_some() => {
                    Supervision::Read(StreamKind::Stderr, read)
                }
                _ = tokio::time::sleep_until(deadline) => Supervision::TimedOut,
                _ = cancelled(&mut cancel_rx) => Supervision::Cancelled,
            };

            match event {
                Supervision::Read(kind, Ok(n)) if n > 0 => {
                    let (buf, bytes, carry) = match kind {
                        StreamKind::Stdout => (&out_buf, &mut stdout_bytes, &mut out_text),
                        StreamKind::Stderr => (&err_buf, &mut stderr_bytes, &mut err_text),
                    };
                    bytes.extend_from_slice(&buf[..n]);
                    forward(&sink, kind, carry.push(&buf[..n]));
                }
                Supervision::Read(kind, read) => {
                    match read {
                        Ok(_) => log::trace!("[Process] [INFO] {:?} closed", kind),
                        Err(e) => log::warn!(
                            "[Process] [WARNING] {:?} read error for '{}': {}",
                            kind,
                            program,
                            e
                        ),
                    }
                    let carry = match kind {
                        StreamKind::Stdout => {
                            stdout = None;
                            &mut out_text
                        }
                        StreamKind::Stderr => {
                            stderr = None;
                            &mut err_text
                        }
                    };
                    forward(&sink, kind, carry.finish());
                }
                Supervision::TimedOut => {
                    terminate(&mut child, pid).await;
                    log::warn!(
                        "[Process] [TIMEOUT] '{}' exceeded {} ms, process group killed",
                        program,
                        invocation.timeout.as_millis()
                    );
                    return Err(ProcessError::Timeout {
                        program,
                        timeout: invocation.timeout,
                        pid,
                        output: join_bytes(&stdout_bytes, &stderr_bytes),
                    });
                }
                Supervision::Cancelled => {
                    terminate(&mut child, pid).await;
                    log::warn!("[Process] [CANCEL] '{}' cancelled, process group killed", program);
                    return Err(ProcessError::Cancelled {
                        program,
                        output: join_bytes(&stdout_bytes, &stderr_bytes),
                    });
                }
            }
        }

        let waited = tokio::select! {
            status = child.wait() => Waited::Exited(status),
            _ = tokio::time::sleep_until(deadline) => Waited::TimedOut,
            _ = cancelled(&mut cancel_rx) => Waited::Cancelled,
        };

        let stdout_text = String::from_utf8_lossy(&stdout_bytes).into_owned();
        let stderr_text = String::from_utf8_lossy(&stderr_bytes).into_owned();

        let status = match waited {
            Waited::Exited(Ok(status)) => status,
            Waited::Exited(Err(source)) => {
                terminate(&mut child, pid).await;
                return Err(ProcessError::Io { program, source });
            }
            Waited::TimedOut => {
                terminate(&mut child, pid).await;
                log::warn!(
                    "[Process] [TIMEOUT] '{}' exceeded {} ms after closing its output",
                    program,
                    invocation.timeout.as_millis()
                );
                return Err(ProcessError::Timeout {
                    program,
                    timeout: invocation.timeout,
                    pid,
                    output: join_output(&stdout_text, &stderr_text),
                });
            }
            Waited::Cancelled => {
                terminate(&mut child, pid).await;
                return Err(ProcessError::Cancelled {
                    program,
                    output: join_output(&stdout_text, &stderr_text),
                });
            }
        };

        // The leader is gone; reap anything it left behind in its group.
        kill_group(pid);

        finish(program, status, stdout_text, stderr_text)
    }
}

/// Run `<program> -version` and return everything it printed.
///
/// Java writes its version banner to stderr, so both streams are returned.
pub async fn query_version(
    runner: &ProcessRunner,
    program: &str,
    workdir: &Path,
    timeout: Duration,
) -> Result<String, ProcessError> {
    let invocation = Invocation::new(program, workdir, timeout).arg("-version");
    let output = runner.execute(&invocation).await?;
    Ok(output.combined())
}

/// Decodes a byte stream chunk by chunk without splitting multi-byte characters.
///
/// An incomplete sequence at the end of a chunk is held back until the next
/// chunk completes it; invalid bytes become U+FFFD.
#[derive(Debug, Default)]
struct Utf8Carry {
    pending: Vec<u8>,
}

impl Utf8Carry {
    fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut text = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(valid) => {
                    text.push_str(valid);
                    self.pending.clear();
                    return text;
                }
                Err(e) => {
                    let valid_up_to = e.valid_up_to();
                    text.push_str(&String::from_utf8_lossy(&self.pending[..valid_up_to]));
                    match e.error_len() {
                        // Truncated sequence: wait for the rest.
                        None => {
                            self.pending.drain(..valid_up_to);
                            return text;
                        }
                        Some(len) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid_up_to + len);
                        }
                    }
                }
            }
        }
    }

    /// Whatever is still held back, decoded lossily.
    fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }
}

fn forward(sink: &Option<mpsc::UnboundedSender<OutputChunk>>, stream: StreamKind, text: String) {
    if text.is_empty() {
        return;
    }
    if let Some(tx) = sink {
        let _ = tx.send(OutputChunk { stream, text });
    }
}

enum Supervision {
    Read(StreamKind, std::io::Result<usize>),
    TimedOut,
    Cancelled,
}

enum Waited {
    Exited(std::io::Result<ExitStatus>),
    TimedOut,
    Cancelled,
}

fn spawn(invocation: &Invocation) -> Result<Child, ProcessError> {
    let mut command = Command::new(&invocation.program);
    command
        .args(&invocation.args)
        .current_dir(&invocation.workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    for (key, value) in &invocation.env {
        command.env(key, value);
    }

    #[cfg(unix)]
    command.process_group(0);

    command.spawn().map_err(|source| {
        log::error!(
            "[Process] [FAILED] Could not start '{}' in {}: {}",
            invocation.program,
            invocation.workdir.display(),
            source
        );
        ProcessError::Spawn {
            program: invocation.program.clone(),
            source,
        }
    })
}

async fn read_some<R>(reader: &mut Option<R>, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    match reader.as_mut() {
        Some(reader) => reader.read(buf).await,
        None => std::future::pending().await,
    }
}

/// Resolves once the cancellation flag becomes `true`; never resolves without a receiver.
async fn cancelled(cancel_rx: &mut Option<watch::Receiver<bool>>) {
    let Some(rx) = cancel_rx.as_mut() else {
        return std::future::pending().await;
    };
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            // Sender dropped without cancelling: nothing can cancel us anymore.
            return std::future::pending().await;
        }
    }
}

/// SIGKILL the whole process group, then kill and reap the direct child.
async fn terminate(child: &mut Child, pid: Option<u32>) {
    kill_group(pid);
    if let Err(e) = child.kill().await {
        log::debug!("[Process] [KILL] Direct kill failed (already exited?): {}", e);
    }
    let _ = child.wait().await;
}

#[cfg(unix)]
fn kill_group(pid: Option<u32>) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = pid {
        match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            Ok(()) => log::trace!("[Process] [KILL] SIGKILL sent to process group {}", pid),
            // ESRCH: the group is already empty
            Err(nix::errno::Errno::ESRCH) => {}
            Err(e) => log::debug!("[Process] [KILL] killpg({}) failed: {}", pid, e),
        }
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: Option<u32>) {}

fn finish(
    program: String,
    status: ExitStatus,
    stdout: String,
    stderr: String,
) -> Result<ProcessOutput, ProcessError> {
    if status.success() {
        log::debug!("[Process] [SUCCESS] '{}' exited with status 0", program);
        return Ok(ProcessOutput {
            stdout,
            stderr,
            exit_code: 0,
        });
    }

    let diagnostic_source = if stderr.trim().is_empty() { &stdout } else { &stderr };
    let diagnostic = tail_chars(diagnostic_source.trim_end(), DIAGNOSTIC_TAIL_CHARS).to_string();
    log::warn!(
        "[Process] [FAILED] '{}' exited with {:?}",
        program,
        status.code()
    );
    Err(ProcessError::Exit {
        program,
        code: status.code(),
        diagnostic,
        output: join_output(&stdout, &stderr),
    })
}

fn join_output(stdout: &str, stderr: &str) -> String {
    match (stdout.is_empty(), stderr.is_empty()) {
        (_, true) => stdout.to_string(),
        (true, false) => stderr.to_string(),
        (false, false) if stdout.ends_with('\n') => format!("{}{}", stdout, stderr),
        (false, false) => format!("{}\n{}", stdout, stderr),
    }
}

fn join_bytes(stdout: &[u8], stderr: &[u8]) -> String {
    join_output(
        &String::from_utf8_lossy(stdout),
        &String::from_utf8_lossy(stderr),
    )
}

//! Agent process supervision
//!
//! Owns the lifecycle of exactly one external agent process: optional build
//! step, spawn, readiness detection on its output, termination and exit code
//! retrieval.
//!
//! ```text
//! Idle -> Starting -> Ready -> Stopping -> Terminated
//!            |          |                      ^
//!            +----------+----------------------+   (spawn failure, early exit, timeout)
//! ```

pub mod latch;
pub mod output;
mod signal;

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use crate::common::config::Config;
use crate::common::{parse_listen_address, Error, Result};

pub use latch::{ReadinessLatch, ReadinessWaiter, ReadySignal, StreamName};
pub use output::{OutputBuffer, OutputLine};

use output::{scan_lines, SharedOutput};

/// Reported when the OS gives no exit code (e.g. the process died from a signal)
pub const EXIT_CODE_UNKNOWN: i32 = -1000;

/// How long reader tasks may keep draining after the process has exited
const READER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Lifecycle state of a supervised process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Starting,
    Ready,
    Stopping,
    Terminated,
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SupervisorState::Idle => "idle",
            SupervisorState::Starting => "starting",
            SupervisorState::Ready => "ready",
            SupervisorState::Stopping => "stopping",
            SupervisorState::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// Shell command that must succeed before the agent is spawned
#[derive(Debug, Clone)]
pub struct BuildStep {
    pub command: String,
    pub working_dir: Option<PathBuf>,
}

impl BuildStep {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            working_dir: None,
        }
    }
}

/// What to run and how to recognise that it is ready
#[derive(Debug, Clone)]
pub struct SpawnSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    pub readiness_marker: Option<String>,
    pub build: Option<BuildStep>,
}

impl SpawnSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            env: Vec::new(),
            readiness_marker: None,
            build: None,
        }
    }

    /// Build a spec from the `[agent]` section of the configuration
    pub fn from_config(config: &Config) -> Self {
        let agent = &config.agent;
        Self {
            program: agent.program.clone(),
            args: agent.args.clone(),
            working_dir: agent.working_dir.clone(),
            env: Vec::new(),
            readiness_marker: config.readiness_marker().map(str::to_string),
            build: agent.build.clone().map(BuildStep::new),
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

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn readiness_marker(mut self, marker: impl Into<String>) -> Self {
        self.readiness_marker = Some(marker.into());
        self
    }

    pub fn build(mut self, step: BuildStep) -> Self {
        self.build = Some(step);
        self
    }

    /// The marker to wait for; an empty marker means "ready on spawn"
    fn marker(&self) -> Option<&str> {
        self.readiness_marker.as_deref().filter(|m| !m.is_empty())
    }
}

/// Bounds applied to waits and captured output
#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    /// Maximum time to wait for the readiness marker; None waits forever
    pub readiness_timeout: Option<Duration>,
    /// Time between the termination request and the forced kill
    pub stop_grace: Duration,
    /// Maximum number of output lines kept in memory
    pub max_buffered_lines: usize,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            readiness_timeout: Some(Duration::from_secs(60)),
            stop_grace: Duration::from_secs(10),
            max_buffered_lines: 10_000,
        }
    }
}

impl SupervisorOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            readiness_timeout: Some(config.timeouts.readiness()),
            stop_grace: config.timeouts.stop_grace(),
            max_buffered_lines: config.output.max_buffered_lines,
        }
    }
}

enum ReadyOutcome {
    Ready(ReadySignal),
    Exited(std::io::Result<ExitStatus>),
    TimedOut,
}

/// Supervisor for a single agent process
///
/// A supervisor is single use: `start` may be called once, `stop` once
/// after that.
pub struct Supervisor {
    spec: SpawnSpec,
    options: SupervisorOptions,
    state: SupervisorState,
    child: Option<Child>,
    pid: Option<u32>,
    exit_code: Option<i32>,
    readers: Vec<JoinHandle<()>>,
    output: SharedOutput,
    ready: Option<ReadySignal>,
}

impl Supervisor {
    pub fn new(spec: SpawnSpec, options: SupervisorOptions) -> Self {
        let output = Arc::new(Mutex::new(OutputBuffer::new(options.max_buffered_lines)));
        Self {
            spec,
            options,
            state: SupervisorState::Idle,
            child: None,
            pid: None,
            exit_code: None,
            readers: Vec::new(),
            output,
            ready: None,
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Exit code, defined once the supervisor is Terminated
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Whether a child process handle is held (Starting, Ready or Stopping)
    pub fn is_running(&self) -> bool {
        self.child.is_some()
    }

    pub fn spec(&self) -> &SpawnSpec {
        &self.spec
    }

    /// The line that satisfied the readiness marker, if any
    pub fn ready_signal(&self) -> Option<&ReadySignal> {
        self.ready.as_ref()
    }

    /// Address advertised on the readiness line ("... listening at <addr>")
    pub fn advertised_address(&self) -> Option<String> {
        self.ready
            .as_ref()
            .and_then(|signal| parse_listen_address(&signal.line))
    }

    /// Snapshot of the buffered output lines
    pub fn output(&self) -> Vec<OutputLine> {
        match self.output.lock() {
            Ok(buf) => buf.snapshot(),
            Err(poisoned) => poisoned.into_inner().snapshot(),
        }
    }

    /// Build (optionally), spawn and wait for readiness
    pub async fn start(&mut self) -> Result<()> {
        if self.state != SupervisorState::Idle {
            return Err(Error::illegal_state("start", self.state));
        }
        self.state = SupervisorState::Starting;
        let started = Instant::now();

        if let Some(build) = self.spec.build.clone() {
            if let Err(e) = self.run_build(&build).await {
                self.record_exit(EXIT_CODE_UNKNOWN);
                return Err(e);
            }
        }

        let mut child = match self.spawn_child() {
            Ok(child) => child,
            Err(e) => {
                self.record_exit(EXIT_CODE_UNKNOWN);
                return Err(e);
            }
        };

        let marker = self.spec.marker().map(str::to_string);
        let (latch, waiter) = ReadinessLatch::new();

        if let Some(stdout) = child.stdout.take() {
            self.readers.push(tokio::spawn(scan_lines(
                StreamName::Stdout,
                stdout,
                marker.clone(),
                latch.clone(),
                self.output.clone(),
            )));
        }
        if let Some(stderr) = child.stderr.take() {
            self.readers.push(tokio::spawn(scan_lines(
                StreamName::Stderr,
                stderr,
                marker.clone(),
                latch.clone(),
                self.output.clone(),
            )));
        }
        // Only the readers keep the latch alive from here on.
        drop(latch);

        self.pid = child.id();
        self.child = Some(child);
        tracing::info!(pid = ?self.pid, program = %self.spec.program.display(), "Agent spawned");

        let Some(marker) = marker else {
            self.state = SupervisorState::Ready;
            return Ok(());
        };

        tracing::debug!(marker = %marker, "Waiting for readiness marker");
        let outcome = self.wait_ready(waiter).await?;
        self.finish_start(outcome, started).await
    }

    async fn wait_ready(&mut self, mut waiter: ReadinessWaiter) -> Result<ReadyOutcome> {
        let timeout = self.options.readiness_timeout;
        let deadline = async move {
            match timeout {
                Some(duration) => tokio::time::sleep(duration).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);

        let child = self
            .child
            .as_mut()
            .ok_or_else(|| Error::Internal("process handle missing while starting".to_string()))?;
        let readers = &mut self.readers;

        let mut streams_closed = false;
        let outcome = loop {
            tokio::select! {
                signal = &mut waiter, if !streams_closed => match signal {
                    Ok(signal) => break ReadyOutcome::Ready(signal),
                    // Both streams hit EOF without the marker; only exit or timeout remain.
                    Err(_) => streams_closed = true,
                },
                status = child.wait() => {
                    let status = match status {
                        Ok(status) => status,
                        Err(e) => break ReadyOutcome::Exited(Err(e)),
                    };
                    // The marker may still be sitting in a pipe; let the readers drain.
                    drain_readers(readers).await;
                    if !streams_closed {
                        if let Ok(signal) = waiter.try_recv() {
                            break ReadyOutcome::Ready(signal);
                        }
                    }
                    break ReadyOutcome::Exited(Ok(status));
                },
                _ = &mut deadline => break ReadyOutcome::TimedOut,
            }
        };
        Ok(outcome)
    }

    async fn finish_start(&mut self, outcome: ReadyOutcome, started: Instant) -> Result<()> {
        match outcome {
            ReadyOutcome::Ready(signal) => {
                tracing::info!(
                    stream = signal.stream.as_str(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Agent ready"
                );
                self.ready = Some(signal);
                self.state = SupervisorState::Ready;
                Ok(())
            }
            ReadyOutcome::Exited(status) => {
                self.child = None;
                let code = match status {
                    Ok(status) => exit_code_of(status),
                    Err(e) => {
                        self.record_exit(EXIT_CODE_UNKNOWN);
                        return Err(Error::Io(e));
                    }
                };
                self.record_exit(code);
                tracing::warn!(code, "Agent exited before it became ready");
                Err(Error::ProcessExitedBeforeReady { code })
            }
            ReadyOutcome::TimedOut => {
                let timeout = self.options.readiness_timeout.unwrap_or_default();
                tracing::warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "Readiness marker not seen in time, terminating agent"
                );
                if let Some(child) = self.child.take() {
                    self.state = SupervisorState::Stopping;
                    // Exit code is recorded by shutdown; the timeout is what the caller needs.
                    let _ = self.shutdown(child).await;
                }
                self.state = SupervisorState::Terminated;
                Err(Error::ReadinessTimeout { timeout })
            }
        }
    }

    /// Request graceful termination and wait for the process to exit
    ///
    /// Escalates to a forced kill after the configured grace period.
    /// Returns the process exit code, or [`EXIT_CODE_UNKNOWN`].
    pub async fn stop(&mut self) -> Result<i32> {
        match self.state {
            SupervisorState::Ready | SupervisorState::Starting => {}
            state => return Err(Error::illegal_state("stop", state)),
        }
        // A start cancelled during the build step never spawned anything
        let Some(child) = self.child.take() else {
            self.record_exit(EXIT_CODE_UNKNOWN);
            return Err(Error::illegal_state("stop", "without a process handle"));
        };

        self.state = SupervisorState::Stopping;
        tracing::info!(pid = ?self.pid, "Stopping agent");
        let code = self.shutdown(child).await?;
        tracing::info!(code, "Agent stopped");
        Ok(code)
    }

    /// Non-blocking check for an unexpected exit while Ready
    ///
    /// Moves the supervisor to Terminated and returns the code if the process
    /// has died on its own.
    pub async fn poll_exit(&mut self) -> Result<Option<i32>> {
        let Some(child) = self.child.as_mut() else {
            return Ok(self.exit_code);
        };
        match child.try_wait()? {
            Some(status) => {
                self.child = None;
                self.join_readers().await;
                let code = exit_code_of(status);
                tracing::warn!(code, "Agent exited unexpectedly");
                self.record_exit(code);
                Ok(Some(code))
            }
            None => Ok(None),
        }
    }

    async fn shutdown(&mut self, mut child: Child) -> Result<i32> {
        let status = self.wait_for_exit(&mut child).await;
        self.join_readers().await;
        match status {
            Ok(status) => {
                let code = exit_code_of(status);
                self.record_exit(code);
                Ok(code)
            }
            Err(e) => {
                self.record_exit(EXIT_CODE_UNKNOWN);
                Err(Error::Io(e))
            }
        }
    }

    async fn wait_for_exit(&self, child: &mut Child) -> std::io::Result<ExitStatus> {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }

        if !signal::request_termination(child) {
            tracing::debug!("Termination request not delivered, waiting for exit");
        }

        match tokio::time::timeout(self.options.stop_grace, child.wait()).await {
            Ok(status) => status,
            Err(_) => {
                tracing::warn!(
                    grace_ms = self.options.stop_grace.as_millis() as u64,
                    "Agent ignored termination request, killing"
                );
                if let Err(e) = child.start_kill() {
                    tracing::debug!(error = %e, "Kill failed");
                }
                child.wait().await
            }
        }
    }

    async fn join_readers(&mut self) {
        drain_readers(&mut self.readers).await;
    }

    fn record_exit(&mut self, code: i32) {
        self.exit_code = Some(code);
        self.state = SupervisorState::Terminated;
    }

    async fn run_build(&self, build: &BuildStep) -> Result<()> {
        tracing::info!(command = %build.command, "Running build step");

        let mut cmd = shell_command(&build.command);
        if let Some(dir) = build.working_dir.as_ref().or(self.spec.working_dir.as_ref()) {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::null());

        let output = cmd.output().await.map_err(|e| {
            Error::SpawnFailed(format!("build step '{}' could not run: {}", build.command, e))
        })?;

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            tracing::debug!(target: "ubt_harness::agent", stream = "build", "{}", line);
        }
        for line in String::from_utf8_lossy(&output.stderr).lines() {
            tracing::debug!(target: "ubt_harness::agent", stream = "build", "{}", line);
        }

        if !output.status.success() {
            return Err(Error::build_failed(&build.command, exit_code_of(output.status)));
        }
        Ok(())
    }

    fn spawn_child(&self) -> Result<Child> {
        let mut cmd = Command::new(&self.spec.program);
        cmd.args(&self.spec.args)
            .envs(self.spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.spec.working_dir {
            cmd.current_dir(dir);
        }

        cmd.spawn().map_err(|e| {
            let program = self.spec.program.display();
            if e.kind() == std::io::ErrorKind::NotFound && !looks_like_path(&self.spec.program) {
                match which::which(&self.spec.program) {
                    Ok(found) => Error::SpawnFailed(format!("{} ({}): {}", program, found.display(), e)),
                    Err(_) => Error::SpawnFailed(format!("{}: not found in PATH", program)),
                }
            } else {
                Error::SpawnFailed(format!("{}: {}", program, e))
            }
        })
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        // Best-effort since we can't await in drop
        if let Some(child) = self.child.as_mut() {
            let _ = child.start_kill();
        }
        for handle in &self.readers {
            handle.abort();
        }
    }
}

async fn drain_readers(readers: &mut Vec<JoinHandle<()>>) {
    for handle in readers.drain(..) {
        let abort = handle.abort_handle();
        if tokio::time::timeout(READER_DRAIN_TIMEOUT, handle).await.is_err() {
            tracing::debug!("Output reader still busy after exit, aborting");
            abort.abort();
        }
    }
}

fn exit_code_of(status: ExitStatus) -> i32 {
    match status.code() {
        Some(code) => code,
        None => {
            #[cfg(unix)]
            {
                use std::os::unix::process::ExitStatusExt;
                tracing::debug!(signal = ?status.signal(), "Process terminated by signal");
            }
            EXIT_CODE_UNKNOWN
        }
    }
}

fn looks_like_path(program: &Path) -> bool {
    program.components().count() > 1 || program.is_absolute()
}

#[cfg(unix)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

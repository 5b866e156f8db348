// src/exec/backend.rs

//! Pluggable spawn executor abstraction.
//!
//! Monitors talk to a [`SpawnExecutor`] instead of `tokio::process` directly.
//! This makes it easy to swap in a scripted executor in tests while keeping
//! the production implementation in [`RealSpawnExecutor`].
//!
//! - `spawn` creates one OS process for a [`ProcessSpec`] and hands back a
//!   [`ChildProcess`] handle. It checks the cancellation token right before
//!   creating the process; once the process exists, cancellation is the
//!   monitor's job (graceful termination through the handle).
//! - The handle's `wait` future is cancel-safe, so a monitor can race it
//!   against its cancellation token and control channel in a `select!`.

use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::errors::{Result, SupervisorError};
use crate::exec::child::OsChild;
use crate::exec::credentials::apply_run_as;
use crate::registry::ProcessSpec;

/// How an OS process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Normal exit with a status code.
    Exited(i32),
    /// Terminated by a signal (or otherwise without an exit code).
    Signalled(Option<i32>),
}

impl ExitOutcome {
    pub fn code(self) -> Option<i32> {
        match self {
            ExitOutcome::Exited(code) => Some(code),
            ExitOutcome::Signalled(_) => None,
        }
    }
}

/// Boxed future returned by [`ChildProcess`] methods.
pub type ChildFuture<'a, T> = Pin<Box<dyn Future<Output = anyhow::Result<T>> + Send + 'a>>;

/// Handle to one spawned OS process.
pub trait ChildProcess: Send {
    fn pid(&self) -> u32;

    /// Wait for the process to exit. Must be cancel-safe.
    fn wait(&mut self) -> ChildFuture<'_, ExitOutcome>;

    /// Ask the process to exit, escalating to a forced kill after `grace`.
    ///
    /// Resolves once the process is gone.
    fn terminate(&mut self, grace: Duration) -> ChildFuture<'_, ExitOutcome>;

    /// Suspend execution (SIGSTOP on Unix).
    fn suspend(&mut self) -> anyhow::Result<()>;

    /// Resume a suspended process (SIGCONT on Unix).
    fn resume(&mut self) -> anyhow::Result<()>;
}

/// Result of a spawn request.
pub enum Spawned {
    Child(Box<dyn ChildProcess>),
    /// The token fired before the process was created; nothing was started.
    Cancelled,
}

impl std::fmt::Debug for Spawned {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Spawned::Child(child) => f.debug_tuple("Child").field(&child.pid()).finish(),
            Spawned::Cancelled => f.write_str("Cancelled"),
        }
    }
}

/// Trait abstracting how processes are created.
///
/// Production code uses [`RealSpawnExecutor`]; tests can provide their own
/// implementation that doesn't create real processes.
pub trait SpawnExecutor: Send + Sync + 'static {
    fn spawn(&self, spec: &ProcessSpec, cancel: &CancellationToken) -> Result<Spawned>;
}

/// Real executor backed by `tokio::process`.
#[derive(Debug, Clone)]
pub struct RealSpawnExecutor {
    /// Forward child stdout/stderr lines into the log at debug level.
    pub log_output: bool,
}

impl RealSpawnExecutor {
    pub fn new() -> Self {
        Self { log_output: true }
    }
}

impl Default for RealSpawnExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl SpawnExecutor for RealSpawnExecutor {
    fn spawn(&self, spec: &ProcessSpec, cancel: &CancellationToken) -> Result<Spawned> {
        let mut cmd = build_command(spec, self.log_output)?;

        if cancel.is_cancelled() {
            debug!(process = %spec.name, "cancelled before process creation; not spawning");
            return Ok(Spawned::Cancelled);
        }

        let mut child = cmd.spawn().map_err(|e| spawn_error(spec, format!("{e}")))?;

        let pid = child
            .id()
            .ok_or_else(|| spawn_error(spec, "process exited before its pid was read"))?;

        info!(
            process = %spec.name,
            pid,
            cmd = %spec.command_line(),
            "spawned process"
        );

        if self.log_output {
            crate::exec::output::drain_output(&spec.name, child.stdout.take(), child.stderr.take());
        }

        Ok(Spawned::Child(Box::new(OsChild::new(
            spec.name.clone(),
            pid,
            child,
        ))))
    }
}

/// Translate a spec into a ready-to-spawn `Command`.
///
/// Output is piped only when something will drain it; otherwise it goes to
/// the null device so a chatty child can never block on a full pipe.
///
/// Problems that can be detected without touching the OS process table
/// (bad working directory, unknown run-as user) are reported here.
fn build_command(spec: &ProcessSpec, capture_output: bool) -> Result<Command> {
    // Build a shell command appropriate for the platform when asked to.
    let mut cmd = if spec.shell {
        if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(spec.command_line());
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(spec.command_line());
            c
        }
    } else {
        let mut c = Command::new(&spec.command);
        c.args(&spec.args);
        c
    };

    if let Some(dir) = &spec.working_dir {
        if !dir.is_dir() {
            return Err(spawn_error(
                spec,
                format!("working directory {} does not exist", dir.display()),
            ));
        }
        cmd.current_dir(dir);
    }

    cmd.envs(&spec.env);

    if let Some(run_as) = &spec.run_as {
        apply_run_as(&mut cmd, run_as).map_err(|e| spawn_error(spec, format!("{e:#}")))?;
    }

    let output = || if capture_output { Stdio::piped() } else { Stdio::null() };
    cmd.stdin(Stdio::null())
        .stdout(output())
        .stderr(output())
        .kill_on_drop(true);

    Ok(cmd)
}

fn spawn_error(spec: &ProcessSpec, reason: impl Into<String>) -> SupervisorError {
    SupervisorError::Spawn {
        name: spec.name.clone(),
        reason: reason.into(),
    }
}

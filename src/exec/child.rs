// src/exec/child.rs

//! OS-backed [`ChildProcess`] handle.

use std::process::ExitStatus;
use std::time::Duration;

use anyhow::Context;
use tokio::process::Child;
use tracing::{debug, info, warn};

use crate::exec::backend::{ChildFuture, ChildProcess, ExitOutcome};

/// A spawned `tokio::process::Child` plus the bookkeeping a monitor needs.
///
/// The child is created with `kill_on_drop(true)`, so dropping the handle
/// (e.g. because the monitor task was aborted) never leaks the process.
#[derive(Debug)]
pub struct OsChild {
    name: String,
    pid: u32,
    child: Child,
}

impl OsChild {
    pub fn new(name: String, pid: u32, child: Child) -> Self {
        Self { name, pid, child }
    }
}

impl ChildProcess for OsChild {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn wait(&mut self) -> ChildFuture<'_, ExitOutcome> {
        Box::pin(async move {
            let status = self
                .child
                .wait()
                .await
                .with_context(|| format!("waiting for process '{}'", self.name))?;
            Ok(outcome_from_status(status))
        })
    }

    fn terminate(&mut self, grace: Duration) -> ChildFuture<'_, ExitOutcome> {
        Box::pin(async move {
            if let Some(status) = self
                .child
                .try_wait()
                .with_context(|| format!("polling process '{}'", self.name))?
            {
                debug!(process = %self.name, pid = self.pid, "process already exited before termination");
                return Ok(outcome_from_status(status));
            }

            if let Err(e) = signal::request_exit(self.pid) {
                warn!(
                    process = %self.name,
                    pid = self.pid,
                    error = %e,
                    "failed to deliver graceful termination signal"
                );
            }

            match tokio::time::timeout(grace, self.child.wait()).await {
                Ok(status) => {
                    let status =
                        status.with_context(|| format!("waiting for process '{}'", self.name))?;
                    info!(process = %self.name, pid = self.pid, "process terminated gracefully");
                    Ok(outcome_from_status(status))
                }
                Err(_elapsed) => {
                    warn!(
                        process = %self.name,
                        pid = self.pid,
                        grace_ms = grace.as_millis() as u64,
                        "grace period elapsed; killing process"
                    );
                    self.child
                        .kill()
                        .await
                        .with_context(|| format!("killing process '{}'", self.name))?;
                    let status = self
                        .child
                        .wait()
                        .await
                        .with_context(|| format!("reaping process '{}'", self.name))?;
                    Ok(outcome_from_status(status))
                }
            }
        })
    }

    fn suspend(&mut self) -> anyhow::Result<()> {
        signal::suspend(self.pid).with_context(|| format!("suspending process '{}'", self.name))
    }

    fn resume(&mut self) -> anyhow::Result<()> {
        signal::resume(self.pid).with_context(|| format!("resuming process '{}'", self.name))
    }
}

#[cfg(unix)]
fn outcome_from_status(status: ExitStatus) -> ExitOutcome {
    use std::os::unix::process::ExitStatusExt;

    match status.code() {
        Some(code) => ExitOutcome::Exited(code),
        None => ExitOutcome::Signalled(status.signal()),
    }
}

#[cfg(not(unix))]
fn outcome_from_status(status: ExitStatus) -> ExitOutcome {
    match status.code() {
        Some(code) => ExitOutcome::Exited(code),
        None => ExitOutcome::Signalled(None),
    }
}

#[cfg(unix)]
mod signal {
    use anyhow::Result;
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    fn send(pid: u32, sig: Signal) -> Result<()> {
        match kill(Pid::from_raw(pid as i32), sig) {
            Ok(()) => Ok(()),
            // Already gone; the pending wait() will report the exit.
            Err(nix::errno::Errno::ESRCH) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// SIGTERM, followed by SIGCONT so a paused process can act on it.
    pub fn request_exit(pid: u32) -> Result<()> {
        send(pid, Signal::SIGTERM)?;
        send(pid, Signal::SIGCONT)
    }

    pub fn suspend(pid: u32) -> Result<()> {
        send(pid, Signal::SIGSTOP)
    }

    pub fn resume(pid: u32) -> Result<()> {
        send(pid, Signal::SIGCONT)
    }
}

#[cfg(not(unix))]
mod signal {
    use anyhow::{Result, bail};

    /// No graceful signal exists here; the caller falls back to a hard kill
    /// once the grace period elapses.
    pub fn request_exit(_pid: u32) -> Result<()> {
        bail!("graceful termination is not supported on this platform")
    }

    pub fn suspend(_pid: u32) -> Result<()> {
        bail!("suspending processes is not supported on this platform")
    }

    pub fn resume(_pid: u32) -> Result<()> {
        bail!("resuming processes is not supported on this platform")
    }
}

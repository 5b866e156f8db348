// src/engine/monitor.rs

//! Per-process control loop.
//!
//! One monitor task runs for every started process. It owns the
//! spawn / wait / restart decision cycle and is the only component that
//! holds the OS child handle. All state changes go through the registry's
//! compare-and-set primitive, keyed by the process name.
//!
//! Lifecycle of a monitor:
//!
//! ```text
//! (dispatcher: Stopped|Failed -> Starting)
//!   spawn ──err, manual start──────────────────────────────► Failed
//!     │ ok
//!     ▼
//!   Running ──exit code in exit_codes────────────────────► Stopped
//!     │ unexpected exit / killed / respawn error
//!     ├─ auto_restart && retry_count < exit_retries ─► Starting (backoff) ─► spawn
//!     └─ otherwise ─────────────────────────────────────────► Failed
//!
//! cancellation at any point ─► Stopping ─► (terminate child) ─► Stopped
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::engine::SupervisorSettings;
use crate::engine::context::{MonitorHandle, SupervisorContext};
use crate::engine::events::{EventSink, FailureKind, SupervisorEvent};
use crate::errors::{Result, SupervisorError};
use crate::exec::{ChildProcess, ExitOutcome, SpawnExecutor, Spawned};
use crate::registry::{ProcessSpec, Registry};
use crate::types::{ProcessStatus, Verb};

/// Upper bound on re-read / re-decide rounds for a single transition.
const TRANSITION_ATTEMPTS: usize = 8;

/// Requests delivered to a monitor while its process runs.
///
/// The reply is `Ok(true)` if the process state changed, `Ok(false)` for a
/// no-op.
#[derive(Debug)]
pub(crate) enum MonitorControl {
    Pause(oneshot::Sender<Result<bool>>),
    Continue(oneshot::Sender<Result<bool>>),
}

/// Outcome of the first spawn, reported back to whoever issued `start`.
#[derive(Debug)]
pub(crate) enum StartReport {
    Running(u32),
    Stopped,
    Failed(SupervisorError),
}

enum Decision {
    Restart,
    Finished(ProcessStatus),
}

pub(crate) struct Monitor<E: SpawnExecutor> {
    name: String,
    registry: Arc<Registry>,
    executor: Arc<E>,
    sink: Arc<dyn EventSink>,
    settings: SupervisorSettings,
    cancel: CancellationToken,
    control: mpsc::Receiver<MonitorControl>,
    done: watch::Sender<Option<ProcessStatus>>,
    ready: Option<oneshot::Sender<StartReport>>,
}

/// Launch a monitor for `name`, which the caller has already moved to
/// `Starting`.
///
/// Returns the handle to keep in the supervisor and a receiver for the
/// result of the first spawn.
pub(crate) fn launch<E: SpawnExecutor>(
    ctx: &SupervisorContext<E>,
    name: &str,
) -> (MonitorHandle, oneshot::Receiver<StartReport>) {
    let cancel = ctx.root.child_token();
    let (control_tx, control_rx) = mpsc::channel(8);
    let (done_tx, done_rx) = watch::channel(None);
    let (ready_tx, ready_rx) = oneshot::channel();

    let monitor = Monitor {
        name: name.to_string(),
        registry: Arc::clone(&ctx.registry),
        executor: Arc::clone(&ctx.executor),
        sink: Arc::clone(&ctx.sink),
        settings: ctx.settings,
        cancel: cancel.clone(),
        control: control_rx,
        done: done_tx,
        ready: Some(ready_tx),
    };

    let join = tokio::spawn(monitor.run());

    let handle = MonitorHandle {
        cancel,
        control: control_tx,
        done: done_rx,
        join,
    };
    (handle, ready_rx)
}

impl<E: SpawnExecutor> Monitor<E> {
    pub(crate) async fn run(mut self) {
        debug!(process = %self.name, "monitor started");
        let status = self.supervise().await;

        let fallback = match status {
            ProcessStatus::Failed => StartReport::Failed(SupervisorError::Other(anyhow::anyhow!(
                "process '{}' failed during startup",
                self.name
            ))),
            _ => StartReport::Stopped,
        };
        self.resolve_ready(fallback);

        debug!(process = %self.name, status = %status, "monitor finished");
        self.done.send_replace(Some(status));
    }

    async fn supervise(&mut self) -> ProcessStatus {
        let spec = match self.registry.spec(&self.name) {
            Ok(spec) => spec,
            Err(err) => {
                warn!(process = %self.name, error = %err, "monitor started for unknown process");
                return ProcessStatus::Stopped;
            }
        };

        let mut manual_start = true;

        loop {
            if self.cancel.is_cancelled() {
                return self.finish_stopped(None);
            }

            let mut child = match self.executor.spawn(&spec, &self.cancel) {
                Ok(Spawned::Child(child)) => child,
                Ok(Spawned::Cancelled) => return self.finish_stopped(None),
                Err(err) if manual_start => return self.fail_spawn(err),
                Err(err) => {
                    // A failed respawn counts as one more unexpected exit.
                    warn!(process = %self.name, error = %err, "restart attempt could not spawn process");
                    match self
                        .after_unexpected_exit(&spec, ProcessStatus::Starting, None, None)
                        .await
                    {
                        Decision::Restart => continue,
                        Decision::Finished(status) => return status,
                    }
                }
            };
            manual_start = false;

            let pid = child.pid();
            let started_at = Instant::now();
            let running = self.registry.compare_and_update(
                &self.name,
                ProcessStatus::Starting,
                ProcessStatus::Running,
                |s| {
                    s.pid = Some(pid);
                    s.started_at = Some(started_at);
                },
            );
            if let Err(err) = running {
                debug!(
                    process = %self.name,
                    pid,
                    error = %err,
                    "stop requested while spawning; terminating new process"
                );
                let code = self.terminate(child.as_mut()).await;
                self.resolve_ready(StartReport::Stopped);
                return self.finish_stopped(code);
            }

            info!(process = %self.name, pid, "process running");
            self.resolve_ready(StartReport::Running(pid));

            let outcome = loop {
                tokio::select! {
                    res = child.wait() => break res,
                    _ = self.cancel.cancelled() => {
                        self.enter_stopping();
                        let code = self.terminate(child.as_mut()).await;
                        return self.finish_stopped(code);
                    }
                    Some(ctl) = self.control.recv() => self.handle_control(ctl, child.as_mut()),
                }
            };

            let exit_code = match outcome {
                Ok(ExitOutcome::Exited(code)) if spec.is_expected_exit(code) => {
                    info!(
                        process = %self.name,
                        pid,
                        exit_code = code,
                        "process exited with an expected code; not restarting"
                    );
                    return self.finish_expected(code);
                }
                Ok(ExitOutcome::Exited(code)) => {
                    warn!(process = %self.name, pid, exit_code = code, "process exited unexpectedly");
                    Some(code)
                }
                Ok(ExitOutcome::Signalled(signal)) => {
                    let err = SupervisorError::Killed {
                        name: self.name.clone(),
                        signal,
                    };
                    warn!(process = %self.name, pid, signal = ?signal, "process killed outside supervision");
                    self.sink.report(SupervisorEvent::from_error(
                        &self.name,
                        FailureKind::Killed,
                        &err,
                    ));
                    None
                }
                Err(err) => {
                    error!(process = %self.name, pid, error = %err, "lost track of process");
                    None
                }
            };

            match self
                .after_unexpected_exit(&spec, ProcessStatus::Running, exit_code, Some(started_at))
                .await
            {
                Decision::Restart => continue,
                Decision::Finished(status) => return status,
            }
        }
    }

    /// Decide between restart and `Failed` after a crash (or failed respawn)
    /// observed while in `from`.
    async fn after_unexpected_exit(
        &mut self,
        spec: &ProcessSpec,
        from: ProcessStatus,
        exit_code: Option<i32>,
        started_at: Option<Instant>,
    ) -> Decision {
        let snap = match self.registry.get(&self.name) {
            Ok(snap) => snap,
            Err(_) => return Decision::Finished(ProcessStatus::Stopped),
        };

        if self.cancel.is_cancelled() || snap.status() != from {
            // A stop raced with the exit; honour the stop.
            return Decision::Finished(self.finish_stopped(exit_code));
        }

        let mut retries = snap.state.retry_count;
        if let Some(started_at) = started_at {
            if retries > 0 && started_at.elapsed() >= self.settings.stable_uptime {
                debug!(
                    process = %self.name,
                    previous_retries = retries,
                    "run exceeded stable uptime; resetting retry count"
                );
                retries = 0;
            }
        }

        if spec.auto_restart && retries < spec.exit_retries {
            let attempt = retries + 1;
            let moved = self.registry.compare_and_update(
                &self.name,
                from,
                ProcessStatus::Starting,
                |s| {
                    s.retry_count = attempt;
                    if exit_code.is_some() {
                        s.last_exit_code = exit_code;
                    }
                },
            );
            if moved.is_err() {
                return Decision::Finished(self.finish_stopped(exit_code));
            }

            let delay = self.settings.backoff.next(attempt - 1);
            warn!(
                process = %self.name,
                exit_code = ?exit_code,
                attempt,
                max_retries = spec.exit_retries,
                delay_ms = delay.as_millis() as u64,
                "restarting process"
            );

            return if self.backoff(delay).await {
                Decision::Restart
            } else {
                Decision::Finished(self.finish_stopped(None))
            };
        }

        let failed = self.registry.compare_and_update(
            &self.name,
            from,
            ProcessStatus::Failed,
            |s| {
                s.retry_count = retries;
                if exit_code.is_some() {
                    s.last_exit_code = exit_code;
                }
            },
        );
        if failed.is_err() {
            return Decision::Finished(self.finish_stopped(exit_code));
        }

        let event = if spec.auto_restart {
            let err = SupervisorError::RetriesExhausted {
                name: self.name.clone(),
                retries: spec.exit_retries,
                last_exit_code: exit_code,
            };
            SupervisorEvent::from_error(&self.name, FailureKind::RetriesExhausted, &err)
        } else {
            SupervisorEvent::new(
                &self.name,
                FailureKind::UnexpectedExit,
                format!(
                    "process '{}' exited unexpectedly (exit code {:?}) and auto_restart is off",
                    self.name, exit_code
                ),
            )
            .with_exit_code(exit_code)
        };
        self.sink.report(event);

        Decision::Finished(ProcessStatus::Failed)
    }

    /// Sleep before a restart. Returns `false` if cancelled meanwhile.
    async fn backoff(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                _ = self.cancel.cancelled() => return false,
                Some(ctl) = self.control.recv() => self.reject_control(ctl, ProcessStatus::Starting),
            }
        }
    }

    fn fail_spawn(&mut self, err: SupervisorError) -> ProcessStatus {
        error!(process = %self.name, error = %err, "could not spawn process");
        let failed = self.registry.compare_and_set(
            &self.name,
            ProcessStatus::Starting,
            ProcessStatus::Failed,
        );

        match failed {
            Ok(_) => {
                self.sink.report(SupervisorEvent::from_error(
                    &self.name,
                    FailureKind::SpawnFailed,
                    &err,
                ));
                self.resolve_ready(StartReport::Failed(err));
                ProcessStatus::Failed
            }
            Err(_) => {
                self.resolve_ready(StartReport::Failed(err));
                self.finish_stopped(None)
            }
        }
    }

    fn finish_expected(&self, code: i32) -> ProcessStatus {
        let stopped = self.registry.compare_and_update(
            &self.name,
            ProcessStatus::Running,
            ProcessStatus::Stopped,
            |s| s.last_exit_code = Some(code),
        );
        match stopped {
            Ok(_) => ProcessStatus::Stopped,
            Err(_) => self.finish_stopped(Some(code)),
        }
    }

    async fn terminate(&self, child: &mut dyn ChildProcess) -> Option<i32> {
        let pid = child.pid();
        match child.terminate(self.settings.stop_grace).await {
            Ok(outcome) => {
                debug!(process = %self.name, pid, outcome = ?outcome, "process terminated");
                outcome.code()
            }
            Err(err) => {
                warn!(process = %self.name, pid, error = %err, "failed to terminate process");
                None
            }
        }
    }

    /// Move a live entry to `Stopping` (no-op if already there or idle).
    fn enter_stopping(&self) {
        for _ in 0..TRANSITION_ATTEMPTS {
            let status = match self.registry.status(&self.name) {
                Ok(status) => status,
                Err(_) => return,
            };
            match status {
                ProcessStatus::Starting | ProcessStatus::Running => {
                    if self
                        .registry
                        .compare_and_set(&self.name, status, ProcessStatus::Stopping)
                        .is_ok()
                    {
                        return;
                    }
                }
                _ => return,
            }
        }
    }

    /// Drive the entry through `Stopping` to `Stopped`.
    ///
    /// `exit_code` is recorded when known. Idle entries are left untouched.
    fn finish_stopped(&self, exit_code: Option<i32>) -> ProcessStatus {
        for _ in 0..TRANSITION_ATTEMPTS {
            let status = match self.registry.status(&self.name) {
                Ok(status) => status,
                Err(_) => return ProcessStatus::Stopped,
            };

            let result = match status {
                ProcessStatus::Stopping => self.registry.compare_and_update(
                    &self.name,
                    ProcessStatus::Stopping,
                    ProcessStatus::Stopped,
                    |s| {
                        if exit_code.is_some() {
                            s.last_exit_code = exit_code;
                        }
                    },
                ),
                ProcessStatus::Starting | ProcessStatus::Running => {
                    self.registry
                        .compare_and_set(&self.name, status, ProcessStatus::Stopping)
                }
                ProcessStatus::Stopped | ProcessStatus::Failed => return status,
            };

            if let Ok(snap) = result {
                if snap.status() == ProcessStatus::Stopped {
                    info!(process = %self.name, exit_code = ?exit_code, "process stopped");
                    return ProcessStatus::Stopped;
                }
            }
        }

        warn!(process = %self.name, "could not settle process state after stop");
        self.registry
            .status(&self.name)
            .unwrap_or(ProcessStatus::Stopped)
    }

    fn handle_control(&self, ctl: MonitorControl, child: &mut dyn ChildProcess) {
        let (paused, reply) = match ctl {
            MonitorControl::Pause(reply) => (true, reply),
            MonitorControl::Continue(reply) => (false, reply),
        };
        let _ = reply.send(self.set_paused(paused, child));
    }

    fn reject_control(&self, ctl: MonitorControl, status: ProcessStatus) {
        let (verb, reply) = match ctl {
            MonitorControl::Pause(reply) => (Verb::Pause, reply),
            MonitorControl::Continue(reply) => (Verb::Continue, reply),
        };
        let _ = reply.send(Err(SupervisorError::InvalidCommand {
            name: self.name.clone(),
            verb,
            status,
        }));
    }

    fn set_paused(&self, paused: bool, child: &mut dyn ChildProcess) -> Result<bool> {
        let verb = if paused { Verb::Pause } else { Verb::Continue };
        let snap = self.registry.get(&self.name)?;

        if snap.status() != ProcessStatus::Running {
            return Err(SupervisorError::InvalidCommand {
                name: self.name.clone(),
                verb,
                status: snap.status(),
            });
        }
        if snap.state.paused == paused {
            return Ok(false);
        }

        if paused {
            child.suspend()?;
        } else {
            child.resume()?;
        }

        self.registry.compare_and_update(
            &self.name,
            ProcessStatus::Running,
            ProcessStatus::Running,
            |s| s.paused = paused,
        )?;
        info!(process = %self.name, pid = child.pid(), paused, "process {verb}d");
        Ok(true)
    }

    fn resolve_ready(&mut self, report: StartReport) {
        if let Some(tx) = self.ready.take() {
            let _ = tx.send(report);
        }
    }
}

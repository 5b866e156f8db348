// src/engine/dispatcher.rs

//! Per-process command handling: start, stop, pause, continue.
//!
//! Commands never block on other processes. Each one re-reads the registry
//! and acts through compare-and-set, so two callers racing on the same name
//! settle on a single winner and the loser observes the winner's result.

use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::engine::CommandOutcome;
use crate::engine::context::{SupervisorContext, wait_done};
use crate::engine::monitor::{self, MonitorControl, StartReport};
use crate::errors::{Result, SupervisorError};
use crate::exec::SpawnExecutor;
use crate::types::{ProcessStatus, Verb};

/// Re-read rounds before a command gives up with `Conflict`.
const MAX_ATTEMPTS: usize = 5;

/// Pause between re-reads while another command settles.
const SETTLE_DELAY: Duration = Duration::from_millis(20);

/// Run `verb` against `name`. Refusals are also reported to the event sink.
pub(crate) async fn execute<E: SpawnExecutor>(
    ctx: &SupervisorContext<E>,
    verb: Verb,
    name: &str,
) -> Result<CommandOutcome> {
    let result = match verb {
        Verb::Start => start(ctx, name).await,
        Verb::Stop => stop(ctx, name).await,
        Verb::Pause => set_paused(ctx, name, true).await,
        Verb::Continue => set_paused(ctx, name, false).await,
    };

    match result {
        Ok(changed) => {
            let status = ctx.registry.status(name)?;
            Ok(CommandOutcome {
                name: name.to_string(),
                verb,
                status,
                changed,
            })
        }
        Err(err) => {
            // Spawn failures were already reported by the monitor.
            if !matches!(err, SupervisorError::Spawn { .. }) {
                ctx.reject(name, &err);
            }
            Err(err)
        }
    }
}

/// Returns `Ok(true)` if this call launched the process.
async fn start<E: SpawnExecutor>(ctx: &SupervisorContext<E>, name: &str) -> Result<bool> {
    if ctx.root.is_cancelled() {
        return Err(SupervisorError::ShuttingDown(name.to_string()));
    }

    let mut last = ProcessStatus::Stopped;
    for attempt in 0..MAX_ATTEMPTS {
        let status = ctx.registry.status(name)?;
        last = status;

        match status {
            ProcessStatus::Running | ProcessStatus::Starting => {
                debug!(process = %name, status = %status, "start: already live");
                return Ok(false);
            }
            ProcessStatus::Stopping => {
                debug!(process = %name, attempt, "start: waiting for stop to settle");
                tokio::time::sleep(SETTLE_DELAY).await;
            }
            ProcessStatus::Stopped | ProcessStatus::Failed => {
                let moved = ctx.registry.compare_and_update(
                    name,
                    status,
                    ProcessStatus::Starting,
                    |s| s.retry_count = 0,
                );
                if moved.is_ok() {
                    return launch(ctx, name).await;
                }
            }
        }
    }

    Err(SupervisorError::Conflict {
        name: name.to_string(),
        expected: ProcessStatus::Stopped,
        actual: last,
    })
}

async fn launch<E: SpawnExecutor>(ctx: &SupervisorContext<E>, name: &str) -> Result<bool> {
    // A finished monitor may still sit in the map from an earlier run.
    if let Some(previous) = ctx.take_monitor(name) {
        if !previous.is_finished() {
            warn!(process = %name, "replacing a monitor that has not reported completion");
        }
        previous.cancel.cancel();
    }

    // Shutdown may have begun between the check in `start` and here.
    if ctx.root.is_cancelled() {
        let _ = ctx
            .registry
            .compare_and_set(name, ProcessStatus::Starting, ProcessStatus::Stopped);
        return Err(SupervisorError::ShuttingDown(name.to_string()));
    }

    let (handle, ready) = monitor::launch(ctx, name);
    ctx.insert_monitor(name, handle);

    match ready.await {
        Ok(StartReport::Running(pid)) => {
            info!(process = %name, pid, "started");
            Ok(true)
        }
        Ok(StartReport::Stopped) => {
            debug!(process = %name, "start superseded by stop");
            Ok(false)
        }
        Ok(StartReport::Failed(err)) => Err(err),
        Err(_) => Err(SupervisorError::Other(anyhow::anyhow!(
            "monitor for '{name}' exited before reporting start"
        ))),
    }
}

/// Returns `Ok(true)` if this call moved the process out of a live state.
async fn stop<E: SpawnExecutor>(ctx: &SupervisorContext<E>, name: &str) -> Result<bool> {
    let mut changed = false;
    let mut settled = false;

    for _ in 0..MAX_ATTEMPTS {
        let status = ctx.registry.status(name)?;
        match status {
            ProcessStatus::Stopped | ProcessStatus::Failed => {
                debug!(process = %name, status = %status, "stop: already idle");
                return Ok(false);
            }
            ProcessStatus::Stopping => {
                settled = true;
                break;
            }
            ProcessStatus::Running | ProcessStatus::Starting => {
                if ctx
                    .registry
                    .compare_and_set(name, status, ProcessStatus::Stopping)
                    .is_ok()
                {
                    info!(process = %name, from = %status, "stopping");
                    changed = true;
                    settled = true;
                    break;
                }
            }
        }
    }

    if !settled {
        let actual = ctx.registry.status(name)?;
        return Err(SupervisorError::Conflict {
            name: name.to_string(),
            expected: ProcessStatus::Running,
            actual,
        });
    }

    match ctx.monitor_waiter(name) {
        Some((cancel, done)) => {
            cancel.cancel();
            match wait_done(done).await {
                Some(final_status) => {
                    debug!(process = %name, status = %final_status, "monitor drained");
                }
                None => {
                    // Monitor task vanished without finishing the transition.
                    let _ = ctx.registry.compare_and_set(
                        name,
                        ProcessStatus::Stopping,
                        ProcessStatus::Stopped,
                    );
                }
            }
        }
        None => {
            // No monitor owns this entry; settle it directly.
            let _ = ctx
                .registry
                .compare_and_set(name, ProcessStatus::Stopping, ProcessStatus::Stopped);
        }
    }

    Ok(changed)
}

async fn set_paused<E: SpawnExecutor>(
    ctx: &SupervisorContext<E>,
    name: &str,
    paused: bool,
) -> Result<bool> {
    let verb = if paused { Verb::Pause } else { Verb::Continue };
    let snap = ctx.registry.get(name)?;

    if snap.status() != ProcessStatus::Running {
        return Err(SupervisorError::InvalidCommand {
            name: name.to_string(),
            verb,
            status: snap.status(),
        });
    }
    if snap.state.paused == paused {
        debug!(process = %name, paused, "{verb}: nothing to do");
        return Ok(false);
    }

    let invalid = || SupervisorError::InvalidCommand {
        name: name.to_string(),
        verb,
        status: ctx.registry.status(name).unwrap_or(ProcessStatus::Stopped),
    };

    let control = ctx.monitor_control(name).ok_or_else(invalid)?;
    let (tx, rx) = oneshot::channel();
    let msg = if paused {
        MonitorControl::Pause(tx)
    } else {
        MonitorControl::Continue(tx)
    };

    control.send(msg).await.map_err(|_| invalid())?;
    rx.await.map_err(|_| invalid())?
}

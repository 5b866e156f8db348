// src/engine/controller.rs

//! The [`Supervisor`]: owner of the registry, the executor and every monitor.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, timeout_at};
use tracing::{debug, error, info, warn};

use crate::engine::context::{SupervisorContext, wait_done};
use crate::engine::dispatcher;
use crate::engine::events::{EventSink, FailureKind, SupervisorEvent, TracingSink};
use crate::engine::{CommandOutcome, SupervisorSettings};
use crate::errors::{Result, SupervisorError};
use crate::exec::SpawnExecutor;
use crate::registry::{ProcessSpec, Registry, StatusReport};
use crate::types::{ProcessStatus, Verb};

/// Per-name results of a command applied to every registered process.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: Vec<CommandOutcome>,
    pub failed: Vec<(String, SupervisorError)>,
}

impl BatchReport {
    pub fn is_ok(&self) -> bool {
        self.failed.is_empty()
    }
}

/// What happened during [`Supervisor::shutdown`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Processes whose monitors finished within the timeout.
    pub drained: Vec<String>,
    /// Processes that had to be abandoned (forced to `Failed`).
    pub stragglers: Vec<String>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.stragglers.is_empty()
    }

    pub fn into_result(self) -> Result<()> {
        if self.is_clean() {
            Ok(())
        } else {
            Err(SupervisorError::ShutdownTimeout {
                stragglers: self.stragglers,
            })
        }
    }
}

/// Supervises a set of named processes.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct Supervisor<E: SpawnExecutor> {
    ctx: SupervisorContext<E>,
}

impl<E: SpawnExecutor> Supervisor<E> {
    pub fn new(executor: E, settings: SupervisorSettings) -> Self {
        Self::with_sink(executor, settings, Arc::new(TracingSink))
    }

    pub fn with_sink(executor: E, settings: SupervisorSettings, sink: Arc<dyn EventSink>) -> Self {
        let ctx = SupervisorContext::new(
            Arc::new(Registry::new()),
            Arc::new(executor),
            sink,
            settings,
        );
        Self { ctx }
    }

    pub fn registry(&self) -> &Registry {
        &self.ctx.registry
    }

    pub fn executor(&self) -> &E {
        &self.ctx.executor
    }

    pub fn settings(&self) -> SupervisorSettings {
        self.ctx.settings
    }

    pub fn is_shutting_down(&self) -> bool {
        self.ctx.root.is_cancelled()
    }

    /// Register a process without starting it.
    pub fn register(&self, spec: ProcessSpec) -> Result<()> {
        if self.is_shutting_down() {
            return Err(SupervisorError::ShuttingDown(spec.name));
        }
        self.ctx.registry.register(spec)
    }

    /// Register a process and start it right away if it is marked
    /// `auto_start`.
    pub async fn add(&self, spec: ProcessSpec) -> Result<Option<CommandOutcome>> {
        let name = spec.name.clone();
        let auto_start = spec.auto_start;
        self.register(spec)?;

        if auto_start {
            self.execute(Verb::Start, &name).await.map(Some)
        } else {
            Ok(None)
        }
    }

    /// Stop (if needed) and deregister a process.
    pub async fn remove(&self, name: &str) -> Result<Arc<ProcessSpec>> {
        self.execute(Verb::Stop, name).await?;
        if let Some(handle) = self.ctx.take_monitor(name) {
            handle.cancel.cancel();
        }
        let spec = self.ctx.registry.deregister(name)?;
        info!(process = %name, "removed process");
        Ok(spec)
    }

    /// Run one command against one process.
    pub async fn execute(&self, verb: Verb, name: &str) -> Result<CommandOutcome> {
        dispatcher::execute(&self.ctx, verb, name).await
    }

    pub async fn start(&self, name: &str) -> Result<CommandOutcome> {
        self.execute(Verb::Start, name).await
    }

    pub async fn stop(&self, name: &str) -> Result<CommandOutcome> {
        self.execute(Verb::Stop, name).await
    }

    pub async fn pause(&self, name: &str) -> Result<CommandOutcome> {
        self.execute(Verb::Pause, name).await
    }

    pub async fn resume(&self, name: &str) -> Result<CommandOutcome> {
        self.execute(Verb::Continue, name).await
    }

    pub fn status(&self, name: &str) -> Result<StatusReport> {
        self.ctx.registry.get(name).map(|snap| snap.report())
    }

    pub fn status_all(&self) -> Vec<StatusReport> {
        self.ctx
            .registry
            .list()
            .iter()
            .map(|snap| snap.report())
            .collect()
    }

    /// Start every process marked `auto_start`.
    pub async fn start_all(&self) -> BatchReport {
        let names: Vec<String> = self
            .ctx
            .registry
            .list()
            .into_iter()
            .filter(|snap| snap.spec.auto_start)
            .map(|snap| snap.spec.name.clone())
            .collect();
        self.batch(Verb::Start, names).await
    }

    pub async fn stop_all(&self) -> BatchReport {
        let names = self.ctx.registry.names();
        self.batch(Verb::Stop, names).await
    }

    /// Pause every running process; idle ones are skipped.
    pub async fn pause_all(&self) -> BatchReport {
        let names = self.running_names();
        self.batch(Verb::Pause, names).await
    }

    pub async fn continue_all(&self) -> BatchReport {
        let names = self.running_names();
        self.batch(Verb::Continue, names).await
    }

    fn running_names(&self) -> Vec<String> {
        self.ctx
            .registry
            .list()
            .into_iter()
            .filter(|snap| snap.status() == ProcessStatus::Running)
            .map(|snap| snap.spec.name.clone())
            .collect()
    }

    async fn batch(&self, verb: Verb, names: Vec<String>) -> BatchReport {
        let mut report = BatchReport::default();
        for name in names {
            match self.execute(verb, &name).await {
                Ok(outcome) => report.succeeded.push(outcome),
                Err(err) => {
                    warn!(process = %name, verb = %verb, error = %err, "command failed");
                    report.failed.push((name, err));
                }
            }
        }
        report
    }

    /// Stop everything and refuse further starts.
    ///
    /// Cancels the root token (every monitor token derives from it), then
    /// waits up to `timeout` in total for the monitors to finish. Monitors
    /// still running at the deadline are aborted; dropping their child
    /// handles kills the OS processes. Such processes end up `Failed` and
    /// are listed as stragglers.
    pub async fn shutdown(&self, timeout: Duration) -> ShutdownReport {
        info!(timeout_ms = timeout.as_millis() as u64, "shutting down supervisor");
        self.ctx.root.cancel();

        // A timeout too large to represent as an instant means no deadline.
        let deadline = Instant::now().checked_add(timeout);
        let mut report = ShutdownReport::default();

        for (name, handle) in self.ctx.drain_monitors() {
            let done = wait_done(handle.done.clone());
            let waited = match deadline {
                Some(deadline) => timeout_at(deadline, done).await,
                None => Ok(done.await),
            };
            match waited {
                Ok(Some(status)) => {
                    debug!(process = %name, status = %status, "monitor drained");
                    report.drained.push(name);
                }
                Ok(None) => {
                    // Task gone without a final status: treat as drained but
                    // make sure the entry does not stay live.
                    self.force_failed(&name);
                    report.drained.push(name);
                }
                Err(_) => {
                    handle.join.abort();
                    self.force_failed(&name);
                    let event = SupervisorEvent::new(
                        &name,
                        FailureKind::DrainTimeout,
                        format!("process '{name}' did not stop within {timeout:?}"),
                    );
                    self.ctx.sink.report(event);
                    report.stragglers.push(name);
                }
            }
        }

        if report.is_clean() {
            info!(drained = report.drained.len(), "supervisor shut down cleanly");
        } else {
            error!(stragglers = ?report.stragglers, "supervisor shut down with stragglers");
        }
        report
    }

    fn force_failed(&self, name: &str) {
        for _ in 0..4 {
            let Ok(status) = self.ctx.registry.status(name) else {
                return;
            };
            if !status.is_live() {
                return;
            }
            if self
                .ctx
                .registry
                .compare_and_set(name, status, ProcessStatus::Failed)
                .is_ok()
            {
                return;
            }
        }
    }
}

pub type LifecycleFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Hooks a host service manager calls on its own lifecycle transitions.
pub trait ServiceLifecycle: Send + Sync {
    fn on_start(&self) -> LifecycleFuture<'_>;
    fn on_stop(&self) -> LifecycleFuture<'_>;
    fn on_pause(&self) -> LifecycleFuture<'_>;
    fn on_continue(&self) -> LifecycleFuture<'_>;
    fn on_shutdown(&self) -> LifecycleFuture<'_>;
}

fn batch_result(verb: Verb, report: BatchReport) -> Result<()> {
    match report.failed.into_iter().next() {
        None => Ok(()),
        Some((name, err)) => {
            debug!(process = %name, verb = %verb, "batch command had failures");
            Err(err)
        }
    }
}

impl<E: SpawnExecutor> ServiceLifecycle for Supervisor<E> {
    fn on_start(&self) -> LifecycleFuture<'_> {
        Box::pin(async move { batch_result(Verb::Start, self.start_all().await) })
    }

    fn on_stop(&self) -> LifecycleFuture<'_> {
        Box::pin(async move { batch_result(Verb::Stop, self.stop_all().await) })
    }

    fn on_pause(&self) -> LifecycleFuture<'_> {
        Box::pin(async move { batch_result(Verb::Pause, self.pause_all().await) })
    }

    fn on_continue(&self) -> LifecycleFuture<'_> {
        Box::pin(async move { batch_result(Verb::Continue, self.continue_all().await) })
    }

    fn on_shutdown(&self) -> LifecycleFuture<'_> {
        let timeout = self.ctx.settings.shutdown_timeout;
        Box::pin(async move { self.shutdown(timeout).await.into_result() })
    }
}

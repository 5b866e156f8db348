// src/engine/context.rs

//! State shared by the dispatcher and the controller.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::engine::SupervisorSettings;
use crate::engine::events::{EventSink, FailureKind, SupervisorEvent};
use crate::engine::monitor::MonitorControl;
use crate::errors::SupervisorError;
use crate::exec::SpawnExecutor;
use crate::registry::Registry;
use crate::types::ProcessStatus;

/// Receiver side of a monitor's "finished" signal.
///
/// Holds `None` while the monitor runs and its final status afterwards.
pub(crate) type DoneRx = watch::Receiver<Option<ProcessStatus>>;

/// Everything needed to talk to one running monitor.
#[derive(Debug)]
pub(crate) struct MonitorHandle {
    /// Per-process token, a child of the supervisor's root token.
    pub cancel: CancellationToken,
    pub control: mpsc::Sender<MonitorControl>,
    pub done: DoneRx,
    pub join: JoinHandle<()>,
}

impl MonitorHandle {
    pub fn is_finished(&self) -> bool {
        self.done.borrow().is_some()
    }
}

pub(crate) struct SupervisorContext<E: SpawnExecutor> {
    pub registry: Arc<Registry>,
    pub executor: Arc<E>,
    pub sink: Arc<dyn EventSink>,
    pub settings: SupervisorSettings,
    /// Global shutdown token; every monitor token is derived from it.
    pub root: CancellationToken,
    monitors: Mutex<HashMap<String, MonitorHandle>>,
}

impl<E: SpawnExecutor> SupervisorContext<E> {
    pub fn new(
        registry: Arc<Registry>,
        executor: Arc<E>,
        sink: Arc<dyn EventSink>,
        settings: SupervisorSettings,
    ) -> Self {
        Self {
            registry,
            executor,
            sink,
            settings,
            root: CancellationToken::new(),
            monitors: Mutex::new(HashMap::new()),
        }
    }

    /// Store the handle of a freshly launched monitor, returning the
    /// previous (finished) handle for the same name, if any.
    pub fn insert_monitor(&self, name: &str, handle: MonitorHandle) -> Option<MonitorHandle> {
        self.monitors.lock().insert(name.to_string(), handle)
    }

    pub fn take_monitor(&self, name: &str) -> Option<MonitorHandle> {
        self.monitors.lock().remove(name)
    }

    pub fn drain_monitors(&self) -> Vec<(String, MonitorHandle)> {
        let mut all: Vec<(String, MonitorHandle)> = self.monitors.lock().drain().collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Token and completion signal of the named monitor, without removing it.
    pub fn monitor_waiter(&self, name: &str) -> Option<(CancellationToken, DoneRx)> {
        self.monitors
            .lock()
            .get(name)
            .map(|h| (h.cancel.clone(), h.done.clone()))
    }

    pub fn monitor_control(&self, name: &str) -> Option<mpsc::Sender<MonitorControl>> {
        self.monitors.lock().get(name).map(|h| h.control.clone())
    }

    /// Report a refused command to the event sink.
    pub fn reject(&self, name: &str, err: &SupervisorError) {
        self.sink.report(SupervisorEvent::from_error(
            name,
            FailureKind::CommandRejected,
            err,
        ));
    }
}

/// Wait until a monitor reports its final status.
///
/// A dropped sender means the monitor task is gone (panicked or aborted);
/// that is reported as `None`.
pub(crate) async fn wait_done(mut done: DoneRx) -> Option<ProcessStatus> {
    let finished = done.wait_for(|s| s.is_some()).await.map(|s| *s);
    match finished {
        Ok(status) => status,
        Err(_) => *done.borrow(),
    }
}

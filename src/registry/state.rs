// src/registry/state.rs

//! Mutable runtime state and the read-only views handed out by the registry.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::registry::spec::ProcessSpec;
use crate::types::ProcessStatus;

/// Runtime state of one process.
///
/// Only the registry stores this; everyone else sees copies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessState {
    pub status: ProcessStatus,
    /// Valid only while `Running` or `Stopping`.
    pub pid: Option<u32>,
    /// Consecutive automatic restarts since the last manual start or
    /// stable run.
    pub retry_count: u32,
    pub last_exit_code: Option<i32>,
    /// Suspended via `pause`; status stays `Running`.
    pub paused: bool,
    /// When the current OS process was spawned.
    pub started_at: Option<Instant>,
}

/// Consistent copy of one registry entry, taken under a single lock.
#[derive(Debug, Clone)]
pub struct ProcessSnapshot {
    pub spec: Arc<ProcessSpec>,
    pub state: ProcessState,
}

impl ProcessSnapshot {
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn status(&self) -> ProcessStatus {
        self.state.status
    }

    pub fn report(&self) -> StatusReport {
        StatusReport::from(self)
    }
}

/// What the query surface returns for a process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub name: String,
    pub status: ProcessStatus,
    pub pid: Option<u32>,
    pub retry_count: u32,
    pub last_exit_code: Option<i32>,
    pub paused: bool,
}

impl From<&ProcessSnapshot> for StatusReport {
    fn from(snap: &ProcessSnapshot) -> Self {
        Self {
            name: snap.spec.name.clone(),
            status: snap.state.status,
            pid: snap.state.pid,
            retry_count: snap.state.retry_count,
            last_exit_code: snap.state.last_exit_code,
            paused: snap.state.paused,
        }
    }
}

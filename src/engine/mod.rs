// src/engine/mod.rs

//! Supervision engine.
//!
//! This module ties together:
//! - the per-process [`monitor`] loop (spawn, wait, restart, stop)
//! - the command [`dispatcher`] (start / stop / pause / continue)
//! - the [`controller`] that owns every monitor and drives shutdown
//! - restart [`backoff`] and the failure [`events`] sink
//!
//! The registry is the only shared state; every component talks to it
//! through compare-and-set, never through each other's internals.

use std::time::Duration;

use serde::Serialize;

use crate::types::{ProcessStatus, Verb};

pub mod backoff;
pub mod controller;
pub mod events;

mod context;
mod dispatcher;
mod monitor;

pub use backoff::BackoffPolicy;
pub use controller::{BatchReport, LifecycleFuture, ServiceLifecycle, ShutdownReport, Supervisor};
pub use events::{EventSink, FailureKind, MemorySink, SupervisorEvent, TracingSink};

/// Timing knobs shared by every monitor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SupervisorSettings {
    /// Total budget for draining all processes on shutdown.
    pub shutdown_timeout: Duration,
    /// Time a process gets between the polite stop request and a hard kill.
    pub stop_grace: Duration,
    /// A run at least this long resets the retry counter.
    pub stable_uptime: Duration,
    pub backoff: BackoffPolicy,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            shutdown_timeout: Duration::from_secs(10),
            stop_grace: Duration::from_secs(5),
            stable_uptime: Duration::from_secs(30),
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Result of a successful per-process command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandOutcome {
    pub name: String,
    pub verb: Verb,
    /// Status right after the command completed.
    pub status: ProcessStatus,
    /// `false` when the command was a no-op (e.g. `stop` on a stopped process).
    pub changed: bool,
}

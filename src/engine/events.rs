// src/engine/events.rs

//! Structured failure events and the sink they are delivered to.
//!
//! Every transition into `Failed`, every command rejection and every
//! process that does not drain during shutdown produces one
//! [`SupervisorEvent`]. The sink is injected into the supervisor, so hosts
//! can forward events to whatever error reporting they use.

use std::fmt;

use parking_lot::Mutex;
use tracing::{error, warn};

use crate::errors::SupervisorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The OS refused to create the process.
    SpawnFailed,
    /// Automatic restarts used up; the process is now `Failed`.
    RetriesExhausted,
    /// Unexpected exit with auto-restart disabled.
    UnexpectedExit,
    /// Process terminated by a signal nobody in the supervisor sent.
    Killed,
    /// A start/stop/pause/continue command was refused.
    CommandRejected,
    /// The process did not stop within the shutdown timeout.
    DrainTimeout,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::SpawnFailed => "spawn_failed",
            FailureKind::RetriesExhausted => "retries_exhausted",
            FailureKind::UnexpectedExit => "unexpected_exit",
            FailureKind::Killed => "killed",
            FailureKind::CommandRejected => "command_rejected",
            FailureKind::DrainTimeout => "drain_timeout",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorEvent {
    pub process: String,
    pub kind: FailureKind,
    pub exit_code: Option<i32>,
    pub message: String,
}

impl SupervisorEvent {
    pub fn new(process: impl Into<String>, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            process: process.into(),
            kind,
            exit_code: None,
            message: message.into(),
        }
    }

    pub fn from_error(process: impl Into<String>, kind: FailureKind, err: &SupervisorError) -> Self {
        let exit_code = match err {
            SupervisorError::RetriesExhausted { last_exit_code, .. } => *last_exit_code,
            _ => None,
        };
        Self {
            process: process.into(),
            kind,
            exit_code,
            message: err.to_string(),
        }
    }

    pub fn with_exit_code(mut self, code: Option<i32>) -> Self {
        self.exit_code = code;
        self
    }
}

/// Destination for failure events.
pub trait EventSink: Send + Sync + 'static {
    fn report(&self, event: SupervisorEvent);
}

/// Default sink: write events to the `tracing` log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn report(&self, event: SupervisorEvent) {
        match event.kind {
            FailureKind::CommandRejected => warn!(
                process = %event.process,
                kind = %event.kind,
                "{}",
                event.message
            ),
            _ => error!(
                process = %event.process,
                kind = %event.kind,
                exit_code = ?event.exit_code,
                "{}",
                event.message
            ),
        }
    }
}

/// Sink that keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<SupervisorEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SupervisorEvent> {
        self.events.lock().clone()
    }

    pub fn events_for(&self, process: &str) -> Vec<SupervisorEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.process == process)
            .cloned()
            .collect()
    }

    pub fn count(&self, kind: FailureKind) -> usize {
        self.events.lock().iter().filter(|e| e.kind == kind).count()
    }
}

impl EventSink for MemorySink {
    fn report(&self, event: SupervisorEvent) {
        self.events.lock().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_is_taken_from_retries_exhausted() {
        let err = SupervisorError::RetriesExhausted {
            name: "api".to_string(),
            retries: 3,
            last_exit_code: Some(7),
        };
        let event = SupervisorEvent::from_error("api", FailureKind::RetriesExhausted, &err);
        assert_eq!(event.exit_code, Some(7));
        assert!(event.message.contains("3 restart attempts"));
    }

    #[test]
    fn memory_sink_filters_by_process() {
        let sink = MemorySink::new();
        sink.report(SupervisorEvent::new("a", FailureKind::Killed, "boom"));
        sink.report(SupervisorEvent::new("b", FailureKind::SpawnFailed, "nope"));
        sink.report(SupervisorEvent::new("a", FailureKind::CommandRejected, "no"));

        assert_eq!(sink.events().len(), 3);
        assert_eq!(sink.events_for("a").len(), 2);
        assert_eq!(sink.count(FailureKind::SpawnFailed), 1);
    }
}

// src/errors.rs

//! Crate-wide error type and result alias.
//!
//! Every failure the supervisor can surface to a caller or to the event sink
//! is a [`SupervisorError`]. OS-level helpers inside [`crate::exec`] use
//! `anyhow` for context and are folded into [`SupervisorError::Spawn`] or
//! [`SupervisorError::Other`] at the module boundary.

use thiserror::Error;

use crate::types::{ProcessStatus, Verb};

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("process '{0}' is already registered")]
    DuplicateName(String),

    #[error("process not found: {0}")]
    NotFound(String),

    #[error("failed to spawn process '{name}': {reason}")]
    Spawn { name: String, reason: String },

    #[error("state conflict on '{name}': expected {expected}, found {actual}")]
    Conflict {
        name: String,
        expected: ProcessStatus,
        actual: ProcessStatus,
    },

    #[error("process '{name}' was killed outside supervision (signal {signal:?})")]
    Killed { name: String, signal: Option<i32> },

    #[error("process '{name}' exhausted {retries} restart attempts (last exit code {last_exit_code:?})")]
    RetriesExhausted {
        name: String,
        retries: u32,
        last_exit_code: Option<i32>,
    },

    #[error("cannot {verb} process '{name}' while it is {status}")]
    InvalidCommand {
        name: String,
        verb: Verb,
        status: ProcessStatus,
    },

    #[error("supervisor is shutting down; '{0}' cannot be started")]
    ShuttingDown(String),

    #[error("shutdown timed out; processes not drained cleanly: {}", .stragglers.join(", "))]
    ShutdownTimeout { stragglers: Vec<String> },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SupervisorError {
    /// Stable, machine-readable name of the error variant.
    pub fn kind(&self) -> &'static str {
        match self {
            SupervisorError::DuplicateName(_) => "duplicate_name",
            SupervisorError::NotFound(_) => "not_found",
            SupervisorError::Spawn { .. } => "spawn",
            SupervisorError::Conflict { .. } => "conflict",
            SupervisorError::Killed { .. } => "killed",
            SupervisorError::RetriesExhausted { .. } => "retries_exhausted",
            SupervisorError::InvalidCommand { .. } => "invalid_command",
            SupervisorError::ShuttingDown(_) => "shutting_down",
            SupervisorError::ShutdownTimeout { .. } => "shutdown_timeout",
            SupervisorError::Config(_) => "config",
            SupervisorError::Io(_) => "io",
            SupervisorError::Toml(_) => "toml",
            SupervisorError::Other(_) => "other",
        }
    }

    /// Whether the caller may reasonably retry the same request.
    pub fn is_transient(&self) -> bool {
        matches!(self, SupervisorError::Conflict { .. })
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, SupervisorError>;

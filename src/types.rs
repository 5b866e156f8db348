// src/types.rs

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a supervised process.
///
/// `Stopped` is both the initial and the idle terminal state. `Failed` is
/// terminal until a manual `start` is issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
}

impl ProcessStatus {
    /// A Monitor is (or may be) alive for this process.
    pub fn is_live(self) -> bool {
        matches!(
            self,
            ProcessStatus::Starting | ProcessStatus::Running | ProcessStatus::Stopping
        )
    }

    /// Idle states from which nothing happens without a new command.
    pub fn is_idle(self) -> bool {
        matches!(self, ProcessStatus::Stopped | ProcessStatus::Failed)
    }
}

impl Default for ProcessStatus {
    fn default() -> Self {
        ProcessStatus::Stopped
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProcessStatus::Stopped => "stopped",
            ProcessStatus::Starting => "starting",
            ProcessStatus::Running => "running",
            ProcessStatus::Stopping => "stopping",
            ProcessStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Commands accepted per process by the dispatcher.
///
/// The REST layer (or any other front end) parses its verb strings with
/// [`FromStr`]; anything else never reaches the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verb {
    Start,
    Stop,
    Pause,
    Continue,
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Verb::Start => "start",
            Verb::Stop => "stop",
            Verb::Pause => "pause",
            Verb::Continue => "continue",
        };
        f.write_str(s)
    }
}

impl FromStr for Verb {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "start" => Ok(Verb::Start),
            "stop" => Ok(Verb::Stop),
            "pause" => Ok(Verb::Pause),
            "continue" | "resume" => Ok(Verb::Continue),
            other => Err(format!(
                "invalid command verb: {other} (expected start, stop, pause or continue)"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verb_parsing_is_case_insensitive() {
        assert_eq!("START".parse::<Verb>(), Ok(Verb::Start));
        assert_eq!(" stop ".parse::<Verb>(), Ok(Verb::Stop));
        assert_eq!("resume".parse::<Verb>(), Ok(Verb::Continue));
    }

    #[test]
    fn unknown_verb_is_rejected() {
        let err = "restart".parse::<Verb>().unwrap_err();
        assert!(err.contains("restart"));
    }

    #[test]
    fn live_and_idle_partition_statuses() {
        for status in [
            ProcessStatus::Stopped,
            ProcessStatus::Starting,
            ProcessStatus::Running,
            ProcessStatus::Stopping,
            ProcessStatus::Failed,
        ] {
            assert_ne!(status.is_live(), status.is_idle(), "{status}");
        }
    }
}

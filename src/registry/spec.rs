// src/registry/spec.rs

//! Immutable process specification.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

/// Credentials a process should run as.
///
/// On Unix only `username` is used (resolved to a uid/gid pair at spawn
/// time). `domain` and `password` are carried for hosts whose process
/// creation API needs them.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RunAs {
    pub username: String,
    pub domain: Option<String>,
    pub password: Option<String>,
}

impl fmt::Debug for RunAs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunAs")
            .field("username", &self.username)
            .field("domain", &self.domain)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Static supervision policy for one named process.
///
/// Once registered, a spec is never mutated; changing policy means
/// deregistering and registering again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    /// Unique key in the registry.
    pub name: String,
    /// Program to execute (or a shell command line when `shell` is set).
    pub command: String,
    pub args: Vec<String>,
    /// Run `command` through the platform shell (`sh -c` / `cmd /C`).
    pub shell: bool,
    pub run_as: Option<RunAs>,
    pub working_dir: Option<PathBuf>,
    /// Extra environment, layered over the supervisor's own environment.
    pub env: BTreeMap<String, String>,
    pub auto_start: bool,
    pub auto_restart: bool,
    /// Exit codes that mean "terminated on purpose, do not restart".
    pub exit_codes: BTreeSet<i32>,
    /// Maximum consecutive automatic restarts after unexpected exits.
    pub exit_retries: u32,
}

impl ProcessSpec {
    /// A spec with the default policy: no autostart, auto-restart on,
    /// `exit_codes = {0}`, three retries.
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            shell: false,
            run_as: None,
            working_dir: None,
            env: BTreeMap::new(),
            auto_start: false,
            auto_restart: true,
            exit_codes: BTreeSet::from([0]),
            exit_retries: 3,
        }
    }

    /// Whether `code` is one of the configured expected exit codes.
    ///
    /// Expected codes win over `auto_restart`.
    pub fn is_expected_exit(&self, code: i32) -> bool {
        self.exit_codes.contains(&code)
    }

    /// Human readable command line, for logs and dry runs.
    pub fn command_line(&self) -> String {
        if self.args.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, self.args.join(" "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_treat_zero_as_expected() {
        let spec = ProcessSpec::new("web", "/bin/true");
        assert!(spec.is_expected_exit(0));
        assert!(!spec.is_expected_exit(1));
        assert!(spec.auto_restart);
        assert_eq!(spec.exit_retries, 3);
    }

    #[test]
    fn debug_output_redacts_password() {
        let run_as = RunAs {
            username: "svc".to_string(),
            domain: Some("CORP".to_string()),
            password: Some("hunter2".to_string()),
        };
        let rendered = format!("{run_as:?}");
        assert!(rendered.contains("svc"));
        assert!(!rendered.contains("hunter2"));
    }
}

// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::engine::{BackoffPolicy, SupervisorSettings};
use crate::registry::{ProcessSpec, RunAs};

/// Configuration exactly as read from a TOML file.
///
/// ```toml
/// [supervisor]
/// shutdown_timeout = "10s"
/// backoff_first = "250ms"
///
/// [process.api]
/// command = "/usr/local/bin/api"
/// args = ["--port", "8080"]
/// auto_start = true
/// exit_codes = [0, 3]
///
/// [process.worker]
/// command = "python worker.py"
/// shell = true
/// auto_restart = false
/// ```
///
/// Nothing here is validated yet; convert to [`ConfigFile`] for that.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub supervisor: SupervisorSection,

    /// All processes from `[process.<name>]`, keyed by name.
    #[serde(default)]
    pub process: BTreeMap<String, ProcessConfig>,
}

/// `[supervisor]` section. Durations are strings such as `"500ms"` or `"5s"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SupervisorSection {
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: String,
    #[serde(default = "default_stop_grace")]
    pub stop_grace: String,
    /// A run lasting at least this long resets the retry counter.
    #[serde(default = "default_stable_uptime")]
    pub stable_uptime: String,
    #[serde(default = "default_backoff_first")]
    pub backoff_first: String,
    #[serde(default = "default_backoff_max")]
    pub backoff_max: String,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
}

fn default_shutdown_timeout() -> String {
    "10s".to_string()
}

fn default_stop_grace() -> String {
    "5s".to_string()
}

fn default_stable_uptime() -> String {
    "30s".to_string()
}

fn default_backoff_first() -> String {
    "100ms".to_string()
}

fn default_backoff_max() -> String {
    "5s".to_string()
}

fn default_backoff_factor() -> f64 {
    2.0
}

impl Default for SupervisorSection {
    fn default() -> Self {
        Self {
            shutdown_timeout: default_shutdown_timeout(),
            stop_grace: default_stop_grace(),
            stable_uptime: default_stable_uptime(),
            backoff_first: default_backoff_first(),
            backoff_max: default_backoff_max(),
            backoff_factor: default_backoff_factor(),
        }
    }
}

/// `[process.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcessConfig {
    /// Executable path, or a full command line when `shell = true`.
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Run through the platform shell (`sh -c` / `cmd /C`).
    #[serde(default)]
    pub shell: bool,

    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default)]
    pub auto_start: bool,

    #[serde(default = "default_true")]
    pub auto_restart: bool,

    /// Exit codes that count as a deliberate stop.
    #[serde(default = "default_exit_codes")]
    pub exit_codes: Vec<i32>,

    /// Automatic restarts allowed before the process is marked failed.
    #[serde(default = "default_exit_retries")]
    pub exit_retries: u32,

    #[serde(default)]
    pub run_as: Option<RunAsConfig>,
}

fn default_true() -> bool {
    true
}

fn default_exit_codes() -> Vec<i32> {
    vec![0]
}

fn default_exit_retries() -> u32 {
    3
}

/// `[process.<name>.run_as]` table.
#[derive(Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunAsConfig {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl std::fmt::Debug for RunAsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunAsConfig")
            .field("username", &self.username)
            .field("domain", &self.domain)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Validated configuration.
///
/// Only obtainable through `TryFrom<RawConfigFile>`, so holding one means
/// every duration parsed and every process section made sense.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    settings: SupervisorSettings,
    processes: Vec<ProcessSpec>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(settings: SupervisorSettings, processes: Vec<ProcessSpec>) -> Self {
        Self {
            settings,
            processes,
        }
    }

    pub fn settings(&self) -> SupervisorSettings {
        self.settings
    }

    /// Process specs, sorted by name.
    pub fn specs(&self) -> &[ProcessSpec] {
        &self.processes
    }

    pub fn into_specs(self) -> Vec<ProcessSpec> {
        self.processes
    }
}

impl ProcessConfig {
    pub(crate) fn to_spec(&self, name: &str) -> ProcessSpec {
        let mut spec = ProcessSpec::new(name, self.command.trim());
        spec.args = self.args.clone();
        spec.shell = self.shell;
        spec.working_dir = self.working_dir.clone();
        spec.env = self.env.clone();
        spec.auto_start = self.auto_start;
        spec.auto_restart = self.auto_restart;
        spec.exit_codes = self.exit_codes.iter().copied().collect();
        spec.exit_retries = self.exit_retries;
        spec.run_as = self.run_as.as_ref().map(|r| RunAs {
            username: r.username.clone(),
            domain: r.domain.clone(),
            password: r.password.clone(),
        });
        spec
    }
}

/// Parse `"250ms"`, `"5s"`, `"2m"` or `"1h"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| format!("duration '{s}' is missing a unit suffix (ms, s, m, h)"))?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{num_part}': {e}"))?;

    match unit_part.trim().to_lowercase().as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value.saturating_mul(60))),
        "h" => Ok(Duration::from_secs(value.saturating_mul(60 * 60))),
        unit => Err(format!(
            "unsupported duration unit '{unit}'; expected ms, s, m, or h"
        )),
    }
}

impl SupervisorSection {
    pub(crate) fn to_settings(&self) -> Result<SupervisorSettings, String> {
        let field = |key: &str, value: &str| {
            parse_duration(value).map_err(|e| format!("[supervisor].{key}: {e}"))
        };

        Ok(SupervisorSettings {
            shutdown_timeout: field("shutdown_timeout", &self.shutdown_timeout)?,
            stop_grace: field("stop_grace", &self.stop_grace)?,
            stable_uptime: field("stable_uptime", &self.stable_uptime)?,
            backoff: BackoffPolicy {
                first: field("backoff_first", &self.backoff_first)?,
                max: field("backoff_max", &self.backoff_max)?,
                factor: self.backoff_factor,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_units() {
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration(" 5s "), Ok(Duration::from_secs(5)));
        assert_eq!(parse_duration("2m"), Ok(Duration::from_secs(120)));
        assert_eq!(parse_duration("1H"), Ok(Duration::from_secs(3600)));
    }

    #[test]
    fn rejects_bad_durations() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("5d").is_err());
        assert!(parse_duration("ms").is_err());
    }

    #[test]
    fn process_section_defaults() {
        let raw: RawConfigFile = toml::from_str(
            r#"
            [process.web]
            command = "web"
            "#,
        )
        .unwrap();

        let cfg = &raw.process["web"];
        assert!(cfg.auto_restart);
        assert!(!cfg.auto_start);
        assert!(!cfg.shell);
        assert_eq!(cfg.exit_codes, vec![0]);
        assert_eq!(cfg.exit_retries, 3);
        assert_eq!(raw.supervisor.backoff_factor, 2.0);
    }
}

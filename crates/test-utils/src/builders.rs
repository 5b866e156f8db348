#![allow(dead_code)]

use std::collections::BTreeMap;
use std::time::Duration;

use procwarden::config::{ConfigFile, ProcessConfig, RawConfigFile, SupervisorSection};
use procwarden::engine::{BackoffPolicy, SupervisorSettings};
use procwarden::registry::ProcessSpec;

/// Settings for fast tests: no backoff, short grace periods.
pub fn fast_settings() -> SupervisorSettings {
    SupervisorSettings {
        shutdown_timeout: Duration::from_secs(2),
        stop_grace: Duration::from_millis(200),
        stable_uptime: Duration::from_secs(30),
        backoff: BackoffPolicy::immediate(),
    }
}

/// Builder for `ProcessSpec`.
pub struct ProcessSpecBuilder {
    spec: ProcessSpec,
}

impl ProcessSpecBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            spec: ProcessSpec::new(name, format!("/usr/bin/{name}")),
        }
    }

    pub fn command(mut self, command: &str) -> Self {
        self.spec.command = command.to_string();
        self
    }

    pub fn shell(mut self, command_line: &str) -> Self {
        self.spec.command = command_line.to_string();
        self.spec.shell = true;
        self
    }

    pub fn arg(mut self, arg: &str) -> Self {
        self.spec.args.push(arg.to_string());
        self
    }

    pub fn auto_start(mut self, on: bool) -> Self {
        self.spec.auto_start = on;
        self
    }

    pub fn auto_restart(mut self, on: bool) -> Self {
        self.spec.auto_restart = on;
        self
    }

    pub fn exit_codes(mut self, codes: &[i32]) -> Self {
        self.spec.exit_codes = codes.iter().copied().collect();
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.spec.exit_retries = retries;
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.spec.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn working_dir(mut self, dir: impl Into<std::path::PathBuf>) -> Self {
        self.spec.working_dir = Some(dir.into());
        self
    }

    pub fn build(self) -> ProcessSpec {
        self.spec
    }
}

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                supervisor: SupervisorSection::default(),
                process: BTreeMap::new(),
            },
        }
    }

    pub fn with_process(mut self, name: &str, command: &str) -> Self {
        self.config
            .process
            .insert(name.to_string(), process_config(command));
        self
    }

    pub fn with_process_config(mut self, name: &str, process: ProcessConfig) -> Self {
        self.config.process.insert(name.to_string(), process);
        self
    }

    pub fn with_backoff(mut self, first: &str, max: &str, factor: f64) -> Self {
        self.config.supervisor.backoff_first = first.to_string();
        self.config.supervisor.backoff_max = max.to_string();
        self.config.supervisor.backoff_factor = factor;
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A `[process.<name>]` section with every optional field at its default.
pub fn process_config(command: &str) -> ProcessConfig {
    ProcessConfig {
        command: command.to_string(),
        args: Vec::new(),
        shell: false,
        working_dir: None,
        env: BTreeMap::new(),
        auto_start: false,
        auto_restart: true,
        exit_codes: vec![0],
        exit_retries: 3,
        run_as: None,
    }
}

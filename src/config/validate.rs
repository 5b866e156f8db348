// src/config/validate.rs

use crate::config::model::{ConfigFile, ProcessConfig, RawConfigFile};
use crate::engine::SupervisorSettings;
use crate::errors::{Result, SupervisorError};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::SupervisorError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let settings = validate_raw_config(&raw)?;
        let specs = raw
            .process
            .iter()
            .map(|(name, process)| process.to_spec(name))
            .collect();
        Ok(ConfigFile::new_unchecked(settings, specs))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<SupervisorSettings> {
    ensure_has_processes(cfg)?;
    let settings = validate_supervisor(cfg)?;
    for (name, process) in cfg.process.iter() {
        validate_process(name, process)?;
    }
    Ok(settings)
}

fn ensure_has_processes(cfg: &RawConfigFile) -> Result<()> {
    if cfg.process.is_empty() {
        return Err(SupervisorError::Config(
            "config must contain at least one [process.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_supervisor(cfg: &RawConfigFile) -> Result<SupervisorSettings> {
    let settings = cfg.supervisor.to_settings().map_err(SupervisorError::Config)?;

    let factor = cfg.supervisor.backoff_factor;
    if !factor.is_finite() || factor < 1.0 {
        return Err(SupervisorError::Config(format!(
            "[supervisor].backoff_factor must be a finite number >= 1.0 (got {factor})"
        )));
    }
    if settings.backoff.first > settings.backoff.max {
        return Err(SupervisorError::Config(format!(
            "[supervisor].backoff_first ({:?}) must not exceed backoff_max ({:?})",
            settings.backoff.first, settings.backoff.max
        )));
    }

    Ok(settings)
}

fn validate_process(name: &str, process: &ProcessConfig) -> Result<()> {
    if name.trim().is_empty() {
        return Err(SupervisorError::Config(
            "process names must not be empty".to_string(),
        ));
    }
    if process.command.trim().is_empty() {
        return Err(SupervisorError::Config(format!(
            "process '{name}' has an empty `command`"
        )));
    }
    if process.env.keys().any(|k| k.is_empty() || k.contains('=')) {
        return Err(SupervisorError::Config(format!(
            "process '{name}' has an invalid environment variable name in `env`"
        )));
    }
    if let Some(run_as) = &process.run_as {
        if run_as.username.trim().is_empty() {
            return Err(SupervisorError::Config(format!(
                "process '{name}' sets `run_as` without a username"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Result<ConfigFile> {
        let raw: RawConfigFile = toml::from_str(src)?;
        ConfigFile::try_from(raw)
    }

    #[test]
    fn minimal_config_is_valid() {
        let cfg = parse(
            r#"
            [process.api]
            command = "api"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.specs().len(), 1);
        assert_eq!(cfg.settings(), SupervisorSettings::default());
    }

    #[test]
    fn specs_are_sorted_by_name() {
        let cfg = parse(
            r#"
            [process.zeta]
            command = "z"

            [process.alpha]
            command = "a"
            "#,
        )
        .unwrap();
        let names: Vec<&str> = cfg.specs().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[test]
    fn empty_config_is_rejected() {
        let err = parse("").unwrap_err();
        assert!(matches!(err, SupervisorError::Config(_)));
    }

    #[test]
    fn blank_command_is_rejected() {
        let err = parse(
            r#"
            [process.api]
            command = "   "
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("empty `command`"));
    }

    #[test]
    fn backoff_factor_below_one_is_rejected() {
        let err = parse(
            r#"
            [supervisor]
            backoff_factor = 0.5

            [process.api]
            command = "api"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("backoff_factor"));
    }

    #[test]
    fn backoff_first_above_max_is_rejected() {
        let err = parse(
            r#"
            [supervisor]
            backoff_first = "10s"
            backoff_max = "1s"

            [process.api]
            command = "api"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("backoff_first"));
    }

    #[test]
    fn run_as_requires_username() {
        let err = parse(
            r#"
            [process.api]
            command = "api"

            [process.api.run_as]
            password = "secret"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("without a username"));
        assert!(!err.to_string().contains("secret"));
    }

    #[test]
    fn bad_duration_names_the_field() {
        let err = parse(
            r#"
            [supervisor]
            stop_grace = "soon"

            [process.api]
            command = "api"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("stop_grace"));
    }
}

// tests/integration/error_handling.rs

use std::io::Write;
use std::time::Duration;

use tempfile::NamedTempFile;

use procwarden::config::load_and_validate;
use procwarden::errors::SupervisorError;
use procwarden_test_utils::builders::{ConfigFileBuilder, process_config};

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    file
}

#[test]
fn full_config_round_trips_into_specs() {
    let file = write_config(
        r#"
[supervisor]
shutdown_timeout = "3s"
stop_grace = "500ms"
backoff_first = "50ms"
backoff_max = "2s"
backoff_factor = 3.0

[process.api]
command = "/usr/local/bin/api"
args = ["--port", "8080"]
auto_start = true
exit_codes = [0, 64]
exit_retries = 5
env = { RUST_LOG = "info" }

[process.worker]
command = "python worker.py"
shell = true
auto_restart = false

[process.worker.run_as]
username = "svc"
"#,
    );

    let cfg = load_and_validate(file.path()).unwrap();

    let settings = cfg.settings();
    assert_eq!(settings.shutdown_timeout, Duration::from_secs(3));
    assert_eq!(settings.stop_grace, Duration::from_millis(500));
    assert_eq!(settings.stable_uptime, Duration::from_secs(30));
    assert_eq!(settings.backoff.first, Duration::from_millis(50));
    assert_eq!(settings.backoff.factor, 3.0);

    let specs = cfg.specs();
    assert_eq!(specs.len(), 2);

    let api = &specs[0];
    assert_eq!(api.name, "api");
    assert_eq!(api.args, vec!["--port", "8080"]);
    assert!(api.auto_start);
    assert!(api.is_expected_exit(64));
    assert!(!api.is_expected_exit(1));
    assert_eq!(api.exit_retries, 5);
    assert_eq!(api.env.get("RUST_LOG").map(String::as_str), Some("info"));

    let worker = &specs[1];
    assert!(worker.shell);
    assert!(!worker.auto_restart);
    assert_eq!(worker.run_as.as_ref().map(|r| r.username.as_str()), Some("svc"));
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = load_and_validate(dir.path().join("nope.toml"));

    match result {
        Err(SupervisorError::Io(_)) => {}
        Err(e) => panic!("Expected Io error, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn malformed_toml_is_a_toml_error() {
    let file = write_config("[process.api\ncommand = ");
    let result = load_and_validate(file.path());

    match result {
        Err(err @ SupervisorError::Toml(_)) => assert_eq!(err.kind(), "toml"),
        Err(e) => panic!("Expected Toml error, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn unknown_process_key_is_rejected() {
    let file = write_config(
        r#"
[process.api]
command = "api"
restart_forever = true
"#,
    );

    assert!(matches!(
        load_and_validate(file.path()),
        Err(SupervisorError::Toml(_))
    ));
}

#[test]
fn config_without_processes_returns_config_error() {
    let file = write_config(
        r#"
[supervisor]
shutdown_timeout = "1s"
"#,
    );

    match load_and_validate(file.path()) {
        Err(SupervisorError::Config(msg)) => assert!(msg.contains("at least one")),
        Err(e) => panic!("Expected Config error, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn bad_environment_key_returns_config_error() {
    let mut process = process_config("api");
    process.env.insert("A=B".to_string(), "x".to_string());

    let raw = ConfigFileBuilder::new()
        .with_process_config("api", process)
        .raw();

    let err = procwarden::config::ConfigFile::try_from(raw).unwrap_err();
    assert_eq!(err.kind(), "config");
    assert!(err.to_string().contains("environment variable"));
}

#[test]
fn builder_applies_backoff_settings() {
    let cfg = ConfigFileBuilder::new()
        .with_process("api", "api")
        .with_backoff("1s", "1m", 1.5)
        .build();

    let backoff = cfg.settings().backoff;
    assert_eq!(backoff.first, Duration::from_secs(1));
    assert_eq!(backoff.max, Duration::from_secs(60));
    assert_eq!(backoff.next(1), Duration::from_millis(1500));
}

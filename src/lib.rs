// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod registry;
pub mod types;

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::{ConfigFile, parse_duration};
use crate::engine::{ServiceLifecycle, Supervisor};
use crate::exec::RealSpawnExecutor;

/// What the host asked the supervisor to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HostSignal {
    Shutdown,
    Pause,
    Continue,
    Reload,
}

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the supervisor and its real process executor
/// - OS signal handling (Ctrl-C / SIGTERM, SIGUSR1 / SIGUSR2, SIGHUP)
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let mut settings = cfg.settings();
    if let Some(raw) = args.shutdown_timeout.as_deref() {
        settings.shutdown_timeout = parse_duration(raw)
            .map_err(|e| anyhow::anyhow!("--shutdown-timeout: {e}"))?;
    }

    let supervisor = Supervisor::new(RealSpawnExecutor::new(), settings);
    for spec in cfg.into_specs() {
        supervisor.register(spec)?;
    }
    info!(processes = supervisor.registry().len(), "processes registered");

    let mut signals = HostSignals::install()?;
    if let Err(err) = supervisor.on_start().await {
        warn!(error = %err, "not every auto-start process came up");
    }

    loop {
        match signals.next().await? {
            HostSignal::Shutdown => break,
            HostSignal::Pause => log_hook("pause", supervisor.on_pause().await),
            HostSignal::Continue => log_hook("continue", supervisor.on_continue().await),
            HostSignal::Reload => {
                log_hook("stop", supervisor.on_stop().await);
                log_hook("start", supervisor.on_start().await);
            }
        }
    }

    info!("shutdown requested");
    let report = supervisor.shutdown(settings.shutdown_timeout).await;
    if !report.is_clean() {
        bail!(
            "shutdown timed out; processes not drained cleanly: {}",
            report.stragglers.join(", ")
        );
    }
    Ok(())
}

fn log_hook(hook: &str, result: errors::Result<()>) {
    match result {
        Ok(()) => debug!(hook, "lifecycle hook completed"),
        Err(err) => warn!(hook, error = %err, "lifecycle hook reported a failure"),
    }
}

/// OS signal listeners, installed once for the lifetime of `run`.
#[cfg(unix)]
struct HostSignals {
    term: tokio::signal::unix::Signal,
    usr1: tokio::signal::unix::Signal,
    usr2: tokio::signal::unix::Signal,
    hup: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl HostSignals {
    fn install() -> Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        Ok(Self {
            term: signal(SignalKind::terminate()).context("installing SIGTERM handler")?,
            usr1: signal(SignalKind::user_defined1()).context("installing SIGUSR1 handler")?,
            usr2: signal(SignalKind::user_defined2()).context("installing SIGUSR2 handler")?,
            hup: signal(SignalKind::hangup()).context("installing SIGHUP handler")?,
        })
    }

    async fn next(&mut self) -> Result<HostSignal> {
        let sig = tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res.context("listening for Ctrl-C")?;
                HostSignal::Shutdown
            }
            _ = self.term.recv() => HostSignal::Shutdown,
            _ = self.usr1.recv() => HostSignal::Pause,
            _ = self.usr2.recv() => HostSignal::Continue,
            _ = self.hup.recv() => HostSignal::Reload,
        };
        debug!(signal = ?sig, "received host signal");
        Ok(sig)
    }
}

#[cfg(not(unix))]
struct HostSignals;

#[cfg(not(unix))]
impl HostSignals {
    fn install() -> Result<Self> {
        Ok(Self)
    }

    async fn next(&mut self) -> Result<HostSignal> {
        tokio::signal::ctrl_c()
            .await
            .context("listening for Ctrl-C")?;
        Ok(HostSignal::Shutdown)
    }
}

/// Simple dry-run output: print the supervisor settings and every process.
fn print_dry_run(cfg: &ConfigFile) {
    let settings = cfg.settings();
    println!("procwarden dry-run");
    println!("  supervisor.shutdown_timeout = {:?}", settings.shutdown_timeout);
    println!("  supervisor.stop_grace = {:?}", settings.stop_grace);
    println!("  supervisor.stable_uptime = {:?}", settings.stable_uptime);
    println!(
        "  supervisor.backoff = {:?} x{} (max {:?})",
        settings.backoff.first, settings.backoff.factor, settings.backoff.max
    );
    println!();

    println!("processes ({}):", cfg.specs().len());
    for spec in cfg.specs() {
        println!("  - {}", spec.name);
        println!("      command: {}", spec.command_line());
        if spec.shell {
            println!("      shell: true");
        }
        if let Some(ref dir) = spec.working_dir {
            println!("      working_dir: {}", dir.display());
        }
        if !spec.env.is_empty() {
            let keys: Vec<&str> = spec.env.keys().map(String::as_str).collect();
            println!("      env: {keys:?}");
        }
        println!("      auto_start: {}", spec.auto_start);
        println!("      auto_restart: {}", spec.auto_restart);
        println!("      exit_codes: {:?}", spec.exit_codes);
        println!("      exit_retries: {}", spec.exit_retries);
        if let Some(ref run_as) = spec.run_as {
            println!("      run_as: {}", run_as.username);
        }
    }

    debug!("dry-run complete (nothing started)");
}

// src/exec/mod.rs

//! Process execution layer.
//!
//! This module is responsible for actually creating the OS processes the
//! supervisor manages, using `tokio::process::Command`, and for the
//! signal-level operations on them (graceful termination, suspend, resume).
//!
//! - [`backend`] provides the `SpawnExecutor` / `ChildProcess` traits and the
//!   `RealSpawnExecutor` used in production, which tests replace with a
//!   scripted implementation.
//! - [`child`] wraps a spawned `tokio::process::Child`.
//! - [`credentials`] resolves run-as users.
//! - [`output`] drains child stdout/stderr into the log.

pub mod backend;
pub mod child;
pub mod credentials;
pub mod output;

pub use backend::{ChildFuture, ChildProcess, ExitOutcome, RealSpawnExecutor, SpawnExecutor, Spawned};

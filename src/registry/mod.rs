// src/registry/mod.rs

//! Process registry: the single source of truth for supervised processes.
//!
//! - [`spec`] holds the immutable per-process configuration.
//! - [`state`] holds the mutable runtime state and the snapshot types that
//!   leave the registry.
//! - [`store`] is the thread-safe name -> (spec, state) map with the
//!   compare-and-set mutation primitive used by monitors and the dispatcher.

pub mod spec;
pub mod state;
pub mod store;

pub use spec::{ProcessSpec, RunAs};
pub use state::{ProcessSnapshot, ProcessState, StatusReport};
pub use store::Registry;

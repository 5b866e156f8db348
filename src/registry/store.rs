// src/registry/store.rs

//! Thread-safe registry of supervised processes.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::errors::{Result, SupervisorError};
use crate::registry::spec::ProcessSpec;
use crate::registry::state::{ProcessSnapshot, ProcessState};
use crate::types::ProcessStatus;

#[derive(Debug)]
struct Entry {
    spec: Arc<ProcessSpec>,
    state: ProcessState,
}

impl Entry {
    fn snapshot(&self) -> ProcessSnapshot {
        ProcessSnapshot {
            spec: Arc::clone(&self.spec),
            state: self.state.clone(),
        }
    }
}

/// Authoritative name -> (spec, state) map.
///
/// Every read returns a snapshot taken under one lock acquisition, and every
/// state change goes through [`Registry::compare_and_update`]. The lock is
/// never held across an `.await`.
#[derive(Debug, Default)]
pub struct Registry {
    entries: RwLock<HashMap<String, Entry>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a new process in the `Stopped` state.
    pub fn register(&self, spec: ProcessSpec) -> Result<()> {
        let mut entries = self.entries.write();
        if entries.contains_key(&spec.name) {
            return Err(SupervisorError::DuplicateName(spec.name));
        }

        debug!(process = %spec.name, cmd = %spec.command_line(), "registered process");
        entries.insert(
            spec.name.clone(),
            Entry {
                spec: Arc::new(spec),
                state: ProcessState::default(),
            },
        );
        Ok(())
    }

    /// Remove an idle (`Stopped` or `Failed`) process.
    ///
    /// Live processes must be stopped first; removing them here would leave
    /// a monitor writing into an entry that no longer exists.
    pub fn deregister(&self, name: &str) -> Result<Arc<ProcessSpec>> {
        let mut entries = self.entries.write();
        let entry = entries
            .get(name)
            .ok_or_else(|| SupervisorError::NotFound(name.to_string()))?;

        if entry.state.status.is_live() {
            return Err(SupervisorError::Conflict {
                name: name.to_string(),
                expected: ProcessStatus::Stopped,
                actual: entry.state.status,
            });
        }

        let entry = entries
            .remove(name)
            .ok_or_else(|| SupervisorError::NotFound(name.to_string()))?;
        debug!(process = %name, "deregistered process");
        Ok(entry.spec)
    }

    pub fn get(&self, name: &str) -> Result<ProcessSnapshot> {
        self.entries
            .read()
            .get(name)
            .map(Entry::snapshot)
            .ok_or_else(|| SupervisorError::NotFound(name.to_string()))
    }

    pub fn spec(&self, name: &str) -> Result<Arc<ProcessSpec>> {
        self.entries
            .read()
            .get(name)
            .map(|e| Arc::clone(&e.spec))
            .ok_or_else(|| SupervisorError::NotFound(name.to_string()))
    }

    pub fn status(&self, name: &str) -> Result<ProcessStatus> {
        self.entries
            .read()
            .get(name)
            .map(|e| e.state.status)
            .ok_or_else(|| SupervisorError::NotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    /// Atomically move `name` from `expected` to `next`.
    pub fn compare_and_set(
        &self,
        name: &str,
        expected: ProcessStatus,
        next: ProcessStatus,
    ) -> Result<ProcessSnapshot> {
        self.compare_and_update(name, expected, next, |_| {})
    }

    /// Atomically move `name` from `expected` to `next`, applying `edit` to
    /// the state in the same critical section.
    ///
    /// Fails with [`SupervisorError::Conflict`] if the current status is not
    /// `expected`; nothing is modified in that case. Leaving `Running` /
    /// `Stopping` always clears `pid`, `paused` and `started_at`.
    pub fn compare_and_update<F>(
        &self,
        name: &str,
        expected: ProcessStatus,
        next: ProcessStatus,
        edit: F,
    ) -> Result<ProcessSnapshot>
    where
        F: FnOnce(&mut ProcessState),
    {
        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(name)
            .ok_or_else(|| SupervisorError::NotFound(name.to_string()))?;

        if entry.state.status != expected {
            return Err(SupervisorError::Conflict {
                name: name.to_string(),
                expected,
                actual: entry.state.status,
            });
        }

        edit(&mut entry.state);
        entry.state.status = next;
        if !matches!(next, ProcessStatus::Running | ProcessStatus::Stopping) {
            entry.state.pid = None;
            entry.state.paused = false;
            entry.state.started_at = None;
        }

        trace!(process = %name, from = %expected, to = %next, "state transition");
        Ok(entry.snapshot())
    }

    /// Snapshot of every entry, sorted by name.
    ///
    /// The lock is released before returning, so callers may take their
    /// time with the result.
    pub fn list(&self) -> Vec<ProcessSnapshot> {
        let mut all: Vec<ProcessSnapshot> =
            self.entries.read().values().map(Entry::snapshot).collect();
        all.sort_by(|a, b| a.spec.name.cmp(&b.spec.name));
        all
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(names: &[&str]) -> Registry {
        let reg = Registry::new();
        for name in names {
            reg.register(ProcessSpec::new(*name, "/bin/true")).unwrap();
        }
        reg
    }

    #[test]
    fn registered_process_starts_stopped() {
        let reg = registry_with(&["a"]);
        let snap = reg.get("a").unwrap();
        assert_eq!(snap.status(), ProcessStatus::Stopped);
        assert_eq!(snap.state.retry_count, 0);
        assert_eq!(snap.state.pid, None);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let reg = registry_with(&["a"]);
        let err = reg.register(ProcessSpec::new("a", "/bin/false")).unwrap_err();
        assert!(matches!(err, SupervisorError::DuplicateName(ref n) if n == "a"));
        assert_eq!(reg.spec("a").unwrap().command, "/bin/true");
    }

    #[test]
    fn deregister_then_get_is_not_found() {
        let reg = registry_with(&["a"]);
        reg.deregister("a").unwrap();
        assert!(matches!(reg.get("a"), Err(SupervisorError::NotFound(_))));
        assert!(matches!(reg.deregister("a"), Err(SupervisorError::NotFound(_))));
    }

    #[test]
    fn deregister_refuses_live_entries() {
        let reg = registry_with(&["a"]);
        reg.compare_and_set("a", ProcessStatus::Stopped, ProcessStatus::Starting)
            .unwrap();
        let err = reg.deregister("a").unwrap_err();
        assert!(matches!(
            err,
            SupervisorError::Conflict {
                actual: ProcessStatus::Starting,
                ..
            }
        ));
        assert!(reg.contains("a"));
    }

    #[test]
    fn compare_and_set_rejects_stale_expectation() {
        let reg = registry_with(&["a"]);
        reg.compare_and_set("a", ProcessStatus::Stopped, ProcessStatus::Starting)
            .unwrap();

        let err = reg
            .compare_and_set("a", ProcessStatus::Stopped, ProcessStatus::Starting)
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(reg.status("a").unwrap(), ProcessStatus::Starting);
    }

    #[test]
    fn leaving_running_clears_pid_and_pause() {
        let reg = registry_with(&["a"]);
        reg.compare_and_set("a", ProcessStatus::Stopped, ProcessStatus::Starting)
            .unwrap();
        reg.compare_and_update("a", ProcessStatus::Starting, ProcessStatus::Running, |s| {
            s.pid = Some(42);
            s.paused = true;
        })
        .unwrap();
        assert_eq!(reg.get("a").unwrap().state.pid, Some(42));

        let snap = reg
            .compare_and_update("a", ProcessStatus::Running, ProcessStatus::Stopped, |s| {
                s.last_exit_code = Some(0);
            })
            .unwrap();
        assert_eq!(snap.state.pid, None);
        assert!(!snap.state.paused);
        assert_eq!(snap.state.last_exit_code, Some(0));
    }

    #[test]
    fn list_is_sorted_snapshot() {
        let reg = registry_with(&["c", "a", "b"]);
        let names: Vec<String> = reg.list().iter().map(|s| s.name().to_string()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(reg.names(), names);
        assert_eq!(reg.len(), 3);
    }
}

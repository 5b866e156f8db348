use proptest::prelude::*;

use procwarden::registry::Registry;
use procwarden::types::ProcessStatus;
use procwarden_test_utils::builders::ProcessSpecBuilder;

const STATUSES: [ProcessStatus; 5] = [
    ProcessStatus::Stopped,
    ProcessStatus::Starting,
    ProcessStatus::Running,
    ProcessStatus::Stopping,
    ProcessStatus::Failed,
];

fn status_strategy() -> impl Strategy<Value = ProcessStatus> {
    (0..STATUSES.len()).prop_map(|i| STATUSES[i])
}

// A random CAS attempt: (target name index, expected, next, pid to record).
fn op_strategy() -> impl Strategy<Value = (usize, ProcessStatus, ProcessStatus, u32)> {
    (0usize..3, status_strategy(), status_strategy(), 1u32..100_000)
}

proptest! {
    #[test]
    fn cas_only_applies_when_expected_matches(
        ops in proptest::collection::vec(op_strategy(), 1..60)
    ) {
        let names = ["a", "b", "c"];
        let registry = Registry::new();
        for name in names {
            registry.register(ProcessSpecBuilder::new(name).build()).unwrap();
        }

        // Shadow model of the statuses.
        let mut model = [ProcessStatus::Stopped; 3];

        for (idx, expected, next, pid) in ops {
            let name = names[idx];
            let result = registry.compare_and_update(name, expected, next, |s| {
                s.pid = Some(pid);
            });

            if model[idx] == expected {
                prop_assert!(result.is_ok());
                model[idx] = next;
            } else {
                prop_assert!(result.is_err());
                let err = result.unwrap_err();
                prop_assert!(err.is_transient());
            }

            for (i, other) in names.iter().enumerate() {
                let snap = registry.get(other).unwrap();
                prop_assert_eq!(snap.status(), model[i]);
                // pid is only ever visible while a process is live.
                if !matches!(snap.status(), ProcessStatus::Running | ProcessStatus::Stopping) {
                    prop_assert_eq!(snap.state.pid, None);
                    prop_assert!(!snap.state.paused);
                }
            }
        }
    }

    #[test]
    fn only_idle_entries_can_be_deregistered(status in status_strategy()) {
        let registry = Registry::new();
        registry.register(ProcessSpecBuilder::new("p").build()).unwrap();
        if status != ProcessStatus::Stopped {
            registry
                .compare_and_set("p", ProcessStatus::Stopped, status)
                .unwrap();
        }

        let removed = registry.deregister("p");
        prop_assert_eq!(removed.is_ok(), status.is_idle());
        prop_assert_eq!(registry.contains("p"), status.is_live());
    }
}

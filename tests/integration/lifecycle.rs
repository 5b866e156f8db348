// tests/integration/lifecycle.rs

use std::sync::Arc;

use procwarden::engine::{FailureKind, MemorySink, ServiceLifecycle, Supervisor};
use procwarden::errors::SupervisorError;
use procwarden::types::{ProcessStatus, Verb};
use procwarden_test_utils::builders::{ProcessSpecBuilder, fast_settings};
use procwarden_test_utils::fake_executor::{FakeExecutor, Script};
use procwarden_test_utils::{init_tracing, wait_for_status, with_timeout};

fn host_supervisor(exec: FakeExecutor) -> (Supervisor<FakeExecutor>, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let sup = Supervisor::with_sink(exec, fast_settings(), sink.clone());
    sup.register(ProcessSpecBuilder::new("api").auto_start(true).build())
        .unwrap();
    sup.register(ProcessSpecBuilder::new("worker").auto_start(true).build())
        .unwrap();
    sup.register(ProcessSpecBuilder::new("manual").build())
        .unwrap();
    (sup, sink)
}

#[tokio::test]
async fn on_start_only_launches_auto_start_processes() {
    init_tracing();

    let (sup, _sink) = host_supervisor(FakeExecutor::new());
    with_timeout(sup.on_start()).await.unwrap();

    assert_eq!(sup.status("api").unwrap().status, ProcessStatus::Running);
    assert_eq!(sup.status("worker").unwrap().status, ProcessStatus::Running);
    assert_eq!(sup.status("manual").unwrap().status, ProcessStatus::Stopped);
    assert_eq!(sup.executor().spawn_count("manual"), 0);
}

#[tokio::test]
async fn on_pause_and_on_continue_cover_running_processes() {
    init_tracing();

    let (sup, sink) = host_supervisor(FakeExecutor::new());
    with_timeout(sup.on_start()).await.unwrap();

    with_timeout(sup.on_pause()).await.unwrap();
    assert!(sup.status("api").unwrap().paused);
    assert!(sup.status("worker").unwrap().paused);
    // Idle processes are skipped rather than rejected.
    assert_eq!(sink.count(FailureKind::CommandRejected), 0);

    with_timeout(sup.on_continue()).await.unwrap();
    assert!(!sup.status("api").unwrap().paused);
    assert_eq!(sup.executor().resume_count("worker"), 1);
}

#[tokio::test]
async fn on_stop_then_on_start_restarts_everything() {
    init_tracing();

    let (sup, _sink) = host_supervisor(FakeExecutor::new());
    with_timeout(sup.on_start()).await.unwrap();
    with_timeout(sup.on_stop()).await.unwrap();

    for report in sup.status_all() {
        assert_eq!(report.status, ProcessStatus::Stopped, "{}", report.name);
    }

    with_timeout(sup.on_start()).await.unwrap();
    assert_eq!(sup.executor().spawn_count("api"), 2);
    assert_eq!(sup.status("api").unwrap().status, ProcessStatus::Running);
}

#[tokio::test]
async fn on_start_surfaces_the_first_failure() {
    init_tracing();

    let exec = FakeExecutor::new().with_script("api", Script::FailSpawn);
    let (sup, _sink) = host_supervisor(exec);

    let err = with_timeout(sup.on_start()).await.unwrap_err();
    assert!(matches!(err, SupervisorError::Spawn { ref name, .. } if name == "api"));

    // The failure of one process does not keep the others down.
    assert_eq!(sup.status("worker").unwrap().status, ProcessStatus::Running);
}

#[tokio::test]
async fn batch_report_lists_successes_and_failures() {
    let exec = FakeExecutor::new().with_script("worker", Script::FailSpawn);
    let (sup, _sink) = host_supervisor(exec);

    let report = with_timeout(sup.start_all()).await;
    assert!(!report.is_ok());
    assert_eq!(report.succeeded.len(), 1);
    assert_eq!(report.succeeded[0].name, "api");
    assert_eq!(report.succeeded[0].verb, Verb::Start);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "worker");
}

#[tokio::test]
async fn on_shutdown_uses_configured_timeout() {
    init_tracing();

    let (sup, _sink) = host_supervisor(FakeExecutor::new());
    with_timeout(sup.on_start()).await.unwrap();

    with_timeout(sup.on_shutdown()).await.unwrap();
    assert!(sup.is_shutting_down());
    wait_for_status(sup.registry(), "api", ProcessStatus::Stopped).await;
    assert!(matches!(
        sup.register(ProcessSpecBuilder::new("late").build()),
        Err(SupervisorError::ShuttingDown(_))
    ));
}

#[tokio::test]
async fn verbs_parse_from_text() {
    let (sup, _sink) = host_supervisor(FakeExecutor::new());

    for (text, expected) in [("START", ProcessStatus::Running), ("stop", ProcessStatus::Stopped)] {
        let verb: Verb = text.parse().unwrap();
        let outcome = with_timeout(sup.execute(verb, "manual")).await.unwrap();
        assert_eq!(outcome.status, expected);
    }

    assert!("reboot".parse::<Verb>().is_err());
}

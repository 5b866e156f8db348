use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use procwarden::errors::{Result, SupervisorError};
use procwarden::exec::{ChildFuture, ChildProcess, ExitOutcome, SpawnExecutor, Spawned};
use procwarden::registry::ProcessSpec;

/// How a fake process behaves once spawned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    /// Exit with `code` after `after`.
    ExitAfter { code: i32, after: Duration },
    /// Die from `signal` after `after`, as if killed from outside.
    KilledAfter { signal: i32, after: Duration },
    /// Run until the supervisor terminates it.
    RunUntilTerminated,
    /// Run forever and ignore termination requests.
    Hang,
    /// Refuse to spawn at all.
    FailSpawn,
}

impl Script {
    pub fn exit_immediately(code: i32) -> Self {
        Script::ExitAfter {
            code,
            after: Duration::ZERO,
        }
    }

    pub fn exit_after_ms(code: i32, ms: u64) -> Self {
        Script::ExitAfter {
            code,
            after: Duration::from_millis(ms),
        }
    }
}

/// Everything a test may want to assert on afterwards.
#[derive(Debug, Default)]
pub struct FakeLog {
    spawns: HashMap<String, usize>,
    terminated: HashMap<String, usize>,
    suspended: HashMap<String, usize>,
    resumed: HashMap<String, usize>,
}

/// Test-side half of a gate installed with [`FakeExecutor::gate_spawn`].
pub struct SpawnGate {
    entered: Option<oneshot::Receiver<()>>,
    release: mpsc::Sender<()>,
}

impl SpawnGate {
    /// Resolves once the executor is inside `spawn` and blocked on the gate.
    pub async fn entered(&mut self) {
        if let Some(entered) = self.entered.take() {
            let _ = entered.await;
        }
    }

    /// Let the blocked spawn finish and hand back its child.
    pub fn release(&self) {
        let _ = self.release.send(());
    }
}

/// Executor-side half: blocks the spawning thread until released.
struct GateLatch {
    entered: oneshot::Sender<()>,
    release: mpsc::Receiver<()>,
}

/// A scripted executor that never creates real processes.
///
/// Each name gets a queue of [`Script`]s; every spawn pops the front one,
/// and the last script in the queue repeats forever. Names without a script
/// run until terminated.
pub struct FakeExecutor {
    scripts: Mutex<HashMap<String, VecDeque<Script>>>,
    gates: Mutex<HashMap<String, GateLatch>>,
    log: Arc<Mutex<FakeLog>>,
    next_pid: AtomicU32,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            gates: Mutex::new(HashMap::new()),
            log: Arc::new(Mutex::new(FakeLog::default())),
            next_pid: AtomicU32::new(1000),
        }
    }

    /// Every spawn of `name` follows `script`.
    pub fn with_script(self, name: &str, script: Script) -> Self {
        self.with_sequence(name, vec![script])
    }

    /// Spawns of `name` follow `scripts` in order, repeating the last one.
    pub fn with_sequence(self, name: &str, scripts: Vec<Script>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(name.to_string(), scripts.into_iter().collect());
        self
    }

    /// Hold the next spawn of `name` after the child is created but before
    /// it is returned, as if the OS call were still in flight.
    ///
    /// The spawning thread blocks, so tests using this need a multi-thread
    /// runtime.
    pub fn gate_spawn(&self, name: &str) -> SpawnGate {
        let (entered_tx, entered_rx) = oneshot::channel();
        let (release_tx, release_rx) = mpsc::channel();
        self.gates.lock().unwrap().insert(
            name.to_string(),
            GateLatch {
                entered: entered_tx,
                release: release_rx,
            },
        );
        SpawnGate {
            entered: Some(entered_rx),
            release: release_tx,
        }
    }

    pub fn spawn_count(&self, name: &str) -> usize {
        count(&self.log.lock().unwrap().spawns, name)
    }

    pub fn terminate_count(&self, name: &str) -> usize {
        count(&self.log.lock().unwrap().terminated, name)
    }

    pub fn suspend_count(&self, name: &str) -> usize {
        count(&self.log.lock().unwrap().suspended, name)
    }

    pub fn resume_count(&self, name: &str) -> usize {
        count(&self.log.lock().unwrap().resumed, name)
    }

    fn next_script(&self, name: &str) -> Script {
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(name) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(Script::RunUntilTerminated),
            Some(queue) => queue.front().copied().unwrap_or(Script::RunUntilTerminated),
            None => Script::RunUntilTerminated,
        }
    }
}

impl Default for FakeExecutor {
    fn default() -> Self {
        Self::new()
    }
}

fn count(map: &HashMap<String, usize>, name: &str) -> usize {
    map.get(name).copied().unwrap_or(0)
}

#[derive(Clone, Copy)]
enum Call {
    Spawn,
    Terminate,
    Suspend,
    Resume,
}

fn bump(log: &Mutex<FakeLog>, call: Call, name: &str) {
    let mut guard = log.lock().unwrap();
    let map = match call {
        Call::Spawn => &mut guard.spawns,
        Call::Terminate => &mut guard.terminated,
        Call::Suspend => &mut guard.suspended,
        Call::Resume => &mut guard.resumed,
    };
    *map.entry(name.to_string()).or_insert(0) += 1;
}

impl SpawnExecutor for FakeExecutor {
    fn spawn(&self, spec: &ProcessSpec, cancel: &CancellationToken) -> Result<Spawned> {
        if cancel.is_cancelled() {
            return Ok(Spawned::Cancelled);
        }

        let script = self.next_script(&spec.name);
        bump(&self.log, Call::Spawn, &spec.name);

        if script == Script::FailSpawn {
            return Err(SupervisorError::Spawn {
                name: spec.name.clone(),
                reason: "scripted spawn failure".to_string(),
            });
        }

        let child = FakeChild {
            name: spec.name.clone(),
            pid: self.next_pid.fetch_add(1, Ordering::SeqCst),
            script,
            spawned_at: Instant::now(),
            log: Arc::clone(&self.log),
        };

        let gate = self.gates.lock().unwrap().remove(&spec.name);
        if let Some(gate) = gate {
            let _ = gate.entered.send(());
            let _ = gate.release.recv();
        }

        Ok(Spawned::Child(Box::new(child)))
    }
}

/// Child handle produced by [`FakeExecutor`].
pub struct FakeChild {
    name: String,
    pid: u32,
    script: Script,
    spawned_at: Instant,
    log: Arc<Mutex<FakeLog>>,
}

impl ChildProcess for FakeChild {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn wait(&mut self) -> ChildFuture<'_, ExitOutcome> {
        // Deadline is fixed at spawn time, so re-polling `wait` after a
        // pause/continue does not restart the timer.
        let script = self.script;
        let spawned_at = self.spawned_at;
        Box::pin(async move {
            match script {
                Script::ExitAfter { code, after } => {
                    tokio::time::sleep_until(spawned_at + after).await;
                    Ok(ExitOutcome::Exited(code))
                }
                Script::KilledAfter { signal, after } => {
                    tokio::time::sleep_until(spawned_at + after).await;
                    Ok(ExitOutcome::Signalled(Some(signal)))
                }
                Script::RunUntilTerminated | Script::Hang | Script::FailSpawn => {
                    std::future::pending().await
                }
            }
        })
    }

    fn terminate(&mut self, _grace: Duration) -> ChildFuture<'_, ExitOutcome> {
        bump(&self.log, Call::Terminate, &self.name);
        let script = self.script;
        Box::pin(async move {
            match script {
                Script::Hang => std::future::pending().await,
                _ => Ok(ExitOutcome::Signalled(Some(15))),
            }
        })
    }

    fn suspend(&mut self) -> anyhow::Result<()> {
        bump(&self.log, Call::Suspend, &self.name);
        Ok(())
    }

    fn resume(&mut self) -> anyhow::Result<()> {
        bump(&self.log, Call::Resume, &self.name);
        Ok(())
    }
}

//! Supervisor scaling tests with fake processes and resource probes

use async_trait::async_trait;
use crawl_fleet::config::{PressurePolicy, SupervisorConfig};
use crawl_fleet::supervisor::{
    PoolState, ProcProbe, ProcessState, ResourceMonitor, ResourceProbe, SupervisorOptions,
    WorkerLauncher, WorkerProcess, WorkerSpec, WorkerSupervisor,
};
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::NamedTempFile;

/// Fake process whose exit can be triggered from the test
struct FakeProcess {
    exited: Arc<AtomicBool>,
    terminated: Arc<AtomicUsize>,
}

#[async_trait]
impl WorkerProcess for FakeProcess {
    fn pid(&self) -> Option<u32> {
        Some(1)
    }

    fn poll_state(&mut self) -> ProcessState {
        if self.exited.load(Ordering::SeqCst) {
            ProcessState::Exited(Some(1))
        } else {
            ProcessState::Running
        }
    }

    fn terminate(&mut self) -> io::Result<()> {
        self.terminated.fetch_add(1, Ordering::SeqCst);
        self.exited.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn wait_exit(&mut self) -> io::Result<Option<i32>> {
        Ok(Some(0))
    }

    fn kill(&mut self) -> io::Result<()> {
        Ok(())
    }

    async fn release(&mut self) {}
}

/// Records launches; clones share the same records
#[derive(Clone, Default)]
struct FakeLauncher {
    specs: Arc<Mutex<Vec<WorkerSpec>>>,
    exits: Arc<Mutex<Vec<Arc<AtomicBool>>>>,
    terminated: Arc<AtomicUsize>,
}

impl WorkerLauncher for FakeLauncher {
    fn launch(&self, spec: &WorkerSpec) -> io::Result<Box<dyn WorkerProcess>> {
        let exited = Arc::new(AtomicBool::new(false));
        self.specs.lock().unwrap().push(spec.clone());
        self.exits.lock().unwrap().push(Arc::clone(&exited));
        Ok(Box::new(FakeProcess {
            exited,
            terminated: Arc::clone(&self.terminated),
        }))
    }
}

struct Memory(Arc<Mutex<f64>>);

impl ResourceProbe for Memory {
    fn memory_percent(&self) -> io::Result<f64> {
        Ok(*self.0.lock().unwrap())
    }

    fn cpu_temp(&self) -> Option<f64> {
        Some(40.0)
    }
}

fn options(config: &SupervisorConfig) -> SupervisorOptions {
    let mut options = SupervisorOptions::from_config(config, "session-1", Some("9".to_string()));
    options.spawn_stagger = Duration::ZERO;
    options.stop_grace = Duration::from_millis(50);
    options
}

fn build(config: &SupervisorConfig, memory: Arc<Mutex<f64>>) -> (WorkerSupervisor, FakeLauncher) {
    let launcher = FakeLauncher::default();
    let monitor = ResourceMonitor::new(
        Box::new(Memory(memory)),
        config.max_memory_percent,
        config.max_temp,
    );
    let supervisor = WorkerSupervisor::new(Box::new(launcher.clone()), monitor, options(config));
    (supervisor, launcher)
}

fn config(num_workers: usize) -> SupervisorConfig {
    SupervisorConfig {
        num_workers,
        ..SupervisorConfig::default()
    }
}

#[tokio::test]
async fn test_one_tick_yields_target_pool() {
    let (mut supervisor, launcher) = build(&config(3), Arc::new(Mutex::new(20.0)));

    let report = supervisor.tick().await;

    assert_eq!(report.state, PoolState::Running);
    assert_eq!(supervisor.pool_size(), 3);

    let specs = launcher.specs.lock().unwrap();
    assert_eq!(specs.len(), 3);
    assert!(specs.iter().all(|s| s.session == "session-1"));
    assert!(specs.iter().all(|s| s.institution_id.as_deref() == Some("9")));
    assert!(specs.iter().all(|s| s.worker_id.len() == 8));
}

#[tokio::test]
async fn test_pressure_blocks_spawning() {
    let (mut supervisor, launcher) = build(&config(3), Arc::new(Mutex::new(99.0)));

    let report = supervisor.tick().await;

    assert_eq!(report.state, PoolState::Paused);
    assert_eq!(report.spawned, 0);
    assert!(launcher.specs.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_dead_worker_replaced() {
    let (mut supervisor, launcher) = build(&config(2), Arc::new(Mutex::new(20.0)));
    supervisor.tick().await;

    launcher.exits.lock().unwrap()[0].store(true, Ordering::SeqCst);
    let report = supervisor.tick().await;

    assert_eq!(report.reaped, 1);
    assert_eq!(report.spawned, 1);
    assert_eq!(supervisor.pool_size(), 2);
    assert_eq!(launcher.specs.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn test_stale_worker_replaced() {
    let mut cfg = config(1);
    cfg.restart_interval_secs = 0;
    let (mut supervisor, launcher) = build(&cfg, Arc::new(Mutex::new(20.0)));

    supervisor.tick().await;
    let report = supervisor.tick().await;

    assert_eq!(report.reaped, 1);
    assert_eq!(report.spawned, 1);
    assert_eq!(launcher.terminated.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_drain_policy_stops_every_worker() {
    let memory = Arc::new(Mutex::new(20.0));
    let mut cfg = config(3);
    cfg.pressure_policy = PressurePolicy::Drain;
    let (mut supervisor, launcher) = build(&cfg, Arc::clone(&memory));

    supervisor.tick().await;
    *memory.lock().unwrap() = 95.0;
    let report = supervisor.tick().await;

    assert_eq!(report.drained, 3);
    assert_eq!(supervisor.pool_size(), 0);
    assert_eq!(launcher.terminated.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_shutdown_signals_every_worker() {
    let (mut supervisor, launcher) = build(&config(4), Arc::new(Mutex::new(20.0)));
    supervisor.tick().await;

    supervisor.shutdown().await;

    assert_eq!(supervisor.state(), PoolState::ShuttingDown);
    assert_eq!(launcher.terminated.load(Ordering::SeqCst), 4);
    assert_eq!(supervisor.pool_size(), 0);
}

#[test]
fn test_proc_probe_with_fixture_files() {
    let mut meminfo = NamedTempFile::new().unwrap();
    writeln!(
        meminfo,
        "MemTotal:       8000000 kB\nMemFree:         500000 kB\nMemAvailable:   2000000 kB"
    )
    .unwrap();
    let mut thermal = NamedTempFile::new().unwrap();
    writeln!(thermal, "81000").unwrap();

    let monitor = ResourceMonitor::new(
        Box::new(ProcProbe::with_paths(meminfo.path(), thermal.path())),
        80.0,
        75.0,
    );
    let snapshot = monitor.sample();

    assert_eq!(snapshot.memory_percent, 75.0);
    assert_eq!(snapshot.cpu_temp, 81.0);
    assert!(!snapshot.within_limits);
}

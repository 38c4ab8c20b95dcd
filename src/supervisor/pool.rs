//! Resource-aware worker pool

use super::handle::{new_worker_id, StopOutcome, WorkerHandle};
use super::process::{WorkerLauncher, WorkerSpec};
use super::resources::{ResourceMonitor, ResourceSnapshot};
use super::state::PoolState;
use crate::config::{PressurePolicy, SupervisorConfig};
use futures::future::join_all;
use std::time::Duration;
use tokio::sync::watch;

/// Pool sizing and lifecycle settings
#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    pub num_workers: usize,
    pub session: String,
    pub institution_id: Option<String>,
    pub tick_interval: Duration,
    pub restart_interval: Duration,
    pub stop_grace: Duration,
    pub spawn_stagger: Duration,
    pub pressure_policy: PressurePolicy,
    pub pressure_cooldown: Duration,
}

impl SupervisorOptions {
    pub fn from_config(
        config: &SupervisorConfig,
        session: impl Into<String>,
        institution_id: Option<String>,
    ) -> Self {
        Self {
            num_workers: config.num_workers,
            session: session.into(),
            institution_id,
            tick_interval: config.tick_interval(),
            restart_interval: config.restart_interval(),
            stop_grace: config.stop_grace(),
            spawn_stagger: config.spawn_stagger(),
            pressure_policy: config.pressure_policy,
            pressure_cooldown: config.pressure_cooldown(),
        }
    }
}

/// What one scaling tick did
#[derive(Debug, Clone)]
pub struct TickReport {
    pub snapshot: Option<ResourceSnapshot>,
    pub state: PoolState,
    /// Workers stopped because of resource pressure
    pub drained: usize,
    /// Dead or stale workers removed
    pub reaped: usize,
    pub spawned: usize,
    pub spawn_failures: usize,
    /// Workers in the pool after the tick
    pub pool_size: usize,
}

/// Owns the worker pool and keeps it sized against host resources
///
/// # Tick
///
/// 1. Sample resources; under pressure apply the pressure policy and spawn
///    nothing this tick
/// 2. Stop and remove workers that exited or outlived `restart_interval`
/// 3. Spawn up to the deficit, staggered
///
/// A spawn failure leaves the slot open for the next tick.
pub struct WorkerSupervisor {
    launcher: Box<dyn WorkerLauncher>,
    monitor: ResourceMonitor,
    options: SupervisorOptions,
    workers: Vec<WorkerHandle>,
    state: PoolState,
}

impl WorkerSupervisor {
    pub fn new(
        launcher: Box<dyn WorkerLauncher>,
        monitor: ResourceMonitor,
        options: SupervisorOptions,
    ) -> Self {
        Self {
            launcher,
            monitor,
            options,
            workers: Vec::new(),
            state: PoolState::Running,
        }
    }

    pub fn state(&self) -> PoolState {
        self.state
    }

    pub fn pool_size(&self) -> usize {
        self.workers.len()
    }

    pub fn worker_ids(&self) -> Vec<&str> {
        self.workers.iter().map(|w| w.id.as_str()).collect()
    }

    /// Runs one scaling tick
    pub async fn tick(&mut self) -> TickReport {
        let mut report = TickReport {
            snapshot: None,
            state: self.state,
            drained: 0,
            reaped: 0,
            spawned: 0,
            spawn_failures: 0,
            pool_size: self.workers.len(),
        };

        if self.state.is_terminal() {
            return report;
        }

        let snapshot = self.monitor.sample();
        report.snapshot = Some(snapshot);

        let next = self.state.after_sample(snapshot.within_limits);
        if next != self.state {
            match next {
                PoolState::Paused => tracing::warn!(
                    "Resource limits exceeded (memory {:.1}%, temp {:.1}°C), pausing pool",
                    snapshot.memory_percent,
                    snapshot.cpu_temp
                ),
                _ => tracing::info!(
                    "Resources back within limits (memory {:.1}%, temp {:.1}°C), resuming",
                    snapshot.memory_percent,
                    snapshot.cpu_temp
                ),
            }
            self.state = next;
        }

        if !snapshot.within_limits && self.options.pressure_policy == PressurePolicy::Drain {
            report.drained = self.stop_all().await;
        }

        report.reaped = self.reap().await;

        if self.state.can_spawn() {
            let (spawned, failures) = self.spawn_deficit().await;
            report.spawned = spawned;
            report.spawn_failures = failures;
        }

        report.state = self.state;
        report.pool_size = self.workers.len();

        tracing::debug!(
            state = %report.state,
            pool = report.pool_size,
            reaped = report.reaped,
            spawned = report.spawned,
            "Tick complete"
        );

        report
    }

    /// Ticks until `stop` turns true, then shuts the pool down
    pub async fn run(&mut self, mut stop: watch::Receiver<bool>) {
        tracing::info!(
            workers = self.options.num_workers,
            session = %self.options.session,
            "Supervisor started"
        );

        loop {
            if *stop.borrow() {
                break;
            }

            let report = self.tick().await;

            let delay = if report.state == PoolState::Paused
                && self.options.pressure_policy == PressurePolicy::Drain
            {
                tracing::info!("Cooling down for {:?}", self.options.pressure_cooldown);
                self.options.pressure_cooldown
            } else {
                self.options.tick_interval
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = stop.changed() => {
                    if changed.is_err() {
                        tracing::warn!("Stop channel closed, shutting down");
                    }
                    break;
                }
            }
        }

        self.shutdown().await;
    }

    /// Stops every worker; the pool never restarts afterwards
    pub async fn shutdown(&mut self) {
        self.state = PoolState::ShuttingDown;
        tracing::info!("Shutting down {} workers", self.workers.len());
        let stopped = self.stop_all().await;
        tracing::info!("Supervisor stopped ({} workers stopped)", stopped);
    }

    async fn stop_all(&mut self) -> usize {
        let grace = self.options.stop_grace;
        let outcomes = join_all(self.workers.drain(..).map(|w| w.stop(grace))).await;

        let killed = outcomes.iter().filter(|o| **o == StopOutcome::Killed).count();
        if killed > 0 {
            tracing::warn!("{} workers had to be killed", killed);
        }
        outcomes.len()
    }

    async fn reap(&mut self) -> usize {
        let mut keep = Vec::with_capacity(self.workers.len());
        let mut remove = Vec::new();

        for mut worker in self.workers.drain(..) {
            if worker.is_alive() {
                keep.push(worker);
            } else {
                if worker.is_stale() {
                    tracing::info!(
                        "Recycling worker {} (started {}, age {:?})",
                        worker.id,
                        worker.started_at.format("%H:%M:%S"),
                        worker.age()
                    );
                } else {
                    let state = worker.state();
                    tracing::warn!("Worker {} exited: {:?}", worker.id, state);
                }
                remove.push(worker);
            }
        }
        self.workers = keep;

        let grace = self.options.stop_grace;
        join_all(remove.into_iter().map(|w| w.stop(grace))).await.len()
    }

    async fn spawn_deficit(&mut self) -> (usize, usize) {
        let deficit = self.options.num_workers.saturating_sub(self.workers.len());
        let mut spawned = 0;
        let mut failures = 0;

        for i in 0..deficit {
            if i > 0 && !self.options.spawn_stagger.is_zero() {
                tokio::time::sleep(self.options.spawn_stagger).await;
            }

            let spec = WorkerSpec {
                worker_id: new_worker_id(),
                session: self.options.session.clone(),
                institution_id: self.options.institution_id.clone(),
            };

            match self.launcher.launch(&spec) {
                Ok(process) => {
                    let handle =
                        WorkerHandle::new(spec.worker_id, process, self.options.restart_interval);
                    tracing::info!(
                        "Started worker {} (pid {:?})",
                        handle.id,
                        handle.pid()
                    );
                    self.workers.push(handle);
                    spawned += 1;
                }
                Err(e) => {
                    let error = crate::FleetError::Spawn {
                        worker_id: spec.worker_id,
                        source: e,
                    };
                    tracing::error!("{}", error);
                    failures += 1;
                }
            }
        }

        (spawned, failures)
    }
}

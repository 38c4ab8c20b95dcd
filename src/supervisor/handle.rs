//! Supervisor-side handle to one worker process

use super::process::{ProcessState, WorkerProcess};
use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};

/// Length of the short worker id used in logs and process arguments
const WORKER_ID_LEN: usize = 8;

/// Bound on reaping a process after a force-kill
const KILL_WAIT_TIMEOUT: Duration = Duration::from_secs(1);

/// Generates a short random worker id
pub fn new_worker_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..WORKER_ID_LEN].to_string()
}

/// How a worker stop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Exited before the stop was requested
    AlreadyExited(Option<i32>),

    /// Exited within the grace period
    Graceful(Option<i32>),

    /// Force-killed after the grace period
    Killed,
}

/// A worker owned by the supervisor
pub struct WorkerHandle {
    pub id: String,
    process: Box<dyn WorkerProcess>,
    started: Instant,
    pub started_at: DateTime<Utc>,
    pub restart_interval: Duration,
}

impl WorkerHandle {
    pub fn new(id: String, process: Box<dyn WorkerProcess>, restart_interval: Duration) -> Self {
        Self {
            id,
            process,
            started: Instant::now(),
            started_at: Utc::now(),
            restart_interval,
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.process.pid()
    }

    pub fn age(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn state(&mut self) -> ProcessState {
        self.process.poll_state()
    }

    /// True when old enough to be recycled
    pub fn is_stale(&self) -> bool {
        self.age() >= self.restart_interval
    }

    /// Running and younger than the restart interval
    pub fn is_alive(&mut self) -> bool {
        !self.is_stale() && self.state() == ProcessState::Running
    }

    /// Graceful signal, bounded wait, then force-kill
    ///
    /// The process I/O handles are released whatever the outcome.
    pub async fn stop(mut self, grace: Duration) -> StopOutcome {
        let outcome = self.stop_process(grace).await;
        self.process.release().await;
        tracing::debug!("Worker {} stopped: {:?}", self.id, outcome);
        outcome
    }

    async fn stop_process(&mut self, grace: Duration) -> StopOutcome {
        if let ProcessState::Exited(code) = self.process.poll_state() {
            return StopOutcome::AlreadyExited(code);
        }

        if let Err(e) = self.process.terminate() {
            tracing::warn!("Failed to signal worker {}: {}", self.id, e);
        }

        match tokio::time::timeout(grace, self.process.wait_exit()).await {
            Ok(Ok(code)) => return StopOutcome::Graceful(code),
            Ok(Err(e)) => tracing::warn!("Failed waiting for worker {}: {}", self.id, e),
            Err(_) => tracing::warn!(
                "Worker {} did not exit within {:?}, killing",
                self.id,
                grace
            ),
        }

        if let Err(e) = self.process.kill() {
            tracing::warn!("Failed to kill worker {}: {}", self.id, e);
        }
        match tokio::time::timeout(KILL_WAIT_TIMEOUT, self.process.wait_exit()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::debug!("Failed reaping worker {}: {}", self.id, e),
            Err(_) => tracing::error!(
                "Worker {} still running {:?} after kill, abandoning it",
                self.id,
                KILL_WAIT_TIMEOUT
            ),
        }
        StopOutcome::Killed
    }
}

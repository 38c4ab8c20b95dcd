//! Per-worker crawl statistics
//!
//! Counters live in the worker process only; they are logged periodically
//! and once more when the worker exits.

use super::task::FetchResult;
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

/// Crawl statistics of one worker
#[derive(Debug, Clone)]
pub struct WorkerStats {
    /// Tasks leased and reported
    pub tasks: u64,

    /// Tasks reported as success
    pub successes: u64,

    /// Tasks reported as error
    pub errors: u64,

    /// Links accepted by the queue
    pub links_submitted: u64,

    /// Lease calls that found the queue empty
    pub idle_polls: u64,

    /// Successful tasks per winning tier
    pub wins_by_tier: HashMap<&'static str, u64>,

    started: Instant,
}

impl WorkerStats {
    pub fn new() -> Self {
        Self {
            tasks: 0,
            successes: 0,
            errors: 0,
            links_submitted: 0,
            idle_polls: 0,
            wins_by_tier: HashMap::new(),
            started: Instant::now(),
        }
    }

    /// Records one reported task
    pub fn record_task(&mut self, result: &FetchResult, winner: Option<&'static str>, links: usize) {
        self.tasks += 1;
        self.links_submitted += links as u64;

        if result.is_success() {
            self.successes += 1;
            if let Some(tier) = winner {
                *self.wins_by_tier.entry(tier).or_insert(0) += 1;
            }
        } else {
            self.errors += 1;
        }
    }

    pub fn record_idle(&mut self) {
        self.idle_polls += 1;
    }

    /// Success rate in percent
    pub fn success_rate(&self) -> f64 {
        if self.tasks == 0 {
            0.0
        } else {
            (self.successes as f64 / self.tasks as f64) * 100.0
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// True when a periodic statistics line is due
    pub fn is_report_due(&self, every: u64) -> bool {
        every > 0 && self.tasks > 0 && self.tasks % every == 0
    }
}

impl Default for WorkerStats {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tasks={} success={} error={} success_rate={:.1}% links={} idle_polls={} uptime={}s",
            self.tasks,
            self.successes,
            self.errors,
            self.success_rate(),
            self.links_submitted,
            self.idle_polls,
            self.uptime().as_secs()
        )?;

        // Sort tiers by wins (descending), then name for stable output
        let mut tiers: Vec<_> = self.wins_by_tier.iter().collect();
        tiers.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));

        if !tiers.is_empty() {
            write!(f, " wins=[")?;
            for (i, (tier, count)) in tiers.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}:{}", tier, count)?;
            }
            write!(f, "]")?;
        }

        Ok(())
    }
}

use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Crawl-Fleet
///
/// Every section has defaults, so an empty file (or no file at all) is a
/// valid starting point before the environment overlay is applied.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub supervisor: SupervisorConfig,
    pub queue: QueueConfig,
    pub worker: WorkerConfig,
    pub fetch: FetchConfig,
}

/// What the supervisor does when resources exceed their ceilings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PressurePolicy {
    /// Stop every worker, then sleep a cooldown before re-checking
    Drain,
    /// Stop spawning, let existing workers run
    SoftPause,
}

/// Pool sizing and lifecycle configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SupervisorConfig {
    /// Target number of worker processes
    pub num_workers: usize,

    /// Memory ceiling, percent of total host memory
    pub max_memory_percent: f64,

    /// Temperature ceiling in degrees Celsius
    pub max_temp: f64,

    /// Seconds between scaling ticks
    pub tick_interval_secs: u64,

    /// Worker age (seconds) after which it is recycled
    pub restart_interval_secs: u64,

    /// Seconds to wait for a worker to exit after the graceful signal
    pub stop_grace_secs: u64,

    /// Delay between consecutive spawns within one tick (milliseconds)
    pub spawn_stagger_ms: u64,

    pub pressure_policy: PressurePolicy,

    /// Seconds to sleep after draining the pool under pressure
    pub pressure_cooldown_secs: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            num_workers: 5,
            max_memory_percent: 80.0,
            max_temp: 75.0,
            tick_interval_secs: 10,
            restart_interval_secs: 1800,
            stop_grace_secs: 5,
            spawn_stagger_ms: 500,
            pressure_policy: PressurePolicy::Drain,
            pressure_cooldown_secs: 60,
        }
    }
}

impl SupervisorConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn restart_interval(&self) -> Duration {
        Duration::from_secs(self.restart_interval_secs)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }

    pub fn spawn_stagger(&self) -> Duration {
        Duration::from_millis(self.spawn_stagger_ms)
    }

    pub fn pressure_cooldown(&self) -> Duration {
        Duration::from_secs(self.pressure_cooldown_secs)
    }
}

/// Remote job queue connection and retry configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct QueueConfig {
    /// Base URL of the queue API (e.g. "https://api.example.org")
    pub base_url: String,

    /// Token sent in the `bearer` header
    pub api_token: String,

    /// Identifier sent in the `user-id` header
    pub user_id: String,

    /// Crawl session all workers lease under
    pub session: Option<String>,

    /// Restrict leases to one institution
    pub institution_id: Option<String>,

    pub lease_path: String,
    pub report_path: String,
    pub submit_path: String,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,

    /// Maximum lease attempts before giving up with an empty-queue signal
    pub lease_max_attempts: u32,

    /// Base unit of the exponential rate-limit backoff (milliseconds)
    pub backoff_base_ms: u64,

    /// Upper bound of the rate-limit backoff (seconds)
    pub backoff_cap_secs: u64,

    /// Fixed sleep after a 5xx or transport failure (seconds)
    pub server_error_delay_secs: u64,

    /// Sleep after exhausting the lease attempt budget (seconds)
    pub exhausted_cooldown_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_token: String::new(),
            user_id: String::new(),
            session: None,
            institution_id: None,
            lease_path: "/institutes/scraper/links/next/".to_string(),
            report_path: "/institutes/scraper/links/check/".to_string(),
            submit_path: "/institutes/scraper/links/add/".to_string(),
            request_timeout_secs: 30,
            lease_max_attempts: 5,
            backoff_base_ms: 1000,
            backoff_cap_secs: 300,
            server_error_delay_secs: 5,
            exhausted_cooldown_secs: 30,
        }
    }
}

impl QueueConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Per-worker loop pacing
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct WorkerConfig {
    /// Sleep when the queue reports no work (seconds)
    pub idle_interval_secs: u64,

    /// Pause between finished task and next lease (milliseconds)
    pub task_pause_ms: u64,

    /// How long an in-flight task may continue after a stop request (milliseconds)
    pub stop_grace_ms: u64,

    /// Log a statistics line every N tasks
    pub stats_every: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            idle_interval_secs: 10,
            task_pause_ms: 1000,
            stop_grace_ms: 3000,
            stats_every: 10,
        }
    }
}

impl WorkerConfig {
    pub fn idle_interval(&self) -> Duration {
        Duration::from_secs(self.idle_interval_secs)
    }

    pub fn task_pause(&self) -> Duration {
        Duration::from_millis(self.task_pause_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }
}

/// Fetch tier configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct FetchConfig {
    /// Raw pages shorter than this (trimmed, in chars) are rejected
    pub min_content_length: usize,

    /// Extra attempts for transient failures inside one tier
    pub tier_retry_attempts: u32,

    /// Linear backoff unit between in-tier retries (milliseconds)
    pub tier_retry_backoff_ms: u64,

    pub lightweight_timeout_secs: u64,
    pub async_timeout_secs: u64,

    /// Timeout of the HEAD suitability probe (seconds)
    pub probe_timeout_secs: u64,

    /// Bodies larger than this are truncated before cleaning
    pub max_body_bytes: usize,

    pub browser_enabled: bool,

    /// WebDriver endpoint used by the browser tier
    pub webdriver_url: String,

    pub page_load_timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            min_content_length: 100,
            tier_retry_attempts: 2,
            tier_retry_backoff_ms: 1000,
            lightweight_timeout_secs: 10,
            async_timeout_secs: 15,
            probe_timeout_secs: 5,
            max_body_bytes: 5 * 1024 * 1024,
            browser_enabled: true,
            webdriver_url: "http://localhost:4444".to_string(),
            page_load_timeout_secs: 60,
        }
    }
}

impl FetchConfig {
    pub fn tier_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.tier_retry_backoff_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_secs(self.page_load_timeout_secs)
    }
}

//! Retry budget and backoff delays for queue requests

use crate::config::QueueConfig;
use rand::Rng;
use std::time::Duration;

/// Upper bound of the random jitter, as a fraction of the base delay
pub const MAX_JITTER_FRACTION: f64 = 0.1;

/// Retry budget and delays used by the queue client
///
/// The rate-limit delay for attempt `n` is `base * 2^n` plus up to 10%
/// jitter, clamped to `cap`. Clamping after the jitter keeps the sequence
/// non-decreasing and never above the cap.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    pub server_error_delay: Duration,
    pub exhausted_cooldown: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &QueueConfig) -> Self {
        Self {
            max_attempts: config.lease_max_attempts,
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            backoff_cap: Duration::from_secs(config.backoff_cap_secs),
            server_error_delay: Duration::from_secs(config.server_error_delay_secs),
            exhausted_cooldown: Duration::from_secs(config.exhausted_cooldown_secs),
        }
    }

    /// A policy with no sleeps, for tests against mock servers
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff_base: Duration::ZERO,
            backoff_cap: Duration::ZERO,
            server_error_delay: Duration::ZERO,
            exhausted_cooldown: Duration::ZERO,
        }
    }

    /// Exponential delay for `attempt` (0-based) without jitter
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.backoff_base.saturating_mul(factor).min(self.backoff_cap)
    }

    /// Exponential delay with a given jitter fraction (clamped to 0..=10%)
    pub fn backoff_delay(&self, attempt: u32, jitter_fraction: f64) -> Duration {
        let base = self.base_delay(attempt);
        let jitter = base.mul_f64(jitter_fraction.clamp(0.0, MAX_JITTER_FRACTION));
        (base + jitter).min(self.backoff_cap)
    }

    /// Exponential delay with random jitter
    pub fn jittered_delay(&self, attempt: u32) -> Duration {
        let fraction = rand::thread_rng().gen_range(0.0..=MAX_JITTER_FRACTION);
        self.backoff_delay(attempt, fraction)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&QueueConfig::default())
    }
}

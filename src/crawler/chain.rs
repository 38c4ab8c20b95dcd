//! Cost-ordered fetch strategy chain

use super::asynchronous::AsynchronousStrategy;
use super::browser::BrowserStrategy;
use super::cleaner::{ContentCleaner, HtmlCleaner};
use super::lightweight::LightweightStrategy;
use super::strategy::FetchStrategy;
use super::task::{FailureKind, FetchResult};
use crate::config::FetchConfig;
use crate::url::truncate_url;
use std::sync::Arc;
use std::time::Duration;

/// Everything one run of the chain produced for a URL
#[derive(Debug)]
pub struct ChainOutcome {
    /// Final result: the first success, or a synthesized exhaustion error
    pub result: FetchResult,

    /// Raw markup from every attempt that fetched a body, for link extraction
    pub markups: Vec<String>,

    /// Tiers whose `fetch` was invoked, in order
    pub tiers_tried: Vec<&'static str>,

    /// Tier that produced the success, if any
    pub winner: Option<&'static str>,
}

/// Tries fetch strategies in ascending cost until one succeeds
///
/// # Policy
///
/// | Condition | Action |
/// |-----------|--------|
/// | `is_suitable` false or error | Skip tier |
/// | Success with content | Stop, no later tier runs |
/// | Transient failure | Retry same tier, linear backoff, bounded |
/// | Permanent / content failure | Next tier |
/// | All tiers failed | Error result naming every tier's failure |
pub struct FetchChain {
    strategies: Vec<Box<dyn FetchStrategy>>,
    retry_attempts: u32,
    retry_backoff: Duration,
}

impl FetchChain {
    /// Creates a chain; strategies are sorted by cost
    pub fn new(
        mut strategies: Vec<Box<dyn FetchStrategy>>,
        retry_attempts: u32,
        retry_backoff: Duration,
    ) -> Self {
        strategies.sort_by_key(|s| s.cost());
        Self {
            strategies,
            retry_attempts,
            retry_backoff,
        }
    }

    /// Builds the standard lightweight → asynchronous → browser chain
    pub fn from_config(config: &FetchConfig) -> crate::Result<Self> {
        let cleaner: Arc<dyn ContentCleaner> = Arc::new(HtmlCleaner::new(config.max_body_bytes));

        let mut strategies: Vec<Box<dyn FetchStrategy>> = vec![
            Box::new(LightweightStrategy::new(config, Arc::clone(&cleaner))?),
            Box::new(AsynchronousStrategy::new(config, Arc::clone(&cleaner))?),
        ];

        if config.browser_enabled {
            strategies.push(Box::new(BrowserStrategy::new(config, cleaner)));
        } else {
            tracing::info!("Browser tier disabled");
        }

        Ok(Self::new(
            strategies,
            config.tier_retry_attempts,
            config.tier_retry_backoff(),
        ))
    }

    /// Names of the configured tiers, cheapest first
    pub fn tier_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Runs the chain for one URL; never fails
    pub async fn run(&self, url: &str) -> ChainOutcome {
        let mut markups = Vec::new();
        let mut tiers_tried = Vec::new();
        let mut failures: Vec<String> = Vec::new();

        for strategy in &self.strategies {
            let name = strategy.name();

            match strategy.is_suitable(url).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!("{} not suitable for {}", name, truncate_url(url, 100));
                    failures.push(format!("{}: not suitable", name));
                    continue;
                }
                Err(e) => {
                    tracing::warn!("{} suitability check failed: {}", name, e);
                    failures.push(format!("{}: suitability check failed ({})", name, e));
                    continue;
                }
            }

            tiers_tried.push(name);
            let mut result = self.fetch_with_retries(strategy.as_ref(), url, &mut markups).await;

            if result.is_success() {
                tracing::info!("Fetched {} with {}", truncate_url(url, 100), name);
                result.url = url.to_string();
                return ChainOutcome {
                    result,
                    markups,
                    tiers_tried,
                    winner: Some(name),
                };
            }

            let error = result.error.unwrap_or_else(|| "unknown error".to_string());
            tracing::warn!("{} failed for {}: {}", name, truncate_url(url, 100), error);
            failures.push(format!("{}: {}", name, error));
        }

        let detail = if failures.is_empty() {
            "no fetch strategies configured".to_string()
        } else {
            failures.join("; ")
        };

        ChainOutcome {
            result: FetchResult::error(
                url,
                FailureKind::Permanent,
                format!("All fetch strategies failed for {}: {}", url, detail),
            ),
            markups,
            tiers_tried,
            winner: None,
        }
    }

    async fn fetch_with_retries(
        &self,
        strategy: &dyn FetchStrategy,
        url: &str,
        markups: &mut Vec<String>,
    ) -> FetchResult {
        let mut attempt: u32 = 0;

        loop {
            tracing::debug!("Trying {} for {} (attempt {})", strategy.name(), url, attempt + 1);
            let mut result = strategy.fetch(url).await;

            if let Some(markup) = result.take_raw_markup() {
                markups.push(markup);
            }

            if result.is_success() || !result.is_retryable() || attempt >= self.retry_attempts {
                return result;
            }

            attempt += 1;
            let delay = self.retry_backoff * attempt;
            tracing::info!(
                "{} transient failure ({}), retry {}/{} in {:?}",
                strategy.name(),
                result.error.as_deref().unwrap_or("unknown"),
                attempt,
                self.retry_attempts,
                delay
            );
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }

    /// Releases every tier's resources
    pub async fn cleanup(&self) {
        for strategy in &self.strategies {
            strategy.cleanup().await;
        }
    }
}

//! Plain HTTP tier for static pages

use super::cleaner::ContentCleaner;
use super::http::{
    browser_headers, build_http_client, classify_reqwest_error, classify_status,
    describe_reqwest_error, probe_content_type, process_markup,
};
use super::strategy::{FetchStrategy, LIGHTWEIGHT_COST};
use super::task::FetchResult;
use crate::config::FetchConfig;
use crate::url::check_crawlable;
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

/// Cheapest tier: one GET, whole body in memory
///
/// Only attempts URLs whose HEAD response explicitly declares HTML.
pub struct LightweightStrategy {
    client: Client,
    cleaner: Arc<dyn ContentCleaner>,
    probe_timeout: Duration,
    min_content_length: usize,
}

impl LightweightStrategy {
    pub fn new(config: &FetchConfig, cleaner: Arc<dyn ContentCleaner>) -> crate::Result<Self> {
        let client = build_http_client(Duration::from_secs(config.lightweight_timeout_secs), false)?;
        Ok(Self {
            client,
            cleaner,
            probe_timeout: config.probe_timeout(),
            min_content_length: config.min_content_length,
        })
    }
}

#[async_trait]
impl FetchStrategy for LightweightStrategy {
    fn name(&self) -> &'static str {
        "lightweight"
    }

    fn cost(&self) -> u32 {
        LIGHTWEIGHT_COST
    }

    async fn is_suitable(&self, url: &str) -> crate::Result<bool> {
        if check_crawlable(url).is_err() {
            return Ok(false);
        }

        match probe_content_type(&self.client, url, self.probe_timeout).await {
            Ok(probe) => Ok(probe.is_html()),
            Err(e) => {
                tracing::debug!("HEAD probe failed for {}: {}", url, e);
                Ok(false)
            }
        }
    }

    async fn fetch(&self, url: &str) -> FetchResult {
        let response = match self.client.get(url).headers(browser_headers()).send().await {
            Ok(response) => response,
            Err(e) => {
                return FetchResult::error(url, classify_reqwest_error(&e), describe_reqwest_error(&e))
            }
        };

        let status = response.status();
        if !status.is_success() {
            return FetchResult::error(url, classify_status(status), format!("HTTP {}", status.as_u16()));
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return FetchResult::error(url, classify_reqwest_error(&e), describe_reqwest_error(&e))
            }
        };

        process_markup(url, body, self.min_content_length, self.cleaner.as_ref())
    }

    async fn cleanup(&self) {}
}

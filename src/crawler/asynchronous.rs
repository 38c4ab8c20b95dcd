//! Streaming HTTP tier with compression and a body size cap

use super::cleaner::ContentCleaner;
use super::http::{
    browser_headers, build_http_client, classify_reqwest_error, classify_status,
    describe_reqwest_error, probe_content_type, process_markup,
};
use super::strategy::{FetchStrategy, ASYNCHRONOUS_COST};
use super::task::{FailureKind, FetchResult};
use crate::config::FetchConfig;
use crate::url::check_crawlable;
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

/// Second tier: compressed transfer, chunked body reads up to a byte cap
///
/// More lenient than the lightweight tier: servers that refuse HEAD or omit
/// the Content-Type are still attempted.
pub struct AsynchronousStrategy {
    client: Client,
    cleaner: Arc<dyn ContentCleaner>,
    probe_timeout: Duration,
    min_content_length: usize,
    max_body_bytes: usize,
}

impl AsynchronousStrategy {
    pub fn new(config: &FetchConfig, cleaner: Arc<dyn ContentCleaner>) -> crate::Result<Self> {
        let client = build_http_client(Duration::from_secs(config.async_timeout_secs), true)?;
        Ok(Self {
            client,
            cleaner,
            probe_timeout: config.probe_timeout(),
            min_content_length: config.min_content_length,
            max_body_bytes: config.max_body_bytes,
        })
    }

    async fn read_capped(&self, mut response: reqwest::Response) -> Result<String, reqwest::Error> {
        let mut bytes: Vec<u8> = Vec::new();

        while let Some(chunk) = response.chunk().await? {
            let room = self.max_body_bytes.saturating_sub(bytes.len());
            if chunk.len() >= room {
                bytes.extend_from_slice(&chunk[..room]);
                tracing::debug!("Body capped at {} bytes", self.max_body_bytes);
                break;
            }
            bytes.extend_from_slice(&chunk);
        }

        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

#[async_trait]
impl FetchStrategy for AsynchronousStrategy {
    fn name(&self) -> &'static str {
        "asynchronous"
    }

    fn cost(&self) -> u32 {
        ASYNCHRONOUS_COST
    }

    async fn is_suitable(&self, url: &str) -> crate::Result<bool> {
        if check_crawlable(url).is_err() {
            return Ok(false);
        }

        match probe_content_type(&self.client, url, self.probe_timeout).await {
            Ok(probe) if probe.is_html() => Ok(true),
            Ok(probe) if matches!(probe.status, 405 | 501) => Ok(true),
            Ok(probe) if probe.content_type.is_none() && probe.status < 400 => Ok(true),
            Ok(probe) => {
                tracing::debug!(
                    status = probe.status,
                    "Not HTML according to HEAD: {:?}",
                    probe.content_type
                );
                Ok(false)
            }
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

        if let Some(length) = response.content_length() {
            if length == 0 {
                return FetchResult::error(url, FailureKind::ContentUnavailable, "Page content too short");
            }
        }

        let body = match self.read_capped(response).await {
            Ok(body) => body,
            Err(e) => {
                return FetchResult::error(url, classify_reqwest_error(&e), describe_reqwest_error(&e))
            }
        };

        process_markup(url, body, self.min_content_length, self.cleaner.as_ref())
    }

    async fn cleanup(&self) {}
}

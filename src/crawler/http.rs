//! HTTP plumbing shared by the lightweight and asynchronous tiers
//!
//! This module handles:
//! - Building HTTP clients
//! - Randomized desktop user agents
//! - HEAD probes of the Content-Type
//! - Error and status classification into [`FailureKind`]
//! - The common "validate, detect, clean" pipeline for fetched markup

use super::cleaner::ContentCleaner;
use super::parser::{extract_title, requires_javascript};
use super::task::{FailureKind, FetchResult};
use rand::seq::SliceRandom;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, StatusCode};
use scraper::Html;
use std::time::Duration;

/// Desktop browser user agents rotated across requests
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14.2; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0",
];

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// Picks a random desktop user agent
pub fn random_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

/// Browser-like request headers with a fresh user agent
pub fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(random_user_agent()));
    headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HTML));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
    headers.insert("DNT", HeaderValue::from_static("1"));
    headers
}

/// Builds an HTTP client for one fetch tier
///
/// # Arguments
///
/// * `timeout` - Total request timeout
/// * `compressed` - Whether to advertise gzip/brotli support
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(timeout: Duration, compressed: bool) -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .gzip(compressed)
        .brotli(compressed)
        .build()
}

/// Outcome of a HEAD probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    pub status: u16,
    pub content_type: Option<String>,
}

impl Probe {
    /// True when the server declared an HTML document
    pub fn is_html(&self) -> bool {
        self.content_type
            .as_deref()
            .map(|ct| {
                let ct = ct.to_lowercase();
                ct.contains("text/html") || ct.contains("application/xhtml")
            })
            .unwrap_or(false)
    }
}

/// Sends a HEAD request to check the Content-Type before fetching
///
/// Redirects are followed.
pub async fn probe_content_type(
    client: &Client,
    url: &str,
    timeout: Duration,
) -> Result<Probe, reqwest::Error> {
    let response = client
        .head(url)
        .headers(browser_headers())
        .timeout(timeout)
        .send()
        .await?;

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    Ok(Probe {
        status: response.status().as_u16(),
        content_type,
    })
}

/// Classifies a transport error
///
/// | Condition | Kind |
/// |-----------|------|
/// | Timeout | Transient |
/// | Connection failure | Transient |
/// | Body read interrupted | Transient |
/// | Anything else | Permanent |
pub fn classify_reqwest_error(error: &reqwest::Error) -> FailureKind {
    if error.is_timeout() || error.is_connect() || error.is_body() {
        FailureKind::Transient
    } else if let Some(status) = error.status() {
        classify_status(status)
    } else {
        FailureKind::Permanent
    }
}

/// Classifies a non-success HTTP status: 429 and 5xx are transient
pub fn classify_status(status: StatusCode) -> FailureKind {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        FailureKind::Transient
    } else {
        FailureKind::Permanent
    }
}

/// Describes a transport error for the report
pub fn describe_reqwest_error(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        "Request timeout".to_string()
    } else if error.is_connect() {
        format!("Connection failed: {}", error)
    } else {
        error.to_string()
    }
}

/// Turns a fetched body into a tier result
///
/// # Steps
///
/// 1. Reject bodies shorter than `min_content_length` (trimmed, chars)
/// 2. Reject pages that only render with JavaScript
/// 3. Extract the title and clean the markup
///
/// The raw markup is attached to every result past step 1 so links can still
/// be harvested from pages whose content was unusable.
pub fn process_markup(
    url: &str,
    body: String,
    min_content_length: usize,
    cleaner: &dyn ContentCleaner,
) -> FetchResult {
    if body.trim().chars().count() < min_content_length {
        return FetchResult::error(url, FailureKind::ContentUnavailable, "Page content too short");
    }

    if requires_javascript(&body) {
        return FetchResult::error(url, FailureKind::ContentUnavailable, "Page requires JavaScript")
            .with_raw_markup(Some(body));
    }

    let title = extract_title(&Html::parse_document(&body)).unwrap_or_default();
    let content = cleaner.clean(&body);

    FetchResult::success(url, title, content, Some(body))
}

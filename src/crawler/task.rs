//! Task and fetch result types shared by the worker loop and the queue client

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// One URL assignment leased from the remote queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlTask {
    /// URL to crawl
    pub url: String,

    /// Institution that owns the URL, if the queue reported one
    pub institution_id: Option<String>,

    /// Free-form metadata attached by the queue
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl CrawlTask {
    /// Creates a task with no institution or metadata
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            institution_id: None,
            metadata: Map::new(),
        }
    }
}

/// Outcome status reported to the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchStatus {
    Success,
    Error,
}

impl FetchStatus {
    /// Wire representation used in the report payload
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for FetchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a fetch attempt failed
///
/// Only `Transient` failures are retried inside the same tier; the other two
/// advance the chain to the next tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Timeout, connection reset, rate limit, 5xx
    Transient,

    /// Malformed URL, 4xx, browser session failure
    Permanent,

    /// Page too short, JavaScript required, nothing left after cleaning
    ContentUnavailable,
}

impl FailureKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient)
    }
}

/// Result of fetching one URL with one tier (or of the whole chain)
///
/// A success always carries non-empty content; the constructors enforce it.
/// `raw_markup` only feeds link extraction and is never reported.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResult {
    pub url: String,
    pub content: String,
    pub title: String,
    pub status: FetchStatus,
    pub error: Option<String>,
    pub raw_markup: Option<String>,
    pub failure: Option<FailureKind>,
}

impl FetchResult {
    /// Builds a success result
    ///
    /// Falls back to a `ContentUnavailable` error when `content` is blank, so a
    /// success can never be constructed without content.
    pub fn success(
        url: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
        raw_markup: Option<String>,
    ) -> Self {
        let content = content.into();
        if content.trim().is_empty() {
            return Self::error(
                url,
                FailureKind::ContentUnavailable,
                "No content after cleaning",
            )
            .with_title(title)
            .with_raw_markup(raw_markup);
        }

        Self {
            url: url.into(),
            content,
            title: title.into(),
            status: FetchStatus::Success,
            error: None,
            raw_markup,
            failure: None,
        }
    }

    /// Builds an error result with a human-readable message
    pub fn error(url: impl Into<String>, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            content: String::new(),
            title: String::new(),
            status: FetchStatus::Error,
            error: Some(message.into()),
            raw_markup: None,
            failure: Some(kind),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_raw_markup(mut self, raw_markup: Option<String>) -> Self {
        self.raw_markup = raw_markup;
        self
    }

    /// True when this result ends the fetch chain
    pub fn is_success(&self) -> bool {
        self.status == FetchStatus::Success && !self.content.is_empty()
    }

    /// True when the same tier may try again
    pub fn is_retryable(&self) -> bool {
        self.failure.map(|k| k.is_retryable()).unwrap_or(false)
    }

    /// Moves the raw markup out, leaving `None` behind
    pub fn take_raw_markup(&mut self) -> Option<String> {
        self.raw_markup.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_requires_content() {
        let result = FetchResult::success("https://a.org/", "Title", "   ", None);
        assert_eq!(result.status, FetchStatus::Error);
        assert_eq!(result.error.as_deref(), Some("No content after cleaning"));
        assert_eq!(result.failure, Some(FailureKind::ContentUnavailable));
        assert_eq!(result.title, "Title");
        assert!(!result.is_success());
    }

    #[test]
    fn test_success_keeps_markup() {
        let result = FetchResult::success(
            "https://a.org/",
            "T",
            "Some body text",
            Some("<p>x</p>".to_string()),
        );
        assert!(result.is_success());
        assert!(result.error.is_none());
        assert_eq!(result.raw_markup.as_deref(), Some("<p>x</p>"));
    }

    #[test]
    fn test_retryable_only_for_transient() {
        let transient = FetchResult::error("u", FailureKind::Transient, "timeout");
        let permanent = FetchResult::error("u", FailureKind::Permanent, "HTTP 404");
        let content = FetchResult::error("u", FailureKind::ContentUnavailable, "too short");
        assert!(transient.is_retryable());
        assert!(!permanent.is_retryable());
        assert!(!content.is_retryable());
    }

    #[test]
    fn test_take_raw_markup() {
        let mut result = FetchResult::error("u", FailureKind::ContentUnavailable, "short")
            .with_raw_markup(Some("<html></html>".to_string()));
        assert_eq!(result.take_raw_markup().as_deref(), Some("<html></html>"));
        assert!(result.raw_markup.is_none());
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(FetchStatus::Success.to_string(), "success");
        assert_eq!(FetchStatus::Error.as_str(), "error");
    }

    #[test]
    fn test_task_deserializes_without_metadata() {
        let task: CrawlTask =
            serde_json::from_str(r#"{"url":"https://a.org/","institution_id":null}"#).unwrap();
        assert_eq!(task, CrawlTask::new("https://a.org/"));
    }
}

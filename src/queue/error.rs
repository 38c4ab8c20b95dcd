//! Queue protocol errors and error-body degradation

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

/// Maximum length of a degraded error message, in characters
pub const MAX_ERROR_MESSAGE_CHARS: usize = 1000;

/// Error text fragments that mark a 4xx as worth retrying
const TRANSIENT_PATTERNS: &[&str] = &[
    "timeout",
    "timed out",
    "temporarily unavailable",
    "try again",
    "connection reset",
    "deadlock",
];

/// Errors returned by the remote queue protocol
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Rate limited by queue API")]
    RateLimited,

    #[error("Queue API rejected credentials (HTTP {status}): {message}")]
    Unauthorized { status: u16, message: String },

    #[error("Queue API rejected request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Queue API server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid response from queue API: {0}")]
    InvalidResponse(String),

    #[error("Invalid queue client setup: {0}")]
    Setup(String),
}

impl QueueError {
    /// Classifies a non-success HTTP status and its degraded message
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 | 403 => Self::Unauthorized { status, message },
            429 => Self::RateLimited,
            500..=599 => Self::Server { status, message },
            _ => Self::Rejected { status, message },
        }
    }

    /// True for errors that end the worker loop
    ///
    /// Only a credential rejection is fatal: retrying with the same token can
    /// never succeed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unauthorized { .. } | Self::Setup(_))
    }

    /// True for errors a caller may retry
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited | Self::Server { .. } | Self::Transport(_) => true,
            Self::Rejected { message, .. } => matches_transient_pattern(message),
            _ => false,
        }
    }

    /// HTTP status of the failed request, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RateLimited => Some(429),
            Self::Unauthorized { status, .. }
            | Self::Rejected { status, .. }
            | Self::Server { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Checks whether an error message looks like a transient server condition
pub fn matches_transient_pattern(message: &str) -> bool {
    let lowered = message.to_lowercase();
    TRANSIENT_PATTERNS.iter().any(|p| lowered.contains(p))
}

static EXCEPTION_VALUE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<pre[^>]*class="exception_value"[^>]*>(.*?)</pre>"#).unwrap()
});

static TITLE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap());

static TAG_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]+>").unwrap());

/// Turns an error response body into a single readable message
///
/// JSON bodies yield `data.error`, `detail`, `message` or `error` (first one
/// present). HTML debug pages yield the exception value, then the page title.
/// Anything else is passed through. The result is whitespace-collapsed and
/// truncated to [`MAX_ERROR_MESSAGE_CHARS`].
///
/// # Examples
///
/// ```
/// use crawl_fleet::queue::describe_error_body;
///
/// assert_eq!(describe_error_body(r#"{"detail": "Invalid token"}"#), "Invalid token");
/// assert_eq!(
///     describe_error_body("<html><title>Server Error</title></html>"),
///     "Server Error"
/// );
/// ```
pub fn describe_error_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "Empty response body".to_string();
    }

    let message = if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        json_error_message(&value).unwrap_or_else(|| value.to_string())
    } else if looks_like_html(trimmed) {
        html_error_message(trimmed)
    } else {
        trimmed.to_string()
    };

    truncate_message(&collapse_whitespace(&message))
}

fn json_error_message(value: &Value) -> Option<String> {
    let candidates = [
        value.get("data").and_then(|d| d.get("error")),
        value.get("detail"),
        value.get("message"),
        value.get("error"),
    ];

    candidates.into_iter().flatten().find_map(|v| match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Null => None,
        Value::String(_) => None,
        other => Some(other.to_string()),
    })
}

fn looks_like_html(body: &str) -> bool {
    let head: String = body.chars().take(200).collect::<String>().to_lowercase();
    head.starts_with("<!doctype") || head.contains("<html") || head.contains("<head")
}

fn html_error_message(body: &str) -> String {
    if let Some(caps) = EXCEPTION_VALUE_REGEX.captures(body) {
        let text = strip_tags(&caps[1]);
        if !text.trim().is_empty() {
            return text;
        }
    }

    if let Some(caps) = TITLE_REGEX.captures(body) {
        let text = strip_tags(&caps[1]);
        if !text.trim().is_empty() {
            return text;
        }
    }

    "HTML error page received".to_string()
}

fn strip_tags(fragment: &str) -> String {
    let text = TAG_REGEX.replace_all(fragment, " ");
    text.replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_message(message: &str) -> String {
    if message.chars().count() <= MAX_ERROR_MESSAGE_CHARS {
        return message.to_string();
    }
    let mut truncated: String = message.chars().take(MAX_ERROR_MESSAGE_CHARS).collect();
    truncated.push_str("...");
    truncated
}

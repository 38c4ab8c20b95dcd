//! Wire payloads of the remote queue API

use super::QueueError;
use crate::crawler::{CrawlTask, FetchResult};
use serde::Serialize;
use serde_json::{Map, Value};

/// Body of a report request
///
/// Empty strings are sent as `null`.
#[derive(Debug, Serialize, PartialEq)]
pub struct ReportPayload<'a> {
    pub link: &'a str,
    pub session_id: &'a str,
    pub status: &'a str,
    pub error: Option<&'a str>,
    pub content: Option<&'a str>,
    pub title: Option<&'a str>,
}

impl<'a> ReportPayload<'a> {
    pub fn new(session: &'a str, result: &'a FetchResult) -> Self {
        Self {
            link: &result.url,
            session_id: session,
            status: result.status.as_str(),
            error: non_empty(result.error.as_deref()),
            content: non_empty(Some(result.content.as_str())),
            title: non_empty(Some(result.title.as_str())),
        }
    }
}

/// Body of a link submission request
#[derive(Debug, Serialize, PartialEq)]
pub struct SubmitPayload<'a> {
    pub links: &'a [String],
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Parses a lease response body into a task
///
/// Accepts both the `{"data": {...}}` envelope and a bare object. The
/// `institution_id` may be a string or a number.
///
/// # Returns
///
/// * `Ok(CrawlTask)` - A usable task
/// * `Err(QueueError::InvalidResponse)` - Not JSON, or no non-empty `link`
pub fn parse_lease_body(body: &str) -> Result<CrawlTask, QueueError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| QueueError::InvalidResponse(format!("lease body is not JSON: {}", e)))?;

    let data = match value.get("data") {
        Some(inner) if inner.is_object() => inner,
        _ => &value,
    };

    let link = data
        .get("link")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .ok_or_else(|| QueueError::InvalidResponse("lease body has no link".to_string()))?;

    let institution_id = match data.get("institution_id") {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };

    let metadata = data
        .get("metadata")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_else(Map::new);

    Ok(CrawlTask {
        url: link.to_string(),
        institution_id,
        metadata,
    })
}

/// Removes duplicate links while keeping first-seen order
pub fn dedupe_links(links: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    links
        .iter()
        .filter(|l| seen.insert(l.as_str()))
        .cloned()
        .collect()
}

/// Checks whether a submit response body means "nothing new, but fine"
pub fn is_idempotent_submit_message(body: &str) -> bool {
    let lowered = body.to_lowercase();
    lowered.contains("already exist") || lowered.contains("no matching")
}

//! Remote job queue protocol
//!
//! Workers exchange all state with the outside world through this module:
//! leasing the next URL, reporting the result of a crawl, and submitting
//! newly discovered links. [`TaskQueue`] is the seam the worker loop is
//! generic over; [`RemoteQueueClient`] is the HTTP implementation.

mod client;
mod error;
mod models;
mod retry;

use crate::crawler::{CrawlTask, FetchResult};
use async_trait::async_trait;

pub use client::RemoteQueueClient;
pub use error::{describe_error_body, matches_transient_pattern, QueueError, MAX_ERROR_MESSAGE_CHARS};
pub use models::{dedupe_links, parse_lease_body, ReportPayload, SubmitPayload};
pub use retry::{RetryPolicy, MAX_JITTER_FRACTION};

/// Result type alias for queue operations
pub type QueueResult<T> = std::result::Result<T, QueueError>;

/// Outcome of a lease request
#[derive(Debug, Clone, PartialEq)]
pub enum Lease {
    /// A task to crawl
    Task(CrawlTask),

    /// Nothing to do right now; the caller should back off
    Empty,
}

/// Outcome of a link submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The queue accepted this many links
    Accepted(usize),

    /// The queue already knew every link (or had no owner for them)
    AlreadyKnown,

    /// Nothing to submit; no request was made
    Empty,
}

/// Operations a worker needs from the job queue
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Leases the next URL for a session
    ///
    /// Only domain rejections surface as errors; transient failures are
    /// retried inside the call and degrade to [`Lease::Empty`].
    async fn lease_next(&self, session: &str, institution_id: Option<&str>)
        -> QueueResult<Lease>;

    /// Reports the outcome of one task (single attempt)
    async fn report_result(&self, session: &str, result: &FetchResult) -> QueueResult<()>;

    /// Submits discovered links for future crawling
    async fn submit_links(&self, links: &[String]) -> QueueResult<SubmitOutcome>;
}

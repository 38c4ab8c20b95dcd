//! Crawler module: the work done inside one worker process
//!
//! This module contains:
//! - The task and result types exchanged with the queue
//! - Fetch strategies (lightweight, asynchronous, browser) and the chain
//!   that escalates between them
//! - HTML cleaning, JavaScript detection and link extraction
//! - The worker loop tying lease, fetch, extract and report together

mod asynchronous;
mod browser;
mod chain;
mod cleaner;
mod http;
mod lightweight;
mod parser;
mod stats;
mod strategy;
mod task;
mod worker;

pub use asynchronous::AsynchronousStrategy;
pub use browser::BrowserStrategy;
pub use chain::{ChainOutcome, FetchChain};
pub use cleaner::{ContentCleaner, HtmlCleaner};
pub use http::{build_http_client, process_markup};
pub use lightweight::LightweightStrategy;
pub use parser::{is_bot_challenge, requires_javascript, LinkExtractor, SeenLinkSet};
pub use stats::WorkerStats;
pub use strategy::{FetchStrategy, ASYNCHRONOUS_COST, BROWSER_COST, LIGHTWEIGHT_COST};
pub use task::{CrawlTask, FailureKind, FetchResult, FetchStatus};
pub use worker::{CrawlWorkerLoop, WorkerExit, WorkerOptions, EXIT_QUEUE_FATAL, EXIT_STOPPED};

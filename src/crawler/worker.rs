//! The lease → fetch → extract → report loop run inside each worker process

use super::chain::FetchChain;
use super::parser::{LinkExtractor, SeenLinkSet};
use super::stats::WorkerStats;
use super::task::{CrawlTask, FailureKind, FetchResult};
use crate::config::WorkerConfig;
use crate::queue::{Lease, QueueError, SubmitOutcome, TaskQueue};
use crate::url::{parse_crawl_url, truncate_url};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Process exit code for a clean stop
pub const EXIT_STOPPED: i32 = 0;

/// Process exit code when the queue rejected the worker's credentials
pub const EXIT_QUEUE_FATAL: i32 = 2;

/// Identity and pacing of one worker
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    pub worker_id: String,
    pub session: String,
    pub institution_id: Option<String>,
    pub idle_interval: Duration,
    pub task_pause: Duration,
    pub stop_grace: Duration,
    pub stats_every: u64,
}

impl WorkerOptions {
    pub fn from_config(
        worker_id: impl Into<String>,
        session: impl Into<String>,
        institution_id: Option<String>,
        config: &WorkerConfig,
    ) -> Self {
        Self {
            worker_id: worker_id.into(),
            session: session.into(),
            institution_id,
            idle_interval: config.idle_interval(),
            task_pause: config.task_pause(),
            stop_grace: config.stop_grace(),
            stats_every: config.stats_every,
        }
    }
}

/// Why the loop ended
#[derive(Debug)]
pub enum WorkerExit {
    /// A stop was requested
    Stopped,

    /// The queue returned an error retrying cannot fix
    Fatal(QueueError),
}

impl WorkerExit {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Stopped => EXIT_STOPPED,
            Self::Fatal(_) => EXIT_QUEUE_FATAL,
        }
    }
}

/// What processing one task produced
struct TaskOutcome {
    result: FetchResult,
    winner: Option<&'static str>,
    links_submitted: usize,
}

/// Drives one worker until stopped
///
/// # Loop
///
/// 1. Lease a task; an empty queue means sleep the idle interval and retry
/// 2. Run the fetch chain
/// 3. Extract links from every markup obtained, submit them
/// 4. Report the result, success or error, exactly once per lease
/// 5. Pause briefly, then lease again
///
/// A stop request is observed at the top of the loop, while leasing, and
/// during every sleep. An in-flight task gets `stop_grace` to finish; after
/// that it is aborted and reported as an error.
pub struct CrawlWorkerLoop<Q: TaskQueue> {
    queue: Arc<Q>,
    chain: FetchChain,
    extractor: LinkExtractor,
    options: WorkerOptions,
    stats: WorkerStats,
}

impl<Q: TaskQueue> CrawlWorkerLoop<Q> {
    pub fn new(queue: Arc<Q>, chain: FetchChain, options: WorkerOptions) -> Self {
        Self {
            queue,
            chain,
            extractor: LinkExtractor::new(),
            options,
            stats: WorkerStats::new(),
        }
    }

    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// Runs until `stop` turns true or the queue fails fatally
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) -> (WorkerExit, WorkerStats) {
        tracing::info!(
            session = %self.options.session,
            tiers = ?self.chain.tier_names(),
            "Starting crawl worker {}",
            self.options.worker_id
        );

        let exit = loop {
            if *stop.borrow() {
                break WorkerExit::Stopped;
            }

            let lease = tokio::select! {
                _ = wait_for_stop(&mut stop) => break WorkerExit::Stopped,
                lease = self.queue.lease_next(
                    &self.options.session,
                    self.options.institution_id.as_deref(),
                ) => lease,
            };

            let task = match lease {
                Ok(Lease::Task(task)) => task,
                Ok(Lease::Empty) => {
                    self.stats.record_idle();
                    tracing::info!("No URLs to process, sleeping {:?}", self.options.idle_interval);
                    if sleep_or_stop(self.options.idle_interval, &mut stop).await {
                        break WorkerExit::Stopped;
                    }
                    continue;
                }
                Err(e) if e.is_fatal() => {
                    tracing::error!("Queue rejected worker, exiting: {}", e);
                    break WorkerExit::Fatal(e);
                }
                Err(e) => {
                    tracing::warn!("Lease failed: {}", e);
                    if sleep_or_stop(self.options.idle_interval, &mut stop).await {
                        break WorkerExit::Stopped;
                    }
                    continue;
                }
            };

            self.process(task, &mut stop).await;

            if self.stats.is_report_due(self.options.stats_every) {
                tracing::info!("Worker {} stats: {}", self.options.worker_id, self.stats);
            }

            if sleep_or_stop(self.options.task_pause, &mut stop).await {
                break WorkerExit::Stopped;
            }
        };

        self.chain.cleanup().await;
        tracing::info!(
            "Worker {} exiting ({:?}): {}",
            self.options.worker_id,
            exit,
            self.stats
        );

        (exit, self.stats)
    }

    /// Processes one leased task and reports it
    async fn process(&mut self, task: CrawlTask, stop: &mut watch::Receiver<bool>) {
        let url = task.url.clone();
        tracing::info!("Processing {}", truncate_url(&url, 100));

        let outcome = {
            let work = AssertUnwindSafe(self.crawl(&task)).catch_unwind();
            tokio::pin!(work);

            tokio::select! {
                out = &mut work => Some(out),
                _ = wait_for_stop(stop) => {
                    tracing::info!(
                        "Stop requested with task in flight, allowing {:?}",
                        self.options.stop_grace
                    );
                    tokio::time::timeout(self.options.stop_grace, &mut work).await.ok()
                }
            }
        };

        let outcome = match outcome {
            Some(Ok(outcome)) => outcome,
            Some(Err(panic)) => {
                let message = panic_message(panic.as_ref());
                tracing::error!("Task panicked for {}: {}", url, message);
                TaskOutcome {
                    result: FetchResult::error(
                        &url,
                        FailureKind::Permanent,
                        format!("Worker panicked while processing task: {}", message),
                    ),
                    winner: None,
                    links_submitted: 0,
                }
            }
            None => {
                tracing::warn!("Aborted in-flight task {}", url);
                TaskOutcome {
                    result: FetchResult::error(
                        &url,
                        FailureKind::Transient,
                        "Task aborted: worker stopping",
                    ),
                    winner: None,
                    links_submitted: 0,
                }
            }
        };

        if let Err(e) = self
            .queue
            .report_result(&self.options.session, &outcome.result)
            .await
        {
            tracing::error!("Failed to report result for {}: {}", truncate_url(&url, 100), e);
        }

        self.stats
            .record_task(&outcome.result, outcome.winner, outcome.links_submitted);
    }

    /// Fetch chain plus link harvesting for one task
    async fn crawl(&self, task: &CrawlTask) -> TaskOutcome {
        let base_url = match parse_crawl_url(&task.url) {
            Ok(url) => url,
            Err(e) => {
                return TaskOutcome {
                    result: FetchResult::error(
                        &task.url,
                        FailureKind::Permanent,
                        format!("Invalid URL: {}", e),
                    ),
                    winner: None,
                    links_submitted: 0,
                };
            }
        };

        let outcome = self.chain.run(&task.url).await;

        let mut seen = SeenLinkSet::new();
        let mut links_submitted = 0;
        for markup in &outcome.markups {
            let links = self.extractor.extract(markup, &base_url, &mut seen);
            if links.is_empty() {
                continue;
            }

            match self.queue.submit_links(&links).await {
                Ok(SubmitOutcome::Accepted(count)) => links_submitted += count,
                Ok(_) => {}
                Err(e) => tracing::warn!("Failed to submit {} links: {}", links.len(), e),
            }
        }

        TaskOutcome {
            result: outcome.result,
            winner: outcome.winner,
            links_submitted,
        }
    }
}

/// Resolves once `stop` is true; never resolves if the sender is gone
async fn wait_for_stop(stop: &mut watch::Receiver<bool>) {
    loop {
        if *stop.borrow_and_update() {
            return;
        }
        if stop.changed().await.is_err() {
            futures::future::pending::<()>().await;
        }
    }
}

/// Sleeps for `duration`; returns `true` if a stop arrived first
async fn sleep_or_stop(duration: Duration, stop: &mut watch::Receiver<bool>) -> bool {
    if *stop.borrow() {
        return true;
    }
    if duration.is_zero() {
        return false;
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        _ = wait_for_stop(stop) => true,
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

//! HTTP client for the remote job queue
//!
//! The client is immutable after construction; all retry state lives on the
//! stack of a single call. Every request carries the `bearer` and `user-id`
//! headers expected by the queue API.

use super::models::{
    dedupe_links, is_idempotent_submit_message, parse_lease_body, ReportPayload, SubmitPayload,
};
use super::{describe_error_body, Lease, QueueError, RetryPolicy, SubmitOutcome, TaskQueue};
use crate::config::QueueConfig;
use crate::crawler::FetchResult;
use crate::url::truncate_url;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, Response, StatusCode};
use std::time::{Duration, Instant};
use tokio::time::sleep;

/// Timeout used by [`RemoteQueueClient::check_connection`]
const CONNECTION_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Session id used by the connection probe
const CONNECTION_CHECK_SESSION: &str = "connection_test";

/// Remote queue client speaking the lease/report/submit protocol
#[derive(Debug, Clone)]
pub struct RemoteQueueClient {
    client: Client,
    lease_url: String,
    report_url: String,
    submit_url: String,
    policy: RetryPolicy,
}

impl RemoteQueueClient {
    /// Builds a client from the queue configuration
    ///
    /// # Returns
    ///
    /// * `Ok(RemoteQueueClient)` - Ready to use
    /// * `Err(QueueError::Setup)` - Credentials cannot be sent as headers
    /// * `Err(QueueError::Transport)` - The HTTP client could not be built
    pub fn new(config: &QueueConfig) -> Result<Self, QueueError> {
        let mut headers = HeaderMap::new();
        headers.insert("bearer", header_value("API token", &config.api_token)?);
        headers.insert("user-id", header_value("user id", &config.user_id)?);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout())
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        let base = config.base_url.trim_end_matches('/');

        Ok(Self {
            client,
            lease_url: format!("{}{}", base, config.lease_path),
            report_url: format!("{}{}", base, config.report_path),
            submit_url: format!("{}{}", base, config.submit_path),
            policy: RetryPolicy::from_config(config),
        })
    }

    /// Replaces the retry policy
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Probes the lease endpoint with a throwaway session
    ///
    /// `200`, `204`, `401` and `403` all prove the API is reachable; only the
    /// first two prove the credentials are accepted.
    ///
    /// # Returns
    ///
    /// * `Ok(StatusCode)` - The API answered with a reachable status
    /// * `Err(QueueError)` - Transport failure or an unexpected status
    pub async fn check_connection(&self) -> Result<StatusCode, QueueError> {
        tracing::info!("Testing connection to {}", self.lease_url);

        let response = self
            .client
            .get(&self.lease_url)
            .query(&[("session", CONNECTION_CHECK_SESSION)])
            .timeout(CONNECTION_CHECK_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        match status.as_u16() {
            200 | 204 | 401 | 403 => {
                tracing::info!("Queue API reachable (HTTP {})", status.as_u16());
                Ok(status)
            }
            code => {
                let message = describe_body(response).await;
                tracing::error!(status = code, "Unexpected connection check response: {}", message);
                Err(QueueError::from_status(code, message))
            }
        }
    }

    async fn pause(&self, delay: Duration) {
        if !delay.is_zero() {
            sleep(delay).await;
        }
    }
}

#[async_trait]
impl TaskQueue for RemoteQueueClient {
    async fn lease_next(
        &self,
        session: &str,
        institution_id: Option<&str>,
    ) -> Result<Lease, QueueError> {
        let mut query: Vec<(&str, &str)> = vec![("session", session)];
        if let Some(id) = institution_id {
            query.push(("institution_id", id));
        }

        for attempt in 0..self.policy.max_attempts {
            let started = Instant::now();
            let response = match self.client.get(&self.lease_url).query(&query).send().await {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        "Lease request failed: {}; retrying in {:?}",
                        e,
                        self.policy.server_error_delay
                    );
                    self.pause(self.policy.server_error_delay).await;
                    continue;
                }
            };

            let status = response.status();
            tracing::debug!(
                status = status.as_u16(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Lease response"
            );

            if status == StatusCode::NO_CONTENT {
                tracing::debug!("No URLs available to crawl");
                return Ok(Lease::Empty);
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                let delay = self.policy.jittered_delay(attempt);
                tracing::warn!(
                    attempt = attempt + 1,
                    "Rate limited while leasing, backing off for {:?}",
                    delay
                );
                self.pause(delay).await;
                continue;
            }

            if status.is_success() {
                let body = match response.text().await {
                    Ok(body) => body,
                    Err(e) => {
                        tracing::warn!("Failed to read lease body: {}", e);
                        self.pause(self.policy.server_error_delay).await;
                        continue;
                    }
                };

                match parse_lease_body(&body) {
                    Ok(task) => {
                        tracing::info!("Leased URL: {}", truncate_url(&task.url, 100));
                        return Ok(Lease::Task(task));
                    }
                    Err(e) => {
                        tracing::warn!("Unusable lease response: {}", e);
                        self.pause(self.policy.server_error_delay).await;
                        continue;
                    }
                }
            }

            let code = status.as_u16();
            let message = describe_body(response).await;

            if status.is_server_error() {
                tracing::error!(
                    status = code,
                    attempt = attempt + 1,
                    "Queue server error while leasing: {}",
                    message
                );
                self.pause(self.policy.server_error_delay).await;
                continue;
            }

            let error = QueueError::from_status(code, message);
            if error.is_transient() {
                tracing::warn!(attempt = attempt + 1, "Transient lease error: {}", error);
                self.pause(self.policy.server_error_delay).await;
                continue;
            }

            tracing::error!(status = code, "Lease rejected: {}", error);
            return Err(error);
        }

        tracing::error!(
            "Lease attempts exhausted after {} tries, cooling down for {:?}",
            self.policy.max_attempts,
            self.policy.exhausted_cooldown
        );
        self.pause(self.policy.exhausted_cooldown).await;
        Ok(Lease::Empty)
    }

    async fn report_result(&self, session: &str, result: &FetchResult) -> Result<(), QueueError> {
        let payload = ReportPayload::new(session, result);
        let started = Instant::now();

        let response = self
            .client
            .post(&self.report_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to report {}: {}", truncate_url(&result.url, 100), e);
                QueueError::from(e)
            })?;

        let status = response.status();
        tracing::debug!(
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Report response"
        );

        if status.is_success() {
            tracing::info!(
                status = %result.status,
                "Reported result for {}",
                truncate_url(&result.url, 100)
            );
            return Ok(());
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let delay = self.policy.jittered_delay(0);
            tracing::warn!("Rate limited while reporting, backing off for {:?}", delay);
            self.pause(delay).await;
            return Err(QueueError::RateLimited);
        }

        let code = status.as_u16();
        let message = describe_body(response).await;
        tracing::error!(
            status = code,
            link = %truncate_url(&result.url, 100),
            "Failed to report result: {}",
            message
        );
        Err(QueueError::from_status(code, message))
    }

    async fn submit_links(&self, links: &[String]) -> Result<SubmitOutcome, QueueError> {
        let batch = dedupe_links(links);
        if batch.is_empty() {
            return Ok(SubmitOutcome::Empty);
        }

        let started = Instant::now();
        let response = self
            .client
            .post(&self.submit_url)
            .json(&SubmitPayload { links: &batch })
            .send()
            .await?;

        let status = response.status();
        tracing::debug!(
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            links = batch.len(),
            "Submit response"
        );

        if status == StatusCode::TOO_MANY_REQUESTS {
            let delay = self.policy.jittered_delay(0);
            tracing::warn!("Rate limited while submitting links, backing off for {:?}", delay);
            self.pause(delay).await;
            return Err(QueueError::RateLimited);
        }

        let code = status.as_u16();
        let body = response.text().await.unwrap_or_default();

        if status.is_success() {
            tracing::info!("Submitted {} new links", batch.len());
            return Ok(SubmitOutcome::Accepted(batch.len()));
        }

        if is_idempotent_submit_message(&body) {
            tracing::debug!("Submitted links were already known");
            return Ok(SubmitOutcome::AlreadyKnown);
        }

        let message = describe_error_body(&body);
        tracing::error!(status = code, "Failed to submit links: {}", message);
        Err(QueueError::from_status(code, message))
    }
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, QueueError> {
    HeaderValue::from_str(value)
        .map_err(|_| QueueError::Setup(format!("{} contains characters not allowed in a header", name)))
}

async fn describe_body(response: Response) -> String {
    match response.text().await {
        Ok(body) => describe_error_body(&body),
        Err(e) => format!("unreadable response body: {}", e),
    }
}

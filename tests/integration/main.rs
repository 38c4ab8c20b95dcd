//! Integration tests for Crawl-Fleet
//!
//! These tests use wiremock to stand in for the queue API and for crawled
//! sites, and fake launchers/probes for the supervisor.

mod fetch_tests;
mod queue_tests;
mod supervisor_tests;
mod worker_tests;

use crawl_fleet::config::QueueConfig;
use crawl_fleet::queue::{RemoteQueueClient, RetryPolicy};
use wiremock::MockServer;

pub const LEASE_PATH: &str = "/institutes/scraper/links/next/";
pub const REPORT_PATH: &str = "/institutes/scraper/links/check/";
pub const SUBMIT_PATH: &str = "/institutes/scraper/links/add/";

/// Queue configuration pointing at a mock server
pub fn queue_config(server: &MockServer) -> QueueConfig {
    QueueConfig {
        base_url: server.uri(),
        api_token: "test-token".to_string(),
        user_id: "7".to_string(),
        session: Some("session-1".to_string()),
        ..QueueConfig::default()
    }
}

/// Client with zero delays so retries run instantly
pub fn queue_client(server: &MockServer, max_attempts: u32) -> RemoteQueueClient {
    RemoteQueueClient::new(&queue_config(server))
        .expect("Failed to build queue client")
        .with_policy(RetryPolicy::immediate(max_attempts))
}

/// Plain HTML page with enough text to pass the length check
pub fn article_page(title: &str, body: &str) -> String {
    format!(
        r#"<html><head><title>{}</title></head><body>
        <nav><a href="/menu">Menu</a></nav>
        <main><h1>{}</h1><p>{}</p>
        <a href="/next">Next article</a>
        <a href="/files/report.pdf">Report</a>
        </main></body></html>"#,
        title, title, body
    )
}

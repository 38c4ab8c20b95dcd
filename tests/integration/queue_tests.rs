//! Queue protocol tests against a mock queue API

use super::{queue_client, LEASE_PATH, REPORT_PATH, SUBMIT_PATH};
use crawl_fleet::crawler::{FailureKind, FetchResult};
use crawl_fleet::queue::{Lease, QueueError, RetryPolicy, SubmitOutcome, TaskQueue};
use serde_json::json;
use std::time::{Duration, Instant};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_lease_returns_task_with_headers() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(LEASE_PATH))
        .and(query_param("session", "session-1"))
        .and(query_param("institution_id", "12"))
        .and(header("bearer", "test-token"))
        .and(header("user-id", "7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"link": "https://example.org/a", "institution_id": 12}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = queue_client(&server, 3);
    let lease = client.lease_next("session-1", Some("12")).await.unwrap();

    match lease {
        Lease::Task(task) => {
            assert_eq!(task.url, "https://example.org/a");
            assert_eq!(task.institution_id.as_deref(), Some("12"));
        }
        Lease::Empty => panic!("expected a task"),
    }
}

#[tokio::test]
async fn test_lease_backs_off_through_rate_limits() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(LEASE_PATH))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(3)
        .expect(3)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(LEASE_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"link": "https://example.org/after"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = queue_client(&server, 5);
    let lease = client.lease_next("session-1", None).await.unwrap();

    assert!(matches!(lease, Lease::Task(ref t) if t.url == "https://example.org/after"));
}

#[tokio::test]
async fn test_lease_rate_limit_delays_grow_to_cap() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(LEASE_PATH))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(4)
        .expect(4)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(LEASE_PATH))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let policy = RetryPolicy {
        max_attempts: 5,
        backoff_base: Duration::from_millis(20),
        backoff_cap: Duration::from_millis(80),
        server_error_delay: Duration::ZERO,
        exhausted_cooldown: Duration::ZERO,
    };
    let client = queue_client(&server, 5).with_policy(policy);

    let started = Instant::now();
    let lease = client.lease_next("session-1", None).await.unwrap();
    let elapsed = started.elapsed();

    assert!(matches!(lease, Lease::Empty));
    // 20 + 40 + 80 + 80 ms; an uncapped fourth delay would add another 80 ms
    assert!(elapsed >= Duration::from_millis(220), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(290), "elapsed {:?}", elapsed);
}

#[tokio::test]
async fn test_lease_no_content_is_empty() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(LEASE_PATH))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = queue_client(&server, 5);
    assert!(matches!(
        client.lease_next("session-1", None).await.unwrap(),
        Lease::Empty
    ));
}

#[tokio::test]
async fn test_lease_server_errors_exhaust_to_empty() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(LEASE_PATH))
        .respond_with(
            ResponseTemplate::new(500)
                .set_body_string("<html><head><title>Server Error (500)</title></head></html>"),
        )
        .expect(3)
        .mount(&server)
        .await;

    let client = queue_client(&server, 3);
    assert!(matches!(
        client.lease_next("session-1", None).await.unwrap(),
        Lease::Empty
    ));
}

#[tokio::test]
async fn test_lease_unauthorized_is_fatal() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(LEASE_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": "Invalid token."})))
        .expect(1)
        .mount(&server)
        .await;

    let client = queue_client(&server, 5);
    let error = client.lease_next("session-1", None).await.unwrap_err();

    assert!(error.is_fatal());
    assert!(error.to_string().contains("Invalid token."));
}

#[tokio::test]
async fn test_lease_skips_unusable_body() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(LEASE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"link": ""}})))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(LEASE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"link": "https://example.org/ok"})))
        .mount(&server)
        .await;

    let client = queue_client(&server, 3);
    assert!(matches!(
        client.lease_next("session-1", None).await.unwrap(),
        Lease::Task(_)
    ));
}

#[tokio::test]
async fn test_report_error_sends_nulls() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(REPORT_PATH))
        .and(body_json(json!({
            "link": "https://example.org/x",
            "session_id": "session-1",
            "status": "error",
            "error": "HTTP 404",
            "content": null,
            "title": null
        })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let client = queue_client(&server, 3);
    let result = FetchResult::error("https://example.org/x", FailureKind::Permanent, "HTTP 404");
    client.report_result("session-1", &result).await.unwrap();
}

#[tokio::test]
async fn test_report_success_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(REPORT_PATH))
        .and(body_json(json!({
            "link": "https://example.org/y",
            "session_id": "session-1",
            "status": "success",
            "error": null,
            "content": "# Hello",
            "title": "Hello"
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = queue_client(&server, 3);
    let result = FetchResult::success(
        "https://example.org/y",
        "Hello",
        "# Hello",
        Some("<h1>Hello</h1>".to_string()),
    );
    client.report_result("session-1", &result).await.unwrap();
}

#[tokio::test]
async fn test_report_rejection_message() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(REPORT_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "Link not leased"})))
        .mount(&server)
        .await;

    let client = queue_client(&server, 3);
    let result = FetchResult::error("https://example.org/z", FailureKind::Permanent, "HTTP 500");
    let error = client.report_result("session-1", &result).await.unwrap_err();

    assert!(matches!(error, QueueError::Rejected { status: 400, .. }));
    assert!(error.to_string().contains("Link not leased"));
}

#[tokio::test]
async fn test_report_rate_limited() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(REPORT_PATH))
        .respond_with(ResponseTemplate::new(429))
        .expect(1)
        .mount(&server)
        .await;

    let client = queue_client(&server, 3);
    let result = FetchResult::error("https://example.org/z", FailureKind::Permanent, "HTTP 500");
    assert!(matches!(
        client.report_result("session-1", &result).await,
        Err(QueueError::RateLimited)
    ));
}

#[tokio::test]
async fn test_submit_same_links_twice_succeeds() {
    let server = MockServer::start().await;
    let links = vec![
        "https://example.org/a".to_string(),
        "https://example.org/b".to_string(),
        "https://example.org/a".to_string(),
    ];

    Mock::given(method("POST"))
        .and(path(SUBMIT_PATH))
        .and(body_json(json!({"links": ["https://example.org/a", "https://example.org/b"]})))
        .respond_with(ResponseTemplate::new(201))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(SUBMIT_PATH))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(json!({"error": "Links already exist in this session"})),
        )
        .mount(&server)
        .await;

    let client = queue_client(&server, 3);
    assert_eq!(client.submit_links(&links).await.unwrap(), SubmitOutcome::Accepted(2));
    assert_eq!(client.submit_links(&links).await.unwrap(), SubmitOutcome::AlreadyKnown);
}

#[tokio::test]
async fn test_submit_partial_duplicates_counts_accepted() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(SUBMIT_PATH))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!({"message": "1 added, 1 link already exist in this session"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = queue_client(&server, 3);
    let links = vec![
        "https://example.org/new".to_string(),
        "https://example.org/old".to_string(),
    ];
    assert_eq!(client.submit_links(&links).await.unwrap(), SubmitOutcome::Accepted(2));
}

#[tokio::test]
async fn test_submit_empty_batch_skips_request() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let client = queue_client(&server, 3);
    assert_eq!(client.submit_links(&[]).await.unwrap(), SubmitOutcome::Empty);
}

#[tokio::test]
async fn test_check_connection_accepts_forbidden() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(LEASE_PATH))
        .and(query_param("session", "connection_test"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    let client = queue_client(&server, 3);
    assert_eq!(client.check_connection().await.unwrap().as_u16(), 403);
}

#[tokio::test]
async fn test_check_connection_rejects_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_string("<title>Page not found</title>"))
        .mount(&server)
        .await;

    let client = queue_client(&server, 3);
    let error = client.check_connection().await.unwrap_err();
    assert_eq!(error.status(), Some(404));
}

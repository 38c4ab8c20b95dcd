//! End-to-end worker loop tests: mock queue API, scripted fetch tiers

use super::{queue_client, LEASE_PATH, REPORT_PATH, SUBMIT_PATH};
use async_trait::async_trait;
use crawl_fleet::crawler::{
    CrawlWorkerLoop, FailureKind, FetchChain, FetchResult, FetchStrategy, WorkerExit,
    WorkerOptions,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Tier with a fixed suitability verdict and a fixed result
struct Tier {
    name: &'static str,
    cost: u32,
    suitable: bool,
    result: Option<FetchResult>,
    fetches: Arc<AtomicU32>,
}

impl Tier {
    fn new(name: &'static str, cost: u32, suitable: bool, result: Option<FetchResult>) -> Self {
        Self {
            name,
            cost,
            suitable,
            result,
            fetches: Arc::new(AtomicU32::new(0)),
        }
    }
}

#[async_trait]
impl FetchStrategy for Tier {
    fn name(&self) -> &'static str {
        self.name
    }

    fn cost(&self) -> u32 {
        self.cost
    }

    async fn is_suitable(&self, _url: &str) -> crawl_fleet::Result<bool> {
        Ok(self.suitable)
    }

    async fn fetch(&self, url: &str) -> FetchResult {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        match &self.result {
            Some(result) => {
                let mut result = result.clone();
                result.url = url.to_string();
                result
            }
            None => FetchResult::error(url, FailureKind::Permanent, "unexpected fetch"),
        }
    }

    async fn cleanup(&self) {}
}

fn options() -> WorkerOptions {
    WorkerOptions {
        worker_id: "e2e".to_string(),
        session: "session-1".to_string(),
        institution_id: None,
        idle_interval: Duration::from_millis(10),
        task_pause: Duration::ZERO,
        stop_grace: Duration::from_millis(100),
        stats_every: 10,
    }
}

/// Runs a worker until the mock queue has seen `leases` lease requests
async fn run_worker(server: &MockServer, chain: FetchChain, leases: usize) -> WorkerExit {
    let queue = Arc::new(queue_client(server, 1));
    let worker = CrawlWorkerLoop::new(queue, chain, options());
    let (stop_tx, stop_rx) = watch::channel(false);
    let handle = tokio::spawn(worker.run(stop_rx));

    for _ in 0..400 {
        let seen = server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path() == LEASE_PATH)
            .count();
        if seen >= leases {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    stop_tx.send(true).unwrap();
    let (exit, _stats) = handle.await.unwrap();
    exit
}

async fn reports(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == REPORT_PATH)
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect()
}

#[tokio::test]
async fn test_escalates_to_browser_and_reports_once() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(LEASE_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"data": {"link": "https://uni.example/p"}})),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(LEASE_PATH))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(REPORT_PATH))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(SUBMIT_PATH))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;

    let lightweight = Tier::new("lightweight", 1, false, None);
    let lightweight_fetches = Arc::clone(&lightweight.fetches);
    let asynchronous = Tier::new(
        "asynchronous",
        2,
        true,
        Some(FetchResult::error("", FailureKind::ContentUnavailable, "Page content too short")),
    );
    let browser = Tier::new(
        "browser",
        5,
        true,
        Some(FetchResult::success(
            "",
            "Programs",
            "# Programs\n\nUndergraduate and graduate programs",
            Some(r#"<main><a href="/apply">Apply</a><a href="mailto:x@y.z">Mail</a></main>"#.to_string()),
        )),
    );

    let chain = FetchChain::new(
        vec![Box::new(browser), Box::new(asynchronous), Box::new(lightweight)],
        0,
        Duration::ZERO,
    );

    let exit = run_worker(&server, chain, 2).await;
    assert!(matches!(exit, WorkerExit::Stopped));
    assert_eq!(lightweight_fetches.load(Ordering::SeqCst), 0);

    let reports = reports(&server).await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0]["link"], "https://uni.example/p");
    assert_eq!(reports[0]["status"], "success");
    assert_eq!(reports[0]["title"], "Programs");
    assert_eq!(reports[0]["error"], Value::Null);

    let submitted: Vec<Value> = server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == SUBMIT_PATH)
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect();
    assert_eq!(submitted, vec![json!({"links": ["https://uni.example/apply"]})]);
}

#[tokio::test]
async fn test_empty_queue_never_reports() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(LEASE_PATH))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let chain = FetchChain::new(
        vec![Box::new(Tier::new("lightweight", 1, true, None))],
        0,
        Duration::ZERO,
    );

    run_worker(&server, chain, 3).await;
    assert!(reports(&server).await.is_empty());
}

#[tokio::test]
async fn test_unsuitable_everywhere_reports_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(LEASE_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"link": "https://uni.example/file"})),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(LEASE_PATH))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(REPORT_PATH))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;

    let chain = FetchChain::new(
        vec![
            Box::new(Tier::new("lightweight", 1, false, None)),
            Box::new(Tier::new("asynchronous", 2, false, None)),
        ],
        0,
        Duration::ZERO,
    );

    run_worker(&server, chain, 2).await;

    let reports = reports(&server).await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0]["status"], "error");
    assert_eq!(reports[0]["content"], Value::Null);
    let error = reports[0]["error"].as_str().unwrap();
    assert!(error.contains("lightweight: not suitable"));
}

#[tokio::test]
async fn test_rejected_credentials_stop_worker() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(LEASE_PATH))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({"detail": "Forbidden"})))
        .expect(1)
        .mount(&server)
        .await;

    let queue = Arc::new(queue_client(&server, 3));
    let chain = FetchChain::new(Vec::new(), 0, Duration::ZERO);
    let (_stop_tx, stop_rx) = watch::channel(false);

    let (exit, _) = CrawlWorkerLoop::new(queue, chain, options()).run(stop_rx).await;
    assert!(matches!(exit, WorkerExit::Fatal(_)));
    assert_eq!(exit.exit_code(), 2);
}

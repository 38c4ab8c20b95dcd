//! HTTP tier and chain tests against mock sites

use super::article_page;
use crawl_fleet::config::FetchConfig;
use crawl_fleet::crawler::{
    AsynchronousStrategy, ContentCleaner, FetchChain, FetchStrategy, HtmlCleaner,
    LightweightStrategy,
};
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fetch_config() -> FetchConfig {
    FetchConfig {
        browser_enabled: false,
        tier_retry_attempts: 0,
        tier_retry_backoff_ms: 0,
        ..FetchConfig::default()
    }
}

fn cleaner() -> Arc<dyn ContentCleaner> {
    Arc::new(HtmlCleaner::default())
}

async fn mount_html(server: &MockServer, route: &str, status: u16, body: String) {
    Mock::given(method("HEAD"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status).insert_header("content-type", "text/html"))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(status)
                .set_body_string(body)
                .insert_header("content-type", "text/html; charset=utf-8"),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_lightweight_fetches_static_page() {
    let server = MockServer::start().await;
    let body = "Admissions open for the autumn term. ".repeat(5);
    mount_html(&server, "/news", 200, article_page("Admissions", &body)).await;

    let tier = LightweightStrategy::new(&fetch_config(), cleaner()).unwrap();
    let url = format!("{}/news", server.uri());

    assert!(tier.is_suitable(&url).await.unwrap());
    let result = tier.fetch(&url).await;

    assert!(result.is_success(), "unexpected error: {:?}", result.error);
    assert_eq!(result.title, "Admissions");
    assert!(result.content.contains("# Admissions"));
    assert!(result.content.contains("autumn term"));
    assert!(!result.content.contains("Menu"));
    assert!(result.raw_markup.is_some());
}

#[tokio::test]
async fn test_lightweight_rejects_non_html() {
    let server = MockServer::start().await;

    Mock::given(method("HEAD"))
        .and(path("/data"))
        .respond_with(ResponseTemplate::new(200).insert_header("content-type", "application/json"))
        .mount(&server)
        .await;

    let tier = LightweightStrategy::new(&fetch_config(), cleaner()).unwrap();
    assert!(!tier.is_suitable(&format!("{}/data", server.uri())).await.unwrap());
}

#[tokio::test]
async fn test_download_urls_never_suitable() {
    let server = MockServer::start().await;

    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(200).insert_header("content-type", "text/html"))
        .expect(0)
        .mount(&server)
        .await;

    let tier = LightweightStrategy::new(&fetch_config(), cleaner()).unwrap();
    let url = format!("{}/files/prospectus.pdf", server.uri());
    assert!(!tier.is_suitable(&url).await.unwrap());
}

#[tokio::test]
async fn test_short_page_rejected() {
    let server = MockServer::start().await;
    mount_html(&server, "/tiny", 200, "<p>hi</p>".to_string()).await;

    let tier = LightweightStrategy::new(&fetch_config(), cleaner()).unwrap();
    let result = tier.fetch(&format!("{}/tiny", server.uri())).await;

    assert_eq!(result.error.as_deref(), Some("Page content too short"));
}

#[tokio::test]
async fn test_javascript_page_keeps_markup() {
    let server = MockServer::start().await;
    let body = format!(
        r#"<html><body><noscript>Please enable JavaScript to view this site.</noscript>
        <div id="root"></div><a href="/about">About</a>{}</body></html>"#,
        "<span></span>".repeat(20)
    );
    mount_html(&server, "/app", 200, body).await;

    let tier = LightweightStrategy::new(&fetch_config(), cleaner()).unwrap();
    let result = tier.fetch(&format!("{}/app", server.uri())).await;

    assert_eq!(result.error.as_deref(), Some("Page requires JavaScript"));
    assert!(result.raw_markup.unwrap().contains("/about"));
}

#[tokio::test]
async fn test_http_error_status() {
    let server = MockServer::start().await;
    mount_html(&server, "/gone", 404, "Not found".to_string()).await;

    let tier = LightweightStrategy::new(&fetch_config(), cleaner()).unwrap();
    let result = tier.fetch(&format!("{}/gone", server.uri())).await;

    assert_eq!(result.error.as_deref(), Some("HTTP 404"));
    assert!(!result.is_retryable());
}

#[tokio::test]
async fn test_asynchronous_accepts_head_not_allowed() {
    let server = MockServer::start().await;

    Mock::given(method("HEAD"))
        .and(path("/legacy"))
        .respond_with(ResponseTemplate::new(405))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/legacy"))
        .respond_with(ResponseTemplate::new(200).set_body_string(article_page(
            "Legacy",
            &"Department of physics research groups. ".repeat(5),
        )))
        .mount(&server)
        .await;

    let config = fetch_config();
    let light = LightweightStrategy::new(&config, cleaner()).unwrap();
    let asynchronous = AsynchronousStrategy::new(&config, cleaner()).unwrap();
    let url = format!("{}/legacy", server.uri());

    assert!(!light.is_suitable(&url).await.unwrap());
    assert!(asynchronous.is_suitable(&url).await.unwrap());

    let result = asynchronous.fetch(&url).await;
    assert!(result.is_success(), "unexpected error: {:?}", result.error);
    assert_eq!(result.title, "Legacy");
}

#[tokio::test]
async fn test_chain_without_browser_reports_every_tier() {
    let server = MockServer::start().await;
    mount_html(&server, "/short", 200, "<p>too short</p>".to_string()).await;

    let chain = FetchChain::from_config(&fetch_config()).unwrap();
    assert_eq!(chain.tier_names(), vec!["lightweight", "asynchronous"]);

    let url = format!("{}/short", server.uri());
    let outcome = chain.run(&url).await;

    let error = outcome.result.error.unwrap();
    assert!(error.starts_with(&format!("All fetch strategies failed for {}", url)));
    assert!(error.contains("lightweight: Page content too short"));
    assert!(error.contains("asynchronous: Page content too short"));
}

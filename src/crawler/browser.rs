//! WebDriver browser tier for JavaScript-rendered pages

use super::cleaner::ContentCleaner;
use super::http::random_user_agent;
use super::parser::is_bot_challenge;
use super::strategy::{FetchStrategy, BROWSER_COST};
use super::task::{FailureKind, FetchResult};
use crate::config::FetchConfig;
use crate::url::check_crawlable;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thirtyfour::prelude::*;
use tokio::sync::Mutex;

/// Containers tried, in order, before falling back to the whole document
const CONTENT_SELECTORS: &[&str] = &[
    "main",
    "article",
    "#main-content",
    ".main-content",
    ".content",
    "#content",
    "[role=\"main\"]",
];

/// Time given to a bot-protection interstitial to resolve itself
const CHALLENGE_WAIT: Duration = Duration::from_secs(5);

/// Most expensive tier: drives a real browser through a WebDriver endpoint
///
/// The browser session is created lazily on the first fetch and reused for
/// the life of the worker. Any WebDriver error discards the session so the
/// next fetch starts from a fresh one.
pub struct BrowserStrategy {
    webdriver_url: String,
    page_load_timeout: Duration,
    cleaner: Arc<dyn ContentCleaner>,
    driver: Mutex<Option<WebDriver>>,
}

impl BrowserStrategy {
    pub fn new(config: &FetchConfig, cleaner: Arc<dyn ContentCleaner>) -> Self {
        Self {
            webdriver_url: config.webdriver_url.clone(),
            page_load_timeout: config.page_load_timeout(),
            cleaner,
            driver: Mutex::new(None),
        }
    }

    async fn start_driver(&self) -> WebDriverResult<WebDriver> {
        let mut caps = DesiredCapabilities::chrome();
        caps.set_headless()?;
        caps.add_chrome_arg("--no-sandbox")?;
        caps.add_chrome_arg("--disable-dev-shm-usage")?;
        caps.add_chrome_arg("--disable-gpu")?;
        caps.add_chrome_arg("--window-size=1280,720")?;
        caps.add_chrome_arg(&format!("--user-agent={}", random_user_agent()))?;

        let driver = WebDriver::new(&self.webdriver_url, caps).await?;
        driver.set_page_load_timeout(self.page_load_timeout).await?;

        tracing::debug!("Browser session started at {}", self.webdriver_url);
        Ok(driver)
    }

    async fn render(&self, driver: &WebDriver, url: &str) -> WebDriverResult<FetchResult> {
        match tokio::time::timeout(self.page_load_timeout, driver.goto(url)).await {
            Err(_) => {
                return Ok(FetchResult::error(url, FailureKind::Transient, "Page load timeout"));
            }
            Ok(result) => result?,
        }

        let mut source = driver.source().await?;
        if is_bot_challenge(&source) {
            tracing::info!("Detected bot protection challenge on {}", url);
            tokio::time::sleep(CHALLENGE_WAIT).await;
            source = driver.source().await?;

            if is_bot_challenge(&source) {
                return Ok(FetchResult::error(
                    url,
                    FailureKind::ContentUnavailable,
                    "Failed to bypass bot protection",
                ));
            }
        }

        let title = driver.title().await.unwrap_or_default();

        let mut content_html = String::new();
        for selector in CONTENT_SELECTORS.iter().copied() {
            let Ok(element) = driver.find(By::Css(selector)).await else {
                continue;
            };
            if let Ok(html) = element.inner_html().await {
                if !html.trim().is_empty() {
                    tracing::debug!("Using content container {}", selector);
                    content_html = html;
                    break;
                }
            }
        }

        let content = if content_html.trim().is_empty() {
            self.cleaner.clean(&source)
        } else {
            self.cleaner.clean(&content_html)
        };

        if content.trim().is_empty() {
            return Ok(
                FetchResult::error(url, FailureKind::ContentUnavailable, "No content extracted")
                    .with_title(title)
                    .with_raw_markup(Some(source)),
            );
        }

        Ok(FetchResult::success(url, title, content, Some(source)))
    }
}

#[async_trait]
impl FetchStrategy for BrowserStrategy {
    fn name(&self) -> &'static str {
        "browser"
    }

    fn cost(&self) -> u32 {
        BROWSER_COST
    }

    async fn is_suitable(&self, url: &str) -> crate::Result<bool> {
        Ok(check_crawlable(url).is_ok())
    }

    async fn fetch(&self, url: &str) -> FetchResult {
        let mut slot = self.driver.lock().await;

        let driver = match slot.take() {
            Some(driver) => driver,
            None => match self.start_driver().await {
                Ok(driver) => driver,
                Err(e) => {
                    tracing::error!("Failed to start browser session: {}", e);
                    return FetchResult::error(
                        url,
                        FailureKind::Permanent,
                        format!("Browser session failed: {}", e),
                    );
                }
            },
        };

        match self.render(&driver, url).await {
            Ok(result) => {
                *slot = Some(driver);
                result
            }
            Err(e) => {
                tracing::warn!("Browser error on {}, discarding session: {}", url, e);
                if let Err(quit_error) = driver.quit().await {
                    tracing::debug!("Failed to quit browser session: {}", quit_error);
                }
                FetchResult::error(url, FailureKind::Permanent, format!("Browser error: {}", e))
            }
        }
    }

    async fn cleanup(&self) {
        let mut slot = self.driver.lock().await;
        if let Some(driver) = slot.take() {
            match driver.quit().await {
                Ok(()) => tracing::debug!("Browser session closed"),
                Err(e) => tracing::warn!("Error closing browser session: {}", e),
            }
        }
    }
}

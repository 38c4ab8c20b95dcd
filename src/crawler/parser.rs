//! HTML parsing for titles, client-side-rendering markers, and links
//!
//! This module handles:
//! - Page title extraction
//! - Detection of pages that only render with JavaScript or sit behind a
//!   bot-protection interstitial
//! - Link extraction with per-task deduplication

use crate::url::{is_likely_download_url, normalize_link};
use once_cell::sync::Lazy;
use scraper::{Html, Node, Selector};
use std::collections::HashSet;
use url::Url;

/// Phrases in visible page text that mean the real content needs a browser
const JS_REQUIRED_INDICATORS: &[&str] = &[
    // Protection systems
    "captcha",
    "cloudflare",
    "security check",
    "ddos protection",
    "bot protection",
    "human verification",
    "robot verification",
    "browser verification",
    "browser check",
    // JavaScript requirements
    "please enable javascript",
    "javascript is required",
    "javascript is disabled",
    "js is required",
    "enable js",
    "enable javascript",
    // Loading states
    "loading...",
    "please wait",
    "loading content",
    "loading page",
    "checking your browser",
    // Access issues
    "access denied",
    "403 forbidden",
    "401 unauthorized",
    // Empty content
    "no content available",
    "content not found",
    "page not available",
    // Dynamic content
    "fetching data",
    "loading data",
    "retrieving content",
    "error loading",
    "failed to load",
];

/// Phrases shown by bot-protection interstitials that a browser did not pass
const BOT_CHALLENGE_PHRASES: &[&str] = &[
    "checking if the site connection is secure",
    "please wait while we verify",
    "please stand by, while we are checking",
    "checking your browser before accessing",
];

static TITLE_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("title").unwrap());

static ANCHOR_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());

/// Extracts the page title from the HTML document
pub fn extract_title(document: &Html) -> Option<String> {
    document
        .select(&TITLE_SELECTOR)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Collects the text of the document outside scripts and styles, lowercased
pub fn visible_text_lowercase(document: &Html) -> String {
    let mut text = String::new();

    for node in document.root_element().descendants() {
        let Node::Text(fragment) = node.value() else {
            continue;
        };

        let in_code = node
            .parent()
            .and_then(|p| p.value().as_element().map(|e| e.name()))
            .map(|name| matches!(name, "script" | "style" | "template"))
            .unwrap_or(false);

        if !in_code {
            text.push_str(fragment);
            text.push(' ');
        }
    }

    text.to_lowercase()
}

/// Checks whether page text looks like a JavaScript-only or protected page
///
/// # Example
///
/// ```
/// use crawl_fleet::crawler::requires_javascript;
///
/// assert!(requires_javascript("<html><body>Please enable JavaScript to continue</body></html>"));
/// assert!(!requires_javascript("<html><body><p>Admissions and programs</p></body></html>"));
/// ```
pub fn requires_javascript(html: &str) -> bool {
    let document = Html::parse_document(html);
    let text = visible_text_lowercase(&document);
    JS_REQUIRED_INDICATORS.iter().any(|marker| text.contains(marker))
}

/// Checks whether rendered markup is still a bot-protection challenge
pub fn is_bot_challenge(html: &str) -> bool {
    let lowered = html.to_lowercase();
    BOT_CHALLENGE_PHRASES.iter().any(|p| lowered.contains(p))
        || lowered.contains("challenges.cloudflare.com")
        || lowered.contains("id=\"challenge-form\"")
        || lowered.contains("cf-browser-verification")
}

/// Absolute URLs already emitted while processing one task
///
/// Shared by every tier of the chain for that task, then dropped. Links are
/// stored in their normalized form.
#[derive(Debug, Default)]
pub struct SeenLinkSet {
    links: HashSet<String>,
}

impl SeenLinkSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a link, returning `true` if it was not seen before
    pub fn insert(&mut self, link: &str) -> bool {
        self.links.insert(link.to_string())
    }

    pub fn contains(&self, link: &str) -> bool {
        self.links.contains(link)
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

/// Extracts crawlable links from raw markup
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a href="...">` resolved against the page URL, http(s) only
///
/// **Exclude:**
/// - `javascript:`, `mailto:`, `tel:`, `data:` links and fragment-only anchors
/// - `<a href="..." download>`
/// - URLs that look like file downloads
/// - Links already in the task's [`SeenLinkSet`]
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkExtractor;

impl LinkExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Returns links not yet in `seen`, in document order, and records them
    ///
    /// # Example
    ///
    /// ```
    /// use crawl_fleet::crawler::{LinkExtractor, SeenLinkSet};
    /// use url::Url;
    ///
    /// let base = Url::parse("https://example.org/news/").unwrap();
    /// let html = r#"<a href="a">A</a><a href="/b#top">B</a><a href="/b">B again</a>"#;
    /// let mut seen = SeenLinkSet::new();
    /// let links = LinkExtractor::new().extract(html, &base, &mut seen);
    /// assert_eq!(links, vec!["https://example.org/news/a", "https://example.org/b"]);
    /// ```
    pub fn extract(&self, html: &str, base_url: &Url, seen: &mut SeenLinkSet) -> Vec<String> {
        let document = Html::parse_document(html);
        let mut links = Vec::new();

        for element in document.select(&ANCHOR_SELECTOR) {
            if element.value().attr("download").is_some() {
                continue;
            }

            let Some(href) = element.value().attr("href") else {
                continue;
            };

            let Some(absolute_url) = resolve_link(href, base_url) else {
                continue;
            };

            if is_likely_download_url(&absolute_url) {
                continue;
            }

            let link = absolute_url.to_string();
            if seen.insert(&link) {
                links.push(link);
            }
        }

        tracing::debug!("Extracted {} new links from {}", links.len(), base_url);
        links
    }
}

/// Resolves a link href to a normalized absolute URL
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - Fragment-only anchors
/// - Invalid URLs
/// - Non-HTTP(S) URLs after resolution
fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lowered = href.to_lowercase();
    if lowered.starts_with("javascript:")
        || lowered.starts_with("mailto:")
        || lowered.starts_with("tel:")
        || lowered.starts_with("data:")
    {
        return None;
    }

    let absolute_url = base_url.join(href).ok()?;
    if absolute_url.scheme() != "http" && absolute_url.scheme() != "https" {
        return None;
    }
    absolute_url.host_str()?;

    Some(normalize_link(absolute_url))
}

//! URL handling module for Crawl-Fleet
//!
//! This module provides URL validation, download-link filtering, and the
//! link normalization used for per-task deduplication.

mod filter;
mod normalize;

use crate::{UrlError, UrlResult};
use ::url::Url;

// Re-export main functions
pub use filter::is_likely_download_url;
pub use normalize::{normalize_link, parse_crawl_url};

/// Checks that a URL is well-formed and does not look like a file download
///
/// This is the shared first stage of every fetch tier's suitability check.
///
/// # Returns
///
/// * `Ok(Url)` - The parsed URL
/// * `Err(UrlError)` - Malformed, unsupported scheme, or likely download
pub fn check_crawlable(url_str: &str) -> UrlResult<Url> {
    let url = parse_crawl_url(url_str)?;

    if is_likely_download_url(&url) {
        return Err(UrlError::LikelyDownload(url.to_string()));
    }

    Ok(url)
}

/// Shortens a URL for log lines
pub fn truncate_url(url: &str, max_chars: usize) -> String {
    if url.chars().count() <= max_chars {
        return url.to_string();
    }
    let mut truncated: String = url.chars().take(max_chars).collect();
    truncated.push_str("...");
    truncated
}

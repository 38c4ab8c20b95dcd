use crate::{UrlError, UrlResult};
use url::Url;

/// Parses a URL the crawler is allowed to fetch
///
/// # Rules
///
/// 1. Parse the URL; reject if malformed
/// 2. Only `http` and `https` schemes are accepted
/// 3. A host must be present
///
/// # Examples
///
/// ```
/// use crawl_fleet::url::parse_crawl_url;
///
/// assert!(parse_crawl_url("https://example.org/a").is_ok());
/// assert!(parse_crawl_url("mailto:someone@example.org").is_err());
/// ```
pub fn parse_crawl_url(url_str: &str) -> UrlResult<Url> {
    let url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => Err(UrlError::MissingDomain),
    }
}

/// Normalizes a discovered link into the form used for per-task deduplication
///
/// Only page-local differences are removed: the fragment, and an empty query
/// string. Anything that could address a different resource on the server is
/// left alone; cross-page deduplication belongs to the remote queue.
///
/// # Examples
///
/// ```
/// use crawl_fleet::url::normalize_link;
/// use url::Url;
///
/// let url = Url::parse("https://Example.org/page?#top").unwrap();
/// assert_eq!(normalize_link(url).as_str(), "https://example.org/page");
/// ```
pub fn normalize_link(mut url: Url) -> Url {
    url.set_fragment(None);

    if url.query() == Some("") {
        url.set_query(None);
    }

    url
}

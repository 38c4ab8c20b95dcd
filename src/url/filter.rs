use url::Url;

/// File extensions that never lead to an HTML page
const SKIP_EXTENSIONS: &[&str] = &[
    // Documents
    "pdf", "doc", "docx", "ppt", "pptx", "xls", "xlsx", "odt", "ods", "odp",
    // Archives
    "zip", "rar", "7z", "tar", "gz", "bz2",
    // Images
    "jpg", "jpeg", "png", "gif", "bmp", "tiff", "svg", "webp",
    // Audio/Video
    "mp3", "mp4", "avi", "mov", "wmv", "flv", "wav", "ogg",
    // Other
    "exe", "dmg", "pkg", "iso", "csv", "xml", "json", "rss",
    // Web assets
    "css", "js", "woff", "woff2", "ttf", "eot",
];

/// Path fragments typical of download endpoints
const DOWNLOAD_PATTERNS: &[&str] = &[
    "/download/",
    "/downloads/",
    "/dl/",
    "/document/",
    "/documents/",
    "/file/",
    "/files/",
    "/attachment/",
    "/attachments/",
    "/export/",
    "/print/",
];

/// Checks if a URL likely points to a downloadable file rather than a page
///
/// A URL is considered a download when its last path segment carries one of
/// the known binary/asset extensions, or when the URL contains a typical
/// download path segment such as `/download/` or `/attachments/`.
///
/// # Examples
///
/// ```
/// use crawl_fleet::url::is_likely_download_url;
/// use url::Url;
///
/// assert!(is_likely_download_url(&Url::parse("https://example.org/report.PDF").unwrap()));
/// assert!(!is_likely_download_url(&Url::parse("https://example.org/about").unwrap()));
/// ```
pub fn is_likely_download_url(url: &Url) -> bool {
    let path = url.path().to_lowercase();

    let last_segment = path.rsplit('/').next().unwrap_or("");
    if let Some((_, ext)) = last_segment.rsplit_once('.') {
        if SKIP_EXTENSIONS.contains(&ext) {
            tracing::debug!("Skipping file download URL: {}", url);
            return true;
        }
    }

    let lowered = url.as_str().to_lowercase();
    if DOWNLOAD_PATTERNS.iter().any(|p| lowered.contains(p)) {
        tracing::debug!("Skipping probable download URL: {}", url);
        return true;
    }

    false
}

//! HTML to lightweight-markdown content cleaning
//!
//! The cleaner drops page chrome (navigation, headers, footers, forms),
//! hidden elements and clutter (ads, share widgets, cookie banners), then
//! renders what is left as markdown-flavoured text: ATX headings, `-`
//! bullets, and paragraphs separated by a single blank line. Lines with no
//! meaningful content are dropped.
//!
//! Cleaning never fails: an empty string means the page had no usable
//! content.

use ego_tree::NodeRef;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Node};

/// Tags removed together with everything inside them
const UNWANTED_TAGS: &[&str] = &[
    "nav", "header", "footer", "aside", "menu", "script", "style", "noscript", "iframe",
    "canvas", "form", "dialog", "svg", "template", "button", "select", "object", "embed",
];

/// Utility classes that hide an element
const HIDDEN_CLASSES: &[&str] = &[
    "hidden", "hide", "invisible", "d-none", "display-none", "visually-hidden", "sr-only",
    "collapse", "collapsed", "none", "hidden-xs", "hidden-sm", "hidden-md", "hidden-lg",
    "visuallyhidden", "is-hidden", "u-hidden",
];

/// Exact class names of clutter blocks
const CLUTTER_CLASSES: &[&str] = &[
    "advertisement", "social-share", "related-posts", "recommended", "newsletter",
    "subscription", "popup", "modal", "overlay", "cookie-notice", "banner", "alert",
    "notification", "widget", "sidebar", "promo", "sponsored", "outbrain", "taboola",
    "share-buttons", "social-buttons", "follow-buttons", "comments-area", "disqus_thread",
    "fb-comments", "newsletter-signup", "subscription-form", "paywall-container", "trending",
    "popular", "most-read", "top-stories", "advertisement-region", "dfp-ad", "ad-unit",
    "ad-slot",
];

/// Elements that are never removed for their classes
const CLASS_EXEMPT_TAGS: &[&str] = &["html", "body", "main", "article"];

/// Tags rendered as separate paragraphs
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "section", "article", "main", "body", "table", "tr", "blockquote", "ul",
    "ol", "dl", "dt", "dd", "figure", "figcaption", "pre", "address", "details", "summary",
];

/// Documents nested deeper than this are cut off
const MAX_DEPTH: usize = 256;

static HIDDEN_STYLE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)display\s*:\s*none|visibility\s*:\s*hidden|(?:^|;)\s*(?:opacity|height|width)\s*:\s*0(?:\.0+)?(?:px|em|rem|%)?\s*(?:!important)?\s*(?:;|$)|position\s*:\s*absolute.*?(?:left|top)\s*:\s*-\d+",
    )
    .unwrap()
});

static CLUTTER_CLASS_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)advertisement|social-share|related|recommended|newsletter|subscription|popup|modal|overlay|cookie|banner|alert|notification|sidebar|widget|promo|sponsored|outbrain|taboola|disqus|comments?",
    )
    .unwrap()
});

static MEANINGFUL_LINE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:#{1,6}\s|[-*+]\s|\d+\.\s|\|.*\|$)").unwrap());

/// Turns raw markup into the text reported to the queue
pub trait ContentCleaner: Send + Sync {
    /// Returns cleaned content, or an empty string when nothing is usable
    fn clean(&self, html: &str) -> String;
}

/// The default cleaner, built on `scraper`'s DOM
#[derive(Debug, Clone)]
pub struct HtmlCleaner {
    max_input_bytes: usize,
}

impl HtmlCleaner {
    /// Creates a cleaner that ignores input beyond `max_input_bytes`
    pub fn new(max_input_bytes: usize) -> Self {
        Self { max_input_bytes }
    }

    /// Cleans an already-parsed document or fragment root
    pub fn clean_element(&self, root: ElementRef<'_>) -> String {
        let mut out = String::new();
        render_element(root, &mut out, 0);
        tidy_markdown(&out)
    }
}

impl ContentCleaner for HtmlCleaner {
    fn clean(&self, html: &str) -> String {
        if html.trim().is_empty() {
            tracing::warn!("Received empty HTML content");
            return String::new();
        }

        let input = truncate_to_boundary(html, self.max_input_bytes);
        if input.len() < html.len() {
            tracing::debug!(
                "Truncated markup from {} to {} bytes before cleaning",
                html.len(),
                input.len()
            );
        }

        let document = Html::parse_document(input);
        let cleaned = self.clean_element(document.root_element());

        tracing::debug!(
            initial = input.len(),
            cleaned = cleaned.len(),
            "Content cleaning finished"
        );
        cleaned
    }
}

impl Default for HtmlCleaner {
    fn default() -> Self {
        Self::new(5 * 1024 * 1024)
    }
}

fn truncate_to_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn is_removed(element: &ElementRef<'_>) -> bool {
    let el = element.value();
    let name = el.name();

    if UNWANTED_TAGS.contains(&name) {
        return true;
    }

    if el.attr("hidden").is_some() || el.attr("aria-hidden") == Some("true") {
        return true;
    }

    if let Some(style) = el.attr("style") {
        if HIDDEN_STYLE_REGEX.is_match(style) {
            return true;
        }
    }

    if CLASS_EXEMPT_TAGS.contains(&name) {
        return false;
    }

    if el
        .classes()
        .any(|c| HIDDEN_CLASSES.contains(&c) || CLUTTER_CLASSES.contains(&c))
    {
        return true;
    }

    el.attr("class")
        .map(|class| CLUTTER_CLASS_REGEX.is_match(class))
        .unwrap_or(false)
}

fn render_children(node: NodeRef<'_, Node>, out: &mut String, depth: usize) {
    for child in node.children() {
        render_node(child, out, depth + 1);
    }
}

fn render_node(node: NodeRef<'_, Node>, out: &mut String, depth: usize) {
    if depth > MAX_DEPTH {
        return;
    }

    match node.value() {
        Node::Text(text) => push_text(out, text),
        Node::Element(_) => {
            if let Some(element) = ElementRef::wrap(node) {
                render_element(element, out, depth);
            }
        }
        _ => {}
    }
}

fn render_element(element: ElementRef<'_>, out: &mut String, depth: usize) {
    if is_removed(&element) {
        return;
    }

    let name = element.value().name();
    match name {
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            let level = name[1..].parse::<usize>().unwrap_or(1);
            let heading = render_inline(element, depth);
            if !heading.is_empty() {
                block_break(out);
                out.push_str(&"#".repeat(level));
                out.push(' ');
                out.push_str(&heading);
                block_break(out);
            }
        }
        "li" => {
            let item = render_inline(element, depth);
            if !item.is_empty() {
                line_break(out);
                out.push_str("- ");
                out.push_str(&item);
                out.push('\n');
            }
        }
        "strong" | "b" => push_wrapped(out, &render_inline(element, depth), "**"),
        "em" | "i" => push_wrapped(out, &render_inline(element, depth), "*"),
        "br" => out.push('\n'),
        "hr" => block_break(out),
        "td" | "th" => {
            render_children(*element, out, depth);
            out.push(' ');
        }
        "img" | "video" | "audio" | "picture" | "source" | "link" | "meta" | "head" => {}
        _ if BLOCK_TAGS.contains(&name) => {
            block_break(out);
            render_children(*element, out, depth);
            block_break(out);
        }
        _ => render_children(*element, out, depth),
    }
}

/// Renders an element's content on a single line
fn render_inline(element: ElementRef<'_>, depth: usize) -> String {
    let mut inner = String::new();
    render_children(*element, &mut inner, depth);
    inner.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn push_text(out: &mut String, text: &str) {
    let mut collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        if text.chars().next().map(char::is_whitespace).unwrap_or(false)
            && !out.is_empty()
            && !out.ends_with(char::is_whitespace)
        {
            out.push(' ');
        }
        return;
    }

    if text.starts_with(char::is_whitespace) && !out.is_empty() && !out.ends_with(char::is_whitespace) {
        out.push(' ');
    }
    if text.ends_with(char::is_whitespace) {
        collapsed.push(' ');
    }
    out.push_str(&collapsed);
}

fn push_wrapped(out: &mut String, inner: &str, marker: &str) {
    if inner.is_empty() {
        return;
    }
    out.push_str(marker);
    out.push_str(inner);
    out.push_str(marker);
}

fn line_break(out: &mut String) {
    trim_trailing_spaces(out);
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

fn block_break(out: &mut String) {
    trim_trailing_spaces(out);
    if out.is_empty() {
        return;
    }
    while !out.ends_with("\n\n") {
        out.push('\n');
    }
}

fn trim_trailing_spaces(out: &mut String) {
    while out.ends_with(' ') || out.ends_with('\t') {
        out.pop();
    }
}

/// Keeps meaningful lines and collapses runs of blank lines
fn tidy_markdown(raw: &str) -> String {
    let mut lines: Vec<&str> = Vec::new();

    for line in raw.lines() {
        let stripped = line.trim();
        if stripped.is_empty() {
            if lines.last().map(|l| !l.is_empty()).unwrap_or(false) {
                lines.push("");
            }
            continue;
        }

        if stripped.chars().count() > 3 || MEANINGFUL_LINE_REGEX.is_match(stripped) {
            lines.push(stripped);
        }
    }

    lines.join("\n").trim().to_string()
}

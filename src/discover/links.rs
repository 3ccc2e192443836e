//! PDF link extraction from crawl pages.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

use super::filter::is_pdf_url;

/// `href="...pdf..."` anywhere in the raw markup, including data attributes
/// and inline scripts the HTML parser does not expose as anchors.
static RAW_HREF_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"(?i)href\s*=\s*["']([^"']+?\.pdf[^"']*)["']"#).ok());

/// Prefixes of hrefs that never point at a document.
const IGNORED_SCHEMES: &[&str] = &["mailto:", "javascript:", "tel:", "data:"];

/// A document URL found during discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredLink {
    /// Absolute document URL.
    pub url: String,
    /// Anchor text from the page the link was found on.
    pub title: Option<String>,
}

impl DiscoveredLink {
    /// Creates a link without a title.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: None,
        }
    }

    /// Sets the display title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// Extracts every PDF link from `html`, resolving relative hrefs against `base`.
///
/// Anchors are read with an HTML parser and keep their text as the title; a
/// raw scan of the markup adds links that only appear in attributes or
/// scripts. The result is deduplicated and sorted by URL.
///
/// ```
/// use harvester_core::extract_pdf_links;
/// use url::Url;
///
/// let base = Url::parse("https://example.com/docs/").unwrap();
/// let links = extract_pdf_links(r#"<a href="a.pdf"> Manual </a><a href="x.html">x</a>"#, &base);
/// assert_eq!(links.len(), 1);
/// assert_eq!(links[0].url, "https://example.com/docs/a.pdf");
/// assert_eq!(links[0].title.as_deref(), Some("Manual"));
/// ```
#[must_use]
pub fn extract_pdf_links(html: &str, base: &Url) -> Vec<DiscoveredLink> {
    let mut found: BTreeMap<String, Option<String>> = BTreeMap::new();

    let document = Html::parse_document(html);
    if let Ok(selector) = Selector::parse("a[href]") {
        for element in document.select(&selector) {
            let Some(url) = element.value().attr("href").and_then(|href| resolve(base, href)) else {
                continue;
            };
            let text = normalize_text(&element.text().collect::<Vec<_>>().join(" "));
            let title = found.entry(url).or_insert(None);
            if title.is_none() && !text.is_empty() {
                *title = Some(text);
            }
        }
    }

    if let Some(pattern) = RAW_HREF_PATTERN.as_ref() {
        for capture in pattern.captures_iter(html) {
            let href = capture[1].replace("&amp;", "&");
            if let Some(url) = resolve(base, &href) {
                found.entry(url).or_insert(None);
            }
        }
    }

    found
        .into_iter()
        .map(|(url, title)| DiscoveredLink { url, title })
        .collect()
}

/// Absolute URL for `href` when it points at a PDF.
fn resolve(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    let lower = href.to_ascii_lowercase();
    if IGNORED_SCHEMES.iter().any(|scheme| lower.starts_with(scheme)) {
        return None;
    }

    let mut url = base.join(href).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.set_fragment(None);
    let url = url.to_string();
    is_pdf_url(&url).then_some(url)
}

fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

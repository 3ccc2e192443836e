//! Seed list parsing.
//!
//! A seed file is line-oriented text:
//!
//! ```text
//! # broker sales material
//! crawl https://www.example.com.br/materiais/
//! link  https://www.example.com.br/wp-content/uploads/2025/01/tabela.pdf
//! https://www.example.com.br/downloads/   # bare URLs are classified automatically
//! ```
//!
//! Blank lines and `#` comments are ignored. Bad lines are collected as
//! [`SkippedLine`]s and never abort parsing.
//!
//! # Example
//!
//! ```
//! use harvester_core::seeds::{parse_seeds, SeedKind};
//!
//! let seeds = parse_seeds("crawl https://example.com/docs/\nlink https://example.com/a.pdf");
//! assert_eq!(seeds.len(), 2);
//! assert_eq!(seeds.seeds[0].kind, SeedKind::Crawl);
//! ```

mod error;

pub use error::{MAX_URL_LENGTH, SeedError};

use std::fmt;
use std::path::Path;

use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::discover::is_pdf_url;

/// How a seed URL is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedKind {
    /// Direct document URL, downloaded as-is when it passes the filter.
    Link,
    /// HTML page whose anchors are scanned one hop deep.
    Crawl,
}

impl fmt::Display for SeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Link => write!(f, "link"),
            Self::Crawl => write!(f, "crawl"),
        }
    }
}

/// A single parsed seed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seed {
    /// Whether to download or crawl the URL.
    pub kind: SeedKind,
    /// Validated absolute URL.
    pub url: String,
}

impl Seed {
    /// Creates a `link` seed.
    #[must_use]
    pub fn link(url: impl Into<String>) -> Self {
        Self {
            kind: SeedKind::Link,
            url: url.into(),
        }
    }

    /// Creates a `crawl` seed.
    #[must_use]
    pub fn crawl(url: impl Into<String>) -> Self {
        Self {
            kind: SeedKind::Crawl,
            url: url.into(),
        }
    }
}

impl fmt::Display for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.url)
    }
}

/// A seed line that could not be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedLine {
    /// 1-based line number in the source text.
    pub line: usize,
    /// Why the line was rejected.
    pub error: SeedError,
}

impl fmt::Display for SkippedLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.error)
    }
}

/// Parsed seeds plus the lines that were skipped.
#[derive(Debug, Clone, Default)]
pub struct SeedList {
    /// Usable seeds in file order.
    pub seeds: Vec<Seed>,
    /// Lines rejected during parsing.
    pub skipped: Vec<SkippedLine>,
}

impl SeedList {
    /// Returns true if no seeds were parsed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seeds.is_empty()
    }

    /// Returns the count of usable seeds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seeds.len()
    }

    /// Iterates over seeds of one kind.
    pub fn of_kind(&self, kind: SeedKind) -> impl Iterator<Item = &Seed> {
        self.seeds.iter().filter(move |seed| seed.kind == kind)
    }
}

/// Parses seed list text.
///
/// Each non-blank, non-comment line is either `link <url>`, `crawl <url>`
/// (keyword case-insensitive), or a bare URL. Bare URLs become `link` seeds
/// when they look like a PDF and `crawl` seeds otherwise. A trailing
/// ` # comment` after the URL is ignored.
#[instrument(skip(text), fields(text_len = text.len()))]
#[must_use]
pub fn parse_seeds(text: &str) -> SeedList {
    let mut list = SeedList::default();

    for (index, raw_line) in text.lines().enumerate() {
        let line = strip_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        match parse_line(line) {
            Ok(seed) => {
                debug!(seed = %seed, "parsed seed");
                list.seeds.push(seed);
            }
            Err(error) => {
                debug!(line = index + 1, error = %error, "skipping seed line");
                list.skipped.push(SkippedLine {
                    line: index + 1,
                    error,
                });
            }
        }
    }

    list
}

/// Reads and parses a seed file.
///
/// A missing or unreadable file yields an empty list and a warning; the run
/// then proceeds with nothing to fetch.
#[instrument(fields(path = %path.display()))]
pub async fn read_seed_file(path: &Path) -> SeedList {
    let text = match tokio::fs::read(path).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "seed file not readable, nothing to fetch");
            return SeedList::default();
        }
    };

    let list = parse_seeds(&text);
    info!(
        seeds = list.len(),
        skipped = list.skipped.len(),
        "loaded seed file"
    );
    for skipped in &list.skipped {
        warn!(path = %path.display(), skipped = %skipped, "ignored seed line");
    }
    list
}

fn strip_comment(line: &str) -> &str {
    let trimmed = line.trim_start();
    if trimmed.starts_with('#') {
        return "";
    }
    // Only ` #` starts an inline comment; `#` inside a URL is a fragment.
    match line.find(" #").or_else(|| line.find("\t#")) {
        Some(index) => &line[..index],
        None => line,
    }
}

fn parse_line(line: &str) -> Result<Seed, SeedError> {
    let mut parts = line.split_whitespace();
    let first = parts.next().unwrap_or_default();

    let keyword = first.to_ascii_lowercase();
    let kind = match keyword.as_str() {
        "link" => Some(SeedKind::Link),
        "crawl" => Some(SeedKind::Crawl),
        _ => None,
    };

    let Some(kind) = kind else {
        if first.contains("://") {
            let url = validate_url(first)?;
            let kind = if is_pdf_url(&url) {
                SeedKind::Link
            } else {
                SeedKind::Crawl
            };
            return Ok(Seed { kind, url });
        }
        return Err(SeedError::UnknownKeyword { keyword: first.to_string() });
    };

    let raw_url = parts.next().ok_or(SeedError::MissingUrl { keyword })?;
    let url = validate_url(raw_url)?;
    Ok(Seed { kind, url })
}

/// Validates a seed URL: bounded length, parseable, http/https, has a host.
fn validate_url(raw: &str) -> Result<String, SeedError> {
    if raw.len() > MAX_URL_LENGTH {
        return Err(SeedError::too_long(raw));
    }

    let parsed = Url::parse(raw).map_err(|e| SeedError::invalid_url(raw, e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(SeedError::invalid_url(
                raw,
                format!("scheme '{scheme}' is not supported"),
            ));
        }
    }

    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(SeedError::invalid_url(raw, "URL has no host"));
    }

    Ok(parsed.to_string())
}

//! Filename derivation and sanitization for mirrored documents.
//!
//! The manifest is keyed by the name produced here, so the mapping from URL to
//! name must be stable across runs.

use std::path::{Component, Path, PathBuf};

use url::Url;

use super::constants::PARTIAL_SUFFIX;

/// Name used when a URL has no usable last path segment.
const FALLBACK_FILENAME: &str = "document.pdf";

/// Longest filename most filesystems accept, in bytes.
const MAX_NAME_BYTES: usize = 255;

/// Longest stem in bytes, leaving room for `.pdf` and the partial suffix.
const MAX_STEM_BYTES: usize = MAX_NAME_BYTES - ".pdf".len() - PARTIAL_SUFFIX.len();

/// Derives the on-disk filename for a document URL.
///
/// Takes the percent-decoded last path segment, replaces characters that are
/// unsafe on common filesystems, and appends `.pdf` when missing. Falls back
/// to `document.pdf` when the URL has no last segment.
///
/// # Example
///
/// ```
/// use harvester_core::download::filename_from_url;
///
/// assert_eq!(
///     filename_from_url("https://example.com/files/Tabela%20Jan.pdf?v=2"),
///     "Tabela Jan.pdf"
/// );
/// assert_eq!(filename_from_url("https://example.com/download/123"), "123.pdf");
/// ```
#[must_use]
pub fn filename_from_url(url: &str) -> String {
    let last_segment = Url::parse(url).ok().and_then(|parsed| {
        parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back().map(str::to_string))
            .filter(|segment| !segment.is_empty())
    });

    let Some(segment) = last_segment else {
        return FALLBACK_FILENAME.to_string();
    };

    let decoded = urlencoding::decode(&segment)
        .map_or_else(|_| segment.clone(), std::borrow::Cow::into_owned);
    let sanitized = sanitize_filename(&decoded);
    if sanitized.trim_matches(['_', '.', ' ']).is_empty() {
        return FALLBACK_FILENAME.to_string();
    }

    let (stem, has_pdf_ext) = match sanitized.len().checked_sub(4) {
        Some(split) if sanitized.is_char_boundary(split) && sanitized[split..].eq_ignore_ascii_case(".pdf") => {
            (&sanitized[..split], true)
        }
        _ => (sanitized.as_str(), false),
    };

    let stem = truncate_at_char_boundary(stem, MAX_STEM_BYTES);
    if has_pdf_ext {
        let ext = &sanitized[sanitized.len() - 4..];
        format!("{stem}{ext}")
    } else {
        format!("{stem}.pdf")
    }
}

fn truncate_at_char_boundary(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Sanitizes a filename for filesystem safety.
///
/// Replaces `/ \ : * ? " < > | #` and control characters with `_`, and
/// rewrites dot segments (`.`, `..`) so the result always stays inside the
/// output directory.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '#' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if sanitized.is_empty() {
        return "_".to_string();
    }

    if is_safe_filename_segment(&sanitized) {
        sanitized
    } else {
        sanitized.replace('.', "_")
    }
}

/// Path of the in-progress file for `name` inside `dir`.
#[must_use]
pub fn partial_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}{PARTIAL_SUFFIX}"))
}

fn is_safe_filename_segment(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

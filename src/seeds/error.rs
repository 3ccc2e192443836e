//! Error types for seed list parsing.

use thiserror::Error;

/// Maximum URL length to accept on a seed line.
pub const MAX_URL_LENGTH: usize = 2000;

/// Reasons a single seed line can be rejected.
///
/// Rejections never abort parsing; they are collected as skipped lines so the
/// rest of the list still runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SeedError {
    /// The line starts with a keyword other than `link` or `crawl`.
    #[error("unknown seed keyword '{keyword}' (expected 'link' or 'crawl')")]
    UnknownKeyword {
        /// The unrecognized keyword.
        keyword: String,
    },

    /// A keyword was given without a URL after it.
    #[error("'{keyword}' line has no URL")]
    MissingUrl {
        /// The keyword that was left dangling.
        keyword: String,
    },

    /// The URL could not be parsed, or is not http/https with a host.
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl {
        /// The rejected URL text.
        url: String,
        /// Why the URL was rejected.
        reason: String,
    },

    /// The URL is longer than [`MAX_URL_LENGTH`].
    #[error("URL too long ({length} chars, max {MAX_URL_LENGTH}): {preview}...")]
    UrlTooLong {
        /// First characters of the URL, for display.
        preview: String,
        /// Actual length.
        length: usize,
    },
}

impl SeedError {
    /// Creates an `InvalidUrl` error.
    #[must_use]
    pub fn invalid_url(url: &str, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.to_string(),
            reason: reason.into(),
        }
    }

    /// Creates a `UrlTooLong` error.
    #[must_use]
    pub fn too_long(url: &str) -> Self {
        Self::UrlTooLong {
            preview: url.chars().take(50).collect(),
            length: url.len(),
        }
    }
}

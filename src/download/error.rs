//! Error types for the download module.
//!
//! Every variant carries the URL or path it concerns so a single log line is
//! enough to tell which document failed and why.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while fetching pages or documents.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error fetching {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout fetching {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
        /// The Retry-After header value, if present (for 429/503 responses).
        retry_after: Option<String>,
    },

    /// File system error while writing or moving a document.
    #[error("IO error at {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// Body length does not match the Content-Length the server announced.
    #[error("truncated body for {url}: expected {expected_bytes} bytes, got {actual_bytes}")]
    Integrity {
        /// The URL whose body was short.
        url: String,
        /// Announced size in bytes.
        expected_bytes: u64,
        /// Received size in bytes.
        actual_bytes: u64,
    },

    /// The server answered a document URL with an HTML page.
    ///
    /// Usually a login wall or an error page served with status 200.
    #[error("expected a PDF from {url} but got {content_type}")]
    NotPdf {
        /// The document URL.
        url: String,
        /// The Content-Type the server sent.
        content_type: String,
    },
}

impl DownloadError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after: None,
        }
    }

    /// Creates an HTTP status error with a Retry-After header value.
    pub fn http_status_with_retry_after(
        url: impl Into<String>,
        status: u16,
        retry_after: Option<String>,
    ) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a truncated-body error.
    pub fn integrity(url: impl Into<String>, expected_bytes: u64, actual_bytes: u64) -> Self {
        Self::Integrity {
            url: url.into(),
            expected_bytes,
            actual_bytes,
        }
    }

    /// Creates a not-a-PDF error.
    pub fn not_pdf(url: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self::NotPdf {
            url: url.into(),
            content_type: content_type.into(),
        }
    }

    /// Maps a reqwest send/read error to `Timeout` or `Network`.
    pub(crate) fn from_reqwest(url: &str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::timeout(url)
        } else {
            Self::network(url, source)
        }
    }
}

// No `From<reqwest::Error>` / `From<std::io::Error>`: every variant needs the
// URL or path, which the source errors do not carry.

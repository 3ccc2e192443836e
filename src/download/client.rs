//! HTTP client wrapper for crawl pages and document downloads.
//!
//! Documents are streamed to a `<name>.downloading` file next to their final
//! destination and hashed on the way; the caller decides whether the result
//! replaces the existing file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{
    CONTENT_TYPE, ETAG, HeaderMap, HeaderName, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED, RETRY_AFTER,
};
use reqwest::{Client, StatusCode};
use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, instrument};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use super::error::DownloadError;
use super::filename::partial_path;
use crate::user_agent;

/// HTTP cache validators remembered between runs for conditional requests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Validators {
    /// `ETag` response header.
    pub etag: Option<String>,
    /// `Last-Modified` response header.
    pub last_modified: Option<String>,
}

impl Validators {
    /// Returns true when neither validator is known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.etag.is_none() && self.last_modified.is_none()
    }

    fn from_headers(headers: &HeaderMap) -> Self {
        let read = |name: HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        Self {
            etag: read(ETAG),
            last_modified: read(LAST_MODIFIED),
        }
    }

    /// Fills missing fields from `fallback`.
    #[must_use]
    pub fn or(self, fallback: &Self) -> Self {
        Self {
            etag: self.etag.or_else(|| fallback.etag.clone()),
            last_modified: self.last_modified.or_else(|| fallback.last_modified.clone()),
        }
    }
}

/// A document body written to its temporary path.
#[derive(Debug, Clone)]
pub struct FetchedFile {
    /// The `.downloading` file holding the body.
    pub temp_path: PathBuf,
    /// Body size in bytes.
    pub size: u64,
    /// Lowercase hex SHA-256 of the body.
    pub sha256: String,
    /// Validators sent with the response.
    pub validators: Validators,
    /// Content-Type sent with the response.
    pub content_type: Option<String>,
}

/// Result of a document fetch.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// The server answered a conditional request with `304 Not Modified`.
    NotModified {
        /// Validators to keep (refreshed from the 304 when it carried any).
        validators: Validators,
    },
    /// A new body was written to disk.
    Fetched(FetchedFile),
}

/// HTTP client shared by the discoverer and the fetch engine.
///
/// Cheap to clone; clones share one connection pool.
///
/// # Example
///
/// ```no_run
/// use harvester_core::download::HttpClient;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = HttpClient::new();
/// let html = client.fetch_page("https://www.example.com.br/documentos/").await?;
/// println!("{} bytes of HTML", html.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Creates a client with the default timeouts (30s connect, 60s read).
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the static configuration.
    /// This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        Self::with_timeouts(
            Duration::from_secs(CONNECT_TIMEOUT_SECS),
            Duration::from_secs(READ_TIMEOUT_SECS),
        )
        .expect("failed to build HTTP client with static configuration")
    }

    /// Creates a client with explicit connect and overall request timeouts.
    ///
    /// # Errors
    ///
    /// Returns the builder error when the TLS backend cannot be initialised.
    pub fn with_timeouts(connect: Duration, read: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(connect)
            .timeout(read)
            .gzip(true)
            .user_agent(user_agent::default_user_agent())
            .build()?;
        Ok(Self { client })
    }

    /// Fetches an HTML page and returns its body as text.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError`] for invalid URLs, network failures, timeouts,
    /// and non-success statuses.
    #[instrument(skip(self))]
    pub async fn fetch_page(&self, url: &str) -> Result<String, DownloadError> {
        Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DownloadError::from_reqwest(url, e))?;
        let response = check_status(url, response)?;

        let body = response
            .text()
            .await
            .map_err(|e| DownloadError::from_reqwest(url, e))?;
        debug!(bytes = body.len(), "page fetched");
        Ok(body)
    }

    /// Fetches a document into `dest_dir/<name>.downloading`.
    ///
    /// With `conditional` validators, sends `If-None-Match` and
    /// `If-Modified-Since`; a `304` then yields [`FetchOutcome::NotModified`]
    /// without touching the disk. The temporary file is removed on any error.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::NotPdf`] when the server answers with HTML,
    /// [`DownloadError::Integrity`] when the body is shorter or longer than the
    /// announced `Content-Length`, and the usual network, status, and IO errors.
    #[instrument(skip(self, dest_dir, conditional), fields(conditional = conditional.is_some()))]
    pub async fn fetch_to_file(
        &self,
        url: &str,
        dest_dir: &Path,
        name: &str,
        conditional: Option<&Validators>,
    ) -> Result<FetchOutcome, DownloadError> {
        Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;

        let mut request = self.client.get(url);
        if let Some(validators) = conditional {
            if let Some(etag) = &validators.etag {
                request = request.header(IF_NONE_MATCH, etag);
            }
            if let Some(last_modified) = &validators.last_modified {
                request = request.header(IF_MODIFIED_SINCE, last_modified);
            }
        }

        let response = request
            .send()
            .await
            .map_err(|e| DownloadError::from_reqwest(url, e))?;

        if response.status() == StatusCode::NOT_MODIFIED
            && let Some(previous) = conditional
        {
            debug!("server reports document unchanged");
            return Ok(FetchOutcome::NotModified {
                validators: Validators::from_headers(response.headers()).or(previous),
            });
        }

        let response = check_status(url, response)?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        if let Some(content_type) = content_type.as_deref()
            && content_type.to_ascii_lowercase().contains("text/html")
        {
            return Err(DownloadError::not_pdf(url, content_type));
        }

        let validators = Validators::from_headers(response.headers());
        let expected_len = response.content_length();
        let temp_path = partial_path(dest_dir, name);

        let mut file = File::create(&temp_path)
            .await
            .map_err(|e| DownloadError::io(temp_path.clone(), e))?;
        let streamed = stream_to_file(&mut file, response, url, &temp_path).await;
        drop(file);

        let checked = streamed.and_then(|(size, sha256)| match expected_len {
            Some(expected) if expected != size => Err(DownloadError::integrity(url, expected, size)),
            _ => Ok((size, sha256)),
        });
        let (size, sha256) = match checked {
            Ok(done) => done,
            Err(error) => {
                debug!(path = %temp_path.display(), "removing partial file after error");
                let _ = tokio::fs::remove_file(&temp_path).await;
                return Err(error);
            }
        };

        debug!(bytes = size, sha256 = %sha256, "document fetched");
        Ok(FetchOutcome::Fetched(FetchedFile {
            temp_path,
            size,
            sha256,
            validators,
            content_type,
        }))
    }
}

/// Turns non-success statuses into [`DownloadError::HttpStatus`], keeping Retry-After.
fn check_status(url: &str, response: reqwest::Response) -> Result<reqwest::Response, DownloadError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    Err(DownloadError::http_status_with_retry_after(
        url,
        status.as_u16(),
        retry_after,
    ))
}

/// Streams the body to `file`, returning the byte count and hex SHA-256.
async fn stream_to_file(
    file: &mut File,
    response: reqwest::Response,
    url: &str,
    file_path: &Path,
) -> Result<(u64, String), DownloadError> {
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut hasher = Sha256::new();
    let mut bytes_written: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| DownloadError::from_reqwest(url, e))?;
        hasher.update(&chunk);
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(file_path, e))?;
        bytes_written += chunk.len() as u64;
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(file_path, e))?;

    Ok((bytes_written, hex::encode(hasher.finalize())))
}

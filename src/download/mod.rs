//! HTTP fetching: pages for discovery, documents for the mirror.
//!
//! # Features
//!
//! - Streaming downloads hashed with SHA-256 on the fly
//! - Conditional requests with `ETag` / `Last-Modified`
//! - Exponential backoff for transient failures, Retry-After for 429
//! - Per-host request spacing
//! - Bounded worker pool via [`FetchEngine`]
//!
//! # Example
//!
//! ```no_run
//! use harvester_core::download::{FetchOutcome, HttpClient};
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpClient::new();
//! let outcome = client
//!     .fetch_to_file("https://example.com/manual.pdf", Path::new("./data/raw"), "manual.pdf", None)
//!     .await?;
//! if let FetchOutcome::Fetched(file) = outcome {
//!     println!("{} bytes, sha256 {}", file.size, file.sha256);
//! }
//! # Ok(())
//! # }
//! ```

mod checksum;
mod client;
mod constants;
mod engine;
mod error;
mod filename;
mod rate_limiter;
mod retry;

pub use checksum::sha256_file;
pub use client::{FetchOutcome, FetchedFile, HttpClient, Validators};
pub use constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
pub use engine::{
    DEFAULT_CONCURRENCY, EngineError, FetchEngine, FetchStats, ItemOutcome, ItemReport,
    MAX_CONCURRENCY, MIN_CONCURRENCY,
};
pub use error::DownloadError;
pub use filename::{filename_from_url, partial_path, sanitize_filename};
pub use rate_limiter::{RateLimiter, extract_domain, parse_retry_after};
pub use retry::{DEFAULT_MAX_RETRIES, FailureType, RetryDecision, RetryPolicy, classify_error};

pub(crate) use retry::run_with_retry;

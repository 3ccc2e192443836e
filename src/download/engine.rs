//! Fetch engine: downloads discovered documents with bounded concurrency.
//!
//! Each link becomes one Tokio task behind a semaphore permit. Workers never
//! see the manifest; they receive a snapshot of the previous entry and return
//! an [`ItemReport`], which the caller applies once every task is done.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use harvester_core::{DiscoveredLink, FetchEngine, HttpClient, Manifest, RateLimiter, RetryPolicy};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = FetchEngine::new(4, RetryPolicy::default(), Arc::new(RateLimiter::from_millis(1000)))?;
//! let links = vec![DiscoveredLink::new("https://www.example.com.br/2025/03/manual.pdf")];
//! let reports = engine
//!     .run(&HttpClient::new(), &links, &Manifest::default(), Path::new("data/raw"))
//!     .await?;
//! println!("{} reports", reports.len());
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use super::checksum::sha256_file;
use super::client::{FetchOutcome, FetchedFile, Validators};
use super::filename::filename_from_url;
use super::rate_limiter::RateLimiter;
use super::retry::{RetryPolicy, run_with_retry};
use super::{DownloadError, HttpClient};
use crate::discover::{DiscoveredLink, is_pdf_url};
use crate::manifest::Manifest;

/// Minimum allowed concurrency value.
pub const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
pub const MAX_CONCURRENCY: usize = 16;

/// Default number of simultaneous downloads.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Error type for fetch engine operations.
///
/// Per-document failures are never errors here; they come back as
/// [`ItemOutcome::Failed`] reports.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// The output directory could not be created.
    #[error("cannot create output directory {path}: {source}")]
    OutputDir {
        /// Directory that was requested.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Semaphore was closed unexpectedly.
    #[error("semaphore closed unexpectedly")]
    SemaphoreClosed,
}

/// What happened to one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// New or changed content was written to the destination.
    Downloaded {
        /// Size in bytes.
        size: u64,
        /// Hex SHA-256 of the content.
        sha256: String,
        /// Validators the server sent.
        validators: Validators,
    },
    /// Content was fetched but hashes identically to the file on disk.
    Unchanged {
        /// Size in bytes.
        size: u64,
        /// Hex SHA-256 of the content.
        sha256: String,
        /// Validators the server sent.
        validators: Validators,
    },
    /// The server answered the conditional request with 304.
    NotModified {
        /// Validators to keep.
        validators: Validators,
    },
    /// The document could not be fetched or stored.
    Failed {
        /// Human-readable reason.
        reason: String,
    },
}

impl ItemOutcome {
    /// Returns true for [`ItemOutcome::Failed`].
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Result of processing one discovered link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemReport {
    /// Manifest key (sanitized filename).
    pub name: String,
    /// Document URL.
    pub url: String,
    /// Anchor text from the crawl page, when known.
    pub title: Option<String>,
    /// HTTP attempts made (0 when the link was never requested).
    pub attempts: u32,
    /// What happened.
    pub outcome: ItemOutcome,
}

impl ItemReport {
    fn failed(link: &DiscoveredLink, name: String, attempts: u32, reason: impl Into<String>) -> Self {
        Self {
            name,
            url: link.url.clone(),
            title: link.title.clone(),
            attempts,
            outcome: ItemOutcome::Failed {
                reason: reason.into(),
            },
        }
    }
}

/// Live counters for a fetch run.
///
/// Updated by worker tasks as they finish, so a progress display can poll it
/// while [`FetchEngine::run`] is in flight.
#[derive(Debug, Default)]
pub struct FetchStats {
    downloaded: AtomicUsize,
    unchanged: AtomicUsize,
    not_modified: AtomicUsize,
    failed: AtomicUsize,
    retried: AtomicUsize,
}

impl FetchStats {
    /// Creates a new stats tracker with zero counts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Documents written to disk.
    #[must_use]
    pub fn downloaded(&self) -> usize {
        self.downloaded.load(Ordering::SeqCst)
    }

    /// Documents fetched whose content had not changed.
    #[must_use]
    pub fn unchanged(&self) -> usize {
        self.unchanged.load(Ordering::SeqCst)
    }

    /// Documents the server reported as not modified.
    #[must_use]
    pub fn not_modified(&self) -> usize {
        self.not_modified.load(Ordering::SeqCst)
    }

    /// Documents that failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Retry attempts made across all documents.
    #[must_use]
    pub fn retried(&self) -> usize {
        self.retried.load(Ordering::SeqCst)
    }

    /// Documents finished, whatever the outcome.
    #[must_use]
    pub fn total(&self) -> usize {
        self.downloaded() + self.unchanged() + self.not_modified() + self.failed()
    }

    fn record(&self, outcome: &ItemOutcome) {
        let counter = match outcome {
            ItemOutcome::Downloaded { .. } => &self.downloaded,
            ItemOutcome::Unchanged { .. } => &self.unchanged,
            ItemOutcome::NotModified { .. } => &self.not_modified,
            ItemOutcome::Failed { .. } => &self.failed,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_retried(&self) {
        self.retried.fetch_add(1, Ordering::SeqCst);
    }
}

/// Snapshot of the manifest entry a worker needs.
#[derive(Debug, Clone, Default)]
struct PreviousState {
    sha256: Option<String>,
    validators: Validators,
}

#[derive(Debug)]
struct Job {
    link: DiscoveredLink,
    name: String,
    previous: Option<PreviousState>,
}

enum Pending {
    Done(ItemReport),
    Running {
        link: DiscoveredLink,
        name: String,
        handle: JoinHandle<ItemReport>,
    },
}

/// Concurrent document fetcher with retry and per-host spacing.
#[derive(Debug)]
pub struct FetchEngine {
    semaphore: Arc<Semaphore>,
    concurrency: usize,
    retry_policy: RetryPolicy,
    rate_limiter: Arc<RateLimiter>,
    stats: Arc<FetchStats>,
}

impl FetchEngine {
    /// Creates an engine running at most `concurrency` downloads at once.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] if the value is outside
    /// `1..=16`.
    #[instrument(level = "debug", skip(retry_policy, rate_limiter))]
    pub fn new(
        concurrency: usize,
        retry_policy: RetryPolicy,
        rate_limiter: Arc<RateLimiter>,
    ) -> Result<Self, EngineError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(EngineError::InvalidConcurrency { value: concurrency });
        }

        debug!(
            concurrency,
            max_attempts = retry_policy.max_attempts(),
            rate_limit_ms = rate_limiter.min_interval().as_millis(),
            "creating fetch engine"
        );

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            retry_policy,
            rate_limiter,
            stats: Arc::new(FetchStats::new()),
        })
    }

    /// Replaces the stats sink, e.g. with one a progress display is polling.
    #[must_use]
    pub fn with_stats(mut self, stats: Arc<FetchStats>) -> Self {
        self.stats = stats;
        self
    }

    /// Returns the configured concurrency limit.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Returns the configured retry policy.
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Returns the live counters.
    #[must_use]
    pub fn stats(&self) -> Arc<FetchStats> {
        Arc::clone(&self.stats)
    }

    /// Fetches every link into `dest_dir`, returning one report per link in
    /// input order.
    ///
    /// Links that are not PDF URLs are reported failed without a request.
    /// When two URLs map to the same filename the first one wins and the
    /// others are reported failed.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::OutputDir`] if `dest_dir` cannot be created and
    /// [`EngineError::SemaphoreClosed`] if the semaphore is closed. Individual
    /// document failures never cause an error.
    #[instrument(skip_all, fields(links = links.len(), dest_dir = %dest_dir.display()))]
    pub async fn run(
        &self,
        client: &HttpClient,
        links: &[DiscoveredLink],
        manifest: &Manifest,
        dest_dir: &Path,
    ) -> Result<Vec<ItemReport>, EngineError> {
        tokio::fs::create_dir_all(dest_dir)
            .await
            .map_err(|source| EngineError::OutputDir {
                path: dest_dir.to_path_buf(),
                source,
            })?;

        info!(concurrency = self.concurrency, "starting fetch run");

        let mut owners: HashMap<String, String> = HashMap::new();
        let mut pending = Vec::with_capacity(links.len());

        for link in links {
            let name = filename_from_url(&link.url);

            if !is_pdf_url(&link.url) {
                warn!(url = %link.url, "not a PDF URL, skipping");
                let report = ItemReport::failed(link, name, 0, "URL path does not end in .pdf");
                self.stats.record(&report.outcome);
                pending.push(Pending::Done(report));
                continue;
            }

            if let Some(owner) = owners.get(&name) {
                if owner != &link.url {
                    warn!(url = %link.url, name = %name, owner = %owner, "filename already taken in this run");
                    let reason = format!("name collision with {owner}");
                    let report = ItemReport::failed(link, name, 0, reason);
                    self.stats.record(&report.outcome);
                    pending.push(Pending::Done(report));
                }
                continue;
            }
            owners.insert(name.clone(), link.url.clone());

            let previous = manifest.get(&name).map(|entry| PreviousState {
                sha256: entry.sha256.clone(),
                validators: entry.validators(),
            });
            let job = Job {
                link: link.clone(),
                name: name.clone(),
                previous,
            };

            let permit = Arc::clone(&self.semaphore)
                .acquire_owned()
                .await
                .map_err(|_| EngineError::SemaphoreClosed)?;

            let client = client.clone();
            let dest_dir = dest_dir.to_path_buf();
            let policy = self.retry_policy.clone();
            let rate_limiter = Arc::clone(&self.rate_limiter);
            let stats = Arc::clone(&self.stats);

            let handle = tokio::spawn(async move {
                let _permit = permit;
                let report = fetch_one(&client, job, &dest_dir, &policy, &rate_limiter, &stats).await;
                stats.record(&report.outcome);
                report
            });
            pending.push(Pending::Running {
                link: link.clone(),
                name,
                handle,
            });
        }

        let mut reports = Vec::with_capacity(pending.len());
        for item in pending {
            match item {
                Pending::Done(report) => reports.push(report),
                Pending::Running { link, name, handle } => match handle.await {
                    Ok(report) => reports.push(report),
                    Err(e) => {
                        warn!(url = %link.url, error = %e, "fetch task panicked");
                        let report = ItemReport::failed(&link, name, 0, format!("task failed: {e}"));
                        self.stats.record(&report.outcome);
                        reports.push(report);
                    }
                },
            }
        }

        info!(
            downloaded = self.stats.downloaded(),
            unchanged = self.stats.unchanged(),
            not_modified = self.stats.not_modified(),
            failed = self.stats.failed(),
            retried = self.stats.retried(),
            "fetch run complete"
        );

        Ok(reports)
    }
}

#[instrument(skip_all, fields(url = %job.link.url, name = %job.name))]
async fn fetch_one(
    client: &HttpClient,
    job: Job,
    dest_dir: &Path,
    policy: &RetryPolicy,
    rate_limiter: &RateLimiter,
    stats: &FetchStats,
) -> ItemReport {
    let dest = dest_dir.join(&job.name);
    let on_disk = tokio::fs::try_exists(&dest).await.unwrap_or(false);

    // A file missing on disk must be re-downloaded, so never ask for a 304.
    let conditional = job
        .previous
        .as_ref()
        .map(|previous| &previous.validators)
        .filter(|validators| on_disk && !validators.is_empty());

    let url = job.link.url.as_str();
    let name = job.name.as_str();
    let result = run_with_retry(
        url,
        policy,
        rate_limiter,
        || stats.increment_retried(),
        move || client.fetch_to_file(url, dest_dir, name, conditional),
    )
    .await;

    let (outcome, attempts) = match result {
        Ok((FetchOutcome::NotModified { validators }, attempts)) => {
            debug!("not modified");
            (ItemOutcome::NotModified { validators }, attempts)
        }
        Ok((FetchOutcome::Fetched(file), attempts)) => {
            let previous_hash = previous_hash(&job, &dest, on_disk).await;
            (store(file, &dest, on_disk, previous_hash.as_deref()).await, attempts)
        }
        Err((error, attempts)) => {
            warn!(error = %error, attempts, "document fetch failed");
            (
                ItemOutcome::Failed {
                    reason: error.to_string(),
                },
                attempts,
            )
        }
    };

    ItemReport {
        name: job.name,
        url: job.link.url,
        title: job.link.title,
        attempts,
        outcome,
    }
}

/// Hash of the file currently at `dest`: from the manifest when recorded,
/// otherwise computed from disk.
async fn previous_hash(job: &Job, dest: &Path, on_disk: bool) -> Option<String> {
    if !on_disk {
        return None;
    }
    if let Some(sha256) = job.previous.as_ref().and_then(|p| p.sha256.clone()) {
        return Some(sha256);
    }
    match sha256_file(dest).await {
        Ok(sha256) => Some(sha256),
        Err(e) => {
            debug!(error = %e, "cannot hash existing file");
            None
        }
    }
}

/// Moves the temp file into place unless the content is identical.
async fn store(file: FetchedFile, dest: &Path, on_disk: bool, previous_hash: Option<&str>) -> ItemOutcome {
    let FetchedFile {
        temp_path,
        size,
        sha256,
        validators,
        ..
    } = file;

    if on_disk && previous_hash == Some(sha256.as_str()) {
        if let Err(e) = tokio::fs::remove_file(&temp_path).await {
            debug!(path = %temp_path.display(), error = %e, "cannot remove temp file");
        }
        debug!("content unchanged, keeping existing file");
        return ItemOutcome::Unchanged {
            size,
            sha256,
            validators,
        };
    }

    if let Err(e) = tokio::fs::rename(&temp_path, dest).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        let error = DownloadError::io(dest, e);
        warn!(error = %error, "cannot move document into place");
        return ItemOutcome::Failed {
            reason: error.to_string(),
        };
    }

    info!(path = %dest.display(), bytes = size, "document saved");
    ItemOutcome::Downloaded {
        size,
        sha256,
        validators,
    }
}

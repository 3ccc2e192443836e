//! End-to-end harvest run.
//!
//! Loads the manifest, reads the seed list, discovers document links,
//! fetches them and records the results. Only the driver touches the
//! manifest; fetch workers hand back reports that are applied in input order.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::config::Settings;
use crate::discover::{DiscoveredLink, Discoverer};
use crate::download::{EngineError, FetchEngine, FetchStats, HttpClient, ItemOutcome, RateLimiter};
use crate::manifest::{Manifest, ManifestError, write_csv};
use crate::seeds::read_seed_file;

/// Errors that abort a run.
///
/// Failures of individual documents or crawl pages never end up here.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The HTTP client could not be built.
    #[error("cannot build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    /// The fetch engine could not start or run.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The manifest or its CSV export could not be written.
    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

/// Counts from one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Accepted document links, in discovery order.
    pub links: Vec<DiscoveredLink>,
    /// Seed lines that could not be parsed.
    pub skipped_seed_lines: usize,
    /// Documents written to disk.
    pub downloaded: usize,
    /// Documents fetched whose content had not changed.
    pub unchanged: usize,
    /// Documents the server reported as not modified.
    pub not_modified: usize,
    /// Documents that failed.
    pub failed: usize,
    /// Whether downloading was skipped.
    pub list_only: bool,
}

impl RunSummary {
    /// Number of accepted links.
    #[must_use]
    pub fn discovered(&self) -> usize {
        self.links.len()
    }
}

/// Runs harvests with one set of [`Settings`].
#[derive(Debug)]
pub struct Harvester {
    settings: Settings,
    client: HttpClient,
    rate_limiter: Arc<RateLimiter>,
    stats: Arc<FetchStats>,
}

impl Harvester {
    /// Creates a harvester with an HTTP client using the configured timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Client`] if the client cannot be built.
    pub fn new(settings: Settings) -> Result<Self, PipelineError> {
        let client = HttpClient::with_timeouts(settings.connect_timeout(), settings.timeout())?;
        Ok(Self::with_client(settings, client))
    }

    /// Creates a harvester around an existing client.
    #[must_use]
    pub fn with_client(settings: Settings, client: HttpClient) -> Self {
        let rate_limiter = settings.rate_limiter();
        Self {
            settings,
            client,
            rate_limiter,
            stats: Arc::new(FetchStats::new()),
        }
    }

    /// Live download counters, for progress display.
    #[must_use]
    pub fn stats(&self) -> Arc<FetchStats> {
        Arc::clone(&self.stats)
    }

    /// Settings in use.
    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Reads the seed list and returns the accepted links plus the number of
    /// skipped seed lines.
    pub async fn discover(&self) -> (Vec<DiscoveredLink>, usize) {
        let seeds = read_seed_file(&self.settings.sources).await;
        let discoverer = Discoverer::new(self.client.clone(), self.settings.link_filter())
            .with_retry_policy(self.settings.retry_policy())
            .with_rate_limiter(Arc::clone(&self.rate_limiter));
        let links = discoverer.discover(&seeds.seeds).await;
        (links, seeds.skipped.len())
    }

    /// Runs one harvest.
    ///
    /// In list-only mode the run stops after discovery and nothing is
    /// written.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] when the output directory, the manifest or
    /// the CSV export cannot be written.
    #[instrument(skip_all, fields(sources = %self.settings.sources.display()))]
    pub async fn run(&self) -> Result<RunSummary, PipelineError> {
        let settings = &self.settings;
        let mut manifest = Manifest::load(&settings.manifest).await;
        let (links, skipped_seed_lines) = self.discover().await;

        let mut summary = RunSummary {
            links,
            skipped_seed_lines,
            list_only: settings.list_only,
            ..RunSummary::default()
        };

        if settings.list_only {
            info!(links = summary.discovered(), "list-only run, skipping downloads");
            return Ok(summary);
        }

        let engine = FetchEngine::new(
            settings.concurrency,
            settings.retry_policy(),
            Arc::clone(&self.rate_limiter),
        )?
        .with_stats(Arc::clone(&self.stats));

        let reports = engine
            .run(&self.client, &summary.links, &manifest, &settings.output_dir)
            .await?;

        for report in &reports {
            match &report.outcome {
                ItemOutcome::Downloaded { .. } => summary.downloaded += 1,
                ItemOutcome::Unchanged { .. } => summary.unchanged += 1,
                ItemOutcome::NotModified { .. } => summary.not_modified += 1,
                ItemOutcome::Failed { reason } => {
                    summary.failed += 1;
                    warn!(url = %report.url, %reason, attempts = report.attempts, "document failed");
                }
            }
            manifest.apply(report);
        }

        manifest.save(&settings.manifest).await?;
        if let Some(csv_path) = &settings.csv {
            write_csv(&manifest, csv_path).await?;
        }

        info!(
            discovered = summary.discovered(),
            downloaded = summary.downloaded,
            unchanged = summary.unchanged,
            not_modified = summary.not_modified,
            failed = summary.failed,
            "harvest complete"
        );
        Ok(summary)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::path::Path;

    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, ResponseTemplate};

    use super::*;
    use crate::test_support::socket_guard::start_mock_server_or_skip;

    fn settings_in(dir: &Path) -> Settings {
        Settings {
            sources: dir.join("sources.txt"),
            output_dir: dir.join("raw"),
            manifest: dir.join("manifest.json"),
            rate_limit_ms: 0,
            max_retries: 0,
            ..Settings::default()
        }
    }

    #[tokio::test]
    async fn test_missing_seed_file_writes_empty_manifest() {
        let dir = TempDir::new().unwrap();
        let settings = settings_in(dir.path());

        let summary = Harvester::new(settings.clone()).unwrap().run().await.unwrap();

        assert_eq!(summary.discovered(), 0);
        let manifest = Manifest::load(&settings.manifest).await;
        assert!(manifest.is_empty());
        assert!(settings.manifest.exists());
    }

    #[tokio::test]
    async fn test_list_only_writes_nothing() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/2025/a.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.4".to_vec()))
            .expect(0)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let settings = Settings {
            list_only: true,
            ..settings_in(dir.path())
        };
        std::fs::write(
            &settings.sources,
            format!("link {}/2025/a.pdf\nnot a seed\n", server.uri()),
        )
        .unwrap();

        let summary = Harvester::new(settings.clone()).unwrap().run().await.unwrap();

        assert!(summary.list_only);
        assert_eq!(summary.discovered(), 1);
        assert_eq!(summary.skipped_seed_lines, 1);
        assert!(!settings.manifest.exists());
        assert!(!settings.output_dir.exists());
    }

    #[tokio::test]
    async fn test_run_counts_outcomes_and_writes_csv() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/docs/good.pdf"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/pdf")
                    .set_body_bytes(b"%PDF-1.4 good".to_vec()),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/docs/gone.pdf"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let settings = Settings {
            csv: Some(dir.path().join("manifest.csv")),
            ..settings_in(dir.path())
        };
        std::fs::write(
            &settings.sources,
            format!(
                "link {0}/docs/good.pdf\nlink {0}/docs/gone.pdf\n",
                server.uri()
            ),
        )
        .unwrap();

        let harvester = Harvester::new(settings.clone()).unwrap();
        let summary = harvester.run().await.unwrap();

        assert_eq!(summary.downloaded, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(harvester.stats().total(), 2);

        let manifest = Manifest::load(&settings.manifest).await;
        assert_eq!(manifest.len(), 1);
        assert!(manifest.get("good.pdf").is_some());

        let csv = std::fs::read_to_string(settings.csv.unwrap()).unwrap();
        assert_eq!(csv.lines().count(), 2);
    }
}

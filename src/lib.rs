//! Harvester Core Library
//!
//! This library provides the core functionality for the harvester tool,
//! which mirrors the PDF documents published on a small set of broker
//! websites into a local folder and keeps a manifest of what was fetched.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`seeds`] - Seed list parsing (`link` / `crawl` lines)
//! - [`discover`] - One-hop PDF link discovery and URL filtering
//! - [`download`] - HTTP fetching with retry, rate limiting and change detection
//! - [`manifest`] - JSON manifest persistence and CSV export
//! - [`config`] - Layered settings (defaults, TOML file, environment)
//! - [`pipeline`] - End-to-end harvest run

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod discover;
pub mod download;
pub mod manifest;
pub mod pipeline;
pub mod seeds;
#[cfg(test)]
pub mod test_support;
pub(crate) mod user_agent;

// Re-export commonly used types
pub use config::{ConfigError, FileConfig, Settings};
pub use discover::{DiscoveredLink, Discoverer, LinkFilter, extract_pdf_links, is_pdf_url};
pub use download::{
    DEFAULT_CONCURRENCY, DEFAULT_MAX_RETRIES, DownloadError, EngineError, FailureType,
    FetchEngine, FetchOutcome, FetchStats, HttpClient, ItemOutcome, ItemReport, RateLimiter,
    RetryDecision, RetryPolicy, Validators, classify_error,
};
pub use manifest::{EntryStatus, Manifest, ManifestEntry, ManifestError, write_csv};
pub use pipeline::{Harvester, PipelineError, RunSummary};
pub use seeds::{Seed, SeedKind, SeedList, SkippedLine, parse_seeds, read_seed_file};

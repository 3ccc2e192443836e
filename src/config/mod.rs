//! Layered run settings.
//!
//! Lowest to highest priority: built-in defaults, the TOML config file,
//! environment toggles, command-line flags. The binary applies the flags; this
//! module handles the other layers and the final validation.

mod file;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Datelike;
use thiserror::Error;
use tracing::{debug, warn};

use crate::discover::LinkFilter;
use crate::download::{
    CONNECT_TIMEOUT_SECS, DEFAULT_CONCURRENCY, DEFAULT_MAX_RETRIES, MAX_CONCURRENCY,
    MIN_CONCURRENCY, READ_TIMEOUT_SECS, RateLimiter, RetryPolicy,
};

pub use file::{FileConfig, resolve_default_config_path};

/// Highest accepted retry count.
pub const MAX_RETRIES: u32 = 10;

/// Highest accepted per-host spacing in milliseconds.
pub const MAX_RATE_LIMIT_MS: u64 = 60_000;

/// Highest accepted timeout in seconds.
pub const MAX_TIMEOUT_SECS: u64 = 3600;

/// Default per-host spacing in milliseconds.
pub const DEFAULT_RATE_LIMIT_MS: u64 = 1000;

/// Environment toggle enabling the year filter.
pub const ENV_ONLY_YEARS: &str = "HARVESTER_ONLY_YEARS";

/// Environment variable with comma-separated filter years.
pub const ENV_YEARS: &str = "HARVESTER_YEARS";

/// Errors in configuration input.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("cannot read config file {path}: {source}")]
    Read {
        /// Config file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML or has unknown keys.
    #[error("invalid config file {path}: {source}")]
    Parse {
        /// Config file path.
        path: PathBuf,
        /// Underlying TOML error.
        #[source]
        source: toml::de::Error,
    },

    /// A value is outside its allowed range.
    #[error("invalid value for `{field}`: {value} (expected {expected})")]
    InvalidValue {
        /// Setting name.
        field: &'static str,
        /// Offending value.
        value: String,
        /// Allowed values.
        expected: String,
    },

    /// An environment variable has an unusable value.
    #[error("invalid value for environment variable {name}: {value:?}")]
    InvalidEnv {
        /// Variable name.
        name: &'static str,
        /// Offending value.
        value: String,
    },
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Seed list path.
    pub sources: PathBuf,
    /// Directory for downloaded documents.
    pub output_dir: PathBuf,
    /// Manifest JSON path.
    pub manifest: PathBuf,
    /// Optional CSV export path.
    pub csv: Option<PathBuf>,
    /// Explicit filter years; empty means "current and previous".
    pub years: Vec<String>,
    /// Whether the year filter is on.
    pub only_years: bool,
    /// Hosts documents may come from; empty allows any.
    pub allowed_domains: Vec<String>,
    /// Simultaneous downloads.
    pub concurrency: usize,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Minimum spacing between requests to one host, in ms; 0 disables.
    pub rate_limit_ms: u64,
    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Whole-request timeout in seconds.
    pub timeout_secs: u64,
    /// Stop after discovery and only list the accepted URLs.
    pub list_only: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sources: PathBuf::from("sources.txt"),
            output_dir: PathBuf::from("data/raw"),
            manifest: PathBuf::from("data/manifest.json"),
            csv: None,
            years: Vec::new(),
            only_years: false,
            allowed_domains: Vec::new(),
            concurrency: DEFAULT_CONCURRENCY,
            max_retries: DEFAULT_MAX_RETRIES,
            rate_limit_ms: DEFAULT_RATE_LIMIT_MS,
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
            timeout_secs: READ_TIMEOUT_SECS,
            list_only: false,
        }
    }
}

impl Settings {
    /// Overlays every value the config file sets.
    pub fn apply_file(&mut self, file: &FileConfig) {
        let FileConfig {
            sources,
            output_dir,
            manifest,
            csv,
            years,
            only_years,
            allowed_domains,
            concurrency,
            max_retries,
            rate_limit_ms,
            connect_timeout_secs,
            timeout_secs,
        } = file.clone();

        overlay(&mut self.sources, sources);
        overlay(&mut self.output_dir, output_dir);
        overlay(&mut self.manifest, manifest);
        if csv.is_some() {
            self.csv = csv;
        }
        overlay(&mut self.years, years);
        overlay(&mut self.only_years, only_years);
        overlay(&mut self.allowed_domains, allowed_domains);
        overlay(&mut self.concurrency, concurrency);
        overlay(&mut self.max_retries, max_retries);
        overlay(&mut self.rate_limit_ms, rate_limit_ms);
        overlay(&mut self.connect_timeout_secs, connect_timeout_secs);
        overlay(&mut self.timeout_secs, timeout_secs);
    }

    /// Applies `HARVESTER_ONLY_YEARS` and `HARVESTER_YEARS` as found by `lookup`.
    ///
    /// Unset or blank variables leave the settings untouched.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnv`] for an unrecognized toggle value or
    /// a year that is not four digits.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        let read = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(value) = read(ENV_ONLY_YEARS) {
            self.only_years = parse_toggle(&value).ok_or(ConfigError::InvalidEnv {
                name: ENV_ONLY_YEARS,
                value,
            })?;
        }

        if let Some(value) = read(ENV_YEARS) {
            let years: Vec<String> = value
                .split(',')
                .map(str::trim)
                .filter(|y| !y.is_empty())
                .map(str::to_string)
                .collect();
            if years.iter().any(|y| check_year(ENV_YEARS, y).is_err()) {
                return Err(ConfigError::InvalidEnv {
                    name: ENV_YEARS,
                    value,
                });
            }
            self.years = years;
        }

        Ok(())
    }

    /// Applies the process environment.
    ///
    /// # Errors
    ///
    /// See [`Settings::apply_env`].
    pub fn apply_process_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env(|name| std::env::var(name).ok())
    }

    /// Checks the final values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the first bad setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        file::check_range("concurrency", self.concurrency, MIN_CONCURRENCY, MAX_CONCURRENCY)?;
        file::check_range("max_retries", self.max_retries, 0, MAX_RETRIES)?;
        file::check_range("rate_limit_ms", self.rate_limit_ms, 0, MAX_RATE_LIMIT_MS)?;
        file::check_range("connect_timeout_secs", self.connect_timeout_secs, 1, MAX_TIMEOUT_SECS)?;
        file::check_range("timeout_secs", self.timeout_secs, 1, MAX_TIMEOUT_SECS)?;
        for year in &self.years {
            check_year("years", year)?;
        }
        Ok(())
    }

    /// Years the filter uses, given the current calendar year.
    ///
    /// `None` when the year filter is off. With the filter on and no explicit
    /// years, the current and previous year.
    #[must_use]
    pub fn effective_years(&self, current_year: i32) -> Option<Vec<String>> {
        if !self.only_years {
            return None;
        }
        if self.years.is_empty() {
            return Some(vec![current_year.to_string(), (current_year - 1).to_string()]);
        }
        Some(self.years.clone())
    }

    /// True when years are configured but the year filter is off, so they
    /// have no effect.
    #[must_use]
    pub fn years_ignored(&self) -> bool {
        !self.only_years && !self.years.is_empty()
    }

    /// Builds the link filter for a run happening now.
    #[must_use]
    pub fn link_filter(&self) -> LinkFilter {
        if self.years_ignored() {
            warn!(
                years = ?self.years,
                "years are set but the year filter is off; set only_years or {ENV_ONLY_YEARS} to use them"
            );
        }
        let mut filter = LinkFilter::new().with_domains(&self.allowed_domains);
        if let Some(years) = self.effective_years(chrono::Utc::now().year()) {
            debug!(?years, "year filter enabled");
            filter = filter.with_years(years);
        }
        filter
    }

    /// Retry policy with the configured retry count.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::with_retries(self.max_retries)
    }

    /// Shared per-host rate limiter.
    #[must_use]
    pub fn rate_limiter(&self) -> Arc<RateLimiter> {
        Arc::new(RateLimiter::from_millis(self.rate_limit_ms))
    }

    /// Connect timeout as a duration.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Whole-request timeout as a duration.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn overlay<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

fn parse_toggle(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub(crate) fn check_year(field: &'static str, year: &str) -> Result<(), ConfigError> {
    if year.len() == 4 && year.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            field,
            value: year.to_string(),
            expected: "a four-digit year".to_string(),
        })
    }
}

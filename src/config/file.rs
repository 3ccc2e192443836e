//! TOML config file: loading, validation, default location.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::ConfigError;
use crate::download::{MAX_CONCURRENCY, MIN_CONCURRENCY};

/// Values a config file may set. Every key is optional; unknown keys are errors.
///
/// ```toml
/// sources = "config/sources.txt"
/// output_dir = "data/raw"
/// only_years = true
/// years = ["2025", "2024"]
/// allowed_domains = ["affix.com.br"]
/// concurrency = 4
/// rate_limit_ms = 1500
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Seed list path.
    pub sources: Option<PathBuf>,
    /// Directory for downloaded documents.
    pub output_dir: Option<PathBuf>,
    /// Manifest JSON path.
    pub manifest: Option<PathBuf>,
    /// Optional CSV export path.
    pub csv: Option<PathBuf>,
    /// Years for the year filter.
    pub years: Option<Vec<String>>,
    /// Enables the year filter.
    pub only_years: Option<bool>,
    /// Hosts documents may come from.
    pub allowed_domains: Option<Vec<String>>,
    /// Simultaneous downloads (1..=16).
    pub concurrency: Option<usize>,
    /// Retries after the first attempt (0..=10).
    pub max_retries: Option<u32>,
    /// Minimum spacing between requests to one host, in ms (0..=60000).
    pub rate_limit_ms: Option<u64>,
    /// Connect timeout in seconds (1..=3600).
    pub connect_timeout_secs: Option<u64>,
    /// Whole-request timeout in seconds (1..=3600).
    pub timeout_secs: Option<u64>,
}

impl FileConfig {
    /// Reads, parses and validates the config file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`], [`ConfigError::Parse`] or
    /// [`ConfigError::InvalidValue`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw, path)
    }

    /// Parses and validates config text; `path` is only used in errors.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] or [`ConfigError::InvalidValue`].
    pub fn parse(raw: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every set value against its allowed range.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the first bad key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(value) = self.concurrency {
            check_range("concurrency", value, MIN_CONCURRENCY, MAX_CONCURRENCY)?;
        }
        if let Some(value) = self.max_retries {
            check_range("max_retries", value, 0, super::MAX_RETRIES)?;
        }
        if let Some(value) = self.rate_limit_ms {
            check_range("rate_limit_ms", value, 0, super::MAX_RATE_LIMIT_MS)?;
        }
        if let Some(value) = self.connect_timeout_secs {
            check_range("connect_timeout_secs", value, 1, super::MAX_TIMEOUT_SECS)?;
        }
        if let Some(value) = self.timeout_secs {
            check_range("timeout_secs", value, 1, super::MAX_TIMEOUT_SECS)?;
        }
        if let Some(years) = &self.years {
            for year in years {
                super::check_year("years", year)?;
            }
        }
        Ok(())
    }
}

pub(super) fn check_range<T>(field: &'static str, value: T, min: T, max: T) -> Result<(), ConfigError>
where
    T: PartialOrd + std::fmt::Display + Copy,
{
    if value < min || value > max {
        return Err(ConfigError::InvalidValue {
            field,
            value: value.to_string(),
            expected: format!("{min}..={max}"),
        });
    }
    Ok(())
}

/// Default config location.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/harvester/config.toml`
/// 2. `$HOME/.config/harvester/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    default_config_path_from(|name| std::env::var_os(name))
}

pub(super) fn default_config_path_from(
    lookup: impl Fn(&str) -> Option<OsString>,
) -> Option<PathBuf> {
    let non_empty = |name: &str| lookup(name).filter(|value| !value.is_empty());

    if let Some(xdg_config_home) = non_empty("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg_config_home).join("harvester").join("config.toml"));
    }

    let home = non_empty("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("harvester")
            .join("config.toml"),
    )
}

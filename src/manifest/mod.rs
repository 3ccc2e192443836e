//! JSON manifest of mirrored documents.
//!
//! The manifest is a flat object keyed by filename:
//!
//! ```json
//! {
//!   "tabela-25.pdf": {
//!     "name": "tabela-25.pdf",
//!     "url": "https://www.example.com.br/uploads/tabela-25.pdf",
//!     "size": 48213,
//!     "sha256": "9f86d0...",
//!     "etag": "\"5e1-62f\"",
//!     "updated_at": "2025-03-03T10:00:00Z",
//!     "status": "downloaded"
//!   }
//! }
//! ```
//!
//! It is loaded once at the start of a run, updated from the fetch reports by
//! a single task, and saved once at the end.

mod error;
mod export;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::download::{ItemOutcome, ItemReport, Validators};

pub use error::ManifestError;
pub use export::write_csv;

/// Result of the most recent run for an entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    /// Content was written to disk.
    #[default]
    Downloaded,
    /// Content was fetched and matched the file on disk.
    Unchanged,
    /// The server answered 304.
    NotModified,
    /// The last attempt failed; the file on disk is from an earlier run.
    Failed,
}

impl EntryStatus {
    /// The serialized name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Downloaded => "downloaded",
            Self::Unchanged => "unchanged",
            Self::NotModified => "not_modified",
            Self::Failed => "failed",
        }
    }
}

/// One mirrored document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Filename in the output directory; also the manifest key.
    #[serde(default)]
    pub name: String,
    /// Source URL.
    pub url: String,
    /// Anchor text from the crawl page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Size in bytes.
    #[serde(default)]
    pub size: u64,
    /// Hex SHA-256 of the content.
    #[serde(default)]
    pub sha256: Option<String>,
    /// `ETag` from the last full response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    /// `Last-Modified` from the last full response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    /// When the content on disk last changed.
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    /// Result of the most recent run.
    #[serde(default)]
    pub status: EntryStatus,
}

impl ManifestEntry {
    /// Validators to send with the next conditional request.
    #[must_use]
    pub fn validators(&self) -> Validators {
        Validators {
            etag: self.etag.clone(),
            last_modified: self.last_modified.clone(),
        }
    }

    fn set_validators(&mut self, validators: &Validators) {
        let merged = validators.clone().or(&self.validators());
        self.etag = merged.etag;
        self.last_modified = merged.last_modified;
    }
}

/// All mirrored documents, keyed by filename.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    entries: BTreeMap<String, ManifestEntry>,
}

impl Manifest {
    /// Loads the manifest at `path`.
    ///
    /// A missing file yields an empty manifest; an unreadable or corrupt one
    /// is logged and also yields an empty manifest.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub async fn load(path: &Path) -> Self {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no manifest yet, starting empty");
                return Self::default();
            }
            Err(e) => {
                warn!(error = %e, "cannot read manifest, starting empty");
                return Self::default();
            }
        };

        match Self::from_json(&bytes) {
            Ok(manifest) => {
                debug!(entries = manifest.len(), "manifest loaded");
                manifest
            }
            Err(e) => {
                warn!(error = %e, "corrupt manifest, starting empty");
                Self::default()
            }
        }
    }

    /// Parses manifest JSON, filling entry names from their keys.
    ///
    /// # Errors
    ///
    /// Returns the JSON error when `bytes` is not a manifest object.
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let mut manifest: Self = serde_json::from_slice(bytes)?;
        for (key, entry) in &mut manifest.entries {
            if entry.name.is_empty() {
                entry.name.clone_from(key);
            }
        }
        Ok(manifest)
    }

    /// Writes the manifest as pretty JSON via a temp file and rename.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError`] when the directory, temp file, or rename fails.
    #[instrument(skip_all, fields(path = %path.display(), entries = self.len()))]
    pub async fn save(&self, path: &Path) -> Result<(), ManifestError> {
        let mut json = serde_json::to_vec_pretty(self)?;
        json.push(b'\n');
        replace_file(path, &json).await?;

        info!("manifest saved");
        Ok(())
    }

    /// Returns the entry for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ManifestEntry> {
        self.entries.get(name)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in name order.
    pub fn entries(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.entries.values()
    }

    /// Records `report`, timestamping changes with the current time.
    pub fn apply(&mut self, report: &ItemReport) {
        self.apply_at(report, Utc::now());
    }

    /// Records `report`, timestamping changes with `now`.
    ///
    /// Successful outcomes upsert the entry. A failure only marks an existing
    /// entry for the same URL as failed and never creates one. `updated_at`
    /// moves only when new content was written.
    pub fn apply_at(&mut self, report: &ItemReport, now: DateTime<Utc>) {
        if let ItemOutcome::Failed { .. } = report.outcome {
            if let Some(entry) = self
                .entries
                .get_mut(&report.name)
                .filter(|entry| entry.url == report.url)
            {
                entry.status = EntryStatus::Failed;
            }
            return;
        }

        let entry = self
            .entries
            .entry(report.name.clone())
            .or_insert_with(|| ManifestEntry {
                name: report.name.clone(),
                url: report.url.clone(),
                title: None,
                size: 0,
                sha256: None,
                etag: None,
                last_modified: None,
                updated_at: now,
                status: EntryStatus::Downloaded,
            });
        entry.url.clone_from(&report.url);
        if report.title.is_some() {
            entry.title.clone_from(&report.title);
        }

        match &report.outcome {
            ItemOutcome::Downloaded {
                size,
                sha256,
                validators,
            } => {
                entry.size = *size;
                entry.sha256 = Some(sha256.clone());
                entry.set_validators(validators);
                entry.updated_at = now;
                entry.status = EntryStatus::Downloaded;
            }
            ItemOutcome::Unchanged {
                size,
                sha256,
                validators,
            } => {
                entry.size = *size;
                entry.sha256 = Some(sha256.clone());
                entry.set_validators(validators);
                entry.status = EntryStatus::Unchanged;
            }
            ItemOutcome::NotModified { validators } => {
                entry.set_validators(validators);
                entry.status = EntryStatus::NotModified;
            }
            ItemOutcome::Failed { .. } => {}
        }
    }
}

/// Writes `bytes` to a sibling temp file, then renames it over `path`.
/// Parent directories are created as needed.
async fn replace_file(path: &Path, bytes: &[u8]) -> Result<(), ManifestError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ManifestError::io(parent, e))?;
    }

    let temp = temp_path(path);
    tokio::fs::write(&temp, bytes)
        .await
        .map_err(|e| ManifestError::io(&temp, e))?;
    if let Err(e) = tokio::fs::rename(&temp, path).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(ManifestError::io(path, e));
    }
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

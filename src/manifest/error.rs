//! Error types for manifest persistence.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while writing the manifest or its CSV export.
///
/// Reading never fails: an unreadable manifest is treated as empty.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The manifest could not be serialized.
    #[error("cannot serialize manifest: {0}")]
    Serialize(#[from] serde_json::Error),

    /// A file or directory could not be written.
    #[error("IO error at {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The CSV export could not be written.
    #[error("cannot write CSV {path}: {source}")]
    Csv {
        /// The CSV path.
        path: PathBuf,
        /// The underlying CSV error.
        #[source]
        source: csv::Error,
    },
}

impl ManifestError {
    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a CSV error.
    pub fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        Self::Csv {
            path: path.into(),
            source,
        }
    }
}

//! CSV export of the manifest.

use std::path::Path;

use tracing::{info, instrument};

use super::{Manifest, ManifestError, replace_file};

const HEADER: [&str; 6] = ["name", "url", "size", "sha256", "status", "updated_at"];

/// Writes one row per entry, sorted by name, to `path`.
///
/// Rows are rendered in memory and written through a temp file and rename,
/// like [`Manifest::save`]. Parent directories are created as needed.
///
/// # Errors
///
/// Returns [`ManifestError`] when a row cannot be encoded or the file cannot
/// be written.
#[instrument(skip_all, fields(path = %path.display(), rows = manifest.len()))]
pub async fn write_csv(manifest: &Manifest, path: &Path) -> Result<(), ManifestError> {
    let bytes = render(manifest).map_err(|e| ManifestError::csv(path, e))?;
    replace_file(path, &bytes).await?;
    info!("CSV written");
    Ok(())
}

fn render(manifest: &Manifest) -> Result<Vec<u8>, csv::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(HEADER)?;

    for entry in manifest.entries() {
        let size = entry.size.to_string();
        let updated_at = entry.updated_at.to_rfc3339();
        writer.write_record([
            entry.name.as_str(),
            entry.url.as_str(),
            size.as_str(),
            entry.sha256.as_deref().unwrap_or_default(),
            entry.status.as_str(),
            updated_at.as_str(),
        ])?;
    }

    writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}

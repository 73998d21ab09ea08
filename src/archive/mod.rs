//! Registry archive extraction.
//!
//! Registry packages arrive as gzip-compressed tarballs whose entries are laid
//! out relative to the package root. They are unpacked as-is (no component
//! stripping) into the working tree's source directory. Entries that would land
//! outside the destination are skipped by `tar`'s `unpack_in`.

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tar::Archive;

use crate::core::KilnError;

/// Extract the tarball at `archive` into `destination`, returning the number of
/// entries unpacked.
///
/// The work happens on a blocking thread. Any decoding or unpacking failure is a
/// [`KilnError::ExtractionError`].
pub async fn extract(archive: &Path, destination: &Path) -> Result<usize> {
    let archive_path = archive.to_path_buf();
    let destination_path = destination.to_path_buf();

    let unpacked = tokio::task::spawn_blocking(move || unpack_tar_gz(&archive_path, &destination_path))
        .await
        .context("Archive extraction task failed")?
        .map_err(|e| KilnError::ExtractionError {
            archive: archive.display().to_string(),
            reason: e.to_string(),
        })?;

    tracing::debug!("Extracted {unpacked} entries from {} into {}", archive.display(), destination.display());
    Ok(unpacked)
}

fn unpack_tar_gz(archive_path: &Path, destination: &Path) -> std::io::Result<usize> {
    std::fs::create_dir_all(destination)?;

    let file = File::open(archive_path)?;
    let mut archive = Archive::new(GzDecoder::new(BufReader::new(file)));
    archive.set_preserve_permissions(true);

    let mut unpacked = 0;
    for entry in archive.entries()? {
        let mut entry = entry?;
        let path: PathBuf = entry.path()?.into_owned();
        if entry.unpack_in(destination)? {
            unpacked += 1;
        } else {
            tracing::warn!("Skipped archive entry outside the package root: {}", path.display());
        }
    }

    Ok(unpacked)
}

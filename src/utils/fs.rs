//! File system helpers.
//!
//! Failures are reported as [`KilnError::FileSystemError`] carrying the
//! operation and path, so a failed transform names the file it tripped over.

use anyhow::Result;
use std::path::Path;

use crate::core::KilnError;

/// Create the parent directory of `path` if it does not exist.
pub async fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| KilnError::fs("create directory", parent, &e))?;
        }
    }
    Ok(())
}

/// Write `contents` to `path`, creating parent directories first.
pub async fn write_file(path: &Path, contents: impl AsRef<[u8]>) -> Result<()> {
    ensure_parent_dir(path).await?;
    tokio::fs::write(path, contents).await.map_err(|e| KilnError::fs("write", path, &e))?;
    Ok(())
}

/// Read `path` as bytes.
pub async fn read_file(path: &Path) -> Result<Vec<u8>> {
    Ok(tokio::fs::read(path).await.map_err(|e| KilnError::fs("read", path, &e))?)
}

/// Read `path` as UTF-8 text.
pub async fn read_text_file(path: &Path) -> Result<String> {
    Ok(tokio::fs::read_to_string(path).await.map_err(|e| KilnError::fs("read", path, &e))?)
}

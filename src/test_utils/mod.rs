//! Test utilities for kiln
//!
//! Helpers shared by unit tests and the integration suite: logging setup,
//! package fixtures (source directories, registry tarballs, bare repositories)
//! and in-memory stand-ins for the registry and credential prompt.
//!
//! Compiled for `cfg(test)` and for the `test-utils` feature.

pub mod fakes;
pub mod git_helper;

pub use fakes::{CountingCredentialProvider, FakeRegistry, FetchRecord};
pub use git_helper::TestGit;

use anyhow::{Context, Result};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::path::{Path, PathBuf};
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::constants::PACKAGE_DEFINITION_FILE;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Only the first call has an effect. `level` wins over `RUST_LOG`; with
/// neither set, tests run without a subscriber.
///
/// ```bash
/// RUST_LOG=kiln_cli=debug,registry=trace cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .with_ansi(true)
            .try_init();
    });
}

/// Gzip-compressed tarball holding `files` (path, contents).
pub fn tar_gz_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (path, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(if path.ends_with(".sh") { 0o755 } else { 0o644 });
        header.set_cksum();
        builder.append_data(&mut header, path, *contents).expect("append tar entry");
    }
    builder.into_inner().and_then(GzEncoder::finish).expect("finish tarball")
}

/// Write a tarball of `files` to `path`.
pub fn write_tar_gz(path: &Path, files: &[(&str, &[u8])]) {
    std::fs::write(path, tar_gz_bytes(files)).expect("write tarball");
}

/// Lay out a package source directory: `kiln.json` plus `files`.
pub fn write_package(dir: &Path, definition: &serde_json::Value, files: &[(&str, &[u8])]) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    std::fs::write(dir.join(PACKAGE_DEFINITION_FILE), serde_json::to_vec_pretty(definition)?)?;
    for (path, contents) in files {
        let target = dir.join(path);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&target, contents)?;
        if path.ends_with(".sh") {
            make_executable(&target)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

/// Publish a package as a bare repository named `<name>.git` under `dir`.
///
/// Returns the `file://` URL to clone.
pub fn bare_repository(
    dir: &Path,
    name: &str,
    definition: &serde_json::Value,
    files: &[(&str, &[u8])],
) -> Result<String> {
    let work = dir.join(format!("{name}-work"));
    write_package(&work, definition, files)?;
    let git = TestGit::new(&work);
    git.init()?;
    git.config_user()?;
    git.add_all()?;
    git.commit("Initial package")?;

    let bare: PathBuf = dir.join(format!("{name}.git"));
    std::fs::create_dir_all(&bare).context("Failed to create bare repository directory")?;
    TestGit::new(&bare).init_bare()?;
    git.push_head(&bare)?;

    Ok(format!("file://{}", bare.display()))
}

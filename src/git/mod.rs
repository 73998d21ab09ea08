//! Git support for repository-sourced packages.
//!
//! Packages named by a `.git` specifier are cloned with the system `git` binary
//! rather than an embedded library, so SSH agents, credential helpers and the
//! user's git configuration apply unchanged. Commands are built with
//! [`GitCommand`](command_builder::GitCommand) and log under the `git` target.
//!
//! ```rust,no_run
//! use kiln_cli::git::GitRepo;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let repo = GitRepo::clone("https://example.com/widgets.git", "/tmp/tree/src").await?;
//! println!("cloned at {}", repo.head_commit().await?);
//! # Ok(())
//! # }
//! ```

pub mod command_builder;

use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::core::KilnError;
use command_builder::GitCommand;

/// Name of the git executable for this platform.
#[must_use]
pub const fn git_command() -> &'static str {
    if cfg!(windows) { "git.exe" } else { "git" }
}

/// A local clone.
#[derive(Debug, Clone)]
pub struct GitRepo {
    path: PathBuf,
}

impl GitRepo {
    /// Wrap an existing checkout at `path`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Clone `url` into `target`, which must not exist or be empty.
    ///
    /// Fails with [`KilnError::GitNotFound`] when git is missing and
    /// [`KilnError::GitCloneFailed`] when git exits unsuccessfully.
    pub async fn clone(url: &str, target: impl AsRef<Path>) -> Result<Self> {
        let target_path = target.as_ref();
        tracing::info!(target: "git", "Cloning {} into {}", strip_auth_from_url(url), target_path.display());

        GitCommand::clone(url, target_path)
            .with_context(strip_auth_from_url(url))
            .execute_success()
            .await?;

        Ok(Self::new(target_path))
    }

    /// The checkout directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True when the directory holds a checkout.
    #[must_use]
    pub fn is_git_repo(&self) -> bool {
        self.path.join(".git").exists()
    }

    /// Full hash of the checked-out commit.
    pub async fn head_commit(&self) -> Result<String> {
        GitCommand::current_commit().current_dir(&self.path).execute_stdout().await
    }
}

/// True when a working `git` binary is on the `PATH`.
#[must_use]
pub fn is_git_installed() -> bool {
    std::process::Command::new(git_command())
        .arg("--version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// Fail with [`KilnError::GitNotFound`] unless git can be run.
pub async fn ensure_git_available() -> Result<()> {
    match GitCommand::version().execute_stdout().await {
        Ok(version) => {
            tracing::trace!(target: "git", "Using {version}");
            Ok(())
        }
        Err(_) => Err(KilnError::GitNotFound.into()),
    }
}

/// Remove `user:password@` from a URL so it can be logged.
#[must_use]
pub fn strip_auth_from_url(url: &str) -> String {
    let Some(scheme_end) = url.find("://") else {
        return url.to_string();
    };
    let rest = &url[scheme_end + 3..];
    let host_start = rest.find('/').unwrap_or(rest.len());
    match rest[..host_start].rfind('@') {
        Some(at) => format!("{}{}", &url[..scheme_end + 3], &rest[at + 1..]),
        None => url.to_string(),
    }
}

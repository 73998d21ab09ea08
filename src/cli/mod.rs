//! Command-line interface for kiln.
//!
//! ```bash
//! kiln [OPTIONS] [SOURCE] [CONFIG]
//!
//! # Build a registry package into ./dist
//! kiln -o dist my-site ./site.json
//!
//! # Build straight from a repository with debug logging
//! kiln --verbose https://github.com/example/site.git ./site.json
//! ```
//!
//! `SOURCE` is a registry package name or a repository URL ending in `.git`;
//! `CONFIG` is a JSON document handed unchanged to the package's templates and
//! scripts. Without both arguments there is nothing to build and kiln exits
//! successfully.
//!
//! Settings are resolved from, in order: command-line flags, environment
//! variables (`KILN_REGISTRY_URL`, `KILN_NO_PROGRESS`), the global config file
//! (`~/.kiln/config.toml`), then built-in defaults.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::builder::Builder;
use crate::config::{BuildConfig, GlobalConfig};
use crate::credentials::{CredentialCache, PromptCredentialProvider};
use crate::fetcher::PackageFetcher;
use crate::registry::HttpRegistryClient;
use crate::scripts::ScriptRunner;
use crate::transform::FileTransformPipeline;
use crate::utils::progress::NO_PROGRESS_ENV;
use crate::workspace::WorkingTreeManager;

/// Fetch a package, build its dependencies, transform its files and run its
/// post-build scripts.
#[derive(Parser, Debug)]
#[command(
    name = "kiln",
    about = "Kiln - build packages from the registry or from git",
    version,
    long_about = "Kiln fetches a package from the registry or a git repository, builds its dependencies, renders and copies its files into an output tree, and runs its post-build scripts."
)]
pub struct Cli {
    /// Package to build: a registry name or a repository URL ending in `.git`
    pub source: Option<String>,

    /// Path to the JSON build configuration
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long)]
    pub quiet: bool,

    /// Directory build outputs are written to
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    pub output: PathBuf,

    /// Maximum number of file transforms running at once
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u16).range(1..))]
    pub max_parallel: Option<u16>,

    /// Base URL of the package registry
    #[arg(long, value_name = "URL")]
    pub registry: Option<String>,

    /// Disable progress bars
    #[arg(long)]
    pub no_progress: bool,
}

impl Cli {
    /// Log filter implied by `--verbose` / `--quiet`, if either was given.
    #[must_use]
    pub const fn log_level(&self) -> Option<&'static str> {
        if self.verbose {
            Some("debug")
        } else if self.quiet {
            Some("error")
        } else {
            None
        }
    }

    /// Install the global tracing subscriber.
    ///
    /// `--verbose` and `--quiet` win over `RUST_LOG`; otherwise `RUST_LOG` is
    /// honored and defaults to `info`.
    pub fn init_logging(&self) {
        let filter = match self.log_level() {
            Some(level) => EnvFilter::new(level),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init();
    }

    fn show_progress(&self) -> bool {
        !self.no_progress && !self.quiet && std::env::var_os(NO_PROGRESS_ENV).is_none()
    }

    /// Run the build described by the arguments.
    pub async fn execute(self, cancel: CancellationToken) -> Result<()> {
        let (Some(source), Some(config_path)) = (self.source.as_deref(), self.config.as_deref())
        else {
            tracing::info!("Nothing to build: both a package source and a build configuration are required");
            return Ok(());
        };

        let config = BuildConfig::load_from(config_path).await?;
        let global = GlobalConfig::load().await?;

        let registry_url = global.registry_url(self.registry.as_deref());
        tracing::debug!(target: "registry", "Using registry {registry_url}");
        let registry = Arc::new(HttpRegistryClient::new(registry_url)?);
        let credentials = Arc::new(CredentialCache::new(Arc::new(PromptCredentialProvider::new(
            global.identity.clone(),
        ))));

        let fetcher =
            PackageFetcher::new(registry, credentials, WorkingTreeManager::new(), cancel.clone());
        let pipeline = FileTransformPipeline::new(
            global.max_parallel(self.max_parallel.map(usize::from)),
        )
        .with_progress(self.show_progress());

        let builder =
            Builder::new(fetcher, pipeline, ScriptRunner::default(), self.output.clone(), cancel);
        builder.build(source, &config).await?;
        Ok(())
    }
}

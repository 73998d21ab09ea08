//! Global configuration management for kiln.
//!
//! This module handles the user configuration file (`~/.kiln/config.toml`) holding
//! settings that apply to every build: the registry to talk to, the registry
//! identity to log in with, and the file-transform concurrency cap.
//!
//! # Configuration File Location
//!
//! - **Unix/macOS**: `~/.kiln/config.toml`
//! - **Windows**: `%LOCALAPPDATA%\kiln\config.toml`
//!
//! The location can be overridden using the `KILN_CONFIG` environment variable.
//!
//! # File Format
//!
//! ```toml
//! registry_url = "https://registry.example.com:3000"
//! identity = "me@example.com"
//! max_parallel = 16
//! ```
//!
//! The registry secret is never stored here; it is acquired interactively or from
//! `KILN_SECRET`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::constants::{DEFAULT_REGISTRY_URL, default_max_parallel};

/// Environment variable overriding the global config location.
pub const CONFIG_PATH_ENV: &str = "KILN_CONFIG";

/// Environment variable overriding the registry URL.
pub const REGISTRY_URL_ENV: &str = "KILN_REGISTRY_URL";

/// Global configuration structure for kiln.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct GlobalConfig {
    /// Base URL of the package registry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_url: Option<String>,

    /// Registry identity used when logging in; the secret is still prompted for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,

    /// Maximum number of file transforms running at once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_parallel: Option<usize>,
}

impl GlobalConfig {
    /// Load global configuration from the default location.
    ///
    /// A missing file yields the default (empty) configuration rather than an error.
    pub async fn load() -> Result<Self> {
        let path = Self::default_path()?;
        Self::load_with_optional(Some(path)).await
    }

    /// Load from `path` when given and present, otherwise from the default location.
    pub async fn load_with_optional(path: Option<PathBuf>) -> Result<Self> {
        let path = match path {
            Some(path) => path,
            None => Self::default_path()?,
        };
        if path.exists() {
            Self::load_from(&path).await
        } else {
            tracing::debug!("No global config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Load global configuration from a specific file path.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read global config from {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse global config from {}", path.display()))
    }

    /// Get the path of the global configuration file.
    ///
    /// Honors `KILN_CONFIG`, then falls back to the platform location.
    pub fn default_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return Ok(PathBuf::from(path));
        }

        let config_dir = if cfg!(target_os = "windows") {
            dirs::data_local_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine local data directory"))?
                .join("kiln")
        } else {
            dirs::home_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine home directory"))?
                .join(".kiln")
        };

        Ok(config_dir.join("config.toml"))
    }

    /// Resolve the registry URL.
    ///
    /// Precedence: explicit override, then `KILN_REGISTRY_URL`, then this file,
    /// then [`DEFAULT_REGISTRY_URL`].
    #[must_use]
    pub fn registry_url(&self, cli_override: Option<&str>) -> String {
        if let Some(url) = cli_override {
            return url.to_string();
        }
        if let Ok(url) = std::env::var(REGISTRY_URL_ENV) {
            if !url.trim().is_empty() {
                return url;
            }
        }
        self.registry_url.clone().unwrap_or_else(|| DEFAULT_REGISTRY_URL.to_string())
    }

    /// Resolve the transform concurrency cap; never below one.
    #[must_use]
    pub fn max_parallel(&self, cli_override: Option<usize>) -> usize {
        cli_override.or(self.max_parallel).unwrap_or_else(default_max_parallel).max(1)
    }
}

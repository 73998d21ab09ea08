//! The caller-supplied build configuration.
//!
//! A [`BuildConfig`] is an open JSON document. kiln never interprets it: the same
//! value is the substitution context of every Render mapping and the configuration
//! argument handed to every post-build script. Dependency builds receive the value
//! their parent declared for them in `dependencies`.

use anyhow::{Context, Result};
use serde_json::Value;
use std::path::Path;

use crate::core::KilnError;

/// Opaque build configuration forwarded through the pipeline.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BuildConfig(Value);

impl BuildConfig {
    /// Wrap an already-parsed JSON value.
    #[must_use]
    pub const fn from_value(value: Value) -> Self {
        Self(value)
    }

    /// Read and parse a configuration document.
    ///
    /// An unreadable file is an IO error; malformed JSON is a
    /// [`KilnError::ConfigParseError`].
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read build configuration {}", path.display()))?;
        Self::parse(&content, path)
    }

    fn parse(content: &str, path: &Path) -> Result<Self> {
        let value: Value = serde_json::from_str(content).map_err(|e| KilnError::ConfigParseError {
            file: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self(value))
    }

    /// The configuration as JSON.
    #[must_use]
    pub const fn as_value(&self) -> &Value {
        &self.0
    }
}

//! Package definition (`kiln.json`) parsing.
//!
//! Every fetched package carries a JSON document at its source root describing
//! what building it means:
//!
//! ```json
//! {
//!   "dependencies": { "base-styles": { "theme": "dark" } },
//!   "files": [
//!     { "from": "templates/index.html", "to": "index.html", "method": "render" },
//!     { "from": "assets/logo.png", "to": "logo.png", "method": "copy" }
//!   ],
//!   "scripts": ["scripts/post-build.sh"]
//! }
//! ```
//!
//! Dependencies keep their declaration order (`serde_json` is built with
//! `preserve_order`), which is the order they are built in.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Component, Path, PathBuf};

use crate::constants::PACKAGE_DEFINITION_FILE;
use crate::core::KilnError;

/// How a file mapping produces its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformMethod {
    /// Substitute the build configuration into the source text.
    Render,
    /// Reproduce the source bytes unchanged.
    Copy,
}

impl TransformMethod {
    /// The method name as written in `kiln.json`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Render => "render",
            Self::Copy => "copy",
        }
    }
}

impl std::fmt::Display for TransformMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One declared file transform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMapping {
    /// Source path, relative to the working tree's source directory.
    pub from: String,
    /// Destination path, relative to the output directory.
    pub to: String,
    /// Transform to apply.
    pub method: TransformMethod,
}

impl FileMapping {
    /// Resolve both ends of the mapping against concrete directories.
    #[must_use]
    pub fn resolve(&self, source_dir: &Path, output_dir: &Path) -> ResolvedMapping {
        ResolvedMapping {
            source: source_dir.join(&self.from),
            destination: output_dir.join(&self.to),
            method: self.method,
        }
    }
}

/// A file mapping with absolute source and destination paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMapping {
    /// File read from the working tree.
    pub source: PathBuf,
    /// File written in the output tree.
    pub destination: PathBuf,
    /// Transform to apply.
    pub method: TransformMethod,
}

/// Parsed package definition.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PackageDefinition {
    /// Dependency name (a source specifier) to the configuration it is built with.
    #[serde(default)]
    pub dependencies: Map<String, Value>,
    /// File transforms, in declaration order.
    #[serde(default)]
    pub files: Vec<FileMapping>,
    /// Post-build scripts, relative to the working tree's source directory.
    #[serde(default, alias = "js_scripts")]
    pub scripts: Vec<String>,
}

impl PackageDefinition {
    /// Read and validate the definition at the root of `source_dir`.
    ///
    /// A missing or malformed document is a [`KilnError::DefinitionParseError`];
    /// mappings or scripts escaping their directory are a [`KilnError::InvalidMapping`].
    pub async fn load(source_dir: &Path) -> Result<Self> {
        let path = source_dir.join(PACKAGE_DEFINITION_FILE);
        let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
            KilnError::DefinitionParseError {
                file: path.display().to_string(),
                reason: e.to_string(),
            }
        })?;

        let definition = Self::parse(&content, &path)?;
        tracing::debug!(
            "Loaded {}: {} dependencies, {} files, {} scripts",
            path.display(),
            definition.dependencies.len(),
            definition.files.len(),
            definition.scripts.len()
        );
        Ok(definition)
    }

    /// Parse and validate a definition document.
    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        let definition: Self =
            serde_json::from_str(content).map_err(|e| KilnError::DefinitionParseError {
                file: path.display().to_string(),
                reason: e.to_string(),
            })?;
        definition.validate()?;
        Ok(definition)
    }

    fn validate(&self) -> Result<()> {
        for mapping in &self.files {
            ensure_contained(&mapping.from)?;
            ensure_contained(&mapping.to)?;
        }
        for script in &self.scripts {
            ensure_contained(script)?;
        }
        Ok(())
    }
}

/// Reject paths that are empty, absolute or climb out with `..`.
fn ensure_contained(path: &str) -> Result<()> {
    let invalid = |reason: &str| KilnError::InvalidMapping {
        path: path.to_string(),
        reason: reason.to_string(),
    };

    if path.trim().is_empty() {
        return Err(invalid("path is empty").into());
    }
    for component in Path::new(path).components() {
        match component {
            Component::ParentDir => return Err(invalid("path must not contain '..'").into()),
            Component::RootDir | Component::Prefix(_) => {
                return Err(invalid("path must be relative").into());
            }
            Component::CurDir | Component::Normal(_) => {}
        }
    }
    Ok(())
}

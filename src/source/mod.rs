//! Package source specifiers.
//!
//! A specifier is either a source-control location, recognized by the trailing
//! `.git` marker, or the name of a package in the registry. Routing is purely
//! lexical: nothing is looked up to decide.

use anyhow::Result;
use std::fmt;

use crate::constants::REPOSITORY_MARKER;
use crate::core::KilnError;

/// Where a package's source tree comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
    /// Clone this repository URL.
    Repository(String),
    /// Download this package name from the registry.
    Registry(String),
}

impl SourceSpec {
    /// Route a specifier to the clone path or the registry path.
    ///
    /// The specifier is used verbatim (after trimming surrounding whitespace); a
    /// name without a colon is simply the registry package name.
    pub fn parse(spec: &str) -> Result<Self> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(KilnError::InvalidSource {
                source_spec: spec.to_string(),
                reason: "source is empty".to_string(),
            }
            .into());
        }

        if spec.ends_with(REPOSITORY_MARKER) && spec.len() > REPOSITORY_MARKER.len() {
            Ok(Self::Repository(spec.to_string()))
        } else {
            Ok(Self::Registry(spec.to_string()))
        }
    }

    /// The specifier as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Repository(url) => url,
            Self::Registry(name) => name,
        }
    }
}

impl fmt::Display for SourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Repository(url) => write!(f, "repository {url}"),
            Self::Registry(name) => write!(f, "registry package {name}"),
        }
    }
}

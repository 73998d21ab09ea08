//! Global constants used throughout the kiln codebase.
//!
//! File names, protocol parameters, timeouts and parallelism defaults live here
//! so the numbers are discoverable in one place.

use std::time::Duration;

/// Name of the package definition document at the root of every package source.
pub const PACKAGE_DEFINITION_FILE: &str = "kiln.json";

/// Suffix marking a source specifier as a source-control location.
pub const REPOSITORY_MARKER: &str = ".git";

/// Directory inside a working tree holding the materialized package source.
pub const SOURCE_DIR_NAME: &str = "src";

/// Directory inside a working tree holding the trees of nested dependency builds.
pub const DEPENDENCY_DIR_NAME: &str = "deps";

/// File name the registry archive is streamed to inside a working tree.
pub const ARCHIVE_FILE_NAME: &str = "package.tgz";

/// Prefix of top-level working tree directories in the system temp directory.
pub const WORKING_TREE_PREFIX: &str = "kiln";

/// Protocol version sent in every registry request envelope.
pub const REGISTRY_PROTOCOL_VERSION: &str = "0.1.0";

/// Token a registry response body starts with when the server failed.
pub const REGISTRY_ERROR_PREFIX: &str = "Error";

/// Registry used when neither the CLI, the environment nor the global config names one.
pub const DEFAULT_REGISTRY_URL: &str = "http://localhost:3000";

/// Timeout for a single registry request (5 minutes).
pub const REGISTRY_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Timeout for Git clone operations (120 seconds).
///
/// Clone operations may take a while for large repositories.
pub const GIT_CLONE_TIMEOUT: Duration = Duration::from_secs(120);

/// Minimum number of concurrent file transforms regardless of CPU count.
pub const MIN_PARALLELISM: usize = 10;

/// Multiplier applied to CPU core count for default transform parallelism.
pub const PARALLELISM_CORE_MULTIPLIER: usize = 2;

/// Default CPU core count when detection fails.
///
/// Used as a fallback when `std::thread::available_parallelism()` returns an error.
pub const FALLBACK_CORE_COUNT: usize = 4;

/// Default cap on concurrently running file transforms.
#[must_use]
pub fn default_max_parallel() -> usize {
    let cores = std::thread::available_parallelism()
        .map(std::num::NonZero::get)
        .unwrap_or(FALLBACK_CORE_COUNT);
    std::cmp::max(MIN_PARALLELISM, cores * PARALLELISM_CORE_MULTIPLIER)
}

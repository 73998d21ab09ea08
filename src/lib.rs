//! kiln - a package build orchestrator
//!
//! kiln fetches a package either from a registry or by cloning a git repository,
//! reads the package's `kiln.json`, builds its dependencies, renders and copies
//! its files into an output tree and runs its post-build scripts. Every package
//! is built in its own temporary working tree, which is deleted when the package
//! is done, whether the build succeeded or not.
//!
//! # Build Pipeline
//!
//! ```text
//! fetch ─▶ dependencies ─▶ file transforms ─▶ scripts ─▶ release
//!            │  (sequential, each a full nested pipeline)
//!            └─▶ fetch ─▶ dependencies ─▶ ... ─▶ release
//! ```
//!
//! File transforms are the only concurrent stage: all mappings run at once,
//! bounded by a parallelism cap, and the stage completes when every mapping has.
//!
//! # Core Modules
//!
//! ## Orchestration
//! - [`builder`] - runs the pipeline for a package and its dependencies
//! - [`fetcher`] - materializes a package into a working tree and parses it
//! - [`transform`] - the bounded-concurrency render/copy stage
//! - [`scripts`] - sequential post-build script execution
//! - [`workspace`] - working tree allocation and depth-first removal
//!
//! ## Sources
//! - [`source`] - routing a specifier to the registry or to git
//! - [`registry`] - HTTP client for the package registry
//! - [`credentials`] - process-wide, acquire-once registry credentials
//! - [`archive`] - gzip tarball extraction
//! - [`git`] - git clone via the system `git` executable
//!
//! ## Documents
//! - [`definition`] - the `kiln.json` package definition
//! - [`config`] - the JSON build configuration and the global TOML settings
//! - [`templating`] - `<% %>` templates rendered with Tera
//!
//! ## Supporting Modules
//! - [`cli`] - the `kiln` command line
//! - [`core`] - error types and cancellation helpers
//! - [`constants`] - file names, protocol constants and defaults
//! - [`utils`] - file helpers and progress reporting
//!
//! # Package Definition (kiln.json)
//!
//! ```json
//! {
//!   "dependencies": { "base-styles": { "theme": "dark" } },
//!   "files": [
//!     { "from": "templates/index.html", "to": "index.html", "method": "render" },
//!     { "from": "assets/logo.png", "to": "assets/logo.png", "method": "copy" }
//!   ],
//!   "scripts": ["scripts/post-build.sh"]
//! }
//! ```

// Orchestration
pub mod builder;
pub mod fetcher;
pub mod scripts;
pub mod transform;
pub mod workspace;

// Sources
pub mod archive;
pub mod credentials;
pub mod git;
pub mod registry;
pub mod source;

// Documents
pub mod config;
pub mod definition;
pub mod templating;

// Supporting modules
pub mod cli;
pub mod constants;
pub mod core;
pub mod utils;

// Test utilities (only available in test builds)
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

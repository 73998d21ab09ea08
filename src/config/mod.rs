//! Configuration for kiln.
//!
//! Two documents configure a build:
//! - [`BuildConfig`] - the per-invocation JSON document named on the command line
//! - [`GlobalConfig`] - the user-wide TOML settings in `~/.kiln/config.toml`

pub mod build;
pub mod global;

pub use build::BuildConfig;
pub use global::GlobalConfig;

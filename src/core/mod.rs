//! Core types shared by every stage of the build pipeline.
//!
//! - [`error`] - the [`KilnError`] enum and the user-facing [`ErrorContext`]
//! - [`cancel`] - helpers for racing pipeline operations against a cancellation token

pub mod cancel;
pub mod error;

pub use cancel::{cancellable, ensure_not_cancelled};
pub use error::{ErrorContext, KilnError, user_friendly_error};

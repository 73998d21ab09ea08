//! Cancellation helpers.
//!
//! Every suspension point of a build (network round trips, disk IO, archive
//! extraction, clones, scripts) is wrapped with [`cancellable`] so that a
//! cancelled [`CancellationToken`] aborts the pipeline with
//! [`KilnError::Cancelled`] instead of waiting for the operation.

use anyhow::Result;
use std::future::Future;
use tokio_util::sync::CancellationToken;

use super::KilnError;

/// Await `operation` unless `token` is cancelled first.
///
/// The token is checked before polling, so an already-cancelled token never
/// starts the operation.
pub async fn cancellable<T, F>(token: &CancellationToken, operation: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    ensure_not_cancelled(token)?;
    tokio::select! {
        biased;
        () = token.cancelled() => Err(KilnError::Cancelled.into()),
        result = operation => result,
    }
}

/// Fail with [`KilnError::Cancelled`] if the token has been cancelled.
pub fn ensure_not_cancelled(token: &CancellationToken) -> Result<()> {
    if token.is_cancelled() {
        return Err(KilnError::Cancelled.into());
    }
    Ok(())
}

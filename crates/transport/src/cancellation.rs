//! Cancellation enforcement with a bounded grace window.
//!
//! Some operations ignore the cancellation signal (a blocked connect, a
//! stalled TLS read). The enforcer races the operation against the token;
//! once the token fires it grants a short grace window, and if the operation
//! still has not settled it is abandoned to a detached drain task and the
//! caller gets a deterministic failure instead of waiting forever.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::TransportError;

/// Default grace window granted after the cancellation signal fires.
pub const DEFAULT_GRACE_WINDOW: Duration = Duration::from_secs(3);

/// Run `operation` under `cancel` with a grace window.
///
/// - the operation settling first (including before the call) returns its
///   outcome verbatim;
/// - the token firing first grants `grace_window`; an outcome inside the
///   window is still returned verbatim;
/// - the window elapsing abandons the operation to a spawned drain task
///   (its eventual outcome is awaited and discarded) and returns
///   [`TransportError::EnforcedCancellation`] carrying `site` and `message`.
///
/// Exactly one outcome ever reaches the caller.
pub async fn enforce_cancellation<F>(
    operation: F,
    cancel: &CancellationToken,
    grace_window: Duration,
    site: &'static str,
    message: Option<String>,
) -> Result<F::Output, TransportError>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let mut operation = Box::pin(operation);

    tokio::select! {
        biased;
        outcome = &mut operation => return Ok(outcome),
        () = cancel.cancelled() => {}
    }

    debug!(site, grace_ms = grace_window.as_millis() as u64, "cancellation signalled, granting grace window");

    match tokio::time::timeout(grace_window, &mut operation).await {
        Ok(outcome) => Ok(outcome),
        Err(_) => {
            tokio::spawn(async move {
                let _ = operation.await;
                debug!(site, "abandoned operation settled after enforced cancellation");
            });
            Err(TransportError::EnforcedCancellation { site, message })
        }
    }
}

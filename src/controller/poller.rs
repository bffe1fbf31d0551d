//! Bounded polling.
//!
//! The provider offers no change notifications, so every wait is a loop of
//! fresh reads. `poll` invokes its producer immediately, then once per
//! interval, until the producer yields a value or the deadline passes. The
//! final sleep is clamped so one last attempt happens right at the deadline.

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::PollerSettings;
use crate::controller::error::{Error, Result};

/// Poll `produce` until it returns `Some`, the timeout elapses, or the run is
/// cancelled.
///
/// Errors returned by `produce` abort the poll immediately.
pub async fn poll<T, F, Fut>(
    operation: &str,
    settings: PollerSettings,
    cancel: &CancellationToken,
    mut produce: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let start = Instant::now();
    let mut attempt: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled(format!("waiting for {operation}")));
        }

        attempt += 1;
        if let Some(value) = produce().await? {
            debug!(operation, attempt, elapsed = ?start.elapsed(), "Poll succeeded");
            return Ok(value);
        }

        let elapsed = start.elapsed();
        if elapsed >= settings.timeout {
            return Err(Error::PollTimeout {
                operation: operation.to_string(),
                timeout: settings.timeout,
            });
        }

        let delay = settings.interval.min(settings.timeout - elapsed);
        debug!(operation, attempt, delay = ?delay, "Not ready, retrying");
        if !sleep_or_cancel(delay, cancel).await {
            return Err(Error::Cancelled(format!("waiting for {operation}")));
        }
    }
}

/// Sleep for `duration` unless the token is cancelled first.
///
/// Returns `false` if the sleep was cut short by cancellation.
pub async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = sleep(duration) => true,
    }
}

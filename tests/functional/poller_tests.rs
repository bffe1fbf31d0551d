//! Poller timing, on paused tokio time.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use astrolabe::config::PollerSettings;
use astrolabe::controller::Error;
use astrolabe::controller::poller::poll;

fn settings(interval_ms: u64, timeout_ms: u64) -> PollerSettings {
    PollerSettings::new(
        Duration::from_millis(interval_ms),
        Duration::from_millis(timeout_ms),
    )
}

#[tokio::test(start_paused = true)]
async fn test_poll_succeeds_after_empty_results() {
    let attempts = Arc::new(AtomicU32::new(0));
    let start = Instant::now();

    let value = poll("value", settings(100, 10_000), &CancellationToken::new(), || {
        let attempts = Arc::clone(&attempts);
        async move {
            let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            Ok::<_, Error>((n == 4).then_some(n))
        }
    })
    .await
    .unwrap();

    assert_eq!(value, 4);
    assert_eq!(attempts.load(Ordering::SeqCst), 4);
    // Three sleeps between four attempts.
    assert!(start.elapsed() >= Duration::from_millis(300));
    assert!(start.elapsed() < Duration::from_millis(400));
}

#[tokio::test(start_paused = true)]
async fn test_poll_first_attempt_is_immediate() {
    let start = Instant::now();
    let value = poll("value", settings(1_000, 10_000), &CancellationToken::new(), || async {
        Ok::<_, Error>(Some("ready"))
    })
    .await
    .unwrap();

    assert_eq!(value, "ready");
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_poll_times_out_at_deadline_not_before() {
    let attempts = Arc::new(AtomicU32::new(0));
    let start = Instant::now();

    let result = poll("never", settings(300, 1_000), &CancellationToken::new(), || {
        let attempts = Arc::clone(&attempts);
        async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            Ok::<Option<()>, Error>(None)
        }
    })
    .await;

    let elapsed = start.elapsed();
    assert!(matches!(result, Err(Error::PollTimeout { .. })));
    assert!(elapsed >= Duration::from_millis(1_000));
    assert!(elapsed < Duration::from_millis(1_300));
    // 0, 300, 600, 900 and a final attempt clamped to 1000.
    assert_eq!(attempts.load(Ordering::SeqCst), 5);
}

#[tokio::test(start_paused = true)]
async fn test_poll_error_aborts_immediately() {
    let attempts = Arc::new(AtomicU32::new(0));

    let result = poll("broken", settings(100, 10_000), &CancellationToken::new(), || {
        let attempts = Arc::clone(&attempts);
        async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err::<Option<()>, Error>(Error::Workload("boom".to_string()))
        }
    })
    .await;

    assert!(matches!(result, Err(Error::Workload(_))));
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_poll_observes_cancellation() {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(250)).await;
        trigger.cancel();
    });

    let start = Instant::now();
    let result = poll("cancelled", settings(100, 60_000), &cancel, || async {
        Ok::<Option<()>, Error>(None)
    })
    .await;

    assert!(matches!(result, Err(Error::Cancelled(_))));
    assert!(start.elapsed() < Duration::from_secs(1));
}

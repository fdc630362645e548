//! Bounded waiting primitives.
//!
//! Every wait in this crate has a maximum duration; expiry is a recoverable
//! outcome for the caller, never a panic. Both helpers run on `tokio::time`,
//! so tests with a paused clock advance through them instantly.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};

/// Poll `cond` every `interval` until it returns `true` or `timeout` elapses.
///
/// The condition is evaluated once immediately; the final evaluation happens
/// at or after the deadline, so a condition that flips right at the boundary
/// is still observed.
pub async fn wait_for<F, Fut>(mut cond: F, timeout: Duration, interval: Duration) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if cond().await {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(interval).await;
    }
}

/// Run `op` up to `tries` times, pausing `interval` between attempts.
///
/// `op` signals success by returning `Some`; the first success is returned.
/// `None` after the final attempt means every try failed.
pub async fn attempt<T, F, Fut>(mut op: F, tries: usize, interval: Duration) -> Option<T>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Option<T>>,
{
    for i in 0..tries {
        if let Some(v) = op(i).await {
            return Some(v);
        }
        if i + 1 < tries {
            sleep(interval).await;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn wait_for_observes_late_flip() {
        let calls = AtomicUsize::new(0);
        let ok = wait_for(
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move { n >= 3 }
            },
            Duration::from_secs(5),
            Duration::from_millis(100),
        )
        .await;
        assert!(ok);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_times_out() {
        let ok = wait_for(
            || async { false },
            Duration::from_millis(500),
            Duration::from_millis(100),
        )
        .await;
        assert!(!ok);
    }

    #[tokio::test(start_paused = true)]
    async fn attempt_returns_first_success() {
        let got = attempt(
            |i| async move { (i == 2).then_some(i) },
            5,
            Duration::from_millis(50),
        )
        .await;
        assert_eq!(got, Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn attempt_exhausts_tries() {
        let got: Option<()> = attempt(|_| async { None }, 3, Duration::from_millis(10)).await;
        assert!(got.is_none());
    }
}

//! Cooperative delays and polling.

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::debug;

/// Shortest gap between two polls
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Suspend the calling task for at least `duration_ms` milliseconds.
///
/// Other tasks on the runtime keep running while this one waits.
pub async fn sleep_ms(duration_ms: u64) {
    sleep_for(Duration::from_millis(duration_ms)).await;
}

/// Suspend the calling task for at least `duration`.
///
/// A zero duration still yields to the scheduler once.
pub async fn sleep_for(duration: Duration) {
    if duration.is_zero() {
        tokio::task::yield_now().await;
    } else {
        sleep(duration).await;
    }
}

/// Convert a signed millisecond count into a delay, treating negatives as zero
#[must_use]
pub fn clamp_millis(millis: i64) -> Duration {
    u64::try_from(millis)
        .map(Duration::from_millis)
        .unwrap_or(Duration::ZERO)
}

/// Poll `probe` every `interval` until it yields a value or `timeout` elapses.
///
/// The probe runs at least once. Returns `Ok(None)` when time runs out and
/// stops at the first error. Intervals shorter than [`MIN_POLL_INTERVAL`]
/// are raised to it.
pub async fn poll_until<F, Fut, T, E>(
    interval: Duration,
    timeout: Duration,
    mut probe: F,
) -> Result<Option<T>, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    let deadline = Instant::now() + timeout;
    let interval = interval.max(MIN_POLL_INTERVAL);
    let mut polls = 0u32;

    loop {
        polls += 1;
        if let Some(value) = probe().await? {
            debug!(polls, "Poll condition met");
            return Ok(Some(value));
        }

        let now = Instant::now();
        if now >= deadline {
            debug!(polls, timeout_ms = timeout.as_millis() as u64, "Polling timed out");
            return Ok(None);
        }
        sleep_for(interval.min(deadline - now)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_sleep_waits_at_least_requested_duration() {
        for millis in [0u64, 1, 1000] {
            let started = std::time::Instant::now();
            sleep_ms(millis).await;
            assert!(started.elapsed() >= Duration::from_millis(millis));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_does_not_block_other_tasks() {
        let started = Instant::now();
        tokio::join!(sleep_ms(1000), sleep_ms(1000), sleep_ms(1000));
        // Concurrent sleeps overlap instead of adding up
        assert!(started.elapsed() < Duration::from_millis(1100));
    }

    #[test]
    fn test_clamp_millis() {
        assert_eq!(clamp_millis(-250), Duration::ZERO);
        assert_eq!(clamp_millis(0), Duration::ZERO);
        assert_eq!(clamp_millis(1500), Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_until_returns_value() {
        let polls = AtomicU32::new(0);

        let result: Result<Option<&str>, String> = poll_until(
            Duration::from_secs(2),
            Duration::from_secs(60),
            || {
                let n = polls.fetch_add(1, Ordering::SeqCst);
                async move { Ok(if n >= 3 { Some("receipt") } else { None }) }
            },
        )
        .await;

        assert_eq!(result.unwrap(), Some("receipt"));
        assert_eq!(polls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_until_times_out() {
        let polls = AtomicU32::new(0);
        let started = Instant::now();

        let result: Result<Option<()>, String> = poll_until(
            Duration::from_secs(2),
            Duration::from_secs(5),
            || {
                polls.fetch_add(1, Ordering::SeqCst);
                async { Ok(None) }
            },
        )
        .await;

        assert_eq!(result.unwrap(), None);
        // t = 0, 2, 4, 5
        assert_eq!(polls.load(Ordering::SeqCst), 4);
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_until_zero_interval_does_not_spin() {
        let polls = AtomicU32::new(0);
        let started = Instant::now();

        let result: Result<Option<()>, String> = poll_until(
            Duration::ZERO,
            Duration::from_millis(50),
            || {
                polls.fetch_add(1, Ordering::SeqCst);
                async { Ok(None) }
            },
        )
        .await;

        assert_eq!(result.unwrap(), None);
        // One poll per millisecond at most, plus the first
        assert!(polls.load(Ordering::SeqCst) <= 51);
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_zero_sleep_lets_other_tasks_run() {
        let ran = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = std::sync::Arc::clone(&ran);
        tokio::spawn(async move { flag.store(true, Ordering::SeqCst) });

        sleep_ms(0).await;

        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_poll_until_stops_on_error() {
        let polls = AtomicU32::new(0);

        let result: Result<Option<()>, String> = poll_until(
            Duration::from_millis(1),
            Duration::from_secs(5),
            || {
                polls.fetch_add(1, Ordering::SeqCst);
                async { Err("rpc down".to_string()) }
            },
        )
        .await;

        assert_eq!(result.unwrap_err(), "rpc down");
        assert_eq!(polls.load(Ordering::SeqCst), 1);
    }
}

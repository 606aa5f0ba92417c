//! Retrying fallible async operations.
//!
//! [`retry`] is the plain wrapper every test case goes through: run the unit
//! of work, and on any error run it again until the attempt budget is spent,
//! then hand back the last error unchanged.
//!
//! [`RetryPolicy`] adds what the plain wrapper leaves out: backoff between
//! attempts, a per-attempt timeout, an overall deadline, and a predicate to
//! restrict retries to transient failures.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, warn};

use crate::domain::AppError;

/// Attempt budget the suite uses for whole test cases
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Exponential backoff stops doubling after this many failures
const MAX_BACKOFF_EXPONENT: u32 = 16;

/// Run `operation` up to `max_attempts` times, returning the first success or
/// the last error.
///
/// Every error is retried. Attempts run strictly one after another with no
/// delay in between; a `max_attempts` of zero still runs the operation once.
pub async fn retry<F, Fut, T, E>(mut operation: F, max_attempts: u32) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    info!(attempt, max_attempts, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if attempt < max_attempts => {
                warn!(attempt, max_attempts, error = %e, "Attempt failed, retrying");
                attempt += 1;
            }
            Err(e) => {
                warn!(attempt, max_attempts, error = %e, "Retry attempts exhausted");
                return Err(e);
            }
        }
    }
}

/// Delay inserted between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backoff {
    /// Retry immediately
    #[default]
    None,
    /// Same delay before every retry
    Fixed(Duration),
    /// `base * 2^(failures - 1)`, capped at `max`
    Exponential {
        base: Duration,
        max: Duration,
        jitter: bool,
    },
}

impl Backoff {
    /// Delay to wait after `failures` failed attempts
    #[must_use]
    pub fn delay_for(&self, failures: u32) -> Duration {
        match *self {
            Self::None => Duration::ZERO,
            Self::Fixed(delay) => delay,
            Self::Exponential { base, max, jitter } => {
                let exponent = failures.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
                let delay = base.saturating_mul(1u32 << exponent);
                if jitter && !delay.is_zero() {
                    let spread = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                    let extra = rand::thread_rng().gen_range(0..=spread);
                    delay.saturating_add(Duration::from_millis(extra)).min(max)
                } else {
                    delay.min(max)
                }
            }
        }
    }
}

/// Why a [`RetryPolicy`] gave up
#[derive(Debug, Error)]
pub enum RetryError<E> {
    #[error("gave up after {attempts} attempt(s): {error}")]
    Exhausted { attempts: u32, error: E },

    #[error("non-retryable failure on attempt {attempt}: {error}")]
    Rejected { attempt: u32, error: E },

    #[error("attempt {attempts} timed out after {timeout:?}")]
    AttemptTimedOut { attempts: u32, timeout: Duration },

    #[error("retry deadline of {deadline:?} exceeded after {attempts} attempt(s)")]
    DeadlineExceeded {
        attempts: u32,
        deadline: Duration,
        last_error: Option<E>,
    },
}

impl<E> RetryError<E> {
    /// Number of times the operation was started
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. }
            | Self::AttemptTimedOut { attempts, .. }
            | Self::DeadlineExceeded { attempts, .. } => *attempts,
            Self::Rejected { attempt, .. } => *attempt,
        }
    }

    /// The last error the operation itself returned, if any
    pub fn into_last_error(self) -> Option<E> {
        match self {
            Self::Exhausted { error, .. } | Self::Rejected { error, .. } => Some(error),
            Self::AttemptTimedOut { .. } => None,
            Self::DeadlineExceeded { last_error, .. } => last_error,
        }
    }
}

impl From<RetryError<AppError>> for AppError {
    fn from(err: RetryError<AppError>) -> Self {
        match err {
            RetryError::Exhausted { error, .. } | RetryError::Rejected { error, .. } => error,
            RetryError::AttemptTimedOut { attempts, timeout } => {
                AppError::Timeout(format!("attempt {} exceeded {:?}", attempts, timeout))
            }
            RetryError::DeadlineExceeded {
                attempts,
                deadline,
                last_error,
            } => last_error.unwrap_or_else(|| {
                AppError::Timeout(format!(
                    "deadline of {:?} exceeded after {} attempt(s)",
                    deadline, attempts
                ))
            }),
        }
    }
}

/// Configurable retry policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
    /// Cancel an attempt that runs longer than this
    pub attempt_timeout: Option<Duration>,
    /// Overall budget measured from the first attempt
    pub deadline: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::None,
            attempt_timeout: None,
            deadline: None,
        }
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    #[must_use]
    pub fn with_attempt_timeout(mut self, attempt_timeout: Duration) -> Self {
        self.attempt_timeout = Some(attempt_timeout);
        self
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Effective attempt budget, never below one
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    #[must_use]
    pub fn delay_for(&self, failures: u32) -> Duration {
        self.backoff.delay_for(failures)
    }

    /// Build a policy from `{prefix}_*` environment variables.
    ///
    /// Reads `MAX_ATTEMPTS`, `BACKOFF_MS`, `BACKOFF_MAX_MS`,
    /// `ATTEMPT_TIMEOUT_MS` and `DEADLINE_MS`. Unset or unparsable values keep
    /// the defaults.
    #[must_use]
    pub fn from_env(prefix: &str) -> Self {
        Self::from_lookup(prefix, |key| std::env::var(key).ok())
    }

    /// Same as [`RetryPolicy::from_env`] with an arbitrary variable source
    pub fn from_lookup(prefix: &str, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |name: &str| {
            lookup(&format!("{}_{}", prefix, name)).and_then(|v| v.trim().parse::<u64>().ok())
        };

        let max_attempts = read("MAX_ATTEMPTS")
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(DEFAULT_MAX_ATTEMPTS);

        let backoff = match (read("BACKOFF_MS"), read("BACKOFF_MAX_MS")) {
            (Some(base), Some(max)) => Backoff::Exponential {
                base: Duration::from_millis(base),
                max: Duration::from_millis(max),
                jitter: true,
            },
            (Some(base), None) => Backoff::Fixed(Duration::from_millis(base)),
            _ => Backoff::None,
        };

        Self {
            max_attempts,
            backoff,
            attempt_timeout: read("ATTEMPT_TIMEOUT_MS").map(Duration::from_millis),
            deadline: read("DEADLINE_MS").map(Duration::from_millis),
        }
    }

    /// Run `operation`, retrying every error
    pub async fn run<F, Fut, T, E>(&self, operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.run_if(operation, |_| true).await
    }

    /// Run `operation`, retrying only errors accepted by `should_retry`.
    ///
    /// The first attempt always starts, even with a zero deadline.
    pub async fn run_if<F, Fut, T, E, P>(
        &self,
        mut operation: F,
        should_retry: P,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        P: Fn(&E) -> bool,
    {
        let max_attempts = self.max_attempts();
        let deadline = self.deadline.map(|budget| (budget, Instant::now() + budget));
        let mut last_error: Option<E> = None;
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let remaining = match deadline {
                Some((budget, at)) => {
                    let left = at.saturating_duration_since(Instant::now());
                    if attempt > 1 && left.is_zero() {
                        warn!(attempts = attempt - 1, ?budget, "Retry deadline exceeded");
                        return Err(RetryError::DeadlineExceeded {
                            attempts: attempt - 1,
                            deadline: budget,
                            last_error,
                        });
                    }
                    Some(left)
                }
                None => None,
            };

            let limit = match (self.attempt_timeout, remaining) {
                (Some(per_attempt), Some(left)) => Some(per_attempt.min(left)),
                (per_attempt, left) => per_attempt.or(left),
            };

            let outcome = match limit {
                Some(limit) => timeout(limit, operation()).await.ok(),
                None => Some(operation().await),
            };

            match outcome {
                Some(Ok(value)) => {
                    if attempt > 1 {
                        info!(attempt, max_attempts, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Some(Err(e)) => {
                    if !should_retry(&e) {
                        debug!(attempt, error = %e, "Error is not retryable");
                        return Err(RetryError::Rejected { attempt, error: e });
                    }
                    if attempt >= max_attempts {
                        warn!(attempt, max_attempts, error = %e, "Retry attempts exhausted");
                        return Err(RetryError::Exhausted {
                            attempts: attempt,
                            error: e,
                        });
                    }
                    warn!(attempt, max_attempts, error = %e, "Attempt failed, retrying");
                    last_error = Some(e);
                }
                None => {
                    if let Some((budget, at)) = deadline {
                        if Instant::now() >= at {
                            warn!(attempts = attempt, ?budget, "Retry deadline exceeded");
                            return Err(RetryError::DeadlineExceeded {
                                attempts: attempt,
                                deadline: budget,
                                last_error,
                            });
                        }
                    }
                    let timed_out_after = limit.unwrap_or_default();
                    if attempt >= max_attempts {
                        warn!(attempt, max_attempts, timeout = ?timed_out_after, "Final attempt timed out");
                        return Err(RetryError::AttemptTimedOut {
                            attempts: attempt,
                            timeout: timed_out_after,
                        });
                    }
                    warn!(attempt, max_attempts, timeout = ?timed_out_after, "Attempt timed out, retrying");
                }
            }

            let mut delay = self.delay_for(attempt);
            if let Some((_, at)) = deadline {
                delay = delay.min(at.saturating_duration_since(Instant::now()));
            }
            if !delay.is_zero() {
                debug!(attempt, delay_ms = delay.as_millis() as u64, "Backing off before retry");
                sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_retry_succeeds_first_attempt() {
        let calls = AtomicU32::new(0);

        let result: Result<(), String> = retry(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            },
            5,
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_returns_last_error() {
        let calls = AtomicU32::new(0);

        let result: Result<(), String> = retry(
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move { Err(format!("failure {}", n)) }
            },
            4,
        )
        .await;

        assert_eq!(result.unwrap_err(), "failure 4");
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_retry_zero_attempts_runs_once() {
        let calls = AtomicU32::new(0);

        let result: Result<(), &str> = retry(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("nope") }
            },
            0,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_exponential_backoff_delays() {
        let backoff = Backoff::Exponential {
            base: Duration::from_millis(100),
            max: Duration::from_secs(5),
            jitter: false,
        };
        assert_eq!(backoff.delay_for(1), Duration::from_millis(100));
        assert_eq!(backoff.delay_for(2), Duration::from_millis(200));
        assert_eq!(backoff.delay_for(3), Duration::from_millis(400));
        assert_eq!(backoff.delay_for(6), Duration::from_millis(3200));
        assert_eq!(backoff.delay_for(7), Duration::from_secs(5)); // capped
        assert_eq!(backoff.delay_for(u32::MAX), Duration::from_secs(5));
    }

    #[test]
    fn test_jittered_backoff_stays_within_bounds() {
        let backoff = Backoff::Exponential {
            base: Duration::from_millis(100),
            max: Duration::from_secs(1),
            jitter: true,
        };
        for _ in 0..50 {
            let delay = backoff.delay_for(2);
            assert!(delay >= Duration::from_millis(200));
            assert!(delay <= Duration::from_millis(400));
        }
        assert_eq!(backoff.delay_for(10), Duration::from_secs(1));
    }

    #[test]
    fn test_fixed_and_no_backoff() {
        assert_eq!(Backoff::None.delay_for(3), Duration::ZERO);
        assert_eq!(
            Backoff::Fixed(Duration::from_millis(250)).delay_for(3),
            Duration::from_millis(250)
        );
    }

    #[test]
    fn test_policy_from_lookup() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("IO_MAX_ATTEMPTS", "3"),
            ("IO_BACKOFF_MS", "50"),
            ("IO_BACKOFF_MAX_MS", "1000"),
            ("IO_ATTEMPT_TIMEOUT_MS", "2000"),
            ("IO_DEADLINE_MS", "not-a-number"),
        ]);
        let policy = RetryPolicy::from_lookup("IO", |k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(policy.max_attempts, 3);
        assert_eq!(
            policy.backoff,
            Backoff::Exponential {
                base: Duration::from_millis(50),
                max: Duration::from_millis(1000),
                jitter: true,
            }
        );
        assert_eq!(policy.attempt_timeout, Some(Duration::from_secs(2)));
        assert_eq!(policy.deadline, None);
    }

    #[test]
    fn test_policy_from_empty_lookup_uses_defaults() {
        let policy = RetryPolicy::from_lookup("NONE", |_| None);
        assert_eq!(policy, RetryPolicy::default());
        assert_eq!(policy.max_attempts(), DEFAULT_MAX_ATTEMPTS);
    }

    #[tokio::test(start_paused = true)]
    async fn test_policy_applies_fixed_backoff() {
        let policy = RetryPolicy::new(3).with_backoff(Backoff::Fixed(Duration::from_secs(2)));
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let result: Result<(), RetryError<String>> = policy
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("down".to_string()) }
            })
            .await;

        assert!(matches!(result, Err(RetryError::Exhausted { attempts: 3, .. })));
        // Two waits between three attempts
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(4));
        assert!(elapsed < Duration::from_millis(4100));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_run_if_does_not_retry_rejected_errors() {
        let policy = RetryPolicy::new(5);
        let calls = AtomicU32::new(0);

        let result: Result<(), RetryError<AppError>> = policy
            .run_if(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(AppError::Assertion("balance mismatch".into())) }
                },
                AppError::is_transient,
            )
            .await;

        assert!(matches!(result, Err(RetryError::Rejected { attempt: 1, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout_counts_as_failure() {
        let policy = RetryPolicy::new(3).with_attempt_timeout(Duration::from_secs(1));
        let calls = AtomicU32::new(0);

        let result: Result<u32, RetryError<String>> = policy
            .run(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        sleep(Duration::from_secs(10)).await;
                    }
                    Ok(n)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_final_attempt_timeout_is_reported() {
        let policy = RetryPolicy::new(2).with_attempt_timeout(Duration::from_millis(500));

        let result: Result<(), RetryError<String>> = policy
            .run(|| async {
                sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .await;

        match result {
            Err(RetryError::AttemptTimedOut { attempts, timeout }) => {
                assert_eq!(attempts, 2);
                assert_eq!(timeout, Duration::from_millis(500));
            }
            other => panic!("expected AttemptTimedOut, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_stops_retrying() {
        let policy = RetryPolicy::new(100)
            .with_backoff(Backoff::Fixed(Duration::from_secs(1)))
            .with_deadline(Duration::from_millis(2500));
        let calls = AtomicU32::new(0);

        let result: Result<(), RetryError<String>> = policy
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("flaky".to_string()) }
            })
            .await;

        match result {
            Err(RetryError::DeadlineExceeded {
                attempts,
                last_error,
                ..
            }) => {
                // attempts at t=0s, 1s, 2s; the backoff after the third is cut to 0.5s
                assert_eq!(attempts, 3);
                assert_eq!(last_error.as_deref(), Some("flaky"));
            }
            other => panic!("expected DeadlineExceeded, got {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_zero_deadline_still_runs_once() {
        let policy = RetryPolicy::new(3).with_deadline(Duration::ZERO);
        let calls = AtomicU32::new(0);

        let result: Result<(), RetryError<String>> = policy
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;

        // A zero-length timeout still polls the future once before expiring
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_retry_error_into_app_error() {
        let err: AppError = RetryError::Exhausted {
            attempts: 5,
            error: AppError::Assertion("receipt missing".into()),
        }
        .into();
        assert!(matches!(err, AppError::Assertion(_)));

        let err: AppError = RetryError::<AppError>::AttemptTimedOut {
            attempts: 2,
            timeout: Duration::from_secs(1),
        }
        .into();
        assert!(matches!(err, AppError::Timeout(_)));

        let err: AppError = RetryError::<AppError>::DeadlineExceeded {
            attempts: 0,
            deadline: Duration::ZERO,
            last_error: None,
        }
        .into();
        assert!(matches!(err, AppError::Timeout(_)));
    }
}

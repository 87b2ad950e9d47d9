//! Retry logic
//!
//! Two flavors of retry live here:
//! - [`download_with_retry`], exponential backoff with optional jitter for
//!   best-effort network calls (cover art)
//! - [`ErrorBudget`], the task-wide error counter the orchestrator uses to
//!   retry a failing part with linear backoff until a fixed ceiling is reached
//!
//! # Example
//!
//! ```no_run
//! use bili_archiver::retry::{IsRetryable, download_with_retry};
//! use bili_archiver::config::RetryConfig;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{self:?}")
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() -> Result<(), MyError> {
//! let config = RetryConfig::default();
//! download_with_retry(&config, || async { Ok::<_, MyError>(()) }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::{CoverError, Error, PartError};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (timeouts, connection resets, 5xx responses) should return `true`.
/// Permanent failures (bad input, undecodable images, missing tools) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Network(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().is_some_and(|s| s.is_server_error())
            }
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
            ),
            Error::Part(e) => !matches!(e, PartError::Unrecordable { .. }),
            Error::Cover(e) => matches!(e, CoverError::Download(_)),
            Error::ExternalTool(msg) => {
                msg.contains("timeout") || msg.contains("timed out") || msg.contains("temporary")
            }
            Error::Config { .. }
            | Error::Serialization(_)
            | Error::Ledger(_)
            | Error::NotFound(_)
            | Error::InvalidCollectionId(_)
            | Error::InvalidRequest(_)
            | Error::TaskAlreadyRunning(_)
            | Error::ApiServerError(_)
            | Error::Other(_) => false,
        }
    }
}

/// Execute an async operation with exponential backoff retry logic
///
/// Returns the successful result or the last error after all retry attempts
/// are exhausted. Non-retryable errors are returned immediately.
pub async fn download_with_retry<F, Fut, T, E>(
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::debug!(attempts = attempt + 1, "operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < config.max_attempts => {
                attempt += 1;

                tracing::debug!(
                    error = %e,
                    attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis(),
                    "operation failed, retrying"
                );

                let wait = if config.jitter { add_jitter(delay) } else { delay };
                tokio::time::sleep(wait).await;

                let next = Duration::from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier);
                delay = next.min(config.max_delay);
            }
            Err(e) => return Err(e),
        }
    }
}

/// Jitter is uniform between 0% and 100% of the delay
fn add_jitter(delay: Duration) -> Duration {
    let jitter_factor: f64 = rand::thread_rng().gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}

/// What the orchestrator should do after a part attempt failed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for the given duration, then retry the same part
    RetryAfter(Duration),
    /// The ceiling was reached; the task fails
    Exhausted,
}

/// Task-wide error counter with linear backoff
///
/// The counter is shared by every part of a task and is never reset by a
/// later success, so the ceiling bounds the total number of errors a task
/// may accumulate.
#[derive(Clone, Debug)]
pub struct ErrorBudget {
    ceiling: u32,
    step: Duration,
    errors: u32,
}

impl ErrorBudget {
    /// Create a budget allowing `ceiling` errors, sleeping `n × step` after the n-th
    pub fn new(ceiling: u32, step: Duration) -> Self {
        Self {
            ceiling,
            step,
            errors: 0,
        }
    }

    /// Count one failure and decide whether to retry
    pub fn record_failure(&mut self) -> RetryDecision {
        self.errors = self.errors.saturating_add(1);
        if self.errors >= self.ceiling {
            RetryDecision::Exhausted
        } else {
            RetryDecision::RetryAfter(self.step * self.errors)
        }
    }

    /// Errors recorded so far
    pub fn errors(&self) -> u32 {
        self.errors
    }

    /// Retries left before the ceiling (reported in `error` events)
    pub fn retries_remaining(&self) -> u32 {
        self.ceiling.saturating_sub(self.errors)
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    enum TestError {
        Transient,
        Permanent,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                TestError::Transient => write!(f, "transient error"),
                TestError::Permanent => write!(f, "permanent error"),
            }
        }
    }

    impl IsRetryable for TestError {
        fn is_retryable(&self) -> bool {
            matches!(self, TestError::Transient)
        }
    }

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(50),
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }

    #[tokio::test]
    async fn succeeds_without_retry() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = download_with_retry(&fast_config(3), || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, TestError>(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = download_with_retry(&fast_config(3), || {
            let counter = counter_clone.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(TestError::Transient)
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = download_with_retry(&fast_config(2), || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>(TestError::Transient)
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 3, "initial + 2 retries");
    }

    #[tokio::test]
    async fn permanent_error_is_not_retried() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = download_with_retry(&fast_config(5), || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>(TestError::Permanent)
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn jitter_stays_within_double() {
        let base = Duration::from_millis(100);
        for _ in 0..50 {
            let jittered = add_jitter(base);
            assert!(jittered >= base && jittered <= base * 2);
        }
    }

    #[test]
    fn budget_backs_off_linearly_until_ceiling() {
        let step = Duration::from_secs(5);
        let mut budget = ErrorBudget::new(5, step);

        assert_eq!(budget.record_failure(), RetryDecision::RetryAfter(step));
        assert_eq!(budget.retries_remaining(), 4);
        assert_eq!(budget.record_failure(), RetryDecision::RetryAfter(step * 2));
        assert_eq!(budget.record_failure(), RetryDecision::RetryAfter(step * 3));
        assert_eq!(budget.record_failure(), RetryDecision::RetryAfter(step * 4));
        assert_eq!(budget.record_failure(), RetryDecision::Exhausted);
        assert_eq!(budget.errors(), 5);
        assert_eq!(budget.retries_remaining(), 0);
    }

    #[test]
    fn error_classification() {
        let fetch = Error::Part(PartError::TransientFetch {
            part: 1,
            reason: "HTTP 412".into(),
        });
        assert!(fetch.is_retryable());

        let unrecordable = Error::Part(PartError::Unrecordable {
            path: "a.mp3".into(),
            reason: "metadata".into(),
        });
        assert!(!unrecordable.is_retryable());

        assert!(Error::Cover(CoverError::Download("503".into())).is_retryable());
        assert!(!Error::Cover(CoverError::Image("bad jpeg".into())).is_retryable());
        assert!(!Error::InvalidCollectionId("x".into()).is_retryable());
    }
}

//! Shared retry policy.
//!
//! Every retried operation in the crate (discovery page fetches and
//! per-repository tasks) goes through [`RetryPolicy`] and [`retry`] so the
//! backoff schedule is defined in one place.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: usize = 3;
/// Default delay before the first retry.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
/// Default upper bound for a single backoff delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Exponential backoff parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt.
    pub max_retries: usize,
    /// Delay before the first retry; doubles on each subsequent retry.
    pub base_delay: Duration,
    /// Cap applied to each individual delay.
    pub max_delay: Duration,
    /// Whether to add jitter to delays.
    pub with_jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            with_jitter: true,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_retries: usize, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
            with_jitter: true,
        }
    }

    #[must_use]
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.with_jitter = jitter;
        self
    }

    /// Build the backon strategy for this policy.
    #[must_use]
    pub fn backoff(&self) -> ExponentialBuilder {
        let mut builder = ExponentialBuilder::default()
            .with_min_delay(self.base_delay)
            .with_max_delay(self.max_delay)
            .with_factor(2.0)
            .with_max_times(self.max_retries);

        if self.with_jitter {
            builder = builder.with_jitter();
        }

        builder
    }
}

/// Run `operation` until it succeeds, returns an error `is_retryable`
/// rejects, or the policy's retries are used up.
///
/// `on_retry` is called before each backoff sleep with the error, the delay
/// and the number of the attempt that just failed (1-based).
pub async fn retry<T, E, F, Fut, IsRetryable, OnRetry>(
    policy: &RetryPolicy,
    mut operation: F,
    is_retryable: IsRetryable,
    mut on_retry: OnRetry,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    IsRetryable: FnMut(&E) -> bool,
    OnRetry: FnMut(&E, Duration, u32),
{
    let attempt = AtomicU32::new(0);

    let op = || {
        attempt.fetch_add(1, Ordering::SeqCst);
        operation()
    };

    op.retry(policy.backoff())
        .notify(|err, dur| {
            let current = attempt.load(Ordering::SeqCst);
            on_retry(err, dur, current);
        })
        .when(is_retryable)
        .await
}

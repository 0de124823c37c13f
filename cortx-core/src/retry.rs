//! Retry - Bounded retry with one final attempt after the deadline
//!
//! [`retry_until`] calls an operation until it succeeds, fails with an error
//! the caller does not consider transient, or the timeout elapses. When the
//! deadline passes while the last error was still transient, the operation is
//! invoked exactly once more and that result is returned as-is. This absorbs
//! races where an eventually-consistent backend settles just as time runs out.
//!
//! Each attempt is classified into an [`Attempt`]; the loop is the state
//! machine `Attempting -> {Success, Retryable, Fatal}` with the final attempt
//! as a separate branch.

use std::future::Future;
use std::time::Duration;

use log::{debug, warn};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Delay schedule between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay after the first failed attempt
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Factor applied to the delay after every retryable failure
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// Fixed delay between attempts
    pub fn fixed(delay: Duration) -> Self {
        Self {
            initial_delay: delay,
            max_delay: delay,
            multiplier: 1,
        }
    }

    fn next_delay(&self, current: Duration) -> Duration {
        current
            .saturating_mul(self.multiplier.max(1))
            .min(self.max_delay)
    }
}

/// Classification of a single attempt
#[derive(Debug)]
pub enum Attempt<T, E> {
    Success(T),
    Retryable(E),
    Fatal(E),
}

impl<T, E> Attempt<T, E> {
    pub fn classify(result: Result<T, E>, is_retryable: impl Fn(&E) -> bool) -> Self {
        match result {
            Ok(value) => Attempt::Success(value),
            Err(err) if is_retryable(&err) => Attempt::Retryable(err),
            Err(err) => Attempt::Fatal(err),
        }
    }
}

/// Retry `operation` while it fails with an error accepted by `is_retryable`
///
/// Returns on the first success or non-retryable error. If `timeout` elapses
/// while the last error was retryable, one final unconditional attempt is made
/// and its result returned.
pub async fn retry_until<T, E, F, Fut, P>(
    timeout: Duration,
    policy: &RetryPolicy,
    operation: F,
    is_retryable: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    retry_until_cancellable(
        &CancellationToken::new(),
        timeout,
        policy,
        operation,
        is_retryable,
    )
    .await
}

/// [`retry_until`] that stops waiting when `cancel` fires
///
/// Cancellation is observed between attempts only; an attempt in flight runs to
/// completion. On cancellation the last retryable error is returned and no
/// final attempt is made.
pub async fn retry_until_cancellable<T, E, F, Fut, P>(
    cancel: &CancellationToken,
    timeout: Duration,
    policy: &RetryPolicy,
    mut operation: F,
    is_retryable: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let deadline = Instant::now() + timeout;
    let mut delay = policy.initial_delay;
    let mut attempts: u32 = 0;

    let last_error = loop {
        attempts += 1;

        let err = match Attempt::classify(operation().await, &is_retryable) {
            Attempt::Success(value) => return Ok(value),
            Attempt::Fatal(err) => return Err(err),
            Attempt::Retryable(err) => err,
        };

        let now = Instant::now();
        if now >= deadline {
            break err;
        }

        let wait = delay.min(deadline - now);
        debug!(
            "Attempt {} failed with retryable error, retrying in {:?}: {}",
            attempts, wait, err
        );

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Retry cancelled after {} attempts", attempts);
                return Err(err);
            }
            _ = tokio::time::sleep(wait) => {}
        }

        if Instant::now() >= deadline {
            break err;
        }
        delay = policy.next_delay(delay);
    };

    warn!(
        "Timed out after {} attempts ({:?}), trying once more: {}",
        attempts, timeout, last_error
    );
    operation().await
}

//! Bounded retry with randomized backoff and cancellation.
//!
//! A `RetryPolicy` makes exactly `max_attempts` attempts. Between attempts it
//! waits a uniformly random delay in `[min_delay, max_delay]`. The policy is a
//! `backon` backoff builder, so it plugs into `Retryable`; `RetryPolicy::run`
//! additionally races the whole retry sequence against a cancellation token.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use backon::{BackoffBuilder, Retryable};
use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Retry behavior shared by all notification channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one. Never zero.
    pub max_attempts: u32,
    /// Lower bound of the wait between attempts.
    pub min_delay: Duration,
    /// Upper bound of the wait between attempts.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            min_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
        }
    }
}

/// Errors surfaced by `RetryPolicy::run`.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("Cancelled while retrying")]
    Cancelled,

    #[error("Gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },
}

impl RetryPolicy {
    /// Create a policy. Zero attempts is raised to one; inverted bounds are swapped.
    pub fn new(max_attempts: u32, min_delay: Duration, max_delay: Duration) -> Self {
        let (min_delay, max_delay) = if min_delay <= max_delay {
            (min_delay, max_delay)
        } else {
            (max_delay, min_delay)
        };

        Self {
            max_attempts: max_attempts.max(1),
            min_delay,
            max_delay,
        }
    }

    /// Policy that retries without waiting.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO)
    }

    /// Pick one randomized delay within the configured bounds.
    pub fn jittered_delay(&self, rng: &mut impl Rng) -> Duration {
        let min = self.min_delay.as_millis() as u64;
        let max = self.max_delay.as_millis() as u64;
        if max <= min {
            return self.min_delay;
        }
        Duration::from_millis(rng.random_range(min..=max))
    }

    /// Run `operation` under this policy until it succeeds, attempts run out,
    /// or `cancel` fires.
    ///
    /// Cancellation interrupts both an in-flight attempt and a backoff wait.
    pub async fn run<T, E, F, Fut>(
        &self,
        cancel: &CancellationToken,
        operation: &str,
        f: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled);
        }

        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0u32;

        let retry = f
            .retry(self.clone())
            .notify(|err: &E, delay: Duration| {
                attempt += 1;
                warn!(
                    operation = %operation,
                    attempt = attempt,
                    max_attempts = max_attempts,
                    delay = ?delay,
                    error = %err,
                    "Attempt failed, retrying"
                );
            });

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RetryError::Cancelled),
            result = retry => result.map_err(|last| RetryError::Exhausted {
                attempts: max_attempts,
                last,
            }),
        }
    }
}

impl BackoffBuilder for RetryPolicy {
    type Backoff = std::vec::IntoIter<Duration>;

    fn build(self) -> Self::Backoff {
        let mut rng = rand::rng();
        (1..self.max_attempts.max(1))
            .map(|_| self.jittered_delay(&mut rng))
            .collect::<Vec<_>>()
            .into_iter()
    }
}

#[cfg(test)]
mod tests;

use std::{future::Future, time::Duration};

use rand::Rng;
use tracing::{error, warn};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(1000);
pub const DEFAULT_MAX_JITTER: Duration = Duration::from_millis(1000);

/// Exponential backoff applied to calls made to rate-limited remote services
///
/// Which errors are worth retrying is not decided by the policy: it is given to `retry`
/// as a predicate, so the same policy can wrap any remote call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total number of attempts, the first one included
    pub max_attempts: u32,
    /// Delay before the first retry, doubled for each following retry
    pub initial_delay: Duration,
    /// Upper bound (excluded) of the random delay added to each backoff
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_jitter: DEFAULT_MAX_JITTER,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration, max_jitter: Duration) -> Self {
        Self {
            // A policy always runs the operation at least once
            max_attempts: max_attempts.max(1),
            initial_delay,
            max_jitter,
        }
    }

    /// Backoff before the retry number `retry` (0-indexed), without jitter
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        self.initial_delay.saturating_mul(2u32.saturating_pow(retry.min(31)))
    }

    fn jitter(&self) -> Duration {
        let max_jitter_ms = self.max_jitter.as_millis() as u64;
        if max_jitter_ms == 0 {
            return Duration::ZERO;
        }

        Duration::from_millis(rand::thread_rng().gen_range(0..max_jitter_ms))
    }

    /// Runs `operation` until it succeeds, fails with an error that `is_retryable` rejects,
    /// or `max_attempts` attempts have been made.
    ///
    /// The last error is returned once the attempts are exhausted.
    pub async fn retry<T, E, F, Fut, P>(&self, mut operation: F, is_retryable: P) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let mut attempt = 1;

        loop {
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if !is_retryable(&error) {
                return Err(error);
            }

            if attempt >= self.max_attempts {
                error!(
                    attempts = attempt,
                    %error,
                    "Giving up on remote call after reaching the maximum number of attempts"
                );
                return Err(error);
            }

            let delay = self.backoff_delay(attempt - 1) + self.jitter();
            warn!(
                attempt,
                max_attempts = self.max_attempts,
                delay_ms = delay.as_millis() as u64,
                %error,
                "Remote call was rate limited, retrying"
            );

            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

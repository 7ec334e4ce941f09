//! Async retry with capped exponential backoff

use std::future::Future;
use std::time::Duration;

/// Default base delay for exponential backoff
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(100);

/// Upper bound on a single backoff delay
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Policy with the default delays; at least one attempt is always made
    pub fn with_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }

    /// Delay before attempt `attempt + 1`, doubling from `base_delay`
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Run `operation` until it succeeds or the attempts run out.
    ///
    /// Returns `Ok(attempts)` on success, or `Err((last_error, attempts))`.
    pub async fn run<F, Fut, E>(&self, label: &str, mut operation: F) -> Result<u32, (E, u32)>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: std::fmt::Display,
    {
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            match operation().await {
                Ok(()) => return Ok(attempts),
                Err(e) if attempts >= self.max_attempts => return Err((e, attempts)),
                Err(e) => {
                    let delay = self.delay_after(attempts);
                    tracing::warn!(
                        operation = label,
                        error = %e,
                        attempt = attempts,
                        delay_ms = delay.as_millis(),
                        "Retrying after transient error"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

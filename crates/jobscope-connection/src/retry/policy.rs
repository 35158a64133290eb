//! Retry policy and the retry loop

use std::future::Future;
use std::time::Duration;

use jobscope_core::{JobscopeError, Result};

/// How many times to try an operation and how long to wait in between.
///
/// The delay after the n-th failed attempt is
/// `delay * multiplier^(n - 1)`, capped at `max_delay`. The default
/// multiplier of 1.0 gives a constant delay.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, at least 1
    attempts: u32,
    /// Delay after the first failed attempt
    delay_ms: u64,
    /// Growth factor between consecutive delays
    multiplier: f64,
    /// Cap for exponential growth
    max_delay_ms: u64,
}

impl RetryPolicy {
    /// Try up to `attempts` times with a constant `delay` in between.
    ///
    /// An `attempts` value of 0 is treated as 1.
    pub fn new(attempts: u32, delay: Duration) -> Self {
        let delay_ms = delay.as_millis() as u64;
        Self {
            attempts: attempts.max(1),
            delay_ms,
            multiplier: 1.0,
            max_delay_ms: delay_ms,
        }
    }

    /// Grow the delay by `multiplier` after every failed attempt, up to `max_delay`
    pub fn with_backoff(mut self, multiplier: f64, max_delay: Duration) -> Self {
        self.multiplier = multiplier.max(1.0);
        self.max_delay_ms = (max_delay.as_millis() as u64).max(self.delay_ms);
        self
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Delay to wait after the given failed attempt (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let delay_ms = (self.delay_ms as f64) * self.multiplier.powi(exponent);
        Duration::from_millis(delay_ms.min(self.max_delay_ms as f64) as u64)
    }
}

impl Default for RetryPolicy {
    /// 3 attempts, 2 seconds apart
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2))
    }
}

/// Run `operation` until it succeeds, fails permanently or runs out of attempts.
///
/// The closure receives the 1-based attempt number. Errors that are not
/// transient are returned unchanged on the attempt that produced them. When
/// every attempt fails, the result is a connection error carrying the last
/// cause and the number of attempts made.
pub async fn retry_with_policy<T, F, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        let error = match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if !error.is_transient() {
            tracing::debug!(attempt, error = %error, "permanent failure, not retrying");
            return Err(error);
        }

        if attempt >= policy.attempts() {
            tracing::error!(attempts = attempt, error = %error, "giving up after final attempt");
            let message = match error {
                JobscopeError::Connection { message, .. } => message,
                other => other.to_string(),
            };
            return Err(JobscopeError::Connection {
                message,
                attempts: attempt,
            });
        }

        let delay = policy.delay_after(attempt);
        tracing::warn!(
            attempt,
            max_attempts = policy.attempts(),
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "attempt failed, retrying"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

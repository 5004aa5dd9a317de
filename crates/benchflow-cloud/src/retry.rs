//! Retry and poll policy
//!
//! One reusable wrapper covers both uses: transient-failure retry around
//! flaky control-plane calls, and state polling around `Exists`-style
//! checks that report a transitional status while a resource is being
//! created or deleted. Polling runs at sub-second to a-few-second
//! intervals so eventual consistency does not produce false negatives.

use crate::error::{CloudError, Result};
use std::thread;
use std::time::Duration;

/// Re-invokes an operation on a bounded or unbounded schedule until it
/// succeeds or fails non-retryably.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts; `None` retries until success or a
    /// non-retryable error.
    pub max_attempts: Option<u32>,

    /// Delay before the first retry.
    pub initial_delay: Duration,

    /// Cap applied to the backed-off delay.
    pub max_delay: Duration,

    /// Multiplier applied to the delay after each attempt.
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::transient()
    }
}

impl RetryPolicy {
    /// Policy for transient control-plane failures: a few attempts with
    /// exponential backoff.
    pub fn transient() -> Self {
        Self {
            max_attempts: Some(3),
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }

    /// Policy for status polls: frequent constant-interval checks with a
    /// generous attempt bound.
    pub fn status_poll() -> Self {
        Self {
            max_attempts: Some(600),
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(500),
            backoff_multiplier: 1.0,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_interval(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        if self.max_delay < delay {
            self.max_delay = delay;
        }
        self
    }

    /// Delay to sleep after attempt `attempt` (zero-based), following the
    /// capped exponential curve.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let initial = self.initial_delay.as_millis() as f64;
        let backed_off = initial * self.backoff_multiplier.powi(attempt as i32);
        let capped = backed_off.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// Retries `op` while `retryable` classifies its error as worth
    /// re-invoking. A non-retryable error propagates immediately; when a
    /// bounded policy exhausts, the last error is wrapped in
    /// [`CloudError::RetriesExhausted`].
    pub fn run<T>(
        &self,
        retryable: impl Fn(&CloudError) -> bool,
        mut op: impl FnMut() -> Result<T>,
    ) -> Result<T> {
        let mut attempt: u32 = 0;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if !retryable(&err) => return Err(err),
                Err(err) => {
                    attempt += 1;
                    if let Some(max) = self.max_attempts {
                        if attempt >= max {
                            return Err(CloudError::RetriesExhausted {
                                attempts: attempt,
                                last: Box::new(err),
                            });
                        }
                    }
                    tracing::debug!("attempt {} failed, retrying: {}", attempt, err);
                    thread::sleep(self.delay_for_attempt(attempt - 1));
                }
            }
        }
    }

    /// Transient-failure retry: re-invokes on retryable errors.
    pub fn call<T>(&self, op: impl FnMut() -> Result<T>) -> Result<T> {
        self.run(CloudError::is_retryable, op)
    }

    /// State poll: re-invokes while the operation reports a transitional
    /// status.
    pub fn poll<T>(&self, op: impl FnMut() -> Result<T>) -> Result<T> {
        self.run(CloudError::is_transitional, op)
    }
}

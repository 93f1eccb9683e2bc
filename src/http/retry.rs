//! Retry policy and response classification.

use std::time::Duration;

use rand::Rng as _;

use super::HttpError;
use crate::error::{Error, Result};

/// Bounds on how hard a single call retries.
///
/// Fixed when the client is built and read-only afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_total_retry_duration: Duration,
    jitter: Duration,
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_total_retry_duration: Duration,
    ) -> Result<Self> {
        if max_attempts == 0 {
            return Err(Error::Config(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            max_attempts,
            base_delay,
            max_total_retry_duration,
            jitter: Duration::ZERO,
        })
    }

    /// Adds a uniform random delay in `[0, jitter)` to every backoff.
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn max_total_retry_duration(&self) -> Duration {
        self.max_total_retry_duration
    }

    pub fn jitter(&self) -> Duration {
        self.jitter
    }

    /// Decides what happens after retryable failure number `attempt`
    /// (1-based), given the sleep time already spent.
    ///
    /// Returns `None` when the attempt or duration budget is used up,
    /// otherwise the delay before the next attempt.
    pub fn next_delay(&self, attempt: u32, slept: Duration) -> Option<Duration> {
        if attempt >= self.max_attempts || slept >= self.max_total_retry_duration {
            return None;
        }
        let remaining = self.max_total_retry_duration - slept;
        Some(self.backoff(attempt).saturating_add(self.jitter_sample()).min(remaining))
    }

    /// `base_delay * 2^(attempt-1)`, saturating instead of overflowing.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1u32 << exponent)
    }

    fn jitter_sample(&self) -> Duration {
        if self.jitter.is_zero() {
            return Duration::ZERO;
        }
        let secs = rand::rng().random_range(0.0..self.jitter.as_secs_f64());
        Duration::from_secs_f64(secs)
    }
}

impl Default for RetryPolicy {
    /// Five retries after the first attempt, 2s base, 1s jitter, 500s budget.
    fn default() -> Self {
        Self {
            max_attempts: 6,
            base_delay: Duration::from_secs(2),
            max_total_retry_duration: Duration::from_secs(500),
            jitter: Duration::from_secs(1),
        }
    }
}

/// What a single attempt produced.
#[derive(Debug)]
pub enum CallOutcome {
    Success(Vec<u8>),
    Retryable(HttpError),
    Fatal(HttpError),
}

/// Whether a status is worth retrying: 429 or any 5xx.
pub fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..=599).contains(&status)
}

/// Classifies a completed HTTP exchange.
pub fn classify(status: u16, body: Vec<u8>, attempt: u32) -> CallOutcome {
    if (200..=299).contains(&status) {
        return CallOutcome::Success(body);
    }

    let text = String::from_utf8_lossy(&body).into_owned();
    let body = (!text.is_empty()).then_some(text);
    let error = HttpError::from_status(status, body, attempt);

    if is_retryable_status(status) {
        CallOutcome::Retryable(error)
    } else {
        CallOutcome::Fatal(error)
    }
}

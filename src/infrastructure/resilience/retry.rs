//! Exponential backoff with jitter
//!
//! Wraps transient I/O in a retry loop: delays double from the base
//! (0.5 s, 1, 2, 4, 8, ...) capped at 30 s, each perturbed by ±25 % jitter,
//! for at most 5 attempts. Only errors classified transient by
//! [`Error::is_transient`] re-enter the loop; everything else propagates on
//! the first attempt.

use rand::Rng;
use std::future::Future;
use std::time::Duration;

use crate::domain::error::{Error, Result};

/// Retry configuration
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum attempts, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub base_delay: Duration,
    /// Ceiling for any single delay
    pub max_delay: Duration,
    /// Jitter fraction applied to each delay
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter: 0.25,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries; used where the caller handles failures
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Nominal delay before attempt `n` (0-based), before jitter
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt));
        exp.min(self.max_delay)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter <= 0.0 {
            return delay;
        }
        let factor = 1.0 + rand::rng().random_range(-self.jitter..=self.jitter);
        delay.mul_f64(factor.max(0.0))
    }

    /// Run `op`, retrying transient failures with backoff.
    ///
    /// The final error keeps its own detail but reports the total attempt
    /// count when the retry budget is exhausted.
    pub async fn run<T, F, Fut>(&self, op_name: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt + 1 < self.max_attempts => {
                    let delay = self.jittered(self.delay_for_attempt(attempt));
                    tracing::warn!(
                        op = op_name,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) if err.is_transient() => {
                    return Err(Error::Transient {
                        attempts: attempt + 1,
                        detail: err.to_string(),
                    });
                }
                Err(err) => return Err(err),
            }
        }
    }
}

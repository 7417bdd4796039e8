//! Bounded retry for remote calls.
//!
//! Only idempotent reads are retried blindly. Writes get a single attempt
//! here; the writer decides whether a failed write may be repeated by
//! re-reading the remote blob identifier first.

use std::future::Future;
use std::time::Duration;

use flowershow_core::RetryConfig;

use crate::error::PublishError;

/// Upper bound on any single pause between attempts.
pub const MAX_DELAY: Duration = Duration::from_secs(60);

/// Whether a call may be repeated without side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallClass {
    Read,
    Write,
}

/// Fixed attempt count with an optional exponential backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    attempts: u32,
    delay: Duration,
    backoff: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration, backoff: f64) -> Self {
        Self {
            attempts: attempts.max(1),
            delay: delay.min(MAX_DELAY),
            backoff: if backoff.is_finite() { backoff.max(1.0) } else { 1.0 },
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.attempts,
            Duration::from_millis(config.delay_ms),
            config.backoff,
        )
    }

    /// Single attempt, no delay.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO, 1.0)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Attempts allowed for a call class.
    pub fn attempts_for(&self, class: CallClass) -> u32 {
        match class {
            CallClass::Read => self.attempts,
            CallClass::Write => 1,
        }
    }

    /// Run `call`, retrying transient failures up to the class limit.
    pub async fn run<T, F, Fut>(
        &self,
        class: CallClass,
        operation: &str,
        mut call: F,
    ) -> Result<T, PublishError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PublishError>>,
    {
        let attempts = self.attempts_for(class);
        let mut delay = self.delay;
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < attempts && err.is_transient() => {
                    tracing::warn!(
                        "{operation} failed (attempt {attempt}/{attempts}), retrying in {}ms: {err}",
                        delay.as_millis()
                    );
                    self.pause(delay).await;
                    delay = self.next_delay(delay);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// `delay` grown by the backoff factor, capped at [`MAX_DELAY`].
    fn next_delay(&self, delay: Duration) -> Duration {
        Duration::try_from_secs_f64(delay.as_secs_f64() * self.backoff)
            .map_or(MAX_DELAY, |next| next.min(MAX_DELAY))
    }

    /// Sleep for `delay`; exposed so writers share the same pacing.
    pub async fn pause(&self, delay: Duration) {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

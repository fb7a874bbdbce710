//! Bounded retry with exponential backoff.
//!
//! [`RetryPolicy`] is applied explicitly at the call sites that perform
//! I/O: store writes in the ingestion writer, page-session startup in the
//! orchestrator, and embedding API requests. An operation runs at most `max_retries + 1` times;
//! the delay before retry `n` (0-based) is `base_delay * 2^n`. When every
//! attempt fails, the error from the last attempt is returned unchanged.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::config::RetryConfig;

/// Exponent cap so long policies cannot overflow the delay.
const MAX_BACKOFF_EXPONENT: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_retries, Duration::from_millis(config.base_delay_ms))
    }

    /// Total attempts, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay slept after failed attempt `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(MAX_BACKOFF_EXPONENT);
        self.base_delay.saturating_mul(factor)
    }

    /// Run `op` until it succeeds or the attempts are used up.
    ///
    /// `what` names the operation in retry warnings.
    pub async fn run<T, E, F, Fut>(&self, what: &str, op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        self.run_if(what, op, |_| true).await
    }

    /// Like [`run`](Self::run), but an error for which `retryable` returns
    /// false is returned at once.
    pub async fn run_if<T, E, F, Fut>(
        &self,
        what: &str,
        mut op: F,
        retryable: impl Fn(&E) -> bool,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_retries && retryable(&e) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        operation = what,
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts(),
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying after failure"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

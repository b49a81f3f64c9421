use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{Error, Result};

pub const THROTTLING: &str = "ThrottlingException";
pub const SERVICE_UNAVAILABLE: &str = "ServiceUnavailableException";
pub const MODEL_TIMEOUT: &str = "ModelTimeoutException";

/// Exponential backoff shared by the model adapter and the WAFR evaluator.
///
/// Only errors whose service code is listed in `retryable_codes` are retried;
/// everything else surfaces on the first attempt.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub retryable_codes: Vec<String>,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, retryable_codes: &[&str]) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(32),
            retryable_codes: retryable_codes.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn bedrock(max_retries: u32) -> Self {
        Self::new(max_retries, &[THROTTLING, SERVICE_UNAVAILABLE, MODEL_TIMEOUT])
    }

    pub fn wafr(max_retries: u32) -> Self {
        Self::new(max_retries, &[THROTTLING, SERVICE_UNAVAILABLE])
    }

    pub fn with_base_delay(mut self, base: Duration) -> Self {
        self.base_delay = base;
        self
    }

    /// Delay before retry number `attempt` (0-based): base * 2^attempt, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    pub fn is_retryable(&self, err: &Error) -> bool {
        err.error_code().is_some_and(|code| self.retryable_codes.iter().any(|c| c == code))
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or the
    /// retry budget is spent. Backoff sleeps end early on cancellation.
    pub async fn run<T, F, Fut>(&self, operation: &str, cancel: &CancellationToken, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let err = match op().await {
                Ok(v) => return Ok(v),
                Err(e) => e,
            };
            if !self.is_retryable(&err) {
                return Err(err);
            }
            if attempt >= self.max_retries {
                return Err(Error::RetriesExhausted {
                    operation: operation.to_string(),
                    attempts: attempt + 1,
                    source: Box::new(err),
                });
            }
            let delay = self.delay_for(attempt);
            warn!(operation, attempt = attempt + 1, delay_ms = delay.as_millis() as u64, error = %err, "retrying after transient error");
            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }
}

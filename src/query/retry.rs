//! Retry policy for query fetches.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::error::{ApiError, ApiResult};

/// Exponential backoff: `min(base * 2^attempt, max_delay)`.
///
/// Only transient failures are retried; 4xx and validation errors surface at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Retries after the first attempt
  pub max_retries: u32,
  pub base_delay: Duration,
  pub max_delay: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_retries: 3,
      base_delay: Duration::from_secs(1),
      max_delay: Duration::from_secs(30),
    }
  }
}

impl RetryPolicy {
  /// Never retry. Mutations use this.
  pub fn none() -> Self {
    Self {
      max_retries: 0,
      ..Self::default()
    }
  }

  /// Whether a failure on zero-based `attempt` should be retried.
  pub fn should_retry(&self, attempt: u32, error: &ApiError) -> bool {
    attempt < self.max_retries && error.is_retryable()
  }

  /// Delay before the retry that follows failed `attempt`.
  pub fn delay_for(&self, attempt: u32) -> Duration {
    let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
    self
      .base_delay
      .checked_mul(factor)
      .map(|d| d.min(self.max_delay))
      .unwrap_or(self.max_delay)
  }

  /// Run `op` until it succeeds, fails permanently, or the retry budget runs out.
  ///
  /// The last error is returned once retries are exhausted.
  pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> ApiResult<T>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = ApiResult<T>>,
  {
    let mut attempt = 0;
    loop {
      match op().await {
        Ok(value) => return Ok(value),
        Err(err) if self.should_retry(attempt, &err) => {
          let delay = self.delay_for(attempt);
          warn!(
            query = label,
            attempt = attempt + 1,
            ?delay,
            error = %err,
            "fetch failed, retrying"
          );
          tokio::time::sleep(delay).await;
          attempt += 1;
        }
        Err(err) => {
          warn!(query = label, attempts = attempt + 1, error = %err, "fetch failed");
          return Err(err);
        }
      }
    }
  }
}

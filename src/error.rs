//! Error types for the API, cache and guard layers.
//!
//! Application code (config loading, CLI commands) works with `color_eyre::Result`;
//! everything that needs to tell failures apart returns `ApiResult<T>`.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for API layer operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Failures surfaced by the HTTP client wrapper, the query cache and the role resolver.
///
/// `Clone` so a single in-flight fetch can hand the same outcome to every waiter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
  /// The request never completed (DNS, connect, TLS, reset).
  #[error("network error: {0}")]
  Network(String),

  /// The server answered with a non-2xx status.
  #[error("HTTP {status}: {message}")]
  Http { status: u16, message: String },

  /// A time-boxed call exceeded its budget.
  #[error("timed out after {0:?}")]
  Timeout(Duration),

  /// Input rejected before any request was made.
  #[error("invalid input: {0}")]
  Validation(String),

  /// The response body could not be decoded into the expected type.
  #[error("failed to decode response: {0}")]
  Decode(String),

  /// Two different result types were stored under the same query key.
  #[error("query key {0} already holds data of a different type")]
  KeyConflict(String),
}

impl ApiError {
  pub fn http(status: u16, message: impl Into<String>) -> Self {
    Self::Http {
      status,
      message: message.into(),
    }
  }

  pub fn validation(message: impl Into<String>) -> Self {
    Self::Validation(message.into())
  }

  /// HTTP status, when the server responded.
  pub fn status(&self) -> Option<u16> {
    match self {
      Self::Http { status, .. } => Some(*status),
      _ => None,
    }
  }

  /// 4xx: bad input or auth, retrying cannot help.
  pub fn is_client_error(&self) -> bool {
    matches!(self.status(), Some(400..=499))
  }

  /// Transient failures worth another attempt: 5xx, network and timeouts.
  pub fn is_retryable(&self) -> bool {
    match self {
      Self::Network(_) | Self::Timeout(_) => true,
      Self::Http { status, .. } => *status >= 500,
      Self::Validation(_) | Self::Decode(_) | Self::KeyConflict(_) => false,
    }
  }

  pub fn is_unauthorized(&self) -> bool {
    matches!(self.status(), Some(401) | Some(403))
  }
}

impl From<reqwest::Error> for ApiError {
  fn from(err: reqwest::Error) -> Self {
    if let Some(status) = err.status() {
      return Self::http(status.as_u16(), err.to_string());
    }
    if err.is_decode() {
      return Self::Decode(err.to_string());
    }
    if err.is_timeout() {
      return Self::Network(format!("request timed out: {}", err));
    }
    Self::Network(err.to_string())
  }
}

impl From<serde_json::Error> for ApiError {
  fn from(err: serde_json::Error) -> Self {
    Self::Decode(err.to_string())
  }
}

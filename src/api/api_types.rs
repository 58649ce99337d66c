//! Request bodies and error envelopes exchanged with the REST API.
//!
//! Payloads validate themselves before they are sent so obviously bad input
//! never costs a round trip.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::types::{InvoiceStatus, JobStatus};
use crate::error::{ApiError, ApiResult};

/// Error body returned by the API on non-2xx responses.
///
/// Different handlers use `message` or `error`; `message` may also be a list
/// of validation messages.
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
  pub message: Option<serde_json::Value>,
  pub error: Option<String>,
}

impl ApiErrorBody {
  pub fn into_message(self) -> Option<String> {
    match self.message {
      Some(serde_json::Value::String(s)) => Some(s),
      Some(serde_json::Value::Array(items)) => Some(
        items
          .iter()
          .filter_map(|v| v.as_str())
          .collect::<Vec<_>>()
          .join("; "),
      ),
      _ => self.error,
    }
  }
}

// ============================================================================
// Clients
// ============================================================================

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInput {
  pub name: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub email: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub phone: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub address: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub notes: Option<String>,
}

impl ClientInput {
  pub fn validate(&self) -> ApiResult<()> {
    if self.name.trim().is_empty() {
      return Err(ApiError::validation("client name is required"));
    }
    if let Some(email) = &self.email {
      validate_email(email)?;
    }
    Ok(())
  }
}

// ============================================================================
// Jobs
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobInput {
  pub client_id: String,
  pub scheduled_at: DateTime<Utc>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub cleaner_id: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub notes: Option<String>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub checklist: Vec<String>,
}

impl JobInput {
  pub fn validate(&self) -> ApiResult<()> {
    if self.client_id.trim().is_empty() {
      return Err(ApiError::validation("a job needs a client"));
    }
    if self.checklist.iter().any(|label| label.trim().is_empty()) {
      return Err(ApiError::validation("checklist items cannot be empty"));
    }
    Ok(())
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChecklistUpdate {
  pub completed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobStatusUpdate {
  pub status: JobStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoInput {
  pub url: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub caption: Option<String>,
}

// ============================================================================
// Invoices
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceInput {
  pub client_id: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub job_id: Option<String>,
  pub amount_cents: i64,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub due_date: Option<NaiveDate>,
}

impl InvoiceInput {
  pub fn validate(&self) -> ApiResult<()> {
    if self.client_id.trim().is_empty() {
      return Err(ApiError::validation("an invoice needs a client"));
    }
    if self.amount_cents < 0 {
      return Err(ApiError::validation("invoice amount cannot be negative"));
    }
    Ok(())
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct InvoiceStatusUpdate {
  pub status: InvoiceStatus,
}

// ============================================================================
// Business
// ============================================================================

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessInput {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub email: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub phone: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub address: Option<String>,
}

impl BusinessInput {
  pub fn validate(&self) -> ApiResult<()> {
    if matches!(&self.name, Some(name) if name.trim().is_empty()) {
      return Err(ApiError::validation("business name cannot be blank"));
    }
    if let Some(email) = &self.email {
      validate_email(email)?;
    }
    Ok(())
  }
}

/// Loose shape check: one `@` with text on both sides and a dot in the domain.
fn validate_email(email: &str) -> ApiResult<()> {
  let valid = match email.trim().split_once('@') {
    Some((local, domain)) => {
      !local.is_empty() && !domain.contains('@') && domain.contains('.') && !domain.ends_with('.')
    }
    None => false,
  };
  if valid {
    Ok(())
  } else {
    Err(ApiError::validation(format!("invalid email address: {}", email)))
  }
}

//! Domain types returned by the REST API. JSON fields are camelCase.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Role of the signed-in user, drives feature visibility and data scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
  Owner,
  Cleaner,
  Admin,
}

impl fmt::Display for Role {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Role::Owner => "OWNER",
      Role::Cleaner => "CLEANER",
      Role::Admin => "ADMIN",
    };
    f.write_str(name)
  }
}

/// Answer of `/auth/me`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRole {
  pub id: String,
  pub email: String,
  pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Business {
  pub id: String,
  pub name: String,
  pub email: Option<String>,
  pub phone: Option<String>,
  pub address: Option<String>,
  #[serde(default)]
  pub currency: Option<String>,
  pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
  pub id: String,
  pub name: String,
  pub email: Option<String>,
  pub phone: Option<String>,
  pub address: Option<String>,
  pub notes: Option<String>,
  pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
  Scheduled,
  InProgress,
  Completed,
  Cancelled,
}

impl JobStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      JobStatus::Scheduled => "SCHEDULED",
      JobStatus::InProgress => "IN_PROGRESS",
      JobStatus::Completed => "COMPLETED",
      JobStatus::Cancelled => "CANCELLED",
    }
  }
}

impl fmt::Display for JobStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for JobStatus {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_uppercase().replace('-', "_").as_str() {
      "SCHEDULED" => Ok(JobStatus::Scheduled),
      "IN_PROGRESS" => Ok(JobStatus::InProgress),
      "COMPLETED" => Ok(JobStatus::Completed),
      "CANCELLED" => Ok(JobStatus::Cancelled),
      other => Err(format!("unknown job status: {}", other)),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistItem {
  pub id: String,
  pub label: String,
  #[serde(default)]
  pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPhoto {
  pub id: String,
  pub url: String,
  pub caption: Option<String>,
  pub uploaded_at: Option<DateTime<Utc>>,
}

/// Reference to the client a job is for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobClient {
  pub id: String,
  pub name: String,
  pub address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
  pub id: String,
  pub status: JobStatus,
  pub scheduled_at: DateTime<Utc>,
  pub client: Option<JobClient>,
  pub cleaner_id: Option<String>,
  pub cleaner_name: Option<String>,
  pub notes: Option<String>,
  #[serde(default)]
  pub checklist: Vec<ChecklistItem>,
  #[serde(default)]
  pub photos: Vec<JobPhoto>,
}

impl Job {
  /// Only jobs that have not started may be deleted.
  pub fn is_deletable(&self) -> bool {
    self.status == JobStatus::Scheduled
  }

  pub fn checklist_progress(&self) -> (usize, usize) {
    let done = self.checklist.iter().filter(|i| i.completed).count();
    (done, self.checklist.len())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
  Draft,
  Sent,
  Paid,
  Overdue,
}

impl InvoiceStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      InvoiceStatus::Draft => "DRAFT",
      InvoiceStatus::Sent => "SENT",
      InvoiceStatus::Paid => "PAID",
      InvoiceStatus::Overdue => "OVERDUE",
    }
  }
}

impl fmt::Display for InvoiceStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for InvoiceStatus {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_uppercase().as_str() {
      "DRAFT" => Ok(InvoiceStatus::Draft),
      "SENT" => Ok(InvoiceStatus::Sent),
      "PAID" => Ok(InvoiceStatus::Paid),
      "OVERDUE" => Ok(InvoiceStatus::Overdue),
      other => Err(format!("unknown invoice status: {}", other)),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
  pub id: String,
  pub number: Option<String>,
  pub client_id: String,
  pub client_name: Option<String>,
  pub job_id: Option<String>,
  pub status: InvoiceStatus,
  /// Minor currency units
  pub amount_cents: i64,
  pub due_date: Option<NaiveDate>,
  pub issued_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DashboardStats {
  pub total_clients: u64,
  pub jobs_today: u64,
  pub upcoming_jobs: u64,
  pub completed_jobs: u64,
  pub outstanding_cents: i64,
  pub revenue_this_month_cents: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionStatus {
  Trialing,
  Active,
  PastDue,
  Canceled,
}

/// Business as listed in the admin panel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminBusiness {
  pub id: String,
  pub name: String,
  pub owner_email: Option<String>,
  pub subscription_status: Option<SubscriptionStatus>,
  pub plan: Option<String>,
  #[serde(default)]
  pub client_count: u64,
  #[serde(default)]
  pub job_count: u64,
  pub created_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_user_role_decodes_uppercase_role() {
    let user: UserRole =
      serde_json::from_value(json!({"id": "u1", "email": "a@b.co", "role": "CLEANER"})).unwrap();
    assert_eq!(user.role, Role::Cleaner);
  }

  #[test]
  fn test_job_decodes_camel_case() {
    let job: Job = serde_json::from_value(json!({
      "id": "j1",
      "status": "IN_PROGRESS",
      "scheduledAt": "2026-10-17T09:00:00Z",
      "client": {"id": "c1", "name": "Acme"},
      "cleanerId": "u2",
      "checklist": [
        {"id": "i1", "label": "Kitchen", "completed": true},
        {"id": "i2", "label": "Bathroom"}
      ]
    }))
    .unwrap();

    assert_eq!(job.status, JobStatus::InProgress);
    assert!(!job.is_deletable());
    assert_eq!(job.checklist_progress(), (1, 2));
    assert!(job.photos.is_empty());
  }

  #[test]
  fn test_status_parsing_is_lenient() {
    assert_eq!("in-progress".parse::<JobStatus>(), Ok(JobStatus::InProgress));
    assert_eq!("paid".parse::<InvoiceStatus>(), Ok(InvoiceStatus::Paid));
    assert!("archived".parse::<JobStatus>().is_err());
  }
}

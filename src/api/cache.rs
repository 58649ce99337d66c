//! Query keys for the Clenvora API.
//!
//! Every filter that changes the response is part of the key. Keys share a
//! root segment per resource so a mutation can invalidate the whole family.

use crate::query::QueryKey;

use super::types::{InvoiceStatus, JobStatus};

pub const AUTH: &str = "auth";
pub const BUSINESS: &str = "business";
pub const DASHBOARD_STATS: &str = "dashboard-stats";
pub const JOBS: &str = "jobs";
pub const CLIENTS: &str = "clients";
pub const INVOICES: &str = "invoices";
pub const ADMIN: &str = "admin";

/// Cached reads against the API.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApiQuery {
  /// `/auth/me`, held as `Option<UserRole>` by the current-user observer
  CurrentUser,
  Business,
  DashboardStats,
  /// Jobs visible to one user; the server scopes cleaners to their own jobs
  Jobs {
    user_id: String,
    status: Option<JobStatus>,
  },
  JobDetail { id: String },
  Clients,
  ClientDetail { id: String },
  Invoices { status: Option<InvoiceStatus> },
  AdminBusinesses,
}

impl ApiQuery {
  pub fn key(&self) -> QueryKey {
    match self {
      Self::CurrentUser => QueryKey::new(AUTH).with("me"),
      Self::Business => QueryKey::new(BUSINESS),
      Self::DashboardStats => QueryKey::new(DASHBOARD_STATS),
      Self::Jobs { user_id, status } => QueryKey::new(JOBS)
        .with("user")
        .with(user_id)
        .with_filter("status", status.as_ref()),
      Self::JobDetail { id } => QueryKey::new(JOBS).with("detail").with(id),
      Self::Clients => QueryKey::new(CLIENTS).with("list"),
      Self::ClientDetail { id } => QueryKey::new(CLIENTS).with("detail").with(id),
      Self::Invoices { status } => QueryKey::new(INVOICES)
        .with("list")
        .with_filter("status", status.as_ref()),
      Self::AdminBusinesses => QueryKey::new(ADMIN).with("businesses"),
    }
  }

  /// API path serving this query.
  pub fn path(&self) -> String {
    match self {
      Self::CurrentUser => "/auth/me".to_string(),
      Self::Business => "/business".to_string(),
      Self::DashboardStats => "/dashboard/stats".to_string(),
      Self::Jobs { status, .. } => match status {
        Some(status) => format!("/jobs?status={}", status),
        None => "/jobs".to_string(),
      },
      Self::JobDetail { id } => format!("/jobs/{}", id),
      Self::Clients => "/clients".to_string(),
      Self::ClientDetail { id } => format!("/clients/{}", id),
      Self::Invoices { status } => match status {
        Some(status) => format!("/invoices?status={}", status),
        None => "/invoices".to_string(),
      },
      Self::AdminBusinesses => "/admin/businesses".to_string(),
    }
  }

  pub fn description(&self) -> String {
    match self {
      Self::CurrentUser => "current user".to_string(),
      Self::Business => "business".to_string(),
      Self::DashboardStats => "dashboard stats".to_string(),
      Self::Jobs { user_id, status } => match status {
        Some(s) => format!("{} jobs for {}", s, user_id),
        None => format!("jobs for {}", user_id),
      },
      Self::JobDetail { id } => format!("job {}", id),
      Self::Clients => "clients".to_string(),
      Self::ClientDetail { id } => format!("client {}", id),
      Self::Invoices { status } => match status {
        Some(s) => format!("{} invoices", s),
        None => "invoices".to_string(),
      },
      Self::AdminBusinesses => "admin businesses".to_string(),
    }
  }
}

/// Root key covering every cached query of a resource.
pub fn root(resource: &str) -> QueryKey {
  QueryKey::new(resource)
}

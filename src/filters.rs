//! List filtering for jobs, clients and invoices.
//!
//! Filters narrow what the server returned by what the user asked for.
//! They never filter by ownership: a cleaner's job list is already scoped
//! server-side and is shown as received.

use chrono::{DateTime, Utc};

use crate::api::{Client, Invoice, InvoiceStatus, Job, JobStatus};

fn contains_ci(haystack: Option<&str>, needle: &str) -> bool {
  haystack
    .map(|h| h.to_lowercase().contains(needle))
    .unwrap_or(false)
}

/// Normalized search text; `None` when blank.
fn needle(search: Option<&str>) -> Option<String> {
  search
    .map(|s| s.trim().to_lowercase())
    .filter(|s| !s.is_empty())
}

// ============================================================================
// Jobs
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobFilter {
  pub status: Option<JobStatus>,
  pub search: Option<String>,
  /// Inclusive lower bound on `scheduled_at`
  pub from: Option<DateTime<Utc>>,
  /// Exclusive upper bound on `scheduled_at`
  pub until: Option<DateTime<Utc>>,
}

impl JobFilter {
  pub fn status(mut self, status: Option<JobStatus>) -> Self {
    self.status = status;
    self
  }

  pub fn search(mut self, search: impl Into<String>) -> Self {
    self.search = Some(search.into());
    self
  }

  pub fn between(mut self, from: DateTime<Utc>, until: DateTime<Utc>) -> Self {
    self.from = Some(from);
    self.until = Some(until);
    self
  }

  pub fn is_active(&self) -> bool {
    self.status.is_some()
      || needle(self.search.as_deref()).is_some()
      || self.from.is_some()
      || self.until.is_some()
  }

  pub fn matches(&self, job: &Job) -> bool {
    if self.status.is_some_and(|s| s != job.status) {
      return false;
    }
    if self.from.is_some_and(|from| job.scheduled_at < from) {
      return false;
    }
    if self.until.is_some_and(|until| job.scheduled_at >= until) {
      return false;
    }

    match needle(self.search.as_deref()) {
      None => true,
      Some(needle) => {
        let client = job.client.as_ref();
        contains_ci(client.map(|c| c.name.as_str()), &needle)
          || contains_ci(client.and_then(|c| c.address.as_deref()), &needle)
          || contains_ci(job.cleaner_name.as_deref(), &needle)
          || contains_ci(job.notes.as_deref(), &needle)
      }
    }
  }

  /// Matching jobs, earliest first.
  pub fn apply<'a>(&self, jobs: &'a [Job]) -> Vec<&'a Job> {
    let mut matched: Vec<&Job> = jobs.iter().filter(|job| self.matches(job)).collect();
    matched.sort_by_key(|job| job.scheduled_at);
    matched
  }
}

// ============================================================================
// Clients
// ============================================================================

/// Clients whose name, email or phone contains `search`, sorted by name.
pub fn search_clients<'a>(clients: &'a [Client], search: Option<&str>) -> Vec<&'a Client> {
  let needle = needle(search);
  let mut matched: Vec<&Client> = clients
    .iter()
    .filter(|client| match &needle {
      None => true,
      Some(needle) => {
        contains_ci(Some(&client.name), needle)
          || contains_ci(client.email.as_deref(), needle)
          || contains_ci(client.phone.as_deref(), needle)
      }
    })
    .collect();
  matched.sort_by_cached_key(|client| client.name.to_lowercase());
  matched
}

// ============================================================================
// Invoices
// ============================================================================

/// Invoices with `status` (all when `None`), soonest due first; undated last.
pub fn filter_invoices(invoices: &[Invoice], status: Option<InvoiceStatus>) -> Vec<&Invoice> {
  let mut matched: Vec<&Invoice> = invoices
    .iter()
    .filter(|invoice| status.map_or(true, |s| invoice.status == s))
    .collect();
  matched.sort_by_key(|invoice| (invoice.due_date.is_none(), invoice.due_date));
  matched
}

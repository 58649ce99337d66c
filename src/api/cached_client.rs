//! API client with transparent caching and mutation invalidation.

use serde::de::DeserializeOwned;
use tracing::{debug, info};

use super::api_types::{
  BusinessInput, ChecklistUpdate, ClientInput, InvoiceInput, InvoiceStatusUpdate, JobInput,
  JobStatusUpdate, PhotoInput,
};
use super::cache::{self, ApiQuery};
use super::client::ApiClient;
use super::types::{
  AdminBusiness, Business, ChecklistItem, Client, DashboardStats, Invoice, InvoiceStatus, Job,
  JobPhoto, JobStatus, UserRole,
};
use crate::error::{ApiError, ApiResult};
use crate::query::QueryClient;

/// API client whose reads go through the query cache.
///
/// Reads are addressed by `ApiQuery`; every mutation declares the key
/// families it makes stale and invalidates them once it succeeds.
#[derive(Clone)]
pub struct CachedApiClient {
  inner: ApiClient,
  cache: QueryClient,
}

impl CachedApiClient {
  pub fn new(inner: ApiClient, cache: QueryClient) -> Self {
    Self { inner, cache }
  }

  pub fn api(&self) -> &ApiClient {
    &self.inner
  }

  pub fn cache(&self) -> &QueryClient {
    &self.cache
  }

  async fn read<T>(&self, query: ApiQuery) -> ApiResult<T>
  where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
  {
    let inner = self.inner.clone();
    let path = query.path();
    let result = self
      .cache
      .fetch_query(query.key(), move || {
        let inner = inner.clone();
        let path = path.clone();
        async move { inner.get::<T>(&path).await }
      })
      .await?;

    debug!(query = %query.description(), source = ?result.source, "read");
    Ok(result.data)
  }

  // ==========================================================================
  // Reads
  // ==========================================================================

  pub async fn business(&self) -> ApiResult<Business> {
    self.read(ApiQuery::Business).await
  }

  pub async fn dashboard_stats(&self) -> ApiResult<DashboardStats> {
    self.read(ApiQuery::DashboardStats).await
  }

  /// Jobs visible to `user`, exactly as the server returns them.
  ///
  /// Cleaners only receive their assigned jobs; that scoping is the server's
  /// and no ownership filter is applied here.
  pub async fn jobs(&self, user: &UserRole, status: Option<JobStatus>) -> ApiResult<Vec<Job>> {
    self
      .read(ApiQuery::Jobs {
        user_id: user.id.clone(),
        status,
      })
      .await
  }

  pub async fn job(&self, id: &str) -> ApiResult<Job> {
    let id = path_segment(id)?;
    self.read(ApiQuery::JobDetail { id: id.to_string() }).await
  }

  pub async fn clients(&self) -> ApiResult<Vec<Client>> {
    self.read(ApiQuery::Clients).await
  }

  pub async fn client(&self, id: &str) -> ApiResult<Client> {
    let id = path_segment(id)?;
    self.read(ApiQuery::ClientDetail { id: id.to_string() }).await
  }

  pub async fn invoices(&self, status: Option<InvoiceStatus>) -> ApiResult<Vec<Invoice>> {
    self.read(ApiQuery::Invoices { status }).await
  }

  pub async fn admin_businesses(&self) -> ApiResult<Vec<AdminBusiness>> {
    self.read(ApiQuery::AdminBusinesses).await
  }

  // ==========================================================================
  // Mutations (not cached, not retried)
  // ==========================================================================

  pub async fn create_client(&self, input: &ClientInput) -> ApiResult<Client> {
    input.validate()?;
    self
      .cache
      .mutate(
        self.inner.post("/clients", input),
        &[cache::root(cache::CLIENTS), cache::root(cache::DASHBOARD_STATS)],
      )
      .await
  }

  pub async fn update_client(&self, id: &str, input: &ClientInput) -> ApiResult<Client> {
    let id = path_segment(id)?;
    input.validate()?;
    self
      .cache
      .mutate(
        self.inner.put(&format!("/clients/{}", id), input),
        &[cache::root(cache::CLIENTS)],
      )
      .await
  }

  pub async fn delete_client(&self, id: &str) -> ApiResult<()> {
    let id = path_segment(id)?;
    self
      .cache
      .mutate(
        self.inner.delete(&format!("/clients/{}", id)),
        &[cache::root(cache::CLIENTS), cache::root(cache::DASHBOARD_STATS)],
      )
      .await
  }

  pub async fn create_job(&self, input: &JobInput) -> ApiResult<Job> {
    input.validate()?;
    self
      .cache
      .mutate(
        self.inner.post("/jobs", input),
        &[cache::root(cache::JOBS), cache::root(cache::DASHBOARD_STATS)],
      )
      .await
  }

  /// Delete a job that has not started yet.
  ///
  /// Any status other than SCHEDULED is rejected before a request is made.
  pub async fn delete_job(&self, job: &Job) -> ApiResult<()> {
    if !job.is_deletable() {
      return Err(ApiError::validation(format!(
        "only scheduled jobs can be deleted, job {} is {}",
        job.id, job.status
      )));
    }
    let id = path_segment(&job.id)?;

    self
      .cache
      .mutate(
        self.inner.delete::<()>(&format!("/jobs/{}", id)),
        &[cache::root(cache::JOBS), cache::root(cache::DASHBOARD_STATS)],
      )
      .await?;
    info!(job = %job.id, "job deleted");
    Ok(())
  }

  /// Move a job through its lifecycle (start, complete, cancel).
  pub async fn set_job_status(&self, id: &str, status: JobStatus) -> ApiResult<Job> {
    let id = path_segment(id)?;
    self
      .cache
      .mutate(
        self
          .inner
          .put(&format!("/jobs/{}/status", id), &JobStatusUpdate { status }),
        &[cache::root(cache::JOBS), cache::root(cache::DASHBOARD_STATS)],
      )
      .await
  }

  pub async fn set_checklist_item(
    &self,
    job_id: &str,
    item_id: &str,
    completed: bool,
  ) -> ApiResult<ChecklistItem> {
    let job_id = path_segment(job_id)?;
    let item_id = path_segment(item_id)?;
    self
      .cache
      .mutate(
        self.inner.put(
          &format!("/jobs/{}/checklist/{}", job_id, item_id),
          &ChecklistUpdate { completed },
        ),
        &[cache::root(cache::JOBS)],
      )
      .await
  }

  pub async fn add_job_photo(&self, job_id: &str, photo: &PhotoInput) -> ApiResult<JobPhoto> {
    let job_id = path_segment(job_id)?;
    if photo.url.trim().is_empty() {
      return Err(ApiError::validation("photo URL is required"));
    }
    self
      .cache
      .mutate(
        self.inner.post(&format!("/jobs/{}/photos", job_id), photo),
        &[cache::root(cache::JOBS)],
      )
      .await
  }

  pub async fn create_invoice(&self, input: &InvoiceInput) -> ApiResult<Invoice> {
    input.validate()?;
    self
      .cache
      .mutate(
        self.inner.post("/invoices", input),
        &[cache::root(cache::INVOICES), cache::root(cache::DASHBOARD_STATS)],
      )
      .await
  }

  pub async fn update_invoice_status(&self, id: &str, status: InvoiceStatus) -> ApiResult<Invoice> {
    let id = path_segment(id)?;
    self
      .cache
      .mutate(
        self
          .inner
          .put(&format!("/invoices/{}", id), &InvoiceStatusUpdate { status }),
        &[cache::root(cache::INVOICES), cache::root(cache::DASHBOARD_STATS)],
      )
      .await
  }

  pub async fn update_business(&self, input: &BusinessInput) -> ApiResult<Business> {
    input.validate()?;
    self
      .cache
      .mutate(self.inner.put("/business", input), &[cache::root(cache::BUSINESS)])
      .await
  }

  /// Whether the cached entry for `query` waits for a refetch.
  pub fn is_invalidated(&self, query: &ApiQuery) -> bool {
    self
      .cache
      .entry_state(&query.key())
      .map(|s| s.is_invalidated)
      .unwrap_or(false)
  }
}

/// Reject ids that would change the request path.
fn path_segment(id: &str) -> ApiResult<&str> {
  let id = id.trim();
  if id.is_empty() || id.contains(['/', '?', '#', '%']) {
    return Err(ApiError::validation(format!("invalid id: '{}'", id)));
  }
  Ok(id)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::types::Role;
  use crate::auth::MemorySessionStore;
  use crate::query::{QueryOptions, RetryPolicy};
  use serde_json::{json, Value};
  use std::sync::Arc;
  use std::time::Duration;
  use wiremock::matchers::{body_json, method, path, query_param};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn job_json(id: &str, status: &str, cleaner: &str) -> Value {
    json!({
      "id": id,
      "status": status,
      "scheduledAt": "2026-10-20T09:00:00Z",
      "client": {"id": "c1", "name": "Acme"},
      "cleanerId": cleaner,
    })
  }

  fn cleaner() -> UserRole {
    UserRole {
      id: "cleaner-1".into(),
      email: "sam@clenvora.test".into(),
      role: Role::Cleaner,
    }
  }

  fn fast_retry() -> QueryOptions {
    QueryOptions {
      retry: RetryPolicy {
        max_retries: 2,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
      },
      ..QueryOptions::default()
    }
  }

  fn api_for(server: &MockServer) -> CachedApiClient {
    let inner = ApiClient::new(&server.uri(), Arc::new(MemorySessionStore::with_token("t"))).unwrap();
    CachedApiClient::new(inner, QueryClient::new(fast_retry()))
  }

  #[tokio::test]
  async fn test_cleaner_jobs_render_exactly_what_server_returns() {
    let server = MockServer::start().await;
    // The server decides scope; a job with another cleaner id is still shown as returned
    let body = json!([
      job_json("j1", "SCHEDULED", "cleaner-1"),
      job_json("j2", "IN_PROGRESS", "cleaner-1"),
      job_json("j3", "COMPLETED", "someone-else"),
    ]);
    Mock::given(method("GET"))
      .and(path("/jobs"))
      .respond_with(ResponseTemplate::new(200).set_body_json(body))
      .expect(1)
      .mount(&server)
      .await;

    let api = api_for(&server);
    let jobs = api.jobs(&cleaner(), None).await.unwrap();
    let ids: Vec<_> = jobs.iter().map(|j| j.id.as_str()).collect();
    assert_eq!(ids, ["j1", "j2", "j3"]);

    // Second read is a cache hit
    api.jobs(&cleaner(), None).await.unwrap();
  }

  #[tokio::test]
  async fn test_status_filter_is_sent_and_cached_separately() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/jobs"))
      .and(query_param("status", "SCHEDULED"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([job_json("j1", "SCHEDULED", "cleaner-1")])))
      .expect(1)
      .mount(&server)
      .await;
    Mock::given(method("GET"))
      .and(path("/jobs"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
      .expect(1)
      .mount(&server)
      .await;

    let api = api_for(&server);
    let scheduled = api.jobs(&cleaner(), Some(JobStatus::Scheduled)).await.unwrap();
    let all = api.jobs(&cleaner(), None).await.unwrap();
    assert_eq!(scheduled.len(), 1);
    assert!(all.is_empty());
  }

  #[tokio::test]
  async fn test_delete_scheduled_job_invalidates_jobs_and_stats() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/jobs"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([job_json("j1", "SCHEDULED", "cleaner-1")])))
      .expect(2)
      .mount(&server)
      .await;
    Mock::given(method("GET"))
      .and(path("/dashboard/stats"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({"totalClients": 3})))
      .mount(&server)
      .await;
    Mock::given(method("GET"))
      .and(path("/clients"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
      .mount(&server)
      .await;
    Mock::given(method("DELETE"))
      .and(path("/jobs/j1"))
      .respond_with(ResponseTemplate::new(204))
      .expect(1)
      .mount(&server)
      .await;

    let api = api_for(&server);
    let jobs = api.jobs(&cleaner(), None).await.unwrap();
    assert_eq!(api.dashboard_stats().await.unwrap().total_clients, 3);
    api.clients().await.unwrap();

    api.delete_job(&jobs[0]).await.unwrap();

    let jobs_query = ApiQuery::Jobs {
      user_id: "cleaner-1".into(),
      status: None,
    };
    assert!(api.is_invalidated(&jobs_query));
    assert!(api.is_invalidated(&ApiQuery::DashboardStats));
    assert!(!api.is_invalidated(&ApiQuery::Clients));

    // Next read refetches despite being inside the freshness window
    api.jobs(&cleaner(), None).await.unwrap();
    assert!(!api.is_invalidated(&jobs_query));
  }

  #[tokio::test]
  async fn test_delete_started_job_is_rejected_without_request() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
      .respond_with(ResponseTemplate::new(204))
      .expect(0)
      .mount(&server)
      .await;

    let api = api_for(&server);
    for status in ["IN_PROGRESS", "COMPLETED", "CANCELLED"] {
      let job: Job = serde_json::from_value(job_json("j9", status, "cleaner-1")).unwrap();
      let err = api.delete_job(&job).await.unwrap_err();
      assert!(matches!(err, ApiError::Validation(_)), "{} should be rejected", status);
    }
  }

  #[tokio::test]
  async fn test_invalid_client_never_reaches_server() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/clients"))
      .respond_with(ResponseTemplate::new(201))
      .expect(0)
      .mount(&server)
      .await;

    let api = api_for(&server);
    let err = api.create_client(&ClientInput::default()).await.unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));
  }

  #[tokio::test]
  async fn test_checklist_toggle_invalidates_job_detail() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/jobs/j1"))
      .respond_with(ResponseTemplate::new(200).set_body_json(job_json("j1", "IN_PROGRESS", "cleaner-1")))
      .mount(&server)
      .await;
    Mock::given(method("PUT"))
      .and(path("/jobs/j1/checklist/i1"))
      .respond_with(
        ResponseTemplate::new(200).set_body_json(json!({"id": "i1", "label": "Kitchen", "completed": true})),
      )
      .expect(1)
      .mount(&server)
      .await;

    let api = api_for(&server);
    api.job("j1").await.unwrap();
    let item = api.set_checklist_item("j1", "i1", true).await.unwrap();
    assert!(item.completed);
    assert!(api.is_invalidated(&ApiQuery::JobDetail { id: "j1".into() }));
  }

  #[tokio::test]
  async fn test_job_status_change_refreshes_stats() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
      .and(path("/jobs/j1/status"))
      .and(body_json(json!({"status": "COMPLETED"})))
      .respond_with(ResponseTemplate::new(200).set_body_json(job_json("j1", "COMPLETED", "cleaner-1")))
      .expect(1)
      .mount(&server)
      .await;

    let api = api_for(&server);
    api.cache().set_query_data(ApiQuery::DashboardStats.key(), 0u8);
    let job = api.set_job_status("j1", JobStatus::Completed).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert!(api.is_invalidated(&ApiQuery::DashboardStats));
  }

  #[tokio::test]
  async fn test_server_error_is_retried_then_surfaced() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/clients"))
      .respond_with(ResponseTemplate::new(500).set_body_json(json!({"message": "db down"})))
      .expect(3)
      .mount(&server)
      .await;

    let api = api_for(&server);
    let err = api.clients().await.unwrap_err();
    assert_eq!(err, ApiError::http(500, "db down"));
  }

  #[tokio::test]
  async fn test_not_found_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/clients/missing"))
      .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Client not found"})))
      .expect(1)
      .mount(&server)
      .await;

    let api = api_for(&server);
    let err = api.client("missing").await.unwrap_err();
    assert_eq!(err.status(), Some(404));
  }

  #[test]
  fn test_path_segment_rejects_traversal() {
    assert!(path_segment("../admin").is_err());
    assert!(path_segment("j1?x=1").is_err());
    assert!(path_segment("").is_err());
    assert_eq!(path_segment(" j1 ").unwrap(), "j1");
  }
}

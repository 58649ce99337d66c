//! Polling observer over one cached query.
//!
//! Views driven by an event loop tick cannot await a read. A `Query<T>` runs
//! the read through its `QueryClient` on a background task and `poll` picks up
//! the outcome, so several observers of one key still share a single fetch.
//!
//! ```ignore
//! let mut clients = Query::new(queries.clone(), ApiQuery::Clients.key(), move || {
//!     let api = api.clone();
//!     async move { api.get::<Vec<Client>>("/clients").await }
//! });
//! clients.fetch();
//!
//! // each tick
//! if clients.poll() {
//!     redraw(clients.state());
//! }
//! ```

use futures::future::{BoxFuture, FutureExt};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::oneshot;

use super::client::QueryClient;
use super::key::QueryKey;
use crate::error::{ApiError, ApiResult};

#[derive(Debug, Clone)]
pub enum QueryState<T> {
  Idle,
  Loading,
  Success(T),
  /// Retries were exhausted, or the failure was not retryable
  Error(ApiError),
}

type Fetcher<T> = Arc<dyn Fn() -> BoxFuture<'static, ApiResult<T>> + Send + Sync>;

pub struct Query<T> {
  client: QueryClient,
  key: QueryKey,
  fetcher: Fetcher<T>,
  state: QueryState<T>,
  pending: Option<oneshot::Receiver<ApiResult<T>>>,
}

impl<T: Clone + Send + Sync + 'static> Query<T> {
  pub fn new<F, Fut>(client: QueryClient, key: QueryKey, fetcher: F) -> Self
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ApiResult<T>> + Send + 'static,
  {
    Self {
      client,
      key,
      fetcher: Arc::new(move || fetcher().boxed()),
      state: QueryState::Idle,
      pending: None,
    }
  }

  pub fn key(&self) -> &QueryKey {
    &self.key
  }

  pub fn state(&self) -> &QueryState<T> {
    &self.state
  }

  /// True when the cache would refetch this key on the next read.
  pub fn is_stale(&self) -> bool {
    let stale_time = self.client.options().stale_time;
    self.client.entry_state(&self.key).map_or(true, |entry| {
      entry.is_invalidated || entry.fetched_at.map_or(true, |at| at.elapsed() > stale_time)
    })
  }

  /// Start a read unless one is already pending.
  pub fn fetch(&mut self) {
    if !matches!(self.state, QueryState::Loading) {
      self.spawn_read();
    }
  }

  /// Invalidate the key and read again; a pending result is dropped.
  pub fn refetch(&mut self) {
    self.client.invalidate(&self.key);
    self.spawn_read();
  }

  /// Returns `true` when the state changed.
  pub fn poll(&mut self) -> bool {
    let Some(pending) = self.pending.as_mut() else {
      return false;
    };
    let result = match pending.try_recv() {
      Ok(result) => result,
      Err(oneshot::error::TryRecvError::Empty) => return false,
      Err(oneshot::error::TryRecvError::Closed) => {
        Err(ApiError::Network("read ended without a result".to_string()))
      }
    };

    self.pending = None;
    self.state = match result {
      Ok(data) => QueryState::Success(data),
      Err(err) => QueryState::Error(err),
    };
    true
  }

  fn spawn_read(&mut self) {
    let (tx, rx) = oneshot::channel();
    let client = self.client.clone();
    let key = self.key.clone();
    let fetcher = Arc::clone(&self.fetcher);

    tokio::spawn(async move {
      let result = client
        .fetch_query(key, move || fetcher())
        .await
        .map(|read| read.data);
      let _ = tx.send(result);
    });

    self.pending = Some(rx);
    self.state = QueryState::Loading;
  }
}

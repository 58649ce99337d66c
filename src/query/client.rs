//! In-memory query cache that orchestrates freshness, de-duplication and retries.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::key::QueryKey;
use super::retry::RetryPolicy;
use crate::error::{ApiError, ApiResult};

type AnyData = Arc<dyn Any + Send + Sync>;
type SharedFetch = Shared<BoxFuture<'static, ApiResult<AnyData>>>;
type Fetcher = Arc<dyn Fn() -> BoxFuture<'static, ApiResult<AnyData>> + Send + Sync>;

/// Tunables shared by every query in one client.
#[derive(Debug, Clone)]
pub struct QueryOptions {
  /// How long fetched data is served without touching the network
  pub stale_time: Duration,
  pub retry: RetryPolicy,
  pub refetch_on_focus: bool,
  pub refetch_on_reconnect: bool,
}

impl Default for QueryOptions {
  fn default() -> Self {
    Self {
      stale_time: Duration::from_secs(60),
      retry: RetryPolicy::default(),
      refetch_on_focus: true,
      refetch_on_reconnect: true,
    }
  }
}

/// Indicates where returned data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fetched (or joined an in-flight fetch) for this read
  Network,
  /// Served from cache inside the freshness window
  CacheFresh,
  /// Served from cache past the freshness window, a background refetch is running
  CacheStale,
}

/// Result from a cache read, including metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  pub data: T,
  pub source: CacheSource,
  /// When the returned data was fetched, for cached reads
  pub fetched_at: Option<Instant>,
}

impl<T> CacheResult<T> {
  fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      fetched_at: None,
    }
  }

  fn from_cache(data: T, fetched_at: Instant, is_stale: bool) -> Self {
    Self {
      data,
      source: if is_stale {
        CacheSource::CacheStale
      } else {
        CacheSource::CacheFresh
      },
      fetched_at: Some(fetched_at),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
  /// No fetch has completed yet
  Pending,
  Success,
  /// Last fetch failed; earlier data, if any, is kept
  Error,
}

/// Snapshot of one cache entry, for inspection and tests.
#[derive(Debug, Clone)]
pub struct EntryState {
  pub status: EntryStatus,
  pub has_data: bool,
  pub is_fetching: bool,
  pub is_invalidated: bool,
  pub fetched_at: Option<Instant>,
  pub error: Option<ApiError>,
  /// Number of network fetches started for this key
  pub fetch_count: u32,
}

struct Entry {
  data: Option<AnyData>,
  fetched_at: Option<Instant>,
  status: EntryStatus,
  error: Option<ApiError>,
  invalidated: bool,
  /// Bumped whenever an in-flight fetch is superseded; stale completions are dropped
  generation: u64,
  in_flight: Option<SharedFetch>,
  fetcher: Option<Fetcher>,
  fetch_count: u32,
}

impl Entry {
  fn new() -> Self {
    Self {
      data: None,
      fetched_at: None,
      status: EntryStatus::Pending,
      error: None,
      invalidated: false,
      generation: 0,
      in_flight: None,
      fetcher: None,
      fetch_count: 0,
    }
  }

  fn is_stale(&self, stale_time: Duration) -> bool {
    self.invalidated
      || self
        .fetched_at
        .map(|t| t.elapsed() > stale_time)
        .unwrap_or(true)
  }

  fn snapshot(&self) -> EntryState {
    EntryState {
      status: self.status,
      has_data: self.data.is_some(),
      is_fetching: self.in_flight.is_some(),
      is_invalidated: self.invalidated,
      fetched_at: self.fetched_at,
      error: self.error.clone(),
      fetch_count: self.fetch_count,
    }
  }
}

struct Inner {
  entries: Mutex<HashMap<QueryKey, Entry>>,
  options: QueryOptions,
}

impl Inner {
  fn lock(&self) -> MutexGuard<'_, HashMap<QueryKey, Entry>> {
    self.entries.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Record the outcome of a fetch, unless it was superseded or the cache was cleared.
  fn complete(&self, key: &QueryKey, generation: u64, result: &ApiResult<AnyData>) {
    let mut entries = self.lock();
    let Some(entry) = entries.get_mut(key) else {
      debug!(%key, "fetch finished after cache clear, discarding");
      return;
    };
    if entry.generation != generation {
      debug!(%key, "fetch superseded, discarding result");
      return;
    }

    entry.in_flight = None;
    match result {
      Ok(data) => {
        entry.data = Some(Arc::clone(data));
        entry.fetched_at = Some(Instant::now());
        entry.status = EntryStatus::Success;
        entry.error = None;
        entry.invalidated = false;
      }
      Err(err) => {
        entry.status = EntryStatus::Error;
        entry.error = Some(err.clone());
      }
    }
  }
}

/// Process-local query cache.
///
/// Cloning is cheap and every clone shares the same entries, so one client is
/// handed to whatever composes the views. At most one fetch per key is in flight;
/// concurrent readers await the same shared future.
#[derive(Clone)]
pub struct QueryClient {
  inner: Arc<Inner>,
}

impl Default for QueryClient {
  fn default() -> Self {
    Self::new(QueryOptions::default())
  }
}

impl QueryClient {
  pub fn new(options: QueryOptions) -> Self {
    Self {
      inner: Arc::new(Inner {
        entries: Mutex::new(HashMap::new()),
        options,
      }),
    }
  }

  pub fn options(&self) -> &QueryOptions {
    &self.inner.options
  }

  /// Read `key` with stale-while-revalidate semantics.
  ///
  /// 1. Fresh data is returned without a network call
  /// 2. Stale data is returned at once while one background refetch runs
  /// 3. Missing or invalidated data is fetched (or an in-flight fetch joined) and awaited
  pub async fn fetch_query<T, F, Fut>(&self, key: QueryKey, fetcher: F) -> ApiResult<CacheResult<T>>
  where
    T: Clone + Send + Sync + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ApiResult<T>> + Send + 'static,
  {
    let fetcher: Fetcher = Arc::new(move || {
      let fut = fetcher();
      async move { fut.await.map(|data| Arc::new(data) as AnyData) }.boxed()
    });

    let pending = {
      let mut entries = self.inner.lock();
      let entry = entries.entry(key.clone()).or_insert_with(Entry::new);
      entry.fetcher = Some(Arc::clone(&fetcher));

      let cached = match (&entry.data, entry.fetched_at) {
        (Some(data), Some(fetched_at)) if !entry.invalidated => {
          Some((downcast::<T>(&key, data)?, fetched_at))
        }
        _ => None,
      };

      if let Some((data, fetched_at)) = cached {
        if !entry.is_stale(self.inner.options.stale_time) {
          debug!(%key, "cache hit");
          return Ok(CacheResult::from_cache(data, fetched_at, false));
        }

        if entry.in_flight.is_none() {
          debug!(%key, "stale, revalidating in background");
          let fetch = start_fetch(&self.inner, &key, entry, fetcher);
          tokio::spawn(fetch);
        }
        return Ok(CacheResult::from_cache(data, fetched_at, true));
      }

      match &entry.in_flight {
        Some(fetch) => {
          debug!(%key, "joining in-flight fetch");
          fetch.clone()
        }
        None => {
          debug!(%key, invalidated = entry.invalidated, "cache miss");
          start_fetch(&self.inner, &key, entry, fetcher)
        }
      }
    };

    let data = pending.await?;
    Ok(CacheResult::from_network(downcast::<T>(&key, &data)?))
  }

  /// Mark every entry under `prefix` as invalid.
  ///
  /// The next read of a matching key ignores the freshness window and refetches.
  /// In-flight fetches for those keys are detached so their results never land.
  pub fn invalidate(&self, prefix: &QueryKey) -> usize {
    let mut entries = self.inner.lock();
    let mut count = 0;
    for (key, entry) in entries.iter_mut().filter(|(k, _)| k.starts_with(prefix)) {
      entry.invalidated = true;
      entry.in_flight = None;
      entry.generation += 1;
      debug!(%key, "invalidated");
      count += 1;
    }
    info!(%prefix, count, "invalidated queries");
    count
  }

  /// Run a mutation once (no retries) and invalidate `invalidates` on success.
  pub async fn mutate<T, Fut>(&self, mutation: Fut, invalidates: &[QueryKey]) -> ApiResult<T>
  where
    Fut: Future<Output = ApiResult<T>>,
  {
    let result = mutation.await;
    match &result {
      Ok(_) => {
        for key in invalidates {
          self.invalidate(key);
        }
      }
      Err(err) => warn!(error = %err, "mutation failed, cache left untouched"),
    }
    result
  }

  /// Store data for `key` as if it had just been fetched.
  pub fn set_query_data<T>(&self, key: QueryKey, data: T)
  where
    T: Send + Sync + 'static,
  {
    let mut entries = self.inner.lock();
    let entry = entries.entry(key).or_insert_with(Entry::new);
    entry.data = Some(Arc::new(data));
    entry.fetched_at = Some(Instant::now());
    entry.status = EntryStatus::Success;
    entry.error = None;
    entry.invalidated = false;
  }

  /// Cached data for `key` regardless of freshness.
  pub fn get_query_data<T>(&self, key: &QueryKey) -> Option<T>
  where
    T: Clone + 'static,
  {
    let entries = self.inner.lock();
    let data = entries.get(key)?.data.as_ref()?;
    data.downcast_ref::<T>().cloned()
  }

  pub fn entry_state(&self, key: &QueryKey) -> Option<EntryState> {
    self.inner.lock().get(key).map(Entry::snapshot)
  }

  /// Window regained focus: refetch stale entries when enabled.
  pub fn on_focus(&self) -> usize {
    if !self.inner.options.refetch_on_focus {
      return 0;
    }
    self.refetch_stale()
  }

  /// Network came back: refetch stale entries when enabled.
  pub fn on_reconnect(&self) -> usize {
    if !self.inner.options.refetch_on_reconnect {
      return 0;
    }
    self.refetch_stale()
  }

  /// Start a background refetch for every stale, invalidated or failed entry
  /// that is not already fetching. Returns how many were started.
  pub fn refetch_stale(&self) -> usize {
    let stale_time = self.inner.options.stale_time;
    let fetches: Vec<SharedFetch> = {
      let mut entries = self.inner.lock();
      entries
        .iter_mut()
        .filter(|(_, e)| e.in_flight.is_none() && e.is_stale(stale_time))
        .filter_map(|(key, entry)| {
          let fetcher = entry.fetcher.clone()?;
          Some(start_fetch(&self.inner, key, entry, fetcher))
        })
        .collect()
    };

    let count = fetches.len();
    for fetch in fetches {
      tokio::spawn(fetch);
    }
    if count > 0 {
      info!(count, "refetching stale queries");
    }
    count
  }

  /// Drop every entry. Used on sign-out so no data outlives its session.
  pub fn clear(&self) {
    let mut entries = self.inner.lock();
    let count = entries.len();
    entries.clear();
    info!(count, "query cache cleared");
  }

  pub fn len(&self) -> usize {
    self.inner.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

/// Create the shared fetch for `entry`. Caller holds the entries lock.
fn start_fetch(
  inner: &Arc<Inner>,
  key: &QueryKey,
  entry: &mut Entry,
  fetcher: Fetcher,
) -> SharedFetch {
  entry.generation += 1;
  entry.fetch_count += 1;
  let generation = entry.generation;
  let retry = inner.options.retry;
  let weak: Weak<Inner> = Arc::downgrade(inner);
  let key = key.clone();

  let fetch = async move {
    let result = retry.run(&key.to_string(), || fetcher()).await;
    if let Some(inner) = weak.upgrade() {
      inner.complete(&key, generation, &result);
    }
    result
  }
  .boxed()
  .shared();

  entry.in_flight = Some(fetch.clone());
  fetch
}

fn downcast<T: Clone + 'static>(key: &QueryKey, data: &AnyData) -> ApiResult<T> {
  data
    .downcast_ref::<T>()
    .cloned()
    .ok_or_else(|| ApiError::KeyConflict(key.to_string()))
}

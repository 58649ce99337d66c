//! Who is the current user and what may they do.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::session::{AuthEvent, SessionStore};
use crate::api::{ApiClient, ApiQuery, Role, UserRole};
use crate::error::{ApiError, ApiResult};
use crate::query::{Query, QueryClient, QueryState};

pub const DEFAULT_ROLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of role resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
  Unauthenticated,
  Authenticated(UserRole),
}

impl AuthState {
  pub fn user(&self) -> Option<&UserRole> {
    match self {
      AuthState::Authenticated(user) => Some(user),
      AuthState::Unauthenticated => None,
    }
  }

  pub fn role(&self) -> Option<Role> {
    self.user().map(|u| u.role)
  }
}

impl From<Option<UserRole>> for AuthState {
  fn from(user: Option<UserRole>) -> Self {
    match user {
      Some(user) => AuthState::Authenticated(user),
      None => AuthState::Unauthenticated,
    }
  }
}

/// Look up `/auth/me` for the current session within `timeout`.
///
/// `Ok(None)` means there is no live session.
pub async fn lookup_user(
  sessions: &dyn SessionStore,
  api: &ApiClient,
  timeout: Duration,
) -> ApiResult<Option<UserRole>> {
  if sessions.get_session().await.is_none() {
    debug!("no session");
    return Ok(None);
  }

  let path = ApiQuery::CurrentUser.path();
  match tokio::time::timeout(timeout, api.get::<UserRole>(&path)).await {
    Ok(result) => result.map(Some),
    Err(_) => Err(ApiError::Timeout(timeout)),
  }
}

/// Server-side resolver used by route guards.
///
/// Any failure, including a slow `/auth/me`, resolves to `Unauthenticated`
/// so a broken lookup denies access instead of blocking navigation.
#[derive(Clone)]
pub struct RoleResolver {
  sessions: Arc<dyn SessionStore>,
  api: ApiClient,
  timeout: Duration,
}

impl RoleResolver {
  pub fn new(sessions: Arc<dyn SessionStore>, api: ApiClient) -> Self {
    Self {
      sessions,
      api,
      timeout: DEFAULT_ROLE_TIMEOUT,
    }
  }

  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  /// Resolve with the failure reason, for callers that want to report it.
  pub async fn try_resolve(&self) -> ApiResult<AuthState> {
    lookup_user(self.sessions.as_ref(), &self.api, self.timeout)
      .await
      .map(AuthState::from)
  }

  pub async fn resolve(&self) -> AuthState {
    match self.try_resolve().await {
      Ok(state) => state,
      Err(err) => {
        warn!(error = %err, "role lookup failed, treating user as unauthenticated");
        AuthState::Unauthenticated
      }
    }
  }
}

/// Client-side handle on the current user, backed by the query cache.
///
/// The cache sees lookup failures, so transient ones are retried and never
/// stored as a signed-out result. `state` still fails closed once retries
/// are exhausted.
pub struct CurrentUser {
  query: Query<Option<UserRole>>,
}

impl CurrentUser {
  pub fn new(
    sessions: Arc<dyn SessionStore>,
    api: ApiClient,
    cache: QueryClient,
    timeout: Duration,
  ) -> Self {
    let query = Query::new(cache, ApiQuery::CurrentUser.key(), move || {
      let sessions = Arc::clone(&sessions);
      let api = api.clone();
      async move { lookup_user(sessions.as_ref(), &api, timeout).await }
    });
    Self { query }
  }

  pub fn fetch(&mut self) {
    self.query.fetch();
  }

  pub fn refetch(&mut self) {
    self.query.refetch();
  }

  /// Returns `true` when the state changed.
  pub fn poll(&mut self) -> bool {
    let changed = self.query.poll();
    if let (true, QueryState::Error(err)) = (changed, self.query.state()) {
      warn!(error = %err, "current user lookup failed, treating user as signed out");
    }
    changed
  }

  pub fn is_loading(&self) -> bool {
    matches!(self.query.state(), QueryState::Idle | QueryState::Loading)
  }

  /// Resolved state; `None` while still loading.
  pub fn state(&self) -> Option<AuthState> {
    match self.query.state() {
      QueryState::Success(user) => Some(AuthState::from(user.clone())),
      QueryState::Error(_) => Some(AuthState::Unauthenticated),
      QueryState::Idle | QueryState::Loading => None,
    }
  }

  pub fn role(&self) -> Option<Role> {
    self.state().and_then(|s| s.role())
  }

  /// Fetch and wait until the lookup settles.
  pub async fn resolve(&mut self) -> AuthState {
    self.fetch();
    loop {
      self.poll();
      if let Some(state) = self.state() {
        return state;
      }
      tokio::time::sleep(Duration::from_millis(5)).await;
    }
  }
}

/// Clear `cache` whenever the signed-in user changes, so nothing fetched for
/// one session is served to the next.
pub fn clear_cache_on_auth_change(
  mut events: watch::Receiver<AuthEvent>,
  cache: QueryClient,
) -> JoinHandle<()> {
  tokio::spawn(async move {
    while events.changed().await.is_ok() {
      let event = events.borrow_and_update().clone();
      match event {
        AuthEvent::SignedIn | AuthEvent::SignedOut => {
          info!(?event, "auth state changed, clearing query cache");
          cache.clear();
        }
        AuthEvent::Initial => {}
      }
    }
  })
}

//! Session storage and auth state change notifications.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::TokenProvider;

/// Session issued by the auth provider. Opaque to this crate beyond its expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
  pub access_token: String,
  pub refresh_token: Option<String>,
  pub expires_at: DateTime<Utc>,
}

impl Session {
  pub fn new(access_token: impl Into<String>, ttl: Duration) -> Self {
    Self {
      access_token: access_token.into(),
      refresh_token: None,
      expires_at: Utc::now()
        .checked_add_signed(ttl)
        .unwrap_or(DateTime::<Utc>::MAX_UTC),
    }
  }

  pub fn is_expired(&self) -> bool {
    self.is_expired_at(Utc::now())
  }

  pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
    now >= self.expires_at
  }
}

/// Auth state transitions broadcast to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
  /// Initial value before anything happened
  Initial,
  SignedIn,
  SignedOut,
}

/// Where the current session lives.
///
/// Expired sessions are reported as absent.
#[async_trait]
pub trait SessionStore: Send + Sync {
  async fn get_session(&self) -> Option<Session>;

  async fn set_session(&self, session: Session) -> Result<()>;

  async fn sign_out(&self) -> Result<()>;

  /// Receive auth state changes.
  fn subscribe(&self) -> watch::Receiver<AuthEvent>;
}

fn live(session: Option<Session>) -> Option<Session> {
  match session {
    Some(s) if s.is_expired() => {
      debug!(expires_at = %s.expires_at, "session expired");
      None
    }
    other => other,
  }
}

/// Session held in memory only.
pub struct MemorySessionStore {
  session: Mutex<Option<Session>>,
  events: watch::Sender<AuthEvent>,
}

impl Default for MemorySessionStore {
  fn default() -> Self {
    Self::new(None)
  }
}

impl MemorySessionStore {
  pub fn new(session: Option<Session>) -> Self {
    let (events, _) = watch::channel(AuthEvent::Initial);
    Self {
      session: Mutex::new(session),
      events,
    }
  }

  /// Store holding a token valid for one hour.
  pub fn with_token(token: impl Into<String>) -> Self {
    Self::new(Some(Session::new(token, Duration::hours(1))))
  }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
  async fn get_session(&self) -> Option<Session> {
    let session = self
      .session
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .clone();
    live(session)
  }

  async fn set_session(&self, session: Session) -> Result<()> {
    *self.session.lock().unwrap_or_else(PoisonError::into_inner) = Some(session);
    self.events.send_replace(AuthEvent::SignedIn);
    Ok(())
  }

  async fn sign_out(&self) -> Result<()> {
    *self.session.lock().unwrap_or_else(PoisonError::into_inner) = None;
    self.events.send_replace(AuthEvent::SignedOut);
    Ok(())
  }

  fn subscribe(&self) -> watch::Receiver<AuthEvent> {
    self.events.subscribe()
  }
}

#[async_trait]
impl TokenProvider for MemorySessionStore {
  async fn access_token(&self) -> Option<String> {
    self.get_session().await.map(|s| s.access_token)
  }
}

/// Session persisted as JSON on disk, so it survives between CLI invocations.
pub struct FileSessionStore {
  path: PathBuf,
  events: watch::Sender<AuthEvent>,
}

impl FileSessionStore {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    let (events, _) = watch::channel(AuthEvent::Initial);
    Self {
      path: path.into(),
      events,
    }
  }

  /// Store at the default location under the user data directory.
  pub fn open_default() -> Result<Self> {
    Ok(Self::new(Self::default_path()?))
  }

  fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("clenvora").join("session.json"))
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  async fn read(&self) -> Option<Session> {
    let contents = match tokio::fs::read(&self.path).await {
      Ok(contents) => contents,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
      Err(e) => {
        warn!(path = %self.path.display(), error = %e, "failed to read session file");
        return None;
      }
    };

    match serde_json::from_slice(&contents) {
      Ok(session) => Some(session),
      Err(e) => {
        warn!(path = %self.path.display(), error = %e, "ignoring corrupt session file");
        None
      }
    }
  }
}

#[async_trait]
impl SessionStore for FileSessionStore {
  async fn get_session(&self) -> Option<Session> {
    live(self.read().await)
  }

  async fn set_session(&self, session: Session) -> Result<()> {
    if let Some(parent) = self.path.parent() {
      tokio::fs::create_dir_all(parent)
        .await
        .map_err(|e| eyre!("Failed to create session directory: {}", e))?;
    }

    let data = serde_json::to_vec_pretty(&session)
      .map_err(|e| eyre!("Failed to serialize session: {}", e))?;
    tokio::fs::write(&self.path, data)
      .await
      .map_err(|e| eyre!("Failed to write session file {}: {}", self.path.display(), e))?;

    info!(expires_at = %session.expires_at, "session stored");
    self.events.send_replace(AuthEvent::SignedIn);
    Ok(())
  }

  async fn sign_out(&self) -> Result<()> {
    match tokio::fs::remove_file(&self.path).await {
      Ok(()) => {}
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
      Err(e) => {
        return Err(eyre!(
          "Failed to remove session file {}: {}",
          self.path.display(),
          e
        ))
      }
    }

    info!("signed out");
    self.events.send_replace(AuthEvent::SignedOut);
    Ok(())
  }

  fn subscribe(&self) -> watch::Receiver<AuthEvent> {
    self.events.subscribe()
  }
}

#[async_trait]
impl TokenProvider for FileSessionStore {
  async fn access_token(&self) -> Option<String> {
    self.get_session().await.map(|s| s.access_token)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_memory_store_lifecycle() {
    let store = MemorySessionStore::default();
    let mut events = store.subscribe();
    assert!(store.get_session().await.is_none());
    assert_eq!(store.access_token().await, None);

    store
      .set_session(Session::new("tok", Duration::minutes(5)))
      .await
      .unwrap();
    assert_eq!(store.access_token().await.as_deref(), Some("tok"));
    events.changed().await.unwrap();
    assert_eq!(*events.borrow_and_update(), AuthEvent::SignedIn);

    store.sign_out().await.unwrap();
    assert!(store.get_session().await.is_none());
    events.changed().await.unwrap();
    assert_eq!(*events.borrow_and_update(), AuthEvent::SignedOut);
  }

  #[test]
  fn test_huge_lifetime_saturates() {
    let session = Session::new("tok", Duration::MAX);
    assert_eq!(session.expires_at, DateTime::<Utc>::MAX_UTC);
    assert!(!session.is_expired());
  }

  #[tokio::test]
  async fn test_expired_session_counts_as_absent() {
    let store = MemorySessionStore::new(Some(Session::new("old", Duration::seconds(-1))));
    assert!(store.get_session().await.is_none());
    assert_eq!(store.access_token().await, None);
  }

  #[tokio::test]
  async fn test_file_store_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileSessionStore::new(dir.path().join("nested").join("session.json"));
    assert!(store.get_session().await.is_none());

    let session = Session::new("file-token", Duration::hours(1));
    store.set_session(session.clone()).await.unwrap();

    let reopened = FileSessionStore::new(store.path().to_path_buf());
    assert_eq!(reopened.get_session().await, Some(session));

    reopened.sign_out().await.unwrap();
    assert!(store.get_session().await.is_none());
    // Signing out twice is fine
    reopened.sign_out().await.unwrap();
  }

  #[tokio::test]
  async fn test_file_store_ignores_corrupt_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    std::fs::write(&path, b"{not json").unwrap();

    let store = FileSessionStore::new(path);
    assert!(store.get_session().await.is_none());
  }
}

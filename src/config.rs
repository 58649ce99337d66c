use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::query::{QueryOptions, RetryPolicy};

pub const DEFAULT_API_URL: &str = "http://localhost:3001";
pub const DEFAULT_UPLOAD_URL: &str = "https://upload.imagekit.io/api/v1/files/upload";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub api: ApiConfig,
  #[serde(default)]
  pub auth: AuthConfig,
  #[serde(default)]
  pub storage: StorageConfig,
  #[serde(default)]
  pub query: QueryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Base URL of the REST API
  pub url: String,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      url: DEFAULT_API_URL.to_string(),
    }
  }
}

/// Hosted auth provider (sessions, sign-out, password reset)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
  pub url: Option<String>,
  pub anon_key: Option<String>,
}

/// Object storage used for job photos
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
  pub public_key: Option<String>,
  /// Public delivery endpoint; uploaded paths resolve under it
  pub url_endpoint: Option<String>,
  #[serde(default = "default_upload_url")]
  pub upload_url: String,
}

impl Default for StorageConfig {
  fn default() -> Self {
    Self {
      public_key: None,
      url_endpoint: None,
      upload_url: default_upload_url(),
    }
  }
}

fn default_upload_url() -> String {
  DEFAULT_UPLOAD_URL.to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
  /// Seconds fetched data is served without a network call
  pub stale_time_secs: u64,
  /// Retries after the first failed attempt
  pub retry: u32,
  pub retry_delay_ms: u64,
  pub max_retry_delay_ms: u64,
  pub refetch_on_focus: bool,
  pub refetch_on_reconnect: bool,
  /// Budget for the `/auth/me` role lookup
  pub role_timeout_secs: u64,
}

impl Default for QueryConfig {
  fn default() -> Self {
    Self {
      stale_time_secs: 60,
      retry: 3,
      retry_delay_ms: 1_000,
      max_retry_delay_ms: 30_000,
      refetch_on_focus: true,
      refetch_on_reconnect: true,
      role_timeout_secs: 5,
    }
  }
}

impl QueryConfig {
  pub fn options(&self) -> QueryOptions {
    QueryOptions {
      stale_time: Duration::from_secs(self.stale_time_secs),
      retry: RetryPolicy {
        max_retries: self.retry,
        base_delay: Duration::from_millis(self.retry_delay_ms),
        max_delay: Duration::from_millis(self.max_retry_delay_ms),
      },
      refetch_on_focus: self.refetch_on_focus,
      refetch_on_reconnect: self.refetch_on_reconnect,
    }
  }

  pub fn role_timeout(&self) -> Duration {
    Duration::from_secs(self.role_timeout_secs)
  }
}

impl Config {
  /// Load configuration from file, then apply environment overrides.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./clenvora.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/clenvora/config.yaml
  ///
  /// Without any file the defaults are used.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Config::default(),
    };
    config.apply_env(|name| std::env::var(name).ok());
    config.validate()?;

    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("clenvora.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("clenvora").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    Ok(serde_yaml::from_str(contents)?)
  }

  /// Override settings from the deployment environment variables.
  pub fn apply_env<F>(&mut self, var: F)
  where
    F: Fn(&str) -> Option<String>,
  {
    if let Some(url) = var("NEXT_PUBLIC_API_URL") {
      self.api.url = url;
    }
    if let Some(url) = var("NEXT_PUBLIC_SUPABASE_URL") {
      self.auth.url = Some(url);
    }
    if let Some(key) = var("NEXT_PUBLIC_SUPABASE_ANON_KEY") {
      self.auth.anon_key = Some(key);
    }
    if let Some(key) = var("NEXT_PUBLIC_IMAGEKIT_PUBLIC_KEY") {
      self.storage.public_key = Some(key);
    }
    if let Some(endpoint) = var("NEXT_PUBLIC_IMAGEKIT_URL_ENDPOINT") {
      self.storage.url_endpoint = Some(endpoint);
    }
  }

  /// Reject URLs that cannot be parsed.
  pub fn validate(&self) -> Result<()> {
    let mut urls = vec![
      ("api.url", self.api.url.as_str()),
      ("storage.upload_url", self.storage.upload_url.as_str()),
    ];
    if let Some(url) = &self.auth.url {
      urls.push(("auth.url", url.as_str()));
    }
    if let Some(url) = &self.storage.url_endpoint {
      urls.push(("storage.url_endpoint", url.as_str()));
    }

    for (field, value) in urls {
      Url::parse(value).map_err(|e| eyre!("Invalid {} '{}': {}", field, value, e))?;
    }
    Ok(())
  }
}

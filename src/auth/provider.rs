//! REST client for the hosted auth provider (`/auth/v1/*`).

use chrono::{Duration, Utc};
use reqwest::{Method, RequestBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use super::session::Session;
use crate::api::error_from_response;
use crate::config::AuthConfig;
use crate::error::{ApiError, ApiResult};

/// User record as the auth provider sees it (no role, that comes from `/auth/me`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderUser {
  pub id: String,
  pub email: Option<String>,
}

#[derive(Serialize)]
struct RecoverRequest<'a> {
  email: &'a str,
}

#[derive(Serialize)]
struct PkceRequest<'a> {
  auth_code: &'a str,
  code_verifier: &'a str,
}

/// Token grant response; `expires_in` is in seconds.
#[derive(Deserialize)]
struct TokenResponse {
  access_token: String,
  refresh_token: Option<String>,
  expires_in: i64,
}

impl TokenResponse {
  fn into_session(self) -> ApiResult<Session> {
    let expires_at = Duration::try_seconds(self.expires_in)
      .and_then(|ttl| Utc::now().checked_add_signed(ttl))
      .ok_or_else(|| ApiError::Decode(format!("expires_in out of range: {}", self.expires_in)))?;
    Ok(Session {
      access_token: self.access_token,
      refresh_token: self.refresh_token,
      expires_at,
    })
  }
}

#[derive(Clone)]
pub struct AuthProvider {
  http: reqwest::Client,
  url: Url,
  anon_key: String,
}

impl AuthProvider {
  pub fn new(url: &str, anon_key: impl Into<String>) -> ApiResult<Self> {
    let url = Url::parse(url)
      .map_err(|e| ApiError::validation(format!("invalid auth URL '{}': {}", url, e)))?;
    Ok(Self {
      http: reqwest::Client::new(),
      url,
      anon_key: anon_key.into(),
    })
  }

  /// Build from config; `None` when the provider is not configured.
  pub fn from_config(config: &AuthConfig) -> ApiResult<Option<Self>> {
    match (&config.url, &config.anon_key) {
      (Some(url), Some(key)) => Self::new(url, key.clone()).map(Some),
      _ => Ok(None),
    }
  }

  fn request(&self, method: Method, path: &str) -> ApiResult<RequestBuilder> {
    let url = self
      .url
      .join(path)
      .map_err(|e| ApiError::validation(format!("invalid auth path '{}': {}", path, e)))?;
    debug!(%method, %url, "auth provider request");
    Ok(self.http.request(method, url).header("apikey", &self.anon_key))
  }

  async fn execute(request: RequestBuilder) -> ApiResult<Vec<u8>> {
    let response = request.send().await?;
    let status = response.status();
    let body = response.bytes().await?;
    if !status.is_success() {
      return Err(error_from_response(status, &body));
    }
    Ok(body.to_vec())
  }

  /// Verify `access_token` with the provider and return its user.
  pub async fn get_user(&self, access_token: &str) -> ApiResult<ProviderUser> {
    let request = self.request(Method::GET, "/auth/v1/user")?.bearer_auth(access_token);
    let body = Self::execute(request).await?;
    Ok(serde_json::from_slice(&body)?)
  }

  /// Trade the code from an `/auth/callback` redirect for a session.
  ///
  /// The caller stores the returned session with `SessionStore::set_session`.
  pub async fn exchange_code_for_session(
    &self,
    auth_code: &str,
    code_verifier: &str,
  ) -> ApiResult<Session> {
    if auth_code.trim().is_empty() {
      return Err(ApiError::validation("auth code is required"));
    }
    let request = self
      .request(Method::POST, "/auth/v1/token")?
      .query(&[("grant_type", "pkce")])
      .json(&PkceRequest {
        auth_code,
        code_verifier,
      });
    let body = Self::execute(request).await?;
    let token: TokenResponse = serde_json::from_slice(&body)?;
    info!("auth code exchanged for session");
    token.into_session()
  }

  /// Revoke the session server-side.
  pub async fn sign_out(&self, access_token: &str) -> ApiResult<()> {
    let request = self.request(Method::POST, "/auth/v1/logout")?.bearer_auth(access_token);
    Self::execute(request).await?;
    info!("session revoked at auth provider");
    Ok(())
  }

  /// Send a password reset email. `redirect_to` is where the emailed link lands.
  pub async fn reset_password_for_email(
    &self,
    email: &str,
    redirect_to: Option<&str>,
  ) -> ApiResult<()> {
    if email.trim().is_empty() {
      return Err(ApiError::validation("email is required"));
    }
    let mut request = self
      .request(Method::POST, "/auth/v1/recover")?
      .json(&RecoverRequest { email });
    if let Some(redirect_to) = redirect_to {
      request = request.query(&[("redirect_to", redirect_to)]);
    }
    Self::execute(request).await?;
    info!("password reset email requested");
    Ok(())
  }
}

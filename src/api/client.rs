use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tracing::debug;
use url::Url;

use super::api_types::ApiErrorBody;
use crate::config::Config;
use crate::error::{ApiError, ApiResult};

/// Source of the bearer token attached to every request.
#[async_trait]
pub trait TokenProvider: Send + Sync {
  /// Current access token, or `None` when signed out.
  async fn access_token(&self) -> Option<String>;
}

/// Authenticated JSON client for the REST API.
///
/// No retries here: the query cache decides what is worth retrying.
#[derive(Clone)]
pub struct ApiClient {
  http: reqwest::Client,
  base_url: Url,
  tokens: Arc<dyn TokenProvider>,
}

impl ApiClient {
  pub fn new(base_url: &str, tokens: Arc<dyn TokenProvider>) -> ApiResult<Self> {
    let base_url = Url::parse(base_url)
      .map_err(|e| ApiError::validation(format!("invalid API URL '{}': {}", base_url, e)))?;

    let http = reqwest::Client::builder()
      .user_agent(concat!("clenvora/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| ApiError::Network(format!("failed to build HTTP client: {}", e)))?;

    Ok(Self {
      http,
      base_url,
      tokens,
    })
  }

  pub fn from_config(config: &Config, tokens: Arc<dyn TokenProvider>) -> ApiResult<Self> {
    Self::new(&config.api.url, tokens)
  }

  pub fn base_url(&self) -> &Url {
    &self.base_url
  }

  pub async fn get<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
    self.send::<(), T>(Method::GET, path, None).await
  }

  pub async fn post<B, T>(&self, path: &str, body: &B) -> ApiResult<T>
  where
    B: Serialize + ?Sized,
    T: DeserializeOwned,
  {
    self.send(Method::POST, path, Some(body)).await
  }

  pub async fn put<B, T>(&self, path: &str, body: &B) -> ApiResult<T>
  where
    B: Serialize + ?Sized,
    T: DeserializeOwned,
  {
    self.send(Method::PUT, path, Some(body)).await
  }

  pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
    self.send::<(), T>(Method::DELETE, path, None).await
  }

  /// Resolve `path` against the base URL, keeping any base path prefix.
  fn url(&self, path: &str) -> ApiResult<Url> {
    let joined = format!(
      "{}/{}",
      self.base_url.as_str().trim_end_matches('/'),
      path.trim_start_matches('/')
    );
    Url::parse(&joined).map_err(|e| ApiError::validation(format!("invalid path '{}': {}", path, e)))
  }

  async fn send<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> ApiResult<T>
  where
    B: Serialize + ?Sized,
    T: DeserializeOwned,
  {
    let url = self.url(path)?;
    let mut request = self.http.request(method.clone(), url.clone());

    match self.tokens.access_token().await {
      Some(token) => request = request.bearer_auth(token),
      None => debug!(%url, "no session, sending request without a token"),
    }
    if let Some(body) = body {
      request = request.json(body);
    }

    debug!(%method, %url, "request");
    let response = request.send().await?;
    let status = response.status();
    let bytes = response.bytes().await?;
    debug!(%method, %url, status = status.as_u16(), "response");

    if !status.is_success() {
      return Err(error_from_response(status, &bytes));
    }

    // 204 and empty bodies decode as JSON null, which fits `()` and `Option<_>`
    let bytes: &[u8] = if bytes.is_empty() { b"null" } else { &bytes };
    Ok(serde_json::from_slice(bytes)?)
  }
}

pub(crate) fn error_from_response(status: StatusCode, body: &[u8]) -> ApiError {
  let message = serde_json::from_slice::<ApiErrorBody>(body)
    .ok()
    .and_then(ApiErrorBody::into_message)
    .or_else(|| {
      let text = String::from_utf8_lossy(body).trim().to_string();
      (!text.is_empty() && text.len() <= 200).then_some(text)
    })
    .unwrap_or_else(|| {
      status
        .canonical_reason()
        .unwrap_or("request failed")
        .to_string()
    });

  ApiError::http(status.as_u16(), message)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::auth::MemorySessionStore;
  use serde_json::{json, Value};
  use wiremock::matchers::{body_json, header, header_exists, method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn client_for(server: &MockServer, tokens: MemorySessionStore) -> ApiClient {
    ApiClient::new(&server.uri(), Arc::new(tokens)).unwrap()
  }

  #[tokio::test]
  async fn test_attaches_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/business"))
      .and(header("authorization", "Bearer secret"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "b1"})))
      .expect(1)
      .mount(&server)
      .await;

    let client = client_for(&server, MemorySessionStore::with_token("secret"));
    let body: Value = client.get("/business").await.unwrap();
    assert_eq!(body["id"], "b1");
  }

  #[tokio::test]
  async fn test_no_token_when_signed_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/business"))
      .and(header_exists("authorization"))
      .respond_with(ResponseTemplate::new(500))
      .expect(0)
      .mount(&server)
      .await;
    Mock::given(method("GET"))
      .and(path("/business"))
      .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "Unauthorized"})))
      .mount(&server)
      .await;

    let client = client_for(&server, MemorySessionStore::default());
    let err = client.get::<Value>("/business").await.unwrap_err();
    assert_eq!(err, ApiError::http(401, "Unauthorized"));
    assert!(err.is_unauthorized());
  }

  #[tokio::test]
  async fn test_error_carries_status_and_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/clients"))
      .and(body_json(json!({"name": "Acme"})))
      .respond_with(ResponseTemplate::new(422).set_body_json(json!({"message": ["email is required"]})))
      .mount(&server)
      .await;

    let client = client_for(&server, MemorySessionStore::with_token("t"));
    let err = client
      .post::<_, Value>("/clients", &json!({"name": "Acme"}))
      .await
      .unwrap_err();
    assert_eq!(err, ApiError::http(422, "email is required"));
    assert!(err.is_client_error());
  }

  #[tokio::test]
  async fn test_error_without_body_uses_reason() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/jobs"))
      .respond_with(ResponseTemplate::new(503))
      .mount(&server)
      .await;

    let client = client_for(&server, MemorySessionStore::with_token("t"));
    let err = client.get::<Value>("/jobs").await.unwrap_err();
    assert_eq!(err, ApiError::http(503, "Service Unavailable"));
    assert!(err.is_retryable());
  }

  #[tokio::test]
  async fn test_empty_success_body() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
      .and(path("/jobs/j1"))
      .respond_with(ResponseTemplate::new(204))
      .mount(&server)
      .await;

    let client = client_for(&server, MemorySessionStore::with_token("t"));
    client.delete::<()>("/jobs/j1").await.unwrap();
  }

  #[tokio::test]
  async fn test_base_path_is_kept() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
      .and(path("/api/v1/jobs/j1/checklist/i1"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
      .mount(&server)
      .await;

    let base = format!("{}/api/v1/", server.uri());
    let client = ApiClient::new(&base, Arc::new(MemorySessionStore::with_token("t"))).unwrap();
    let body: Value = client
      .put("jobs/j1/checklist/i1", &json!({"completed": true}))
      .await
      .unwrap();
    assert_eq!(body["ok"], true);
  }

  #[tokio::test]
  async fn test_unreachable_server_is_network_error() {
    let client = ApiClient::new("http://127.0.0.1:9", Arc::new(MemorySessionStore::default())).unwrap();
    let err = client.get::<Value>("/business").await.unwrap_err();
    assert!(matches!(err, ApiError::Network(_)));
  }

  #[test]
  fn test_invalid_base_url() {
    let err = ApiClient::new("::nope", Arc::new(MemorySessionStore::default())).err();
    assert!(matches!(err, Some(ApiError::Validation(_))));
  }
}

//! Job photo uploads.
//!
//! A photo moves `Idle -> Previewing -> Uploading -> Done | Failed`. Only
//! `PhotoUpload` changes the state; operations that do not fit the current
//! state are rejected and leave it untouched.

use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use tracing::{info, warn};
use url::Url;

use crate::api::api_types::PhotoInput;
use crate::api::{error_from_response, CachedApiClient, JobPhoto};
use crate::config::StorageConfig;
use crate::error::{ApiError, ApiResult};

pub const MAX_PHOTO_BYTES: usize = 10 * 1024 * 1024;

pub const ACCEPTED_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp", "image/heic"];

/// Content type for a file name, by extension.
pub fn content_type_for(name: &str) -> Option<&'static str> {
  let ext = Path::new(name).extension()?.to_str()?.to_lowercase();
  match ext.as_str() {
    "jpg" | "jpeg" => Some("image/jpeg"),
    "png" => Some("image/png"),
    "webp" => Some("image/webp"),
    "heic" => Some("image/heic"),
    _ => None,
  }
}

fn extension_for(content_type: &str) -> &'static str {
  match content_type {
    "image/png" => "png",
    "image/webp" => "webp",
    "image/heic" => "heic",
    _ => "jpg",
  }
}

// ============================================================================
// Files
// ============================================================================

/// A photo picked for upload, held in memory.
#[derive(Clone, PartialEq, Eq)]
pub struct PhotoFile {
  pub name: String,
  pub content_type: String,
  pub bytes: Vec<u8>,
}

impl fmt::Debug for PhotoFile {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("PhotoFile")
      .field("name", &self.name)
      .field("content_type", &self.content_type)
      .field("len", &self.bytes.len())
      .finish()
  }
}

impl PhotoFile {
  pub fn new(name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
    Self {
      name: name.into(),
      content_type: content_type.into(),
      bytes,
    }
  }

  /// Read a photo from disk, typing it by extension.
  ///
  /// Files over `MAX_PHOTO_BYTES` are rejected before any bytes are read.
  pub async fn read(path: &Path) -> ApiResult<Self> {
    let name = path
      .file_name()
      .and_then(|n| n.to_str())
      .ok_or_else(|| ApiError::validation(format!("not a file: {}", path.display())))?
      .to_string();
    let content_type = content_type_for(&name)
      .ok_or_else(|| ApiError::validation(format!("{} is not a supported image", name)))?;
    let unreadable =
      |e: std::io::Error| ApiError::validation(format!("failed to read {}: {}", path.display(), e));

    let len = tokio::fs::metadata(path).await.map_err(unreadable)?.len();
    if len > MAX_PHOTO_BYTES as u64 {
      return Err(too_large(&name, len));
    }
    let bytes = tokio::fs::read(path).await.map_err(unreadable)?;
    Ok(Self::new(name, content_type, bytes))
  }

  pub fn validate(&self) -> ApiResult<()> {
    if !ACCEPTED_TYPES.contains(&self.content_type.as_str()) {
      return Err(ApiError::validation(format!(
        "{} is not an accepted image type",
        self.content_type
      )));
    }
    if self.bytes.is_empty() {
      return Err(ApiError::validation(format!("{} is empty", self.name)));
    }
    if self.bytes.len() > MAX_PHOTO_BYTES {
      return Err(too_large(&self.name, self.bytes.len() as u64));
    }
    Ok(())
  }

  pub fn sha256(&self) -> String {
    hex::encode(Sha256::digest(&self.bytes))
  }

  /// Storage file name: the job id plus a content digest, so re-uploading the
  /// same photo lands on the same name.
  pub fn storage_name(&self, job_id: &str) -> String {
    let digest = self.sha256();
    format!("{}-{}.{}", job_id, &digest[..16], extension_for(&self.content_type))
  }
}

fn too_large(name: &str, len: u64) -> ApiError {
  ApiError::validation(format!(
    "{} is {} bytes, the limit is {}",
    name, len, MAX_PHOTO_BYTES
  ))
}

// ============================================================================
// Storage
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFile {
  pub url: String,
  pub file_id: Option<String>,
  pub name: Option<String>,
}

/// Uploads files to the image storage service.
#[derive(Clone)]
pub struct StorageUploader {
  http: reqwest::Client,
  upload_url: Url,
  public_key: String,
}

impl StorageUploader {
  pub fn new(upload_url: &str, public_key: impl Into<String>) -> ApiResult<Self> {
    let upload_url = Url::parse(upload_url)
      .map_err(|e| ApiError::validation(format!("invalid upload URL '{}': {}", upload_url, e)))?;
    Ok(Self {
      http: reqwest::Client::new(),
      upload_url,
      public_key: public_key.into(),
    })
  }

  /// `None` when no public key is configured.
  pub fn from_config(config: &StorageConfig) -> ApiResult<Option<Self>> {
    match &config.public_key {
      Some(key) => Self::new(&config.upload_url, key.clone()).map(Some),
      None => Ok(None),
    }
  }

  pub async fn upload(&self, job_id: &str, file: &PhotoFile) -> ApiResult<StoredFile> {
    file.validate()?;
    let file_name = file.storage_name(job_id);

    let part = Part::bytes(file.bytes.clone())
      .file_name(file_name.clone())
      .mime_str(&file.content_type)
      .map_err(|e| ApiError::validation(format!("bad content type: {}", e)))?;
    let form = Form::new()
      .part("file", part)
      .text("fileName", file_name.clone())
      .text("publicKey", self.public_key.clone())
      .text("folder", format!("/jobs/{}", job_id))
      .text("useUniqueFileName", "false");

    let response = self
      .http
      .post(self.upload_url.clone())
      .multipart(form)
      .send()
      .await?;
    let status = response.status();
    let body = response.bytes().await?;
    if !status.is_success() {
      return Err(error_from_response(status, &body));
    }

    let stored: StoredFile = serde_json::from_slice(&body)?;
    info!(job = job_id, file = %file_name, "photo stored");
    Ok(stored)
  }
}

// ============================================================================
// State machine
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum UploadState {
  Idle,
  Previewing { file: PhotoFile },
  Uploading { file: PhotoFile },
  Done { photo: JobPhoto },
  Failed { file: PhotoFile, error: ApiError },
}

impl UploadState {
  pub fn name(&self) -> &'static str {
    match self {
      UploadState::Idle => "idle",
      UploadState::Previewing { .. } => "previewing",
      UploadState::Uploading { .. } => "uploading",
      UploadState::Done { .. } => "done",
      UploadState::Failed { .. } => "failed",
    }
  }
}

/// One photo upload for one job.
#[derive(Debug)]
pub struct PhotoUpload {
  job_id: String,
  state: UploadState,
}

impl PhotoUpload {
  pub fn new(job_id: impl Into<String>) -> Self {
    Self {
      job_id: job_id.into(),
      state: UploadState::Idle,
    }
  }

  pub fn job_id(&self) -> &str {
    &self.job_id
  }

  pub fn state(&self) -> &UploadState {
    &self.state
  }

  fn invalid(&self, operation: &str) -> ApiError {
    ApiError::validation(format!("cannot {} while {}", operation, self.state.name()))
  }

  /// Pick a file to preview. Allowed from idle, previewing (replaces the
  /// file) and failed. A file that fails validation is not accepted.
  pub fn select(&mut self, file: PhotoFile) -> ApiResult<()> {
    match self.state {
      UploadState::Idle | UploadState::Previewing { .. } | UploadState::Failed { .. } => {
        file.validate()?;
        self.state = UploadState::Previewing { file };
        Ok(())
      }
      _ => Err(self.invalid("select a file")),
    }
  }

  /// Move to uploading; from previewing, or from failed as a retry.
  pub fn begin(&mut self) -> ApiResult<PhotoFile> {
    let file = match &self.state {
      UploadState::Previewing { file } | UploadState::Failed { file, .. } => file.clone(),
      _ => return Err(self.invalid("start uploading")),
    };
    self.state = UploadState::Uploading { file: file.clone() };
    Ok(file)
  }

  /// Record how the upload in flight ended.
  pub fn finish(&mut self, result: ApiResult<JobPhoto>) -> ApiResult<()> {
    let file = match &self.state {
      UploadState::Uploading { file } => file.clone(),
      _ => return Err(self.invalid("finish")),
    };
    self.state = match result {
      Ok(photo) => UploadState::Done { photo },
      Err(error) => UploadState::Failed { file, error },
    };
    Ok(())
  }

  /// Back to idle. Not allowed while a transfer is in flight.
  pub fn reset(&mut self) -> ApiResult<()> {
    if matches!(self.state, UploadState::Uploading { .. }) {
      return Err(self.invalid("reset"));
    }
    self.state = UploadState::Idle;
    Ok(())
  }

  /// Upload the previewed file and attach it to the job.
  ///
  /// Failures land in `Failed` and are also returned; calling again retries.
  pub async fn upload(
    &mut self,
    storage: &StorageUploader,
    api: &CachedApiClient,
    caption: Option<String>,
  ) -> ApiResult<JobPhoto> {
    let file = self.begin()?;

    let result = async {
      let stored = storage.upload(&self.job_id, &file).await?;
      api
        .add_job_photo(
          &self.job_id,
          &PhotoInput {
            url: stored.url,
            caption,
          },
        )
        .await
    }
    .await;

    if let Err(err) = &result {
      warn!(job = %self.job_id, error = %err, "photo upload failed");
    }
    self.finish(result.clone())?;
    result
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::{cache, ApiClient, ApiQuery};
  use crate::auth::MemorySessionStore;
  use crate::query::QueryClient;
  use serde_json::json;
  use std::sync::Arc;
  use wiremock::matchers::{body_json, body_string_contains, method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn jpeg() -> PhotoFile {
    PhotoFile::new("kitchen.jpg", "image/jpeg", b"kitchen after cleaning".to_vec())
  }

  fn photo(id: &str) -> JobPhoto {
    JobPhoto {
      id: id.to_string(),
      url: "https://ik.example.com/jobs/j1/p.jpg".to_string(),
      caption: None,
      uploaded_at: None,
    }
  }

  #[test]
  fn test_validation() {
    assert!(jpeg().validate().is_ok());
    assert!(PhotoFile::new("a.gif", "image/gif", vec![1]).validate().is_err());
    assert!(PhotoFile::new("a.png", "image/png", Vec::new()).validate().is_err());
    let huge = PhotoFile::new("a.png", "image/png", vec![0; MAX_PHOTO_BYTES + 1]);
    assert!(huge.validate().is_err());
  }

  #[tokio::test]
  async fn test_read_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("Hallway.PNG");
    std::fs::write(&file, b"hallway").unwrap();

    let photo = PhotoFile::read(&file).await.unwrap();
    assert_eq!(photo.content_type, "image/png");
    assert_eq!(photo.bytes, b"hallway");
  }

  #[tokio::test]
  async fn test_oversized_file_rejected_before_reading() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("garage.jpg");
    let handle = std::fs::File::create(&file).unwrap();
    handle.set_len(MAX_PHOTO_BYTES as u64 + 1).unwrap();

    match PhotoFile::read(&file).await {
      Err(ApiError::Validation(message)) => assert!(message.contains("the limit is")),
      other => panic!("expected a size rejection, got {:?}", other),
    }
    assert!(PhotoFile::read(&dir.path().join("missing.jpg")).await.is_err());
  }

  #[test]
  fn test_content_type_by_extension() {
    assert_eq!(content_type_for("A.JPEG"), Some("image/jpeg"));
    assert_eq!(content_type_for("b.heic"), Some("image/heic"));
    assert_eq!(content_type_for("notes.txt"), None);
    assert_eq!(content_type_for("noext"), None);
  }

  #[test]
  fn test_storage_name_is_content_addressed() {
    let a = jpeg().storage_name("j1");
    assert!(a.starts_with("j1-"));
    assert!(a.ends_with(".jpg"));
    assert_eq!(a, jpeg().storage_name("j1"));
    assert_ne!(a, PhotoFile::new("x.jpg", "image/jpeg", vec![9]).storage_name("j1"));
  }

  #[test]
  fn test_happy_path_transitions() {
    let mut upload = PhotoUpload::new("j1");
    upload.select(jpeg()).unwrap();
    assert_eq!(upload.state().name(), "previewing");

    assert_eq!(upload.begin().unwrap(), jpeg());
    assert_eq!(upload.state().name(), "uploading");

    upload.finish(Ok(photo("p1"))).unwrap();
    assert_eq!(upload.state(), &UploadState::Done { photo: photo("p1") });

    upload.reset().unwrap();
    assert_eq!(upload.state(), &UploadState::Idle);
  }

  #[test]
  fn test_failure_then_retry() {
    let mut upload = PhotoUpload::new("j1");
    upload.select(jpeg()).unwrap();
    upload.begin().unwrap();
    upload.finish(Err(ApiError::http(502, "Bad Gateway"))).unwrap();
    assert!(matches!(upload.state(), UploadState::Failed { .. }));

    assert_eq!(upload.begin().unwrap(), jpeg());
    assert_eq!(upload.state().name(), "uploading");
  }

  #[test]
  fn test_invalid_transitions_keep_state() {
    let mut upload = PhotoUpload::new("j1");
    assert!(upload.begin().is_err());
    assert!(upload.finish(Ok(photo("p1"))).is_err());
    assert_eq!(upload.state(), &UploadState::Idle);

    upload.select(jpeg()).unwrap();
    upload.begin().unwrap();
    assert!(upload.select(jpeg()).is_err());
    assert!(upload.reset().is_err());
    assert_eq!(upload.state().name(), "uploading");

    let mut fresh = PhotoUpload::new("j1");
    assert!(fresh.select(PhotoFile::new("a.gif", "image/gif", vec![1])).is_err());
    assert_eq!(fresh.state(), &UploadState::Idle);
  }

  async fn setup(server: &MockServer) -> (StorageUploader, CachedApiClient) {
    let upload_url = format!("{}/api/v1/files/upload", server.uri());
    let storage = StorageUploader::new(&upload_url, "pk_test").unwrap();
    let api = ApiClient::new(&server.uri(), Arc::new(MemorySessionStore::with_token("t"))).unwrap();
    (storage, CachedApiClient::new(api, QueryClient::default()))
  }

  #[tokio::test]
  async fn test_upload_stores_then_persists() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/api/v1/files/upload"))
      .and(body_string_contains("pk_test"))
      .and(body_string_contains(jpeg().storage_name("j1")))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "url": "https://ik.example.com/jobs/j1/p.jpg",
        "fileId": "f1",
        "name": "p.jpg"
      })))
      .expect(1)
      .mount(&server)
      .await;
    Mock::given(method("POST"))
      .and(path("/jobs/j1/photos"))
      .and(body_json(json!({"url": "https://ik.example.com/jobs/j1/p.jpg", "caption": "after"})))
      .respond_with(ResponseTemplate::new(201).set_body_json(json!({
        "id": "p1",
        "url": "https://ik.example.com/jobs/j1/p.jpg"
      })))
      .expect(1)
      .mount(&server)
      .await;

    let (storage, api) = setup(&server).await;
    let detail = ApiQuery::JobDetail { id: "j1".into() };
    api.cache().set_query_data(detail.key(), 1u8);

    let mut upload = PhotoUpload::new("j1");
    upload.select(jpeg()).unwrap();
    let stored = upload.upload(&storage, &api, Some("after".into())).await.unwrap();

    assert_eq!(stored.id, "p1");
    assert!(matches!(upload.state(), UploadState::Done { .. }));
    assert!(api.is_invalidated(&detail));
    assert!(api.cache().entry_state(&cache::root(cache::CLIENTS)).is_none());
  }

  #[tokio::test]
  async fn test_storage_failure_skips_persist() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/api/v1/files/upload"))
      .respond_with(
        ResponseTemplate::new(403).set_body_json(json!({"message": "Your account cannot be authenticated."})),
      )
      .mount(&server)
      .await;
    Mock::given(method("POST"))
      .and(path("/jobs/j1/photos"))
      .respond_with(ResponseTemplate::new(201))
      .expect(0)
      .mount(&server)
      .await;

    let (storage, api) = setup(&server).await;
    let mut upload = PhotoUpload::new("j1");
    upload.select(jpeg()).unwrap();

    let err = upload.upload(&storage, &api, None).await.unwrap_err();
    assert_eq!(err, ApiError::http(403, "Your account cannot be authenticated."));
    match upload.state() {
      UploadState::Failed { file, error } => {
        assert_eq!(file, &jpeg());
        assert_eq!(error, &err);
      }
      other => panic!("unexpected state {:?}", other),
    }
  }
}

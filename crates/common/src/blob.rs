//! Uploaded document storage, namespaced by user id

use crate::config::StorageConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Fetch a user's file. `Ok(None)` when it does not exist.
    async fn download(&self, user_id: Uuid, file_name: &str) -> Result<Option<Vec<u8>>>;
}

/// Reject names that could escape the user's namespace
pub fn validate_file_name(file_name: &str) -> Result<()> {
    let trimmed = file_name.trim();
    if trimmed.is_empty()
        || trimmed.contains('/')
        || trimmed.contains('\\')
        || trimmed == "."
        || trimmed == ".."
    {
        return Err(AppError::Validation {
            message: format!("Invalid file name: {file_name}"),
        });
    }
    Ok(())
}

/// Build the configured backend
pub fn from_config(config: &StorageConfig, timeout: Duration) -> Result<Arc<dyn BlobStore>> {
    match config.backend.as_str() {
        "fs" => Ok(Arc::new(FsBlobStore::new(&config.root))),
        "http" => {
            let base_url = config.base_url.clone().ok_or_else(|| AppError::Configuration {
                message: "storage.base_url is required for the http backend".to_string(),
            })?;
            Ok(Arc::new(HttpBlobStore::new(
                base_url,
                config.bucket.clone(),
                config.service_key.clone(),
                timeout,
            )?))
        }
        other => Err(AppError::Configuration {
            message: format!("Unknown storage backend: {other}"),
        }),
    }
}

/// Files under `{root}/{user_id}/{file_name}`
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn download(&self, user_id: Uuid, file_name: &str) -> Result<Option<Vec<u8>>> {
        validate_file_name(file_name)?;
        let path = self.root.join(user_id.to_string()).join(file_name);
        debug!(path = %path.display(), "Reading stored document");

        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Download {
                message: format!("{}: {}", file_name, e),
            }),
        }
    }
}

/// Object storage REST API: `GET {base}/object/{bucket}/{user_id}/{file_name}`
#[derive(Debug, Clone)]
pub struct HttpBlobStore {
    client: reqwest::Client,
    base_url: reqwest::Url,
    bucket: String,
    service_key: Option<String>,
}

impl HttpBlobStore {
    pub fn new(
        base_url: String,
        bucket: String,
        service_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let base_url = reqwest::Url::parse(&base_url).map_err(|e| AppError::Configuration {
            message: format!("Invalid storage.base_url {base_url}: {e}"),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(AppError::Configuration {
                message: format!("storage.base_url cannot be a base: {base_url}"),
            });
        }

        Ok(Self {
            client,
            base_url,
            bucket,
            service_key,
        })
    }

    /// Each part is pushed as its own path segment so `#`, `?` and spaces
    /// in user file names are percent-encoded.
    fn object_url(&self, user_id: Uuid, file_name: &str) -> reqwest::Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .push("object")
                .push(&self.bucket)
                .push(&user_id.to_string())
                .push(file_name);
        }
        url
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn download(&self, user_id: Uuid, file_name: &str) -> Result<Option<Vec<u8>>> {
        validate_file_name(file_name)?;

        let mut request = self.client.get(self.object_url(user_id, file_name));
        if let Some(ref key) = self.service_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| AppError::Download {
            message: e.to_string(),
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(AppError::Download {
                message: format!("storage returned {}", status),
            });
        }

        let bytes = response.bytes().await.map_err(|e| AppError::Download {
            message: e.to_string(),
        })?;

        Ok(Some(bytes.to_vec()))
    }
}

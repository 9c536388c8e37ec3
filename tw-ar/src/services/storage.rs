//! Storage gateway client
//!
//! Signed-URL issuance, byte fetches, and durable uploads all go through a
//! small HTTP gateway fronting the object store. The pipeline consumes the
//! gateway through the [`BlobFetcher`] and [`ArtifactStore`] traits so tests
//! can substitute in-memory fakes.

use serde::Deserialize;
use thiserror::Error;

/// Storage gateway errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Transport-level failure (connection refused, timeout, ...)
    #[error("network error: {0}")]
    Network(String),

    /// The gateway answered with a non-success status
    #[error("storage gateway returned {status} for {context}")]
    Status { status: u16, context: String },

    /// The gateway answered 2xx but the body was not usable
    #[error("unexpected gateway response: {0}")]
    Response(String),
}

/// Fetch the bytes behind a (usually signed) URL
#[async_trait::async_trait]
pub trait BlobFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, StorageError>;
}

/// Durable artifact upload under a caller-chosen key
///
/// Uploading to an existing key overwrites it; re-processing a session is
/// idempotent at the storage layer.
#[async_trait::async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn upload(&self, key: &str, bytes: Vec<u8>, content_type: &str)
        -> Result<(), StorageError>;
}

/// HTTP client for the storage gateway
pub struct StorageGateway {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct SignedUrlResponse {
    url: String,
}

impl StorageGateway {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Request a time-limited download URL for a stored object
    pub async fn signed_url(&self, key: &str, ttl_seconds: u64) -> Result<String, StorageError> {
        let endpoint = format!("{}/sign", self.base_url);
        let response = self
            .http
            .get(&endpoint)
            .query(&[("key", key), ("ttl", &ttl_seconds.to_string())])
            .send()
            .await
            .map_err(|e| StorageError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StorageError::Status {
                status: status.as_u16(),
                context: format!("sign {key}"),
            });
        }

        let body: SignedUrlResponse = response
            .json()
            .await
            .map_err(|e| StorageError::Response(e.to_string()))?;
        Ok(body.url)
    }
}

#[async_trait::async_trait]
impl BlobFetcher for StorageGateway {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, StorageError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| StorageError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StorageError::Status {
                status: status.as_u16(),
                context: format!("fetch {url}"),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| StorageError::Network(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait::async_trait]
impl ArtifactStore for StorageGateway {
    async fn upload(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let endpoint = format!("{}/objects/{}", self.base_url, key);
        let response = self
            .http
            .put(&endpoint)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| StorageError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StorageError::Status {
                status: status.as_u16(),
                context: format!("upload {key}"),
            });
        }
        Ok(())
    }
}

//! Page source
//!
//! Ordered page lookup plus signed-download issuance for page audio.

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::models::RecordingPage;
use crate::services::storage::{StorageError, StorageGateway};

/// Ordered page lookup for a narration session
#[async_trait::async_trait]
pub trait PageSource: Send + Sync {
    /// List the session's usable pages, ascending by page index
    ///
    /// Pages without uploaded audio are excluded.
    async fn list_pages(&self, session_id: &str) -> tw_common::Result<Vec<RecordingPage>>;

    /// Issue a time-limited download URL for a page's raw audio
    async fn signed_download(
        &self,
        audio_ref: &str,
        ttl_seconds: u64,
    ) -> Result<String, StorageError>;
}

/// Production page source: pages table + storage gateway signing
pub struct DbPageSource {
    db: SqlitePool,
    gateway: Arc<StorageGateway>,
}

impl DbPageSource {
    pub fn new(db: SqlitePool, gateway: Arc<StorageGateway>) -> Self {
        Self { db, gateway }
    }
}

#[async_trait::async_trait]
impl PageSource for DbPageSource {
    async fn list_pages(&self, session_id: &str) -> tw_common::Result<Vec<RecordingPage>> {
        crate::db::pages::list_usable_pages(&self.db, session_id).await
    }

    async fn signed_download(
        &self,
        audio_ref: &str,
        ttl_seconds: u64,
    ) -> Result<String, StorageError> {
        self.gateway.signed_url(audio_ref, ttl_seconds).await
    }
}

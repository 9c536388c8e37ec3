//! Render pipeline orchestration
//!
//! Drives the stage sequence for one render job, advancing the job's step
//! in the database before each stage runs, converting any stage failure
//! into a terminal failed status, and releasing the scratch workspace on
//! every exit path.

pub mod stages;
pub mod workspace;

pub use workspace::Workspace;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use sqlx::SqlitePool;
use thiserror::Error;
use tw_common::events::{EventBus, TwEvent};

use crate::db::jobs;
use crate::models::JobStep;
use crate::services::{ArtifactStore, BlobFetcher, PageSource, TranscodeError, Transcoder};

/// One render request handed off by the trigger boundary
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub purchase_id: String,
    pub session_id: String,
    pub story_title: String,
    pub reader_name: Option<String>,
    pub music_track: Option<String>,
}

/// Pipeline-level configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Root directory for per-session scratch workspaces
    pub scratch_root: PathBuf,
    /// Base URL used to resolve music selections
    pub music_base_url: String,
}

/// Fatal pipeline failures
///
/// Every variant's message is written verbatim into the job record, so the
/// messages are phrased for the person reading the job, not for a
/// backtrace. Music fetch failure is deliberately absent: it is handled
/// inside the mixing stage and never fails a render.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The session has no pages with uploaded audio
    #[error("no recorded pages found for session {0}")]
    NoPages(String),

    /// A page's signed URL could not be issued or its bytes fetched
    #[error("page download failed: {0}")]
    Download(String),

    /// A transcoding engine invocation reported failure
    #[error("transcoding failed: {0}")]
    Transcode(#[from] TranscodeError),

    /// The finished artifact could not be uploaded
    #[error("artifact upload failed: {0}")]
    Upload(String),

    /// Page metadata lookup failed
    #[error("page lookup failed: {0}")]
    PageLookup(String),

    /// Scratch workspace I/O failed
    #[error("workspace error: {0}")]
    Workspace(#[from] std::io::Error),

    /// A durable status write failed
    #[error("status update failed: {0}")]
    Status(#[from] tw_common::Error),
}

/// Orchestrator for the render stage sequence
pub struct RenderPipeline {
    pub(crate) db: SqlitePool,
    pub(crate) event_bus: EventBus,
    pub(crate) pages: Arc<dyn PageSource>,
    pub(crate) fetcher: Arc<dyn BlobFetcher>,
    pub(crate) transcoder: Arc<dyn Transcoder>,
    pub(crate) artifacts: Arc<dyn ArtifactStore>,
    pub(crate) config: PipelineConfig,
}

impl RenderPipeline {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        pages: Arc<dyn PageSource>,
        fetcher: Arc<dyn BlobFetcher>,
        transcoder: Arc<dyn Transcoder>,
        artifacts: Arc<dyn ArtifactStore>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            db,
            event_bus,
            pages,
            fetcher,
            transcoder,
            artifacts,
            config,
        }
    }

    /// Run the full render for one request and return the artifact key
    ///
    /// The job record always ends terminal: `completed` with the artifact
    /// key, or `failed` with the error's message. The scratch workspace is
    /// removed after the terminal status is written, whichever path was
    /// taken.
    pub async fn process_recording(&self, request: &RenderRequest) -> Result<String, PipelineError> {
        tracing::info!(
            purchase_id = %request.purchase_id,
            session_id = %request.session_id,
            "Starting render pipeline"
        );

        let mut workspace = None;
        let result = match Workspace::create(&self.config.scratch_root, &request.session_id) {
            Ok(ws) => {
                let ws = workspace.insert(ws);
                self.run_stages(ws, request).await
            }
            Err(e) => Err(PipelineError::Workspace(e)),
        };

        let result = self.finalize(request, result).await;
        // Scoped release: the workspace outlives the terminal status write
        // and is removed here on every exit path.
        drop(workspace);
        result
    }

    async fn run_stages(
        &self,
        workspace: &Workspace,
        request: &RenderRequest,
    ) -> Result<String, PipelineError> {
        self.enter_step(request, JobStep::Downloading).await?;
        let pages = self
            .pages
            .list_pages(&request.session_id)
            .await
            .map_err(|e| PipelineError::PageLookup(e.to_string()))?;
        if pages.is_empty() {
            return Err(PipelineError::NoPages(request.session_id.clone()));
        }
        let page_clips = self.normalize_pages(workspace, &pages).await?;

        self.enter_step(request, JobStep::Stitching).await?;
        let voice_track = self.stitch_pages(workspace, &page_clips).await?;

        self.enter_step(request, JobStep::Polishing).await?;
        let polished_track = self.polish_track(workspace, &voice_track).await?;

        let encoder_input = match &request.music_track {
            Some(track) => {
                self.enter_step(request, JobStep::MixingMusic).await?;
                self.mix_music(workspace, &polished_track, track).await?
            }
            None => polished_track,
        };

        self.enter_step(request, JobStep::Encoding).await?;
        let final_track = self.encode_track(workspace, &encoder_input, request).await?;

        self.enter_step(request, JobStep::Uploading).await?;
        self.publish(&final_track, &request.session_id).await
    }

    /// Advance the durable step record, then announce the transition
    async fn enter_step(
        &self,
        request: &RenderRequest,
        step: JobStep,
    ) -> Result<(), PipelineError> {
        let transition = jobs::set_step(&self.db, &request.purchase_id, step).await?;
        self.event_bus.emit_lossy(TwEvent::RenderStepChanged {
            purchase_id: request.purchase_id.clone(),
            step: step.as_str().to_string(),
            timestamp: transition.transitioned_at,
        });
        tracing::info!(
            purchase_id = %request.purchase_id,
            step = %step,
            previous = ?transition.old_step,
            "Entering pipeline step"
        );
        Ok(())
    }

    /// Write the terminal status matching the pipeline outcome
    async fn finalize(
        &self,
        request: &RenderRequest,
        result: Result<String, PipelineError>,
    ) -> Result<String, PipelineError> {
        match result {
            Ok(artifact_key) => {
                match jobs::set_completed(&self.db, &request.purchase_id, &artifact_key).await {
                    Ok(()) => {
                        self.event_bus.emit_lossy(TwEvent::RenderJobCompleted {
                            purchase_id: request.purchase_id.clone(),
                            artifact_key: artifact_key.clone(),
                            timestamp: Utc::now(),
                        });
                        tracing::info!(
                            purchase_id = %request.purchase_id,
                            artifact_key = %artifact_key,
                            "Render pipeline completed"
                        );
                        Ok(artifact_key)
                    }
                    Err(e) => self.record_failure(request, PipelineError::Status(e)).await,
                }
            }
            Err(e) => self.record_failure(request, e).await,
        }
    }

    async fn record_failure(
        &self,
        request: &RenderRequest,
        error: PipelineError,
    ) -> Result<String, PipelineError> {
        tracing::error!(
            purchase_id = %request.purchase_id,
            error = %error,
            "Render pipeline failed"
        );
        let message = error.to_string();
        match jobs::set_failed(&self.db, &request.purchase_id, &message).await {
            Ok(()) => {
                self.event_bus.emit_lossy(TwEvent::RenderJobFailed {
                    purchase_id: request.purchase_id.clone(),
                    message,
                    timestamp: Utc::now(),
                });
            }
            Err(write_err) => {
                // The caller's supervision wrapper is the last resort here.
                tracing::error!(
                    purchase_id = %request.purchase_id,
                    error = %write_err,
                    "Failed to record render failure"
                );
            }
        }
        Err(error)
    }
}

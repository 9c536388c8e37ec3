//! Render API handlers
//!
//! POST /render accepts a job description, acknowledges immediately, and
//! hands the work to a detached background task; the caller observes
//! progress only through GET /render/status/{purchase_id} or the SSE
//! stream.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tw_common::events::TwEvent;

use crate::{
    db,
    error::{ApiError, ApiResult},
    models::RenderJob,
    pipeline::{PipelineError, RenderRequest},
    AppState,
};

/// POST /render request body
#[derive(Debug, Deserialize)]
pub struct StartRenderRequest {
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub story_title: String,
    #[serde(default)]
    pub reader_name: Option<String>,
    #[serde(default)]
    pub music_track: Option<String>,
    #[serde(default)]
    pub purchase_id: String,
}

/// POST /render response
#[derive(Debug, Serialize)]
pub struct StartRenderResponse {
    pub purchase_id: String,
    pub session_id: String,
    pub queued_at: chrono::DateTime<chrono::Utc>,
}

/// POST /render
///
/// Validate the job description, persist the job record, and spawn the
/// pipeline as a detached task. Returns 202 Accepted.
pub async fn start_render(
    State(state): State<AppState>,
    Json(request): Json<StartRenderRequest>,
) -> ApiResult<(StatusCode, Json<StartRenderResponse>)> {
    for (field, value) in [
        ("session_id", &request.session_id),
        ("story_title", &request.story_title),
        ("purchase_id", &request.purchase_id),
    ] {
        if value.trim().is_empty() {
            return Err(ApiError::BadRequest(format!("{field} is required")));
        }
    }

    db::jobs::create_job(
        &state.db,
        &request.purchase_id,
        &request.session_id,
        &request.story_title,
        request.reader_name.as_deref(),
        request.music_track.as_deref(),
    )
    .await?;

    state.event_bus.emit_lossy(TwEvent::RenderJobQueued {
        purchase_id: request.purchase_id.clone(),
        session_id: request.session_id.clone(),
        timestamp: Utc::now(),
    });

    tracing::info!(
        purchase_id = %request.purchase_id,
        session_id = %request.session_id,
        "Render job accepted"
    );

    let response = StartRenderResponse {
        purchase_id: request.purchase_id.clone(),
        session_id: request.session_id.clone(),
        queued_at: Utc::now(),
    };

    // Detached task: the HTTP caller has already been acknowledged, so this
    // wrapper is the error boundary of last resort.
    let render_request = RenderRequest {
        purchase_id: request.purchase_id,
        session_id: request.session_id,
        story_title: request.story_title,
        reader_name: request.reader_name,
        music_track: request.music_track,
    };
    let pipeline = state.pipeline.clone();
    let job_db = state.db.clone();
    let last_error = state.last_error.clone();
    tokio::spawn(async move {
        match pipeline.process_recording(&render_request).await {
            Ok(artifact_key) => {
                tracing::info!(
                    purchase_id = %render_request.purchase_id,
                    artifact_key = %artifact_key,
                    "Background render task completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    purchase_id = %render_request.purchase_id,
                    error = %e,
                    "Background render task failed"
                );
                *last_error.write().await = Some(e.to_string());
                ensure_job_failed(&job_db, &render_request.purchase_id, &e).await;
            }
        }
    });

    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// Guarantee a failed render never leaves its job record non-terminal,
/// even if the pipeline's own failure write failed
async fn ensure_job_failed(db: &SqlitePool, purchase_id: &str, error: &PipelineError) {
    match db::jobs::get_job(db, purchase_id).await {
        Ok(Some(job)) if job.is_terminal() => {}
        _ => {
            tracing::warn!(
                purchase_id = %purchase_id,
                "Job record not terminal after failure - applying direct update"
            );
            let _ = sqlx::query(
                r#"UPDATE render_jobs
                   SET status = 'failed', error = ?, artifact_key = NULL, updated_at = ?
                   WHERE purchase_id = ?"#,
            )
            .bind(error.to_string())
            .bind(Utc::now().to_rfc3339())
            .bind(purchase_id)
            .execute(db)
            .await;
        }
    }
}

/// GET /render/status/{purchase_id}
///
/// Poll the job record. Returns the current step, terminal status, error
/// message, and artifact key.
pub async fn render_status(
    State(state): State<AppState>,
    Path(purchase_id): Path<String>,
) -> ApiResult<Json<RenderJob>> {
    let job = db::jobs::get_job(&state.db, &purchase_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Render job not found: {purchase_id}")))?;

    tracing::debug!(purchase_id = %purchase_id, step = ?job.step, status = ?job.status, "Status query");

    Ok(Json(job))
}

/// Build render workflow routes
pub fn render_routes() -> Router<AppState> {
    Router::new()
        .route("/render", post(start_render))
        .route("/render/status/:purchase_id", get(render_status))
}

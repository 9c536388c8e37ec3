//! Render job status persistence
//!
//! This module is the durable status sink for the pipeline. The row
//! invariants live here so that every writer gets them:
//! - steps only move forward through the `JobStep` ordering,
//! - a terminal status freezes the row,
//! - `error` and `artifact_key` are never both set.

use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tw_common::{Error, Result};

use crate::models::{JobStatus, JobStep, RenderJob, StepTransition};

/// Insert a new job row for an accepted render request
///
/// Re-processing the same purchase replaces the previous record, so a
/// second purchase of the same session starts from a clean slate.
pub async fn create_job(
    pool: &SqlitePool,
    purchase_id: &str,
    session_id: &str,
    story_title: &str,
    reader_name: Option<&str>,
    music_track: Option<&str>,
) -> Result<()> {
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO render_jobs (
            purchase_id, session_id, story_title, reader_name, music_track,
            step, status, error, artifact_key, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, NULL, NULL, NULL, NULL, ?, ?)
        ON CONFLICT(purchase_id) DO UPDATE SET
            session_id = excluded.session_id,
            story_title = excluded.story_title,
            reader_name = excluded.reader_name,
            music_track = excluded.music_track,
            step = NULL,
            status = NULL,
            error = NULL,
            artifact_key = NULL,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(purchase_id)
    .bind(session_id)
    .bind(story_title)
    .bind(reader_name)
    .bind(music_track)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    Ok(())
}

/// Load a job row by purchase id
pub async fn get_job(pool: &SqlitePool, purchase_id: &str) -> Result<Option<RenderJob>> {
    let row = sqlx::query(
        r#"
        SELECT purchase_id, session_id, story_title, reader_name, music_track,
               step, status, error, artifact_key, created_at, updated_at
        FROM render_jobs
        WHERE purchase_id = ?
        "#,
    )
    .bind(purchase_id)
    .fetch_optional(pool)
    .await?;

    row.map(job_from_row).transpose()
}

/// Advance the job to a new step
///
/// Rejects transitions on terminal rows and transitions that do not move
/// forward through the step ordering.
pub async fn set_step(
    pool: &SqlitePool,
    purchase_id: &str,
    step: JobStep,
) -> Result<StepTransition> {
    let job = require_job(pool, purchase_id).await?;

    if let Some(status) = job.status {
        return Err(Error::InvalidInput(format!(
            "Job {} is already terminal ({}), cannot enter step {}",
            purchase_id, status, step
        )));
    }
    if let Some(current) = job.step {
        if !current.can_advance_to(step) {
            return Err(Error::InvalidInput(format!(
                "Job {} cannot move from step {} to {}",
                purchase_id, current, step
            )));
        }
    }

    let transition = StepTransition {
        purchase_id: purchase_id.to_string(),
        old_step: job.step,
        new_step: step,
        transitioned_at: Utc::now(),
    };

    sqlx::query("UPDATE render_jobs SET step = ?, updated_at = ? WHERE purchase_id = ?")
        .bind(step.as_str())
        .bind(transition.transitioned_at.to_rfc3339())
        .bind(purchase_id)
        .execute(pool)
        .await?;

    tracing::debug!(purchase_id = %purchase_id, step = %step, "Job step advanced");

    Ok(transition)
}

/// Record a terminal failure with a human-readable message
pub async fn set_failed(pool: &SqlitePool, purchase_id: &str, message: &str) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE render_jobs
        SET status = 'failed', error = ?, artifact_key = NULL, updated_at = ?
        WHERE purchase_id = ?
        "#,
    )
    .bind(message)
    .bind(Utc::now().to_rfc3339())
    .bind(purchase_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Record terminal completion with the uploaded artifact's storage key
pub async fn set_completed(pool: &SqlitePool, purchase_id: &str, artifact_key: &str) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE render_jobs
        SET status = 'completed', artifact_key = ?, error = NULL, updated_at = ?
        WHERE purchase_id = ?
        "#,
    )
    .bind(artifact_key)
    .bind(Utc::now().to_rfc3339())
    .bind(purchase_id)
    .execute(pool)
    .await?;

    Ok(())
}

async fn require_job(pool: &SqlitePool, purchase_id: &str) -> Result<RenderJob> {
    get_job(pool, purchase_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Render job not found: {purchase_id}")))
}

fn job_from_row(row: sqlx::sqlite::SqliteRow) -> Result<RenderJob> {
    let step: Option<String> = row.get("step");
    let step = step
        .map(|s| {
            JobStep::parse(&s).ok_or_else(|| Error::Internal(format!("Unknown job step: {s}")))
        })
        .transpose()?;

    let status: Option<String> = row.get("status");
    let status = status
        .map(|s| {
            JobStatus::parse(&s).ok_or_else(|| Error::Internal(format!("Unknown job status: {s}")))
        })
        .transpose()?;

    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(RenderJob {
        purchase_id: row.get("purchase_id"),
        session_id: row.get("session_id"),
        story_title: row.get("story_title"),
        reader_name: row.get("reader_name"),
        music_track: row.get("music_track"),
        step,
        status,
        error: row.get("error"),
        artifact_key: row.get("artifact_key"),
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

fn parse_timestamp(value: &str) -> Result<chrono::DateTime<Utc>> {
    chrono::DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Invalid timestamp {value}: {e}")))
}

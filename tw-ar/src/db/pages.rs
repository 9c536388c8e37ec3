//! Page listing queries
//!
//! Pages are written by the upstream recording app; this service only
//! reads them.

use sqlx::SqlitePool;
use tw_common::Result;

use crate::models::RecordingPage;

/// List a session's recorded pages, ascending by page index
///
/// Pages without uploaded audio are excluded; they contribute nothing to
/// the rendered track.
pub async fn list_usable_pages(pool: &SqlitePool, session_id: &str) -> Result<Vec<RecordingPage>> {
    let pages = sqlx::query_as::<_, RecordingPage>(
        r#"
        SELECT page_index, audio_ref, recorded_duration
        FROM pages
        WHERE session_id = ? AND audio_ref IS NOT NULL
        ORDER BY page_index ASC
        "#,
    )
    .bind(session_id)
    .fetch_all(pool)
    .await?;

    Ok(pages)
}

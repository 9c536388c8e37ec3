//! Database access for the render service
//!
//! The service owns a small SQLite database holding the `render_jobs`
//! status records and the `pages` rows written by the upstream recording
//! app.

pub mod jobs;
pub mod pages;

use anyhow::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize database connection pool
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // SQLite URI with mode=rwc (read, write, create)
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_tables(&pool).await?;

    Ok(pool)
}

/// Create the render service tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS render_jobs (
            purchase_id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            story_title TEXT NOT NULL,
            reader_name TEXT,
            music_track TEXT,
            step TEXT,
            status TEXT,
            error TEXT,
            artifact_key TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pages (
            session_id TEXT NOT NULL,
            page_index INTEGER NOT NULL,
            audio_ref TEXT,
            recorded_duration REAL,
            PRIMARY KEY (session_id, page_index)
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (render_jobs, pages)");

    Ok(())
}

//! tw-ar - Audiobook Render Microservice
//!
//! Turns a session's per-page voice recordings into one finished, mixed,
//! and encoded audio track, reporting progress and terminal status to the
//! render job record. Triggered over HTTP, processed in the background.

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use tw_common::events::EventBus;

use tw_ar::pipeline::{PipelineConfig, RenderPipeline};
use tw_ar::services::{DbPageSource, FfmpegTranscoder, StorageGateway};
use tw_ar::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting tw-ar (Audiobook Render) microservice");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = tw_common::config::load_service_config("tw-ar")?;
    info!("Database: {}", config.database_path.display());
    info!("Scratch root: {}", config.scratch_root.display());

    let db_pool = tw_ar::db::init_database_pool(&config.database_path).await?;
    info!("Database connection established");

    // Event bus for SSE broadcasting
    let event_bus = EventBus::new(100);
    info!("Event bus initialized (capacity {})", event_bus.capacity());

    let gateway = Arc::new(StorageGateway::new(config.storage_base_url.clone()));
    let pipeline = Arc::new(RenderPipeline::new(
        db_pool.clone(),
        event_bus.clone(),
        Arc::new(DbPageSource::new(db_pool.clone(), gateway.clone())),
        gateway.clone(),
        Arc::new(FfmpegTranscoder::new()),
        gateway,
        PipelineConfig {
            scratch_root: config.scratch_root.clone(),
            music_base_url: config.music_base_url.clone(),
        },
    ));

    let state = AppState::new(db_pool, event_bus, pipeline);
    let app = tw_ar::build_router(state);

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", config.port)).await?;
    info!("Listening on http://127.0.0.1:{}", config.port);
    info!("Health check: http://127.0.0.1:{}/health", config.port);

    axum::serve(listener, app).await?;

    Ok(())
}

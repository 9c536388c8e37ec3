//! Shared test doubles and harness for pipeline and API tests
//!
//! The pipeline's collaborators (transcoder, page source, blob fetcher,
//! artifact store) are replaced with recording fakes; the status sink runs
//! against a real in-memory SQLite pool.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use sqlx::SqlitePool;
use tempfile::TempDir;

use tw_ar::models::RecordingPage;
use tw_ar::pipeline::{PipelineConfig, RenderPipeline, RenderRequest};
use tw_ar::services::{
    ArtifactStore, BlobFetcher, FilterJob, PageSource, StorageError, TranscodeError, Transcoder,
};
use tw_common::events::EventBus;

pub const MUSIC_BASE: &str = "https://assets.test";

/// Signed URL the static page source hands out for an audio ref
pub fn signed_url(audio_ref: &str) -> String {
    format!("https://signed.test/{audio_ref}?ttl=300")
}

/// Resolved music URL for a track selection
pub fn music_url(track: &str) -> String {
    format!("{MUSIC_BASE}/music/{track}.mp3")
}

/// A recorded page with uploaded audio
pub fn page(session_id: &str, index: i64) -> RecordingPage {
    RecordingPage {
        page_index: index,
        audio_ref: Some(format!("audio/{session_id}/{index}.webm")),
        recorded_duration: Some(4.0),
    }
}

/// Transcoder double: records every submitted job, fabricates output files,
/// and captures concat manifests before the workspace is torn down
pub struct RecordingTranscoder {
    jobs: Mutex<Vec<FilterJob>>,
    manifests: Mutex<Vec<String>>,
    probed_duration: f64,
    fail_on_output: Option<String>,
}

impl RecordingTranscoder {
    pub fn new(probed_duration: f64) -> Self {
        Self {
            jobs: Mutex::new(Vec::new()),
            manifests: Mutex::new(Vec::new()),
            probed_duration,
            fail_on_output: None,
        }
    }

    /// Fail any job whose output file name contains `needle`
    pub fn failing_on(probed_duration: f64, needle: &str) -> Self {
        Self {
            fail_on_output: Some(needle.to_string()),
            ..Self::new(probed_duration)
        }
    }

    pub fn jobs(&self) -> Vec<FilterJob> {
        self.jobs.lock().unwrap().clone()
    }

    pub fn manifests(&self) -> Vec<String> {
        self.manifests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Transcoder for RecordingTranscoder {
    async fn submit(&self, job: &FilterJob) -> Result<(), TranscodeError> {
        if let Some(needle) = &self.fail_on_output {
            if job.output.to_string_lossy().contains(needle.as_str()) {
                return Err(TranscodeError::Failed {
                    tool: "ffmpeg",
                    status: 1,
                    stderr_tail: " (stderr: simulated failure)".to_string(),
                });
            }
        }

        // Concat manifests live in the workspace, which is deleted before
        // assertions run; capture their content now.
        for input in &job.inputs {
            if input.args.iter().any(|a| a == "concat") {
                if let Ok(content) = std::fs::read_to_string(&input.source) {
                    self.manifests.lock().unwrap().push(content);
                }
            }
        }

        std::fs::write(&job.output, b"FAKEAUDIO").map_err(|e| TranscodeError::Launch {
            tool: "ffmpeg",
            source: e,
        })?;
        self.jobs.lock().unwrap().push(job.clone());
        Ok(())
    }

    async fn probe_duration(&self, _path: &Path) -> Result<f64, TranscodeError> {
        Ok(self.probed_duration)
    }
}

/// Page source double returning a fixed page list
pub struct StaticPageSource {
    pages: Vec<RecordingPage>,
    signed: Mutex<Vec<(String, u64)>>,
    fail_signing: bool,
}

impl StaticPageSource {
    pub fn new(pages: Vec<RecordingPage>) -> Self {
        Self {
            pages,
            signed: Mutex::new(Vec::new()),
            fail_signing: false,
        }
    }

    pub fn failing_signing(pages: Vec<RecordingPage>) -> Self {
        Self {
            fail_signing: true,
            ..Self::new(pages)
        }
    }

    /// (audio_ref, ttl) pairs that were signed
    pub fn signed(&self) -> Vec<(String, u64)> {
        self.signed.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl PageSource for StaticPageSource {
    async fn list_pages(&self, _session_id: &str) -> tw_common::Result<Vec<RecordingPage>> {
        Ok(self.pages.clone())
    }

    async fn signed_download(
        &self,
        audio_ref: &str,
        ttl_seconds: u64,
    ) -> Result<String, StorageError> {
        if self.fail_signing {
            return Err(StorageError::Status {
                status: 503,
                context: format!("sign {audio_ref}"),
            });
        }
        self.signed
            .lock()
            .unwrap()
            .push((audio_ref.to_string(), ttl_seconds));
        Ok(format!("https://signed.test/{audio_ref}?ttl={ttl_seconds}"))
    }
}

/// Blob fetcher double serving bytes from an in-memory map
pub struct MapFetcher {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    fetched: Mutex<Vec<String>>,
}

impl MapFetcher {
    pub fn new() -> Self {
        Self {
            blobs: Mutex::new(HashMap::new()),
            fetched: Mutex::new(Vec::new()),
        }
    }

    pub fn insert(&self, url: String, bytes: Vec<u8>) {
        self.blobs.lock().unwrap().insert(url, bytes);
    }

    pub fn remove(&self, url: &str) {
        self.blobs.lock().unwrap().remove(url);
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl BlobFetcher for MapFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, StorageError> {
        self.fetched.lock().unwrap().push(url.to_string());
        self.blobs
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| StorageError::Status {
                status: 404,
                context: format!("fetch {url}"),
            })
    }
}

/// Artifact store double recording uploads
pub struct RecordingArtifactStore {
    uploads: Mutex<Vec<(String, Vec<u8>, String)>>,
    fail: bool,
}

impl RecordingArtifactStore {
    pub fn new() -> Self {
        Self {
            uploads: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    /// (key, bytes, content_type) triples in upload order
    pub fn uploads(&self) -> Vec<(String, Vec<u8>, String)> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ArtifactStore for RecordingArtifactStore {
    async fn upload(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        if self.fail {
            return Err(StorageError::Status {
                status: 500,
                context: format!("upload {key}"),
            });
        }
        self.uploads
            .lock()
            .unwrap()
            .push((key.to_string(), bytes, content_type.to_string()));
        Ok(())
    }
}

/// Assembled pipeline harness with handles to every double
pub struct TestHarness {
    pub pool: SqlitePool,
    pub event_bus: EventBus,
    pub scratch: TempDir,
    pub source: Arc<StaticPageSource>,
    pub transcoder: Arc<RecordingTranscoder>,
    pub fetcher: Arc<MapFetcher>,
    pub store: Arc<RecordingArtifactStore>,
    pub pipeline: Arc<RenderPipeline>,
}

impl TestHarness {
    pub async fn build(
        source: StaticPageSource,
        transcoder: RecordingTranscoder,
        store: RecordingArtifactStore,
    ) -> Self {
        // A single connection keeps every handle on the same in-memory
        // database.
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        tw_ar::db::init_tables(&pool).await.unwrap();
        let event_bus = EventBus::new(64);
        let scratch = tempfile::tempdir().unwrap();

        let source = Arc::new(source);
        let transcoder = Arc::new(transcoder);
        let fetcher = Arc::new(MapFetcher::new());
        let store = Arc::new(store);

        // Seed page audio behind the signed URLs the static source issues
        for page in &source.pages {
            if let Some(audio_ref) = &page.audio_ref {
                fetcher.insert(signed_url(audio_ref), vec![0xAB; 32]);
            }
        }

        let pipeline = Arc::new(RenderPipeline::new(
            pool.clone(),
            event_bus.clone(),
            source.clone(),
            fetcher.clone(),
            transcoder.clone(),
            store.clone(),
            PipelineConfig {
                scratch_root: scratch.path().to_path_buf(),
                music_base_url: MUSIC_BASE.to_string(),
            },
        ));

        Self {
            pool,
            event_bus,
            scratch,
            source,
            transcoder,
            fetcher,
            store,
            pipeline,
        }
    }

    /// Insert the job row the trigger boundary would have created
    pub async fn seed_job(&self, request: &RenderRequest) {
        tw_ar::db::jobs::create_job(
            &self.pool,
            &request.purchase_id,
            &request.session_id,
            &request.story_title,
            request.reader_name.as_deref(),
            request.music_track.as_deref(),
        )
        .await
        .unwrap();
    }

    /// Workspace directory the pipeline used for a session
    pub fn workspace_dir(&self, session_id: &str) -> std::path::PathBuf {
        self.scratch.path().join(session_id)
    }
}

/// A render request with the standard test fixtures
pub fn request(purchase_id: &str, session_id: &str, music_track: Option<&str>) -> RenderRequest {
    RenderRequest {
        purchase_id: purchase_id.to_string(),
        session_id: session_id.to_string(),
        story_title: "The Moon Garden".to_string(),
        reader_name: Some("Maya Quinn".to_string()),
        music_track: music_track.map(str::to_string),
    }
}

/// Drain the step names broadcast on the event bus
pub fn drain_steps(rx: &mut tokio::sync::broadcast::Receiver<tw_common::events::TwEvent>) -> Vec<String> {
    let mut steps = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let tw_common::events::TwEvent::RenderStepChanged { step, .. } = event {
            steps.push(step);
        }
    }
    steps
}

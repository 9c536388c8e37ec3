//! Recording page model

use serde::Serialize;

/// One recorded page of a narration session
///
/// Rows are written by the upstream recording app and are read-only here.
/// `page_index` defines playback order within the session. Pages without an
/// `audio_ref` never reach the pipeline (filtered at query time).
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct RecordingPage {
    /// Ordinal position within the session, unique per session
    pub page_index: i64,

    /// Storage reference of the raw uploaded audio, if any was recorded
    pub audio_ref: Option<String>,

    /// Duration reported at record time. Informational only: the pipeline
    /// re-derives authoritative durations by probing.
    pub recorded_duration: Option<f64>,
}

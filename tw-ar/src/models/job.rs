//! Render job state machine
//!
//! A job progresses through ordered steps:
//! downloading → stitching → polishing → mixing_music (optional) → encoding → uploading
//! and then reaches a terminal status of completed or failed. Steps only
//! move forward; once a terminal status is set no further transitions are
//! accepted.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pipeline step a render job is currently executing
///
/// `MixingMusic` is entered only when the job carries a music selection;
/// otherwise the sequence skips from `Polishing` to `Encoding`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStep {
    /// Fetch each page's raw audio and normalize to the canonical format
    Downloading,
    /// Concatenate page clips with inter-page silence
    Stitching,
    /// High-pass filter and loudness normalization
    Polishing,
    /// Mix the background music bed under the voice track
    MixingMusic,
    /// Encode the finished track to MP3
    Encoding,
    /// Upload the artifact to durable storage
    Uploading,
}

impl JobStep {
    /// Position in the forward-only step ordering
    pub fn ordinal(self) -> u8 {
        match self {
            JobStep::Downloading => 0,
            JobStep::Stitching => 1,
            JobStep::Polishing => 2,
            JobStep::MixingMusic => 3,
            JobStep::Encoding => 4,
            JobStep::Uploading => 5,
        }
    }

    /// Whether advancing from `self` to `next` moves forward
    ///
    /// Any later step is reachable from any earlier one, which is what
    /// permits skipping the optional `MixingMusic` step.
    pub fn can_advance_to(self, next: JobStep) -> bool {
        next.ordinal() > self.ordinal()
    }

    /// Step label as persisted in the job row
    pub fn as_str(self) -> &'static str {
        match self {
            JobStep::Downloading => "downloading",
            JobStep::Stitching => "stitching",
            JobStep::Polishing => "polishing",
            JobStep::MixingMusic => "mixing_music",
            JobStep::Encoding => "encoding",
            JobStep::Uploading => "uploading",
        }
    }

    /// Parse a persisted step label
    pub fn parse(value: &str) -> Option<JobStep> {
        match value {
            "downloading" => Some(JobStep::Downloading),
            "stitching" => Some(JobStep::Stitching),
            "polishing" => Some(JobStep::Polishing),
            "mixing_music" => Some(JobStep::MixingMusic),
            "encoding" => Some(JobStep::Encoding),
            "uploading" => Some(JobStep::Uploading),
            _ => None,
        }
    }
}

impl fmt::Display for JobStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal outcome of a render job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Finished; `artifact_key` holds the uploaded result
    Completed,
    /// Failed; `error` holds the reason
    Failed,
}

impl JobStatus {
    /// Status label as persisted in the job row
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Parse a persisted status label
    pub fn parse(value: &str) -> Option<JobStatus> {
        match value {
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Step transition record (for logging and events)
#[derive(Debug, Clone, Serialize)]
pub struct StepTransition {
    pub purchase_id: String,
    pub old_step: Option<JobStep>,
    pub new_step: JobStep,
    pub transitioned_at: DateTime<Utc>,
}

/// One render job row, keyed by the externally issued purchase id
#[derive(Debug, Clone, Serialize)]
pub struct RenderJob {
    /// Purchase this render belongs to (primary key)
    pub purchase_id: String,

    /// Narration session whose pages are rendered
    pub session_id: String,

    /// Title embedded in the encoded artifact's metadata
    pub story_title: String,

    /// Optional narrator credited in the artifact's metadata
    pub reader_name: Option<String>,

    /// Optional background music selection
    pub music_track: Option<String>,

    /// Step currently executing, absent before processing begins
    pub step: Option<JobStep>,

    /// Terminal status, unset while in progress
    pub status: Option<JobStatus>,

    /// Failure reason; mutually exclusive with `artifact_key`
    pub error: Option<String>,

    /// Storage key of the finished artifact; mutually exclusive with `error`
    pub artifact_key: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RenderJob {
    /// Whether the job has reached a terminal status
    pub fn is_terminal(&self) -> bool {
        self.status.is_some()
    }
}

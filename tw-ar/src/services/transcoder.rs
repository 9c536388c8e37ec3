//! Transcoding capability
//!
//! The pipeline describes each audio transformation declaratively as a
//! [`FilterJob`] and submits it to a [`Transcoder`]. The production
//! implementation shells out to the ffmpeg/ffprobe binaries; tests
//! substitute a recording mock.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use thiserror::Error;
use tokio::process::Command;

/// Transcoding engine errors
#[derive(Debug, Error)]
pub enum TranscodeError {
    /// The tool binary could not be launched at all
    #[error("failed to launch {tool}: {source}")]
    Launch {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// The tool ran and reported failure
    #[error("{tool} exited with status {status}{stderr_tail}")]
    Failed {
        tool: &'static str,
        status: i32,
        stderr_tail: String,
    },

    /// ffprobe produced output that is not a usable duration
    #[error("could not parse probed duration: {0}")]
    Probe(String),
}

/// One audio input of a filter job
#[derive(Debug, Clone)]
pub struct JobInput {
    /// Input specifier: a file path or a synthetic source description
    pub source: String,
    /// Arguments applied before this input (demuxer selection, looping, ...)
    pub args: Vec<String>,
}

impl JobInput {
    /// Plain file input
    pub fn file(path: &Path) -> Self {
        Self {
            source: path.display().to_string(),
            args: Vec::new(),
        }
    }

    /// Input with per-input arguments (e.g. `-f concat`, `-stream_loop -1`)
    pub fn with_args(source: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            source: source.into(),
            args,
        }
    }
}

/// Declarative description of one transcoding invocation
///
/// `output_args` carries stream mapping, codec, and metadata arguments;
/// `filter_graph` (when present) is applied across the inputs.
#[derive(Debug, Clone)]
pub struct FilterJob {
    pub inputs: Vec<JobInput>,
    pub filter_graph: Option<String>,
    pub output_args: Vec<String>,
    pub output: PathBuf,
}

/// Awaitable transcoding capability
#[async_trait::async_trait]
pub trait Transcoder: Send + Sync {
    /// Execute one filter job, producing `job.output` on disk
    async fn submit(&self, job: &FilterJob) -> Result<(), TranscodeError>;

    /// Probe a media file's duration in seconds
    async fn probe_duration(&self, path: &Path) -> Result<f64, TranscodeError>;
}

/// Transcoder backed by the ffmpeg/ffprobe binaries on PATH
pub struct FfmpegTranscoder {
    ffmpeg: String,
    ffprobe: String,
}

impl FfmpegTranscoder {
    pub fn new() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
        }
    }
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn submit(&self, job: &FilterJob) -> Result<(), TranscodeError> {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.arg("-hide_banner").arg("-loglevel").arg("error").arg("-y");
        for input in &job.inputs {
            cmd.args(&input.args);
            cmd.arg("-i").arg(&input.source);
        }
        if let Some(graph) = &job.filter_graph {
            cmd.arg("-filter_complex").arg(graph);
        }
        cmd.args(&job.output_args);
        cmd.arg(&job.output);
        cmd.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::piped());

        tracing::debug!(output = %job.output.display(), "Submitting ffmpeg job");

        let output = cmd.output().await.map_err(|e| TranscodeError::Launch {
            tool: "ffmpeg",
            source: e,
        })?;
        if !output.status.success() {
            return Err(command_failure("ffmpeg", &output));
        }
        Ok(())
    }

    async fn probe_duration(&self, path: &Path) -> Result<f64, TranscodeError> {
        let output = Command::new(&self.ffprobe)
            .arg("-v")
            .arg("error")
            .arg("-show_entries")
            .arg("format=duration")
            .arg("-of")
            .arg("default=nokey=1:noprint_wrappers=1")
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| TranscodeError::Launch {
                tool: "ffprobe",
                source: e,
            })?;
        if !output.status.success() {
            return Err(command_failure("ffprobe", &output));
        }
        parse_duration(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Parse ffprobe's `format=duration` output
fn parse_duration(raw: &str) -> Result<f64, TranscodeError> {
    let trimmed = raw.trim();
    let secs = trimmed
        .parse::<f64>()
        .map_err(|_| TranscodeError::Probe(trimmed.to_string()))?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(TranscodeError::Probe(trimmed.to_string()));
    }
    Ok(secs)
}

/// Build a `Failed` error carrying the tail of stderr for diagnosis
fn command_failure(tool: &'static str, output: &std::process::Output) -> TranscodeError {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let trimmed = stderr.trim();
    let stderr_tail = if trimmed.is_empty() {
        String::new()
    } else {
        // Keep only the last few hundred bytes; ffmpeg errors end with the
        // useful part.
        let tail_start = trimmed
            .char_indices()
            .rev()
            .take(400)
            .last()
            .map(|(i, _)| i)
            .unwrap_or(0);
        format!(" (stderr: {})", &trimmed[tail_start..])
    };
    TranscodeError::Failed {
        tool,
        status: output.status.code().unwrap_or(-1),
        stderr_tail,
    }
}

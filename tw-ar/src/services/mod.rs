//! External collaborator capabilities consumed by the pipeline
//!
//! Each capability is an object-safe async trait so the orchestrator can be
//! exercised in tests without ffmpeg, the storage gateway, or the network.

pub mod pages;
pub mod storage;
pub mod transcoder;

pub use pages::{DbPageSource, PageSource};
pub use storage::{ArtifactStore, BlobFetcher, StorageError, StorageGateway};
pub use transcoder::{FfmpegTranscoder, FilterJob, JobInput, TranscodeError, Transcoder};

//! Data models for the render service

pub mod job;
pub mod page;

pub use job::{JobStatus, JobStep, RenderJob, StepTransition};
pub use page::RecordingPage;

//! Shared data models for the avatar stylization pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Source video metadata
//! - Style profiles and the static style registry
//! - Pipeline stage identifiers
//! - Jobs and job status updates exchanged with the job tracker

pub mod job;
pub mod stage;
pub mod style;
pub mod video;

// Re-export common types
pub use job::{Job, JobId, JobStatus, JobStatusUpdate, DEFAULT_PIPELINE, DEFAULT_SEED};
pub use stage::PipelineStage;
pub use style::{FastInference, StyleConfig, StyleRegistry, UnknownStyle, DEFAULT_FACE_DESCRIPTION};
pub use video::VideoMeta;

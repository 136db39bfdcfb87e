//! Avatar stylization worker.
//!
//! This crate provides:
//! - The resumable, manifest-driven pipeline orchestrator
//! - Job directory layout and manifest persistence
//! - Best-effort job status reporting
//! - Structured job logging and stage metrics

pub mod config;
pub mod error;
pub mod layout;
pub mod logging;
pub mod manifest;
pub mod metrics;
pub mod pipeline;
pub mod stages;
pub mod status;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use layout::JobLayout;
pub use logging::JobLogger;
pub use manifest::{Manifest, ManifestStore};
pub use pipeline::{JobOutcome, JobRequest, Pipeline, PipelineOptions};
pub use status::{HttpStatusSink, NoopStatusSink, StatusSink};

//! Worker error types.

use std::path::PathBuf;

use avatar_models::{PipelineStage, UnknownStyle};
use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    UnknownStyle(#[from] UnknownStyle),

    #[error("Input video not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("Manifest {} is corrupt: {message}", path.display())]
    ManifestCorrupt { path: PathBuf, message: String },

    #[error(
        "Job directory {} was created for different inputs (manifest {expected}, run {actual}); use a fresh job directory",
        job_dir.display()
    )]
    ManifestMismatch {
        job_dir: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("Stage {stage} failed: {source}")]
    Stage {
        stage: PipelineStage,
        #[source]
        source: avatar_media::MediaError,
    },

    #[error("Cached output of stage {stage} is incomplete: {message}")]
    StaleStage {
        stage: PipelineStage,
        message: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn stage(stage: PipelineStage, source: avatar_media::MediaError) -> Self {
        Self::Stage { stage, source }
    }

    pub fn stale(stage: PipelineStage, message: impl Into<String>) -> Self {
        Self::StaleStage {
            stage,
            message: message.into(),
        }
    }

    /// Errors raised before any stage runs; no job state was touched.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            WorkerError::UnknownStyle(_)
                | WorkerError::InputNotFound(_)
                | WorkerError::ManifestMismatch { .. }
                | WorkerError::Config(_)
        )
    }

    /// The stage that failed, if the error came from one.
    pub fn failed_stage(&self) -> Option<PipelineStage> {
        match self {
            WorkerError::Stage { stage, .. } | WorkerError::StaleStage { stage, .. } => {
                Some(*stage)
            }
            _ => None,
        }
    }
}

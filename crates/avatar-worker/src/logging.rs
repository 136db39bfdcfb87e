//! Structured job logging utilities.
//!
//! Every pipeline event carries the job id and the operation (the style
//! being rendered) so interleaved runs stay separable in JSON logs.

use std::time::Duration;

use tracing::{error, info, warn, Span};

use avatar_models::{JobId, PipelineStage};

/// Job logger for structured logging with consistent formatting.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    operation: String,
}

impl JobLogger {
    /// Create a new job logger for a specific job and operation.
    pub fn new(job_id: &JobId, operation: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            operation: operation.to_string(),
        }
    }

    /// Create a new job logger from a string job ID.
    pub fn from_string(job_id: &str, operation: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            operation: operation.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job completed: {}", message
        );
    }

    /// A stage is about to execute.
    pub fn stage_started(&self, stage: PipelineStage, detail: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            stage = %stage,
            "{} {}", stage.label(), detail
        );
    }

    /// A stage was skipped because the manifest marks it done.
    pub fn stage_cached(&self, stage: PipelineStage) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            stage = %stage,
            "{}: cached", stage.label()
        );
    }

    pub fn stage_completed(&self, stage: PipelineStage, frames: usize, elapsed: Duration) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            stage = %stage,
            frames,
            elapsed_ms = elapsed.as_millis() as u64,
            "{} done: {} frames in {:.1}s", stage.label(), frames, elapsed.as_secs_f64()
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Create a tracing span for this job.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            operation = %self.operation
        )
    }
}

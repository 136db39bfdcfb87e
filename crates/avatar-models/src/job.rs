//! Job definitions exchanged between the submission API and the worker.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Name of the only pipeline the worker knows.
pub const DEFAULT_PIPELINE: &str = "output_a";

/// Seed used when a request does not carry one.
pub const DEFAULT_SEED: u64 = 42;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, used in job directory names.
    pub fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(8)
            .map(|(i, _)| i)
            .unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job processing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for a worker
    #[default]
    Queued,
    /// Pipeline is executing
    Running,
    /// Output video is available
    Done,
    /// Pipeline aborted with an error
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An avatar generation job as tracked by the submission API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    pub job_id: JobId,
    /// Pipeline name
    pub pipeline: String,
    /// Uploaded asset the job reads from
    pub asset_id: String,
    pub style_id: String,
    pub seed: u64,
    pub status: JobStatus,
    /// Progress fraction in [0, 1]
    pub progress: f64,
    pub output_url: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// Create a queued job.
    pub fn new(asset_id: impl Into<String>, style_id: impl Into<String>, seed: u64) -> Self {
        Self {
            job_id: JobId::new(),
            pipeline: DEFAULT_PIPELINE.to_string(),
            asset_id: asset_id.into(),
            style_id: style_id.into(),
            seed,
            status: JobStatus::Queued,
            progress: 0.0,
            output_url: None,
            error: None,
            created_at: Utc::now(),
        }
    }

    /// Merge a status update. Absent optional fields keep their value.
    pub fn apply(&mut self, update: &JobStatusUpdate) {
        self.status = update.status;
        if let Some(progress) = update.progress {
            self.progress = progress.clamp(0.0, 1.0);
        }
        if let Some(url) = update.output_url.as_ref().filter(|u| !u.is_empty()) {
            self.output_url = Some(url.clone());
        }
        if let Some(error) = update.error.as_ref().filter(|e| !e.is_empty()) {
            self.error = Some(error.clone());
        }
    }
}

/// Status report sent by the worker to the job tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobStatusUpdate {
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobStatusUpdate {
    pub fn running(progress: f64) -> Self {
        Self {
            status: JobStatus::Running,
            progress: Some(progress),
            output_url: None,
            error: None,
        }
    }

    pub fn done(output_url: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Done,
            progress: Some(1.0),
            output_url: Some(output_url.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Failed,
            progress: None,
            output_url: None,
            error: Some(error.into()),
        }
    }
}

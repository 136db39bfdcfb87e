//! Pipeline metrics.
//!
//! Recorded through the `metrics` facade; a binary decides whether a
//! recorder is installed.

use metrics::{counter, histogram};

use avatar_models::PipelineStage;

/// Metric names as constants for consistency.
pub mod names {
    pub const STAGE_COMPLETED_TOTAL: &str = "avatar_stage_completed_total";
    pub const STAGE_DURATION_SECONDS: &str = "avatar_stage_duration_seconds";
    pub const STAGE_CACHED_TOTAL: &str = "avatar_stage_cached_total";
    pub const FRAMES_STYLIZED_TOTAL: &str = "avatar_frames_stylized_total";
    pub const JOBS_FAILED_TOTAL: &str = "avatar_jobs_failed_total";
}

pub fn record_stage_completed(stage: PipelineStage, style_id: &str, duration_secs: f64) {
    let labels = [
        ("stage", stage.as_str().to_string()),
        ("style", style_id.to_string()),
    ];
    counter!(names::STAGE_COMPLETED_TOTAL, &labels).increment(1);
    histogram!(names::STAGE_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_stage_cached(stage: PipelineStage) {
    let labels = [("stage", stage.as_str().to_string())];
    counter!(names::STAGE_CACHED_TOTAL, &labels).increment(1);
}

pub fn record_frames_stylized(style_id: &str, count: usize) {
    let labels = [("style", style_id.to_string())];
    counter!(names::FRAMES_STYLIZED_TOTAL, &labels).increment(count as u64);
}

pub fn record_job_failed(stage: Option<PipelineStage>) {
    let labels = [(
        "stage",
        stage.map(|s| s.as_str()).unwrap_or("input").to_string(),
    )];
    counter!(names::JOBS_FAILED_TOTAL, &labels).increment(1);
}

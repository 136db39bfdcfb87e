//! Job status handlers.
//!
//! Clients poll `GET /v0/jobs/:job_id`; the worker reports progress with
//! `PATCH /v0/jobs/:job_id`.

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use tracing::debug;

use avatar_models::{Job, JobStatusUpdate};

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub jobs: Vec<Job>,
}

/// GET /v0/jobs
pub async fn list_jobs(State(state): State<AppState>) -> Json<JobListResponse> {
    Json(JobListResponse {
        jobs: state.jobs.list().await,
    })
}

/// GET /v0/jobs/:job_id
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<Job>> {
    state
        .jobs
        .get(&job_id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Job not found"))
}

/// PATCH /v0/jobs/:job_id
///
/// Absent optional fields leave the job's values untouched.
pub async fn update_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Json(update): Json<JobStatusUpdate>,
) -> ApiResult<Json<Job>> {
    let job = state
        .jobs
        .apply(&job_id, &update)
        .await
        .ok_or_else(|| ApiError::not_found("Job not found"))?;
    debug!(job_id = %job_id, status = %job.status, progress = job.progress, "Job updated");
    metrics::record_job_update(job.status.as_str());
    Ok(Json(job))
}

//! Generation job submission.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use tracing::info;
use validator::Validate;

use avatar_models::{Job, DEFAULT_SEED};

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

fn default_seed() -> u64 {
    DEFAULT_SEED
}

/// Body of `POST /v0/generation`.
#[derive(Debug, Deserialize, Validate)]
pub struct GenerationRequest {
    #[validate(length(min = 1, max = 128))]
    pub asset_id: String,
    #[validate(length(min = 1, max = 64))]
    pub style_id: String,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

/// POST /v0/generation
///
/// Queue an avatar generation job. The job is only recorded; a worker
/// picks it up out of band and reports back through `PATCH /v0/jobs/:id`.
pub async fn submit_generation(
    State(state): State<AppState>,
    Json(request): Json<GenerationRequest>,
) -> ApiResult<Json<Job>> {
    request.validate()?;
    if let Err(e) = state.styles.get(&request.style_id) {
        return Err(ApiError::bad_request(format!("Invalid style_id. {}", e)));
    }

    let job = state
        .jobs
        .insert(Job::new(request.asset_id, request.style_id, request.seed))
        .await;
    info!(
        job_id = %job.job_id,
        asset_id = %job.asset_id,
        style_id = %job.style_id,
        "Queued generation job"
    );
    metrics::record_job_submitted(&job.style_id);
    Ok(Json(job))
}

//! Prometheus metrics for the API server.

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

/// Initialize the Prometheus metrics recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "avatar_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "avatar_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "avatar_http_requests_in_flight";

    // Job metrics
    pub const JOBS_SUBMITTED_TOTAL: &str = "avatar_jobs_submitted_total";
    pub const JOB_UPDATES_TOTAL: &str = "avatar_job_updates_total";
    pub const ASSETS_UPLOADED_TOTAL: &str = "avatar_assets_uploaded_total";
    pub const UPLOAD_BYTES_TOTAL: &str = "avatar_upload_bytes_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record a queued generation job.
pub fn record_job_submitted(style_id: &str) {
    let labels = [("style", style_id.to_string())];
    counter!(names::JOBS_SUBMITTED_TOTAL, &labels).increment(1);
}

/// Record a worker status update.
pub fn record_job_update(status: &str) {
    let labels = [("status", status.to_string())];
    counter!(names::JOB_UPDATES_TOTAL, &labels).increment(1);
}

/// Record a stored upload.
pub fn record_asset_uploaded(bytes: u64) {
    counter!(names::ASSETS_UPLOADED_TOTAL).increment(1);
    counter!(names::UPLOAD_BYTES_TOTAL).increment(bytes);
}

/// Collapse per-resource path segments so labels stay low-cardinality.
fn sanitize_path(path: &str) -> String {
    let mut out = Vec::new();
    let mut previous = "";
    for segment in path.split('/') {
        let replaced = match previous {
            "jobs" => ":job_id",
            "assets" if segment != "upload" => ":asset_id",
            _ => segment,
        };
        out.push(replaced);
        previous = segment;
    }
    out.join("/")
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path() {
        assert_eq!(
            sanitize_path("/v0/jobs/550e8400-e29b-41d4-a716-446655440000"),
            "/v0/jobs/:job_id"
        );
        assert_eq!(sanitize_path("/v0/assets/abc123"), "/v0/assets/:asset_id");
        assert_eq!(sanitize_path("/v0/assets/upload"), "/v0/assets/upload");
        assert_eq!(sanitize_path("/v0/jobs"), "/v0/jobs");
        assert_eq!(sanitize_path("/health"), "/health");
    }
}

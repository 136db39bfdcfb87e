//! Best-effort job status reporting.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use avatar_models::JobStatusUpdate;

/// Side channel to an external job tracker. Never fails the pipeline.
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn report(&self, job_id: &str, update: JobStatusUpdate);
}

/// Drops every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopStatusSink;

#[async_trait]
impl StatusSink for NoopStatusSink {
    async fn report(&self, job_id: &str, update: JobStatusUpdate) {
        debug!(job_id, status = %update.status, "Status update (not reported)");
    }
}

/// PATCHes `{base_url}/v0/jobs/{job_id}`.
#[derive(Debug, Clone)]
pub struct HttpStatusSink {
    client: Client,
    base_url: String,
}

impl HttpStatusSink {
    pub const TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new(base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Self::TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                warn!("Falling back to default HTTP client: {}", e);
                Client::new()
            });
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl StatusSink for HttpStatusSink {
    async fn report(&self, job_id: &str, update: JobStatusUpdate) {
        let url = format!("{}/v0/jobs/{}", self.base_url, job_id);
        match self
            .client
            .patch(&url)
            .timeout(Self::TIMEOUT)
            .json(&update)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => {
                debug!(job_id, status = %update.status, "Reported job status");
            }
            Ok(resp) => {
                warn!(job_id, "Job tracker answered {} to status update", resp.status());
            }
            Err(e) => {
                warn!(job_id, "Job status update failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_patches_job() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/v0/jobs/job-1"))
            .and(body_json(json!({"status": "running", "progress": 0.5})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        HttpStatusSink::new(format!("{}/", server.uri()))
            .report("job-1", JobStatusUpdate::running(0.5))
            .await;
    }

    #[tokio::test]
    async fn test_errors_are_swallowed() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        HttpStatusSink::new(server.uri())
            .report("job-2", JobStatusUpdate::failed("boom"))
            .await;

        // Nothing listening.
        HttpStatusSink::new("http://127.0.0.1:9")
            .report("job-3", JobStatusUpdate::done("/out.mp4"))
            .await;
    }

    #[tokio::test]
    async fn test_slow_tracker_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
            .mount(&server)
            .await;

        let started = std::time::Instant::now();
        HttpStatusSink::new(server.uri())
            .report("job-4", JobStatusUpdate::running(0.25))
            .await;
        assert!(started.elapsed() < HttpStatusSink::TIMEOUT * 3);
    }
}

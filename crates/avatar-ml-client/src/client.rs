//! Low-level JSON client.

use std::time::{Duration, Instant};

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{MlClientError, MlClientResult};
use crate::wire::{LoadRequest, LoadResponse, ModelKind, UnloadRequest};

/// Inference service connection settings.
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    pub base_url: String,
    /// Per-request timeout; stylization of a large frame can be slow
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8100".to_string(),
            timeout: Duration::from_secs(300),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl InferenceConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("AVATAR_INFERENCE_URL").unwrap_or(defaults.base_url),
            timeout: std::env::var("AVATAR_INFERENCE_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            connect_timeout: defaults.connect_timeout,
        }
    }
}

/// Shared HTTP client for the inference service. Cheap to clone.
#[derive(Debug, Clone)]
pub struct InferenceClient {
    http: Client,
    base_url: String,
}

impl InferenceClient {
    pub fn new(config: &InferenceConfig) -> MlClientResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST `body` to `path` and decode the JSON answer.
    pub async fn post_json<B, R>(&self, path: &str, body: &B) -> MlClientResult<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let start = Instant::now();
        let response = self.http.post(&url).json(body).send().await?;
        let status = response.status();
        debug!(
            "POST {} -> {} in {}ms",
            path,
            status.as_u16(),
            start.elapsed().as_millis()
        );

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MlClientError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| MlClientError::invalid_response(format!("{} body: {}", path, e)))
    }

    /// Acquire a model instance.
    pub async fn load(&self, kind: ModelKind, model_id: Option<&str>) -> MlClientResult<String> {
        let resp: LoadResponse = self
            .post_json("/v1/models/load", &LoadRequest { kind, model_id })
            .await?;
        if resp.handle.is_empty() {
            return Err(MlClientError::invalid_response("empty model handle"));
        }
        debug!("Loaded {:?} model as {}", kind, resp.handle);
        Ok(resp.handle)
    }

    /// Release a model instance.
    pub async fn unload(&self, handle: &str) -> MlClientResult<()> {
        let url = format!("{}/v1/models/unload", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&UnloadRequest { handle })
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            warn!("Unload of {} returned {}: {}", handle, status, body);
            return Err(MlClientError::Status { status, body });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_slash_trimmed() {
        let client = InferenceClient::new(&InferenceConfig::new("http://ml:8100/")).unwrap();
        assert_eq!(client.base_url(), "http://ml:8100");
    }

    #[test]
    fn test_default_config() {
        let config = InferenceConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(300));
        assert_eq!(config.base_url, "http://localhost:8100");
    }
}

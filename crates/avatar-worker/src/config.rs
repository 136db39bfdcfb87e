//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{WorkerError, WorkerResult};

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Stylize every Nth frame and interpolate the rest; 1 = dense mode
    pub keyframe_interval: usize,
    /// In-flight capability calls per stage
    pub frame_concurrency: usize,
    /// Inference service base URL
    pub inference_url: String,
    pub inference_timeout: Duration,
    /// Job tracker base URL; `None` disables status reporting
    pub backend_url: Option<String>,
    /// Kill FFmpeg after this long
    pub ffmpeg_timeout: Duration,
    /// Default root for job directories and outputs
    pub output_dir: PathBuf,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            keyframe_interval: 1,
            frame_concurrency: 4,
            inference_url: "http://localhost:8100".to_string(),
            inference_timeout: Duration::from_secs(300),
            backend_url: None,
            ffmpeg_timeout: Duration::from_secs(1800), // 30 minutes
            output_dir: PathBuf::from("data/outputs"),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            keyframe_interval: std::env::var("AVATAR_KEYFRAME_INTERVAL")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1),
            frame_concurrency: std::env::var("AVATAR_FRAME_CONCURRENCY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(4),
            inference_url: std::env::var("AVATAR_INFERENCE_URL")
                .unwrap_or_else(|_| "http://localhost:8100".to_string()),
            inference_timeout: Duration::from_secs(
                std::env::var("AVATAR_INFERENCE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(300),
            ),
            backend_url: std::env::var("BACKEND_URL").ok().filter(|s| !s.is_empty()),
            ffmpeg_timeout: Duration::from_secs(
                std::env::var("AVATAR_FFMPEG_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1800),
            ),
            output_dir: std::env::var("AVATAR_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data/outputs")),
        }
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> WorkerResult<()> {
        if self.keyframe_interval == 0 {
            return Err(WorkerError::config_error("keyframe interval must be >= 1"));
        }
        if self.frame_concurrency == 0 {
            return Err(WorkerError::config_error("frame concurrency must be >= 1"));
        }
        Ok(())
    }
}

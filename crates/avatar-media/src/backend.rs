//! Extraction/encoding seam used by the orchestrator.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use avatar_models::VideoMeta;

use crate::command::FfmpegRunner;
use crate::error::MediaResult;
use crate::{decode, encode};

/// Container demux/remux operations.
#[async_trait]
pub trait MediaBackend: Send + Sync {
    /// Write every frame of `video` as `frame_NNNNNN.png` into `frames_dir`.
    async fn extract(&self, video: &Path, frames_dir: &Path) -> MediaResult<(Vec<PathBuf>, VideoMeta)>;

    /// Encode the `final_NNNNNN.png` frames of `frame_dir` at `fps`.
    async fn encode(&self, frame_dir: &Path, output: &Path, fps: f64) -> MediaResult<PathBuf>;
}

/// FFmpeg subprocess backend.
#[derive(Debug, Clone, Default)]
pub struct FfmpegBackend {
    runner: FfmpegRunner,
}

impl FfmpegBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill FFmpeg invocations that run longer than `secs`.
    pub fn with_timeout(secs: u64) -> Self {
        Self {
            runner: FfmpegRunner::new().with_timeout(secs),
        }
    }
}

#[async_trait]
impl MediaBackend for FfmpegBackend {
    async fn extract(&self, video: &Path, frames_dir: &Path) -> MediaResult<(Vec<PathBuf>, VideoMeta)> {
        decode::extract_frames(video, frames_dir, &self.runner).await
    }

    async fn encode(&self, frame_dir: &Path, output: &Path, fps: f64) -> MediaResult<PathBuf> {
        encode::encode_video(frame_dir, output, fps, &self.runner).await
    }
}

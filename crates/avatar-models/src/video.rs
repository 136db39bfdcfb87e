//! Source video metadata.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Metadata of the source video, derived once at extraction.
///
/// `frame_count` starts as a probe-time estimate and is replaced by the
/// number of frames actually written to disk; the two may differ by one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VideoMeta {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Frame rate, rational rate normalized to a double
    pub fps: f64,
    /// Duration in seconds
    pub duration: f64,
    /// Number of frames
    pub frame_count: usize,
}

impl VideoMeta {
    /// Build metadata from probe results, estimating the frame count.
    pub fn from_probe(width: u32, height: u32, fps: f64, duration: f64) -> Self {
        Self {
            width,
            height,
            fps,
            duration,
            frame_count: Self::estimated_frame_count(fps, duration),
        }
    }

    /// `round(fps * duration)`, clamped at zero.
    pub fn estimated_frame_count(fps: f64, duration: f64) -> usize {
        let estimate = (fps * duration).round();
        if estimate.is_finite() && estimate > 0.0 {
            estimate as usize
        } else {
            0
        }
    }

    /// Replace the estimate with the materialized frame count.
    pub fn with_frame_count(mut self, frame_count: usize) -> Self {
        self.frame_count = frame_count;
        self
    }

    /// Duration of a single frame in seconds.
    pub fn frame_duration(&self) -> f64 {
        if self.fps > 0.0 {
            1.0 / self.fps
        } else {
            0.0
        }
    }
}

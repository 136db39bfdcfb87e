//! Pipeline stage identifiers.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// One step of the avatar pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Frame extraction from the source video
    Decode,
    /// Pose control images
    FaceLandmarks,
    /// Depth control images
    DepthEstimation,
    /// Generative stylization (every frame, or keyframes only)
    Stylize,
    /// Keyframe interpolation (sampled mode only)
    Interpolate,
    /// Color transfer and temporal blending
    Postprocess,
    /// Re-encoding of the final frames
    Encode,
}

impl PipelineStage {
    /// All stages in execution order.
    pub const ORDER: [PipelineStage; 7] = [
        PipelineStage::Decode,
        PipelineStage::FaceLandmarks,
        PipelineStage::DepthEstimation,
        PipelineStage::Stylize,
        PipelineStage::Interpolate,
        PipelineStage::Postprocess,
        PipelineStage::Encode,
    ];

    /// Manifest key.
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Decode => "decode",
            PipelineStage::FaceLandmarks => "face_landmarks",
            PipelineStage::DepthEstimation => "depth_estimation",
            PipelineStage::Stylize => "stylize",
            PipelineStage::Interpolate => "interpolate",
            PipelineStage::Postprocess => "postprocess",
            PipelineStage::Encode => "encode",
        }
    }

    /// Human-readable progress label, e.g. `[4/7] stylize`.
    pub fn label(&self) -> String {
        format!("[{}/{}] {}", self.position() + 1, Self::ORDER.len(), self.as_str())
    }

    /// Zero-based position in [`PipelineStage::ORDER`].
    pub fn position(&self) -> usize {
        Self::ORDER
            .iter()
            .position(|s| s == self)
            .unwrap_or_default()
    }

    /// Stages executed for a run with the given keyframe interval.
    pub fn plan(keyframe_interval: usize) -> Vec<PipelineStage> {
        Self::ORDER
            .into_iter()
            .filter(|s| *s != PipelineStage::Interpolate || keyframe_interval > 1)
            .collect()
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PipelineStage {
    type Err = StageParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ORDER
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| StageParseError(s.to_string()))
    }
}

#[derive(Debug, Error)]
#[error("Unknown pipeline stage: {0}")]
pub struct StageParseError(String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_keys_round_trip() {
        for stage in PipelineStage::ORDER {
            assert_eq!(stage.as_str().parse::<PipelineStage>().unwrap(), stage);
        }
        assert!("upscale".parse::<PipelineStage>().is_err());
    }

    #[test]
    fn test_serde_matches_manifest_key() {
        let json = serde_json::to_string(&PipelineStage::DepthEstimation).unwrap();
        assert_eq!(json, "\"depth_estimation\"");
    }

    #[test]
    fn test_plan_skips_interpolation_in_dense_mode() {
        let dense = PipelineStage::plan(1);
        assert_eq!(dense.len(), 6);
        assert!(!dense.contains(&PipelineStage::Interpolate));

        let sampled = PipelineStage::plan(5);
        assert_eq!(sampled.len(), 7);
        assert_eq!(sampled[4], PipelineStage::Interpolate);
    }

    #[test]
    fn test_label() {
        assert_eq!(PipelineStage::Stylize.label(), "[4/7] stylize");
        assert_eq!(PipelineStage::Encode.label(), "[7/7] encode");
    }
}

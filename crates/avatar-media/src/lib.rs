#![deny(unreachable_patterns)]
//! Media plumbing and frame algorithms for the avatar pipeline.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building and a runner with timeout handling
//! - Frame extraction and re-encoding, behind the [`MediaBackend`] seam
//! - Deterministic frame naming so lexical order equals temporal order
//! - Capability interfaces for the pose, depth and stylizer models
//! - Keyframe selection and optical-flow interpolation
//! - Color transfer and temporal blending post-processing

pub mod backend;
pub mod capability;
pub mod color;
pub mod command;
pub mod decode;
pub mod depth;
pub mod encode;
pub mod error;
pub mod flow;
pub mod frames;
pub mod image_io;
pub mod interpolate;
pub mod postprocess;
pub mod probe;
pub mod progress;
pub mod temporal;

pub use backend::{FfmpegBackend, MediaBackend};
pub use capability::{
    ControlImages, DepthRenderer, ModelProvider, PoseRender, PoseRenderer, Stylizer,
};
pub use color::color_transfer;
pub use command::{FfmpegCommand, FfmpegRunner};
pub use decode::extract_frames;
pub use depth::normalize_depth;
pub use encode::encode_video;
pub use error::{MediaError, MediaResult};
pub use flow::{BlockMatchFlow, FlowEstimator, FlowField};
pub use frames::FrameKind;
pub use interpolate::{expand_keyframes, KeyframePlan, Segment};
pub use postprocess::postprocess_frames;
pub use probe::probe_video;
pub use progress::FfmpegProgress;
pub use temporal::{temporal_blend, temporal_weights};

/// Re-exported image types used across capability boundaries.
pub use image::{GrayImage, RgbImage};

//! Model capability interfaces.
//!
//! The pose, depth and stylizer models are external collaborators. The
//! pipeline only sees these traits. Heavy models are obtained through a
//! [`ModelProvider`] and released when the returned handle is dropped, so
//! a stage holds its model exactly as long as its own scope, failure paths
//! included.

use async_trait::async_trait;
use image::{GrayImage, RgbImage};

use avatar_models::StyleConfig;

use crate::error::MediaResult;

/// Result of pose detection on one frame.
#[derive(Debug, Clone)]
pub struct PoseRender {
    /// Rendered landmark/skeleton control image; all zero when no face
    pub image: RgbImage,
    pub face_found: bool,
}

impl PoseRender {
    /// Blank control image for a frame without a face.
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            image: RgbImage::new(width, height),
            face_found: false,
        }
    }
}

/// Control images conditioning the stylizer.
#[derive(Debug, Clone)]
pub struct ControlImages {
    pub pose: RgbImage,
    pub depth: GrayImage,
}

/// Face landmark detector rendering a pose control image.
#[async_trait]
pub trait PoseRenderer: Send + Sync {
    /// Never fails for "no face"; returns [`PoseRender::blank`] instead.
    async fn detect(&self, frame: &RgbImage, width: u32, height: u32) -> MediaResult<PoseRender>;
}

/// Monocular depth estimator.
#[async_trait]
pub trait DepthRenderer: Send + Sync {
    /// Grayscale depth stretched to 0..=255 per frame; all zero if constant.
    async fn estimate(&self, frame: &RgbImage) -> MediaResult<GrayImage>;
}

/// Generative stylizer conditioned on pose and depth.
#[async_trait]
pub trait Stylizer: Send + Sync {
    /// Deterministic for identical inputs and seed.
    async fn stylize(
        &self,
        frame: &RgbImage,
        control: &ControlImages,
        style: &StyleConfig,
        seed: u64,
    ) -> MediaResult<RgbImage>;
}

/// Scoped acquisition of model instances.
///
/// Each call loads one instance that is reused for every frame of a stage.
/// Dropping the handle releases the instance and its accelerator memory.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn load_pose(&self) -> MediaResult<Box<dyn PoseRenderer>>;

    async fn load_depth(&self) -> MediaResult<Box<dyn DepthRenderer>>;

    async fn load_stylizer(&self, style: &StyleConfig) -> MediaResult<Box<dyn Stylizer>>;
}

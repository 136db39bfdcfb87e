//! Request/response bodies of the inference protocol.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{DynamicImage, GrayImage, RgbImage};
use serde::{Deserialize, Serialize};

use avatar_media::image_io::{decode_image, encode_png};

use crate::error::MlClientResult;

/// Model families the service can load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Pose,
    Depth,
    Stylizer,
}

#[derive(Debug, Serialize)]
pub struct LoadRequest<'a> {
    pub kind: ModelKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
pub struct LoadResponse {
    pub handle: String,
}

#[derive(Debug, Serialize)]
pub struct UnloadRequest<'a> {
    pub handle: &'a str,
}

#[derive(Debug, Serialize)]
pub struct PoseRequest<'a> {
    pub handle: &'a str,
    pub image: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Deserialize)]
pub struct PoseResponse {
    pub image: String,
    pub face_found: bool,
}

#[derive(Debug, Serialize)]
pub struct DepthRequest<'a> {
    pub handle: &'a str,
    pub image: String,
}

/// Raw row-major depth field; normalized client-side.
#[derive(Debug, Deserialize)]
pub struct DepthResponse {
    pub width: u32,
    pub height: u32,
    pub depth: Vec<f32>,
}

#[derive(Debug, Serialize)]
pub struct StylizeRequest<'a> {
    pub handle: &'a str,
    pub image: String,
    pub pose: String,
    pub depth: String,
    pub prompt: String,
    pub negative_prompt: &'a str,
    pub denoising_strength: f32,
    pub num_inference_steps: u32,
    pub guidance_scale: f32,
    pub pose_weight: f32,
    pub depth_weight: f32,
    pub seed: u64,
}

#[derive(Debug, Deserialize)]
pub struct StylizeResponse {
    pub image: String,
}

/// Base64 PNG of an RGB frame.
pub fn rgb_to_b64(img: &RgbImage) -> MlClientResult<String> {
    Ok(STANDARD.encode(encode_png(&DynamicImage::ImageRgb8(img.clone()))?))
}

/// Base64 PNG of a grayscale image.
pub fn gray_to_b64(img: &GrayImage) -> MlClientResult<String> {
    Ok(STANDARD.encode(encode_png(&DynamicImage::ImageLuma8(img.clone()))?))
}

/// Decode a base64 image payload to RGB.
pub fn b64_to_rgb(data: &str) -> MlClientResult<RgbImage> {
    let bytes = STANDARD.decode(data)?;
    Ok(decode_image(&bytes)?.to_rgb8())
}

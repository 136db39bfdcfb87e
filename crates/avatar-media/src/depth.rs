//! Depth field normalization.

use image::GrayImage;

use crate::error::{MediaError, MediaResult};

/// Min-max stretch a raw depth field to an 8-bit grayscale image.
///
/// A constant field (including an all-non-finite one) yields an all-zero
/// image rather than dividing by zero.
pub fn normalize_depth(field: &[f32], width: u32, height: u32) -> MediaResult<GrayImage> {
    let expected = width as usize * height as usize;
    if field.len() != expected {
        return Err(MediaError::capability(
            "depth",
            format!(
                "depth field has {} values, expected {}x{}={}",
                field.len(),
                width,
                height,
                expected
            ),
        ));
    }

    let (min, max) = field
        .iter()
        .filter(|v| v.is_finite())
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });

    let range = max - min;
    if !(range.is_finite() && range > 0.0) {
        return Ok(GrayImage::new(width, height));
    }

    let pixels = field
        .iter()
        .map(|&v| {
            if v.is_finite() {
                ((v - min) / range * 255.0).clamp(0.0, 255.0) as u8
            } else {
                0
            }
        })
        .collect();

    GrayImage::from_raw(width, height, pixels)
        .ok_or_else(|| MediaError::internal("depth buffer size mismatch"))
}

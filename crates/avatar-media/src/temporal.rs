//! Temporal smoothing over neighbouring frames.

use image::RgbImage;

use crate::error::{MediaError, MediaResult};

/// Normalized `(frame, weight)` pairs for the window around `index`.
///
/// Each neighbour at distance `d <= radius` weighs `1 / (1 + d)`; the window
/// is truncated at the sequence edges before normalizing.
pub fn temporal_weights(len: usize, index: usize, radius: usize) -> Vec<(usize, f32)> {
    if index >= len {
        return Vec::new();
    }
    let lo = index.saturating_sub(radius);
    let hi = (index + radius).min(len - 1);
    let raw: Vec<(usize, f32)> = (lo..=hi)
        .map(|i| (i, 1.0 / (1.0 + i.abs_diff(index) as f32)))
        .collect();
    let total: f32 = raw.iter().map(|(_, w)| w).sum();
    raw.into_iter().map(|(i, w)| (i, w / total)).collect()
}

/// Weighted average of the frames around `index`, rounded to nearest.
///
/// A radius of zero returns the frame itself.
pub fn temporal_blend(frames: &[RgbImage], index: usize, radius: usize) -> MediaResult<RgbImage> {
    let center = frames.get(index).ok_or_else(|| {
        MediaError::internal(format!(
            "blend index {} out of range for {} frames",
            index,
            frames.len()
        ))
    })?;
    if radius == 0 {
        return Ok(center.clone());
    }

    let dims = center.dimensions();
    let mut acc = vec![0.0f32; center.as_raw().len()];
    for (i, weight) in temporal_weights(frames.len(), index, radius) {
        let frame = &frames[i];
        if frame.dimensions() != dims {
            return Err(MediaError::sequence_mismatch(format!(
                "frame {} is {:?}, frame {} is {:?}",
                i,
                frame.dimensions(),
                index,
                dims
            )));
        }
        for (a, &v) in acc.iter_mut().zip(frame.as_raw()) {
            *a += weight * v as f32;
        }
    }

    let pixels = acc
        .into_iter()
        .map(|v| v.round().clamp(0.0, 255.0) as u8)
        .collect();
    RgbImage::from_raw(dims.0, dims.1, pixels)
        .ok_or_else(|| MediaError::internal("blend buffer size mismatch"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn solid(v: u8) -> RgbImage {
        RgbImage::from_pixel(4, 3, Rgb([v, v, v]))
    }

    #[test]
    fn test_weights_at_sequence_start() {
        let w = temporal_weights(10, 0, 2);
        let indices: Vec<usize> = w.iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        let expected = [6.0 / 11.0, 3.0 / 11.0, 2.0 / 11.0];
        for ((_, got), want) in w.iter().zip(expected) {
            assert!((got - want).abs() < 1e-5);
        }
    }

    #[test]
    fn test_weights_centered_sum_to_one() {
        let w = temporal_weights(10, 5, 2);
        assert_eq!(w.len(), 5);
        let total: f32 = w.iter().map(|(_, w)| w).sum();
        assert!((total - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_zero_radius_is_identity() {
        let frames = vec![solid(10), solid(200), solid(30)];
        assert_eq!(temporal_blend(&frames, 1, 0).unwrap(), frames[1]);
    }

    #[test]
    fn test_blend_at_start() {
        let frames = vec![solid(0), solid(110), solid(220), solid(255)];
        let out = temporal_blend(&frames, 0, 2).unwrap();
        assert!(out.pixels().all(|p| p[0] == 70));
    }

    #[test]
    fn test_constant_sequence_unchanged() {
        let frames = vec![solid(100); 5];
        assert_eq!(temporal_blend(&frames, 2, 2).unwrap(), frames[2]);
    }

    #[test]
    fn test_out_of_range_index() {
        assert!(temporal_blend(&[solid(1)], 3, 1).is_err());
        assert!(temporal_weights(1, 3, 1).is_empty());
    }
}

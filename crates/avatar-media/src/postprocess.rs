//! Color correction followed by temporal smoothing.

use image::RgbImage;
use rayon::prelude::*;

use crate::color::color_transfer;
use crate::error::{MediaError, MediaResult};
use crate::temporal::temporal_blend;

/// Post-process a dense stylized sequence against its source frames.
///
/// Every frame is first color-matched to the source frame with the same
/// index. Blending then reads only the corrected set, so the result does
/// not depend on processing order.
pub fn postprocess_frames(
    styled: &[RgbImage],
    originals: &[RgbImage],
    color_strength: f32,
    blend_radius: usize,
) -> MediaResult<Vec<RgbImage>> {
    if styled.len() != originals.len() {
        return Err(MediaError::sequence_mismatch(format!(
            "{} stylized frames for {} source frames",
            styled.len(),
            originals.len()
        )));
    }

    let corrected: Vec<RgbImage> = styled
        .par_iter()
        .zip(originals.par_iter())
        .map(|(s, o)| color_transfer(s, o, color_strength))
        .collect::<MediaResult<_>>()?;

    if blend_radius == 0 {
        return Ok(corrected);
    }

    (0..corrected.len())
        .into_par_iter()
        .map(|i| temporal_blend(&corrected, i, blend_radius))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn solid(v: u8) -> RgbImage {
        RgbImage::from_pixel(4, 4, Rgb([v, v, v]))
    }

    #[test]
    fn test_passthrough_without_strength_or_radius() {
        let styled = vec![solid(10), solid(20)];
        let originals = vec![solid(200), solid(200)];
        assert_eq!(postprocess_frames(&styled, &originals, 0.0, 0).unwrap(), styled);
    }

    #[test]
    fn test_blend_reads_corrected_neighbours() {
        let styled = vec![solid(0), solid(110), solid(220)];
        let originals = styled.clone();
        let out = postprocess_frames(&styled, &originals, 0.0, 2).unwrap();
        assert_eq!(out.len(), 3);
        assert!(out[0].pixels().all(|p| p[0] == 70));
    }

    #[test]
    fn test_length_mismatch() {
        let err = postprocess_frames(&[solid(1)], &[], 0.5, 1).unwrap_err();
        assert!(matches!(err, MediaError::SequenceMismatch(_)));
    }
}

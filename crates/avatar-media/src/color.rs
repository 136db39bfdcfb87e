//! Lab-space statistical color transfer.
//!
//! Lab values use the common 8-bit scaling: `L * 255 / 100`, `a + 128`,
//! `b + 128`, with a D65 white point.

use std::sync::OnceLock;

use image::RgbImage;
use rayon::prelude::*;

use crate::error::{MediaError, MediaResult};

/// Added to every channel standard deviation so flat images never divide by zero.
pub const STD_EPSILON: f64 = 1e-6;

const XN: f32 = 0.950_456;
const ZN: f32 = 1.088_754;

const RGB_TO_XYZ: [[f32; 3]; 3] = [
    [0.412_453, 0.357_580, 0.180_423],
    [0.212_671, 0.715_160, 0.072_169],
    [0.019_334, 0.119_193, 0.950_227],
];

const XYZ_TO_RGB: [[f32; 3]; 3] = [
    [3.240_479, -1.537_150, -0.498_535],
    [-0.969_256, 1.875_992, 0.041_556],
    [0.055_648, -0.204_043, 1.057_311],
];

fn srgb_to_linear_lut() -> &'static [f32; 256] {
    static LUT: OnceLock<[f32; 256]> = OnceLock::new();
    LUT.get_or_init(|| {
        let mut lut = [0.0; 256];
        for (i, v) in lut.iter_mut().enumerate() {
            let c = i as f32 / 255.0;
            *v = if c <= 0.04045 {
                c / 12.92
            } else {
                ((c + 0.055) / 1.055).powf(2.4)
            };
        }
        lut
    })
}

fn linear_to_srgb(c: f32) -> f32 {
    let c = c.clamp(0.0, 1.0);
    if c <= 0.003_130_8 {
        c * 12.92
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

fn lab_f(t: f32) -> f32 {
    if t > 0.008_856 {
        t.cbrt()
    } else {
        7.787 * t + 16.0 / 116.0
    }
}

fn lab_f_inv(t: f32) -> f32 {
    if t > 0.206_893 {
        t * t * t
    } else {
        (t - 16.0 / 116.0) / 7.787
    }
}

/// sRGB pixel to unquantized 8-bit-scaled Lab.
pub fn rgb_to_lab(px: [u8; 3]) -> [f32; 3] {
    let lut = srgb_to_linear_lut();
    let rgb = [lut[px[0] as usize], lut[px[1] as usize], lut[px[2] as usize]];
    let xyz: [f32; 3] =
        std::array::from_fn(|r| RGB_TO_XYZ[r].iter().zip(rgb).map(|(m, c)| m * c).sum());
    let (x, y, z) = (xyz[0] / XN, xyz[1], xyz[2] / ZN);

    let l = if y > 0.008_856 {
        116.0 * y.cbrt() - 16.0
    } else {
        903.3 * y
    };
    let a = 500.0 * (lab_f(x) - lab_f(y));
    let b = 200.0 * (lab_f(y) - lab_f(z));
    [l * 255.0 / 100.0, a + 128.0, b + 128.0]
}

/// 8-bit-scaled Lab back to a rounded sRGB pixel.
pub fn lab_to_rgb(lab: [f32; 3]) -> [u8; 3] {
    let l = lab[0] * 100.0 / 255.0;
    let a = lab[1] - 128.0;
    let b = lab[2] - 128.0;

    let fy = (l + 16.0) / 116.0;
    let y = if l > 903.3 * 0.008_856 {
        fy * fy * fy
    } else {
        l / 903.3
    };
    let fy = lab_f(y);
    let x = lab_f_inv(fy + a / 500.0) * XN;
    let z = lab_f_inv(fy - b / 200.0) * ZN;

    let xyz = [x, y, z];
    std::array::from_fn(|r| {
        let lin: f32 = XYZ_TO_RGB[r].iter().zip(xyz).map(|(m, c)| m * c).sum();
        (linear_to_srgb(lin) * 255.0).round().clamp(0.0, 255.0) as u8
    })
}

/// Mean and population standard deviation of one Lab channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelStats {
    pub mean: f64,
    pub std: f64,
}

fn lab_pixels(img: &RgbImage) -> Vec<[f32; 3]> {
    img.as_raw()
        .par_chunks_exact(3)
        .map(|p| rgb_to_lab([p[0], p[1], p[2]]))
        .collect()
}

fn channel_stats(lab: &[[f32; 3]]) -> [ChannelStats; 3] {
    let n = lab.len().max(1) as f64;
    std::array::from_fn(|c| {
        let mean = lab.iter().map(|p| p[c] as f64).sum::<f64>() / n;
        let var = lab
            .iter()
            .map(|p| {
                let d = p[c] as f64 - mean;
                d * d
            })
            .sum::<f64>()
            / n;
        ChannelStats {
            mean,
            std: var.sqrt() + STD_EPSILON,
        }
    })
}

/// Per-channel Lab statistics of an image.
pub fn lab_stats(img: &RgbImage) -> [ChannelStats; 3] {
    channel_stats(&lab_pixels(img))
}

/// Pull `styled` toward the color statistics of `original`.
///
/// Every Lab channel is re-centered and re-scaled to the original's mean
/// and deviation, then mixed with the unmodified value by `strength`
/// (clamped to `0..=1`). A non-positive strength returns `styled`
/// unchanged, byte for byte.
pub fn color_transfer(styled: &RgbImage, original: &RgbImage, strength: f32) -> MediaResult<RgbImage> {
    if strength.is_nan() || strength <= 0.0 {
        return Ok(styled.clone());
    }
    let s = strength.min(1.0) as f64;

    let lab = lab_pixels(styled);
    let src = channel_stats(&lab);
    let tgt = lab_stats(original);

    let pixels: Vec<u8> = lab
        .par_iter()
        .flat_map_iter(|p| {
            let mixed: [f32; 3] = std::array::from_fn(|c| {
                let v = p[c] as f64;
                let mapped = (v - src[c].mean) * (tgt[c].std / src[c].std) + tgt[c].mean;
                (v * (1.0 - s) + mapped * s).clamp(0.0, 255.0) as f32
            });
            lab_to_rgb(mixed)
        })
        .collect();

    let (w, h) = styled.dimensions();
    RgbImage::from_raw(w, h, pixels)
        .ok_or_else(|| MediaError::internal("color transfer buffer size mismatch"))
}

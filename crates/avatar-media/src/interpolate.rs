//! Keyframe sampling and flow-guided frame interpolation.

use std::ops::Range;

use image::RgbImage;
use rayon::prelude::*;
use tracing::debug;

use crate::error::{MediaError, MediaResult};
use crate::flow::{to_gray, FlowEstimator, FlowField};

/// Which dense frame indices get stylized when sampling every `interval`
/// frames, and how the gaps between them are filled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyframePlan {
    frame_count: usize,
    interval: usize,
    keyframes: Vec<usize>,
}

/// One keyframe and the dense frames that follow it up to the next one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Position of the starting keyframe in the keyframe list.
    pub keyframe: usize,
    /// Position of the next keyframe, `None` for the trailing segment.
    pub next: Option<usize>,
    /// Dense indices to synthesize after the starting keyframe.
    pub fill: Range<usize>,
}

impl KeyframePlan {
    /// Keyframes at `0, k, 2k, ...` below `frame_count`.
    pub fn new(frame_count: usize, interval: usize) -> MediaResult<Self> {
        if interval == 0 {
            return Err(MediaError::internal("keyframe interval must be >= 1"));
        }
        let keyframes = (0..frame_count).step_by(interval).collect();
        Ok(Self {
            frame_count,
            interval,
            keyframes,
        })
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn interval(&self) -> usize {
        self.interval
    }

    pub fn keyframes(&self) -> &[usize] {
        &self.keyframes
    }

    /// True when only a subset of frames is stylized.
    pub fn is_sampled(&self) -> bool {
        self.interval > 1
    }

    pub fn segments(&self) -> Vec<Segment> {
        let n = self.keyframes.len();
        self.keyframes
            .iter()
            .enumerate()
            .map(|(i, &start)| {
                if i + 1 < n {
                    Segment {
                        keyframe: i,
                        next: Some(i + 1),
                        fill: start + 1..self.keyframes[i + 1],
                    }
                } else {
                    Segment {
                        keyframe: i,
                        next: None,
                        fill: start + 1..self.frame_count,
                    }
                }
            })
            .collect()
    }
}

/// Rebuild the dense sequence from stylized keyframes.
///
/// Between keyframes A and B, frame `j` of the gap uses `t = j / interval`:
/// A is backward-warped by `t` times the flow A->B and blended with B.
/// Frames after the last keyframe repeat it. The result has exactly
/// `plan.frame_count()` frames; segments are processed in parallel.
pub fn expand_keyframes(
    plan: &KeyframePlan,
    keyframes: &[RgbImage],
    estimator: &dyn FlowEstimator,
) -> MediaResult<Vec<RgbImage>> {
    if keyframes.len() != plan.keyframes().len() {
        return Err(MediaError::sequence_mismatch(format!(
            "expected {} stylized keyframes, got {}",
            plan.keyframes().len(),
            keyframes.len()
        )));
    }
    if let Some(first) = keyframes.first() {
        let dims = first.dimensions();
        if let Some(bad) = keyframes.iter().position(|k| k.dimensions() != dims) {
            return Err(MediaError::sequence_mismatch(format!(
                "keyframe {} is {:?}, expected {:?}",
                bad,
                keyframes[bad].dimensions(),
                dims
            )));
        }
    }

    let interval = plan.interval();
    let segments: Vec<Vec<RgbImage>> = plan
        .segments()
        .par_iter()
        .map(|seg| {
            let a = &keyframes[seg.keyframe];
            let mut frames = Vec::with_capacity(seg.fill.len() + 1);
            frames.push(a.clone());
            match seg.next {
                Some(next) => {
                    let b = &keyframes[next];
                    let flow = estimator.flow(&to_gray(a), &to_gray(b))?;
                    for j in 1..=seg.fill.len() {
                        let t = j as f32 / interval as f32;
                        frames.push(interpolate_frame(a, b, &flow, t)?);
                    }
                }
                None => frames.extend(seg.fill.clone().map(|_| a.clone())),
            }
            Ok(frames)
        })
        .collect::<MediaResult<_>>()?;

    let dense: Vec<RgbImage> = segments.into_iter().flatten().collect();
    if dense.len() != plan.frame_count() {
        return Err(MediaError::internal(format!(
            "interpolation produced {} frames, expected {}",
            dense.len(),
            plan.frame_count()
        )));
    }
    debug!(
        "Expanded {} keyframes to {} frames",
        keyframes.len(),
        dense.len()
    );
    Ok(dense)
}

/// `(1 - t) * warp(A, t * flow) + t * B`, rounded.
pub fn interpolate_frame(a: &RgbImage, b: &RgbImage, flow: &FlowField, t: f32) -> MediaResult<RgbImage> {
    let warped = warp_bilinear(a, flow, t)?;
    let (w, h) = a.dimensions();
    let pixels = warped
        .as_raw()
        .par_iter()
        .zip(b.as_raw().par_iter())
        .map(|(&wv, &bv)| round_u8((1.0 - t) * wv as f32 + t * bv as f32))
        .collect();
    RgbImage::from_raw(w, h, pixels).ok_or_else(|| MediaError::internal("blend buffer size mismatch"))
}

/// Sample `src` at `(x + t*fx, y + t*fy)` with bilinear filtering,
/// clamping coordinates to the image edge.
pub fn warp_bilinear(src: &RgbImage, flow: &FlowField, t: f32) -> MediaResult<RgbImage> {
    let (w, h) = src.dimensions();
    if (flow.width(), flow.height()) != (w, h) {
        return Err(MediaError::sequence_mismatch(format!(
            "flow is {}x{}, frame is {}x{}",
            flow.width(),
            flow.height(),
            w,
            h
        )));
    }
    let mut out = vec![0u8; w as usize * h as usize * 3];
    if w == 0 || h == 0 {
        return RgbImage::from_raw(w, h, out).ok_or_else(|| MediaError::internal("empty warp buffer"));
    }

    let max_x = (w - 1) as f32;
    let max_y = (h - 1) as f32;
    out.par_chunks_mut(w as usize * 3)
        .enumerate()
        .for_each(|(y, row)| {
            for x in 0..w {
                let [fx, fy] = flow.at(x, y as u32);
                let sx = (x as f32 + t * fx).clamp(0.0, max_x);
                let sy = (y as f32 + t * fy).clamp(0.0, max_y);
                let x0 = sx.floor() as u32;
                let y0 = sy.floor() as u32;
                let x1 = (x0 + 1).min(w - 1);
                let y1 = (y0 + 1).min(h - 1);
                let ax = sx - x0 as f32;
                let ay = sy - y0 as f32;
                let p00 = src.get_pixel(x0, y0);
                let p10 = src.get_pixel(x1, y0);
                let p01 = src.get_pixel(x0, y1);
                let p11 = src.get_pixel(x1, y1);
                let base = x as usize * 3;
                for c in 0..3 {
                    let top = p00[c] as f32 * (1.0 - ax) + p10[c] as f32 * ax;
                    let bottom = p01[c] as f32 * (1.0 - ax) + p11[c] as f32 * ax;
                    row[base + c] = round_u8(top * (1.0 - ay) + bottom * ay);
                }
            }
        });

    RgbImage::from_raw(w, h, out).ok_or_else(|| MediaError::internal("warp buffer size mismatch"))
}

#[inline]
fn round_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

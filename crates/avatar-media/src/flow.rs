//! Dense optical flow.

use image::{GrayImage, RgbImage};
use rayon::prelude::*;

use crate::error::{MediaError, MediaResult};

/// Per-pixel 2D displacement field, row-major `[dx, dy]`.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowField {
    width: u32,
    height: u32,
    vectors: Vec<[f32; 2]>,
}

impl FlowField {
    /// Field with no motion.
    pub fn zero(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            vectors: vec![[0.0, 0.0]; width as usize * height as usize],
        }
    }

    /// Wrap a row-major vector buffer.
    pub fn from_vectors(width: u32, height: u32, vectors: Vec<[f32; 2]>) -> MediaResult<Self> {
        if vectors.len() != width as usize * height as usize {
            return Err(MediaError::internal(format!(
                "flow buffer has {} vectors, expected {}x{}",
                vectors.len(),
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            vectors,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Displacement at `(x, y)`.
    #[inline]
    pub fn at(&self, x: u32, y: u32) -> [f32; 2] {
        self.vectors[y as usize * self.width as usize + x as usize]
    }
}

/// Deterministic dense motion estimator, `flow(A, B)` on grayscale frames.
pub trait FlowEstimator: Send + Sync {
    fn flow(&self, from: &GrayImage, to: &GrayImage) -> MediaResult<FlowField>;
}

/// Grayscale version of a frame, as fed to the flow estimator.
pub fn to_gray(frame: &RgbImage) -> GrayImage {
    image::imageops::grayscale(frame)
}

/// Block-matching estimator.
///
/// Each `block_size` square of `from` is matched against `to` within
/// `search_radius` pixels by sum of absolute differences; block vectors
/// are bilinearly upsampled to a per-pixel field. Ties prefer the
/// shortest displacement, then scan order.
#[derive(Debug, Clone, Copy)]
pub struct BlockMatchFlow {
    pub block_size: u32,
    pub search_radius: i32,
}

impl Default for BlockMatchFlow {
    fn default() -> Self {
        Self {
            block_size: 8,
            search_radius: 6,
        }
    }
}

impl BlockMatchFlow {
    fn best_offset(&self, from: &GrayImage, to: &GrayImage, bx: u32, by: u32) -> [f32; 2] {
        let (w, h) = from.dimensions();
        let x0 = bx * self.block_size;
        let y0 = by * self.block_size;
        let x1 = (x0 + self.block_size).min(w);
        let y1 = (y0 + self.block_size).min(h);
        let r = self.search_radius.max(0);

        let mut best = (u64::MAX, i32::MAX, 0i32, 0i32);
        for dy in -r..=r {
            for dx in -r..=r {
                let mut sad = 0u64;
                for y in y0..y1 {
                    let ty = (y as i32 + dy).clamp(0, h as i32 - 1) as u32;
                    for x in x0..x1 {
                        let tx = (x as i32 + dx).clamp(0, w as i32 - 1) as u32;
                        let a = from.get_pixel(x, y)[0] as i32;
                        let b = to.get_pixel(tx, ty)[0] as i32;
                        sad += (a - b).unsigned_abs() as u64;
                    }
                    if sad > best.0 {
                        break;
                    }
                }
                let manhattan = dx.abs() + dy.abs();
                if (sad, manhattan) < (best.0, best.1) {
                    best = (sad, manhattan, dx, dy);
                }
            }
        }
        [best.2 as f32, best.3 as f32]
    }
}

impl FlowEstimator for BlockMatchFlow {
    fn flow(&self, from: &GrayImage, to: &GrayImage) -> MediaResult<FlowField> {
        if from.dimensions() != to.dimensions() {
            return Err(MediaError::sequence_mismatch(format!(
                "flow endpoints differ in size: {:?} vs {:?}",
                from.dimensions(),
                to.dimensions()
            )));
        }
        let (w, h) = from.dimensions();
        if w == 0 || h == 0 {
            return Ok(FlowField::zero(w, h));
        }

        let bs = self.block_size.max(1);
        let cols = w.div_ceil(bs);
        let rows = h.div_ceil(bs);
        let estimator = BlockMatchFlow {
            block_size: bs,
            ..*self
        };

        let blocks: Vec<[f32; 2]> = (0..rows * cols)
            .into_par_iter()
            .map(|i| estimator.best_offset(from, to, i % cols, i / cols))
            .collect();

        // Bilinear interpolation between block centers.
        let center = (bs as f32 - 1.0) / 2.0;
        let block_at = |bx: u32, by: u32| blocks[(by * cols + bx) as usize];
        let mut vectors = vec![[0.0f32; 2]; w as usize * h as usize];
        vectors
            .par_chunks_mut(w as usize)
            .enumerate()
            .for_each(|(y, row)| {
                let gy = ((y as f32 - center) / bs as f32).clamp(0.0, (rows - 1) as f32);
                let by0 = gy.floor() as u32;
                let by1 = (by0 + 1).min(rows - 1);
                let fy = gy - by0 as f32;
                for (x, out) in row.iter_mut().enumerate() {
                    let gx = ((x as f32 - center) / bs as f32).clamp(0.0, (cols - 1) as f32);
                    let bx0 = gx.floor() as u32;
                    let bx1 = (bx0 + 1).min(cols - 1);
                    let fx = gx - bx0 as f32;
                    for c in 0..2 {
                        let top = block_at(bx0, by0)[c] * (1.0 - fx) + block_at(bx1, by0)[c] * fx;
                        let bottom = block_at(bx0, by1)[c] * (1.0 - fx) + block_at(bx1, by1)[c] * fx;
                        out[c] = top * (1.0 - fy) + bottom * fy;
                    }
                }
            });

        FlowField::from_vectors(w, h, vectors)
    }
}

//! Per-stage work.
//!
//! Every function clears its own output directory first, so a stage that
//! died half-way is recomputed from scratch. Per-frame calls run
//! `concurrency` at a time; `buffered` keeps results in frame order.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tokio::fs;

use avatar_media::frames::{self, FrameKind};
use avatar_media::image_io::{load_gray_async, load_rgb_async, save_png_async};
use avatar_media::{
    expand_keyframes, postprocess_frames, ControlImages, FlowEstimator, KeyframePlan,
    MediaError, MediaResult, ModelProvider, RgbImage,
};
use avatar_models::{StyleConfig, VideoMeta};

/// Manifest metadata of the per-frame stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameCountRecord {
    pub frame_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoseRecord {
    pub frame_count: usize,
    #[serde(default)]
    pub faces_found: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StylizeRecord {
    /// Frames sent through the stylizer
    pub frame_count: usize,
    pub style_id: String,
    pub keyframe_interval: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodeRecord {
    pub output: String,
}

async fn prepare_dir(dir: &Path, kind: FrameKind) -> MediaResult<()> {
    fs::create_dir_all(dir).await?;
    frames::clear_frames(dir, kind).await?;
    Ok(())
}

/// Render a pose control image for every source frame.
pub async fn detect_poses(
    models: &dyn ModelProvider,
    sources: &[PathBuf],
    meta: &VideoMeta,
    out_dir: &Path,
    concurrency: usize,
) -> MediaResult<PoseRecord> {
    prepare_dir(out_dir, FrameKind::Pose).await?;
    let renderer = models.load_pose().await?;
    let renderer = renderer.as_ref();
    let (width, height) = (meta.width, meta.height);

    let found: Vec<bool> = stream::iter(sources.iter().enumerate())
        .map(|(i, src)| async move {
            let frame = load_rgb_async(src.clone()).await?;
            let render = renderer.detect(&frame, width, height).await?;
            save_png_async(
                DynamicImage::ImageRgb8(render.image),
                FrameKind::Pose.path(out_dir, i),
            )
            .await?;
            Ok::<_, MediaError>(render.face_found)
        })
        .buffered(concurrency.max(1))
        .try_collect()
        .await?;

    Ok(PoseRecord {
        frame_count: found.len(),
        faces_found: found.iter().filter(|f| **f).count(),
    })
}

/// Write a normalized depth map for every source frame.
pub async fn estimate_depth(
    models: &dyn ModelProvider,
    sources: &[PathBuf],
    out_dir: &Path,
    concurrency: usize,
) -> MediaResult<FrameCountRecord> {
    prepare_dir(out_dir, FrameKind::Depth).await?;
    let estimator = models.load_depth().await?;
    let estimator = estimator.as_ref();

    let written: Vec<PathBuf> = stream::iter(sources.iter().enumerate())
        .map(|(i, src)| async move {
            let frame = load_rgb_async(src.clone()).await?;
            let depth = estimator.estimate(&frame).await?;
            save_png_async(
                DynamicImage::ImageLuma8(depth),
                FrameKind::Depth.path(out_dir, i),
            )
            .await
        })
        .buffered(concurrency.max(1))
        .try_collect()
        .await?;

    Ok(FrameCountRecord {
        frame_count: written.len(),
    })
}

/// Directories the stylizer reads its conditioning from.
#[derive(Debug, Clone, Copy)]
pub struct StylizeInputs<'a> {
    pub sources: &'a Path,
    pub pose: &'a Path,
    pub depth: &'a Path,
}

/// Stylize the keyframes of `plan`, keeping their dense indices.
pub async fn stylize_keyframes(
    models: &dyn ModelProvider,
    style: &StyleConfig,
    seed: u64,
    plan: &KeyframePlan,
    inputs: StylizeInputs<'_>,
    out_dir: &Path,
    concurrency: usize,
) -> MediaResult<StylizeRecord> {
    prepare_dir(out_dir, FrameKind::Styled).await?;
    let stylizer = models.load_stylizer(style).await?;
    let stylizer = stylizer.as_ref();

    let written: Vec<PathBuf> = stream::iter(plan.keyframes().iter().copied())
        .map(|idx| async move {
            let frame = load_rgb_async(FrameKind::Source.path(inputs.sources, idx)).await?;
            let control = ControlImages {
                pose: load_rgb_async(FrameKind::Pose.path(inputs.pose, idx)).await?,
                depth: load_gray_async(FrameKind::Depth.path(inputs.depth, idx)).await?,
            };
            let styled = stylizer.stylize(&frame, &control, style, seed).await?;
            save_png_async(
                DynamicImage::ImageRgb8(styled),
                FrameKind::Styled.path(out_dir, idx),
            )
            .await
        })
        .buffered(concurrency.max(1))
        .try_collect()
        .await?;

    Ok(StylizeRecord {
        frame_count: written.len(),
        style_id: style.style_id.clone(),
        keyframe_interval: plan.interval(),
    })
}

async fn load_all(paths: Vec<PathBuf>, concurrency: usize) -> MediaResult<Vec<RgbImage>> {
    stream::iter(paths)
        .map(load_rgb_async)
        .buffered(concurrency.max(1))
        .try_collect()
        .await
}

async fn save_all(
    images: Vec<RgbImage>,
    out_dir: &Path,
    kind: FrameKind,
    concurrency: usize,
) -> MediaResult<usize> {
    let written: Vec<PathBuf> = stream::iter(images.into_iter().enumerate())
        .map(|(i, img)| save_png_async(DynamicImage::ImageRgb8(img), kind.path(out_dir, i)))
        .buffered(concurrency.max(1))
        .try_collect()
        .await?;
    Ok(written.len())
}

/// Rebuild the dense stylized sequence from sampled keyframes.
pub async fn interpolate(
    plan: &KeyframePlan,
    keyframe_dir: &Path,
    out_dir: &Path,
    flow: Arc<dyn FlowEstimator>,
    concurrency: usize,
) -> MediaResult<FrameCountRecord> {
    let listed = frames::list_indexed(keyframe_dir, FrameKind::Styled).await?;
    let indices: Vec<usize> = listed.iter().map(|(i, _)| *i).collect();
    if indices != plan.keyframes() {
        return Err(MediaError::sequence_mismatch(format!(
            "{} holds keyframes {:?}, expected {:?}",
            keyframe_dir.display(),
            indices,
            plan.keyframes()
        )));
    }

    let keyframes = load_all(listed.into_iter().map(|(_, p)| p).collect(), concurrency).await?;
    let plan_owned = plan.clone();
    let dense = tokio::task::spawn_blocking(move || {
        expand_keyframes(&plan_owned, &keyframes, flow.as_ref())
    })
    .await??;

    prepare_dir(out_dir, FrameKind::Styled).await?;
    let frame_count = save_all(dense, out_dir, FrameKind::Styled, concurrency).await?;
    Ok(FrameCountRecord { frame_count })
}

/// Color-match against the sources and temporally smooth the dense sequence.
pub async fn postprocess(
    styled_dir: &Path,
    sources_dir: &Path,
    out_dir: &Path,
    style: &StyleConfig,
    concurrency: usize,
) -> MediaResult<FrameCountRecord> {
    let styled_paths = frames::list_dense(styled_dir, FrameKind::Styled).await?;
    let source_paths = frames::list_dense(sources_dir, FrameKind::Source).await?;
    if styled_paths.len() != source_paths.len() {
        return Err(MediaError::sequence_mismatch(format!(
            "{} stylized frames for {} source frames",
            styled_paths.len(),
            source_paths.len()
        )));
    }

    let styled = load_all(styled_paths, concurrency).await?;
    let originals = load_all(source_paths, concurrency).await?;
    let strength = style.color_match_strength;
    let radius = style.temporal_blend_frames;
    let finals = tokio::task::spawn_blocking(move || {
        postprocess_frames(&styled, &originals, strength, radius)
    })
    .await??;

    prepare_dir(out_dir, FrameKind::Final).await?;
    let frame_count = save_all(finals, out_dir, FrameKind::Final, concurrency).await?;
    Ok(FrameCountRecord { frame_count })
}

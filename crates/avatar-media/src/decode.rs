//! Frame extraction.

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use avatar_models::VideoMeta;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::frames::{self, FrameKind};
use crate::probe::probe_video;

/// Extract every frame of `video_path` as PNG into `output_dir`.
///
/// Returns the frame paths in temporal order and the video metadata with
/// `frame_count` corrected to the number of frames actually written.
pub async fn extract_frames(
    video_path: &Path,
    output_dir: &Path,
    runner: &FfmpegRunner,
) -> MediaResult<(Vec<PathBuf>, VideoMeta)> {
    let meta = probe_video(video_path).await?;

    fs::create_dir_all(output_dir).await?;
    frames::clear_frames(output_dir, FrameKind::Source).await?;

    let cmd = FfmpegCommand::new(video_path, output_dir.join(FrameKind::Source.ffmpeg_pattern()))
        .video_filter(format!("fps={}", meta.fps))
        .output_args(["-vsync", "vfr", "-start_number", "0"]);
    let expected = meta.frame_count;
    runner
        .run_with_progress(&cmd, move |p| {
            if p.is_complete || p.frame % 250 == 0 {
                debug!("Extracting: {} / ~{} frames", p.frame, expected);
            }
        })
        .await?;

    let frame_paths = frames::list_dense(output_dir, FrameKind::Source).await?;
    if frame_paths.is_empty() {
        return Err(MediaError::NoFrames {
            dir: output_dir.to_path_buf(),
            prefix: FrameKind::Source.prefix().to_string(),
        });
    }

    let meta = reconcile_frame_count(meta, frame_paths.len());
    info!(
        "Extracted {} frames ({}x{} @ {:.3} fps) from {}",
        meta.frame_count,
        meta.width,
        meta.height,
        meta.fps,
        video_path.display()
    );

    Ok((frame_paths, meta))
}

/// The materialized count is authoritative; off-by-one from rounding is normal.
fn reconcile_frame_count(meta: VideoMeta, extracted: usize) -> VideoMeta {
    let estimate = meta.frame_count;
    if estimate.abs_diff(extracted) > 1 {
        warn!(
            "Probe estimated {} frames but {} were extracted",
            estimate, extracted
        );
    }
    meta.with_frame_count(extracted)
}

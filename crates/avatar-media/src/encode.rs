//! Re-encoding of the final frame sequence.

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::frames::{self, FrameKind};

/// Name of the concat-demuxer list written next to the frames.
pub const FILELIST_NAME: &str = "_filelist.txt";

/// Encode the `final_*.png` frames of `frame_dir` into an H.264 MP4.
///
/// Frames are consumed in index order, each lasting exactly `1 / fps`.
pub async fn encode_video(
    frame_dir: &Path,
    output_path: &Path,
    fps: f64,
    runner: &FfmpegRunner,
) -> MediaResult<PathBuf> {
    if !(fps.is_finite() && fps > 0.0) {
        return Err(MediaError::InvalidVideo(format!("invalid output fps {fps}")));
    }

    let frame_paths = frames::list_dense(frame_dir, FrameKind::Final).await?;
    if frame_paths.is_empty() {
        return Err(MediaError::NoFrames {
            dir: frame_dir.to_path_buf(),
            prefix: FrameKind::Final.prefix().to_string(),
        });
    }

    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let filelist = frame_dir.join(FILELIST_NAME);
    fs::write(&filelist, concat_filelist(&frame_paths, fps)).await?;

    let cmd = FfmpegCommand::new(&filelist, output_path)
        .concat_input()
        .video_filter(format!("fps={fps}"))
        .video_codec("libx264")
        .preset("medium")
        .crf(18)
        .pixel_format("yuv420p")
        .output_args(["-movflags", "+faststart"]);

    let total = frame_paths.len();
    let result = runner
        .run_with_progress(&cmd, move |p| {
            if p.is_complete || p.frame % 100 == 0 {
                debug!(
                    "Encoding {:.0}% ({} / {} frames, {:.2}x)",
                    p.frame_fraction(total) * 100.0,
                    p.frame,
                    total,
                    p.speed
                );
            }
        })
        .await;
    if let Err(e) = fs::remove_file(&filelist).await {
        debug!("Could not remove {}: {}", filelist.display(), e);
    }
    result?;

    info!(
        "Encoded {} frames at {:.3} fps to {}",
        frame_paths.len(),
        fps,
        output_path.display()
    );
    Ok(output_path.to_path_buf())
}

/// Concat-demuxer script with an explicit duration per frame.
///
/// Entries are bare file names: the demuxer resolves them against the
/// list's own directory, which is the frame directory.
///
/// The demuxer ignores the duration of the last entry, so the last file
/// is listed once more to keep its display time.
fn concat_filelist(frame_paths: &[PathBuf], fps: f64) -> String {
    let duration = 1.0 / fps;
    let mut list = String::new();
    for path in frame_paths {
        list.push_str(&format!("file '{}'\n", escape_concat_path(path)));
        list.push_str(&format!("duration {duration}\n"));
    }
    if let Some(last) = frame_paths.last() {
        list.push_str(&format!("file '{}'\n", escape_concat_path(last)));
    }
    list
}

/// File name of `path`, quoted for the concat script (`'` becomes `'\''`).
fn escape_concat_path(path: &Path) -> String {
    let name = path.file_name().map(Path::new).unwrap_or(path);
    name.to_string_lossy().replace('\'', r"'\''")
}

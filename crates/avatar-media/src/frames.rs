//! Deterministic frame naming and directory listing.
//!
//! Every artifact is named `<prefix>_<index>.png` with a zero-based index
//! padded to six digits, so lexical order equals temporal order and a
//! stage's outputs can be rediscovered from its directory alone.

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use crate::error::{MediaError, MediaResult};

/// Digits used for index padding.
pub const INDEX_DIGITS: usize = 6;

/// Kind of per-frame artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// Extracted source frame
    Source,
    /// Pose control image
    Pose,
    /// Depth control image
    Depth,
    /// Stylized (or interpolated) frame
    Styled,
    /// Post-processed frame, input of the encoder
    Final,
}

impl FrameKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            FrameKind::Source => "frame",
            FrameKind::Pose => "pose",
            FrameKind::Depth => "depth",
            FrameKind::Styled => "styled",
            FrameKind::Final => "final",
        }
    }

    /// File name for the frame at `index`.
    pub fn file_name(&self, index: usize) -> String {
        format!("{}_{:0width$}.png", self.prefix(), index, width = INDEX_DIGITS)
    }

    /// Path of the frame at `index` inside `dir`.
    pub fn path(&self, dir: &Path, index: usize) -> PathBuf {
        dir.join(self.file_name(index))
    }

    /// printf-style pattern understood by FFmpeg's image2 muxer.
    pub fn ffmpeg_pattern(&self) -> String {
        format!("{}_%0{}d.png", self.prefix(), INDEX_DIGITS)
    }

    /// Index encoded in `file_name`, if it follows this kind's convention.
    pub fn parse_index(&self, file_name: &str) -> Option<usize> {
        let digits = file_name
            .strip_prefix(self.prefix())?
            .strip_prefix('_')?
            .strip_suffix(".png")?;
        if digits.len() < INDEX_DIGITS || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }
}

/// List `(index, path)` of every frame of `kind` in `dir`, sorted by index.
///
/// A missing directory yields an empty list. Files that do not follow the
/// naming convention are ignored.
pub async fn list_indexed(dir: &Path, kind: FrameKind) -> MediaResult<Vec<(usize, PathBuf)>> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut frames = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        if let Some(index) = name.to_str().and_then(|n| kind.parse_index(n)) {
            frames.push((index, entry.path()));
        }
    }
    frames.sort_by_key(|(index, _)| *index);
    Ok(frames)
}

/// List frame paths of `kind` in `dir`, in temporal order.
pub async fn list_frames(dir: &Path, kind: FrameKind) -> MediaResult<Vec<PathBuf>> {
    Ok(list_indexed(dir, kind)
        .await?
        .into_iter()
        .map(|(_, path)| path)
        .collect())
}

/// List a dense sequence: indices must be exactly `0..len`.
pub async fn list_dense(dir: &Path, kind: FrameKind) -> MediaResult<Vec<PathBuf>> {
    let frames = list_indexed(dir, kind).await?;
    ensure_contiguous(&frames, dir)?;
    Ok(frames.into_iter().map(|(_, path)| path).collect())
}

/// Check that indices run `0, 1, 2, ...` without gaps.
pub fn ensure_contiguous(frames: &[(usize, PathBuf)], dir: &Path) -> MediaResult<()> {
    for (expected, (index, _)) in frames.iter().enumerate() {
        if *index != expected {
            return Err(MediaError::sequence_mismatch(format!(
                "gap in {}: expected index {}, found {}",
                dir.display(),
                expected,
                index
            )));
        }
    }
    Ok(())
}

/// Remove previously written frames of `kind` so a redo starts clean.
pub async fn clear_frames(dir: &Path, kind: FrameKind) -> MediaResult<usize> {
    let stale = list_frames(dir, kind).await?;
    for path in &stale {
        fs::remove_file(path).await?;
    }
    if !stale.is_empty() {
        debug!(
            "Removed {} stale {} frames from {}",
            stale.len(),
            kind.prefix(),
            dir.display()
        );
    }
    Ok(stale.len())
}

//! On-disk layout of a job directory.

use std::path::{Path, PathBuf};

use avatar_media::interpolate::KeyframePlan;

pub const MANIFEST_FILE: &str = "manifest.json";

/// Paths of every intermediate directory under a job root.
#[derive(Debug, Clone)]
pub struct JobLayout {
    root: PathBuf,
}

impl JobLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    pub fn frames(&self) -> PathBuf {
        self.root.join("frames")
    }

    pub fn pose(&self) -> PathBuf {
        self.root.join("pose")
    }

    pub fn depth(&self) -> PathBuf {
        self.root.join("depth")
    }

    /// Dense stylized frames (dense mode).
    pub fn styled(&self) -> PathBuf {
        self.root.join("styled")
    }

    /// Stylized keyframes, named by dense index (sampled mode).
    pub fn styled_keyframes(&self) -> PathBuf {
        self.root.join("styled_keyframes")
    }

    /// Interpolated dense sequence (sampled mode).
    pub fn styled_full(&self) -> PathBuf {
        self.root.join("styled_full")
    }

    pub fn final_frames(&self) -> PathBuf {
        self.root.join("final")
    }

    /// Where the stylize stage writes for this plan.
    pub fn stylize_output(&self, plan: &KeyframePlan) -> PathBuf {
        if plan.is_sampled() {
            self.styled_keyframes()
        } else {
            self.styled()
        }
    }

    /// The dense stylized sequence that post-processing reads.
    pub fn dense_styled(&self, plan: &KeyframePlan) -> PathBuf {
        if plan.is_sampled() {
            self.styled_full()
        } else {
            self.styled()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_specific_directories() {
        let layout = JobLayout::new("/jobs/a");
        let dense = KeyframePlan::new(10, 1).unwrap();
        let sampled = KeyframePlan::new(10, 3).unwrap();

        assert_eq!(layout.stylize_output(&dense), PathBuf::from("/jobs/a/styled"));
        assert_eq!(layout.dense_styled(&dense), PathBuf::from("/jobs/a/styled"));
        assert_eq!(
            layout.stylize_output(&sampled),
            PathBuf::from("/jobs/a/styled_keyframes")
        );
        assert_eq!(layout.dense_styled(&sampled), PathBuf::from("/jobs/a/styled_full"));
        assert_eq!(layout.manifest(), PathBuf::from("/jobs/a/manifest.json"));
    }
}

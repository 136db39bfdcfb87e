//! End-to-end pipeline runs against in-process fakes.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image::{GrayImage, Luma, Rgb, RgbImage};
use serde_json::{json, Value};
use tempfile::TempDir;

use avatar_media::frames::{self, FrameKind};
use avatar_media::{
    ControlImages, DepthRenderer, MediaBackend, MediaError, MediaResult, ModelProvider,
    PoseRender, PoseRenderer, Stylizer,
};
use avatar_models::{JobId, JobStatus, JobStatusUpdate, PipelineStage, StyleConfig, VideoMeta};
use avatar_worker::{JobRequest, Pipeline, PipelineOptions, StatusSink, WorkerError};

const SIZE: u32 = 16;

// ============================================================================
// Fakes
// ============================================================================

struct FakeBackend {
    frame_count: usize,
    extracts: AtomicUsize,
    encodes: AtomicUsize,
}

impl FakeBackend {
    fn new(frame_count: usize) -> Arc<Self> {
        Arc::new(Self {
            frame_count,
            extracts: AtomicUsize::new(0),
            encodes: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl MediaBackend for FakeBackend {
    async fn extract(&self, _video: &Path, frames_dir: &Path) -> MediaResult<(Vec<PathBuf>, VideoMeta)> {
        self.extracts.fetch_add(1, Ordering::SeqCst);
        tokio::fs::create_dir_all(frames_dir).await?;
        let mut paths = Vec::with_capacity(self.frame_count);
        for i in 0..self.frame_count {
            let shade = (i * 10) as u8;
            let frame = RgbImage::from_pixel(SIZE, SIZE, Rgb([shade, 128, 255 - shade]));
            let path = FrameKind::Source.path(frames_dir, i);
            frame
                .save(&path)
                .map_err(|e| MediaError::internal(e.to_string()))?;
            paths.push(path);
        }
        let meta = VideoMeta::from_probe(SIZE, SIZE, 24.0, self.frame_count as f64 / 24.0)
            .with_frame_count(self.frame_count);
        Ok((paths, meta))
    }

    async fn encode(&self, frame_dir: &Path, output: &Path, _fps: f64) -> MediaResult<PathBuf> {
        self.encodes.fetch_add(1, Ordering::SeqCst);
        let finals = frames::list_dense(frame_dir, FrameKind::Final).await?;
        tokio::fs::write(output, format!("{} frames", finals.len())).await?;
        Ok(output.to_path_buf())
    }
}

#[derive(Default)]
struct FakeModels {
    pose_loads: AtomicUsize,
    depth_loads: AtomicUsize,
    stylizer_loads: AtomicUsize,
    stylize_calls: Arc<AtomicUsize>,
    /// Stylize calls that fail before the stylizer starts working
    stylize_failures: Arc<AtomicUsize>,
}

impl FakeModels {
    fn failing_stylizer(failures: usize) -> Arc<Self> {
        let models = Self::default();
        models.stylize_failures.store(failures, Ordering::SeqCst);
        Arc::new(models)
    }
}

struct FakePose;

#[async_trait]
impl PoseRenderer for FakePose {
    async fn detect(&self, _frame: &RgbImage, width: u32, height: u32) -> MediaResult<PoseRender> {
        Ok(PoseRender {
            image: RgbImage::from_pixel(width, height, Rgb([255, 255, 255])),
            face_found: true,
        })
    }
}

struct FakeDepth;

#[async_trait]
impl DepthRenderer for FakeDepth {
    async fn estimate(&self, frame: &RgbImage) -> MediaResult<GrayImage> {
        Ok(GrayImage::from_pixel(frame.width(), frame.height(), Luma([128])))
    }
}

struct FakeStylizer {
    calls: Arc<AtomicUsize>,
    failures: Arc<AtomicUsize>,
}

#[async_trait]
impl Stylizer for FakeStylizer {
    async fn stylize(
        &self,
        frame: &RgbImage,
        _control: &ControlImages,
        _style: &StyleConfig,
        seed: u64,
    ) -> MediaResult<RgbImage> {
        let failed = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(MediaError::capability("stylizer", "out of memory"));
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        let tint = (seed % 50) as u8;
        Ok(RgbImage::from_fn(frame.width(), frame.height(), |x, y| {
            let p = frame.get_pixel(x, y);
            Rgb([255 - p[0], p[1].saturating_add(tint), p[2]])
        }))
    }
}

#[async_trait]
impl ModelProvider for FakeModels {
    async fn load_pose(&self) -> MediaResult<Box<dyn PoseRenderer>> {
        self.pose_loads.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakePose))
    }

    async fn load_depth(&self) -> MediaResult<Box<dyn DepthRenderer>> {
        self.depth_loads.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeDepth))
    }

    async fn load_stylizer(&self, _style: &StyleConfig) -> MediaResult<Box<dyn Stylizer>> {
        self.stylizer_loads.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeStylizer {
            calls: Arc::clone(&self.stylize_calls),
            failures: Arc::clone(&self.stylize_failures),
        }))
    }
}

#[derive(Default)]
struct RecordingSink {
    updates: Mutex<Vec<JobStatusUpdate>>,
}

impl RecordingSink {
    fn updates(&self) -> Vec<JobStatusUpdate> {
        self.updates.lock().map(|u| u.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl StatusSink for RecordingSink {
    async fn report(&self, _job_id: &str, update: JobStatusUpdate) {
        if let Ok(mut updates) = self.updates.lock() {
            updates.push(update);
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

struct Fixture {
    _tmp: TempDir,
    input: PathBuf,
    job_dir: PathBuf,
    output: PathBuf,
}

fn fixture() -> Fixture {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("face.mp4");
    std::fs::write(&input, b"not really a video").unwrap();
    Fixture {
        input,
        job_dir: tmp.path().join("job"),
        output: tmp.path().join("output.mp4"),
        _tmp: tmp,
    }
}

fn request(fx: &Fixture, style_id: &str, seed: u64) -> JobRequest {
    JobRequest {
        job_id: JobId::from_string("job-1234567890"),
        input: fx.input.clone(),
        output: fx.output.clone(),
        style_id: style_id.to_string(),
        job_dir: fx.job_dir.clone(),
        seed,
    }
}

fn pipeline(backend: &Arc<FakeBackend>, models: &Arc<FakeModels>, keyframe_interval: usize) -> Pipeline {
    Pipeline::new(backend.clone(), models.clone()).with_options(PipelineOptions {
        keyframe_interval,
        frame_concurrency: 3,
    })
}

fn read_manifest(job_dir: &Path) -> Value {
    let bytes = std::fs::read(job_dir.join("manifest.json")).unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn count_pngs(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .filter(|e| e.path().extension().is_some_and(|x| x == "png"))
                .count()
        })
        .unwrap_or(0)
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_dense_run_completes_every_stage() {
    let fx = fixture();
    let backend = FakeBackend::new(6);
    let models = Arc::new(FakeModels::default());

    let outcome = pipeline(&backend, &models, 1)
        .run(&request(&fx, "animated-anime", 42))
        .await
        .unwrap();

    assert_eq!(outcome.output, fx.output);
    assert_eq!(outcome.meta.frame_count, 6);
    assert_eq!(outcome.executed, PipelineStage::plan(1));
    assert!(outcome.cached.is_empty());
    assert!(!outcome.executed.contains(&PipelineStage::Interpolate));

    assert_eq!(models.stylize_calls.load(Ordering::SeqCst), 6);
    assert_eq!(models.stylizer_loads.load(Ordering::SeqCst), 1);
    assert_eq!(count_pngs(&fx.job_dir.join("styled")), 6);
    assert_eq!(count_pngs(&fx.job_dir.join("final")), 6);
    assert_eq!(std::fs::read_to_string(&fx.output).unwrap(), "6 frames");

    let manifest = read_manifest(&fx.job_dir);
    for stage in PipelineStage::plan(1) {
        assert_eq!(manifest[stage.as_str()]["done"], json!(true), "{}", stage);
    }
    assert_eq!(manifest["decode"]["frame_count"], json!(6));
    assert!(manifest["fingerprint"].is_string());
}

#[tokio::test]
async fn test_sampled_run_stylizes_keyframes_only() {
    let fx = fixture();
    let backend = FakeBackend::new(12);
    let models = Arc::new(FakeModels::default());

    let outcome = pipeline(&backend, &models, 5)
        .run(&request(&fx, "beauty-realistic", 42))
        .await
        .unwrap();

    assert!(outcome.executed.contains(&PipelineStage::Interpolate));
    // Keyframes 0, 5 and 10.
    assert_eq!(models.stylize_calls.load(Ordering::SeqCst), 3);
    let keyframes = frames::list_indexed(&fx.job_dir.join("styled_keyframes"), FrameKind::Styled)
        .await
        .unwrap();
    let indices: Vec<usize> = keyframes.iter().map(|(i, _)| *i).collect();
    assert_eq!(indices, vec![0, 5, 10]);
    assert_eq!(count_pngs(&fx.job_dir.join("styled_full")), 12);
    assert_eq!(count_pngs(&fx.job_dir.join("final")), 12);

    let manifest = read_manifest(&fx.job_dir);
    assert_eq!(manifest["stylize"]["frame_count"], json!(3));
    assert_eq!(manifest["stylize"]["keyframe_interval"], json!(5));
    assert_eq!(manifest["interpolate"]["frame_count"], json!(12));
}

#[tokio::test]
async fn test_completed_job_is_fully_cached() {
    let fx = fixture();
    let backend = FakeBackend::new(4);
    let models = Arc::new(FakeModels::default());
    let pipeline = pipeline(&backend, &models, 1);
    let req = request(&fx, "animated-anime", 42);

    pipeline.run(&req).await.unwrap();
    let again = pipeline.run(&req).await.unwrap();

    assert!(again.executed.is_empty());
    assert_eq!(again.cached, PipelineStage::plan(1));
    assert_eq!(again.output, fx.output);
    assert_eq!(backend.extracts.load(Ordering::SeqCst), 1);
    assert_eq!(backend.encodes.load(Ordering::SeqCst), 1);
    assert_eq!(models.pose_loads.load(Ordering::SeqCst), 1);
    assert_eq!(models.stylize_calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_resumes_after_stylize_failure() {
    let fx = fixture();
    let backend = FakeBackend::new(5);
    let models = FakeModels::failing_stylizer(1);
    let pipeline = pipeline(&backend, &models, 1);
    let req = request(&fx, "promptable-avatar", 7);

    let err = pipeline.run(&req).await.unwrap_err();
    assert!(matches!(
        err,
        WorkerError::Stage {
            stage: PipelineStage::Stylize,
            ..
        }
    ));
    let manifest = read_manifest(&fx.job_dir);
    assert_eq!(manifest["depth_estimation"]["done"], json!(true));
    assert!(manifest.get("stylize").is_none());

    let outcome = pipeline.run(&req).await.unwrap();
    assert_eq!(
        outcome.cached,
        vec![
            PipelineStage::Decode,
            PipelineStage::FaceLandmarks,
            PipelineStage::DepthEstimation
        ]
    );
    assert_eq!(
        outcome.executed,
        vec![
            PipelineStage::Stylize,
            PipelineStage::Postprocess,
            PipelineStage::Encode
        ]
    );
    assert_eq!(backend.extracts.load(Ordering::SeqCst), 1);
    assert_eq!(models.depth_loads.load(Ordering::SeqCst), 1);
    assert_eq!(models.stylizer_loads.load(Ordering::SeqCst), 2);
    assert_eq!(count_pngs(&fx.job_dir.join("styled")), 5);
}

#[tokio::test]
async fn test_resumed_output_matches_uninterrupted_run() {
    let interrupted = fixture();
    let clean = fixture();
    let backend = FakeBackend::new(7);

    let flaky = FakeModels::failing_stylizer(1);
    let resumed = pipeline(&backend, &flaky, 3);
    let req = request(&interrupted, "beauty-realistic", 11);
    resumed.run(&req).await.unwrap_err();
    resumed.run(&req).await.unwrap();

    let steady = Arc::new(FakeModels::default());
    pipeline(&backend, &steady, 3)
        .run(&request(&clean, "beauty-realistic", 11))
        .await
        .unwrap();

    let a = frames::list_dense(&interrupted.job_dir.join("final"), FrameKind::Final)
        .await
        .unwrap();
    let b = frames::list_dense(&clean.job_dir.join("final"), FrameKind::Final)
        .await
        .unwrap();
    assert_eq!(a.len(), 7);
    assert_eq!(a.len(), b.len());
    for (x, y) in a.iter().zip(&b) {
        assert_eq!(std::fs::read(x).unwrap(), std::fs::read(y).unwrap(), "{}", x.display());
    }
}

#[tokio::test]
async fn test_unknown_manifest_keys_survive_resume() {
    let fx = fixture();
    let backend = FakeBackend::new(3);
    let models = FakeModels::failing_stylizer(1);
    let pipeline = pipeline(&backend, &models, 1);
    let req = request(&fx, "animated-anime", 42);

    pipeline.run(&req).await.unwrap_err();

    let path = fx.job_dir.join("manifest.json");
    let mut manifest = read_manifest(&fx.job_dir);
    manifest["upscale"] = json!({"done": true, "timestamp": 1700000000.5, "factor": 2});
    std::fs::write(&path, serde_json::to_vec_pretty(&manifest).unwrap()).unwrap();

    pipeline.run(&req).await.unwrap();

    let manifest = read_manifest(&fx.job_dir);
    assert_eq!(manifest["upscale"]["factor"], json!(2));
    assert_eq!(manifest["stylize"]["done"], json!(true));
    assert_eq!(manifest["encode"]["done"], json!(true));
}

#[tokio::test]
async fn test_stale_stage_output_is_reported() {
    let fx = fixture();
    let backend = FakeBackend::new(4);
    let models = Arc::new(FakeModels::default());
    let pipeline = pipeline(&backend, &models, 1);
    let req = request(&fx, "animated-anime", 42);
    pipeline.run(&req).await.unwrap();

    std::fs::remove_file(FrameKind::Pose.path(&fx.job_dir.join("pose"), 2)).unwrap();

    let err = pipeline.run(&req).await.unwrap_err();
    assert!(matches!(
        err,
        WorkerError::StaleStage {
            stage: PipelineStage::FaceLandmarks,
            ..
        }
    ));
}

#[tokio::test]
async fn test_changed_inputs_refuse_existing_job_dir() {
    let fx = fixture();
    let backend = FakeBackend::new(3);
    let models = Arc::new(FakeModels::default());
    let pipeline = pipeline(&backend, &models, 1);

    pipeline.run(&request(&fx, "animated-anime", 42)).await.unwrap();
    let err = pipeline
        .run(&request(&fx, "animated-anime", 43))
        .await
        .unwrap_err();

    assert!(matches!(err, WorkerError::ManifestMismatch { .. }));
    assert!(err.is_input_error());
    assert_eq!(backend.extracts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unknown_style_creates_nothing() {
    let fx = fixture();
    let backend = FakeBackend::new(3);
    let models = Arc::new(FakeModels::default());

    let err = pipeline(&backend, &models, 1)
        .run(&request(&fx, "watercolor", 42))
        .await
        .unwrap_err();

    assert!(matches!(err, WorkerError::UnknownStyle(_)));
    assert!(err.to_string().contains("animated-anime"));
    assert!(!fx.job_dir.exists());
    assert_eq!(backend.extracts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_missing_input_fails_before_work() {
    let fx = fixture();
    let backend = FakeBackend::new(3);
    let models = Arc::new(FakeModels::default());
    let mut req = request(&fx, "animated-anime", 42);
    req.input = fx.job_dir.with_file_name("missing.mp4");

    let err = pipeline(&backend, &models, 1).run(&req).await.unwrap_err();

    assert!(matches!(err, WorkerError::InputNotFound(_)));
    assert!(!fx.job_dir.exists());
}

#[tokio::test]
async fn test_status_updates_track_progress() {
    let fx = fixture();
    let backend = FakeBackend::new(3);
    let models = Arc::new(FakeModels::default());
    let sink = Arc::new(RecordingSink::default());

    pipeline(&backend, &models, 1)
        .with_status_sink(sink.clone())
        .run(&request(&fx, "animated-anime", 42))
        .await
        .unwrap();

    let updates = sink.updates();
    assert_eq!(updates.first(), Some(&JobStatusUpdate::running(0.0)));
    let last = updates.last().unwrap();
    assert_eq!(last.status, JobStatus::Done);
    assert_eq!(last.output_url.as_deref(), Some(fx.output.to_string_lossy().as_ref()));

    let progress: Vec<f64> = updates
        .iter()
        .filter(|u| u.status == JobStatus::Running)
        .filter_map(|u| u.progress)
        .collect();
    assert_eq!(progress.len(), 1 + PipelineStage::plan(1).len());
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(progress.last().copied(), Some(1.0));
}

#[tokio::test]
async fn test_failure_is_reported() {
    let fx = fixture();
    let backend = FakeBackend::new(3);
    let models = FakeModels::failing_stylizer(1);
    let sink = Arc::new(RecordingSink::default());

    pipeline(&backend, &models, 1)
        .with_status_sink(sink.clone())
        .run(&request(&fx, "animated-anime", 42))
        .await
        .unwrap_err();

    let last = sink.updates().pop().unwrap();
    assert_eq!(last.status, JobStatus::Failed);
    assert!(last.error.unwrap().contains("out of memory"));
}

//! Resumable pipeline orchestrator.
//!
//! Stages run strictly in order. Before each one the manifest is consulted:
//! a stage marked done is not recomputed, its outputs are rediscovered from
//! its directory and its metadata read back from the manifest.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio::fs;
use tracing::Instrument;

use avatar_media::frames::{self, FrameKind};
use avatar_media::{BlockMatchFlow, FlowEstimator, KeyframePlan, MediaBackend, ModelProvider};
use avatar_models::{JobId, JobStatusUpdate, PipelineStage, StyleConfig, StyleRegistry, VideoMeta};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::layout::JobLayout;
use crate::logging::JobLogger;
use crate::manifest::{self, ManifestStore};
use crate::metrics;
use crate::stages::{
    self, EncodeRecord, FrameCountRecord, PoseRecord, StylizeInputs, StylizeRecord,
};
use crate::status::{NoopStatusSink, StatusSink};

/// Tunables that change how much work a run does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    pub keyframe_interval: usize,
    pub frame_concurrency: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            keyframe_interval: 1,
            frame_concurrency: 4,
        }
    }
}

impl From<&WorkerConfig> for PipelineOptions {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            keyframe_interval: config.keyframe_interval,
            frame_concurrency: config.frame_concurrency,
        }
    }
}

/// One invocation of the pipeline.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub job_id: JobId,
    pub input: PathBuf,
    pub output: PathBuf,
    pub style_id: String,
    pub job_dir: PathBuf,
    pub seed: u64,
}

/// What a successful run produced.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub output: PathBuf,
    pub meta: VideoMeta,
    /// Stages computed by this invocation
    pub executed: Vec<PipelineStage>,
    /// Stages reused from the manifest
    pub cached: Vec<PipelineStage>,
}

/// Sequences the stages of one job.
pub struct Pipeline {
    registry: StyleRegistry,
    backend: Arc<dyn MediaBackend>,
    models: Arc<dyn ModelProvider>,
    flow: Arc<dyn FlowEstimator>,
    status: Arc<dyn StatusSink>,
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(backend: Arc<dyn MediaBackend>, models: Arc<dyn ModelProvider>) -> Self {
        Self {
            registry: StyleRegistry::builtin(),
            backend,
            models,
            flow: Arc::new(BlockMatchFlow::default()),
            status: Arc::new(NoopStatusSink),
            options: PipelineOptions::default(),
        }
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_status_sink(mut self, status: Arc<dyn StatusSink>) -> Self {
        self.status = status;
        self
    }

    pub fn with_flow(mut self, flow: Arc<dyn FlowEstimator>) -> Self {
        self.flow = flow;
        self
    }

    pub fn with_registry(mut self, registry: StyleRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn options(&self) -> PipelineOptions {
        self.options
    }

    /// Run (or resume) a job and return the encoded output.
    ///
    /// The outcome is reported to the status sink; sink failures never
    /// affect the result.
    pub async fn run(&self, request: &JobRequest) -> WorkerResult<JobOutcome> {
        let logger = JobLogger::new(&request.job_id, &request.style_id);
        let span = logger.create_span();

        let result = self.execute(request, &logger).instrument(span).await;
        match &result {
            Ok(outcome) => {
                logger.log_completion(&format!(
                    "{} ({} stages run, {} cached)",
                    outcome.output.display(),
                    outcome.executed.len(),
                    outcome.cached.len()
                ));
                self.status
                    .report(
                        request.job_id.as_str(),
                        JobStatusUpdate::done(outcome.output.to_string_lossy()),
                    )
                    .await;
            }
            Err(e) => {
                logger.log_error(&e.to_string());
                metrics::record_job_failed(e.failed_stage());
                self.status
                    .report(request.job_id.as_str(), JobStatusUpdate::failed(e.to_string()))
                    .await;
            }
        }
        result
    }

    async fn execute(&self, request: &JobRequest, logger: &JobLogger) -> WorkerResult<JobOutcome> {
        // Input errors: nothing is created before these pass.
        let style = self.registry.get(&request.style_id)?.clone();
        if self.options.keyframe_interval == 0 {
            return Err(WorkerError::config_error("keyframe interval must be >= 1"));
        }
        if !fs::try_exists(&request.input).await.unwrap_or(false) {
            return Err(WorkerError::InputNotFound(request.input.clone()));
        }

        fs::create_dir_all(&request.job_dir).await?;
        let layout = JobLayout::new(&request.job_dir);
        let fingerprint = manifest::fingerprint(
            &request.input,
            &style.style_id,
            request.seed,
            self.options.keyframe_interval,
        )
        .await?;
        let store = ManifestStore::open(layout.manifest(), &fingerprint).await?;

        logger.log_start(&format!(
            "{} -> {} ({} mode, interval {})",
            request.input.display(),
            request.output.display(),
            if self.options.keyframe_interval > 1 { "sampled" } else { "dense" },
            self.options.keyframe_interval
        ));

        let mut run = StageRun {
            store,
            logger,
            status: self.status.as_ref(),
            job_id: request.job_id.as_str(),
            style_id: &style.style_id,
            total: PipelineStage::plan(self.options.keyframe_interval).len(),
            executed: Vec::new(),
            cached: Vec::new(),
        };
        self.status
            .report(request.job_id.as_str(), JobStatusUpdate::running(0.0))
            .await;

        let (sources, meta) = self.decode(&mut run, request, &layout).await?;
        let plan = KeyframePlan::new(meta.frame_count, self.options.keyframe_interval)
            .map_err(|e| WorkerError::config_error(e.to_string()))?;

        self.face_landmarks(&mut run, &layout, &sources, &meta).await?;
        self.depth(&mut run, &layout, &sources).await?;
        self.stylize(&mut run, &layout, &plan, &style, request.seed).await?;
        if plan.is_sampled() {
            self.interpolate(&mut run, &layout, &plan).await?;
        }
        self.postprocess(&mut run, &layout, &plan, &style).await?;
        let output = self.encode(&mut run, &layout, &request.output, &meta).await?;

        Ok(JobOutcome {
            output,
            meta,
            executed: run.executed,
            cached: run.cached,
        })
    }

    async fn decode(
        &self,
        run: &mut StageRun<'_>,
        request: &JobRequest,
        layout: &JobLayout,
    ) -> WorkerResult<(Vec<PathBuf>, VideoMeta)> {
        let stage = PipelineStage::Decode;
        let dir = layout.frames();

        if run.is_cached(stage) {
            let meta: VideoMeta = run
                .store
                .record(stage)?
                .ok_or_else(|| WorkerError::stale(stage, "manifest record has no video metadata"))?;
            let sources = list_cached(stage, &dir, FrameKind::Source).await?;
            expect_count(stage, sources.len(), meta.frame_count)?;
            run.finish_cached(stage).await;
            return Ok((sources, meta));
        }

        let started = run.begin(stage, "Extracting frames...");
        let (sources, meta) = self
            .backend
            .extract(&request.input, &dir)
            .await
            .map_err(|e| WorkerError::stage(stage, e))?;
        run.complete(stage, &meta, meta.frame_count, started).await?;
        Ok((sources, meta))
    }

    async fn face_landmarks(
        &self,
        run: &mut StageRun<'_>,
        layout: &JobLayout,
        sources: &[PathBuf],
        meta: &VideoMeta,
    ) -> WorkerResult<()> {
        let stage = PipelineStage::FaceLandmarks;
        let dir = layout.pose();

        if run.is_cached(stage) {
            let found = list_cached(stage, &dir, FrameKind::Pose).await?;
            expect_count(stage, found.len(), sources.len())?;
            run.finish_cached(stage).await;
            return Ok(());
        }

        let started = run.begin(stage, "Detecting face landmarks...");
        let record: PoseRecord = stages::detect_poses(
            self.models.as_ref(),
            sources,
            meta,
            &dir,
            self.options.frame_concurrency,
        )
        .await
        .map_err(|e| WorkerError::stage(stage, e))?;
        if record.faces_found < record.frame_count {
            run.logger.log_warning(&format!(
                "no face in {} of {} frames",
                record.frame_count - record.faces_found,
                record.frame_count
            ));
        }
        run.complete(stage, &record, record.frame_count, started).await
    }

    async fn depth(&self, run: &mut StageRun<'_>, layout: &JobLayout, sources: &[PathBuf]) -> WorkerResult<()> {
        let stage = PipelineStage::DepthEstimation;
        let dir = layout.depth();

        if run.is_cached(stage) {
            let found = list_cached(stage, &dir, FrameKind::Depth).await?;
            expect_count(stage, found.len(), sources.len())?;
            run.finish_cached(stage).await;
            return Ok(());
        }

        let started = run.begin(stage, "Estimating depth maps...");
        let record: FrameCountRecord =
            stages::estimate_depth(self.models.as_ref(), sources, &dir, self.options.frame_concurrency)
                .await
                .map_err(|e| WorkerError::stage(stage, e))?;
        run.complete(stage, &record, record.frame_count, started).await
    }

    async fn stylize(
        &self,
        run: &mut StageRun<'_>,
        layout: &JobLayout,
        plan: &KeyframePlan,
        style: &StyleConfig,
        seed: u64,
    ) -> WorkerResult<()> {
        let stage = PipelineStage::Stylize;
        let dir = layout.stylize_output(plan);

        if run.is_cached(stage) {
            let listed = frames::list_indexed(&dir, FrameKind::Styled)
                .await
                .map_err(|e| WorkerError::stale(stage, e.to_string()))?;
            let indices: Vec<usize> = listed.iter().map(|(i, _)| *i).collect();
            if indices != plan.keyframes() {
                return Err(WorkerError::stale(
                    stage,
                    format!(
                        "{} holds {} frames, expected {}",
                        dir.display(),
                        indices.len(),
                        plan.keyframes().len()
                    ),
                ));
            }
            run.finish_cached(stage).await;
            return Ok(());
        }

        let detail = if plan.is_sampled() {
            format!(
                "Stylizing keyframes (1 in {}) with '{}'...",
                plan.interval(),
                style.display_name
            )
        } else {
            format!("Stylizing all frames with '{}'...", style.display_name)
        };
        let started = run.begin(stage, &detail);
        let (sources, pose, depth) = (layout.frames(), layout.pose(), layout.depth());
        let inputs = StylizeInputs {
            sources: &sources,
            pose: &pose,
            depth: &depth,
        };
        let record: StylizeRecord = stages::stylize_keyframes(
            self.models.as_ref(),
            style,
            seed,
            plan,
            inputs,
            &dir,
            self.options.frame_concurrency,
        )
        .await
        .map_err(|e| WorkerError::stage(stage, e))?;
        metrics::record_frames_stylized(&style.style_id, record.frame_count);
        run.complete(stage, &record, record.frame_count, started).await
    }

    async fn interpolate(&self, run: &mut StageRun<'_>, layout: &JobLayout, plan: &KeyframePlan) -> WorkerResult<()> {
        let stage = PipelineStage::Interpolate;
        let dir = layout.styled_full();

        if run.is_cached(stage) {
            let found = list_cached(stage, &dir, FrameKind::Styled).await?;
            expect_count(stage, found.len(), plan.frame_count())?;
            run.finish_cached(stage).await;
            return Ok(());
        }

        let started = run.begin(
            stage,
            &format!(
                "Interpolating {} frames from {} keyframes...",
                plan.frame_count(),
                plan.keyframes().len()
            ),
        );
        let record = stages::interpolate(
            plan,
            &layout.styled_keyframes(),
            &dir,
            Arc::clone(&self.flow),
            self.options.frame_concurrency,
        )
        .await
        .map_err(|e| WorkerError::stage(stage, e))?;
        run.complete(stage, &record, record.frame_count, started).await
    }

    async fn postprocess(
        &self,
        run: &mut StageRun<'_>,
        layout: &JobLayout,
        plan: &KeyframePlan,
        style: &StyleConfig,
    ) -> WorkerResult<()> {
        let stage = PipelineStage::Postprocess;
        let dir = layout.final_frames();

        if run.is_cached(stage) {
            let found = list_cached(stage, &dir, FrameKind::Final).await?;
            expect_count(stage, found.len(), plan.frame_count())?;
            run.finish_cached(stage).await;
            return Ok(());
        }

        let started = run.begin(stage, "Post-processing (color match + temporal smooth)...");
        let record = stages::postprocess(
            &layout.dense_styled(plan),
            &layout.frames(),
            &dir,
            style,
            self.options.frame_concurrency,
        )
        .await
        .map_err(|e| WorkerError::stage(stage, e))?;
        run.complete(stage, &record, record.frame_count, started).await
    }

    async fn encode(
        &self,
        run: &mut StageRun<'_>,
        layout: &JobLayout,
        output: &Path,
        meta: &VideoMeta,
    ) -> WorkerResult<PathBuf> {
        let stage = PipelineStage::Encode;

        if run.is_cached(stage) {
            let record: Option<EncodeRecord> = run.store.record(stage)?;
            let path = record.map(|r| PathBuf::from(r.output)).unwrap_or_else(|| output.to_path_buf());
            if !fs::try_exists(&path).await.unwrap_or(false) {
                run.logger.log_warning(&format!(
                    "manifest marks encode done but {} is missing",
                    path.display()
                ));
            }
            run.finish_cached(stage).await;
            return Ok(path);
        }

        let started = run.begin(stage, "Encoding output video...");
        let path = self
            .backend
            .encode(&layout.final_frames(), output, meta.fps)
            .await
            .map_err(|e| WorkerError::stage(stage, e))?;
        let record = EncodeRecord {
            output: path.to_string_lossy().into_owned(),
        };
        run.complete(stage, &record, meta.frame_count, started).await?;
        Ok(path)
    }
}

/// Rediscover a cached stage's dense outputs; a gap means the cache is stale.
async fn list_cached(stage: PipelineStage, dir: &Path, kind: FrameKind) -> WorkerResult<Vec<PathBuf>> {
    frames::list_dense(dir, kind)
        .await
        .map_err(|e| WorkerError::stale(stage, e.to_string()))
}

fn expect_count(stage: PipelineStage, found: usize, expected: usize) -> WorkerResult<()> {
    if found != expected {
        return Err(WorkerError::stale(
            stage,
            format!("found {} frames, expected {}", found, expected),
        ));
    }
    Ok(())
}

/// Bookkeeping shared by every stage of one invocation.
struct StageRun<'a> {
    store: ManifestStore,
    logger: &'a JobLogger,
    status: &'a dyn StatusSink,
    job_id: &'a str,
    style_id: &'a str,
    total: usize,
    executed: Vec<PipelineStage>,
    cached: Vec<PipelineStage>,
}

impl StageRun<'_> {
    fn is_cached(&self, stage: PipelineStage) -> bool {
        self.store.is_done(stage)
    }

    fn begin(&self, stage: PipelineStage, detail: &str) -> Instant {
        self.logger.stage_started(stage, detail);
        Instant::now()
    }

    async fn complete<T: serde::Serialize>(
        &mut self,
        stage: PipelineStage,
        record: &T,
        frames: usize,
        started: Instant,
    ) -> WorkerResult<()> {
        self.store.mark_done(stage, record).await?;
        let elapsed = started.elapsed();
        self.logger.stage_completed(stage, frames, elapsed);
        metrics::record_stage_completed(stage, self.style_id, elapsed.as_secs_f64());
        self.executed.push(stage);
        self.report_progress().await;
        Ok(())
    }

    async fn finish_cached(&mut self, stage: PipelineStage) {
        self.logger.stage_cached(stage);
        metrics::record_stage_cached(stage);
        self.cached.push(stage);
        self.report_progress().await;
    }

    async fn report_progress(&self) {
        let done = self.executed.len() + self.cached.len();
        let progress = if self.total == 0 {
            1.0
        } else {
            done as f64 / self.total as f64
        };
        self.logger
            .log_progress(&format!("{}/{} stages ({:.0}%)", done, self.total, progress * 100.0));
        self.status
            .report(self.job_id, JobStatusUpdate::running(progress.min(1.0)))
            .await;
    }
}

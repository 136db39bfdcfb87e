//! Avatar stylization worker binary.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use avatar_media::FfmpegBackend;
use avatar_ml_client::{HttpModelProvider, InferenceClient, InferenceConfig};
use avatar_models::{JobId, StyleRegistry, DEFAULT_SEED};
use avatar_worker::{
    HttpStatusSink, JobRequest, NoopStatusSink, Pipeline, PipelineOptions, StatusSink,
    WorkerConfig,
};

/// Turn a face-scan video into a stylized character video.
#[derive(Debug, Parser)]
#[command(name = "avatar-worker", version)]
struct Cli {
    /// Input face-scan video
    #[arg(long)]
    input: PathBuf,

    /// Style id, or "all" to render every style
    #[arg(long)]
    style: String,

    /// Root for job directories and outputs
    #[arg(long, env = "AVATAR_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    #[arg(long, default_value_t = DEFAULT_SEED)]
    seed: u64,

    /// Stylize every Nth frame and interpolate the rest
    #[arg(long, env = "AVATAR_KEYFRAME_INTERVAL")]
    keyframe_interval: Option<usize>,

    /// Reuse this job directory (single style only)
    #[arg(long)]
    job_dir: Option<PathBuf>,

    /// Job id reported to the job tracker
    #[arg(long)]
    job_id: Option<String>,
}

fn init_tracing() {
    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("avatar=info,avatar_worker=info,avatar_media=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();

    match run(Cli::parse()).await {
        Ok(outputs) => {
            for output in outputs {
                println!("{}", output.display());
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<Vec<PathBuf>> {
    let mut config = WorkerConfig::from_env();
    if let Some(k) = cli.keyframe_interval {
        config.keyframe_interval = k;
    }
    if let Some(dir) = cli.output_dir.clone() {
        config.output_dir = dir;
    }
    config.validate()?;

    if !cli.input.is_file() {
        bail!("input video not found: {}", cli.input.display());
    }

    let registry = StyleRegistry::builtin();
    let styles = registry.resolve_selection(&cli.style)?;
    if cli.job_dir.is_some() && styles.len() > 1 {
        bail!("--job-dir can only be used with a single style");
    }
    info!("Worker config: {:?}", config);

    let inference = InferenceClient::new(
        &InferenceConfig::new(config.inference_url.clone()).with_timeout(config.inference_timeout),
    )
    .context("building inference client")?;
    let status: Arc<dyn StatusSink> = match &config.backend_url {
        Some(url) => Arc::new(HttpStatusSink::new(url.clone())),
        None => Arc::new(NoopStatusSink),
    };
    let pipeline = Pipeline::new(
        Arc::new(FfmpegBackend::with_timeout(config.ffmpeg_timeout.as_secs())),
        Arc::new(HttpModelProvider::new(inference)),
    )
    .with_registry(registry.clone())
    .with_status_sink(status)
    .with_options(PipelineOptions::from(&config));

    let stem = cli
        .input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "input".to_string());

    let mut outputs = Vec::with_capacity(styles.len());
    for style in styles {
        let job_id = cli
            .job_id
            .clone()
            .map(JobId::from_string)
            .unwrap_or_default();
        let request = JobRequest {
            job_dir: cli
                .job_dir
                .clone()
                .unwrap_or_else(|| default_job_dir(&config.output_dir, &job_id, &style.style_id)),
            output: config
                .output_dir
                .join(format!("output_{}_{}.mp4", style.style_id, stem)),
            input: cli.input.clone(),
            style_id: style.style_id.clone(),
            seed: cli.seed,
            job_id,
        };

        let outcome = pipeline
            .run(&request)
            .await
            .with_context(|| format!("style '{}' failed", style.style_id))?;
        outputs.push(outcome.output);
    }
    Ok(outputs)
}

fn default_job_dir(output_dir: &Path, job_id: &JobId, style_id: &str) -> PathBuf {
    output_dir.join(format!("job_{}_{}", job_id.short(), style_id))
}

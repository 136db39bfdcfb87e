//! Application state.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use avatar_models::{Job, JobStatusUpdate, StyleRegistry};

use crate::config::ApiConfig;

/// In-memory job table.
///
/// Jobs are created on submission and mutated by worker status updates.
/// Nothing is evicted and nothing survives a restart.
#[derive(Debug, Clone, Default)]
pub struct JobStore {
    jobs: Arc<RwLock<HashMap<String, Job>>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, job: Job) -> Job {
        let mut jobs = self.jobs.write().await;
        jobs.insert(job.job_id.as_str().to_string(), job.clone());
        job
    }

    pub async fn get(&self, job_id: &str) -> Option<Job> {
        self.jobs.read().await.get(job_id).cloned()
    }

    /// All jobs, oldest first.
    pub async fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        jobs
    }

    /// Merge `update` into the job; `None` if the job is unknown.
    pub async fn apply(&self, job_id: &str, update: &JobStatusUpdate) -> Option<Job> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(job_id)?;
        job.apply(update);
        Some(job.clone())
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub jobs: JobStore,
    pub styles: Arc<StyleRegistry>,
}

impl AppState {
    pub fn new(config: ApiConfig) -> Self {
        Self {
            config,
            jobs: JobStore::new(),
            styles: Arc::new(StyleRegistry::builtin()),
        }
    }
}

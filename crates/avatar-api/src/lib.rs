//! Axum job-submission API for avatar generation.
//!
//! This crate provides:
//! - Face-scan video uploads and asset lookup
//! - Generation job submission against the style catalog
//! - Job status polling and worker status updates over an in-memory store
//! - Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::{AppState, JobStore};

//! Client for the inference service hosting the pose, depth and stylizer models.
//!
//! [`HttpModelProvider`] implements the capability traits of `avatar-media`
//! over a small JSON protocol:
//!
//! | Route | Purpose |
//! |---|---|
//! | `POST /v1/models/load` | acquire a model instance, returns a handle |
//! | `POST /v1/models/unload` | release a handle |
//! | `POST /v1/pose` | landmark detection + pose render |
//! | `POST /v1/depth` | raw depth field |
//! | `POST /v1/stylize` | conditioned img2img |
//!
//! Images travel as base64-encoded PNG.

pub mod client;
pub mod error;
pub mod models;
pub mod wire;

pub use client::{InferenceClient, InferenceConfig};
pub use error::{MlClientError, MlClientResult};
pub use models::{HttpDepthRenderer, HttpModelProvider, HttpPoseRenderer, HttpStylizer};

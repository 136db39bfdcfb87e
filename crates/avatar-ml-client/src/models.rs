//! Capability implementations backed by the inference service.

use async_trait::async_trait;
use image::{GrayImage, RgbImage};
use tracing::{debug, info};

use avatar_media::{
    normalize_depth, ControlImages, DepthRenderer, MediaResult, ModelProvider, PoseRender,
    PoseRenderer, Stylizer,
};
use avatar_models::{StyleConfig, DEFAULT_FACE_DESCRIPTION};

use crate::client::InferenceClient;
use crate::error::{MlClientError, MlClientResult};
use crate::wire::{
    b64_to_rgb, gray_to_b64, rgb_to_b64, DepthRequest, DepthResponse, ModelKind, PoseRequest,
    PoseResponse, StylizeRequest, StylizeResponse,
};

/// A loaded model instance on the service.
///
/// Dropping the lease fires a best-effort unload on the current Tokio
/// runtime; outside a runtime the service's idle reaper is relied on.
#[derive(Debug)]
struct ModelLease {
    client: InferenceClient,
    handle: String,
    kind: ModelKind,
}

impl ModelLease {
    async fn acquire(
        client: &InferenceClient,
        kind: ModelKind,
        model_id: Option<&str>,
    ) -> MlClientResult<Self> {
        let handle = client.load(kind, model_id).await?;
        info!("Acquired {:?} model ({})", kind, handle);
        Ok(Self {
            client: client.clone(),
            handle,
            kind,
        })
    }
}

impl Drop for ModelLease {
    fn drop(&mut self) {
        let client = self.client.clone();
        let handle = std::mem::take(&mut self.handle);
        let kind = self.kind;
        match tokio::runtime::Handle::try_current() {
            Ok(rt) => {
                rt.spawn(async move {
                    match client.unload(&handle).await {
                        Ok(()) => debug!("Released {:?} model ({})", kind, handle),
                        Err(e) => debug!("Release of {:?} model ({}) failed: {}", kind, handle, e),
                    }
                });
            }
            Err(_) => debug!("No runtime to release {:?} model ({})", kind, handle),
        }
    }
}

/// [`ModelProvider`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpModelProvider {
    client: InferenceClient,
}

impl HttpModelProvider {
    pub fn new(client: InferenceClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ModelProvider for HttpModelProvider {
    async fn load_pose(&self) -> MediaResult<Box<dyn PoseRenderer>> {
        let lease = ModelLease::acquire(&self.client, ModelKind::Pose, None)
            .await
            .map_err(|e| e.into_media("pose"))?;
        Ok(Box::new(HttpPoseRenderer { lease }))
    }

    async fn load_depth(&self) -> MediaResult<Box<dyn DepthRenderer>> {
        let lease = ModelLease::acquire(&self.client, ModelKind::Depth, None)
            .await
            .map_err(|e| e.into_media("depth"))?;
        Ok(Box::new(HttpDepthRenderer { lease }))
    }

    async fn load_stylizer(&self, style: &StyleConfig) -> MediaResult<Box<dyn Stylizer>> {
        let lease = ModelLease::acquire(&self.client, ModelKind::Stylizer, Some(&style.model_id))
            .await
            .map_err(|e| e.into_media("stylize"))?;
        Ok(Box::new(HttpStylizer { lease }))
    }
}

// =============================================================================
// Pose
// =============================================================================

#[derive(Debug)]
pub struct HttpPoseRenderer {
    lease: ModelLease,
}

impl HttpPoseRenderer {
    async fn call(&self, frame: &RgbImage, width: u32, height: u32) -> MlClientResult<PoseRender> {
        let req = PoseRequest {
            handle: &self.lease.handle,
            image: rgb_to_b64(frame)?,
            width,
            height,
        };
        let resp: PoseResponse = self.lease.client.post_json("/v1/pose", &req).await?;
        if !resp.face_found {
            return Ok(PoseRender::blank(width, height));
        }
        let image = b64_to_rgb(&resp.image)?;
        if image.dimensions() != (width, height) {
            return Err(MlClientError::invalid_response(format!(
                "pose render is {:?}, expected {}x{}",
                image.dimensions(),
                width,
                height
            )));
        }
        Ok(PoseRender {
            image,
            face_found: true,
        })
    }
}

#[async_trait]
impl PoseRenderer for HttpPoseRenderer {
    async fn detect(&self, frame: &RgbImage, width: u32, height: u32) -> MediaResult<PoseRender> {
        self.call(frame, width, height)
            .await
            .map_err(|e| e.into_media("pose"))
    }
}

// =============================================================================
// Depth
// =============================================================================

#[derive(Debug)]
pub struct HttpDepthRenderer {
    lease: ModelLease,
}

impl HttpDepthRenderer {
    async fn call(&self, frame: &RgbImage) -> MlClientResult<GrayImage> {
        let req = DepthRequest {
            handle: &self.lease.handle,
            image: rgb_to_b64(frame)?,
        };
        let resp: DepthResponse = self.lease.client.post_json("/v1/depth", &req).await?;
        let depth = normalize_depth(&resp.depth, resp.width, resp.height)?;
        if depth.dimensions() == frame.dimensions() {
            return Ok(depth);
        }
        // Models often predict at a reduced resolution.
        let (w, h) = frame.dimensions();
        Ok(image::imageops::resize(
            &depth,
            w,
            h,
            image::imageops::FilterType::Triangle,
        ))
    }
}

#[async_trait]
impl DepthRenderer for HttpDepthRenderer {
    async fn estimate(&self, frame: &RgbImage) -> MediaResult<GrayImage> {
        self.call(frame).await.map_err(|e| e.into_media("depth"))
    }
}

// =============================================================================
// Stylizer
// =============================================================================

#[derive(Debug)]
pub struct HttpStylizer {
    lease: ModelLease,
}

impl HttpStylizer {
    async fn call(
        &self,
        frame: &RgbImage,
        control: &ControlImages,
        style: &StyleConfig,
        seed: u64,
    ) -> MlClientResult<RgbImage> {
        let req = StylizeRequest {
            handle: &self.lease.handle,
            image: rgb_to_b64(frame)?,
            pose: rgb_to_b64(&control.pose)?,
            depth: gray_to_b64(&control.depth)?,
            prompt: style.prompt(DEFAULT_FACE_DESCRIPTION),
            negative_prompt: &style.negative_prompt,
            denoising_strength: style.denoising_strength,
            num_inference_steps: style.effective_steps(),
            guidance_scale: style.guidance_scale,
            pose_weight: style.pose_weight,
            depth_weight: style.depth_weight,
            seed,
        };
        let resp: StylizeResponse = self.lease.client.post_json("/v1/stylize", &req).await?;
        let styled = b64_to_rgb(&resp.image)?;
        let (w, h) = frame.dimensions();
        if styled.dimensions() == (w, h) {
            return Ok(styled);
        }
        Ok(image::imageops::resize(
            &styled,
            w,
            h,
            image::imageops::FilterType::Lanczos3,
        ))
    }
}

#[async_trait]
impl Stylizer for HttpStylizer {
    async fn stylize(
        &self,
        frame: &RgbImage,
        control: &ControlImages,
        style: &StyleConfig,
        seed: u64,
    ) -> MediaResult<RgbImage> {
        self.call(frame, control, style, seed)
            .await
            .map_err(|e| e.into_media("stylize"))
    }
}

//! Style profiles and the static style registry.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Substitution token in prompt templates.
pub const FACE_DESCRIPTION_TOKEN: &str = "{face_description}";

/// Description substituted when the caller provides none.
pub const DEFAULT_FACE_DESCRIPTION: &str = "person face";

/// Low-step fast inference mode (distilled consistency sampler).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FastInference {
    /// Step count used instead of `num_inference_steps`
    pub steps: u32,
}

/// Immutable named style profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StyleConfig {
    pub style_id: String,
    pub display_name: String,
    /// Base diffusion model selector
    pub model_id: String,
    /// Prompt with a `{face_description}` token
    pub prompt_template: String,
    pub negative_prompt: String,
    /// img2img denoising strength (0-1)
    pub denoising_strength: f32,
    pub num_inference_steps: u32,
    pub guidance_scale: f32,
    /// Conditioning weight of the pose control image
    pub pose_weight: f32,
    /// Conditioning weight of the depth control image
    pub depth_weight: f32,
    /// Color transfer strength toward the original footage (0-1)
    pub color_match_strength: f32,
    /// Temporal blend radius in frames
    pub temporal_blend_frames: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fast_mode: Option<FastInference>,
}

impl StyleConfig {
    /// Render the prompt for a face description.
    pub fn prompt(&self, face_description: &str) -> String {
        self.prompt_template
            .replace(FACE_DESCRIPTION_TOKEN, face_description)
    }

    /// Step count actually used by the stylizer.
    pub fn effective_steps(&self) -> u32 {
        self.fast_mode
            .map(|fast| fast.steps)
            .unwrap_or(self.num_inference_steps)
    }
}

impl fmt::Display for StyleConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.display_name, self.style_id)
    }
}

/// Requested style id is not in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown style '{id}'. Valid: {}", valid.join(", "))]
pub struct UnknownStyle {
    pub id: String,
    pub valid: Vec<String>,
}

/// Fixed catalog of style profiles.
#[derive(Debug, Clone)]
pub struct StyleRegistry {
    styles: Vec<StyleConfig>,
}

impl Default for StyleRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl StyleRegistry {
    /// Keyword accepted by [`StyleRegistry::resolve_selection`] for every style.
    pub const ALL_KEYWORD: &'static str = "all";

    /// The three built-in profiles.
    pub fn builtin() -> Self {
        Self {
            styles: vec![beauty_realistic(), promptable_avatar(), animated_anime()],
        }
    }

    /// Look up a style by id.
    pub fn get(&self, style_id: &str) -> Result<&StyleConfig, UnknownStyle> {
        self.styles
            .iter()
            .find(|s| s.style_id == style_id)
            .ok_or_else(|| UnknownStyle {
                id: style_id.to_string(),
                valid: self.ids().map(str::to_string).collect(),
            })
    }

    /// Whether `style_id` names a registered style.
    pub fn contains(&self, style_id: &str) -> bool {
        self.styles.iter().any(|s| s.style_id == style_id)
    }

    /// Registered ids, in catalog order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.styles.iter().map(|s| s.style_id.as_str())
    }

    /// All profiles, in catalog order.
    pub fn all(&self) -> &[StyleConfig] {
        &self.styles
    }

    /// Expand a CLI selection: `"all"` or a single style id.
    pub fn resolve_selection(&self, selection: &str) -> Result<Vec<&StyleConfig>, UnknownStyle> {
        if selection.eq_ignore_ascii_case(Self::ALL_KEYWORD) {
            Ok(self.styles.iter().collect())
        } else {
            self.get(selection).map(|s| vec![s])
        }
    }
}

const SD15_MODEL_ID: &str = "stable-diffusion-v1-5/stable-diffusion-v1-5";
const ANIME_MODEL_ID: &str = "stablediffusionapi/anything-v5";
const DEFAULT_FAST_MODE: Option<FastInference> = Some(FastInference { steps: 6 });

fn beauty_realistic() -> StyleConfig {
    StyleConfig {
        style_id: "beauty-realistic".into(),
        display_name: "Beauty Realistic".into(),
        model_id: SD15_MODEL_ID.into(),
        prompt_template: "professional portrait photograph, {face_description}, \
            beauty retouched skin, soft studio lighting, sharp focus, \
            detailed face, natural colors, 8k uhd"
            .into(),
        negative_prompt: "cartoon, anime, illustration, painting, drawing, \
            deformed, ugly, blurry, bad anatomy, disfigured, \
            poorly drawn face, mutation, extra limbs"
            .into(),
        denoising_strength: 0.35,
        num_inference_steps: 25,
        guidance_scale: 7.5,
        pose_weight: 1.2,
        depth_weight: 0.8,
        color_match_strength: 0.7,
        temporal_blend_frames: 2,
        fast_mode: DEFAULT_FAST_MODE,
    }
}

fn promptable_avatar() -> StyleConfig {
    StyleConfig {
        style_id: "promptable-avatar".into(),
        display_name: "Promptable Avatar".into(),
        model_id: SD15_MODEL_ID.into(),
        prompt_template: "stylized digital portrait, {face_description}, \
            artistic render, vibrant colors, cinematic lighting, \
            highly detailed, trending on artstation"
            .into(),
        negative_prompt: "cartoon, anime, illustration, painting, drawing, \
            ugly, deformed, disfigured, poorly drawn face, \
            bad anatomy, mutation, extra limbs, blurry"
            .into(),
        denoising_strength: 0.55,
        num_inference_steps: 30,
        guidance_scale: 8.0,
        pose_weight: 1.0,
        depth_weight: 0.7,
        color_match_strength: 0.4,
        temporal_blend_frames: 2,
        fast_mode: DEFAULT_FAST_MODE,
    }
}

fn animated_anime() -> StyleConfig {
    StyleConfig {
        style_id: "animated-anime".into(),
        display_name: "Animated / Anime".into(),
        model_id: ANIME_MODEL_ID.into(),
        prompt_template: "anime portrait, {face_description}, \
            studio ghibli style, cel shading, clean lines, \
            vibrant anime colors, detailed anime eyes, masterpiece"
            .into(),
        negative_prompt: "photorealistic, photograph, 3d render, ugly, \
            deformed, bad anatomy, poorly drawn, low quality, \
            worst quality, blurry, extra limbs"
            .into(),
        denoising_strength: 0.65,
        num_inference_steps: 30,
        guidance_scale: 8.5,
        pose_weight: 1.0,
        depth_weight: 0.6,
        color_match_strength: 0.2,
        temporal_blend_frames: 3,
        fast_mode: DEFAULT_FAST_MODE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_has_three_styles() {
        let registry = StyleRegistry::builtin();
        let ids: Vec<&str> = registry.ids().collect();
        assert_eq!(
            ids,
            vec!["beauty-realistic", "promptable-avatar", "animated-anime"]
        );
    }

    #[test]
    fn test_unknown_style_is_error() {
        let registry = StyleRegistry::builtin();
        let err = registry.get("nonexistent").unwrap_err();
        assert_eq!(err.id, "nonexistent");
        assert_eq!(err.valid.len(), 3);
        assert!(err.to_string().contains("beauty-realistic"));
        assert!(!registry.contains("nonexistent"));
    }

    #[test]
    fn test_prompt_substitution() {
        let registry = StyleRegistry::builtin();
        let style = registry.get("animated-anime").unwrap();
        let prompt = style.prompt(DEFAULT_FACE_DESCRIPTION);
        assert!(prompt.starts_with("anime portrait, person face,"));
        assert!(!prompt.contains(FACE_DESCRIPTION_TOKEN));
    }

    #[test]
    fn test_effective_steps() {
        let registry = StyleRegistry::builtin();
        let mut style = registry.get("beauty-realistic").unwrap().clone();
        assert_eq!(style.effective_steps(), 6);
        style.fast_mode = None;
        assert_eq!(style.effective_steps(), 25);
    }

    #[test]
    fn test_resolve_selection() {
        let registry = StyleRegistry::builtin();
        assert_eq!(registry.resolve_selection("all").unwrap().len(), 3);
        assert_eq!(registry.resolve_selection("ALL").unwrap().len(), 3);
        let one = registry.resolve_selection("promptable-avatar").unwrap();
        assert_eq!(one[0].style_id, "promptable-avatar");
        assert!(registry.resolve_selection("sketch").is_err());
    }

    #[test]
    fn test_tunables_in_range() {
        for style in StyleRegistry::builtin().all() {
            assert!((0.0..=1.0).contains(&style.denoising_strength));
            assert!((0.0..=1.0).contains(&style.color_match_strength));
            assert!(style.prompt_template.contains(FACE_DESCRIPTION_TOKEN));
        }
    }
}

//! Parameter records shared by the editor and the external services.
//!
//! The store keeps [`BaseStructure`] and [`CosmeticRender`] as separate
//! entities (one base, many renders). [`Sbgb`] is the combined view that
//! goes over the wire for build and save calls.

use serde::{Deserialize, Serialize};

use crate::lenient;

/// Noise function used by the structural generator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NoiseKind {
    #[default]
    Fbm,
    Ridged,
    Billow,
}

/// How colors are blended between thresholds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Interpolation {
    #[default]
    Linear,
    Smooth,
}

/// One named layer of a multi-layer structure.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoiseLayer {
    pub name: String,
    #[serde(default)]
    pub noise_type: NoiseKind,
    #[serde(deserialize_with = "lenient::number")]
    pub octaves: u32,
    #[serde(deserialize_with = "lenient::finite")]
    pub persistence: f64,
    #[serde(deserialize_with = "lenient::finite")]
    pub lacunarity: f64,
    #[serde(deserialize_with = "lenient::finite")]
    pub scale: f64,
    #[serde(deserialize_with = "lenient::finite")]
    pub opacity: f64,
    #[serde(default = "enabled")]
    pub enabled: bool,
}

fn enabled() -> bool {
    true
}

/// Seed, geometry and noise parameters. Immutable per version: any change
/// here invalidates the renders saved against it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseStructure {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Descriptive label.
    #[serde(default)]
    pub name: String,

    // Geometry
    #[serde(deserialize_with = "lenient::number")]
    pub width: u32,
    #[serde(deserialize_with = "lenient::number")]
    pub height: u32,
    #[serde(deserialize_with = "lenient::number")]
    pub seed: i64,

    // Noise
    #[serde(deserialize_with = "lenient::number")]
    pub octaves: u32,
    #[serde(deserialize_with = "lenient::finite")]
    pub persistence: f64,
    #[serde(deserialize_with = "lenient::finite")]
    pub lacunarity: f64,
    #[serde(deserialize_with = "lenient::finite")]
    pub scale: f64,
    #[serde(default)]
    pub noise_type: NoiseKind,
    #[serde(default)]
    pub use_multi_layer: bool,
    #[serde(default)]
    pub layers: Vec<NoiseLayer>,
}

/// Color mapping applied on top of a base structure.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorParams {
    pub back_color: String,
    pub middle_color: String,
    pub fore_color: String,
    #[serde(deserialize_with = "lenient::finite")]
    pub back_threshold: f64,
    #[serde(deserialize_with = "lenient::finite")]
    pub middle_threshold: f64,
    #[serde(default)]
    pub interpolation_type: Interpolation,
    #[serde(default)]
    pub transparent_background: bool,
}

impl ColorParams {
    /// Set the lower threshold, pushing the upper one above it when they cross.
    pub fn set_back_threshold(&mut self, value: f64, step: f64) {
        self.back_threshold = value;
        if self.back_threshold >= self.middle_threshold {
            self.middle_threshold = value + step;
        }
    }

    /// Set the upper threshold, pulling the lower one beneath it when they cross.
    pub fn set_middle_threshold(&mut self, value: f64, step: f64) {
        self.middle_threshold = value;
        if self.middle_threshold <= self.back_threshold {
            self.back_threshold = value - step;
        }
    }
}

/// A saved color mapping for one base structure.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CosmeticRender {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub base_structure_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub colors: ColorParams,
    #[serde(deserialize_with = "lenient::number")]
    pub note: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}

/// Combined structure + color view sent to the build and save calls.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sbgb {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub image_structure: BaseStructure,
    pub image_color: ColorParams,
}

impl Sbgb {
    pub fn new(image_structure: BaseStructure, image_color: ColorParams) -> Self {
        Self {
            id: None,
            name: None,
            description: None,
            image_structure,
            image_color,
        }
    }

    /// Project a saved render and its owning base into a loadable view.
    pub fn from_render(base: &BaseStructure, render: &CosmeticRender) -> Self {
        Self {
            id: render.id.clone(),
            name: render.name.clone().or_else(|| Some(base.name.clone())),
            description: render.description.clone(),
            image_structure: base.clone(),
            image_color: render.colors.clone(),
        }
    }

    pub fn structure(&self) -> &BaseStructure {
        &self.image_structure
    }

    pub fn cosmetics(&self) -> &ColorParams {
        &self.image_color
    }

    pub fn base_id(&self) -> Option<&str> {
        self.image_structure.id.as_deref()
    }
}

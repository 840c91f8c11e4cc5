use std::path::Path;

use serde::Deserialize;

use crate::model::{BaseStructure, ColorParams, Interpolation, NoiseKind};

/// Editor tunables. Loadable from JSON; any missing key keeps its default.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EditorConfig {
    // Starting values for a fresh session
    pub default_structure: BaseStructure,
    pub default_colors: ColorParams,

    // Threshold sliders
    pub threshold_step: f64,

    // Ratings
    pub min_note: u8,
    pub max_note: u8,

    // Previews
    pub thumbnail_size: u32,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            default_structure: BaseStructure::default(),
            default_colors: ColorParams::default(),
            threshold_step: 0.01,
            min_note: 1,
            max_note: 5,
            thumbnail_size: 128,
        }
    }
}

impl EditorConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::from_json(&text)?)
    }

    pub fn note_in_range(&self, note: u8) -> bool {
        (self.min_note..=self.max_note).contains(&note)
    }
}

/// Slider defaults for a new structure.
impl Default for BaseStructure {
    fn default() -> Self {
        Self {
            id: None,
            name: String::new(),
            width: 512,
            height: 512,
            seed: 42,
            octaves: 6,
            persistence: 0.5,
            lacunarity: 2.0,
            scale: 100.0,
            noise_type: NoiseKind::Fbm,
            use_multi_layer: false,
            layers: Vec::new(),
        }
    }
}

impl Default for ColorParams {
    fn default() -> Self {
        Self {
            back_color: "#000000".into(),
            middle_color: "#3B2F5B".into(),
            fore_color: "#FFFFFF".into(),
            back_threshold: 0.35,
            middle_threshold: 0.65,
            interpolation_type: Interpolation::Linear,
            transparent_background: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = EditorConfig::from_json(r#"{"thumbnailSize": 64, "maxNote": 10}"#).unwrap();
        assert_eq!(cfg.thumbnail_size, 64);
        assert_eq!(cfg.max_note, 10);
        assert_eq!(cfg.threshold_step, 0.01);
        assert_eq!(cfg.default_structure.seed, 42);
    }

    #[test]
    fn note_bounds() {
        let cfg = EditorConfig::default();
        assert!(!cfg.note_in_range(0));
        assert!(cfg.note_in_range(1));
        assert!(cfg.note_in_range(5));
        assert!(!cfg.note_in_range(6));
    }

    #[test]
    fn default_thresholds_are_ordered() {
        let c = ColorParams::default();
        assert!(c.back_threshold < c.middle_threshold);
    }
}

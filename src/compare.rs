//! Field-wise equality between parameter snapshots.
//!
//! Structural comparison covers everything that shapes the generated image
//! (geometry, seed, noise settings, layers). Identity and labels are not
//! part of it. Numeric fields are already coerced at deserialization time,
//! so plain comparisons are enough here. All functions are total.

use crate::model::{BaseStructure, ColorParams, NoiseLayer, Sbgb};

/// True when any structural field differs.
pub fn is_structural_change(a: &BaseStructure, b: &BaseStructure) -> bool {
    a.width != b.width
        || a.height != b.height
        || a.seed != b.seed
        || a.octaves != b.octaves
        || a.persistence != b.persistence
        || a.lacunarity != b.lacunarity
        || a.scale != b.scale
        || a.noise_type != b.noise_type
        || a.use_multi_layer != b.use_multi_layer
        || layers_differ(&a.layers, &b.layers)
}

fn layers_differ(a: &[NoiseLayer], b: &[NoiseLayer]) -> bool {
    a.len() != b.len()
        || a.iter().zip(b).any(|(x, y)| {
            x.name != y.name
                || x.noise_type != y.noise_type
                || x.octaves != y.octaves
                || x.persistence != y.persistence
                || x.lacunarity != y.lacunarity
                || x.scale != y.scale
                || x.opacity != y.opacity
                || x.enabled != y.enabled
        })
}

/// True when any color-mapping field differs.
pub fn is_cosmetic_change(a: &ColorParams, b: &ColorParams) -> bool {
    a.back_color != b.back_color
        || a.middle_color != b.middle_color
        || a.fore_color != b.fore_color
        || a.back_threshold != b.back_threshold
        || a.middle_threshold != b.middle_threshold
        || a.interpolation_type != b.interpolation_type
        || a.transparent_background != b.transparent_background
}

/// True if there is no reference, or structure, colors or name differ.
/// Descriptions are derived and ignored.
pub fn is_modified(current: &Sbgb, reference: Option<&Sbgb>) -> bool {
    let Some(reference) = reference else {
        return true;
    };
    is_structural_change(&current.image_structure, &reference.image_structure)
        || is_cosmetic_change(&current.image_color, &reference.image_color)
        || current.name != reference.name
}

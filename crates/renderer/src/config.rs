//! Tunables for the model drawers. Loaded as part of the game's `config.ron`.

use glam::Vec4;
use serde::{Deserialize, Serialize};

use crate::drawer_state::DrawerKind;
use crate::error::{RenderError, Result};

/// Draw distances, transparency, LOD scales and backend preferences.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrawerConfig {
    /// Global model draw distance; beyond `radius + distance` objects become far-texture impostors.
    #[serde(default = "default_model_draw_distance")]
    pub model_draw_distance: f32,
    /// Units in line of sight farther than this are drawn as icons.
    #[serde(default = "default_unit_icon_distance")]
    pub unit_icon_distance: f32,
    /// Transparency of cloaked units and ghosts, 0 = opaque.
    #[serde(default = "default_unit_transparency")]
    pub unit_transparency: f32,
    #[serde(default = "default_feature_draw_distance")]
    pub feature_draw_distance: f32,
    #[serde(default = "default_feature_fade_distance")]
    pub feature_fade_distance: f32,
    #[serde(default = "default_lod_scale")]
    pub lod_scale: f32,
    #[serde(default = "default_lod_scale")]
    pub lod_scale_shadow: f32,
    #[serde(default = "default_lod_scale")]
    pub lod_scale_reflection: f32,
    #[serde(default = "default_lod_scale")]
    pub lod_scale_refraction: f32,
    #[serde(default)]
    pub allow_deferred_model_rendering: bool,
    #[serde(default)]
    pub allow_deferred_model_buffer_clear: bool,
    #[serde(default = "default_true")]
    pub adv_model_shading: bool,
    #[serde(default = "default_true")]
    pub mt_model_drawer: bool,
    /// Object count below which the per-frame update stays on the render thread.
    #[serde(default = "default_mt_object_threshold")]
    pub mt_object_threshold: usize,
    #[serde(default)]
    pub preferred_drawer: Option<DrawerKind>,
    #[serde(default = "default_true")]
    pub ghosted_buildings: bool,
    /// Being-built units glow in their team colour instead of the nano colour.
    #[serde(default = "default_true")]
    pub team_nanospray: bool,
}

fn default_model_draw_distance() -> f32 {
    1000.0
}
fn default_unit_icon_distance() -> f32 {
    10000.0
}
fn default_unit_transparency() -> f32 {
    0.7
}
fn default_feature_draw_distance() -> f32 {
    6000.0
}
fn default_feature_fade_distance() -> f32 {
    4500.0
}
fn default_lod_scale() -> f32 {
    1.0
}
fn default_true() -> bool {
    true
}
fn default_mt_object_threshold() -> usize {
    256
}

impl Default for DrawerConfig {
    fn default() -> Self {
        Self {
            model_draw_distance: default_model_draw_distance(),
            unit_icon_distance: default_unit_icon_distance(),
            unit_transparency: default_unit_transparency(),
            feature_draw_distance: default_feature_draw_distance(),
            feature_fade_distance: default_feature_fade_distance(),
            lod_scale: default_lod_scale(),
            lod_scale_shadow: default_lod_scale(),
            lod_scale_reflection: default_lod_scale(),
            lod_scale_refraction: default_lod_scale(),
            allow_deferred_model_rendering: false,
            allow_deferred_model_buffer_clear: false,
            adv_model_shading: true,
            mt_model_drawer: true,
            mt_object_threshold: default_mt_object_threshold(),
            preferred_drawer: None,
            ghosted_buildings: true,
            team_nanospray: true,
        }
    }
}

impl DrawerConfig {
    /// Reject values no drawer can work with.
    pub fn validate(&self) -> Result<()> {
        let distances = [
            ("model_draw_distance", self.model_draw_distance),
            ("unit_icon_distance", self.unit_icon_distance),
            ("feature_draw_distance", self.feature_draw_distance),
            ("feature_fade_distance", self.feature_fade_distance),
        ];
        for (name, value) in distances {
            if !value.is_finite() || value < 0.0 {
                return Err(RenderError::config(format!("{name} must be a non-negative number, got {value}")));
            }
        }
        let scales = [
            ("lod_scale", self.lod_scale),
            ("lod_scale_shadow", self.lod_scale_shadow),
            ("lod_scale_reflection", self.lod_scale_reflection),
            ("lod_scale_refraction", self.lod_scale_refraction),
        ];
        for (name, value) in scales {
            if !value.is_finite() || value < 0.0 {
                return Err(RenderError::config(format!("{name} must be a non-negative number, got {value}")));
            }
        }
        Ok(())
    }

    /// Alpha levels for translucent drawing: x cloaked, y dead ghosts and
    /// plain live ghosts, z radar-tracked live ghosts, w highlight.
    pub fn alpha_values(&self) -> Vec4 {
        let x = (1.0 - self.unit_transparency).clamp(0.11, 1.0);
        Vec4::new(x, (x + 0.1).min(1.0), (x + 0.2).min(1.0), (x + 0.4).min(1.0))
    }

    /// Fade start distance, never beyond the feature draw distance.
    pub fn feature_fade_distance_clamped(&self) -> f32 {
        self.feature_fade_distance.min(self.feature_draw_distance)
    }
}

/// LOD scales are applied as reciprocals; a zero scale disables LOD switching.
pub fn reciprocal_lod_scale(scale: f32) -> f32 {
    if scale == 0.0 {
        0.0
    } else {
        1.0 / scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_alpha_values() {
        let cfg = DrawerConfig::default();
        let a = cfg.alpha_values();
        assert!((a.x - 0.3).abs() < 1e-6);
        assert!((a.y - 0.4).abs() < 1e-6);
        assert!((a.z - 0.5).abs() < 1e-6);
        assert!((a.w - 0.7).abs() < 1e-6);
    }

    #[test]
    fn alpha_values_are_clamped() {
        let cfg = DrawerConfig {
            unit_transparency: 0.0,
            ..Default::default()
        };
        assert_eq!(cfg.alpha_values(), Vec4::ONE);

        let cfg = DrawerConfig {
            unit_transparency: 1.0,
            ..Default::default()
        };
        assert!((cfg.alpha_values().x - 0.11).abs() < 1e-6);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let cfg: DrawerConfig = ron::from_str("(model_draw_distance: 250.0, preferred_drawer: Some(Glsl))").unwrap();
        assert_eq!(cfg.model_draw_distance, 250.0);
        assert_eq!(cfg.preferred_drawer, Some(DrawerKind::Glsl));
        assert_eq!(cfg.mt_object_threshold, 256);
        assert!(cfg.ghosted_buildings);
    }

    #[test]
    fn negative_distance_is_rejected() {
        let cfg = DrawerConfig {
            feature_draw_distance: -1.0,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(RenderError::Config(_))));
        assert!(DrawerConfig::default().validate().is_ok());
    }

    #[test]
    fn fade_distance_never_exceeds_draw_distance() {
        let cfg = DrawerConfig {
            feature_draw_distance: 100.0,
            feature_fade_distance: 400.0,
            ..Default::default()
        };
        assert_eq!(cfg.feature_fade_distance_clamped(), 100.0);
        assert_eq!(reciprocal_lod_scale(0.0), 0.0);
        assert_eq!(reciprocal_lod_scale(2.0), 0.5);
    }
}

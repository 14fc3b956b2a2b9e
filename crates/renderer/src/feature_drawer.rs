//! Feature classification with distance fading.

use crate::camera::CameraType;
use crate::config::DrawerConfig;
use crate::drawer_data::{classify_cameras, far_tex_distance_sq, Classification, ClassifyInput, ObjectKind, PlayerClass};
use crate::env::FrameView;
use crate::lua_object_drawer::LuaObjType;

pub struct FeatureKind {
    model_draw_distance: f32,
    draw_distance: f32,
    fade_distance: f32,
}

impl FeatureKind {
    pub fn new(config: &DrawerConfig) -> Self {
        Self {
            model_draw_distance: config.model_draw_distance,
            draw_distance: config.feature_draw_distance,
            fade_distance: config.feature_fade_distance_clamped(),
        }
    }

    pub fn set_draw_distances(&mut self, fade_distance: f32, draw_distance: f32) {
        self.draw_distance = draw_distance;
        self.fade_distance = fade_distance.min(draw_distance);
        log::info!(
            "[FeatureDrawer] fade distance {}, draw distance {}",
            self.fade_distance,
            self.draw_distance
        );
    }

    pub fn set_model_draw_distance(&mut self, distance: f32) {
        self.model_draw_distance = distance;
    }

    /// Opacity of a fading feature at a squared camera distance.
    pub fn fade_alpha(&self, radius: f32, sq_dist: f32) -> f32 {
        let fade_end = self.draw_distance.min(radius + self.model_draw_distance);
        let fade_begin = self.fade_distance.min(fade_end);
        let end_sq = fade_end * fade_end;
        let begin_sq = fade_begin * fade_begin;
        if end_sq <= begin_sq {
            return if sq_dist < end_sq { 1.0 } else { 0.0 };
        }
        ((end_sq - sq_dist) / (end_sq - begin_sq)).clamp(0.0, 1.0)
    }
}

impl ObjectKind for FeatureKind {
    const NAME: &'static str = "Feature";
    const LUA_TYPE: LuaObjType = LuaObjType::Feature;

    fn classify(&self, input: &ClassifyInput<'_>, view: &FrameView<'_>) -> Classification {
        let cam_pos = view.env.cameras.get(CameraType::Player).position();
        let sq_dist = cam_pos.distance_squared(input.transform.position);
        let radius = input.solid.radius;

        // Only features marked for fading get the fade math; the rest switch
        // straight to impostors at the model draw distance.
        let (player, draw_alpha) = if !input.solid.alpha_fade {
            if sq_dist >= far_tex_distance_sq(radius, self.model_draw_distance) {
                (PlayerClass::FarTex, 1.0)
            } else {
                (PlayerClass::Opaque, 1.0)
            }
        } else {
            let alpha = self.fade_alpha(radius, sq_dist);
            if alpha >= 1.0 {
                (PlayerClass::Opaque, 1.0)
            } else if alpha > 0.0 {
                (PlayerClass::Alpha, alpha)
            } else {
                (PlayerClass::FadedOut, 0.0)
            }
        };

        Classification {
            flags: classify_cameras(input, view, player),
            draw_alpha,
            is_icon: false,
        }
    }
}

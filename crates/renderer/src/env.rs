//! Per-frame render environment and the world services the drawers query.

use glam::{Vec2, Vec3};
use hecs::{Entity, World};

use crate::camera::{Camera, CameraSet, CameraType};
use crate::device::ProgramId;

/// Which water sub-pass is being drawn, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DrawMode {
    #[default]
    Normal,
    Reflection,
    Refraction,
}

impl DrawMode {
    pub fn from_flags(draw_reflection: bool, draw_refraction: bool) -> Self {
        if draw_reflection {
            DrawMode::Reflection
        } else if draw_refraction {
            DrawMode::Refraction
        } else {
            DrawMode::Normal
        }
    }
}

/// Terrain height lookup.
pub trait GroundHeight {
    fn height_at(&self, xz: Vec2) -> f32;
}

/// Level terrain.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatGround(pub f32);

impl GroundHeight for FlatGround {
    fn height_at(&self, _xz: Vec2) -> f32 {
        self.0
    }
}

/// Line-of-sight lookup by world position.
pub trait LosMap {
    fn in_los(&self, pos: Vec3, ally_team: usize) -> bool;
}

/// Sight as a set of circles on the ground plane.
#[derive(Debug, Clone, Default)]
pub struct SightCircles {
    circles: Vec<(usize, Vec2, f32)>,
}

impl SightCircles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, ally_team: usize, center: Vec3, radius: f32) {
        self.circles.push((ally_team, Vec2::new(center.x, center.z), radius));
    }

    pub fn clear(&mut self) {
        self.circles.clear();
    }
}

impl LosMap for SightCircles {
    fn in_los(&self, pos: Vec3, ally_team: usize) -> bool {
        let p = Vec2::new(pos.x, pos.z);
        self.circles
            .iter()
            .any(|&(a, c, r)| a == ally_team && c.distance_squared(p) <= r * r)
    }
}

/// Everything about the current frame that is not per-object state.
#[derive(Debug, Clone)]
pub struct RenderEnv {
    pub cameras: CameraSet,
    pub draw_mode: DrawMode,
    pub in_shadow_pass: bool,
    /// Shadow maps exist, so the shadowed program variants are used.
    pub shadows_loaded: bool,
    /// Shadow-casting lights are active; enables shadow classification.
    pub shadow_gen_models: bool,
    /// Reflective water is drawn this frame; enables reflection classification.
    pub water_reflection: bool,
    pub my_ally_team: usize,
    pub spectating_full_view: bool,
    pub draw_frame: u64,
    pub sim_frame: u64,
    pub wire_frame: bool,
    /// Program used to render model depth into the shadow map.
    pub shadow_program: Option<ProgramId>,
    /// Length-per-pixel scale of the player camera.
    pub lpp_scale: f32,
    /// Object the local player is driving in first person; never drawn from inside.
    pub fps_controllee: Option<Entity>,
}

impl Default for RenderEnv {
    fn default() -> Self {
        Self {
            cameras: CameraSet::default(),
            draw_mode: DrawMode::Normal,
            in_shadow_pass: false,
            shadows_loaded: false,
            shadow_gen_models: false,
            water_reflection: false,
            my_ally_team: 0,
            spectating_full_view: false,
            draw_frame: 0,
            sim_frame: 0,
            wire_frame: false,
            shadow_program: None,
            lpp_scale: 1.0,
            fps_controllee: None,
        }
    }
}

impl RenderEnv {
    pub fn new(cameras: CameraSet) -> Self {
        Self {
            cameras,
            ..Default::default()
        }
    }

    /// Copy of this environment configured for one pass.
    pub fn for_pass(&self, draw_mode: DrawMode, in_shadow_pass: bool) -> Self {
        Self {
            draw_mode,
            in_shadow_pass,
            ..self.clone()
        }
    }

    pub fn active_camera_type(&self) -> CameraType {
        if self.in_shadow_pass {
            CameraType::Shadow
        } else if self.draw_mode == DrawMode::Reflection {
            CameraType::UwRefl
        } else {
            CameraType::Player
        }
    }

    pub fn active_camera(&self) -> &Camera {
        self.cameras.get(self.active_camera_type())
    }

    /// Whether classification runs for this camera this frame.
    pub fn camera_active(&self, cam_type: CameraType) -> bool {
        match cam_type {
            CameraType::Player => true,
            CameraType::UwRefl => self.water_reflection,
            CameraType::Shadow => self.shadow_gen_models,
        }
    }
}

/// Read-only inputs of the per-frame object update. Shared across worker threads.
#[derive(Clone, Copy)]
pub struct FrameView<'a> {
    pub world: &'a World,
    pub env: &'a RenderEnv,
    pub ground: &'a (dyn GroundHeight + Sync),
    pub los: &'a (dyn LosMap + Sync),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_camera_follows_pass() {
        let env = RenderEnv::default();
        assert_eq!(env.active_camera_type(), CameraType::Player);
        assert_eq!(env.for_pass(DrawMode::Reflection, false).active_camera_type(), CameraType::UwRefl);
        assert_eq!(env.for_pass(DrawMode::Normal, true).active_camera_type(), CameraType::Shadow);
    }

    #[test]
    fn sight_circles_are_per_ally() {
        let mut los = SightCircles::new();
        los.add(1, Vec3::new(100.0, 0.0, 100.0), 50.0);
        assert!(los.in_los(Vec3::new(120.0, 30.0, 110.0), 1));
        assert!(!los.in_los(Vec3::new(120.0, 30.0, 110.0), 0));
        assert!(!los.in_los(Vec3::new(200.0, 0.0, 100.0), 1));
    }

    #[test]
    fn draw_mode_prefers_reflection() {
        assert_eq!(DrawMode::from_flags(true, true), DrawMode::Reflection);
        assert_eq!(DrawMode::from_flags(false, true), DrawMode::Refraction);
        assert_eq!(DrawMode::from_flags(false, false), DrawMode::Normal);
    }
}

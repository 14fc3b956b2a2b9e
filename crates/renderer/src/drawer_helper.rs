//! Per-model-format texture binding and render state.

use engine_core::{ModelType, TeamTable};
use glam::{Mat4, Vec2, Vec3, Vec4};

use crate::device::{Capability, DeviceCommand, GraphicsDevice};
use crate::env::GroundHeight;

/// How one model format binds its textures and adjusts render state.
///
/// Implementations are stateless; one static instance exists per format.
pub trait ModelDrawerHelper: Send + Sync {
    fn model_type(&self) -> ModelType;

    fn push_render_state(&self, dev: &mut dyn GraphicsDevice);
    fn pop_render_state(&self, dev: &mut dyn GraphicsDevice);

    fn bind_opaque_tex(&self, dev: &mut dyn GraphicsDevice, texture_type: u32);
    fn unbind_opaque_tex(&self, dev: &mut dyn GraphicsDevice);

    fn bind_shadow_tex(&self, dev: &mut dyn GraphicsDevice, texture_type: u32);
    fn unbind_shadow_tex(&self, dev: &mut dyn GraphicsDevice);

    fn enable_textures(&self, dev: &mut dyn GraphicsDevice) {
        enable_textures_common(dev);
    }

    fn disable_textures(&self, dev: &mut dyn GraphicsDevice) {
        disable_textures_common(dev);
    }
}

/// 3DO models sample one shared atlas and are not guaranteed to be closed solids.
#[derive(Debug, Default)]
pub struct ThreeDoHelper;

#[derive(Debug, Default)]
pub struct S3oHelper;

#[derive(Debug, Default)]
pub struct AssHelper;

/// Texture slot of the shared 3DO atlas.
const ATLAS_TEXTURE: u32 = 0;

impl ModelDrawerHelper for ThreeDoHelper {
    fn model_type(&self) -> ModelType {
        ModelType::ThreeDo
    }

    fn push_render_state(&self, dev: &mut dyn GraphicsDevice) {
        dev.submit(DeviceCommand::PushModelRenderState(ModelType::ThreeDo));
        dev.submit(DeviceCommand::Disable(Capability::CullFace));
    }

    fn pop_render_state(&self, dev: &mut dyn GraphicsDevice) {
        dev.submit(DeviceCommand::PopModelRenderState(ModelType::ThreeDo));
    }

    fn bind_opaque_tex(&self, dev: &mut dyn GraphicsDevice, _texture_type: u32) {
        dev.submit(DeviceCommand::BindModelTexture {
            model_type: ModelType::ThreeDo,
            texture_type: ATLAS_TEXTURE,
        });
    }

    fn unbind_opaque_tex(&self, dev: &mut dyn GraphicsDevice) {
        dev.submit(DeviceCommand::UnbindModelTexture {
            model_type: ModelType::ThreeDo,
        });
    }

    fn bind_shadow_tex(&self, dev: &mut dyn GraphicsDevice, _texture_type: u32) {
        dev.submit(DeviceCommand::BindTexture {
            unit: 0,
            texture: ATLAS_TEXTURE,
        });
    }

    fn unbind_shadow_tex(&self, dev: &mut dyn GraphicsDevice) {
        dev.submit(DeviceCommand::UnbindModelTexture {
            model_type: ModelType::ThreeDo,
        });
    }
}

impl ModelDrawerHelper for S3oHelper {
    fn model_type(&self) -> ModelType {
        ModelType::S3o
    }

    fn push_render_state(&self, dev: &mut dyn GraphicsDevice) {
        dev.submit(DeviceCommand::PushModelRenderState(ModelType::S3o));
    }

    fn pop_render_state(&self, dev: &mut dyn GraphicsDevice) {
        dev.submit(DeviceCommand::PopModelRenderState(ModelType::S3o));
    }

    fn bind_opaque_tex(&self, dev: &mut dyn GraphicsDevice, texture_type: u32) {
        dev.submit(DeviceCommand::BindModelTexture {
            model_type: ModelType::S3o,
            texture_type,
        });
    }

    fn unbind_opaque_tex(&self, dev: &mut dyn GraphicsDevice) {
        dev.submit(DeviceCommand::UnbindModelTexture {
            model_type: ModelType::S3o,
        });
    }

    fn bind_shadow_tex(&self, dev: &mut dyn GraphicsDevice, texture_type: u32) {
        // Only the second texture carries the alpha mask shadows test against.
        dev.submit(DeviceCommand::BindTexture {
            unit: 0,
            texture: texture_type,
        });
    }

    fn unbind_shadow_tex(&self, dev: &mut dyn GraphicsDevice) {
        dev.submit(DeviceCommand::UnbindModelTexture {
            model_type: ModelType::S3o,
        });
    }
}

impl ModelDrawerHelper for AssHelper {
    fn model_type(&self) -> ModelType {
        ModelType::Ass
    }

    fn push_render_state(&self, dev: &mut dyn GraphicsDevice) {
        dev.submit(DeviceCommand::PushModelRenderState(ModelType::Ass));
    }

    fn pop_render_state(&self, dev: &mut dyn GraphicsDevice) {
        dev.submit(DeviceCommand::PopModelRenderState(ModelType::Ass));
    }

    fn bind_opaque_tex(&self, dev: &mut dyn GraphicsDevice, texture_type: u32) {
        dev.submit(DeviceCommand::BindModelTexture {
            model_type: ModelType::Ass,
            texture_type,
        });
    }

    fn unbind_opaque_tex(&self, dev: &mut dyn GraphicsDevice) {
        dev.submit(DeviceCommand::UnbindModelTexture {
            model_type: ModelType::Ass,
        });
    }

    fn bind_shadow_tex(&self, dev: &mut dyn GraphicsDevice, texture_type: u32) {
        dev.submit(DeviceCommand::BindTexture {
            unit: 0,
            texture: texture_type,
        });
    }

    fn unbind_shadow_tex(&self, dev: &mut dyn GraphicsDevice) {
        dev.submit(DeviceCommand::UnbindModelTexture {
            model_type: ModelType::Ass,
        });
    }
}

static THREE_DO_HELPER: ThreeDoHelper = ThreeDoHelper;
static S3O_HELPER: S3oHelper = S3oHelper;
static ASS_HELPER: AssHelper = AssHelper;

pub fn helper_for(model_type: ModelType) -> &'static dyn ModelDrawerHelper {
    match model_type {
        ModelType::ThreeDo => &THREE_DO_HELPER,
        ModelType::S3o => &S3O_HELPER,
        ModelType::Ass => &ASS_HELPER,
    }
}

pub fn enable_textures_common(dev: &mut dyn GraphicsDevice) {
    dev.submit(DeviceCommand::Enable(Capability::Texture2D));
}

pub fn disable_textures_common(dev: &mut dyn GraphicsDevice) {
    dev.submit(DeviceCommand::Disable(Capability::Texture2D));
}

pub fn push_transform(dev: &mut dyn GraphicsDevice, m: Mat4) {
    dev.submit(DeviceCommand::PushTransform(m));
}

pub fn pop_transform(dev: &mut dyn GraphicsDevice) {
    dev.submit(DeviceCommand::PopTransform);
}

/// Team colour with the given alpha, `None` for unknown teams.
pub fn team_color(teams: &TeamTable, team: usize, alpha: f32) -> Option<Vec4> {
    teams.color(team).map(|c| c.truncate().extend(alpha))
}

/// Cheap reflection visibility: whether the point where the line from the
/// camera to the object crosses the water plane lies above the ground.
pub fn object_visible_reflection(obj_pos: Vec3, cam_pos: Vec3, radius: f32, ground: &dyn GroundHeight) -> bool {
    if obj_pos.y < 0.0 {
        return ground.height_at(Vec2::new(obj_pos.x, obj_pos.z)) <= radius;
    }

    let dif = obj_pos.y - cam_pos.y;
    if dif.abs() < f32::EPSILON {
        return ground.height_at(Vec2::new(obj_pos.x, obj_pos.z)) <= radius;
    }
    let zero_pos = cam_pos * (obj_pos.y / dif) + obj_pos * (-cam_pos.y / dif);
    ground.height_at(Vec2::new(zero_pos.x, zero_pos.z)) <= radius
}

/// Wireframe and flat colour multipliers of the build effect, pulsing with the sim frame.
pub fn nano_color_multipliers(sim_frame: u64) -> (f32, f32) {
    let pulse = (128 - ((sim_frame * 4) & 255) as i32).abs() as f32 / 255.0;
    let wire = pulse + 0.5;
    (wire, 1.5 - wire)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::RecordingDevice;
    use crate::env::FlatGround;

    #[test]
    fn helpers_match_their_format() {
        for mt in ModelType::ALL {
            assert_eq!(helper_for(mt).model_type(), mt);
        }
    }

    #[test]
    fn three_do_disables_culling_and_uses_atlas() {
        let mut dev = RecordingDevice::new();
        let h = helper_for(ModelType::ThreeDo);
        h.push_render_state(&mut dev);
        h.bind_opaque_tex(&mut dev, 9);
        assert!(dev.contains(&DeviceCommand::Disable(Capability::CullFace)));
        assert!(dev.contains(&DeviceCommand::BindModelTexture {
            model_type: ModelType::ThreeDo,
            texture_type: ATLAS_TEXTURE,
        }));
    }

    #[test]
    fn s3o_binds_per_texture_type() {
        let mut dev = RecordingDevice::new();
        helper_for(ModelType::S3o).bind_opaque_tex(&mut dev, 4);
        assert_eq!(
            dev.commands,
            vec![DeviceCommand::BindModelTexture {
                model_type: ModelType::S3o,
                texture_type: 4
            }]
        );
    }

    #[test]
    fn team_color_rejects_unknown_team() {
        let mut teams = TeamTable::new();
        teams.add_team([255, 255, 255, 255], 0);
        assert_eq!(team_color(&teams, 0, 0.5), Some(Vec4::new(1.0, 1.0, 1.0, 0.5)));
        assert_eq!(team_color(&teams, 1, 0.5), None);
    }

    #[test]
    fn reflection_visible_over_water_but_not_behind_hills() {
        let cam = Vec3::new(0.0, 500.0, 0.0);
        let obj = Vec3::new(0.0, 20.0, -400.0);
        assert!(object_visible_reflection(obj, cam, 10.0, &FlatGround(-50.0)));
        assert!(!object_visible_reflection(obj, cam, 10.0, &FlatGround(80.0)));
    }

    #[test]
    fn submerged_object_uses_own_position() {
        let obj = Vec3::new(0.0, -5.0, 0.0);
        assert!(object_visible_reflection(obj, Vec3::new(0.0, 100.0, 0.0), 10.0, &FlatGround(5.0)));
    }

    #[test]
    fn nano_multipliers_sum_to_one_and_a_half() {
        for frame in [0, 17, 32, 64, 200] {
            let (wire, flat) = nano_color_multipliers(frame);
            assert!((wire + flat - 1.5).abs() < 1e-6);
            assert!((0.5..=1.01).contains(&wire));
        }
    }
}

//! Shared fixture for drawer tests: a small world seen from a fixed camera.

use std::sync::Arc;

use engine_core::{Health, LocalModel, LosStatus, Model, ModelType, SolidObject, TeamTable, Transform};
use glam::Vec3;
use hecs::{Entity, World};

use crate::camera::{Camera, CameraSet};
use crate::config::DrawerConfig;
use crate::device::RecordingDevice;
use crate::env::{FlatGround, FrameView, RenderEnv, SightCircles};
use crate::far_texture::FarTextureHandler;
use crate::lua_object_drawer::{LuaObjType, LuaObjectDrawer};
use crate::model_drawer::{DrawContext, DrawEvents};

/// Records script callbacks; claims per-object draws when `claim` is set.
#[derive(Debug, Default)]
pub struct RecordingEvents {
    pub claim: bool,
    pub object_draws: Vec<Entity>,
    pub post_deferred: usize,
}

impl DrawEvents for RecordingEvents {
    fn draw_object(&mut self, _obj_type: LuaObjType, entity: Entity) -> bool {
        self.object_draws.push(entity);
        self.claim
    }

    fn post_deferred(&mut self, _obj_type: LuaObjType) {
        self.post_deferred += 1;
    }
}

pub struct Scene {
    pub world: World,
    pub teams: TeamTable,
    pub env: RenderEnv,
    pub ground: FlatGround,
    pub los: SightCircles,
    pub device: RecordingDevice,
    pub lua: LuaObjectDrawer,
    pub far_textures: FarTextureHandler,
    pub events: RecordingEvents,
}

impl Scene {
    /// Teams 0 and 2 are allied (ally team 0), team 1 is the enemy. The
    /// player camera sits at (0, 200, 400) looking down the -Z axis.
    pub fn new() -> Self {
        let mut teams = TeamTable::new();
        teams.add_team([255, 0, 0, 255], 0);
        teams.add_team([0, 0, 255, 255], 1);
        teams.add_team([0, 255, 0, 255], 0);

        let camera = Camera::looking_at(Vec3::new(0.0, 200.0, 400.0), Vec3::new(0.0, 0.0, -400.0));
        Self {
            world: World::new(),
            teams,
            env: RenderEnv::new(CameraSet::from_player(camera)),
            ground: FlatGround(-50.0),
            los: SightCircles::new(),
            device: RecordingDevice::new(),
            lua: LuaObjectDrawer::new(&DrawerConfig::default()),
            far_textures: FarTextureHandler::new(),
            events: RecordingEvents::default(),
        }
    }

    pub fn model(model_type: ModelType, texture_type: u32) -> Arc<Model> {
        Arc::new(Model::new(format!("{}-{texture_type}", model_type.name()), model_type, texture_type, 20.0, 30.0))
    }

    fn spawn_solid(&mut self, position: Vec3, solid: SolidObject) -> Entity {
        let local = LocalModel::from_model(&solid.model);
        self.world.spawn((
            Transform::from_position(position),
            solid,
            LosStatus::visible_to_all(2),
            local,
            Health::new(100.0),
        ))
    }

    /// Fully visible mobile unit.
    pub fn spawn_unit(&mut self, position: Vec3, model_type: ModelType, texture_type: u32, team: usize) -> Entity {
        let solid = SolidObject::new(Self::model(model_type, texture_type), team);
        let e = self.spawn_solid(position, solid);
        self.world.insert_one(e, engine_core::Unit).ok();
        e
    }

    pub fn spawn_building(&mut self, position: Vec3, model_type: ModelType, texture_type: u32, team: usize) -> Entity {
        let mut solid = SolidObject::new(Self::model(model_type, texture_type), team);
        solid.is_building = true;
        let e = self.spawn_solid(position, solid);
        self.world.insert_one(e, engine_core::Unit).ok();
        e
    }

    pub fn spawn_feature(&mut self, position: Vec3, model_type: ModelType, texture_type: u32, alpha_fade: bool) -> Entity {
        let mut solid = SolidObject::new(Self::model(model_type, texture_type), 0);
        solid.alpha_fade = alpha_fade;
        let e = self.spawn_solid(position, solid);
        self.world.insert_one(e, engine_core::Feature).ok();
        e
    }

    pub fn view(&self) -> FrameView<'_> {
        FrameView {
            world: &self.world,
            env: &self.env,
            ground: &self.ground,
            los: &self.los,
        }
    }

    pub fn ctx(&mut self) -> DrawContext<'_> {
        DrawContext {
            device: &mut self.device,
            teams: &self.teams,
            lua: &mut self.lua,
            far_textures: &mut self.far_textures,
            events: &mut self.events,
        }
    }
}

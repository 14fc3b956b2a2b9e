//! Per-frame bookkeeping of every drawable object of one kind.
//!
//! Each frame every object is classified against the active cameras, moved
//! between the opaque and alpha bins when its translucency changes, and has
//! its matrices refreshed if any pass is going to sample them. The
//! classification step reads the world only and runs on the rayon pool above
//! a configurable object count; the commit into the bins and arenas is serial.

use std::collections::HashMap;

use bitflags::bitflags;
use engine_core::{Health, LocalModel, LosBits, LosStatus, ModelType, SolidObject, Transform};
use glam::{Mat4, Vec3};
use hecs::{Entity, World};
use rayon::prelude::*;

use crate::camera::CameraType;
use crate::config::DrawerConfig;
use crate::container::ModelRenderContainer;
use crate::drawer_helper::object_visible_reflection;
use crate::env::{FrameView, RenderEnv};
use crate::error::{RenderError, Result};
use crate::lua_object_drawer::LuaObjType;
use crate::mem_storage::{MatricesMemAlloc, ModelsMemStorage};
use crate::model_drawer::{DrawContext, ModelDrawer};

bitflags! {
    /// Passes an object takes part in this frame. Empty means not drawn.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DrawFlags: u8 {
        const OPAQUE = 1 << 0;
        const ALPHA = 1 << 1;
        const REFLECTION = 1 << 2;
        const REFRACTION = 1 << 3;
        const SHADOW = 1 << 4;
        const FARTEX = 1 << 5;
        const ICON = 1 << 6;
    }
}

impl DrawFlags {
    /// At most one of these is ever set.
    pub const EXCLUSIVE: DrawFlags = DrawFlags::OPAQUE
        .union(DrawFlags::ALPHA)
        .union(DrawFlags::FARTEX)
        .union(DrawFlags::ICON);

    /// Flags under which the object's matrices are sampled.
    pub const MODEL_DRAWN: DrawFlags = DrawFlags::OPAQUE
        .union(DrawFlags::ALPHA)
        .union(DrawFlags::REFLECTION)
        .union(DrawFlags::REFRACTION)
        .union(DrawFlags::SHADOW);
}

bitflags! {
    /// Engine passes allowed to draw an object. Scripts clear bits for objects
    /// they render themselves.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EngineDrawMask: u8 {
        const FORWARD_OPAQUE = 1 << 0;
        const DEFERRED_OPAQUE = 1 << 1;
        const ALPHA = 1 << 2;
        const SHADOW = 1 << 3;
    }
}

impl Default for EngineDrawMask {
    fn default() -> Self {
        Self::all()
    }
}

/// World state of one object as seen by the classifier.
pub struct ClassifyInput<'a> {
    pub transform: &'a Transform,
    pub solid: &'a SolidObject,
    pub los: Option<&'a LosStatus>,
}

impl ClassifyInput<'_> {
    /// Sensor bits for the local ally team. Objects without sensor state are always seen.
    pub fn los_bits(&self, env: &RenderEnv) -> LosBits {
        self.los
            .map(|l| l.get(env.my_ally_team))
            .unwrap_or(LosBits::INLOS | LosBits::INRADAR | LosBits::PREVLOS)
    }

    pub fn in_los(&self, env: &RenderEnv) -> bool {
        env.spectating_full_view || self.los_bits(env).contains(LosBits::INLOS)
    }

    pub fn in_radar(&self, env: &RenderEnv) -> bool {
        env.spectating_full_view || self.los_bits(env).contains(LosBits::INRADAR)
    }
}

/// Result of classifying one object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub flags: DrawFlags,
    pub draw_alpha: f32,
    pub is_icon: bool,
}

impl Classification {
    pub const NONE: Classification = Classification {
        flags: DrawFlags::empty(),
        draw_alpha: 1.0,
        is_icon: false,
    };

    pub const ICON: Classification = Classification {
        flags: DrawFlags::ICON,
        draw_alpha: 1.0,
        is_icon: true,
    };
}

/// What the player camera makes of an object, decided by distance and translucency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerClass {
    FarTex,
    Opaque,
    Alpha,
    /// Faded out completely; neither drawn nor casting shadows.
    FadedOut,
}

/// Per-camera classification shared by all object kinds. The player camera
/// runs first; reflection and shadow decisions read the flags it set.
pub fn classify_cameras(input: &ClassifyInput<'_>, view: &FrameView<'_>, player: PlayerClass) -> DrawFlags {
    let env = view.env;
    let pos = input.transform.position;
    let radius = input.solid.radius;
    let in_los = input.in_los(env);
    let faded_out = player == PlayerClass::FadedOut;
    let mut flags = DrawFlags::empty();
    if input.solid.no_draw || input.solid.in_void {
        return flags;
    }

    for cam_type in CameraType::ALL {
        if !env.camera_active(cam_type) {
            continue;
        }
        let camera = env.cameras.get(cam_type);
        if !camera.in_view(pos, radius) {
            continue;
        }

        match cam_type {
            CameraType::Player => {
                if !in_los {
                    continue;
                }
                match player {
                    PlayerClass::FarTex => flags |= DrawFlags::FARTEX,
                    PlayerClass::Opaque | PlayerClass::Alpha => {
                        flags |= if player == PlayerClass::Alpha {
                            DrawFlags::ALPHA
                        } else {
                            DrawFlags::OPAQUE
                        };
                        if input.solid.in_water {
                            flags |= DrawFlags::REFRACTION;
                        }
                    }
                    PlayerClass::FadedOut => {}
                }
            }
            // The secondary cameras only see what the player camera set this
            // frame: an object outside the player's view still reflects and
            // casts shadows.
            CameraType::UwRefl => {
                if faded_out || flags.contains(DrawFlags::FARTEX) {
                    continue;
                }
                if object_visible_reflection(pos, camera.position(), radius, view.ground) {
                    flags |= DrawFlags::REFLECTION;
                }
            }
            CameraType::Shadow => {
                if faded_out || flags.intersects(DrawFlags::FARTEX | DrawFlags::ALPHA) {
                    continue;
                }
                flags |= DrawFlags::SHADOW;
            }
        }
    }
    flags
}

/// Squared distance beyond which an object is drawn as a far-texture impostor.
pub fn far_tex_distance_sq(radius: f32, model_draw_distance: f32) -> f32 {
    let d = radius + model_draw_distance;
    d * d
}

/// Behaviour that differs between units and features.
pub trait ObjectKind: Send + Sync + Sized + 'static {
    const NAME: &'static str;
    const LUA_TYPE: LuaObjType;

    /// Classify one object against the frame's cameras.
    fn classify(&self, input: &ClassifyInput<'_>, view: &FrameView<'_>) -> Classification;

    /// Runs before the per-object update each frame.
    fn update_pre(&mut self, _view: &FrameView<'_>) {}

    /// The object is about to be removed from the drawer.
    fn object_destroyed(&mut self, _world: &World, _entity: Entity, _obj: &DrawObject) {}

    /// Draws non-binned objects of one model type in the opaque pass.
    fn draw_opaque_aux(_drawer: &ModelDrawer<Self>, _ctx: &mut DrawContext<'_>, _env: &RenderEnv, _model_type: ModelType) -> usize {
        0
    }

    /// Draws non-binned objects of one model type in the alpha pass, after the binned ones.
    fn draw_alpha_aux(_drawer: &ModelDrawer<Self>, _ctx: &mut DrawContext<'_>, _env: &RenderEnv, _model_type: ModelType) -> usize {
        0
    }

    fn draw_shadow_aux(_drawer: &ModelDrawer<Self>, _ctx: &mut DrawContext<'_>, _env: &RenderEnv, _model_type: ModelType) -> usize {
        0
    }
}

/// Render state the drawer keeps for one object.
#[derive(Debug)]
pub struct DrawObject {
    pub entity: Entity,
    pub model_type: ModelType,
    pub texture_type: u32,
    pub model_height: f32,
    pub radius: f32,
    pub team: usize,
    pub draw_flag: DrawFlags,
    pub draw_alpha: f32,
    pub is_icon: bool,
    pub engine_draw_mask: EngineDrawMask,
    pub position: Vec3,
    pub world_matrix: Mat4,
    pub build_progress: f32,
    pub build_facing: u8,
    pub is_building: bool,
    /// Sensor bits for the local ally team.
    pub los_bits: LosBits,
    health_fraction: f32,
    matrices: MatricesMemAlloc,
    uniform_index: usize,
    in_alpha_bin: bool,
    scratch: Vec<Mat4>,
    scratch_ready: bool,
}

impl DrawObject {
    pub fn matrices(&self) -> &MatricesMemAlloc {
        &self.matrices
    }

    pub fn uniform_index(&self) -> usize {
        self.uniform_index
    }

    pub fn in_alpha_bin(&self) -> bool {
        self.in_alpha_bin
    }

    pub fn being_built(&self) -> bool {
        self.build_progress < 1.0
    }

    /// Classify and compute matrices. Reads the world only.
    fn refresh<K: ObjectKind>(&mut self, kind: &K, view: &FrameView<'_>) {
        self.scratch_ready = false;

        type Q<'q> = (
            &'q Transform,
            &'q SolidObject,
            Option<&'q LosStatus>,
            Option<&'q LocalModel>,
            Option<&'q Health>,
        );
        let Ok(mut query) = view.world.query_one::<Q<'_>>(self.entity) else {
            self.clear_classification();
            return;
        };
        let Some((transform, solid, los, local, health)) = query.get() else {
            self.clear_classification();
            return;
        };

        let input = ClassifyInput { transform, solid, los };
        let c = kind.classify(&input, view);
        self.draw_flag = c.flags;
        self.draw_alpha = c.draw_alpha;
        self.is_icon = c.is_icon;

        self.team = solid.team;
        self.radius = solid.radius;
        self.position = transform.position;
        self.world_matrix = transform.to_matrix();
        self.build_progress = solid.build_progress;
        self.build_facing = solid.build_facing;
        self.is_building = solid.is_building;
        self.los_bits = input.los_bits(view.env);
        self.health_fraction = health.map_or(1.0, Health::percentage);

        if !c.flags.intersects(DrawFlags::MODEL_DRAWN) {
            return;
        }
        self.scratch.clear();
        self.scratch.push(self.world_matrix);
        if let Some(local) = local {
            local.model_space_matrices(&mut self.scratch);
        }
        self.scratch_ready = true;
    }

    fn clear_classification(&mut self) {
        self.draw_flag = DrawFlags::empty();
        self.is_icon = false;
    }
}

/// Counters of one update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateStats {
    pub objects: usize,
    pub icons: usize,
    pub far_textures: usize,
    /// Objects whose matrices were written this frame.
    pub refreshed: usize,
    pub parallel: bool,
}

pub struct ModelDrawerData<K: ObjectKind> {
    pub kind: K,
    objects: Vec<DrawObject>,
    index: HashMap<Entity, usize>,
    opaque_bins: [ModelRenderContainer; ModelType::COUNT],
    alpha_bins: [ModelRenderContainer; ModelType::COUNT],
    storage: ModelsMemStorage,
    mt_threshold: usize,
}

impl<K: ObjectKind> ModelDrawerData<K> {
    pub fn new(kind: K, config: &DrawerConfig) -> Self {
        Self {
            kind,
            objects: Vec::new(),
            index: HashMap::new(),
            opaque_bins: Default::default(),
            alpha_bins: Default::default(),
            storage: ModelsMemStorage::new(),
            mt_threshold: config.mt_object_threshold,
        }
    }

    /// Start tracking an object. Cloaked objects start in the alpha bins.
    pub fn add_object(&mut self, world: &World, entity: Entity) -> Result<()> {
        if self.index.contains_key(&entity) {
            log::warn!("[{}Drawer] {entity:?} added twice", K::NAME);
            return Ok(());
        }
        let solid = world
            .get::<&SolidObject>(entity)
            .map_err(|_| RenderError::UnknownObject(entity))?;
        let pieces = world
            .get::<&LocalModel>(entity)
            .map(|l| l.piece_count())
            .unwrap_or_else(|_| solid.model.piece_count());

        let model_type = solid.model.model_type;
        let texture_type = solid.model.texture_type;
        let in_alpha_bin = solid.cloaked;
        let matrices = self.storage.allocate_matrices(1 + pieces);
        let uniform_index = self.storage.allocate_uniforms();

        let bins = if in_alpha_bin { &mut self.alpha_bins } else { &mut self.opaque_bins };
        bins[model_type.index()].add_object(entity, texture_type);

        self.index.insert(entity, self.objects.len());
        self.objects.push(DrawObject {
            entity,
            model_type,
            texture_type,
            model_height: solid.model.height,
            radius: solid.radius,
            team: solid.team,
            draw_flag: DrawFlags::empty(),
            draw_alpha: 1.0,
            is_icon: false,
            engine_draw_mask: EngineDrawMask::default(),
            position: Vec3::ZERO,
            world_matrix: Mat4::IDENTITY,
            build_progress: solid.build_progress,
            build_facing: solid.build_facing,
            is_building: solid.is_building,
            los_bits: LosBits::empty(),
            health_fraction: 1.0,
            matrices,
            uniform_index,
            in_alpha_bin,
            scratch: Vec::with_capacity(1 + pieces),
            scratch_ready: false,
        });
        log::trace!("[{}Drawer] added {entity:?} ({} pieces)", K::NAME, pieces);
        Ok(())
    }

    /// Stop tracking an object and release its storage. Absent objects are ignored.
    pub fn del_object(&mut self, entity: Entity) -> bool {
        let Some(idx) = self.index.remove(&entity) else {
            return false;
        };
        let obj = self.objects.swap_remove(idx);
        if let Some(moved) = self.objects.get(idx) {
            self.index.insert(moved.entity, idx);
        }

        let mt = obj.model_type.index();
        self.opaque_bins[mt].del_object(entity);
        self.alpha_bins[mt].del_object(entity);
        self.storage.free_uniforms(obj.uniform_index);
        self.storage.free_matrices(obj.matrices);
        true
    }

    /// Notify the kind and stop tracking. The entity must still be alive in `world`.
    pub fn destroy_object(&mut self, world: &World, entity: Entity) -> bool {
        if let Some(&idx) = self.index.get(&entity) {
            self.kind.object_destroyed(world, entity, &self.objects[idx]);
        }
        self.del_object(entity)
    }

    /// Move an object between the opaque and alpha bins, e.g. on cloak toggle.
    pub fn set_object_alpha(&mut self, entity: Entity, alpha: bool) -> bool {
        let Some(&idx) = self.index.get(&entity) else {
            return false;
        };
        move_between_bins(&mut self.opaque_bins, &mut self.alpha_bins, &mut self.objects[idx], alpha);
        true
    }

    pub fn set_engine_draw_mask(&mut self, entity: Entity, mask: EngineDrawMask) -> bool {
        match self.get_mut(entity) {
            Some(obj) => {
                obj.engine_draw_mask = mask;
                true
            }
            None => false,
        }
    }

    /// Classify every object and refresh the matrices of the ones that will be drawn.
    pub fn update(&mut self, view: &FrameView<'_>, mt: bool) -> UpdateStats {
        self.kind.update_pre(view);

        let parallel = mt && self.objects.len() >= self.mt_threshold;
        let kind = &self.kind;
        if parallel {
            self.objects.par_iter_mut().for_each(|obj| obj.refresh(kind, view));
        } else {
            self.objects.iter_mut().for_each(|obj| obj.refresh(kind, view));
        }

        let frame = view.env.draw_frame;
        let mut stats = UpdateStats {
            objects: self.objects.len(),
            parallel,
            ..Default::default()
        };
        let Self {
            objects,
            opaque_bins,
            alpha_bins,
            storage,
            ..
        } = self;

        for obj in objects.iter_mut() {
            if obj.draw_flag.contains(DrawFlags::ALPHA) {
                move_between_bins(opaque_bins, alpha_bins, obj, true);
            } else if obj.draw_flag.contains(DrawFlags::OPAQUE) {
                move_between_bins(opaque_bins, alpha_bins, obj, false);
            }
            if obj.is_icon {
                stats.icons += 1;
            }
            if obj.draw_flag.contains(DrawFlags::FARTEX) {
                stats.far_textures += 1;
            }
            if !obj.scratch_ready {
                continue;
            }

            storage.write_matrices(&obj.matrices, &obj.scratch, frame);
            if let Some(u) = storage.uniforms_mut(obj.uniform_index, frame) {
                u.team = obj.team as u32;
                u.draw_flag = u32::from(obj.draw_flag.bits());
                u.build_progress = obj.build_progress;
                u.health_fraction = obj.health_fraction;
                u.draw_alpha = obj.draw_alpha;
                u.draw_frame = frame as u32;
            }
            stats.refreshed += 1;
        }
        stats
    }

    pub fn get(&self, entity: Entity) -> Option<&DrawObject> {
        self.index.get(&entity).map(|&i| &self.objects[i])
    }

    pub fn get_mut(&mut self, entity: Entity) -> Option<&mut DrawObject> {
        self.index.get(&entity).map(|&i| &mut self.objects[i])
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.index.contains_key(&entity)
    }

    pub fn objects(&self) -> &[DrawObject] {
        &self.objects
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn opaque_bin(&self, model_type: ModelType) -> &ModelRenderContainer {
        &self.opaque_bins[model_type.index()]
    }

    pub fn alpha_bin(&self, model_type: ModelType) -> &ModelRenderContainer {
        &self.alpha_bins[model_type.index()]
    }

    pub fn storage(&self) -> &ModelsMemStorage {
        &self.storage
    }

    /// Root transform as last committed to the arena.
    pub fn root_matrix(&self, obj: &DrawObject) -> Mat4 {
        self.storage
            .matrix(obj.matrices.first_elem())
            .copied()
            .unwrap_or(obj.world_matrix)
    }

    /// Forget every object, e.g. on shutdown.
    pub fn clear(&mut self) {
        let entities: Vec<Entity> = self.objects.iter().map(|o| o.entity).collect();
        for e in entities {
            self.del_object(e);
        }
    }
}

fn move_between_bins(
    opaque_bins: &mut [ModelRenderContainer; ModelType::COUNT],
    alpha_bins: &mut [ModelRenderContainer; ModelType::COUNT],
    obj: &mut DrawObject,
    alpha: bool,
) {
    if obj.in_alpha_bin == alpha {
        return;
    }
    let mt = obj.model_type.index();
    let (from, to) = if alpha {
        (&mut opaque_bins[mt], &mut alpha_bins[mt])
    } else {
        (&mut alpha_bins[mt], &mut opaque_bins[mt])
    };
    from.del_object(obj.entity);
    to.add_object(obj.entity, obj.texture_type);
    obj.in_alpha_bin = alpha;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature_drawer::FeatureKind;
    use crate::test_support::Scene;
    use crate::unit_drawer::UnitKind;
    use glam::Vec3;

    fn unit_data(cfg: &DrawerConfig) -> ModelDrawerData<UnitKind> {
        ModelDrawerData::new(UnitKind::new(cfg), cfg)
    }

    #[test]
    fn exclusive_bits_cover_the_classification_set() {
        assert_eq!(DrawFlags::EXCLUSIVE.bits().count_ones(), 4);
        assert!(!DrawFlags::MODEL_DRAWN.intersects(DrawFlags::FARTEX | DrawFlags::ICON));
    }

    #[test]
    fn add_and_del_keep_index_consistent() {
        let mut scene = Scene::new();
        let cfg = DrawerConfig::default();
        let mut data = unit_data(&cfg);
        let a = scene.spawn_unit(Vec3::ZERO, ModelType::S3o, 1, 0);
        let b = scene.spawn_unit(Vec3::X * 10.0, ModelType::S3o, 1, 0);
        let c = scene.spawn_unit(Vec3::X * 20.0, ModelType::ThreeDo, 0, 1);
        for e in [a, b, c] {
            data.add_object(&scene.world, e).unwrap();
        }

        assert!(data.del_object(a));
        assert!(!data.del_object(a));
        assert_eq!(data.len(), 2);
        assert_eq!(data.get(c).map(|o| o.entity), Some(c));
        assert_eq!(data.get(b).map(|o| o.entity), Some(b));
        assert_eq!(data.opaque_bin(ModelType::S3o).num_objects(), 1);
    }

    #[test]
    fn unknown_entity_is_rejected() {
        let mut world = World::new();
        let e = world.spawn((1u32,));
        let cfg = DrawerConfig::default();
        let mut data = unit_data(&cfg);
        assert!(matches!(data.add_object(&world, e), Err(RenderError::UnknownObject(_))));
    }

    #[test]
    fn cloaked_objects_start_in_alpha_bin_and_move_back() {
        let mut scene = Scene::new();
        let cfg = DrawerConfig::default();
        let mut data = unit_data(&cfg);
        let e = scene.spawn_unit(Vec3::ZERO, ModelType::S3o, 2, 0);
        scene.world.get::<&mut SolidObject>(e).unwrap().cloaked = true;
        data.add_object(&scene.world, e).unwrap();
        assert!(data.alpha_bin(ModelType::S3o).contains(e));

        scene.world.get::<&mut SolidObject>(e).unwrap().cloaked = false;
        let stats = data.update(&scene.view(), false);
        assert_eq!(stats.refreshed, 1);
        assert!(data.opaque_bin(ModelType::S3o).contains(e));
        assert!(!data.alpha_bin(ModelType::S3o).contains(e));
    }

    #[test]
    fn matrices_written_only_for_drawn_objects() {
        let mut scene = Scene::new();
        scene.env.draw_frame = 7;
        let cfg = DrawerConfig::default();
        let mut data = unit_data(&cfg);
        let near = scene.spawn_unit(Vec3::new(0.0, 0.0, -100.0), ModelType::S3o, 1, 0);
        let far = scene.spawn_unit(Vec3::new(0.0, 0.0, -1500.0), ModelType::S3o, 1, 0);
        data.add_object(&scene.world, near).unwrap();
        data.add_object(&scene.world, far).unwrap();

        let stats = data.update(&scene.view(), false);
        assert_eq!(stats.refreshed, 1);
        assert_eq!(stats.far_textures, 1);

        let near_obj = data.get(near).unwrap();
        let root = data.root_matrix(near_obj);
        assert_eq!(root.transform_point3(Vec3::ZERO), Vec3::new(0.0, 0.0, -100.0));
        let far_first = data.get(far).unwrap().matrices().first_elem();
        assert_eq!(data.storage().matrix(far_first), Some(&Mat4::ZERO));
        assert!(data.storage().matrix_arena().is_dirty(near_obj.matrices().first_elem(), 7));
    }

    #[test]
    fn parallel_update_matches_serial() {
        let cfg = DrawerConfig {
            mt_object_threshold: 1,
            ..Default::default()
        };
        let mut scene = Scene::new();
        let mut serial = unit_data(&cfg);
        let mut parallel = unit_data(&cfg);
        for i in 0..64 {
            let pos = Vec3::new((i % 8) as f32 * 150.0 - 600.0, 0.0, -((i / 8) as f32) * 300.0);
            let e = scene.spawn_unit(pos, ModelType::S3o, (i % 3) as u32, i % 2);
            serial.add_object(&scene.world, e).unwrap();
            parallel.add_object(&scene.world, e).unwrap();
        }
        let s = serial.update(&scene.view(), false);
        let p = parallel.update(&scene.view(), true);
        assert!(!s.parallel);
        assert!(p.parallel);
        for obj in serial.objects() {
            assert_eq!(parallel.get(obj.entity).map(|o| o.draw_flag), Some(obj.draw_flag));
        }
    }

    #[test]
    fn despawned_entity_is_not_drawn() {
        let mut scene = Scene::new();
        let cfg = DrawerConfig::default();
        let mut data: ModelDrawerData<FeatureKind> = ModelDrawerData::new(FeatureKind::new(&cfg), &cfg);
        let e = scene.spawn_feature(Vec3::ZERO, ModelType::ThreeDo, 0, false);
        data.add_object(&scene.world, e).unwrap();
        scene.world.despawn(e).unwrap();
        data.update(&scene.view(), false);
        assert!(data.get(e).unwrap().draw_flag.is_empty());
    }

    #[test]
    fn engine_draw_mask_is_per_object() {
        let mut scene = Scene::new();
        let cfg = DrawerConfig::default();
        let mut data = unit_data(&cfg);
        let e = scene.spawn_unit(Vec3::ZERO, ModelType::Ass, 0, 0);
        data.add_object(&scene.world, e).unwrap();
        assert!(data.set_engine_draw_mask(e, EngineDrawMask::ALPHA));
        assert_eq!(data.get(e).unwrap().engine_draw_mask, EngineDrawMask::ALPHA);
        let other = scene.world.spawn(());
        assert!(!data.set_engine_draw_mask(other, EngineDrawMask::empty()));
    }
}

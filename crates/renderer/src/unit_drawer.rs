//! Unit classification, ghosted buildings and temporary draw units.

use std::sync::Arc;

use engine_core::{LosBits, LosStatus, Model, ModelType, SolidObject, Transform};
use glam::{Mat4, Quat, Vec3, Vec4};
use hecs::{Entity, World};

use crate::camera::CameraType;
use crate::config::DrawerConfig;
use crate::drawer_data::{classify_cameras, far_tex_distance_sq, Classification, ClassifyInput, DrawObject, ObjectKind, PlayerClass};
use crate::env::{FrameView, RenderEnv};
use crate::lua_object_drawer::LuaObjType;
use crate::model_drawer::{DrawContext, ModelDrawer, StaticDraw};

/// Last known state of a building that died out of sight.
///
/// One snapshot is shared by every ally team that still remembers it; it is
/// released when the last of them regains sight of the spot.
#[derive(Debug)]
pub struct GhostSolidObject {
    pub model: Arc<Model>,
    pub position: Vec3,
    pub facing: u8,
    pub team: usize,
}

impl GhostSolidObject {
    pub fn matrix(&self) -> Mat4 {
        Transform::from_build_facing(self.position, self.facing).to_matrix()
    }
}

/// A model drawn at a fixed spot until a sim frame passes, e.g. a build preview.
#[derive(Debug, Clone)]
pub struct TempDrawUnit {
    pub model: Arc<Model>,
    pub team: usize,
    pub position: Vec3,
    /// Heading around the up axis, in radians.
    pub rotation: f32,
    /// Last sim frame the unit is drawn in.
    pub timeout_frame: u64,
}

impl TempDrawUnit {
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(Quat::from_rotation_y(self.rotation), self.position)
    }
}

type PerModelType<T> = [Vec<T>; ModelType::COUNT];

pub struct UnitKind {
    icon_distance: f32,
    model_draw_distance: f32,
    alpha_values: Vec4,
    ghosted_buildings: bool,
    /// Per ally team.
    dead_ghosts: Vec<PerModelType<Arc<GhostSolidObject>>>,
    /// Buildings out of an ally team's sight but still alive, per ally team.
    live_ghosts: Vec<PerModelType<Entity>>,
    temp_opaque: Vec<TempDrawUnit>,
    temp_alpha: Vec<TempDrawUnit>,
}

impl UnitKind {
    pub fn new(config: &DrawerConfig) -> Self {
        Self {
            icon_distance: config.unit_icon_distance,
            model_draw_distance: config.model_draw_distance,
            alpha_values: config.alpha_values(),
            ghosted_buildings: config.ghosted_buildings,
            dead_ghosts: Vec::new(),
            live_ghosts: Vec::new(),
            temp_opaque: Vec::new(),
            temp_alpha: Vec::new(),
        }
    }

    pub fn set_icon_distance(&mut self, distance: f32) {
        log::info!("[UnitDrawer] icon distance set to {distance}");
        self.icon_distance = distance;
    }

    pub fn set_model_draw_distance(&mut self, distance: f32) {
        log::info!("[UnitDrawer] model draw distance set to {distance}");
        self.model_draw_distance = distance;
    }

    pub fn alpha_values(&self) -> Vec4 {
        self.alpha_values
    }

    pub fn dead_ghosts(&self, ally_team: usize, model_type: ModelType) -> &[Arc<GhostSolidObject>] {
        self.dead_ghosts
            .get(ally_team)
            .map(|g| g[model_type.index()].as_slice())
            .unwrap_or(&[])
    }

    pub fn live_ghosts(&self, ally_team: usize, model_type: ModelType) -> &[Entity] {
        self.live_ghosts
            .get(ally_team)
            .map(|g| g[model_type.index()].as_slice())
            .unwrap_or(&[])
    }

    pub fn add_temp_draw_unit(&mut self, unit: TempDrawUnit, alpha: bool) {
        if alpha {
            self.temp_alpha.push(unit);
        } else {
            self.temp_opaque.push(unit);
        }
    }

    pub fn temp_draw_units(&self) -> usize {
        self.temp_opaque.len() + self.temp_alpha.len()
    }

    /// A building left an ally team's sight; keep drawing it where it was last seen.
    pub fn unit_left_los(&mut self, entity: Entity, model_type: ModelType, is_building: bool, ally_team: usize) {
        if !self.ghosted_buildings || !is_building {
            return;
        }
        let list = &mut per_ally(&mut self.live_ghosts, ally_team)[model_type.index()];
        if !list.contains(&entity) {
            list.push(entity);
        }
    }

    pub fn unit_entered_los(&mut self, entity: Entity, model_type: ModelType, ally_team: usize) {
        if let Some(lists) = self.live_ghosts.get_mut(ally_team) {
            lists[model_type.index()].retain(|e| *e != entity);
        }
    }

    /// Drop dead ghosts whose location an ally team can see again.
    pub fn update_ghosted_buildings(&mut self, view: &FrameView<'_>) {
        for (ally, lists) in self.dead_ghosts.iter_mut().enumerate() {
            for list in lists.iter_mut() {
                list.retain(|ghost| {
                    let seen = view.los.in_los(ghost.position, ally);
                    if seen {
                        log::debug!(
                            "[UnitDrawer] ally team {ally} sees ghost of {} again ({} holders left)",
                            ghost.model.name,
                            Arc::strong_count(ghost) - 1
                        );
                    }
                    !seen
                });
            }
        }
    }

    fn expire_temp_units(&mut self, sim_frame: u64) {
        self.temp_opaque.retain(|t| t.timeout_frame >= sim_frame);
        self.temp_alpha.retain(|t| t.timeout_frame >= sim_frame);
    }

    fn player_class(&self, input: &ClassifyInput<'_>, sq_dist: f32) -> PlayerClass {
        if sq_dist >= far_tex_distance_sq(input.solid.radius, self.model_draw_distance) {
            PlayerClass::FarTex
        } else if input.solid.cloaked {
            PlayerClass::Alpha
        } else {
            PlayerClass::Opaque
        }
    }
}

fn per_ally<T>(lists: &mut Vec<PerModelType<T>>, ally_team: usize) -> &mut PerModelType<T> {
    if lists.len() <= ally_team {
        lists.resize_with(ally_team + 1, Default::default);
    }
    &mut lists[ally_team]
}

impl ObjectKind for UnitKind {
    const NAME: &'static str = "Unit";
    const LUA_TYPE: LuaObjType = LuaObjType::Unit;

    fn classify(&self, input: &ClassifyInput<'_>, view: &FrameView<'_>) -> Classification {
        let env = view.env;
        if input.solid.no_draw || input.solid.in_void {
            return Classification::NONE;
        }

        let cam_pos = env.cameras.get(CameraType::Player).position();
        let sq_dist = cam_pos.distance_squared(input.transform.position);
        let in_los = input.in_los(env);
        let radar_only = !in_los && input.in_radar(env);
        if radar_only || (in_los && sq_dist > self.icon_distance * self.icon_distance) {
            return Classification::ICON;
        }

        let player = self.player_class(input, sq_dist);
        Classification {
            flags: classify_cameras(input, view, player),
            draw_alpha: if player == PlayerClass::Alpha { self.alpha_values.x } else { 1.0 },
            is_icon: false,
        }
    }

    fn update_pre(&mut self, view: &FrameView<'_>) {
        self.expire_temp_units(view.env.sim_frame);
        if self.ghosted_buildings {
            self.update_ghosted_buildings(view);
        }
    }

    fn object_destroyed(&mut self, world: &World, entity: Entity, obj: &DrawObject) {
        for lists in self.live_ghosts.iter_mut() {
            lists[obj.model_type.index()].retain(|e| *e != entity);
        }
        if !self.ghosted_buildings {
            return;
        }

        let Ok(mut query) = world.query_one::<(&Transform, &SolidObject, Option<&LosStatus>)>(entity) else {
            return;
        };
        let Some((transform, solid, Some(los))) = query.get() else {
            return;
        };
        if !solid.is_building {
            return;
        }

        let mut shared: Option<Arc<GhostSolidObject>> = None;
        for ally in 0..los.ally_team_count() {
            let bits = los.get(ally);
            if bits.intersects(LosBits::INLOS | LosBits::CONTRADAR) || !bits.contains(LosBits::PREVLOS) {
                continue;
            }
            let ghost = shared
                .get_or_insert_with(|| {
                    Arc::new(GhostSolidObject {
                        model: Arc::clone(&solid.model),
                        position: transform.position,
                        facing: solid.build_facing,
                        team: solid.team,
                    })
                })
                .clone();
            log::debug!("[UnitDrawer] ghost of {} created for ally team {ally}", solid.model.name);
            per_ally(&mut self.dead_ghosts, ally)[solid.model.model_type.index()].push(ghost);
        }
    }

    fn draw_opaque_aux(drawer: &ModelDrawer<Self>, ctx: &mut DrawContext<'_>, env: &RenderEnv, model_type: ModelType) -> usize {
        draw_temp_units(drawer, ctx, env, model_type, &drawer.data.kind.temp_opaque, 1.0)
    }

    fn draw_alpha_aux(drawer: &ModelDrawer<Self>, ctx: &mut DrawContext<'_>, env: &RenderEnv, model_type: ModelType) -> usize {
        let kind = &drawer.data.kind;
        let camera = env.active_camera();
        let ally = env.my_ally_team;
        let mut drawn = 0;

        for ghost in kind.dead_ghosts(ally, model_type) {
            if !camera.in_view(ghost.position, ghost.model.radius) {
                continue;
            }
            let draw = StaticDraw {
                model_type,
                texture_type: ghost.model.texture_type,
                team: ghost.team,
                matrix: ghost.matrix(),
                alpha: kind.alpha_values.y,
            };
            drawn += usize::from(drawer.draw_static_model(ctx, env, &draw));
        }

        if !env.spectating_full_view {
            for &entity in kind.live_ghosts(ally, model_type) {
                let Some(obj) = drawer.data.get(entity) else {
                    continue;
                };
                if obj.los_bits.contains(LosBits::INLOS) || !camera.in_view(obj.position, obj.radius) {
                    continue;
                }
                let alpha = if obj.los_bits.contains(LosBits::CONTRADAR) {
                    kind.alpha_values.z
                } else {
                    kind.alpha_values.y
                };
                let draw = StaticDraw {
                    model_type,
                    texture_type: obj.texture_type,
                    team: obj.team,
                    matrix: obj.world_matrix,
                    alpha,
                };
                drawn += usize::from(drawer.draw_static_model(ctx, env, &draw));
            }
        }

        drawn + draw_temp_units(drawer, ctx, env, model_type, &kind.temp_alpha, kind.alpha_values.x)
    }

    fn draw_shadow_aux(drawer: &ModelDrawer<Self>, ctx: &mut DrawContext<'_>, env: &RenderEnv, model_type: ModelType) -> usize {
        draw_temp_units(drawer, ctx, env, model_type, &drawer.data.kind.temp_opaque, 1.0)
    }
}

fn draw_temp_units(
    drawer: &ModelDrawer<UnitKind>,
    ctx: &mut DrawContext<'_>,
    env: &RenderEnv,
    model_type: ModelType,
    units: &[TempDrawUnit],
    alpha: f32,
) -> usize {
    let camera = env.active_camera();
    units
        .iter()
        .filter(|t| t.model.model_type == model_type && camera.in_view(t.position, t.model.radius))
        .map(|t| {
            let draw = StaticDraw {
                model_type,
                texture_type: t.model.texture_type,
                team: t.team,
                matrix: t.matrix(),
                alpha,
            };
            usize::from(drawer.draw_static_model(ctx, env, &draw))
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drawer_data::{DrawFlags, ModelDrawerData};
    use crate::test_support::Scene;
    use std::sync::Weak;

    fn data() -> ModelDrawerData<UnitKind> {
        let cfg = DrawerConfig::default();
        ModelDrawerData::new(UnitKind::new(&cfg), &cfg)
    }

    fn classify_one(scene: &Scene, kind: &UnitKind, entity: Entity) -> Classification {
        let mut q = scene
            .world
            .query_one::<(&Transform, &SolidObject, Option<&LosStatus>)>(entity)
            .unwrap();
        let (transform, solid, los) = q.get().unwrap();
        kind.classify(&ClassifyInput { transform, solid, los }, &scene.view())
    }

    #[test]
    fn visible_unit_is_opaque_only() {
        let mut scene = Scene::new();
        let kind = UnitKind::new(&DrawerConfig::default());
        let e = scene.spawn_unit(Vec3::ZERO, ModelType::S3o, 1, 2);
        let c = classify_one(&scene, &kind, e);
        assert_eq!(c.flags, DrawFlags::OPAQUE);
        assert!(!c.is_icon);
    }

    #[test]
    fn units_behind_the_player_still_cast_shadows() {
        let mut scene = Scene::new();
        scene.env.shadow_gen_models = true;
        let kind = UnitKind::new(&DrawerConfig::default());
        // Camera sits at (0, 200, 400) looking towards -Z.
        let in_view = scene.spawn_unit(Vec3::ZERO, ModelType::S3o, 0, 0);
        let cloaked_behind = scene.spawn_unit(Vec3::new(0.0, 0.0, 900.0), ModelType::S3o, 0, 0);
        scene.world.get::<&mut SolidObject>(cloaked_behind).unwrap().cloaked = true;
        let far_behind = scene.spawn_unit(Vec3::new(0.0, 0.0, 3500.0), ModelType::S3o, 0, 0);

        assert_eq!(classify_one(&scene, &kind, in_view).flags, DrawFlags::OPAQUE | DrawFlags::SHADOW);
        assert_eq!(classify_one(&scene, &kind, cloaked_behind).flags, DrawFlags::SHADOW);
        assert_eq!(classify_one(&scene, &kind, far_behind).flags, DrawFlags::SHADOW);
    }

    #[test]
    fn classification_is_exclusive_and_idempotent() {
        let mut scene = Scene::new();
        scene.env.water_reflection = true;
        scene.env.shadow_gen_models = true;
        let kind = UnitKind::new(&DrawerConfig::default());

        let distances = [0.0, -500.0, -1500.0, -20000.0];
        let mut entities = Vec::new();
        for (i, z) in distances.into_iter().enumerate() {
            for variant in 0..16u32 {
                let e = scene.spawn_unit(Vec3::new(i as f32 * 30.0, 0.0, z), ModelType::S3o, 0, 0);
                {
                    let mut solid = scene.world.get::<&mut SolidObject>(e).unwrap();
                    solid.cloaked = variant & 1 != 0;
                    solid.in_void = variant & 2 != 0;
                    solid.in_water = variant & 4 != 0;
                }
                if variant & 8 != 0 {
                    scene.world.get::<&mut LosStatus>(e).unwrap().set(0, LosBits::PREVLOS);
                }
                entities.push(e);
            }
        }

        for e in entities {
            let first = classify_one(&scene, &kind, e);
            let second = classify_one(&scene, &kind, e);
            assert_eq!(first, second);
            let exclusive = first.flags & DrawFlags::EXCLUSIVE;
            assert!(exclusive.bits().count_ones() <= 1, "{:?}", first.flags);
            if first.flags.intersects(DrawFlags::FARTEX | DrawFlags::ALPHA) {
                assert!(!first.flags.contains(DrawFlags::SHADOW));
            }
        }
    }

    #[test]
    fn radar_only_units_become_icons() {
        let mut scene = Scene::new();
        let kind = UnitKind::new(&DrawerConfig::default());
        let e = scene.spawn_unit(Vec3::ZERO, ModelType::S3o, 1, 1);
        scene.world.get::<&mut LosStatus>(e).unwrap().set(0, LosBits::INRADAR);
        let c = classify_one(&scene, &kind, e);
        assert!(c.is_icon);
        assert_eq!(c.flags, DrawFlags::ICON);

        scene.env.spectating_full_view = true;
        assert_eq!(classify_one(&scene, &kind, e).flags, DrawFlags::OPAQUE);
    }

    #[test]
    fn distant_units_in_sight_become_icons() {
        let mut scene = Scene::new();
        let mut kind = UnitKind::new(&DrawerConfig::default());
        kind.set_icon_distance(300.0);
        let e = scene.spawn_unit(Vec3::new(0.0, 0.0, -500.0), ModelType::S3o, 1, 0);
        assert!(classify_one(&scene, &kind, e).is_icon);
    }

    #[test]
    fn cloaked_units_use_cloak_alpha() {
        let mut scene = Scene::new();
        let kind = UnitKind::new(&DrawerConfig::default());
        let e = scene.spawn_unit(Vec3::ZERO, ModelType::S3o, 1, 0);
        scene.world.get::<&mut SolidObject>(e).unwrap().cloaked = true;
        let c = classify_one(&scene, &kind, e);
        assert_eq!(c.flags, DrawFlags::ALPHA);
        assert!((c.draw_alpha - kind.alpha_values().x).abs() < 1e-6);
    }

    #[test]
    fn submerged_units_are_also_refracted() {
        let mut scene = Scene::new();
        let kind = UnitKind::new(&DrawerConfig::default());
        let e = scene.spawn_unit(Vec3::ZERO, ModelType::Ass, 1, 0);
        scene.world.get::<&mut SolidObject>(e).unwrap().in_water = true;
        assert_eq!(classify_one(&scene, &kind, e).flags, DrawFlags::OPAQUE | DrawFlags::REFRACTION);
    }

    #[test]
    fn dead_building_leaves_shared_ghost_until_seen_again() {
        let mut scene = Scene::new();
        let mut data = data();
        let pos = Vec3::new(100.0, 0.0, -300.0);
        let e = scene.spawn_building(pos, ModelType::S3o, 1, 1);
        {
            let mut los = scene.world.get::<&mut LosStatus>(e).unwrap();
            los.set(0, LosBits::PREVLOS);
            los.set(1, LosBits::INLOS | LosBits::PREVLOS);
            los.set(2, LosBits::PREVLOS);
        }
        data.add_object(&scene.world, e).unwrap();
        assert!(data.destroy_object(&scene.world, e));
        scene.world.despawn(e).unwrap();

        let kind = &data.kind;
        assert_eq!(kind.dead_ghosts(0, ModelType::S3o).len(), 1);
        assert!(kind.dead_ghosts(1, ModelType::S3o).is_empty());
        let ghost = &kind.dead_ghosts(0, ModelType::S3o)[0];
        assert!(Arc::ptr_eq(ghost, &kind.dead_ghosts(2, ModelType::S3o)[0]));
        let weak: Weak<GhostSolidObject> = Arc::downgrade(ghost);
        assert_eq!(weak.strong_count(), 2);

        scene.los.add(0, pos, 200.0);
        data.update(&scene.view(), false);
        assert!(data.kind.dead_ghosts(0, ModelType::S3o).is_empty());
        assert_eq!(weak.strong_count(), 1);

        scene.los.add(2, pos, 200.0);
        data.update(&scene.view(), false);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn no_ghost_for_non_buildings_or_radar_contact() {
        let mut scene = Scene::new();
        let mut data = data();
        let mobile = scene.spawn_unit(Vec3::ZERO, ModelType::S3o, 1, 1);
        let tracked = scene.spawn_building(Vec3::X * 50.0, ModelType::S3o, 1, 1);
        scene.world.get::<&mut LosStatus>(mobile).unwrap().set(0, LosBits::PREVLOS);
        scene
            .world
            .get::<&mut LosStatus>(tracked)
            .unwrap()
            .set(0, LosBits::PREVLOS | LosBits::CONTRADAR | LosBits::INRADAR);
        for e in [mobile, tracked] {
            data.add_object(&scene.world, e).unwrap();
            data.destroy_object(&scene.world, e);
        }
        assert!(data.kind.dead_ghosts(0, ModelType::S3o).is_empty());
    }

    #[test]
    fn live_ghost_lists_follow_los_changes() {
        let cfg = DrawerConfig::default();
        let mut kind = UnitKind::new(&cfg);
        let mut world = World::new();
        let e = world.spawn(());
        kind.unit_left_los(e, ModelType::Ass, true, 3);
        kind.unit_left_los(e, ModelType::Ass, true, 3);
        assert_eq!(kind.live_ghosts(3, ModelType::Ass), &[e]);
        kind.unit_entered_los(e, ModelType::Ass, 3);
        assert!(kind.live_ghosts(3, ModelType::Ass).is_empty());

        kind.unit_left_los(e, ModelType::Ass, false, 0);
        assert!(kind.live_ghosts(0, ModelType::Ass).is_empty());
    }

    #[test]
    fn temp_units_expire_after_timeout() {
        let mut scene = Scene::new();
        let mut data = data();
        let model = Scene::model(ModelType::S3o, 1);
        for (timeout, alpha) in [(5, false), (10, true)] {
            data.kind.add_temp_draw_unit(
                TempDrawUnit {
                    model: Arc::clone(&model),
                    team: 0,
                    position: Vec3::ZERO,
                    rotation: 0.0,
                    timeout_frame: timeout,
                },
                alpha,
            );
        }
        scene.env.sim_frame = 5;
        data.update(&scene.view(), false);
        assert_eq!(data.kind.temp_draw_units(), 2);
        scene.env.sim_frame = 6;
        data.update(&scene.view(), false);
        assert_eq!(data.kind.temp_draw_units(), 1);
    }
}

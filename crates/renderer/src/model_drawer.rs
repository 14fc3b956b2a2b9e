//! Backend selection and pass orchestration shared by the unit and feature drawers.
//!
//! A [`ModelDrawer`] owns one instance of every backend the GPU offers and
//! routes all draw calls through the selected one. The selection can be
//! overridden for a scope with [`ModelDrawer::scoped_impl`]; the previous
//! backend is restored when the guard drops.
//!
//! The drawer is confined to the render thread: it is neither `Send` nor
//! `Sync`, and only [`ModelDrawerData::update`] fans work out to other threads.

use std::cell::Cell;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

use engine_core::{ModelType, TeamTable};
use glam::{Mat4, Vec4};
use hecs::{Entity, World};

use crate::config::DrawerConfig;
use crate::device::{Capability, DeviceCommand, GraphicsDevice, PolygonMode};
use crate::drawer_data::{DrawFlags, DrawObject, EngineDrawMask, ModelDrawerData, ObjectKind, UpdateStats};
use crate::drawer_helper::{helper_for, nano_color_multipliers, pop_transform, push_transform};
use crate::drawer_state::{create_states, DrawerKind, MatrixMode, ModelDrawerState, ShadingProfile, DEFAULT_NANO_COLOR};
use crate::env::{DrawMode, FrameView, RenderEnv};
use crate::error::Result;
use crate::far_texture::FarTextureHandler;
use crate::feature_drawer::FeatureKind;
use crate::lua_object_drawer::{LuaObjType, LuaObjectDrawer, MaterialObjectSink};
use crate::unit_drawer::{TempDrawUnit, UnitKind};

pub type UnitDrawer = ModelDrawer<UnitKind>;
pub type FeatureDrawer = ModelDrawer<FeatureKind>;

/// Script callbacks fired while drawing.
pub trait DrawEvents {
    /// A script claims the draw of an object flagged for scripted drawing.
    /// Only asked on the legacy backend.
    fn draw_object(&mut self, _obj_type: LuaObjType, _entity: Entity) -> bool {
        false
    }

    /// The geometry buffer has been filled for one object type.
    fn post_deferred(&mut self, _obj_type: LuaObjType) {}
}

/// Events sink for callers without scripting.
#[derive(Debug, Default)]
pub struct NoEvents;

impl DrawEvents for NoEvents {}

/// Everything a pass needs besides the drawer and the frame environment.
pub struct DrawContext<'a> {
    pub device: &'a mut dyn GraphicsDevice,
    pub teams: &'a TeamTable,
    pub lua: &'a mut LuaObjectDrawer,
    pub far_textures: &'a mut FarTextureHandler,
    pub events: &'a mut dyn DrawEvents,
}

/// A model drawn from a snapshot instead of a tracked object: ghosts and temporary units.
#[derive(Debug, Clone, Copy)]
pub struct StaticDraw {
    pub model_type: ModelType,
    pub texture_type: u32,
    pub team: usize,
    pub matrix: Mat4,
    pub alpha: f32,
}

/// Objects drawn per pass since the last update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrawStats {
    pub opaque: usize,
    pub deferred: usize,
    pub alpha: usize,
    pub shadow: usize,
    /// Snapshots drawn beside the bins: ghosts and temporary units.
    pub aux: usize,
    /// Objects drawn through script materials.
    pub material: usize,
    pub far_textures: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    Opaque { deferred: bool },
    Alpha,
    Shadow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Drawn {
    Skipped,
    Immediate,
    /// Added to the pending batch of the current bin.
    Queued,
}

pub struct ModelDrawer<K: ObjectKind> {
    pub data: ModelDrawerData<K>,
    states: [Option<Box<dyn ModelDrawerState>>; DrawerKind::COUNT],
    selected: DrawerKind,
    profile: ShadingProfile,
    preferred: Option<DrawerKind>,
    reselection_requested: Cell<bool>,
    force_legacy: Cell<bool>,
    mt_model_drawer: bool,
    team_nanospray: bool,
    impl_stack: Vec<(DrawerKind, bool)>,
    stats: DrawStats,
    _render_thread: PhantomData<*const ()>,
}

impl<K: ObjectKind> ModelDrawer<K> {
    /// Create and initialise every backend the profile allows, then pick one.
    pub fn new(kind: K, config: &DrawerConfig, mut profile: ShadingProfile, dev: &mut dyn GraphicsDevice) -> Self {
        profile.adv_shading &= config.adv_model_shading;
        let mut states = create_states(&profile, config.alpha_values());
        for state in states.iter_mut().flatten() {
            state.init(dev, &profile);
        }

        let mut drawer = Self {
            data: ModelDrawerData::new(kind, config),
            states,
            selected: DrawerKind::Ffp,
            profile,
            preferred: config.preferred_drawer,
            reselection_requested: Cell::new(false),
            force_legacy: Cell::new(false),
            mt_model_drawer: config.mt_model_drawer,
            team_nanospray: config.team_nanospray,
            impl_stack: Vec::new(),
            stats: DrawStats::default(),
            _render_thread: PhantomData,
        };
        drawer.select_implementation(true, true, true);
        log::info!("[{}Drawer] using the {} backend", K::NAME, drawer.selected);
        drawer
    }

    pub fn selected(&self) -> DrawerKind {
        self.selected
    }

    pub fn profile(&self) -> ShadingProfile {
        self.profile
    }

    pub fn stats(&self) -> DrawStats {
        self.stats
    }

    pub fn mt_model_drawer(&self) -> bool {
        self.mt_model_drawer
    }

    pub fn set_mt_model_drawer(&mut self, enabled: bool) {
        self.mt_model_drawer = enabled;
    }

    pub fn force_legacy_active(&self) -> bool {
        self.force_legacy.get()
    }

    pub fn reselection_requested(&self) -> bool {
        self.reselection_requested.get()
    }

    /// Depth of nested backend overrides.
    pub fn override_depth(&self) -> usize {
        self.impl_stack.len()
    }

    fn state(&self) -> Option<&dyn ModelDrawerState> {
        self.states[self.selected.index()].as_deref()
    }

    fn state_mut(&mut self) -> Option<&mut (dyn ModelDrawerState + 'static)> {
        self.states[self.selected.index()].as_deref_mut()
    }

    pub fn state_of(&self, kind: DrawerKind) -> Option<&dyn ModelDrawerState> {
        self.states[kind.index()].as_deref()
    }

    /// Whether the selected backend is the fixed-function one.
    pub fn is_legacy(&self) -> bool {
        self.state().map_or(true, |s| s.is_legacy())
    }

    pub fn can_draw_deferred(&self) -> bool {
        self.state().is_some_and(|s| s.can_draw_deferred(&self.profile))
    }

    fn qualifies(&self, kind: DrawerKind, legacy_allowed: bool, modern_allowed: bool) -> bool {
        let Some(state) = self.state_of(kind) else {
            return false;
        };
        let family_allowed = if state.is_legacy() {
            legacy_allowed
        } else {
            modern_allowed && !self.force_legacy.get()
        };
        family_allowed && state.can_enable(&self.profile) && state.is_valid()
    }

    /// Pick the backend that services all draw calls. Does nothing unless `force`.
    pub fn select_implementation(&mut self, force: bool, legacy_allowed: bool, modern_allowed: bool) {
        if !force {
            return;
        }
        if !self.profile.adv_shading {
            self.selected = DrawerKind::Ffp;
            return;
        }

        let mt = if self.mt_model_drawer { "MT" } else { "ST" };
        if let Some(preferred) = self.preferred.take() {
            if self.qualifies(preferred, legacy_allowed, modern_allowed) {
                log::info!("[{}Drawer] Force-switching to {preferred} ({mt})", K::NAME);
                self.selected = preferred;
                return;
            }
            log::error!("[{}Drawer] Couldn't force-switch to {preferred} ({mt})", K::NAME);
        }

        self.selected = [DrawerKind::Gl4, DrawerKind::Glsl]
            .into_iter()
            .find(|&kind| self.qualifies(kind, legacy_allowed, modern_allowed))
            .unwrap_or(DrawerKind::Ffp);
    }

    /// Downgrade to the legacy backend from the next update on.
    pub fn force_legacy_path(&self) {
        if !self.force_legacy.replace(true) {
            log::warn!(
                "[{}Drawer] Using legacy (slow) {} renderer! This is caused by insufficient GPU/driver capabilities or by use of the old scripted rendering API",
                K::NAME,
                K::NAME
            );
        }
        self.reselection_requested.set(true);
    }

    pub fn set_preferred_drawer(&mut self, kind: Option<DrawerKind>) {
        self.preferred = kind;
        self.reselection_requested.set(true);
    }

    pub fn set_adv_shading(&mut self, enabled: bool) {
        self.profile.adv_shading = enabled;
        self.reselection_requested.set(true);
    }

    pub fn set_profile(&mut self, profile: ShadingProfile) {
        self.profile = profile;
        self.reselection_requested.set(true);
    }

    fn push(&mut self, legacy_allowed: bool, modern_allowed: bool, mt: bool) {
        self.impl_stack.push((self.selected, self.mt_model_drawer));
        self.mt_model_drawer = mt;
        self.select_implementation(true, legacy_allowed, modern_allowed);
    }

    fn pop(&mut self) {
        let Some((selected, mt)) = self.impl_stack.pop() else {
            debug_assert!(false, "backend override popped without a push");
            log::error!("[{}Drawer] backend override popped without a push", K::NAME);
            return;
        };
        self.selected = selected;
        self.mt_model_drawer = mt;
    }

    /// Override the backend until the returned guard drops.
    pub fn scoped_impl(&mut self, legacy_allowed: bool, modern_allowed: bool, mt: bool) -> ScopedDrawerImpl<'_, K> {
        self.push(legacy_allowed, modern_allowed, mt);
        ScopedDrawerImpl { drawer: self }
    }

    /// Rebuild the programs of every backend. A failed relink disqualifies that
    /// backend for the rest of the session.
    pub fn reload_shaders(&mut self, dev: &mut dyn GraphicsDevice) -> bool {
        let profile = self.profile;
        for state in self.states.iter_mut().flatten() {
            if !state.reload_shaders(dev, &profile) {
                log::error!("[{}Drawer] reloading the {} programs failed", K::NAME, state.kind());
            }
        }
        self.reselection_requested.set(true);
        self.state().is_some_and(|s| s.is_valid())
    }

    /// Release every backend and forget all objects.
    pub fn kill(&mut self, dev: &mut dyn GraphicsDevice) {
        for state in self.states.iter_mut().flatten() {
            state.kill(dev);
        }
        self.impl_stack.clear();
        self.data.clear();
    }

    /// Per-frame update: apply pending reselection, then classify every object.
    pub fn update(&mut self, view: &FrameView<'_>) -> UpdateStats {
        let force = self.reselection_requested.replace(false);
        self.select_implementation(force, true, true);
        self.stats = DrawStats::default();
        self.data.update(view, self.mt_model_drawer)
    }

    pub fn add_object(&mut self, world: &World, entity: Entity) -> Result<()> {
        self.data.add_object(world, entity)
    }

    /// Object destroyed: drop its script materials and its draw data.
    pub fn del_object(&mut self, world: &World, lua: &mut LuaObjectDrawer, entity: Entity) -> bool {
        lua.object_destroyed(entity);
        self.data.destroy_object(world, entity)
    }

    /// Cloak state changed.
    pub fn set_object_alpha(&mut self, entity: Entity, alpha: bool) -> bool {
        self.data.set_object_alpha(entity, alpha)
    }

    pub fn set_engine_draw_mask(&mut self, entity: Entity, mask: EngineDrawMask) -> bool {
        self.data.set_engine_draw_mask(entity, mask)
    }

    pub fn set_team_color(&self, dev: &mut dyn GraphicsDevice, env: &RenderEnv, teams: &TeamTable, team: usize, alpha: f32) -> bool {
        self.state().is_some_and(|s| s.set_team_color(dev, env, teams, team, alpha))
    }

    pub fn set_nano_color(&self, dev: &mut dyn GraphicsDevice, color: Vec4) {
        if let Some(state) = self.state() {
            state.set_nano_color(dev, color);
        }
    }

    pub fn setup_opaque_drawing(&mut self, dev: &mut dyn GraphicsDevice, env: &RenderEnv, deferred_pass: bool) {
        if let Some(state) = self.state_mut() {
            state.setup_opaque_drawing(dev, env, deferred_pass);
        }
    }

    pub fn reset_opaque_drawing(&mut self, dev: &mut dyn GraphicsDevice, env: &RenderEnv, deferred_pass: bool) {
        if let Some(state) = self.state_mut() {
            state.reset_opaque_drawing(dev, env, deferred_pass);
        }
    }

    pub fn setup_alpha_drawing(&mut self, dev: &mut dyn GraphicsDevice, env: &RenderEnv, deferred_pass: bool) {
        if let Some(state) = self.state_mut() {
            state.setup_alpha_drawing(dev, env, deferred_pass);
        }
    }

    pub fn reset_alpha_drawing(&mut self, dev: &mut dyn GraphicsDevice, env: &RenderEnv, deferred_pass: bool) {
        if let Some(state) = self.state_mut() {
            state.reset_alpha_drawing(dev, env, deferred_pass);
        }
    }

    /// Opaque drawing of one frame: the deferred pass when a geometry buffer
    /// is available and this is not a water sub-pass, the forward pass, then
    /// the far-texture impostors queued by both.
    pub fn draw(&mut self, ctx: &mut DrawContext<'_>, env: &RenderEnv, draw_reflection: bool, draw_refraction: bool) -> usize {
        let env = env.for_pass(DrawMode::from_flags(draw_reflection, draw_refraction), false);
        let mut drawn = 0;

        if env.draw_mode == DrawMode::Normal && ctx.lua.draw_deferred_enabled() && self.can_draw_deferred() {
            ctx.device.submit(DeviceCommand::BindGeometryBuffer);
            if ctx.lua.take_buffer_clear(env.draw_frame) {
                ctx.device.submit(DeviceCommand::ClearGeometryBuffer);
            }
            let deferred = self.draw_opaque_pass(ctx, &env, true);
            ctx.device.submit(DeviceCommand::UnbindGeometryBuffer);
            ctx.events.post_deferred(K::LUA_TYPE);
            drawn += deferred;
        }

        drawn += self.draw_opaque_pass(ctx, &env, false);

        let far = ctx.far_textures.draw(ctx.device);
        self.stats.far_textures += far;
        drawn + far
    }

    /// Engine bins, then auxiliary snapshots, then script materials.
    pub fn draw_opaque_pass(&mut self, ctx: &mut DrawContext<'_>, env: &RenderEnv, deferred_pass: bool) -> usize {
        let pass = Pass::Opaque { deferred: deferred_pass };
        ctx.lua.set_draw_pass_global_lod_factor(K::LUA_TYPE, env);
        self.setup_opaque_drawing(ctx.device, env, deferred_pass);

        let mut drawn = 0;
        let mut aux = 0;
        for mt in ModelType::ALL {
            let helper = helper_for(mt);
            helper.push_render_state(ctx.device);
            drawn += self.draw_bins(ctx, env, mt, pass);
            aux += K::draw_opaque_aux(self, ctx, env, mt);
            helper.pop_render_state(ctx.device);
        }
        self.reset_opaque_drawing(ctx.device, env, deferred_pass);

        let material = self.draw_material_objects(ctx, env, pass);
        if deferred_pass {
            self.stats.deferred += drawn;
        } else {
            self.stats.opaque += drawn;
        }
        self.stats.aux += aux;
        self.stats.material += material;
        drawn + aux + material
    }

    /// Translucent objects, then ghosts and temporary units, then script materials.
    pub fn draw_alpha_pass(&mut self, ctx: &mut DrawContext<'_>, env: &RenderEnv) -> usize {
        let env = env.for_pass(env.draw_mode, false);
        ctx.lua.set_draw_pass_global_lod_factor(K::LUA_TYPE, &env);
        self.setup_alpha_drawing(ctx.device, &env, false);

        let mut drawn = 0;
        let mut aux = 0;
        for mt in ModelType::ALL {
            let helper = helper_for(mt);
            helper.push_render_state(ctx.device);
            drawn += self.draw_bins(ctx, &env, mt, Pass::Alpha);
            aux += K::draw_alpha_aux(self, ctx, &env, mt);
            helper.pop_render_state(ctx.device);
        }
        self.reset_alpha_drawing(ctx.device, &env, false);

        let material = self.draw_material_objects(ctx, &env, Pass::Alpha);
        self.stats.alpha += drawn;
        self.stats.aux += aux;
        self.stats.material += material;
        drawn + aux + material
    }

    /// Shadow casters through the shadow-generation program.
    pub fn draw_shadow_pass(&mut self, ctx: &mut DrawContext<'_>, env: &RenderEnv) -> usize {
        let env = env.for_pass(DrawMode::Normal, true);
        let Some(program) = env.shadow_program else {
            log::warn!("[{}Drawer] no shadow program, skipping the shadow pass", K::NAME);
            return 0;
        };
        let legacy = self.is_legacy();
        ctx.lua.set_draw_pass_global_lod_factor(K::LUA_TYPE, &env);

        let dev = &mut *ctx.device;
        dev.submit(DeviceCommand::PushAttrib);
        dev.submit(DeviceCommand::Color(Vec4::ONE));
        if legacy {
            dev.submit(DeviceCommand::AlphaFunc { threshold: 0.5 });
            dev.submit(DeviceCommand::Enable(Capability::AlphaTest));
        }
        dev.submit(DeviceCommand::BindProgram(program));

        let mut drawn = 0;
        let mut aux = 0;
        for mt in ModelType::ALL {
            // 3DO faces are clockwise and often leave holes.
            if mt == ModelType::ThreeDo {
                ctx.device.submit(DeviceCommand::Disable(Capability::CullFace));
            }
            drawn += self.draw_bins(ctx, &env, mt, Pass::Shadow);
            aux += K::draw_shadow_aux(self, ctx, &env, mt);
            if mt == ModelType::ThreeDo {
                ctx.device.submit(DeviceCommand::Enable(Capability::CullFace));
            }
        }

        ctx.device.submit(DeviceCommand::UnbindProgram);
        if legacy {
            ctx.device.submit(DeviceCommand::Disable(Capability::AlphaTest));
        }
        ctx.device.submit(DeviceCommand::PopAttrib);

        let material = self.draw_material_objects(ctx, &env, Pass::Shadow);
        self.stats.shadow += drawn;
        self.stats.aux += aux;
        self.stats.material += material;
        drawn + aux + material
    }

    /// Objects bypassed by the engine bins, drawn by material under the legacy backend.
    fn draw_material_objects(&mut self, ctx: &mut DrawContext<'_>, env: &RenderEnv, pass: Pass) -> usize {
        let teams = ctx.teams;
        let guard = self.scoped_impl(true, false, false);
        let mut sink = MaterialSink {
            drawer: &*guard,
            teams,
            env,
            alpha_pass: matches!(pass, Pass::Alpha),
        };
        match pass {
            Pass::Opaque { deferred } => ctx
                .lua
                .draw_opaque_material_objects(ctx.device, K::LUA_TYPE, env, deferred, &mut sink),
            Pass::Alpha => ctx.lua.draw_alpha_material_objects(ctx.device, K::LUA_TYPE, env, &mut sink),
            Pass::Shadow => ctx.lua.draw_shadow_material_objects(ctx.device, K::LUA_TYPE, &mut sink),
        }
    }

    fn batched(&self, env: &RenderEnv) -> bool {
        self.selected == DrawerKind::Gl4 && !env.in_shadow_pass
    }

    fn draw_bins(&self, ctx: &mut DrawContext<'_>, env: &RenderEnv, mt: ModelType, pass: Pass) -> usize {
        let containers = match pass {
            Pass::Opaque { .. } if env.draw_mode == DrawMode::Normal => [Some(self.data.opaque_bin(mt)), None],
            Pass::Alpha => [Some(self.data.alpha_bin(mt)), None],
            // Water sub-passes and shadows also see objects whose last player
            // classification left them in the other bin.
            _ => [Some(self.data.opaque_bin(mt)), Some(self.data.alpha_bin(mt))],
        };

        let helper = helper_for(mt);
        let batched = self.batched(env);
        let mut drawn = 0;
        for container in containers.into_iter().flatten() {
            for (texture_type, entities) in container.bins() {
                if entities.is_empty() {
                    continue;
                }
                if pass == Pass::Shadow {
                    helper.bind_shadow_tex(ctx.device, texture_type);
                } else {
                    helper.bind_opaque_tex(ctx.device, texture_type);
                }

                let mut queued = 0;
                for &entity in entities {
                    let Some(obj) = self.data.get(entity) else {
                        continue;
                    };
                    if !self.should_draw(ctx, env, obj, pass) {
                        continue;
                    }
                    match self.draw_object(ctx, env, obj, pass) {
                        Drawn::Skipped => {}
                        Drawn::Immediate => drawn += 1,
                        Drawn::Queued => queued += 1,
                    }
                }
                if batched && queued > 0 {
                    ctx.device.submit(DeviceCommand::SubmitBatch { model_type: mt, texture_type });
                    drawn += queued;
                }

                if pass == Pass::Shadow {
                    helper.unbind_shadow_tex(ctx.device);
                } else {
                    helper.unbind_opaque_tex(ctx.device);
                }
            }
        }
        drawn
    }

    /// Per-object test of one pass. Queues far-texture impostors and hands
    /// objects with a script material for this pass to the material bins.
    fn should_draw(&self, ctx: &mut DrawContext<'_>, env: &RenderEnv, obj: &DrawObject, pass: Pass) -> bool {
        if obj.draw_flag.is_empty() || obj.is_icon {
            return false;
        }
        let lua_type = K::LUA_TYPE;
        match pass {
            Pass::Opaque { deferred } => {
                if env.draw_mode != DrawMode::Reflection && env.fps_controllee == Some(obj.entity) {
                    return false;
                }
                if obj.draw_flag.contains(DrawFlags::ALPHA) {
                    return false;
                }
                if obj.draw_flag.contains(DrawFlags::FARTEX) {
                    if !deferred && env.draw_mode == DrawMode::Normal {
                        ctx.far_textures.queue(obj.entity);
                    }
                    return false;
                }
                let required = match env.draw_mode {
                    DrawMode::Normal => DrawFlags::OPAQUE,
                    DrawMode::Reflection => DrawFlags::REFLECTION,
                    DrawMode::Refraction => DrawFlags::REFRACTION,
                };
                if !obj.draw_flag.contains(required) {
                    return false;
                }
                if ctx
                    .lua
                    .add_opaque_material_object(obj.entity, obj.team, obj.position, lua_type, env, deferred)
                {
                    return false;
                }
                let mask = if deferred {
                    EngineDrawMask::DEFERRED_OPAQUE
                } else {
                    EngineDrawMask::FORWARD_OPAQUE
                };
                obj.engine_draw_mask.contains(mask)
            }
            Pass::Alpha => {
                if !obj.draw_flag.contains(DrawFlags::ALPHA) {
                    return false;
                }
                if ctx.lua.add_alpha_material_object(obj.entity, obj.team, obj.position, lua_type, env) {
                    return false;
                }
                obj.engine_draw_mask.contains(EngineDrawMask::ALPHA)
            }
            Pass::Shadow => {
                if !obj.draw_flag.contains(DrawFlags::SHADOW) {
                    return false;
                }
                if ctx.lua.add_shadow_material_object(obj.entity, obj.team, obj.position, lua_type, env) {
                    return false;
                }
                obj.engine_draw_mask.contains(EngineDrawMask::SHADOW)
            }
        }
    }

    fn draw_object(&self, ctx: &mut DrawContext<'_>, env: &RenderEnv, obj: &DrawObject, pass: Pass) -> Drawn {
        if ctx.lua.has_lua_draw(obj.entity) {
            if !self.is_legacy() {
                // Scripted draws only run on the legacy path; this frame still
                // draws the plain model.
                self.force_legacy_path();
            } else if ctx.events.draw_object(K::LUA_TYPE, obj.entity) {
                return Drawn::Immediate;
            }
        }

        let Some(state) = self.state() else {
            return Drawn::Skipped;
        };
        let batched = self.batched(env) && !obj.being_built();
        if pass != Pass::Shadow {
            let alpha = if pass == Pass::Alpha { obj.draw_alpha } else { 1.0 };
            let team_ok = if batched {
                // Team and alpha come from the object's uniform record.
                ctx.teams.is_valid(obj.team)
            } else {
                state.set_team_color(ctx.device, env, ctx.teams, obj.team, alpha)
            };
            if !team_ok {
                return Drawn::Skipped;
            }
        }

        if obj.being_built() {
            self.draw_being_built(ctx, env, state, obj, self.data.root_matrix(obj), pass == Pass::Shadow);
            return Drawn::Immediate;
        }
        if batched {
            ctx.device.submit(DeviceCommand::AddToSubmission {
                matrix_offset: obj.matrices().first_elem(),
                uniform_index: obj.uniform_index(),
                model_type: obj.model_type,
                texture_type: obj.texture_type,
            });
            return Drawn::Queued;
        }
        self.submit_immediate(
            ctx.device,
            state,
            env,
            self.data.root_matrix(obj),
            Some(obj.entity),
            obj.model_type,
            obj.texture_type,
            None,
        );
        Drawn::Immediate
    }

    #[allow(clippy::too_many_arguments)]
    fn submit_immediate(
        &self,
        dev: &mut dyn GraphicsDevice,
        state: &dyn ModelDrawerState,
        env: &RenderEnv,
        matrix: Mat4,
        entity: Option<Entity>,
        model_type: ModelType,
        texture_type: u32,
        lod: Option<usize>,
    ) {
        let cmd = DeviceCommand::DrawModel {
            entity,
            model_type,
            texture_type,
            lod,
        };
        if self.batched(env) {
            state.set_matrix_mode(dev, MatrixMode::Static);
            state.set_static_model_matrix(dev, matrix);
            dev.submit(cmd);
            state.set_matrix_mode(dev, MatrixMode::Dynamic);
        } else {
            push_transform(dev, matrix);
            dev.submit(cmd);
            pop_transform(dev);
        }
    }

    fn set_clip_plane(&self, dev: &mut dyn GraphicsDevice, state: &dyn ModelDrawerState, env: &RenderEnv, index: u32, plane: Option<Vec4>) {
        if self.batched(env) {
            state.set_clip_plane(dev, index, plane);
        } else {
            dev.submit(DeviceCommand::ClipPlane { index, plane });
        }
    }

    /// Construction reveal: a wireframe climbs the model, a flat-coloured shell
    /// follows it, and the textured model rises last. Plane 0 bounds a stage from
    /// above, plane 1 erases it from below.
    fn draw_being_built(
        &self,
        ctx: &mut DrawContext<'_>,
        env: &RenderEnv,
        state: &dyn ModelDrawerState,
        obj: &DrawObject,
        matrix: Mat4,
        shadow: bool,
    ) {
        let h = obj.model_height;
        let p = obj.build_progress;
        let (wire_mult, flat_mult) = nano_color_multipliers(env.sim_frame);
        let nano = if self.team_nanospray {
            ctx.teams.color(obj.team).map_or(DEFAULT_NANO_COLOR, |c| c.truncate())
        } else {
            DEFAULT_NANO_COLOR
        };
        let dev = &mut *ctx.device;

        dev.submit(DeviceCommand::PushAttrib);
        if p > 0.0 {
            if !shadow {
                state.set_nano_color(dev, (nano * wire_mult).extend(1.0));
            }
            self.set_clip_plane(dev, state, env, 0, Some(Vec4::new(0.0, -1.0, 0.0, h * (p * 3.0))));
            self.set_clip_plane(dev, state, env, 1, Some(Vec4::new(0.0, 1.0, 0.0, -h * (p * 10.0 - 9.0))));
            if !shadow {
                dev.submit(DeviceCommand::PolygonMode(PolygonMode::Line));
            }
            self.submit_immediate(dev, state, env, matrix, Some(obj.entity), obj.model_type, obj.texture_type, None);
            if !shadow {
                let restore = if env.wire_frame { PolygonMode::Line } else { PolygonMode::Fill };
                dev.submit(DeviceCommand::PolygonMode(restore));
            }
        }
        if p > 1.0 / 3.0 {
            if !shadow {
                state.set_nano_color(dev, (nano * flat_mult).extend(1.0));
            }
            self.set_clip_plane(dev, state, env, 0, Some(Vec4::new(0.0, -1.0, 0.0, h * (p * 3.0 - 1.0))));
            self.set_clip_plane(dev, state, env, 1, Some(Vec4::new(0.0, 1.0, 0.0, -h * (p * 3.0 - 2.0))));
            self.submit_immediate(dev, state, env, matrix, Some(obj.entity), obj.model_type, obj.texture_type, None);
        }
        self.set_clip_plane(dev, state, env, 1, None);
        if p > 2.0 / 3.0 {
            if !shadow {
                state.set_nano_color(dev, Vec4::new(1.0, 1.0, 1.0, 0.0));
            }
            self.set_clip_plane(dev, state, env, 0, Some(Vec4::new(0.0, -1.0, 0.0, h * (p * 3.0 - 2.0))));
            self.submit_immediate(dev, state, env, matrix, Some(obj.entity), obj.model_type, obj.texture_type, None);
        }
        self.set_clip_plane(dev, state, env, 0, None);
        if !shadow {
            state.set_nano_color(dev, Vec4::new(1.0, 1.0, 1.0, 0.0));
        }
        dev.submit(DeviceCommand::PopAttrib);
    }

    /// Draw a snapshot model outside the bins. Binds its texture itself.
    pub fn draw_static_model(&self, ctx: &mut DrawContext<'_>, env: &RenderEnv, draw: &StaticDraw) -> bool {
        let Some(state) = self.state() else {
            return false;
        };
        if !env.in_shadow_pass && !state.set_team_color(ctx.device, env, ctx.teams, draw.team, draw.alpha) {
            return false;
        }
        let helper = helper_for(draw.model_type);
        if env.in_shadow_pass {
            helper.bind_shadow_tex(ctx.device, draw.texture_type);
        } else {
            helper.bind_opaque_tex(ctx.device, draw.texture_type);
        }
        self.submit_immediate(ctx.device, state, env, draw.matrix, None, draw.model_type, draw.texture_type, None);
        if env.in_shadow_pass {
            helper.unbind_shadow_tex(ctx.device);
        } else {
            helper.unbind_opaque_tex(ctx.device);
        }
        true
    }

    /// Draw one object outside any pass, e.g. for a script. Uses the object's
    /// opaque material if it has one, else sets up its own opaque state.
    /// `matrix` replaces the object's transform.
    pub fn draw_individual(
        &mut self,
        ctx: &mut DrawContext<'_>,
        env: &RenderEnv,
        entity: Entity,
        matrix: Option<Mat4>,
        no_lua_call: bool,
    ) -> bool {
        let Some(obj) = self.data.get(entity) else {
            log::debug!("[{}Drawer] individual draw of unknown {entity:?}", K::NAME);
            return false;
        };
        let (team, position) = (obj.team, obj.position);
        let env = env.for_pass(env.draw_mode, false);

        let teams = ctx.teams;
        let mut sink = MaterialSink {
            drawer: &*self,
            teams,
            env: &env,
            alpha_pass: false,
        };
        if ctx.lua.draw_single_object(ctx.device, entity, team, position, &env, &mut sink) {
            return true;
        }
        if !no_lua_call && ctx.lua.has_lua_draw(entity) && self.is_legacy() && ctx.events.draw_object(K::LUA_TYPE, entity) {
            return true;
        }

        ctx.device.submit(DeviceCommand::PushAttrib);
        ctx.device.submit(DeviceCommand::DepthMask(true));
        ctx.device.submit(DeviceCommand::Enable(Capability::DepthTest));
        self.setup_opaque_drawing(ctx.device, &env, false);
        let drawn = self.draw_individual_model(ctx, &env, entity, matrix);
        self.reset_opaque_drawing(ctx.device, &env, false);
        ctx.device.submit(DeviceCommand::PopAttrib);
        drawn
    }

    fn draw_individual_model(&self, ctx: &mut DrawContext<'_>, env: &RenderEnv, entity: Entity, matrix: Option<Mat4>) -> bool {
        let (Some(obj), Some(state)) = (self.data.get(entity), self.state()) else {
            return false;
        };
        let helper = helper_for(obj.model_type);
        helper.push_render_state(ctx.device);
        helper.bind_opaque_tex(ctx.device, obj.texture_type);

        let drawn = state.set_team_color(ctx.device, env, ctx.teams, obj.team, 1.0);
        if drawn {
            let matrix = matrix.unwrap_or_else(|| self.data.root_matrix(obj));
            if obj.being_built() {
                self.draw_being_built(ctx, env, state, obj, matrix, false);
            } else {
                self.submit_immediate(ctx.device, state, env, matrix, Some(entity), obj.model_type, obj.texture_type, None);
            }
        }

        helper.unbind_opaque_tex(ctx.device);
        helper.pop_render_state(ctx.device);
        drawn
    }
}

impl ModelDrawer<UnitKind> {
    /// A building dropped out of an ally team's sight; it stays drawn as a live ghost.
    pub fn unit_left_los(&mut self, entity: Entity, ally_team: usize) -> bool {
        let Some(obj) = self.data.get(entity) else {
            return false;
        };
        let (model_type, is_building) = (obj.model_type, obj.is_building);
        self.data.kind.unit_left_los(entity, model_type, is_building, ally_team);
        true
    }

    pub fn unit_entered_los(&mut self, entity: Entity, ally_team: usize) -> bool {
        let Some(obj) = self.data.get(entity) else {
            return false;
        };
        let model_type = obj.model_type;
        self.data.kind.unit_entered_los(entity, model_type, ally_team);
        true
    }

    pub fn add_temp_draw_unit(&mut self, unit: TempDrawUnit, alpha: bool) {
        self.data.kind.add_temp_draw_unit(unit, alpha);
    }
}

/// Restores the previous backend on drop.
pub struct ScopedDrawerImpl<'d, K: ObjectKind> {
    drawer: &'d mut ModelDrawer<K>,
}

impl<K: ObjectKind> Deref for ScopedDrawerImpl<'_, K> {
    type Target = ModelDrawer<K>;

    fn deref(&self) -> &Self::Target {
        &*self.drawer
    }
}

impl<K: ObjectKind> DerefMut for ScopedDrawerImpl<'_, K> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.drawer
    }
}

impl<K: ObjectKind> Drop for ScopedDrawerImpl<'_, K> {
    fn drop(&mut self) {
        self.drawer.pop();
    }
}

/// Draws material-bin objects with the drawer's current backend.
struct MaterialSink<'d, K: ObjectKind> {
    drawer: &'d ModelDrawer<K>,
    teams: &'d TeamTable,
    env: &'d RenderEnv,
    /// Team colour carries each object's draw alpha, so it is set per object.
    alpha_pass: bool,
}

impl<K: ObjectKind> MaterialObjectSink for MaterialSink<'_, K> {
    fn set_team_color(&mut self, dev: &mut dyn GraphicsDevice, team: usize) {
        if !self.alpha_pass {
            self.drawer.set_team_color(dev, self.env, self.teams, team, 1.0);
        }
    }

    fn draw_object(&mut self, dev: &mut dyn GraphicsDevice, entity: Entity, lod: usize) -> bool {
        let (Some(obj), Some(state)) = (self.drawer.data.get(entity), self.drawer.state()) else {
            return false;
        };
        if self.alpha_pass && !state.set_team_color(dev, self.env, self.teams, obj.team, obj.draw_alpha) {
            return false;
        }
        // Materials own the construction visuals, so LOD draws show the full model.
        self.drawer.submit_immediate(
            dev,
            state,
            self.env,
            self.drawer.data.root_matrix(obj),
            Some(entity),
            obj.model_type,
            obj.texture_type,
            Some(lod),
        );
        true
    }
}

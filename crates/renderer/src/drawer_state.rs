//! Rendering backends behind one state contract.
//!
//! A backend owns its shader programs and knows how to set up and tear down
//! GPU state for a pass. The drawers only ever talk to the selected backend
//! through [`ModelDrawerState`], so switching backends never changes the
//! drawers' pass logic.

use std::fmt;

use engine_core::TeamTable;
use glam::{Mat4, Vec3, Vec4};
use serde::{Deserialize, Serialize};

use crate::device::{BlendFactor, Capability, Combiner, DeviceCommand, GraphicsDevice, PolygonMode, ProgramDesc, ProgramId, UniformValue};
use crate::drawer_helper::{disable_textures_common, enable_textures_common, team_color};
use crate::env::{DrawMode, RenderEnv};

/// The concrete backends, least capable first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DrawerKind {
    /// Fixed-function texture combiners.
    Ffp,
    /// Uniform-driven GLSL programs, objects drawn one at a time.
    Glsl,
    /// Batched submission by arena offset with integer mode switches.
    Gl4,
}

impl DrawerKind {
    pub const COUNT: usize = 3;
    pub const ALL: [DrawerKind; Self::COUNT] = [DrawerKind::Ffp, DrawerKind::Glsl, DrawerKind::Gl4];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            DrawerKind::Ffp => "FFP",
            DrawerKind::Glsl => "GLSL",
            DrawerKind::Gl4 => "GL4",
        }
    }
}

impl fmt::Display for DrawerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What the GPU and the user allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShadingProfile {
    pub have_glsl: bool,
    pub have_gl4: bool,
    /// Advanced model shading toggle.
    pub adv_shading: bool,
    pub deferred_allowed: bool,
}

impl ShadingProfile {
    /// Everything supported and enabled.
    pub fn full() -> Self {
        Self {
            have_glsl: true,
            have_gl4: true,
            adv_shading: true,
            deferred_allowed: true,
        }
    }
}

impl Default for ShadingProfile {
    fn default() -> Self {
        Self {
            deferred_allowed: false,
            ..Self::full()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateLifecycle {
    Uninitialized,
    Ready,
    Enabled,
    Dead,
}

/// How the batched backend finds each object's transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixMode {
    /// Per-object matrices from the arena.
    Dynamic,
    /// One matrix shared by the whole batch.
    Static,
}

/// Contract every backend implements.
///
/// Operations that only the batched backend supports fail loudly elsewhere.
pub trait ModelDrawerState: Send {
    fn kind(&self) -> DrawerKind;
    fn can_enable(&self, profile: &ShadingProfile) -> bool;
    fn can_draw_deferred(&self, profile: &ShadingProfile) -> bool;
    /// Fixed-function pipeline without shaders.
    fn is_legacy(&self) -> bool;
    /// All programs built; false for the rest of the session after a failure.
    fn is_valid(&self) -> bool;
    fn lifecycle(&self) -> StateLifecycle;

    fn init(&mut self, dev: &mut dyn GraphicsDevice, profile: &ShadingProfile);
    fn kill(&mut self, dev: &mut dyn GraphicsDevice);
    /// Rebuild all programs. Returns the resulting validity.
    fn reload_shaders(&mut self, dev: &mut dyn GraphicsDevice, profile: &ShadingProfile) -> bool;

    fn enable(&mut self, dev: &mut dyn GraphicsDevice, env: &RenderEnv, deferred_pass: bool, alpha_pass: bool);
    fn disable(&mut self, dev: &mut dyn GraphicsDevice, env: &RenderEnv, deferred_pass: bool);

    /// Apply an already validated team colour.
    fn apply_team_color(&self, dev: &mut dyn GraphicsDevice, color: Vec4);
    fn set_nano_color(&self, dev: &mut dyn GraphicsDevice, color: Vec4);

    /// Fails for unknown teams and in the shadow pass; no state changes then.
    fn set_team_color(&self, dev: &mut dyn GraphicsDevice, env: &RenderEnv, teams: &TeamTable, team: usize, alpha: f32) -> bool {
        if env.in_shadow_pass {
            return false;
        }
        let Some(color) = team_color(teams, team, alpha) else {
            return false;
        };
        self.apply_team_color(dev, color);
        true
    }

    fn set_color_multiplier(&self, _dev: &mut dyn GraphicsDevice, _mult: Vec4) {
        unsupported(self.kind(), "set_color_multiplier");
    }

    fn set_camera_mode(&self, _dev: &mut dyn GraphicsDevice, _mode: DrawMode) {
        unsupported(self.kind(), "set_camera_mode");
    }

    fn set_matrix_mode(&self, _dev: &mut dyn GraphicsDevice, _mode: MatrixMode) {
        unsupported(self.kind(), "set_matrix_mode");
    }

    fn set_clip_plane(&self, _dev: &mut dyn GraphicsDevice, _index: u32, _plane: Option<Vec4>) {
        unsupported(self.kind(), "set_clip_plane");
    }

    fn set_static_model_matrix(&self, _dev: &mut dyn GraphicsDevice, _m: Mat4) {
        unsupported(self.kind(), "set_static_model_matrix");
    }

    fn setup_opaque_drawing(&mut self, dev: &mut dyn GraphicsDevice, env: &RenderEnv, deferred_pass: bool) {
        dev.submit(DeviceCommand::PushAttrib);
        dev.submit(DeviceCommand::PolygonMode(polygon_mode(env)));
        dev.submit(DeviceCommand::Enable(Capability::CullFace));
        if self.is_legacy() {
            dev.submit(DeviceCommand::Enable(Capability::AlphaTest));
            dev.submit(DeviceCommand::AlphaFunc { threshold: 0.5 });
        }
        self.enable(dev, env, deferred_pass, false);
    }

    fn reset_opaque_drawing(&mut self, dev: &mut dyn GraphicsDevice, env: &RenderEnv, deferred_pass: bool) {
        self.disable(dev, env, deferred_pass);
        dev.submit(DeviceCommand::PopAttrib);
    }

    fn setup_alpha_drawing(&mut self, dev: &mut dyn GraphicsDevice, env: &RenderEnv, deferred_pass: bool) {
        dev.submit(DeviceCommand::PushAttrib);
        dev.submit(DeviceCommand::PolygonMode(polygon_mode(env)));
        dev.submit(DeviceCommand::Enable(Capability::Blend));
        dev.submit(DeviceCommand::BlendFunc(BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha));
        dev.submit(DeviceCommand::DepthMask(false));
        if self.is_legacy() {
            dev.submit(DeviceCommand::Enable(Capability::AlphaTest));
            dev.submit(DeviceCommand::AlphaFunc { threshold: 0.1 });
        }
        self.enable(dev, env, deferred_pass, true);
    }

    fn reset_alpha_drawing(&mut self, dev: &mut dyn GraphicsDevice, env: &RenderEnv, deferred_pass: bool) {
        self.disable(dev, env, deferred_pass);
        dev.submit(DeviceCommand::DepthMask(true));
        dev.submit(DeviceCommand::PopAttrib);
    }
}

fn polygon_mode(env: &RenderEnv) -> PolygonMode {
    if env.wire_frame {
        PolygonMode::Line
    } else {
        PolygonMode::Fill
    }
}

fn unsupported(kind: DrawerKind, op: &str) {
    log::error!("[ModelDrawerState] {op} is not supported by the {kind} backend");
    debug_assert!(false, "{op} is not supported by the {kind} backend");
}

/// Lifecycle bookkeeping shared by all backends.
#[derive(Debug)]
struct StateCore {
    kind: DrawerKind,
    lifecycle: StateLifecycle,
}

impl StateCore {
    fn new(kind: DrawerKind) -> Self {
        Self {
            kind,
            lifecycle: StateLifecycle::Uninitialized,
        }
    }

    fn begin_enable(&mut self) -> bool {
        match self.lifecycle {
            StateLifecycle::Ready => {
                self.lifecycle = StateLifecycle::Enabled;
                true
            }
            StateLifecycle::Enabled => {
                debug_assert!(false, "{} backend enabled twice", self.kind);
                log::warn!("[ModelDrawerState] {} backend enabled twice", self.kind);
                false
            }
            other => {
                log::warn!("[ModelDrawerState] cannot enable {} backend in state {:?}", self.kind, other);
                false
            }
        }
    }

    fn begin_disable(&mut self) -> bool {
        if self.lifecycle == StateLifecycle::Enabled {
            self.lifecycle = StateLifecycle::Ready;
            return true;
        }
        debug_assert!(false, "{} backend disabled while not enabled", self.kind);
        log::warn!("[ModelDrawerState] {} backend disabled while {:?}", self.kind, self.lifecycle);
        false
    }
}

/// The four program variants of a shader backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramSlot {
    NoShadowStandard,
    ShadowedStandard,
    NoShadowDeferred,
    ShadowedDeferred,
}

impl ProgramSlot {
    pub const ALL: [ProgramSlot; 4] = [
        ProgramSlot::NoShadowStandard,
        ProgramSlot::ShadowedStandard,
        ProgramSlot::NoShadowDeferred,
        ProgramSlot::ShadowedDeferred,
    ];

    pub fn select(shadowed: bool, deferred: bool) -> Self {
        match (shadowed, deferred) {
            (false, false) => ProgramSlot::NoShadowStandard,
            (true, false) => ProgramSlot::ShadowedStandard,
            (false, true) => ProgramSlot::NoShadowDeferred,
            (true, true) => ProgramSlot::ShadowedDeferred,
        }
    }

    pub fn shadowed(self) -> bool {
        matches!(self, ProgramSlot::ShadowedStandard | ProgramSlot::ShadowedDeferred)
    }

    pub fn deferred(self) -> bool {
        matches!(self, ProgramSlot::NoShadowDeferred | ProgramSlot::ShadowedDeferred)
    }

    fn name(self) -> &'static str {
        match self {
            ProgramSlot::NoShadowStandard => "NoShadowStandard",
            ProgramSlot::ShadowedStandard => "ShadowedStandard",
            ProgramSlot::NoShadowDeferred => "NoShadowDeferred",
            ProgramSlot::ShadowedDeferred => "ShadowedDeferred",
        }
    }
}

#[derive(Debug)]
struct ProgramSet {
    prefix: &'static str,
    vertex: &'static str,
    fragment: &'static str,
    programs: [Option<ProgramId>; 4],
    /// Cleared on the first failure and never set again.
    valid: bool,
    built: bool,
}

impl ProgramSet {
    fn new(prefix: &'static str, vertex: &'static str, fragment: &'static str) -> Self {
        Self {
            prefix,
            vertex,
            fragment,
            programs: [None; 4],
            valid: true,
            built: false,
        }
    }

    fn create(&mut self, dev: &mut dyn GraphicsDevice, with_deferred: bool) -> bool {
        for (i, slot) in ProgramSlot::ALL.into_iter().enumerate() {
            if slot.deferred() && !with_deferred {
                continue;
            }
            let mut defines = Vec::new();
            if slot.shadowed() {
                defines.push("USE_SHADOWS".to_string());
            }
            if slot.deferred() {
                defines.push("DEFERRED_MODE".to_string());
            }
            let desc = ProgramDesc {
                name: format!("{}-{}", self.prefix, slot.name()),
                vertex: self.vertex,
                fragment: self.fragment,
                defines,
            };
            match dev.create_program(&desc) {
                Ok(id) => {
                    log::info!("[ModelDrawerState] created program {} ({:?})", desc.name, id);
                    self.programs[i] = Some(id);
                }
                Err(e) => {
                    log::error!("[ModelDrawerState] {e}");
                    self.valid = false;
                }
            }
        }
        self.built = true;
        self.is_valid()
    }

    fn destroy(&mut self, dev: &mut dyn GraphicsDevice) {
        for p in self.programs.iter_mut() {
            if let Some(id) = p.take() {
                dev.delete_program(id);
            }
        }
        self.built = false;
    }

    fn get(&self, slot: ProgramSlot) -> Option<ProgramId> {
        self.programs[slot as usize]
    }

    fn is_valid(&self) -> bool {
        self.built && self.valid
    }
}

/// Fixed-function backend. Always available.
#[derive(Debug)]
pub struct FfpState {
    core: StateCore,
    alpha_values: Vec4,
}

impl FfpState {
    pub fn new(alpha_values: Vec4) -> Self {
        Self {
            core: StateCore::new(DrawerKind::Ffp),
            alpha_values,
        }
    }
}

impl ModelDrawerState for FfpState {
    fn kind(&self) -> DrawerKind {
        DrawerKind::Ffp
    }

    fn can_enable(&self, _profile: &ShadingProfile) -> bool {
        true
    }

    fn can_draw_deferred(&self, _profile: &ShadingProfile) -> bool {
        false
    }

    fn is_legacy(&self) -> bool {
        true
    }

    fn is_valid(&self) -> bool {
        matches!(self.core.lifecycle, StateLifecycle::Ready | StateLifecycle::Enabled)
    }

    fn lifecycle(&self) -> StateLifecycle {
        self.core.lifecycle
    }

    fn init(&mut self, _dev: &mut dyn GraphicsDevice, _profile: &ShadingProfile) {
        self.core.lifecycle = StateLifecycle::Ready;
    }

    fn kill(&mut self, _dev: &mut dyn GraphicsDevice) {
        self.core.lifecycle = StateLifecycle::Dead;
    }

    fn reload_shaders(&mut self, _dev: &mut dyn GraphicsDevice, _profile: &ShadingProfile) -> bool {
        self.is_valid()
    }

    fn enable(&mut self, dev: &mut dyn GraphicsDevice, _env: &RenderEnv, deferred_pass: bool, alpha_pass: bool) {
        debug_assert!(!deferred_pass, "fixed-function backend cannot fill the geometry buffer");
        if !self.core.begin_enable() {
            return;
        }
        let alpha = if alpha_pass { self.alpha_values.x } else { 1.0 };
        dev.submit(DeviceCommand::Enable(Capability::Lighting));
        dev.submit(DeviceCommand::Enable(Capability::Light0));
        dev.submit(DeviceCommand::Color(Vec4::new(1.0, 1.0, 1.0, alpha)));
        dev.submit(DeviceCommand::TexCombiner(Combiner::TeamColorInterpolate));
        dev.submit(DeviceCommand::TexCombiner(Combiner::ReflectionAdd));
        enable_textures_common(dev);
    }

    fn disable(&mut self, dev: &mut dyn GraphicsDevice, _env: &RenderEnv, _deferred_pass: bool) {
        if !self.core.begin_disable() {
            return;
        }
        dev.submit(DeviceCommand::Disable(Capability::Lighting));
        dev.submit(DeviceCommand::Disable(Capability::Light0));
        dev.submit(DeviceCommand::TexCombiner(Combiner::Modulate));
        disable_textures_common(dev);
    }

    fn apply_team_color(&self, dev: &mut dyn GraphicsDevice, color: Vec4) {
        dev.submit(DeviceCommand::TexEnvColor(color.truncate().extend(1.0)));
        dev.submit(DeviceCommand::Color(Vec4::new(1.0, 1.0, 1.0, color.w)));
    }

    fn set_nano_color(&self, dev: &mut dyn GraphicsDevice, color: Vec4) {
        dev.submit(DeviceCommand::Color(color));
    }
}

/// GLSL backend: one program per shadow/deferred variant, per-object draws.
#[derive(Debug)]
pub struct GlslState {
    core: StateCore,
    programs: ProgramSet,
    active: Option<ProgramSlot>,
}

impl GlslState {
    pub fn new() -> Self {
        Self {
            core: StateCore::new(DrawerKind::Glsl),
            programs: ProgramSet::new("ModelShaderGLSL", "GLSL/ModelVertProg.glsl", "GLSL/ModelFragProg.glsl"),
            active: None,
        }
    }

    pub fn active_slot(&self) -> Option<ProgramSlot> {
        self.active
    }
}

impl Default for GlslState {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelDrawerState for GlslState {
    fn kind(&self) -> DrawerKind {
        DrawerKind::Glsl
    }

    fn can_enable(&self, profile: &ShadingProfile) -> bool {
        profile.adv_shading && profile.have_glsl
    }

    fn can_draw_deferred(&self, profile: &ShadingProfile) -> bool {
        self.can_enable(profile) && profile.deferred_allowed && self.programs.get(ProgramSlot::NoShadowDeferred).is_some()
    }

    fn is_legacy(&self) -> bool {
        false
    }

    fn is_valid(&self) -> bool {
        self.core.lifecycle != StateLifecycle::Dead && self.programs.is_valid()
    }

    fn lifecycle(&self) -> StateLifecycle {
        self.core.lifecycle
    }

    fn init(&mut self, dev: &mut dyn GraphicsDevice, profile: &ShadingProfile) {
        self.programs.create(dev, profile.deferred_allowed);
        self.core.lifecycle = StateLifecycle::Ready;
    }

    fn kill(&mut self, dev: &mut dyn GraphicsDevice) {
        self.programs.destroy(dev);
        self.core.lifecycle = StateLifecycle::Dead;
    }

    fn reload_shaders(&mut self, dev: &mut dyn GraphicsDevice, profile: &ShadingProfile) -> bool {
        self.programs.destroy(dev);
        self.programs.create(dev, profile.deferred_allowed)
    }

    fn enable(&mut self, dev: &mut dyn GraphicsDevice, env: &RenderEnv, deferred_pass: bool, alpha_pass: bool) {
        if !self.core.begin_enable() {
            return;
        }
        let slot = ProgramSlot::select(env.shadows_loaded, deferred_pass);
        self.active = Some(slot);
        let Some(program) = self.programs.get(slot) else {
            log::error!("[GlslState] no program for {:?}", slot);
            return;
        };

        let camera = env.active_camera();
        dev.submit(DeviceCommand::BindProgram(program));
        dev.submit(DeviceCommand::Uniform {
            name: "cameraPos",
            value: UniformValue::Vec3(camera.position()),
        });
        dev.submit(DeviceCommand::Uniform {
            name: "cameraMat",
            value: UniformValue::Mat4(camera.view_matrix()),
        });
        dev.submit(DeviceCommand::Uniform {
            name: "alphaPass",
            value: UniformValue::Float(if alpha_pass { 1.0 } else { 0.0 }),
        });
        if slot.shadowed() {
            let shadow_cam = env.cameras.get(crate::camera::CameraType::Shadow);
            dev.submit(DeviceCommand::Uniform {
                name: "shadowMatrix",
                value: UniformValue::Mat4(shadow_cam.view_projection_matrix()),
            });
            dev.submit(DeviceCommand::BindShadowTexture);
        }
        enable_textures_common(dev);
    }

    fn disable(&mut self, dev: &mut dyn GraphicsDevice, _env: &RenderEnv, _deferred_pass: bool) {
        if !self.core.begin_disable() {
            return;
        }
        if let Some(slot) = self.active.take() {
            if slot.shadowed() {
                dev.submit(DeviceCommand::UnbindShadowTexture);
            }
            if self.programs.get(slot).is_some() {
                dev.submit(DeviceCommand::UnbindProgram);
            }
        }
        disable_textures_common(dev);
    }

    fn apply_team_color(&self, dev: &mut dyn GraphicsDevice, color: Vec4) {
        dev.submit(DeviceCommand::Uniform {
            name: "teamColor",
            value: UniformValue::Vec4(color),
        });
    }

    fn set_nano_color(&self, dev: &mut dyn GraphicsDevice, color: Vec4) {
        dev.submit(DeviceCommand::Uniform {
            name: "nanoColor",
            value: UniformValue::Vec4(color),
        });
    }
}

const GL4_CLIP_PLANES: [&str; 3] = ["clipPlane0", "clipPlane1", "clipPlane2"];

/// Batched backend: objects reference their arena offsets, a draw is one submission.
#[derive(Debug)]
pub struct Gl4State {
    core: StateCore,
    programs: ProgramSet,
    active: Option<ProgramSlot>,
}

impl Gl4State {
    pub fn new() -> Self {
        Self {
            core: StateCore::new(DrawerKind::Gl4),
            programs: ProgramSet::new("ModelShaderGL4", "GLSL/ModelVertProgGL4.glsl", "GLSL/ModelFragProgGL4.glsl"),
            active: None,
        }
    }

    fn uniform(dev: &mut dyn GraphicsDevice, name: &'static str, value: UniformValue) {
        dev.submit(DeviceCommand::Uniform { name, value });
    }
}

impl Default for Gl4State {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelDrawerState for Gl4State {
    fn kind(&self) -> DrawerKind {
        DrawerKind::Gl4
    }

    fn can_enable(&self, profile: &ShadingProfile) -> bool {
        profile.adv_shading && profile.have_gl4
    }

    fn can_draw_deferred(&self, profile: &ShadingProfile) -> bool {
        self.can_enable(profile) && profile.deferred_allowed && self.programs.get(ProgramSlot::NoShadowDeferred).is_some()
    }

    fn is_legacy(&self) -> bool {
        false
    }

    fn is_valid(&self) -> bool {
        self.core.lifecycle != StateLifecycle::Dead && self.programs.is_valid()
    }

    fn lifecycle(&self) -> StateLifecycle {
        self.core.lifecycle
    }

    fn init(&mut self, dev: &mut dyn GraphicsDevice, profile: &ShadingProfile) {
        self.programs.create(dev, profile.deferred_allowed);
        self.core.lifecycle = StateLifecycle::Ready;
    }

    fn kill(&mut self, dev: &mut dyn GraphicsDevice) {
        self.programs.destroy(dev);
        self.core.lifecycle = StateLifecycle::Dead;
    }

    fn reload_shaders(&mut self, dev: &mut dyn GraphicsDevice, profile: &ShadingProfile) -> bool {
        self.programs.destroy(dev);
        self.programs.create(dev, profile.deferred_allowed)
    }

    fn enable(&mut self, dev: &mut dyn GraphicsDevice, env: &RenderEnv, deferred_pass: bool, alpha_pass: bool) {
        if !self.core.begin_enable() {
            return;
        }
        let slot = ProgramSlot::select(env.shadows_loaded, deferred_pass);
        self.active = Some(slot);
        let Some(program) = self.programs.get(slot) else {
            log::error!("[Gl4State] no program for {:?}", slot);
            return;
        };

        dev.submit(DeviceCommand::BindProgram(program));
        self.set_camera_mode(dev, env.draw_mode);
        let threshold = if alpha_pass { 0.1 } else { 0.5 };
        Self::uniform(dev, "alphaCtrl", UniformValue::Vec4(Vec4::new(threshold, 1.0, 0.0, 0.0)));
        self.set_color_multiplier(dev, Vec4::ONE);
        self.set_matrix_mode(dev, MatrixMode::Dynamic);
        self.set_clip_plane(dev, 0, None);
        self.set_clip_plane(dev, 1, None);
        if slot.shadowed() {
            dev.submit(DeviceCommand::BindShadowTexture);
        }
        enable_textures_common(dev);
    }

    fn disable(&mut self, dev: &mut dyn GraphicsDevice, _env: &RenderEnv, _deferred_pass: bool) {
        if !self.core.begin_disable() {
            return;
        }
        if let Some(slot) = self.active.take() {
            if slot.shadowed() {
                dev.submit(DeviceCommand::UnbindShadowTexture);
            }
            if self.programs.get(slot).is_some() {
                dev.submit(DeviceCommand::UnbindProgram);
            }
        }
        disable_textures_common(dev);
    }

    fn apply_team_color(&self, dev: &mut dyn GraphicsDevice, color: Vec4) {
        Self::uniform(dev, "teamColor", UniformValue::Vec4(color));
    }

    fn set_nano_color(&self, dev: &mut dyn GraphicsDevice, color: Vec4) {
        Self::uniform(dev, "nanoColor", UniformValue::Vec4(color));
    }

    fn set_color_multiplier(&self, dev: &mut dyn GraphicsDevice, mult: Vec4) {
        Self::uniform(dev, "colorMult", UniformValue::Vec4(mult));
    }

    /// Each camera mode implies its own water clip plane in slot 2.
    fn set_camera_mode(&self, dev: &mut dyn GraphicsDevice, mode: DrawMode) {
        let (index, plane) = match mode {
            DrawMode::Normal => (0, None),
            DrawMode::Reflection => (1, Some(Vec4::new(0.0, 1.0, 0.0, 0.0))),
            DrawMode::Refraction => (2, Some(Vec4::new(0.0, -1.0, 0.0, 0.0))),
        };
        Self::uniform(dev, "cameraMode", UniformValue::Int(index));
        self.set_clip_plane(dev, 2, plane);
    }

    fn set_matrix_mode(&self, dev: &mut dyn GraphicsDevice, mode: MatrixMode) {
        let value = match mode {
            MatrixMode::Dynamic => 0,
            MatrixMode::Static => 1,
        };
        Self::uniform(dev, "matrixMode", UniformValue::Int(value));
    }

    fn set_clip_plane(&self, dev: &mut dyn GraphicsDevice, index: u32, plane: Option<Vec4>) {
        let Some(name) = GL4_CLIP_PLANES.get(index as usize) else {
            log::error!("[Gl4State] clip plane index {index} out of range");
            debug_assert!(false, "clip plane index {index} out of range");
            return;
        };
        // A zero plane passes every fragment.
        Self::uniform(dev, name, UniformValue::Vec4(plane.unwrap_or(Vec4::ZERO)));
    }

    fn set_static_model_matrix(&self, dev: &mut dyn GraphicsDevice, m: Mat4) {
        Self::uniform(dev, "staticModelMatrix", UniformValue::Mat4(m));
    }
}

/// Backends available for a profile, indexed by [`DrawerKind::index`].
pub fn create_states(profile: &ShadingProfile, alpha_values: Vec4) -> [Option<Box<dyn ModelDrawerState>>; DrawerKind::COUNT] {
    let ffp: Box<dyn ModelDrawerState> = Box::new(FfpState::new(alpha_values));
    let glsl = profile.have_glsl.then(|| Box::new(GlslState::new()) as Box<dyn ModelDrawerState>);
    let gl4 = profile.have_gl4.then(|| Box::new(Gl4State::new()) as Box<dyn ModelDrawerState>);
    [Some(ffp), glsl, gl4]
}

/// Nano colour of the default build effect.
pub const DEFAULT_NANO_COLOR: Vec3 = Vec3::new(0.2, 0.8, 0.2);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::RecordingDevice;

    fn ready<S: ModelDrawerState>(mut state: S, dev: &mut RecordingDevice, profile: &ShadingProfile) -> S {
        state.init(dev, profile);
        state
    }

    fn teams() -> TeamTable {
        let mut t = TeamTable::new();
        t.add_team([255, 0, 0, 255], 0);
        t
    }

    #[test]
    fn only_fixed_function_is_legacy() {
        assert!(FfpState::new(Vec4::ONE).is_legacy());
        assert!(!GlslState::new().is_legacy());
        assert!(!Gl4State::new().is_legacy());
    }

    #[test]
    fn glsl_builds_four_programs_with_deferred() {
        let mut dev = RecordingDevice::new();
        let s = ready(GlslState::new(), &mut dev, &ShadingProfile::full());
        assert!(s.is_valid());
        assert_eq!(dev.programs_created, 4);
        assert!(s.can_draw_deferred(&ShadingProfile::full()));
    }

    #[test]
    fn deferred_programs_skipped_when_not_allowed() {
        let mut dev = RecordingDevice::new();
        let profile = ShadingProfile::default();
        let s = ready(Gl4State::new(), &mut dev, &profile);
        assert_eq!(dev.programs_created, 2);
        assert!(s.is_valid());
        assert!(!s.can_draw_deferred(&profile));
    }

    #[test]
    fn one_failing_program_invalidates_backend() {
        let mut dev = RecordingDevice::new();
        dev.fail_programs_matching("ModelShaderGL4-ShadowedStandard");
        let s = ready(Gl4State::new(), &mut dev, &ShadingProfile::full());
        assert!(!s.is_valid());
    }

    #[test]
    fn failed_reload_invalidates_for_the_session() {
        let mut dev = RecordingDevice::new();
        let profile = ShadingProfile::full();
        let mut s = ready(Gl4State::new(), &mut dev, &profile);
        assert!(s.is_valid());

        dev.fail_programs_matching("GL4");
        assert!(!s.reload_shaders(&mut dev, &profile));
        dev.heal_programs();
        assert!(!s.reload_shaders(&mut dev, &profile));
        assert!(!s.is_valid());
    }

    #[test]
    fn uninitialized_shader_backend_is_invalid() {
        assert!(!GlslState::new().is_valid());
        assert!(!FfpState::new(Vec4::ONE).is_valid());
    }

    #[test]
    fn enable_picks_program_by_shadow_and_deferred() {
        let mut dev = RecordingDevice::new();
        let mut s = ready(GlslState::new(), &mut dev, &ShadingProfile::full());
        let env = RenderEnv {
            shadows_loaded: true,
            ..Default::default()
        };
        s.enable(&mut dev, &env, true, false);
        assert_eq!(s.active_slot(), Some(ProgramSlot::ShadowedDeferred));
        assert!(dev.contains(&DeviceCommand::BindShadowTexture));
        s.disable(&mut dev, &env, true);
        assert!(dev.contains(&DeviceCommand::UnbindShadowTexture));
        assert_eq!(s.lifecycle(), StateLifecycle::Ready);
    }

    #[test]
    fn team_color_fails_in_shadow_pass_and_for_unknown_team() {
        let mut dev = RecordingDevice::new();
        let s = ready(GlslState::new(), &mut dev, &ShadingProfile::full());
        let teams = teams();
        let env = RenderEnv::default();
        let shadow_env = env.for_pass(DrawMode::Normal, true);
        dev.clear();

        assert!(!s.set_team_color(&mut dev, &shadow_env, &teams, 0, 1.0));
        assert!(!s.set_team_color(&mut dev, &env, &teams, 9, 1.0));
        assert!(dev.commands.is_empty());

        assert!(s.set_team_color(&mut dev, &env, &teams, 0, 0.5));
        assert_eq!(
            dev.commands,
            vec![DeviceCommand::Uniform {
                name: "teamColor",
                value: UniformValue::Vec4(Vec4::new(1.0, 0.0, 0.0, 0.5)),
            }]
        );
    }

    #[test]
    fn gl4_reflection_mode_sets_water_clip_plane() {
        let mut dev = RecordingDevice::new();
        let mut s = ready(Gl4State::new(), &mut dev, &ShadingProfile::default());
        let env = RenderEnv::default().for_pass(DrawMode::Reflection, false);
        s.enable(&mut dev, &env, false, true);
        assert!(dev.contains(&DeviceCommand::Uniform {
            name: "clipPlane2",
            value: UniformValue::Vec4(Vec4::new(0.0, 1.0, 0.0, 0.0)),
        }));
        assert!(dev.contains(&DeviceCommand::Uniform {
            name: "alphaCtrl",
            value: UniformValue::Vec4(Vec4::new(0.1, 1.0, 0.0, 0.0)),
        }));
        s.disable(&mut dev, &env, false);
    }

    #[test]
    fn ffp_alpha_pass_uses_cloak_alpha() {
        let mut dev = RecordingDevice::new();
        let mut s = ready(FfpState::new(Vec4::new(0.3, 0.4, 0.5, 0.7)), &mut dev, &ShadingProfile::default());
        let env = RenderEnv::default();
        s.setup_alpha_drawing(&mut dev, &env, false);
        assert!(dev.contains(&DeviceCommand::Color(Vec4::new(1.0, 1.0, 1.0, 0.3))));
        assert!(dev.contains(&DeviceCommand::AlphaFunc { threshold: 0.1 }));
        s.reset_alpha_drawing(&mut dev, &env, false);
        assert_eq!(dev.commands.last(), Some(&DeviceCommand::PopAttrib));
    }

    #[test]
    fn opaque_setup_follows_wireframe_toggle() {
        let mut dev = RecordingDevice::new();
        let mut s = ready(Gl4State::new(), &mut dev, &ShadingProfile::default());
        let env = RenderEnv {
            wire_frame: true,
            ..Default::default()
        };
        s.setup_opaque_drawing(&mut dev, &env, false);
        assert!(dev.contains(&DeviceCommand::PolygonMode(PolygonMode::Line)));
        // Shader backends do their own alpha testing.
        assert!(!dev.contains(&DeviceCommand::Enable(Capability::AlphaTest)));
        s.reset_opaque_drawing(&mut dev, &env, false);
    }

    #[test]
    fn states_follow_profile() {
        let profile = ShadingProfile {
            have_gl4: false,
            ..ShadingProfile::full()
        };
        let states = create_states(&profile, Vec4::ONE);
        assert!(states[DrawerKind::Ffp.index()].is_some());
        assert!(states[DrawerKind::Glsl.index()].is_some());
        assert!(states[DrawerKind::Gl4.index()].is_none());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "not supported")]
    fn batched_only_operations_fail_loudly_elsewhere() {
        let mut dev = RecordingDevice::new();
        let s = ready(GlslState::new(), &mut dev, &ShadingProfile::default());
        s.set_matrix_mode(&mut dev, MatrixMode::Static);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "enabled twice")]
    fn double_enable_is_a_contract_violation() {
        let mut dev = RecordingDevice::new();
        let mut s = ready(FfpState::new(Vec4::ONE), &mut dev, &ShadingProfile::default());
        let env = RenderEnv::default();
        s.enable(&mut dev, &env, false, false);
        s.enable(&mut dev, &env, false, false);
    }
}

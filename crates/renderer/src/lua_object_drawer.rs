//! Script-assigned custom materials.
//!
//! An object with a material for the current pass and LOD is pulled out of
//! the engine bins during the per-object test and queued into its material's
//! bin instead. After the engine has drawn its bins, every material bin is
//! drawn with the material state applied once and the objects grouped by team.

use std::collections::{BTreeMap, HashMap, HashSet};

use glam::Vec3;
use hecs::Entity;

use crate::config::{reciprocal_lod_scale, DrawerConfig};
use crate::device::{BlendFactor, Capability, DeviceCommand, GraphicsDevice, ProgramId, UniformValue};
use crate::env::{DrawMode, RenderEnv};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LuaObjType {
    Unit,
    Feature,
}

impl LuaObjType {
    pub const COUNT: usize = 2;

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Pass a material variant is used in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LuaMatType {
    Opaque,
    OpaqueReflect,
    Alpha,
    AlphaReflect,
    Shadow,
    Deferred,
}

impl LuaMatType {
    pub const COUNT: usize = 6;

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn is_alpha(self) -> bool {
        matches!(self, LuaMatType::Alpha | LuaMatType::AlphaReflect)
    }

    /// Opaque variant for a pass.
    pub fn opaque(env: &RenderEnv, deferred_pass: bool) -> Self {
        if deferred_pass {
            LuaMatType::Deferred
        } else if env.draw_mode == DrawMode::Reflection {
            LuaMatType::OpaqueReflect
        } else {
            LuaMatType::Opaque
        }
    }

    pub fn alpha(env: &RenderEnv) -> Self {
        if env.draw_mode == DrawMode::Reflection {
            LuaMatType::AlphaReflect
        } else {
            LuaMatType::Alpha
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(pub u32);

/// GPU state of one material. Applying it only touches what differs from the previous one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LuaMaterial {
    pub program: Option<ProgramId>,
    /// `(unit, texture)` pairs.
    pub textures: Vec<(u32, u32)>,
    pub cull_face: Option<bool>,
    pub uniforms: Vec<(&'static str, UniformValue)>,
}

impl LuaMaterial {
    pub fn execute(&self, prev: &LuaMaterial, dev: &mut dyn GraphicsDevice) {
        if self.program != prev.program {
            match self.program {
                Some(p) => dev.submit(DeviceCommand::BindProgram(p)),
                None => dev.submit(DeviceCommand::UnbindProgram),
            }
        }
        for &(unit, texture) in &self.textures {
            if !prev.textures.contains(&(unit, texture)) {
                dev.submit(DeviceCommand::BindTexture { unit, texture });
            }
        }
        if self.cull_face != prev.cull_face {
            match self.cull_face {
                Some(true) => dev.submit(DeviceCommand::Enable(Capability::CullFace)),
                Some(false) => dev.submit(DeviceCommand::Disable(Capability::CullFace)),
                None => {}
            }
        }
        for &(name, value) in &self.uniforms {
            dev.submit(DeviceCommand::Uniform { name, value });
        }
    }
}

/// Material of one LOD level, with optional display lists around the draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LodMaterial {
    pub material: MaterialId,
    pub pre_list: Option<u32>,
    pub post_list: Option<u32>,
}

impl LodMaterial {
    pub fn new(material: MaterialId) -> Self {
        Self {
            material,
            pre_list: None,
            post_list: None,
        }
    }
}

/// Materials of one object per pass type and LOD level.
#[derive(Debug, Clone)]
pub struct LuaObjectMaterialData {
    pub obj_type: LuaObjType,
    /// Ascending distances at which each LOD level starts.
    lod_lengths: Vec<f32>,
    materials: [Vec<Option<LodMaterial>>; LuaMatType::COUNT],
}

impl LuaObjectMaterialData {
    pub fn new(obj_type: LuaObjType) -> Self {
        Self {
            obj_type,
            lod_lengths: vec![0.0],
            materials: Default::default(),
        }
    }

    pub fn lod_count(&self) -> usize {
        self.lod_lengths.len()
    }

    /// Highest LOD whose start distance `dist` has reached; 0 if none.
    pub fn lod_for_distance(&self, dist: f32) -> usize {
        self.lod_lengths.iter().rposition(|&len| dist >= len).unwrap_or(0)
    }

    pub fn material(&self, mat_type: LuaMatType, lod: usize) -> Option<&LodMaterial> {
        self.materials[mat_type.index()].get(lod).and_then(Option::as_ref)
    }

    pub fn has_any_material(&self) -> bool {
        self.materials.iter().any(|m| m.iter().any(Option::is_some))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BinEntry {
    entity: Entity,
    team: usize,
    lod: usize,
    pre_list: Option<u32>,
    post_list: Option<u32>,
}

type MaterialBins = BTreeMap<MaterialId, Vec<BinEntry>>;

/// Engine side of material drawing: team colour and the object draw itself.
pub trait MaterialObjectSink {
    fn set_team_color(&mut self, dev: &mut dyn GraphicsDevice, team: usize);
    fn draw_object(&mut self, dev: &mut dyn GraphicsDevice, entity: Entity, lod: usize) -> bool;
}

pub struct LuaObjectDrawer {
    materials: Vec<LuaMaterial>,
    object_data: HashMap<Entity, LuaObjectMaterialData>,
    /// Objects a script draws itself through the per-object draw event.
    lua_draw: HashSet<Entity>,
    bins: [[MaterialBins; LuaMatType::COUNT]; LuaObjType::COUNT],
    lod_scale: f32,
    lod_scale_shadow: f32,
    lod_scale_reflection: f32,
    lod_scale_refraction: f32,
    global_lod_factor: [f32; LuaObjType::COUNT],
    deferred_allowed: bool,
    buffer_clear_allowed: bool,
    geometry_buffer_valid: bool,
    last_clear_frame: Option<u64>,
}

impl LuaObjectDrawer {
    pub fn new(config: &DrawerConfig) -> Self {
        Self {
            materials: Vec::new(),
            object_data: HashMap::new(),
            lua_draw: HashSet::new(),
            bins: Default::default(),
            lod_scale: reciprocal_lod_scale(config.lod_scale),
            lod_scale_shadow: reciprocal_lod_scale(config.lod_scale_shadow),
            lod_scale_reflection: reciprocal_lod_scale(config.lod_scale_reflection),
            lod_scale_refraction: reciprocal_lod_scale(config.lod_scale_refraction),
            global_lod_factor: [1.0; LuaObjType::COUNT],
            deferred_allowed: config.allow_deferred_model_rendering,
            buffer_clear_allowed: config.allow_deferred_model_buffer_clear,
            geometry_buffer_valid: false,
            last_clear_frame: None,
        }
    }

    pub fn register_material(&mut self, material: LuaMaterial) -> MaterialId {
        self.materials.push(material);
        MaterialId(self.materials.len() as u32 - 1)
    }

    pub fn material(&self, id: MaterialId) -> Option<&LuaMaterial> {
        self.materials.get(id.0 as usize)
    }

    /// Set the LOD start distances of an object. Materials beyond the new count are dropped.
    pub fn set_lod_lengths(&mut self, entity: Entity, obj_type: LuaObjType, mut lengths: Vec<f32>) {
        if lengths.is_empty() {
            lengths.push(0.0);
        }
        let data = self
            .object_data
            .entry(entity)
            .or_insert_with(|| LuaObjectMaterialData::new(obj_type));
        for mats in data.materials.iter_mut() {
            mats.truncate(lengths.len());
        }
        data.lod_lengths = lengths;
    }

    /// Assign a material to one pass type and LOD of an object. Fails for unknown
    /// materials and out-of-range LODs.
    pub fn set_object_material(
        &mut self,
        entity: Entity,
        obj_type: LuaObjType,
        mat_type: LuaMatType,
        lod: usize,
        material: LodMaterial,
    ) -> bool {
        if self.material(material.material).is_none() {
            log::warn!("[LuaObjectDrawer] unknown material {:?} for {entity:?}", material.material);
            return false;
        }
        let data = self
            .object_data
            .entry(entity)
            .or_insert_with(|| LuaObjectMaterialData::new(obj_type));
        if lod >= data.lod_count() {
            return false;
        }
        let mats = &mut data.materials[mat_type.index()];
        if mats.len() <= lod {
            mats.resize(lod + 1, None);
        }
        mats[lod] = Some(material);
        true
    }

    pub fn clear_object_material(&mut self, entity: Entity) -> bool {
        self.object_data.remove(&entity).is_some()
    }

    pub fn material_data(&self, entity: Entity) -> Option<&LuaObjectMaterialData> {
        self.object_data.get(&entity)
    }

    pub fn set_lua_draw(&mut self, entity: Entity, enabled: bool) {
        if enabled {
            self.lua_draw.insert(entity);
        } else {
            self.lua_draw.remove(&entity);
        }
    }

    pub fn has_lua_draw(&self, entity: Entity) -> bool {
        self.lua_draw.contains(&entity)
    }

    /// Forget everything about a destroyed object, including queued draws.
    pub fn object_destroyed(&mut self, entity: Entity) {
        self.object_data.remove(&entity);
        self.lua_draw.remove(&entity);
        for per_type in self.bins.iter_mut() {
            for bins in per_type.iter_mut() {
                for entries in bins.values_mut() {
                    entries.retain(|e| e.entity != entity);
                }
                bins.retain(|_, entries| !entries.is_empty());
            }
        }
    }

    /// Pick the LOD factor of the pass being drawn.
    pub fn set_draw_pass_global_lod_factor(&mut self, obj_type: LuaObjType, env: &RenderEnv) {
        let scale = if env.in_shadow_pass {
            self.lod_scale_shadow
        } else {
            match env.draw_mode {
                DrawMode::Reflection => self.lod_scale_reflection,
                DrawMode::Refraction => self.lod_scale_refraction,
                DrawMode::Normal => self.lod_scale,
            }
        };
        self.global_lod_factor[obj_type.index()] = scale * env.lpp_scale;
    }

    pub fn global_lod_factor(&self, obj_type: LuaObjType) -> f32 {
        self.global_lod_factor[obj_type.index()]
    }

    pub fn add_opaque_material_object(
        &mut self,
        entity: Entity,
        team: usize,
        position: Vec3,
        obj_type: LuaObjType,
        env: &RenderEnv,
        deferred_pass: bool,
    ) -> bool {
        let mat_type = LuaMatType::opaque(env, deferred_pass);
        self.add_object_for_lod(entity, team, position, obj_type, mat_type, env)
    }

    pub fn add_alpha_material_object(&mut self, entity: Entity, team: usize, position: Vec3, obj_type: LuaObjType, env: &RenderEnv) -> bool {
        self.add_object_for_lod(entity, team, position, obj_type, LuaMatType::alpha(env), env)
    }

    pub fn add_shadow_material_object(&mut self, entity: Entity, team: usize, position: Vec3, obj_type: LuaObjType, env: &RenderEnv) -> bool {
        self.add_object_for_lod(entity, team, position, obj_type, LuaMatType::Shadow, env)
    }

    fn add_object_for_lod(
        &mut self,
        entity: Entity,
        team: usize,
        position: Vec3,
        obj_type: LuaObjType,
        mat_type: LuaMatType,
        env: &RenderEnv,
    ) -> bool {
        let Some(data) = self.object_data.get(&entity) else {
            return false;
        };
        let dist = env.active_camera().projected_distance(position) * self.global_lod_factor[obj_type.index()];
        let lod = data.lod_for_distance(dist);
        let Some(mat) = data.material(mat_type, lod) else {
            return false;
        };
        self.bins[obj_type.index()][mat_type.index()]
            .entry(mat.material)
            .or_default()
            .push(BinEntry {
                entity,
                team,
                lod,
                pre_list: mat.pre_list,
                post_list: mat.post_list,
            });
        true
    }

    /// Objects queued for one pass type, in material order.
    pub fn queued_objects(&self, obj_type: LuaObjType, mat_type: LuaMatType) -> Vec<Entity> {
        self.bins[obj_type.index()][mat_type.index()]
            .values()
            .flatten()
            .map(|e| e.entity)
            .collect()
    }

    pub fn draw_opaque_material_objects(
        &mut self,
        dev: &mut dyn GraphicsDevice,
        obj_type: LuaObjType,
        env: &RenderEnv,
        deferred_pass: bool,
        sink: &mut dyn MaterialObjectSink,
    ) -> usize {
        self.draw_material_bins(dev, obj_type, LuaMatType::opaque(env, deferred_pass), sink)
    }

    pub fn draw_alpha_material_objects(
        &mut self,
        dev: &mut dyn GraphicsDevice,
        obj_type: LuaObjType,
        env: &RenderEnv,
        sink: &mut dyn MaterialObjectSink,
    ) -> usize {
        self.draw_material_bins(dev, obj_type, LuaMatType::alpha(env), sink)
    }

    pub fn draw_shadow_material_objects(
        &mut self,
        dev: &mut dyn GraphicsDevice,
        obj_type: LuaObjType,
        sink: &mut dyn MaterialObjectSink,
    ) -> usize {
        self.draw_material_bins(dev, obj_type, LuaMatType::Shadow, sink)
    }

    fn draw_material_bins(
        &mut self,
        dev: &mut dyn GraphicsDevice,
        obj_type: LuaObjType,
        mat_type: LuaMatType,
        sink: &mut dyn MaterialObjectSink,
    ) -> usize {
        let bins = std::mem::take(&mut self.bins[obj_type.index()][mat_type.index()]);
        if bins.is_empty() {
            return 0;
        }

        dev.submit(DeviceCommand::PushAttrib);
        dev.submit(DeviceCommand::Enable(Capability::AlphaTest));
        if mat_type.is_alpha() {
            dev.submit(DeviceCommand::AlphaFunc { threshold: 0.1 });
            dev.submit(DeviceCommand::Enable(Capability::Blend));
            dev.submit(DeviceCommand::BlendFunc(BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha));
        } else {
            dev.submit(DeviceCommand::AlphaFunc { threshold: 0.5 });
        }

        let default_mat = LuaMaterial::default();
        let mut current = &default_mat;
        let mut drawn = 0;
        for (id, mut entries) in bins {
            let Some(material) = self.materials.get(id.0 as usize) else {
                continue;
            };
            material.execute(current, dev);
            current = material;

            // Grouped by team so the colour is only set when it changes.
            entries.sort_by_key(|e| e.team);
            let mut last_team = None;
            for entry in entries {
                if last_team != Some(entry.team) {
                    sink.set_team_color(dev, entry.team);
                    last_team = Some(entry.team);
                }
                if let Some(list) = entry.pre_list {
                    dev.submit(DeviceCommand::CallList(list));
                }
                if sink.draw_object(dev, entry.entity, entry.lod) {
                    drawn += 1;
                }
                if let Some(list) = entry.post_list {
                    dev.submit(DeviceCommand::CallList(list));
                }
            }
        }
        default_mat.execute(current, dev);
        dev.submit(DeviceCommand::PopAttrib);
        drawn
    }

    /// Draw one object through its opaque material at the normal LOD scale.
    /// Returns false if it has none, so the caller can draw it plainly.
    pub fn draw_single_object(
        &mut self,
        dev: &mut dyn GraphicsDevice,
        entity: Entity,
        team: usize,
        position: Vec3,
        env: &RenderEnv,
        sink: &mut dyn MaterialObjectSink,
    ) -> bool {
        let Some(data) = self.object_data.get(&entity) else {
            return false;
        };
        let obj_type = data.obj_type;
        self.global_lod_factor[obj_type.index()] = self.lod_scale * env.lpp_scale;
        let dist = env.active_camera().projected_distance(position) * self.global_lod_factor[obj_type.index()];
        let lod = data.lod_for_distance(dist);
        let Some(lod_mat) = data.material(LuaMatType::opaque(env, false), lod) else {
            return false;
        };
        let Some(material) = self.materials.get(lod_mat.material.0 as usize) else {
            return false;
        };

        let default_mat = LuaMaterial::default();
        material.execute(&default_mat, dev);
        sink.set_team_color(dev, team);
        if let Some(list) = lod_mat.pre_list {
            dev.submit(DeviceCommand::CallList(list));
        }
        sink.draw_object(dev, entity, lod);
        if let Some(list) = lod_mat.post_list {
            dev.submit(DeviceCommand::CallList(list));
        }
        default_mat.execute(material, dev);
        true
    }

    pub fn set_geometry_buffer_valid(&mut self, valid: bool) {
        self.geometry_buffer_valid = valid;
    }

    /// Whether a deferred pass can run at all this frame.
    pub fn draw_deferred_enabled(&self) -> bool {
        self.deferred_allowed && self.geometry_buffer_valid
    }

    pub fn set_deferred_allowed(&mut self, allowed: bool) {
        self.deferred_allowed = allowed;
    }

    /// Whether the deferred pass about to run clears the buffer. Only the first
    /// object type to draw deferred in a frame clears, unless clearing is allowed.
    pub fn take_buffer_clear(&mut self, draw_frame: u64) -> bool {
        let clear = self.buffer_clear_allowed || self.last_clear_frame != Some(draw_frame);
        if clear {
            self.last_clear_frame = Some(draw_frame);
        }
        clear
    }
}

//! The graphics device the drawers submit state changes and draws to.
//!
//! Backends never talk to a GPU API directly; every state change is a
//! [`DeviceCommand`]. [`RecordingDevice`] keeps the command stream in memory,
//! which is what the headless driver and the tests render into.

use std::collections::HashSet;

use engine_core::ModelType;
use glam::{Mat4, Vec3, Vec4};
use hecs::Entity;

use crate::error::{RenderError, Result};

/// Handle of a linked shader program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(pub u32);

/// Source description of a shader program.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramDesc {
    pub name: String,
    pub vertex: &'static str,
    pub fragment: &'static str,
    pub defines: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    CullFace,
    Blend,
    AlphaTest,
    DepthTest,
    Lighting,
    Light0,
    Texture2D,
    ClipPlane(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolygonMode {
    Fill,
    Line,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendFactor {
    One,
    Zero,
    SrcAlpha,
    OneMinusSrcAlpha,
}

/// Fixed-function texture combiner setups used by the legacy backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combiner {
    /// Unit 0 modulates diffuse by the team colour.
    TeamColorInterpolate,
    /// Unit 1 adds the reflection cube map.
    ReflectionAdd,
    /// Everything back to plain modulate.
    Modulate,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Int(i32),
    Float(f32),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat4(Mat4),
}

/// One state change or draw submitted to the device.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCommand {
    PushAttrib,
    PopAttrib,
    Enable(Capability),
    Disable(Capability),
    PolygonMode(PolygonMode),
    AlphaFunc { threshold: f32 },
    BlendFunc(BlendFactor, BlendFactor),
    DepthMask(bool),
    Color(Vec4),
    /// Constant colour the legacy combiners blend the team colour from.
    TexEnvColor(Vec4),
    TexCombiner(Combiner),
    BindProgram(ProgramId),
    UnbindProgram,
    Uniform { name: &'static str, value: UniformValue },
    BindTexture { unit: u32, texture: u32 },
    BindModelTexture { model_type: ModelType, texture_type: u32 },
    UnbindModelTexture { model_type: ModelType },
    BindShadowTexture,
    UnbindShadowTexture,
    PushModelRenderState(ModelType),
    PopModelRenderState(ModelType),
    PushTransform(Mat4),
    PopTransform,
    /// Immediate draw of one model, either a live object or a static snapshot.
    DrawModel {
        entity: Option<Entity>,
        model_type: ModelType,
        texture_type: u32,
        lod: Option<usize>,
    },
    /// Queue an object for the next batched submission by arena offsets.
    AddToSubmission {
        matrix_offset: usize,
        uniform_index: usize,
        model_type: ModelType,
        texture_type: u32,
    },
    SubmitBatch { model_type: ModelType, texture_type: u32 },
    CallList(u32),
    DrawFarTexture { entity: Entity },
    BindGeometryBuffer,
    UnbindGeometryBuffer,
    ClearGeometryBuffer,
    /// Fixed-function clip plane; `None` disables it.
    ClipPlane { index: u32, plane: Option<Vec4> },
}

impl DeviceCommand {
    /// Whether this command results in geometry being rasterised.
    pub fn is_draw(&self) -> bool {
        matches!(
            self,
            DeviceCommand::DrawModel { .. } | DeviceCommand::SubmitBatch { .. } | DeviceCommand::DrawFarTexture { .. }
        )
    }
}

/// Everything the drawers need from the GPU.
pub trait GraphicsDevice {
    fn submit(&mut self, cmd: DeviceCommand);

    /// Compile and link a program. Failures are reported, never fatal.
    fn create_program(&mut self, desc: &ProgramDesc) -> Result<ProgramId>;

    fn delete_program(&mut self, _id: ProgramId) {}
}

/// In-memory device that records the command stream.
#[derive(Debug, Default)]
pub struct RecordingDevice {
    pub commands: Vec<DeviceCommand>,
    /// Programs whose link step should fail, by name.
    pub failing_programs: HashSet<String>,
    pub programs_created: usize,
    pub programs_deleted: usize,
    next_program: u32,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every program whose name contains `pattern` fail to link.
    pub fn fail_programs_matching(&mut self, pattern: impl Into<String>) {
        self.failing_programs.insert(pattern.into());
    }

    pub fn heal_programs(&mut self) {
        self.failing_programs.clear();
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    pub fn count(&self, pred: impl Fn(&DeviceCommand) -> bool) -> usize {
        self.commands.iter().filter(|c| pred(c)).count()
    }

    pub fn count_draws(&self) -> usize {
        self.count(DeviceCommand::is_draw)
    }

    /// Immediate model draws of one live object.
    pub fn draws_of(&self, entity: Entity) -> usize {
        self.count(|c| matches!(c, DeviceCommand::DrawModel { entity: Some(e), .. } if *e == entity))
    }

    pub fn contains(&self, cmd: &DeviceCommand) -> bool {
        self.commands.iter().any(|c| c == cmd)
    }

    pub fn position(&self, cmd: &DeviceCommand) -> Option<usize> {
        self.commands.iter().position(|c| c == cmd)
    }
}

impl GraphicsDevice for RecordingDevice {
    fn submit(&mut self, cmd: DeviceCommand) {
        self.commands.push(cmd);
    }

    fn create_program(&mut self, desc: &ProgramDesc) -> Result<ProgramId> {
        if let Some(stage) = [("vertex", desc.vertex), ("fragment", desc.fragment)]
            .into_iter()
            .find(|(_, source)| source.is_empty())
            .map(|(stage, _)| stage)
        {
            return Err(RenderError::shader_compile(desc.name.clone(), format!("empty {stage} shader")));
        }
        if self.failing_programs.iter().any(|p| desc.name.contains(p.as_str())) {
            return Err(RenderError::shader_link(desc.name.clone(), "link step rejected by device"));
        }
        self.next_program += 1;
        self.programs_created += 1;
        Ok(ProgramId(self.next_program))
    }

    fn delete_program(&mut self, _id: ProgramId) {
        self.programs_deleted += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(name: &str) -> ProgramDesc {
        ProgramDesc {
            name: name.to_string(),
            vertex: "model.vert",
            fragment: "model.frag",
            defines: Vec::new(),
        }
    }

    #[test]
    fn failing_programs_report_link_errors() {
        let mut dev = RecordingDevice::new();
        dev.fail_programs_matching("GL4");
        assert!(dev.create_program(&desc("ModelShaderGLSL-Standard")).is_ok());
        let err = dev.create_program(&desc("ModelShaderGL4-Standard")).unwrap_err();
        assert!(matches!(err, RenderError::ShaderLink { .. }));
        assert_eq!(dev.programs_created, 1);
    }

    #[test]
    fn empty_shader_stage_fails_to_compile() {
        let mut dev = RecordingDevice::new();
        let missing = ProgramDesc {
            fragment: "",
            ..desc("ModelShaderGLSL-Standard")
        };
        let err = dev.create_program(&missing).unwrap_err();
        assert!(matches!(err, RenderError::ShaderCompile { .. }));
        assert!(err.to_string().contains("empty fragment shader"));
        assert_eq!(dev.programs_created, 0);
    }

    #[test]
    fn program_ids_are_unique() {
        let mut dev = RecordingDevice::new();
        let a = dev.create_program(&desc("a")).unwrap();
        let b = dev.create_program(&desc("b")).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn counts_draw_commands() {
        let mut dev = RecordingDevice::new();
        dev.submit(DeviceCommand::PushAttrib);
        dev.submit(DeviceCommand::SubmitBatch {
            model_type: ModelType::S3o,
            texture_type: 1,
        });
        dev.submit(DeviceCommand::PopAttrib);
        assert_eq!(dev.count_draws(), 1);
        dev.clear();
        assert!(dev.commands.is_empty());
    }
}

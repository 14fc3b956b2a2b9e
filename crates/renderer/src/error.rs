//! Error types for the model drawing subsystem.

use hecs::Entity;

/// Errors raised by drawer setup and by lookups of script-supplied references.
///
/// None of these cross the per-frame draw loop: backends that fail to build
/// their programs are disqualified, unknown objects are skipped.
#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    #[error("Failed to compile shader program {program}: {log}")]
    ShaderCompile { program: String, log: String },

    #[error("Failed to link shader program {program}: {log}")]
    ShaderLink { program: String, log: String },

    #[error("Unknown object {0:?}")]
    UnknownObject(Entity),

    #[error("Invalid drawer configuration: {0}")]
    Config(String),
}

impl RenderError {
    pub fn shader_link(program: impl Into<String>, log: impl Into<String>) -> Self {
        Self::ShaderLink {
            program: program.into(),
            log: log.into(),
        }
    }

    pub fn shader_compile(program: impl Into<String>, log: impl Into<String>) -> Self {
        Self::ShaderCompile {
            program: program.into(),
            log: log.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, RenderError>;

//! Model drawers for units and features.
//!
//! Objects are classified per frame against the player, reflection and shadow
//! cameras, binned by model type and texture, and drawn through one of several
//! shading backends:
//! - Fixed-function, GLSL and batched GL4 backends
//! - Deferred, forward, alpha and shadow passes
//! - Script materials, ghosts and temporary units
//!
//! All draw calls go to a [`device::GraphicsDevice`].

pub mod camera;
pub mod config;
pub mod container;
pub mod device;
pub mod drawer_data;
pub mod drawer_helper;
pub mod drawer_state;
pub mod env;
pub mod error;
pub mod far_texture;
pub mod feature_drawer;
pub mod lua_object_drawer;
pub mod mem_storage;
pub mod model_drawer;
pub mod unit_drawer;

#[cfg(test)]
mod test_support;

pub use camera::*;
pub use config::DrawerConfig;
pub use device::{DeviceCommand, GraphicsDevice, RecordingDevice};
pub use drawer_data::{DrawFlags, EngineDrawMask, ModelDrawerData, ObjectKind, UpdateStats};
pub use drawer_state::{DrawerKind, ShadingProfile};
pub use env::{DrawMode, FlatGround, FrameView, GroundHeight, LosMap, RenderEnv, SightCircles};
pub use error::{RenderError, Result};
pub use far_texture::FarTextureHandler;
pub use feature_drawer::FeatureKind;
pub use lua_object_drawer::{LuaObjType, LuaObjectDrawer};
pub use model_drawer::{DrawContext, DrawEvents, DrawStats, FeatureDrawer, ModelDrawer, NoEvents, UnitDrawer};
pub use unit_drawer::{TempDrawUnit, UnitKind};

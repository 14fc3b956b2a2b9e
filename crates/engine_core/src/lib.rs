//! Core simulation-side types consumed by the model drawers.
//!
//! This crate provides the data the renderer reads every frame:
//! - Transform and model piece hierarchies
//! - Solid object, sensor and team state
//! - Frame counters

pub mod components;
pub mod model;
pub mod team;
pub mod time;
pub mod transform;

pub use components::*;
pub use model::*;
pub use team::*;
pub use time::*;
pub use transform::*;

// Re-export commonly used types
pub use glam::{Mat4, Quat, Vec2, Vec3, Vec4};
pub use hecs::{Entity, World};

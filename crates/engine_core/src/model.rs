//! Model definitions and per-object piece hierarchies.

use glam::{Mat4, Vec3};

use crate::transform::Transform;

/// File format a model was loaded from. Each format binds its textures differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ModelType {
    ThreeDo,
    S3o,
    Ass,
}

impl ModelType {
    pub const COUNT: usize = 3;
    pub const ALL: [ModelType; Self::COUNT] = [ModelType::ThreeDo, ModelType::S3o, ModelType::Ass];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            ModelType::ThreeDo => "3DO",
            ModelType::S3o => "S3O",
            ModelType::Ass => "ASS",
        }
    }
}

/// One node of a model's piece tree.
#[derive(Debug, Clone)]
pub struct ModelPiece {
    pub name: String,
    /// Index of the parent piece. Parents always precede their children.
    pub parent: Option<usize>,
    /// Offset from the parent piece in model space.
    pub offset: Vec3,
}

/// Shared, immutable model data.
#[derive(Debug, Clone)]
pub struct Model {
    pub name: String,
    pub model_type: ModelType,
    /// Identity of the texture set this model samples; objects sharing it share a bin.
    pub texture_type: u32,
    pub radius: f32,
    pub height: f32,
    pub pieces: Vec<ModelPiece>,
}

impl Model {
    /// A model made of a single root piece.
    pub fn new(name: impl Into<String>, model_type: ModelType, texture_type: u32, radius: f32, height: f32) -> Self {
        Self {
            name: name.into(),
            model_type,
            texture_type,
            radius,
            height,
            pieces: vec![ModelPiece {
                name: "root".to_string(),
                parent: None,
                offset: Vec3::ZERO,
            }],
        }
    }

    pub fn with_piece(mut self, name: impl Into<String>, parent: usize, offset: Vec3) -> Self {
        self.pieces.push(ModelPiece {
            name: name.into(),
            parent: Some(parent),
            offset,
        });
        self
    }

    pub fn piece_count(&self) -> usize {
        self.pieces.len()
    }
}

/// Animated piece state of one object.
#[derive(Debug, Clone, Copy)]
pub struct LocalPiece {
    pub parent: Option<usize>,
    pub transform: Transform,
}

/// Per-object instance of a model's piece tree.
#[derive(Debug, Clone, Default)]
pub struct LocalModel {
    pub pieces: Vec<LocalPiece>,
}

impl LocalModel {
    pub fn from_model(model: &Model) -> Self {
        let pieces = model
            .pieces
            .iter()
            .map(|p| LocalPiece {
                parent: p.parent,
                transform: Transform::from_position(p.offset),
            })
            .collect();
        Self { pieces }
    }

    pub fn piece_count(&self) -> usize {
        self.pieces.len()
    }

    /// Model-space matrix of every piece, appended to `out` in piece order.
    pub fn model_space_matrices(&self, out: &mut Vec<Mat4>) {
        let base = out.len();
        for (i, piece) in self.pieces.iter().enumerate() {
            let local = piece.transform.to_matrix();
            let mat = match piece.parent {
                Some(p) if p < i => out[base + p] * local,
                _ => local,
            };
            out.push(mat);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn piece_matrices_follow_parent_chain() {
        let model = Model::new("tank", ModelType::S3o, 1, 20.0, 10.0)
            .with_piece("turret", 0, Vec3::new(0.0, 5.0, 0.0))
            .with_piece("barrel", 1, Vec3::new(0.0, 0.0, -3.0));
        let local = LocalModel::from_model(&model);

        let mut out = Vec::new();
        local.model_space_matrices(&mut out);

        assert_eq!(out.len(), 3);
        let tip = out[2].transform_point3(Vec3::ZERO);
        assert!(tip.abs_diff_eq(Vec3::new(0.0, 5.0, -3.0), 1e-5));
    }

    #[test]
    fn forward_parent_reference_is_treated_as_root() {
        let mut local = LocalModel::from_model(&Model::new("m", ModelType::Ass, 0, 1.0, 1.0));
        local.pieces[0].parent = Some(4);
        local.pieces[0].transform.position = Vec3::X;
        let mut out = vec![Mat4::IDENTITY];
        local.model_space_matrices(&mut out);
        assert_eq!(out[1].transform_point3(Vec3::ZERO), Vec3::X);
    }
}

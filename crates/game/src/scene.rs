//! Synthetic RTS scene: teams, units, buildings and map features scattered around the camera.

use std::sync::Arc;

use engine_core::{Feature, Health, LocalModel, LosStatus, Model, ModelType, SolidObject, TeamTable, Transform, Unit};
use glam::Vec3;
use hecs::{Entity, World};
use rand::prelude::*;

use crate::config::GameConfig;

/// Half extent of the square map, in elmos.
pub const MAP_HALF_SIZE: f32 = 2048.0;

/// Texture sets shared by the model catalogue; models with equal ids land in one bin.
const TEXTURE_TYPES: u32 = 6;

pub struct SceneSpawner {
    models: Vec<Arc<Model>>,
    rng: StdRng,
}

/// What one spawn produced, so the driver can register it with the right drawer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Spawned {
    Unit(Entity),
    Feature(Entity),
}

impl SceneSpawner {
    pub fn new(seed: u64) -> Self {
        let mut models = Vec::new();
        for (i, model_type) in ModelType::ALL.into_iter().enumerate() {
            for tex in 0..TEXTURE_TYPES / 2 {
                let texture_type = tex * 2 + (i as u32 % 2);
                let radius = 12.0 + tex as f32 * 10.0;
                models.push(Arc::new(
                    Model::new(format!("{}_{texture_type}", model_type.name()), model_type, texture_type, radius, radius * 1.5)
                        .with_piece("turret", 0, Vec3::new(0.0, radius, 0.0))
                        .with_piece("barrel", 1, Vec3::new(0.0, 0.0, radius * 0.8)),
                ));
            }
        }
        Self {
            models,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// One team per entry, alternating between two ally teams.
    pub fn teams(&mut self, team_count: usize) -> TeamTable {
        let mut teams = TeamTable::new();
        for i in 0..team_count.max(1) {
            let color = [self.rng.gen(), self.rng.gen(), self.rng.gen(), 255];
            teams.add_team(color, i % 2);
        }
        teams
    }

    fn random_model(&mut self) -> Arc<Model> {
        let idx = self.rng.gen_range(0..self.models.len());
        Arc::clone(&self.models[idx])
    }

    fn random_position(&mut self) -> Vec3 {
        Vec3::new(
            self.rng.gen_range(-MAP_HALF_SIZE..MAP_HALF_SIZE),
            0.0,
            self.rng.gen_range(-MAP_HALF_SIZE..MAP_HALF_SIZE),
        )
    }

    /// Populate the world per the config. Ally team count is taken from `teams`.
    pub fn populate(&mut self, world: &mut World, teams: &TeamTable, config: &GameConfig) -> Vec<Spawned> {
        let ally_teams = teams.ally_team_count();
        let mut spawned = Vec::with_capacity(config.unit_count + config.feature_count);

        for _ in 0..config.unit_count {
            let model = self.random_model();
            let team = self.rng.gen_range(0..teams.len());
            let mut solid = SolidObject::new(model, team);
            solid.is_building = self.rng.gen_bool(0.25);
            if solid.is_building {
                solid.build_facing = self.rng.gen_range(0..4);
                if self.rng.gen_bool(0.2) {
                    solid.build_progress = self.rng.gen_range(0.05..1.0);
                }
            }
            solid.cloaked = !solid.is_building && self.rng.gen_bool(0.05);
            let position = self.random_position();
            solid.in_water = position.x < -MAP_HALF_SIZE * 0.5;

            let mut los = LosStatus::visible_to_all(ally_teams);
            if self.rng.gen_bool(0.1) {
                let hidden_from = self.rng.gen_range(0..ally_teams);
                los.leave_los(hidden_from);
            }
            let transform = if solid.is_building {
                Transform::from_build_facing(position, solid.build_facing)
            } else {
                Transform::from_position(position)
            };
            let local = LocalModel::from_model(&solid.model);
            let e = world.spawn((transform, solid, los, local, Health::new(100.0), Unit));
            spawned.push(Spawned::Unit(e));
        }

        for _ in 0..config.feature_count {
            let model = self.random_model();
            let mut solid = SolidObject::new(model, 0);
            solid.alpha_fade = self.rng.gen_bool(0.5);
            let position = self.random_position();
            let local = LocalModel::from_model(&solid.model);
            let e = world.spawn((Transform::from_position(position), solid, local, Feature));
            spawned.push(Spawned::Feature(e));
        }

        log::info!(
            "Spawned {} units and {} features for {} teams",
            config.unit_count,
            config.feature_count,
            teams.len()
        );
        spawned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_spawns_same_scene() {
        let config = GameConfig {
            unit_count: 20,
            feature_count: 10,
            ..GameConfig::default()
        };
        let positions = |seed| {
            let mut spawner = SceneSpawner::new(seed);
            let teams = spawner.teams(config.team_count);
            let mut world = World::new();
            let spawned = spawner.populate(&mut world, &teams, &config);
            assert_eq!(spawned.len(), 30);
            spawned
                .iter()
                .map(|s| {
                    let e = match *s {
                        Spawned::Unit(e) | Spawned::Feature(e) => e,
                    };
                    world.get::<&Transform>(e).unwrap().position
                })
                .collect::<Vec<_>>()
        };
        assert_eq!(positions(7), positions(7));
        assert_ne!(positions(7), positions(8));
    }

    #[test]
    fn teams_alternate_ally_teams() {
        let teams = SceneSpawner::new(1).teams(3);
        assert_eq!(teams.len(), 3);
        assert_eq!(teams.ally_team(1), Some(1));
        assert_eq!(teams.ally_team(2), Some(0));
        assert_eq!(teams.ally_team_count(), 2);
    }
}

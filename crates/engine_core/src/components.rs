//! ECS components describing drawable simulation objects.

use std::sync::Arc;

use bitflags::bitflags;

use crate::model::Model;

/// Health component for damageable entities.
#[derive(Debug, Clone, Copy)]
pub struct Health {
    pub current: f32,
    pub max: f32,
}

impl Health {
    pub fn new(max: f32) -> Self {
        Self { current: max, max }
    }

    pub fn take_damage(&mut self, amount: f32) {
        self.current = (self.current - amount).max(0.0);
    }

    pub fn is_dead(&self) -> bool {
        self.current <= 0.0
    }

    pub fn percentage(&self) -> f32 {
        if self.max <= 0.0 {
            return 0.0;
        }
        self.current / self.max
    }
}

impl Default for Health {
    fn default() -> Self {
        Self::new(100.0)
    }
}

/// Tag component for units.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unit;

/// Tag component for map features (wrecks, trees, rocks).
#[derive(Debug, Clone, Copy, Default)]
pub struct Feature;

/// Render-relevant state of a unit or feature.
#[derive(Debug, Clone)]
pub struct SolidObject {
    pub model: Arc<Model>,
    pub team: usize,
    /// Bounding radius used for culling and draw-distance tests.
    pub radius: f32,
    /// Explicitly hidden from every pass.
    pub no_draw: bool,
    /// Outside the playable map.
    pub in_void: bool,
    /// Intersects the water plane.
    pub in_water: bool,
    pub cloaked: bool,
    /// Features only: fades out towards the feature draw distance.
    pub alpha_fade: bool,
    pub is_building: bool,
    pub build_facing: u8,
    /// Construction progress in `[0, 1]`; finished objects report 1.
    pub build_progress: f32,
}

impl SolidObject {
    pub fn new(model: Arc<Model>, team: usize) -> Self {
        let radius = model.radius;
        Self {
            model,
            team,
            radius,
            no_draw: false,
            in_void: false,
            in_water: false,
            cloaked: false,
            alpha_fade: false,
            is_building: false,
            build_facing: 0,
            build_progress: 1.0,
        }
    }

    pub fn being_built(&self) -> bool {
        self.build_progress < 1.0
    }
}

bitflags! {
    /// Sensor state of one object as seen by one ally team.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct LosBits: u8 {
        const INLOS = 1 << 0;
        const INRADAR = 1 << 1;
        /// Has been in line of sight at some point.
        const PREVLOS = 1 << 2;
        /// Continuously tracked by radar since it was last seen.
        const CONTRADAR = 1 << 3;
    }
}

/// Per-ally-team sensor state of an object.
#[derive(Debug, Clone, Default)]
pub struct LosStatus {
    per_ally: Vec<LosBits>,
}

impl LosStatus {
    pub fn new(ally_teams: usize) -> Self {
        Self {
            per_ally: vec![LosBits::empty(); ally_teams],
        }
    }

    /// Fully visible to every ally team.
    pub fn visible_to_all(ally_teams: usize) -> Self {
        Self {
            per_ally: vec![LosBits::INLOS | LosBits::PREVLOS | LosBits::INRADAR; ally_teams],
        }
    }

    /// Unknown ally teams see nothing.
    pub fn get(&self, ally_team: usize) -> LosBits {
        self.per_ally.get(ally_team).copied().unwrap_or_default()
    }

    pub fn set(&mut self, ally_team: usize, bits: LosBits) {
        if ally_team >= self.per_ally.len() {
            self.per_ally.resize(ally_team + 1, LosBits::empty());
        }
        self.per_ally[ally_team] = bits;
    }

    /// Enter line of sight; remembers that the object has been seen.
    pub fn enter_los(&mut self, ally_team: usize) {
        let bits = self.get(ally_team) | LosBits::INLOS | LosBits::PREVLOS | LosBits::CONTRADAR;
        self.set(ally_team, bits);
    }

    pub fn leave_los(&mut self, ally_team: usize) {
        let mut bits = self.get(ally_team);
        bits.remove(LosBits::INLOS);
        if !bits.contains(LosBits::INRADAR) {
            bits.remove(LosBits::CONTRADAR);
        }
        self.set(ally_team, bits);
    }

    pub fn ally_team_count(&self) -> usize {
        self.per_ally.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelType;

    #[test]
    fn leaving_los_keeps_prevlos() {
        let mut los = LosStatus::new(2);
        los.enter_los(0);
        los.leave_los(0);
        let bits = los.get(0);
        assert!(!bits.contains(LosBits::INLOS));
        assert!(bits.contains(LosBits::PREVLOS));
        assert!(!bits.contains(LosBits::CONTRADAR));
    }

    #[test]
    fn radar_keeps_continuous_contact() {
        let mut los = LosStatus::new(1);
        los.set(0, LosBits::INRADAR);
        los.enter_los(0);
        los.leave_los(0);
        assert!(los.get(0).contains(LosBits::CONTRADAR));
    }

    #[test]
    fn unknown_ally_sees_nothing() {
        let los = LosStatus::visible_to_all(1);
        assert!(los.get(7).is_empty());
    }

    #[test]
    fn new_object_takes_model_radius() {
        let model = Arc::new(Model::new("rock", ModelType::ThreeDo, 0, 12.5, 4.0));
        let obj = SolidObject::new(model, 3);
        assert_eq!(obj.radius, 12.5);
        assert!(!obj.being_built());
    }

    #[test]
    fn health_percentage_handles_zero_max() {
        let mut h = Health::new(200.0);
        h.take_damage(50.0);
        assert_eq!(h.percentage(), 0.75);
        assert_eq!(Health::new(0.0).percentage(), 0.0);
    }
}

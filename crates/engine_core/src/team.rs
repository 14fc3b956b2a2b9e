//! Teams, their colours and alliances.

use glam::Vec4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Team {
    /// RGBA colour applied to team-coloured model regions.
    pub color: [u8; 4],
    pub ally_team: usize,
}

/// All teams in the current game. Team IDs index into this table.
#[derive(Debug, Clone, Default)]
pub struct TeamTable {
    teams: Vec<Team>,
}

impl TeamTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_team(&mut self, color: [u8; 4], ally_team: usize) -> usize {
        self.teams.push(Team { color, ally_team });
        let id = self.teams.len() - 1;
        log::debug!("team {id} joins ally team {ally_team}");
        id
    }

    pub fn is_valid(&self, team: usize) -> bool {
        team < self.teams.len()
    }

    pub fn get(&self, team: usize) -> Option<&Team> {
        self.teams.get(team)
    }

    /// Normalised team colour, `None` for unknown teams.
    pub fn color(&self, team: usize) -> Option<Vec4> {
        self.get(team).map(|t| {
            let [r, g, b, a] = t.color;
            Vec4::new(r as f32, g as f32, b as f32, a as f32) / 255.0
        })
    }

    pub fn ally_team(&self, team: usize) -> Option<usize> {
        self.get(team).map(|t| t.ally_team)
    }

    pub fn len(&self) -> usize {
        self.teams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.teams.is_empty()
    }

    /// Number of distinct ally teams (highest ally index + 1).
    pub fn ally_team_count(&self) -> usize {
        self.teams.iter().map(|t| t.ally_team + 1).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colour_is_normalised() {
        let mut teams = TeamTable::new();
        let t = teams.add_team([255, 0, 51, 255], 0);
        let c = teams.color(t).unwrap();
        assert!((c.x - 1.0).abs() < 1e-6);
        assert!((c.z - 0.2).abs() < 1e-6);
    }

    #[test]
    fn unknown_team_is_invalid() {
        let mut teams = TeamTable::new();
        teams.add_team([0; 4], 0);
        teams.add_team([0; 4], 2);
        assert!(!teams.is_valid(2));
        assert!(teams.color(5).is_none());
        assert_eq!(teams.ally_team_count(), 3);
    }
}

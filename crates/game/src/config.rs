//! Driver configuration (drawer settings, scene size). Loaded from config.ron at startup.

use renderer::DrawerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Settings of one headless run. Loaded from `config.ron` in the current directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    /// Model drawer settings shared by the unit and feature drawers.
    #[serde(default)]
    pub drawer: DrawerConfig,
    /// Seed of the scene generator; the same seed spawns the same scene.
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_unit_count")]
    pub unit_count: usize,
    #[serde(default = "default_feature_count")]
    pub feature_count: usize,
    /// Number of simulated frames.
    #[serde(default = "default_frames")]
    pub frames: u64,
    #[serde(default = "default_team_count")]
    pub team_count: usize,
}

fn default_seed() -> u64 {
    0x5eed
}
fn default_unit_count() -> usize {
    400
}
fn default_feature_count() -> usize {
    250
}
fn default_frames() -> u64 {
    60
}
fn default_team_count() -> usize {
    4
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            drawer: DrawerConfig::default(),
            seed: default_seed(),
            unit_count: default_unit_count(),
            feature_count: default_feature_count(),
            frames: default_frames(),
            team_count: default_team_count(),
        }
    }
}

impl GameConfig {
    /// Load config from `config.ron`. If the file is missing or invalid, returns default config.
    pub fn load() -> Self {
        Self::load_from(&config_path())
    }

    pub fn load_from(path: &Path) -> Self {
        if let Ok(data) = std::fs::read_to_string(path) {
            match ron::from_str(&data) {
                Ok(c) => return c,
                Err(e) => log::warn!("Invalid config at {:?}: {}, using defaults", path, e),
            }
        }
        Self::default()
    }

    /// Save current config to `config.ron`. Logs on error.
    pub fn save(&self) {
        let path = config_path();
        if let Ok(s) = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default()) {
            if let Err(e) = std::fs::write(&path, s) {
                log::warn!("Could not write config to {:?}: {}", path, e);
            }
        }
    }
}

fn config_path() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")).join("config.ron")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let cfg: GameConfig = ron::from_str("(unit_count: 12, drawer: (mt_model_drawer: false))").unwrap();
        assert_eq!(cfg.unit_count, 12);
        assert_eq!(cfg.frames, default_frames());
        assert!(!cfg.drawer.mt_model_drawer);
        assert!(cfg.drawer.adv_model_shading);
    }

    #[test]
    fn invalid_file_falls_back_to_defaults() {
        let path = std::env::temp_dir().join(format!("modeldraw-invalid-{}.ron", std::process::id()));
        std::fs::write(&path, "(unit_count: \"many\")").unwrap();
        let cfg = GameConfig::load_from(&path);
        std::fs::remove_file(&path).ok();
        assert_eq!(cfg.unit_count, default_unit_count());
    }
}

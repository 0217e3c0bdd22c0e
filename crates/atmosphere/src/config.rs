//! Atmosphere configuration. Loaded from atmosphere.ron at startup.

use engine_core::{AtmosphereError, Result};
use particles::{ThemeCatalog, ThemeOverride};
use renderer::{FogSettings, OverlaySettings};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Persistent atmosphere settings. Loaded from `atmosphere.ron` in the current directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtmosphereConfig {
    #[serde(default)]
    pub fog: FogSettings,
    #[serde(default)]
    pub overlay: OverlaySettings,
    /// Per-theme tweaks applied on top of the built-in catalog.
    #[serde(default)]
    pub themes: Vec<ThemeOverride>,
    /// Frames per second for hosts that drive a fixed timestep.
    #[serde(default = "default_frame_rate")]
    pub frame_rate: f32,
}

fn default_frame_rate() -> f32 {
    60.0
}

impl Default for AtmosphereConfig {
    fn default() -> Self {
        Self {
            fog: FogSettings::default(),
            overlay: OverlaySettings::default(),
            themes: Vec::new(),
            frame_rate: default_frame_rate(),
        }
    }
}

impl AtmosphereConfig {
    /// Load config from `atmosphere.ron`. If the file is missing or invalid, returns default config.
    pub fn load() -> Self {
        Self::load_from(&config_path())
    }

    pub fn load_from(path: &Path) -> Self {
        if let Ok(data) = std::fs::read_to_string(path) {
            match Self::from_ron_str(&data) {
                Ok(c) => return c,
                Err(e) => log::warn!("Invalid config at {:?}: {}, using defaults", path, e),
            }
        }
        Self::default()
    }

    /// Parse and validate.
    pub fn from_ron_str(data: &str) -> Result<Self> {
        let config: Self = ron::from_str(data).map_err(|e| AtmosphereError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.frame_rate.is_finite() && self.frame_rate >= 1.0 && self.frame_rate <= 480.0) {
            return Err(AtmosphereError::InvalidConfig(format!(
                "frame_rate {} outside 1..=480",
                self.frame_rate
            )));
        }
        self.fog.validate()?;
        ThemeCatalog::builtin()?.with_overrides(&self.themes)?;
        Ok(())
    }

    /// Seconds per frame at the configured rate.
    pub fn frame_dt(&self) -> f32 {
        1.0 / self.frame_rate
    }

    /// Save current config to `path`. Logs on error.
    pub fn save(&self, path: &Path) {
        if let Ok(s) = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default()) {
            if let Err(e) = std::fs::write(path, s) {
                log::warn!("Could not write config to {:?}: {}", path, e);
            }
        }
    }
}

pub fn config_path() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")).join("atmosphere.ron")
}

#[cfg(test)]
mod tests {
    use super::*;
    use particles::Theme;

    #[test]
    fn empty_file_gives_defaults() {
        assert_eq!(AtmosphereConfig::from_ron_str("()").unwrap(), AtmosphereConfig::default());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = AtmosphereConfig::from_ron_str(
            r#"(
                fog: (layer_count: 6, turbulence: None, edge: (recycle_depth: 200.0)),
                overlay: (seed: 7),
                themes: [(theme: forest, count: Some(5))],
            )"#,
        )
        .unwrap();
        assert_eq!(cfg.fog.layer_count, 6);
        assert!(cfg.fog.turbulence.is_none());
        assert_eq!(cfg.fog.edge.recycle_depth, 200.0);
        assert_eq!(cfg.fog.edge.depth_band, 60.0);
        assert_eq!(cfg.fog.fog_depth, FogSettings::default().fog_depth);
        assert_eq!(cfg.overlay.seed, 7);
        assert!(cfg.overlay.enabled);
        assert_eq!(cfg.themes[0].theme, Theme::Forest);
        assert_eq!(cfg.frame_rate, 60.0);
    }

    #[test]
    fn nonsense_values_are_rejected() {
        assert!(AtmosphereConfig::from_ron_str("(frame_rate: 0.0)").is_err());
        assert!(AtmosphereConfig::from_ron_str("(fog: (max_opacity: 2.0))").is_err());
        assert!(AtmosphereConfig::from_ron_str("(themes: [(theme: cave, count: Some(0))])").is_err());
        assert!(AtmosphereConfig::from_ron_str("(themes: [(theme: lava)])").is_err());
        assert!(AtmosphereConfig::from_ron_str("not ron").is_err());
    }

    #[test]
    fn load_from_falls_back_on_bad_file() {
        let dir = std::env::temp_dir();
        let missing = dir.join("atmosphere-test-missing.ron");
        assert_eq!(AtmosphereConfig::load_from(&missing), AtmosphereConfig::default());

        let bad = dir.join(format!("atmosphere-test-bad-{}.ron", std::process::id()));
        std::fs::write(&bad, "(fog: (layer_count: 0))").unwrap();
        assert_eq!(AtmosphereConfig::load_from(&bad), AtmosphereConfig::default());
        let _ = std::fs::remove_file(&bad);
    }

    #[test]
    fn save_then_load_preserves_values() {
        let path = std::env::temp_dir().join(format!("atmosphere-test-save-{}.ron", std::process::id()));
        let cfg = AtmosphereConfig {
            frame_rate: 30.0,
            ..Default::default()
        };
        cfg.save(&path);
        assert_eq!(AtmosphereConfig::load_from(&path).frame_rate, 30.0);
        let _ = std::fs::remove_file(&path);
    }
}

//! Environment themes and their ambient particle descriptors.
//!
//! Themes form a closed set; each maps to one validated [`ThemeConfig`].
//! Hosts resolve theme ids through a [`ThemeCatalog`] built once at startup.

use engine_core::{AtmosphereError, Result, Rgba};
use glam::Vec2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::field::{FieldConfig, FieldKind, ValueRange, MAX_FIELD_PARTICLES};
use crate::motion::MotionProfile;

/// Map environment theme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Cave,
    Dungeon,
    Crypt,
    Grassland,
    Forest,
    Town,
    Tundra,
    Desert,
    Marsh,
}

impl Theme {
    pub const ALL: [Theme; 9] = [
        Theme::Cave,
        Theme::Dungeon,
        Theme::Crypt,
        Theme::Grassland,
        Theme::Forest,
        Theme::Town,
        Theme::Tundra,
        Theme::Desert,
        Theme::Marsh,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Cave => "cave",
            Theme::Dungeon => "dungeon",
            Theme::Crypt => "crypt",
            Theme::Grassland => "grassland",
            Theme::Forest => "forest",
            Theme::Town => "town",
            Theme::Tundra => "tundra",
            Theme::Desert => "desert",
            Theme::Marsh => "marsh",
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Theme {
    type Err = AtmosphereError;

    fn from_str(s: &str) -> Result<Self> {
        let id = s.trim().to_ascii_lowercase();
        Theme::ALL
            .into_iter()
            .find(|t| t.as_str() == id)
            .ok_or_else(|| AtmosphereError::UnknownTheme(s.to_string()))
    }
}

/// How one particle is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RenderPrimitive {
    /// Soft round blob in the theme color.
    Blob,
    /// Single monogram character.
    Glyph(char),
    /// Elongated streak; `length` in px, particle size is its width.
    Ray { length: f32 },
}

/// Validated ambient particle descriptor for one theme.
#[derive(Debug, Clone, PartialEq)]
pub struct ThemeConfig {
    pub theme: Theme,
    pub count: usize,
    pub size: ValueRange,
    pub opacity: ValueRange,
    pub color: Rgba,
    pub profile: MotionProfile,
    pub primitive: RenderPrimitive,
    /// Anchor drift velocity in px/s, shared by the whole layer.
    pub drift: Vec2,
    /// Loop period range in seconds.
    pub period: ValueRange,
    /// Sway/jitter in px, or swing in radians for rays.
    pub amplitude: f32,
}

impl ThemeConfig {
    pub fn for_theme(theme: Theme) -> Self {
        use MotionProfile as M;
        use RenderPrimitive as P;
        let base = |count: usize,
                    size: (f32, f32),
                    opacity: (f32, f32),
                    color: Rgba,
                    profile: MotionProfile,
                    primitive: RenderPrimitive| Self {
            theme,
            count,
            size: ValueRange::new(size.0, size.1),
            opacity: ValueRange::new(opacity.0, opacity.1),
            color,
            profile,
            primitive,
            drift: Vec2::ZERO,
            period: ValueRange::new(8.0, 16.0),
            amplitude: 12.0,
        };
        match theme {
            Theme::Cave => base(40, (1.0, 3.0), (0.15, 0.5), Rgba::from_rgb8(200, 190, 170), M::Dust, P::Blob),
            Theme::Dungeon => Self {
                amplitude: 16.0,
                ..base(35, (1.0, 3.5), (0.15, 0.55), Rgba::from_rgb8(230, 170, 90), M::Dust, P::Blob)
            },
            Theme::Crypt => Self {
                period: ValueRange::new(10.0, 20.0),
                amplitude: 20.0,
                ..base(24, (2.0, 5.0), (0.08, 0.3), Rgba::from_rgb8(170, 230, 180), M::Default, P::Blob)
            },
            Theme::Grassland => Self {
                period: ValueRange::new(9.0, 15.0),
                amplitude: 0.12,
                ..base(7, (18.0, 42.0), (0.05, 0.16), Rgba::from_rgb8(255, 240, 180), M::Sunray, P::Ray { length: 220.0 })
            },
            Theme::Forest => Self {
                period: ValueRange::new(10.0, 18.0),
                amplitude: 28.0,
                ..base(18, (10.0, 16.0), (0.35, 0.75), Rgba::from_rgb8(120, 160, 60), M::Leaf, P::Glyph('%'))
            },
            Theme::Town => Self {
                drift: Vec2::new(3.0, 0.0),
                ..base(20, (1.5, 3.0), (0.1, 0.35), Rgba::from_rgb8(210, 210, 200), M::Default, P::Blob)
            },
            Theme::Tundra => Self {
                period: ValueRange::new(8.0, 14.0),
                amplitude: 14.0,
                ..base(60, (8.0, 14.0), (0.4, 0.9), Rgba::WHITE, M::Snow, P::Glyph('*'))
            },
            Theme::Desert => Self {
                drift: Vec2::new(30.0, 0.0),
                period: ValueRange::new(4.0, 8.0),
                amplitude: 10.0,
                ..base(50, (1.0, 2.5), (0.2, 0.6), Rgba::from_rgb8(220, 190, 130), M::Sand, P::Blob)
            },
            Theme::Marsh => Self {
                period: ValueRange::new(0.6, 1.2),
                amplitude: 0.0,
                ..base(90, (1.0, 1.5), (0.15, 0.4), Rgba::from_rgb8(170, 190, 210), M::Rain, P::Ray { length: 16.0 })
            },
        }
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| {
            Err(AtmosphereError::InvalidTheme { theme: self.theme.as_str(), reason })
        };
        if self.count == 0 || self.count > MAX_FIELD_PARTICLES {
            return invalid(format!("count {} outside 1..={}", self.count, MAX_FIELD_PARTICLES));
        }
        if !self.size.is_valid() || self.size.min <= 0.0 {
            return invalid(format!("bad size range {:?}", self.size));
        }
        if !self.opacity.is_valid() || self.opacity.min < 0.0 || self.opacity.max > 1.0 {
            return invalid(format!("bad opacity range {:?}", self.opacity));
        }
        if !self.period.is_valid() || self.period.min <= 0.0 {
            return invalid(format!("bad period range {:?}", self.period));
        }
        if !self.color.is_finite() || !self.drift.is_finite() || !self.amplitude.is_finite() {
            return invalid("non-finite color, drift or amplitude".to_string());
        }
        match self.primitive {
            RenderPrimitive::Blob => {}
            RenderPrimitive::Glyph(c) => {
                if !c.is_ascii_graphic() {
                    return invalid(format!("glyph {c:?} is not printable ascii"));
                }
            }
            RenderPrimitive::Ray { length } => {
                if !(length > 0.0 && length.is_finite()) {
                    return invalid(format!("ray length {length}"));
                }
            }
        }
        Ok(())
    }

    /// Ambient field for this theme. Ambient layers never use turbulence.
    pub fn field_config(&self, seed: u64) -> FieldConfig {
        FieldConfig {
            count: self.count,
            size: self.size,
            opacity: self.opacity,
            kind: FieldKind::Ambient {
                drift: self.drift,
                margin: self.profile.reach(self.amplitude),
            },
            profile: self.profile,
            turbulence: None,
            seed,
        }
    }
}

/// Per-theme tweak loaded from configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThemeOverride {
    pub theme: Theme,
    #[serde(default)]
    pub count: Option<usize>,
    /// Multiplies both ends of the opacity range (clamped to 1).
    #[serde(default)]
    pub opacity_scale: Option<f32>,
    #[serde(default)]
    pub color: Option<Rgba>,
}

/// All theme configs, validated.
#[derive(Debug, Clone)]
pub struct ThemeCatalog {
    configs: Vec<ThemeConfig>,
}

impl ThemeCatalog {
    /// Built-in table. Fails if any entry is invalid.
    pub fn builtin() -> Result<Self> {
        let configs: Vec<ThemeConfig> = Theme::ALL.iter().map(|&t| ThemeConfig::for_theme(t)).collect();
        for c in &configs {
            c.validate()?;
        }
        Ok(Self { configs })
    }

    /// Apply overrides on top of this catalog and revalidate.
    pub fn with_overrides(mut self, overrides: &[ThemeOverride]) -> Result<Self> {
        for o in overrides {
            let cfg = &mut self.configs[o.theme as usize];
            if let Some(count) = o.count {
                cfg.count = count;
            }
            if let Some(scale) = o.opacity_scale {
                cfg.opacity = ValueRange::new(
                    (cfg.opacity.min * scale).min(1.0),
                    (cfg.opacity.max * scale).min(1.0),
                );
            }
            if let Some(color) = o.color {
                cfg.color = color;
            }
            cfg.validate()?;
            log::debug!("theme override applied: {}", o.theme);
        }
        Ok(self)
    }

    pub fn get(&self, theme: Theme) -> &ThemeConfig {
        &self.configs[theme as usize]
    }

    /// Look up a theme by id string.
    pub fn resolve(&self, id: &str) -> Result<&ThemeConfig> {
        Ok(self.get(id.parse()?))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ThemeConfig> {
        self.configs.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_is_valid() {
        let catalog = ThemeCatalog::builtin().unwrap();
        assert_eq!(catalog.iter().count(), Theme::ALL.len());
        for theme in Theme::ALL {
            assert_eq!(catalog.get(theme).theme, theme);
        }
    }

    #[test]
    fn theme_parse_is_case_insensitive() {
        assert_eq!("Forest".parse::<Theme>().unwrap(), Theme::Forest);
        assert_eq!(" TUNDRA ".parse::<Theme>().unwrap(), Theme::Tundra);
        for theme in Theme::ALL {
            assert_eq!(theme.as_str().parse::<Theme>().unwrap(), theme);
        }
    }

    #[test]
    fn unknown_theme_is_an_error() {
        let catalog = ThemeCatalog::builtin().unwrap();
        assert_eq!(
            catalog.resolve("lava").unwrap_err(),
            AtmosphereError::UnknownTheme("lava".into())
        );
    }

    #[test]
    fn theme_validation_rejects_bad_values() {
        let mut cfg = ThemeConfig::for_theme(Theme::Cave);
        cfg.count = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = ThemeConfig::for_theme(Theme::Forest);
        cfg.primitive = RenderPrimitive::Glyph('é');
        assert!(cfg.validate().is_err());

        let mut cfg = ThemeConfig::for_theme(Theme::Marsh);
        cfg.period = ValueRange::new(0.0, 1.0);
        assert!(cfg.validate().is_err());

        let mut cfg = ThemeConfig::for_theme(Theme::Desert);
        cfg.opacity = ValueRange::new(0.6, 0.2);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn overrides_apply_and_revalidate() {
        let catalog = ThemeCatalog::builtin().unwrap();
        let base_max = catalog.get(Theme::Cave).opacity.max;
        let tuned = catalog
            .clone()
            .with_overrides(&[ThemeOverride {
                theme: Theme::Cave,
                count: Some(12),
                opacity_scale: Some(0.5),
                color: None,
            }])
            .unwrap();
        assert_eq!(tuned.get(Theme::Cave).count, 12);
        assert!((tuned.get(Theme::Cave).opacity.max - base_max * 0.5).abs() < 1e-6);

        let broken = catalog.with_overrides(&[ThemeOverride {
            theme: Theme::Town,
            count: Some(0),
            opacity_scale: None,
            color: None,
        }]);
        assert!(broken.is_err());
    }

    #[test]
    fn field_config_is_ambient_without_turbulence() {
        let cfg = ThemeConfig::for_theme(Theme::Desert).field_config(5);
        assert!(matches!(cfg.kind, FieldKind::Ambient { drift, margin } if drift.x > 0.0 && margin.x >= 20.0));
        assert!(cfg.turbulence.is_none());
        assert!(cfg.validate().is_ok());
    }
}

//! Deterministic pseudo-turbulence for particle drift.
//!
//! Two independently seeded gradient-noise oscillators, each sampled along one
//! position axis and time, form a 2D displacement. The result depends only on
//! (position, time), so a replay with the same seed produces the same motion.

use glam::Vec2;
use noise::{NoiseFn, Perlin};
use serde::{Deserialize, Serialize};

/// Tunable turbulence parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TurbulenceConfig {
    /// Peak displacement speed in px/s.
    #[serde(default = "default_strength")]
    pub strength: f32,
    /// Spatial frequency (cycles per px).
    #[serde(default = "default_frequency")]
    pub frequency: f32,
    /// How fast the field evolves over time.
    #[serde(default = "default_time_scale")]
    pub time_scale: f32,
    #[serde(default)]
    pub seed: u64,
}

fn default_strength() -> f32 {
    8.0
}
fn default_frequency() -> f32 {
    0.01
}
fn default_time_scale() -> f32 {
    0.35
}

impl Default for TurbulenceConfig {
    fn default() -> Self {
        Self {
            strength: default_strength(),
            frequency: default_frequency(),
            time_scale: default_time_scale(),
            seed: 0,
        }
    }
}

/// Derive a noise seed for one oscillator from a field seed.
pub(crate) fn noise_seed(seed: u64, offset: u64) -> u32 {
    ((seed.wrapping_add(offset))
        .wrapping_mul(0x9e3779b97f4a7c15_u64)
        .wrapping_add(offset.wrapping_mul(0x6c078965_u64))
        >> 32) as u32
}

/// Seeded turbulence sampler.
pub struct Turbulence {
    config: TurbulenceConfig,
    x_osc: Perlin,
    y_osc: Perlin,
}

impl std::fmt::Debug for Turbulence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Turbulence").field("config", &self.config).finish()
    }
}

impl Turbulence {
    pub fn new(config: TurbulenceConfig) -> Self {
        Self {
            config,
            x_osc: Perlin::new(noise_seed(config.seed, 0)),
            y_osc: Perlin::new(noise_seed(config.seed, 1)),
        }
    }

    pub fn config(&self) -> &TurbulenceConfig {
        &self.config
    }

    /// Displacement velocity (px/s) at `position` and global `time`.
    ///
    /// The x component oscillates with the particle's y coordinate and the y
    /// component with its x coordinate, so neighbouring particles drift
    /// coherently instead of jittering independently.
    pub fn displacement(&self, position: Vec2, time: f32) -> Vec2 {
        if !position.is_finite() || !time.is_finite() {
            return Vec2::ZERO;
        }
        let freq = self.config.frequency as f64;
        let t = time as f64 * self.config.time_scale as f64;
        let dx = self.x_osc.get([position.y as f64 * freq, t]);
        // Offset the second oscillator in time so the axes never line up.
        let dy = self.y_osc.get([position.x as f64 * freq, t + 31.7]);
        Vec2::new(dx as f32, dy as f32) * self.config.strength
    }
}

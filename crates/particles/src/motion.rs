//! Declarative looping motion profiles for ambient particles.
//!
//! A profile is a closed-form function of elapsed time. Nothing is integrated
//! from frame to frame, and every profile returns to its starting state at the
//! end of each period, so particles loop without popping.

use glam::Vec2;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;

use crate::field::ValueRange;

/// Number of jitter keyframes in one drift loop.
pub const DRIFT_KEYFRAMES: usize = 4;

/// Fraction of the loop spent fading in (and out) for falling profiles.
const FADE_FRACTION: f32 = 0.1;

/// Particle archetype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MotionProfile {
    Dust,
    Leaf,
    Snow,
    Rain,
    Sand,
    Sunray,
    #[default]
    Default,
}

impl MotionProfile {
    /// Profiles whose loop moves the particle across the whole layer.
    pub fn is_falling(self) -> bool {
        matches!(self, MotionProfile::Leaf | MotionProfile::Snow | MotionProfile::Rain)
    }

    /// Largest offset a sample can add to the particle anchor, per axis.
    /// Falling profiles wrap vertically on their own, so only their sway counts.
    pub fn reach(self, amplitude: f32) -> Vec2 {
        let a = amplitude.abs();
        match self {
            MotionProfile::Dust | MotionProfile::Sand | MotionProfile::Default => Vec2::splat(2.0 * a),
            MotionProfile::Leaf | MotionProfile::Snow => Vec2::new(a, 0.0),
            MotionProfile::Rain | MotionProfile::Sunray => Vec2::ZERO,
        }
    }

    /// Evaluate the profile at elapsed time `t` (seconds).
    pub fn sample(self, params: &MotionParams, t: f32) -> MotionSample {
        let u = params.loop_position(t);
        match self {
            MotionProfile::Leaf => MotionSample {
                offset: Vec2::new(params.amplitude * (TAU * u * 2.0).sin(), params.travel * u),
                opacity: params.base_opacity * fade_envelope(u),
                rotation: 0.6 * (TAU * u).sin(),
            },
            MotionProfile::Snow => MotionSample {
                offset: Vec2::new(params.amplitude * (TAU * u * 3.0).sin(), params.travel * u),
                opacity: params.base_opacity * fade_envelope(u),
                rotation: 0.0,
            },
            MotionProfile::Rain => MotionSample {
                offset: Vec2::new(params.slant * u, params.travel * u),
                opacity: params.base_opacity * fade_envelope(u),
                rotation: params.slant.atan2(params.travel.max(f32::EPSILON)),
            },
            MotionProfile::Dust | MotionProfile::Sand => {
                let seg = u * DRIFT_KEYFRAMES as f32;
                let i = (seg.floor() as usize).min(DRIFT_KEYFRAMES - 1);
                let j = (i + 1) % DRIFT_KEYFRAMES;
                let f = smoothstep(seg - i as f32);
                let opacity = lerp(params.opacity_keys[i], params.opacity_keys[j], f);
                MotionSample {
                    offset: params.keyframes[i].lerp(params.keyframes[j], f),
                    opacity: params.base_opacity * opacity,
                    rotation: 0.0,
                }
            }
            MotionProfile::Sunray => MotionSample {
                offset: Vec2::ZERO,
                opacity: params.base_opacity * (0.65 + 0.35 * (TAU * u).sin()),
                rotation: params.anchor_angle + params.amplitude * (TAU * u).sin(),
            },
            MotionProfile::Default => MotionSample {
                offset: params.amplitude * Vec2::new((TAU * u).cos() - 1.0, (TAU * u).sin()),
                opacity: params.base_opacity,
                rotation: 0.0,
            },
        }
    }
}

/// Per-particle parameters for a profile.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionParams {
    /// Loop length in seconds.
    pub period: f32,
    /// Loop offset in 0..1 so particles don't move in unison.
    pub phase: f32,
    /// Sway/jitter distance in px, or swing angle in radians for rays.
    pub amplitude: f32,
    /// Vertical distance covered per loop (falling profiles).
    pub travel: f32,
    /// Horizontal distance covered per loop (rain).
    pub slant: f32,
    /// Resting angle for rays, radians from straight down.
    pub anchor_angle: f32,
    pub base_opacity: f32,
    pub keyframes: [Vec2; DRIFT_KEYFRAMES],
    pub opacity_keys: [f32; DRIFT_KEYFRAMES],
}

impl MotionParams {
    /// Roll parameters for one particle.
    pub fn generate(
        profile: MotionProfile,
        rng: &mut impl Rng,
        period: ValueRange,
        amplitude: f32,
        travel: f32,
        base_opacity: f32,
    ) -> Self {
        let period = period.lerp(rng.gen()).max(f32::EPSILON);
        let phase = rng.gen::<f32>();
        let jitter = match profile {
            MotionProfile::Sand => Vec2::new(amplitude * 2.0, amplitude * 0.5),
            _ => Vec2::splat(amplitude),
        };
        let mut keyframes = [Vec2::ZERO; DRIFT_KEYFRAMES];
        let mut opacity_keys = [1.0; DRIFT_KEYFRAMES];
        for (k, o) in keyframes.iter_mut().zip(opacity_keys.iter_mut()).skip(1) {
            *k = Vec2::new(rng.gen::<f32>() - 0.5, rng.gen::<f32>() - 0.5) * 2.0 * jitter;
            *o = 0.4 + rng.gen::<f32>() * 0.6;
        }
        Self {
            period,
            phase,
            amplitude,
            travel,
            slant: match profile {
                MotionProfile::Rain => travel * (0.15 + rng.gen::<f32>() * 0.15),
                _ => 0.0,
            },
            anchor_angle: match profile {
                MotionProfile::Sunray => (rng.gen::<f32>() - 0.5) * 0.8,
                _ => 0.0,
            },
            base_opacity,
            keyframes,
            opacity_keys,
        }
    }

    /// Position within the current loop, in 0..1.
    pub fn loop_position(&self, t: f32) -> f32 {
        let u = (t / self.period + self.phase).rem_euclid(1.0);
        // rem_euclid can round up to exactly 1.0 for tiny negative inputs.
        if u >= 1.0 { 0.0 } else { u }
    }
}

/// Derived per-frame state of one particle.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MotionSample {
    pub offset: Vec2,
    pub opacity: f32,
    /// Radians; rays and rain measure from straight down.
    pub rotation: f32,
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

fn smoothstep(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Zero at both loop ends, one in the middle stretch.
fn fade_envelope(u: f32) -> f32 {
    (u / FADE_FRACTION).min((1.0 - u) / FADE_FRACTION).clamp(0.0, 1.0)
}

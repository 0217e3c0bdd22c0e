//! Fixed-size particle fields.
//!
//! A [`ParticleField`] owns every particle of one rendering layer. Particles
//! that leave the drawable region are recycled in place, so the particle count
//! never changes after creation. Two layouts exist:
//!
//! - **Edge** fields (fog of war): every particle belongs to one surface edge,
//!   spawns inside a depth band next to it and drifts slowly outward.
//! - **Ambient** fields (theme particles): particles fill the whole surface,
//!   are sorted into back/mid/front depth layers for a parallax look, and
//!   wrap around when they drift out.

use engine_core::{AtmosphereError, Result};
use glam::Vec2;
use rand::prelude::*;
use serde::{Deserialize, Serialize};

use crate::motion::MotionProfile;
use crate::turbulence::{Turbulence, TurbulenceConfig};

/// Upper bound on particles in one field.
pub const MAX_FIELD_PARTICLES: usize = 4096;

/// Closed interval used for every tunable range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f32,
    pub max: f32,
}

impl ValueRange {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Interpolate; `t` in 0..=1 yields a value inside the range.
    pub fn lerp(&self, t: f32) -> f32 {
        self.min + (self.max - self.min) * t
    }

    pub fn clamp(&self, v: f32) -> f32 {
        v.clamp(self.min, self.max)
    }

    pub fn contains(&self, v: f32) -> bool {
        v >= self.min && v <= self.max
    }

    pub fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min <= self.max
    }
}

/// The surface edge a fog particle belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Edge {
    Top,
    Right,
    Bottom,
    Left,
}

impl Edge {
    pub const ALL: [Edge; 4] = [Edge::Top, Edge::Right, Edge::Bottom, Edge::Left];

    /// Unit vector pointing out of the surface through this edge.
    pub fn outward(self) -> Vec2 {
        match self {
            Edge::Top => Vec2::new(0.0, -1.0),
            Edge::Right => Vec2::new(1.0, 0.0),
            Edge::Bottom => Vec2::new(0.0, 1.0),
            Edge::Left => Vec2::new(-1.0, 0.0),
        }
    }

    /// Length of the edge itself.
    pub fn lateral_span(self, surface: Vec2) -> f32 {
        match self {
            Edge::Top | Edge::Bottom => surface.x,
            Edge::Left | Edge::Right => surface.y,
        }
    }

    /// Extent of the surface measured away from this edge.
    pub fn depth_span(self, surface: Vec2) -> f32 {
        match self {
            Edge::Top | Edge::Bottom => surface.y,
            Edge::Left | Edge::Right => surface.x,
        }
    }

    /// Distance of `pos` from the edge, positive into the interior.
    pub fn depth_of(self, pos: Vec2, surface: Vec2) -> f32 {
        match self {
            Edge::Top => pos.y,
            Edge::Right => surface.x - pos.x,
            Edge::Bottom => surface.y - pos.y,
            Edge::Left => pos.x,
        }
    }

    /// Coordinate of `pos` along the edge.
    pub fn lateral_of(self, pos: Vec2) -> f32 {
        match self {
            Edge::Top | Edge::Bottom => pos.x,
            Edge::Left | Edge::Right => pos.y,
        }
    }

    /// Inverse of (`lateral_of`, `depth_of`).
    pub fn point(self, lateral: f32, depth: f32, surface: Vec2) -> Vec2 {
        match self {
            Edge::Top => Vec2::new(lateral, depth),
            Edge::Right => Vec2::new(surface.x - depth, lateral),
            Edge::Bottom => Vec2::new(lateral, surface.y - depth),
            Edge::Left => Vec2::new(depth, lateral),
        }
    }
}

/// Parallax grouping. Back particles are larger, dimmer and slower; front
/// particles are smaller, brighter and faster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DepthLayer {
    Back,
    Mid,
    Front,
}

impl DepthLayer {
    pub const ALL: [DepthLayer; 3] = [DepthLayer::Back, DepthLayer::Mid, DepthLayer::Front];

    /// Slice of the configured size range this layer draws from, as
    /// fractions of that range.
    pub fn size_band(self) -> ValueRange {
        match self {
            DepthLayer::Back => ValueRange::new(0.6, 1.0),
            DepthLayer::Mid => ValueRange::new(0.3, 0.7),
            DepthLayer::Front => ValueRange::new(0.0, 0.4),
        }
    }

    /// Slice of the configured opacity range, as fractions of that range.
    pub fn opacity_band(self) -> ValueRange {
        match self {
            DepthLayer::Back => ValueRange::new(0.0, 0.4),
            DepthLayer::Mid => ValueRange::new(0.3, 0.7),
            DepthLayer::Front => ValueRange::new(0.6, 1.0),
        }
    }

    pub fn speed_mult(self) -> f32 {
        match self {
            DepthLayer::Back => 0.5,
            DepthLayer::Mid => 1.0,
            DepthLayer::Front => 1.6,
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

/// A single recyclable particle.
#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    /// Surface-local position in CSS pixels.
    pub position: Vec2,
    /// Velocity in px/s.
    pub velocity: Vec2,
    /// Edge of origin (fog particles only).
    pub edge: Option<Edge>,
    pub size: f32,
    /// Base opacity before any per-frame modulation.
    pub opacity: f32,
    /// Oscillation phase in radians.
    pub phase: f32,
    pub layer: DepthLayer,
    pub profile: MotionProfile,
}

impl Particle {
    pub fn is_finite(&self) -> bool {
        self.position.is_finite()
            && self.velocity.is_finite()
            && self.size.is_finite()
            && self.opacity.is_finite()
            && self.phase.is_finite()
    }
}

/// Edge-band tuning for fog fields. These are visually tuned values, so all
/// of them come from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeTuning {
    /// Particles spawn within this many px of their edge.
    #[serde(default = "default_depth_band")]
    pub depth_band: f32,
    /// Particles deeper than this are recycled back to their edge.
    #[serde(default = "default_recycle_depth")]
    pub recycle_depth: f32,
    /// Outward drift speed in px/s.
    #[serde(default = "default_drift_speed")]
    pub drift_speed: ValueRange,
    /// Max tangential speed in px/s.
    #[serde(default = "default_tangential_jitter")]
    pub tangential_jitter: f32,
}

fn default_depth_band() -> f32 {
    60.0
}
fn default_recycle_depth() -> f32 {
    120.0
}
fn default_drift_speed() -> ValueRange {
    ValueRange::new(2.0, 9.0)
}
fn default_tangential_jitter() -> f32 {
    6.0
}

impl Default for EdgeTuning {
    fn default() -> Self {
        Self {
            depth_band: default_depth_band(),
            recycle_depth: default_recycle_depth(),
            drift_speed: default_drift_speed(),
            tangential_jitter: default_tangential_jitter(),
        }
    }
}

/// Layout of a field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldKind {
    Edge(EdgeTuning),
    /// Uniform placement with a shared drift velocity (px/s). Anchors wrap
    /// once they are `size + margin` past an edge, so a drawn offset of up to
    /// `margin` never shows the jump.
    Ambient { drift: Vec2, margin: Vec2 },
}

/// Everything needed to build a field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldConfig {
    pub count: usize,
    pub size: ValueRange,
    pub opacity: ValueRange,
    pub kind: FieldKind,
    pub profile: MotionProfile,
    /// `None` disables turbulence entirely.
    pub turbulence: Option<TurbulenceConfig>,
    pub seed: u64,
}

impl FieldConfig {
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| Err(AtmosphereError::InvalidConfig(reason));
        if self.count > MAX_FIELD_PARTICLES {
            return invalid(format!("particle count {} exceeds {}", self.count, MAX_FIELD_PARTICLES));
        }
        if !self.size.is_valid() || self.size.min < 0.0 {
            return invalid(format!("bad size range {:?}", self.size));
        }
        if !self.opacity.is_valid() || self.opacity.min < 0.0 || self.opacity.max > 1.0 {
            return invalid(format!("bad opacity range {:?}", self.opacity));
        }
        match self.kind {
            FieldKind::Edge(tuning) => {
                if !(tuning.depth_band >= 0.0 && tuning.recycle_depth >= tuning.depth_band) {
                    return invalid(format!(
                        "recycle depth {} must be >= depth band {}",
                        tuning.recycle_depth, tuning.depth_band
                    ));
                }
                if !tuning.drift_speed.is_valid() || !tuning.tangential_jitter.is_finite() {
                    return invalid("bad edge drift".to_string());
                }
            }
            FieldKind::Ambient { drift, margin } => {
                if !drift.is_finite() {
                    return invalid("ambient drift must be finite".to_string());
                }
                if !(margin.is_finite() && margin.min_element() >= 0.0) {
                    return invalid(format!("bad ambient wrap margin {margin:?}"));
                }
            }
        }
        Ok(())
    }
}

/// Fixed-size set of particles for one rendering layer.
#[derive(Debug)]
pub struct ParticleField {
    config: FieldConfig,
    particles: Vec<Particle>,
    surface: Vec2,
    rng: StdRng,
    turbulence: Option<Turbulence>,
    /// Global simulation time in seconds.
    time: f32,
    frame: u64,
    recycled: u64,
}

impl ParticleField {
    /// Allocate `config.count` particles over a `width` × `height` surface.
    pub fn new(config: FieldConfig, width: f32, height: f32) -> Self {
        let surface = Vec2::new(width.max(0.0), height.max(0.0));
        let turbulence = config.turbulence.map(Turbulence::new);
        let mut field = Self {
            particles: Vec::with_capacity(config.count),
            rng: StdRng::seed_from_u64(config.seed),
            config,
            surface,
            turbulence,
            time: 0.0,
            frame: 0,
            recycled: 0,
        };
        for _ in 0..field.config.count {
            let particle = match field.config.kind {
                FieldKind::Edge(tuning) => {
                    let edge = Edge::ALL[field.rng.gen_range(0..Edge::ALL.len())];
                    field.spawn_on_edge(edge, tuning)
                }
                FieldKind::Ambient { drift, .. } => field.spawn_ambient(drift),
            };
            field.particles.push(particle);
        }
        log::debug!(
            "particle field created: {} particles over {}x{}",
            field.particles.len(),
            surface.x,
            surface.y
        );
        field
    }

    /// Advance every particle by `dt` seconds.
    pub fn update(&mut self, dt: f32) {
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        self.time += dt;
        self.frame += 1;

        let surface = self.surface;
        for i in 0..self.particles.len() {
            let turb = match &self.turbulence {
                Some(t) => t.displacement(self.particles[i].position, self.time),
                None => Vec2::ZERO,
            };
            let p = &mut self.particles[i];
            p.position += (p.velocity + turb) * dt;
            p.phase = (p.phase + dt).rem_euclid(std::f32::consts::TAU);

            match self.config.kind {
                FieldKind::Edge(tuning) => {
                    let edge = p.edge.unwrap_or(Edge::Top);
                    if Self::edge_out_of_bounds(p, edge, tuning, surface) {
                        let fresh = self.spawn_on_edge(edge, tuning);
                        self.particles[i] = fresh;
                        self.recycled += 1;
                    }
                }
                FieldKind::Ambient { drift, margin } => {
                    if !p.is_finite() {
                        let fresh = self.spawn_ambient(drift);
                        self.particles[i] = fresh;
                        self.recycled += 1;
                        continue;
                    }
                    let m = Vec2::splat(p.size) + margin;
                    if p.position.y > surface.y + m.y {
                        p.position.y = -m.y;
                        let x = self.rng.gen::<f32>() * surface.x;
                        self.particles[i].position.x = x;
                    } else if p.position.y < -m.y {
                        p.position.y = surface.y + m.y;
                    }
                    let p = &mut self.particles[i];
                    if p.position.x > surface.x + m.x {
                        p.position.x = -m.x;
                    } else if p.position.x < -m.x {
                        p.position.x = surface.x + m.x;
                    }
                }
            }
        }
    }

    fn edge_out_of_bounds(p: &Particle, edge: Edge, tuning: EdgeTuning, surface: Vec2) -> bool {
        if !p.is_finite() {
            return true;
        }
        let depth = edge.depth_of(p.position, surface);
        let lateral = edge.lateral_of(p.position);
        let depth_limit = tuning.recycle_depth.min(edge.depth_span(surface));
        depth > depth_limit
            || depth < -p.size
            || lateral < -p.size
            || lateral > edge.lateral_span(surface) + p.size
    }

    fn roll_layer(&mut self) -> DepthLayer {
        DepthLayer::ALL[self.rng.gen_range(0..DepthLayer::ALL.len())]
    }

    /// Size and opacity for a layer, always inside the configured ranges.
    fn roll_appearance(&mut self, layer: DepthLayer) -> (f32, f32) {
        let size_t = layer.size_band().lerp(self.rng.gen());
        let opacity_t = layer.opacity_band().lerp(self.rng.gen());
        (
            self.config.size.clamp(self.config.size.lerp(size_t)),
            self.config.opacity.clamp(self.config.opacity.lerp(opacity_t)),
        )
    }

    fn spawn_on_edge(&mut self, edge: Edge, tuning: EdgeTuning) -> Particle {
        let layer = self.roll_layer();
        let (size, opacity) = self.roll_appearance(layer);
        let band = tuning.depth_band.min(edge.depth_span(self.surface)).max(0.0);
        // Squaring biases spawns toward the edge itself.
        let depth_t: f32 = self.rng.gen();
        let depth = band * depth_t * depth_t;
        let lateral = self.rng.gen::<f32>() * edge.lateral_span(self.surface);
        let outward = edge.outward();
        let tangent = outward.perp();
        let speed = tuning.drift_speed.lerp(self.rng.gen()) * layer.speed_mult();
        let jitter = (self.rng.gen::<f32>() - 0.5) * 2.0 * tuning.tangential_jitter;
        Particle {
            position: edge.point(lateral, depth, self.surface),
            velocity: outward * speed + tangent * jitter,
            edge: Some(edge),
            size,
            opacity,
            phase: self.rng.gen::<f32>() * std::f32::consts::TAU,
            layer,
            profile: self.config.profile,
        }
    }

    fn spawn_ambient(&mut self, drift: Vec2) -> Particle {
        let layer = self.roll_layer();
        let (size, opacity) = self.roll_appearance(layer);
        let position = Vec2::new(
            self.rng.gen::<f32>() * self.surface.x,
            self.rng.gen::<f32>() * self.surface.y,
        );
        // Slight per-particle speed variance keeps drifting layers from
        // moving in lockstep.
        let variance = 0.75 + self.rng.gen::<f32>() * 0.5;
        Particle {
            position,
            velocity: drift * layer.speed_mult() * variance,
            edge: None,
            size,
            opacity,
            phase: self.rng.gen::<f32>() * std::f32::consts::TAU,
            layer,
            profile: self.config.profile,
        }
    }

    /// Visit every particle without mutating the field.
    pub fn for_each(&self, mut visitor: impl FnMut(&Particle)) {
        for p in &self.particles {
            visitor(p);
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Particle> {
        self.particles.iter()
    }

    /// Mutable access to one particle (host-side nudges, fault injection).
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Particle> {
        self.particles.get_mut(index)
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn config(&self) -> &FieldConfig {
        &self.config
    }

    pub fn surface_size(&self) -> Vec2 {
        self.surface
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Total recycles since creation.
    pub fn recycled_count(&self) -> u64 {
        self.recycled
    }

    /// Draw a value from the field's seeded generator.
    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }
}

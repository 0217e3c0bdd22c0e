//! Fog of war: an edge vignette plus drifting particle blobs.
//!
//! The renderer owns one [`ParticleField`] of edge particles and one raster
//! surface sized to the host container. Sizing is lazy: a zero-area
//! container defers the renderer and arms a bounded retry timer that polls the
//! container on later frames.

use engine_core::{AtmosphereError, FrameContext, FrameHandle, FrameScheduler, Result, Rgba, Rgba8};
use glam::Vec2;
use particles::{EdgeTuning, FieldConfig, FieldKind, MotionProfile, ParticleField, TurbulenceConfig, ValueRange};
use serde::{Deserialize, Serialize};
use std::rc::Rc;

use crate::container::{has_area, ContainerMetrics};
use crate::surface::{GradientDir, RasterSurface};

/// How long and how often a deferred renderer polls its container.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_retry_interval")]
    pub interval_secs: f32,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_retry_interval() -> f32 {
    0.1
}
fn default_max_attempts() -> u32 {
    50
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval_secs: default_retry_interval(),
            max_attempts: default_max_attempts(),
        }
    }
}

/// Fog renderer settings (the `fog` section of the atmosphere config).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FogSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Nested gradient bands per edge.
    #[serde(default = "default_layer_count")]
    pub layer_count: u32,
    /// Depth in px at which the vignette becomes fully transparent.
    #[serde(default = "default_fog_depth")]
    pub fog_depth: f32,
    #[serde(default = "default_fog_color")]
    pub color: Rgba,
    /// Combined opacity of all bands at the outer edge.
    #[serde(default = "default_max_opacity")]
    pub max_opacity: f32,
    #[serde(default = "default_true")]
    pub layered: bool,
    #[serde(default = "default_particle_count")]
    pub particle_count: usize,
    #[serde(default = "default_particle_size")]
    pub particle_size: ValueRange,
    #[serde(default = "default_particle_opacity")]
    pub particle_opacity: ValueRange,
    #[serde(default)]
    pub edge: EdgeTuning,
    /// `None` disables turbulence.
    #[serde(default = "default_turbulence")]
    pub turbulence: Option<TurbulenceConfig>,
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_true() -> bool {
    true
}
fn default_layer_count() -> u32 {
    4
}
fn default_fog_depth() -> f32 {
    120.0
}
fn default_fog_color() -> Rgba {
    Rgba::from_rgb8(8, 8, 14)
}
fn default_max_opacity() -> f32 {
    0.85
}
fn default_particle_count() -> usize {
    200
}
fn default_particle_size() -> ValueRange {
    ValueRange::new(8.0, 24.0)
}
fn default_particle_opacity() -> ValueRange {
    ValueRange::new(0.1, 0.4)
}
fn default_turbulence() -> Option<TurbulenceConfig> {
    Some(TurbulenceConfig::default())
}

impl Default for FogSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            layer_count: default_layer_count(),
            fog_depth: default_fog_depth(),
            color: default_fog_color(),
            max_opacity: default_max_opacity(),
            layered: true,
            particle_count: default_particle_count(),
            particle_size: default_particle_size(),
            particle_opacity: default_particle_opacity(),
            edge: EdgeTuning::default(),
            turbulence: default_turbulence(),
            seed: 0,
            retry: RetryPolicy::default(),
        }
    }
}

impl FogSettings {
    pub fn field_config(&self) -> FieldConfig {
        FieldConfig {
            count: self.particle_count,
            size: self.particle_size,
            opacity: self.particle_opacity,
            kind: FieldKind::Edge(self.edge),
            profile: MotionProfile::Default,
            turbulence: self.turbulence.map(|t| TurbulenceConfig { seed: t.seed ^ self.seed, ..t }),
            seed: self.seed,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| Err(AtmosphereError::InvalidConfig(format!("fog: {reason}")));
        if self.layer_count == 0 || self.layer_count > 32 {
            return invalid(format!("layer_count {} outside 1..=32", self.layer_count));
        }
        if !(self.fog_depth > 0.0 && self.fog_depth.is_finite()) {
            return invalid(format!("fog_depth {}", self.fog_depth));
        }
        if !(0.0..=1.0).contains(&self.max_opacity) {
            return invalid(format!("max_opacity {}", self.max_opacity));
        }
        if !self.color.is_finite() {
            return invalid("color is not finite".to_string());
        }
        if !(self.retry.interval_secs > 0.0 && self.retry.interval_secs.is_finite()) {
            return invalid(format!("retry interval {}", self.retry.interval_secs));
        }
        self.field_config().validate()
    }
}

/// Lifecycle of a [`FogRenderer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FogState {
    /// Created, never sized.
    Idle,
    /// Waiting for the container to get an area.
    Deferred,
    Active,
    Destroyed,
}

#[derive(Debug, Clone, Copy)]
struct RetryTimer {
    attempts: u32,
    countdown: f32,
}

pub struct FogRenderer {
    settings: FogSettings,
    container: Option<Rc<dyn ContainerMetrics>>,
    surface: Option<RasterSurface>,
    field: Option<ParticleField>,
    handle: Option<FrameHandle>,
    state: FogState,
    retry: Option<RetryTimer>,
    skipped: u64,
    frames_drawn: u64,
}

impl FogRenderer {
    pub fn new(settings: FogSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            settings,
            container: None,
            surface: None,
            field: None,
            handle: None,
            state: FogState::Idle,
            retry: None,
            skipped: 0,
            frames_drawn: 0,
        })
    }

    pub fn attach(&mut self, container: Rc<dyn ContainerMetrics>) {
        if self.state == FogState::Destroyed {
            return;
        }
        self.container = Some(container);
    }

    /// Re-read the attached container's size. Restarts the retry budget.
    pub fn resize(&mut self) -> Result<()> {
        self.retry = None;
        self.resize_from_container()
    }

    fn resize_from_container(&mut self) -> Result<()> {
        let Some(container) = self.container.clone() else {
            return self.defer("no container attached".to_string());
        };
        if !container.is_attached() {
            return self.defer("container detached".to_string());
        }
        let size = container.size();
        self.size_to(size.x, size.y, container.device_pixel_ratio())
    }

    /// Size the renderer to `width` × `height` CSS px. Zero area defers.
    /// Restarts the retry budget.
    pub fn resize_to(&mut self, width: f32, height: f32, dpr: f32) -> Result<()> {
        self.retry = None;
        self.size_to(width, height, dpr)
    }

    fn size_to(&mut self, width: f32, height: f32, dpr: f32) -> Result<()> {
        if self.state == FogState::Destroyed {
            return Ok(());
        }
        if !has_area(Vec2::new(width, height)) {
            return self.defer(format!("container is {width}x{height}"));
        }
        let surface = RasterSurface::new(width, height, dpr)?;
        self.field = Some(ParticleField::new(self.settings.field_config(), width, height));
        log::info!(
            "fog renderer sized to {}x{} css ({}x{} device)",
            width,
            height,
            surface.width(),
            surface.height()
        );
        self.surface = Some(surface);
        self.state = FogState::Active;
        self.retry = None;
        Ok(())
    }

    fn defer(&mut self, reason: String) -> Result<()> {
        self.state = FogState::Deferred;
        self.surface = None;
        self.field = None;
        // Retries keep counting; `resize` and `resize_to` start from zero.
        let attempts = self.retry.map_or(0, |r| r.attempts);
        if attempts < self.settings.retry.max_attempts {
            self.retry = Some(RetryTimer {
                attempts,
                countdown: self.settings.retry.interval_secs,
            });
        }
        log::debug!("fog renderer deferred: {reason}");
        Err(AtmosphereError::EnvironmentNotReady(reason))
    }

    /// Register with the frame scheduler.
    pub fn start(&mut self, scheduler: &mut FrameScheduler) -> Option<FrameHandle> {
        if self.state == FogState::Destroyed {
            return None;
        }
        if let Some(handle) = self.handle.filter(|h| scheduler.is_active(*h)) {
            return Some(handle);
        }
        let handle = scheduler.request_frame();
        self.handle = Some(handle);
        Some(handle)
    }

    /// Draw one frame. No-op unless started and sized.
    pub fn render_frame(&mut self, ctx: &FrameContext) {
        if self.handle.is_none() {
            return;
        }
        if self.state == FogState::Deferred {
            self.poll_retry(ctx.dt);
        } else if self.state == FogState::Active && self.container_changed() {
            if let Err(e) = self.resize() {
                log::debug!("fog renderer lost its container area: {e}");
            }
        }
        if self.state != FogState::Active {
            return;
        }
        let (Some(surface), Some(field)) = (self.surface.as_mut(), self.field.as_mut()) else {
            return;
        };

        surface.clear(Rgba8::TRANSPARENT);
        if self.settings.layered {
            draw_bands(surface, &self.settings);
        }

        field.update(ctx.dt);
        let mut skipped = 0u32;
        let color = self.settings.color;
        for p in field.iter() {
            if !p.is_finite() || p.size <= 0.0 || p.opacity <= 0.0 {
                skipped += 1;
                continue;
            }
            // Slow breathing keeps static blobs from looking pasted on.
            let radius = p.size * (1.0 + 0.15 * p.phase.sin());
            surface.fill_radial(p.position, radius, color.with_alpha(p.opacity));
        }
        if skipped > 0 {
            log::debug!("fog frame {}: skipped {} degenerate particles", ctx.index, skipped);
            self.skipped += skipped as u64;
        }
        self.frames_drawn += 1;
    }

    fn poll_retry(&mut self, dt: f32) {
        let Some(mut timer) = self.retry else {
            return;
        };
        timer.countdown -= dt.max(0.0);
        if timer.countdown > 0.0 {
            self.retry = Some(timer);
            return;
        }
        timer.attempts += 1;
        self.retry = Some(timer);
        if self.resize_from_container().is_ok() {
            log::info!("fog renderer activated after {} retries", timer.attempts);
            return;
        }
        if timer.attempts >= self.settings.retry.max_attempts {
            log::warn!(
                "fog renderer gave up after {} attempts; waiting for an explicit resize",
                timer.attempts
            );
            self.retry = None;
        }
    }

    /// True when the attached container no longer matches the current surface.
    fn container_changed(&self) -> bool {
        let Some(container) = &self.container else {
            return false;
        };
        if !container.is_attached() {
            return true;
        }
        let sized = self.field.as_ref().map(|f| f.surface_size());
        let dpr = self.surface.as_ref().map(|s| s.dpr());
        sized != Some(container.size()) || dpr != Some(container.device_pixel_ratio())
    }

    /// Cancel the frame handle and release everything. Idempotent.
    pub fn destroy(&mut self, scheduler: &mut FrameScheduler) {
        if let Some(handle) = self.handle.take() {
            scheduler.cancel(handle);
        }
        if self.state != FogState::Destroyed {
            log::debug!("fog renderer destroyed after {} frames", self.frames_drawn);
        }
        self.container = None;
        self.surface = None;
        self.field = None;
        self.retry = None;
        self.state = FogState::Destroyed;
    }

    pub fn state(&self) -> FogState {
        self.state
    }

    pub fn settings(&self) -> &FogSettings {
        &self.settings
    }

    pub fn surface(&self) -> Option<&RasterSurface> {
        self.surface.as_ref()
    }

    pub fn field(&self) -> Option<&ParticleField> {
        self.field.as_ref()
    }

    pub fn field_mut(&mut self) -> Option<&mut ParticleField> {
        self.field.as_mut()
    }

    /// Degenerate particles skipped since creation.
    pub fn skipped_particles(&self) -> u64 {
        self.skipped
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }

    /// Retry attempts used by the running timer, `None` if no timer is armed.
    pub fn retry_attempts(&self) -> Option<u32> {
        self.retry.map(|r| r.attempts)
    }
}

/// Nested edge bands: band `i` reaches `fog_depth * (L - i) / L`, so the outer
/// strip is covered by every band and reads most opaque.
fn draw_bands(surface: &mut RasterSurface, settings: &FogSettings) {
    let size = surface.css_size();
    let layers = settings.layer_count as f32;
    let solid = settings.color.with_alpha(settings.max_opacity / layers);
    let clear = settings.color.with_alpha(0.0);
    for i in 0..settings.layer_count {
        let depth = settings.fog_depth * (layers - i as f32) / layers;
        let dx = depth.min(size.x);
        let dy = depth.min(size.y);
        surface.fill_gradient_rect(Vec2::ZERO, Vec2::new(size.x, dy), solid, clear, GradientDir::Down);
        surface.fill_gradient_rect(Vec2::new(0.0, size.y - dy), size, solid, clear, GradientDir::Up);
        surface.fill_gradient_rect(Vec2::ZERO, Vec2::new(dx, size.y), solid, clear, GradientDir::Right);
        surface.fill_gradient_rect(Vec2::new(size.x - dx, 0.0), size, solid, clear, GradientDir::Left);
    }
}

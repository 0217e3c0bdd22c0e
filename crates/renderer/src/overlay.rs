//! Theme-driven ambient particles locked to the map viewport.
//!
//! The overlay keeps one [`OverlayLayer`] the exact size of the map content.
//! Particle anchors come from an ambient [`ParticleField`]; each particle's
//! visible motion is a closed-form loop from its [`MotionParams`], so drawing a
//! frame never integrates motion state. The viewport transform is applied
//! at draw time, which keeps the layer pixel-aligned with the map under pan
//! and zoom.

use engine_core::{AtmosphereError, FrameContext, FrameHandle, FrameScheduler, Result, Rgba8, ViewTransform};
use glam::Vec2;
use particles::{
    MotionParams, MotionProfile, ParticleField, RenderPrimitive, Theme, ThemeCatalog, ThemeConfig,
};
use serde::{Deserialize, Serialize};
use std::rc::Rc;

use crate::container::{has_area, ContainerMetrics};
use crate::surface::RasterSurface;
use crate::vertex::{OverlayMesh, Sprite, SpriteBatch, SpriteShape};

/// Overlay settings (the `overlay` section of the atmosphere config).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlaySettings {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub seed: u64,
}

fn default_enabled() -> bool {
    true
}

impl Default for OverlaySettings {
    fn default() -> Self {
        Self { enabled: true, seed: 0 }
    }
}

/// Result of a [`AmbientParticleOverlay::mount`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountOutcome {
    Mounted,
    /// Same theme on the same live container; nothing changed.
    AlreadyMounted,
    /// A layer for another theme or container was replaced.
    Rebuilt,
    /// Container has no area yet; the mount completes on a later frame.
    Staged,
}

/// The composited particle layer for one theme.
pub struct OverlayLayer {
    theme: Theme,
    config: ThemeConfig,
    container: Rc<dyn ContainerMetrics>,
    size: Vec2,
    field: ParticleField,
    motion: Vec<MotionParams>,
}

impl OverlayLayer {
    fn build(config: ThemeConfig, container: Rc<dyn ContainerMetrics>, size: Vec2, seed: u64) -> Self {
        let mut field = ParticleField::new(config.field_config(seed), size.x, size.y);
        let mut motion = Vec::with_capacity(field.len());
        let sizes: Vec<(f32, f32)> = field.iter().map(|p| (p.size, p.opacity)).collect();
        for (particle_size, opacity) in sizes {
            // Falling profiles cross the whole layer plus a margin each loop.
            let travel = size.y + 2.0 * particle_size;
            motion.push(MotionParams::generate(
                config.profile,
                field.rng(),
                config.period,
                config.amplitude,
                travel,
                opacity,
            ));
        }
        Self {
            theme: config.theme,
            config,
            container,
            size,
            field,
            motion,
        }
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    pub fn size(&self) -> Vec2 {
        self.size
    }

    pub fn field(&self) -> &ParticleField {
        &self.field
    }
}

struct PendingMount {
    theme: Theme,
    config: ThemeConfig,
    container: Rc<dyn ContainerMetrics>,
}

pub struct AmbientParticleOverlay {
    settings: OverlaySettings,
    layer: Option<OverlayLayer>,
    pending: Option<PendingMount>,
    transform: ViewTransform,
    elapsed: f32,
    handle: Option<FrameHandle>,
    generation: u64,
    destroyed: bool,
}

impl AmbientParticleOverlay {
    pub fn new(settings: OverlaySettings) -> Self {
        Self {
            settings,
            layer: None,
            pending: None,
            transform: ViewTransform::IDENTITY,
            elapsed: 0.0,
            handle: None,
            generation: 0,
            destroyed: false,
        }
    }

    /// Register with the frame scheduler.
    pub fn start(&mut self, scheduler: &mut FrameScheduler) -> Option<FrameHandle> {
        if self.destroyed {
            return None;
        }
        if let Some(handle) = self.handle.filter(|h| scheduler.is_active(*h)) {
            return Some(handle);
        }
        let handle = scheduler.request_frame();
        self.handle = Some(handle);
        Some(handle)
    }

    /// Mount the layer for `theme` over `container`.
    pub fn mount(
        &mut self,
        container: Rc<dyn ContainerMetrics>,
        theme: Theme,
        catalog: &ThemeCatalog,
    ) -> Result<MountOutcome> {
        if self.destroyed {
            return Err(AtmosphereError::MissingCapability("ambient overlay destroyed"));
        }
        if let Some(layer) = &self.layer {
            if layer.theme == theme && Rc::ptr_eq(&layer.container, &container) && container.is_attached() {
                return Ok(MountOutcome::AlreadyMounted);
            }
        }
        let config = catalog.get(theme).clone();
        config.validate()?;

        let replaced = self.layer.take().is_some();
        if replaced {
            log::info!("ambient overlay: tearing down layer for rebuild as {theme}");
        }
        let size = container.size();
        if !container.is_attached() || !has_area(size) {
            log::debug!("ambient overlay: {theme} staged until the container has an area");
            self.pending = Some(PendingMount { theme, config, container });
            return Ok(MountOutcome::Staged);
        }
        self.pending = None;
        self.install(config, container, size);
        Ok(if replaced { MountOutcome::Rebuilt } else { MountOutcome::Mounted })
    }

    fn install(&mut self, config: ThemeConfig, container: Rc<dyn ContainerMetrics>, size: Vec2) {
        let theme = config.theme;
        let seed = self.settings.seed ^ (theme as u64).wrapping_mul(0x9e3779b97f4a7c15);
        self.layer = Some(OverlayLayer::build(config, container, size, seed));
        self.generation += 1;
        log::info!(
            "ambient overlay mounted: {} ({} particles, {}x{})",
            theme,
            self.layer.as_ref().map_or(0, |l| l.field.len()),
            size.x,
            size.y
        );
    }

    /// Tear down the layer (or staged mount) for `theme`. Safe when nothing is mounted.
    pub fn unmount(&mut self, theme: Theme) {
        if self.layer.as_ref().is_some_and(|l| l.theme == theme) {
            self.layer = None;
            log::info!("ambient overlay unmounted: {theme}");
        }
        if self.pending.as_ref().is_some_and(|p| p.theme == theme) {
            self.pending = None;
        }
    }

    /// Per-frame bookkeeping: staged mounts, resize, detach, anchor drift.
    pub fn on_frame(&mut self, ctx: &FrameContext) {
        if self.handle.is_none() || self.destroyed {
            return;
        }
        if let Some(pending) = self.pending.take() {
            let size = pending.container.size();
            if pending.container.is_attached() && has_area(size) {
                self.install(pending.config, pending.container, size);
            } else {
                self.pending = Some(pending);
            }
        }

        let Some(layer) = self.layer.as_ref() else {
            return;
        };
        if !layer.container.is_attached() {
            log::info!("ambient overlay: container detached, dropping {} layer", layer.theme);
            self.layer = None;
            return;
        }
        let size = layer.container.size();
        if size != layer.size {
            if let Some(old) = self.layer.take() {
                if has_area(size) {
                    log::info!("ambient overlay: container resized to {}x{}", size.x, size.y);
                    self.install(old.config, old.container, size);
                } else {
                    self.pending = Some(PendingMount { theme: old.theme, config: old.config, container: old.container });
                    return;
                }
            }
        }

        let dt = if ctx.dt.is_finite() { ctx.dt.max(0.0) } else { 0.0 };
        self.elapsed += dt;
        if let Some(layer) = self.layer.as_mut() {
            layer.field.update(dt);
        }
    }

    pub fn set_transform(&mut self, transform: ViewTransform) {
        if transform.is_finite() {
            self.transform = transform;
        } else {
            log::debug!("ambient overlay: ignoring non-finite transform {transform:?}");
        }
    }

    pub fn transform(&self) -> ViewTransform {
        self.transform
    }

    /// Layer-local sprites for the current frame.
    pub fn build_batch(&self) -> SpriteBatch {
        let Some(layer) = &self.layer else {
            return SpriteBatch::new();
        };
        let mut batch = SpriteBatch::with_capacity(layer.field.len());
        let config = &layer.config;
        for (p, params) in layer.field.iter().zip(&layer.motion) {
            let sample = config.profile.sample(params, self.elapsed);
            if !(sample.offset.is_finite() && sample.opacity > 0.0) {
                continue;
            }
            let position = match config.profile {
                MotionProfile::Leaf | MotionProfile::Snow | MotionProfile::Rain => {
                    let span = layer.size.y + 2.0 * p.size;
                    let y = (p.position.y + sample.offset.y).rem_euclid(span) - p.size;
                    Vec2::new(p.position.x + sample.offset.x, y)
                }
                // Rays hang from the top edge.
                MotionProfile::Sunray => Vec2::new(p.position.x, -p.size),
                MotionProfile::Dust | MotionProfile::Sand | MotionProfile::Default => {
                    p.position + sample.offset
                }
            };
            let shape = match config.primitive {
                RenderPrimitive::Blob => SpriteShape::Blob { radius: p.size },
                RenderPrimitive::Glyph(ch) => SpriteShape::Glyph { ch, size: p.size },
                RenderPrimitive::Ray { length } => SpriteShape::Ray { length, width: p.size },
            };
            batch.push(Sprite {
                position,
                shape,
                rotation: sample.rotation,
                color: config.color.with_alpha(sample.opacity.min(1.0)),
            });
        }
        batch
    }

    /// Rasterize the current frame through the view transform.
    pub fn draw_into(&self, surface: &mut RasterSurface) {
        let batch = self.build_batch();
        let t = self.transform;
        for sprite in batch.iter() {
            let center = t.apply(sprite.position);
            match sprite.shape {
                SpriteShape::Blob { radius } => surface.fill_radial(center, radius * t.scale, sprite.color),
                SpriteShape::Glyph { ch, size } => surface.draw_glyph(ch, center, size * t.scale, sprite.color),
                SpriteShape::Ray { .. } => surface.fill_quad(sprite.corners(&t), sprite.color),
            }
        }
    }

    /// Current frame as NDC quads for a GPU host, sized to the mounted layer.
    pub fn mesh(&self) -> OverlayMesh {
        match &self.layer {
            Some(layer) => self.build_batch().tessellate(layer.size, &self.transform),
            None => OverlayMesh::default(),
        }
    }

    /// Render into a fresh transparent surface of `surface`'s size.
    pub fn render(&self, surface: &mut RasterSurface) {
        surface.clear(Rgba8::TRANSPARENT);
        self.draw_into(surface);
    }

    /// Cancel the frame handle and drop the layer. Idempotent.
    pub fn destroy(&mut self, scheduler: &mut FrameScheduler) {
        if let Some(handle) = self.handle.take() {
            scheduler.cancel(handle);
        }
        if !self.destroyed {
            log::debug!("ambient overlay destroyed");
        }
        self.layer = None;
        self.pending = None;
        self.destroyed = true;
    }

    pub fn layer(&self) -> Option<&OverlayLayer> {
        self.layer.as_ref()
    }

    /// Number of live layers (zero or one).
    pub fn live_layer_count(&self) -> usize {
        usize::from(self.layer.is_some())
    }

    /// Layers built since creation.
    pub fn layer_generation(&self) -> u64 {
        self.generation
    }

    pub fn has_pending_mount(&self) -> bool {
        self.pending.is_some()
    }

    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::HostContainer;

    fn setup() -> (AmbientParticleOverlay, FrameScheduler, ThemeCatalog) {
        let mut scheduler = FrameScheduler::new();
        let mut overlay = AmbientParticleOverlay::new(OverlaySettings::default());
        overlay.start(&mut scheduler);
        (overlay, scheduler, ThemeCatalog::builtin().unwrap())
    }

    #[test]
    fn double_mount_keeps_one_layer() {
        let (mut overlay, _s, catalog) = setup();
        let container: Rc<dyn ContainerMetrics> = Rc::new(HostContainer::new(640.0, 480.0));
        assert_eq!(overlay.mount(container.clone(), Theme::Forest, &catalog).unwrap(), MountOutcome::Mounted);
        assert_eq!(
            overlay.mount(container.clone(), Theme::Forest, &catalog).unwrap(),
            MountOutcome::AlreadyMounted
        );
        assert_eq!(overlay.live_layer_count(), 1);
        assert_eq!(overlay.layer_generation(), 1);
        let layer = overlay.layer().unwrap();
        assert_eq!(layer.field().len(), catalog.get(Theme::Forest).count);
    }

    #[test]
    fn theme_switch_rebuilds() {
        let (mut overlay, _s, catalog) = setup();
        let container: Rc<dyn ContainerMetrics> = Rc::new(HostContainer::new(300.0, 200.0));
        overlay.mount(container.clone(), Theme::Cave, &catalog).unwrap();
        assert_eq!(overlay.mount(container, Theme::Tundra, &catalog).unwrap(), MountOutcome::Rebuilt);
        let layer = overlay.layer().unwrap();
        assert_eq!(layer.theme(), Theme::Tundra);
        assert_eq!(layer.field().len(), catalog.get(Theme::Tundra).count);
        assert_eq!(overlay.live_layer_count(), 1);
    }

    #[test]
    fn new_container_rebuilds_same_theme() {
        let (mut overlay, _s, catalog) = setup();
        overlay.mount(Rc::new(HostContainer::new(300.0, 200.0)), Theme::Cave, &catalog).unwrap();
        let outcome = overlay.mount(Rc::new(HostContainer::new(300.0, 200.0)), Theme::Cave, &catalog).unwrap();
        assert_eq!(outcome, MountOutcome::Rebuilt);
        assert_eq!(overlay.layer_generation(), 2);
    }

    #[test]
    fn zero_size_mount_completes_later() {
        let (mut overlay, mut scheduler, catalog) = setup();
        let container = Rc::new(HostContainer::new(0.0, 0.0));
        assert_eq!(overlay.mount(container.clone(), Theme::Desert, &catalog).unwrap(), MountOutcome::Staged);
        assert_eq!(overlay.live_layer_count(), 0);
        overlay.on_frame(&scheduler.begin_frame(0.016));
        assert!(overlay.has_pending_mount());
        container.set_size(400.0, 300.0);
        overlay.on_frame(&scheduler.begin_frame(0.016));
        assert_eq!(overlay.live_layer_count(), 1);
        assert_eq!(overlay.layer().unwrap().size(), Vec2::new(400.0, 300.0));
    }

    #[test]
    fn layer_follows_container_resize_and_detach() {
        let (mut overlay, mut scheduler, catalog) = setup();
        let container = Rc::new(HostContainer::new(200.0, 200.0));
        overlay.mount(container.clone(), Theme::Town, &catalog).unwrap();
        container.set_size(500.0, 250.0);
        overlay.on_frame(&scheduler.begin_frame(0.016));
        assert_eq!(overlay.layer().unwrap().size(), Vec2::new(500.0, 250.0));
        container.set_attached(false);
        overlay.on_frame(&scheduler.begin_frame(0.016));
        assert_eq!(overlay.live_layer_count(), 0);
    }

    #[test]
    fn unmount_only_matching_theme() {
        let (mut overlay, _s, catalog) = setup();
        overlay.unmount(Theme::Cave);
        overlay.mount(Rc::new(HostContainer::new(100.0, 100.0)), Theme::Crypt, &catalog).unwrap();
        overlay.unmount(Theme::Cave);
        assert_eq!(overlay.live_layer_count(), 1);
        overlay.unmount(Theme::Crypt);
        assert_eq!(overlay.live_layer_count(), 0);
    }

    #[test]
    fn batch_has_one_sprite_per_visible_particle() {
        let (mut overlay, mut scheduler, catalog) = setup();
        overlay.mount(Rc::new(HostContainer::new(320.0, 240.0)), Theme::Cave, &catalog).unwrap();
        for _ in 0..30 {
            overlay.on_frame(&scheduler.begin_frame(0.05));
        }
        let batch = overlay.build_batch();
        assert!(batch.len() <= catalog.get(Theme::Cave).count);
        assert!(!batch.is_empty());
        assert!(batch.iter().all(|s| matches!(s.shape, SpriteShape::Blob { .. })));
    }

    #[test]
    fn falling_sprites_stay_within_wrapped_span() {
        let (mut overlay, mut scheduler, catalog) = setup();
        overlay.mount(Rc::new(HostContainer::new(200.0, 150.0)), Theme::Tundra, &catalog).unwrap();
        for _ in 0..200 {
            overlay.on_frame(&scheduler.begin_frame(0.1));
            for s in overlay.build_batch().iter() {
                let SpriteShape::Glyph { size, .. } = s.shape else {
                    panic!("tundra draws glyphs");
                };
                assert!(s.position.y >= -size - 1e-3 && s.position.y <= 150.0 + size, "{s:?}");
            }
        }
    }

    /// Largest jump of any sprite that is inside the layer before or after a frame.
    fn largest_visible_jump(theme: Theme, frames: usize) -> f32 {
        let (mut overlay, mut scheduler, catalog) = setup();
        let (w, h) = (400.0, 300.0);
        overlay.mount(Rc::new(HostContainer::new(w, h)), theme, &catalog).unwrap();
        let count = catalog.get(theme).count;
        let on_screen = |p: Vec2| p.x > 0.0 && p.x < w && p.y > 0.0 && p.y < h;
        let mut previous: Vec<Vec2> = overlay.build_batch().iter().map(|s| s.position).collect();
        assert_eq!(previous.len(), count);
        let mut largest = 0.0_f32;
        for _ in 0..frames {
            overlay.on_frame(&scheduler.begin_frame(1.0 / 60.0));
            let current: Vec<Vec2> = overlay.build_batch().iter().map(|s| s.position).collect();
            assert_eq!(current.len(), count);
            for (a, b) in previous.iter().zip(&current) {
                if on_screen(*a) || on_screen(*b) {
                    largest = largest.max(a.distance(*b));
                }
            }
            previous = current;
        }
        largest
    }

    #[test]
    fn drifting_sprites_wrap_off_screen() {
        // Desert drifts 30 px/s and Town 3 px/s; both jitter around their anchor.
        for (theme, frames) in [(Theme::Desert, 900), (Theme::Town, 600)] {
            let jump = largest_visible_jump(theme, frames);
            assert!(jump < 20.0, "{theme}: visible sprite jumped {jump} px");
        }
    }

    #[test]
    fn desert_anchors_wrap_while_drifting() {
        let (mut overlay, mut scheduler, catalog) = setup();
        overlay.mount(Rc::new(HostContainer::new(400.0, 300.0)), Theme::Desert, &catalog).unwrap();
        let start: Vec<f32> = overlay.layer().unwrap().field().iter().map(|p| p.position.x).collect();
        for _ in 0..900 {
            overlay.on_frame(&scheduler.begin_frame(1.0 / 60.0));
        }
        let wrapped = overlay
            .layer()
            .unwrap()
            .field()
            .iter()
            .zip(&start)
            .filter(|(p, x)| p.position.x < **x)
            .count();
        assert!(wrapped > 0);
    }

    #[test]
    fn draw_respects_view_transform() {
        let (mut overlay, mut scheduler, catalog) = setup();
        overlay.mount(Rc::new(HostContainer::new(100.0, 100.0)), Theme::Cave, &catalog).unwrap();
        overlay.on_frame(&scheduler.begin_frame(1.0));
        let mut plain = RasterSurface::new(100.0, 100.0, 1.0).unwrap();
        overlay.render(&mut plain);
        assert!(plain.covered_pixels() > 0);

        // Panning the whole layer off-screen leaves nothing visible.
        overlay.set_transform(ViewTransform::from_pan_zoom(Vec2::new(1000.0, 1000.0), 1.0));
        let mut panned = RasterSurface::new(100.0, 100.0, 1.0).unwrap();
        overlay.render(&mut panned);
        assert_eq!(panned.covered_pixels(), 0);

        overlay.set_transform(ViewTransform::from_pan_zoom(Vec2::ZERO, f32::NAN));
        assert_eq!(overlay.transform().translation, Vec2::new(-1000.0, -1000.0));
    }

    #[test]
    fn mesh_matches_batch_and_transform() {
        let (mut overlay, mut scheduler, catalog) = setup();
        assert_eq!(overlay.mesh(), OverlayMesh::default());
        overlay.mount(Rc::new(HostContainer::new(200.0, 100.0)), Theme::Cave, &catalog).unwrap();
        overlay.on_frame(&scheduler.begin_frame(0.5));
        let batch = overlay.build_batch();
        let mesh = overlay.mesh();
        assert_eq!(mesh.quad_count(), batch.len());

        // Zooming in moves every vertex away from the layer origin.
        overlay.set_transform(ViewTransform::from_pan_zoom(Vec2::ZERO, 2.0));
        let zoomed = overlay.mesh();
        let first = batch.iter().next().unwrap().position;
        let ndc = |p: Vec2| [p.x / 200.0 * 2.0 - 1.0, 1.0 - p.y / 100.0 * 2.0];
        let expected = ndc(first * 2.0);
        let center = |m: &OverlayMesh| {
            let v = &m.vertices[..4];
            [
                v.iter().map(|v| v.position[0]).sum::<f32>() / 4.0,
                v.iter().map(|v| v.position[1]).sum::<f32>() / 4.0,
            ]
        };
        let c = center(&zoomed);
        assert!((c[0] - expected[0]).abs() < 1e-4 && (c[1] - expected[1]).abs() < 1e-4, "{c:?} {expected:?}");
    }

    #[test]
    fn destroy_is_idempotent_and_final() {
        let (mut overlay, mut scheduler, catalog) = setup();
        let container: Rc<dyn ContainerMetrics> = Rc::new(HostContainer::new(100.0, 100.0));
        overlay.mount(container.clone(), Theme::Marsh, &catalog).unwrap();
        overlay.destroy(&mut scheduler);
        overlay.destroy(&mut scheduler);
        assert_eq!(scheduler.active_count(), 0);
        assert_eq!(overlay.live_layer_count(), 0);
        assert!(overlay.mount(container, Theme::Marsh, &catalog).is_err());
        assert_eq!(overlay.live_layer_count(), 0);
    }
}

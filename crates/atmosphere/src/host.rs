//! Host facade owning every atmosphere component.
//!
//! Nothing here returns errors to the caller: failures are logged and the
//! affected layer is simply not drawn.

use engine_core::{AtmosphereError, FrameContext, FrameScheduler, ViewTransform};
use particles::{Theme, ThemeCatalog};
use renderer::{
    AmbientParticleOverlay, ContainerMetrics, FogRenderer, MountOutcome, OverlayMesh, RasterSurface,
};
use std::rc::Rc;
use viewport::{MapViewport, ViewportSync};

use crate::config::AtmosphereConfig;

pub struct AtmosphereHost {
    scheduler: FrameScheduler,
    catalog: Option<ThemeCatalog>,
    container: Rc<dyn ContainerMetrics>,
    fog: Option<FogRenderer>,
    overlay: Option<AmbientParticleOverlay>,
    sync: ViewportSync,
    theme: Option<Theme>,
}

impl AtmosphereHost {
    pub fn new(config: &AtmosphereConfig, container: Rc<dyn ContainerMetrics>) -> Self {
        let mut scheduler = FrameScheduler::new();

        let catalog = match ThemeCatalog::builtin().and_then(|c| c.with_overrides(&config.themes)) {
            Ok(c) => Some(c),
            Err(e) => {
                log::warn!("theme overrides rejected ({e}), using built-in themes");
                ThemeCatalog::builtin()
                    .map_err(|e| log::warn!("built-in theme catalog invalid: {e}"))
                    .ok()
            }
        };

        let fog = if config.fog.enabled {
            match FogRenderer::new(config.fog.clone()) {
                Ok(mut fog) => {
                    fog.attach(Rc::clone(&container));
                    fog.start(&mut scheduler);
                    log_outcome("fog resize", fog.resize());
                    Some(fog)
                }
                Err(e) => {
                    log::warn!("fog disabled: {e}");
                    None
                }
            }
        } else {
            log::info!("fog disabled by config");
            None
        };

        let overlay = if config.overlay.enabled {
            let mut overlay = AmbientParticleOverlay::new(config.overlay.clone());
            overlay.start(&mut scheduler);
            Some(overlay)
        } else {
            log::info!("ambient overlay disabled by config");
            None
        };

        Self {
            scheduler,
            catalog,
            container,
            fog,
            overlay,
            sync: ViewportSync::new(),
            theme: None,
        }
    }

    /// Follow pan and zoom of `viewport`.
    pub fn attach_viewport(&mut self, viewport: &mut dyn MapViewport) {
        self.sync.init_pan(viewport);
        self.sync.init_zoom(viewport);
    }

    /// Switch the ambient theme. Returns false if nothing was mounted.
    pub fn set_theme(&mut self, id: &str) -> bool {
        let theme = match id.parse::<Theme>() {
            Ok(t) => t,
            Err(e) => {
                log::warn!("{e}; keeping current atmosphere");
                return false;
            }
        };
        let (Some(overlay), Some(catalog)) = (self.overlay.as_mut(), self.catalog.as_ref()) else {
            log::debug!("ambient overlay unavailable, ignoring theme {theme}");
            return false;
        };
        if let Some(previous) = self.theme.filter(|p| *p != theme) {
            overlay.unmount(previous);
        }
        match overlay.mount(Rc::clone(&self.container), theme, catalog) {
            Ok(outcome) => {
                if outcome != MountOutcome::AlreadyMounted {
                    log::info!("theme {theme}: {outcome:?}");
                }
                self.theme = Some(theme);
                true
            }
            Err(e) => {
                log::warn!("theme {theme} not mounted: {e}");
                false
            }
        }
    }

    /// Run one frame of exactly `dt` seconds: apply batched viewport changes,
    /// then update both layers.
    pub fn frame(&mut self, dt: f32) -> FrameContext {
        let ctx = self.scheduler.begin_frame(dt);
        self.run_frame(&ctx);
        ctx
    }

    /// Run one frame timed by the wall clock.
    pub fn frame_realtime(&mut self) -> FrameContext {
        let ctx = self.scheduler.begin_frame_realtime();
        self.run_frame(&ctx);
        ctx
    }

    fn run_frame(&mut self, ctx: &FrameContext) {
        if let Some(transform) = self.sync.on_frame() {
            if let Some(overlay) = self.overlay.as_mut() {
                overlay.set_transform(transform);
            }
        }
        if let Some(overlay) = self.overlay.as_mut() {
            overlay.on_frame(ctx);
        }
        if let Some(fog) = self.fog.as_mut() {
            fog.render_frame(ctx);
        }
    }

    /// Draw the ambient layer and then the fog onto `target`, which already
    /// holds the map.
    pub fn compose(&self, target: &mut RasterSurface) {
        if let Some(overlay) = &self.overlay {
            overlay.draw_into(target);
        }
        if let Some(surface) = self.fog.as_ref().and_then(|f| f.surface()) {
            log_outcome("fog composite", target.composite(surface));
        }
    }

    /// Ambient layer of the current frame as GPU-ready quads.
    pub fn overlay_mesh(&self) -> OverlayMesh {
        self.overlay.as_ref().map(|o| o.mesh()).unwrap_or_default()
    }

    /// Re-read the container size after a host layout change.
    pub fn resize(&mut self) {
        if let Some(fog) = self.fog.as_mut() {
            log_outcome("fog resize", fog.resize());
        }
    }

    /// Tear everything down. Idempotent.
    pub fn destroy(&mut self, viewport: &mut dyn MapViewport) {
        if let Some(fog) = self.fog.as_mut() {
            fog.destroy(&mut self.scheduler);
        }
        if let Some(overlay) = self.overlay.as_mut() {
            overlay.destroy(&mut self.scheduler);
        }
        self.sync.destroy(viewport);
        self.theme = None;
    }

    pub fn theme(&self) -> Option<Theme> {
        self.theme
    }

    pub fn transform(&self) -> ViewTransform {
        self.sync.transform()
    }

    pub fn scheduler(&self) -> &FrameScheduler {
        &self.scheduler
    }

    pub fn fog(&self) -> Option<&FogRenderer> {
        self.fog.as_ref()
    }

    pub fn overlay(&self) -> Option<&AmbientParticleOverlay> {
        self.overlay.as_ref()
    }
}

/// Transient failures are expected before layout and only logged at debug.
fn log_outcome(what: &str, result: Result<(), AtmosphereError>) {
    match result {
        Ok(()) => {}
        Err(e) if e.is_transient() => log::debug!("{what}: {e}"),
        Err(e) => log::warn!("{what}: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;
    use renderer::{FogState, HostContainer};
    use viewport::HostViewport;

    fn host(w: f32, h: f32) -> (AtmosphereHost, Rc<HostContainer>, HostViewport) {
        let container = Rc::new(HostContainer::new(w, h));
        let mut host = AtmosphereHost::new(&AtmosphereConfig::default(), container.clone());
        let mut viewport = HostViewport::new();
        host.attach_viewport(&mut viewport);
        (host, container, viewport)
    }

    #[test]
    fn host_runs_theme_and_fog() {
        let (mut host, _c, _vp) = host(320.0, 240.0);
        assert!(host.set_theme("forest"));
        for _ in 0..10 {
            host.frame(1.0 / 60.0);
        }
        assert_eq!(host.theme(), Some(Theme::Forest));
        assert_eq!(host.fog().unwrap().state(), FogState::Active);
        assert_eq!(host.overlay().unwrap().live_layer_count(), 1);
        let mut target = RasterSurface::new(320.0, 240.0, 1.0).unwrap();
        host.compose(&mut target);
        assert!(target.covered_pixels() > 0);
    }

    #[test]
    fn unknown_theme_keeps_current() {
        let (mut host, _c, _vp) = host(100.0, 100.0);
        assert!(host.set_theme("cave"));
        assert!(!host.set_theme("lava"));
        assert_eq!(host.theme(), Some(Theme::Cave));
    }

    #[test]
    fn viewport_changes_reach_overlay_next_frame() {
        let (mut host, _c, mut vp) = host(200.0, 200.0);
        host.set_theme("desert");
        vp.scroll_to(Vec2::new(12.0, 8.0));
        vp.set_zoom(2.0);
        host.frame(0.016);
        let expected = ViewTransform::from_pan_zoom(Vec2::new(12.0, 8.0), 2.0);
        assert_eq!(host.transform(), expected);
        assert_eq!(host.overlay().unwrap().transform(), expected);
    }

    #[test]
    fn late_layout_is_picked_up() {
        let (mut host, container, _vp) = host(0.0, 0.0);
        host.set_theme("tundra");
        host.frame(0.016);
        assert_eq!(host.fog().unwrap().state(), FogState::Deferred);
        container.set_size(400.0, 300.0);
        for _ in 0..10 {
            host.frame(0.05);
        }
        assert_eq!(host.fog().unwrap().state(), FogState::Active);
        assert_eq!(host.overlay().unwrap().live_layer_count(), 1);
    }

    #[test]
    fn both_layers_follow_container_resize() {
        let (mut host, container, _vp) = host(320.0, 240.0);
        host.set_theme("cave");
        host.frame(0.016);
        container.set_size(640.0, 480.0);
        for _ in 0..10 {
            host.frame(0.016);
        }
        assert_eq!(host.overlay().unwrap().layer().unwrap().size(), Vec2::new(640.0, 480.0));
        let fog = host.fog().unwrap().surface().unwrap();
        assert_eq!((fog.width(), fog.height()), (640, 480));

        let mut target = RasterSurface::new(640.0, 480.0, 1.0).unwrap();
        host.compose(&mut target);
        // Fog bands reach the far corner only if the composite succeeded.
        assert!(target.pixel(639, 479).unwrap().a > 0);
    }

    #[test]
    fn realtime_frames_drive_both_layers() {
        let (mut host, _c, _vp) = host(200.0, 150.0);
        host.set_theme("desert");
        let first = host.frame_realtime();
        let second = host.frame_realtime();
        assert_eq!((first.index, second.index), (1, 2));
        assert_eq!(host.fog().unwrap().frames_drawn(), 2);
        assert_eq!(host.overlay_mesh().quad_count(), catalog_count("desert"));
    }

    fn catalog_count(id: &str) -> usize {
        ThemeCatalog::builtin().unwrap().get(id.parse().unwrap()).count
    }

    #[test]
    fn destroy_releases_everything() {
        let (mut host, _c, mut vp) = host(100.0, 100.0);
        host.set_theme("marsh");
        host.destroy(&mut vp);
        host.destroy(&mut vp);
        assert_eq!(host.scheduler().active_count(), 0);
        assert_eq!(host.overlay().unwrap().live_layer_count(), 0);
        assert!(!host.set_theme("marsh"));
    }

    #[test]
    fn disabled_layers_are_skipped() {
        let mut config = AtmosphereConfig::default();
        config.fog.enabled = false;
        config.overlay.enabled = false;
        let mut host = AtmosphereHost::new(&config, Rc::new(HostContainer::new(50.0, 50.0)));
        assert!(host.fog().is_none());
        assert!(!host.set_theme("cave"));
        host.frame(0.016);
        assert_eq!(host.scheduler().active_count(), 0);
    }
}

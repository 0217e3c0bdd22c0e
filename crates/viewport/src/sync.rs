//! Keeps the overlay transform locked to the map viewport.
//!
//! Event handlers never touch the transform. They only stage the newest
//! pan/zoom and raise a pending flag; [`ViewportSync::on_frame`] applies the
//! staged values once per frame, so a burst of scroll events costs one
//! transform update.
//!
//! Listeners are only removed by [`ViewportSync::destroy`] (or the per-source
//! `destroy_*` calls), since that needs the viewport. Listeners left behind by a
//! dropped sync hold a weak handle and ignore further events.

use engine_core::ViewTransform;
use glam::Vec2;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::events::{ListenerId, MapViewport, ViewportEvent, ViewportEventKind};

#[derive(Debug, Default)]
struct Staged {
    pan: Option<Vec2>,
    zoom: Option<f32>,
    pending: bool,
    /// Events folded into an already pending update.
    coalesced: u64,
}

impl Staged {
    fn raise(&mut self) {
        if self.pending {
            self.coalesced += 1;
        } else {
            self.pending = true;
        }
    }
}

#[derive(Debug)]
pub struct ViewportSync {
    staged: Rc<RefCell<Staged>>,
    pan_listener: Option<ListenerId>,
    zoom_listener: Option<ListenerId>,
    pan: Vec2,
    zoom: f32,
    transform: ViewTransform,
    applied: u64,
}

impl Default for ViewportSync {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewportSync {
    pub fn new() -> Self {
        Self {
            staged: Rc::new(RefCell::new(Staged::default())),
            pan_listener: None,
            zoom_listener: None,
            pan: Vec2::ZERO,
            zoom: 1.0,
            transform: ViewTransform::IDENTITY,
            applied: 0,
        }
    }

    /// Start following scroll notifications. No-op if already following.
    pub fn init_pan(&mut self, viewport: &mut dyn MapViewport) {
        if self.pan_listener.is_some() {
            return;
        }
        {
            let mut staged = self.staged.borrow_mut();
            staged.pan = Some(viewport.state().pan);
            staged.raise();
        }
        let staged = Rc::downgrade(&self.staged);
        let id = viewport.events_mut().subscribe(
            ViewportEventKind::Scroll,
            Box::new(move |event| {
                if let (ViewportEvent::Scrolled { pan }, Some(staged)) = (*event, Weak::upgrade(&staged)) {
                    let mut s = staged.borrow_mut();
                    s.pan = Some(pan);
                    s.raise();
                }
            }),
        );
        self.pan_listener = Some(id);
        log::debug!("viewport sync: following pan");
    }

    pub fn destroy_pan(&mut self, viewport: &mut dyn MapViewport) {
        if let Some(id) = self.pan_listener.take() {
            viewport.events_mut().unsubscribe(id);
            log::debug!("viewport sync: stopped following pan");
        }
    }

    /// Start following zoom notifications. No-op if already following.
    pub fn init_zoom(&mut self, viewport: &mut dyn MapViewport) {
        if self.zoom_listener.is_some() {
            return;
        }
        {
            let mut staged = self.staged.borrow_mut();
            staged.zoom = Some(viewport.state().zoom);
            staged.raise();
        }
        let staged = Rc::downgrade(&self.staged);
        let id = viewport.events_mut().subscribe(
            ViewportEventKind::ZoomChanged,
            Box::new(move |event| {
                if let (ViewportEvent::ZoomChanged { scale }, Some(staged)) = (*event, Weak::upgrade(&staged)) {
                    let mut s = staged.borrow_mut();
                    s.zoom = Some(scale);
                    s.raise();
                }
            }),
        );
        self.zoom_listener = Some(id);
        log::debug!("viewport sync: following zoom");
    }

    pub fn destroy_zoom(&mut self, viewport: &mut dyn MapViewport) {
        if let Some(id) = self.zoom_listener.take() {
            viewport.events_mut().unsubscribe(id);
            log::debug!("viewport sync: stopped following zoom");
        }
    }

    /// Tear down both listeners. Idempotent.
    pub fn destroy(&mut self, viewport: &mut dyn MapViewport) {
        self.destroy_pan(viewport);
        self.destroy_zoom(viewport);
        let mut staged = self.staged.borrow_mut();
        staged.pending = false;
        staged.coalesced = 0;
        staged.pan = None;
        staged.zoom = None;
    }

    /// Apply staged values. Returns the new transform if it changed.
    pub fn on_frame(&mut self) -> Option<ViewTransform> {
        let (pan, zoom, coalesced) = {
            let mut staged = self.staged.borrow_mut();
            if !staged.pending {
                return None;
            }
            staged.pending = false;
            let coalesced = std::mem::take(&mut staged.coalesced);
            (staged.pan.take(), staged.zoom.take(), coalesced)
        };
        if coalesced > 0 {
            log::debug!("viewport sync: coalesced {coalesced} events into one update");
        }
        if let Some(pan) = pan.filter(|p| p.is_finite()) {
            self.pan = pan;
        }
        match zoom {
            Some(z) if z.is_finite() && z > 0.0 => self.zoom = z,
            Some(z) => log::debug!("viewport sync: ignoring zoom {z}"),
            None => {}
        }
        let next = ViewTransform::from_pan_zoom(self.pan, self.zoom);
        if next == self.transform {
            return None;
        }
        self.transform = next;
        self.applied += 1;
        Some(next)
    }

    pub fn transform(&self) -> ViewTransform {
        self.transform
    }

    pub fn is_following_pan(&self) -> bool {
        self.pan_listener.is_some()
    }

    pub fn is_following_zoom(&self) -> bool {
        self.zoom_listener.is_some()
    }

    /// Transform updates applied since creation.
    pub fn applied_updates(&self) -> u64 {
        self.applied
    }

    /// Events coalesced into the update still pending.
    pub fn pending_coalesced(&self) -> u64 {
        self.staged.borrow().coalesced
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::HostViewport;

    fn following() -> (ViewportSync, HostViewport) {
        let mut vp = HostViewport::new();
        let mut sync = ViewportSync::new();
        sync.init_pan(&mut vp);
        sync.init_zoom(&mut vp);
        sync.on_frame();
        (sync, vp)
    }

    #[test]
    fn batched_events_yield_exact_transform() {
        let (mut sync, mut vp) = following();
        for i in 0..25 {
            vp.scroll_to(Vec2::new(i as f32 * 3.0, i as f32));
        }
        vp.set_zoom(1.75);
        assert_eq!(sync.pending_coalesced(), 25);
        let t = sync.on_frame().unwrap();
        assert_eq!(t, ViewTransform::from_pan_zoom(Vec2::new(72.0, 24.0), 1.75));
        assert_eq!(t.translation, Vec2::new(-72.0, -24.0));
        assert_eq!(sync.applied_updates(), 1);
        assert_eq!(sync.on_frame(), None);
    }

    #[test]
    fn handlers_only_stage_until_frame() {
        let (mut sync, mut vp) = following();
        vp.scroll_to(Vec2::new(5.0, 5.0));
        assert_eq!(sync.transform(), ViewTransform::IDENTITY);
        sync.on_frame();
        assert_eq!(sync.transform().translation, Vec2::new(-5.0, -5.0));
    }

    #[test]
    fn init_is_idempotent() {
        let (mut sync, mut vp) = following();
        sync.init_pan(&mut vp);
        sync.init_zoom(&mut vp);
        assert_eq!(vp.events_mut().listener_count(ViewportEventKind::Scroll), 1);
        assert_eq!(vp.events_mut().listener_count(ViewportEventKind::ZoomChanged), 1);
    }

    #[test]
    fn pan_and_zoom_tear_down_independently() {
        let (mut sync, mut vp) = following();
        sync.destroy_pan(&mut vp);
        sync.destroy_pan(&mut vp);
        assert!(!sync.is_following_pan());
        assert!(sync.is_following_zoom());
        vp.scroll_to(Vec2::new(50.0, 0.0));
        vp.set_zoom(2.0);
        let t = sync.on_frame().unwrap();
        assert_eq!(t, ViewTransform::from_pan_zoom(Vec2::ZERO, 2.0));

        sync.destroy(&mut vp);
        vp.set_zoom(3.0);
        assert_eq!(sync.on_frame(), None);
        assert_eq!(vp.events_mut().listener_count(ViewportEventKind::ZoomChanged), 0);
    }

    #[test]
    fn init_picks_up_current_viewport_state() {
        let mut vp = HostViewport::new();
        vp.scroll_to(Vec2::new(30.0, 40.0));
        vp.set_zoom(0.5);
        let mut sync = ViewportSync::new();
        sync.init_pan(&mut vp);
        sync.init_zoom(&mut vp);
        let t = sync.on_frame().unwrap();
        assert_eq!(t, ViewTransform::from_pan_zoom(Vec2::new(30.0, 40.0), 0.5));
    }

    #[test]
    fn destroy_drops_pending_update_and_reinit_reloads_state() {
        let (mut sync, mut vp) = following();
        vp.scroll_to(Vec2::new(10.0, 20.0));
        vp.set_zoom(2.0);
        vp.scroll_to(Vec2::new(15.0, 25.0));
        assert_eq!(sync.pending_coalesced(), 2);

        sync.destroy(&mut vp);
        assert_eq!(sync.pending_coalesced(), 0);
        assert_eq!(sync.on_frame(), None);
        assert_eq!(sync.transform(), ViewTransform::IDENTITY);

        // Only pan is followed again; it starts from where the viewport is now.
        sync.init_pan(&mut vp);
        let t = sync.on_frame().unwrap();
        assert_eq!(t, ViewTransform::from_pan_zoom(Vec2::new(15.0, 25.0), 1.0));
        vp.set_zoom(4.0);
        assert_eq!(sync.on_frame(), None);

        sync.init_zoom(&mut vp);
        let t = sync.on_frame().unwrap();
        assert_eq!(t, ViewTransform::from_pan_zoom(Vec2::new(15.0, 25.0), 4.0));
    }

    #[test]
    fn dropped_sync_leaves_inert_listeners() {
        let mut vp = HostViewport::new();
        let mut sync = ViewportSync::new();
        sync.init_pan(&mut vp);
        sync.init_zoom(&mut vp);
        drop(sync);
        vp.scroll_to(Vec2::new(1.0, 2.0));
        vp.set_zoom(3.0);
        assert_eq!(vp.state().zoom, 3.0);
    }

    #[test]
    fn invalid_zoom_is_ignored() {
        let (mut sync, mut vp) = following();
        vp.set_zoom(0.0);
        assert_eq!(sync.on_frame(), None);
        assert_eq!(sync.transform().scale, 1.0);
    }
}

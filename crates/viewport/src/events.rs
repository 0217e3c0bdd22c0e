//! Viewport state and the scroll/zoom event dispatcher.

use glam::Vec2;

/// Pan offset and zoom scale of the map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportState {
    /// Scroll offset of the map content in CSS px.
    pub pan: Vec2,
    pub zoom: f32,
}

impl Default for ViewportState {
    fn default() -> Self {
        Self { pan: Vec2::ZERO, zoom: 1.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewportEventKind {
    Scroll,
    ZoomChanged,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewportEvent {
    Scrolled { pan: Vec2 },
    ZoomChanged { scale: f32 },
}

impl ViewportEvent {
    pub fn kind(&self) -> ViewportEventKind {
        match self {
            ViewportEvent::Scrolled { .. } => ViewportEventKind::Scroll,
            ViewportEvent::ZoomChanged { .. } => ViewportEventKind::ZoomChanged,
        }
    }
}

/// Handle returned by [`ViewportEvents::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn FnMut(&ViewportEvent)>;

/// Listener registry keyed by event kind.
#[derive(Default)]
pub struct ViewportEvents {
    next_id: u64,
    listeners: Vec<(ListenerId, ViewportEventKind, Listener)>,
}

impl ViewportEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, kind: ViewportEventKind, listener: Listener) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.listeners.push((id, kind, listener));
        id
    }

    /// Remove a listener. Returns false if it was already gone.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _, _)| *lid != id);
        self.listeners.len() != before
    }

    /// Deliver `event` to every listener of its kind; returns how many ran.
    pub fn emit(&mut self, event: &ViewportEvent) -> usize {
        let kind = event.kind();
        let mut delivered = 0;
        for (_, k, listener) in self.listeners.iter_mut() {
            if *k == kind {
                listener(event);
                delivered += 1;
            }
        }
        delivered
    }

    pub fn listener_count(&self, kind: ViewportEventKind) -> usize {
        self.listeners.iter().filter(|(_, k, _)| *k == kind).count()
    }
}

impl std::fmt::Debug for ViewportEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewportEvents")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// What the overlay needs from the host's map view.
pub trait MapViewport {
    fn state(&self) -> ViewportState;
    fn events_mut(&mut self) -> &mut ViewportEvents;
}

/// Viewport driven directly by the host (or a simulation).
#[derive(Debug, Default)]
pub struct HostViewport {
    state: ViewportState,
    events: ViewportEvents,
}

impl HostViewport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scroll_to(&mut self, pan: Vec2) {
        self.state.pan = pan;
        self.events.emit(&ViewportEvent::Scrolled { pan });
    }

    pub fn scroll_by(&mut self, delta: Vec2) {
        self.scroll_to(self.state.pan + delta);
    }

    pub fn set_zoom(&mut self, scale: f32) {
        self.state.zoom = scale;
        self.events.emit(&ViewportEvent::ZoomChanged { scale });
    }
}

impl MapViewport for HostViewport {
    fn state(&self) -> ViewportState {
        self.state
    }

    fn events_mut(&mut self) -> &mut ViewportEvents {
        &mut self.events
    }
}

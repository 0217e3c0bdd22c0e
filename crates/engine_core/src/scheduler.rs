//! Shared per-frame scheduler.
//!
//! Renderers request a [`FrameHandle`] once and are driven by the host for
//! every frame while that handle stays active. Cancelling is idempotent, so
//! teardown paths can call it unconditionally.

use crate::time::FrameClock;

/// Identifies one scheduled per-frame callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameHandle(u64);

impl FrameHandle {
    /// Raw id, mostly for logging.
    pub fn id(self) -> u64 {
        self.0
    }
}

/// Snapshot of timing data handed to every frame callback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameContext {
    /// 1-based index of the frame being rendered.
    pub index: u64,
    /// Delta time in seconds.
    pub dt: f32,
    /// Total elapsed seconds at this frame.
    pub elapsed: f32,
}

/// Owns the frame clock and the set of live frame handles.
#[derive(Debug, Default)]
pub struct FrameScheduler {
    clock: FrameClock,
    next_handle: u64,
    active: Vec<FrameHandle>,
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new per-frame callback.
    pub fn request_frame(&mut self) -> FrameHandle {
        self.next_handle += 1;
        let handle = FrameHandle(self.next_handle);
        self.active.push(handle);
        log::debug!("frame handle {} scheduled", handle.0);
        handle
    }

    /// Cancel a handle. Returns false if it was not active.
    pub fn cancel(&mut self, handle: FrameHandle) -> bool {
        let before = self.active.len();
        self.active.retain(|h| *h != handle);
        let removed = self.active.len() != before;
        if removed {
            log::debug!("frame handle {} cancelled", handle.0);
        }
        removed
    }

    pub fn is_active(&self, handle: FrameHandle) -> bool {
        self.active.contains(&handle)
    }

    /// Number of live handles.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Advance the clock by exactly `dt` seconds and describe the new frame.
    pub fn begin_frame(&mut self, dt: f32) -> FrameContext {
        self.clock.advance(dt);
        self.context()
    }

    /// Advance using the wall clock, with long gaps clamped.
    pub fn begin_frame_realtime(&mut self) -> FrameContext {
        self.clock.tick();
        self.context()
    }

    pub fn clock(&self) -> &FrameClock {
        &self.clock
    }

    fn context(&self) -> FrameContext {
        FrameContext {
            index: self.clock.frame_count(),
            dt: self.clock.delta_seconds(),
            elapsed: self.clock.elapsed_seconds(),
        }
    }
}

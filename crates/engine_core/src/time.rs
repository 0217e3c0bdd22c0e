//! Frame timing for the render loop.

use std::time::{Duration, Instant};

/// Largest wall-clock delta accepted by [`FrameClock::tick`]. Longer gaps (tab
/// switches, debugger pauses) are clamped so particles don't teleport.
pub const MAX_FRAME_DELTA: Duration = Duration::from_millis(250);

/// Tracks frame deltas, total elapsed time and the frame counter.
///
/// Time only moves when [`FrameClock::advance`] or [`FrameClock::tick`] is
/// called, so simulations driven by it are reproducible in tests.
#[derive(Debug)]
pub struct FrameClock {
    /// Wall-clock instant of the last `tick`.
    last_tick: Option<Instant>,
    /// Duration of the last frame.
    delta: Duration,
    /// Total elapsed simulated time.
    elapsed: Duration,
    /// Frame count since start.
    frame_count: u64,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameClock {
    /// Create a clock at time zero.
    pub fn new() -> Self {
        Self {
            last_tick: None,
            delta: Duration::ZERO,
            elapsed: Duration::ZERO,
            frame_count: 0,
        }
    }

    /// Advance by an explicit delta (seconds), taken as given. Negative and
    /// non-finite deltas count as zero.
    pub fn advance(&mut self, dt_seconds: f32) {
        let dt = if dt_seconds.is_finite() && dt_seconds > 0.0 {
            Duration::from_secs_f32(dt_seconds)
        } else {
            Duration::ZERO
        };
        self.step(dt);
    }

    /// Advance using the wall clock since the previous tick, clamped to
    /// [`MAX_FRAME_DELTA`].
    pub fn tick(&mut self) {
        self.tick_at(Instant::now());
    }

    fn tick_at(&mut self, now: Instant) {
        let dt = match self.last_tick {
            Some(prev) => now.saturating_duration_since(prev).min(MAX_FRAME_DELTA),
            None => Duration::ZERO,
        };
        self.last_tick = Some(now);
        self.step(dt);
    }

    fn step(&mut self, dt: Duration) {
        self.delta = dt;
        self.elapsed += dt;
        self.frame_count += 1;
    }

    /// Get the delta time in seconds.
    pub fn delta_seconds(&self) -> f32 {
        self.delta.as_secs_f32()
    }

    /// Get total elapsed time in seconds.
    pub fn elapsed_seconds(&self) -> f32 {
        self.elapsed.as_secs_f32()
    }

    /// Get the current frame count.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Get the current FPS (from the last frame only).
    pub fn fps(&self) -> f32 {
        if self.delta.as_secs_f32() > 0.0 {
            1.0 / self.delta.as_secs_f32()
        } else {
            0.0
        }
    }
}

//! Host container metrics.

use glam::Vec2;
use std::cell::Cell;

/// Read-only view of the element a layer is sized to.
pub trait ContainerMetrics {
    /// Layout size in CSS pixels. Zero before layout completes.
    fn size(&self) -> Vec2;

    fn device_pixel_ratio(&self) -> f32 {
        1.0
    }

    /// False once the host removed the container.
    fn is_attached(&self) -> bool {
        true
    }
}

/// Container whose metrics the host updates directly.
#[derive(Debug)]
pub struct HostContainer {
    size: Cell<Vec2>,
    dpr: Cell<f32>,
    attached: Cell<bool>,
}

impl HostContainer {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            size: Cell::new(Vec2::new(width, height)),
            dpr: Cell::new(1.0),
            attached: Cell::new(true),
        }
    }

    pub fn with_dpr(self, dpr: f32) -> Self {
        self.dpr.set(dpr);
        self
    }

    pub fn set_size(&self, width: f32, height: f32) {
        self.size.set(Vec2::new(width, height));
    }

    pub fn set_attached(&self, attached: bool) {
        self.attached.set(attached);
    }
}

impl ContainerMetrics for HostContainer {
    fn size(&self) -> Vec2 {
        self.size.get()
    }

    fn device_pixel_ratio(&self) -> f32 {
        self.dpr.get()
    }

    fn is_attached(&self) -> bool {
        self.attached.get()
    }
}

/// True when `size` has a drawable area.
pub fn has_area(size: Vec2) -> bool {
    size.is_finite() && size.x >= 1.0 && size.y >= 1.0
}

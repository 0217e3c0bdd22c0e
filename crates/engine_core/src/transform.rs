//! 2D view transform used to lock overlays to a pannable, zoomable map.

use glam::{Mat3, Vec2};

/// Composite `translate(t) · scale(s)` transform.
///
/// A point `p` in layer space lands at `p * scale + translation` on screen,
/// matching CSS `transform: translate(tx, ty) scale(s)` with a top-left
/// origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewTransform {
    pub translation: Vec2,
    pub scale: f32,
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl ViewTransform {
    pub const IDENTITY: Self = Self {
        translation: Vec2::ZERO,
        scale: 1.0,
    };

    /// Transform that keeps a layer locked to content scrolled by `pan` and
    /// zoomed by `zoom`: `translate(-pan) · scale(zoom)`.
    pub fn from_pan_zoom(pan: Vec2, zoom: f32) -> Self {
        Self {
            translation: -pan,
            scale: zoom,
        }
    }

    /// Map a layer-space point to screen space.
    pub fn apply(&self, point: Vec2) -> Vec2 {
        point * self.scale + self.translation
    }

    /// Map a screen-space point back into layer space. Returns `None` for a
    /// degenerate (zero or non-finite) scale.
    pub fn inverse_apply(&self, point: Vec2) -> Option<Vec2> {
        if self.scale == 0.0 || !self.scale.is_finite() {
            return None;
        }
        Some((point - self.translation) / self.scale)
    }

    /// Homogeneous matrix form for GPU upload.
    pub fn to_mat3(&self) -> Mat3 {
        Mat3::from_translation(self.translation) * Mat3::from_scale(Vec2::splat(self.scale))
    }

    pub fn is_finite(&self) -> bool {
        self.translation.is_finite() && self.scale.is_finite()
    }

    /// CSS form, handy for hosts that drive a DOM layer.
    pub fn to_css(&self) -> String {
        format!(
            "translate({}px, {}px) scale({})",
            self.translation.x, self.translation.y, self.scale
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_transform_pan_zoom_is_translate_then_scale() {
        let t = ViewTransform::from_pan_zoom(Vec2::new(100.0, 40.0), 2.0);
        assert_eq!(t.translation, Vec2::new(-100.0, -40.0));
        assert_eq!(t.scale, 2.0);
        assert_eq!(t.apply(Vec2::new(10.0, 10.0)), Vec2::new(-80.0, -20.0));
    }

    #[test]
    fn view_transform_matrix_matches_apply() {
        let t = ViewTransform::from_pan_zoom(Vec2::new(12.0, -7.0), 1.5);
        let p = Vec2::new(33.0, 21.0);
        let m = t.to_mat3().transform_point2(p);
        assert!((m - t.apply(p)).length() < 1e-4);
    }

    #[test]
    fn view_transform_inverse_roundtrip() {
        let t = ViewTransform::from_pan_zoom(Vec2::new(5.0, 9.0), 0.5);
        let p = Vec2::new(3.0, 4.0);
        let back = t.inverse_apply(t.apply(p)).unwrap();
        assert!((back - p).length() < 1e-5);
        assert!(ViewTransform::from_pan_zoom(Vec2::ZERO, 0.0).inverse_apply(p).is_none());
    }

    #[test]
    fn view_transform_css_string() {
        let t = ViewTransform::from_pan_zoom(Vec2::new(10.0, 20.0), 2.0);
        assert_eq!(t.to_css(), "translate(-10px, -20px) scale(2)");
    }
}

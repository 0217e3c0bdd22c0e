//! Software RGBA8 render target.
//!
//! Drawing calls take CSS pixel coordinates; the surface stores device
//! pixels (`css * dpr`). All fills blend source-over in straight alpha.

use anyhow::Context;
use engine_core::{AtmosphereError, Rgba, Rgba8};
use glam::Vec2;
use std::path::Path;

use crate::vertex::{glyph_bitmap, GLYPH_PX_H};

/// Largest allowed side in device pixels.
pub const MAX_SURFACE_DIM: u32 = 8192;

/// Direction in which a gradient runs from its `from` color to its `to` color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradientDir {
    Down,
    Up,
    Right,
    Left,
}

#[derive(Debug, Clone)]
pub struct RasterSurface {
    width: u32,
    height: u32,
    dpr: f32,
    pixels: Vec<Rgba8>,
}

impl RasterSurface {
    /// Surface for a `css_width` × `css_height` element at `dpr`.
    pub fn new(css_width: f32, css_height: f32, dpr: f32) -> engine_core::Result<Self> {
        if !(dpr.is_finite() && dpr > 0.0) {
            return Err(AtmosphereError::DegenerateData(format!("device pixel ratio {dpr}")));
        }
        let device = |css: f32| (css * dpr).round().clamp(0.0, MAX_SURFACE_DIM as f32) as u32;
        let (width, height) = (device(css_width), device(css_height));
        if !css_width.is_finite() || !css_height.is_finite() || width == 0 || height == 0 {
            return Err(AtmosphereError::EnvironmentNotReady(format!(
                "surface {css_width}x{css_height} has no area"
            )));
        }
        Ok(Self {
            width,
            height,
            dpr,
            pixels: vec![Rgba8::TRANSPARENT; (width * height) as usize],
        })
    }

    /// Device pixel width.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Device pixel height.
    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dpr(&self) -> f32 {
        self.dpr
    }

    pub fn css_size(&self) -> Vec2 {
        Vec2::new(self.width as f32, self.height as f32) / self.dpr
    }

    pub fn clear(&mut self, color: Rgba8) {
        self.pixels.fill(color);
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba8> {
        if x < self.width && y < self.height {
            Some(self.pixels[(y * self.width + x) as usize])
        } else {
            None
        }
    }

    pub fn pixels(&self) -> &[Rgba8] {
        &self.pixels
    }

    /// Raw RGBA bytes, row-major.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.pixels)
    }

    /// Pixels with any coverage.
    pub fn covered_pixels(&self) -> usize {
        self.pixels.iter().filter(|p| p.a > 0).count()
    }

    /// Device pixel span `[lo, hi)` covering CSS interval `[a, b]` on an axis of `len` pixels.
    fn span(&self, a: f32, b: f32, len: u32) -> (u32, u32) {
        let lo = (a.min(b) * self.dpr).floor().max(0.0);
        let hi = (a.max(b) * self.dpr).ceil().min(len as f32);
        if !(lo.is_finite() && hi.is_finite()) || hi <= lo {
            return (0, 0);
        }
        (lo as u32, hi as u32)
    }

    fn blend_at(&mut self, x: u32, y: u32, color: Rgba, coverage: f32) {
        let i = (y * self.width + x) as usize;
        self.pixels[i].blend(color, coverage);
    }

    /// Pixel center in CSS coordinates.
    fn center_css(&self, x: u32, y: u32) -> Vec2 {
        Vec2::new(x as f32 + 0.5, y as f32 + 0.5) / self.dpr
    }

    pub fn fill_rect(&mut self, min: Vec2, max: Vec2, color: Rgba) {
        let (x0, x1) = self.span(min.x, max.x, self.width);
        let (y0, y1) = self.span(min.y, max.y, self.height);
        for y in y0..y1 {
            for x in x0..x1 {
                self.blend_at(x, y, color, 1.0);
            }
        }
    }

    /// Linear gradient over a rectangle, `from` at the start side.
    pub fn fill_gradient_rect(&mut self, min: Vec2, max: Vec2, from: Rgba, to: Rgba, dir: GradientDir) {
        let size = max - min;
        if !(size.x > 0.0 && size.y > 0.0) {
            return;
        }
        let (x0, x1) = self.span(min.x, max.x, self.width);
        let (y0, y1) = self.span(min.y, max.y, self.height);
        for y in y0..y1 {
            for x in x0..x1 {
                let local = (self.center_css(x, y) - min) / size;
                let t = match dir {
                    GradientDir::Down => local.y,
                    GradientDir::Up => 1.0 - local.y,
                    GradientDir::Right => local.x,
                    GradientDir::Left => 1.0 - local.x,
                }
                .clamp(0.0, 1.0);
                let c = Rgba::new(
                    from.r + (to.r - from.r) * t,
                    from.g + (to.g - from.g) * t,
                    from.b + (to.b - from.b) * t,
                    from.a + (to.a - from.a) * t,
                );
                self.blend_at(x, y, c, 1.0);
            }
        }
    }

    /// Soft disc with `(1 - d)²` falloff.
    pub fn fill_radial(&mut self, center: Vec2, radius: f32, color: Rgba) {
        if !(radius > 0.0 && center.is_finite()) {
            return;
        }
        let (x0, x1) = self.span(center.x - radius, center.x + radius, self.width);
        let (y0, y1) = self.span(center.y - radius, center.y + radius, self.height);
        for y in y0..y1 {
            for x in x0..x1 {
                let d = self.center_css(x, y).distance(center) / radius;
                if d < 1.0 {
                    let falloff = (1.0 - d) * (1.0 - d);
                    self.blend_at(x, y, color, falloff);
                }
            }
        }
    }

    /// Convex quad, either winding.
    pub fn fill_quad(&mut self, corners: [Vec2; 4], color: Rgba) {
        if corners.iter().any(|c| !c.is_finite()) {
            return;
        }
        let min = corners.iter().fold(Vec2::splat(f32::MAX), |m, c| m.min(*c));
        let max = corners.iter().fold(Vec2::splat(f32::MIN), |m, c| m.max(*c));
        let (x0, x1) = self.span(min.x, max.x, self.width);
        let (y0, y1) = self.span(min.y, max.y, self.height);
        for y in y0..y1 {
            for x in x0..x1 {
                let p = self.center_css(x, y);
                let mut sign = 0.0_f32;
                let mut inside = true;
                for i in 0..4 {
                    let a = corners[i];
                    let b = corners[(i + 1) % 4];
                    let cross = (b - a).perp_dot(p - a);
                    if cross != 0.0 {
                        if sign == 0.0 {
                            sign = cross.signum();
                        } else if cross.signum() != sign {
                            inside = false;
                            break;
                        }
                    }
                }
                if inside {
                    self.blend_at(x, y, color, 1.0);
                }
            }
        }
    }

    /// Bitmap glyph centered on `center`, `size` px tall.
    pub fn draw_glyph(&mut self, ch: char, center: Vec2, size: f32, color: Rgba) {
        let Some(rows) = glyph_bitmap(ch) else {
            return;
        };
        let cell = size / GLYPH_PX_H;
        let origin = center - Vec2::new(3.0, 4.0) * cell;
        for (gy, bits) in rows.iter().enumerate() {
            for gx in 0..5u32 {
                if (bits >> (4 - gx)) & 1 != 0 {
                    let min = origin + Vec2::new(gx as f32, gy as f32) * cell;
                    self.fill_rect(min, min + Vec2::splat(cell), color);
                }
            }
        }
    }

    /// Blend `src` over this surface. Both must have the same device size.
    pub fn composite(&mut self, src: &RasterSurface) -> engine_core::Result<()> {
        if (src.width, src.height) != (self.width, self.height) {
            return Err(AtmosphereError::DegenerateData(format!(
                "cannot composite {}x{} onto {}x{}",
                src.width, src.height, self.width, self.height
            )));
        }
        for (dst, s) in self.pixels.iter_mut().zip(&src.pixels) {
            if s.a > 0 {
                dst.blend(s.to_rgba(), 1.0);
            }
        }
        Ok(())
    }

    pub fn to_image(&self) -> anyhow::Result<image::RgbaImage> {
        image::RgbaImage::from_raw(self.width, self.height, self.as_bytes().to_vec())
            .context("surface buffer does not match its dimensions")
    }

    pub fn save_png(&self, path: &Path) -> anyhow::Result<()> {
        self.to_image()?
            .save_with_format(path, image::ImageFormat::Png)
            .with_context(|| format!("failed to write {}", path.display()))
    }
}

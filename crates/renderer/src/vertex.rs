//! Sprite batches for the ambient overlay and their GPU-ready tessellation.
//!
//! Hosts with a GPU upload the output of [`SpriteBatch::tessellate`] and draw
//! it with the font atlas from [`generate_font_atlas`]; the software path in
//! this crate rasterizes the same batch onto a [`RasterSurface`](crate::RasterSurface).

use anyhow::Context;
use bytemuck::{Pod, Zeroable};
use engine_core::{Rgba, ViewTransform};
use glam::Vec2;
use std::path::Path;

/// Vertex for screen-space overlay sprites.
///
/// Layout: `position` at offset 0, `tex_coords` at 8, `color` at 16; stride 32.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct OverlayVertex {
    /// NDC position (x, y) in -1..1
    pub position: [f32; 2],
    /// UV into font atlas. `SOLID_UV` = flat color; x >= `BLOB_UV_BASE` = radial falloff.
    pub tex_coords: [f32; 2],
    /// RGBA color, straight alpha
    pub color: [f32; 4],
}

/// Sentinel UV for flat-colored quads.
pub const SOLID_UV: [f32; 2] = [-1.0, -1.0];
/// Blob quads carry local coordinates offset by this value; the shader
/// recovers the unit-disc position as `uv - BLOB_UV_BASE - 0.5`.
pub const BLOB_UV_BASE: f32 = 2.0;

/// Indexed triangle list ready for a GPU vertex/index buffer pair.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverlayMesh {
    pub vertices: Vec<OverlayVertex>,
    pub indices: Vec<u32>,
}

impl OverlayMesh {
    pub fn quad_count(&self) -> usize {
        self.indices.len() / 6
    }

    /// Raw upload bytes: vertex count and index count as little-endian `u32`,
    /// then the vertex buffer, then the index buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        let vertex_bytes: &[u8] = bytemuck::cast_slice(&self.vertices);
        let index_bytes: &[u8] = bytemuck::cast_slice(&self.indices);
        let mut out = Vec::with_capacity(8 + vertex_bytes.len() + index_bytes.len());
        out.extend_from_slice(&(self.vertices.len() as u32).to_le_bytes());
        out.extend_from_slice(&(self.indices.len() as u32).to_le_bytes());
        out.extend_from_slice(vertex_bytes);
        out.extend_from_slice(index_bytes);
        out
    }

    pub fn write_to(&self, path: &Path) -> anyhow::Result<()> {
        std::fs::write(path, self.to_bytes()).with_context(|| format!("writing mesh {}", path.display()))
    }
}

/// One drawable overlay element in layer-local CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sprite {
    /// Blob/glyph center, or ray origin.
    pub position: Vec2,
    pub shape: SpriteShape,
    /// Radians; rays point along (sin, cos) so zero is straight down.
    pub rotation: f32,
    pub color: Rgba,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpriteShape {
    Blob { radius: f32 },
    Glyph { ch: char, size: f32 },
    Ray { length: f32, width: f32 },
}

impl Sprite {
    /// Corners of the sprite quad (tl, tr, br, bl) after `transform`.
    pub fn corners(&self, transform: &ViewTransform) -> [Vec2; 4] {
        let local = match self.shape {
            SpriteShape::Blob { radius } => {
                let r = Vec2::splat(radius);
                axis_quad(self.position - r, self.position + r)
            }
            SpriteShape::Glyph { size, .. } => {
                let half = Vec2::new(size * GLYPH_PX_W / GLYPH_PX_H, size) * 0.5;
                axis_quad(self.position - half, self.position + half)
            }
            SpriteShape::Ray { length, width } => {
                let dir = Vec2::new(self.rotation.sin(), self.rotation.cos());
                let side = dir.perp() * (width * 0.5);
                let tip = self.position + dir * length;
                [self.position - side, self.position + side, tip + side, tip - side]
            }
        };
        local.map(|p| transform.apply(p))
    }
}

fn axis_quad(min: Vec2, max: Vec2) -> [Vec2; 4] {
    [min, Vec2::new(max.x, min.y), max, Vec2::new(min.x, max.y)]
}

/// Ordered list of sprites for one overlay frame.
#[derive(Debug, Clone, Default)]
pub struct SpriteBatch {
    sprites: Vec<Sprite>,
}

impl SpriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(n: usize) -> Self {
        Self { sprites: Vec::with_capacity(n) }
    }

    pub fn push(&mut self, sprite: Sprite) {
        self.sprites.push(sprite);
    }

    pub fn len(&self) -> usize {
        self.sprites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sprites.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Sprite> {
        self.sprites.iter()
    }

    pub fn clear(&mut self) {
        self.sprites.clear();
    }

    /// Build indexed quads in NDC for a `screen` of the given CSS size.
    pub fn tessellate(&self, screen: Vec2, transform: &ViewTransform) -> OverlayMesh {
        let mut builder = QuadBuilder::new(screen.x, screen.y);
        for sprite in &self.sprites {
            let corners = sprite.corners(transform);
            let color = sprite.color.to_array();
            match sprite.shape {
                SpriteShape::Blob { .. } => {
                    let b = BLOB_UV_BASE;
                    builder.add_quad(corners, [[b, b], [b + 1.0, b], [b + 1.0, b + 1.0], [b, b + 1.0]], color);
                }
                SpriteShape::Glyph { ch, .. } => match glyph_uv(ch) {
                    Some((u0, v0, u1, v1)) => {
                        builder.add_quad(corners, [[u0, v0], [u1, v0], [u1, v1], [u0, v1]], color)
                    }
                    None => continue,
                },
                SpriteShape::Ray { .. } => builder.add_quad(corners, [SOLID_UV; 4], color),
            }
        }
        OverlayMesh { vertices: builder.vertices, indices: builder.indices }
    }
}

/// Accumulates overlay quads, converting pixel coordinates to NDC.
struct QuadBuilder {
    vertices: Vec<OverlayVertex>,
    indices: Vec<u32>,
    screen_w: f32,
    screen_h: f32,
}

impl QuadBuilder {
    fn new(screen_w: f32, screen_h: f32) -> Self {
        Self {
            vertices: Vec::new(),
            indices: Vec::new(),
            screen_w: screen_w.max(1.0),
            screen_h: screen_h.max(1.0),
        }
    }

    /// Convert pixel coords to NDC.
    fn px_to_ndc(&self, p: Vec2) -> [f32; 2] {
        [
            (p.x / self.screen_w) * 2.0 - 1.0,
            1.0 - (p.y / self.screen_h) * 2.0,
        ]
    }

    fn add_quad(&mut self, corners: [Vec2; 4], uvs: [[f32; 2]; 4], color: [f32; 4]) {
        let base = self.vertices.len() as u32;
        for (corner, uv) in corners.into_iter().zip(uvs) {
            self.vertices.push(OverlayVertex { position: self.px_to_ndc(corner), tex_coords: uv, color });
        }
        self.indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
}

// ---- Bitmap font (6x8 pixel cells, ASCII 32..127) ----

/// Font atlas layout: 16 columns x 6 rows of 6x8 pixel glyphs, covering ASCII 32..127.
const FONT_COLS: f32 = 16.0;
const FONT_ROWS: f32 = 6.0;
pub(crate) const GLYPH_PX_W: f32 = 6.0;
pub(crate) const GLYPH_PX_H: f32 = 8.0;

/// Atlas UV rectangle (u0, v0, u1, v1) for a printable ASCII character.
fn glyph_uv(ch: char) -> Option<(f32, f32, f32, f32)> {
    let idx = glyph_index(ch)? as f32;
    let col = idx % FONT_COLS;
    let row = (idx / FONT_COLS).floor();
    Some((
        col / FONT_COLS,
        row / FONT_ROWS,
        (col + 1.0) / FONT_COLS,
        (row + 1.0) / FONT_ROWS,
    ))
}

fn glyph_index(ch: char) -> Option<usize> {
    let code = ch as u32;
    (32..128).contains(&code).then(|| (code - 32) as usize)
}

/// 5x7 bitmap rows for `ch` (bit 4 = leftmost column).
pub fn glyph_bitmap(ch: char) -> Option<&'static [u8; 7]> {
    glyph_index(ch).map(|i| &FONT_5X7[i])
}

/// Single-channel font atlas (width=96, height=48) for GPU hosts.
pub fn generate_font_atlas() -> (Vec<u8>, u32, u32) {
    let atlas_w: u32 = (FONT_COLS as u32) * (GLYPH_PX_W as u32);
    let atlas_h: u32 = (FONT_ROWS as u32) * (GLYPH_PX_H as u32);
    let mut pixels = vec![0u8; (atlas_w * atlas_h) as usize];

    for (idx, glyph) in FONT_5X7.iter().enumerate() {
        let base_x = (idx as u32 % 16) * (GLYPH_PX_W as u32);
        let base_y = (idx as u32 / 16) * (GLYPH_PX_H as u32);
        for (gy, bits) in glyph.iter().enumerate() {
            for gx in 0..5u32 {
                if (bits >> (4 - gx)) & 1 != 0 {
                    pixels[((base_y + gy as u32) * atlas_w + base_x + gx) as usize] = 255;
                }
            }
        }
    }

    (pixels, atlas_w, atlas_h)
}

/// Write the font atlas as a grayscale PNG for GPU hosts to load.
pub fn save_font_atlas(path: &Path) -> anyhow::Result<()> {
    let (pixels, w, h) = generate_font_atlas();
    let image = image::GrayImage::from_raw(w, h, pixels).context("font atlas buffer size")?;
    image.save(path).with_context(|| format!("saving font atlas {}", path.display()))
}

/// 5x7 bitmap font data for ASCII 32..127 (96 characters).
/// Each entry is 7 bytes; each byte encodes one row (5 MSBs used, bit4=leftmost).
#[rustfmt::skip]
const FONT_5X7: [[u8; 7]; 96] = [
    [0x00,0x00,0x00,0x00,0x00,0x00,0x00], // 32 ' '
    [0x04,0x04,0x04,0x04,0x04,0x00,0x04], // 33 '!'
    [0x0A,0x0A,0x00,0x00,0x00,0x00,0x00], // 34 '"'
    [0x0A,0x1F,0x0A,0x0A,0x1F,0x0A,0x00], // 35 '#'
    [0x04,0x0F,0x14,0x0E,0x05,0x1E,0x04], // 36 '$'
    [0x18,0x19,0x02,0x04,0x08,0x13,0x03], // 37 '%'
    [0x08,0x14,0x14,0x08,0x15,0x12,0x0D], // 38 '&'
    [0x04,0x04,0x00,0x00,0x00,0x00,0x00], // 39 '''
    [0x02,0x04,0x08,0x08,0x08,0x04,0x02], // 40 '('
    [0x08,0x04,0x02,0x02,0x02,0x04,0x08], // 41 ')'
    [0x04,0x15,0x0E,0x1F,0x0E,0x15,0x04], // 42 '*'
    [0x00,0x04,0x04,0x1F,0x04,0x04,0x00], // 43 '+'
    [0x00,0x00,0x00,0x00,0x00,0x04,0x08], // 44 ','
    [0x00,0x00,0x00,0x1F,0x00,0x00,0x00], // 45 '-'
    [0x00,0x00,0x00,0x00,0x00,0x00,0x04], // 46 '.'
    [0x01,0x01,0x02,0x04,0x08,0x10,0x10], // 47 '/'
    [0x0E,0x11,0x13,0x15,0x19,0x11,0x0E], // 48 '0'
    [0x04,0x0C,0x04,0x04,0x04,0x04,0x0E], // 49 '1'
    [0x0E,0x11,0x01,0x06,0x08,0x10,0x1F], // 50 '2'
    [0x0E,0x11,0x01,0x06,0x01,0x11,0x0E], // 51 '3'
    [0x02,0x06,0x0A,0x12,0x1F,0x02,0x02], // 52 '4'
    [0x1F,0x10,0x1E,0x01,0x01,0x11,0x0E], // 53 '5'
    [0x06,0x08,0x10,0x1E,0x11,0x11,0x0E], // 54 '6'
    [0x1F,0x01,0x02,0x04,0x08,0x08,0x08], // 55 '7'
    [0x0E,0x11,0x11,0x0E,0x11,0x11,0x0E], // 56 '8'
    [0x0E,0x11,0x11,0x0F,0x01,0x02,0x0C], // 57 '9'
    [0x00,0x00,0x04,0x00,0x00,0x04,0x00], // 58 ':'
    [0x00,0x00,0x04,0x00,0x00,0x04,0x08], // 59 ';'
    [0x02,0x04,0x08,0x10,0x08,0x04,0x02], // 60 '<'
    [0x00,0x00,0x1F,0x00,0x1F,0x00,0x00], // 61 '='
    [0x08,0x04,0x02,0x01,0x02,0x04,0x08], // 62 '>'
    [0x0E,0x11,0x01,0x02,0x04,0x00,0x04], // 63 '?'
    [0x0E,0x11,0x17,0x15,0x17,0x10,0x0E], // 64 '@'
    [0x0E,0x11,0x11,0x1F,0x11,0x11,0x11], // 65 'A'
    [0x1E,0x11,0x11,0x1E,0x11,0x11,0x1E], // 66 'B'
    [0x0E,0x11,0x10,0x10,0x10,0x11,0x0E], // 67 'C'
    [0x1E,0x11,0x11,0x11,0x11,0x11,0x1E], // 68 'D'
    [0x1F,0x10,0x10,0x1E,0x10,0x10,0x1F], // 69 'E'
    [0x1F,0x10,0x10,0x1E,0x10,0x10,0x10], // 70 'F'
    [0x0E,0x11,0x10,0x17,0x11,0x11,0x0F], // 71 'G'
    [0x11,0x11,0x11,0x1F,0x11,0x11,0x11], // 72 'H'
    [0x0E,0x04,0x04,0x04,0x04,0x04,0x0E], // 73 'I'
    [0x07,0x02,0x02,0x02,0x02,0x12,0x0C], // 74 'J'
    [0x11,0x12,0x14,0x18,0x14,0x12,0x11], // 75 'K'
    [0x10,0x10,0x10,0x10,0x10,0x10,0x1F], // 76 'L'
    [0x11,0x1B,0x15,0x15,0x11,0x11,0x11], // 77 'M'
    [0x11,0x19,0x15,0x13,0x11,0x11,0x11], // 78 'N'
    [0x0E,0x11,0x11,0x11,0x11,0x11,0x0E], // 79 'O'
    [0x1E,0x11,0x11,0x1E,0x10,0x10,0x10], // 80 'P'
    [0x0E,0x11,0x11,0x11,0x15,0x12,0x0D], // 81 'Q'
    [0x1E,0x11,0x11,0x1E,0x14,0x12,0x11], // 82 'R'
    [0x0E,0x11,0x10,0x0E,0x01,0x11,0x0E], // 83 'S'
    [0x1F,0x04,0x04,0x04,0x04,0x04,0x04], // 84 'T'
    [0x11,0x11,0x11,0x11,0x11,0x11,0x0E], // 85 'U'
    [0x11,0x11,0x11,0x11,0x0A,0x0A,0x04], // 86 'V'
    [0x11,0x11,0x11,0x15,0x15,0x1B,0x11], // 87 'W'
    [0x11,0x11,0x0A,0x04,0x0A,0x11,0x11], // 88 'X'
    [0x11,0x11,0x0A,0x04,0x04,0x04,0x04], // 89 'Y'
    [0x1F,0x01,0x02,0x04,0x08,0x10,0x1F], // 90 'Z'
    [0x0E,0x08,0x08,0x08,0x08,0x08,0x0E], // 91 '['
    [0x10,0x10,0x08,0x04,0x02,0x01,0x01], // 92 '\'
    [0x0E,0x02,0x02,0x02,0x02,0x02,0x0E], // 93 ']'
    [0x04,0x0A,0x11,0x00,0x00,0x00,0x00], // 94 '^'
    [0x00,0x00,0x00,0x00,0x00,0x00,0x1F], // 95 '_'
    [0x08,0x04,0x00,0x00,0x00,0x00,0x00], // 96 '`'
    [0x00,0x00,0x0E,0x01,0x0F,0x11,0x0F], // 97 'a'
    [0x10,0x10,0x1E,0x11,0x11,0x11,0x1E], // 98 'b'
    [0x00,0x00,0x0E,0x11,0x10,0x11,0x0E], // 99 'c'
    [0x01,0x01,0x0F,0x11,0x11,0x11,0x0F], // 100 'd'
    [0x00,0x00,0x0E,0x11,0x1F,0x10,0x0E], // 101 'e'
    [0x06,0x08,0x1E,0x08,0x08,0x08,0x08], // 102 'f'
    [0x00,0x00,0x0F,0x11,0x0F,0x01,0x0E], // 103 'g'
    [0x10,0x10,0x1E,0x11,0x11,0x11,0x11], // 104 'h'
    [0x04,0x00,0x0C,0x04,0x04,0x04,0x0E], // 105 'i'
    [0x02,0x00,0x06,0x02,0x02,0x12,0x0C], // 106 'j'
    [0x10,0x10,0x12,0x14,0x18,0x14,0x12], // 107 'k'
    [0x0C,0x04,0x04,0x04,0x04,0x04,0x0E], // 108 'l'
    [0x00,0x00,0x1A,0x15,0x15,0x15,0x11], // 109 'm'
    [0x00,0x00,0x1E,0x11,0x11,0x11,0x11], // 110 'n'
    [0x00,0x00,0x0E,0x11,0x11,0x11,0x0E], // 111 'o'
    [0x00,0x00,0x1E,0x11,0x1E,0x10,0x10], // 112 'p'
    [0x00,0x00,0x0F,0x11,0x0F,0x01,0x01], // 113 'q'
    [0x00,0x00,0x16,0x19,0x10,0x10,0x10], // 114 'r'
    [0x00,0x00,0x0F,0x10,0x0E,0x01,0x1E], // 115 's'
    [0x08,0x08,0x1E,0x08,0x08,0x09,0x06], // 116 't'
    [0x00,0x00,0x11,0x11,0x11,0x13,0x0D], // 117 'u'
    [0x00,0x00,0x11,0x11,0x11,0x0A,0x04], // 118 'v'
    [0x00,0x00,0x11,0x15,0x15,0x15,0x0A], // 119 'w'
    [0x00,0x00,0x11,0x0A,0x04,0x0A,0x11], // 120 'x'
    [0x00,0x00,0x11,0x11,0x0F,0x01,0x0E], // 121 'y'
    [0x00,0x00,0x1F,0x02,0x04,0x08,0x1F], // 122 'z'
    [0x02,0x04,0x04,0x08,0x04,0x04,0x02], // 123 '{'
    [0x04,0x04,0x04,0x04,0x04,0x04,0x04], // 124 '|'
    [0x08,0x04,0x04,0x02,0x04,0x04,0x08], // 125 '}'
    [0x00,0x08,0x15,0x02,0x00,0x00,0x00], // 126 '~'
    [0x1F,0x1F,0x1F,0x1F,0x1F,0x1F,0x1F], // 127 DEL (solid block - useful for bg)
];

#[cfg(test)]
mod tests {
    use super::*;

    fn blob(x: f32, y: f32) -> Sprite {
        Sprite {
            position: Vec2::new(x, y),
            shape: SpriteShape::Blob { radius: 10.0 },
            rotation: 0.0,
            color: Rgba::WHITE,
        }
    }

    #[test]
    fn tessellate_emits_one_quad_per_sprite() {
        let mut batch = SpriteBatch::new();
        batch.push(blob(100.0, 100.0));
        batch.push(Sprite { shape: SpriteShape::Glyph { ch: '*', size: 12.0 }, ..blob(50.0, 50.0) });
        batch.push(Sprite { shape: SpriteShape::Ray { length: 40.0, width: 4.0 }, ..blob(10.0, 0.0) });
        let mesh = batch.tessellate(Vec2::new(200.0, 200.0), &ViewTransform::IDENTITY);
        assert_eq!(mesh.vertices.len(), 12);
        assert_eq!(mesh.quad_count(), 3);
        assert_eq!(&mesh.indices[6..12], &[4, 5, 6, 4, 6, 7]);
    }

    #[test]
    fn tessellate_maps_to_ndc() {
        let mut batch = SpriteBatch::new();
        batch.push(blob(10.0, 10.0));
        let verts = batch.tessellate(Vec2::new(20.0, 20.0), &ViewTransform::IDENTITY).vertices;
        assert_eq!(verts[0].position, [-1.0, 1.0]);
        assert_eq!(verts[2].position, [1.0, -1.0]);
        assert!(verts[0].tex_coords[0] >= BLOB_UV_BASE);
    }

    #[test]
    fn tessellate_applies_view_transform() {
        let mut batch = SpriteBatch::new();
        batch.push(blob(10.0, 10.0));
        let t = ViewTransform::from_pan_zoom(Vec2::new(10.0, 10.0), 2.0);
        let corners = batch.iter().next().unwrap().corners(&t);
        assert_eq!(corners[0], Vec2::new(-10.0, -10.0));
        assert_eq!(corners[2], Vec2::new(30.0, 30.0));
    }

    #[test]
    fn ray_points_down_at_zero_rotation() {
        let s = Sprite { shape: SpriteShape::Ray { length: 50.0, width: 2.0 }, ..blob(0.0, 0.0) };
        let c = s.corners(&ViewTransform::IDENTITY);
        assert!((c[2].y - 50.0).abs() < 1e-4 && (c[3].y - 50.0).abs() < 1e-4);
    }

    #[test]
    fn non_ascii_glyphs_are_skipped() {
        let mut batch = SpriteBatch::new();
        batch.push(Sprite { shape: SpriteShape::Glyph { ch: 'é', size: 8.0 }, ..blob(0.0, 0.0) });
        let mesh = batch.tessellate(Vec2::new(10.0, 10.0), &ViewTransform::IDENTITY);
        assert_eq!(mesh, OverlayMesh::default());
        assert!(glyph_bitmap('é').is_none());
        assert!(glyph_bitmap('*').is_some());
    }

    #[test]
    fn mesh_bytes_have_counts_then_buffers() {
        let mut batch = SpriteBatch::new();
        batch.push(blob(5.0, 5.0));
        let bytes = batch.tessellate(Vec2::new(10.0, 10.0), &ViewTransform::IDENTITY).to_bytes();
        assert_eq!(&bytes[..4], &4u32.to_le_bytes());
        assert_eq!(&bytes[4..8], &6u32.to_le_bytes());
        assert_eq!(bytes.len(), 8 + 4 * std::mem::size_of::<OverlayVertex>() + 6 * 4);
        assert_eq!(std::mem::size_of::<OverlayVertex>(), 32);
    }

    #[test]
    fn font_atlas_png_round_trips_dimensions() {
        let path = std::env::temp_dir().join(format!("atmosphere-atlas-{}.png", std::process::id()));
        save_font_atlas(&path).unwrap();
        let loaded = image::open(&path).unwrap();
        assert_eq!((loaded.width(), loaded.height()), (96, 48));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn font_atlas_has_expected_size() {
        let (pixels, w, h) = generate_font_atlas();
        assert_eq!((w, h), (96, 48));
        assert_eq!(pixels.len(), 96 * 48);
        // Space is blank, DEL is a solid block.
        assert!(pixels[..5].iter().all(|&p| p == 0));
        assert!(pixels.iter().any(|&p| p == 255));
    }
}

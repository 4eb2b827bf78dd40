//! Draws placements onto a copy of the base image.
//!
//! Each symbol is sized so its em equals the placement diameter, centered
//! horizontally on the placement center with its baseline at
//! `center_y + (ascent + descent) / 2`, then rotated clockwise about the center.
//! Outline glyphs are rasterised with anti-aliased coverage in the renderer color;
//! color bitmap glyphs (CBDT/sbix emoji fonts) are resampled and keep their own colors.

use std::{fmt, fs, path::Path, sync::Arc};

use ab_glyph::{Font, FontArc, GlyphId, GlyphImageFormat, PxScale, ScaleFont};
use ab_glyph_rasterizer::Rasterizer;
use anyhow::{Context, Result};
use image::{ImageFormat, Rgba, RgbaImage};
use log::debug;

pub use ab_glyph::{OutlineCurve, Point, point};

use emojiface_utils::{RgbaColor, timing_guard};

use crate::annotation::Placement;
use crate::error::OverlayError;

/// Ink produced by shaping one glyph.
///
/// Coordinates are pixels relative to the pen start on the baseline, y down.
#[derive(Debug, Clone)]
pub enum GlyphInk {
    Outline(Vec<OutlineCurve>),
    /// A color bitmap stretched over the rectangle `min..max`.
    Bitmap {
        image: Arc<RgbaImage>,
        min: Point,
        max: Point,
    },
}

/// A symbol laid out at a given em size.
#[derive(Debug, Clone, Default)]
pub struct ShapedSymbol {
    /// Distance from baseline to the top of the line (positive).
    pub ascent: f32,
    /// Distance from baseline to the bottom of the line (negative).
    pub descent: f32,
    /// Total horizontal advance.
    pub advance: f32,
    pub ink: Vec<GlyphInk>,
}

/// Lays out symbols as glyph ink.
pub trait GlyphSource: Send + Sync {
    fn shape(&self, symbol: &str, size: f32) -> ShapedSymbol;
}

/// Glyphs from a TrueType/OpenType font.
#[derive(Clone)]
pub struct FontGlyphs {
    font: FontArc,
}

impl fmt::Debug for FontGlyphs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FontGlyphs")
            .field("glyph_count", &self.font.glyph_count())
            .finish()
    }
}

impl FontGlyphs {
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let font = FontArc::try_from_vec(data).map_err(|e| anyhow::anyhow!("invalid font: {e}"))?;
        Ok(Self { font })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data =
            fs::read(path).with_context(|| format!("failed to read font {}", path.display()))?;
        Self::from_bytes(data).with_context(|| format!("failed to parse font {}", path.display()))
    }

    fn bitmap_ink(&self, id: GlyphId, size: f32, pen: f32, advance: f32, mid_y: f32) -> Option<GlyphInk> {
        let strike = size.ceil().clamp(1.0, f32::from(u16::MAX)) as u16;
        let raster = self.font.glyph_raster_image2(id, strike)?;
        let image = match raster.format {
            GlyphImageFormat::Png => {
                match image::load_from_memory_with_format(raster.data, ImageFormat::Png) {
                    Ok(decoded) => decoded.to_rgba8(),
                    Err(err) => {
                        debug!("skipping undecodable bitmap glyph {id:?}: {err}");
                        return None;
                    }
                }
            }
            other => {
                debug!("skipping bitmap glyph {id:?} in unsupported format {other:?}");
                return None;
            }
        };
        if image.width() == 0 || image.height() == 0 || raster.pixels_per_em == 0 {
            return None;
        }

        let (min, max) = bitmap_bounds(
            image.dimensions(),
            raster.pixels_per_em,
            size,
            pen,
            advance,
            mid_y,
        );
        Some(GlyphInk::Bitmap {
            image: Arc::new(image),
            min,
            max,
        })
    }
}

/// Where a bitmap strike lands: scaled from its strike size to `size`, centered in
/// the advance cell starting at `pen` and vertically on `mid_y`.
fn bitmap_bounds(
    (image_w, image_h): (u32, u32),
    pixels_per_em: u16,
    size: f32,
    pen: f32,
    advance: f32,
    mid_y: f32,
) -> (Point, Point) {
    let scale = size / f32::from(pixels_per_em);
    let width = image_w as f32 * scale;
    let height = image_h as f32 * scale;
    let cell = if advance > 0.0 { advance } else { width };
    let min = point(pen + (cell - width) / 2.0, mid_y - height / 2.0);
    (min, point(min.x + width, min.y + height))
}

/// Characters that only modify neighbouring glyphs.
fn is_invisible(ch: char) -> bool {
    matches!(ch, '\u{200D}' | '\u{FE0E}' | '\u{FE0F}')
}

impl GlyphSource for FontGlyphs {
    fn shape(&self, symbol: &str, size: f32) -> ShapedSymbol {
        let units_per_em = self
            .font
            .units_per_em()
            .unwrap_or_else(|| self.font.height_unscaled());
        let px_scale = PxScale::from(size * self.font.height_unscaled() / units_per_em);
        let scaled = self.font.as_scaled(px_scale);
        let (h_scale, v_scale) = (scaled.h_scale_factor(), scaled.v_scale_factor());
        let (ascent, descent) = (scaled.ascent(), scaled.descent());
        let mid_y = -(ascent + descent) / 2.0;

        let mut ink = Vec::new();
        let mut pen = 0.0f32;
        let mut previous: Option<GlyphId> = None;
        for ch in symbol.chars().filter(|ch| !is_invisible(*ch)) {
            let id = self.font.glyph_id(ch);
            if let Some(prev) = previous {
                pen += scaled.kern(prev, id);
            }
            let advance = scaled.h_advance(id);

            match self.font.outline(id) {
                Some(outline) if !outline.curves.is_empty() => {
                    let place = |p: Point| point(pen + p.x * h_scale, -p.y * v_scale);
                    ink.push(GlyphInk::Outline(
                        outline.curves.iter().map(|c| map_curve(c, place)).collect(),
                    ));
                }
                _ => {
                    if let Some(bitmap) = self.bitmap_ink(id, size, pen, advance, mid_y) {
                        ink.push(bitmap);
                    }
                }
            }

            pen += advance;
            previous = Some(id);
        }

        ShapedSymbol {
            ascent,
            descent,
            advance: pen,
            ink,
        }
    }
}

/// Composites placements over a base image.
///
/// Holds no per-render state: the same base and placements always give the same pixels.
#[derive(Clone)]
pub struct OverlayRenderer {
    glyphs: Option<Arc<dyn GlyphSource>>,
    color: Rgba<u8>,
}

impl fmt::Debug for OverlayRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverlayRenderer")
            .field("has_glyphs", &self.has_glyphs())
            .field("color", &self.color)
            .finish()
    }
}

impl OverlayRenderer {
    pub fn new(glyphs: Arc<dyn GlyphSource>, color: RgbaColor) -> Self {
        Self {
            glyphs: Some(glyphs),
            color: color.to_rgba(),
        }
    }

    /// A renderer that can only reproduce the base image (empty placement lists).
    pub fn without_glyphs(color: RgbaColor) -> Self {
        Self {
            glyphs: None,
            color: color.to_rgba(),
        }
    }

    pub fn has_glyphs(&self) -> bool {
        self.glyphs.is_some()
    }

    /// Draw every placement, in order, onto a fresh copy of `base`.
    pub fn render(&self, base: &RgbaImage, placements: &[Placement]) -> Result<RgbaImage, OverlayError> {
        let _guard = timing_guard("emojiface_core::render", log::Level::Debug);
        if !placements.is_empty() && self.glyphs.is_none() {
            return Err(OverlayError::MissingGlyphs(placements.len()));
        }
        let mut canvas = base.clone();
        for placement in placements {
            self.draw_placement(&mut canvas, placement)?;
        }
        Ok(canvas)
    }

    /// Draw a single placement in place.
    pub fn draw_placement(&self, canvas: &mut RgbaImage, placement: &Placement) -> Result<(), OverlayError> {
        let glyphs = self.glyphs.as_ref().ok_or(OverlayError::MissingGlyphs(1))?;
        placement.validate()?;

        let shaped = glyphs.shape(&placement.symbol, placement.diameter);
        let origin = point(
            placement.center_x - shaped.advance / 2.0,
            placement.center_y + (shaped.ascent + shaped.descent) / 2.0,
        );
        let rotation = Rotation::about(
            placement.center_x,
            placement.center_y,
            placement.angle_degrees,
        );
        let to_canvas = |p: Point| rotation.apply(point(origin.x + p.x, origin.y + p.y));

        for ink in &shaped.ink {
            match ink {
                GlyphInk::Outline(curves) => {
                    let curves: Vec<OutlineCurve> =
                        curves.iter().map(|c| map_curve(c, to_canvas)).collect();
                    fill_outline(canvas, &curves, self.color);
                }
                GlyphInk::Bitmap { image, min, max } => {
                    let min = point(origin.x + min.x, origin.y + min.y);
                    let max = point(origin.x + max.x, origin.y + max.y);
                    draw_bitmap(canvas, image, min, max, &rotation);
                }
            }
        }
        Ok(())
    }
}

/// Rotation about a fixed center; positive angles turn clockwise with y down.
#[derive(Debug, Clone, Copy)]
struct Rotation {
    cx: f32,
    cy: f32,
    sin: f32,
    cos: f32,
}

impl Rotation {
    fn about(cx: f32, cy: f32, degrees: f32) -> Self {
        let (sin, cos) = degrees.to_radians().sin_cos();
        Self { cx, cy, sin, cos }
    }

    fn apply(&self, p: Point) -> Point {
        let (dx, dy) = (p.x - self.cx, p.y - self.cy);
        point(
            self.cx + dx * self.cos - dy * self.sin,
            self.cy + dx * self.sin + dy * self.cos,
        )
    }

    fn invert(&self, p: Point) -> Point {
        let (dx, dy) = (p.x - self.cx, p.y - self.cy);
        point(
            self.cx + dx * self.cos + dy * self.sin,
            self.cy - dx * self.sin + dy * self.cos,
        )
    }
}

fn map_curve(curve: &OutlineCurve, f: impl Fn(Point) -> Point) -> OutlineCurve {
    match *curve {
        OutlineCurve::Line(a, b) => OutlineCurve::Line(f(a), f(b)),
        OutlineCurve::Quad(a, b, c) => OutlineCurve::Quad(f(a), f(b), f(c)),
        OutlineCurve::Cubic(a, b, c, d) => OutlineCurve::Cubic(f(a), f(b), f(c), f(d)),
    }
}

fn curve_points(curve: &OutlineCurve) -> impl Iterator<Item = Point> {
    let points: [Option<Point>; 4] = match *curve {
        OutlineCurve::Line(a, b) => [Some(a), Some(b), None, None],
        OutlineCurve::Quad(a, b, c) => [Some(a), Some(b), Some(c), None],
        OutlineCurve::Cubic(a, b, c, d) => [Some(a), Some(b), Some(c), Some(d)],
    };
    points.into_iter().flatten()
}

/// Most line segments a single curve is flattened into.
const MAX_CURVE_SEGMENTS: usize = 256;

/// Fill closed outlines (canvas coordinates) with anti-aliased coverage.
///
/// The raster buffer never exceeds the canvas: rows outside it are dropped by the
/// rasterizer, and edges left or right of it are folded onto the canvas border,
/// which leaves the winding of every visible pixel unchanged.
fn fill_outline(canvas: &mut RgbaImage, curves: &[OutlineCurve], color: Rgba<u8>) {
    let mut points = curves.iter().flat_map(curve_points);
    let Some(first) = points.next() else {
        return;
    };
    let (mut min, mut max) = (first, first);
    for p in points {
        min = point(min.x.min(p.x), min.y.min(p.y));
        max = point(max.x.max(p.x), max.y.max(p.y));
    }

    let (canvas_w, canvas_h) = canvas.dimensions();
    let right = canvas_w as f32;
    let y0 = min.y.floor().max(0.0);
    let y1 = max.y.ceil().min(canvas_h as f32);
    if max.x <= 0.0 || min.x >= right || y1 <= y0 {
        return;
    }
    let width = canvas_w as usize + 2;
    let height = (y1 - y0) as usize;

    let mut raster = Rasterizer::new(width, height);
    let mut draw = |a: Point, b: Point| {
        for (from, to) in clip_columns(a, b, right) {
            raster.draw_line(point(from.x, from.y - y0), point(to.x, to.y - y0));
        }
    };
    for curve in curves {
        flatten_curve(curve, &mut draw);
    }

    let source = [
        f32::from(color[0]),
        f32::from(color[1]),
        f32::from(color[2]),
    ];
    let opacity = f32::from(color[3]) / 255.0;
    raster.for_each_pixel_2d(|x, y, coverage| {
        let py = y0 as u32 + y;
        if x >= canvas_w || py >= canvas_h {
            return;
        }
        let alpha = coverage.clamp(0.0, 1.0) * opacity;
        blend(canvas.get_pixel_mut(x, py), source, alpha);
    });
}

/// Emit `curve` as a polyline through `line`.
fn flatten_curve(curve: &OutlineCurve, line: &mut impl FnMut(Point, Point)) {
    let (start, end, eval): (Point, Point, Box<dyn Fn(f32) -> Point>) = match *curve {
        OutlineCurve::Line(a, b) => {
            line(a, b);
            return;
        }
        OutlineCurve::Quad(a, b, c) => (
            a,
            c,
            Box::new(move |t: f32| {
                let u = 1.0 - t;
                point(
                    u * u * a.x + 2.0 * u * t * b.x + t * t * c.x,
                    u * u * a.y + 2.0 * u * t * b.y + t * t * c.y,
                )
            }),
        ),
        OutlineCurve::Cubic(a, b, c, d) => (
            a,
            d,
            Box::new(move |t: f32| {
                let u = 1.0 - t;
                let (w0, w1, w2, w3) = (u * u * u, 3.0 * u * u * t, 3.0 * u * t * t, t * t * t);
                point(
                    w0 * a.x + w1 * b.x + w2 * c.x + w3 * d.x,
                    w0 * a.y + w1 * b.y + w2 * c.y + w3 * d.y,
                )
            }),
        ),
    };

    // Segment count grows with the control polygon's deviation from the chord.
    let deviation = curve_points(curve)
        .map(|p| point_to_line_distance(p, start, end))
        .fold(0.0f32, f32::max);
    let segments = (1.0 + (deviation * 4.0).sqrt()).ceil() as usize;
    let segments = segments.clamp(1, MAX_CURVE_SEGMENTS);

    let mut previous = start;
    for i in 1..=segments {
        let next = if i == segments {
            end
        } else {
            eval(i as f32 / segments as f32)
        };
        line(previous, next);
        previous = next;
    }
}

fn point_to_line_distance(p: Point, a: Point, b: Point) -> f32 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let length = dx.hypot(dy);
    if length <= f32::EPSILON {
        return (p.x - a.x).hypot(p.y - a.y);
    }
    ((p.x - a.x) * dy - (p.y - a.y) * dx).abs() / length
}

/// Split `a..b` where it crosses `x = 0` or `x = right` and fold each piece into
/// `0..=right`.
fn clip_columns(a: Point, b: Point, right: f32) -> impl Iterator<Item = (Point, Point)> {
    let mut cuts = [0.0f32, 1.0, 1.0, 1.0];
    let mut count = 1;
    let dx = b.x - a.x;
    if dx != 0.0 {
        for edge in [0.0, right] {
            let t = (edge - a.x) / dx;
            if t > 0.0 && t < 1.0 {
                cuts[count] = t;
                count += 1;
            }
        }
    }
    cuts[count] = 1.0;
    cuts[..=count].sort_by(f32::total_cmp);

    let at = move |t: f32| {
        let p = point(a.x + dx * t, a.y + (b.y - a.y) * t);
        point(p.x.clamp(0.0, right), p.y)
    };
    (0..count).map(move |i| (at(cuts[i]), at(cuts[i + 1])))
}

/// Resample `image` into the rotated rectangle `min..max` (unrotated canvas coordinates).
fn draw_bitmap(canvas: &mut RgbaImage, image: &RgbaImage, min: Point, max: Point, rotation: &Rotation) {
    let (width, height) = (max.x - min.x, max.y - min.y);
    if width <= 0.0 || height <= 0.0 {
        return;
    }
    let corners = [
        rotation.apply(min),
        rotation.apply(point(max.x, min.y)),
        rotation.apply(max),
        rotation.apply(point(min.x, max.y)),
    ];
    let (canvas_w, canvas_h) = canvas.dimensions();
    let lo_x = corners.iter().map(|p| p.x).fold(f32::INFINITY, f32::min).floor().max(0.0);
    let lo_y = corners.iter().map(|p| p.y).fold(f32::INFINITY, f32::min).floor().max(0.0);
    let hi_x = corners.iter().map(|p| p.x).fold(f32::NEG_INFINITY, f32::max).ceil().min(canvas_w as f32);
    let hi_y = corners.iter().map(|p| p.y).fold(f32::NEG_INFINITY, f32::max).ceil().min(canvas_h as f32);
    if hi_x <= lo_x || hi_y <= lo_y {
        return;
    }

    let u_scale = image.width() as f32 / width;
    let v_scale = image.height() as f32 / height;
    for py in lo_y as u32..hi_y as u32 {
        for px in lo_x as u32..hi_x as u32 {
            let local = rotation.invert(point(px as f32 + 0.5, py as f32 + 0.5));
            let u = (local.x - min.x) * u_scale;
            let v = (local.y - min.y) * v_scale;
            if let Some((rgb, alpha)) = sample_bilinear(image, u, v) {
                blend(canvas.get_pixel_mut(px, py), rgb, alpha);
            }
        }
    }
}

/// Bilinear sample at bitmap coordinates (pixel centers at +0.5), premultiplied while mixing.
fn sample_bilinear(image: &RgbaImage, u: f32, v: f32) -> Option<([f32; 3], f32)> {
    let (w, h) = (image.width() as f32, image.height() as f32);
    if u < 0.0 || v < 0.0 || u >= w || v >= h {
        return None;
    }
    let fx = (u - 0.5).clamp(0.0, w - 1.0);
    let fy = (v - 0.5).clamp(0.0, h - 1.0);
    let (x0, y0) = (fx.floor() as u32, fy.floor() as u32);
    let x1 = (x0 + 1).min(image.width() - 1);
    let y1 = (y0 + 1).min(image.height() - 1);
    let (tx, ty) = (fx - x0 as f32, fy - y0 as f32);

    let mut premul = [0.0f32; 3];
    let mut alpha = 0.0f32;
    for (x, y, weight) in [
        (x0, y0, (1.0 - tx) * (1.0 - ty)),
        (x1, y0, tx * (1.0 - ty)),
        (x0, y1, (1.0 - tx) * ty),
        (x1, y1, tx * ty),
    ] {
        let pixel = image.get_pixel(x, y);
        let a = f32::from(pixel[3]) / 255.0 * weight;
        for (channel, value) in premul.iter_mut().zip(pixel.0.iter()) {
            *channel += f32::from(*value) * a;
        }
        alpha += a;
    }
    if alpha <= 0.0 {
        return None;
    }
    Some((premul.map(|c| c / alpha), alpha))
}

/// Source-over compositing of a straight-alpha color onto a straight-alpha pixel.
fn blend(dst: &mut Rgba<u8>, source: [f32; 3], alpha: f32) {
    if alpha <= 0.0 {
        return;
    }
    let dst_alpha = f32::from(dst[3]) / 255.0;
    let out_alpha = alpha + dst_alpha * (1.0 - alpha);
    if out_alpha <= 0.0 {
        return;
    }
    for (channel, src) in source.iter().enumerate() {
        let value = (src * alpha + f32::from(dst[channel]) * dst_alpha * (1.0 - alpha)) / out_alpha;
        dst[channel] = value.round().clamp(0.0, 255.0) as u8;
    }
    dst[3] = (out_alpha * 255.0).round().clamp(0.0, 255.0) as u8;
}

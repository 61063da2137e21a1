use std::fmt;
use std::str::FromStr;

use font8x8::{UnicodeFonts, BASIC_FONTS, GREEK_FONTS, LATIN_FONTS, MISC_FONTS};
use image::{Rgba, RgbaImage};

use crate::error::{AnnotateError, Result};
use crate::geometry::Point;

/// Raw RGBA8 output of a document renderer.
#[derive(Debug, Clone)]
pub struct RenderImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl RenderImage {
    pub fn from_rgba(image: RgbaImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            pixels: image.into_raw(),
        }
    }

    /// Validates the buffer and converts it into an owned raster for page `index`.
    pub fn into_rgba(self, index: usize) -> Result<RgbaImage> {
        if self.width == 0 || self.height == 0 {
            return Err(AnnotateError::InvalidRaster {
                index,
                reason: format!("empty raster {}x{}", self.width, self.height),
            });
        }
        let expected = self.width as usize * self.height as usize * 4;
        let actual = self.pixels.len();
        RgbaImage::from_raw(self.width, self.height, self.pixels).ok_or_else(|| {
            AnnotateError::InvalidRaster {
                index,
                reason: format!("expected {expected} bytes of RGBA data, got {actual}"),
            }
        })
    }
}

/// An RGBA color written as `#rrggbb` or `#rrggbbaa`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color(pub [u8; 4]);

impl Color {
    pub const BLACK: Color = Color([0, 0, 0, 255]);

    pub fn rgba(self) -> Rgba<u8> {
        Rgba(self.0)
    }
}

impl FromStr for Color {
    type Err = AnnotateError;

    fn from_str(value: &str) -> Result<Self> {
        let hex = value.trim().trim_start_matches('#');
        let invalid = || AnnotateError::Config(format!("invalid color {value:?}"));
        if !(hex.len() == 6 || hex.len() == 8) || !hex.is_ascii() {
            return Err(invalid());
        }
        let mut channels = [0u8, 0, 0, 255];
        for (slot, idx) in channels.iter_mut().zip((0..hex.len()).step_by(2)) {
            *slot = u8::from_str_radix(&hex[idx..idx + 2], 16).map_err(|_| invalid())?;
        }
        Ok(Color(channels))
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r, g, b, a] = self.0;
        if a == 255 {
            write!(f, "#{r:02x}{g:02x}{b:02x}")
        } else {
            write!(f, "#{r:02x}{g:02x}{b:02x}{a:02x}")
        }
    }
}

/// Source-over compositing of `src` onto `dst`.
pub fn blend_pixel(dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
    let sa = f32::from(src[3]) / 255.0;
    if sa <= 0.0 {
        return dst;
    }
    if sa >= 1.0 {
        return src;
    }
    let da = f32::from(dst[3]) / 255.0;
    let out_a = sa + da * (1.0 - sa);
    let mut out = [0u8; 4];
    for channel in 0..3 {
        let value = (f32::from(src[channel]) * sa + f32::from(dst[channel]) * da * (1.0 - sa))
            / out_a;
        out[channel] = value.round().clamp(0.0, 255.0) as u8;
    }
    out[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
    Rgba(out)
}

pub fn clear(image: &mut RgbaImage) {
    for pixel in image.pixels_mut() {
        *pixel = Rgba([0, 0, 0, 0]);
    }
}

pub fn is_fully_transparent(image: &RgbaImage) -> bool {
    image.pixels().all(|pixel| pixel[3] == 0)
}

/// Strokes a polyline with round joins and caps.
///
/// Every covered pixel is blended exactly once, so translucent colors do not
/// darken where segments overlap.
pub fn stroke_polyline(image: &mut RgbaImage, points: &[Point], width: f32, color: Color) {
    if points.is_empty() || image.width() == 0 || image.height() == 0 {
        return;
    }
    let radius = (width.max(1.0) / 2.0).max(0.5);

    let (mut min_x, mut min_y) = (f32::MAX, f32::MAX);
    let (mut max_x, mut max_y) = (f32::MIN, f32::MIN);
    for point in points {
        min_x = min_x.min(point.x);
        min_y = min_y.min(point.y);
        max_x = max_x.max(point.x);
        max_y = max_y.max(point.y);
    }
    let Some((x0, x1)) = pixel_span(min_x - radius, max_x + radius, image.width()) else {
        return;
    };
    let Some((y0, y1)) = pixel_span(min_y - radius, max_y + radius, image.height()) else {
        return;
    };

    let segments: Vec<(Point, Point)> = if points.len() == 1 {
        vec![(points[0], points[0])]
    } else {
        points.windows(2).map(|pair| (pair[0], pair[1])).collect()
    };
    let src = color.rgba();

    for y in y0..=y1 {
        for x in x0..=x1 {
            let center = Point::new(x as f32 + 0.5, y as f32 + 0.5);
            let covered = segments
                .iter()
                .any(|(a, b)| center.distance_to_segment(*a, *b) <= radius);
            if covered {
                let dst = *image.get_pixel(x, y);
                image.put_pixel(x, y, blend_pixel(dst, src));
            }
        }
    }
}

/// Rows of an 8x8 glyph that sit above the baseline.
const GLYPH_BASELINE_ROWS: i64 = 7;
const GLYPH_CELL: i64 = 8;

fn glyph_for(ch: char) -> Option<[u8; 8]> {
    BASIC_FONTS
        .get(ch)
        .or_else(|| LATIN_FONTS.get(ch))
        .or_else(|| GREEK_FONTS.get(ch))
        .or_else(|| MISC_FONTS.get(ch))
        .or_else(|| BASIC_FONTS.get('?'))
}

/// Integer magnification of the 8px bitmap font closest to `size`.
pub fn glyph_scale(size: f32) -> i32 {
    ((size / GLYPH_CELL as f32).round() as i32).max(1)
}

/// Renders `text` with its baseline at `anchor.y` and its left edge at `anchor.x`.
///
/// Glyph cells are clipped to the raster, so anchors far off the page draw
/// nothing and cost nothing.
pub fn draw_text(image: &mut RgbaImage, anchor: Point, text: &str, size: f32, color: Color) {
    if !(anchor.x.is_finite() && anchor.y.is_finite()) {
        return;
    }
    let scale = i64::from(glyph_scale(size));
    let cell = GLYPH_CELL * scale;
    let src = color.rgba();
    let width = i64::from(image.width());
    let height = i64::from(image.height());
    let top = (anchor.y.round() as i64).saturating_sub(GLYPH_BASELINE_ROWS * scale);
    if top >= height || top.saturating_add(cell) <= 0 {
        return;
    }
    let mut cursor_x = anchor.x.round() as i64;

    for ch in text.chars() {
        if cursor_x >= width {
            break;
        }
        if cursor_x.saturating_add(cell) > 0 {
            if let Some(glyph) = glyph_for(ch) {
                for (row_idx, row_bits) in (0..).zip(glyph) {
                    let rows = clip(top + row_idx * scale, scale, height);
                    for col_idx in 0..GLYPH_CELL {
                        if (row_bits >> col_idx) & 1 == 0 {
                            continue;
                        }
                        let cols = clip(cursor_x + col_idx * scale, scale, width);
                        for ty in rows.clone() {
                            for tx in cols.clone() {
                                let dst = *image.get_pixel(tx, ty);
                                image.put_pixel(tx, ty, blend_pixel(dst, src));
                            }
                        }
                    }
                }
            }
        }
        cursor_x = cursor_x.saturating_add(cell);
    }
}

/// Pixels of `[start, start + len)` that fall inside `0..extent`.
fn clip(start: i64, len: i64, extent: i64) -> std::ops::Range<u32> {
    let lo = start.clamp(0, extent);
    let hi = start.saturating_add(len).clamp(0, extent);
    lo as u32..hi.max(lo) as u32
}

fn pixel_span(lo: f32, hi: f32, extent: u32) -> Option<(u32, u32)> {
    if !lo.is_finite() || !hi.is_finite() || hi < 0.0 || lo >= extent as f32 {
        return None;
    }
    let start = lo.floor().max(0.0) as u32;
    let end = (hi.ceil() as u32).min(extent - 1);
    (start <= end).then_some((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_round_trips_through_hex() {
        let color: Color = "#ff8000".parse().unwrap();
        assert_eq!(color, Color([255, 128, 0, 255]));
        assert_eq!(color.to_string(), "#ff8000");

        let translucent: Color = "10203040".parse().unwrap();
        assert_eq!(translucent, Color([0x10, 0x20, 0x30, 0x40]));
        assert_eq!(translucent.to_string(), "#10203040");

        assert!("#12345".parse::<Color>().is_err());
        assert!("#gg0000".parse::<Color>().is_err());
    }

    #[test]
    fn render_image_rejects_short_buffers() {
        let image = RenderImage {
            width: 2,
            height: 2,
            pixels: vec![0; 15],
        };
        assert!(matches!(
            image.into_rgba(3),
            Err(AnnotateError::InvalidRaster { index: 3, .. })
        ));
    }

    #[test]
    fn opaque_blend_replaces_destination() {
        let dst = Rgba([10, 20, 30, 255]);
        assert_eq!(blend_pixel(dst, Rgba([0, 0, 0, 255])), Rgba([0, 0, 0, 255]));
        assert_eq!(blend_pixel(dst, Rgba([200, 0, 0, 0])), dst);
    }

    #[test]
    fn half_transparent_blend_over_transparent_keeps_color() {
        let out = blend_pixel(Rgba([0, 0, 0, 0]), Rgba([200, 100, 50, 128]));
        assert_eq!(out, Rgba([200, 100, 50, 128]));
    }

    #[test]
    fn horizontal_stroke_covers_expected_band() {
        let mut image = RgbaImage::new(300, 200);
        stroke_polyline(
            &mut image,
            &[Point::new(100.0, 100.0), Point::new(200.0, 100.0)],
            2.0,
            Color::BLACK,
        );
        assert_eq!(image.get_pixel(150, 99)[3], 255);
        assert_eq!(image.get_pixel(150, 100)[3], 255);
        assert_eq!(image.get_pixel(150, 102)[3], 0);
        assert_eq!(image.get_pixel(150, 97)[3], 0);
        assert_eq!(image.get_pixel(250, 100)[3], 0);
    }

    #[test]
    fn strokes_outside_the_raster_are_clipped() {
        let mut image = RgbaImage::new(10, 10);
        stroke_polyline(
            &mut image,
            &[Point::new(-50.0, -50.0), Point::new(-20.0, -40.0)],
            3.0,
            Color::BLACK,
        );
        assert!(is_fully_transparent(&image));

        stroke_polyline(
            &mut image,
            &[Point::new(-5.0, 5.0), Point::new(15.0, 5.0)],
            2.0,
            Color::BLACK,
        );
        assert_eq!(image.get_pixel(0, 5)[3], 255);
        assert_eq!(image.get_pixel(9, 5)[3], 255);
    }

    #[test]
    fn text_sits_on_the_baseline() {
        let mut image = RgbaImage::new(100, 60);
        draw_text(&mut image, Point::new(10.0, 40.0), "H", 24.0, Color::BLACK);
        let scale = glyph_scale(24.0);
        assert_eq!(scale, 3);

        let painted_rows: Vec<u32> = (0..image.height())
            .filter(|&y| (0..image.width()).any(|x| image.get_pixel(x, y)[3] > 0))
            .collect();
        assert!(!painted_rows.is_empty());
        assert!(*painted_rows.first().unwrap() >= 40 - 7 * 3);
        assert!(*painted_rows.last().unwrap() < 40);
    }

    #[test]
    fn text_far_off_the_raster_draws_nothing() {
        let mut image = RgbaImage::new(40, 40);
        for anchor in [
            Point::new(3.0e9, 10.0),
            Point::new(-3.0e9, -3.0e9),
            Point::new(10.0, 3.0e9),
            Point::new(f32::MAX, f32::MIN),
            Point::new(f32::NAN, 10.0),
        ] {
            draw_text(&mut image, anchor, "AB", 24.0, Color::BLACK);
        }
        assert!(is_fully_transparent(&image));
    }

    #[test]
    fn text_straddling_the_left_edge_keeps_its_visible_part() {
        let mut image = RgbaImage::new(40, 20);
        // The first cell lies entirely left of the raster; the second lands at x = 0..8.
        draw_text(&mut image, Point::new(-8.0, 10.0), "HH", 8.0, Color::BLACK);
        assert!(!is_fully_transparent(&image));
        assert!((8..40).all(|x| (0..20).all(|y| image.get_pixel(x, y)[3] == 0)));
    }

    #[test]
    fn oversized_text_is_clipped_to_the_raster() {
        let mut image = RgbaImage::new(20, 20);
        draw_text(&mut image, Point::new(0.0, 10.0), "HHHH", 1.0e9, Color::BLACK);
        draw_text(&mut image, Point::new(-5.0e8, 5.0e8), "W", 1.0e9, Color::BLACK);
    }

    #[test]
    fn unknown_glyphs_fall_back_instead_of_vanishing() {
        let mut image = RgbaImage::new(64, 32);
        draw_text(&mut image, Point::new(0.0, 20.0), "\u{AC00}", 16.0, Color::BLACK);
        assert!(!is_fully_transparent(&image));
    }
}

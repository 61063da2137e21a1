use serde::{Deserialize, Serialize};

/// A position in a page's raster coordinate space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: f32, dy: f32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    pub fn distance_to_segment(self, a: Point, b: Point) -> f32 {
        let (abx, aby) = (b.x - a.x, b.y - a.y);
        let length_sq = abx * abx + aby * aby;
        let t = if length_sq <= f32::EPSILON {
            0.0
        } else {
            (((self.x - a.x) * abx + (self.y - a.y) * aby) / length_sq).clamp(0.0, 1.0)
        };
        let (px, py) = (a.x + abx * t, a.y + aby * t);
        ((self.x - px).powi(2) + (self.y - py).powi(2)).sqrt()
    }
}

/// Maps positions on a display surface onto the raster it shows.
///
/// The display may be larger or smaller than the raster (zoomed, or drawn
/// into terminal cells); each axis is scaled independently so a pointer at
/// the display's far edge lands on the raster's far edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayMapping {
    pub display_width: f32,
    pub display_height: f32,
    pub raster_width: u32,
    pub raster_height: u32,
}

impl DisplayMapping {
    pub fn new(display_width: f32, display_height: f32, raster_width: u32, raster_height: u32) -> Self {
        Self {
            display_width,
            display_height,
            raster_width,
            raster_height,
        }
    }

    /// Converts a display position into raster coordinates.
    ///
    /// Returns `None` when the display has no area.
    pub fn to_raster(&self, display: Point) -> Option<Point> {
        if !(self.display_width > 0.0 && self.display_height > 0.0) {
            return None;
        }
        let sx = self.raster_width as f32 / self.display_width;
        let sy = self.raster_height as f32 / self.display_height;
        Some(Point::new(display.x * sx, display.y * sy))
    }

    /// Like [`to_raster`](Self::to_raster) but only for positions on the surface.
    pub fn to_raster_within(&self, display: Point) -> Option<Point> {
        let inside = display.x >= 0.0
            && display.y >= 0.0
            && display.x < self.display_width
            && display.y < self.display_height;
        if inside {
            self.to_raster(display)
        } else {
            None
        }
    }
}

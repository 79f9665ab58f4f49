//! Screen geometry: points, rectangles, colors and visual-angle conversion

use serde::{Deserialize, Serialize};

/// A point in surface pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Clamp the point into `bounds` (inclusive edges)
    pub fn clamp_to(self, bounds: &Rect) -> Self {
        Self {
            x: self.x.clamp(bounds.left, bounds.right),
            y: self.y.clamp(bounds.top, bounds.bottom),
        }
    }
}

/// Axis-aligned rectangle, `[left, top, right, bottom]` in pixels
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl Rect {
    pub const fn new(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self { left, top, right, bottom }
    }

    /// Rectangle of `width` x `height` anchored at the origin
    pub fn sized(width: f64, height: f64) -> Self {
        Self::new(0.0, 0.0, width, height)
    }

    /// Square of half-width `radius` around `center`
    pub fn around(center: Point, radius: f64) -> Self {
        Self::new(
            center.x - radius,
            center.y - radius,
            center.x + radius,
            center.y + radius,
        )
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }

    /// Clip every coordinate into `[0, width]` / `[0, height]`
    pub fn clamp_within(self, width: f64, height: f64) -> Self {
        Self {
            left: self.left.clamp(0.0, width),
            top: self.top.clamp(0.0, height),
            right: self.right.clamp(0.0, width),
            bottom: self.bottom.clamp(0.0, height),
        }
    }
}

/// RGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl From<[u8; 3]> for Color {
    fn from([r, g, b]: [u8; 3]) -> Self {
        Self { r, g, b }
    }
}

/// Pixel size of the primary display plus the physical viewing setup
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayGeometry {
    pub width_px: u32,
    pub height_px: u32,
    /// Physical width of the visible screen area
    pub width_cm: f64,
    /// Eye-to-screen distance
    pub view_distance_cm: f64,
}

impl DisplayGeometry {
    pub fn new(width_px: u32, height_px: u32, width_cm: f64, view_distance_cm: f64) -> Self {
        Self {
            width_px,
            height_px,
            width_cm,
            view_distance_cm,
        }
    }

    pub fn center(&self) -> Point {
        Point::new(self.width_px as f64 / 2.0, self.height_px as f64 / 2.0)
    }

    pub fn bounds(&self) -> Rect {
        Rect::sized(self.width_px as f64, self.height_px as f64)
    }

    pub fn pixels_per_cm(&self) -> f64 {
        self.width_px as f64 / self.width_cm
    }

    /// Convert a visual angle in degrees into pixels.
    ///
    /// `2 * distance * tan(deg / 2)` gives the extent on screen in cm, scaled by
    /// the horizontal pixel density. Odd in `degrees`, so negative angles map to
    /// negative offsets.
    pub fn angle_to_pixels(&self, degrees: f64) -> f64 {
        2.0 * self.view_distance_cm * (degrees.to_radians() / 2.0).tan() * self.pixels_per_cm()
    }

    /// Map a position given in degrees from the screen center to pixels
    pub fn degrees_to_point(&self, x_deg: f64, y_deg: f64) -> Point {
        let c = self.center();
        Point::new(c.x + self.angle_to_pixels(x_deg), c.y + self.angle_to_pixels(y_deg))
    }

    /// Clip a pixel rectangle to the display bounds
    pub fn clamp_rect(&self, rect: Rect) -> Rect {
        rect.clamp_within(self.width_px as f64, self.height_px as f64)
    }
}

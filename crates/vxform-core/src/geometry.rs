//! Geometric primitives for frame placement and rotation.

use glam::DVec2;
use serde::{Deserialize, Serialize};

/// 2D vector in double precision.
pub type Vec2 = DVec2;

/// Integer frame size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    #[inline]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    #[inline]
    pub fn as_vec2(self) -> Vec2 {
        Vec2::new(self.width as f64, self.height as f64)
    }

    /// Length of the diagonal.
    #[inline]
    pub fn diagonal(self) -> f64 {
        (self.width as f64).hypot(self.height as f64)
    }
}

/// Axis-aligned integer rectangle in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    #[inline]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle covering a whole frame.
    pub const fn full(size: Size) -> Self {
        Self::new(0, 0, size.width, size.height)
    }

    #[inline]
    pub fn right(self) -> u64 {
        self.x as u64 + self.width as u64
    }

    #[inline]
    pub fn bottom(self) -> u64 {
        self.y as u64 + self.height as u64
    }

    #[inline]
    pub fn size(self) -> Size {
        Size::new(self.width, self.height)
    }

    #[inline]
    pub fn area(self) -> u64 {
        self.width as u64 * self.height as u64
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Whether the rectangle lies fully inside a frame of `size`.
    pub fn is_within(self, size: Size) -> bool {
        self.right() <= size.width as u64 && self.bottom() <= size.height as u64
    }

    pub fn center(self) -> Vec2 {
        Vec2::new(
            self.x as f64 + self.width as f64 * 0.5,
            self.y as f64 + self.height as f64 * 0.5,
        )
    }
}

/// Rotate `v` by `degrees` clockwise in image coordinates (y down).
#[inline]
pub fn rotate(v: Vec2, degrees: f64) -> Vec2 {
    Vec2::from_angle(degrees.to_radians()).rotate(v)
}

/// Normalise an angle in degrees into [0, 360).
pub fn normalize_degrees(degrees: f64) -> f64 {
    if !degrees.is_finite() {
        return 0.0;
    }
    let r = degrees.rem_euclid(360.0);
    if r >= 360.0 {
        0.0
    } else {
        r
    }
}

/// Bounding box size of a `size` rectangle rotated by `degrees`.
pub fn rotated_bounds(size: Size, degrees: f64) -> Vec2 {
    let (sin, cos) = degrees.to_radians().sin_cos();
    let (w, h) = (size.width as f64, size.height as f64);
    Vec2::new(
        w * cos.abs() + h * sin.abs(),
        w * sin.abs() + h * cos.abs(),
    )
}

//! Pixel and fractional rectangles
//!
//! All region geometry is configured as fractions of the client area and
//! resolved to pixel `CropBox`es whenever the client size changes.

use serde::{Deserialize, Serialize};

/// Axis-aligned pixel rectangle, right/bottom exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CropBox {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl CropBox {
    /// Create a box; inverted edges are collapsed so that right >= left and
    /// bottom >= top always hold.
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right: right.max(left),
            bottom: bottom.max(top),
        }
    }

    pub fn from_size(left: i32, top: i32, width: i32, height: i32) -> Self {
        Self::new(left, top, left + width, top + height)
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.left + self.right) as f64 / 2.0,
            (self.top + self.bottom) as f64 / 2.0,
        )
    }

    pub fn center_x(&self) -> f64 {
        self.center().0
    }

    pub fn translate(&self, dx: i32, dy: i32) -> Self {
        Self::new(self.left + dx, self.top + dy, self.right + dx, self.bottom + dy)
    }

    /// Whether `self` lies completely inside a `width` x `height` frame.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.left >= 0
            && self.top >= 0
            && self.right as i64 <= width as i64
            && self.bottom as i64 <= height as i64
    }

    /// Clip to a `width` x `height` frame.
    pub fn clamp_to(&self, width: u32, height: u32) -> CropBox {
        let w = width as i32;
        let h = height as i32;
        CropBox::new(
            self.left.clamp(0, w),
            self.top.clamp(0, h),
            self.right.clamp(0, w),
            self.bottom.clamp(0, h),
        )
    }
}

/// Rectangle expressed as fractions of the client width/height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FracBox {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl FracBox {
    pub const fn new(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self { left, top, right, bottom }
    }

    pub fn resolve(&self, width: u32, height: u32) -> CropBox {
        let w = width as f64;
        let h = height as f64;
        CropBox::new(
            (self.left * w).round() as i32,
            (self.top * h).round() as i32,
            (self.right * w).round() as i32,
            (self.bottom * h).round() as i32,
        )
    }
}

/// Placement of a symbol relative to the digit glyph that annotates it.
///
/// `dx` is measured from the glyph's horizontal center to the symbol's left
/// edge, `dy` from the glyph's top to the symbol's top. All four values are
/// fractions of the client size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FracOffset {
    pub dx: f64,
    pub dy: f64,
    pub width: f64,
    pub height: f64,
}

impl FracOffset {
    pub fn apply(&self, glyph: &CropBox, width: u32, height: u32) -> CropBox {
        let w = width as f64;
        let h = height as f64;
        let left = glyph.center_x().floor() as i32 + (self.dx * w).round() as i32;
        let top = glyph.top + (self.dy * h).round() as i32;
        CropBox::from_size(
            left,
            top,
            (self.width * w).round() as i32,
            (self.height * h).round() as i32,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crop_box_invariants() {
        let b = CropBox::new(10, 20, 5, 15);
        assert!(b.right >= b.left && b.bottom >= b.top);
        assert!(b.is_empty());

        let b = CropBox::from_size(10, 20, 30, 40);
        assert_eq!((b.width(), b.height()), (30, 40));
        assert_eq!(b.center(), (25.0, 40.0));
    }

    #[test]
    fn test_frac_box_rescales_with_client() {
        let frac = FracBox::new(0.25, 0.5, 0.75, 1.0);
        assert_eq!(frac.resolve(1920, 1080), CropBox::new(480, 540, 1440, 1080));
        assert_eq!(frac.resolve(2560, 1440), CropBox::new(640, 720, 1920, 1440));
    }

    #[test]
    fn test_offset_from_glyph() {
        let glyph = CropBox::new(114, 245, 126, 265);
        let offset = FracOffset { dx: -0.075, dy: -0.5, width: 0.15, height: 0.4 };
        assert_eq!(offset.apply(&glyph, 400, 300), CropBox::new(90, 95, 150, 215));
    }

    #[test]
    fn test_fits_within() {
        assert!(CropBox::new(0, 0, 100, 50).fits_within(100, 50));
        assert!(!CropBox::new(-1, 0, 10, 10).fits_within(100, 50));
        assert!(!CropBox::new(90, 0, 101, 10).fits_within(100, 50));
    }
}

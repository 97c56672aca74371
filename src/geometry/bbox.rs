//! Axis-aligned and rotatable bounding boxes in top-left + size form.

use super::coord::Coord;
use super::{Normalized, Pixel};

/// An axis-aligned box given by its top-left corner and its size.
///
/// Like every other geometry value, the constructor does not reject
/// negative sizes or out-of-range corners; the validation report flags them.
#[derive(Clone, Copy, PartialEq)]
pub struct BoundingBox<TSpace> {
    pub top_left: Coord<TSpace>,
    pub width: f64,
    pub height: f64,
}

impl<TSpace> BoundingBox<TSpace> {
    #[inline]
    pub fn new(top_left: Coord<TSpace>, width: f64, height: f64) -> Self {
        Self {
            top_left,
            width,
            height,
        }
    }

    /// Creates a box from `x, y, w, h`, the order used in label documents.
    #[inline]
    pub fn from_xywh(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self::new(Coord::new(x, y), width, height)
    }

    #[inline]
    pub fn x(&self) -> f64 {
        self.top_left.x
    }

    #[inline]
    pub fn y(&self) -> f64 {
        self.top_left.y
    }

    /// Returns the bottom-right corner.
    #[inline]
    pub fn bottom_right(&self) -> Coord<TSpace> {
        Coord::new(self.top_left.x + self.width, self.top_left.y + self.height)
    }

    #[inline]
    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.top_left.is_finite() && self.width.is_finite() && self.height.is_finite()
    }
}

impl BoundingBox<Normalized> {
    /// Returns true if both corners lie inside the unit square.
    pub fn is_in_unit_square(&self) -> bool {
        self.top_left.is_in_unit_square() && self.bottom_right().is_in_unit_square()
    }

    /// Converts to absolute pixel coordinates for the given media size.
    pub fn to_pixel(&self, media_width: f64, media_height: f64) -> BoundingBox<Pixel> {
        BoundingBox::new(
            self.top_left.to_pixel(media_width, media_height),
            self.width * media_width,
            self.height * media_height,
        )
    }
}

impl BoundingBox<Pixel> {
    /// Converts to fractions of the given media size.
    pub fn to_normalized(&self, media_width: f64, media_height: f64) -> BoundingBox<Normalized> {
        BoundingBox::new(
            self.top_left.to_normalized(media_width, media_height),
            self.width / media_width,
            self.height / media_height,
        )
    }
}

impl<TSpace> std::fmt::Debug for BoundingBox<TSpace> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundingBox")
            .field("x", &self.top_left.x)
            .field("y", &self.top_left.y)
            .field("w", &self.width)
            .field("h", &self.height)
            .finish()
    }
}

/// A bounding box rotated clockwise by `theta` degrees around its centre.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RotatableBoundingBox {
    pub bbox: BoundingBox<Normalized>,
    pub theta: f64,
}

impl RotatableBoundingBox {
    pub fn new(bbox: BoundingBox<Normalized>, theta: f64) -> Self {
        Self { bbox, theta }
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.bbox.is_finite() && self.theta.is_finite()
    }
}

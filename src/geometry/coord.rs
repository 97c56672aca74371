//! Typed 2D coordinates.
//!
//! The type parameter records whether a coordinate is a fraction of the media
//! extent or an absolute pixel position, so the two never mix silently.

use serde::{Deserialize, Serialize};
use std::marker::PhantomData;

/// Absolute pixel position, origin at the top-left corner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Pixel;

/// Fraction (0.0 to 1.0) of the media width and height. Every 2D shape on a
/// label row is stored this way.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Normalized;

/// A 2D coordinate tagged with the space it lives in.
#[derive(Clone, Copy, PartialEq)]
pub struct Coord<TSpace> {
    pub x: f64,
    pub y: f64,
    _space: PhantomData<TSpace>,
}

impl<TSpace> Coord<TSpace> {
    #[inline]
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            _space: PhantomData,
        }
    }

    /// Returns true if both components are finite (not NaN or infinite).
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Coord<Normalized> {
    /// Returns true if the point lies inside the unit square.
    #[inline]
    pub fn is_in_unit_square(&self) -> bool {
        (0.0..=1.0).contains(&self.x) && (0.0..=1.0).contains(&self.y)
    }

    /// Scales the coordinate by the media dimensions.
    pub fn to_pixel(&self, width: f64, height: f64) -> Coord<Pixel> {
        Coord::new(self.x * width, self.y * height)
    }
}

impl Coord<Pixel> {
    /// Divides the coordinate by the media dimensions.
    pub fn to_normalized(&self, width: f64, height: f64) -> Coord<Normalized> {
        Coord::new(self.x / width, self.y / height)
    }
}

impl<TSpace> std::fmt::Debug for Coord<TSpace> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coord")
            .field("x", &self.x)
            .field("y", &self.y)
            .finish()
    }
}

impl<TSpace> Default for Coord<TSpace> {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

// Manual serde impls so TSpace needs no Serialize/Deserialize bounds.
impl<TSpace> Serialize for Coord<TSpace> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("Coord", 2)?;
        state.serialize_field("x", &self.x)?;
        state.serialize_field("y", &self.y)?;
        state.end()
    }
}

impl<'de, TSpace> Deserialize<'de> for Coord<TSpace> {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct CoordData {
            x: f64,
            y: f64,
        }
        let data = CoordData::deserialize(deserializer)?;
        Ok(Coord::new(data.x, data.y))
    }
}

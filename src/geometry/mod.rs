//! Geometry values attached to object annotations, and their document form.
//!
//! Every 2D shape except [`Bitmask`] stores coordinates as fractions of the
//! media width and height ([`Normalized`]). A bitmask carries its own pixel
//! extent which must match the media it is placed on; that check runs when
//! the label row is serialized, not on placement.
//!
//! Each value converts to and from the shape-specific keys of an object entry
//! in a label document (`boundingBox`, `polygons`, `bitmask`, ...).

mod bbox;
mod coord;

pub use bbox::{BoundingBox, RotatableBoundingBox};
pub use coord::{Coord, Normalized, Pixel};

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::{LabelError, Result};
use crate::frames::Range;
use crate::ids::FeatureHash;
use crate::rle::{self, Mask};

/// The shape tag of an ontology object class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    BoundingBox,
    RotatableBoundingBox,
    Polygon,
    Polyline,
    Point,
    Skeleton,
    Bitmask,
    Cuboid,
    Audio,
    Text,
}

impl Shape {
    pub fn as_str(&self) -> &'static str {
        match self {
            Shape::BoundingBox => "bounding_box",
            Shape::RotatableBoundingBox => "rotatable_bounding_box",
            Shape::Polygon => "polygon",
            Shape::Polyline => "polyline",
            Shape::Point => "point",
            Shape::Skeleton => "skeleton",
            Shape::Bitmask => "bitmask",
            Shape::Cuboid => "cuboid",
            Shape::Audio => "audio",
            Shape::Text => "text",
        }
    }

    /// Shapes addressed by half-open ranges instead of frames.
    pub fn is_range_based(&self) -> bool {
        matches!(self, Shape::Audio | Shape::Text)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Shape {
    type Err = LabelError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "bounding_box" => Ok(Shape::BoundingBox),
            "rotatable_bounding_box" => Ok(Shape::RotatableBoundingBox),
            "polygon" => Ok(Shape::Polygon),
            "polyline" => Ok(Shape::Polyline),
            "point" => Ok(Shape::Point),
            "skeleton" => Ok(Shape::Skeleton),
            "bitmask" => Ok(Shape::Bitmask),
            "cuboid" => Ok(Shape::Cuboid),
            "audio" => Ok(Shape::Audio),
            "text" => Ok(Shape::Text),
            other => Err(LabelError::malformed(format!("unknown shape '{other}'"))),
        }
    }
}

/// A closed ring of points; the closing edge back to the first point is implicit.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Ring {
    pub points: Vec<Coord<Normalized>>,
}

impl Ring {
    pub fn new(points: Vec<Coord<Normalized>>) -> Self {
        Self { points }
    }

    fn to_flat(&self) -> Vec<f64> {
        self.points.iter().flat_map(|p| [p.x, p.y]).collect()
    }

    fn from_flat(values: &[f64]) -> Result<Self> {
        if values.len() % 2 != 0 {
            return Err(LabelError::malformed(format!(
                "polygon ring has an odd number of coordinates ({})",
                values.len()
            )));
        }
        Ok(Self::new(
            values.chunks_exact(2).map(|xy| Coord::new(xy[0], xy[1])).collect(),
        ))
    }
}

/// One outer boundary plus the holes cut out of it.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct PolygonShell {
    pub outer: Ring,
    pub holes: Vec<Ring>,
}

/// A polygon made of one or more shells. Islands inside a hole are further
/// shells in the list.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Polygon {
    pub shells: Vec<PolygonShell>,
}

impl Polygon {
    /// A polygon with a single outer ring and no holes.
    pub fn simple(points: Vec<Coord<Normalized>>) -> Self {
        Self {
            shells: vec![PolygonShell {
                outer: Ring::new(points),
                holes: Vec::new(),
            }],
        }
    }

    pub fn rings(&self) -> impl Iterator<Item = &Ring> {
        self.shells
            .iter()
            .flat_map(|s| std::iter::once(&s.outer).chain(s.holes.iter()))
    }
}

#[derive(Clone, Debug, PartialEq, Default)]
pub struct Polyline {
    pub points: Vec<Coord<Normalized>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Visible,
    Invisible,
    Occluded,
}

/// A named keypoint of a skeleton template.
#[derive(Clone, Debug, PartialEq)]
pub struct SkeletonPoint {
    pub name: String,
    pub position: Coord<Normalized>,
    pub feature_hash: FeatureHash,
    pub color: Option<String>,
    pub value: Option<String>,
    pub visibility: Option<Visibility>,
}

#[derive(Clone, Debug, PartialEq, Default)]
pub struct Skeleton {
    pub points: Vec<SkeletonPoint>,
}

#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Euler angles in radians.
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Orientation {
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
}

/// A 3D box for point-cloud annotations.
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Cuboid {
    pub position: Vec3,
    pub orientation: Orientation,
    pub size: Vec3,
}

/// A raster mask stored as a compressed RLE string. `width` and `height`
/// are in pixels.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bitmask {
    pub top: u32,
    pub left: u32,
    pub width: u32,
    pub height: u32,
    #[serde(rename = "rleString")]
    pub rle_string: String,
}

impl Bitmask {
    /// Encodes a full-frame mask.
    pub fn from_mask(mask: &Mask) -> Self {
        Self {
            top: 0,
            left: 0,
            width: mask.width() as u32,
            height: mask.height() as u32,
            rle_string: rle::encode(mask),
        }
    }

    pub fn to_mask(&self) -> Result<Mask> {
        rle::decode(&self.rle_string, self.height as usize, self.width as usize)
    }
}

/// Every geometry an object annotation can carry.
#[derive(Clone, Debug, PartialEq)]
pub enum Geometry {
    BoundingBox(BoundingBox<Normalized>),
    RotatableBoundingBox(RotatableBoundingBox),
    Polygon(Polygon),
    Polyline(Polyline),
    Point(Coord<Normalized>),
    Skeleton(Skeleton),
    Cuboid(Cuboid),
    Bitmask(Bitmask),
    Range(Range),
}

impl Geometry {
    /// Returns true if this geometry can be stored on an object of `shape`.
    pub fn fits_shape(&self, shape: Shape) -> bool {
        matches!(
            (self, shape),
            (Geometry::BoundingBox(_), Shape::BoundingBox)
                | (Geometry::RotatableBoundingBox(_), Shape::RotatableBoundingBox)
                | (Geometry::Polygon(_), Shape::Polygon)
                | (Geometry::Polyline(_), Shape::Polyline)
                | (Geometry::Point(_), Shape::Point)
                | (Geometry::Skeleton(_), Shape::Skeleton)
                | (Geometry::Cuboid(_), Shape::Cuboid)
                | (Geometry::Bitmask(_), Shape::Bitmask)
                | (Geometry::Range(_), Shape::Audio | Shape::Text)
        )
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Geometry::BoundingBox(_) => "bounding box",
            Geometry::RotatableBoundingBox(_) => "rotatable bounding box",
            Geometry::Polygon(_) => "polygon",
            Geometry::Polyline(_) => "polyline",
            Geometry::Point(_) => "point",
            Geometry::Skeleton(_) => "skeleton",
            Geometry::Cuboid(_) => "cuboid",
            Geometry::Bitmask(_) => "bitmask",
            Geometry::Range(_) => "range",
        }
    }

    /// All normalized 2D coordinates this geometry carries.
    pub fn normalized_points(&self) -> Vec<Coord<Normalized>> {
        match self {
            Geometry::BoundingBox(b) => vec![b.top_left, b.bottom_right()],
            Geometry::RotatableBoundingBox(r) => vec![r.bbox.top_left, r.bbox.bottom_right()],
            Geometry::Polygon(p) => p.rings().flat_map(|r| r.points.iter().copied()).collect(),
            Geometry::Polyline(p) => p.points.clone(),
            Geometry::Point(c) => vec![*c],
            Geometry::Skeleton(s) => s.points.iter().map(|p| p.position).collect(),
            Geometry::Cuboid(_) | Geometry::Bitmask(_) | Geometry::Range(_) => Vec::new(),
        }
    }

    /// Returns true if every numeric field is finite.
    pub fn is_finite(&self) -> bool {
        match self {
            Geometry::BoundingBox(b) => b.is_finite(),
            Geometry::RotatableBoundingBox(r) => r.is_finite(),
            Geometry::Cuboid(c) => [
                c.position.x,
                c.position.y,
                c.position.z,
                c.orientation.alpha,
                c.orientation.beta,
                c.orientation.gamma,
                c.size.x,
                c.size.y,
                c.size.z,
            ]
            .iter()
            .all(|v| v.is_finite()),
            other => other.normalized_points().iter().all(Coord::is_finite),
        }
    }

    /// Writes the shape-specific keys of an object entry.
    pub fn write_wire(&self, entry: &mut Map<String, Value>) {
        match self {
            Geometry::BoundingBox(b) => {
                entry.insert("boundingBox".into(), bbox_to_wire(b));
            }
            Geometry::RotatableBoundingBox(r) => {
                let mut value = bbox_to_wire(&r.bbox);
                value["theta"] = json!(r.theta);
                entry.insert("rotatableBoundingBox".into(), value);
            }
            Geometry::Polygon(p) => {
                let polygons: Vec<Vec<Vec<f64>>> = p
                    .shells
                    .iter()
                    .map(|shell| {
                        std::iter::once(&shell.outer)
                            .chain(shell.holes.iter())
                            .map(Ring::to_flat)
                            .collect()
                    })
                    .collect();
                entry.insert("polygons".into(), json!(polygons));
                if let Some(shell) = p.shells.first() {
                    entry.insert("polygon".into(), points_to_wire(&shell.outer.points));
                }
            }
            Geometry::Polyline(p) => {
                entry.insert("polyline".into(), points_to_wire(&p.points));
            }
            Geometry::Point(c) => {
                entry.insert("point".into(), points_to_wire(std::slice::from_ref(c)));
            }
            Geometry::Skeleton(s) => {
                let points: Map<String, Value> = s
                    .points
                    .iter()
                    .enumerate()
                    .map(|(i, p)| {
                        let mut point = json!({
                            "x": p.position.x,
                            "y": p.position.y,
                            "name": p.name,
                            "featureHash": p.feature_hash,
                        });
                        if let Some(color) = &p.color {
                            point["color"] = json!(color);
                        }
                        if let Some(value) = &p.value {
                            point["value"] = json!(value);
                        }
                        if let Some(visibility) = p.visibility {
                            point["visibility"] = json!(visibility);
                        }
                        (i.to_string(), point)
                    })
                    .collect();
                entry.insert("skeleton".into(), Value::Object(points));
            }
            Geometry::Cuboid(c) => {
                entry.insert("cuboid".into(), json!(c));
            }
            Geometry::Bitmask(b) => {
                entry.insert("bitmask".into(), json!(b));
            }
            Geometry::Range(r) => {
                entry.insert("range".into(), json!([[r.start, r.end]]));
            }
        }
    }

    /// Reads the geometry for an object of `shape` from its entry.
    pub fn read_wire(shape: Shape, entry: &Map<String, Value>) -> Result<Self> {
        let field = |key: &str| {
            entry.get(key).ok_or_else(|| {
                LabelError::malformed(format!("{shape} object entry is missing '{key}'"))
            })
        };
        match shape {
            Shape::BoundingBox => Ok(Geometry::BoundingBox(bbox_from_wire(field("boundingBox")?)?)),
            Shape::RotatableBoundingBox => {
                let value = field("rotatableBoundingBox")?;
                Ok(Geometry::RotatableBoundingBox(RotatableBoundingBox::new(
                    bbox_from_wire(value)?,
                    number(value, "theta")?,
                )))
            }
            Shape::Polygon => {
                if let Some(polygons) = entry.get("polygons") {
                    polygon_from_wire(polygons)
                } else {
                    Ok(Geometry::Polygon(Polygon::simple(points_from_wire(field("polygon")?)?)))
                }
            }
            Shape::Polyline => Ok(Geometry::Polyline(Polyline {
                points: points_from_wire(field("polyline")?)?,
            })),
            Shape::Point => {
                let points = points_from_wire(field("point")?)?;
                match points.as_slice() {
                    [point] => Ok(Geometry::Point(*point)),
                    _ => Err(LabelError::malformed(format!(
                        "point entry must hold exactly one point, got {}",
                        points.len()
                    ))),
                }
            }
            Shape::Skeleton => skeleton_from_wire(field("skeleton")?),
            Shape::Cuboid => Cuboid::deserialize(field("cuboid")?)
                .map(Geometry::Cuboid)
                .map_err(|e| LabelError::malformed(format!("invalid cuboid: {e}"))),
            Shape::Bitmask => Bitmask::deserialize(field("bitmask")?)
                .map(Geometry::Bitmask)
                .map_err(|e| LabelError::malformed(format!("invalid bitmask: {e}"))),
            Shape::Audio | Shape::Text => {
                let ranges = ranges_from_wire(field("range")?)?;
                match ranges.as_slice() {
                    [range] => Ok(Geometry::Range(*range)),
                    _ => Err(LabelError::malformed(format!(
                        "range entry must hold exactly one range, got {}",
                        ranges.len()
                    ))),
                }
            }
        }
    }
}

macro_rules! impl_geometry_from {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Geometry {
                fn from(value: $ty) -> Self {
                    Geometry::$variant(value)
                }
            }
        )*
    };
}

impl_geometry_from!(
    BoundingBox => BoundingBox<Normalized>,
    RotatableBoundingBox => RotatableBoundingBox,
    Polygon => Polygon,
    Polyline => Polyline,
    Point => Coord<Normalized>,
    Skeleton => Skeleton,
    Cuboid => Cuboid,
    Bitmask => Bitmask,
    Range => Range,
);

fn number(value: &Value, key: &str) -> Result<f64> {
    value
        .get(key)
        .and_then(Value::as_f64)
        .ok_or_else(|| LabelError::malformed(format!("expected a number under '{key}'")))
}

fn bbox_to_wire(b: &BoundingBox<Normalized>) -> Value {
    json!({ "h": b.height, "w": b.width, "x": b.x(), "y": b.y() })
}

fn bbox_from_wire(value: &Value) -> Result<BoundingBox<Normalized>> {
    Ok(BoundingBox::from_xywh(
        number(value, "x")?,
        number(value, "y")?,
        number(value, "w")?,
        number(value, "h")?,
    ))
}

fn points_to_wire(points: &[Coord<Normalized>]) -> Value {
    Value::Object(
        points
            .iter()
            .enumerate()
            .map(|(i, p)| (i.to_string(), json!({ "x": p.x, "y": p.y })))
            .collect(),
    )
}

/// Accepts both `{"0": {x, y}, "1": ...}` and `[{x, y}, ...]`.
fn indexed_entries(value: &Value) -> Result<Vec<&Value>> {
    match value {
        Value::Array(items) => Ok(items.iter().collect()),
        Value::Object(map) => {
            let mut keyed = map
                .iter()
                .map(|(k, v)| {
                    k.parse::<usize>()
                        .map(|i| (i, v))
                        .map_err(|_| LabelError::malformed(format!("invalid point index '{k}'")))
                })
                .collect::<Result<Vec<_>>>()?;
            keyed.sort_by_key(|(i, _)| *i);
            Ok(keyed.into_iter().map(|(_, v)| v).collect())
        }
        _ => Err(LabelError::malformed("expected a point map or list")),
    }
}

fn points_from_wire(value: &Value) -> Result<Vec<Coord<Normalized>>> {
    indexed_entries(value)?
        .into_iter()
        .map(|p| Ok(Coord::new(number(p, "x")?, number(p, "y")?)))
        .collect()
}

fn polygon_from_wire(value: &Value) -> Result<Geometry> {
    let shells: Vec<Vec<Vec<f64>>> = serde_json::from_value(value.clone())
        .map_err(|e| LabelError::malformed(format!("invalid polygons: {e}")))?;
    let shells = shells
        .iter()
        .map(|rings| {
            let mut rings = rings.iter().map(|r| Ring::from_flat(r));
            let outer = rings
                .next()
                .ok_or_else(|| LabelError::malformed("polygon shell has no rings"))??;
            Ok(PolygonShell {
                outer,
                holes: rings.collect::<Result<Vec<_>>>()?,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Geometry::Polygon(Polygon { shells }))
}

fn skeleton_from_wire(value: &Value) -> Result<Geometry> {
    let points = indexed_entries(value)?
        .into_iter()
        .map(|p| {
            let text = |key: &str| p.get(key).and_then(Value::as_str).map(str::to_string);
            Ok(SkeletonPoint {
                name: text("name").unwrap_or_default(),
                position: Coord::new(number(p, "x")?, number(p, "y")?),
                feature_hash: FeatureHash::new(text("featureHash").ok_or_else(|| {
                    LabelError::malformed("skeleton point is missing 'featureHash'")
                })?),
                color: text("color"),
                value: text("value"),
                visibility: p
                    .get("visibility")
                    .map(|v| Visibility::deserialize(v))
                    .transpose()
                    .map_err(|e| LabelError::malformed(format!("invalid visibility: {e}")))?,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Geometry::Skeleton(Skeleton { points }))
}

pub(crate) fn ranges_from_wire(value: &Value) -> Result<Vec<Range>> {
    let pairs: Vec<[u32; 2]> = serde_json::from_value(value.clone())
        .map_err(|e| LabelError::malformed(format!("invalid range list: {e}")))?;
    pairs
        .into_iter()
        .map(|[start, end]| Range::checked(start, end))
        .collect()
}

pub(crate) fn ranges_to_wire(ranges: &[Range]) -> Value {
    json!(ranges.iter().map(|r| [r.start, r.end]).collect::<Vec<_>>())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(shape: Shape, geometry: Geometry) -> Geometry {
        let mut entry = Map::new();
        geometry.write_wire(&mut entry);
        Geometry::read_wire(shape, &entry).unwrap()
    }

    #[test]
    fn test_bounding_box_wire_keys() {
        let mut entry = Map::new();
        Geometry::from(BoundingBox::from_xywh(0.1, 0.2, 0.3, 0.4)).write_wire(&mut entry);
        assert_eq!(entry["boundingBox"], json!({"h": 0.4, "w": 0.3, "x": 0.1, "y": 0.2}));
    }

    #[test]
    fn test_polygon_with_hole_roundtrip() {
        let square = |o: f64, s: f64| {
            Ring::new(vec![
                Coord::new(o, o),
                Coord::new(o + s, o),
                Coord::new(o + s, o + s),
                Coord::new(o, o + s),
            ])
        };
        let polygon = Geometry::Polygon(Polygon {
            shells: vec![
                PolygonShell {
                    outer: square(0.0, 0.8),
                    holes: vec![square(0.2, 0.4)],
                },
                PolygonShell {
                    outer: square(0.3, 0.1),
                    holes: vec![],
                },
            ],
        });
        assert_eq!(roundtrip(Shape::Polygon, polygon.clone()), polygon);
    }

    #[test]
    fn test_legacy_polygon_map_accepted() {
        let entry = json!({
            "polygon": {
                "2": {"x": 0.0, "y": 1.0},
                "0": {"x": 0.0, "y": 0.0},
                "1": {"x": 1.0, "y": 0.0}
            }
        });
        let geometry = Geometry::read_wire(Shape::Polygon, entry.as_object().unwrap()).unwrap();
        let Geometry::Polygon(polygon) = geometry else {
            panic!("expected polygon");
        };
        assert_eq!(polygon.shells.len(), 1);
        assert_eq!(polygon.shells[0].outer.points[2], Coord::new(0.0, 1.0));
    }

    #[test]
    fn test_point_map_orders_numerically() {
        let value = json!({
            "10": {"x": 10.0, "y": 0.0},
            "2": {"x": 2.0, "y": 0.0}
        });
        let points = points_from_wire(&value).unwrap();
        assert_eq!(points[0].x, 2.0);
        assert_eq!(points[1].x, 10.0);
    }

    #[test]
    fn test_skeleton_roundtrip() {
        let skeleton = Geometry::Skeleton(Skeleton {
            points: vec![SkeletonPoint {
                name: "nose".into(),
                position: Coord::new(0.5, 0.5),
                feature_hash: FeatureHash::new("kp-nose"),
                color: Some("#FF0000".into()),
                value: None,
                visibility: Some(Visibility::Occluded),
            }],
        });
        assert_eq!(roundtrip(Shape::Skeleton, skeleton.clone()), skeleton);
    }

    #[test]
    fn test_bitmask_and_cuboid_roundtrip() {
        let mask = Mask::from_rows(&[[false, true], [true, true]]).unwrap();
        let bitmask = Geometry::Bitmask(Bitmask::from_mask(&mask));
        assert_eq!(roundtrip(Shape::Bitmask, bitmask.clone()), bitmask);

        let cuboid = Geometry::Cuboid(Cuboid {
            position: Vec3 { x: 1.0, y: 2.0, z: 3.0 },
            orientation: Orientation { alpha: 0.1, beta: 0.0, gamma: 0.0 },
            size: Vec3 { x: 1.0, y: 1.0, z: 2.0 },
        });
        assert_eq!(roundtrip(Shape::Cuboid, cuboid.clone()), cuboid);
    }

    #[test]
    fn test_missing_geometry_key_is_malformed() {
        let entry = Map::new();
        let err = Geometry::read_wire(Shape::BoundingBox, &entry).unwrap_err();
        assert!(err.to_string().contains("boundingBox"));
    }

    #[test]
    fn test_fits_shape() {
        assert!(Geometry::Range(Range::new(0, 5)).fits_shape(Shape::Audio));
        assert!(!Geometry::Point(Coord::new(0.0, 0.0)).fits_shape(Shape::Polygon));
    }

    #[test]
    fn test_shape_parse() {
        assert_eq!("rotatable_bounding_box".parse::<Shape>().unwrap(), Shape::RotatableBoundingBox);
        assert!("hexagon".parse::<Shape>().is_err());
    }
}

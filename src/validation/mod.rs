//! Label row validation.
//!
//! Checks what serialization either rejects late or accepts silently:
//! - Geometric validity (finite values, normalized bounds, ring sizes)
//! - Bitmasks matching their media and decoding cleanly
//! - Metadata ranges (confidence)
//! - Required attributes without an answer, and entities nothing uses

mod report;

pub use report::{IssueCode, IssueContext, Severity, ValidationIssue, ValidationReport};

use crate::annotation::AnnotationMetadata;
use crate::entity::{Binding, Entity};
use crate::frames::FrameKey;
use crate::geometry::Geometry;
use crate::ids::{EntityHash, SpaceId};
use crate::label_row::LabelRow;
use crate::ontology::Attribute;
use crate::space::SpaceKind;

/// Options for validation behavior.
#[derive(Clone, Debug, Default)]
pub struct ValidateOptions {
    /// If true, treat warnings as errors.
    pub strict: bool,
}

/// Validates every annotation and entity of a label row.
pub fn validate_label_row(row: &LabelRow, _opts: &ValidateOptions) -> ValidationReport {
    let mut report = ValidationReport::new();

    for space in row.spaces() {
        for annotation in space.get_object_instance_annotations(None) {
            let at = Placement {
                space_id: space.id(),
                kind: space.kind(),
                entity: annotation.entity(),
                key: annotation.key(),
            };
            validate_geometry(&at, annotation.geometry(), &mut report);
            validate_metadata(&at, &annotation.metadata, &mut report);
        }
        for annotation in space.get_classification_instance_annotations(None) {
            let at = Placement {
                space_id: space.id(),
                kind: space.kind(),
                entity: annotation.entity(),
                key: annotation.key(),
            };
            validate_metadata(&at, &annotation.metadata, &mut report);
        }
    }

    validate_attached(row, &mut report);
    validate_entities(row, &mut report);

    report
}

struct Placement<'a> {
    space_id: &'a SpaceId,
    kind: &'a SpaceKind,
    entity: &'a EntityHash,
    key: FrameKey,
}

impl Placement<'_> {
    fn context(&self) -> IssueContext {
        IssueContext::Annotation {
            space_id: self.space_id.clone(),
            entity: self.entity.clone(),
            key: self.key,
        }
    }
}

/// Frame data of entities attached directly to the label row.
fn validate_attached(row: &LabelRow, report: &mut ValidationReport) {
    let root_id = SpaceId::root();
    let root_kind = row.metadata().root_kind();
    for hash in row.attached_objects() {
        let Ok(object) = row.object(hash) else {
            continue;
        };
        for (key, data) in object.frames() {
            let at = Placement {
                space_id: &root_id,
                kind: &root_kind,
                entity: hash,
                key: *key,
            };
            validate_geometry(&at, &data.geometry, report);
            validate_metadata(&at, &data.metadata, report);
        }
    }
    for hash in row.attached_classifications() {
        let Ok(classification) = row.classification(hash) else {
            continue;
        };
        for (key, metadata) in classification.frames() {
            let at = Placement {
                space_id: &root_id,
                kind: &root_kind,
                entity: hash,
                key: *key,
            };
            validate_metadata(&at, metadata, report);
        }
    }
}

fn validate_geometry(at: &Placement<'_>, geometry: &Geometry, report: &mut ValidationReport) {
    if !geometry.is_finite() {
        report.add(ValidationIssue::error(
            IssueCode::GeometryNotFinite,
            format!("{} has non-finite coordinates", geometry.kind_name()),
            at.context(),
        ));
        return;
    }

    if let Some(point) = geometry
        .normalized_points()
        .into_iter()
        .find(|p| !p.is_in_unit_square())
    {
        report.add(ValidationIssue::warning(
            IssueCode::CoordinateOutOfBounds,
            format!(
                "{} point ({}, {}) lies outside the normalized range [0, 1]",
                geometry.kind_name(),
                point.x,
                point.y
            ),
            at.context(),
        ));
    }

    match geometry {
        Geometry::Polygon(polygon) => {
            for (index, ring) in polygon.rings().enumerate() {
                if ring.points.len() < 3 {
                    report.add(ValidationIssue::error(
                        IssueCode::PolygonTooFewPoints,
                        format!("ring {} has {} point(s)", index, ring.points.len()),
                        at.context(),
                    ));
                }
            }
        }
        Geometry::Polyline(polyline) if polyline.points.len() < 2 => {
            report.add(ValidationIssue::error(
                IssueCode::PolylineTooFewPoints,
                format!("polyline has {} point(s)", polyline.points.len()),
                at.context(),
            ));
        }
        Geometry::Bitmask(mask) => match at.kind.media_size() {
            Some(size) if size.width == mask.width && size.height == mask.height => {
                if let Err(e) = mask.to_mask() {
                    report.add(ValidationIssue::error(
                        IssueCode::InvalidRle,
                        e.to_string(),
                        at.context(),
                    ));
                }
            }
            // a mask of the wrong size is not decoded
            Some(size) => report.add(ValidationIssue::error(
                IssueCode::BitmaskDimensionMismatch,
                format!(
                    "bitmask is {}x{} but the media is {}",
                    mask.width, mask.height, size
                ),
                at.context(),
            )),
            None => report.add(ValidationIssue::error(
                IssueCode::BitmaskDimensionMismatch,
                format!(
                    "bitmask is {}x{} but the media size is unknown",
                    mask.width, mask.height
                ),
                at.context(),
            )),
        },
        _ => {}
    }
}

fn validate_metadata(at: &Placement<'_>, metadata: &AnnotationMetadata, report: &mut ValidationReport) {
    if !(0.0..=1.0).contains(&metadata.confidence) {
        report.add(ValidationIssue::warning(
            IssueCode::ConfidenceOutOfRange,
            format!("confidence {} is outside [0, 1]", metadata.confidence),
            at.context(),
        ));
    }
}

/// Unused entities and unanswered required attributes.
fn validate_entities(row: &LabelRow, report: &mut ValidationReport) {
    for entity in row.registry().iter() {
        let (binding, missing) = match entity {
            Entity::Object(object) => {
                let Ok(class) = object.class() else {
                    continue;
                };
                (
                    object.binding(),
                    unanswered(&class.attributes, |a| object.answer(&a.feature_hash).is_some()),
                )
            }
            Entity::Classification(classification) => {
                let Ok(class) = classification.class() else {
                    continue;
                };
                (
                    classification.binding(),
                    unanswered(&class.attributes, |a| {
                        classification.answer(&a.feature_hash).is_some()
                    }),
                )
            }
        };
        let context = IssueContext::Entity {
            hash: entity.hash().clone(),
        };

        if *binding == Binding::Detached {
            report.add(ValidationIssue::warning(
                IssueCode::DetachedEntity,
                "entity is neither placed on a space nor attached to the label row",
                context,
            ));
            continue;
        }

        for name in missing {
            report.add(ValidationIssue::warning(
                IssueCode::MissingRequiredAnswer,
                format!("required attribute '{}' has no answer", name),
                context.clone(),
            ));
        }
    }
}

/// Names of required static attributes for which `answered` is false.
fn unanswered(attributes: &[Attribute], answered: impl Fn(&Attribute) -> bool) -> Vec<String> {
    attributes
        .iter()
        .filter(|a| a.required && !a.dynamic && !answered(a))
        .map(|a| a.name.clone())
        .collect()
}

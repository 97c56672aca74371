//! Annotation records: one placement of an entity at one frame or range of a space.
//!
//! The identity of an annotation is the `(entity, space, key)` triple and never
//! changes. Geometry and [`AnnotationMetadata`] are edited in place and are
//! picked up by the next serialization.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{json, Map, Value};

use crate::error::{LabelError, Result};
use crate::frames::FrameKey;
use crate::geometry::Geometry;
use crate::ids::{EntityHash, FeatureHash, SpaceId};

const WIRE_TIME_FORMAT: &str = "%a, %d %b %Y %H:%M:%S UTC";

/// What to do when a placement hits an occupied slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OverlapStrategy {
    /// Reject the whole call and leave the space unchanged.
    #[default]
    Error,
    /// Drop the existing annotation and store the new one.
    Replace,
}

/// Audit data carried by every annotation.
#[derive(Clone, Debug, PartialEq)]
pub struct AnnotationMetadata {
    pub created_at: DateTime<Utc>,
    pub created_by: Option<String>,
    pub last_edited_at: DateTime<Utc>,
    pub last_edited_by: Option<String>,
    pub confidence: f64,
    pub manual_annotation: bool,
    pub is_deleted: Option<bool>,
}

impl Default for AnnotationMetadata {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            created_by: None,
            last_edited_at: now,
            last_edited_by: None,
            confidence: 1.0,
            manual_annotation: true,
            is_deleted: None,
        }
    }
}

/// Optional overrides applied on top of existing or default metadata.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MetadataUpdate {
    pub created_at: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
    pub last_edited_at: Option<DateTime<Utc>>,
    pub last_edited_by: Option<String>,
    pub confidence: Option<f64>,
    pub manual_annotation: Option<bool>,
}

impl MetadataUpdate {
    pub fn created_by(mut self, who: impl Into<String>) -> Self {
        self.created_by = Some(who.into());
        self
    }

    pub fn last_edited_by(mut self, who: impl Into<String>) -> Self {
        self.last_edited_by = Some(who.into());
        self
    }

    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn manual_annotation(mut self, manual: bool) -> Self {
        self.manual_annotation = Some(manual);
        self
    }

    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }

    pub fn last_edited_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_edited_at = Some(at);
        self
    }
}

impl AnnotationMetadata {
    /// Fresh metadata with the update applied.
    pub fn from_update(update: &MetadataUpdate) -> Self {
        let mut metadata = Self::default();
        metadata.apply(update);
        metadata
    }

    pub fn apply(&mut self, update: &MetadataUpdate) {
        if let Some(at) = update.created_at {
            self.created_at = at;
        }
        if let Some(who) = &update.created_by {
            self.created_by = Some(who.clone());
        }
        if let Some(at) = update.last_edited_at {
            self.last_edited_at = at;
        }
        if let Some(who) = &update.last_edited_by {
            self.last_edited_by = Some(who.clone());
        }
        if let Some(confidence) = update.confidence {
            self.confidence = confidence;
        }
        if let Some(manual) = update.manual_annotation {
            self.manual_annotation = manual;
        }
    }

    pub(crate) fn write_wire(&self, entry: &mut Map<String, Value>) {
        entry.insert("createdAt".into(), json!(format_wire_time(&self.created_at)));
        entry.insert("createdBy".into(), json!(self.created_by));
        entry.insert("lastEditedAt".into(), json!(format_wire_time(&self.last_edited_at)));
        entry.insert("lastEditedBy".into(), json!(self.last_edited_by));
        entry.insert("confidence".into(), json!(self.confidence));
        entry.insert("manualAnnotation".into(), json!(self.manual_annotation));
        if let Some(deleted) = self.is_deleted {
            entry.insert("isDeleted".into(), json!(deleted));
        }
    }

    pub(crate) fn read_wire(entry: &Map<String, Value>) -> Result<Self> {
        let text = |key: &str| entry.get(key).and_then(Value::as_str).map(str::to_string);
        let created_at = match text("createdAt") {
            Some(s) => parse_wire_time(&s)?,
            None => Utc::now(),
        };
        let last_edited_at = match text("lastEditedAt") {
            Some(s) => parse_wire_time(&s)?,
            None => created_at,
        };
        Ok(Self {
            created_at,
            created_by: text("createdBy"),
            last_edited_at,
            last_edited_by: text("lastEditedBy"),
            confidence: entry.get("confidence").and_then(Value::as_f64).unwrap_or(1.0),
            manual_annotation: entry
                .get("manualAnnotation")
                .and_then(Value::as_bool)
                .unwrap_or(true),
            is_deleted: entry.get("isDeleted").and_then(Value::as_bool),
        })
    }
}

/// Formats a timestamp the way label documents store it,
/// e.g. `Tue, 05 Mar 2024 10:00:00 UTC`.
pub fn format_wire_time(at: &DateTime<Utc>) -> String {
    at.format(WIRE_TIME_FORMAT).to_string()
}

/// Parses the long document form, falling back to RFC 3339.
pub fn parse_wire_time(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, WIRE_TIME_FORMAT) {
        return Ok(naive.and_utc());
    }
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| LabelError::malformed(format!("invalid timestamp '{s}'")))
}

/// Options for `put_*_instance` calls.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PutOptions {
    pub on_overlap: OverlapStrategy,
    pub metadata: MetadataUpdate,
}

impl PutOptions {
    /// Options that overwrite an existing annotation in the same slot.
    pub fn replace() -> Self {
        Self {
            on_overlap: OverlapStrategy::Replace,
            ..Self::default()
        }
    }

    pub fn with_metadata(mut self, metadata: MetadataUpdate) -> Self {
        self.metadata = metadata;
        self
    }
}

/// An object placed at one frame or range of a space.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectAnnotation {
    entity: EntityHash,
    space_id: SpaceId,
    key: FrameKey,
    geometry: Geometry,
    pub metadata: AnnotationMetadata,
}

impl ObjectAnnotation {
    pub(crate) fn new(
        entity: EntityHash,
        space_id: SpaceId,
        key: FrameKey,
        geometry: Geometry,
        metadata: AnnotationMetadata,
    ) -> Self {
        Self {
            entity,
            space_id,
            key,
            geometry,
            metadata,
        }
    }

    pub fn entity(&self) -> &EntityHash {
        &self.entity
    }

    pub fn space_id(&self) -> &SpaceId {
        &self.space_id
    }

    pub fn key(&self) -> FrameKey {
        self.key
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Replaces the geometry. The new value must be of the same kind.
    pub fn set_geometry(&mut self, geometry: Geometry) -> Result<()> {
        if std::mem::discriminant(&geometry) != std::mem::discriminant(&self.geometry) {
            return Err(LabelError::malformed(format!(
                "cannot replace a {} with a {}",
                self.geometry.kind_name(),
                geometry.kind_name()
            )));
        }
        self.geometry = geometry;
        Ok(())
    }
}

/// A classification placed at one frame or range of a space.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassificationAnnotation {
    entity: EntityHash,
    space_id: SpaceId,
    key: FrameKey,
    feature_hash: FeatureHash,
    pub metadata: AnnotationMetadata,
}

impl ClassificationAnnotation {
    pub(crate) fn new(
        entity: EntityHash,
        space_id: SpaceId,
        key: FrameKey,
        feature_hash: FeatureHash,
        metadata: AnnotationMetadata,
    ) -> Self {
        Self {
            entity,
            space_id,
            key,
            feature_hash,
            metadata,
        }
    }

    pub fn entity(&self) -> &EntityHash {
        &self.entity
    }

    pub fn space_id(&self) -> &SpaceId {
        &self.space_id
    }

    pub fn key(&self) -> FrameKey {
        self.key
    }

    /// The ontology classification this annotation is an instance of.
    pub fn feature_hash(&self) -> &FeatureHash {
        &self.feature_hash
    }
}

//! The label document: encode and decode of a whole [`LabelRow`].
//!
//! Layout of a document:
//!
//! ```text
//! {
//!   "label_hash", "data_hash", "data_title", "data_type", "label_status",
//!   "width", "height", "number_of_frames",
//!   "labels":  { "<frame or start-end>": { "objects": [..], "classifications": [..] } },
//!   "spaces":  { "<space id>": { "space_type", "width", "height", "number_of_frames",
//!                                "labels": { .. }, "object_actions": { .. } } },
//!   "object_answers":         { "<objectHash>": { "objectHash", "classifications": [..] } },
//!   "classification_answers": { "<classificationHash>": { .., "classifications": [..] } },
//!   "object_actions":         { "<objectHash>": { "objectHash", "actions": [..] } }
//! }
//! ```
//!
//! The top-level `labels` and `object_actions` belong to the root space. Older
//! single-media documents keep `labels` under `data_units.<hash>.labels`
//! instead; both positions are read.

mod io;

pub use io::{
    from_json_slice, from_json_str, read_document, read_label_row, to_json_string, write_document,
    write_label_row,
};

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::annotation::{AnnotationMetadata, ClassificationAnnotation, ObjectAnnotation};
use crate::entity::{
    answer_from_wire, answer_to_wire, Binding, ClassificationInstance, DynamicAnswers, Entity,
    EntityRegistry, FrameData, ObjectInstance,
};
use crate::error::{LabelError, Result};
use crate::frames::FrameKey;
use crate::geometry::{ranges_from_wire, ranges_to_wire, Geometry};
use crate::ids::{EntityHash, FeatureHash, SpaceId};
use crate::label_row::{DataType, LabelRow, LabelRowMetadata, LabelStatus};
use crate::ontology::{snake_case, Attribute, Ontology};
use crate::space::{MediaSize, Space, SpaceKind};

/// Object and classification entries collected per key.
#[derive(Default)]
struct Labels(BTreeMap<FrameKey, (Vec<Value>, Vec<Value>)>);

impl Labels {
    fn push_object(&mut self, key: FrameKey, entry: Value) {
        self.0.entry(key).or_default().0.push(entry);
    }

    fn push_classification(&mut self, key: FrameKey, entry: Value) {
        self.0.entry(key).or_default().1.push(entry);
    }

    fn into_wire(self) -> Value {
        Value::Object(
            self.0
                .into_iter()
                .map(|(key, (objects, classifications))| {
                    (
                        key.to_wire_key(),
                        json!({ "objects": objects, "classifications": classifications }),
                    )
                })
                .collect(),
        )
    }
}

/// Answer indices shared by every space.
#[derive(Default)]
struct AnswerIndex {
    object_answers: Map<String, Value>,
    classification_answers: Map<String, Value>,
}

impl AnswerIndex {
    fn add_object(&mut self, object: &ObjectInstance) -> Result<()> {
        if self.object_answers.contains_key(object.hash().as_str()) {
            return Ok(());
        }
        let class = object.class()?;
        let answers: Vec<Value> = object
            .answers()
            .filter_map(|(attribute, answer)| {
                class
                    .attribute(attribute)
                    .map(|attribute| answer_to_wire(attribute, answer))
            })
            .collect();
        self.object_answers.insert(
            object.hash().to_string(),
            json!({ "objectHash": object.hash(), "classifications": answers }),
        );
        Ok(())
    }

    fn add_classification(&mut self, classification: &ClassificationInstance) -> Result<()> {
        if self
            .classification_answers
            .contains_key(classification.hash().as_str())
        {
            return Ok(());
        }
        let class = classification.class()?;
        let answers: Vec<Value> = classification
            .answers()
            .filter_map(|(attribute, answer)| {
                class
                    .attribute(attribute)
                    .map(|attribute| answer_to_wire(attribute, answer))
            })
            .collect();
        self.classification_answers.insert(
            classification.hash().to_string(),
            json!({
                "classificationHash": classification.hash(),
                "featureHash": classification.feature_hash(),
                "classifications": answers,
            }),
        );
        Ok(())
    }
}

fn object_entry(object: &ObjectInstance, geometry: &Geometry, metadata: &AnnotationMetadata) -> Result<Value> {
    let class = object.class()?;
    let mut entry = Map::new();
    entry.insert("objectHash".into(), json!(object.hash()));
    entry.insert("featureHash".into(), json!(object.feature_hash()));
    entry.insert("name".into(), json!(class.name));
    entry.insert("color".into(), json!(class.color));
    entry.insert("shape".into(), json!(object.shape().as_str()));
    entry.insert("value".into(), json!(class.wire_value()));
    metadata.write_wire(&mut entry);
    geometry.write_wire(&mut entry);
    Ok(Value::Object(entry))
}

fn classification_entry(
    classification: &ClassificationInstance,
    metadata: &AnnotationMetadata,
) -> Result<Value> {
    let name = classification.class()?.name().to_string();
    let mut entry = Map::new();
    entry.insert("classificationHash".into(), json!(classification.hash()));
    entry.insert("featureHash".into(), json!(classification.feature_hash()));
    entry.insert("value".into(), json!(snake_case(&name)));
    entry.insert("name".into(), json!(name));
    metadata.write_wire(&mut entry);
    Ok(Value::Object(entry))
}

/// Dynamic answers of one object as `object_actions` entries.
fn actions_to_wire(object: &ObjectInstance, answers: &DynamicAnswers) -> Result<Vec<Value>> {
    let class = object.class()?;
    let mut actions = Vec::new();
    for attribute_hash in answers.attributes() {
        let Some(attribute) = class.attribute(attribute_hash) else {
            continue;
        };
        for group in answers.get(attribute_hash, None) {
            let Some(first) = group.ranges.first() else {
                continue;
            };
            let Some(answer) = answers.answer_at(attribute_hash, first.start) else {
                continue;
            };
            let mut action = answer_to_wire(attribute, answer);
            action["dynamic"] = json!(true);
            action["range"] = ranges_to_wire(&group.ranges);
            action["shouldPropagate"] = json!(false);
            actions.push(action);
        }
    }
    Ok(actions)
}

fn insert_actions(
    target: &mut Map<String, Value>,
    object: &ObjectInstance,
    answers: &DynamicAnswers,
) -> Result<()> {
    let actions = actions_to_wire(object, answers)?;
    if !actions.is_empty() {
        target.insert(
            object.hash().to_string(),
            json!({ "objectHash": object.hash(), "actions": actions }),
        );
    }
    Ok(())
}

/// Bitmask extents must equal the pixel size of their media.
fn check_extent(space_id: &SpaceId, kind: &SpaceKind, entity: &EntityHash, geometry: &Geometry) -> Result<()> {
    let Geometry::Bitmask(mask) = geometry else {
        return Ok(());
    };
    match kind.media_size() {
        Some(MediaSize { width, height }) if width == mask.width && height == mask.height => Ok(()),
        size => Err(LabelError::DimensionMismatch {
            space_id: space_id.clone(),
            entity: entity.clone(),
            mask_width: mask.width,
            mask_height: mask.height,
            media: size.map_or_else(|| "unknown".to_string(), |s| s.to_string()),
        }),
    }
}

/// Writes one space's index into `labels` and `actions`.
fn encode_space(
    space: &Space,
    registry: &EntityRegistry,
    index: &mut AnswerIndex,
    labels: &mut Labels,
    actions: &mut Map<String, Value>,
) -> Result<()> {
    for annotation in space.get_object_instance_annotations(None) {
        let object = registry.object(annotation.entity())?;
        check_extent(space.id(), space.kind(), object.hash(), annotation.geometry())?;
        labels.push_object(
            annotation.key(),
            object_entry(object, annotation.geometry(), &annotation.metadata)?,
        );
        index.add_object(object)?;
    }
    for hash in space.object_hashes() {
        if let Some(answers) = space.dynamic_answers_of(hash) {
            insert_actions(actions, registry.object(hash)?, answers)?;
        }
    }
    for annotation in space.get_classification_instance_annotations(None) {
        let classification = registry.classification(annotation.entity())?;
        labels.push_classification(
            annotation.key(),
            classification_entry(classification, &annotation.metadata)?,
        );
        index.add_classification(classification)?;
    }
    Ok(())
}

fn space_header(kind: &SpaceKind) -> Map<String, Value> {
    let mut header = Map::new();
    header.insert("space_type".into(), json!(kind.type_name()));
    if let Some(size) = kind.media_size() {
        header.insert("width".into(), json!(size.width));
        header.insert("height".into(), json!(size.height));
    }
    if let SpaceKind::Video {
        number_of_frames, ..
    } = kind
    {
        header.insert("number_of_frames".into(), json!(number_of_frames));
    }
    header
}

/// Serializes a label row into its document.
#[tracing::instrument(skip_all, fields(label_hash = ?row.label_hash()))]
pub(crate) fn encode(row: &LabelRow) -> Result<Value> {
    let metadata = row.metadata();
    let registry = row.registry();
    let mut index = AnswerIndex::default();
    let mut root_labels = Labels::default();
    let mut root_actions = Map::new();
    let mut spaces = Map::new();

    for space in row.spaces() {
        if space.id().is_root() {
            encode_space(space, registry, &mut index, &mut root_labels, &mut root_actions)?;
            continue;
        }
        let mut labels = Labels::default();
        let mut actions = Map::new();
        encode_space(space, registry, &mut index, &mut labels, &mut actions)?;
        let mut body = space_header(space.kind());
        body.insert("labels".into(), labels.into_wire());
        body.insert("object_actions".into(), Value::Object(actions));
        spaces.insert(space.id().to_string(), Value::Object(body));
    }

    let root_id = SpaceId::root();
    let root_kind = metadata.root_kind();
    for hash in row.attached_objects() {
        let object = registry.object(hash)?;
        for (key, data) in object.frames() {
            check_extent(&root_id, &root_kind, hash, &data.geometry)?;
            root_labels.push_object(*key, object_entry(object, &data.geometry, &data.metadata)?);
        }
        insert_actions(&mut root_actions, object, object.dynamic_answers())?;
        index.add_object(object)?;
    }
    for hash in row.attached_classifications() {
        let classification = registry.classification(hash)?;
        for (key, metadata) in classification.frames() {
            root_labels.push_classification(*key, classification_entry(classification, metadata)?);
        }
        index.add_classification(classification)?;
    }

    let mut document = Map::new();
    document.insert("label_hash".into(), json!(metadata.label_hash));
    document.insert("data_hash".into(), json!(metadata.data_hash));
    document.insert("data_title".into(), json!(metadata.data_title));
    document.insert("data_type".into(), json!(metadata.data_type.as_str()));
    document.insert("label_status".into(), json!(metadata.label_status.as_str()));
    for (key, value) in [
        ("width", metadata.width),
        ("height", metadata.height),
        ("number_of_frames", metadata.number_of_frames),
    ] {
        if let Some(value) = value {
            document.insert(key.into(), json!(value));
        }
    }
    document.insert("labels".into(), root_labels.into_wire());
    document.insert("spaces".into(), Value::Object(spaces));
    document.insert("object_answers".into(), Value::Object(index.object_answers));
    document.insert(
        "classification_answers".into(),
        Value::Object(index.classification_answers),
    );
    document.insert("object_actions".into(), Value::Object(root_actions));
    tracing::debug!(spaces = row.spaces().count(), "encoded label row");
    Ok(Value::Object(document))
}

fn text<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    map.get(key).and_then(Value::as_str)
}

fn required_text<'a>(map: &'a Map<String, Value>, key: &str, what: &str) -> Result<&'a str> {
    text(map, key).ok_or_else(|| LabelError::malformed(format!("{what} is missing '{key}'")))
}

fn dimension(map: &Map<String, Value>, key: &str) -> Result<Option<u32>> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .map(Some)
            .ok_or_else(|| LabelError::malformed(format!("'{key}' must be a non-negative integer"))),
    }
}

fn as_object<'a>(value: &'a Value, what: &str) -> Result<&'a Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| LabelError::malformed(format!("{what} must be a JSON object")))
}

fn as_array<'a>(value: Option<&'a Value>, what: &str) -> Result<&'a [Value]> {
    match value {
        None | Some(Value::Null) => Ok(&[]),
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(LabelError::malformed(format!("{what} must be a list"))),
    }
}

/// Reads the row's metadata. Keys the document omits keep their value from
/// `known`, the metadata of the row being initialised, when there is one.
fn read_metadata(
    doc: &Map<String, Value>,
    unit: Option<&Map<String, Value>>,
    known: Option<&LabelRowMetadata>,
) -> Result<LabelRowMetadata> {
    let fallback = known.cloned().unwrap_or_default();
    let lookup = |key: &str| -> Result<Option<u32>> {
        match dimension(doc, key)? {
            Some(v) => Ok(Some(v)),
            None => unit.map_or(Ok(None), |unit| dimension(unit, key)),
        }
    };
    let data_type = match doc.get("data_type") {
        Some(value) => DataType::deserialize(value)
            .map_err(|e| LabelError::malformed(format!("invalid data_type: {e}")))?,
        None if doc.contains_key("spaces") => DataType::Group,
        None => fallback.data_type,
    };
    let label_status = match doc.get("label_status") {
        Some(value) => LabelStatus::deserialize(value)
            .map_err(|e| LabelError::malformed(format!("invalid label_status: {e}")))?,
        None => fallback.label_status,
    };
    Ok(LabelRowMetadata {
        label_hash: text(doc, "label_hash")
            .map(str::to_string)
            .or(fallback.label_hash),
        data_hash: text(doc, "data_hash").map_or(fallback.data_hash, str::to_string),
        data_title: text(doc, "data_title").map_or(fallback.data_title, str::to_string),
        data_type,
        label_status,
        width: lookup("width")?.or(fallback.width),
        height: lookup("height")?.or(fallback.height),
        number_of_frames: lookup("number_of_frames")?.or(fallback.number_of_frames),
    })
}

fn read_space_kind(id: &str, body: &Map<String, Value>) -> Result<SpaceKind> {
    let what = format!("space '{id}'");
    let size = || -> Result<MediaSize> {
        match (dimension(body, "width")?, dimension(body, "height")?) {
            (Some(width), Some(height)) => Ok(MediaSize::new(width, height)),
            _ => Err(LabelError::malformed(format!("{what} needs 'width' and 'height'"))),
        }
    };
    match required_text(body, "space_type", &what)? {
        "image" => Ok(SpaceKind::Image { size: size()? }),
        "video" => Ok(SpaceKind::Video {
            size: size()?,
            number_of_frames: dimension(body, "number_of_frames")?.ok_or_else(|| {
                LabelError::malformed(format!("{what} needs 'number_of_frames'"))
            })?,
        }),
        "audio" => Ok(SpaceKind::Audio),
        "text" => Ok(SpaceKind::Text),
        other => Err(LabelError::malformed(format!(
            "{what} has unknown space_type '{other}'"
        ))),
    }
}

/// Finds or creates the object entity an entry refers to.
fn ensure_object(
    registry: &mut EntityRegistry,
    ontology: &Arc<Ontology>,
    entry: &Map<String, Value>,
) -> Result<EntityHash> {
    let hash = EntityHash::new(required_text(entry, "objectHash", "object entry")?);
    let feature = FeatureHash::new(required_text(entry, "featureHash", "object entry")?);
    if !registry.contains(&hash) {
        registry.create(ontology, &feature, Some(hash.clone()))?;
    }
    let object = registry.object(&hash)?;
    if object.feature_hash() != &feature {
        return Err(LabelError::malformed(format!(
            "object '{hash}' appears with feature hashes '{}' and '{feature}'",
            object.feature_hash()
        )));
    }
    Ok(hash)
}

fn ensure_classification(
    registry: &mut EntityRegistry,
    ontology: &Arc<Ontology>,
    entry: &Map<String, Value>,
) -> Result<EntityHash> {
    let hash = EntityHash::new(required_text(entry, "classificationHash", "classification entry")?);
    let feature = FeatureHash::new(required_text(entry, "featureHash", "classification entry")?);
    if !registry.contains(&hash) {
        registry.create(ontology, &feature, Some(hash.clone()))?;
    }
    let classification = registry.classification(&hash)?;
    if classification.feature_hash() != &feature {
        return Err(LabelError::malformed(format!(
            "classification '{hash}' appears with feature hashes '{}' and '{feature}'",
            classification.feature_hash()
        )));
    }
    Ok(hash)
}

/// Label keys in frame order, parsed.
fn sorted_labels(labels: &Value, what: &str) -> Result<Vec<(FrameKey, Map<String, Value>)>> {
    let mut keyed = as_object(labels, what)?
        .iter()
        .map(|(key, body)| Ok((FrameKey::parse_wire_key(key)?, as_object(body, what)?.clone())))
        .collect::<Result<Vec<_>>>()?;
    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(keyed)
}

/// Shared state while decoding one document.
struct Reader<'a> {
    ontology: &'a Arc<Ontology>,
    registry: &'a mut EntityRegistry,
    classification_answers: Option<&'a Map<String, Value>>,
    /// Answer lists carried on classification entries themselves.
    inline_answers: BTreeMap<EntityHash, Value>,
}

impl Reader<'_> {
    /// Whether a classification entry's answers can be found. Entries whose
    /// answers are nowhere to be found are skipped.
    fn has_answers(&self, entry: &Map<String, Value>) -> bool {
        let indexed = text(entry, "classificationHash")
            .zip(self.classification_answers)
            .is_some_and(|(hash, index)| index.contains_key(hash));
        indexed || entry.get("classifications").is_some_and(Value::is_array)
    }

    fn read_classification(&mut self, entry: &Map<String, Value>) -> Result<EntityHash> {
        let hash = ensure_classification(self.registry, self.ontology, entry)?;
        if let Some(inline) = entry.get("classifications").filter(|v| v.is_array()) {
            self.inline_answers
                .entry(hash.clone())
                .or_insert_with(|| inline.clone());
        }
        Ok(hash)
    }

    fn read_space_labels(&mut self, space: &mut Space, labels: &Value) -> Result<()> {
        let kind = *space.kind();
        let space_id = space.id().clone();
        for (key, body) in sorted_labels(labels, "space labels")? {
            if kind.is_range_based() != key.range().is_some() {
                return Err(LabelError::malformed(format!(
                    "key {key} does not address a {} space",
                    kind.type_name()
                )));
            }
            for entry in as_array(body.get("objects"), "objects")? {
                let entry = as_object(entry, "object entry")?;
                let hash = ensure_object(self.registry, self.ontology, entry)?;
                let object = self.registry.object_mut(&hash)?;
                if matches!(object.binding(), Binding::OnLabelRow) {
                    return Err(LabelError::malformed(format!(
                        "object '{hash}' appears both on the label row and on a space"
                    )));
                }
                kind.check_shape(object.shape())?;
                let geometry = match key {
                    FrameKey::Range(range) => Geometry::Range(range),
                    FrameKey::Frame(_) => Geometry::read_wire(object.shape(), entry)?,
                };
                object.binding_mut().bind(&space_id);
                space.objects.insert(ObjectAnnotation::new(
                    hash,
                    space_id.clone(),
                    key,
                    geometry,
                    AnnotationMetadata::read_wire(entry)?,
                ));
            }
            for entry in as_array(body.get("classifications"), "classifications")? {
                let entry = as_object(entry, "classification entry")?;
                if !self.has_answers(entry) {
                    tracing::warn!(
                        space = %space_id,
                        classification = text(entry, "classificationHash").unwrap_or("?"),
                        "skipping classification entry without answers"
                    );
                    continue;
                }
                let hash = self.read_classification(entry)?;
                let classification = self.registry.classification_mut(&hash)?;
                if matches!(classification.binding(), Binding::OnLabelRow) {
                    return Err(LabelError::malformed(format!(
                        "classification '{hash}' appears both on the label row and on a space"
                    )));
                }
                classification.binding_mut().bind(&space_id);
                let feature = classification.feature_hash().clone();
                space.classifications.insert(ClassificationAnnotation::new(
                    hash,
                    space_id.clone(),
                    key,
                    feature,
                    AnnotationMetadata::read_wire(entry)?,
                ));
            }
        }
        Ok(())
    }

    /// Top-level labels become frame data on entities attached to the label row.
    fn read_root_labels(
        &mut self,
        root_kind: &SpaceKind,
        labels: &Value,
        attached_objects: &mut Vec<EntityHash>,
        attached_classifications: &mut Vec<EntityHash>,
    ) -> Result<()> {
        for (key, body) in sorted_labels(labels, "labels")? {
            if key.range().is_some() {
                return Err(LabelError::malformed(format!(
                    "label key {key} is a range; top-level labels are keyed by frame"
                )));
            }
            for entry in as_array(body.get("objects"), "objects")? {
                let entry = as_object(entry, "object entry")?;
                let hash = ensure_object(self.registry, self.ontology, entry)?;
                let object = self.registry.object_mut(&hash)?;
                root_kind.check_shape(object.shape())?;
                match object.binding() {
                    Binding::OnSpaces(_) => {
                        return Err(LabelError::malformed(format!(
                            "object '{hash}' appears both on the label row and on a space"
                        )))
                    }
                    Binding::Detached => {
                        *object.binding_mut() = Binding::OnLabelRow;
                        attached_objects.push(hash.clone());
                    }
                    Binding::OnLabelRow => {}
                }
                let geometry = Geometry::read_wire(object.shape(), entry)?;
                object.insert_frame(
                    key,
                    FrameData {
                        geometry,
                        metadata: AnnotationMetadata::read_wire(entry)?,
                    },
                );
            }
            for entry in as_array(body.get("classifications"), "classifications")? {
                let entry = as_object(entry, "classification entry")?;
                if !self.has_answers(entry) {
                    tracing::warn!(
                        classification = text(entry, "classificationHash").unwrap_or("?"),
                        "skipping classification entry without answers"
                    );
                    continue;
                }
                let hash = self.read_classification(entry)?;
                let classification = self.registry.classification_mut(&hash)?;
                match classification.binding() {
                    Binding::OnSpaces(_) => {
                        return Err(LabelError::malformed(format!(
                            "classification '{hash}' appears both on the label row and on a space"
                        )))
                    }
                    Binding::Detached => {
                        *classification.binding_mut() = Binding::OnLabelRow;
                        attached_classifications.push(hash.clone());
                    }
                    Binding::OnLabelRow => {}
                }
                classification.insert_frame(key, AnnotationMetadata::read_wire(entry)?);
            }
        }
        Ok(())
    }

    fn read_object_answers(&mut self, index: &Value) -> Result<()> {
        for (hash, body) in as_object(index, "object_answers")? {
            let hash = EntityHash::new(hash.as_str());
            if !self.registry.contains(&hash) {
                tracing::warn!(object = %hash, "skipping answers of an object with no labels");
                continue;
            }
            let object = self.registry.object_mut(&hash)?;
            let class = object.class()?.clone();
            for entry in as_array(body.get("classifications"), "object answers")? {
                let Some(attribute) = static_attribute(|h| class.attribute(h), entry)? else {
                    continue;
                };
                let answer = answer_from_wire(&attribute, entry)?;
                object
                    .static_answers_mut()
                    .set(&attribute, answer.value, answer.manual_annotation)?;
            }
        }
        Ok(())
    }

    /// Classification answers come from `classification_answers`, or failing
    /// that from the entry itself.
    fn read_classification_answers(&mut self) -> Result<()> {
        let hashes: Vec<EntityHash> = self
            .registry
            .iter()
            .filter_map(|entity| match entity {
                Entity::Classification(c) => Some(c.hash().clone()),
                Entity::Object(_) => None,
            })
            .collect();
        for hash in hashes {
            let entries = match self
                .classification_answers
                .and_then(|index| index.get(hash.as_str()))
            {
                Some(body) => body.get("classifications").cloned(),
                None => self.inline_answers.get(&hash).cloned(),
            };
            let classification = self.registry.classification_mut(&hash)?;
            let class = classification.class()?.clone();
            for entry in as_array(entries.as_ref(), "classification answers")? {
                let Some(attribute) = static_attribute(|h| class.attribute(h), entry)? else {
                    continue;
                };
                let answer = answer_from_wire(&attribute, entry)?;
                classification.static_answers_mut().set(
                    &attribute,
                    answer.value,
                    answer.manual_annotation,
                )?;
            }
        }
        Ok(())
    }

    /// Reads one space's `object_actions`.
    fn read_space_actions(&mut self, space: &mut Space, actions: &Value) -> Result<()> {
        for (hash, body) in as_object(actions, "object_actions")? {
            let hash = EntityHash::new(hash.as_str());
            if !space.objects.contains_entity(&hash) {
                tracing::warn!(
                    space = %space.id(),
                    object = %hash,
                    "skipping actions of an object not placed on this space"
                );
                continue;
            }
            if !space.kind().supports_dynamic_answers() {
                return Err(LabelError::unsupported(format!(
                    "{} spaces do not hold dynamic answers",
                    space.kind().type_name()
                )));
            }
            let class = self.registry.object(&hash)?.class()?.clone();
            let annotated = annotated_frames(space.objects.keys_of(&hash));
            let total = space.kind().number_of_frames().filter(|n| *n > 0);
            let answers = space.dynamic_answers.entry(hash).or_default();
            read_dynamic_entries(|h| class.attribute(h), body, &annotated, total, answers)?;
        }
        Ok(())
    }

    /// Top-level `object_actions` belong to attached objects or to objects
    /// placed on the root space.
    fn read_root_actions(&mut self, root: &mut Space, actions: &Value) -> Result<()> {
        for (hash, body) in as_object(actions, "object_actions")? {
            let hash = EntityHash::new(hash.as_str());
            if !self.registry.contains(&hash) {
                tracing::warn!(object = %hash, "skipping actions of an object with no labels");
                continue;
            }
            let total = root.kind().number_of_frames().filter(|n| *n > 0);
            let object = self.registry.object_mut(&hash)?;
            let class = object.class()?.clone();
            if matches!(object.binding(), Binding::OnLabelRow) {
                let annotated = annotated_frames(object.frames().keys().copied());
                read_dynamic_entries(
                    |h| class.attribute(h),
                    body,
                    &annotated,
                    total,
                    object.dynamic_answers_mut(),
                )?;
            } else if root.objects.contains_entity(&hash) {
                let annotated = annotated_frames(root.objects.keys_of(&hash));
                let answers = root.dynamic_answers.entry(hash).or_default();
                read_dynamic_entries(|h| class.attribute(h), body, &annotated, total, answers)?;
            } else {
                tracing::warn!(object = %hash, "skipping actions of an object not on the root space");
            }
        }
        Ok(())
    }
}

/// The static attribute an answer entry refers to, if it is known.
fn static_attribute<'c>(
    lookup: impl Fn(&FeatureHash) -> Option<&'c Attribute>,
    entry: &Value,
) -> Result<Option<Attribute>> {
    let Some(feature) = entry.get("featureHash").and_then(Value::as_str) else {
        return Err(LabelError::malformed("answer entry is missing 'featureHash'"));
    };
    match lookup(&FeatureHash::new(feature)) {
        None => {
            tracing::warn!(attribute = feature, "skipping answer for an unknown attribute");
            Ok(None)
        }
        Some(attribute) if attribute.dynamic => Ok(None),
        Some(attribute) => Ok(Some(attribute.clone())),
    }
}

fn annotated_frames(keys: impl Iterator<Item = FrameKey>) -> BTreeSet<u32> {
    keys.filter_map(|key| match key {
        FrameKey::Frame(frame) => Some(frame),
        FrameKey::Range(_) => None,
    })
    .collect()
}

/// Reads an object's `actions`. Answers only land on frames in `annotated`;
/// a range reaching past `total` frames is rejected.
fn read_dynamic_entries<'c>(
    lookup: impl Fn(&FeatureHash) -> Option<&'c Attribute>,
    body: &Value,
    annotated: &BTreeSet<u32>,
    total: Option<u32>,
    answers: &mut DynamicAnswers,
) -> Result<()> {
    for action in as_array(body.get("actions"), "object actions")? {
        let Some(feature) = action.get("featureHash").and_then(Value::as_str) else {
            return Err(LabelError::malformed("action entry is missing 'featureHash'"));
        };
        let attribute = match lookup(&FeatureHash::new(feature)) {
            Some(attribute) if attribute.dynamic => attribute,
            Some(_) | None => {
                tracing::warn!(attribute = feature, "skipping action for a non-dynamic attribute");
                continue;
            }
        };
        let answer = answer_from_wire(attribute, action)?;
        let ranges = match action.get("range") {
            Some(range) => ranges_from_wire(range)?,
            None => Vec::new(),
        };
        if let Some(total) = total {
            if let Some(range) = ranges.iter().find(|r| r.end > total) {
                return Err(LabelError::malformed(format!(
                    "action range {range:?} of '{feature}' is outside the {total} frames of this data unit"
                )));
            }
        }
        let frames: Vec<u32> = annotated
            .iter()
            .copied()
            .filter(|frame| ranges.iter().any(|r| r.contains(*frame)))
            .collect();
        answers.set(attribute, answer.value, frames, answer.manual_annotation)?;
    }
    Ok(())
}

/// Builds an initialised label row from a document.
pub(crate) fn decode(ontology: Arc<Ontology>, document: &Value) -> Result<LabelRow> {
    decode_with(ontology, document, None)
}

/// Like [`decode`], filling metadata the document leaves out from `known`.
#[tracing::instrument(skip_all)]
pub(crate) fn decode_with(
    ontology: Arc<Ontology>,
    document: &Value,
    known: Option<&LabelRowMetadata>,
) -> Result<LabelRow> {
    let doc = as_object(document, "a label document")?;
    let unit = match doc.get("data_units") {
        Some(units) => as_object(units, "data_units")?
            .values()
            .next()
            .map(|unit| as_object(unit, "a data unit"))
            .transpose()?,
        None => None,
    };
    let metadata = read_metadata(doc, unit, known)?;
    let root_kind = metadata.root_kind();
    let mut row = LabelRow::new(Arc::clone(&ontology), metadata);

    let classification_answers = doc
        .get("classification_answers")
        .map(|index| as_object(index, "classification_answers"))
        .transpose()?;

    {
        let (registry, spaces, attached_objects, attached_classifications) = row.parts_mut();
        let mut reader = Reader {
            ontology: &ontology,
            registry,
            classification_answers,
            inline_answers: BTreeMap::new(),
        };

        if let Some(declared) = doc.get("spaces") {
            for (id, body) in as_object(declared, "spaces")? {
                let body = as_object(body, "a space")?;
                let space_id = SpaceId::new(id.as_str());
                if space_id.is_root() {
                    return Err(LabelError::malformed(
                        "the root space is not declared under 'spaces'",
                    ));
                }
                let mut space = Space::new(space_id.clone(), read_space_kind(id, body)?);
                if let Some(labels) = body.get("labels") {
                    reader.read_space_labels(&mut space, labels)?;
                }
                if let Some(actions) = body.get("object_actions") {
                    reader.read_space_actions(&mut space, actions)?;
                }
                spaces.insert(space_id, space);
            }
        }

        let labels = doc
            .get("labels")
            .or_else(|| unit.and_then(|unit| unit.get("labels")));
        if let Some(labels) = labels {
            reader.read_root_labels(&root_kind, labels, attached_objects, attached_classifications)?;
        }
        if let Some(index) = doc.get("object_answers") {
            reader.read_object_answers(index)?;
        }
        reader.read_classification_answers()?;
        if let Some(actions) = doc.get("object_actions") {
            let root = spaces
                .get_mut(&SpaceId::root())
                .ok_or(LabelError::UnknownSpace(SpaceId::root()))?;
            reader.read_root_actions(root, actions)?;
        }
    }

    row.mark_initialised();
    tracing::debug!(
        entities = row.registry().len(),
        spaces = row.spaces().count(),
        "decoded label row"
    );
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ontology() -> Arc<Ontology> {
        Arc::new(
            Ontology::from_json_str(
                r#"{
                "objects": [
                    {"name": "Pedestrian", "shape": "bounding_box", "featureNodeHash": "obj-ped",
                     "attributes": [
                        {"name": "Pose", "type": "text", "featureNodeHash": "attr-pose", "dynamic": true},
                        {"name": "Occluded", "type": "radio", "featureNodeHash": "attr-occ",
                         "options": [{"label": "Yes", "featureNodeHash": "opt-yes"},
                                     {"label": "No", "featureNodeHash": "opt-no"}]}
                     ]},
                    {"name": "Utterance", "shape": "audio", "featureNodeHash": "obj-utt"}
                ],
                "classifications": [
                    {"featureNodeHash": "cls-scene", "attributes": [
                        {"name": "Scene", "type": "text", "featureNodeHash": "attr-scene"}]}
                ]
            }"#,
            )
            .unwrap(),
        )
    }

    fn bbox(x: f64) -> Value {
        json!({"x": x, "y": 0.1, "w": 0.2, "h": 0.2})
    }

    #[test]
    fn test_legacy_data_unit_labels_attach_to_label_row() {
        let document = json!({
            "label_hash": "lr",
            "data_hash": "dh",
            "data_type": "video",
            "data_units": {
                "dh": {
                    "width": 100, "height": 50,
                    "labels": {
                        "3": {"objects": [{"objectHash": "o1", "featureHash": "obj-ped", "boundingBox": bbox(0.3)}]},
                        "1": {"objects": [{"objectHash": "o1", "featureHash": "obj-ped", "boundingBox": bbox(0.1)}]}
                    }
                }
            },
            "object_answers": {
                "o1": {"objectHash": "o1", "classifications": [
                    {"name": "Occluded", "featureHash": "attr-occ",
                     "answers": [{"featureHash": "opt-no"}], "manualAnnotation": true}
                ]}
            }
        });
        let row = decode(ontology(), &document).unwrap();
        assert!(row.is_labelling_initialised());
        assert_eq!(row.metadata().width, Some(100));

        let object = row.object(&"o1".into()).unwrap();
        assert_eq!(object.binding(), &Binding::OnLabelRow);
        assert_eq!(
            object.get_annotation_frames().unwrap(),
            vec![FrameKey::Frame(1), FrameKey::Frame(3)]
        );
        assert!(object.get_answer(&"attr-occ".into()).is_some());
    }

    #[test]
    fn test_classification_without_answers_is_skipped() {
        let document = json!({
            "data_hash": "dh",
            "labels": {
                "0": {"classifications": [
                    {"classificationHash": "c1", "featureHash": "cls-scene"},
                    {"classificationHash": "c2", "featureHash": "cls-scene"}
                ]}
            },
            "classification_answers": {
                "c2": {"classificationHash": "c2", "featureHash": "cls-scene", "classifications": [
                    {"featureHash": "attr-scene", "answers": "street"}
                ]}
            }
        });
        let row = decode(ontology(), &document).unwrap();
        assert!(row.classification(&"c1".into()).is_err());
        let c2 = row.classification(&"c2".into()).unwrap();
        assert_eq!(c2.get_answer(&"attr-scene".into()), Some(&"street".into()));
    }

    #[test]
    fn test_space_labels_bind_entities() {
        let document = json!({
            "data_hash": "dh",
            "data_type": "group",
            "spaces": {
                "audio-1": {
                    "space_type": "audio",
                    "labels": {
                        "0-100": {"objects": [{"objectHash": "u1", "featureHash": "obj-utt"}]}
                    }
                },
                "video-1": {
                    "space_type": "video", "width": 10, "height": 10, "number_of_frames": 4,
                    "labels": {
                        "2": {"objects": [{"objectHash": "p1", "featureHash": "obj-ped", "boundingBox": bbox(0.5)}]}
                    },
                    "object_actions": {
                        "p1": {"objectHash": "p1", "actions": [
                            {"featureHash": "attr-pose", "answers": "walking", "range": [[2, 3]]}
                        ]}
                    }
                }
            }
        });
        let row = decode(ontology(), &document).unwrap();
        assert!(row.object(&"u1".into()).unwrap().is_space_bound());

        let video = row.space(&"video-1".into()).unwrap();
        let answers = video
            .get_answer_on_frames(&"p1".into(), &"attr-pose".into(), None)
            .unwrap();
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].ranges, vec![crate::frames::Range::new(2, 3)]);

        let encoded = encode(&row).unwrap();
        assert_eq!(encoded["spaces"]["audio-1"]["labels"]["0-100"]["objects"][0]["objectHash"], "u1");
        assert_eq!(
            encoded["spaces"]["video-1"]["object_actions"]["p1"]["actions"][0]["answers"],
            "walking"
        );
    }

    fn video_with_actions(range: Value) -> Value {
        json!({
            "data_hash": "dh",
            "data_type": "group",
            "spaces": {
                "video-1": {
                    "space_type": "video", "width": 10, "height": 10, "number_of_frames": 4,
                    "labels": {
                        "1": {"objects": [{"objectHash": "p1", "featureHash": "obj-ped", "boundingBox": bbox(0.5)}]},
                        "3": {"objects": [{"objectHash": "p1", "featureHash": "obj-ped", "boundingBox": bbox(0.5)}]}
                    },
                    "object_actions": {
                        "p1": {"objectHash": "p1", "actions": [
                            {"featureHash": "attr-pose", "answers": "walking", "range": range}
                        ]}
                    }
                }
            }
        })
    }

    #[test]
    fn test_action_range_past_last_frame_is_rejected() {
        let err = decode(ontology(), &video_with_actions(json!([[0, 3000000]]))).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::MalformedInput);
    }

    #[test]
    fn test_action_answers_land_on_annotated_frames() {
        let row = decode(ontology(), &video_with_actions(json!([[0, 4]]))).unwrap();
        let video = row.space(&"video-1".into()).unwrap();
        let answers = video
            .get_answer_on_frames(&"p1".into(), &"attr-pose".into(), None)
            .unwrap();
        assert_eq!(answers.len(), 1);
        assert_eq!(
            answers[0].ranges,
            vec![crate::frames::Range::new(1, 2), crate::frames::Range::new(3, 4)]
        );
    }

    #[test]
    fn test_object_on_both_row_and_space_is_rejected() {
        let document = json!({
            "data_hash": "dh",
            "spaces": {
                "video-1": {
                    "space_type": "video", "width": 10, "height": 10, "number_of_frames": 4,
                    "labels": {"0": {"objects": [{"objectHash": "p1", "featureHash": "obj-ped", "boundingBox": bbox(0.5)}]}}
                }
            },
            "labels": {"0": {"objects": [{"objectHash": "p1", "featureHash": "obj-ped", "boundingBox": bbox(0.5)}]}}
        });
        let err = decode(ontology(), &document).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::MalformedInput);
    }

    #[test]
    fn test_range_key_on_video_space_is_rejected() {
        let document = json!({
            "data_hash": "dh",
            "spaces": {
                "video-1": {
                    "space_type": "video", "width": 10, "height": 10, "number_of_frames": 4,
                    "labels": {"0-2": {"objects": []}}
                }
            }
        });
        assert!(decode(ontology(), &document).is_err());
    }
}

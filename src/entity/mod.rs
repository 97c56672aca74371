//! Annotation entities: object and classification instances.
//!
//! An entity is in exactly one editing regime at a time, tracked by
//! [`Binding`]:
//!
//! - **Detached** (or attached to the label row's root surface): frame data and
//!   dynamic answers live on the entity itself and are edited with
//!   [`ObjectInstance::set_for_frames`] and friends.
//! - **Space-bound**: once placed through a space, the entity's frame data lives
//!   in that space's index and the entity-level frame API is refused.
//!
//! Static answers live on the entity in both regimes, so every space an entity
//! is placed on sees the same answers.

mod answer;
mod registry;

pub use answer::{Answer, AnswerValue, FrameAnswer};
pub(crate) use answer::{answer_from_wire, answer_to_wire, DynamicAnswers, StaticAnswers};
pub use registry::{Entity, EntityRegistry};

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::annotation::{AnnotationMetadata, OverlapStrategy, PutOptions};
use crate::error::{LabelError, Result};
use crate::frames::{FrameKey, Frames, Range};
use crate::geometry::{Geometry, Shape};
use crate::ids::{EntityHash, FeatureHash, SpaceId};
use crate::ontology::{Attribute, ClassificationClass, ObjectClass, Ontology};

const OBJECT_FRAMES_ON_SPACE: &str = "This operation is not allowed for objects that exist on a space. \
     For adding the object to different frames on a space, use SpaceMut::put_object_instance.";
const OBJECT_READ_ON_SPACE: &str = "This operation is not allowed for objects that exist on a space. \
     To read the object's annotations, use SpaceRef::get_object_instance_annotations.";
const OBJECT_DYNAMIC_ON_SPACE: &str = "This operation is not allowed for objects that exist on a space. \
     For dynamic attributes of objects on a space, use SpaceMut::set_answer_on_frames, \
     SpaceMut::get_answer_on_frames or SpaceMut::remove_answer_from_frame.";
const OBJECT_FRAMES_ON_LABEL_ROW: &str = "This object is attached to the label row. \
     Edit its frames with LabelRow::set_object_frames, or remove it with LabelRow::remove_object first.";
const CLASSIFICATION_FRAMES_ON_LABEL_ROW: &str = "This classification is attached to the label row. \
     Edit its frames with LabelRow::set_classification_frames, or remove it with \
     LabelRow::remove_classification first.";
const CLASSIFICATION_FRAMES_ON_SPACE: &str = "This operation is not allowed for classifications that exist on a space. \
     For adding the classification to different frames on a space, use SpaceMut::put_classification_instance.";
const CLASSIFICATION_READ_ON_SPACE: &str = "This operation is not allowed for classifications that exist on a space. \
     To read the classification's annotations, use SpaceRef::get_classification_instance_annotations.";

/// Which editing regime an entity is in.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Binding {
    /// Not placed anywhere.
    #[default]
    Detached,
    /// Added to the label row's root surface from its detached frame data.
    OnLabelRow,
    /// Placed through one or more spaces.
    OnSpaces(BTreeSet<SpaceId>),
}

impl Binding {
    pub fn is_space_bound(&self) -> bool {
        matches!(self, Binding::OnSpaces(_))
    }

    pub(crate) fn bind(&mut self, space_id: &SpaceId) {
        match self {
            Binding::OnSpaces(spaces) => {
                spaces.insert(space_id.clone());
            }
            _ => *self = Binding::OnSpaces(BTreeSet::from([space_id.clone()])),
        }
    }

    /// Drops one space; the entity is detached once no space holds it.
    pub(crate) fn unbind(&mut self, space_id: &SpaceId) {
        if let Binding::OnSpaces(spaces) = self {
            spaces.remove(space_id);
            if spaces.is_empty() {
                *self = Binding::Detached;
            }
        }
    }
}

/// Geometry and metadata an object carries for one frame in the detached regime.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameData {
    pub geometry: Geometry,
    pub metadata: AnnotationMetadata,
}

/// Maps a caller's frame selection onto storage keys for an entity of `shape`.
///
/// Range-based shapes keep ranges as they are; everything else is expanded to
/// individual frames.
pub(crate) fn keys_for(shape: Option<Shape>, frames: &Frames) -> Result<Vec<FrameKey>> {
    if frames.is_empty() {
        return Err(LabelError::malformed("no frames given"));
    }
    if shape.is_some_and(|s| s.is_range_based()) {
        return frames
            .keys()
            .iter()
            .map(|key| match key {
                FrameKey::Range(r) if !r.is_empty() => Ok(FrameKey::Range(*r)),
                FrameKey::Range(r) => Err(LabelError::malformed(format!("range {r:?} is empty"))),
                FrameKey::Frame(f) => Err(LabelError::unsupported(format!(
                    "{} objects are placed on ranges, not on frame {f}",
                    shape.map_or("range", |s| s.as_str())
                ))),
            })
            .collect();
    }
    let indices = frames.to_frame_indices();
    if indices.is_empty() {
        return Err(LabelError::malformed("the given ranges cover no frames"));
    }
    Ok(indices.into_iter().map(FrameKey::Frame).collect())
}

/// An instance of an ontology object class.
#[derive(Clone, Debug)]
pub struct ObjectInstance {
    hash: EntityHash,
    ontology: Arc<Ontology>,
    feature_hash: FeatureHash,
    shape: Shape,
    answers: StaticAnswers,
    dynamic_answers: DynamicAnswers,
    frames: BTreeMap<FrameKey, FrameData>,
    binding: Binding,
}

impl ObjectInstance {
    pub(crate) fn new(hash: EntityHash, ontology: Arc<Ontology>, class: &ObjectClass) -> Self {
        Self {
            hash,
            feature_hash: class.feature_hash.clone(),
            shape: class.shape,
            ontology,
            answers: StaticAnswers::default(),
            dynamic_answers: DynamicAnswers::default(),
            frames: BTreeMap::new(),
            binding: Binding::Detached,
        }
    }

    pub fn hash(&self) -> &EntityHash {
        &self.hash
    }

    /// The ontology object class this is an instance of.
    pub fn feature_hash(&self) -> &FeatureHash {
        &self.feature_hash
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn class(&self) -> Result<&ObjectClass> {
        self.ontology
            .object(&self.feature_hash)
            .ok_or_else(|| LabelError::UnknownFeature(self.feature_hash.clone()))
    }

    pub fn binding(&self) -> &Binding {
        &self.binding
    }

    pub fn is_space_bound(&self) -> bool {
        self.binding.is_space_bound()
    }

    fn attribute(&self, attribute: &FeatureHash) -> Result<&Attribute> {
        self.class()?
            .attribute(attribute)
            .ok_or_else(|| LabelError::UnknownFeature(attribute.clone()))
    }

    fn ensure_detached(&self, message: &str) -> Result<()> {
        if self.binding.is_space_bound() {
            return Err(LabelError::binding(message));
        }
        Ok(())
    }

    /// Sets geometry and metadata on frames in the detached regime.
    ///
    /// Without a geometry, every frame must already carry one and only the
    /// metadata is updated. Objects with a range-based shape take their range
    /// as geometry. Frames that already carry data are only overwritten with
    /// [`OverlapStrategy::Replace`].
    pub fn set_for_frames(
        &mut self,
        frames: impl Into<Frames>,
        geometry: Option<Geometry>,
        options: PutOptions,
    ) -> Result<()> {
        self.ensure_detached(OBJECT_FRAMES_ON_SPACE)?;
        if self.binding == Binding::OnLabelRow {
            return Err(LabelError::binding(OBJECT_FRAMES_ON_LABEL_ROW));
        }
        let keys = keys_for(Some(self.shape), &frames.into())?;
        self.write_frames(&keys, geometry, &options)
    }

    /// Writes frame data on resolved keys. Nothing changes if the call fails.
    pub(crate) fn write_frames(
        &mut self,
        keys: &[FrameKey],
        geometry: Option<Geometry>,
        options: &PutOptions,
    ) -> Result<()> {
        if let Some(geometry) = &geometry {
            if !geometry.fits_shape(self.shape) {
                return Err(LabelError::malformed(format!(
                    "a {} does not fit a {} object",
                    geometry.kind_name(),
                    self.shape
                )));
            }
        }
        if geometry.is_none() && !self.shape.is_range_based() {
            if let Some(missing) = keys.iter().find(|k| !self.frames.contains_key(*k)) {
                return Err(LabelError::malformed(format!(
                    "frame {missing} has no geometry yet; pass a geometry to set it"
                )));
            }
        }
        if options.on_overlap == OverlapStrategy::Error {
            if let Some(existing) = self
                .frames
                .keys()
                .find(|existing| keys.iter().any(|k| k.overlaps(existing)))
            {
                return Err(LabelError::OverlapConflict(format!(
                    "Cannot overwrite existing data of object '{}' at {existing}. \
                     Use OverlapStrategy::Replace to overwrite it.",
                    self.hash
                )));
            }
        }
        for &key in keys {
            let geometry = match (key, &geometry) {
                (FrameKey::Range(r), _) => {
                    self.carve_range(r);
                    Some(Geometry::Range(r))
                }
                (FrameKey::Frame(_), g) => g.clone(),
            };
            match self.frames.get_mut(&key) {
                Some(existing) => {
                    if let Some(geometry) = geometry {
                        existing.geometry = geometry;
                    }
                    existing.metadata.apply(&options.metadata);
                }
                None => {
                    if let Some(geometry) = geometry {
                        self.frames.insert(
                            key,
                            FrameData {
                                geometry,
                                metadata: AnnotationMetadata::from_update(&options.metadata),
                            },
                        );
                    }
                }
            }
        }
        Ok(())
    }

    /// Trims other stored ranges that overlap `cut`, keeping the parts outside it.
    fn carve_range(&mut self, cut: Range) {
        let cut_key = FrameKey::Range(cut);
        let overlapping: Vec<FrameKey> = self
            .frames
            .keys()
            .copied()
            .filter(|k| *k != cut_key && k.overlaps(&cut_key))
            .collect();
        for key in overlapping {
            let (Some(data), FrameKey::Range(existing)) = (self.frames.remove(&key), key) else {
                continue;
            };
            for piece in existing.subtract(&cut) {
                self.frames.insert(
                    FrameKey::Range(piece),
                    FrameData {
                        geometry: Geometry::Range(piece),
                        metadata: data.metadata.clone(),
                    },
                );
            }
        }
    }

    /// Removes detached frame data, together with dynamic answers on those frames.
    pub fn remove_from_frames(&mut self, frames: impl Into<Frames>) -> Result<()> {
        self.ensure_detached(OBJECT_FRAMES_ON_SPACE)?;
        let keys = keys_for(Some(self.shape), &frames.into())?;
        for key in &keys {
            self.frames.remove(key);
        }
        let removed: Vec<u32> = keys.iter().filter_map(FrameKey::frame).collect();
        self.dynamic_answers.remove_frames(&removed);
        Ok(())
    }

    pub fn get_annotation(&self, key: impl Into<FrameKey>) -> Result<Option<&FrameData>> {
        self.ensure_detached(OBJECT_READ_ON_SPACE)?;
        Ok(self.frames.get(&key.into()))
    }

    pub fn get_annotation_frames(&self) -> Result<Vec<FrameKey>> {
        self.ensure_detached(OBJECT_READ_ON_SPACE)?;
        Ok(self.frames.keys().copied().collect())
    }

    pub fn get_annotations(&self) -> Result<Vec<(FrameKey, &FrameData)>> {
        self.ensure_detached(OBJECT_READ_ON_SPACE)?;
        Ok(self.frames.iter().map(|(k, d)| (*k, d)).collect())
    }

    /// Returns true if the detached per-frame setter has stored anything.
    pub fn has_frame_data(&self) -> bool {
        !self.frames.is_empty()
    }

    pub fn has_dynamic_answers(&self) -> bool {
        !self.dynamic_answers.is_empty()
    }

    /// Sets a static answer, visible from every space the object is on.
    pub fn set_answer(&mut self, attribute: &FeatureHash, value: impl Into<AnswerValue>) -> Result<()> {
        self.set_answer_manual(attribute, value, true)
    }

    pub fn set_answer_manual(
        &mut self,
        attribute: &FeatureHash,
        value: impl Into<AnswerValue>,
        manual_annotation: bool,
    ) -> Result<()> {
        let attribute = self.attribute(attribute)?.clone();
        self.answers.set(&attribute, value.into(), manual_annotation)
    }

    pub fn get_answer(&self, attribute: &FeatureHash) -> Option<&AnswerValue> {
        self.answers.get(attribute).map(|a| &a.value)
    }

    pub fn answer(&self, attribute: &FeatureHash) -> Option<&Answer> {
        self.answers.get(attribute)
    }

    pub fn delete_answer(&mut self, attribute: &FeatureHash) -> Option<Answer> {
        self.answers.remove(attribute)
    }

    pub fn answers(&self) -> impl Iterator<Item = (&FeatureHash, &Answer)> {
        self.answers.iter()
    }

    /// Sets a per-frame answer in the detached regime.
    pub fn set_dynamic_answer(
        &mut self,
        attribute: &FeatureHash,
        value: impl Into<AnswerValue>,
        frames: impl Into<Frames>,
    ) -> Result<()> {
        self.ensure_detached(OBJECT_DYNAMIC_ON_SPACE)?;
        let attribute = self.attribute(attribute)?.clone();
        let frames = frames.into().to_frame_indices();
        if frames.is_empty() {
            return Err(LabelError::malformed("no frames given"));
        }
        self.dynamic_answers.set(&attribute, value.into(), frames, true)
    }

    /// Returns the per-frame answers grouped by value.
    pub fn get_dynamic_answers(&self, attribute: &FeatureHash) -> Result<Vec<FrameAnswer>> {
        self.ensure_detached(OBJECT_DYNAMIC_ON_SPACE)?;
        self.attribute(attribute)?;
        Ok(self.dynamic_answers.get(attribute, None))
    }

    pub fn delete_dynamic_answer(&mut self, attribute: &FeatureHash, frame: u32) -> Result<()> {
        self.ensure_detached(OBJECT_DYNAMIC_ON_SPACE)?;
        self.attribute(attribute)?;
        self.dynamic_answers.remove(attribute, frame);
        Ok(())
    }

    pub(crate) fn binding_mut(&mut self) -> &mut Binding {
        &mut self.binding
    }

    pub(crate) fn frames(&self) -> &BTreeMap<FrameKey, FrameData> {
        &self.frames
    }

    pub(crate) fn insert_frame(&mut self, key: FrameKey, data: FrameData) {
        self.frames.insert(key, data);
    }

    pub(crate) fn dynamic_answers(&self) -> &DynamicAnswers {
        &self.dynamic_answers
    }

    pub(crate) fn dynamic_answers_mut(&mut self) -> &mut DynamicAnswers {
        &mut self.dynamic_answers
    }

    pub(crate) fn take_dynamic_answers(&mut self) -> DynamicAnswers {
        std::mem::take(&mut self.dynamic_answers)
    }

    pub(crate) fn static_answers_mut(&mut self) -> &mut StaticAnswers {
        &mut self.answers
    }
}

/// An instance of an ontology classification.
#[derive(Clone, Debug)]
pub struct ClassificationInstance {
    hash: EntityHash,
    ontology: Arc<Ontology>,
    feature_hash: FeatureHash,
    answers: StaticAnswers,
    frames: BTreeMap<FrameKey, AnnotationMetadata>,
    binding: Binding,
}

impl ClassificationInstance {
    pub(crate) fn new(hash: EntityHash, ontology: Arc<Ontology>, class: &ClassificationClass) -> Self {
        Self {
            hash,
            feature_hash: class.feature_hash.clone(),
            ontology,
            answers: StaticAnswers::default(),
            frames: BTreeMap::new(),
            binding: Binding::Detached,
        }
    }

    pub fn hash(&self) -> &EntityHash {
        &self.hash
    }

    pub fn feature_hash(&self) -> &FeatureHash {
        &self.feature_hash
    }

    pub fn class(&self) -> Result<&ClassificationClass> {
        self.ontology
            .classification(&self.feature_hash)
            .ok_or_else(|| LabelError::UnknownFeature(self.feature_hash.clone()))
    }

    pub fn binding(&self) -> &Binding {
        &self.binding
    }

    pub fn is_space_bound(&self) -> bool {
        self.binding.is_space_bound()
    }

    fn ensure_detached(&self, message: &str) -> Result<()> {
        if self.binding.is_space_bound() {
            return Err(LabelError::binding(message));
        }
        Ok(())
    }

    /// Marks the classification as present on frames in the detached regime.
    ///
    /// Frames it is already on are only updated with
    /// [`OverlapStrategy::Replace`].
    pub fn set_for_frames(&mut self, frames: impl Into<Frames>, options: PutOptions) -> Result<()> {
        self.ensure_detached(CLASSIFICATION_FRAMES_ON_SPACE)?;
        if self.binding == Binding::OnLabelRow {
            return Err(LabelError::binding(CLASSIFICATION_FRAMES_ON_LABEL_ROW));
        }
        let keys = keys_for(None, &frames.into())?;
        self.write_frames(&keys, &options)
    }

    pub(crate) fn write_frames(&mut self, keys: &[FrameKey], options: &PutOptions) -> Result<()> {
        if options.on_overlap == OverlapStrategy::Error {
            if let Some(existing) = keys.iter().find(|k| self.frames.contains_key(*k)) {
                return Err(LabelError::OverlapConflict(format!(
                    "Cannot overwrite existing data of classification '{}' at {existing}. \
                     Use OverlapStrategy::Replace to overwrite it.",
                    self.hash
                )));
            }
        }
        for key in keys {
            self.frames
                .entry(*key)
                .and_modify(|existing| existing.apply(&options.metadata))
                .or_insert_with(|| AnnotationMetadata::from_update(&options.metadata));
        }
        Ok(())
    }

    /// Drops the frames overlapping `key`, whatever the binding.
    pub(crate) fn cut_frames(&mut self, key: &FrameKey) {
        self.frames.retain(|existing, _| !existing.overlaps(key));
    }

    pub fn remove_from_frames(&mut self, frames: impl Into<Frames>) -> Result<()> {
        self.ensure_detached(CLASSIFICATION_FRAMES_ON_SPACE)?;
        for key in keys_for(None, &frames.into())? {
            self.frames.remove(&key);
        }
        Ok(())
    }

    pub fn get_annotation(&self, key: impl Into<FrameKey>) -> Result<Option<&AnnotationMetadata>> {
        self.ensure_detached(CLASSIFICATION_READ_ON_SPACE)?;
        Ok(self.frames.get(&key.into()))
    }

    pub fn get_annotation_frames(&self) -> Result<Vec<FrameKey>> {
        self.ensure_detached(CLASSIFICATION_READ_ON_SPACE)?;
        Ok(self.frames.keys().copied().collect())
    }

    pub fn get_annotations(&self) -> Result<Vec<(FrameKey, &AnnotationMetadata)>> {
        self.ensure_detached(CLASSIFICATION_READ_ON_SPACE)?;
        Ok(self.frames.iter().map(|(k, m)| (*k, m)).collect())
    }

    pub fn has_frame_data(&self) -> bool {
        !self.frames.is_empty()
    }

    pub fn set_answer(&mut self, attribute: &FeatureHash, value: impl Into<AnswerValue>) -> Result<()> {
        self.set_answer_manual(attribute, value, true)
    }

    pub fn set_answer_manual(
        &mut self,
        attribute: &FeatureHash,
        value: impl Into<AnswerValue>,
        manual_annotation: bool,
    ) -> Result<()> {
        let attribute = self
            .class()?
            .attribute(attribute)
            .ok_or_else(|| LabelError::UnknownFeature(attribute.clone()))?
            .clone();
        self.answers.set(&attribute, value.into(), manual_annotation)
    }

    pub fn get_answer(&self, attribute: &FeatureHash) -> Option<&AnswerValue> {
        self.answers.get(attribute).map(|a| &a.value)
    }

    pub fn answer(&self, attribute: &FeatureHash) -> Option<&Answer> {
        self.answers.get(attribute)
    }

    pub fn delete_answer(&mut self, attribute: &FeatureHash) -> Option<Answer> {
        self.answers.remove(attribute)
    }

    pub fn answers(&self) -> impl Iterator<Item = (&FeatureHash, &Answer)> {
        self.answers.iter()
    }

    pub(crate) fn binding_mut(&mut self) -> &mut Binding {
        &mut self.binding
    }

    pub(crate) fn frames(&self) -> &BTreeMap<FrameKey, AnnotationMetadata> {
        &self.frames
    }

    pub(crate) fn insert_frame(&mut self, key: FrameKey, metadata: AnnotationMetadata) {
        self.frames.insert(key, metadata);
    }

    pub(crate) fn static_answers_mut(&mut self) -> &mut StaticAnswers {
        &mut self.answers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::MetadataUpdate;
    use crate::frames::Range;
    use crate::geometry::{BoundingBox, Coord};
    use crate::ontology::{AttributeOption, AttributeType};

    fn ontology() -> Arc<Ontology> {
        Arc::new(Ontology {
            objects: vec![
                ObjectClass {
                    name: "Car".into(),
                    color: None,
                    shape: Shape::BoundingBox,
                    feature_hash: "obj-car".into(),
                    attributes: vec![
                        Attribute {
                            name: "Plate".into(),
                            kind: AttributeType::Text,
                            feature_hash: "attr-plate".into(),
                            required: false,
                            dynamic: false,
                            options: vec![],
                        },
                        Attribute {
                            name: "Moving".into(),
                            kind: AttributeType::Radio,
                            feature_hash: "attr-moving".into(),
                            required: false,
                            dynamic: true,
                            options: vec![AttributeOption {
                                label: "Yes".into(),
                                value: None,
                                feature_hash: "opt-yes".into(),
                                nested: vec![],
                            }],
                        },
                    ],
                },
                ObjectClass {
                    name: "Speech".into(),
                    color: None,
                    shape: Shape::Audio,
                    feature_hash: "obj-speech".into(),
                    attributes: vec![],
                },
            ],
            classifications: vec![],
        })
    }

    fn car() -> ObjectInstance {
        let ontology = ontology();
        let class = ontology.objects[0].clone();
        ObjectInstance::new(EntityHash::new("car-1"), ontology, &class)
    }

    fn bbox() -> Geometry {
        BoundingBox::from_xywh(0.1, 0.1, 0.2, 0.2).into()
    }

    #[test]
    fn test_set_for_frames_and_read_back() {
        let mut car = car();
        car.set_for_frames([0u32, 1, 2], Some(bbox()), PutOptions::default())
            .unwrap();
        assert_eq!(
            car.get_annotation_frames().unwrap(),
            vec![FrameKey::Frame(0), FrameKey::Frame(1), FrameKey::Frame(2)]
        );
        car.set_for_frames(
            1u32,
            None,
            PutOptions::replace().with_metadata(MetadataUpdate::default().confidence(0.3)),
        )
            .unwrap();
        assert_eq!(car.get_annotation(1u32).unwrap().unwrap().metadata.confidence, 0.3);
    }

    #[test]
    fn test_existing_frames_need_replace() {
        let mut car = car();
        car.set_for_frames([0u32, 1], Some(bbox()), PutOptions::default())
            .unwrap();
        let moved: Geometry = BoundingBox::from_xywh(0.5, 0.5, 0.1, 0.1).into();
        let err = car
            .set_for_frames([1u32, 2], Some(moved.clone()), PutOptions::default())
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::OverlapConflict);
        assert!(err.to_string().contains("OverlapStrategy::Replace"));
        assert_eq!(car.get_annotation_frames().unwrap().len(), 2);

        car.set_for_frames([1u32, 2], Some(moved.clone()), PutOptions::replace())
            .unwrap();
        assert_eq!(car.get_annotation(1u32).unwrap().unwrap().geometry, moved);
        assert_eq!(car.get_annotation(0u32).unwrap().unwrap().geometry, bbox());
    }

    #[test]
    fn test_replace_trims_overlapping_ranges() {
        let ontology = ontology();
        let class = ontology.objects[1].clone();
        let mut speech = ObjectInstance::new(EntityHash::new("s-2"), ontology, &class);
        speech
            .set_for_frames(Range::new(0, 100), None, PutOptions::default())
            .unwrap();
        assert_eq!(
            speech
                .set_for_frames(Range::new(50, 150), None, PutOptions::default())
                .unwrap_err()
                .kind(),
            crate::ErrorKind::OverlapConflict
        );
        speech
            .set_for_frames(Range::new(50, 150), None, PutOptions::replace())
            .unwrap();
        assert_eq!(
            speech.get_annotation_frames().unwrap(),
            vec![
                FrameKey::Range(Range::new(0, 50)),
                FrameKey::Range(Range::new(50, 150))
            ]
        );
    }

    #[test]
    fn test_attached_object_refuses_entity_setter() {
        let mut car = car();
        car.set_for_frames(0u32, Some(bbox()), PutOptions::default())
            .unwrap();
        *car.binding_mut() = Binding::OnLabelRow;
        let err = car
            .set_for_frames(1u32, Some(bbox()), PutOptions::default())
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::BindingConflict);
        assert!(err.to_string().contains("LabelRow::set_object_frames"));
        assert_eq!(car.get_annotation_frames().unwrap(), vec![FrameKey::Frame(0)]);
    }

    #[test]
    fn test_metadata_only_update_needs_existing_frame() {
        let mut car = car();
        let err = car
            .set_for_frames(4u32, None, PutOptions::default())
            .unwrap_err();
        assert!(err.to_string().contains("no geometry"));
    }

    #[test]
    fn test_wrong_geometry_rejected() {
        let mut car = car();
        let err = car
            .set_for_frames(0u32, Some(Coord::new(0.5, 0.5).into()), PutOptions::default())
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::MalformedInput);
    }

    #[test]
    fn test_space_bound_refuses_frame_api() {
        let mut car = car();
        car.binding_mut().bind(&SpaceId::new("video"));
        let err = car
            .set_for_frames(0u32, Some(bbox()), PutOptions::default())
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::BindingConflict);
        assert!(err.to_string().contains("put_object_instance"));
        assert!(car.get_annotations().is_err());
        assert!(car
            .set_dynamic_answer(&"attr-moving".into(), AnswerValue::Radio("opt-yes".into()), 0u32)
            .is_err());

        // static answers stay legal
        car.set_answer(&"attr-plate".into(), "AB-123").unwrap();

        car.binding_mut().unbind(&SpaceId::new("video"));
        assert_eq!(car.binding(), &Binding::Detached);
        car.set_for_frames(0u32, Some(bbox()), PutOptions::default())
            .unwrap();
    }

    #[test]
    fn test_removing_frames_drops_dynamic_answers() {
        let mut car = car();
        car.set_for_frames([0u32, 1], Some(bbox()), PutOptions::default())
            .unwrap();
        car.set_dynamic_answer(&"attr-moving".into(), AnswerValue::Radio("opt-yes".into()), [0u32, 1])
            .unwrap();
        car.remove_from_frames(0u32).unwrap();
        let answers = car.get_dynamic_answers(&"attr-moving".into()).unwrap();
        assert_eq!(answers[0].ranges, vec![Range::new(1, 2)]);
    }

    #[test]
    fn test_range_shapes_take_ranges() {
        let ontology = ontology();
        let class = ontology.objects[1].clone();
        let mut speech = ObjectInstance::new(EntityHash::new("s-1"), ontology, &class);
        assert_eq!(
            speech
                .set_for_frames(3u32, None, PutOptions::default())
                .unwrap_err()
                .kind(),
            crate::ErrorKind::UnsupportedForSpace
        );
        speech
            .set_for_frames(Range::new(100, 250), None, PutOptions::default())
            .unwrap();
        let frames = speech.frames();
        assert_eq!(
            frames[&FrameKey::Range(Range::new(100, 250))].geometry,
            Geometry::Range(Range::new(100, 250))
        );
    }

    #[test]
    fn test_unknown_attribute_is_lookup_error() {
        let mut car = car();
        let err = car.set_answer(&"attr-nope".into(), "x").unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Lookup);
    }
}

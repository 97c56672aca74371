//! Borrowed views that pair a space with the label row's entity registry.

use std::collections::BTreeSet;

use super::{Space, SpaceKind};
use crate::annotation::{ClassificationAnnotation, ObjectAnnotation, OverlapStrategy, PutOptions};
use crate::entity::{
    AnswerValue, Binding, ClassificationInstance, EntityRegistry, FrameAnswer, ObjectInstance,
};
use crate::error::{LabelError, Result};
use crate::frames::{FrameKey, Frames, Range};
use crate::geometry::Geometry;
use crate::ids::{EntityHash, FeatureHash, SpaceId};

const OBJECT_NOT_ON_SPACE: &str = "This object does not exist on this space.";
const OBJECT_NOT_YET_ON_SPACE: &str = "Object does not yet exist on this space. \
     Place the object on this space with SpaceMut::put_object_instance.";
const OBJECT_HAS_FRAMES: &str = "Object instance contains frames data. \
     Ensure ObjectInstance::set_for_frames was not used before calling this method.";
const OBJECT_ON_LABEL_ROW: &str = "Object instance is attached to the label row. \
     Remove it with LabelRow::remove_object before placing it on a space.";
const CLASSIFICATION_NOT_ON_SPACE: &str = "This classification does not exist on this space.";
const CLASSIFICATION_HAS_FRAMES: &str = "Classification instance contains frames data. \
     Ensure ClassificationInstance::set_for_frames was not used before calling this method.";
const CLASSIFICATION_ON_LABEL_ROW: &str = "Classification instance is attached to the label row. \
     Remove it with LabelRow::remove_classification before placing it on a space.";

/// Read access to one space.
#[derive(Clone, Copy, Debug)]
pub struct SpaceRef<'a> {
    space: &'a Space,
    registry: &'a EntityRegistry,
}

impl<'a> SpaceRef<'a> {
    pub(crate) fn new(space: &'a Space, registry: &'a EntityRegistry) -> Self {
        Self { space, registry }
    }

    pub fn space(&self) -> &'a Space {
        self.space
    }

    pub fn id(&self) -> &'a SpaceId {
        self.space.id()
    }

    pub fn kind(&self) -> &'a SpaceKind {
        self.space.kind()
    }

    /// Objects placed on this space, in placement order.
    pub fn get_object_instances(&self) -> Vec<&'a ObjectInstance> {
        self.space
            .object_hashes()
            .iter()
            .filter_map(|h| self.registry.object(h).ok())
            .collect()
    }

    pub fn get_classification_instances(&self) -> Vec<&'a ClassificationInstance> {
        self.space
            .classification_hashes()
            .iter()
            .filter_map(|h| self.registry.classification(h).ok())
            .collect()
    }

    pub fn get_object_instance_annotations(&self, filter: Option<&[EntityHash]>) -> Vec<&'a ObjectAnnotation> {
        self.space.get_object_instance_annotations(filter)
    }

    pub fn get_classification_instance_annotations(
        &self,
        filter: Option<&[EntityHash]>,
    ) -> Vec<&'a ClassificationAnnotation> {
        self.space.get_classification_instance_annotations(filter)
    }

    /// Per-frame answers of an object on this space, grouped by value.
    ///
    /// With `frames` given, only those frames are reported.
    pub fn get_answer_on_frames(
        &self,
        entity: &EntityHash,
        attribute: &FeatureHash,
        frames: Option<Frames>,
    ) -> Result<Vec<FrameAnswer>> {
        let kind = self.space.kind();
        ensure_dynamic_supported(kind)?;
        let object = self.registry.object(entity)?;
        if !self.space.objects.contains_entity(entity) {
            return Err(LabelError::binding(OBJECT_NOT_ON_SPACE));
        }
        object
            .class()?
            .attribute(attribute)
            .ok_or_else(|| LabelError::UnknownFeature(attribute.clone()))?;
        let frames = match frames {
            Some(frames) => Some(frame_indices(kind, &frames)?),
            None => None,
        };
        Ok(self
            .space
            .dynamic_answers_of(entity)
            .map(|answers| answers.get(attribute, frames.as_deref()))
            .unwrap_or_default())
    }
}

fn ensure_dynamic_supported(kind: &SpaceKind) -> Result<()> {
    if kind.supports_dynamic_answers() {
        Ok(())
    } else {
        Err(LabelError::unsupported(format!(
            "Dynamic attributes are not supported on {} spaces.",
            kind.type_name()
        )))
    }
}

fn frame_indices(kind: &SpaceKind, frames: &Frames) -> Result<Vec<u32>> {
    Ok(kind
        .resolve_keys(frames)?
        .iter()
        .filter_map(FrameKey::frame)
        .collect())
}

/// Write access to one space.
///
/// Every mutation checks the label row's initialisation gate first and
/// validates the whole request before touching the index, so a rejected call
/// leaves the space unchanged.
#[derive(Debug)]
pub struct SpaceMut<'a> {
    space: &'a mut Space,
    registry: &'a mut EntityRegistry,
    /// Classifications kept on the label row; only set for the root space.
    row_classifications: &'a [EntityHash],
    initialised: bool,
}

impl<'a> SpaceMut<'a> {
    pub(crate) fn new(
        space: &'a mut Space,
        registry: &'a mut EntityRegistry,
        row_classifications: &'a [EntityHash],
        initialised: bool,
    ) -> Self {
        Self {
            space,
            registry,
            row_classifications,
            initialised,
        }
    }

    /// Read-only view of the same space.
    pub fn view(&self) -> SpaceRef<'_> {
        SpaceRef::new(self.space, self.registry)
    }

    pub fn id(&self) -> &SpaceId {
        self.space.id()
    }

    pub fn kind(&self) -> &SpaceKind {
        self.space.kind()
    }

    pub fn get_object_instances(&self) -> Vec<&ObjectInstance> {
        self.view().get_object_instances()
    }

    pub fn get_object_instance_annotations(&self, filter: Option<&[EntityHash]>) -> Vec<&ObjectAnnotation> {
        self.space.get_object_instance_annotations(filter)
    }

    pub fn get_classification_instances(&self) -> Vec<&ClassificationInstance> {
        self.view().get_classification_instances()
    }

    pub fn get_classification_instance_annotations(
        &self,
        filter: Option<&[EntityHash]>,
    ) -> Vec<&ClassificationAnnotation> {
        self.space.get_classification_instance_annotations(filter)
    }

    fn ensure_initialised(&self) -> Result<()> {
        if self.initialised {
            Ok(())
        } else {
            Err(LabelError::NotInitialised)
        }
    }

    /// Places an object on frames (or ranges) of this space.
    ///
    /// Frame-indexed spaces need a geometry that fits the object's shape.
    /// Range-indexed spaces take the range itself as geometry, so `geometry`
    /// must be `None` or a [`Geometry::Range`].
    pub fn put_object_instance(
        &mut self,
        entity: &EntityHash,
        frames: impl Into<Frames>,
        geometry: impl Into<Option<Geometry>>,
        options: PutOptions,
    ) -> Result<()> {
        self.ensure_initialised()?;
        let kind = *self.space.kind();
        let object = self.registry.object(entity)?;
        if matches!(object.binding(), Binding::OnLabelRow) {
            return Err(LabelError::binding(OBJECT_ON_LABEL_ROW));
        }
        if kind.is_range_based() {
            if object.has_frame_data() {
                return Err(LabelError::unsupported(format!(
                    "Object instance contains frames data. Frame data set with \
                     ObjectInstance::set_for_frames cannot be carried onto {} spaces; \
                     remove it before placing the object.",
                    kind.type_name()
                )));
            }
            if object.has_dynamic_answers() {
                return Err(LabelError::unsupported(format!(
                    "Object instance contains dynamic attributes. Dynamic attributes are not \
                     supported on {} spaces; remove them before placing the object.",
                    kind.type_name()
                )));
            }
        } else if object.has_frame_data() {
            return Err(LabelError::binding(OBJECT_HAS_FRAMES));
        }
        let shape = object.shape();
        kind.check_shape(shape)?;
        let keys = kind.resolve_keys(&frames.into())?;

        let template = match (kind.is_range_based(), geometry.into()) {
            (true, None | Some(Geometry::Range(_))) => None,
            (true, Some(other)) => {
                return Err(LabelError::unsupported(format!(
                    "{} spaces take their range as geometry; a {} cannot be placed",
                    kind.type_name(),
                    other.kind_name()
                )))
            }
            (false, Some(geometry)) if geometry.fits_shape(shape) => Some(geometry),
            (false, Some(geometry)) => {
                return Err(LabelError::malformed(format!(
                    "a {} does not fit a {shape} object",
                    geometry.kind_name()
                )))
            }
            (false, None) => {
                return Err(LabelError::malformed(
                    "a geometry is required to place an object on a frame",
                ))
            }
        };

        if options.on_overlap == OverlapStrategy::Error {
            if let Some(key) = keys
                .iter()
                .find(|k| !self.space.objects.overlapping(entity, **k).is_empty())
            {
                return Err(LabelError::OverlapConflict(format!(
                    "Object '{entity}' already has an annotation at {key} on space '{}'. \
                     Use OverlapStrategy::Replace to overwrite it.",
                    self.space.id()
                )));
            }
        }

        let space_id = self.space.id().clone();
        let annotations = keys
            .iter()
            .map(|key| {
                let geometry = match (key, &template) {
                    (FrameKey::Range(range), _) => Geometry::Range(*range),
                    (FrameKey::Frame(_), Some(geometry)) => geometry.clone(),
                    (FrameKey::Frame(frame), None) => {
                        return Err(LabelError::malformed(format!(
                            "no geometry for frame {frame}"
                        )))
                    }
                };
                Ok(ObjectAnnotation::new(
                    entity.clone(),
                    space_id.clone(),
                    *key,
                    geometry,
                    crate::annotation::AnnotationMetadata::from_update(&options.metadata),
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        for annotation in annotations {
            self.space.objects.carve(entity, annotation.key());
            self.space.objects.insert(annotation);
        }

        let object = self.registry.object_mut(entity)?;
        object.binding_mut().bind(&space_id);
        if kind.supports_dynamic_answers() && object.has_dynamic_answers() {
            let mut moved = object.take_dynamic_answers();
            let annotated: BTreeSet<u32> = self
                .space
                .objects
                .keys_of(entity)
                .filter_map(|k| k.frame())
                .collect();
            moved.retain_frames(|frame| annotated.contains(&frame));
            if !moved.is_empty() {
                self.space
                    .dynamic_answers
                    .entry(entity.clone())
                    .or_default()
                    .merge(moved);
            }
        }
        tracing::debug!(
            space = %space_id,
            entity = %entity,
            annotations = keys.len(),
            "placed object instance"
        );
        Ok(())
    }

    /// Removes every annotation of an object from this space.
    pub fn remove_object_instance(&mut self, entity: &EntityHash) -> Result<Vec<ObjectAnnotation>> {
        self.ensure_initialised()?;
        self.registry.object(entity)?;
        let removed = self.space.objects.remove_entity(entity);
        if removed.is_empty() {
            return Err(LabelError::binding(OBJECT_NOT_ON_SPACE));
        }
        self.release_object(entity)?;
        tracing::debug!(space = %self.space.id(), entity = %entity, "removed object instance");
        Ok(removed)
    }

    /// Removes an object from some frames (or cuts ranges out of its ranges).
    ///
    /// Dynamic answers on the removed frames go with them.
    pub fn remove_object_instance_from_frames(
        &mut self,
        entity: &EntityHash,
        frames: impl Into<Frames>,
    ) -> Result<Vec<ObjectAnnotation>> {
        self.ensure_initialised()?;
        self.registry.object(entity)?;
        if !self.space.objects.contains_entity(entity) {
            return Err(LabelError::binding(OBJECT_NOT_ON_SPACE));
        }
        let keys = self.space.kind().resolve_keys(&frames.into())?;
        let mut removed = Vec::new();
        for key in &keys {
            removed.extend(self.space.objects.carve(entity, *key));
        }
        let frames: Vec<u32> = keys.iter().filter_map(FrameKey::frame).collect();
        if let Some(answers) = self.space.dynamic_answers.get_mut(entity) {
            answers.remove_frames(&frames);
        }
        if !self.space.objects.contains_entity(entity) {
            self.release_object(entity)?;
        }
        tracing::debug!(
            space = %self.space.id(),
            entity = %entity,
            removed = removed.len(),
            "removed object instance from frames"
        );
        Ok(removed)
    }

    /// Cuts a range out of an object's annotations on a range-indexed space.
    pub fn remove_object_instance_from_range(
        &mut self,
        entity: &EntityHash,
        range: Range,
    ) -> Result<Vec<ObjectAnnotation>> {
        self.remove_object_instance_from_frames(entity, range)
    }

    /// Unbinds an object that no longer has annotations here.
    fn release_object(&mut self, entity: &EntityHash) -> Result<()> {
        self.space.dynamic_answers.remove(entity);
        let space_id = self.space.id().clone();
        self.registry
            .object_mut(entity)?
            .binding_mut()
            .unbind(&space_id);
        Ok(())
    }

    /// Mutable access to one annotation's geometry and metadata.
    pub fn object_annotation_mut(
        &mut self,
        entity: &EntityHash,
        key: impl Into<FrameKey>,
    ) -> Result<&mut ObjectAnnotation> {
        self.ensure_initialised()?;
        let key = key.into();
        self.space.objects.get_mut(entity, key).ok_or_else(|| {
            LabelError::binding(format!(
                "Object '{entity}' has no annotation at {key} on this space."
            ))
        })
    }

    /// Sets a dynamic answer on frames of this space.
    ///
    /// Frames where the object has no annotation are skipped.
    pub fn set_answer_on_frames(
        &mut self,
        entity: &EntityHash,
        attribute: &FeatureHash,
        value: impl Into<AnswerValue>,
        frames: impl Into<Frames>,
    ) -> Result<()> {
        self.ensure_initialised()?;
        let kind = *self.space.kind();
        ensure_dynamic_supported(&kind)?;
        let object = self.registry.object(entity)?;
        if !self.space.objects.contains_entity(entity) {
            return Err(LabelError::binding(OBJECT_NOT_YET_ON_SPACE));
        }
        let attribute = object
            .class()?
            .attribute(attribute)
            .ok_or_else(|| LabelError::UnknownFeature(attribute.clone()))?
            .clone();
        let annotated: BTreeSet<u32> = self
            .space
            .objects
            .keys_of(entity)
            .filter_map(|k| k.frame())
            .collect();
        let frames: Vec<u32> = frame_indices(&kind, &frames.into())?
            .into_iter()
            .filter(|f| annotated.contains(f))
            .collect();
        let mut answers = self.space.dynamic_answers.remove(entity).unwrap_or_default();
        let result = answers.set(&attribute, value.into(), frames, true);
        if !answers.is_empty() {
            self.space.dynamic_answers.insert(entity.clone(), answers);
        }
        result
    }

    pub fn get_answer_on_frames(
        &self,
        entity: &EntityHash,
        attribute: &FeatureHash,
        frames: Option<Frames>,
    ) -> Result<Vec<FrameAnswer>> {
        self.view().get_answer_on_frames(entity, attribute, frames)
    }

    pub fn remove_answer_from_frame(
        &mut self,
        entity: &EntityHash,
        attribute: &FeatureHash,
        frame: u32,
    ) -> Result<()> {
        self.ensure_initialised()?;
        ensure_dynamic_supported(self.space.kind())?;
        let object = self.registry.object(entity)?;
        if !self.space.objects.contains_entity(entity) {
            return Err(LabelError::binding(OBJECT_NOT_ON_SPACE));
        }
        object
            .class()?
            .attribute(attribute)
            .ok_or_else(|| LabelError::UnknownFeature(attribute.clone()))?;
        if let Some(answers) = self.space.dynamic_answers.get_mut(entity) {
            answers.remove(attribute, frame);
            if answers.is_empty() {
                self.space.dynamic_answers.remove(entity);
            }
        }
        Ok(())
    }

    /// Places a classification on frames (or ranges) of this space.
    ///
    /// Only one instance of an ontology classification may exist per frame;
    /// with [`OverlapStrategy::Replace`] the other instance is cut away.
    pub fn put_classification_instance(
        &mut self,
        entity: &EntityHash,
        frames: impl Into<Frames>,
        options: PutOptions,
    ) -> Result<()> {
        self.ensure_initialised()?;
        let kind = *self.space.kind();
        let classification = self.registry.classification(entity)?;
        if matches!(classification.binding(), Binding::OnLabelRow) {
            return Err(LabelError::binding(CLASSIFICATION_ON_LABEL_ROW));
        }
        if classification.has_frame_data() {
            return Err(if kind.is_range_based() {
                LabelError::unsupported(CLASSIFICATION_HAS_FRAMES)
            } else {
                LabelError::binding(CLASSIFICATION_HAS_FRAMES)
            });
        }
        let feature = classification.feature_hash().clone();
        let keys = kind.resolve_keys(&frames.into())?;

        let mut conflicts: Vec<(EntityHash, FrameKey)> = Vec::new();
        for key in &keys {
            for own in self.space.classifications.overlapping(entity, *key) {
                conflicts.push((entity.clone(), own));
            }
            for (existing_key, annotations) in self.space.classifications.iter_by_key() {
                if !existing_key.overlaps(key) {
                    continue;
                }
                conflicts.extend(
                    annotations
                        .iter()
                        .filter(|a| a.feature_hash() == &feature && a.entity() != entity)
                        .map(|a| (a.entity().clone(), existing_key)),
                );
            }
            for other in self.row_classifications.iter().filter(|h| *h != entity) {
                let other = self.registry.classification(other)?;
                if other.feature_hash() != &feature {
                    continue;
                }
                conflicts.extend(
                    other
                        .frames()
                        .keys()
                        .filter(|existing| existing.overlaps(key))
                        .map(|existing| (other.hash().clone(), *existing)),
                );
            }
        }
        if options.on_overlap == OverlapStrategy::Error {
            if let Some((other, key)) = conflicts.first() {
                return Err(LabelError::OverlapConflict(format!(
                    "Classification '{feature}' already exists at {key} on space '{}' \
                     (instance '{other}'). Only one instance of a classification may exist \
                     per frame. Use OverlapStrategy::Replace to overwrite it.",
                    self.space.id()
                )));
            }
        }

        let space_id = self.space.id().clone();
        for key in &keys {
            let others: BTreeSet<EntityHash> = conflicts
                .iter()
                .filter(|(other, existing)| other != entity && existing.overlaps(key))
                .map(|(other, _)| other.clone())
                .collect();
            for other in others {
                if self.row_classifications.contains(&other) {
                    self.registry.classification_mut(&other)?.cut_frames(key);
                    continue;
                }
                self.space.classifications.carve(&other, *key);
                if !self.space.classifications.contains_entity(&other) {
                    self.registry
                        .classification_mut(&other)?
                        .binding_mut()
                        .unbind(&space_id);
                }
            }
            self.space.classifications.carve(entity, *key);
            self.space.classifications.insert(ClassificationAnnotation::new(
                entity.clone(),
                space_id.clone(),
                *key,
                feature.clone(),
                crate::annotation::AnnotationMetadata::from_update(&options.metadata),
            ));
        }
        self.registry
            .classification_mut(entity)?
            .binding_mut()
            .bind(&space_id);
        tracing::debug!(
            space = %space_id,
            entity = %entity,
            annotations = keys.len(),
            "placed classification instance"
        );
        Ok(())
    }

    pub fn remove_classification_instance(
        &mut self,
        entity: &EntityHash,
    ) -> Result<Vec<ClassificationAnnotation>> {
        self.ensure_initialised()?;
        self.registry.classification(entity)?;
        let removed = self.space.classifications.remove_entity(entity);
        if removed.is_empty() {
            return Err(LabelError::binding(CLASSIFICATION_NOT_ON_SPACE));
        }
        let space_id = self.space.id().clone();
        self.registry
            .classification_mut(entity)?
            .binding_mut()
            .unbind(&space_id);
        tracing::debug!(space = %space_id, entity = %entity, "removed classification instance");
        Ok(removed)
    }

    pub fn remove_classification_instance_from_frames(
        &mut self,
        entity: &EntityHash,
        frames: impl Into<Frames>,
    ) -> Result<Vec<ClassificationAnnotation>> {
        self.ensure_initialised()?;
        self.registry.classification(entity)?;
        if !self.space.classifications.contains_entity(entity) {
            return Err(LabelError::binding(CLASSIFICATION_NOT_ON_SPACE));
        }
        let keys = self.space.kind().resolve_keys(&frames.into())?;
        let mut removed = Vec::new();
        for key in &keys {
            removed.extend(self.space.classifications.carve(entity, *key));
        }
        if !self.space.classifications.contains_entity(entity) {
            let space_id = self.space.id().clone();
            self.registry
                .classification_mut(entity)?
                .binding_mut()
                .unbind(&space_id);
        }
        Ok(removed)
    }

    pub fn classification_annotation_mut(
        &mut self,
        entity: &EntityHash,
        key: impl Into<FrameKey>,
    ) -> Result<&mut ClassificationAnnotation> {
        self.ensure_initialised()?;
        let key = key.into();
        self.space.classifications.get_mut(entity, key).ok_or_else(|| {
            LabelError::binding(format!(
                "Classification '{entity}' has no annotation at {key} on this space."
            ))
        })
    }
}

//! The label row: aggregate root of one data unit's labels.
//!
//! A [`LabelRow`] owns the ontology reference, the [`EntityRegistry`] and every
//! [`Space`] of its data unit. Nothing can be read or edited until the row is
//! initialised, either from a fetched document or as an empty row.
//!
//! Two surfaces exist side by side:
//!
//! - the **label-row surface** (`add_object_instance`, `remove_object`, ...)
//!   for single-media data. Entities added here keep their frame data on
//!   themselves and show up under the root space when serialized;
//! - the **space surface** reached through [`LabelRow::space_mut`], where
//!   frame data lives in the space's index.

mod bundle;

pub use bundle::{Bundle, BundleOperation, BundleResults, LabelClient, MemoryClient};

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::annotation::{OverlapStrategy, PutOptions};
use crate::entity::{keys_for, Binding, ClassificationInstance, EntityRegistry, ObjectInstance};
use crate::error::{LabelError, Result};
use crate::frames::{FrameKey, Frames};
use crate::geometry::Geometry;
use crate::ids::{EntityHash, FeatureHash, SpaceId};
use crate::ontology::Ontology;
use crate::space::{MediaSize, Space, SpaceKind, SpaceMut, SpaceRef};

/// Review state of a label row.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LabelStatus {
    #[default]
    NotLabelled,
    LabelInProgress,
    Labelled,
    Reviewed,
    ReviewedTwice,
}

impl LabelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LabelStatus::NotLabelled => "NOT_LABELLED",
            LabelStatus::LabelInProgress => "LABEL_IN_PROGRESS",
            LabelStatus::Labelled => "LABELLED",
            LabelStatus::Reviewed => "REVIEWED",
            LabelStatus::ReviewedTwice => "REVIEWED_TWICE",
        }
    }
}

impl fmt::Display for LabelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Media type of the data unit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    #[default]
    Image,
    Video,
    Audio,
    PlainText,
    /// A data unit made of several spaces.
    Group,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Image => "image",
            DataType::Video => "video",
            DataType::Audio => "audio",
            DataType::PlainText => "plain_text",
            DataType::Group => "group",
        }
    }
}

/// Read-only facts about the data unit a label row annotates.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LabelRowMetadata {
    /// Unset for rows that have never been saved.
    pub label_hash: Option<String>,
    pub data_hash: String,
    pub data_title: String,
    pub data_type: DataType,
    pub label_status: LabelStatus,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub number_of_frames: Option<u32>,
}

impl LabelRowMetadata {
    pub fn media_size(&self) -> Option<MediaSize> {
        match (self.width, self.height) {
            (Some(width), Some(height)) => Some(MediaSize::new(width, height)),
            _ => None,
        }
    }

    pub(crate) fn root_kind(&self) -> SpaceKind {
        SpaceKind::Root {
            size: self.media_size(),
            number_of_frames: match self.data_type {
                DataType::Image => Some(1),
                _ => self.number_of_frames,
            },
        }
    }
}

/// All labels of one data unit.
#[derive(Debug)]
pub struct LabelRow {
    ontology: Arc<Ontology>,
    metadata: LabelRowMetadata,
    registry: EntityRegistry,
    spaces: BTreeMap<SpaceId, Space>,
    attached_objects: Vec<EntityHash>,
    attached_classifications: Vec<EntityHash>,
    initialised: bool,
}

impl LabelRow {
    /// Creates an uninitialised label row.
    pub fn new(ontology: Arc<Ontology>, metadata: LabelRowMetadata) -> Self {
        let root = Space::new(SpaceId::root(), metadata.root_kind());
        Self {
            ontology,
            metadata,
            registry: EntityRegistry::new(),
            spaces: BTreeMap::from([(SpaceId::root(), root)]),
            attached_objects: Vec::new(),
            attached_classifications: Vec::new(),
            initialised: false,
        }
    }

    /// Builds an initialised label row from a label document.
    pub fn from_wire_document(ontology: Arc<Ontology>, document: &Value) -> Result<Self> {
        crate::wire::decode(ontology, document)
    }

    /// Serializes every space and entity into a label document.
    ///
    /// Fails with [`LabelError::DimensionMismatch`] if a bitmask's extent
    /// differs from its media's pixel dimensions.
    pub fn to_wire_document(&self) -> Result<Value> {
        self.ensure_initialised()?;
        crate::wire::encode(self)
    }

    pub fn ontology(&self) -> &Arc<Ontology> {
        &self.ontology
    }

    pub fn metadata(&self) -> &LabelRowMetadata {
        &self.metadata
    }

    pub fn label_hash(&self) -> Option<&str> {
        self.metadata.label_hash.as_deref()
    }

    pub fn label_status(&self) -> LabelStatus {
        self.metadata.label_status
    }

    pub fn is_labelling_initialised(&self) -> bool {
        self.initialised
    }

    fn ensure_initialised(&self) -> Result<()> {
        if self.initialised {
            Ok(())
        } else {
            Err(LabelError::NotInitialised)
        }
    }

    fn ensure_can_initialise(&self, overwrite: bool) -> Result<()> {
        if self.initialised && !overwrite {
            Err(LabelError::AlreadyInitialised)
        } else {
            Ok(())
        }
    }

    fn required_label_hash(&self) -> Result<&str> {
        self.label_hash()
            .ok_or_else(|| LabelError::malformed("this label row has no label hash yet"))
    }

    /// Opens the gate on a row with no stored labels.
    pub fn initialise_empty(&mut self) -> Result<()> {
        self.ensure_can_initialise(false)?;
        self.initialised = true;
        tracing::debug!(data_hash = %self.metadata.data_hash, "initialised empty label row");
        Ok(())
    }

    /// Replaces the row's contents with a parsed label document.
    ///
    /// The document is parsed in full before anything is replaced, so a
    /// malformed document leaves the row as it was.
    pub fn initialise_from_wire(&mut self, document: &Value, overwrite: bool) -> Result<()> {
        self.ensure_can_initialise(overwrite)?;
        let ontology = Arc::clone(&self.ontology);
        *self = crate::wire::decode_with(ontology, document, Some(&self.metadata))?;
        Ok(())
    }

    /// Fetches this row's document through `client` and initialises from it.
    pub fn initialise_labels(&mut self, client: &dyn LabelClient, overwrite: bool) -> Result<()> {
        self.ensure_can_initialise(overwrite)?;
        let document = client.fetch_label_row(self.required_label_hash()?)?;
        self.initialise_from_wire(&document, overwrite)
    }

    /// Queues the fetch for this row on `bundle`.
    ///
    /// Once the bundle has run, finish with
    /// [`LabelRow::initialise_from_bundle`].
    pub fn initialise_labels_in_bundle(&self, bundle: &mut Bundle, overwrite: bool) -> Result<()> {
        self.ensure_can_initialise(overwrite)?;
        bundle.enqueue(BundleOperation::Fetch {
            label_hash: self.required_label_hash()?.to_string(),
        });
        Ok(())
    }

    pub fn initialise_from_bundle(&mut self, results: &BundleResults, overwrite: bool) -> Result<()> {
        let label_hash = self.required_label_hash()?;
        let document = results.fetched(label_hash).cloned().ok_or_else(|| {
            LabelError::malformed(format!("the bundle did not fetch label row '{label_hash}'"))
        })?;
        self.initialise_from_wire(&document, overwrite)
    }

    /// Serializes the row and stores it through `client`.
    pub fn save(&self, client: &mut dyn LabelClient) -> Result<()> {
        let document = self.to_wire_document()?;
        client.save_label_row(self.required_label_hash()?, document)
    }

    /// Serializes the row now and queues the store on `bundle`.
    pub fn save_in_bundle(&self, bundle: &mut Bundle) -> Result<()> {
        let document = self.to_wire_document()?;
        bundle.enqueue(BundleOperation::Save {
            label_hash: self.required_label_hash()?.to_string(),
            document,
        });
        Ok(())
    }

    /// Declares a new image, video, audio or text space.
    pub fn add_space(&mut self, id: impl Into<SpaceId>, kind: SpaceKind) -> Result<()> {
        self.ensure_initialised()?;
        let id = id.into();
        if matches!(kind, SpaceKind::Root { .. }) || id.is_root() {
            return Err(LabelError::malformed(
                "the root space is created with the label row and cannot be added",
            ));
        }
        if self.spaces.contains_key(&id) {
            return Err(LabelError::malformed(format!("space '{id}' already exists")));
        }
        tracing::debug!(space = %id, kind = kind.type_name(), "added space");
        self.spaces.insert(id.clone(), Space::new(id, kind));
        Ok(())
    }

    pub fn space(&self, id: &SpaceId) -> Result<SpaceRef<'_>> {
        self.ensure_initialised()?;
        let space = self
            .spaces
            .get(id)
            .ok_or_else(|| LabelError::UnknownSpace(id.clone()))?;
        Ok(SpaceRef::new(space, &self.registry))
    }

    pub fn space_mut(&mut self, id: &SpaceId) -> Result<SpaceMut<'_>> {
        self.ensure_initialised()?;
        let space = self
            .spaces
            .get_mut(id)
            .ok_or_else(|| LabelError::UnknownSpace(id.clone()))?;
        let row_classifications: &[EntityHash] = if id.is_root() {
            &self.attached_classifications
        } else {
            &[]
        };
        Ok(SpaceMut::new(
            space,
            &mut self.registry,
            row_classifications,
            self.initialised,
        ))
    }

    pub fn root_space(&self) -> Result<SpaceRef<'_>> {
        self.space(&SpaceId::root())
    }

    pub fn root_space_mut(&mut self) -> Result<SpaceMut<'_>> {
        self.space_mut(&SpaceId::root())
    }

    /// Every space including the root, ordered by id.
    pub fn get_spaces(&self) -> Result<Vec<SpaceRef<'_>>> {
        self.ensure_initialised()?;
        Ok(self
            .spaces
            .values()
            .map(|space| SpaceRef::new(space, &self.registry))
            .collect())
    }

    /// Creates a detached instance of an ontology object or classification.
    pub fn create_entity(&mut self, feature_hash: &FeatureHash) -> Result<EntityHash> {
        self.registry.create(&self.ontology, feature_hash, None)
    }

    /// Drops an entity that is placed nowhere.
    pub fn discard_entity(&mut self, hash: &EntityHash) -> Result<()> {
        let binding = match self.registry.get(hash) {
            Some(crate::entity::Entity::Object(o)) => o.binding(),
            Some(crate::entity::Entity::Classification(c)) => c.binding(),
            None => return Err(LabelError::UnknownEntity(hash.clone())),
        };
        if *binding != Binding::Detached {
            return Err(LabelError::binding(format!(
                "Entity '{hash}' is still placed on this label row. Remove it before discarding it."
            )));
        }
        self.registry.remove(hash);
        Ok(())
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn object(&self, hash: &EntityHash) -> Result<&ObjectInstance> {
        self.registry.object(hash)
    }

    pub fn object_mut(&mut self, hash: &EntityHash) -> Result<&mut ObjectInstance> {
        self.registry.object_mut(hash)
    }

    pub fn classification(&self, hash: &EntityHash) -> Result<&ClassificationInstance> {
        self.registry.classification(hash)
    }

    pub fn classification_mut(&mut self, hash: &EntityHash) -> Result<&mut ClassificationInstance> {
        self.registry.classification_mut(hash)
    }

    /// Adds an object to the label row from the frames it already carries.
    pub fn add_object_instance(&mut self, hash: &EntityHash) -> Result<()> {
        self.ensure_initialised()?;
        let root_kind = *self.root_kind();
        let object = self.registry.object(hash)?;
        match object.binding() {
            Binding::OnSpaces(_) => {
                return Err(LabelError::binding(
                    "This object is already placed on a space. Use SpaceMut::put_object_instance \
                     and SpaceMut::remove_object_instance to edit it instead.",
                ))
            }
            Binding::OnLabelRow => {
                return Err(LabelError::binding(format!(
                    "Object '{hash}' was already added to this label row."
                )))
            }
            Binding::Detached => {}
        }
        if !object.has_frame_data() {
            return Err(LabelError::malformed(
                "This object is not on any frames; add it to at least one frame first \
                 with ObjectInstance::set_for_frames.",
            ));
        }
        root_kind.check_shape(object.shape())?;
        check_root_frames(&root_kind, object.frames().keys())?;

        *self.registry.object_mut(hash)?.binding_mut() = Binding::OnLabelRow;
        self.attached_objects.push(hash.clone());
        tracing::debug!(entity = %hash, "added object instance to label row");
        Ok(())
    }

    /// Takes an object off the label row. Its frame data stays on the entity.
    pub fn remove_object(&mut self, hash: &EntityHash) -> Result<()> {
        self.ensure_initialised()?;
        let object = self.registry.object_mut(hash)?;
        match object.binding() {
            Binding::OnSpaces(_) => {
                return Err(LabelError::binding(
                    "This object is placed on a space. Use SpaceMut::remove_object_instance instead.",
                ))
            }
            Binding::Detached => {
                return Err(LabelError::binding(format!(
                    "Object '{hash}' is not on this label row."
                )))
            }
            Binding::OnLabelRow => {}
        }
        *object.binding_mut() = Binding::Detached;
        self.attached_objects.retain(|h| h != hash);
        tracing::debug!(entity = %hash, "removed object instance from label row");
        Ok(())
    }

    /// Adds a classification to the label row from the frames it carries.
    ///
    /// Fails if another instance of the same ontology classification is
    /// already present on any of those frames.
    pub fn add_classification_instance(&mut self, hash: &EntityHash) -> Result<()> {
        self.ensure_initialised()?;
        let root_kind = *self.root_kind();
        let classification = self.registry.classification(hash)?;
        match classification.binding() {
            Binding::OnSpaces(_) => {
                return Err(LabelError::binding(
                    "This classification is already placed on a space. Use \
                     SpaceMut::put_classification_instance and \
                     SpaceMut::remove_classification_instance to edit it instead.",
                ))
            }
            Binding::OnLabelRow => {
                return Err(LabelError::binding(format!(
                    "Classification '{hash}' was already added to this label row."
                )))
            }
            Binding::Detached => {}
        }
        if !classification.has_frame_data() {
            return Err(LabelError::malformed(
                "This classification is not on any frames; add it to at least one frame first \
                 with ClassificationInstance::set_for_frames.",
            ));
        }
        check_root_frames(&root_kind, classification.frames().keys())?;

        let feature = classification.feature_hash().clone();
        let keys: Vec<FrameKey> = classification.frames().keys().copied().collect();
        let clashes = self.classification_clashes(hash, &feature, &keys)?;
        if !clashes.is_empty() {
            return Err(clash_error(&feature, &clashes));
        }

        *self.registry.classification_mut(hash)?.binding_mut() = Binding::OnLabelRow;
        self.attached_classifications.push(hash.clone());
        tracing::debug!(entity = %hash, "added classification instance to label row");
        Ok(())
    }

    pub fn remove_classification(&mut self, hash: &EntityHash) -> Result<()> {
        self.ensure_initialised()?;
        let classification = self.registry.classification_mut(hash)?;
        match classification.binding() {
            Binding::OnSpaces(_) => {
                return Err(LabelError::binding(
                    "This classification is placed on a space. Use \
                     SpaceMut::remove_classification_instance instead.",
                ))
            }
            Binding::Detached => {
                return Err(LabelError::binding(format!(
                    "Classification '{hash}' is not on this label row."
                )))
            }
            Binding::OnLabelRow => {}
        }
        *classification.binding_mut() = Binding::Detached;
        self.attached_classifications.retain(|h| h != hash);
        Ok(())
    }

    /// Sets frames of an object attached to the label row.
    ///
    /// Every frame must lie within the data unit; frames that already carry
    /// data are only overwritten with [`OverlapStrategy::Replace`].
    pub fn set_object_frames(
        &mut self,
        hash: &EntityHash,
        frames: impl Into<Frames>,
        geometry: Option<Geometry>,
        options: PutOptions,
    ) -> Result<()> {
        self.ensure_initialised()?;
        let root_kind = *self.root_kind();
        let object = self.registry.object(hash)?;
        if *object.binding() != Binding::OnLabelRow {
            return Err(LabelError::binding(format!(
                "Object '{hash}' is not on this label row. Add it with \
                 LabelRow::add_object_instance first."
            )));
        }
        let keys = keys_for(Some(object.shape()), &frames.into())?;
        check_root_frames(&root_kind, keys.iter())?;
        self.registry
            .object_mut(hash)?
            .write_frames(&keys, geometry, &options)?;
        tracing::debug!(entity = %hash, frames = keys.len(), "set object frames on label row");
        Ok(())
    }

    /// Sets frames of a classification attached to the label row.
    ///
    /// Another instance of the same ontology classification on any of those
    /// frames is a conflict; with [`OverlapStrategy::Replace`] it is cut from
    /// them instead.
    pub fn set_classification_frames(
        &mut self,
        hash: &EntityHash,
        frames: impl Into<Frames>,
        options: PutOptions,
    ) -> Result<()> {
        self.ensure_initialised()?;
        let root_kind = *self.root_kind();
        let classification = self.registry.classification(hash)?;
        if *classification.binding() != Binding::OnLabelRow {
            return Err(LabelError::binding(format!(
                "Classification '{hash}' is not on this label row. Add it with \
                 LabelRow::add_classification_instance first."
            )));
        }
        let feature = classification.feature_hash().clone();
        let keys = keys_for(None, &frames.into())?;
        check_root_frames(&root_kind, keys.iter())?;

        let clashes = self.classification_clashes(hash, &feature, &keys)?;
        if !clashes.is_empty() && options.on_overlap == OverlapStrategy::Error {
            return Err(clash_error(&feature, &clashes));
        }
        if options.on_overlap == OverlapStrategy::Error {
            let own = self.registry.classification(hash)?;
            if let Some(key) = keys.iter().find(|k| own.frames().contains_key(*k)) {
                return Err(LabelError::OverlapConflict(format!(
                    "Cannot overwrite existing data of classification '{hash}' at {key}. \
                     Use OverlapStrategy::Replace to overwrite it."
                )));
            }
        }
        if !clashes.is_empty() {
            self.cut_classifications(hash, &feature, &clashes)?;
        }
        self.registry
            .classification_mut(hash)?
            .write_frames(&keys, &options)?;
        tracing::debug!(entity = %hash, frames = keys.len(), "set classification frames on label row");
        Ok(())
    }

    /// Keys among `keys` where another instance of `feature` already sits on
    /// the label row or on the root space.
    fn classification_clashes(
        &self,
        hash: &EntityHash,
        feature: &FeatureHash,
        keys: &[FrameKey],
    ) -> Result<BTreeSet<FrameKey>> {
        let mut clashes = BTreeSet::new();
        for other in self.attached_classifications.iter().filter(|h| *h != hash) {
            let other = self.registry.classification(other)?;
            if other.feature_hash() != feature {
                continue;
            }
            for other_key in other.frames().keys() {
                clashes.extend(keys.iter().filter(|k| k.overlaps(other_key)));
            }
        }
        if let Some(root) = self.spaces.get(&SpaceId::root()) {
            for (existing, annotations) in root.classifications.iter_by_key() {
                if annotations
                    .iter()
                    .any(|a| a.feature_hash() == feature && a.entity() != hash)
                {
                    clashes.extend(keys.iter().filter(|k| k.overlaps(&existing)));
                }
            }
        }
        Ok(clashes)
    }

    /// Removes every other instance of `feature` from `keys`, on the label row
    /// and on the root space.
    fn cut_classifications(
        &mut self,
        hash: &EntityHash,
        feature: &FeatureHash,
        keys: &BTreeSet<FrameKey>,
    ) -> Result<()> {
        for other in self.attached_classifications.iter().filter(|h| *h != hash) {
            let other = self.registry.classification_mut(other)?;
            if other.feature_hash() != feature {
                continue;
            }
            for key in keys {
                other.cut_frames(key);
            }
        }
        let root_id = SpaceId::root();
        let Some(root) = self.spaces.get_mut(&root_id) else {
            return Ok(());
        };
        for key in keys {
            let others: BTreeSet<EntityHash> = root
                .classifications
                .iter_by_key()
                .filter(|(existing, _)| existing.overlaps(key))
                .flat_map(|(_, annotations)| annotations.iter())
                .filter(|a| a.feature_hash() == feature && a.entity() != hash)
                .map(|a| a.entity().clone())
                .collect();
            for other in others {
                root.classifications.carve(&other, *key);
                if !root.classifications.contains_entity(&other) {
                    self.registry
                        .classification_mut(&other)?
                        .binding_mut()
                        .unbind(&root_id);
                }
            }
        }
        Ok(())
    }

    /// Objects on the label-row surface, in the order they were added.
    ///
    /// With `feature_hash`, only instances of that ontology object.
    pub fn get_object_instances(&self, feature_hash: Option<&FeatureHash>) -> Result<Vec<&ObjectInstance>> {
        self.ensure_initialised()?;
        self.attached_objects
            .iter()
            .map(|h| self.registry.object(h))
            .filter(|o| match (o, feature_hash) {
                (Ok(o), Some(feature)) => o.feature_hash() == feature,
                _ => true,
            })
            .collect()
    }

    pub fn get_classification_instances(
        &self,
        feature_hash: Option<&FeatureHash>,
    ) -> Result<Vec<&ClassificationInstance>> {
        self.ensure_initialised()?;
        self.attached_classifications
            .iter()
            .map(|h| self.registry.classification(h))
            .filter(|c| match (c, feature_hash) {
                (Ok(c), Some(feature)) => c.feature_hash() == feature,
                _ => true,
            })
            .collect()
    }

    fn root_kind(&self) -> &SpaceKind {
        self.spaces
            .get(&SpaceId::root())
            .map_or(&ROOT_FALLBACK, Space::kind)
    }

    pub(crate) fn spaces(&self) -> impl Iterator<Item = &Space> {
        self.spaces.values()
    }

    pub(crate) fn attached_objects(&self) -> &[EntityHash] {
        &self.attached_objects
    }

    pub(crate) fn attached_classifications(&self) -> &[EntityHash] {
        &self.attached_classifications
    }

    /// Pieces used by the document reader to assemble a row.
    pub(crate) fn parts_mut(
        &mut self,
    ) -> (
        &mut EntityRegistry,
        &mut BTreeMap<SpaceId, Space>,
        &mut Vec<EntityHash>,
        &mut Vec<EntityHash>,
    ) {
        (
            &mut self.registry,
            &mut self.spaces,
            &mut self.attached_objects,
            &mut self.attached_classifications,
        )
    }

    pub(crate) fn mark_initialised(&mut self) {
        self.initialised = true;
    }
}

fn clash_error(feature: &FeatureHash, clashes: &BTreeSet<FrameKey>) -> LabelError {
    let listed: Vec<String> = clashes.iter().map(FrameKey::to_string).collect();
    LabelError::OverlapConflict(format!(
        "A classification instance of '{feature}' already exists on frames [{}]. \
         Only add classifications on frames where the same classification does not yet exist.",
        listed.join(", ")
    ))
}

const ROOT_FALLBACK: SpaceKind = SpaceKind::Root {
    size: None,
    number_of_frames: None,
};

fn check_root_frames<'a>(kind: &SpaceKind, keys: impl Iterator<Item = &'a FrameKey>) -> Result<()> {
    let Some(total) = kind.number_of_frames().filter(|n| *n > 0) else {
        return Ok(());
    };
    for key in keys {
        let beyond = match key {
            FrameKey::Frame(frame) => *frame >= total,
            FrameKey::Range(range) => range.end > total,
        };
        if beyond {
            return Err(LabelError::malformed(format!(
                "frame {key} is outside the {total} frames of this data unit"
            )));
        }
    }
    Ok(())
}

//! Frame-keyed storage shared by object and classification annotations.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::annotation::{ClassificationAnnotation, ObjectAnnotation};
use crate::frames::FrameKey;
use crate::geometry::Geometry;
use crate::ids::EntityHash;

/// Anything stored in an [`AnnotationIndex`].
pub(crate) trait Indexed {
    fn entity(&self) -> &EntityHash;
    fn key(&self) -> FrameKey;
    /// A copy of this annotation stored under another key.
    fn rekeyed(&self, key: FrameKey) -> Self;
}

impl Indexed for ObjectAnnotation {
    fn entity(&self) -> &EntityHash {
        ObjectAnnotation::entity(self)
    }

    fn key(&self) -> FrameKey {
        ObjectAnnotation::key(self)
    }

    fn rekeyed(&self, key: FrameKey) -> Self {
        let geometry = match (key, self.geometry()) {
            (FrameKey::Range(range), Geometry::Range(_)) => Geometry::Range(range),
            (_, geometry) => geometry.clone(),
        };
        ObjectAnnotation::new(
            self.entity().clone(),
            self.space_id().clone(),
            key,
            geometry,
            self.metadata.clone(),
        )
    }
}

impl Indexed for ClassificationAnnotation {
    fn entity(&self) -> &EntityHash {
        ClassificationAnnotation::entity(self)
    }

    fn key(&self) -> FrameKey {
        ClassificationAnnotation::key(self)
    }

    fn rekeyed(&self, key: FrameKey) -> Self {
        ClassificationAnnotation::new(
            self.entity().clone(),
            self.space_id().clone(),
            key,
            self.feature_hash().clone(),
            self.metadata.clone(),
        )
    }
}

/// Annotations indexed by key, with a reverse index per entity and the order
/// in which entities were first placed.
///
/// At most one annotation exists per `(entity, key)`.
#[derive(Clone, Debug)]
pub(crate) struct AnnotationIndex<A> {
    by_key: BTreeMap<FrameKey, Vec<A>>,
    keys_by_entity: HashMap<EntityHash, BTreeSet<FrameKey>>,
    order: Vec<EntityHash>,
}

impl<A> Default for AnnotationIndex<A> {
    fn default() -> Self {
        Self {
            by_key: BTreeMap::new(),
            keys_by_entity: HashMap::new(),
            order: Vec::new(),
        }
    }
}

impl<A: Indexed> AnnotationIndex<A> {
    /// Stores an annotation, replacing one with the same entity and key.
    pub(crate) fn insert(&mut self, annotation: A) -> Option<A> {
        let entity = annotation.entity().clone();
        let key = annotation.key();
        let slot = self.by_key.entry(key).or_default();
        let replaced = match slot.iter().position(|a| a.entity() == &entity) {
            Some(i) => Some(std::mem::replace(&mut slot[i], annotation)),
            None => {
                slot.push(annotation);
                None
            }
        };
        let keys = self.keys_by_entity.entry(entity.clone()).or_default();
        if keys.is_empty() {
            self.order.push(entity);
        }
        keys.insert(key);
        replaced
    }

    pub(crate) fn get(&self, entity: &EntityHash, key: FrameKey) -> Option<&A> {
        self.by_key
            .get(&key)?
            .iter()
            .find(|a| a.entity() == entity)
    }

    pub(crate) fn get_mut(&mut self, entity: &EntityHash, key: FrameKey) -> Option<&mut A> {
        self.by_key
            .get_mut(&key)?
            .iter_mut()
            .find(|a| a.entity() == entity)
    }

    pub(crate) fn remove(&mut self, entity: &EntityHash, key: FrameKey) -> Option<A> {
        let slot = self.by_key.get_mut(&key)?;
        let position = slot.iter().position(|a| a.entity() == entity)?;
        let removed = slot.remove(position);
        if slot.is_empty() {
            self.by_key.remove(&key);
        }
        if let Some(keys) = self.keys_by_entity.get_mut(entity) {
            keys.remove(&key);
            if keys.is_empty() {
                self.keys_by_entity.remove(entity);
                self.order.retain(|e| e != entity);
            }
        }
        Some(removed)
    }

    /// Cuts `cut` out of an entity's annotations.
    ///
    /// Annotations whose key overlaps `cut` are removed; for ranges, the parts
    /// outside `cut` are stored again as trimmed copies. Returns the removed
    /// annotations as they were before trimming.
    pub(crate) fn carve(&mut self, entity: &EntityHash, cut: FrameKey) -> Vec<A> {
        let mut removed = Vec::new();
        for key in self.overlapping(entity, cut) {
            if let (FrameKey::Range(existing), FrameKey::Range(cut)) = (key, cut) {
                let pieces: Vec<A> = match self.get(entity, key) {
                    Some(annotation) => existing
                        .subtract(&cut)
                        .into_iter()
                        .map(|piece| annotation.rekeyed(FrameKey::Range(piece)))
                        .collect(),
                    None => Vec::new(),
                };
                // pieces go in first so the entity keeps its placement position
                for piece in pieces {
                    self.insert(piece);
                }
            }
            removed.extend(self.remove(entity, key));
        }
        removed
    }

    /// Removes every annotation of an entity, in key order.
    pub(crate) fn remove_entity(&mut self, entity: &EntityHash) -> Vec<A> {
        let keys: Vec<FrameKey> = self.keys_of(entity).collect();
        keys.into_iter()
            .filter_map(|key| self.remove(entity, key))
            .collect()
    }

    pub(crate) fn keys_of(&self, entity: &EntityHash) -> impl Iterator<Item = FrameKey> + '_ {
        self.keys_by_entity
            .get(entity)
            .into_iter()
            .flat_map(|keys| keys.iter().copied())
    }

    /// Keys of `entity` that overlap `key`.
    pub(crate) fn overlapping(&self, entity: &EntityHash, key: FrameKey) -> Vec<FrameKey> {
        self.keys_of(entity).filter(|k| k.overlaps(&key)).collect()
    }

    pub(crate) fn contains_entity(&self, entity: &EntityHash) -> bool {
        self.keys_by_entity.contains_key(entity)
    }

    /// Entities in the order they were first placed.
    pub(crate) fn entities(&self) -> &[EntityHash] {
        &self.order
    }

    pub(crate) fn at(&self, key: FrameKey) -> &[A] {
        self.by_key.get(&key).map_or(&[], Vec::as_slice)
    }

    pub(crate) fn iter_by_key(&self) -> impl Iterator<Item = (FrameKey, &[A])> {
        self.by_key.iter().map(|(k, v)| (*k, v.as_slice()))
    }

    /// Annotations of the given entities (or all) in placement order, each
    /// entity's annotations in key order.
    pub(crate) fn in_placement_order(&self, filter: Option<&[EntityHash]>) -> Vec<&A> {
        self.order
            .iter()
            .filter(|e| filter.map_or(true, |f| f.contains(e)))
            .flat_map(|e| self.keys_of(e).filter_map(move |k| self.get(e, k)))
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_key.values().map(Vec::len).sum()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

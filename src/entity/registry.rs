//! The label row's arena of entities.
//!
//! Spaces never own entities; they refer to them by [`EntityHash`] and go
//! through the registry to read or update them.

use std::collections::HashMap;
use std::sync::Arc;

use super::{ClassificationInstance, ObjectInstance};
use crate::error::{LabelError, Result};
use crate::ids::{EntityHash, FeatureHash};
use crate::ontology::{Ontology, OntologyClass};

#[derive(Clone, Debug)]
pub enum Entity {
    Object(ObjectInstance),
    Classification(ClassificationInstance),
}

impl Entity {
    pub fn hash(&self) -> &EntityHash {
        match self {
            Entity::Object(o) => o.hash(),
            Entity::Classification(c) => c.hash(),
        }
    }

    pub fn feature_hash(&self) -> &FeatureHash {
        match self {
            Entity::Object(o) => o.feature_hash(),
            Entity::Classification(c) => c.feature_hash(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct EntityRegistry {
    entities: HashMap<EntityHash, Entity>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a detached entity of the given ontology class.
    ///
    /// A fresh hash is generated unless one is supplied; supplying a hash that
    /// is already registered is an error.
    pub fn create(
        &mut self,
        ontology: &Arc<Ontology>,
        feature_hash: &FeatureHash,
        hash: Option<EntityHash>,
    ) -> Result<EntityHash> {
        let hash = match hash {
            Some(hash) if self.entities.contains_key(&hash) => {
                return Err(LabelError::malformed(format!(
                    "an entity with hash '{hash}' already exists"
                )));
            }
            Some(hash) => hash,
            None => loop {
                let candidate = EntityHash::generate();
                if !self.entities.contains_key(&candidate) {
                    break candidate;
                }
            },
        };
        let entity = match ontology.class(feature_hash)? {
            OntologyClass::Object(class) => {
                Entity::Object(ObjectInstance::new(hash.clone(), Arc::clone(ontology), class))
            }
            OntologyClass::Classification(class) => Entity::Classification(
                ClassificationInstance::new(hash.clone(), Arc::clone(ontology), class),
            ),
        };
        self.entities.insert(hash.clone(), entity);
        Ok(hash)
    }

    pub fn get(&self, hash: &EntityHash) -> Option<&Entity> {
        self.entities.get(hash)
    }

    pub fn contains(&self, hash: &EntityHash) -> bool {
        self.entities.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn object(&self, hash: &EntityHash) -> Result<&ObjectInstance> {
        match self.entities.get(hash) {
            Some(Entity::Object(o)) => Ok(o),
            Some(Entity::Classification(_)) => Err(not_an_object(hash)),
            None => Err(LabelError::UnknownEntity(hash.clone())),
        }
    }

    pub fn object_mut(&mut self, hash: &EntityHash) -> Result<&mut ObjectInstance> {
        match self.entities.get_mut(hash) {
            Some(Entity::Object(o)) => Ok(o),
            Some(Entity::Classification(_)) => Err(not_an_object(hash)),
            None => Err(LabelError::UnknownEntity(hash.clone())),
        }
    }

    pub fn classification(&self, hash: &EntityHash) -> Result<&ClassificationInstance> {
        match self.entities.get(hash) {
            Some(Entity::Classification(c)) => Ok(c),
            Some(Entity::Object(_)) => Err(not_a_classification(hash)),
            None => Err(LabelError::UnknownEntity(hash.clone())),
        }
    }

    pub fn classification_mut(&mut self, hash: &EntityHash) -> Result<&mut ClassificationInstance> {
        match self.entities.get_mut(hash) {
            Some(Entity::Classification(c)) => Ok(c),
            Some(Entity::Object(_)) => Err(not_a_classification(hash)),
            None => Err(LabelError::UnknownEntity(hash.clone())),
        }
    }

    pub(crate) fn remove(&mut self, hash: &EntityHash) -> Option<Entity> {
        self.entities.remove(hash)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }
}

fn not_an_object(hash: &EntityHash) -> LabelError {
    LabelError::malformed(format!("entity '{hash}' is a classification, not an object"))
}

fn not_a_classification(hash: &EntityHash) -> LabelError {
    LabelError::malformed(format!("entity '{hash}' is an object, not a classification"))
}

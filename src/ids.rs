//! Newtype identifiers for entities, ontology features and spaces.
//!
//! Using newtypes prevents accidentally mixing up different kinds of hashes
//! (e.g., passing an ontology feature hash where an entity hash is expected).

use rand::RngExt;
use serde::{Deserialize, Serialize};
use std::fmt;

const HASH_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
const HASH_LEN: usize = 8;

/// The globally-unique hash of an object or classification instance.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityHash(String);

impl EntityHash {
    /// Creates an EntityHash from an existing value.
    #[inline]
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    /// Generates a fresh random 8 character hash.
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let hash = (0..HASH_LEN)
            .map(|_| HASH_ALPHABET[rng.random_range(0..HASH_ALPHABET.len())] as char)
            .collect::<String>();
        Self(hash)
    }

    /// Returns the underlying string.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for EntityHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityHash({})", self.0)
    }
}

impl fmt::Display for EntityHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The hash of an ontology node (object class, classification, attribute or option).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureHash(String);

impl FeatureHash {
    /// Creates a new FeatureHash.
    #[inline]
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    /// Returns the underlying string.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for FeatureHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FeatureHash({})", self.0)
    }
}

impl fmt::Display for FeatureHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The identifier of a space (one media unit) within a label row.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpaceId(String);

impl SpaceId {
    /// Id of the implicit space backing the label row's legacy surface.
    pub const ROOT: &'static str = "root";

    /// Creates a new SpaceId.
    #[inline]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id of the root space.
    pub fn root() -> Self {
        Self(Self::ROOT.to_string())
    }

    /// Returns true if this is the root space id.
    #[inline]
    pub fn is_root(&self) -> bool {
        self.0 == Self::ROOT
    }

    /// Returns the underlying string.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SpaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SpaceId({})", self.0)
    }
}

impl fmt::Display for SpaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

macro_rules! impl_from_str {
    ($($ty:ty),*) => {
        $(
            impl From<&str> for $ty {
                fn from(value: &str) -> Self {
                    Self::new(value)
                }
            }

            impl From<String> for $ty {
                fn from(value: String) -> Self {
                    Self::new(value)
                }
            }

            impl From<&$ty> for $ty {
                fn from(value: &$ty) -> Self {
                    value.clone()
                }
            }
        )*
    };
}

impl_from_str!(EntityHash, FeatureHash, SpaceId);

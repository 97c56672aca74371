//! The read-only ontology a label row is annotated against.
//!
//! Only the parts needed to place annotations and validate answers are
//! modelled: object classes with their shape, classification classes, and
//! their (possibly nested) attributes.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{LabelError, Result};
use crate::geometry::Shape;
use crate::ids::FeatureHash;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Ontology {
    #[serde(default)]
    pub objects: Vec<ObjectClass>,
    #[serde(default)]
    pub classifications: Vec<ClassificationClass>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectClass {
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    pub shape: Shape,
    #[serde(rename = "featureNodeHash")]
    pub feature_hash: FeatureHash,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassificationClass {
    #[serde(rename = "featureNodeHash")]
    pub feature_hash: FeatureHash,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    Text,
    Radio,
    Checklist,
    Numeric,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: AttributeType,
    #[serde(rename = "featureNodeHash")]
    pub feature_hash: FeatureHash,
    #[serde(default)]
    pub required: bool,
    /// Dynamic attributes are answered per frame rather than per entity.
    #[serde(default)]
    pub dynamic: bool,
    #[serde(default)]
    pub options: Vec<AttributeOption>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttributeOption {
    pub label: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(rename = "featureNodeHash")]
    pub feature_hash: FeatureHash,
    /// Attributes revealed when this option is selected.
    #[serde(default, rename = "options")]
    pub nested: Vec<Attribute>,
}

impl AttributeOption {
    /// The option's document value, derived from the label when absent.
    pub fn wire_value(&self) -> String {
        self.value.clone().unwrap_or_else(|| snake_case(&self.label))
    }
}

impl Attribute {
    pub fn option(&self, hash: &FeatureHash) -> Option<&AttributeOption> {
        self.options.iter().find(|o| &o.feature_hash == hash)
    }
}

/// Either kind of ontology class, as returned by [`Ontology::class`].
#[derive(Clone, Copy, Debug)]
pub enum OntologyClass<'a> {
    Object(&'a ObjectClass),
    Classification(&'a ClassificationClass),
}

impl ObjectClass {
    /// Finds an attribute at any nesting depth.
    pub fn attribute(&self, hash: &FeatureHash) -> Option<&Attribute> {
        find_attribute(&self.attributes, hash)
    }

    /// The `value` field written into object entries.
    pub fn wire_value(&self) -> String {
        snake_case(&self.name)
    }
}

impl ClassificationClass {
    pub fn attribute(&self, hash: &FeatureHash) -> Option<&Attribute> {
        find_attribute(&self.attributes, hash)
    }

    /// Classifications are named after their top-level attribute.
    pub fn name(&self) -> &str {
        self.attributes.first().map_or("", |a| a.name.as_str())
    }
}

fn find_attribute<'a>(attributes: &'a [Attribute], hash: &FeatureHash) -> Option<&'a Attribute> {
    attributes.iter().find_map(|attribute| {
        if &attribute.feature_hash == hash {
            return Some(attribute);
        }
        attribute
            .options
            .iter()
            .find_map(|option| find_attribute(&option.nested, hash))
    })
}

/// Lower snake case of a display name, as used for `value` fields.
pub fn snake_case(name: &str) -> String {
    name.trim()
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("_")
}

impl Ontology {
    pub fn object(&self, hash: &FeatureHash) -> Option<&ObjectClass> {
        self.objects.iter().find(|o| &o.feature_hash == hash)
    }

    pub fn classification(&self, hash: &FeatureHash) -> Option<&ClassificationClass> {
        self.classifications.iter().find(|c| &c.feature_hash == hash)
    }

    /// Looks up a top-level class of either kind.
    pub fn class(&self, hash: &FeatureHash) -> Result<OntologyClass<'_>> {
        if let Some(object) = self.object(hash) {
            return Ok(OntologyClass::Object(object));
        }
        self.classification(hash)
            .map(OntologyClass::Classification)
            .ok_or_else(|| LabelError::UnknownFeature(hash.clone()))
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| LabelError::OntologyParse {
            path: "<string>".into(),
            message: e.to_string(),
        })
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| LabelError::OntologyParse {
            path: "<string>".into(),
            message: e.to_string(),
        })
    }

    /// Loads an ontology from a `.json`, `.yaml` or `.yml` file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));
        let parsed = if is_yaml {
            serde_yaml::from_str(&text).map_err(|e| e.to_string())
        } else {
            serde_json::from_str(&text).map_err(|e| e.to_string())
        };
        parsed.map_err(|message| LabelError::OntologyParse {
            path: path.to_path_buf(),
            message,
        })
    }
}

use std::path::PathBuf;
use thiserror::Error;

use crate::ids::{EntityHash, FeatureHash, SpaceId};
use crate::validation::ValidationReport;

/// The main error type for labelspace operations.
///
/// Every variant maps onto one [`ErrorKind`], so callers can branch on the
/// class of failure without matching message text.
#[derive(Debug, Error)]
pub enum LabelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse label document from {path}: {source}")]
    WireParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write label document to {path}: {source}")]
    WireWrite {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to parse ontology from {path}: {message}")]
    OntologyParse { path: PathBuf, message: String },

    #[error(
        "For this operation you will need to initialise labelling first. \
         Call LabelRow::initialise_labels to do so first."
    )]
    NotInitialised,

    #[error(
        "You are trying to re-initialise a label row that has already been initialised. \
         This would overwrite current labels."
    )]
    AlreadyInitialised,

    #[error("{0}")]
    BindingConflict(String),

    #[error("{0}")]
    OverlapConflict(String),

    #[error("{0}")]
    UnsupportedForSpace(String),

    #[error(
        "Bitmask dimensions {mask_width}x{mask_height} of object '{entity}' on space '{space_id}' \
         don't match the media dimensions {media}"
    )]
    DimensionMismatch {
        space_id: SpaceId,
        entity: EntityHash,
        mask_width: u32,
        mask_height: u32,
        media: String,
    },

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Space '{0}' does not exist on this label row")]
    UnknownSpace(SpaceId),

    #[error("No entity with hash '{0}' exists on this label row")]
    UnknownEntity(EntityHash),

    #[error("Feature hash '{0}' is not part of the ontology")]
    UnknownFeature(FeatureHash),

    #[error("Validation failed with {error_count} error(s) and {warning_count} warning(s)")]
    ValidationFailed {
        error_count: usize,
        warning_count: usize,
        report: ValidationReport,
    },
}

/// Coarse classification of a [`LabelError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A mutation was attempted before the label row was initialised.
    NotInitialised,
    /// The label row was initialised twice.
    Lifecycle,
    /// An operation was attempted through the wrong editing regime.
    BindingConflict,
    /// A placement collides with an existing annotation.
    OverlapConflict,
    /// The space type forbids the requested data.
    UnsupportedForSpace,
    /// A bitmask extent disagrees with its media's pixel dimensions.
    DimensionMismatch,
    /// The caller supplied structurally invalid data.
    MalformedInput,
    /// A space, entity or ontology feature could not be found.
    Lookup,
    /// File or JSON transport failures, and failed validation reports.
    Io,
}

impl LabelError {
    /// Returns the class this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LabelError::Io(_)
            | LabelError::WireParse { .. }
            | LabelError::WireWrite { .. }
            | LabelError::OntologyParse { .. }
            | LabelError::ValidationFailed { .. } => ErrorKind::Io,
            LabelError::NotInitialised => ErrorKind::NotInitialised,
            LabelError::AlreadyInitialised => ErrorKind::Lifecycle,
            LabelError::BindingConflict(_) => ErrorKind::BindingConflict,
            LabelError::OverlapConflict(_) => ErrorKind::OverlapConflict,
            LabelError::UnsupportedForSpace(_) => ErrorKind::UnsupportedForSpace,
            LabelError::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
            LabelError::MalformedInput(_) => ErrorKind::MalformedInput,
            LabelError::UnknownSpace(_)
            | LabelError::UnknownEntity(_)
            | LabelError::UnknownFeature(_) => ErrorKind::Lookup,
        }
    }

    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        LabelError::MalformedInput(message.into())
    }

    pub(crate) fn binding(message: impl Into<String>) -> Self {
        LabelError::BindingConflict(message.into())
    }

    pub(crate) fn unsupported(message: impl Into<String>) -> Self {
        LabelError::UnsupportedForSpace(message.into())
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = LabelError> = std::result::Result<T, E>;

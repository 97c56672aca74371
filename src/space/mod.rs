//! Spaces: one media unit's index of annotations.
//!
//! A [`Space`] is one of a closed set of kinds ([`SpaceKind`]). Image, video and
//! root spaces are indexed by frame; audio and text spaces by half-open ranges.
//! The kind decides which keys, shapes and dynamic answers a space accepts;
//! the indexing itself is shared through [`AnnotationIndex`].
//!
//! Spaces are edited through the borrowed handles [`SpaceRef`] and
//! [`SpaceMut`] handed out by the label row, which pair the space with the
//! row's entity registry.

mod handle;
mod index;

pub use handle::{SpaceMut, SpaceRef};
pub(crate) use index::AnnotationIndex;

use std::collections::HashMap;
use std::fmt;

use crate::annotation::{ClassificationAnnotation, ObjectAnnotation};
use crate::entity::DynamicAnswers;
use crate::error::{LabelError, Result};
use crate::frames::{merge_ranges, FrameKey, Frames};
use crate::geometry::Shape;
use crate::ids::{EntityHash, SpaceId};

/// Pixel dimensions of a media unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MediaSize {
    pub width: u32,
    pub height: u32,
}

impl MediaSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for MediaSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// The kind of media a space indexes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpaceKind {
    /// A single image; the only frame is 0.
    Image { size: MediaSize },
    Video { size: MediaSize, number_of_frames: u32 },
    /// Indexed by sample ranges.
    Audio,
    /// Indexed by character ranges.
    Text,
    /// The label row's own space for single-media data.
    Root {
        size: Option<MediaSize>,
        number_of_frames: Option<u32>,
    },
}

impl SpaceKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            SpaceKind::Image { .. } => "image",
            SpaceKind::Video { .. } => "video",
            SpaceKind::Audio => "audio",
            SpaceKind::Text => "text",
            SpaceKind::Root { .. } => "root",
        }
    }

    pub fn media_size(&self) -> Option<MediaSize> {
        match self {
            SpaceKind::Image { size } | SpaceKind::Video { size, .. } => Some(*size),
            SpaceKind::Root { size, .. } => *size,
            SpaceKind::Audio | SpaceKind::Text => None,
        }
    }

    pub fn number_of_frames(&self) -> Option<u32> {
        match self {
            SpaceKind::Image { .. } => Some(1),
            SpaceKind::Video {
                number_of_frames, ..
            } => Some(*number_of_frames),
            SpaceKind::Root {
                number_of_frames, ..
            } => *number_of_frames,
            SpaceKind::Audio | SpaceKind::Text => None,
        }
    }

    pub fn is_range_based(&self) -> bool {
        matches!(self, SpaceKind::Audio | SpaceKind::Text)
    }

    pub fn supports_dynamic_answers(&self) -> bool {
        match self {
            SpaceKind::Image { .. } | SpaceKind::Video { .. } | SpaceKind::Root { .. } => true,
            SpaceKind::Audio | SpaceKind::Text => false,
        }
    }

    /// Rejects object shapes this kind of space cannot hold.
    pub(crate) fn check_shape(&self, shape: Shape) -> Result<()> {
        let fits = match self {
            SpaceKind::Audio => shape == Shape::Audio,
            SpaceKind::Text => shape == Shape::Text,
            SpaceKind::Image { .. } | SpaceKind::Video { .. } | SpaceKind::Root { .. } => {
                !shape.is_range_based()
            }
        };
        if fits {
            Ok(())
        } else {
            Err(LabelError::unsupported(format!(
                "{shape} objects cannot be placed on {} spaces",
                self.type_name()
            )))
        }
    }

    /// Maps a caller's frame selection onto this space's storage keys.
    pub(crate) fn resolve_keys(&self, frames: &Frames) -> Result<Vec<FrameKey>> {
        match self {
            SpaceKind::Audio | SpaceKind::Text => {
                if frames.is_empty() {
                    return Err(LabelError::malformed("no ranges given"));
                }
                let mut ranges = Vec::with_capacity(frames.keys().len());
                for key in frames.keys() {
                    match key {
                        FrameKey::Range(r) if !r.is_empty() => ranges.push(*r),
                        FrameKey::Range(r) => {
                            return Err(LabelError::malformed(format!("range {r:?} is empty")))
                        }
                        FrameKey::Frame(f) => {
                            return Err(LabelError::unsupported(format!(
                                "{} spaces are indexed by ranges; frame {f} cannot be used",
                                self.type_name()
                            )))
                        }
                    }
                }
                Ok(merge_ranges(ranges).into_iter().map(FrameKey::Range).collect())
            }
            SpaceKind::Image { .. } => {
                for key in frames.keys() {
                    let beyond = match key {
                        FrameKey::Frame(f) => (*f != 0).then_some(*f),
                        FrameKey::Range(r) if !r.is_empty() && r.end > 1 => Some(r.start.max(1)),
                        FrameKey::Range(_) => None,
                    };
                    if let Some(frame) = beyond {
                        return Err(LabelError::unsupported(format!(
                            "image spaces have a single frame (0); frame {frame} does not exist"
                        )));
                    }
                }
                Ok(vec![FrameKey::Frame(0)])
            }
            SpaceKind::Video { .. } | SpaceKind::Root { .. } => {
                // Bounds are checked on the keys so a huge range is never expanded.
                if let Some(total) = self.number_of_frames().filter(|n| *n > 0) {
                    for key in frames.keys() {
                        let beyond = match key {
                            FrameKey::Frame(f) => *f >= total,
                            FrameKey::Range(r) => r.end > total,
                        };
                        if beyond {
                            return Err(LabelError::malformed(format!(
                                "frame {key} is outside the {total} frames of this {} space",
                                self.type_name()
                            )));
                        }
                    }
                }
                let indices = frames.to_frame_indices();
                if indices.is_empty() {
                    return Err(LabelError::malformed("no frames given"));
                }
                Ok(indices.into_iter().map(FrameKey::Frame).collect())
            }
        }
    }
}

/// One media unit's annotations.
#[derive(Clone, Debug)]
pub struct Space {
    id: SpaceId,
    kind: SpaceKind,
    pub(crate) objects: AnnotationIndex<ObjectAnnotation>,
    pub(crate) classifications: AnnotationIndex<ClassificationAnnotation>,
    pub(crate) dynamic_answers: HashMap<EntityHash, DynamicAnswers>,
}

impl Space {
    pub fn new(id: SpaceId, kind: SpaceKind) -> Self {
        Self {
            id,
            kind,
            objects: AnnotationIndex::default(),
            classifications: AnnotationIndex::default(),
            dynamic_answers: HashMap::new(),
        }
    }

    pub fn id(&self) -> &SpaceId {
        &self.id
    }

    pub fn kind(&self) -> &SpaceKind {
        &self.kind
    }

    /// Hashes of the objects placed here, in placement order.
    pub fn object_hashes(&self) -> &[EntityHash] {
        self.objects.entities()
    }

    pub fn classification_hashes(&self) -> &[EntityHash] {
        self.classifications.entities()
    }

    pub fn get_object_instance_annotations(&self, filter: Option<&[EntityHash]>) -> Vec<&ObjectAnnotation> {
        self.objects.in_placement_order(filter)
    }

    pub fn get_classification_instance_annotations(
        &self,
        filter: Option<&[EntityHash]>,
    ) -> Vec<&ClassificationAnnotation> {
        self.classifications.in_placement_order(filter)
    }

    pub fn object_annotation(&self, entity: &EntityHash, key: impl Into<FrameKey>) -> Option<&ObjectAnnotation> {
        self.objects.get(entity, key.into())
    }

    pub fn classification_annotation(
        &self,
        entity: &EntityHash,
        key: impl Into<FrameKey>,
    ) -> Option<&ClassificationAnnotation> {
        self.classifications.get(entity, key.into())
    }

    /// Objects annotated at `key`, in placement order at that key.
    pub fn objects_at(&self, key: impl Into<FrameKey>) -> &[ObjectAnnotation] {
        self.objects.at(key.into())
    }

    pub fn classifications_at(&self, key: impl Into<FrameKey>) -> &[ClassificationAnnotation] {
        self.classifications.at(key.into())
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty() && self.classifications.is_empty()
    }

    pub(crate) fn dynamic_answers_of(&self, entity: &EntityHash) -> Option<&DynamicAnswers> {
        self.dynamic_answers.get(entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::Range;

    #[test]
    fn test_image_space_only_has_frame_zero() {
        let kind = SpaceKind::Image {
            size: MediaSize::new(10, 10),
        };
        assert_eq!(kind.resolve_keys(&Frames::default()).unwrap(), vec![FrameKey::Frame(0)]);
        assert_eq!(kind.resolve_keys(&Frames::from(0u32)).unwrap(), vec![FrameKey::Frame(0)]);
        let err = kind.resolve_keys(&Frames::from(3u32)).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::UnsupportedForSpace);
    }

    #[test]
    fn test_video_bounds_and_range_expansion() {
        let kind = SpaceKind::Video {
            size: MediaSize::new(10, 10),
            number_of_frames: 5,
        };
        assert_eq!(
            kind.resolve_keys(&Frames::from(Range::new(1, 3))).unwrap(),
            vec![FrameKey::Frame(1), FrameKey::Frame(2)]
        );
        assert!(kind.resolve_keys(&Frames::from(5u32)).is_err());
        assert!(kind.resolve_keys(&Frames::default()).is_err());

        let err = kind
            .resolve_keys(&Frames::from(Range::new(0, u32::MAX)))
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::MalformedInput);
        let err = SpaceKind::Image { size: MediaSize::new(10, 10) }
            .resolve_keys(&Frames::from(Range::new(0, u32::MAX)))
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::UnsupportedForSpace);
    }

    #[test]
    fn test_audio_merges_and_rejects_frames() {
        assert_eq!(
            SpaceKind::Audio
                .resolve_keys(&Frames::from(vec![Range::new(5, 9), Range::new(0, 6)]))
                .unwrap(),
            vec![FrameKey::Range(Range::new(0, 9))]
        );
        let err = SpaceKind::Audio.resolve_keys(&Frames::from(2u32)).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::UnsupportedForSpace);
    }

    #[test]
    fn test_shape_checks() {
        assert!(SpaceKind::Audio.check_shape(Shape::Audio).is_ok());
        assert!(SpaceKind::Audio.check_shape(Shape::BoundingBox).is_err());
        assert!(SpaceKind::Text.check_shape(Shape::Audio).is_err());
        let root = SpaceKind::Root {
            size: None,
            number_of_frames: None,
        };
        assert!(root.check_shape(Shape::Polygon).is_ok());
        assert!(root.check_shape(Shape::Text).is_err());
        assert!(!SpaceKind::Text.supports_dynamic_answers());
    }
}

//! Frame indices, half-open ranges and the keys annotations are stored under.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{LabelError, Result};

/// A half-open interval `[start, end)` over frames, samples or characters.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Range {
    pub start: u32,
    pub end: u32,
}

impl Range {
    /// Creates a new range. Does not check ordering; see [`Range::checked`].
    #[inline]
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// Creates a range, rejecting empty or inverted bounds.
    pub fn checked(start: u32, end: u32) -> Result<Self> {
        if start >= end {
            return Err(LabelError::malformed(format!(
                "range [{start}, {end}) is empty or inverted"
            )));
        }
        Ok(Self { start, end })
    }

    #[inline]
    pub fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    #[inline]
    pub fn contains(&self, frame: u32) -> bool {
        self.start <= frame && frame < self.end
    }

    #[inline]
    pub fn overlaps(&self, other: &Range) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// The overlapping part of two ranges, if any.
    pub fn intersection(&self, other: &Range) -> Option<Range> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start < end).then_some(Range { start, end })
    }

    /// The parts of `self` not covered by `other` (zero, one or two pieces).
    pub fn subtract(&self, other: &Range) -> Vec<Range> {
        if !self.overlaps(other) {
            return vec![*self];
        }
        let mut pieces = Vec::with_capacity(2);
        if self.start < other.start {
            pieces.push(Range::new(self.start, other.start));
        }
        if other.end < self.end {
            pieces.push(Range::new(other.end, self.end));
        }
        pieces
    }

    /// Iterates over every frame in the range.
    pub fn frames(&self) -> impl Iterator<Item = u32> {
        self.start..self.end
    }
}

impl fmt::Debug for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

impl From<std::ops::Range<u32>> for Range {
    fn from(value: std::ops::Range<u32>) -> Self {
        Range::new(value.start, value.end)
    }
}

/// Sorts ranges and merges the ones that overlap or touch.
pub fn merge_ranges(ranges: impl IntoIterator<Item = Range>) -> Vec<Range> {
    let mut sorted: Vec<Range> = ranges.into_iter().filter(|r| !r.is_empty()).collect();
    sorted.sort();
    let mut merged: Vec<Range> = Vec::with_capacity(sorted.len());
    for range in sorted {
        match merged.last_mut() {
            Some(last) if range.start <= last.end => last.end = last.end.max(range.end),
            _ => merged.push(range),
        }
    }
    merged
}

/// Compacts a set of frame indices into the minimal list of half-open ranges.
pub fn frames_to_ranges(frames: impl IntoIterator<Item = u32>) -> Vec<Range> {
    merge_ranges(
        frames
            .into_iter()
            .filter_map(|f| f.checked_add(1).map(|end| Range::new(f, end))),
    )
}

/// The key an annotation is stored under inside a space.
///
/// Frame-indexed spaces (image, video, root) use [`FrameKey::Frame`];
/// range-indexed spaces (audio, text) use [`FrameKey::Range`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FrameKey {
    Frame(u32),
    Range(Range),
}

impl FrameKey {
    /// Returns true if two keys address overlapping media.
    pub fn overlaps(&self, other: &FrameKey) -> bool {
        match (self, other) {
            (FrameKey::Frame(a), FrameKey::Frame(b)) => a == b,
            (FrameKey::Range(a), FrameKey::Range(b)) => a.overlaps(b),
            (FrameKey::Frame(f), FrameKey::Range(r)) | (FrameKey::Range(r), FrameKey::Frame(f)) => {
                r.contains(*f)
            }
        }
    }

    /// Returns the frame index for frame keys.
    pub fn frame(&self) -> Option<u32> {
        match self {
            FrameKey::Frame(f) => Some(*f),
            FrameKey::Range(_) => None,
        }
    }

    /// Returns the range for range keys.
    pub fn range(&self) -> Option<Range> {
        match self {
            FrameKey::Frame(_) => None,
            FrameKey::Range(r) => Some(*r),
        }
    }

    /// The string form used as a key in label documents (`"12"` or `"10-20"`).
    pub fn to_wire_key(&self) -> String {
        match self {
            FrameKey::Frame(f) => f.to_string(),
            FrameKey::Range(r) => format!("{}-{}", r.start, r.end),
        }
    }

    /// Parses a label document key.
    pub fn parse_wire_key(key: &str) -> Result<Self> {
        let parse = |s: &str| {
            s.trim()
                .parse::<u32>()
                .map_err(|_| LabelError::malformed(format!("invalid frame key '{key}'")))
        };
        match key.split_once('-') {
            Some((start, end)) => Ok(FrameKey::Range(Range::checked(parse(start)?, parse(end)?)?)),
            None => Ok(FrameKey::Frame(parse(key)?)),
        }
    }
}

impl fmt::Debug for FrameKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameKey::Frame(frame) => write!(f, "Frame({frame})"),
            FrameKey::Range(range) => write!(f, "Range{range:?}"),
        }
    }
}

impl fmt::Display for FrameKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire_key())
    }
}

impl From<u32> for FrameKey {
    fn from(value: u32) -> Self {
        FrameKey::Frame(value)
    }
}

impl From<Range> for FrameKey {
    fn from(value: Range) -> Self {
        FrameKey::Range(value)
    }
}

/// A caller-supplied selection of frames or ranges.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Frames(Vec<FrameKey>);

impl Frames {
    pub fn new(keys: impl IntoIterator<Item = FrameKey>) -> Self {
        Self(keys.into_iter().collect())
    }

    pub fn keys(&self) -> &[FrameKey] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Expands the selection into individual frame indices.
    ///
    /// Ranges contribute every frame they cover.
    pub fn to_frame_indices(&self) -> Vec<u32> {
        let mut frames: Vec<u32> = self
            .0
            .iter()
            .flat_map(|key| match key {
                FrameKey::Frame(f) => *f..f.saturating_add(1),
                FrameKey::Range(r) => r.start..r.end,
            })
            .collect();
        frames.sort_unstable();
        frames.dedup();
        frames
    }
}

impl From<u32> for Frames {
    fn from(value: u32) -> Self {
        Frames(vec![FrameKey::Frame(value)])
    }
}

impl From<Range> for Frames {
    fn from(value: Range) -> Self {
        Frames(vec![FrameKey::Range(value)])
    }
}

impl From<FrameKey> for Frames {
    fn from(value: FrameKey) -> Self {
        Frames(vec![value])
    }
}

impl From<Vec<u32>> for Frames {
    fn from(value: Vec<u32>) -> Self {
        Frames(value.into_iter().map(FrameKey::Frame).collect())
    }
}

impl From<&[u32]> for Frames {
    fn from(value: &[u32]) -> Self {
        Frames(value.iter().copied().map(FrameKey::Frame).collect())
    }
}

impl<const N: usize> From<[u32; N]> for Frames {
    fn from(value: [u32; N]) -> Self {
        Frames(value.into_iter().map(FrameKey::Frame).collect())
    }
}

impl From<Vec<Range>> for Frames {
    fn from(value: Vec<Range>) -> Self {
        Frames(value.into_iter().map(FrameKey::Range).collect())
    }
}

impl From<std::ops::Range<u32>> for Frames {
    fn from(value: std::ops::Range<u32>) -> Self {
        Frames(vec![FrameKey::Range(value.into())])
    }
}

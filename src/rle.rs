//! Bitmask run-length codec compatible with the COCO mask format.
//!
//! A [`Mask`] is scanned column by column into alternating
//! background/foreground run lengths, always starting with a (possibly empty)
//! background run. The runs are then packed into a printable string using
//! 5-bit signed variable-length groups offset by ASCII `'0'`. Runs after the
//! third are stored as the difference to the run two positions back.
//!
//! The string form is byte-for-byte identical to `pycocotools`' compressed
//! RLE, so masks can be exchanged with any COCO tooling.

use serde::{Deserialize, Serialize};

use crate::error::{LabelError, Result};

const CHAR_BASE: u8 = 48;
const PAYLOAD_MASK: i64 = 0x1f;
const SIGN_BIT: i64 = 0x10;
const CONTINUE_BIT: i64 = 0x20;
// 12 groups of 5 bits fit into an i64 with room for sign extension.
const MAX_GROUPS: u32 = 12;

/// A boolean raster stored row-major.
#[derive(Clone, PartialEq, Eq)]
pub struct Mask {
    height: usize,
    width: usize,
    data: Vec<bool>,
}

impl Mask {
    /// Creates an all-background mask.
    pub fn empty(height: usize, width: usize) -> Self {
        Self {
            height,
            width,
            data: vec![false; height * width],
        }
    }

    /// Creates a mask from row-major cells.
    pub fn new(height: usize, width: usize, data: Vec<bool>) -> Result<Self> {
        if data.len() != height * width {
            return Err(LabelError::malformed(format!(
                "mask of {height}x{width} needs {} cells, got {}",
                height * width,
                data.len()
            )));
        }
        Ok(Self {
            height,
            width,
            data,
        })
    }

    /// Creates a mask from equally sized rows.
    pub fn from_rows<R: AsRef<[bool]>>(rows: &[R]) -> Result<Self> {
        let height = rows.len();
        let width = rows.first().map_or(0, |r| r.as_ref().len());
        let mut data = Vec::with_capacity(height * width);
        for (i, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            if row.len() != width {
                return Err(LabelError::malformed(format!(
                    "mask row {i} has {} cells, expected {width}",
                    row.len()
                )));
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            height,
            width,
            data,
        })
    }

    /// Creates a mask from an integer raster. Every cell must be exactly 0 or 1;
    /// any other value is rejected rather than truncated.
    pub fn from_u8_raster(height: usize, width: usize, raster: &[u8]) -> Result<Self> {
        if raster.len() != height * width {
            return Err(LabelError::malformed(format!(
                "raster of {height}x{width} needs {} cells, got {}",
                height * width,
                raster.len()
            )));
        }
        let data = raster
            .iter()
            .enumerate()
            .map(|(i, &v)| match v {
                0 => Ok(false),
                1 => Ok(true),
                other => Err(LabelError::malformed(format!(
                    "raster is not boolean: cell ({}, {}) has value {other}",
                    i / width.max(1),
                    i % width.max(1)
                ))),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            height,
            width,
            data,
        })
    }

    /// Parses a text raster: one row per line, cells are `0` or `1`,
    /// optionally separated by whitespace or commas.
    pub fn from_text(text: &str) -> Result<Self> {
        let mut rows: Vec<Vec<bool>> = Vec::new();
        for (line_no, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let row = line
                .chars()
                .filter(|c| !c.is_whitespace() && *c != ',')
                .map(|c| match c {
                    '0' => Ok(false),
                    '1' => Ok(true),
                    other => Err(LabelError::malformed(format!(
                        "raster is not boolean: line {} contains '{other}'",
                        line_no + 1
                    ))),
                })
                .collect::<Result<Vec<_>>>()?;
            rows.push(row);
        }
        Self::from_rows(&rows)
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the cell at `(row, col)`, or `None` when out of bounds.
    pub fn get(&self, row: usize, col: usize) -> Option<bool> {
        (row < self.height && col < self.width).then(|| self.data[row * self.width + col])
    }

    /// Sets the cell at `(row, col)`; out-of-bounds writes are ignored.
    pub fn set(&mut self, row: usize, col: usize, value: bool) {
        if row < self.height && col < self.width {
            self.data[row * self.width + col] = value;
        }
    }

    /// Number of foreground cells.
    pub fn area(&self) -> usize {
        self.data.iter().filter(|&&v| v).count()
    }

    /// Row-major view of the cells.
    pub fn as_slice(&self) -> &[bool] {
        &self.data
    }

    /// Renders the mask in the text form accepted by [`Mask::from_text`].
    pub fn to_text(&self) -> String {
        let mut out = String::with_capacity(self.height * (self.width + 1));
        for row in self.data.chunks(self.width.max(1)).take(self.height) {
            out.extend(row.iter().map(|&v| if v { '1' } else { '0' }));
            out.push('\n');
        }
        out
    }
}

impl std::fmt::Debug for Mask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mask")
            .field("height", &self.height)
            .field("width", &self.width)
            .field("area", &self.area())
            .finish()
    }
}

/// Scans the mask column-major into alternating run lengths.
pub fn mask_to_rle(mask: &Mask) -> Vec<u32> {
    let mut counts = Vec::new();
    let mut current = false;
    let mut run: u32 = 0;
    for col in 0..mask.width {
        for row in 0..mask.height {
            let value = mask.data[row * mask.width + col];
            if value != current {
                counts.push(run);
                run = 0;
                current = value;
            }
            run += 1;
        }
    }
    counts.push(run);
    counts
}

/// Expands run lengths into a mask of the given size.
pub fn rle_to_mask(counts: &[u32], height: usize, width: usize) -> Result<Mask> {
    let total: u64 = counts.iter().map(|&c| u64::from(c)).sum();
    if total != (height * width) as u64 {
        return Err(LabelError::malformed(format!(
            "run lengths sum to {total}, expected {height}x{width} = {}",
            height * width
        )));
    }
    let mut mask = Mask::empty(height, width);
    let mut pos = 0usize;
    let mut value = false;
    for &count in counts {
        if value {
            for idx in pos..pos + count as usize {
                // column-major position back to row-major storage
                let (col, row) = (idx / height, idx % height);
                mask.data[row * width + col] = true;
            }
        }
        pos += count as usize;
        value = !value;
    }
    Ok(mask)
}

/// Packs run lengths into the compressed COCO string form.
pub fn rle_to_string(counts: &[u32]) -> String {
    let mut out = String::with_capacity(counts.len() * 2);
    for (i, &count) in counts.iter().enumerate() {
        let mut x = i64::from(count);
        if i > 2 {
            x -= i64::from(counts[i - 2]);
        }
        loop {
            let mut c = x & PAYLOAD_MASK;
            x >>= 5;
            let more = if c & SIGN_BIT != 0 { x != -1 } else { x != 0 };
            if more {
                c |= CONTINUE_BIT;
            }
            out.push(char::from(c as u8 + CHAR_BASE));
            if !more {
                break;
            }
        }
    }
    out
}

/// Unpacks the compressed COCO string form into run lengths.
pub fn string_to_rle(s: &str) -> Result<Vec<u32>> {
    let bytes = s.as_bytes();
    let mut counts: Vec<u32> = Vec::new();
    let mut pos = 0usize;
    while pos < bytes.len() {
        let mut x: i64 = 0;
        let mut groups: u32 = 0;
        loop {
            let Some(&byte) = bytes.get(pos) else {
                return Err(LabelError::malformed(
                    "RLE string ends in the middle of a run length",
                ));
            };
            if !(CHAR_BASE..CHAR_BASE + 64).contains(&byte) {
                return Err(LabelError::malformed(format!(
                    "invalid character {:?} at offset {pos} in RLE string",
                    char::from(byte)
                )));
            }
            if groups >= MAX_GROUPS {
                return Err(LabelError::malformed(format!(
                    "run length at offset {pos} in RLE string is too large"
                )));
            }
            let c = i64::from(byte - CHAR_BASE);
            x |= (c & PAYLOAD_MASK) << (5 * groups);
            groups += 1;
            pos += 1;
            if c & CONTINUE_BIT == 0 {
                if c & SIGN_BIT != 0 {
                    x |= -1i64 << (5 * groups);
                }
                break;
            }
        }
        if counts.len() > 2 {
            x += i64::from(counts[counts.len() - 2]);
        }
        let count = u32::try_from(x).map_err(|_| {
            LabelError::malformed(format!(
                "run length #{} in RLE string decodes to {x}",
                counts.len()
            ))
        })?;
        counts.push(count);
    }
    Ok(counts)
}

/// Encodes a mask straight to the compressed string.
pub fn encode(mask: &Mask) -> String {
    rle_to_string(&mask_to_rle(mask))
}

/// Decodes a compressed string into a mask of the given size.
pub fn decode(s: &str, height: usize, width: usize) -> Result<Mask> {
    rle_to_mask(&string_to_rle(s)?, height, width)
}

/// Run lengths in either compressed-string or plain-integer form.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RleCounts {
    Compressed(String),
    Runs(Vec<u32>),
}

/// The COCO mask interchange structure: `{"size": [h, w], "counts": ...}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CocoRle {
    /// `[height, width]`
    pub size: [u32; 2],
    pub counts: RleCounts,
}

impl CocoRle {
    /// Encodes a mask into the compressed interchange form.
    pub fn from_mask(mask: &Mask) -> Self {
        Self {
            size: [mask.height as u32, mask.width as u32],
            counts: RleCounts::Compressed(encode(mask)),
        }
    }

    /// Parses the interchange form from JSON. Missing `size` or `counts`
    /// are rejected rather than defaulted.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| LabelError::malformed(format!("invalid COCO RLE structure: {e}")))
    }

    /// Parses the interchange form from an already decoded JSON value.
    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        Self::deserialize(value)
            .map_err(|e| LabelError::malformed(format!("invalid COCO RLE structure: {e}")))
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.size[0] as usize
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.size[1] as usize
    }

    /// Returns the plain run lengths, decompressing if needed.
    pub fn runs(&self) -> Result<Vec<u32>> {
        match &self.counts {
            RleCounts::Compressed(s) => string_to_rle(s),
            RleCounts::Runs(runs) => Ok(runs.clone()),
        }
    }

    /// Returns the compressed string, compressing if needed.
    pub fn compressed(&self) -> String {
        match &self.counts {
            RleCounts::Compressed(s) => s.clone(),
            RleCounts::Runs(runs) => rle_to_string(runs),
        }
    }

    pub fn to_mask(&self) -> Result<Mask> {
        rle_to_mask(&self.runs()?, self.height(), self.width())
    }
}

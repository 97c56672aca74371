//! Reading and writing label documents on disk.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{LabelError, Result};
use crate::label_row::LabelRow;
use crate::ontology::Ontology;

/// Reads a raw label document from a JSON file.
///
/// # Errors
/// Returns an error if the file cannot be read or is not JSON.
pub fn read_document(path: &Path) -> Result<Value> {
    let file = File::open(path).map_err(LabelError::Io)?;
    let reader = BufReader::new(file);

    serde_json::from_reader(reader).map_err(|source| LabelError::WireParse {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes a label document as pretty-printed JSON.
pub fn write_document(path: &Path, document: &Value) -> Result<()> {
    let file = File::create(path).map_err(LabelError::Io)?;
    let mut writer = BufWriter::new(file);

    serde_json::to_writer_pretty(&mut writer, document).map_err(|source| LabelError::WireWrite {
        path: path.to_path_buf(),
        source,
    })?;
    writer.flush().map_err(LabelError::Io)
}

/// Reads and decodes a label row from a JSON file.
pub fn read_label_row(ontology: Arc<Ontology>, path: &Path) -> Result<LabelRow> {
    let document = read_document(path)?;
    LabelRow::from_wire_document(ontology, &document)
}

/// Encodes a label row and writes it to `path`.
///
/// # Errors
/// Fails with `NotInitialised` for rows whose labels were never loaded, and
/// with `DimensionMismatch` when a bitmask does not match its media.
pub fn write_label_row(path: &Path, row: &LabelRow) -> Result<()> {
    let document = row.to_wire_document()?;
    write_document(path, &document)
}

/// Decodes a label row from a JSON string.
///
/// Useful for testing without file I/O.
pub fn from_json_str(ontology: Arc<Ontology>, json: &str) -> Result<LabelRow> {
    let document: Value = serde_json::from_str(json)
        .map_err(|e| LabelError::malformed(format!("invalid JSON: {e}")))?;
    LabelRow::from_wire_document(ontology, &document)
}

pub fn from_json_slice(ontology: Arc<Ontology>, bytes: &[u8]) -> Result<LabelRow> {
    let document: Value = serde_json::from_slice(bytes)
        .map_err(|e| LabelError::malformed(format!("invalid JSON: {e}")))?;
    LabelRow::from_wire_document(ontology, &document)
}

/// Encodes a label row as a pretty-printed JSON string.
pub fn to_json_string(row: &LabelRow) -> Result<String> {
    let document = row.to_wire_document()?;
    serde_json::to_string_pretty(&document)
        .map_err(|e| LabelError::malformed(format!("document is not serializable: {e}")))
}

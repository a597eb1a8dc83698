//! Parsed snapshot records.
//!
//! Region headers are data discovered at parse time, not a compile-time
//! schema, so a record is an insertion-ordered list of header→value pairs
//! that serializes as a map.

use serde::ser::{Serialize, SerializeMap, Serializer};

/// One data row: ordered column-header → cell-value mapping, both trimmed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExportRecord {
    fields: Vec<(String, String)>,
}

impl ExportRecord {
    pub fn new(fields: Vec<(String, String)>) -> Self {
        Self { fields }
    }

    /// Header/value pairs in column order.
    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    /// Value for a header, if the column exists.
    pub fn get(&self, header: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == header)
            .map(|(_, v)| v.as_str())
    }

    /// Headers in column order.
    pub fn headers(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    /// Values in column order.
    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serialize for ExportRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// A data row that could not be reconciled with the header row.
///
/// Captured and reported alongside the good records; never an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BadRow {
    /// The raw row as read from the snapshot (tab-joined, untrimmed).
    pub raw: String,
    /// The field at the position where reconciliation failed — the first
    /// surplus field on a long row, empty on a short row.
    pub field: String,
}

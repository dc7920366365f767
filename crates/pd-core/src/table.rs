//! Core table types for representing the active dataset

use crate::schema::HeaderSet;
use serde::ser::{Serialize, SerializeMap, Serializer};

/// Name of the surrogate identifier column
pub const ID_COLUMN: &str = "id";

/// A column definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Column name as it appears in the header line
    pub name: String,
    /// Column index (0-based), also the record value position
    pub index: usize,
}

impl Column {
    /// Create a new column
    pub fn new(name: String, index: usize) -> Self {
        Self { name, index }
    }
}

/// A stored record: surrogate id plus one value per header column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Store-assigned identifier, not part of the source file
    pub id: i64,
    /// Values aligned with the header set; `None` is a NULL cell
    pub values: Vec<Option<String>>,
}

impl Record {
    /// Create a new record
    pub fn new(id: i64, values: Vec<Option<String>>) -> Self {
        Self { id, values }
    }

    /// Get a value by column index
    pub fn get(&self, index: usize) -> Option<&str> {
        self.values.get(index).and_then(|v| v.as_deref())
    }

    /// Values as plain strings, NULL rendered as empty
    pub fn text_values(&self) -> Vec<&str> {
        self.values
            .iter()
            .map(|v| v.as_deref().unwrap_or_default())
            .collect()
    }
}

/// All current records sharing one header set, ordered by id
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    /// Column definitions
    pub headers: HeaderSet,
    /// Row data
    pub records: Vec<Record>,
}

impl Table {
    /// Create a new empty table
    pub fn new(headers: HeaderSet) -> Self {
        Self {
            headers,
            records: Vec::new(),
        }
    }

    /// Get the number of rows
    pub fn row_count(&self) -> usize {
        self.records.len()
    }
}

/// Serializes a record as a JSON-style object: `id` first, then one key per
/// header in header order
pub struct RecordView<'a> {
    pub headers: &'a HeaderSet,
    pub record: &'a Record,
}

impl Serialize for RecordView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.headers.len() + 1))?;
        map.serialize_entry(ID_COLUMN, &self.record.id)?;
        for column in self.headers.iter() {
            map.serialize_entry(&column.name, &self.record.get(column.index))?;
        }
        map.end()
    }
}

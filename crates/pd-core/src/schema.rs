//! Schema synchronization: header validation and table (re)definition
//!
//! The header line of an upload is the only schema description there is. It
//! is validated into a [`HeaderSet`] before anything in the store changes,
//! then the `records` table is dropped and recreated with one text column per
//! header. Physical columns are positional (`c1`, `c2`, ...) so header text
//! never becomes part of an SQL identifier; the name-to-position mapping is
//! persisted in `dataset_columns`.

use crate::error::{Error, Result};
use crate::table::{Column, ID_COLUMN};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::ser::{Serialize, Serializer};
use std::collections::HashSet;

/// Table holding the active records
pub const RECORDS_TABLE: &str = "records";

/// Persisted header set, one row per column in order
const CREATE_COLUMNS: &str = r#"
CREATE TABLE IF NOT EXISTS dataset_columns (
    position INTEGER PRIMARY KEY,
    name     TEXT NOT NULL
)
"#;

/// Key/value metadata about the active generation
const CREATE_META: &str = r#"
CREATE TABLE IF NOT EXISTS dataset_meta (
    key   TEXT PRIMARY KEY,
    value TEXT
)
"#;

const META_INGESTED_AT: &str = "ingested_at";

/// Ordered, unique column names describing the active schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderSet {
    columns: Vec<Column>,
}

impl HeaderSet {
    /// Validate header tokens into a header set
    ///
    /// Fails with [`Error::EmptyHeader`] if there are no names or any name is
    /// empty, and with [`Error::DuplicateColumn`] if a name repeats or is the
    /// reserved identifier column.
    pub fn from_names(names: Vec<String>) -> Result<Self> {
        if names.iter().all(|n| n.is_empty()) {
            return Err(Error::EmptyHeader { position: 0 });
        }

        let mut seen: HashSet<&str> = HashSet::with_capacity(names.len());
        for (idx, name) in names.iter().enumerate() {
            if name.is_empty() {
                return Err(Error::EmptyHeader { position: idx + 1 });
            }
            if name == ID_COLUMN || !seen.insert(name.as_str()) {
                return Err(Error::DuplicateColumn(name.clone()));
            }
        }

        let columns = names
            .into_iter()
            .enumerate()
            .map(|(i, name)| Column::new(name, i))
            .collect();

        Ok(Self { columns })
    }

    /// Get the number of columns
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Iterate over the columns in order
    pub fn iter(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter()
    }

    /// Column names in order
    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Find a column by name
    pub fn find_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Position of a column by name
    pub fn position(&self, name: &str) -> Option<usize> {
        self.find_column(name).map(|c| c.index)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find_column(name).is_some()
    }

    /// Comma-separated physical column list, in header order
    pub(crate) fn physical_columns(&self) -> String {
        (0..self.len())
            .map(physical_column)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl Serialize for HeaderSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(self.columns.iter().map(|c| c.name.as_str()))
    }
}

/// Physical storage column for a header position
pub(crate) fn physical_column(index: usize) -> String {
    format!("c{}", index + 1)
}

/// Create the catalog tables if they don't exist
pub fn init_catalog(conn: &Connection) -> Result<()> {
    conn.execute_batch(CREATE_COLUMNS)?;
    conn.execute_batch(CREATE_META)?;
    Ok(())
}

/// Load the persisted header set, if a dataset is active
pub fn load_schema(conn: &Connection) -> Result<Option<HeaderSet>> {
    let table_exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
        params![RECORDS_TABLE],
        |row| row.get(0),
    )?;
    if !table_exists {
        return Ok(None);
    }

    let mut stmt = conn.prepare("SELECT name FROM dataset_columns ORDER BY position")?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    if names.is_empty() {
        return Ok(None);
    }
    HeaderSet::from_names(names).map(Some)
}

/// Drop the current table and create an empty one shaped by `headers`
///
/// Must run inside the same transaction as the row load so that observers
/// see either the old generation or the complete new one.
pub fn replace_schema(conn: &Connection, headers: &HeaderSet, ingested_at: DateTime<Utc>) -> Result<()> {
    conn.execute_batch(&format!("DROP TABLE IF EXISTS {RECORDS_TABLE}"))?;
    conn.execute("DELETE FROM dataset_columns", [])?;

    let columns: Vec<String> = (0..headers.len())
        .map(|i| format!("{} TEXT", physical_column(i)))
        .collect();
    conn.execute_batch(&format!(
        "CREATE TABLE {RECORDS_TABLE} (id INTEGER PRIMARY KEY AUTOINCREMENT, {})",
        columns.join(", ")
    ))?;

    let mut insert = conn.prepare("INSERT INTO dataset_columns (position, name) VALUES (?1, ?2)")?;
    for column in headers.iter() {
        insert.execute(params![column.index as i64, column.name])?;
    }

    conn.execute(
        "INSERT OR REPLACE INTO dataset_meta (key, value) VALUES (?1, ?2)",
        params![META_INGESTED_AT, ingested_at.to_rfc3339()],
    )?;
    Ok(())
}

/// Drop the table and forget the header set
pub fn clear_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(&format!("DROP TABLE IF EXISTS {RECORDS_TABLE}"))?;
    conn.execute("DELETE FROM dataset_columns", [])?;
    conn.execute("DELETE FROM dataset_meta", [])?;
    Ok(())
}

/// When the active generation was ingested
pub fn ingested_at(conn: &Connection) -> Result<Option<DateTime<Utc>>> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM dataset_meta WHERE key = ?1",
            params![META_INGESTED_AT],
            |row| row.get(0),
        )
        .optional()?
        .flatten();

    Ok(value
        .and_then(|v| DateTime::parse_from_rfc3339(&v).ok())
        .map(|ts| ts.with_timezone(&Utc)))
}

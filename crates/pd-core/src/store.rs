//! SQLite storage for the active dataset
//!
//! `Store` owns the connection and is not thread-safe on its own; the
//! [`Dataset`](crate::dataset::Dataset) serializes access to it.

use crate::error::Result;
use crate::schema::{self, HeaderSet, RECORDS_TABLE};
use crate::table::{Record, Table};
use rusqlite::functions::FunctionFlags;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use std::path::Path;
use tracing::debug;

/// SQL function used for case-insensitive matching (Unicode lowercase)
pub(crate) const FOLD_CASE_FN: &str = "fold_case";

/// Relational storage backing the dataset
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) a file-backed store
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "opening store");
        Self::from_connection(Connection::open(path)?)
    }

    /// Open a store that lives only as long as this process
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.create_scalar_function(
            FOLD_CASE_FN,
            1,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            |ctx| {
                let value: Option<String> = ctx.get(0)?;
                Ok(value.map(|v| v.to_lowercase()))
            },
        )?;
        schema::init_catalog(&conn)?;
        Ok(Self { conn })
    }

    /// Borrow the connection for reads
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Start a write transaction
    pub fn transaction(&mut self) -> Result<Transaction<'_>> {
        Ok(self.conn.transaction()?)
    }
}

/// Number of stored records (zero when no table exists)
pub fn record_count(conn: &Connection, headers: Option<&HeaderSet>) -> Result<u64> {
    if headers.is_none() {
        return Ok(0);
    }
    let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {RECORDS_TABLE}"), [], |row| {
        row.get(0)
    })?;
    Ok(count.max(0) as u64)
}

/// Fetch a single record by id
pub fn fetch_record(conn: &Connection, headers: &HeaderSet, id: i64) -> Result<Option<Record>> {
    let sql = format!(
        "SELECT id, {} FROM {RECORDS_TABLE} WHERE id = ?1",
        headers.physical_columns()
    );
    let record = conn
        .query_row(&sql, params![id], |row| read_record(row, headers.len()))
        .optional()?;
    Ok(record)
}

/// Read the whole table in id order
pub fn fetch_table(conn: &Connection, headers: &HeaderSet) -> Result<Table> {
    let sql = format!(
        "SELECT id, {} FROM {RECORDS_TABLE} ORDER BY id",
        headers.physical_columns()
    );
    let mut stmt = conn.prepare(&sql)?;
    let records = stmt
        .query_map([], |row| read_record(row, headers.len()))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(Table {
        headers: headers.clone(),
        records,
    })
}

/// Decode a row shaped `id, c1, ..., cN`
pub(crate) fn read_record(row: &Row<'_>, width: usize) -> rusqlite::Result<Record> {
    let id: i64 = row.get(0)?;
    let values = (1..=width)
        .map(|i| row.get::<_, Option<String>>(i))
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(Record::new(id, values))
}

//! Single-record updates
//!
//! An update targets one record by surrogate id and changes any subset of
//! its fields. After the row is written the mirror is regenerated, so the
//! next read of either the store or the mirror sees the new value.
//!
//! Stored cells are always text. A cleared cell becomes the empty string,
//! the same value ingest produces for a blank token, so the mirror re-parses
//! to exactly what the store holds.

use crate::error::{Error, Result};
use crate::mirror::{MirrorOutcome, MirrorWriter};
use crate::parser::contains_reserved;
use crate::schema::{physical_column, HeaderSet, RECORDS_TABLE};
use crate::table::ID_COLUMN;
use rusqlite::types::Value;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::debug;

/// An update to one record
///
/// Serializes as a flat object, `{"id": 3, "city": "Oslo"}`. Numbers and
/// booleans are stored as their JSON text; `null` clears the cell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRequest {
    /// Target record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Column name -> new value
    #[serde(flatten)]
    pub fields: BTreeMap<String, JsonValue>,
}

impl UpdateRequest {
    /// Create an update for a record
    pub fn new(id: i64) -> Self {
        Self {
            id: Some(id),
            fields: BTreeMap::new(),
        }
    }

    /// Set a field value
    pub fn set(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(column.into(), JsonValue::String(value.into()));
        self
    }

    /// Clear a field
    pub fn clear(mut self, column: impl Into<String>) -> Self {
        self.fields.insert(column.into(), JsonValue::Null);
        self
    }

    /// Load an update request from JSON
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| Error::FileRead {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&content).map_err(Error::Json)
    }
}

/// Result of a successful update
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateReport {
    /// Updated record
    pub id: i64,
    /// Number of fields written
    pub fields_updated: usize,
    /// Mirror rewrite result; a failure here does not undo the update
    pub mirror: MirrorOutcome,
}

/// Apply an update and regenerate the mirror
pub fn apply_update(
    conn: &Connection,
    headers: Option<&HeaderSet>,
    request: &UpdateRequest,
    mirror: &MirrorWriter,
) -> Result<UpdateReport> {
    let id = request.id.ok_or(Error::MissingIdentifier)?;
    let assignments = resolve_fields(headers, request)?;

    let Some(headers) = headers else {
        return Err(Error::RecordNotFound(id));
    };

    if assignments.is_empty() {
        let exists: bool = conn.query_row(
            &format!("SELECT EXISTS(SELECT 1 FROM {RECORDS_TABLE} WHERE {ID_COLUMN} = ?1)"),
            params![id],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(Error::RecordNotFound(id));
        }
    } else {
        let set_clause = assignments
            .iter()
            .enumerate()
            .map(|(i, (idx, _))| format!("{} = ?{}", physical_column(*idx), i + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE {RECORDS_TABLE} SET {set_clause} WHERE {ID_COLUMN} = ?{}",
            assignments.len() + 1
        );

        let values = assignments
            .iter()
            .map(|(_, value)| value.clone())
            .chain(std::iter::once(Value::Integer(id)));
        let changed = conn.execute(&sql, rusqlite::params_from_iter(values))?;
        if changed == 0 {
            return Err(Error::RecordNotFound(id));
        }
    }

    debug!(id, fields = assignments.len(), "record updated");
    let mirror = mirror.sync(conn, Some(headers));

    Ok(UpdateReport {
        id,
        fields_updated: assignments.len(),
        mirror,
    })
}

/// Map field names to column positions and normalize the values
fn resolve_fields(headers: Option<&HeaderSet>, request: &UpdateRequest) -> Result<Vec<(usize, Value)>> {
    request
        .fields
        .iter()
        .map(|(name, value)| -> Result<(usize, Value)> {
            let idx = headers
                .and_then(|h| h.position(name))
                .ok_or_else(|| Error::UnknownColumn(name.clone()))?;
            Ok((idx, Value::Text(field_text(name, value)?)))
        })
        .collect()
}

/// Text stored for one JSON field value
fn field_text(column: &str, value: &JsonValue) -> Result<String> {
    let text = match value {
        JsonValue::Null => return Ok(String::new()),
        JsonValue::String(text) => text.clone(),
        JsonValue::Bool(flag) => flag.to_string(),
        JsonValue::Number(number) => number.to_string(),
        JsonValue::Array(_) | JsonValue::Object(_) => {
            return Err(Error::InvalidValue {
                column: column.to_string(),
            })
        }
    };

    if contains_reserved(&text) {
        return Err(Error::ReservedCharacter {
            column: column.to_string(),
        });
    }
    Ok(text.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::load_rows;
    use crate::parser::parse_delimited;
    use crate::schema::replace_schema;
    use crate::store::{fetch_record, Store};
    use chrono::Utc;

    fn setup() -> (Store, HeaderSet) {
        let parsed = parse_delimited("name|city\nAda|London\nAlan|Wilmslow\n").unwrap();
        let headers = HeaderSet::from_names(parsed.headers).unwrap();
        let mut store = Store::open_in_memory().unwrap();
        let tx = store.transaction().unwrap();
        replace_schema(&tx, &headers, Utc::now()).unwrap();
        load_rows(&tx, &headers, &parsed.rows).unwrap();
        tx.commit().unwrap();
        (store, headers)
    }

    #[test]
    fn test_update_request_builder() {
        let request = UpdateRequest::new(42).set("name", "NewValue").clear("city");
        assert_eq!(request.id, Some(42));
        assert_eq!(request.fields["name"], JsonValue::from("NewValue"));
        assert_eq!(request.fields["city"], JsonValue::Null);
    }

    #[test]
    fn test_update_request_serialization() {
        let request: UpdateRequest =
            serde_json::from_str(r#"{"id": 2, "city": "Bletchley", "name": null}"#).unwrap();
        assert_eq!(request, UpdateRequest::new(2).set("city", "Bletchley").clear("name"));

        let json = serde_json::to_string(&UpdateRequest::new(1).set("a", "b")).unwrap();
        assert_eq!(json, r#"{"id":1,"a":"b"}"#);

        let missing: UpdateRequest = serde_json::from_str(r#"{"city": "x"}"#).unwrap();
        assert_eq!(missing.id, None);
    }

    #[test]
    fn test_update_applies_values() {
        let (store, headers) = setup();
        let request = UpdateRequest::new(2).set("city", "  Bletchley ");
        let report =
            apply_update(store.connection(), Some(&headers), &request, &MirrorWriter::default())
                .unwrap();

        assert_eq!(report.fields_updated, 1);
        assert_eq!(report.mirror, MirrorOutcome::Skipped);

        let record = fetch_record(store.connection(), &headers, 2).unwrap().unwrap();
        assert_eq!(record.text_values(), vec!["Alan", "Bletchley"]);
    }

    #[test]
    fn test_update_clears_value() {
        let (store, headers) = setup();
        let request = UpdateRequest::new(1).clear("name");
        apply_update(store.connection(), Some(&headers), &request, &MirrorWriter::default())
            .unwrap();

        let record = fetch_record(store.connection(), &headers, 1).unwrap().unwrap();
        assert_eq!(record.values[0], Some(String::new()));
        assert_eq!(record.text_values(), vec!["", "London"]);
    }

    #[test]
    fn test_update_accepts_json_scalars() {
        let (store, headers) = setup();
        let request: UpdateRequest =
            serde_json::from_str(r#"{"id": 1, "name": 3, "city": true}"#).unwrap();
        apply_update(store.connection(), Some(&headers), &request, &MirrorWriter::default())
            .unwrap();

        let record = fetch_record(store.connection(), &headers, 1).unwrap().unwrap();
        assert_eq!(record.text_values(), vec!["3", "true"]);

        let request: UpdateRequest =
            serde_json::from_str(r#"{"id": 1, "city": ["a", "b"]}"#).unwrap();
        let err = apply_update(store.connection(), Some(&headers), &request, &MirrorWriter::default())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidValue { ref column } if column == "city"));

        let record = fetch_record(store.connection(), &headers, 1).unwrap().unwrap();
        assert_eq!(record.text_values(), vec!["3", "true"]);
    }

    #[test]
    fn test_update_errors() {
        let (store, headers) = setup();
        let conn = store.connection();
        let writer = MirrorWriter::default();

        let err = apply_update(conn, Some(&headers), &UpdateRequest::default(), &writer).unwrap_err();
        assert!(matches!(err, Error::MissingIdentifier));

        let request = UpdateRequest::new(1).set("country", "UK");
        let err = apply_update(conn, Some(&headers), &request, &writer).unwrap_err();
        assert!(matches!(err, Error::UnknownColumn(ref c) if c == "country"));

        let request = UpdateRequest::new(1).set("id", "7");
        let err = apply_update(conn, Some(&headers), &request, &writer).unwrap_err();
        assert!(matches!(err, Error::UnknownColumn(_)));

        let request = UpdateRequest::new(1).set("city", "a|b");
        let err = apply_update(conn, Some(&headers), &request, &writer).unwrap_err();
        assert!(matches!(err, Error::ReservedCharacter { .. }));

        let request = UpdateRequest::new(99).set("city", "Nowhere");
        let err = apply_update(conn, Some(&headers), &request, &writer).unwrap_err();
        assert!(matches!(err, Error::RecordNotFound(99)));

        let err = apply_update(conn, Some(&headers), &UpdateRequest::new(99), &writer).unwrap_err();
        assert!(matches!(err, Error::RecordNotFound(99)));
    }

    #[test]
    fn test_update_rewrites_mirror() {
        let (store, headers) = setup();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.txt");
        let writer = MirrorWriter::new(Some(path.clone()));

        let request = UpdateRequest::new(1).set("city", "Cambridge");
        let report = apply_update(store.connection(), Some(&headers), &request, &writer).unwrap();

        assert!(matches!(report.mirror, MirrorOutcome::Written { .. }));
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "|name|city|\n|Ada|Cambridge|\n|Alan|Wilmslow|\n"
        );
    }
}

//! Row loading: validates parsed rows against the header set and inserts them

use crate::error::{Error, Result};
use crate::parser::RawRow;
use crate::schema::{HeaderSet, RECORDS_TABLE};
use rusqlite::Connection;
use serde::Serialize;
use tracing::warn;

/// Outcome of loading rows into a fresh table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    /// Rows inserted
    pub accepted: usize,
    /// Rows skipped because their width didn't match the header
    pub rejected: usize,
    /// Source line numbers of the rejected rows
    pub rejected_lines: Vec<usize>,
}

/// Insert rows into the (empty) records table
///
/// Rows with the wrong number of values are skipped and counted; the rest are
/// inserted in file order, so ids follow file order.
pub fn load_rows(conn: &Connection, headers: &HeaderSet, rows: &[RawRow]) -> Result<LoadReport> {
    let placeholders = (1..=headers.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    let mut insert = conn.prepare(&format!(
        "INSERT INTO {RECORDS_TABLE} ({}) VALUES ({placeholders})",
        headers.physical_columns()
    ))?;

    let mut report = LoadReport::default();
    for row in rows {
        if let Err(e) = check_shape(headers, row) {
            warn!("skipping row: {}", e);
            report.rejected += 1;
            report.rejected_lines.push(row.line);
            continue;
        }

        insert.execute(rusqlite::params_from_iter(row.values.iter()))?;
        report.accepted += 1;
    }

    Ok(report)
}

fn check_shape(headers: &HeaderSet, row: &RawRow) -> Result<()> {
    if row.width() != headers.len() {
        return Err(Error::RowShapeMismatch {
            line: row.line,
            expected: headers.len(),
            found: row.width(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_delimited;
    use crate::schema::replace_schema;
    use crate::store::{fetch_table, Store};
    use chrono::Utc;

    fn load(input: &str) -> (Store, HeaderSet, LoadReport) {
        let parsed = parse_delimited(input).unwrap();
        let headers = HeaderSet::from_names(parsed.headers).unwrap();
        let mut store = Store::open_in_memory().unwrap();

        let tx = store.transaction().unwrap();
        replace_schema(&tx, &headers, Utc::now()).unwrap();
        let report = load_rows(&tx, &headers, &parsed.rows).unwrap();
        tx.commit().unwrap();

        (store, headers, report)
    }

    #[test]
    fn test_load_all_rows() {
        let (store, headers, report) = load("a|b\n1|2\n3|4\n5|6\n");

        assert_eq!(report.accepted, 3);
        assert_eq!(report.rejected, 0);

        let table = fetch_table(store.connection(), &headers).unwrap();
        let ids: Vec<i64> = table.records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_load_skips_wrong_width() {
        let (store, headers, report) = load("a|b|c\n1|2|3\nx|y\n4|5|6\n");

        assert_eq!(report.accepted, 2);
        assert_eq!(report.rejected, 1);
        assert_eq!(report.rejected_lines, vec![3]);

        let table = fetch_table(store.connection(), &headers).unwrap();
        assert_eq!(table.records[0].text_values(), vec!["1", "2", "3"]);
        assert_eq!(table.records[1].text_values(), vec!["4", "5", "6"]);
    }

    #[test]
    fn test_load_zero_accepted() {
        let (_store, _headers, report) = load("a|b\n1\n1|2|3\n");

        assert_eq!(report.accepted, 0);
        assert_eq!(report.rejected, 2);
    }

    #[test]
    fn test_load_keeps_empty_values() {
        let (store, headers, report) = load("|a|b|c|\n|1||3|\n");

        assert_eq!(report.accepted, 1);
        let table = fetch_table(store.connection(), &headers).unwrap();
        assert_eq!(table.records[0].get(1), Some(""));
    }
}

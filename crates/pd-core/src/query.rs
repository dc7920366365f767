//! Query engine: paginated, filtered and sorted reads of the active table

use crate::error::{Error, Result};
use crate::schema::{physical_column, HeaderSet, RECORDS_TABLE};
use crate::store::{read_record, FOLD_CASE_FN};
use crate::table::{Record, RecordView, ID_COLUMN};
use rusqlite::types::Value;
use rusqlite::Connection;
use serde::ser::{Serialize, SerializeStruct, Serializer};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::num::ParseIntError;
use std::str::FromStr;
use tracing::debug;

/// Sort direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    /// Parse a request parameter; anything other than "desc" sorts ascending
    pub fn from_param(value: &str) -> Self {
        if value.eq_ignore_ascii_case("desc") {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        }
    }

    fn sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Sort key for a query
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Sort {
    pub column: String,
    #[serde(default)]
    pub direction: SortDirection,
}

/// Page size; `Unbounded` returns every matching row
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Limit {
    Bounded(usize),
    #[default]
    Unbounded,
}

impl Limit {
    fn sql_value(self) -> i64 {
        match self {
            Limit::Bounded(n) => i64::try_from(n).unwrap_or(i64::MAX),
            // SQLite treats a negative LIMIT as no limit
            Limit::Unbounded => -1,
        }
    }
}

impl FromStr for Limit {
    type Err = ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("all") {
            Ok(Limit::Unbounded)
        } else {
            s.parse().map(Limit::Bounded)
        }
    }
}

/// A read request against the active table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryRequest {
    /// Rows to skip
    pub offset: usize,
    /// Page size
    pub limit: Limit,
    /// Column name -> substring; all must match
    pub filters: BTreeMap<String, String>,
    /// Optional sort key; rows are ordered by id otherwise
    pub sort: Option<Sort>,
}

impl QueryRequest {
    /// Request one page
    pub fn page(offset: usize, limit: Limit) -> Self {
        Self {
            offset,
            limit,
            ..Self::default()
        }
    }

    /// Add a column filter
    pub fn filter(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(column.into(), value.into());
        self
    }

    /// Set the sort key
    pub fn sort_by(mut self, column: impl Into<String>, direction: SortDirection) -> Self {
        self.sort = Some(Sort {
            column: column.into(),
            direction,
        });
        self
    }
}

/// One page of matching records
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPage {
    /// Active header set, `None` when no dataset is loaded
    pub headers: Option<HeaderSet>,
    /// Records on this page
    pub records: Vec<Record>,
    /// Number of records matching the filters, before pagination
    pub total: u64,
}

impl QueryPage {
    fn empty(headers: Option<HeaderSet>) -> Self {
        Self {
            headers,
            records: Vec::new(),
            total: 0,
        }
    }
}

impl Serialize for QueryPage {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let names = self.headers.as_ref().map(|h| h.names()).unwrap_or_default();
        let mut s = serializer.serialize_struct("QueryPage", 3)?;
        s.serialize_field("total", &self.total)?;
        s.serialize_field("headers", &names)?;
        s.serialize_field("data", &PageRows(self))?;
        s.end()
    }
}

struct PageRows<'a>(&'a QueryPage);

impl Serialize for PageRows<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match &self.0.headers {
            Some(headers) => serializer.collect_seq(
                self.0
                    .records
                    .iter()
                    .map(|record| RecordView { headers, record }),
            ),
            None => serializer.collect_seq(std::iter::empty::<RecordView<'_>>()),
        }
    }
}

/// A filter or sort target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnRef {
    Id,
    Field(usize),
}

impl ColumnRef {
    fn resolve(headers: Option<&HeaderSet>, name: &str) -> Result<Self> {
        if name == ID_COLUMN {
            return Ok(ColumnRef::Id);
        }
        headers
            .and_then(|h| h.position(name))
            .map(ColumnRef::Field)
            .ok_or_else(|| Error::UnknownColumn(name.to_string()))
    }

    fn sql(self) -> String {
        match self {
            ColumnRef::Id => ID_COLUMN.to_string(),
            ColumnRef::Field(idx) => physical_column(idx),
        }
    }

    fn match_expr(self, param: usize) -> String {
        match self {
            ColumnRef::Id => format!("instr(CAST({ID_COLUMN} AS TEXT), ?{param}) > 0"),
            ColumnRef::Field(idx) => {
                format!("instr({FOLD_CASE_FN}({}), ?{param}) > 0", physical_column(idx))
            }
        }
    }
}

/// Run a query against the active table
///
/// The count and the page are read inside one transaction so they describe
/// the same snapshot.
pub fn run_query(
    conn: &Connection,
    headers: Option<&HeaderSet>,
    request: &QueryRequest,
) -> Result<QueryPage> {
    let mut conditions = Vec::new();
    let mut params: Vec<Value> = Vec::new();

    for (column, needle) in &request.filters {
        let column = ColumnRef::resolve(headers, column)?;
        if needle.is_empty() {
            continue;
        }
        params.push(Value::Text(needle.to_lowercase()));
        conditions.push(column.match_expr(params.len()));
    }

    let order = match &request.sort {
        Some(sort) => match ColumnRef::resolve(headers, &sort.column)? {
            ColumnRef::Id => format!("ORDER BY {ID_COLUMN} {}", sort.direction.sql()),
            column => format!(
                "ORDER BY {} {}, {ID_COLUMN} ASC",
                column.sql(),
                sort.direction.sql()
            ),
        },
        None => format!("ORDER BY {ID_COLUMN} ASC"),
    };

    let Some(headers) = headers else {
        return Ok(QueryPage::empty(None));
    };

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    let tx = conn.unchecked_transaction()?;

    let count_sql = format!("SELECT COUNT(*) FROM {RECORDS_TABLE} {where_clause}");
    let total: i64 = tx.query_row(&count_sql, rusqlite::params_from_iter(params.iter()), |row| {
        row.get(0)
    })?;

    let limit_param = params.len() + 1;
    let offset_param = params.len() + 2;
    params.push(Value::Integer(request.limit.sql_value()));
    params.push(Value::Integer(
        i64::try_from(request.offset).unwrap_or(i64::MAX),
    ));

    let data_sql = format!(
        "SELECT {ID_COLUMN}, {} FROM {RECORDS_TABLE} {where_clause} {order} LIMIT ?{limit_param} OFFSET ?{offset_param}",
        headers.physical_columns()
    );
    debug!(sql = %data_sql, "running query");

    let records = {
        let mut stmt = tx.prepare(&data_sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), |row| {
            read_record(row, headers.len())
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()?
    };
    tx.finish()?;

    Ok(QueryPage {
        headers: Some(headers.clone()),
        records,
        total: total.max(0) as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::load_rows;
    use crate::parser::parse_delimited;
    use crate::schema::replace_schema;
    use crate::store::Store;
    use chrono::Utc;

    const PEOPLE: &str = "\
name|city|team
Alice|Berlin|Red
bob|Boston|Blue
Carol|berlin|Blue
Dave|Paris|Red
Émile|Zürich|Green
";

    fn setup(input: &str) -> (Store, HeaderSet) {
        let parsed = parse_delimited(input).unwrap();
        let headers = HeaderSet::from_names(parsed.headers).unwrap();
        let mut store = Store::open_in_memory().unwrap();
        let tx = store.transaction().unwrap();
        replace_schema(&tx, &headers, Utc::now()).unwrap();
        load_rows(&tx, &headers, &parsed.rows).unwrap();
        tx.commit().unwrap();
        (store, headers)
    }

    fn names(page: &QueryPage) -> Vec<&str> {
        page.records.iter().map(|r| r.get(0).unwrap()).collect()
    }

    #[test]
    fn test_query_all() {
        let (store, headers) = setup(PEOPLE);
        let page = run_query(store.connection(), Some(&headers), &QueryRequest::default()).unwrap();

        assert_eq!(page.total, 5);
        assert_eq!(names(&page), vec!["Alice", "bob", "Carol", "Dave", "Émile"]);
    }

    #[test]
    fn test_query_pagination_reports_filtered_total() {
        let (store, headers) = setup(PEOPLE);
        let request = QueryRequest::page(1, Limit::Bounded(2));
        let page = run_query(store.connection(), Some(&headers), &request).unwrap();

        assert_eq!(page.total, 5);
        assert_eq!(names(&page), vec!["bob", "Carol"]);

        let request = QueryRequest::page(0, Limit::Bounded(1)).filter("team", "blue");
        let page = run_query(store.connection(), Some(&headers), &request).unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(names(&page), vec!["bob"]);
    }

    #[test]
    fn test_query_filter_case_insensitive_substring() {
        let (store, headers) = setup(PEOPLE);
        let request = QueryRequest::default().filter("city", "ERL");
        let page = run_query(store.connection(), Some(&headers), &request).unwrap();

        assert_eq!(names(&page), vec!["Alice", "Carol"]);

        let request = QueryRequest::default().filter("city", "zÜR");
        let page = run_query(store.connection(), Some(&headers), &request).unwrap();
        assert_eq!(names(&page), vec!["Émile"]);
    }

    #[test]
    fn test_query_filters_are_conjunctive() {
        let (store, headers) = setup(PEOPLE);
        let request = QueryRequest::default()
            .filter("city", "berlin")
            .filter("team", "blue");
        let page = run_query(store.connection(), Some(&headers), &request).unwrap();

        assert_eq!(page.total, 1);
        assert_eq!(names(&page), vec!["Carol"]);
    }

    #[test]
    fn test_query_empty_filter_is_ignored() {
        let (store, headers) = setup(PEOPLE);
        let request = QueryRequest::default().filter("city", "");
        let page = run_query(store.connection(), Some(&headers), &request).unwrap();
        assert_eq!(page.total, 5);
    }

    #[test]
    fn test_query_like_wildcards_are_literal() {
        let (store, headers) = setup("a\n100%\n1000\nx_y\nxzy\n");
        let request = QueryRequest::default().filter("a", "0%");
        let page = run_query(store.connection(), Some(&headers), &request).unwrap();
        assert_eq!(names(&page), vec!["100%"]);

        let request = QueryRequest::default().filter("a", "_");
        let page = run_query(store.connection(), Some(&headers), &request).unwrap();
        assert_eq!(names(&page), vec!["x_y"]);
    }

    #[test]
    fn test_query_filter_by_id() {
        let (store, headers) = setup(PEOPLE);
        let request = QueryRequest::default().filter("id", "4");
        let page = run_query(store.connection(), Some(&headers), &request).unwrap();
        assert_eq!(names(&page), vec!["Dave"]);
    }

    #[test]
    fn test_query_sort() {
        let (store, headers) = setup(PEOPLE);
        let request = QueryRequest::default().sort_by("team", SortDirection::Desc);
        let page = run_query(store.connection(), Some(&headers), &request).unwrap();

        // Ties keep id order
        assert_eq!(names(&page), vec!["Alice", "Dave", "Émile", "bob", "Carol"]);

        let request = QueryRequest::default().sort_by("id", SortDirection::Desc);
        let page = run_query(store.connection(), Some(&headers), &request).unwrap();
        assert_eq!(page.records[0].id, 5);
    }

    #[test]
    fn test_query_unbounded_respects_filter_and_sort() {
        let (store, headers) = setup(PEOPLE);
        let request = QueryRequest::page(0, Limit::Unbounded)
            .filter("team", "red")
            .sort_by("name", SortDirection::Desc);
        let page = run_query(store.connection(), Some(&headers), &request).unwrap();

        assert_eq!(page.total, 2);
        assert_eq!(names(&page), vec!["Dave", "Alice"]);
    }

    #[test]
    fn test_query_unknown_columns() {
        let (store, headers) = setup(PEOPLE);

        let request = QueryRequest::default().sort_by("age", SortDirection::Asc);
        let err = run_query(store.connection(), Some(&headers), &request).unwrap_err();
        assert!(matches!(err, Error::UnknownColumn(ref c) if c == "age"));

        let request = QueryRequest::default().filter("age", "3");
        let err = run_query(store.connection(), Some(&headers), &request).unwrap_err();
        assert!(matches!(err, Error::UnknownColumn(_)));
    }

    #[test]
    fn test_query_without_schema() {
        let store = Store::open_in_memory().unwrap();

        let page = run_query(store.connection(), None, &QueryRequest::default()).unwrap();
        assert_eq!(page.total, 0);
        assert!(page.records.is_empty());

        let request = QueryRequest::default().filter("name", "x");
        assert!(run_query(store.connection(), None, &request).is_err());
    }

    #[test]
    fn test_query_page_serialization() {
        let (store, headers) = setup("|a|b|\n|1||\n");
        let page = run_query(store.connection(), Some(&headers), &QueryRequest::default()).unwrap();

        let json = serde_json::to_string(&page).unwrap();
        assert_eq!(
            json,
            r#"{"total":1,"headers":["a","b"],"data":[{"id":1,"a":"1","b":""}]}"#
        );
    }

    #[test]
    fn test_limit_from_str() {
        assert_eq!("all".parse::<Limit>().unwrap(), Limit::Unbounded);
        assert_eq!("25".parse::<Limit>().unwrap(), Limit::Bounded(25));
        assert!("-3".parse::<Limit>().is_err());
        assert_eq!(SortDirection::from_param("DESC"), SortDirection::Desc);
        assert_eq!(SortDirection::from_param("sideways"), SortDirection::Asc);
    }
}

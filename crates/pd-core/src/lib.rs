//! pd-core: Core library for ingesting and synchronizing pipe-delimited tables
//!
//! This library provides functionality to:
//! - Parse pipe-delimited exports into a header and raw rows
//! - Replace the active schema with the one described by an upload's header
//! - Load rows into SQLite, skipping rows of the wrong width
//! - Serve paginated, filtered and sorted queries
//! - Update single records and keep a delimited mirror file in sync

pub mod config;
pub mod dataset;
pub mod error;
pub mod loader;
pub mod mirror;
pub mod mutator;
pub mod parser;
pub mod query;
pub mod schema;
pub mod store;
pub mod table;

pub use config::{DatasetConfig, IngestMirror};
pub use dataset::{Dataset, DatasetInfo, IngestReport};
pub use error::{Error, ErrorKind, Result};
pub use loader::LoadReport;
pub use mirror::{render, MirrorOutcome, MirrorWriter};
pub use mutator::{UpdateReport, UpdateRequest};
pub use parser::{parse_delimited, ParsedInput, RawRow, DELIMITER};
pub use query::{Limit, QueryPage, QueryRequest, Sort, SortDirection};
pub use schema::HeaderSet;
pub use table::{Column, Record, RecordView, Table, ID_COLUMN};

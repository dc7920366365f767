//! The single active dataset
//!
//! `Dataset` owns the store, the active header set and the mirror writer.
//! Every operation holds the dataset lock for its whole duration: an ingest
//! (drop, create, load) or a delete-all is never observed half-applied, and an
//! update is atomic together with the mirror regeneration that follows it.

use crate::config::{DatasetConfig, IngestMirror};
use crate::error::Result;
use crate::loader::{self, LoadReport};
use crate::mirror::{self, MirrorOutcome, MirrorWriter};
use crate::mutator::{self, UpdateReport, UpdateRequest};
use crate::parser::{self, parse_delimited};
use crate::query::{self, Limit, QueryPage, QueryRequest};
use crate::schema::{self, HeaderSet};
use crate::store::{self, Store};
use crate::table::Record;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Result of a successful ingest
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Rows loaded
    pub accepted: usize,
    /// Rows skipped for having the wrong number of values
    pub rejected: usize,
    /// Source line numbers of the skipped rows
    pub rejected_lines: Vec<usize>,
    /// The new schema
    pub headers: HeaderSet,
    /// When this generation was created
    pub ingested_at: DateTime<Utc>,
    /// Mirror write result
    pub mirror: MirrorOutcome,
}

/// Summary of the active dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetInfo {
    pub headers: Option<HeaderSet>,
    pub record_count: u64,
    pub ingested_at: Option<DateTime<Utc>>,
    pub mirror: Option<PathBuf>,
}

struct State {
    store: Store,
    headers: Option<HeaderSet>,
}

/// Lock-guarded owner of the store and schema
pub struct Dataset {
    state: Mutex<State>,
    mirror: MirrorWriter,
    config: DatasetConfig,
}

impl Dataset {
    /// Open the dataset described by `config`, restoring any persisted schema
    pub fn open(config: DatasetConfig) -> Result<Self> {
        config.validate()?;

        let store = match &config.database {
            Some(path) => Store::open(path)?,
            None => Store::open_in_memory()?,
        };
        let headers = schema::load_schema(store.connection())?;

        if let Some(headers) = &headers {
            info!(columns = headers.len(), "restored existing dataset");
        }

        Ok(Self {
            state: Mutex::new(State { store, headers }),
            mirror: MirrorWriter::new(config.mirror.clone()),
            config,
        })
    }

    /// Open an empty in-memory dataset without a mirror
    pub fn in_memory() -> Result<Self> {
        Self::open(DatasetConfig::default())
    }

    /// Replace the dataset with the contents of a delimited upload
    ///
    /// The header is validated before the store is touched; if parsing or
    /// validation fails the previous generation stays in place.
    pub fn ingest(&self, raw: &str) -> Result<IngestReport> {
        let parsed = parse_delimited(raw)?;
        let headers = HeaderSet::from_names(parsed.headers)?;
        let ingested_at = Utc::now();

        let mut state = self.state.lock();
        let load: LoadReport = {
            let tx = state.store.transaction()?;
            schema::replace_schema(&tx, &headers, ingested_at)?;
            let report = loader::load_rows(&tx, &headers, &parsed.rows)?;
            tx.commit()?;
            report
        };
        state.headers = Some(headers.clone());

        if load.accepted == 0 {
            warn!(rejected = load.rejected, "ingest accepted no rows");
        }
        info!(
            columns = headers.len(),
            accepted = load.accepted,
            rejected = load.rejected,
            "ingest complete"
        );

        let mirror = match self.config.ingest_mirror {
            IngestMirror::Regenerate => self
                .mirror
                .sync(state.store.connection(), state.headers.as_ref()),
            IngestMirror::Verbatim => self.mirror.write(raw),
        };

        Ok(IngestReport {
            accepted: load.accepted,
            rejected: load.rejected,
            rejected_lines: load.rejected_lines,
            headers,
            ingested_at,
            mirror,
        })
    }

    /// Read a UTF-8 file and ingest it
    pub fn ingest_file<P: AsRef<Path>>(&self, path: P) -> Result<IngestReport> {
        let content = parser::read_text(path)?;
        self.ingest(&content)
    }

    /// Run a paginated, filtered, sorted read
    pub fn query(&self, request: &QueryRequest) -> Result<QueryPage> {
        let state = self.state.lock();
        query::run_query(state.store.connection(), state.headers.as_ref(), request)
    }

    /// A request for the page starting at `offset`, sized by the config
    pub fn page_request(&self, offset: usize) -> QueryRequest {
        QueryRequest::page(offset, Limit::Bounded(self.config.page_size))
    }

    /// Update one record and regenerate the mirror
    pub fn update(&self, request: &UpdateRequest) -> Result<UpdateReport> {
        let state = self.state.lock();
        mutator::apply_update(
            state.store.connection(),
            state.headers.as_ref(),
            request,
            &self.mirror,
        )
    }

    /// Drop all records and the schema, and empty the mirror
    pub fn delete_all(&self) -> Result<MirrorOutcome> {
        let mut state = self.state.lock();
        {
            let tx = state.store.transaction()?;
            schema::clear_schema(&tx)?;
            tx.commit()?;
        }
        state.headers = None;
        info!("dataset cleared");

        Ok(self.mirror.sync(state.store.connection(), None))
    }

    /// Number of stored records
    pub fn record_count(&self) -> Result<u64> {
        let state = self.state.lock();
        store::record_count(state.store.connection(), state.headers.as_ref())
    }

    /// The active header set
    pub fn headers(&self) -> Option<HeaderSet> {
        self.state.lock().headers.clone()
    }

    /// Fetch one record by id
    pub fn record(&self, id: i64) -> Result<Option<Record>> {
        let state = self.state.lock();
        match &state.headers {
            Some(headers) => store::fetch_record(state.store.connection(), headers, id),
            None => Ok(None),
        }
    }

    /// Summary of the active generation
    pub fn info(&self) -> Result<DatasetInfo> {
        let state = self.state.lock();
        let conn = state.store.connection();
        Ok(DatasetInfo {
            headers: state.headers.clone(),
            record_count: store::record_count(conn, state.headers.as_ref())?,
            ingested_at: schema::ingested_at(conn)?,
            mirror: self.mirror.path().map(Path::to_path_buf),
        })
    }

    /// Render the current mirror document without writing it
    pub fn mirror_document(&self) -> Result<String> {
        let state = self.state.lock();
        mirror::render_dataset(state.store.connection(), state.headers.as_ref())
    }

    /// Write the current mirror document to an arbitrary path
    pub fn export<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let document = self.mirror_document()?;
        mirror::write_atomic(path.as_ref(), &document)
    }
}

//! Mirror writer: keeps a delimited copy of the store on disk
//!
//! The mirror is derived from the store and is rewritten wholesale after
//! every mutation. Write failures are reported, never propagated: by the time
//! the mirror is written the store change has already been committed.

use crate::error::{Error, ErrorKind, Result};
use crate::parser::DELIMITER;
use crate::schema::HeaderSet;
use crate::store::fetch_table;
use crate::table::Table;
use rusqlite::Connection;
use serde::Serialize;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// What happened to the mirror file after a mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MirrorOutcome {
    /// No mirror path configured
    Skipped,
    /// Mirror rewritten
    Written { path: PathBuf, bytes: usize },
    /// Mirror could not be written; the store change still stands
    Failed { kind: ErrorKind, message: String },
}

impl MirrorOutcome {
    fn from_error(error: &Error) -> Self {
        MirrorOutcome::Failed {
            kind: error.kind(),
            message: error.to_string(),
        }
    }

    /// Check if the mirror write failed
    pub fn is_failed(&self) -> bool {
        matches!(self, MirrorOutcome::Failed { .. })
    }
}

/// Render a table as a mirror document
///
/// Every line is wrapped in delimiters (`|a|b|`) so that an empty first or
/// last value survives re-parsing. NULL values are written as empty fields.
pub fn render(table: &Table) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .delimiter(DELIMITER as u8)
        .quote_style(csv::QuoteStyle::Never)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(wrapped(table.headers.names()))?;
    for record in &table.records {
        writer.write_record(wrapped(record.text_values()))?;
    }

    let bytes = writer.into_inner().map_err(|e| e.into_error())?;
    String::from_utf8(bytes).map_err(|e| Error::Io(io::Error::new(io::ErrorKind::InvalidData, e)))
}

fn wrapped<'a>(fields: Vec<&'a str>) -> impl Iterator<Item = &'a str> {
    std::iter::once("")
        .chain(fields)
        .chain(std::iter::once(""))
}

/// Render the active dataset; an empty string when there is no schema
pub fn render_dataset(conn: &Connection, headers: Option<&HeaderSet>) -> Result<String> {
    match headers {
        Some(headers) => render(&fetch_table(conn, headers)?),
        None => Ok(String::new()),
    }
}

/// Writes mirror documents to a configured path
#[derive(Debug, Clone, Default)]
pub struct MirrorWriter {
    path: Option<PathBuf>,
}

impl MirrorWriter {
    /// Create a writer; `None` disables mirroring
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    /// Mirror file path, if mirroring is enabled
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Overwrite the mirror with `document`
    pub fn write(&self, document: &str) -> MirrorOutcome {
        let Some(path) = &self.path else {
            return MirrorOutcome::Skipped;
        };

        match write_atomic(path, document) {
            Ok(()) => {
                debug!(path = %path.display(), bytes = document.len(), "mirror written");
                MirrorOutcome::Written {
                    path: path.clone(),
                    bytes: document.len(),
                }
            }
            Err(e) => {
                warn!("{}", e);
                MirrorOutcome::from_error(&e)
            }
        }
    }

    /// Regenerate the mirror from the store
    pub fn sync(&self, conn: &Connection, headers: Option<&HeaderSet>) -> MirrorOutcome {
        if self.path.is_none() {
            return MirrorOutcome::Skipped;
        }

        match render_dataset(conn, headers) {
            Ok(document) => self.write(&document),
            Err(e) => {
                warn!("failed to render mirror: {}", e);
                MirrorOutcome::from_error(&e)
            }
        }
    }
}

/// Replace the file at `path` with `content` via a temp file and rename
pub fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let to_error = |source: io::Error| Error::MirrorWrite {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(to_error)?;

    let mut file = tempfile::NamedTempFile::new_in(dir).map_err(to_error)?;
    file.write_all(content.as_bytes()).map_err(to_error)?;
    file.flush().map_err(to_error)?;
    file.persist(path).map_err(|e| to_error(e.error))?;
    Ok(())
}

//! Error types for pd-core

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in pd-core
#[derive(Debug, Error)]
pub enum Error {
    /// Fewer than two non-blank lines (no header, or header with no data)
    #[error("input must contain a header line and at least one data line, found {lines} non-blank line(s)")]
    EmptyInput { lines: usize },

    /// Header line has no usable column names
    #[error("header line is empty or contains an empty column name at position {position}")]
    EmptyHeader { position: usize },

    /// A header name appears twice, or collides with the identifier column
    #[error("duplicate column '{0}' in header")]
    DuplicateColumn(String),

    /// A data row has the wrong number of tokens
    #[error("line {line}: expected {expected} values, found {found}")]
    RowShapeMismatch {
        line: usize,
        expected: usize,
        found: usize,
    },

    /// Column is not part of the active schema
    #[error("unknown column '{0}'")]
    UnknownColumn(String),

    /// Update request without an identifier
    #[error("'id' is required to update a record")]
    MissingIdentifier,

    /// No record with the given identifier
    #[error("record {0} not found")]
    RecordNotFound(i64),

    /// Value contains the delimiter or a line break
    #[error("value for column '{column}' contains a reserved character (delimiter or line break)")]
    ReservedCharacter { column: String },

    /// Update value is not a JSON scalar
    #[error("value for column '{column}' must be a string, number, boolean or null")]
    InvalidValue { column: String },

    /// Failed to rewrite the mirror file
    #[error("failed to write mirror '{path}': {source}")]
    MirrorWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to read a file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Delimited text could not be tokenized
    #[error("failed to tokenize input: {0}")]
    Csv(#[from] csv::Error),

    /// Storage engine error
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Machine-checkable classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    EmptyInput,
    EmptyHeader,
    DuplicateColumn,
    RowShapeMismatch,
    UnknownColumn,
    MissingIdentifier,
    RecordNotFound,
    ReservedCharacter,
    InvalidValue,
    MirrorWriteFailed,
    Storage,
    Config,
    Io,
    Json,
}

impl Error {
    /// Get the kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::EmptyInput { .. } => ErrorKind::EmptyInput,
            Error::EmptyHeader { .. } => ErrorKind::EmptyHeader,
            Error::DuplicateColumn(_) => ErrorKind::DuplicateColumn,
            Error::RowShapeMismatch { .. } => ErrorKind::RowShapeMismatch,
            Error::UnknownColumn(_) => ErrorKind::UnknownColumn,
            Error::MissingIdentifier => ErrorKind::MissingIdentifier,
            Error::RecordNotFound(_) => ErrorKind::RecordNotFound,
            Error::ReservedCharacter { .. } => ErrorKind::ReservedCharacter,
            Error::InvalidValue { .. } => ErrorKind::InvalidValue,
            Error::MirrorWrite { .. } => ErrorKind::MirrorWriteFailed,
            Error::Storage(_) => ErrorKind::Storage,
            Error::Config(_) => ErrorKind::Config,
            Error::FileRead { .. } | Error::Io(_) | Error::Csv(_) => ErrorKind::Io,
            Error::Json(_) => ErrorKind::Json,
        }
    }

    /// True for errors that reject a whole ingest and leave the store untouched
    pub fn is_ingest_fatal(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::EmptyInput | ErrorKind::EmptyHeader | ErrorKind::DuplicateColumn
        )
    }

    /// True for errors caused by the caller's request rather than the system
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::EmptyInput
                | ErrorKind::EmptyHeader
                | ErrorKind::DuplicateColumn
                | ErrorKind::UnknownColumn
                | ErrorKind::MissingIdentifier
                | ErrorKind::RecordNotFound
                | ErrorKind::ReservedCharacter
                | ErrorKind::InvalidValue
        )
    }
}

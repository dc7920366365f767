//! Dataset configuration

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default page size for paginated reads
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// What the mirror holds right after an ingest
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestMirror {
    /// Regenerated from the store; rejected rows are not mirrored
    #[default]
    Regenerate,
    /// The uploaded text, byte for byte
    Verbatim,
}

/// Where the dataset lives and how it is mirrored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// SQLite database file; in-memory when absent
    pub database: Option<PathBuf>,
    /// Mirror file; mirroring is disabled when absent
    pub mirror: Option<PathBuf>,
    /// Mirror content after an ingest
    pub ingest_mirror: IngestMirror,
    /// Page size used when a caller doesn't specify one
    pub page_size: usize,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            database: None,
            mirror: None,
            ingest_mirror: IngestMirror::default(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl DatasetConfig {
    /// Load a config file from JSON
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| Error::FileRead {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save the config to JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Check values that serde can't
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(Error::Config("page_size must be greater than zero".to_string()));
        }
        if let (Some(db), Some(mirror)) = (&self.database, &self.mirror) {
            if db == mirror {
                return Err(Error::Config(format!(
                    "database and mirror must be different files ({})",
                    db.display()
                )));
            }
        }
        Ok(())
    }
}

//! Severity-filtering front end for a [`FilePoolManager`].
//!
//! Deciding which severities get recorded is the caller's concern, not the
//! pool's. `FileLogger` is the seam where that decision is made: records it
//! rejects are never encoded or written.

use std::collections::BTreeSet;
use std::path::PathBuf;

use tracing::trace;

use crate::archive;
use crate::error::Result;
use crate::pool::{AppendOutcome, FilePoolManager};
use crate::record::{LogRecord, Severity};

/// Writes records that pass its severity filter to a pool.
#[derive(Debug)]
pub struct FileLogger {
    pool: FilePoolManager,
    min_severity: Severity,
    levels: Option<BTreeSet<Severity>>,
}

impl FileLogger {
    /// Wraps `pool`, accepting every severity.
    pub fn new(pool: FilePoolManager) -> Self {
        Self {
            pool,
            min_severity: Severity::Debug,
            levels: None,
        }
    }

    /// Drops records less severe than `severity`.
    pub fn with_min_severity(mut self, severity: Severity) -> Self {
        self.min_severity = severity;
        self
    }

    /// Accepts only the listed severities (still subject to the minimum).
    pub fn with_levels(mut self, levels: impl IntoIterator<Item = Severity>) -> Self {
        self.levels = Some(levels.into_iter().collect());
        self
    }

    /// Returns whether a record of `severity` would be written.
    pub fn accepts(&self, severity: Severity) -> bool {
        severity >= self.min_severity
            && self
                .levels
                .as_ref()
                .is_none_or(|levels| levels.contains(&severity))
    }

    /// Writes `record` if its severity is accepted.
    ///
    /// Returns `Ok(None)` for a filtered record.
    ///
    /// # Errors
    ///
    /// Returns any error from [`FilePoolManager::append_record`].
    pub fn log(&self, record: &LogRecord) -> Result<Option<AppendOutcome>> {
        if !self.accepts(record.severity()) {
            trace!(severity = %record.severity(), "record filtered");
            return Ok(None);
        }
        self.pool.append_record(record).map(Some)
    }

    /// Archives the pool's current slot files.
    ///
    /// # Errors
    ///
    /// Returns any error from [`archive::archive`].
    pub fn archive(&self) -> Result<Option<PathBuf>> {
        archive::archive(&self.pool)
    }

    /// Returns the underlying pool.
    pub fn pool(&self) -> &FilePoolManager {
        &self.pool
    }

    /// Consumes the logger and returns the underlying pool.
    pub fn into_pool(self) -> FilePoolManager {
        self.pool
    }
}

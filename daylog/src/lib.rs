//! # daylog
//!
//! File-backed log record store with daily rotation over a fixed pool of
//! slot files.
//!
//! daylog keeps structured log records in a small, bounded set of numbered
//! files. Each calendar day on which something is written gets its own slot;
//! once every slot has been used, the oldest one is truncated and reused.
//! Retention is therefore bounded by a number of distinct write-days rather
//! than by size.
//!
//! ## Key Properties
//!
//! - Fixed on-disk footprint in files: at most `pool_size` slot files
//! - Rotation state survives restarts through an injected key-value store
//! - Injected date source, so day boundaries can be simulated in tests
//! - Plain-text delimited format, readable without any tooling
//! - On-demand, compressed archive of everything currently retained
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use chrono::Utc;
//! use daylog::{FileLogger, FilePoolManager, JsonFileStore, LogRecord, PoolConfig, Severity, SystemDate};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Keep the last 7 write-days of logs
//! let store = JsonFileStore::open("./logs/state.json")?;
//! let pool = FilePoolManager::open(PoolConfig::new("./logs", 7), store, Arc::new(SystemDate))?;
//! let logger = FileLogger::new(pool).with_min_severity(Severity::Info);
//!
//! logger.log(&LogRecord::new(
//!     Severity::Warn,
//!     Utc::now(),
//!     file!(),
//!     "main",
//!     line!(),
//!     "disk usage above 80%",
//! ))?;
//!
//! // Read today's records back
//! let decoded = logger.pool().read_records(&logger.pool().current_slot_path())?;
//! for record in decoded.records {
//!     println!("{} {} {}", record.header.timestamp, record.header.severity, record.body);
//! }
//!
//! // Bundle everything retained into one compressed file
//! if let Some(path) = logger.archive()? {
//!     println!("archived to {}", path.display());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`FilePoolManager`] — Owns rotation state, appends and reads slot files
//! - [`RecordCodec`] — The `|>`-delimited line format
//! - [`RotationState`] / [`KeyValueStore`] — Durable rotation state
//! - [`DateProvider`] — Source of "today"
//! - [`FileLogger`] — Severity filter in front of the pool
//! - [`archive()`] — Compressed bundle of the retained slot files
//!
//! ## Modules
//!
//! - [`pool`] — Slot selection, rotation, append, read-back
//! - [`codec`] — Record encoding and separator-aware decoding
//! - [`record`] — Record, header, location and severity types
//! - [`state`] — Rotation state and key-value stores
//! - [`clock`] — Date providers
//! - [`archive`] — Archive creation and reading
//! - [`logger`] — Severity filtering front end
//! - [`config`] — Pool configuration
//! - [`error`] — Error types

pub mod archive;
pub mod clock;
pub mod codec;
pub mod config;
pub mod error;
pub mod logger;
pub mod pool;
pub mod record;
pub mod state;

// Re-export primary API types at crate root for convenience.
pub use archive::{ArchiveBundle, ArchivedSlot, archive, read_archive};
pub use clock::{DateProvider, ManualDate, SystemDate};
pub use codec::{DecodedSlot, RECORD_SEPARATOR, RecordCodec};
pub use config::PoolConfig;
pub use error::{
    ArchiveError, CodecError, ConfigError, DaylogError, MalformedReason, MalformedRecord, Result,
    StateError, StorageInitError,
};
pub use logger::FileLogger;
pub use pool::{AppendOutcome, FilePoolManager, SlotStatus};
pub use record::{LogRecord, ParseSeverityError, RecordHeader, Severity, SourceLocation};
pub use state::{JsonFileStore, KeyValueStore, MemoryStore, RotationState};

//! File pool manager: the rotating set of slot files.
//!
//! The pool owns a fixed number of slot files named by index and appends
//! every record to the active one. When an append happens on a calendar day
//! other than the last write day, the pool advances to the next slot
//! (wrapping at the end of the pool), truncates it, and persists the new
//! rotation state before writing.
//!
//! # File Layout
//!
//! ```text
//! log_dir/
//! ├── 0.log               <- slot 0
//! ├── 1.log               <- slot 1, created on first write
//! ├── ...
//! ├── N-1.log             <- last slot
//! └── archives/           <- created by the archiver
//!     └── daylog-20240501T120000Z.snap
//! ```
//!
//! # Rotation policy
//!
//! Rotation is day-granular and steps exactly one slot per write that sees
//! a new day, no matter how many days have passed since the previous write.
//! The pool therefore retains the last `pool_size` distinct write-days.
//!
//! # Thread Safety
//!
//! The pool is `Send + Sync`. Rotation state sits behind a read-write lock:
//! appends take it exclusively for the whole rotate-then-write sequence,
//! reads share it and wait for any in-flight append.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use chrono::Utc;
//! use daylog::{FilePoolManager, LogRecord, MemoryStore, PoolConfig, Severity, SystemDate};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = FilePoolManager::open(
//!     PoolConfig::new("./logs", 7),
//!     MemoryStore::new(),
//!     Arc::new(SystemDate),
//! )?;
//!
//! let record = LogRecord::new(Severity::Info, Utc::now(), "main.rs", "main", 12, "started");
//! pool.append_record(&record)?;
//!
//! let decoded = pool.read_records(&pool.current_slot_path())?;
//! assert_eq!(decoded.records.len(), 1);
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::clock::DateProvider;
use crate::codec::{DecodedSlot, RecordCodec};
use crate::config::PoolConfig;
use crate::error::{ConfigError, DaylogError, Result, StorageInitError};
use crate::record::LogRecord;
use crate::state::{KeyValueStore, RotationState};

/// What an append did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendOutcome {
    /// Slot the record was written to.
    pub slot: usize,
    /// Whether this append advanced the pool to a new slot.
    pub rotated: bool,
}

/// Whether a slot file exists and holds anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotStatus {
    /// The slot has never been written.
    Absent,
    /// The slot file exists but is empty.
    Empty,
    /// The slot file holds data.
    Populated {
        /// File size in bytes.
        bytes: u64,
    },
}

/// Mutable half of the pool, guarded by the pool's lock.
struct PoolInner {
    state: RotationState,
    store: Box<dyn KeyValueStore>,
}

/// Fixed-size pool of daily-rotated slot files.
pub struct FilePoolManager {
    directory: PathBuf,
    pool_size: usize,
    extension: String,
    codec: RecordCodec,
    dates: Arc<dyn DateProvider>,
    inner: RwLock<PoolInner>,
}

impl fmt::Debug for FilePoolManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilePoolManager")
            .field("directory", &self.directory)
            .field("pool_size", &self.pool_size)
            .field("extension", &self.extension)
            .field("state", &self.inner.read().state)
            .finish_non_exhaustive()
    }
}

impl FilePoolManager {
    /// Opens the pool described by `config`, restoring or creating its state.
    ///
    /// If `store` holds no rotation state, the directory is created and the
    /// pool starts at slot 0 with today's date. Otherwise the stored state is
    /// used as-is and the directory is recreated if it has gone missing.
    ///
    /// # Errors
    ///
    /// - [`ConfigError`] if `config` is invalid, or the stored pool size or
    ///   directory differs from `config`
    /// - [`StorageInitError`] if the directory cannot be created or the
    ///   store cannot be read or written
    pub fn open(
        config: PoolConfig,
        store: impl KeyValueStore + 'static,
        dates: Arc<dyn DateProvider>,
    ) -> Result<Self> {
        config.validate()?;
        let codec = RecordCodec::new(config.timestamp_format.clone())?;
        let mut store: Box<dyn KeyValueStore> = Box::new(store);

        let state = match RotationState::load(store.as_ref()).map_err(StorageInitError::Store)? {
            Some(state) => Self::check_existing(&config, state)?,
            None => {
                let state = RotationState::initialize(
                    store.as_mut(),
                    &config.directory,
                    config.pool_size,
                    dates.today(),
                )?;
                info!(
                    directory = %state.directory.display(),
                    pool_size = state.pool_size,
                    "initialized log pool"
                );
                state
            }
        };

        Ok(Self {
            directory: state.directory.clone(),
            pool_size: state.pool_size,
            extension: config.extension,
            codec,
            dates,
            inner: RwLock::new(PoolInner { state, store }),
        })
    }

    /// Validates reloaded state against the requested configuration.
    fn check_existing(config: &PoolConfig, state: RotationState) -> Result<RotationState> {
        if state.pool_size != config.pool_size {
            return Err(ConfigError::PoolSizeMismatch {
                stored: state.pool_size,
                requested: config.pool_size,
            }
            .into());
        }
        if state.directory != config.directory {
            return Err(ConfigError::DirectoryMismatch {
                stored: state.directory,
                requested: config.directory.clone(),
            }
            .into());
        }

        fs::create_dir_all(&state.directory).map_err(|e| StorageInitError::CreateDirectory {
            path: state.directory.clone(),
            source: e,
        })?;

        debug!(
            directory = %state.directory.display(),
            active_slot = state.active_slot,
            last_write_date = %state.last_write_date,
            "reopened log pool"
        );
        Ok(state)
    }

    /// Returns the storage directory.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Returns the number of slots in the pool.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Returns the codec used by [`append_record`](Self::append_record) and
    /// the read path.
    pub fn codec(&self) -> &RecordCodec {
        &self.codec
    }

    /// Returns the index of the slot that receives new records.
    pub fn active_slot(&self) -> usize {
        self.inner.read().state.active_slot
    }

    /// Returns the date of the last write that ran rotation logic.
    pub fn last_write_date(&self) -> NaiveDate {
        self.inner.read().state.last_write_date
    }

    /// Returns a copy of the current rotation state.
    pub fn state(&self) -> RotationState {
        self.inner.read().state.clone()
    }

    /// Returns the path of slot `index`.
    ///
    /// The index is not checked against the pool size.
    pub fn slot_path(&self, index: usize) -> PathBuf {
        self.directory.join(format!("{index}.{}", self.extension))
    }

    /// Returns the path of the active slot.
    pub fn current_slot_path(&self) -> PathBuf {
        self.slot_path(self.active_slot())
    }

    /// Returns the paths of every slot, ordered by index.
    ///
    /// Slots that have never been written are included even though their
    /// files do not exist yet.
    pub fn all_slot_paths(&self) -> Vec<PathBuf> {
        (0..self.pool_size).map(|index| self.slot_path(index)).collect()
    }

    /// Appends an already encoded record to the active slot, rotating first if
    /// the calendar day has changed.
    ///
    /// A single `\n` terminator is added after `encoded_line`.
    ///
    /// # Errors
    ///
    /// - [`DaylogError::SlotIo`] if the slot file cannot be truncated or
    ///   appended to
    /// - [`DaylogError::State`] if the rotated state cannot be persisted; the
    ///   pool then keeps its previous state and nothing is appended
    pub fn append(&self, encoded_line: &str) -> Result<AppendOutcome> {
        let mut inner = self.inner.write();
        // Read under the lock so concurrent appends agree on the day.
        let today = self.dates.today();

        let rotated = today != inner.state.last_write_date;
        if rotated {
            self.rotate(&mut inner, today)?;
        }

        let slot = inner.state.active_slot;
        let path = self.slot_path(slot);

        let mut line = String::with_capacity(encoded_line.len() + 1);
        line.push_str(encoded_line);
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| slot_io(&path, e))?;
        file.write_all(line.as_bytes())
            .map_err(|e| slot_io(&path, e))?;

        debug!(slot, bytes = line.len(), "appended record");
        Ok(AppendOutcome { slot, rotated })
    }

    /// Encodes `record` with the pool's codec and appends it.
    ///
    /// # Errors
    ///
    /// Returns [`DaylogError::Codec`] if the record cannot be encoded, or any
    /// error from [`append`](Self::append).
    pub fn append_record(&self, record: &LogRecord) -> Result<AppendOutcome> {
        let line = self.codec.encode(record)?;
        self.append(&line)
    }

    /// Advances to the next slot, truncating it, and persists the new state.
    ///
    /// In-memory state changes only after the store write succeeded.
    fn rotate(&self, inner: &mut PoolInner, today: NaiveDate) -> Result<()> {
        let mut next = inner.state.clone();
        next.active_slot = inner.state.next_slot();
        next.last_write_date = today;

        let path = self.slot_path(next.active_slot);
        File::create(&path).map_err(|e| slot_io(&path, e))?;

        next.persist(inner.store.as_mut())?;

        info!(
            from_slot = inner.state.active_slot,
            to_slot = next.active_slot,
            previous_date = %inner.state.last_write_date,
            date = %today,
            "rotated log slot"
        );
        inner.state = next;
        Ok(())
    }

    /// Reads and decodes the slot file at `path`.
    ///
    /// Malformed records, including lines that are not valid UTF-8, do not
    /// fail the read; they are returned in [`DecodedSlot::malformed`] next to
    /// the records that did decode.
    ///
    /// # Errors
    ///
    /// - [`DaylogError::SlotNotFound`] if the file does not exist
    /// - [`DaylogError::SlotIo`] if it cannot be read
    pub fn read_records(&self, path: &Path) -> Result<DecodedSlot> {
        let bytes = {
            let _guard = self.inner.read();
            fs::read(path).map_err(|e| {
                if e.kind() == ErrorKind::NotFound {
                    DaylogError::SlotNotFound {
                        path: path.to_path_buf(),
                    }
                } else {
                    slot_io(path, e)
                }
            })?
        };

        let decoded = self.codec.decode_bytes(&bytes);
        if !decoded.is_clean() {
            warn!(
                path = %path.display(),
                malformed = decoded.malformed.len(),
                decoded = decoded.records.len(),
                "slot file contains malformed records"
            );
        }
        Ok(decoded)
    }

    /// Reads and decodes slot `index`.
    ///
    /// # Errors
    ///
    /// Returns [`DaylogError::SlotOutOfRange`] for an index outside the
    /// pool, or any error from [`read_records`](Self::read_records).
    pub fn read_slot(&self, index: usize) -> Result<DecodedSlot> {
        self.check_index(index)?;
        self.read_records(&self.slot_path(index))
    }

    /// Reports whether slot `index` is absent, empty, or populated.
    ///
    /// # Errors
    ///
    /// Returns [`DaylogError::SlotOutOfRange`] for an index outside the
    /// pool, or [`DaylogError::SlotIo`] if the file cannot be inspected.
    pub fn slot_status(&self, index: usize) -> Result<SlotStatus> {
        self.check_index(index)?;
        let path = self.slot_path(index);

        let _guard = self.inner.read();
        match fs::metadata(&path) {
            Ok(metadata) if metadata.len() == 0 => Ok(SlotStatus::Empty),
            Ok(metadata) => Ok(SlotStatus::Populated {
                bytes: metadata.len(),
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(SlotStatus::Absent),
            Err(e) => Err(slot_io(&path, e)),
        }
    }

    /// Runs `f` while holding the shared lock, so no append can rotate or
    /// write slots until it returns.
    pub(crate) fn with_read_lock<R>(&self, f: impl FnOnce(&RotationState) -> R) -> R {
        let inner = self.inner.read();
        f(&inner.state)
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.pool_size {
            return Err(DaylogError::SlotOutOfRange {
                index,
                pool_size: self.pool_size,
            });
        }
        Ok(())
    }
}

fn slot_io(path: &Path, source: std::io::Error) -> DaylogError {
    DaylogError::SlotIo {
        path: path.to_path_buf(),
        source,
    }
}

//! Durable rotation state and the key-value stores that hold it.
//!
//! The pool never keeps rotation state in a global. A [`RotationState`] is
//! loaded from an injected [`KeyValueStore`] when the pool opens and written
//! back after every rotation decision.
//!
//! # Keys
//!
//! | key                       | value                              |
//! |---------------------------|------------------------------------|
//! | `log_dir`                 | storage directory path             |
//! | `current_log_file_number` | active slot index, decimal         |
//! | `date_of_last_log`        | last rotation date, `YYYY-MM-DD`   |
//! | `num_of_log_files`        | pool size, decimal                 |

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use parking_lot::Mutex;

use crate::error::{ConfigError, Result, StateError, StorageInitError};

/// Key names used to persist [`RotationState`].
pub mod keys {
    /// Storage directory path.
    pub const LOG_DIR: &str = "log_dir";
    /// Index of the active slot.
    pub const CURRENT_LOG_FILE_NUMBER: &str = "current_log_file_number";
    /// Date of the last write that ran rotation logic.
    pub const DATE_OF_LAST_LOG: &str = "date_of_last_log";
    /// Number of slots in the pool.
    pub const NUM_OF_LOG_FILES: &str = "num_of_log_files";
}

/// Date format for [`keys::DATE_OF_LAST_LOG`].
const DATE_FORMAT: &str = "%Y-%m-%d";

/// A string key-value store that outlives the process.
///
/// Implementations decide how values are made durable. `set_many` exists so
/// that stores with a single backing file can write all state keys at once.
pub trait KeyValueStore: Send + Sync {
    /// Returns the value stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] if the store cannot be read.
    fn get(&self, key: &str) -> std::result::Result<Option<String>, StateError>;

    /// Stores `value` under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] if the store cannot be written.
    fn set(&mut self, key: &str, value: &str) -> std::result::Result<(), StateError>;

    /// Removes `key` from the store.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] if the store cannot be written.
    fn remove(&mut self, key: &str) -> std::result::Result<(), StateError>;

    /// Stores several entries.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] if the store cannot be written.
    fn set_many(&mut self, entries: &[(&str, String)]) -> std::result::Result<(), StateError> {
        for (key, value) in entries {
            self.set(key, value)?;
        }
        Ok(())
    }
}

/// In-memory store.
///
/// Clones share the same map, so a test can keep a handle to a store it has
/// given to the pool and inspect what was persisted.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: Arc<Mutex<BTreeMap<String, String>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every stored entry.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.values.lock().clone()
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.values.lock().clear();
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> std::result::Result<Option<String>, StateError> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> std::result::Result<(), StateError> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> std::result::Result<(), StateError> {
        self.values.lock().remove(key);
        Ok(())
    }
}

/// Store persisted as a JSON object in a single file.
///
/// Every mutation rewrites the file through a temporary file and a rename, so
/// the file on disk is always either the previous or the new contents. The
/// in-memory map only changes once the write has succeeded.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl JsonFileStore {
    /// Opens the store at `path`, starting empty if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] if the file exists but cannot be read or parsed.
    pub fn open<P: AsRef<Path>>(path: P) -> std::result::Result<Self, StateError> {
        let path = path.as_ref().to_path_buf();

        let values = if path.exists() {
            let data = fs::read_to_string(&path).map_err(|e| StateError::Io {
                path: path.clone(),
                source: e,
            })?;
            serde_json::from_str(&data).map_err(|e| StateError::Parse {
                path: path.clone(),
                source: e,
            })?
        } else {
            BTreeMap::new()
        };

        Ok(Self { path, values })
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn commit(&mut self, values: BTreeMap<String, String>) -> std::result::Result<(), StateError> {
        let data = serde_json::to_string_pretty(&values)
            .map_err(|e| StateError::Serialize { source: e })?;
        atomic_write(&self.path, data.as_bytes()).map_err(|e| StateError::Io {
            path: self.path.clone(),
            source: e,
        })?;
        self.values = values;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> std::result::Result<Option<String>, StateError> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> std::result::Result<(), StateError> {
        let mut values = self.values.clone();
        values.insert(key.to_string(), value.to_string());
        self.commit(values)
    }

    fn remove(&mut self, key: &str) -> std::result::Result<(), StateError> {
        if !self.values.contains_key(key) {
            return Ok(());
        }
        let mut values = self.values.clone();
        values.remove(key);
        self.commit(values)
    }

    fn set_many(&mut self, entries: &[(&str, String)]) -> std::result::Result<(), StateError> {
        let mut values = self.values.clone();
        for (key, value) in entries {
            values.insert((*key).to_string(), value.clone());
        }
        self.commit(values)
    }
}

/// Writes `data` to a sibling temporary file, syncs it, and renames it over
/// `path`.
fn atomic_write(path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut temp_name = path.as_os_str().to_os_string();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);

    let mut file = File::create(&temp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&temp_path, path)
}

/// Where the pool writes and how far it has rotated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationState {
    /// Directory holding the slot files.
    pub directory: PathBuf,
    /// Number of slots in the pool; always at least 1.
    pub pool_size: usize,
    /// Slot that receives new records, in `0..pool_size`.
    pub active_slot: usize,
    /// Calendar date of the last write that ran rotation logic.
    pub last_write_date: NaiveDate,
}

impl RotationState {
    /// Loads previously persisted state.
    ///
    /// Returns `Ok(None)` when the store holds none of the state keys.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Corrupted`] if only some keys are present, a
    /// value cannot be parsed, or the active slot lies outside the pool.
    pub fn load<S: KeyValueStore + ?Sized>(
        store: &S,
    ) -> std::result::Result<Option<Self>, StateError> {
        let directory = store.get(keys::LOG_DIR)?;
        let active_slot = store.get(keys::CURRENT_LOG_FILE_NUMBER)?;
        let last_write_date = store.get(keys::DATE_OF_LAST_LOG)?;
        let pool_size = store.get(keys::NUM_OF_LOG_FILES)?;

        if directory.is_none()
            && active_slot.is_none()
            && last_write_date.is_none()
            && pool_size.is_none()
        {
            return Ok(None);
        }

        let directory = PathBuf::from(present(directory, keys::LOG_DIR)?);
        let pool_size = parse_index(present(pool_size, keys::NUM_OF_LOG_FILES)?, keys::NUM_OF_LOG_FILES)?;
        let active_slot = parse_index(
            present(active_slot, keys::CURRENT_LOG_FILE_NUMBER)?,
            keys::CURRENT_LOG_FILE_NUMBER,
        )?;
        let raw_date = present(last_write_date, keys::DATE_OF_LAST_LOG)?;
        let last_write_date =
            NaiveDate::parse_from_str(&raw_date, DATE_FORMAT).map_err(|e| StateError::Corrupted {
                key: keys::DATE_OF_LAST_LOG.to_string(),
                reason: format!("'{raw_date}' is not a date: {e}"),
            })?;

        if pool_size == 0 {
            return Err(StateError::Corrupted {
                key: keys::NUM_OF_LOG_FILES.to_string(),
                reason: "pool size is 0".to_string(),
            });
        }
        if active_slot >= pool_size {
            return Err(StateError::Corrupted {
                key: keys::CURRENT_LOG_FILE_NUMBER.to_string(),
                reason: format!("slot {active_slot} is outside the pool of {pool_size}"),
            });
        }

        Ok(Some(Self {
            directory,
            pool_size,
            active_slot,
            last_write_date,
        }))
    }

    /// Creates fresh state for a new storage location and persists it.
    ///
    /// The directory is created if needed; an existing directory is reused.
    /// The first record goes to slot 0 and `today` becomes the last write date.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::ZeroPoolSize`] if `pool_size` is 0
    /// - [`StorageInitError::CreateDirectory`] if the directory cannot be created
    /// - [`StorageInitError::Store`] if the state cannot be written
    pub fn initialize<S: KeyValueStore + ?Sized>(
        store: &mut S,
        directory: &Path,
        pool_size: usize,
        today: NaiveDate,
    ) -> Result<Self> {
        if pool_size == 0 {
            return Err(ConfigError::ZeroPoolSize.into());
        }

        fs::create_dir_all(directory).map_err(|e| StorageInitError::CreateDirectory {
            path: directory.to_path_buf(),
            source: e,
        })?;

        let state = Self {
            directory: directory.to_path_buf(),
            pool_size,
            active_slot: 0,
            last_write_date: today,
        };
        state.persist(store).map_err(StorageInitError::Store)?;

        Ok(state)
    }

    /// Writes every field back to the store.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] if the store cannot be written.
    pub fn persist<S: KeyValueStore + ?Sized>(
        &self,
        store: &mut S,
    ) -> std::result::Result<(), StateError> {
        store.set_many(&[
            (keys::LOG_DIR, self.directory.to_string_lossy().into_owned()),
            (keys::NUM_OF_LOG_FILES, self.pool_size.to_string()),
            (keys::CURRENT_LOG_FILE_NUMBER, self.active_slot.to_string()),
            (
                keys::DATE_OF_LAST_LOG,
                self.last_write_date.format(DATE_FORMAT).to_string(),
            ),
        ])
    }

    /// Returns the slot that follows the active one, wrapping at the pool end.
    pub fn next_slot(&self) -> usize {
        (self.active_slot + 1) % self.pool_size
    }
}

fn present(value: Option<String>, key: &str) -> std::result::Result<String, StateError> {
    value.ok_or_else(|| StateError::Corrupted {
        key: key.to_string(),
        reason: "key is missing while other rotation keys are present".to_string(),
    })
}

fn parse_index(raw: String, key: &str) -> std::result::Result<usize, StateError> {
    raw.trim().parse().map_err(|_| StateError::Corrupted {
        key: key.to_string(),
        reason: format!("'{raw}' is not a non-negative integer"),
    })
}

//! On-demand archiving of the retained slot files.
//!
//! An archive is a single file holding every slot file that currently
//! exists. The contents are a JSON [`ArchiveBundle`] compressed with the
//! Snappy frame format. Archiving never touches the slot files or the
//! rotation state.
//!
//! Archives are written to `<log_dir>/archives/` under a name derived from
//! the creation time, with a numeric suffix when that name is taken, so
//! repeated calls never overwrite an earlier archive. Removing old archives
//! is left to the caller.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ArchiveError, Result};
use crate::pool::FilePoolManager;

/// Name of the archive directory inside the log directory.
pub const ARCHIVE_DIR: &str = "archives";

/// Extension of archive files.
pub const ARCHIVE_EXTENSION: &str = "snap";

/// Bundle format version written by this build.
pub const ARCHIVE_VERSION: u32 = 1;

/// Contents of an archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveBundle {
    /// Bundle format version.
    pub version: u32,
    /// When the archive was created.
    pub created_at: DateTime<Utc>,
    /// Archived slots, ordered by index.
    pub slots: Vec<ArchivedSlot>,
}

/// One slot file captured in an archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedSlot {
    /// Slot index in the pool.
    pub index: usize,
    /// File name of the slot, e.g. `0.log`.
    pub file_name: String,
    /// Raw file contents, byte for byte.
    pub contents: Vec<u8>,
}

impl ArchiveBundle {
    /// Writes every archived slot back out under `dir`, creating it if needed.
    ///
    /// Existing files with the same names are overwritten. Returns the
    /// written paths in slot order.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError`] if the directory or a file cannot be written.
    pub fn restore<P: AsRef<Path>>(&self, dir: P) -> Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|e| ArchiveError::CreateDirectory {
            path: dir.to_path_buf(),
            source: e,
        })?;

        let mut written = Vec::with_capacity(self.slots.len());
        for slot in &self.slots {
            let path = dir.join(&slot.file_name);
            fs::write(&path, &slot.contents).map_err(|e| ArchiveError::Write {
                path: path.clone(),
                source: e,
            })?;
            written.push(path);
        }
        Ok(written)
    }
}

/// Bundles every existing slot file of `pool` into a new archive.
///
/// Returns `Ok(None)` when no slot file exists yet. Appends wait until the
/// slot files have been read.
///
/// # Errors
///
/// Returns [`ArchiveError`] if a slot cannot be read or the archive cannot
/// be written. A partially written archive is removed.
pub fn archive(pool: &FilePoolManager) -> Result<Option<PathBuf>> {
    let created_at = Utc::now();
    let slots = pool.with_read_lock(|_| collect_slots(pool))?;

    if slots.is_empty() {
        return Ok(None);
    }

    let bundle = ArchiveBundle {
        version: ARCHIVE_VERSION,
        created_at,
        slots,
    };

    let archive_dir = pool.directory().join(ARCHIVE_DIR);
    fs::create_dir_all(&archive_dir).map_err(|e| ArchiveError::CreateDirectory {
        path: archive_dir.clone(),
        source: e,
    })?;

    let path = unique_archive_path(&archive_dir, created_at);
    let mut temp_name = path.as_os_str().to_os_string();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);

    let written = write_bundle(&temp_path, &bundle).and_then(|()| {
        fs::rename(&temp_path, &path).map_err(|e| ArchiveError::Write {
            path: path.clone(),
            source: e,
        })
    });

    if let Err(e) = written {
        if let Err(cleanup) = fs::remove_file(&temp_path)
            && cleanup.kind() != ErrorKind::NotFound
        {
            warn!(
                path = %temp_path.display(),
                error = %cleanup,
                "failed to remove partial archive"
            );
        }
        return Err(e.into());
    }

    info!(
        path = %path.display(),
        slots = bundle.slots.len(),
        "created log archive"
    );
    Ok(Some(path))
}

/// Reads an archive created by [`archive`].
///
/// # Errors
///
/// Returns [`ArchiveError`] if the file cannot be read, is not a valid
/// bundle, or has an unsupported version.
pub fn read_archive<P: AsRef<Path>>(path: P) -> Result<ArchiveBundle> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| ArchiveError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;

    let decoder = snap::read::FrameDecoder::new(BufReader::new(file));
    let bundle: ArchiveBundle =
        serde_json::from_reader(decoder).map_err(|e| ArchiveError::Decode {
            path: path.to_path_buf(),
            source: e,
        })?;

    if bundle.version != ARCHIVE_VERSION {
        return Err(ArchiveError::UnsupportedVersion {
            expected: ARCHIVE_VERSION,
            found: bundle.version,
        }
        .into());
    }
    Ok(bundle)
}

/// Reads every slot file that exists, in index order.
fn collect_slots(pool: &FilePoolManager) -> std::result::Result<Vec<ArchivedSlot>, ArchiveError> {
    let mut slots = Vec::new();

    for (index, path) in pool.all_slot_paths().into_iter().enumerate() {
        let contents = match fs::read(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => return Err(ArchiveError::ReadSlot { path, source: e }),
        };

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| index.to_string());
        slots.push(ArchivedSlot {
            index,
            file_name,
            contents,
        });
    }

    Ok(slots)
}

/// Serializes and compresses `bundle` into `path`.
fn write_bundle(path: &Path, bundle: &ArchiveBundle) -> std::result::Result<(), ArchiveError> {
    let write_err = |source: std::io::Error| ArchiveError::Write {
        path: path.to_path_buf(),
        source,
    };

    let file = File::create(path).map_err(write_err)?;
    let mut encoder = snap::write::FrameEncoder::new(BufWriter::new(file));
    serde_json::to_writer(&mut encoder, bundle)
        .map_err(|e| ArchiveError::Serialize { source: e })?;
    encoder.flush().map_err(write_err)?;

    let writer = encoder.into_inner().map_err(|e| {
        write_err(std::io::Error::new(e.error().kind(), e.error().to_string()))
    })?;
    let file = writer
        .into_inner()
        .map_err(|e| write_err(e.into_error()))?;
    file.sync_all().map_err(write_err)
}

/// Picks `daylog-<timestamp>.snap`, or the first free `-N` variant.
fn unique_archive_path(dir: &Path, created_at: DateTime<Utc>) -> PathBuf {
    let stem = format!("daylog-{}", created_at.format("%Y%m%dT%H%M%SZ"));
    let mut candidate = dir.join(format!("{stem}.{ARCHIVE_EXTENSION}"));
    let mut suffix = 1u32;
    while candidate.exists() {
        candidate = dir.join(format!("{stem}-{suffix}.{ARCHIVE_EXTENSION}"));
        suffix += 1;
    }
    candidate
}

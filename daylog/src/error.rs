//! Error types for the daylog rotating log store.

use std::path::PathBuf;

use thiserror::Error;

/// The main error type for all daylog operations.
///
/// Each variant wraps the error family of one stage of the store: opening
/// and configuring the pool, persisting rotation state, encoding and decoding
/// records, slot file I/O, and archiving.
#[derive(Error, Debug)]
pub enum DaylogError {
    /// An initialization parameter is invalid.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// The storage directory or rotation state could not be set up.
    #[error("storage init error: {0}")]
    StorageInit(#[from] StorageInitError),

    /// Rotation state could not be read from or written to its store.
    #[error("rotation state error: {0}")]
    State(#[from] StateError),

    /// A record could not be encoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// A stored record could not be decoded.
    #[error("malformed record: {0}")]
    MalformedRecord(#[from] MalformedRecord),

    /// A read was requested for a slot file that has never been written.
    #[error("slot file '{}' does not exist", path.display())]
    SlotNotFound {
        /// The missing slot file.
        path: PathBuf,
    },

    /// A slot index outside the pool was requested.
    #[error("slot {index} is outside the pool of {pool_size} slots")]
    SlotOutOfRange {
        /// The requested slot index.
        index: usize,
        /// The configured pool size.
        pool_size: usize,
    },

    /// Reading or writing a slot file failed.
    #[error("slot file I/O failed for '{}': {source}", path.display())]
    SlotIo {
        /// The slot file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Creating or reading an archive failed.
    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),
}

/// Errors caused by invalid initialization parameters.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// The pool must hold at least one slot.
    #[error("pool size must be at least 1")]
    ZeroPoolSize,

    /// The slot file extension is empty.
    #[error("slot file extension must not be empty")]
    EmptyExtension,

    /// The slot file extension cannot be used in a file name.
    #[error("invalid slot file extension '{extension}': {reason}")]
    InvalidExtension {
        /// The rejected extension.
        extension: String,
        /// Why the extension is invalid.
        reason: String,
    },

    /// The timestamp format cannot be used by the record codec.
    #[error("invalid timestamp format '{format}': {reason}")]
    InvalidTimestampFormat {
        /// The rejected strftime format.
        format: String,
        /// Why the format is invalid.
        reason: String,
    },

    /// The storage directory cannot be stored as text.
    #[error("log directory '{}' is not valid UTF-8", directory.display())]
    NonUtf8Directory {
        /// The rejected directory.
        directory: PathBuf,
    },

    /// The persisted pool size differs from the requested one.
    #[error("stored pool size {stored} does not match requested pool size {requested}")]
    PoolSizeMismatch {
        /// Pool size found in the rotation state.
        stored: usize,
        /// Pool size passed to open.
        requested: usize,
    },

    /// The persisted storage directory differs from the requested one.
    #[error(
        "stored log directory '{}' does not match requested directory '{}'",
        stored.display(),
        requested.display()
    )]
    DirectoryMismatch {
        /// Directory found in the rotation state.
        stored: PathBuf,
        /// Directory passed to open.
        requested: PathBuf,
    },
}

/// Errors that can occur while preparing the storage location.
#[derive(Error, Debug)]
pub enum StorageInitError {
    /// The storage directory could not be created.
    #[error("failed to create log directory '{}': {source}", path.display())]
    CreateDirectory {
        /// The directory that could not be created.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The key-value store could not be read or written.
    #[error("rotation state store unavailable: {0}")]
    Store(#[from] StateError),
}

/// Errors raised by a [`KeyValueStore`](crate::state::KeyValueStore) or
/// while interpreting its contents.
#[derive(Error, Debug)]
pub enum StateError {
    /// The backing file could not be read or written.
    #[error("state file I/O failed for '{}': {source}", path.display())]
    Io {
        /// The backing file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The backing file is not a valid JSON object of strings.
    #[error("failed to parse state file '{}': {source}", path.display())]
    Parse {
        /// The backing file path.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Serializing the store contents failed.
    #[error("failed to serialize state: {source}")]
    Serialize {
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A stored value is missing or cannot be interpreted.
    #[error("corrupted rotation state at key '{key}': {reason}")]
    Corrupted {
        /// The offending key.
        key: String,
        /// Description of what was invalid.
        reason: String,
    },
}

/// Errors raised when a record cannot be written in the delimited format.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CodecError {
    /// A text field contains the record separator.
    #[error("field '{field}' contains the record separator")]
    SeparatorInField {
        /// The offending field.
        field: &'static str,
    },

    /// A single-line field contains a line break.
    #[error("field '{field}' contains a line break")]
    LineBreakInField {
        /// The offending field.
        field: &'static str,
    },

    /// Source line numbers start at 1.
    #[error("line number must be positive")]
    InvalidLineNumber,

    /// The timestamp could not be rendered with the configured format.
    #[error("timestamp cannot be rendered with format '{format}'")]
    TimestampFormat {
        /// The configured strftime format.
        format: String,
    },
}

/// A stored record that could not be decoded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line}: {reason}")]
pub struct MalformedRecord {
    /// 1-based physical line on which the record starts.
    pub line: usize,
    /// What was wrong with the record.
    pub reason: MalformedReason,
}

/// Why a stored record failed to decode.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedReason {
    /// A required field is absent or empty.
    #[error("missing field '{0}'")]
    MissingField(&'static str),

    /// The severity field is not a known severity.
    #[error("unknown severity '{0}'")]
    UnknownSeverity(String),

    /// The line number field is not a positive integer.
    #[error("invalid line number '{0}'")]
    InvalidLineNumber(String),

    /// The timestamp does not parse under the configured format.
    #[error("unparseable timestamp '{0}'")]
    InvalidTimestamp(String),

    /// Body text appears before any record header.
    #[error("text outside of any record")]
    OrphanContinuation,

    /// The line is not valid UTF-8.
    #[error("line is not valid UTF-8")]
    InvalidUtf8,
}

/// Errors that can occur while creating or reading an archive.
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// The archive directory could not be created.
    #[error("failed to create archive directory '{}': {source}", path.display())]
    CreateDirectory {
        /// The directory path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A slot file could not be read for bundling.
    #[error("failed to read slot file '{}': {source}", path.display())]
    ReadSlot {
        /// The slot file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The bundle could not be serialized.
    #[error("failed to serialize archive bundle: {source}")]
    Serialize {
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The compressed artifact or a restored file could not be written.
    #[error("failed to write '{}': {source}", path.display())]
    Write {
        /// The file being written.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The archive file could not be opened.
    #[error("failed to read archive '{}': {source}", path.display())]
    Read {
        /// The archive path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The archive contents are not a valid bundle.
    #[error("failed to decode archive '{}': {source}", path.display())]
    Decode {
        /// The archive path.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The archive was written by an incompatible format version.
    #[error("unsupported archive version: expected {expected}, found {found}")]
    UnsupportedVersion {
        /// The version this build understands.
        expected: u32,
        /// The version found in the archive.
        found: u32,
    },
}

/// Type alias for `Result<T, DaylogError>`.
pub type Result<T> = std::result::Result<T, DaylogError>;

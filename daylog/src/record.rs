//! Structured log records as stored in slot files.
//!
//! A [`LogRecord`] is the unit the store accepts and hands back. Message
//! formatting happens before a record is built; the store only encodes the
//! fields it is given.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Record severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Diagnostic detail.
    Debug,
    /// Normal operational messages.
    Info,
    /// Something unexpected that did not stop the operation.
    Warn,
    /// An operation failed.
    Error,
}

impl Severity {
    /// All severities in ascending order.
    pub const ALL: [Severity; 4] = [Self::Debug, Self::Info, Self::Warn, Self::Error];

    /// Returns the lowercase name used in the on-disk format.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Error returned when parsing an unknown severity name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown severity '{0}'")]
pub struct ParseSeverityError(pub String);

impl FromStr for Severity {
    type Err = ParseSeverityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            _ => Err(ParseSeverityError(s.to_string())),
        }
    }
}

/// When a record was produced and how severe it is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordHeader {
    /// Moment the record was produced.
    pub timestamp: DateTime<Utc>,
    /// Record severity.
    pub severity: Severity,
}

/// Where in the producing program a record was emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    /// Source file name.
    pub file: String,
    /// Function or method name.
    pub function: String,
    /// 1-based source line.
    pub line: u32,
}

/// A single structured log record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Timestamp and severity.
    pub header: RecordHeader,
    /// Source location.
    pub location: SourceLocation,
    /// Message text; may span several lines.
    pub body: String,
}

impl LogRecord {
    /// Builds a record from its individual fields.
    pub fn new(
        severity: Severity,
        timestamp: DateTime<Utc>,
        file: impl Into<String>,
        function: impl Into<String>,
        line: u32,
        body: impl Into<String>,
    ) -> Self {
        Self {
            header: RecordHeader {
                timestamp,
                severity,
            },
            location: SourceLocation {
                file: file.into(),
                function: function.into(),
                line,
            },
            body: body.into(),
        }
    }

    /// Returns the record severity.
    pub fn severity(&self) -> Severity {
        self.header.severity
    }
}

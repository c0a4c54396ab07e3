//! Pool configuration.
//!
//! A [`PoolConfig`] is supplied by the embedding application when the pool is
//! opened. It derives `serde` traits so applications can keep it alongside
//! their own settings.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::codec::{DEFAULT_TIMESTAMP_FORMAT, validate_timestamp_format};
use crate::error::ConfigError;

/// Number of slots used when a configuration omits the pool size.
pub const DEFAULT_POOL_SIZE: usize = 7;

/// Extension given to slot files when none is configured.
pub const DEFAULT_EXTENSION: &str = "log";

/// Settings for a [`FilePoolManager`](crate::pool::FilePoolManager).
///
/// # Example
///
/// ```rust
/// use daylog::PoolConfig;
///
/// let config = PoolConfig::new("/var/log/my-app", 3).with_extension("txt");
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Directory holding the slot files.
    pub directory: PathBuf,

    /// Number of slot files kept; bounds history to this many write-days.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Extension of slot files, without the leading dot.
    #[serde(default = "default_extension")]
    pub extension: String,

    /// strftime format for the timestamp field of encoded records.
    #[serde(default = "default_timestamp_format")]
    pub timestamp_format: String,
}

fn default_pool_size() -> usize {
    DEFAULT_POOL_SIZE
}

fn default_extension() -> String {
    DEFAULT_EXTENSION.to_string()
}

fn default_timestamp_format() -> String {
    DEFAULT_TIMESTAMP_FORMAT.to_string()
}

impl PoolConfig {
    /// Creates a configuration with the default extension and timestamp format.
    pub fn new<P: AsRef<Path>>(directory: P, pool_size: usize) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
            pool_size,
            extension: default_extension(),
            timestamp_format: default_timestamp_format(),
        }
    }

    /// Sets the slot file extension.
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Sets the timestamp format used by the record codec.
    pub fn with_timestamp_format(mut self, format: impl Into<String>) -> Self {
        self.timestamp_format = format.into();
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the pool size is 0, the directory is not
    /// valid UTF-8, the extension is empty or contains a path separator or
    /// dot, or the timestamp format is unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool_size == 0 {
            return Err(ConfigError::ZeroPoolSize);
        }
        if self.directory.to_str().is_none() {
            return Err(ConfigError::NonUtf8Directory {
                directory: self.directory.clone(),
            });
        }

        if self.extension.is_empty() {
            return Err(ConfigError::EmptyExtension);
        }
        if let Some(bad) = self
            .extension
            .chars()
            .find(|c| matches!(c, '/' | '\\' | '.') || c.is_whitespace() || c.is_control())
        {
            return Err(ConfigError::InvalidExtension {
                extension: self.extension.clone(),
                reason: format!("character {bad:?} is not allowed"),
            });
        }

        validate_timestamp_format(&self.timestamp_format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_uses_defaults() {
        let config = PoolConfig::new("logs", 3);
        assert_eq!(config.directory, PathBuf::from("logs"));
        assert_eq!(config.pool_size, 3);
        assert_eq!(config.extension, "log");
        assert_eq!(config.timestamp_format, DEFAULT_TIMESTAMP_FORMAT);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_pool_size_rejected() {
        assert_eq!(
            PoolConfig::new("logs", 0).validate(),
            Err(ConfigError::ZeroPoolSize)
        );
    }

    #[test]
    fn test_extension_validation() {
        assert_eq!(
            PoolConfig::new("logs", 1).with_extension("").validate(),
            Err(ConfigError::EmptyExtension)
        );

        for bad in [".log", "a/b", "tar gz"] {
            assert!(
                matches!(
                    PoolConfig::new("logs", 1).with_extension(bad).validate(),
                    Err(ConfigError::InvalidExtension { .. })
                ),
                "{bad:?}"
            );
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_directory_rejected() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let directory = Path::new(OsStr::from_bytes(b"logs-\xff"));
        assert_eq!(
            PoolConfig::new(directory, 3).validate(),
            Err(ConfigError::NonUtf8Directory {
                directory: directory.to_path_buf(),
            })
        );
    }

    #[test]
    fn test_timestamp_format_validation() {
        let config = PoolConfig::new("logs", 1).with_timestamp_format("%Y|>%m");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidTimestampFormat { .. })
        ));
    }

    #[test]
    fn test_deserialize_fills_defaults() {
        let config: PoolConfig = serde_json::from_str(r#"{ "directory": "/tmp/app-logs" }"#).unwrap();
        assert_eq!(config.pool_size, DEFAULT_POOL_SIZE);
        assert_eq!(config.extension, DEFAULT_EXTENSION);
        assert_eq!(config.timestamp_format, DEFAULT_TIMESTAMP_FORMAT);
    }
}

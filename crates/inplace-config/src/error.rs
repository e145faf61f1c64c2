//! Error types for configuration loading.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading a configuration file failed.
    #[error("failed to read configuration file {}", .path.display())]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// File that could not be read.
        path: PathBuf,
        /// Source IO error.
        source: io::Error,
    },
}

impl ConfigError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }
}

/// Convenience alias for configuration results.
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn io_helper_keeps_source_and_path() {
        let err = ConfigError::io("alias.read", "/tmp/config", io::Error::other("boom"));
        assert!(err.source().is_some());
        assert_eq!(
            err.to_string(),
            "failed to read configuration file /tmp/config"
        );
        let ConfigError::Io {
            operation, path, ..
        } = err;
        assert_eq!(operation, "alias.read");
        assert_eq!(path, PathBuf::from("/tmp/config"));
    }
}

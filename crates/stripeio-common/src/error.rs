//! Error types for stripeio
//!
//! This module defines the common error type used throughout the storage
//! components.

use thiserror::Error;

/// Common result type for stripeio operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for stripeio
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("no version info for object {object} (version {version}, timestamp {timestamp})")]
    VersionNotFound {
        object: u64,
        version: u64,
        timestamp: i64,
    },

    #[error("illegal object file name: {0}")]
    InvalidObjectName(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a storage error from a context message
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Check if this is a not found error
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::VersionNotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_classification() {
        let err = Error::VersionNotFound {
            object: 3,
            version: 1,
            timestamp: 0,
        };
        assert!(err.is_not_found());
        assert!(!Error::storage("boom").is_not_found());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}

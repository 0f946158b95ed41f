//! Error types for granule storage access.

use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid granule location: {0}")]
    InvalidLocation(String),

    #[error("No store configured for {0}")]
    NotConfigured(String),

    #[error("Storage error: {0}")]
    Backend(String),

    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

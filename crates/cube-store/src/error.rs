//! Error types for the cube store.

use thiserror::Error;

/// Errors that can occur while creating, appending to or reading a cube.
#[derive(Error, Debug)]
pub enum CubeStoreError {
    /// A batch does not match the layout already on disk.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    /// A batch carries time stamps that already exist in the store.
    #[error("duplicate mid_date {0} (ms since epoch)")]
    DuplicateMidDate(i64),

    /// The first write must define fill values for the store.
    #[error("fill-value encoding is required when creating a store")]
    MissingEncoding,

    /// Appends may not redefine fill values set at creation.
    #[error("fill-value encoding may only be given on the first write")]
    MetadataReassert,

    /// A batch is internally inconsistent (column lengths).
    #[error("invalid batch: {0}")]
    InvalidBatch(String),

    /// Invalid metadata in an existing store.
    #[error("invalid cube metadata: {0}")]
    InvalidMetadata(String),

    /// Zarr format error.
    #[error("Zarr format error: {0}")]
    ZarrError(String),

    /// Storage/IO error.
    #[error("storage error: {0}")]
    StorageError(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl CubeStoreError {
    pub fn schema_mismatch(msg: impl Into<String>) -> Self {
        Self::SchemaMismatch(msg.into())
    }

    pub fn invalid_batch(msg: impl Into<String>) -> Self {
        Self::InvalidBatch(msg.into())
    }

    pub fn invalid_metadata(msg: impl Into<String>) -> Self {
        Self::InvalidMetadata(msg.into())
    }

    pub fn zarr_error(msg: impl Into<String>) -> Self {
        Self::ZarrError(msg.into())
    }

    pub fn storage_error(msg: impl Into<String>) -> Self {
        Self::StorageError(msg.into())
    }

    /// True for errors caused by the data handed in rather than by I/O.
    pub fn is_consistency(&self) -> bool {
        matches!(
            self,
            Self::SchemaMismatch(_)
                | Self::DuplicateMidDate(_)
                | Self::MissingEncoding
                | Self::MetadataReassert
                | Self::InvalidBatch(_)
        )
    }
}

impl From<std::io::Error> for CubeStoreError {
    fn from(err: std::io::Error) -> Self {
        Self::StorageError(err.to_string())
    }
}

impl From<serde_json::Error> for CubeStoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidMetadata(err.to_string())
    }
}

/// Result type for cube store operations.
pub type Result<T> = std::result::Result<T, CubeStoreError>;

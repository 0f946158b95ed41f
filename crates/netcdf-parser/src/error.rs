//! Error types for NetCDF granule decoding.

use thiserror::Error;

/// Result type for NetCDF parser operations.
pub type NetCdfResult<T> = Result<T, NetCdfError>;

/// Error types for NetCDF parsing.
#[derive(Error, Debug)]
pub enum NetCdfError {
    /// File I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Missing required variable or attribute
    #[error("Missing required data: {0}")]
    MissingData(String),

    /// Invalid data format
    #[error("Invalid data format: {0}")]
    InvalidFormat(String),
}

impl NetCdfError {
    pub fn missing(what: impl Into<String>) -> Self {
        NetCdfError::MissingData(what.into())
    }

    pub fn invalid(what: impl Into<String>) -> Self {
        NetCdfError::InvalidFormat(what.into())
    }
}

//! Error types for cube assembly.

use cube_store::CubeStoreError;
use thiserror::Error;

/// Errors that abort a cube run.
#[derive(Error, Debug)]
pub enum CubeError {
    #[error("Invalid granule name '{name}': {reason}")]
    InvalidGranuleName { name: String, reason: String },

    #[error("Inconsistent cube: {0}")]
    Inconsistent(String),

    #[error("Granule search returned no results")]
    EmptyResult,

    #[error("Granule search failed: {0}")]
    Search(String),

    #[error("Failed to fetch granule {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("Layer {url} has no attribute '{attribute}' on '{variable}'")]
    MissingAttribute {
        url: String,
        variable: String,
        attribute: String,
    },

    #[error("Failed to write cube: {0}")]
    Write(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Batch {batch_index} at offset {offset} failed: {source}")]
    Batch {
        batch_index: usize,
        offset: usize,
        #[source]
        source: Box<CubeError>,
    },
}

impl CubeError {
    pub fn invalid_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidGranuleName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn inconsistent(msg: impl Into<String>) -> Self {
        Self::Inconsistent(msg.into())
    }

    pub fn fetch(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::Fetch {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// True for errors caused by data that contradicts the cube, as opposed
    /// to I/O or configuration failures.
    pub fn is_consistency(&self) -> bool {
        match self {
            CubeError::Inconsistent(_) => true,
            CubeError::Batch { source, .. } => source.is_consistency(),
            _ => false,
        }
    }

    /// The innermost error, without batch context.
    pub fn root(&self) -> &CubeError {
        match self {
            CubeError::Batch { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<CubeStoreError> for CubeError {
    fn from(e: CubeStoreError) -> Self {
        if e.is_consistency() {
            CubeError::Inconsistent(e.to_string())
        } else {
            CubeError::Write(e.to_string())
        }
    }
}

/// Result type for cube assembly.
pub type Result<T> = std::result::Result<T, CubeError>;

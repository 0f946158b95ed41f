//! Error types shared by the cube crates.

use thiserror::Error;

/// Result type alias using CommonError.
pub type CommonResult<T> = Result<T, CommonError>;

/// Errors raised while parsing the small value types in this crate.
#[derive(Debug, Error)]
pub enum CommonError {
    #[error("Invalid EPSG code: {0}")]
    InvalidEpsg(String),

    #[error("Invalid BBOX: {0}")]
    InvalidBbox(String),

    #[error("Invalid polygon: {0}")]
    InvalidPolygon(String),

    #[error("Invalid date '{value}': expected format {format}")]
    InvalidDate { value: String, format: &'static str },
}

impl CommonError {
    pub fn invalid_date(value: impl Into<String>, format: &'static str) -> Self {
        CommonError::InvalidDate {
            value: value.into(),
            format,
        }
    }
}

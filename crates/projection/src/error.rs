use cube_common::EpsgCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProjectionError>;

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("Unsupported projection: EPSG:{0}")]
    Unsupported(EpsgCode),

    #[error("Transform produced non-finite coordinates for ({x}, {y}) in EPSG:{epsg}")]
    NonFinite { epsg: EpsgCode, x: f64, y: f64 },
}

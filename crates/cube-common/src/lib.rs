//! Common types and utilities shared across the velocity cube crates.

pub mod bbox;
pub mod crs;
pub mod error;
pub mod time;

pub use bbox::BoundingBox;
pub use crs::EpsgCode;
pub use error::{CommonError, CommonResult};
pub use time::{millis_to_datetime, parse_compact_date, MidDate};

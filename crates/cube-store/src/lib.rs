//! Append-only Zarr V3 storage for velocity cubes.
//!
//! A cube is a time series of velocity grids on one fixed spatial grid:
//! grid variables are `[mid_date, y, x]`, per-slice scalars are
//! `[mid_date]`. The store is written one [`BatchTable`] at a time:
//!
//! ```text
//! BatchTable (first)  ──► CubeStore::create   (fill values fixed here)
//! BatchTable (next)   ──► CubeStore::append   (layout checked, then grown)
//! ```
//!
//! Each call consumes its table, so the batch buffers are released as soon
//! as the write returns.

pub mod config;
pub mod error;
pub mod manifest;
pub mod table;
pub mod writer;

pub use config::{CubeStoreConfig, ZarrCompression};
pub use error::{CubeStoreError, Result};
pub use manifest::{GranuleManifest, MANIFEST_FILE};
pub use table::{BatchTable, FillEncoding, GridColumn, SeriesColumn, SliceRecord};
pub use writer::{CubeStore, MID_DATE, X, Y};

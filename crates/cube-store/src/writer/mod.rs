//! Zarr writer for velocity cubes.
//!
//! The first batch creates the store; later batches are appended along the
//! `mid_date` dimension.

mod zarr_cube;

pub use zarr_cube::{CubeStore, MID_DATE, X, Y};

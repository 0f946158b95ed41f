//! NetCDF decoding for ITS_LIVE velocity image-pair granules.
//!
//! A granule holds one velocity pair on a regular projected `[y, x]` grid:
//! the velocity rasters (`v`, `vx`, `vy`, ...), the projection
//! (`UTM_Projection` or `mapping` with a `spatial_epsg` attribute) and the
//! pair metadata (`img_pair_info` with `date_center` and `date_dt`).
//!
//! Decoding uses the native netcdf library (libnetcdf + HDF5); the result is
//! a [`DecodedGranule`] of owned buffers, independent of the file.

pub mod error;
pub mod granule;
pub mod native;

pub use error::{NetCdfError, NetCdfResult};
pub use granule::{AttrValue, Attributes, DecodedGranule, GridVariable, VariableSelection};
pub use native::{read_granule, read_granule_from_bytes, silence_hdf5_errors};

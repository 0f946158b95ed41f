//! Coordinate reference system transformations.
//!
//! Implements the projections velocity granules are delivered in (UTM zones
//! and the two polar stereographic grids) from scratch, without external
//! dependencies. Only the direction needed to query the search API, projected
//! to geographic, is exposed at the crate level.

pub mod ellipsoid;
pub mod error;
pub mod polar;
pub mod transform;
pub mod utm;

pub use error::{ProjectionError, Result};
pub use polar::PolarStereographic;
pub use transform::{densify_ring, ring_to_lon_lat, to_lon_lat, Projection};
pub use utm::TransverseMercator;

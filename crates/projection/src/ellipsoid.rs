//! WGS84 ellipsoid constants.

/// Semi-major axis (meters)
pub const WGS84_A: f64 = 6_378_137.0;
/// Flattening
pub const WGS84_F: f64 = 1.0 / 298.257_223_563;
/// First eccentricity squared
pub const WGS84_E2: f64 = WGS84_F * (2.0 - WGS84_F);
/// First eccentricity
pub const WGS84_E: f64 = 0.081_819_190_842_622;

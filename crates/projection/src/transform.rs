//! Dispatch from EPSG codes to projection implementations.

use cube_common::crs::{Hemisphere, ProjectionKind};
use cube_common::EpsgCode;

use crate::error::{ProjectionError, Result};
use crate::polar::PolarStereographic;
use crate::utm::TransverseMercator;

/// A projection resolved from an EPSG code.
#[derive(Debug, Clone)]
pub enum Projection {
    Geographic,
    Utm(TransverseMercator),
    Polar(PolarStereographic),
}

impl Projection {
    pub fn from_epsg(epsg: EpsgCode) -> Result<Self> {
        match epsg.kind() {
            ProjectionKind::Geographic => Ok(Projection::Geographic),
            ProjectionKind::Utm { zone, hemisphere } => Ok(Projection::Utm(
                TransverseMercator::new(zone, hemisphere == Hemisphere::South),
            )),
            ProjectionKind::PolarNorth => Ok(Projection::Polar(PolarStereographic::nsidc_north())),
            ProjectionKind::PolarSouth => Ok(Projection::Polar(PolarStereographic::antarctic())),
            ProjectionKind::Other => Err(ProjectionError::Unsupported(epsg)),
        }
    }

    /// Projected (x, y) to geographic (lon, lat) in degrees.
    pub fn inverse(&self, x: f64, y: f64) -> (f64, f64) {
        match self {
            Projection::Geographic => (x, y),
            Projection::Utm(tm) => tm.inverse(x, y),
            Projection::Polar(ps) => ps.inverse(x, y),
        }
    }

    /// Geographic (lon, lat) in degrees to projected (x, y).
    pub fn forward(&self, lon: f64, lat: f64) -> (f64, f64) {
        match self {
            Projection::Geographic => (lon, lat),
            Projection::Utm(tm) => tm.forward(lon, lat),
            Projection::Polar(ps) => ps.forward(lon, lat),
        }
    }
}

/// Transform a single projected point to (lon, lat).
pub fn to_lon_lat(epsg: EpsgCode, x: f64, y: f64) -> Result<(f64, f64)> {
    let projection = Projection::from_epsg(epsg)?;
    let (lon, lat) = projection.inverse(x, y);
    if !lon.is_finite() || !lat.is_finite() {
        return Err(ProjectionError::NonFinite { epsg, x, y });
    }
    Ok((lon, lat))
}

/// Insert `points_per_side` evenly spaced points between consecutive
/// vertices of a ring. The last vertex is kept as-is.
pub fn densify_ring(ring: &[(f64, f64)], points_per_side: usize) -> Vec<(f64, f64)> {
    if points_per_side == 0 || ring.len() < 2 {
        return ring.to_vec();
    }

    let mut out = Vec::with_capacity(ring.len() + (ring.len() - 1) * points_per_side);
    for pair in ring.windows(2) {
        let (x0, y0) = pair[0];
        let (x1, y1) = pair[1];
        out.push((x0, y0));
        for step in 1..=points_per_side {
            let f = step as f64 / (points_per_side + 1) as f64;
            out.push((x0 + (x1 - x0) * f, y0 + (y1 - y0) * f));
        }
    }
    if let Some(&last) = ring.last() {
        out.push(last);
    }
    out
}

/// Reproject a ring from `epsg` to lon/lat, optionally densifying its sides
/// first.
pub fn ring_to_lon_lat(
    epsg: EpsgCode,
    ring: &[(f64, f64)],
    points_per_side: usize,
) -> Result<Vec<(f64, f64)>> {
    let projection = Projection::from_epsg(epsg)?;
    densify_ring(ring, points_per_side)
        .into_iter()
        .map(|(x, y)| {
            let (lon, lat) = projection.inverse(x, y);
            if lon.is_finite() && lat.is_finite() {
                Ok((lon, lat))
            } else {
                Err(ProjectionError::NonFinite { epsg, x, y })
            }
        })
        .collect()
}

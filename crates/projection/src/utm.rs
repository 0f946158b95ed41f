//! Universal Transverse Mercator on the WGS84 ellipsoid.
//!
//! Series expansions follow Snyder, "Map Projections: A Working Manual"
//! (USGS PP 1395), equations 8-9 to 8-25. Accuracy is well below a meter
//! within a zone, which is far finer than the search API needs.

use std::f64::consts::PI;

use crate::ellipsoid::{WGS84_A, WGS84_E2};

const K0: f64 = 0.9996;
const FALSE_EASTING: f64 = 500_000.0;
const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// A single UTM zone.
#[derive(Debug, Clone)]
pub struct TransverseMercator {
    /// Zone number 1..=60
    pub zone: u8,
    /// Southern hemisphere zones carry a 10,000 km false northing
    pub south: bool,
    /// Central meridian in radians
    lon0: f64,
    ep2: f64,
}

impl TransverseMercator {
    pub fn new(zone: u8, south: bool) -> Self {
        let lon0_deg = (zone as f64 - 1.0) * 6.0 - 180.0 + 3.0;
        Self {
            zone,
            south,
            lon0: lon0_deg.to_radians(),
            ep2: WGS84_E2 / (1.0 - WGS84_E2),
        }
    }

    /// Central meridian in degrees.
    pub fn central_meridian(&self) -> f64 {
        self.lon0.to_degrees()
    }

    fn meridian_arc(lat: f64) -> f64 {
        let e2 = WGS84_E2;
        let e4 = e2 * e2;
        let e6 = e4 * e2;
        WGS84_A
            * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * lat
                - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * lat).sin()
                + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * lat).sin()
                - (35.0 * e6 / 3072.0) * (6.0 * lat).sin())
    }

    /// Geographic (degrees) to projected easting/northing (meters).
    pub fn forward(&self, lon_deg: f64, lat_deg: f64) -> (f64, f64) {
        let lat = lat_deg.to_radians();
        let mut dlon = lon_deg.to_radians() - self.lon0;
        while dlon > PI {
            dlon -= 2.0 * PI;
        }
        while dlon < -PI {
            dlon += 2.0 * PI;
        }

        let sin_lat = lat.sin();
        let cos_lat = lat.cos();
        let tan_lat = lat.tan();

        let n = WGS84_A / (1.0 - WGS84_E2 * sin_lat * sin_lat).sqrt();
        let t = tan_lat * tan_lat;
        let c = self.ep2 * cos_lat * cos_lat;
        let a = cos_lat * dlon;
        let m = Self::meridian_arc(lat);

        let x = K0
            * n
            * (a + (1.0 - t + c) * a.powi(3) / 6.0
                + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * self.ep2) * a.powi(5) / 120.0)
            + FALSE_EASTING;

        let mut y = K0
            * (m + n
                * tan_lat
                * (a * a / 2.0
                    + (5.0 - t + 9.0 * c + 4.0 * c * c) * a.powi(4) / 24.0
                    + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * self.ep2) * a.powi(6)
                        / 720.0));
        if self.south {
            y += FALSE_NORTHING_SOUTH;
        }

        (x, y)
    }

    /// Projected easting/northing (meters) to geographic (lon, lat) degrees.
    pub fn inverse(&self, x: f64, y: f64) -> (f64, f64) {
        let e2 = WGS84_E2;
        let x = x - FALSE_EASTING;
        let y = if self.south { y - FALSE_NORTHING_SOUTH } else { y };

        let m = y / K0;
        let mu = m / (WGS84_A * (1.0 - e2 / 4.0 - 3.0 * e2 * e2 / 64.0 - 5.0 * e2.powi(3) / 256.0));

        let sqrt_1me2 = (1.0 - e2).sqrt();
        let e1 = (1.0 - sqrt_1me2) / (1.0 + sqrt_1me2);

        // Footpoint latitude
        let phi1 = mu
            + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
            + (21.0 * e1 * e1 / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
            + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin()
            + (1097.0 * e1.powi(4) / 512.0) * (8.0 * mu).sin();

        let sin_phi1 = phi1.sin();
        let cos_phi1 = phi1.cos();
        let tan_phi1 = phi1.tan();

        let c1 = self.ep2 * cos_phi1 * cos_phi1;
        let t1 = tan_phi1 * tan_phi1;
        let denom = 1.0 - e2 * sin_phi1 * sin_phi1;
        let n1 = WGS84_A / denom.sqrt();
        let r1 = WGS84_A * (1.0 - e2) / denom.powf(1.5);
        let d = x / (n1 * K0);

        let lat = phi1
            - (n1 * tan_phi1 / r1)
                * (d * d / 2.0
                    - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * self.ep2) * d.powi(4)
                        / 24.0
                    + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1
                        - 252.0 * self.ep2
                        - 3.0 * c1 * c1)
                        * d.powi(6)
                        / 720.0);

        let lon = self.lon0
            + (d - (1.0 + 2.0 * t1 + c1) * d.powi(3) / 6.0
                + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * self.ep2 + 24.0 * t1 * t1)
                    * d.powi(5)
                    / 120.0)
                / cos_phi1;

        (lon.to_degrees(), lat.to_degrees())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_central_meridian() {
        assert!((TransverseMercator::new(28, false).central_meridian() + 15.0).abs() < 1e-12);
        assert!((TransverseMercator::new(31, false).central_meridian() - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_equator_on_central_meridian() {
        let tm = TransverseMercator::new(28, false);
        let (x, y) = tm.forward(-15.0, 0.0);
        assert!((x - 500_000.0).abs() < 1e-6);
        assert!(y.abs() < 1e-6);
    }

    #[test]
    fn test_round_trip_north() {
        let tm = TransverseMercator::new(28, false);
        let (lon, lat) = tm.inverse(487_462.0, 9_016_243.0);
        assert!(lat > 80.0 && lat < 82.0, "lat = {}", lat);
        let (x, y) = tm.forward(lon, lat);
        assert!((x - 487_462.0).abs() < 0.05, "x = {}", x);
        assert!((y - 9_016_243.0).abs() < 0.05, "y = {}", y);
    }

    #[test]
    fn test_round_trip_south() {
        let tm = TransverseMercator::new(19, true);
        let (x, y) = tm.forward(-70.0, -33.5);
        assert!(y > 0.0 && y < FALSE_NORTHING_SOUTH);
        let (lon, lat) = tm.inverse(x, y);
        assert!((lon + 70.0).abs() < 1e-6);
        assert!((lat + 33.5).abs() < 1e-6);
    }
}

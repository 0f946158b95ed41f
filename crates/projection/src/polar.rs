//! Polar stereographic projection with a latitude of true scale (variant B).
//!
//! Used by the NSIDC north (EPSG:3413, 70°N, -45°) and Antarctic
//! (EPSG:3031, 71°S, 0°) grids. Formulas are Snyder 21-33 to 21-38 and
//! 7-9 with 3-5 for the inverse. The southern aspect flips the signs of
//! x, y, longitudes and latitudes.

use std::f64::consts::PI;

use crate::ellipsoid::{WGS84_A, WGS84_E, WGS84_E2};

#[derive(Debug, Clone)]
pub struct PolarStereographic {
    /// +1 for the north pole aspect, -1 for the south
    sign: f64,
    /// Longitude pointing "down" the y axis, radians (sign-adjusted)
    lon0: f64,
    /// a * m_c / t_c
    scale: f64,
}

fn t_of(lat: f64) -> f64 {
    let es = WGS84_E * lat.sin();
    (PI / 4.0 - lat / 2.0).tan() / ((1.0 - es) / (1.0 + es)).powf(WGS84_E / 2.0)
}

impl PolarStereographic {
    pub fn new(true_scale_lat_deg: f64, lon0_deg: f64) -> Self {
        let sign = if true_scale_lat_deg < 0.0 { -1.0 } else { 1.0 };
        let lat_c = (sign * true_scale_lat_deg).to_radians();
        let m_c = lat_c.cos() / (1.0 - WGS84_E2 * lat_c.sin().powi(2)).sqrt();
        let t_c = t_of(lat_c);

        Self {
            sign,
            lon0: (sign * lon0_deg).to_radians(),
            scale: WGS84_A * m_c / t_c,
        }
    }

    /// EPSG:3413 NSIDC Sea Ice Polar Stereographic North.
    pub fn nsidc_north() -> Self {
        Self::new(70.0, -45.0)
    }

    /// EPSG:3031 Antarctic Polar Stereographic.
    pub fn antarctic() -> Self {
        Self::new(-71.0, 0.0)
    }

    pub fn forward(&self, lon_deg: f64, lat_deg: f64) -> (f64, f64) {
        let lat = (self.sign * lat_deg).to_radians();
        let dlon = (self.sign * lon_deg).to_radians() - self.lon0;
        let rho = self.scale * t_of(lat);
        let x = rho * dlon.sin();
        let y = -rho * dlon.cos();
        (self.sign * x, self.sign * y)
    }

    pub fn inverse(&self, x: f64, y: f64) -> (f64, f64) {
        let x = self.sign * x;
        let y = self.sign * y;
        let rho = (x * x + y * y).sqrt();
        if rho == 0.0 {
            return (self.sign * self.lon0.to_degrees(), self.sign * 90.0);
        }

        let t = rho / self.scale;
        let chi = PI / 2.0 - 2.0 * t.atan();

        let e2 = WGS84_E2;
        let e4 = e2 * e2;
        let e6 = e4 * e2;
        let e8 = e6 * e2;
        let lat = chi
            + (e2 / 2.0 + 5.0 * e4 / 24.0 + e6 / 12.0 + 13.0 * e8 / 360.0) * (2.0 * chi).sin()
            + (7.0 * e4 / 48.0 + 29.0 * e6 / 240.0 + 811.0 * e8 / 11520.0) * (4.0 * chi).sin()
            + (7.0 * e6 / 120.0 + 81.0 * e8 / 1120.0) * (6.0 * chi).sin()
            + (4279.0 * e8 / 161280.0) * (8.0 * chi).sin();
        let lon = self.lon0 + x.atan2(-y);

        let mut lon_deg = (self.sign * lon).to_degrees();
        if lon_deg > 180.0 {
            lon_deg -= 360.0;
        } else if lon_deg < -180.0 {
            lon_deg += 360.0;
        }
        (lon_deg, (self.sign * lat).to_degrees())
    }
}

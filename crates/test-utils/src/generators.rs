//! Synthetic granules and rasters.
//!
//! Generated granules look like decoded ITS_LIVE image pairs: every raster
//! the cube needs, and the attributes it promotes to per-slice series.

use std::collections::HashMap;

use cube_common::EpsgCode;
use netcdf_parser::{AttrValue, Attributes, DecodedGranule, GridVariable};

/// Rasters present in every generated granule.
pub const GRANULE_VARIABLES: [&str; 7] = [
    "v",
    "vx",
    "vy",
    "chip_size_height",
    "chip_size_width",
    "interp_mask",
    "v_error",
];

/// Creates a test grid with predictable values.
///
/// Each cell value is `col * 1000 + row`, so a value read back identifies
/// the cell it came from.
///
/// ```
/// use test_utils::create_test_grid;
///
/// let grid = create_test_grid(10, 5);
/// assert_eq!(grid.len(), 50);
/// assert_eq!(grid[1], 1000.0); // col=1, row=0
/// assert_eq!(grid[10], 1.0);   // col=0, row=1
/// ```
pub fn create_test_grid(width: usize, height: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            data.push((col * 1000 + row) as f32);
        }
    }
    data
}

/// A grid with NaN at the given `(col, row)` positions and `value`
/// elsewhere.
pub fn create_grid_with_nans(
    width: usize,
    height: usize,
    value: f32,
    nan_positions: &[(usize, usize)],
) -> Vec<f32> {
    let mut data = vec![value; width * height];
    for &(col, row) in nan_positions {
        if col < width && row < height {
            data[row * width + col] = f32::NAN;
        }
    }
    data
}

/// `n` coordinates starting at `start`, `step` apart.
pub fn axis(start: f64, step: f64, n: usize) -> Vec<f64> {
    (0..n).map(|i| start + i as f64 * step).collect()
}

/// Builder for a synthetic decoded granule.
///
/// Defaults: EPSG:32628, a 4 x 3 grid at 240 m spacing starting at
/// (400_000, 7_100_000) with y decreasing, `v` = [`create_test_grid`], and
/// the attributes a complete granule carries.
#[derive(Debug, Clone)]
pub struct SyntheticGranule {
    epsg: u32,
    date_center: String,
    date_dt: f64,
    x: Vec<f64>,
    y: Vec<f64>,
    velocity: Option<Vec<f32>>,
    attrs: Vec<(&'static str, &'static str, AttrValue)>,
    without: Vec<(&'static str, &'static str)>,
}

impl Default for SyntheticGranule {
    fn default() -> Self {
        Self {
            epsg: 32628,
            date_center: "20150805".to_string(),
            date_dt: 32.0,
            x: axis(400_000.0, 240.0, 4),
            y: axis(7_100_000.0, -240.0, 3),
            velocity: None,
            attrs: Vec::new(),
            without: Vec::new(),
        }
    }
}

impl SyntheticGranule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn epsg(mut self, epsg: u32) -> Self {
        self.epsg = epsg;
        self
    }

    /// `img_pair_info.date_center` (`%Y%m%d`) and `date_dt` in days.
    pub fn center(mut self, date_center: &str, date_dt: f64) -> Self {
        self.date_center = date_center.to_string();
        self.date_dt = date_dt;
        self
    }

    pub fn grid(mut self, x: Vec<f64>, y: Vec<f64>) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    /// Replace the `v` raster; other rasters keep the test pattern.
    pub fn velocity(mut self, v: Vec<f32>) -> Self {
        self.velocity = Some(v);
        self
    }

    /// `v` entirely NaN.
    pub fn no_data(self) -> Self {
        let cells = self.x.len() * self.y.len();
        self.velocity(vec![f32::NAN; cells])
    }

    pub fn attr(mut self, variable: &'static str, name: &'static str, value: AttrValue) -> Self {
        self.attrs.push((variable, name, value));
        self
    }

    pub fn without_attr(mut self, variable: &'static str, name: &'static str) -> Self {
        self.without.push((variable, name));
        self
    }

    pub fn build(self) -> DecodedGranule {
        let width = self.x.len();
        let height = self.y.len();
        let pattern = create_test_grid(width, height);

        let mut variables = HashMap::with_capacity(GRANULE_VARIABLES.len());
        for name in GRANULE_VARIABLES {
            let data = match (name, &self.velocity) {
                ("v", Some(v)) => v.clone(),
                _ => pattern.clone(),
            };
            let mut attrs = default_attrs(name);
            for (variable, attr, value) in &self.attrs {
                if *variable == name {
                    attrs.insert(attr.to_string(), value.clone());
                }
            }
            for (variable, attr) in &self.without {
                if *variable == name {
                    attrs.remove(*attr);
                }
            }
            variables.insert(name.to_string(), GridVariable::new(data, attrs));
        }

        DecodedGranule {
            epsg: EpsgCode(self.epsg),
            date_center: self.date_center,
            date_dt: self.date_dt,
            x: self.x,
            y: self.y,
            variables,
        }
    }
}

fn default_attrs(variable: &str) -> Attributes {
    let mut attrs = Attributes::new();
    let units = if variable.starts_with("chip") { "m" } else { "m/y" };
    attrs.insert("units".into(), AttrValue::Text(units.into()));
    match variable {
        "v" => {
            attrs.insert("grid_mapping".into(), AttrValue::Text("UTM_Projection".into()));
            attrs.insert("map_scale_corrected".into(), AttrValue::Number(1.0));
        }
        "vx" => {
            attrs.insert("vx_error".into(), AttrValue::Number(12.5));
            attrs.insert("stable_rmse".into(), AttrValue::Number(3.25));
            attrs.insert("stable_count".into(), AttrValue::Number(1200.0));
            attrs.insert("flag_stable_shift".into(), AttrValue::Number(1.0));
            attrs.insert("stable_shift".into(), AttrValue::Number(0.5));
            attrs.insert("stable_apply_date".into(), AttrValue::Text("20170101".into()));
        }
        "vy" => {
            attrs.insert("vy_error".into(), AttrValue::Number(8.75));
            attrs.insert("stable_shift".into(), AttrValue::Number(-0.25));
        }
        _ => {}
    }
    attrs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_test_grid() {
        let grid = create_test_grid(3, 2);
        assert_eq!(grid, vec![0.0, 1000.0, 2000.0, 1.0, 1001.0, 2001.0]);
    }

    #[test]
    fn test_create_grid_with_nans() {
        let grid = create_grid_with_nans(2, 2, 5.0, &[(1, 0), (9, 9)]);
        assert_eq!(grid[0], 5.0);
        assert!(grid[1].is_nan());
        assert_eq!(grid[3], 5.0);
    }

    #[test]
    fn test_default_granule_is_complete() {
        let granule = SyntheticGranule::new().build();
        assert!(granule.validate().is_ok());
        assert_eq!(granule.width(), 4);
        assert_eq!(granule.height(), 3);
        for name in GRANULE_VARIABLES {
            assert_eq!(granule.variable(name).unwrap().data.len(), 12);
        }
        assert_eq!(
            granule.variable("vx").unwrap().attrs["stable_count"].as_f64(),
            Some(1200.0)
        );
    }

    #[test]
    fn test_overrides() {
        let granule = SyntheticGranule::new()
            .epsg(3413)
            .no_data()
            .attr("vx", "stable_count", AttrValue::Number(7.0))
            .without_attr("vy", "stable_shift")
            .build();
        assert_eq!(granule.epsg, EpsgCode(3413));
        assert!(granule.variable("v").unwrap().data.iter().all(|v| v.is_nan()));
        assert_eq!(
            granule.variable("vx").unwrap().attrs["stable_count"].as_f64(),
            Some(7.0)
        );
        assert!(!granule.variable("vy").unwrap().attrs.contains_key("stable_shift"));
    }
}

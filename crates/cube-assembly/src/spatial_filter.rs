//! Projection check and region crop for decoded granules.

use std::collections::HashMap;

use cube_common::{BoundingBox, EpsgCode};
use netcdf_parser::{DecodedGranule, GridVariable};
use tracing::debug;

use crate::error::{CubeError, Result};
use crate::layer::Layer;
use crate::schema;

/// Why a granule produced no layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejected {
    /// Granule is in another projection
    WrongProjection(EpsgCode),
    /// No valid `v` cell inside the region
    Empty,
}

/// Layer, or the reason there is none.
pub type Filtered = std::result::Result<Layer, Rejected>;

/// Keeps the part of a granule that falls inside the cube region.
#[derive(Debug, Clone, Copy)]
pub struct SpatialFilter {
    projection: EpsgCode,
    region: BoundingBox,
}

impl SpatialFilter {
    pub fn new(projection: EpsgCode, region: BoundingBox) -> Self {
        Self { projection, region }
    }

    pub fn projection(&self) -> EpsgCode {
        self.projection
    }

    pub fn region(&self) -> &BoundingBox {
        &self.region
    }

    /// Crop `granule` to the region.
    ///
    /// The projection is checked first: a granule in another projection is
    /// `WrongProjection` whether or not it overlaps the region.
    pub fn apply(&self, url: &str, mut granule: DecodedGranule) -> Result<Filtered> {
        if granule.epsg != self.projection {
            debug!(url = %url, epsg = %granule.epsg, "Granule in another projection");
            return Ok(Err(Rejected::WrongProjection(granule.epsg)));
        }

        let cols: Vec<usize> = selected(&granule.x, |x| self.region.contains_x(x));
        let rows: Vec<usize> = selected(&granule.y, |y| self.region.contains_y(y));
        let nx = granule.width();

        let v = match granule.variables.remove(schema::V) {
            Some(v) => crop(v, &rows, &cols, nx),
            None => return Ok(Err(Rejected::Empty)),
        };
        if !v.has_valid_cell() {
            debug!(url = %url, "No valid velocity in region");
            return Ok(Err(Rejected::Empty));
        }

        let spacing = (step(&granule.x), step(&granule.y));
        let (Some(dx), Some(dy)) = spacing else {
            return Err(CubeError::fetch(
                url,
                "granule grid needs at least two x and two y coordinates",
            ));
        };

        let mid_date = granule
            .mid_date()
            .map_err(|e| CubeError::fetch(url, e))?;

        let mut variables = HashMap::with_capacity(granule.variables.len() + 1);
        variables.insert(schema::V.to_string(), v);
        for (name, var) in granule.variables.drain() {
            variables.insert(name, crop(var, &rows, &cols, nx));
        }

        Ok(Ok(Layer {
            url: url.to_string(),
            epsg: granule.epsg,
            mid_date,
            x: cols.iter().map(|&i| granule.x[i]).collect(),
            y: rows.iter().map(|&j| granule.y[j]).collect(),
            spacing: (dx, dy),
            variables,
        }))
    }
}

fn selected(coords: &[f64], keep: impl Fn(f64) -> bool) -> Vec<usize> {
    coords
        .iter()
        .enumerate()
        .filter(|&(_, &c)| keep(c))
        .map(|(i, _)| i)
        .collect()
}

fn step(coords: &[f64]) -> Option<f64> {
    match coords {
        [a, b, ..] if b != a => Some(b - a),
        _ => None,
    }
}

/// Copy the selected rows/columns of a `[y, x]` raster.
fn crop(var: GridVariable, rows: &[usize], cols: &[usize], nx: usize) -> GridVariable {
    let mut data = Vec::with_capacity(rows.len() * cols.len());
    for &row in rows {
        let start = row * nx;
        data.extend(cols.iter().map(|&col| var.data[start + col]));
    }
    GridVariable::new(data, var.attrs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use netcdf_parser::Attributes;

    /// 4 x 3 granule at 100 m spacing, x = 0..300, y = 200..0
    fn granule(epsg: u32, v: Vec<f32>) -> DecodedGranule {
        let mut variables = HashMap::new();
        variables.insert("v".to_string(), GridVariable::new(v, Attributes::new()));
        variables.insert(
            "vx".to_string(),
            GridVariable::new((0..12).map(|i| i as f32).collect(), Attributes::new()),
        );
        DecodedGranule {
            epsg: EpsgCode(epsg),
            date_center: "20150805".into(),
            date_dt: 32.0,
            x: vec![0.0, 100.0, 200.0, 300.0],
            y: vec![200.0, 100.0, 0.0],
            variables,
        }
    }

    fn filter() -> SpatialFilter {
        SpatialFilter::new(EpsgCode(32628), BoundingBox::new(100.0, 0.0, 200.0, 100.0))
    }

    #[test]
    fn test_crop_inclusive_bounds() {
        let layer = filter()
            .apply("g.nc", granule(32628, vec![1.0; 12]))
            .unwrap()
            .unwrap();
        assert_eq!(layer.x, vec![100.0, 200.0]);
        assert_eq!(layer.y, vec![100.0, 0.0]);
        assert_eq!(layer.spacing, (100.0, -100.0));
        // rows 1..=2, cols 1..=2 of 0..12
        assert_eq!(layer.variable("vx").unwrap().data, vec![5.0, 6.0, 9.0, 10.0]);
        assert_eq!(layer.mid_date.millis() % 86_400_000, 32);
    }

    #[test]
    fn test_projection_checked_before_empty() {
        let all_nan = vec![f32::NAN; 12];
        assert_eq!(
            filter().apply("g.nc", granule(32627, all_nan.clone())).unwrap().unwrap_err(),
            Rejected::WrongProjection(EpsgCode(32627))
        );
        assert_eq!(
            filter().apply("g.nc", granule(32628, all_nan)).unwrap().unwrap_err(),
            Rejected::Empty
        );
    }

    #[test]
    fn test_valid_data_outside_region_is_empty() {
        let mut v = vec![f32::NAN; 12];
        v[0] = 3.0; // row 0, col 0: outside
        assert_eq!(
            filter().apply("g.nc", granule(32628, v)).unwrap().unwrap_err(),
            Rejected::Empty
        );
    }

    #[test]
    fn test_region_missing_the_grid_is_empty() {
        let far = SpatialFilter::new(EpsgCode(32628), BoundingBox::new(5000.0, 5000.0, 6000.0, 6000.0));
        assert_eq!(
            far.apply("g.nc", granule(32628, vec![1.0; 12])).unwrap().unwrap_err(),
            Rejected::Empty
        );
    }
}

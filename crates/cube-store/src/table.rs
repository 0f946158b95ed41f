//! The unit of work handed to the store: one batch of time slices.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CubeStoreError, Result};

/// A `[mid_date, y, x]` variable for one batch, row-major.
#[derive(Debug, Clone)]
pub struct GridColumn {
    pub name: String,
    pub data: Vec<f32>,
    pub attrs: Map<String, Value>,
}

/// A `[mid_date]` variable for one batch.
#[derive(Debug, Clone)]
pub struct SeriesColumn {
    pub name: String,
    pub data: Vec<f32>,
    pub attrs: Map<String, Value>,
}

/// Per-slice record kept in the store manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SliceRecord {
    /// Milliseconds since 1970-01-01
    pub mid_date: i64,
    /// Source granule URL
    pub url: String,
    /// `grid_mapping` attribute of the granule's `v` variable
    pub grid_mapping: String,
}

/// Fill values fixed at store creation, keyed by variable name. Variables
/// without an entry use NaN.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FillEncoding {
    pub fill_values: BTreeMap<String, f32>,
}

impl FillEncoding {
    pub fn fill_value(&self, variable: &str) -> f32 {
        self.fill_values.get(variable).copied().unwrap_or(f32::NAN)
    }
}

/// One batch of slices ready to be written.
///
/// `encoding` is present only on the batch that creates the store.
#[derive(Debug, Clone, Default)]
pub struct BatchTable {
    pub mid_dates: Vec<i64>,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub grids: Vec<GridColumn>,
    pub series: Vec<SeriesColumn>,
    pub records: Vec<SliceRecord>,
    pub encoding: Option<FillEncoding>,
    pub global_attrs: Map<String, Value>,
}

impl BatchTable {
    /// Number of time slices.
    pub fn len(&self) -> usize {
        self.mid_dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mid_dates.is_empty()
    }

    pub fn grid_names(&self) -> Vec<String> {
        self.grids.iter().map(|g| g.name.clone()).collect()
    }

    pub fn series_names(&self) -> Vec<String> {
        self.series.iter().map(|s| s.name.clone()).collect()
    }

    /// Check that every column has the length implied by the slice count and
    /// the grid.
    pub fn validate(&self) -> Result<()> {
        let n = self.len();
        if n == 0 {
            return Err(CubeStoreError::invalid_batch("batch has no slices"));
        }
        if self.x.is_empty() || self.y.is_empty() {
            return Err(CubeStoreError::invalid_batch("empty x or y coordinate"));
        }

        let cells = n * self.y.len() * self.x.len();
        for grid in &self.grids {
            if grid.data.len() != cells {
                return Err(CubeStoreError::invalid_batch(format!(
                    "grid variable '{}' has {} values, expected {}",
                    grid.name,
                    grid.data.len(),
                    cells
                )));
            }
        }
        for series in &self.series {
            if series.data.len() != n {
                return Err(CubeStoreError::invalid_batch(format!(
                    "series variable '{}' has {} values, expected {}",
                    series.name,
                    series.data.len(),
                    n
                )));
            }
        }
        if self.records.len() != n {
            return Err(CubeStoreError::invalid_batch(format!(
                "{} manifest records for {} slices",
                self.records.len(),
                n
            )));
        }

        let mut seen = std::collections::HashSet::with_capacity(n);
        for &t in &self.mid_dates {
            if !seen.insert(t) {
                return Err(CubeStoreError::DuplicateMidDate(t));
            }
        }
        Ok(())
    }
}

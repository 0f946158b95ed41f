//! In-memory form of a decoded velocity granule.
//!
//! Everything here is plain owned data: once a [`DecodedGranule`] exists the
//! NetCDF file it came from is already closed.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use cube_common::{EpsgCode, MidDate};

use crate::error::{NetCdfError, NetCdfResult};

/// A scalar attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Number(f64),
    Text(String),
}

impl AttrValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Number(v) => Some(*v),
            AttrValue::Text(s) => s.trim().parse().ok(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s),
            AttrValue::Number(_) => None,
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Number(v) => write!(f, "{}", v),
            AttrValue::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Attributes of one variable, ordered by name.
pub type Attributes = BTreeMap<String, AttrValue>;

/// A 2-D `[y, x]` raster in row-major order. Missing cells are NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct GridVariable {
    pub data: Vec<f32>,
    pub attrs: Attributes,
}

impl GridVariable {
    pub fn new(data: Vec<f32>, attrs: Attributes) -> Self {
        Self { data, attrs }
    }

    pub fn has_valid_cell(&self) -> bool {
        self.data.iter().any(|v| !v.is_nan())
    }
}

/// Which variables a decode must (or may) produce.
#[derive(Debug, Clone, Copy)]
pub struct VariableSelection<'a> {
    pub required: &'a [&'a str],
    pub optional: &'a [&'a str],
}

/// One granule decoded into owned buffers.
#[derive(Debug, Clone)]
pub struct DecodedGranule {
    /// Projection of the x/y coordinates
    pub epsg: EpsgCode,
    /// `img_pair_info.date_center`, "YYYYMMDD"
    pub date_center: String,
    /// `img_pair_info.date_dt`, day separation of the pair
    pub date_dt: f64,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub variables: HashMap<String, GridVariable>,
}

impl DecodedGranule {
    pub fn width(&self) -> usize {
        self.x.len()
    }

    pub fn height(&self) -> usize {
        self.y.len()
    }

    pub fn variable(&self, name: &str) -> Option<&GridVariable> {
        self.variables.get(name)
    }

    /// Mid-point recorded by the granule itself.
    pub fn mid_date(&self) -> NetCdfResult<MidDate> {
        MidDate::from_center(&self.date_center, self.date_dt)
            .map_err(|e| NetCdfError::invalid(format!("img_pair_info.date_center: {}", e)))
    }

    /// Check that every raster matches the coordinate lengths.
    pub fn validate(&self) -> NetCdfResult<()> {
        let expected = self.width() * self.height();
        for (name, var) in &self.variables {
            if var.data.len() != expected {
                return Err(NetCdfError::invalid(format!(
                    "variable '{}' has {} cells, expected {} ({} x {})",
                    name,
                    var.data.len(),
                    expected,
                    self.height(),
                    self.width()
                )));
            }
        }
        Ok(())
    }
}

//! A granule cropped to the region of interest.

use std::collections::HashMap;

use cube_common::{EpsgCode, MidDate};
use netcdf_parser::{AttrValue, GridVariable};

use crate::error::{CubeError, Result};

/// One cube time slice before it is combined with the rest of its batch.
///
/// Rasters are `[y, x]` row-major over the cropped `x`/`y`; missing cells
/// are NaN.
#[derive(Debug, Clone)]
pub struct Layer {
    pub url: String,
    pub epsg: EpsgCode,
    pub mid_date: MidDate,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    /// Grid step of the source granule, (dx, dy)
    pub spacing: (f64, f64),
    pub variables: HashMap<String, GridVariable>,
}

impl Layer {
    pub fn width(&self) -> usize {
        self.x.len()
    }

    pub fn height(&self) -> usize {
        self.y.len()
    }

    pub fn variable(&self, name: &str) -> Option<&GridVariable> {
        self.variables.get(name)
    }

    /// Remove a raster from the layer, handing over its buffer.
    pub fn take_variable(&mut self, name: &str) -> Option<GridVariable> {
        self.variables.remove(name)
    }

    pub fn attribute(&self, variable: &str, attribute: &str) -> Option<&AttrValue> {
        self.variables.get(variable)?.attrs.get(attribute)
    }

    /// Numeric attribute of a variable, or `default` when it is absent.
    ///
    /// With no default, a missing (or non-numeric) attribute is an error.
    pub fn attribute_or(&self, variable: &str, attribute: &str, default: Option<f64>) -> Result<f64> {
        match self.attribute(variable, attribute).and_then(AttrValue::as_f64) {
            Some(value) => Ok(value),
            None => default.ok_or_else(|| CubeError::MissingAttribute {
                url: self.url.clone(),
                variable: variable.to_string(),
                attribute: attribute.to_string(),
            }),
        }
    }

    /// Text attribute of a variable; required.
    pub fn text_attribute(&self, variable: &str, attribute: &str) -> Result<String> {
        self.attribute(variable, attribute)
            .map(|v| v.to_string())
            .ok_or_else(|| CubeError::MissingAttribute {
                url: self.url.clone(),
                variable: variable.to_string(),
                attribute: attribute.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netcdf_parser::Attributes;

    fn layer() -> Layer {
        let mut attrs = Attributes::new();
        attrs.insert("stable_count".into(), AttrValue::Number(120.0));
        attrs.insert("note".into(), AttrValue::Text("n/a".into()));
        attrs.insert("grid_mapping".into(), AttrValue::Text("UTM_Projection".into()));

        let mut variables = HashMap::new();
        variables.insert("vx".to_string(), GridVariable::new(vec![1.0], attrs));

        Layer {
            url: "g.nc".into(),
            epsg: EpsgCode(32628),
            mid_date: MidDate::from_millis(0),
            x: vec![0.0],
            y: vec![0.0],
            spacing: (240.0, -240.0),
            variables,
        }
    }

    #[test]
    fn test_attribute_present() {
        assert_eq!(layer().attribute_or("vx", "stable_count", None).unwrap(), 120.0);
        assert_eq!(layer().attribute_or("vx", "stable_count", Some(0.0)).unwrap(), 120.0);
    }

    #[test]
    fn test_attribute_default() {
        assert_eq!(layer().attribute_or("vx", "vx_error", Some(-32767.0)).unwrap(), -32767.0);
        assert_eq!(layer().attribute_or("vy", "vy_error", Some(-32767.0)).unwrap(), -32767.0);
    }

    #[test]
    fn test_required_attribute_missing() {
        let err = layer().attribute_or("vx", "stable_shift", None).unwrap_err();
        match err {
            CubeError::MissingAttribute {
                url,
                variable,
                attribute,
            } => {
                assert_eq!(url, "g.nc");
                assert_eq!(variable, "vx");
                assert_eq!(attribute, "stable_shift");
            }
            other => panic!("unexpected error: {other}"),
        }

        assert!(layer().attribute_or("vx", "note", None).is_err());
    }

    #[test]
    fn test_take_variable() {
        let mut layer = layer();
        assert_eq!(layer.text_attribute("vx", "grid_mapping").unwrap(), "UTM_Projection");
        assert!(layer.take_variable("vx").is_some());
        assert!(layer.take_variable("vx").is_none());
    }
}

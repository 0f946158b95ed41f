//! Cube variables, their attributes and fill values.

use cube_common::EpsgCode;
use cube_store::FillEncoding;
use netcdf_parser::{AttrValue, Attributes, VariableSelection};
use serde_json::{json, Map, Value};

pub const V: &str = "v";
pub const VX: &str = "vx";
pub const VY: &str = "vy";
pub const CHIP_SIZE_HEIGHT: &str = "chip_size_height";
pub const CHIP_SIZE_WIDTH: &str = "chip_size_width";
pub const INTERP_MASK: &str = "interp_mask";
pub const V_ERROR: &str = "v_error";

pub const MAP_SCALE_CORRECTED: &str = "map_scale_corrected";
pub const VX_ERROR: &str = "vx_error";
pub const VY_ERROR: &str = "vy_error";
pub const STABLE_RMSE: &str = "stable_rmse";
pub const STABLE_COUNT: &str = "stable_count";
pub const FLAG_STABLE_SHIFT: &str = "flag_stable_shift";
pub const STABLE_SHIFT: &str = "stable_shift";
pub const VX_STABLE_SHIFT: &str = "vx_stable_shift";
pub const VY_STABLE_SHIFT: &str = "vy_stable_shift";

pub const GRID_MAPPING: &str = "grid_mapping";
pub const STABLE_APPLY_DATE: &str = "stable_apply_date";

pub const DESCRIPTION_ATTR: &str = "description";
pub const MISSING_VALUE_ATTR: &str = "missing_value";
pub const CHIP_SIZE_COORDINATES_ATTR: &str = "chip_size_coordinates";
pub const FLAG_STABLE_SHIFT_MEANINGS_ATTR: &str = "flag_stable_shift_meanings";

pub const MISSING_VALUE: f32 = -32767.0;
pub const MISSING_BYTE: f32 = 0.0;

pub const V_DESCRIPTION: &str = "velocity magnitude";
pub const VX_DESCRIPTION: &str = "velocity component in x direction";
pub const VY_DESCRIPTION: &str = "velocity component in y direction";
pub const CHIP_SIZE_HEIGHT_DESCRIPTION: &str = "height of search window";
pub const CHIP_SIZE_COORDINATES: &str = "Optical data: chip_size_coordinates = \
'image projection geometry: width = x, height = y'. Radar data: \
chip_size_coordinates = 'radar geometry: width = range, height = azimuth'";
pub const FLAG_STABLE_SHIFT_MEANINGS: &str = "flag for applying velocity bias correction over stable surfaces \
(stationary or slow-flowing surfaces with velocity < 15 m/yr): \
0 = there is no stable surface available and no correction is applied; \
1 = there are stable surfaces and velocity bias is corrected;";

/// `[mid_date, y, x]` variables, in write order.
pub const GRID_VARIABLES: [&str; 7] = [
    V,
    VX,
    VY,
    CHIP_SIZE_HEIGHT,
    CHIP_SIZE_WIDTH,
    INTERP_MASK,
    V_ERROR,
];

const REQUIRED_GRIDS: [&str; 6] = [V, VX, VY, CHIP_SIZE_HEIGHT, CHIP_SIZE_WIDTH, INTERP_MASK];
const OPTIONAL_GRIDS: [&str; 1] = [V_ERROR];

/// Rasters to decode from every granule. `v_error` is absent from older
/// granules and is filled with missing values.
pub fn selection() -> VariableSelection<'static> {
    VariableSelection {
        required: &REQUIRED_GRIDS,
        optional: &OPTIONAL_GRIDS,
    }
}

/// A `[mid_date]` variable taken from a granule attribute.
#[derive(Debug, Clone, Copy)]
pub struct SeriesSpec {
    pub name: &'static str,
    /// Variable carrying the attribute
    pub source: &'static str,
    pub attribute: &'static str,
    /// Value for granules without the attribute; None means required
    pub default: Option<f64>,
}

pub const SERIES: [SeriesSpec; 8] = [
    SeriesSpec {
        name: MAP_SCALE_CORRECTED,
        source: V,
        attribute: MAP_SCALE_CORRECTED,
        default: Some(MISSING_BYTE as f64),
    },
    SeriesSpec {
        name: VX_ERROR,
        source: VX,
        attribute: VX_ERROR,
        default: Some(MISSING_VALUE as f64),
    },
    SeriesSpec {
        name: STABLE_RMSE,
        source: VX,
        attribute: STABLE_RMSE,
        default: Some(MISSING_VALUE as f64),
    },
    SeriesSpec {
        name: STABLE_COUNT,
        source: VX,
        attribute: STABLE_COUNT,
        default: None,
    },
    SeriesSpec {
        name: FLAG_STABLE_SHIFT,
        source: VX,
        attribute: FLAG_STABLE_SHIFT,
        default: Some(0.0),
    },
    SeriesSpec {
        name: VX_STABLE_SHIFT,
        source: VX,
        attribute: STABLE_SHIFT,
        default: None,
    },
    SeriesSpec {
        name: VY_ERROR,
        source: VY,
        attribute: VY_ERROR,
        default: Some(MISSING_VALUE as f64),
    },
    SeriesSpec {
        name: VY_STABLE_SHIFT,
        source: VY,
        attribute: STABLE_SHIFT,
        default: None,
    },
];

/// Fill values written into the store at creation.
pub fn fill_encoding() -> FillEncoding {
    let mut encoding = FillEncoding::default();
    for name in [V, VX, VY, V_ERROR, VX_ERROR, VY_ERROR] {
        encoding.fill_values.insert(name.to_string(), MISSING_VALUE);
    }
    encoding
        .fill_values
        .insert(MAP_SCALE_CORRECTED.to_string(), MISSING_BYTE);
    encoding
}

/// Group attributes of a new cube.
pub fn global_attrs(projection: EpsgCode) -> Map<String, Value> {
    let mut attrs = Map::new();
    attrs.insert("title".into(), json!("ITS_LIVE datacube of velocity pairs"));
    attrs.insert("author".into(), json!("Alex S. Gardner, JPL/NASA"));
    attrs.insert(
        "institution".into(),
        json!("NASA Jet Propulsion Laboratory (JPL), California Institute of Technology"),
    );
    attrs.insert("GDAL_AREA_OR_POINT".into(), json!("Area"));
    attrs.insert("projection".into(), json!(projection.to_string()));
    attrs
}

/// Granule attributes that never reach the cube: decoding metadata already
/// applied, and attributes promoted to their own series.
fn dropped_attributes(variable: &str) -> &'static [&'static str] {
    match variable {
        V => &[GRID_MAPPING, MAP_SCALE_CORRECTED],
        VX => &[STABLE_APPLY_DATE, VX_ERROR, STABLE_RMSE, STABLE_COUNT, STABLE_SHIFT],
        VY => &[STABLE_APPLY_DATE, VY_ERROR, STABLE_SHIFT],
        _ => &[],
    }
}

const DECODING_ATTRIBUTES: [&str; 4] = ["_FillValue", "scale_factor", "add_offset", "_Unsigned"];

/// Attributes of a grid variable in a new cube, seeded from the first
/// layer's attributes.
pub fn grid_attrs(variable: &str, source: Option<&Attributes>) -> Map<String, Value> {
    let dropped = dropped_attributes(variable);
    let mut attrs: Map<String, Value> = source
        .into_iter()
        .flatten()
        .filter(|(key, _)| {
            !dropped.contains(&key.as_str()) && !DECODING_ATTRIBUTES.contains(&key.as_str())
        })
        .map(|(key, value)| (key.clone(), attr_to_json(value)))
        .collect();

    match variable {
        V => {
            attrs.insert(DESCRIPTION_ATTR.into(), json!(V_DESCRIPTION));
        }
        VX => {
            attrs.insert(DESCRIPTION_ATTR.into(), json!(VX_DESCRIPTION));
        }
        VY => {
            attrs.insert(DESCRIPTION_ATTR.into(), json!(VY_DESCRIPTION));
        }
        CHIP_SIZE_HEIGHT => {
            attrs.insert(CHIP_SIZE_COORDINATES_ATTR.into(), json!(CHIP_SIZE_COORDINATES));
            attrs.insert(DESCRIPTION_ATTR.into(), json!(CHIP_SIZE_HEIGHT_DESCRIPTION));
        }
        _ => {}
    }

    if matches!(variable, V | VX | VY | V_ERROR) {
        attrs
            .entry(MISSING_VALUE_ATTR)
            .or_insert_with(|| json!(MISSING_VALUE));
    }
    attrs
}

/// Attributes of a series variable in a new cube.
pub fn series_attrs(name: &str) -> Map<String, Value> {
    let mut attrs = Map::new();
    match name {
        MAP_SCALE_CORRECTED => {
            attrs.insert(MISSING_VALUE_ATTR.into(), json!(MISSING_BYTE));
        }
        FLAG_STABLE_SHIFT => {
            attrs.insert(
                FLAG_STABLE_SHIFT_MEANINGS_ATTR.into(),
                json!(FLAG_STABLE_SHIFT_MEANINGS),
            );
        }
        _ => {}
    }
    attrs
}

fn attr_to_json(value: &AttrValue) -> Value {
    match value {
        AttrValue::Number(n) => json!(n),
        AttrValue::Text(s) => json!(s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_encoding() {
        let encoding = fill_encoding();
        assert_eq!(encoding.fill_value(V), MISSING_VALUE);
        assert_eq!(encoding.fill_value(VY_ERROR), MISSING_VALUE);
        assert_eq!(encoding.fill_value(MAP_SCALE_CORRECTED), MISSING_BYTE);
        assert!(encoding.fill_value(STABLE_COUNT).is_nan());
        assert!(encoding.fill_value(INTERP_MASK).is_nan());
    }

    #[test]
    fn test_grid_attrs_drop_promoted() {
        let mut source = Attributes::new();
        source.insert(STABLE_COUNT.into(), AttrValue::Number(10.0));
        source.insert(STABLE_SHIFT.into(), AttrValue::Number(0.5));
        source.insert("_FillValue".into(), AttrValue::Number(-32767.0));
        source.insert("units".into(), AttrValue::Text("m/y".into()));

        let vx = grid_attrs(VX, Some(&source));
        assert!(!vx.contains_key(STABLE_COUNT));
        assert!(!vx.contains_key(STABLE_SHIFT));
        assert!(!vx.contains_key("_FillValue"));
        assert_eq!(vx["units"], json!("m/y"));
        assert_eq!(vx[DESCRIPTION_ATTR], json!(VX_DESCRIPTION));
        assert_eq!(vx[MISSING_VALUE_ATTR], json!(MISSING_VALUE));

        // vy keeps stable_count
        let vy = grid_attrs(VY, Some(&source));
        assert!(vy.contains_key(STABLE_COUNT));
        assert!(!vy.contains_key(STABLE_SHIFT));
    }

    #[test]
    fn test_existing_missing_value_kept() {
        let mut source = Attributes::new();
        source.insert(MISSING_VALUE_ATTR.into(), AttrValue::Number(-9999.0));
        let v = grid_attrs(V, Some(&source));
        assert_eq!(v[MISSING_VALUE_ATTR], json!(-9999.0));

        let interp = grid_attrs(INTERP_MASK, None);
        assert!(interp.is_empty());
    }

    #[test]
    fn test_global_attrs() {
        let attrs = global_attrs(EpsgCode(32628));
        assert_eq!(attrs["projection"], json!("32628"));
        assert_eq!(attrs["GDAL_AREA_OR_POINT"], json!("Area"));
    }
}

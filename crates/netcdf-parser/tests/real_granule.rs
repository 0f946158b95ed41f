//! Decoding a real ITS_LIVE granule. Skipped when the file is not available
//! (set TEST_DATA_DIR or place it under crates/netcdf-parser/testdata/).

use cube_common::crs::ProjectionKind;
use netcdf_parser::{read_granule, read_granule_from_bytes, NetCdfError, VariableSelection};
use test_utils::{require_test_file, LANDSAT_GRANULE};

const SELECTION: VariableSelection<'static> = VariableSelection {
    required: &["v", "vx", "vy"],
    optional: &["v_error", "interp_mask"],
};

#[test]
fn test_read_landsat_granule() {
    let path = require_test_file!(LANDSAT_GRANULE);
    let granule = read_granule(&path, &SELECTION).unwrap();

    assert!(!matches!(granule.epsg.kind(), ProjectionKind::Other));
    assert_eq!(granule.date_center, "20150805");
    assert!(granule.validate().is_ok());
    assert!(granule.width() > 0 && granule.height() > 0);
    assert!(granule.x.windows(2).all(|w| w[1] > w[0]));
    assert!(granule.y.windows(2).all(|w| w[1] < w[0]));
    assert!(granule.variable("v").unwrap().has_valid_cell());
}

#[test]
fn test_bytes_match_file() {
    let path = require_test_file!(LANDSAT_GRANULE);
    let bytes = std::fs::read(&path).unwrap();
    let from_file = read_granule(&path, &SELECTION).unwrap();
    let from_bytes = read_granule_from_bytes(&bytes, &SELECTION).unwrap();

    assert_eq!(from_file.x, from_bytes.x);
    assert_eq!(from_file.y, from_bytes.y);
    assert_eq!(from_file.date_dt, from_bytes.date_dt);
}

#[test]
fn test_missing_required_variable() {
    let path = require_test_file!(LANDSAT_GRANULE);
    let selection = VariableSelection {
        required: &["no_such_variable"],
        optional: &[],
    };
    assert!(matches!(
        read_granule(&path, &selection),
        Err(NetCdfError::MissingData(_))
    ));
}

#[test]
fn test_garbage_bytes_rejected() {
    let result = read_granule_from_bytes(b"definitely not netcdf", &SELECTION);
    assert!(result.is_err());
}

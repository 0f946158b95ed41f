//! Native NetCDF decoding of velocity granules using the netcdf library.
//!
//! The netcdf library requires a file path (it wraps libnetcdf/HDF5 which need
//! file handles). When reading from bytes, we write to a temp file first.
//!
//! On Linux, we use `/dev/shm` (memory-backed tmpfs) to minimize I/O latency.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Once;

use cube_common::EpsgCode;
use tracing::{debug, warn};

use crate::error::{NetCdfError, NetCdfResult};
use crate::granule::{AttrValue, Attributes, DecodedGranule, GridVariable, VariableSelection};

/// Variables that may carry the `spatial_epsg` attribute, in lookup order.
const PROJECTION_VARIABLES: [&str; 2] = ["UTM_Projection", "mapping"];
const PAIR_INFO_VARIABLE: &str = "img_pair_info";

/// Silence HDF5's automatic error printing to stderr.
///
/// The HDF5 C library prints verbose error messages to stderr even when errors
/// are handled gracefully by the Rust code (e.g., when checking for optional
/// attributes that don't exist).
///
/// It only needs to be called once per process, but is safe to call multiple
/// times. Call it early in `main()` before any HDF5/NetCDF operations occur.
pub fn silence_hdf5_errors() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        // SAFETY: H5Eset_auto2 is thread-safe and we're passing null pointers
        // to disable error output, which is a documented valid use.
        unsafe {
            hdf5_metno_sys::h5e::H5Eset_auto2(
                hdf5_metno_sys::h5e::H5E_DEFAULT,
                None,
                std::ptr::null_mut(),
            );
        }
    });
}

/// Removes the temp copy of a granule on every exit path.
struct TempGranuleFile {
    path: PathBuf,
}

impl TempGranuleFile {
    fn write(data: &[u8]) -> NetCdfResult<Self> {
        let path = get_optimal_temp_dir().join(generate_temp_filename());
        let guard = Self { path };
        let mut file = std::fs::File::create(&guard.path)?;
        file.write_all(data)?;
        Ok(guard)
    }
}

impl Drop for TempGranuleFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Failed to remove temp granule file");
        }
    }
}

/// Decode a granule held in memory (e.g. fetched from object storage).
pub fn read_granule_from_bytes(
    data: &[u8],
    selection: &VariableSelection<'_>,
) -> NetCdfResult<DecodedGranule> {
    let temp = TempGranuleFile::write(data)?;
    read_granule(&temp.path, selection)
}

/// Decode a granule file from disk.
///
/// The file handle is closed before this returns; all returned buffers are
/// owned copies.
pub fn read_granule(path: &Path, selection: &VariableSelection<'_>) -> NetCdfResult<DecodedGranule> {
    silence_hdf5_errors();

    let file = netcdf::open(path).map_err(|e| {
        NetCdfError::invalid(format!("Failed to open NetCDF {}: {}", path.display(), e))
    })?;

    let epsg = read_projection(&file)?;

    let pair_info = file
        .variable(PAIR_INFO_VARIABLE)
        .ok_or_else(|| NetCdfError::missing(format!("{} variable", PAIR_INFO_VARIABLE)))?;
    let date_center = match get_attr(&pair_info, "date_center") {
        Some(AttrValue::Text(s)) => s,
        Some(AttrValue::Number(n)) => format!("{:08}", n as i64),
        None => return Err(NetCdfError::missing("img_pair_info.date_center")),
    };
    let date_dt = get_attr(&pair_info, "date_dt")
        .and_then(|v| v.as_f64())
        .ok_or_else(|| NetCdfError::missing("img_pair_info.date_dt"))?;

    let x = read_coordinate(&file, "x")?;
    let y = read_coordinate(&file, "y")?;

    let mut variables = HashMap::with_capacity(selection.required.len() + selection.optional.len());
    for &name in selection.required {
        let var = file
            .variable(name)
            .ok_or_else(|| NetCdfError::missing(format!("{} variable", name)))?;
        variables.insert(name.to_string(), read_grid_variable(&var, name, y.len(), x.len())?);
    }
    for &name in selection.optional {
        match file.variable(name) {
            Some(var) => {
                variables.insert(name.to_string(), read_grid_variable(&var, name, y.len(), x.len())?);
            }
            None => debug!(variable = name, path = %path.display(), "Optional variable absent"),
        }
    }

    let granule = DecodedGranule {
        epsg,
        date_center,
        date_dt,
        x,
        y,
        variables,
    };
    granule.validate()?;
    Ok(granule)
}

fn read_projection(file: &netcdf::File) -> NetCdfResult<EpsgCode> {
    for name in PROJECTION_VARIABLES {
        let Some(var) = file.variable(name) else {
            continue;
        };
        if let Some(code) = get_attr(&var, "spatial_epsg").and_then(|v| v.as_f64()) {
            return Ok(EpsgCode(code as u32));
        }
    }
    Err(NetCdfError::missing("spatial_epsg attribute on UTM_Projection/mapping"))
}

fn read_coordinate(file: &netcdf::File, name: &str) -> NetCdfResult<Vec<f64>> {
    let var = file
        .variable(name)
        .ok_or_else(|| NetCdfError::missing(format!("{} coordinate", name)))?;
    var.get_values::<f64, _>(..)
        .map_err(|e| NetCdfError::invalid(format!("Failed to read {}: {}", name, e)))
}

/// Read a `[y, x]` variable as f32, mapping fill values to NaN and applying
/// `scale_factor`/`add_offset` when present.
fn read_grid_variable(
    var: &netcdf::Variable,
    name: &str,
    ny: usize,
    nx: usize,
) -> NetCdfResult<GridVariable> {
    let dims: Vec<String> = var.dimensions().iter().map(|d| d.name()).collect();
    if dims != ["y", "x"] {
        return Err(NetCdfError::invalid(format!(
            "variable '{}' has dimensions {:?}, expected [\"y\", \"x\"]",
            name, dims
        )));
    }

    let raw: Vec<f32> = var
        .get_values(..)
        .map_err(|e| NetCdfError::invalid(format!("Failed to read {}: {}", name, e)))?;
    if raw.len() != ny * nx {
        return Err(NetCdfError::invalid(format!(
            "variable '{}' has {} cells, expected {}",
            name,
            raw.len(),
            ny * nx
        )));
    }

    let attrs = read_attributes(var);
    let fill = attrs
        .get("_FillValue")
        .or_else(|| attrs.get("missing_value"))
        .and_then(|v| v.as_f64())
        .map(|v| v as f32);
    let scale = attrs.get("scale_factor").and_then(|v| v.as_f64()).map(|v| v as f32);
    let offset = attrs.get("add_offset").and_then(|v| v.as_f64()).map(|v| v as f32);

    let data = raw
        .into_iter()
        .map(|value| {
            if fill == Some(value) {
                f32::NAN
            } else {
                value * scale.unwrap_or(1.0) + offset.unwrap_or(0.0)
            }
        })
        .collect();

    Ok(GridVariable::new(data, attrs))
}

fn read_attributes(var: &netcdf::Variable) -> Attributes {
    var.attributes()
        .filter_map(|attr| {
            let name = attr.name().to_string();
            let value = attr.value().ok().and_then(convert_attribute)?;
            Some((name, value))
        })
        .collect()
}

fn convert_attribute(value: netcdf::AttributeValue) -> Option<AttrValue> {
    use netcdf::AttributeValue as V;

    match value {
        V::Str(s) => Some(AttrValue::Text(s)),
        V::Strs(v) => Some(AttrValue::Text(v.join(", "))),
        V::Doubles(v) => v.first().map(|&n| AttrValue::Number(n)),
        V::Floats(v) => v.first().map(|&n| AttrValue::Number(n as f64)),
        V::Shorts(v) => v.first().map(|&n| AttrValue::Number(n as f64)),
        V::Ints(v) => v.first().map(|&n| AttrValue::Number(n as f64)),
        V::Longlongs(v) => v.first().map(|&n| AttrValue::Number(n as f64)),
        V::Uchars(v) => v.first().map(|&n| AttrValue::Number(n as f64)),
        V::Schars(v) => v.first().map(|&n| AttrValue::Number(n as f64)),
        V::Ushorts(v) => v.first().map(|&n| AttrValue::Number(n as f64)),
        V::Uints(v) => v.first().map(|&n| AttrValue::Number(n as f64)),
        V::Ulonglongs(v) => v.first().map(|&n| AttrValue::Number(n as f64)),
        other => f64::try_from(other).ok().map(AttrValue::Number),
    }
}

/// Look up one attribute without triggering HDF5 error spam for absent names.
fn get_attr(var: &netcdf::Variable, name: &str) -> Option<AttrValue> {
    if !var.attributes().any(|attr| attr.name() == name) {
        return None;
    }
    let value = var.attribute_value(name)?.ok()?;
    convert_attribute(value)
}

// =============================================================================
// Internal helpers
// =============================================================================

/// Get the optimal temp directory for NetCDF file operations.
///
/// On Linux, uses /dev/shm (memory-backed tmpfs) if available for faster I/O.
/// Falls back to the system temp directory otherwise.
fn get_optimal_temp_dir() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        let shm_path = Path::new("/dev/shm");
        if shm_path.exists() && shm_path.is_dir() {
            let test_path = shm_path.join(format!(".granule_test_{}", std::process::id()));
            if std::fs::write(&test_path, b"test").is_ok() {
                let _ = std::fs::remove_file(&test_path);
                return shm_path.to_path_buf();
            }
        }
    }

    std::env::temp_dir()
}

/// Unique temp file name from process ID, thread ID and a counter.
fn generate_temp_filename() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let pid = std::process::id();
    let tid = std::thread::current().id();
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);

    format!("granule_{}_{:?}_{}.nc", pid, tid, count)
}

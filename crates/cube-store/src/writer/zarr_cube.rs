//! Zarr V3 cube store: creation on the first batch, appends along `mid_date`.
//!
//! Layout under the store root:
//!
//! ```text
//! zarr.json            group; global attributes + variable lists
//! mid_date/            int64 [mid_date], ms since 1970-01-01
//! x/, y/               float64 coordinates, fixed at creation
//! <grid variable>/     float32 [mid_date, y, x]
//! <series variable>/   float32 [mid_date]
//! granules.jsonl       one manifest line per slice
//! ```

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::{debug, info, instrument, warn};
use zarrs::array::codec::bytes_to_bytes::blosc::{
    BloscCodec, BloscCompressionLevel, BloscCompressor, BloscShuffleMode,
};
use zarrs::array::{Array, ArrayBuilder, DataType, Element, FillValue};
use zarrs::array_subset::ArraySubset;
use zarrs::group::{Group, GroupBuilder};
use zarrs_filesystem::FilesystemStore;

use crate::config::{CubeStoreConfig, ZarrCompression};
use crate::error::{CubeStoreError, Result};
use crate::manifest::GranuleManifest;
use crate::table::{BatchTable, FillEncoding, SliceRecord};

pub const MID_DATE: &str = "mid_date";
pub const X: &str = "x";
pub const Y: &str = "y";

const DIMENSIONS_ATTR: &str = "_ARRAY_DIMENSIONS";
const GRID_VARIABLES_ATTR: &str = "grid_variables";
const SERIES_VARIABLES_ATTR: &str = "series_variables";

/// Absolute tolerance when comparing coordinates between batches.
const COORD_TOLERANCE: f64 = 1e-6;

/// An open, single-writer velocity cube.
pub struct CubeStore {
    root: PathBuf,
    x: Vec<f64>,
    y: Vec<f64>,
    mid_dates: Vec<i64>,
    known_dates: HashSet<i64>,
    time_array: Array<FilesystemStore>,
    grids: BTreeMap<String, Array<FilesystemStore>>,
    series: BTreeMap<String, Array<FilesystemStore>>,
    global_attrs: Map<String, Value>,
    manifest: GranuleManifest,
}

impl CubeStore {
    /// Create a store from the first batch.
    ///
    /// Anything already at `path` is removed first. The batch must carry the
    /// fill-value encoding; it is written into the array metadata and never
    /// changes afterwards.
    #[instrument(skip_all, fields(path = %path.display(), slices = table.len()))]
    pub fn create(path: &Path, mut table: BatchTable, config: &CubeStoreConfig) -> Result<Self> {
        config.validate().map_err(CubeStoreError::ConfigError)?;
        let encoding = table.encoding.take().ok_or(CubeStoreError::MissingEncoding)?;
        table.validate()?;

        if path.exists() {
            warn!(path = %path.display(), "Removing existing store before create");
            std::fs::remove_dir_all(path)?;
        }
        std::fs::create_dir_all(path)?;

        let store = Arc::new(
            FilesystemStore::new(path).map_err(|e| CubeStoreError::storage_error(e.to_string()))?,
        );

        let mut group_attrs = table.global_attrs.clone();
        group_attrs.insert(GRID_VARIABLES_ATTR.to_string(), json!(table.grid_names()));
        group_attrs.insert(SERIES_VARIABLES_ATTR.to_string(), json!(table.series_names()));
        let group = GroupBuilder::new()
            .attributes(group_attrs.clone())
            .build(store.clone(), "/")
            .map_err(|e| CubeStoreError::zarr_error(e.to_string()))?;
        group
            .store_metadata()
            .map_err(|e| CubeStoreError::storage_error(e.to_string()))?;

        let builder = LayoutBuilder {
            store: store.clone(),
            config,
            len: 0,
            ny: table.y.len() as u64,
            nx: table.x.len() as u64,
        };

        builder.write_coordinate(X, &table.x)?;
        builder.write_coordinate(Y, &table.y)?;

        let time_array = builder.time_array()?;

        let mut grids = BTreeMap::new();
        for column in &table.grids {
            let array = builder.grid_array(&column.name, &column.attrs, &encoding)?;
            grids.insert(column.name.clone(), array);
        }

        let mut series = BTreeMap::new();
        for column in &table.series {
            let array = builder.series_array(&column.name, &column.attrs, &encoding)?;
            series.insert(column.name.clone(), array);
        }

        let mut cube = Self {
            root: path.to_path_buf(),
            x: table.x.clone(),
            y: table.y.clone(),
            mid_dates: Vec::new(),
            known_dates: HashSet::new(),
            time_array,
            grids,
            series,
            global_attrs: group_attrs,
            manifest: GranuleManifest::new(path),
        };
        cube.write_batch(table)?;

        info!(
            path = %path.display(),
            slices = cube.len(),
            nx = cube.x.len(),
            ny = cube.y.len(),
            compression = %config.zarr_compression,
            "Created cube store"
        );
        Ok(cube)
    }

    /// Open an existing store for reading or appending.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_dir() {
            return Err(CubeStoreError::storage_error(format!(
                "no cube store at {}",
                path.display()
            )));
        }

        let store = Arc::new(
            FilesystemStore::new(path).map_err(|e| CubeStoreError::storage_error(e.to_string()))?,
        );
        let group = Group::open(store.clone(), "/")
            .map_err(|e| CubeStoreError::invalid_metadata(e.to_string()))?;
        let global_attrs = group.attributes().clone();

        let grid_names = string_list(&global_attrs, GRID_VARIABLES_ATTR)?;
        let series_names = string_list(&global_attrs, SERIES_VARIABLES_ATTR)?;

        let x = read_all::<f64>(&open_array(&store, X)?)?;
        let y = read_all::<f64>(&open_array(&store, Y)?)?;
        let time_array = open_array(&store, MID_DATE)?;
        let mid_dates = read_all::<i64>(&time_array)?;
        let len = mid_dates.len() as u64;

        let mut grids = BTreeMap::new();
        for name in grid_names {
            let mut array = open_array(&store, &name)?;
            fit_time_length(&name, &mut array, len)?;
            grids.insert(name, array);
        }
        let mut series = BTreeMap::new();
        for name in series_names {
            let mut array = open_array(&store, &name)?;
            fit_time_length(&name, &mut array, len)?;
            series.insert(name, array);
        }

        let manifest = GranuleManifest::new(path);
        let records = manifest.read()?;
        if records.len() > mid_dates.len() {
            warn!(
                records = records.len(),
                slices = mid_dates.len(),
                "Dropping granule manifest lines past the last committed slice"
            );
            manifest.truncate(mid_dates.len())?;
        } else if records.len() < mid_dates.len() {
            warn!(
                records = records.len(),
                slices = mid_dates.len(),
                "Granule manifest does not match mid_date length"
            );
        }

        debug!(slices = mid_dates.len(), "Opened cube store");
        Ok(Self {
            root: path.to_path_buf(),
            known_dates: mid_dates.iter().copied().collect(),
            x,
            y,
            mid_dates,
            time_array,
            grids,
            series,
            global_attrs,
            manifest,
        })
    }

    /// Append a batch along `mid_date`.
    ///
    /// Every layout check runs before the first byte is written, so a
    /// rejected batch leaves the store unchanged.
    #[instrument(skip(self, table), fields(path = %self.root.display(), slices = table.len()))]
    pub fn append(&mut self, table: BatchTable) -> Result<()> {
        if table.encoding.is_some() {
            return Err(CubeStoreError::MetadataReassert);
        }
        table.validate()?;
        self.check_layout(&table)?;
        if let Some(&t) = table.mid_dates.iter().find(|t| self.known_dates.contains(t)) {
            return Err(CubeStoreError::DuplicateMidDate(t));
        }

        let offset = self.len();
        self.write_batch(table)?;
        info!(offset, total = self.len(), "Appended batch to cube store");
        Ok(())
    }

    fn check_layout(&self, table: &BatchTable) -> Result<()> {
        if !coords_match(&self.x, &table.x) {
            return Err(CubeStoreError::schema_mismatch(format!(
                "x coordinate differs (store {} values, batch {})",
                self.x.len(),
                table.x.len()
            )));
        }
        if !coords_match(&self.y, &table.y) {
            return Err(CubeStoreError::schema_mismatch(format!(
                "y coordinate differs (store {} values, batch {})",
                self.y.len(),
                table.y.len()
            )));
        }

        let stored: BTreeSet<&str> = self.grids.keys().map(String::as_str).collect();
        let incoming: BTreeSet<&str> = table.grids.iter().map(|g| g.name.as_str()).collect();
        if stored != incoming {
            return Err(CubeStoreError::schema_mismatch(format!(
                "grid variables differ: store {:?}, batch {:?}",
                stored, incoming
            )));
        }

        let stored: BTreeSet<&str> = self.series.keys().map(String::as_str).collect();
        let incoming: BTreeSet<&str> = table.series.iter().map(|s| s.name.as_str()).collect();
        if stored != incoming {
            return Err(CubeStoreError::schema_mismatch(format!(
                "series variables differ: store {:?}, batch {:?}",
                stored, incoming
            )));
        }
        Ok(())
    }

    /// Grow every array and write the batch at the current end. Columns are
    /// dropped as soon as they are written.
    ///
    /// The `mid_date` metadata is stored last and is the commit point: a
    /// failure before it leaves the store at its previous length, with any
    /// overhang in the other arrays cut back by `open`.
    fn write_batch(&mut self, table: BatchTable) -> Result<()> {
        let offset = self.len() as u64;
        let n = table.len() as u64;
        let (ny, nx) = (self.y.len() as u64, self.x.len() as u64);

        let BatchTable {
            mid_dates,
            grids,
            series,
            records,
            ..
        } = table;

        for column in grids {
            let array = self.grids.get_mut(&column.name).ok_or_else(|| {
                CubeStoreError::schema_mismatch(format!("unknown grid variable '{}'", column.name))
            })?;
            append_slab(array, vec![offset, 0, 0], vec![n, ny, nx], &column.data)?;
            debug!(variable = %column.name, offset, n, "Wrote grid variable");
        }

        for column in series {
            let array = self.series.get_mut(&column.name).ok_or_else(|| {
                CubeStoreError::schema_mismatch(format!(
                    "unknown series variable '{}'",
                    column.name
                ))
            })?;
            append_slab(array, vec![offset], vec![n], &column.data)?;
        }

        write_slab(&mut self.time_array, vec![offset], vec![n], &mid_dates)?;
        self.manifest.append(&records)?;
        store_metadata(&self.time_array)?;

        self.known_dates.extend(mid_dates.iter().copied());
        self.mid_dates.extend(mid_dates);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read access
    // ------------------------------------------------------------------

    /// Number of time slices.
    pub fn len(&self) -> usize {
        self.mid_dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mid_dates.is_empty()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    pub fn mid_dates(&self) -> &[i64] {
        &self.mid_dates
    }

    pub fn global_attrs(&self) -> &Map<String, Value> {
        &self.global_attrs
    }

    pub fn grid_variables(&self) -> impl Iterator<Item = &str> {
        self.grids.keys().map(String::as_str)
    }

    pub fn series_variables(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    /// Attributes of a grid or series variable.
    pub fn variable_attrs(&self, name: &str) -> Option<&Map<String, Value>> {
        self.grids
            .get(name)
            .or_else(|| self.series.get(name))
            .map(|array| array.attributes())
    }

    /// Full contents of a grid variable, `[mid_date, y, x]` row-major.
    pub fn read_grid(&self, name: &str) -> Result<Vec<f32>> {
        let array = self
            .grids
            .get(name)
            .ok_or_else(|| CubeStoreError::invalid_metadata(format!("no grid variable '{}'", name)))?;
        read_all::<f32>(array)
    }

    pub fn read_series(&self, name: &str) -> Result<Vec<f32>> {
        let array = self.series.get(name).ok_or_else(|| {
            CubeStoreError::invalid_metadata(format!("no series variable '{}'", name))
        })?;
        read_all::<f32>(array)
    }

    /// Manifest records in slice order.
    pub fn records(&self) -> Result<Vec<SliceRecord>> {
        self.manifest.read()
    }
}

/// Builds arrays for a new store.
struct LayoutBuilder<'a> {
    store: Arc<FilesystemStore>,
    config: &'a CubeStoreConfig,
    len: u64,
    ny: u64,
    nx: u64,
}

impl LayoutBuilder<'_> {
    fn write_coordinate(&self, name: &str, values: &[f64]) -> Result<()> {
        let n = values.len() as u64;
        let mut attrs = Map::new();
        attrs.insert(DIMENSIONS_ATTR.to_string(), json!([name]));
        attrs.insert("units".to_string(), json!("m"));

        let array = self.build(
            name,
            vec![n],
            vec![n.max(1)],
            DataType::Float64,
            FillValue::from(f64::NAN),
            attrs,
            8,
        )?;
        let subset = ArraySubset::new_with_start_shape(vec![0], vec![n])
            .map_err(|e| CubeStoreError::zarr_error(e.to_string()))?;
        array
            .store_array_subset_elements(&subset, values)
            .map_err(|e| CubeStoreError::storage_error(e.to_string()))?;
        Ok(())
    }

    fn time_array(&self) -> Result<Array<FilesystemStore>> {
        let mut attrs = Map::new();
        attrs.insert(DIMENSIONS_ATTR.to_string(), json!([MID_DATE]));
        attrs.insert(
            "units".to_string(),
            json!("milliseconds since 1970-01-01 00:00:00"),
        );
        attrs.insert("calendar".to_string(), json!("proleptic_gregorian"));

        self.build(
            MID_DATE,
            vec![self.len],
            vec![self.time_chunk()],
            DataType::Int64,
            FillValue::from(0i64),
            attrs,
            8,
        )
    }

    fn grid_array(
        &self,
        name: &str,
        column_attrs: &Map<String, Value>,
        encoding: &FillEncoding,
    ) -> Result<Array<FilesystemStore>> {
        let mut attrs = column_attrs.clone();
        attrs.insert(DIMENSIONS_ATTR.to_string(), json!([MID_DATE, Y, X]));

        let spatial = self.config.spatial_chunk as u64;
        self.build(
            name,
            vec![self.len, self.ny, self.nx],
            vec![self.time_chunk(), spatial.min(self.ny).max(1), spatial.min(self.nx).max(1)],
            DataType::Float32,
            FillValue::from(encoding.fill_value(name)),
            attrs,
            4,
        )
    }

    fn series_array(
        &self,
        name: &str,
        column_attrs: &Map<String, Value>,
        encoding: &FillEncoding,
    ) -> Result<Array<FilesystemStore>> {
        let mut attrs = column_attrs.clone();
        attrs.insert(DIMENSIONS_ATTR.to_string(), json!([MID_DATE]));

        self.build(
            name,
            vec![self.len],
            vec![self.time_chunk()],
            DataType::Float32,
            FillValue::from(encoding.fill_value(name)),
            attrs,
            4,
        )
    }

    fn time_chunk(&self) -> u64 {
        (self.config.time_chunk as u64).max(1)
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        &self,
        name: &str,
        shape: Vec<u64>,
        chunks: Vec<u64>,
        data_type: DataType,
        fill_value: FillValue,
        attrs: Map<String, Value>,
        typesize: usize,
    ) -> Result<Array<FilesystemStore>> {
        let chunk_grid: zarrs::array::ChunkGrid = chunks
            .try_into()
            .map_err(|e| CubeStoreError::ConfigError(format!("{:?}", e)))?;

        let mut binding = ArrayBuilder::new(shape, data_type, chunk_grid, fill_value);
        let mut builder = binding.attributes(attrs);

        if self.config.zarr_compression != ZarrCompression::None {
            let codec = create_compression_codec(self.config, typesize)?;
            builder = builder.bytes_to_bytes_codecs(vec![codec]);
        }

        let array = builder
            .build(self.store.clone(), &format!("/{}", name))
            .map_err(|e| CubeStoreError::zarr_error(e.to_string()))?;
        array
            .store_metadata()
            .map_err(|e| CubeStoreError::storage_error(e.to_string()))?;
        Ok(array)
    }
}

/// Create the compression codec based on configuration.
fn create_compression_codec(
    config: &CubeStoreConfig,
    typesize: usize,
) -> Result<Arc<dyn zarrs::array::codec::BytesToBytesCodecTraits>> {
    let level = BloscCompressionLevel::try_from(config.zarr_compression_level)
        .map_err(|_| CubeStoreError::ConfigError("Invalid compression level".to_string()))?;

    let shuffle = if config.zarr_shuffle {
        BloscShuffleMode::Shuffle
    } else {
        BloscShuffleMode::NoShuffle
    };

    // typesize is required when shuffle is enabled
    let typesize = config.zarr_shuffle.then_some(typesize);

    let compressor = match config.zarr_compression {
        ZarrCompression::None => {
            return Err(CubeStoreError::ConfigError(
                "No compression configured".to_string(),
            ))
        }
        ZarrCompression::BloscLz4 => BloscCompressor::LZ4,
        ZarrCompression::BloscZstd => BloscCompressor::Zstd,
    };

    let codec = BloscCodec::new(compressor, level, None, shuffle, typesize)
        .map_err(|e| CubeStoreError::ConfigError(e.to_string()))?;

    Ok(Arc::new(codec))
}

/// Set the first dimension of `array` to exactly `start + n`, write `data`
/// there, then store the new shape.
fn append_slab<T: Element>(
    array: &mut Array<FilesystemStore>,
    start: Vec<u64>,
    shape: Vec<u64>,
    data: &[T],
) -> Result<()> {
    write_slab(array, start, shape, data)?;
    store_metadata(array)
}

/// Like [`append_slab`] but leaves the stored metadata untouched.
fn write_slab<T: Element>(
    array: &mut Array<FilesystemStore>,
    start: Vec<u64>,
    shape: Vec<u64>,
    data: &[T],
) -> Result<()> {
    let mut new_shape = array.shape().to_vec();
    new_shape[0] = start[0] + shape[0];
    array.set_shape(new_shape);

    let subset = ArraySubset::new_with_start_shape(start, shape)
        .map_err(|e| CubeStoreError::zarr_error(e.to_string()))?;
    array
        .store_array_subset_elements(&subset, data)
        .map_err(|e| CubeStoreError::storage_error(e.to_string()))?;
    Ok(())
}

fn store_metadata(array: &Array<FilesystemStore>) -> Result<()> {
    array
        .store_metadata()
        .map_err(|e| CubeStoreError::storage_error(e.to_string()))
}

fn open_array(store: &Arc<FilesystemStore>, name: &str) -> Result<Array<FilesystemStore>> {
    Array::open(store.clone(), &format!("/{}", name))
        .map_err(|e| CubeStoreError::invalid_metadata(format!("array '{}': {}", name, e)))
}

fn read_all<T: Element + zarrs::array::ElementOwned>(array: &Array<FilesystemStore>) -> Result<Vec<T>> {
    let subset = ArraySubset::new_with_shape(array.shape().to_vec());
    array
        .retrieve_array_subset_elements::<T>(&subset)
        .map_err(|e| CubeStoreError::storage_error(e.to_string()))
}

/// `mid_date` decides the cube length. Arrays left longer by an interrupted
/// append are cut back in memory; shorter ones mean a corrupt store.
fn fit_time_length(name: &str, array: &mut Array<FilesystemStore>, len: u64) -> Result<()> {
    match array.shape().first().copied() {
        Some(n) if n == len => Ok(()),
        Some(n) if n > len => {
            warn!(variable = name, slices = n, mid_date = len, "Ignoring slices past mid_date");
            let mut shape = array.shape().to_vec();
            shape[0] = len;
            array.set_shape(shape);
            Ok(())
        }
        other => Err(CubeStoreError::invalid_metadata(format!(
            "variable '{}' has {:?} slices, mid_date has {}",
            name, other, len
        ))),
    }
}

fn string_list(attrs: &Map<String, Value>, key: &str) -> Result<Vec<String>> {
    let values = attrs
        .get(key)
        .and_then(Value::as_array)
        .ok_or_else(|| CubeStoreError::invalid_metadata(format!("missing group attribute '{}'", key)))?;
    values
        .iter()
        .map(|v| {
            v.as_str().map(str::to_string).ok_or_else(|| {
                CubeStoreError::invalid_metadata(format!("non-string entry in '{}'", key))
            })
        })
        .collect()
}

fn coords_match(a: &[f64], b: &[f64]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(p, q)| (p - q).abs() <= COORD_TOLERANCE)
}

//! Cube builder configuration: YAML file, then environment, then flags.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use cube_assembly::{CubeConfig, SearchConfig};
use cube_common::{BoundingBox, EpsgCode};
use cube_store::CubeStoreConfig;
use serde::{Deserialize, Serialize};
use storage::ObjectStorageConfig;

/// Everything one run needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    /// Zarr store to create or append to
    pub output: PathBuf,

    /// Read granules from this directory instead of the search API
    pub local_path: Option<PathBuf>,

    pub cube: CubeConfig,
    pub search: SearchConfig,
    pub storage: ObjectStorageConfig,
    pub store: CubeStoreConfig,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            output: PathBuf::from("cube.zarr"),
            local_path: None,
            cube: CubeConfig::default(),
            search: SearchConfig::default(),
            storage: ObjectStorageConfig::default(),
            store: CubeStoreConfig::default(),
        }
    }
}

/// Values given on the command line; each one overrides the file and
/// environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub output: Option<PathBuf>,
    pub local_path: Option<PathBuf>,
    pub projection: Option<EpsgCode>,
    pub bbox: Option<String>,
    pub center: Option<(f64, f64, f64)>,
    pub batch_size: Option<usize>,
    pub workers: Option<usize>,
    pub num_granules: Option<usize>,
    pub start_offset: Option<usize>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub percent_valid: Option<u32>,
    pub points_per_side: Option<usize>,
}

impl BuilderConfig {
    /// Load `path` if it exists, otherwise start from defaults and the
    /// environment.
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let mut config: Self = serde_yaml::from_str(&text)
                .with_context(|| format!("Failed to parse {}", path.display()))?;
            config.cube = config.cube.with_env()?;
            Ok(config)
        } else {
            Ok(Self {
                cube: CubeConfig::from_env()?,
                storage: ObjectStorageConfig::from_env(),
                store: CubeStoreConfig::from_env(),
                output: std::env::var("CUBE_OUTPUT")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("cube.zarr")),
                ..Default::default()
            })
        }
    }

    pub fn apply(&mut self, overrides: Overrides) -> Result<()> {
        if let Some(output) = overrides.output {
            self.output = output;
        }
        if overrides.local_path.is_some() {
            self.local_path = overrides.local_path;
        }
        if let Some(projection) = overrides.projection {
            self.cube.projection = projection;
        }
        match (overrides.bbox, overrides.center) {
            (Some(_), Some(_)) => bail!("--bbox and --center-x/--center-y/--half-size are exclusive"),
            (Some(bbox), None) => {
                self.cube.region = Some(
                    BoundingBox::from_bbox_string(&bbox).with_context(|| format!("Invalid --bbox '{}'", bbox))?,
                );
            }
            (None, Some((x, y, half))) => {
                self.cube.region = Some(BoundingBox::from_center(x, y, half));
            }
            (None, None) => {}
        }
        if let Some(n) = overrides.batch_size {
            self.cube.batch_size = n;
        }
        if let Some(n) = overrides.workers {
            self.cube.workers = n;
        }
        if overrides.num_granules.is_some() {
            self.cube.max_granules = overrides.num_granules;
        }
        if let Some(n) = overrides.start_offset {
            self.cube.start_offset = n;
        }
        if let Some(n) = overrides.points_per_side {
            self.cube.search_points_per_side = n;
        }
        if overrides.start.is_some() {
            self.search.start = overrides.start;
        }
        if overrides.end.is_some() {
            self.search.end = overrides.end;
        }
        if overrides.percent_valid.is_some() {
            self.search.percent_valid_pixels = overrides.percent_valid;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.cube
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid cube configuration: {}", e))?;
        self.store
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid store configuration: {}", e))?;
        if let (Some(start), Some(end)) = (self.search.start, self.search.end) {
            if start > end {
                bail!("search start {} is after end {}", start, end);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_yaml_then_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "output: /data/cube.zarr\n\
             cube:\n  projection: 3413\n  batch_size: 250\n  region:\n    min_x: 0.0\n    min_y: 0.0\n    max_x: 1000.0\n    max_y: 1000.0\n\
             search:\n  start: 1984-01-01\n  percent_valid_pixels: 1\n\
             store:\n  time_chunk: 500\n"
        )
        .unwrap();

        let mut config = BuilderConfig::load(file.path()).unwrap();
        assert_eq!(config.output, PathBuf::from("/data/cube.zarr"));
        assert_eq!(config.cube.projection, EpsgCode(3413));
        assert_eq!(config.cube.batch_size, 250);
        assert_eq!(config.search.start, NaiveDate::from_ymd_opt(1984, 1, 1));
        assert_eq!(config.store.time_chunk, 500);

        config
            .apply(Overrides {
                workers: Some(8),
                center: Some((487462.0, 9016243.0, 50000.0)),
                end: NaiveDate::from_ymd_opt(2021, 1, 1),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(config.cube.workers, 8);
        assert_eq!(config.cube.batch_size, 250);
        assert_eq!(config.cube.region.unwrap().min_x, 437462.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_region_flags_are_exclusive() {
        let mut config = BuilderConfig::default();
        let result = config.apply(Overrides {
            bbox: Some("0,0,10,10".into()),
            center: Some((5.0, 5.0, 5.0)),
            ..Default::default()
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_region_is_invalid() {
        assert!(BuilderConfig::default().validate().is_err());
    }

    #[test]
    fn test_reversed_dates_are_invalid() {
        let mut config = BuilderConfig::default();
        config
            .apply(Overrides {
                bbox: Some("0,0,10,10".into()),
                start: NaiveDate::from_ymd_opt(2021, 1, 1),
                end: NaiveDate::from_ymd_opt(1984, 1, 1),
                ..Default::default()
            })
            .unwrap();
        assert!(config.validate().is_err());
    }
}

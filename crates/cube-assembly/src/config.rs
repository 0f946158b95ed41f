//! Run configuration for cube assembly.

use std::env;

use cube_common::{BoundingBox, EpsgCode};
use serde::{Deserialize, Serialize};

use crate::error::{CubeError, Result};

pub const DEFAULT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_WORKERS: usize = 4;

/// What to build and how hard to work at it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CubeConfig {
    /// Projection of the cube; granules in any other projection are skipped
    pub projection: EpsgCode,

    /// Region of interest in `projection` coordinates
    pub region: Option<BoundingBox>,

    /// Granules fetched and appended per batch
    pub batch_size: usize,

    /// Concurrent fetches within a batch
    pub workers: usize,

    /// Keep only the first N search results (before duplicate resolution)
    pub max_granules: Option<usize>,

    /// Skip this many deduplicated granules and append to an existing store
    pub start_offset: usize,

    /// Extra points per region side when reprojecting the search polygon
    pub search_points_per_side: usize,
}

impl Default for CubeConfig {
    fn default() -> Self {
        Self {
            projection: EpsgCode(32628),
            region: None,
            batch_size: DEFAULT_BATCH_SIZE,
            workers: DEFAULT_WORKERS,
            max_granules: None,
            start_offset: 0,
            search_points_per_side: 0,
        }
    }
}

impl CubeConfig {
    /// Overlay `CUBE_*` environment variables on `self`.
    pub fn with_env(mut self) -> Result<Self> {
        if let Ok(v) = env::var("CUBE_PROJECTION") {
            self.projection = v.parse().map_err(|e| CubeError::config(format!("{}", e)))?;
        }
        if let Ok(v) = env::var("CUBE_BBOX") {
            self.region = Some(
                BoundingBox::from_bbox_string(&v)
                    .map_err(|e| CubeError::config(format!("CUBE_BBOX: {}", e)))?,
            );
        }
        if let Some(v) = parse_env::<usize>("CUBE_BATCH_SIZE")? {
            self.batch_size = v;
        }
        if let Some(v) = parse_env::<usize>("CUBE_WORKERS")? {
            self.workers = v;
        }
        if let Some(v) = parse_env::<usize>("CUBE_MAX_GRANULES")? {
            self.max_granules = Some(v);
        }
        if let Some(v) = parse_env::<usize>("CUBE_START_OFFSET")? {
            self.start_offset = v;
        }
        Ok(self)
    }

    /// Defaults with the environment applied.
    pub fn from_env() -> Result<Self> {
        Self::default().with_env()
    }

    /// The region, which every run must have.
    pub fn region(&self) -> Result<BoundingBox> {
        self.region
            .ok_or_else(|| CubeError::config("no region of interest configured"))
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.batch_size == 0 {
            return Err("batch_size must be at least 1".to_string());
        }
        if self.workers == 0 {
            return Err("workers must be at least 1".to_string());
        }
        if self.max_granules == Some(0) {
            return Err("max_granules must be at least 1 when set".to_string());
        }
        match &self.region {
            None => return Err("region is required".to_string()),
            Some(region) => region.validate().map_err(|e| e.to_string())?,
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(v) => v
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| CubeError::config(format!("{}: invalid value '{}'", name, v))),
        Err(_) => Ok(None),
    }
}

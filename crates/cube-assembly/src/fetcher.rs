//! Retrieval and decoding of single granules.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use cube_common::{EpsgCode, MidDate};
use netcdf_parser::{read_granule, read_granule_from_bytes, DecodedGranule, NetCdfResult};
use storage::{GranuleLocation, GranuleStores, ObjectStorageConfig};
use tracing::{debug, instrument};

use crate::error::{CubeError, Result};
use crate::granule_index::GranuleRef;
use crate::layer::Layer;
use crate::schema;
use crate::spatial_filter::{Filtered, Rejected, SpatialFilter};

/// What fetching one granule produced.
#[derive(Debug)]
pub struct LayerOutcome {
    pub url: String,
    /// Projection of the source granule
    pub projection: EpsgCode,
    /// No valid data inside the region
    pub is_empty: bool,
    pub mid_date: Option<MidDate>,
    pub layer: Option<Layer>,
}

impl LayerOutcome {
    pub fn accepted(layer: Layer) -> Self {
        Self {
            url: layer.url.clone(),
            projection: layer.epsg,
            is_empty: false,
            mid_date: Some(layer.mid_date),
            layer: Some(layer),
        }
    }

    pub fn empty(url: impl Into<String>, projection: EpsgCode) -> Self {
        Self {
            url: url.into(),
            projection,
            is_empty: true,
            mid_date: None,
            layer: None,
        }
    }

    pub fn wrong_projection(url: impl Into<String>, projection: EpsgCode) -> Self {
        Self {
            url: url.into(),
            projection,
            is_empty: false,
            mid_date: None,
            layer: None,
        }
    }

    /// Outcome of running a granule through the spatial filter.
    pub fn from_filtered(url: &str, target: EpsgCode, filtered: Filtered) -> Self {
        match filtered {
            Ok(layer) => Self::accepted(layer),
            Err(Rejected::WrongProjection(epsg)) => Self::wrong_projection(url, epsg),
            Err(Rejected::Empty) => Self::empty(url, target),
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.layer.is_some()
    }
}

/// Produces the layer (or skip reason) for one granule.
#[async_trait]
pub trait LayerFetcher: Send + Sync {
    async fn fetch(&self, granule: &GranuleRef) -> Result<LayerOutcome>;
}

/// Reads granules from local disk or object storage and crops them to the
/// cube region.
pub struct GranuleLayerFetcher {
    stores: Arc<GranuleStores>,
    filter: SpatialFilter,
}

impl GranuleLayerFetcher {
    pub fn new(stores: Arc<GranuleStores>, filter: SpatialFilter) -> Self {
        Self { stores, filter }
    }

    /// Connect a client for every bucket or origin referenced by `granules`.
    pub fn connect(
        config: &ObjectStorageConfig,
        filter: SpatialFilter,
        granules: &[GranuleRef],
    ) -> Result<Self> {
        let locations = granules
            .iter()
            .map(|g| GranuleLocation::parse(g.url()).map_err(|e| CubeError::fetch(g.url(), e)))
            .collect::<Result<Vec<_>>>()?;
        let stores = GranuleStores::connect(config, &locations)
            .map_err(|e| CubeError::config(format!("granule storage: {}", e)))?;
        Ok(Self::new(Arc::new(stores), filter))
    }

    /// Decode on the blocking pool and crop before handing the layer back,
    /// so full-size rasters never leave the worker.
    async fn decode<F>(&self, url: &str, read: F) -> Result<LayerOutcome>
    where
        F: FnOnce() -> NetCdfResult<DecodedGranule> + Send + 'static,
    {
        let filter = self.filter;
        let owned_url = url.to_string();
        let filtered = tokio::task::spawn_blocking(move || {
            let granule = read().map_err(|e| CubeError::fetch(&owned_url, e))?;
            filter.apply(&owned_url, granule)
        })
        .await
        .map_err(|e| CubeError::fetch(url, format!("decode task failed: {}", e)))??;

        Ok(LayerOutcome::from_filtered(
            url,
            self.filter.projection(),
            filtered,
        ))
    }
}

#[async_trait]
impl LayerFetcher for GranuleLayerFetcher {
    #[instrument(skip_all, fields(url = %granule.url()))]
    async fn fetch(&self, granule: &GranuleRef) -> Result<LayerOutcome> {
        let start = Instant::now();
        let url = granule.url();
        let location = GranuleLocation::parse(url).map_err(|e| CubeError::fetch(url, e))?;

        let outcome = match location {
            GranuleLocation::Local(path) => {
                self.decode(url, move || read_granule(&path, &schema::selection()))
                    .await?
            }
            remote => {
                let bytes = self
                    .stores
                    .fetch(&remote)
                    .await
                    .map_err(|e| CubeError::fetch(url, e))?;
                debug!(bytes = bytes.len(), "Downloaded granule");
                self.decode(url, move || {
                    read_granule_from_bytes(&bytes, &schema::selection())
                })
                .await?
            }
        };

        debug!(
            accepted = outcome.is_accepted(),
            empty = outcome.is_empty,
            epsg = %outcome.projection,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Fetched granule"
        );
        Ok(outcome)
    }
}

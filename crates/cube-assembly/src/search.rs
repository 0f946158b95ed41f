//! Granule discovery: the ITS_LIVE search API or a local directory.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::NaiveDate;
use cube_common::{BoundingBox, EpsgCode};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use walkdir::WalkDir;

use crate::error::{CubeError, Result};

pub const DEFAULT_SEARCH_URL: &str = "https://nsidc.org/apps/itslive-search/velocities/urls";

/// Granule search parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    /// Region outline in lon/lat degrees
    pub polygon: Vec<(f64, f64)>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub percent_valid_pixels: Option<u32>,
}

impl SearchQuery {
    /// Query for `region`, given in `projection` coordinates. The region's
    /// vertices are reprojected to lon/lat, optionally with
    /// `points_per_side` extra points on each side.
    pub fn for_region(
        projection: EpsgCode,
        region: &BoundingBox,
        points_per_side: usize,
        config: &SearchConfig,
    ) -> Result<Self> {
        let polygon = projection::ring_to_lon_lat(projection, &region.to_polygon(), points_per_side)
            .map_err(|e| CubeError::config(format!("search polygon: {}", e)))?;
        Ok(Self {
            polygon,
            start: config.start,
            end: config.end,
            percent_valid_pixels: config.percent_valid_pixels,
        })
    }

    /// Polygon as `lon,lat,lon,lat,...`.
    pub fn polygon_param(&self) -> String {
        self.polygon
            .iter()
            .flat_map(|&(lon, lat)| [lon.to_string(), lat.to_string()])
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Query string parameters, in request order.
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::with_capacity(4);
        if let Some(start) = self.start {
            params.push(("start", start.format("%Y-%m-%d").to_string()));
        }
        if let Some(end) = self.end {
            params.push(("end", end.format("%Y-%m-%d").to_string()));
        }
        if let Some(percent) = self.percent_valid_pixels {
            params.push(("percent_valid_pixels", percent.to_string()));
        }
        params.push(("polygon", self.polygon_param()));
        params
    }
}

/// Source of granule identifiers.
#[async_trait]
pub trait GranuleSearch: Send + Sync {
    /// Identifiers matching `query`, in the source's order. Never empty:
    /// no match is [`CubeError::EmptyResult`].
    async fn search(&self, query: &SearchQuery) -> Result<Vec<String>>;
}

/// Search API settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub base_url: String,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub percent_valid_pixels: Option<u32>,
    /// Request timeout; the API can take minutes for large regions
    pub timeout_secs: u64,
    /// Attempts before giving up
    pub total_retries: u32,
    pub retry_delay_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_SEARCH_URL.to_string(),
            start: None,
            end: None,
            percent_valid_pixels: None,
            timeout_secs: 500,
            total_retries: 1,
            retry_delay_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    url: String,
}

/// Client for the ITS_LIVE granule search API.
pub struct ItsLiveSearchClient {
    client: Client,
    config: SearchConfig,
}

impl ItsLiveSearchClient {
    pub fn new(config: SearchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CubeError::config(format!("HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    async fn request(&self, query: &SearchQuery) -> Result<Vec<String>> {
        let response = self
            .client
            .get(&self.config.base_url)
            .query(&query.to_params())
            .send()
            .await
            .map_err(|e| CubeError::Search(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CubeError::Search(format!(
                "search API returned {}",
                response.status()
            )));
        }

        let hits: Vec<SearchHit> = response
            .json()
            .await
            .map_err(|e| CubeError::Search(format!("invalid response: {}", e)))?;
        Ok(hits.into_iter().map(|hit| hit.url).collect())
    }
}

#[async_trait]
impl GranuleSearch for ItsLiveSearchClient {
    #[instrument(skip_all, fields(base_url = %self.config.base_url))]
    async fn search(&self, query: &SearchQuery) -> Result<Vec<String>> {
        let attempts = self.config.total_retries.max(1);
        let start = Instant::now();
        let mut attempt = 0;

        let urls = loop {
            attempt += 1;
            info!(attempt, "Querying granule search API");
            match self.request(query).await {
                Ok(urls) => break urls,
                Err(e) if attempt < attempts => {
                    warn!(attempt, error = %e, delay_secs = self.config.retry_delay_secs, "Search failed, retrying");
                    tokio::time::sleep(Duration::from_secs(self.config.retry_delay_secs)).await;
                }
                Err(e) => return Err(e),
            }
        };

        info!(
            count = urls.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Granule search complete"
        );
        if urls.is_empty() {
            return Err(CubeError::EmptyResult);
        }
        Ok(urls)
    }
}

/// Granules already on local disk: every `*.nc` file below a directory,
/// sorted by path. The query is not applied; the region filter does the
/// selection.
pub struct LocalDirectorySource {
    root: PathBuf,
}

impl LocalDirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl GranuleSearch for LocalDirectorySource {
    async fn search(&self, _query: &SearchQuery) -> Result<Vec<String>> {
        let root = self.root.clone();
        let mut paths = tokio::task::spawn_blocking(move || {
            let mut paths = Vec::new();
            for entry in WalkDir::new(&root).follow_links(true) {
                let entry = entry.map_err(|e| CubeError::Search(e.to_string()))?;
                let is_granule = entry.file_type().is_file()
                    && entry.path().extension().and_then(|e| e.to_str()) == Some("nc");
                if is_granule {
                    paths.push(entry.path().display().to_string());
                }
            }
            Ok::<_, CubeError>(paths)
        })
        .await
        .map_err(|e| CubeError::Search(format!("directory scan failed: {}", e)))??;

        paths.sort();
        info!(root = %self.root.display(), count = paths.len(), "Listed local granules");
        if paths.is_empty() {
            return Err(CubeError::EmptyResult);
        }
        Ok(paths)
    }
}

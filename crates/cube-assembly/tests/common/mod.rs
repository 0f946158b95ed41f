//! Shared helpers for cube-assembly integration tests: an in-memory granule
//! source and fetcher.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Duration as Days;
use cube_assembly::{
    CubeConfig, CubeError, GranuleRef, GranuleSearch, LayerFetcher, LayerOutcome, Result,
    SearchQuery, SpatialFilter,
};
use cube_common::{BoundingBox, EpsgCode};
use netcdf_parser::DecodedGranule;
use test_utils::{region, SyntheticGranule};

pub const TARGET: EpsgCode = EpsgCode(32628);

pub fn synthetic_region() -> BoundingBox {
    let (min_x, min_y, max_x, max_y) = region::SYNTHETIC_32628;
    BoundingBox::new(min_x, min_y, max_x, max_y)
}

pub fn cube_config(batch_size: usize, workers: usize) -> CubeConfig {
    CubeConfig {
        projection: TARGET,
        region: Some(synthetic_region()),
        batch_size,
        workers,
        ..Default::default()
    }
}

/// A synthetic granule whose recorded center matches the mid-point in its
/// file name (even day separations only).
pub fn granule_for(url: &str) -> SyntheticGranule {
    let granule = GranuleRef::parse(url).expect("valid granule name");
    let separation = (granule.acq1() - granule.acq2()).num_days();
    let center = granule.acq2() + Days::days(separation / 2);
    SyntheticGranule::new().center(&center.format("%Y%m%d").to_string(), separation as f64)
}

/// Serves pre-built granules by URL and records how it was driven.
pub struct FakeFetcher {
    filter: SpatialFilter,
    granules: HashMap<String, DecodedGranule>,
    delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    fetched: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub fn new(filter: SpatialFilter) -> Self {
        Self {
            filter,
            granules: HashMap::new(),
            delay: Duration::from_millis(5),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            fetched: Mutex::new(Vec::new()),
        }
    }

    /// Fetcher for the synthetic region with the default granule for each
    /// URL.
    pub fn serving<S: AsRef<str>>(urls: &[S]) -> Self {
        let mut fetcher = Self::new(SpatialFilter::new(TARGET, synthetic_region()));
        for url in urls {
            fetcher.insert(url.as_ref(), granule_for(url.as_ref()).build());
        }
        fetcher
    }

    pub fn insert(&mut self, url: &str, granule: DecodedGranule) {
        self.granules.insert(url.to_string(), granule);
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl LayerFetcher for FakeFetcher {
    async fn fetch(&self, granule: &GranuleRef) -> Result<LayerOutcome> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.fetched.lock().unwrap().push(granule.url().to_string());

        let decoded = self
            .granules
            .get(granule.url())
            .cloned()
            .ok_or_else(|| CubeError::fetch(granule.url(), "no such granule"))?;
        let filtered = self.filter.apply(granule.url(), decoded)?;
        Ok(LayerOutcome::from_filtered(
            granule.url(),
            self.filter.projection(),
            filtered,
        ))
    }
}

/// Search returning a fixed list, possibly empty.
pub struct FakeSearch {
    urls: Vec<String>,
    calls: AtomicUsize,
}

impl FakeSearch {
    pub fn new(urls: Vec<String>) -> Self {
        Self {
            urls,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GranuleSearch for FakeSearch {
    async fn search(&self, _query: &SearchQuery) -> Result<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.urls.clone())
    }
}

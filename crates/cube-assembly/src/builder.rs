//! One cube run: search, dedupe, then fetch and append batch by batch.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use cube_store::{BatchTable, CubeStore, CubeStoreConfig};
use metrics::counter;
use storage::ObjectStorageConfig;
use tracing::{info, instrument, warn};

use crate::accumulator::{CubeAccumulator, CubeState};
use crate::config::CubeConfig;
use crate::error::{CubeError, Result};
use crate::fetcher::{GranuleLayerFetcher, LayerFetcher};
use crate::granule_index::{GranuleIndex, ResolvedGranules};
use crate::grid::CubeGrid;
use crate::report::RunSummary;
use crate::scheduler::{Batch, BatchScheduler};
use crate::search::{GranuleSearch, SearchConfig, SearchQuery};
use crate::spatial_filter::SpatialFilter;

/// Builds (or resumes) one cube on disk.
pub struct CubeBuilder {
    config: CubeConfig,
    store_config: CubeStoreConfig,
    output: PathBuf,
}

impl CubeBuilder {
    pub fn new(config: CubeConfig, store_config: CubeStoreConfig, output: impl Into<PathBuf>) -> Result<Self> {
        config.validate().map_err(CubeError::config)?;
        store_config
            .validate()
            .map_err(|e| CubeError::config(format!("store: {}", e)))?;
        Ok(Self {
            config,
            store_config,
            output: output.into(),
        })
    }

    pub fn config(&self) -> &CubeConfig {
        &self.config
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Query `search` for the cube region and resolve duplicates.
    pub async fn discover(
        &self,
        search: &dyn GranuleSearch,
        search_config: &SearchConfig,
    ) -> Result<ResolvedGranules> {
        let region = self.config.region()?;
        let query = SearchQuery::for_region(
            self.config.projection,
            &region,
            self.config.search_points_per_side,
            search_config,
        )?;
        info!(polygon = %query.polygon_param(), "Searching for granules");

        let urls = search.search(&query).await?;
        let resolved = GranuleIndex::resolve(&urls, self.config.max_granules)?;
        if resolved.granules.is_empty() {
            return Err(CubeError::EmptyResult);
        }
        info!(
            found = urls.len(),
            candidates = resolved.num_candidates,
            unique = resolved.granules.len(),
            doubles = resolved.skipped_doubles.len(),
            "Resolved granules"
        );
        Ok(resolved)
    }

    /// Search, connect to granule storage and build the cube.
    pub async fn build(
        &self,
        search: &dyn GranuleSearch,
        search_config: &SearchConfig,
        storage_config: &ObjectStorageConfig,
    ) -> Result<RunSummary> {
        let resolved = self.discover(search, search_config).await?;
        let filter = SpatialFilter::new(self.config.projection, self.config.region()?);
        let fetcher = GranuleLayerFetcher::connect(storage_config, filter, &resolved.granules)?;
        self.run(resolved, Arc::new(fetcher)).await
    }

    /// Fetch and append `resolved` granules in batches.
    ///
    /// With a non-zero `start_offset` the existing store is opened and the
    /// first `start_offset` granules are skipped; otherwise the store is
    /// created (replacing any previous one) on the first batch that has an
    /// accepted layer. An error aborts the run; batches already appended stay
    /// in the store.
    #[instrument(skip_all, fields(output = %self.output.display()))]
    pub async fn run<F>(&self, resolved: ResolvedGranules, fetcher: Arc<F>) -> Result<RunSummary>
    where
        F: LayerFetcher + ?Sized,
    {
        let started = Instant::now();
        let region = self.config.region()?;
        let mut state = CubeState::new(self.config.projection, region);
        state.skipped.record_doubles(resolved.skipped_doubles);

        let mut store = None;
        if self.config.start_offset > 0 {
            let existing = CubeStore::open(&self.output)?;
            state.grid = Some(CubeGrid::from_coords(
                existing.x().to_vec(),
                existing.y().to_vec(),
            ));
            state.written = existing.mid_dates().iter().copied().collect();
            info!(
                start_offset = self.config.start_offset,
                layers = existing.len(),
                "Resuming existing cube"
            );
            store = Some(existing);
        } else if self.output.exists() {
            warn!(
                output = %self.output.display(),
                "Existing store will be replaced by the first batch with data"
            );
        }

        let granules = resolved
            .granules
            .get(self.config.start_offset..)
            .unwrap_or_default();
        let scheduler = BatchScheduler::new(fetcher, self.config.batch_size, self.config.workers);
        info!(
            granules = granules.len(),
            batch_size = scheduler.batch_size(),
            workers = scheduler.workers(),
            "Starting cube run"
        );

        let mut num_written = 0;
        let mut num_batches = 0;
        for batch in scheduler.batches(granules, self.config.start_offset) {
            let batch_started = Instant::now();
            let skipped_before = state.skipped.total();

            let written = self
                .process_batch(&scheduler, &batch, &mut state, &mut store)
                .await
                .map_err(|e| CubeError::Batch {
                    batch_index: batch.index,
                    offset: batch.offset,
                    source: Box::new(e),
                })?;

            num_batches += 1;
            num_written += written;
            counter!("cube_layers_written_total").increment(written as u64);
            info!(
                batch = batch.index,
                offset = batch.offset,
                granules = batch.granules.len(),
                accepted = written,
                skipped = state.skipped.total() - skipped_before,
                elapsed_ms = batch_started.elapsed().as_millis() as u64,
                "Batch complete"
            );
        }

        if store.is_none() && self.output.exists() {
            warn!(
                output = %self.output.display(),
                "No layer was written; the store already at the output path is from an earlier run"
            );
        }

        let summary = RunSummary::new(
            resolved.num_candidates,
            num_written,
            num_batches,
            &state.skipped,
            started.elapsed(),
        );
        summary.log();
        Ok(summary)
    }

    /// Fetch, combine and write one batch. Returns the number of layers
    /// written.
    async fn process_batch<F>(
        &self,
        scheduler: &BatchScheduler<F>,
        batch: &Batch<'_>,
        state: &mut CubeState,
        store: &mut Option<CubeStore>,
    ) -> Result<usize>
    where
        F: LayerFetcher + ?Sized,
    {
        let outcomes = scheduler.run_batch(batch).await?;

        let mut accumulator = CubeAccumulator::new(state, batch.granules.len());
        for outcome in outcomes {
            accumulator.add(outcome)?;
        }
        if accumulator.is_empty() {
            return Ok(0);
        }
        let table = accumulator.combine(store.is_none())?;
        let mid_dates = table.mid_dates.clone();

        let written = self.write(store.take(), table).await?;
        *store = Some(written);
        state.written.extend(mid_dates.iter().copied());
        Ok(mid_dates.len())
    }

    /// Create or append on the blocking pool.
    async fn write(&self, store: Option<CubeStore>, table: BatchTable) -> Result<CubeStore> {
        let path = self.output.clone();
        let config = self.store_config.clone();
        tokio::task::spawn_blocking(move || -> Result<CubeStore> {
            match store {
                Some(mut store) => {
                    store.append(table)?;
                    Ok(store)
                }
                None => Ok(CubeStore::create(&path, table, &config)?),
            }
        })
        .await
        .map_err(|e| CubeError::Write(format!("write task failed: {}", e)))?
    }
}

//! Fixed-size batches of concurrent fetches.

use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::debug;

use crate::error::Result;
use crate::fetcher::{LayerFetcher, LayerOutcome};
use crate::granule_index::GranuleRef;

/// One batch of granules and its position in the deduplicated list.
#[derive(Debug, Clone, Copy)]
pub struct Batch<'a> {
    pub index: usize,
    /// Position of the first granule in the deduplicated list
    pub offset: usize,
    pub granules: &'a [GranuleRef],
}

/// Runs a bounded number of fetches per batch.
pub struct BatchScheduler<F: LayerFetcher + ?Sized> {
    fetcher: Arc<F>,
    batch_size: usize,
    workers: usize,
}

impl<F: LayerFetcher + ?Sized> BatchScheduler<F> {
    pub fn new(fetcher: Arc<F>, batch_size: usize, workers: usize) -> Self {
        Self {
            fetcher,
            batch_size: batch_size.max(1),
            workers: workers.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Batches of `granules`, produced on demand. `base_offset` is the
    /// position of `granules[0]` in the full list.
    pub fn batches<'a>(
        &self,
        granules: &'a [GranuleRef],
        base_offset: usize,
    ) -> impl Iterator<Item = Batch<'a>> + 'a {
        let batch_size = self.batch_size;
        granules
            .chunks(batch_size)
            .enumerate()
            .map(move |(index, granules)| Batch {
                index,
                offset: base_offset + index * batch_size,
                granules,
            })
    }

    /// Fetch every granule of `batch`, at most `workers` at a time.
    ///
    /// Outcomes come back in input order. The first error fails the batch;
    /// fetches still in flight are dropped.
    pub async fn run_batch(&self, batch: &Batch<'_>) -> Result<Vec<LayerOutcome>> {
        debug!(
            batch = batch.index,
            offset = batch.offset,
            granules = batch.granules.len(),
            workers = self.workers,
            "Fetching batch"
        );
        stream::iter(batch.granules)
            .map(|granule| self.fetcher.fetch(granule))
            .buffered(self.workers)
            .try_collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CubeError;
    use async_trait::async_trait;
    use cube_common::EpsgCode;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Finishes fetches in reverse order and tracks concurrency.
    struct SlowFetcher {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        fail_on: Option<String>,
    }

    impl SlowFetcher {
        fn new(fail_on: Option<String>) -> Self {
            Self {
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                fail_on,
            }
        }
    }

    #[async_trait]
    impl LayerFetcher for SlowFetcher {
        async fn fetch(&self, granule: &GranuleRef) -> Result<LayerOutcome> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let day = granule.acq1().format("%d").to_string();
            let delay = 40 - day.parse::<u64>().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail_on.as_deref() == Some(granule.url()) {
                return Err(CubeError::fetch(granule.url(), "boom"));
            }
            Ok(LayerOutcome::empty(granule.url(), EpsgCode(32628)))
        }
    }

    fn granules(n: u32) -> Vec<GranuleRef> {
        (1..=n)
            .map(|day| {
                GranuleRef::parse(&format!(
                    "LC08_L1TP_011002_201508{:02}_20170405_01_T1_X_LC08_L1TP_011002_20150701_20170406_01_T1_G0240V01_P038.nc",
                    day
                ))
                .unwrap()
            })
            .collect()
    }

    #[test]
    fn test_batches_are_lazy_chunks() {
        let scheduler = BatchScheduler::new(Arc::new(SlowFetcher::new(None)), 2, 1);
        let granules = granules(5);
        let batches: Vec<_> = scheduler.batches(&granules, 10).collect();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[1].offset, 12);
        assert_eq!(batches[2].granules.len(), 1);
        assert_eq!(batches[2].index, 2);
    }

    #[tokio::test]
    async fn test_outcomes_in_input_order() {
        let fetcher = Arc::new(SlowFetcher::new(None));
        let scheduler = BatchScheduler::new(fetcher.clone(), 8, 3);
        let granules = granules(8);
        let batch = scheduler.batches(&granules, 0).next().unwrap();

        let outcomes = scheduler.run_batch(&batch).await.unwrap();
        let urls: Vec<_> = outcomes.iter().map(|o| o.url.as_str()).collect();
        let expected: Vec<_> = granules.iter().map(|g| g.url()).collect();
        assert_eq!(urls, expected);
        assert!(fetcher.peak.load(Ordering::SeqCst) <= 3);
    }

    #[test]
    fn test_single_worker_runs_sequentially() {
        let fetcher = Arc::new(SlowFetcher::new(None));
        let scheduler = BatchScheduler::new(fetcher.clone(), 0, 0);
        assert_eq!((scheduler.batch_size(), scheduler.workers()), (1, 1));

        let granules = granules(3);
        let batches: Vec<_> = scheduler.batches(&granules, 0).collect();
        for batch in &batches {
            let outcomes = tokio_test::block_on(scheduler.run_batch(batch)).unwrap();
            assert_eq!(outcomes.len(), 1);
        }
        assert_eq!(fetcher.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_first_error_fails_batch() {
        let granules = granules(4);
        let fetcher = Arc::new(SlowFetcher::new(Some(granules[2].url().to_string())));
        let scheduler = BatchScheduler::new(fetcher, 4, 2);
        let batch = scheduler.batches(&granules, 0).next().unwrap();
        assert!(matches!(
            scheduler.run_batch(&batch).await,
            Err(CubeError::Fetch { .. })
        ));
    }
}

//! End-of-run statistics.

use std::fmt;
use std::time::Duration;

use cube_common::EpsgCode;
use serde::Serialize;
use tracing::info;

use crate::skip::{SkipReason, SkipRegistry};

/// Counts for one run of the builder.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    /// Identifiers considered, after `max_granules` truncation
    pub num_candidates: usize,
    pub num_written: usize,
    pub num_batches: usize,
    pub num_empty: usize,
    pub num_wrong_projection: usize,
    pub num_doubles: usize,
    /// Offending projections with their granule counts, sorted by code
    pub wrong_projections: Vec<(EpsgCode, usize)>,
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn new(
        num_candidates: usize,
        num_written: usize,
        num_batches: usize,
        skipped: &SkipRegistry,
        elapsed: Duration,
    ) -> Self {
        Self {
            num_candidates,
            num_written,
            num_batches,
            num_empty: skipped.count(SkipReason::Empty),
            num_wrong_projection: skipped.count(SkipReason::WrongProjection),
            num_doubles: skipped.count(SkipReason::Double),
            wrong_projections: skipped
                .wrong_projection()
                .iter()
                .map(|(code, urls)| (*code, urls.len()))
                .collect(),
            elapsed,
        }
    }

    /// Share of candidates, in percent; 0 when there were none.
    pub fn percent(&self, count: usize) -> f64 {
        if self.num_candidates == 0 {
            0.0
        } else {
            100.0 * count as f64 / self.num_candidates as f64
        }
    }

    pub fn log(&self) {
        info!(
            candidates = self.num_candidates,
            written = self.num_written,
            batches = self.num_batches,
            empty = self.num_empty,
            empty_pct = self.percent(self.num_empty),
            wrong_projection = self.num_wrong_projection,
            wrong_projection_pct = self.percent(self.num_wrong_projection),
            doubles = self.num_doubles,
            doubles_pct = self.percent(self.num_doubles),
            elapsed_secs = self.elapsed.as_secs_f64(),
            "Cube run complete"
        );
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Layers written: {} of {} candidates in {} batches ({:.1}s)",
            self.num_written,
            self.num_candidates,
            self.num_batches,
            self.elapsed.as_secs_f64()
        )?;
        writeln!(f, "Skipped granules:")?;
        writeln!(
            f,
            "      empty data       : {} ({:.2}%)",
            self.num_empty,
            self.percent(self.num_empty)
        )?;
        writeln!(
            f,
            "      wrong projection : {} ({:.2}%)",
            self.num_wrong_projection,
            self.percent(self.num_wrong_projection)
        )?;
        write!(
            f,
            "      double mid_date  : {} ({:.2}%)",
            self.num_doubles,
            self.percent(self.num_doubles)
        )?;
        if !self.wrong_projections.is_empty() {
            let codes: Vec<String> = self
                .wrong_projections
                .iter()
                .map(|(code, n)| format!("{} ({})", code, n))
                .collect();
            write!(f, "\n      wrong projections: {}", codes.join(", "))?;
        }
        Ok(())
    }
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }
}

//! Granules left out of the cube, by reason.

use std::collections::BTreeMap;

use cube_common::EpsgCode;
use metrics::counter;

/// Why a granule was not written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No valid velocity inside the region
    Empty,
    /// Projection or grid differs from the cube's
    WrongProjection,
    /// Older processing of an observation already kept
    Double,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Empty => "empty",
            SkipReason::WrongProjection => "wrong_projection",
            SkipReason::Double => "double",
        }
    }
}

/// Skipped granule URLs for one run.
#[derive(Debug, Clone, Default)]
pub struct SkipRegistry {
    empty: Vec<String>,
    wrong_projection: BTreeMap<EpsgCode, Vec<String>>,
    doubles: Vec<String>,
}

impl SkipRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_empty(&mut self, url: impl Into<String>) {
        counter!("cube_granules_skipped_total", "reason" => SkipReason::Empty.as_str())
            .increment(1);
        self.empty.push(url.into());
    }

    pub fn record_wrong_projection(&mut self, epsg: EpsgCode, url: impl Into<String>) {
        counter!("cube_granules_skipped_total", "reason" => SkipReason::WrongProjection.as_str())
            .increment(1);
        self.wrong_projection.entry(epsg).or_default().push(url.into());
    }

    pub fn record_doubles<I>(&mut self, urls: I)
    where
        I: IntoIterator<Item = String>,
    {
        let before = self.doubles.len();
        self.doubles.extend(urls);
        counter!("cube_granules_skipped_total", "reason" => SkipReason::Double.as_str())
            .increment((self.doubles.len() - before) as u64);
    }

    pub fn empty(&self) -> &[String] {
        &self.empty
    }

    /// Wrong-projection URLs grouped by the granule's EPSG code.
    pub fn wrong_projection(&self) -> &BTreeMap<EpsgCode, Vec<String>> {
        &self.wrong_projection
    }

    pub fn doubles(&self) -> &[String] {
        &self.doubles
    }

    pub fn wrong_projection_count(&self) -> usize {
        self.wrong_projection.values().map(Vec::len).sum()
    }

    pub fn count(&self, reason: SkipReason) -> usize {
        match reason {
            SkipReason::Empty => self.empty.len(),
            SkipReason::WrongProjection => self.wrong_projection_count(),
            SkipReason::Double => self.doubles.len(),
        }
    }

    pub fn total(&self) -> usize {
        self.empty.len() + self.wrong_projection_count() + self.doubles.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_by_reason() {
        let mut skipped = SkipRegistry::new();
        skipped.record_empty("a.nc");
        skipped.record_wrong_projection(EpsgCode(32627), "b.nc");
        skipped.record_wrong_projection(EpsgCode(32627), "c.nc");
        skipped.record_wrong_projection(EpsgCode(3413), "d.nc");
        skipped.record_doubles(vec!["e.nc".to_string()]);

        assert_eq!(skipped.count(SkipReason::Empty), 1);
        assert_eq!(skipped.count(SkipReason::WrongProjection), 3);
        assert_eq!(skipped.count(SkipReason::Double), 1);
        assert_eq!(skipped.total(), 5);

        let codes: Vec<u32> = skipped.wrong_projection().keys().map(|c| c.0).collect();
        assert_eq!(codes, vec![3413, 32627]);
    }
}

//! Granule identifiers and duplicate resolution.
//!
//! ITS_LIVE granule names carry both images' acquisition and processing
//! dates:
//!
//! ```text
//! LC08_L1TP_011002_20150821_20170405_01_T1_X_LC08_L1TP_011002_20150720_20170406_01_T1_G0240V01_P038.nc
//!                  ^acq1    ^proc1                          ^acq2    ^proc2
//! ```
//!
//! Two granules with the same acquisition pair are the same observation
//! processed at different times; only one of them may enter the cube.

use std::collections::HashMap;

use chrono::NaiveDate;
use cube_common::{parse_compact_date, MidDate};
use tracing::debug;

use crate::error::{CubeError, Result};

const ACQ1_TOKEN: usize = 3;
const PROC1_TOKEN: usize = 4;
const ACQ2_TOKEN: usize = 11;
const PROC2_TOKEN: usize = 12;

/// A granule identifier with the dates parsed from its file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GranuleRef {
    url: String,
    acq1: NaiveDate,
    proc1: NaiveDate,
    acq2: NaiveDate,
    proc2: NaiveDate,
    mid_date: MidDate,
}

impl GranuleRef {
    /// Parse the dates out of a URL or path's file name.
    pub fn parse(url: &str) -> Result<Self> {
        let name = url.rsplit('/').next().unwrap_or(url);
        let tokens: Vec<&str> = name.split('_').collect();
        if tokens.len() <= PROC2_TOKEN {
            return Err(CubeError::invalid_name(
                url,
                format!(
                    "expected at least {} '_'-separated fields, found {}",
                    PROC2_TOKEN + 1,
                    tokens.len()
                ),
            ));
        }

        let date = |index: usize| {
            parse_compact_date(tokens[index])
                .map_err(|e| CubeError::invalid_name(url, format!("field {}: {}", index, e)))
        };

        let acq1 = date(ACQ1_TOKEN)?;
        let proc1 = date(PROC1_TOKEN)?;
        let acq2 = date(ACQ2_TOKEN)?;
        let proc2 = date(PROC2_TOKEN)?;

        Ok(Self {
            url: url.to_string(),
            acq1,
            proc1,
            acq2,
            proc2,
            mid_date: MidDate::from_acquisitions(acq1, acq2),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn acq1(&self) -> NaiveDate {
        self.acq1
    }

    pub fn proc1(&self) -> NaiveDate {
        self.proc1
    }

    pub fn acq2(&self) -> NaiveDate {
        self.acq2
    }

    pub fn proc2(&self) -> NaiveDate {
        self.proc2
    }

    pub fn mid_date(&self) -> MidDate {
        self.mid_date
    }

    /// Acquisition pair identifying the observation.
    pub fn pair(&self) -> (NaiveDate, NaiveDate) {
        (self.acq1, self.acq2)
    }

    /// True when `self` was processed no earlier than `other` for both
    /// images.
    fn supersedes(&self, other: &GranuleRef) -> bool {
        self.proc1 >= other.proc1 && self.proc2 >= other.proc2
    }
}

/// Outcome of duplicate resolution.
#[derive(Debug, Clone, Default)]
pub struct ResolvedGranules {
    /// One granule per observation, in first-seen order
    pub granules: Vec<GranuleRef>,
    /// Identifiers considered (after any `max_granules` truncation)
    pub num_candidates: usize,
    /// Identifiers dropped as older duplicates
    pub skipped_doubles: Vec<String>,
}

/// Single-pass duplicate resolver keyed by mid-point.
#[derive(Debug, Default)]
pub struct GranuleIndex {
    kept: Vec<GranuleRef>,
    slots: HashMap<MidDate, usize>,
    doubles: Vec<String>,
    seen: usize,
}

impl GranuleIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a whole list, optionally keeping only the first
    /// `max_granules` identifiers.
    pub fn resolve<I, S>(urls: I, max_granules: Option<usize>) -> Result<ResolvedGranules>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut index = Self::new();
        let limit = max_granules.unwrap_or(usize::MAX);
        for url in urls.into_iter().take(limit) {
            index.insert(GranuleRef::parse(url.as_ref())?)?;
        }
        Ok(index.finish())
    }

    /// Add one granule.
    ///
    /// A granule whose mid-point is already taken by a different acquisition
    /// pair is an error. For the same pair, the newcomer replaces the kept
    /// granule in place only if it supersedes it; otherwise it is dropped.
    pub fn insert(&mut self, granule: GranuleRef) -> Result<()> {
        self.seen += 1;

        let Some(&slot) = self.slots.get(&granule.mid_date) else {
            self.slots.insert(granule.mid_date, self.kept.len());
            self.kept.push(granule);
            return Ok(());
        };

        let kept = &mut self.kept[slot];
        if kept.pair() != granule.pair() {
            return Err(CubeError::inconsistent(format!(
                "mid_date {} is shared by {} and {} with different acquisition dates",
                granule.mid_date, kept.url, granule.url
            )));
        }

        let loser = if granule.supersedes(kept) {
            std::mem::replace(kept, granule)
        } else {
            granule
        };
        debug!(url = %loser.url, "Skipping older duplicate granule");
        self.doubles.push(loser.url);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.kept.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kept.is_empty()
    }

    pub fn finish(self) -> ResolvedGranules {
        ResolvedGranules {
            granules: self.kept,
            num_candidates: self.seen,
            skipped_doubles: self.doubles,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAME: &str = "LC08_L1TP_011002_20150821_20170405_01_T1_X_LC08_L1TP_011002_20150720_20170406_01_T1_G0240V01_P038.nc";

    fn name(acq1: &str, proc1: &str, acq2: &str, proc2: &str) -> String {
        format!(
            "LC08_L1TP_011002_{}_{}_01_T1_X_LC08_L1TP_011002_{}_{}_01_T1_G0240V01_P038.nc",
            acq1, proc1, acq2, proc2
        )
    }

    #[test]
    fn test_parse_dates_and_mid_date() {
        let g = GranuleRef::parse(&format!("https://its-live-data.s3.amazonaws.com/velocity_image_pair/{}", NAME)).unwrap();
        assert_eq!(g.acq1(), NaiveDate::from_ymd_opt(2015, 8, 21).unwrap());
        assert_eq!(g.proc1(), NaiveDate::from_ymd_opt(2017, 4, 5).unwrap());
        assert_eq!(g.acq2(), NaiveDate::from_ymd_opt(2015, 7, 20).unwrap());
        assert_eq!(g.proc2(), NaiveDate::from_ymd_opt(2017, 4, 6).unwrap());

        // 2015-07-20 + 16 days + 32 ms
        let expected = MidDate::from_center("20150805", 32.0).unwrap();
        assert_eq!(g.mid_date(), expected);
    }

    #[test]
    fn test_odd_separation_lands_on_noon() {
        let g = GranuleRef::parse(&name("20150822", "20170405", "20150720", "20170406")).unwrap();
        let dt = g.mid_date().to_datetime().unwrap();
        assert_eq!(dt.format("%Y-%m-%d %H:%M:%S%.3f").to_string(), "2015-08-05 12:00:00.033");
    }

    #[test]
    fn test_parse_rejects_malformed_names() {
        assert!(matches!(
            GranuleRef::parse("short_name.nc"),
            Err(CubeError::InvalidGranuleName { .. })
        ));
        assert!(matches!(
            GranuleRef::parse(&name("2015AB21", "20170405", "20150720", "20170406")),
            Err(CubeError::InvalidGranuleName { .. })
        ));
    }

    #[test]
    fn test_newer_duplicate_replaces_in_place() {
        let a = name("20150821", "20170405", "20150720", "20170406");
        let other = name("20160821", "20170405", "20160720", "20170406");
        let b = name("20150821", "20180101", "20150720", "20180101");

        let resolved = GranuleIndex::resolve([&a, &other, &b], None).unwrap();
        let urls: Vec<&str> = resolved.granules.iter().map(|g| g.url()).collect();
        assert_eq!(urls, vec![b.as_str(), other.as_str()]);
        assert_eq!(resolved.skipped_doubles, vec![a]);
        assert_eq!(resolved.num_candidates, 3);
    }

    #[test]
    fn test_older_duplicate_is_dropped() {
        let a = name("20150821", "20180101", "20150720", "20180101");
        let b = name("20150821", "20170405", "20150720", "20170406");
        let resolved = GranuleIndex::resolve([&a, &b], None).unwrap();
        assert_eq!(resolved.granules.len(), 1);
        assert_eq!(resolved.granules[0].url(), a);
        assert_eq!(resolved.skipped_doubles, vec![b]);
    }

    #[test]
    fn test_mixed_processing_dates_keep_incumbent() {
        // Newer proc1 but older proc2: neither supersedes the other
        let a = name("20150821", "20170405", "20150720", "20170406");
        let b = name("20150821", "20180101", "20150720", "20170101");
        let resolved = GranuleIndex::resolve([&a, &b], None).unwrap();
        assert_eq!(resolved.granules[0].url(), a);

        let resolved = GranuleIndex::resolve([&b, &a], None).unwrap();
        assert_eq!(resolved.granules[0].url(), b);
    }

    #[test]
    fn test_different_pair_at_same_mid_date_is_inconsistent() {
        let a = GranuleRef::parse(&name("20150821", "20170405", "20150720", "20170406")).unwrap();
        let mut b = GranuleRef::parse(&name("20160821", "20170405", "20160720", "20170406")).unwrap();
        b.mid_date = a.mid_date;

        let mut index = GranuleIndex::new();
        index.insert(a).unwrap();
        assert!(matches!(index.insert(b), Err(CubeError::Inconsistent(_))));
    }

    #[test]
    fn test_max_granules_truncates_before_resolution() {
        let a = name("20150821", "20170405", "20150720", "20170406");
        let b = name("20150821", "20180101", "20150720", "20180101");
        let resolved = GranuleIndex::resolve([&a, &b], Some(1)).unwrap();
        assert_eq!(resolved.num_candidates, 1);
        assert_eq!(resolved.granules[0].url(), a);
        assert!(resolved.skipped_doubles.is_empty());
    }
}

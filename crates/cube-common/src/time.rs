//! Time handling for image-pair acquisitions and cube time slices.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CommonError, CommonResult};

/// Date format of acquisition and processing dates in granule names and
/// in `img_pair_info.date_center`.
pub const COMPACT_DATE_FORMAT: &str = "%Y%m%d";

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Parse a compact "YYYYMMDD" date.
pub fn parse_compact_date(s: &str) -> CommonResult<NaiveDate> {
    NaiveDate::parse_from_str(s, COMPACT_DATE_FORMAT)
        .map_err(|_| CommonError::invalid_date(s, COMPACT_DATE_FORMAT))
}

/// Convert milliseconds since the Unix epoch back to a UTC timestamp.
pub fn millis_to_datetime(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

fn date_to_millis(date: NaiveDate) -> i64 {
    Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN))
        .timestamp_millis()
}

/// Mid-point timestamp of an image pair, stored as milliseconds since
/// 1970-01-01 UTC.
///
/// The day separation is folded in as extra milliseconds so pairs with the
/// same center date but different separations stay distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MidDate(i64);

impl MidDate {
    pub fn from_millis(millis: i64) -> Self {
        MidDate(millis)
    }

    pub fn millis(&self) -> i64 {
        self.0
    }

    /// Mid-point derived from the acquisition dates in a granule name.
    ///
    /// `acq2 + separation / 2 days + separation milliseconds`, where
    /// `separation = acq1 - acq2` in whole days. Odd separations land on
    /// 12:00.
    pub fn from_acquisitions(acq1: NaiveDate, acq2: NaiveDate) -> Self {
        let separation_days = (acq1 - acq2).num_days();
        let millis = date_to_millis(acq2) + separation_days * (MILLIS_PER_DAY / 2) + separation_days;
        MidDate(millis)
    }

    /// Mid-point recorded inside a granule: `date_center` plus `date_dt`
    /// (day separation) truncated to whole milliseconds.
    pub fn from_center(date_center: &str, date_dt: f64) -> CommonResult<Self> {
        let center = parse_compact_date(date_center)?;
        Ok(MidDate(date_to_millis(center) + date_dt.trunc() as i64))
    }

    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        millis_to_datetime(self.0)
    }
}

impl fmt::Display for MidDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime() {
            Some(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S%.3f")),
            None => write!(f, "{}ms", self.0),
        }
    }
}

impl From<MidDate> for i64 {
    fn from(value: MidDate) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_parse_compact_date() {
        let d = parse_compact_date("20150821").unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2015, 8, 21).unwrap());
        assert!(parse_compact_date("2015-08-21").is_err());
        assert!(parse_compact_date("20151321").is_err());
    }

    #[test]
    fn test_mid_date_even_separation() {
        let acq1 = NaiveDate::from_ymd_opt(2015, 8, 21).unwrap();
        let acq2 = NaiveDate::from_ymd_opt(2015, 7, 20).unwrap();
        // 32 days apart: 16 days after acq2 plus 32 ms
        let mid = MidDate::from_acquisitions(acq1, acq2);
        let expected = date_to_millis(NaiveDate::from_ymd_opt(2015, 8, 5).unwrap()) + 32;
        assert_eq!(mid.millis(), expected);
    }

    #[test]
    fn test_mid_date_odd_separation_keeps_half_day() {
        let acq1 = NaiveDate::from_ymd_opt(2020, 1, 4).unwrap();
        let acq2 = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let mid = MidDate::from_acquisitions(acq1, acq2).to_datetime().unwrap();
        assert_eq!(mid.date_naive(), NaiveDate::from_ymd_opt(2020, 1, 2).unwrap());
        assert_eq!(mid.hour(), 12);
        assert_eq!(mid.timestamp_subsec_millis(), 3);
    }

    #[test]
    fn test_mid_date_from_center() {
        let mid = MidDate::from_center("20150805", 32.0).unwrap();
        let expected = date_to_millis(NaiveDate::from_ymd_opt(2015, 8, 5).unwrap()) + 32;
        assert_eq!(mid.millis(), expected);

        // Fractional separations truncate
        let mid = MidDate::from_center("20150805", 15.9).unwrap();
        assert_eq!(mid.millis() % 1000, 15);
    }
}

//! Granule names, URLs and regions used across the test suite.

/// A real ITS_LIVE Landsat 8 granule name.
pub const LANDSAT_GRANULE: &str = "LC08_L1TP_011002_20150821_20170405_01_T1_X_LC08_L1TP_011002_20150720_20170406_01_T1_G0240V01_P038.nc";

/// Public bucket prefix ITS_LIVE granules are served from.
pub const ITS_LIVE_HTTP_PREFIX: &str =
    "https://its-live-data.jpl.nasa.gov.s3.amazonaws.com/velocity_image_pair/landsat/v00.0/32628";

/// Granule name with the given `%Y%m%d` dates in fields 3, 4, 11 and 12.
///
/// ```
/// use test_utils::granule_name;
///
/// let name = granule_name("20200110", "20200201", "20200101", "20200201");
/// assert_eq!(name.split('_').nth(3), Some("20200110"));
/// ```
pub fn granule_name(acq1: &str, proc1: &str, acq2: &str, proc2: &str) -> String {
    format!(
        "LC08_L1TP_011002_{}_{}_01_T1_X_LC08_L1TP_011002_{}_{}_01_T1_G0240V01_P038.nc",
        acq1, proc1, acq2, proc2
    )
}

/// `granule_name` under [`ITS_LIVE_HTTP_PREFIX`].
pub fn granule_url(acq1: &str, proc1: &str, acq2: &str, proc2: &str) -> String {
    format!(
        "{}/{}",
        ITS_LIVE_HTTP_PREFIX,
        granule_name(acq1, proc1, acq2, proc2)
    )
}

/// Two processings of the same image pair; B is newer on both images.
pub mod scenario {
    use super::granule_name;

    pub fn older() -> String {
        granule_name("20200110", "20200201", "20200101", "20200201")
    }

    pub fn newer() -> String {
        granule_name("20200110", "20200205", "20200101", "20200205")
    }
}

/// Regions of interest, `(min_x, min_y, max_x, max_y)`.
pub mod region {
    /// 100 km square in EPSG:32628 around (487462, 9016243)
    pub const SVALBARD_32628: (f64, f64, f64, f64) = (437462.0, 8966243.0, 537462.0, 9066243.0);

    /// Region matching the default synthetic granule footprint
    /// (x 400000..400720, y 7099520..7100000).
    pub const SYNTHETIC_32628: (f64, f64, f64, f64) = (400_000.0, 7_099_520.0, 400_720.0, 7_100_000.0);
}

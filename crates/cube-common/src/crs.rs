//! EPSG projection codes used by velocity granules and cubes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CommonError;

/// Numeric EPSG code of a projected or geographic CRS.
///
/// Granules are delivered in WGS84 / UTM zones (326xx north, 327xx south)
/// or in the polar stereographic projections (3413 north, 3031 south).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EpsgCode(pub u32);

/// Hemisphere of a UTM zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hemisphere {
    North,
    South,
}

/// Projection families the workspace can reason about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionKind {
    /// WGS84 geographic lon/lat
    Geographic,
    /// WGS84 / UTM zone
    Utm { zone: u8, hemisphere: Hemisphere },
    /// NSIDC Sea Ice Polar Stereographic North
    PolarNorth,
    /// Antarctic Polar Stereographic
    PolarSouth,
    Other,
}

impl EpsgCode {
    pub const WGS84: EpsgCode = EpsgCode(4326);
    pub const POLAR_NORTH: EpsgCode = EpsgCode(3413);
    pub const POLAR_SOUTH: EpsgCode = EpsgCode(3031);

    pub fn code(&self) -> u32 {
        self.0
    }

    pub fn kind(&self) -> ProjectionKind {
        match self.0 {
            4326 => ProjectionKind::Geographic,
            3413 => ProjectionKind::PolarNorth,
            3031 => ProjectionKind::PolarSouth,
            c @ 32601..=32660 => ProjectionKind::Utm {
                zone: (c - 32600) as u8,
                hemisphere: Hemisphere::North,
            },
            c @ 32701..=32760 => ProjectionKind::Utm {
                zone: (c - 32700) as u8,
                hemisphere: Hemisphere::South,
            },
            _ => ProjectionKind::Other,
        }
    }

    /// "EPSG:<code>" form.
    pub fn to_authority_string(&self) -> String {
        format!("EPSG:{}", self.0)
    }
}

impl FromStr for EpsgCode {
    type Err = CommonError;

    /// Accepts "32628", "EPSG:32628" and "epsg:32628".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = match trimmed.split_once(':') {
            Some((authority, code)) if authority.eq_ignore_ascii_case("epsg") => code,
            Some(_) => return Err(CommonError::InvalidEpsg(s.to_string())),
            None => trimmed,
        };

        digits
            .parse::<u32>()
            .map(EpsgCode)
            .map_err(|_| CommonError::InvalidEpsg(s.to_string()))
    }
}

impl From<u32> for EpsgCode {
    fn from(code: u32) -> Self {
        EpsgCode(code)
    }
}

/// Displays the bare numeric code, the form written to cube attributes.
impl fmt::Display for EpsgCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

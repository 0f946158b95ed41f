//! Bounding box types and operations.

use serde::{Deserialize, Serialize};

use crate::error::{CommonError, CommonResult};

/// A projected bounding box, in the units of the cube projection (meters).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// Create a new bounding box from corner coordinates.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Square box of `2 * half_size` around a center point.
    pub fn from_center(center_x: f64, center_y: f64, half_size: f64) -> Self {
        Self::new(
            center_x - half_size,
            center_y - half_size,
            center_x + half_size,
            center_y + half_size,
        )
    }

    /// Parse a "minx,miny,maxx,maxy" string.
    pub fn from_bbox_string(s: &str) -> CommonResult<Self> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(CommonError::InvalidBbox(format!(
                "{}. Expected 'minx,miny,maxx,maxy'",
                s
            )));
        }

        let mut values = [0.0f64; 4];
        for (slot, part) in values.iter_mut().zip(&parts) {
            *slot = part
                .parse()
                .map_err(|_| CommonError::InvalidBbox(format!("invalid number '{}'", part)))?;
        }

        let bbox = Self::new(values[0], values[1], values[2], values[3]);
        bbox.validate()?;
        Ok(bbox)
    }

    /// Bounds of a polygon given as (x, y) vertices.
    ///
    /// Only the extremes are used: the region filter is rectangular.
    pub fn from_polygon(points: &[(f64, f64)]) -> CommonResult<Self> {
        if points.len() < 3 {
            return Err(CommonError::InvalidPolygon(format!(
                "need at least 3 vertices, got {}",
                points.len()
            )));
        }

        let mut bbox = Self::new(f64::MAX, f64::MAX, f64::MIN, f64::MIN);
        for &(x, y) in points {
            if !x.is_finite() || !y.is_finite() {
                return Err(CommonError::InvalidPolygon(format!(
                    "non-finite vertex ({}, {})",
                    x, y
                )));
            }
            bbox.min_x = bbox.min_x.min(x);
            bbox.min_y = bbox.min_y.min(y);
            bbox.max_x = bbox.max_x.max(x);
            bbox.max_y = bbox.max_y.max(y);
        }

        bbox.validate()?;
        Ok(bbox)
    }

    /// Reject degenerate or inverted boxes.
    pub fn validate(&self) -> CommonResult<()> {
        if !(self.min_x < self.max_x && self.min_y < self.max_y) {
            return Err(CommonError::InvalidBbox(format!(
                "empty or inverted box {:?}",
                self
            )));
        }
        Ok(())
    }

    /// Width of the bounding box in coordinate units.
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Height of the bounding box in coordinate units.
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Check if a point is contained within this bbox (edges included).
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        self.contains_x(x) && self.contains_y(y)
    }

    pub fn contains_x(&self, x: f64) -> bool {
        x >= self.min_x && x <= self.max_x
    }

    pub fn contains_y(&self, y: f64) -> bool {
        y >= self.min_y && y <= self.max_y
    }

    /// Closed ring of the box corners, starting top-left and going clockwise.
    pub fn to_polygon(&self) -> Vec<(f64, f64)> {
        vec![
            (self.min_x, self.max_y),
            (self.max_x, self.max_y),
            (self.max_x, self.min_y),
            (self.min_x, self.min_y),
            (self.min_x, self.max_y),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bbox_string() {
        let bbox = BoundingBox::from_bbox_string("437462,8966243,537462,9066243").unwrap();
        assert_eq!(bbox.min_x, 437462.0);
        assert_eq!(bbox.min_y, 8966243.0);
        assert_eq!(bbox.max_x, 537462.0);
        assert_eq!(bbox.max_y, 9066243.0);
    }

    #[test]
    fn test_from_center_matches_polygon() {
        let bbox = BoundingBox::from_center(487462.0, 9016243.0, 50000.0);
        let from_ring = BoundingBox::from_polygon(&bbox.to_polygon()).unwrap();
        assert_eq!(bbox, from_ring);
    }

    #[test]
    fn test_edges_are_inclusive() {
        let bbox = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        assert!(bbox.contains_point(0.0, 10.0));
        assert!(bbox.contains_point(10.0, 0.0));
        assert!(!bbox.contains_point(10.0001, 5.0));
    }
}

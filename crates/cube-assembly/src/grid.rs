//! The cube's fixed x/y lattice and placement of layers onto it.

use cube_common::BoundingBox;

use crate::layer::Layer;

/// Relative tolerance for comparing grid steps and lattice offsets.
const LATTICE_TOLERANCE: f64 = 1e-6;

/// One coordinate axis: its values and the signed step between them.
#[derive(Debug, Clone, PartialEq)]
pub struct Axis {
    values: Vec<f64>,
    step: Option<f64>,
}

impl Axis {
    /// Axis from stored coordinate values. A single value has no step.
    pub fn from_values(values: Vec<f64>) -> Self {
        let step = match values.as_slice() {
            [a, b, ..] if a != b => Some(b - a),
            _ => None,
        };
        Self { values, step }
    }

    /// Every lattice point `anchor + k * step` inside `[min, max]`, ordered
    /// in the direction of `step`.
    pub fn snapped(anchor: f64, step: f64, min: f64, max: f64) -> Self {
        let size = step.abs();
        let k_min = ((min - anchor) / size - LATTICE_TOLERANCE).ceil() as i64;
        let k_max = ((max - anchor) / size + LATTICE_TOLERANCE).floor() as i64;

        let mut values: Vec<f64> = (k_min..=k_max).map(|k| anchor + k as f64 * size).collect();
        if step < 0.0 {
            values.reverse();
        }
        Self {
            values,
            step: Some(step),
        }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Index of `value` on the axis, if it is a lattice point.
    fn locate(&self, value: f64) -> Option<usize> {
        let first = *self.values.first()?;
        match self.step {
            Some(step) => {
                let k = (value - first) / step;
                let index = k.round();
                if (k - index).abs() > LATTICE_TOLERANCE || index < 0.0 {
                    return None;
                }
                let index = index as usize;
                (index < self.values.len()).then_some(index)
            }
            None => ((value - first).abs() <= LATTICE_TOLERANCE * first.abs().max(1.0)).then_some(0),
        }
    }

    /// Offset of a run of layer coordinates on this axis. The run must be
    /// contiguous lattice points with the axis' step.
    fn place(&self, coords: &[f64], layer_step: f64) -> Option<usize> {
        if let Some(step) = self.step {
            if (layer_step - step).abs() > LATTICE_TOLERANCE * step.abs() {
                return None;
            }
        }
        let start = self.locate(*coords.first()?)?;
        for (i, &c) in coords.iter().enumerate().skip(1) {
            if self.locate(c)? != start + i {
                return None;
            }
        }
        Some(start)
    }
}

/// Where a layer's cropped raster sits in the cube grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub row: usize,
    pub col: usize,
}

/// The cube's spatial grid, fixed for the lifetime of the store.
#[derive(Debug, Clone, PartialEq)]
pub struct CubeGrid {
    x: Axis,
    y: Axis,
}

impl CubeGrid {
    /// Grid of an existing store.
    pub fn from_coords(x: Vec<f64>, y: Vec<f64>) -> Self {
        Self {
            x: Axis::from_values(x),
            y: Axis::from_values(y),
        }
    }

    /// Grid covering `region` on the lattice of `layer`.
    pub fn from_layer(region: &BoundingBox, layer: &Layer) -> Self {
        let (dx, dy) = layer.spacing;
        let x0 = layer.x.first().copied().unwrap_or(region.min_x);
        let y0 = layer.y.first().copied().unwrap_or(region.max_y);
        Self {
            x: Axis::snapped(x0, dx, region.min_x, region.max_x),
            y: Axis::snapped(y0, dy, region.min_y, region.max_y),
        }
    }

    pub fn x(&self) -> &[f64] {
        self.x.values()
    }

    pub fn y(&self) -> &[f64] {
        self.y.values()
    }

    pub fn width(&self) -> usize {
        self.x.len()
    }

    pub fn height(&self) -> usize {
        self.y.len()
    }

    /// Cells in one time slice.
    pub fn cells(&self) -> usize {
        self.width() * self.height()
    }

    /// Position of `layer` in the grid, or None if its lattice differs.
    pub fn placement(&self, layer: &Layer) -> Option<Placement> {
        let col = self.x.place(&layer.x, layer.spacing.0)?;
        let row = self.y.place(&layer.y, layer.spacing.1)?;
        Some(Placement { row, col })
    }

    /// Copy a layer raster into a full-grid slice, converting NaN to `fill`.
    pub fn paint(&self, slice: &mut [f32], placement: Placement, data: &[f32], width: usize, fill: f32) {
        let nx = self.width();
        for (r, row) in data.chunks(width).enumerate() {
            let start = (placement.row + r) * nx + placement.col;
            for (dst, &src) in slice[start..start + row.len()].iter_mut().zip(row) {
                *dst = if src.is_nan() { fill } else { src };
            }
        }
    }
}

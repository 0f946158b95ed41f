//! Folds the layers of one batch into a table for the store.

use std::collections::HashSet;

use cube_common::{BoundingBox, EpsgCode};
use cube_store::{BatchTable, GridColumn, SeriesColumn, SliceRecord};
use serde_json::Map;
use tracing::{debug, warn};

use crate::error::{CubeError, Result};
use crate::fetcher::LayerOutcome;
use crate::grid::{CubeGrid, Placement};
use crate::layer::Layer;
use crate::schema;
use crate::skip::SkipRegistry;

/// Per-run state the accumulator reads and updates.
#[derive(Debug)]
pub struct CubeState {
    pub projection: EpsgCode,
    pub region: BoundingBox,
    /// Fixed by the first accepted layer, or by an existing store
    pub grid: Option<CubeGrid>,
    /// `mid_date` values already in the store
    pub written: HashSet<i64>,
    pub skipped: SkipRegistry,
}

impl CubeState {
    pub fn new(projection: EpsgCode, region: BoundingBox) -> Self {
        Self {
            projection,
            region,
            grid: None,
            written: HashSet::new(),
            skipped: SkipRegistry::new(),
        }
    }
}

/// Layers accepted for one batch. Created per batch and consumed by
/// [`CubeAccumulator::combine`].
pub struct CubeAccumulator<'a> {
    state: &'a mut CubeState,
    capacity: usize,
    layers: Vec<(Layer, Placement)>,
}

impl<'a> CubeAccumulator<'a> {
    pub fn new(state: &'a mut CubeState, capacity: usize) -> Self {
        Self {
            state,
            capacity,
            layers: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Route one fetch outcome: hold an accepted layer, or record why it was
    /// skipped.
    pub fn add(&mut self, outcome: LayerOutcome) -> Result<()> {
        let LayerOutcome {
            url,
            projection,
            is_empty,
            layer,
            ..
        } = outcome;

        let Some(layer) = layer else {
            if is_empty {
                self.state.skipped.record_empty(url);
            } else {
                self.state.skipped.record_wrong_projection(projection, url);
            }
            return Ok(());
        };

        if self.layers.len() >= self.capacity {
            return Err(CubeError::inconsistent(format!(
                "batch already holds {} layers",
                self.capacity
            )));
        }

        let region = self.state.region;
        let grid = self
            .state
            .grid
            .get_or_insert_with(|| CubeGrid::from_layer(&region, &layer));
        match grid.placement(&layer) {
            Some(placement) => {
                self.layers.push((layer, placement));
            }
            None => {
                warn!(url = %layer.url, "Layer grid does not align with the cube grid");
                self.state
                    .skipped
                    .record_wrong_projection(layer.epsg, layer.url);
            }
        }
        Ok(())
    }

    /// Build the batch table in arrival order.
    ///
    /// Each grid variable is assembled in turn and every layer's copy of it
    /// is dropped as soon as it has been painted into the batch buffer.
    pub fn combine(self, is_first_write: bool) -> Result<BatchTable> {
        let Self { state, mut layers, .. } = self;
        let grid = match (&state.grid, layers.is_empty()) {
            (Some(grid), false) => grid.clone(),
            _ => return Err(CubeError::inconsistent("no accepted layers to combine")),
        };

        let mut mid_dates = Vec::with_capacity(layers.len());
        let mut seen = HashSet::with_capacity(layers.len());
        for (layer, _) in &layers {
            let t = layer.mid_date.millis();
            if state.written.contains(&t) || !seen.insert(t) {
                return Err(CubeError::inconsistent(format!(
                    "duplicate mid_date {} from {}",
                    layer.mid_date, layer.url
                )));
            }
            mid_dates.push(t);
        }

        let records = layers
            .iter()
            .map(|(layer, _)| {
                Ok(SliceRecord {
                    mid_date: layer.mid_date.millis(),
                    url: layer.url.clone(),
                    grid_mapping: layer.text_attribute(schema::V, schema::GRID_MAPPING)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut series = Vec::with_capacity(schema::SERIES.len());
        for spec in &schema::SERIES {
            let data = layers
                .iter()
                .map(|(layer, _)| {
                    layer
                        .attribute_or(spec.source, spec.attribute, spec.default)
                        .map(|v| v as f32)
                })
                .collect::<Result<Vec<_>>>()?;
            series.push(SeriesColumn {
                name: spec.name.to_string(),
                data,
                attrs: if is_first_write {
                    schema::series_attrs(spec.name)
                } else {
                    Map::new()
                },
            });
        }

        let encoding = schema::fill_encoding();
        let cells = grid.cells();
        let mut grids = Vec::with_capacity(schema::GRID_VARIABLES.len());
        for name in schema::GRID_VARIABLES {
            let fill = encoding.fill_value(name);
            let mut data = vec![fill; layers.len() * cells];
            let mut attrs = None;

            for (t, (layer, placement)) in layers.iter_mut().enumerate() {
                let width = layer.width();
                let Some(var) = layer.take_variable(name) else {
                    continue;
                };
                grid.paint(&mut data[t * cells..(t + 1) * cells], *placement, &var.data, width, fill);
                if is_first_write && t == 0 {
                    attrs = Some(var.attrs);
                }
            }

            debug!(variable = name, slices = layers.len(), "Combined grid variable");
            grids.push(GridColumn {
                name: name.to_string(),
                data,
                attrs: if is_first_write {
                    schema::grid_attrs(name, attrs.as_ref())
                } else {
                    Map::new()
                },
            });
        }
        drop(layers);

        Ok(BatchTable {
            mid_dates,
            x: grid.x().to_vec(),
            y: grid.y().to_vec(),
            grids,
            series,
            records,
            encoding: is_first_write.then_some(encoding),
            global_attrs: if is_first_write {
                schema::global_attrs(state.projection)
            } else {
                Map::new()
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cube_common::MidDate;
    use netcdf_parser::{AttrValue, Attributes, GridVariable};
    use std::collections::HashMap;

    fn state() -> CubeState {
        CubeState::new(EpsgCode(32628), BoundingBox::new(0.0, 0.0, 300.0, 300.0))
    }

    /// 2 x 2 layer at (100..200, 200..100), every raster filled with `value`.
    fn layer(url: &str, day: i64, value: f32) -> Layer {
        let mut variables = HashMap::new();
        for name in schema::GRID_VARIABLES {
            if name == schema::V_ERROR {
                continue;
            }
            let mut attrs = Attributes::new();
            match name {
                schema::V => {
                    attrs.insert("grid_mapping".into(), AttrValue::Text("UTM_Projection".into()));
                }
                schema::VX => {
                    attrs.insert("stable_count".into(), AttrValue::Number(42.0));
                    attrs.insert("stable_shift".into(), AttrValue::Number(0.5));
                }
                schema::VY => {
                    attrs.insert("stable_shift".into(), AttrValue::Number(-0.5));
                }
                _ => {}
            }
            variables.insert(name.to_string(), GridVariable::new(vec![value; 4], attrs));
        }
        Layer {
            url: url.into(),
            epsg: EpsgCode(32628),
            mid_date: MidDate::from_millis(day * 86_400_000),
            x: vec![100.0, 200.0],
            y: vec![200.0, 100.0],
            spacing: (100.0, -100.0),
            variables,
        }
    }

    #[test]
    fn test_routes_skips() {
        let mut state = state();
        let mut acc = CubeAccumulator::new(&mut state, 4);
        acc.add(LayerOutcome::empty("a.nc", EpsgCode(32628))).unwrap();
        acc.add(LayerOutcome::wrong_projection("b.nc", EpsgCode(32627)))
            .unwrap();
        acc.add(LayerOutcome::accepted(layer("c.nc", 1, 1.0))).unwrap();
        assert_eq!(acc.len(), 1);
        drop(acc);

        assert_eq!(state.skipped.empty(), &["a.nc".to_string()]);
        assert_eq!(
            state.skipped.wrong_projection()[&EpsgCode(32627)],
            vec!["b.nc".to_string()]
        );
        // grid snapped to the 0..300 region on the layer's lattice
        assert_eq!(state.grid.as_ref().unwrap().x(), &[0.0, 100.0, 200.0, 300.0]);
    }

    #[test]
    fn test_capacity_enforced() {
        let mut state = state();
        let mut acc = CubeAccumulator::new(&mut state, 1);
        acc.add(LayerOutcome::accepted(layer("a.nc", 1, 1.0))).unwrap();
        assert!(acc.add(LayerOutcome::accepted(layer("b.nc", 2, 1.0))).is_err());
        assert_eq!(acc.len(), 1);
    }

    #[test]
    fn test_combine_first_write() {
        let mut state = state();
        let mut acc = CubeAccumulator::new(&mut state, 2);
        acc.add(LayerOutcome::accepted(layer("a.nc", 3, 1.0))).unwrap();
        let mut second = layer("b.nc", 1, f32::NAN);
        second.variables.get_mut(schema::V).unwrap().data[0] = 7.0;
        acc.add(LayerOutcome::accepted(second)).unwrap();

        let table = acc.combine(true).unwrap();
        assert_eq!(table.mid_dates, vec![3 * 86_400_000, 86_400_000]);
        assert!(table.encoding.is_some());
        assert_eq!(table.global_attrs["title"], "ITS_LIVE datacube of velocity pairs");
        assert!(table.validate().is_ok());

        let v = table.grids.iter().find(|g| g.name == "v").unwrap();
        assert_eq!(v.data.len(), 2 * 16);
        // slice 0: outside the layer footprint is fill, inside is 1.0
        assert_eq!(v.data[0], schema::MISSING_VALUE);
        assert_eq!(v.data[1 * 4 + 1], 1.0);
        // slice 1: NaN became fill, the one valid cell is kept
        assert_eq!(v.data[16 + 5], 7.0);
        assert_eq!(v.data[16 + 6], schema::MISSING_VALUE);
        assert_eq!(v.attrs["description"], "velocity magnitude");

        // v_error absent from every layer: all fill
        let v_error = table.grids.iter().find(|g| g.name == "v_error").unwrap();
        assert!(v_error.data.iter().all(|&c| c == schema::MISSING_VALUE));

        // interp_mask has no fill value: NaN stays NaN
        let mask = table.grids.iter().find(|g| g.name == "interp_mask").unwrap();
        assert!(mask.data[0].is_nan());

        let count = table.series.iter().find(|s| s.name == "stable_count").unwrap();
        assert_eq!(count.data, vec![42.0, 42.0]);
        let vx_error = table.series.iter().find(|s| s.name == "vx_error").unwrap();
        assert_eq!(vx_error.data, vec![schema::MISSING_VALUE; 2]);
        let vy_shift = table.series.iter().find(|s| s.name == "vy_stable_shift").unwrap();
        assert_eq!(vy_shift.data, vec![-0.5, -0.5]);

        assert_eq!(table.records[1].url, "b.nc");
        assert_eq!(table.records[1].grid_mapping, "UTM_Projection");
    }

    #[test]
    fn test_combine_append_has_no_encoding() {
        let mut state = state();
        let mut acc = CubeAccumulator::new(&mut state, 1);
        acc.add(LayerOutcome::accepted(layer("a.nc", 3, 1.0))).unwrap();
        let table = acc.combine(false).unwrap();
        assert!(table.encoding.is_none());
        assert!(table.global_attrs.is_empty());
        assert!(table.grids.iter().all(|g| g.attrs.is_empty()));
    }

    #[test]
    fn test_required_attribute_missing() {
        let mut state = state();
        let mut acc = CubeAccumulator::new(&mut state, 1);
        let mut l = layer("a.nc", 3, 1.0);
        l.variables.get_mut(schema::VX).unwrap().attrs.remove("stable_count");
        acc.add(LayerOutcome::accepted(l)).unwrap();
        assert!(matches!(
            acc.combine(true),
            Err(CubeError::MissingAttribute { .. })
        ));
    }

    #[test]
    fn test_duplicate_mid_date_with_store() {
        let mut state = state();
        state.written.insert(3 * 86_400_000);
        let mut acc = CubeAccumulator::new(&mut state, 1);
        acc.add(LayerOutcome::accepted(layer("a.nc", 3, 1.0))).unwrap();
        assert!(matches!(acc.combine(false), Err(CubeError::Inconsistent(_))));
    }

    #[test]
    fn test_misaligned_layer_is_wrong_projection() {
        let mut state = state();
        let mut acc = CubeAccumulator::new(&mut state, 2);
        acc.add(LayerOutcome::accepted(layer("a.nc", 1, 1.0))).unwrap();
        let mut shifted = layer("b.nc", 2, 1.0);
        shifted.x = vec![150.0, 250.0];
        acc.add(LayerOutcome::accepted(shifted)).unwrap();
        assert_eq!(acc.len(), 1);
        drop(acc);
        assert_eq!(state.skipped.wrong_projection_count(), 1);
    }
}

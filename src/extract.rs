//! # Data Extraction
//!
//! Executes a planned selection against the store and assembles the result
//! into an `ndarray` slab with its coordinates.
//!
//! ## Key Components
//!
//! - [`Slab`]: extracted values plus one coordinate vector per dimension
//! - [`extract_artifact`]: reads the data of one planned artifact
//!
//! An axis selection may consist of several index runs (a longitude box
//! crossing the seam of the grid). Each combination of runs is read as one
//! hyper-rectangle and the blocks are concatenated back along their axis.

use crate::dataset::{LATITUDE, LEVEL, LONGITUDE, TIME};
use crate::plan::{FetchPlan, PlannedArtifact};
use crate::selection::AxisSelection;
use crate::store::{ArrayStore, StoreError, StoreResult};
use log::debug;
use ndarray::{ArrayD, Axis, IxDyn};
use std::ops::Range;

/// Values extracted for one artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct Slab {
    pub data: ArrayD<f32>,
    /// Dimension names in storage order
    pub dims: Vec<String>,
    /// Coordinate labels for each dimension
    pub coords: Vec<Vec<f64>>,
}

impl Slab {
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }
}

/// Reads the values of `artifact` as selected by `plan`.
pub fn extract_artifact(
    store: &dyn ArrayStore,
    plan: &FetchPlan,
    artifact: &PlannedArtifact,
) -> StoreResult<Slab> {
    let info = &artifact.info;
    let level = artifact
        .level
        .map(|l| AxisSelection::single(l.index, l.label));

    let mut selections = Vec::with_capacity(info.dimensions.len());
    for dim in &info.dimensions {
        let selection = match dim.as_str() {
            TIME => &plan.time,
            LATITUDE => &plan.latitude,
            LONGITUDE => &plan.longitude,
            LEVEL => level.as_ref().ok_or_else(|| StoreError::Metadata {
                array: info.name.clone(),
                message: "level dimension on a surface variable".to_string(),
            })?,
            other => {
                return Err(StoreError::Metadata {
                    array: info.name.clone(),
                    message: format!("unexpected dimension '{}'", other),
                });
            }
        };
        selections.push(selection);
    }

    let runs: Vec<Vec<Range<u64>>> = selections.iter().map(|s| s.runs.clone()).collect();
    debug!(
        "Extracting {} ({}) with runs {:?}",
        info.name,
        artifact.level_tag(),
        runs
    );

    let mut fixed = Vec::with_capacity(runs.len());
    let data = assemble(store, &info.name, &runs, &mut fixed)?;

    Ok(Slab {
        data,
        dims: info.dimensions.clone(),
        coords: selections.iter().map(|s| s.labels.clone()).collect(),
    })
}

/// Recursively reads every combination of runs and concatenates the blocks,
/// innermost dimension first.
fn assemble(
    store: &dyn ArrayStore,
    name: &str,
    runs: &[Vec<Range<u64>>],
    fixed: &mut Vec<Range<u64>>,
) -> StoreResult<ArrayD<f32>> {
    let depth = fixed.len();
    if depth == runs.len() {
        let shape: Vec<usize> = fixed.iter().map(|r| (r.end - r.start) as usize).collect();
        let values = store.read_subset(name, fixed)?;
        return ArrayD::from_shape_vec(IxDyn(&shape), values).map_err(|e| StoreError::Read {
            array: name.to_string(),
            message: e.to_string(),
        });
    }

    let mut blocks = Vec::with_capacity(runs[depth].len());
    for run in &runs[depth] {
        fixed.push(run.clone());
        let block = assemble(store, name, runs, fixed);
        fixed.pop();
        blocks.push(block?);
    }

    match blocks.len() {
        1 => Ok(blocks.remove(0)),
        _ => {
            let views: Vec<_> = blocks.iter().map(|b| b.view()).collect();
            ndarray::concatenate(Axis(depth), &views).map_err(|e| StoreError::Read {
                array: name.to_string(),
                message: e.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::Map;

    fn store_2d() -> MemoryStore {
        let mut store = MemoryStore::new("memory://extract");
        store.add_coordinate("latitude", vec![1.0, 0.0], None);
        store.add_coordinate("longitude", vec![0.0, 90.0, 180.0, 270.0], None);
        let data = (0..8).map(|v| v as f64).collect();
        store
            .add_variable("field", &["latitude", "longitude"], data, Map::new(), None)
            .unwrap();
        store
    }

    #[test]
    fn test_assemble_single_block() {
        let store = store_2d();
        let runs = vec![vec![0..2], vec![1..3]];
        let data = assemble(&store, "field", &runs, &mut Vec::new()).unwrap();
        assert_eq!(data.shape(), &[2, 2]);
        assert_eq!(data.iter().copied().collect::<Vec<_>>(), vec![1.0, 2.0, 5.0, 6.0]);
    }

    #[test]
    fn test_assemble_stitches_wrapped_runs() {
        let store = store_2d();
        // Columns 3 then 0..2, as produced by a box crossing the seam
        let runs = vec![vec![0..2], vec![3..4, 0..2]];
        let data = assemble(&store, "field", &runs, &mut Vec::new()).unwrap();
        assert_eq!(data.shape(), &[2, 3]);
        assert_eq!(
            data.iter().copied().collect::<Vec<_>>(),
            vec![3.0, 0.0, 1.0, 7.0, 4.0, 5.0]
        );
    }

    #[test]
    fn test_assemble_propagates_read_errors() {
        let store = store_2d();
        let runs = vec![vec![0..3], vec![0..1]];
        assert!(assemble(&store, "field", &runs, &mut Vec::new()).is_err());
    }
}

//! In-process [`ArrayStore`] backed by plain vectors.

use super::{ArrayInfo, ArrayStore, StoreError, StoreResult, subset_len};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::ops::Range;

#[derive(Debug, Clone)]
struct MemoryArray {
    info: ArrayInfo,
    data: Vec<f64>,
}

/// A store whose arrays live entirely in memory.
///
/// ```rust
/// use era5fetch::store::{ArrayStore, MemoryStore};
///
/// let mut store = MemoryStore::new("memory://demo");
/// store.add_coordinate("latitude", vec![10.0, 0.0, -10.0], Some("degrees_north"));
/// assert_eq!(store.read_labels("latitude").unwrap(), vec![10.0, 0.0, -10.0]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    location: String,
    arrays: HashMap<String, MemoryArray>,
}

impl MemoryStore {
    pub fn new(location: &str) -> Self {
        MemoryStore {
            location: location.to_string(),
            arrays: HashMap::new(),
        }
    }

    /// Adds a 1-D coordinate array whose only dimension shares its name.
    pub fn add_coordinate(&mut self, name: &str, labels: Vec<f64>, units: Option<&str>) {
        let mut attributes = Map::new();
        if let Some(units) = units {
            attributes.insert("units".to_string(), Value::from(units));
        }
        let shape = vec![labels.len() as u64];
        self.insert(
            ArrayInfo {
                name: name.to_string(),
                dimensions: vec![name.to_string()],
                shape,
                attributes,
                fill_value: None,
            },
            labels,
        );
    }

    /// Adds an N-D data array. The shape is taken from the named coordinate
    /// arrays, which must be added first.
    pub fn add_variable(
        &mut self,
        name: &str,
        dimensions: &[&str],
        data: Vec<f64>,
        attributes: Map<String, Value>,
        fill_value: Option<f32>,
    ) -> StoreResult<()> {
        let mut shape = Vec::with_capacity(dimensions.len());
        for dim in dimensions {
            let coord = self
                .arrays
                .get(*dim)
                .ok_or_else(|| StoreError::MissingArray(dim.to_string()))?;
            shape.push(coord.info.shape[0]);
        }

        let expected: u64 = shape.iter().product();
        if expected != data.len() as u64 {
            return Err(StoreError::Metadata {
                array: name.to_string(),
                message: format!(
                    "shape {:?} needs {} values, got {}",
                    shape,
                    expected,
                    data.len()
                ),
            });
        }

        self.insert(
            ArrayInfo {
                name: name.to_string(),
                dimensions: dimensions.iter().map(|d| d.to_string()).collect(),
                shape,
                attributes,
                fill_value,
            },
            data,
        );
        Ok(())
    }

    fn insert(&mut self, info: ArrayInfo, data: Vec<f64>) {
        self.arrays
            .insert(info.name.clone(), MemoryArray { info, data });
    }

    fn get(&self, name: &str) -> StoreResult<&MemoryArray> {
        self.arrays
            .get(name)
            .ok_or_else(|| StoreError::MissingArray(name.to_string()))
    }
}

impl ArrayStore for MemoryStore {
    fn location(&self) -> &str {
        &self.location
    }

    fn array_info(&self, name: &str) -> StoreResult<Option<ArrayInfo>> {
        Ok(self.arrays.get(name).map(|a| a.info.clone()))
    }

    fn read_labels(&self, name: &str) -> StoreResult<Vec<f64>> {
        let array = self.get(name)?;
        if array.info.shape.len() != 1 {
            return Err(StoreError::Metadata {
                array: name.to_string(),
                message: format!("expected 1 dimension, found {}", array.info.shape.len()),
            });
        }
        Ok(array.data.clone())
    }

    fn read_subset(&self, name: &str, ranges: &[Range<u64>]) -> StoreResult<Vec<f32>> {
        let array = self.get(name)?;
        let shape = &array.info.shape;

        if ranges.len() != shape.len() {
            return Err(StoreError::Read {
                array: name.to_string(),
                message: format!(
                    "subset has {} dimensions, array has {}",
                    ranges.len(),
                    shape.len()
                ),
            });
        }
        for (range, &len) in ranges.iter().zip(shape) {
            if range.start > range.end || range.end > len {
                return Err(StoreError::Read {
                    array: name.to_string(),
                    message: format!("range {:?} out of bounds for length {}", range, len),
                });
            }
        }

        // Row-major strides
        let mut strides = vec![1u64; shape.len()];
        for i in (0..shape.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * shape[i + 1];
        }

        let mut out = Vec::with_capacity(subset_len(ranges) as usize);
        if subset_len(ranges) == 0 {
            return Ok(out);
        }

        let mut index: Vec<u64> = ranges.iter().map(|r| r.start).collect();
        loop {
            let offset: u64 = index.iter().zip(&strides).map(|(i, s)| i * s).sum();
            out.push(array.data[offset as usize] as f32);

            // Odometer increment, last dimension fastest
            let mut dim = ranges.len();
            loop {
                if dim == 0 {
                    return Ok(out);
                }
                dim -= 1;
                index[dim] += 1;
                if index[dim] < ranges[dim].end {
                    break;
                }
                index[dim] = ranges[dim].start;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_store() -> MemoryStore {
        let mut store = MemoryStore::new("memory://test");
        store.add_coordinate("y", vec![0.0, 1.0, 2.0], None);
        store.add_coordinate("x", vec![0.0, 1.0, 2.0, 3.0], None);
        let data = (0..12).map(|v| v as f64).collect();
        store
            .add_variable("field", &["y", "x"], data, Map::new(), None)
            .unwrap();
        store
    }

    #[test]
    fn test_read_subset_row_major() {
        let store = grid_store();
        let values = store.read_subset("field", &[1..3, 1..3]).unwrap();
        assert_eq!(values, vec![5.0, 6.0, 9.0, 10.0]);
    }

    #[test]
    fn test_read_subset_rejects_out_of_bounds() {
        let store = grid_store();
        assert!(store.read_subset("field", &[0..4, 0..1]).is_err());
        assert!(store.read_subset("field", &[0..1]).is_err());
    }

    #[test]
    fn test_array_info_absent() {
        let store = grid_store();
        assert!(store.array_info("missing").unwrap().is_none());
        let info = store.array_info("field").unwrap().unwrap();
        assert_eq!(info.shape, vec![3, 4]);
        assert_eq!(info.dimension_index("x"), Some(1));
    }

    #[test]
    fn test_add_variable_checks_length() {
        let mut store = grid_store();
        let result = store.add_variable("bad", &["y", "x"], vec![0.0; 5], Map::new(), None);
        assert!(matches!(result, Err(StoreError::Metadata { .. })));
    }
}

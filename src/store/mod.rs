//! # Array Store Access
//!
//! Read-only access to a label-indexed, chunked array collection. The
//! [`ArrayStore`] trait is the seam between the resolution engine and the
//! concrete backend:
//!
//! - [`ZarrStore`]: Zarr v2/v3 hierarchies over HTTP(S), `gs://`, `s3://` or a local directory
//! - [`MemoryStore`]: in-process arrays, used for offline runs and tests
//!
//! Arrays are addressed by name relative to the store root (`temperature`,
//! `latitude`, ...). Data is always handed out as row-major `f32`, coordinates
//! as `f64`.

pub mod memory;
pub mod zarr;

pub use memory::MemoryStore;
pub use zarr::ZarrStore;

use serde_json::{Map, Value};
use std::ops::Range;
use thiserror::Error;

/// Public ARCO ERA5 analysis-ready store (37 pressure levels, hourly, 0.25°).
pub const DEFAULT_STORE: &str =
    "gs://gcp-public-data-arco-era5/ar/full_37-1h-0p25deg-chunk-1.zarr-v3";

/// Errors raised by store backends.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to open store {location}: {message}")]
    Open { location: String, message: String },

    #[error("Array '{0}' not found in store")]
    MissingArray(String),

    #[error("Invalid metadata for array '{array}': {message}")]
    Metadata { array: String, message: String },

    #[error("Failed to read array '{array}': {message}")]
    Read { array: String, message: String },
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Metadata describing one array of the store.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayInfo {
    pub name: String,
    /// Dimension names in storage order
    pub dimensions: Vec<String>,
    pub shape: Vec<u64>,
    pub attributes: Map<String, Value>,
    /// Fill value reported by the array metadata (may be NaN)
    pub fill_value: Option<f32>,
}

impl ArrayInfo {
    /// Returns a string attribute, if present.
    pub fn attribute_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }

    pub fn units(&self) -> Option<&str> {
        self.attribute_str("units")
    }

    pub fn long_name(&self) -> Option<&str> {
        self.attribute_str("long_name")
    }

    /// Position of a dimension in the array's storage order.
    pub fn dimension_index(&self, dim: &str) -> Option<usize> {
        self.dimensions.iter().position(|d| d == dim)
    }

    pub fn has_dimension(&self, dim: &str) -> bool {
        self.dimension_index(dim).is_some()
    }
}

/// Backend-neutral read access to a chunked array collection.
pub trait ArrayStore {
    /// Location string the store was opened from
    fn location(&self) -> &str;

    /// Metadata for `name`, or `None` when the array does not exist.
    fn array_info(&self, name: &str) -> StoreResult<Option<ArrayInfo>>;

    /// Reads a complete 1-D coordinate array.
    fn read_labels(&self, name: &str) -> StoreResult<Vec<f64>>;

    /// Reads the hyper-rectangle given by one half-open range per dimension,
    /// returned in row-major order.
    fn read_subset(&self, name: &str, ranges: &[Range<u64>]) -> StoreResult<Vec<f32>>;
}

/// Opens the store at `location`.
pub fn open_store(location: &str) -> StoreResult<Box<dyn ArrayStore>> {
    Ok(Box::new(ZarrStore::open(location)?))
}

/// Number of elements selected by `ranges`.
pub(crate) fn subset_len(ranges: &[Range<u64>]) -> u64 {
    ranges.iter().map(|r| r.end.saturating_sub(r.start)).product()
}

//! Zarr-backed [`ArrayStore`].
//!
//! Arrays are read with `zarrs` on top of an `object_store` backend. The
//! object store is asynchronous, so it is wrapped in an async-to-sync adapter
//! driven by a private current-thread tokio runtime owned by the store.
//!
//! Supported locations:
//!
//! - `gs://bucket/path`: anonymous HTTPS through `storage.googleapis.com`
//! - `http://...` / `https://...`: anonymous HTTP
//! - `s3://bucket/path`: unsigned S3 requests (region from `AWS_REGION`)
//! - anything else: a local directory

use super::{ArrayInfo, ArrayStore, StoreError, StoreResult, subset_len};
use log::debug;
use serde_json::Value;
use std::collections::HashMap;
use std::ops::Range;
use std::sync::{Arc, Mutex};
use tokio::runtime::Runtime;
use zarrs::array::{Array, DataType};
use zarrs::array_subset::ArraySubset;
use zarrs::storage::{ReadableStorageTraits, StoreKey};
use zarrs_object_store::AsyncObjectStore;
// The re-export is the object_store version AsyncObjectStore is built against
use zarrs_object_store::object_store::{
    ObjectStore, aws::AmazonS3Builder, http::HttpBuilder, local::LocalFileSystem,
    prefix::PrefixStore,
};
use zarrs_storage::storage_adapter::async_to_sync::{
    AsyncToSyncBlockOn, AsyncToSyncStorageAdapter,
};

const GCS_PUBLIC_ENDPOINT: &str = "https://storage.googleapis.com";

/// Drives object-store futures on a runtime owned by the store.
#[derive(Clone)]
pub struct RuntimeBlockOn(Arc<Runtime>);

impl AsyncToSyncBlockOn for RuntimeBlockOn {
    fn block_on<F: core::future::Future>(&self, future: F) -> F::Output {
        self.0.block_on(future)
    }
}

type SyncStorage = AsyncToSyncStorageAdapter<AsyncObjectStore<Arc<dyn ObjectStore>>, RuntimeBlockOn>;
type ZarrArray = Array<SyncStorage>;

/// A Zarr hierarchy opened read-only.
pub struct ZarrStore {
    location: String,
    storage: Arc<SyncStorage>,
    arrays: Mutex<HashMap<String, Arc<ZarrArray>>>,
}

impl ZarrStore {
    /// Opens the hierarchy at `location`. No metadata is read until an array
    /// is requested.
    pub fn open(location: &str) -> StoreResult<Self> {
        let open_err = |message: String| StoreError::Open {
            location: location.to_string(),
            message,
        };

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| open_err(e.to_string()))?;

        let object_store = object_store_for(location).map_err(open_err)?;
        debug!("Opened object store for {}", location);

        let async_store = Arc::new(AsyncObjectStore::new(object_store));
        let storage =
            AsyncToSyncStorageAdapter::new(async_store, RuntimeBlockOn(Arc::new(runtime)));

        Ok(ZarrStore {
            location: location.to_string(),
            storage: Arc::new(storage),
            arrays: Mutex::new(HashMap::new()),
        })
    }

    fn open_array(&self, name: &str) -> StoreResult<Option<Arc<ZarrArray>>> {
        if let Ok(arrays) = self.arrays.lock()
            && let Some(array) = arrays.get(name)
        {
            return Ok(Some(array.clone()));
        }

        let path = format!("/{}", name.trim_matches('/'));
        match Array::open(self.storage.clone(), &path) {
            Ok(array) => {
                let array = Arc::new(array);
                if let Ok(mut arrays) = self.arrays.lock() {
                    arrays.insert(name.to_string(), array.clone());
                }
                Ok(Some(array))
            }
            Err(e) => {
                if self.has_metadata(name)? {
                    Err(StoreError::Metadata {
                        array: name.to_string(),
                        message: e.to_string(),
                    })
                } else {
                    debug!("Array {} not present: {}", name, e);
                    Ok(None)
                }
            }
        }
    }

    /// Whether Zarr v3 or v2 array metadata exists for `name`.
    fn has_metadata(&self, name: &str) -> StoreResult<bool> {
        let name = name.trim_matches('/');
        for file in ["zarr.json", ".zarray"] {
            let key = StoreKey::new(format!("{}/{}", name, file)).map_err(|e| {
                StoreError::Metadata {
                    array: name.to_string(),
                    message: e.to_string(),
                }
            })?;
            let size = self.storage.size_key(&key).map_err(|e| StoreError::Read {
                array: name.to_string(),
                message: e.to_string(),
            })?;
            if size.is_some() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn require_array(&self, name: &str) -> StoreResult<Arc<ZarrArray>> {
        self.open_array(name)?
            .ok_or_else(|| StoreError::MissingArray(name.to_string()))
    }
}

impl ArrayStore for ZarrStore {
    fn location(&self) -> &str {
        &self.location
    }

    fn array_info(&self, name: &str) -> StoreResult<Option<ArrayInfo>> {
        let Some(array) = self.open_array(name)? else {
            return Ok(None);
        };

        let shape = array.shape().to_vec();
        let attributes = array.attributes().clone();
        let dimensions = dimension_names(&array, &attributes, shape.len());
        let fill_value = fill_value_f32(&array);

        Ok(Some(ArrayInfo {
            name: name.to_string(),
            dimensions,
            shape,
            attributes,
            fill_value,
        }))
    }

    fn read_labels(&self, name: &str) -> StoreResult<Vec<f64>> {
        let array = self.require_array(name)?;
        let shape = array.shape().to_vec();
        if shape.len() != 1 {
            return Err(StoreError::Metadata {
                array: name.to_string(),
                message: format!("expected 1 dimension, found {}", shape.len()),
            });
        }
        debug!("Reading {} labels of {}", shape[0], name);
        read_as_f64(&array, name, &ArraySubset::new_with_ranges(&[0..shape[0]]))
    }

    fn read_subset(&self, name: &str, ranges: &[Range<u64>]) -> StoreResult<Vec<f32>> {
        let array = self.require_array(name)?;
        if ranges.len() != array.shape().len() {
            return Err(StoreError::Read {
                array: name.to_string(),
                message: format!(
                    "subset has {} dimensions, array has {}",
                    ranges.len(),
                    array.shape().len()
                ),
            });
        }
        debug!(
            "Reading {} elements of {} over {:?}",
            subset_len(ranges),
            name,
            ranges
        );
        read_as_f32(&array, name, &ArraySubset::new_with_ranges(ranges))
    }
}

/// Builds the object store behind a location string.
fn object_store_for(location: &str) -> Result<Arc<dyn ObjectStore>, String> {
    if let Some(rest) = location.strip_prefix("gs://") {
        let url = format!("{}/{}", GCS_PUBLIC_ENDPOINT, rest.trim_end_matches('/'));
        return http_store(&url);
    }

    if location.starts_with("http://") || location.starts_with("https://") {
        return http_store(location.trim_end_matches('/'));
    }

    if let Some(rest) = location.strip_prefix("s3://") {
        let (bucket, prefix) = match rest.split_once('/') {
            Some((bucket, prefix)) => (bucket, prefix.trim_matches('/')),
            None => (rest, ""),
        };
        if bucket.is_empty() {
            return Err(format!("missing bucket in {}", location));
        }
        let s3 = AmazonS3Builder::from_env()
            .with_bucket_name(bucket)
            .with_skip_signature(true)
            .build()
            .map_err(|e| e.to_string())?;
        if prefix.is_empty() {
            return Ok(Arc::new(s3));
        }
        return Ok(Arc::new(PrefixStore::new(s3, prefix)));
    }

    let local = LocalFileSystem::new_with_prefix(location).map_err(|e| e.to_string())?;
    Ok(Arc::new(local))
}

fn http_store(url: &str) -> Result<Arc<dyn ObjectStore>, String> {
    let store = HttpBuilder::new()
        .with_url(url)
        .build()
        .map_err(|e| e.to_string())?;
    Ok(Arc::new(store))
}

/// Dimension names from Zarr v3 metadata, falling back to the xarray
/// `_ARRAY_DIMENSIONS` attribute used by Zarr v2 stores.
fn dimension_names(
    array: &ZarrArray,
    attributes: &serde_json::Map<String, Value>,
    ndim: usize,
) -> Vec<String> {
    let from_metadata: Option<Vec<String>> = array
        .dimension_names()
        .as_ref()
        .and_then(|names| serde_json::to_value(names).ok())
        .and_then(|value| string_list(&value));

    let from_attributes = attributes.get("_ARRAY_DIMENSIONS").and_then(string_list);

    from_metadata
        .or(from_attributes)
        .filter(|names| names.len() == ndim)
        .unwrap_or_else(|| (0..ndim).map(|i| format!("dim_{}", i)).collect())
}

fn string_list(value: &Value) -> Option<Vec<String>> {
    value
        .as_array()?
        .iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect()
}

fn fill_value_f32(array: &ZarrArray) -> Option<f32> {
    let bytes = array.fill_value().as_ne_bytes();
    match array.data_type() {
        DataType::Float32 => bytes.try_into().ok().map(f32::from_ne_bytes),
        DataType::Float64 => bytes
            .try_into()
            .ok()
            .map(|b| f64::from_ne_bytes(b) as f32),
        _ => None,
    }
}

macro_rules! retrieve_cast {
    ($array:expr, $subset:expr, $name:expr, $from:ty, $to:ty) => {
        $array
            .retrieve_array_subset_elements::<$from>($subset)
            .map(|values| values.into_iter().map(|v| v as $to).collect::<Vec<$to>>())
            .map_err(|e| StoreError::Read {
                array: $name.to_string(),
                message: e.to_string(),
            })
    };
}

fn read_as_f64(array: &ZarrArray, name: &str, subset: &ArraySubset) -> StoreResult<Vec<f64>> {
    match array.data_type() {
        DataType::Float64 => retrieve_cast!(array, subset, name, f64, f64),
        DataType::Float32 => retrieve_cast!(array, subset, name, f32, f64),
        DataType::Int64 => retrieve_cast!(array, subset, name, i64, f64),
        DataType::Int32 => retrieve_cast!(array, subset, name, i32, f64),
        DataType::Int16 => retrieve_cast!(array, subset, name, i16, f64),
        DataType::UInt32 => retrieve_cast!(array, subset, name, u32, f64),
        DataType::UInt16 => retrieve_cast!(array, subset, name, u16, f64),
        other => Err(StoreError::Metadata {
            array: name.to_string(),
            message: format!("unsupported coordinate data type {:?}", other),
        }),
    }
}

fn read_as_f32(array: &ZarrArray, name: &str, subset: &ArraySubset) -> StoreResult<Vec<f32>> {
    match array.data_type() {
        DataType::Float32 => retrieve_cast!(array, subset, name, f32, f32),
        DataType::Float64 => retrieve_cast!(array, subset, name, f64, f32),
        DataType::Int32 => retrieve_cast!(array, subset, name, i32, f32),
        DataType::Int16 => retrieve_cast!(array, subset, name, i16, f32),
        other => Err(StoreError::Metadata {
            array: name.to_string(),
            message: format!("unsupported data type {:?}", other),
        }),
    }
}

//! # Artifact Storage
//!
//! Reading and writing whole files on the local filesystem or in Amazon S3.
//! Fetched NetCDF files can be delivered to an `s3://bucket/prefix` output
//! directory and the inspector can read `s3://` inputs; everything else is a
//! local path.
//!
//! ```rust,no_run
//! use era5fetch::storage::{Storage, StorageBackend};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let storage = Storage::for_path("s3://my-bucket/era5/t2m.nc").await?;
//!     let bytes = storage.read("s3://my-bucket/era5/t2m.nc").await?;
//!     storage.write("s3://my-bucket/copy/t2m.nc", &bytes).await?;
//!     Ok(())
//! }
//! ```

use aws_config::BehaviorVersion;
use aws_sdk_s3::Client as S3Client;
use aws_sdk_s3::error::SdkError;
use std::io::ErrorKind;
use std::path::Path;
use thiserror::Error;
use tokio::fs;

const S3_SCHEME: &str = "s3://";

/// Errors that can occur while reading or writing artifacts
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("S3 GetObject failed: {0}")]
    S3GetObject(#[from] SdkError<aws_sdk_s3::operation::get_object::GetObjectError>),

    #[error("S3 PutObject failed: {0}")]
    S3PutObject(#[from] SdkError<aws_sdk_s3::operation::put_object::PutObjectError>),

    #[error("S3 body stream error: {0}")]
    ByteStream(String),

    #[error("Invalid S3 location: {0}")]
    InvalidS3Path(String),

    #[error("Not found: {0}")]
    PathNotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Whole-file access to one storage system.
#[async_trait::async_trait]
pub trait StorageBackend: Send + Sync {
    /// Reads the entire file at `path`.
    async fn read(&self, path: &str) -> StorageResult<Vec<u8>>;

    /// Writes `data` to `path`, replacing any existing file.
    async fn write(&self, path: &str, data: &[u8]) -> StorageResult<()>;
}

/// Local filesystem backend; parent directories are created on write.
#[derive(Debug, Clone, Default)]
pub struct LocalStorage;

fn map_local_error(path: &str, e: std::io::Error) -> StorageError {
    match e.kind() {
        ErrorKind::NotFound => StorageError::PathNotFound(path.to_string()),
        ErrorKind::PermissionDenied => StorageError::PermissionDenied(path.to_string()),
        _ => StorageError::Io(e),
    }
}

#[async_trait::async_trait]
impl StorageBackend for LocalStorage {
    async fn read(&self, path: &str) -> StorageResult<Vec<u8>> {
        fs::read(path).await.map_err(|e| map_local_error(path, e))
    }

    async fn write(&self, path: &str, data: &[u8]) -> StorageResult<()> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, data).await.map_err(|e| map_local_error(path, e))
    }
}

/// Bucket and key of an `s3://` location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Location {
    pub bucket: String,
    pub key: String,
}

impl S3Location {
    pub fn parse(path: &str) -> StorageResult<Self> {
        let rest = path
            .strip_prefix(S3_SCHEME)
            .ok_or_else(|| StorageError::InvalidS3Path(format!("missing s3:// scheme: {}", path)))?;

        match rest.split_once('/') {
            Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => Ok(S3Location {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
            _ => Err(StorageError::InvalidS3Path(format!(
                "expected s3://bucket/key: {}",
                path
            ))),
        }
    }
}

/// Amazon S3 backend. Credentials come from the standard AWS provider chain
/// (environment, profile files, instance roles).
#[derive(Debug, Clone)]
pub struct S3Storage {
    client: S3Client,
}

impl S3Storage {
    pub async fn new() -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest()).load().await;
        S3Storage {
            client: S3Client::new(&config),
        }
    }
}

/// MIME type stored with an uploaded object.
fn content_type(key: &str) -> &'static str {
    match Path::new(key).extension().and_then(|e| e.to_str()) {
        Some("nc") => "application/x-netcdf",
        Some("png") => "image/png",
        _ => "application/octet-stream",
    }
}

#[async_trait::async_trait]
impl StorageBackend for S3Storage {
    async fn read(&self, path: &str) -> StorageResult<Vec<u8>> {
        let location = S3Location::parse(path)?;

        let response = self
            .client
            .get_object()
            .bucket(location.bucket)
            .key(location.key)
            .send()
            .await
            .map_err(|e| match &e {
                SdkError::ServiceError(service_err) if service_err.err().is_no_such_key() => {
                    StorageError::PathNotFound(path.to_string())
                }
                _ => StorageError::S3GetObject(e),
            })?;

        let body = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::ByteStream(e.to_string()))?;
        Ok(body.into_bytes().to_vec())
    }

    async fn write(&self, path: &str, data: &[u8]) -> StorageResult<()> {
        let location = S3Location::parse(path)?;
        let content_type = content_type(&location.key);

        self.client
            .put_object()
            .bucket(location.bucket)
            .key(location.key)
            .content_type(content_type)
            .body(aws_sdk_s3::primitives::ByteStream::from(data.to_vec()))
            .send()
            .await?;
        Ok(())
    }
}

/// Backend chosen from the shape of a path.
#[derive(Debug)]
pub enum Storage {
    Local(LocalStorage),
    S3(S3Storage),
}

impl Storage {
    /// `s3://` paths use S3, everything else the local filesystem.
    pub async fn for_path(path: &str) -> StorageResult<Storage> {
        if is_s3_path(path) {
            Ok(Storage::S3(S3Storage::new().await))
        } else {
            Ok(Storage::Local(LocalStorage))
        }
    }
}

#[async_trait::async_trait]
impl StorageBackend for Storage {
    async fn read(&self, path: &str) -> StorageResult<Vec<u8>> {
        match self {
            Storage::Local(storage) => storage.read(path).await,
            Storage::S3(storage) => storage.read(path).await,
        }
    }

    async fn write(&self, path: &str, data: &[u8]) -> StorageResult<()> {
        match self {
            Storage::Local(storage) => storage.write(path, data).await,
            Storage::S3(storage) => storage.write(path, data).await,
        }
    }
}

pub fn is_s3_path(path: &str) -> bool {
    path.starts_with(S3_SCHEME)
}

/// Joins a file name onto a directory or `s3://` prefix.
pub fn join_location(dir: &str, file_name: &str) -> String {
    if is_s3_path(dir) {
        format!("{}/{}", dir.trim_end_matches('/'), file_name)
    } else {
        Path::new(dir).join(file_name).display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_local_write_creates_parents() -> Result<(), Box<dyn std::error::Error>> {
        let dir = TempDir::new()?;
        let path = dir.path().join("nested/out/t2m_sfc_20230101.nc");
        let path = path.to_str().unwrap();

        LocalStorage.write(path, b"CDF").await?;
        assert!(Path::new(path).is_file());
        assert_eq!(LocalStorage.read(path).await?, b"CDF");

        LocalStorage.write(path, b"HDF").await?;
        assert_eq!(LocalStorage.read(path).await?, b"HDF");
        Ok(())
    }

    #[tokio::test]
    async fn test_local_missing_file() -> Result<(), Box<dyn std::error::Error>> {
        let result = LocalStorage.read("/nonexistent/era5/file.nc").await;
        assert!(matches!(result, Err(StorageError::PathNotFound(_))));
        Ok(())
    }

    #[test]
    fn test_s3_location_parsing() {
        let location = S3Location::parse("s3://era5-bucket/daily/t_850_20230101.nc").unwrap();
        assert_eq!(location.bucket, "era5-bucket");
        assert_eq!(location.key, "daily/t_850_20230101.nc");

        assert!(S3Location::parse("gs://bucket/file.nc").is_err());
        assert!(S3Location::parse("s3://").is_err());
        assert!(S3Location::parse("s3://bucket").is_err());
        assert!(S3Location::parse("s3://bucket/").is_err());
        assert!(S3Location::parse("s3:///file.nc").is_err());
    }

    #[tokio::test]
    async fn test_storage_for_local_path() -> Result<(), Box<dyn std::error::Error>> {
        let storage = Storage::for_path("./data/file.nc").await?;
        assert!(matches!(storage, Storage::Local(_)));
        Ok(())
    }

    #[test]
    fn test_storage_dispatch_blocking() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("2m_temperature_sfc_20230101.png");
        let path = path.to_str().unwrap();

        tokio_test::block_on(async {
            let storage = Storage::for_path(path).await.unwrap();
            storage.write(path, b"\x89PNG").await.unwrap();
            assert_eq!(storage.read(path).await.unwrap(), b"\x89PNG");
        });
    }

    #[test]
    fn test_content_type_from_extension() {
        assert_eq!(content_type("era5/t_850_20230101.nc"), "application/x-netcdf");
        assert_eq!(content_type("plots/t_850_20230101.png"), "image/png");
        assert_eq!(content_type("README"), "application/octet-stream");
    }

    #[test]
    fn test_join_location() {
        assert_eq!(
            join_location("s3://bucket/prefix/", "a.nc"),
            "s3://bucket/prefix/a.nc"
        );
        assert_eq!(join_location("./data", "a.nc"), "./data/a.nc");
    }

    #[tokio::test]
    #[ignore] // Requires AWS credentials and TEST_S3_BUCKET
    async fn test_s3_round_trip() -> Result<(), Box<dyn std::error::Error>> {
        let Ok(bucket) = std::env::var("TEST_S3_BUCKET") else {
            println!("Skipping S3 test - set TEST_S3_BUCKET");
            return Ok(());
        };

        let storage = Storage::for_path("s3://bucket/key").await?;
        let path = format!("s3://{}/era5fetch-test/round_trip.nc", bucket);
        storage.write(&path, b"CDF").await?;
        assert_eq!(storage.read(&path).await?, b"CDF");
        Ok(())
    }
}

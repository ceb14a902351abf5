//! # NetCDF Output Module
//!
//! Persists extracted slabs as compressed NetCDF-4 files, one primary data
//! variable per file with its coordinate variables embedded.
//!
//! ## Features
//!
//! - **Mandatory compression**: zlib deflate with byte shuffling on the data variable
//! - **Self-describing**: CF `units`/`long_name` copied from the store, coordinate units, `Conventions`
//! - **Stable content**: no creation timestamps, so rerunning a fetch reproduces the same file
//! - **Cloud output**: an `s3://` output directory stages files locally and uploads them
//!
//! Existing files with the same name are overwritten.

use crate::dataset::{LATITUDE, LEVEL, LONGITUDE, TIME};
use crate::error::FetchError;
use crate::extract::Slab;
use crate::plan::{FetchPlan, PlannedArtifact};
use crate::storage::{Storage, StorageBackend, is_s3_path, join_location};
use chrono::NaiveDate;
use log::debug;
use serde::{Serialize, Serializer};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::runtime::Runtime;

/// Conventions attribute written to every file.
pub const CONVENTIONS: &str = "CF-1.8";

/// Compression applied to the data variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Compression {
    pub codec: &'static str,
    /// Deflate level, 1 (fast) to 9 (small)
    pub level: i32,
    pub shuffle: bool,
}

impl Default for Compression {
    fn default() -> Self {
        Compression {
            codec: "zlib",
            level: 5,
            shuffle: true,
        }
    }
}

/// Level of a written file: a pressure level in hPa or the surface sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactLevel {
    Pressure(i64),
    Surface,
}

impl fmt::Display for ArtifactLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactLevel::Pressure(level) => write!(f, "{}", level),
            ArtifactLevel::Surface => write!(f, "surface"),
        }
    }
}

impl Serialize for ArtifactLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ArtifactLevel::Pressure(level) => serializer.serialize_i64(*level),
            ArtifactLevel::Surface => serializer.serialize_str("surface"),
        }
    }
}

/// A file produced by a fetch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputArtifact {
    pub variable: String,
    pub level: ArtifactLevel,
    pub date: NaiveDate,
    pub path: String,
    pub compression: Compression,
}

/// Writes artifacts into a local directory or an `s3://` prefix.
pub struct ArtifactWriter {
    output_dir: String,
    compression: Compression,
    /// Local staging directory for S3 uploads
    staging: Option<TempDir>,
    runtime: Option<Runtime>,
}

impl ArtifactWriter {
    /// Prepares `output_dir`, creating it when local.
    pub fn new(output_dir: &str) -> Result<Self, FetchError> {
        let write_error = |e: std::io::Error| FetchError::Write {
            path: output_dir.to_string(),
            message: e.to_string(),
        };

        let (staging, runtime) = if is_s3_path(output_dir) {
            let staging = TempDir::new().map_err(write_error)?;
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(write_error)?;
            debug!("Staging S3 uploads in {}", staging.path().display());
            (Some(staging), Some(runtime))
        } else {
            fs::create_dir_all(output_dir).map_err(write_error)?;
            (None, None)
        };

        Ok(ArtifactWriter {
            output_dir: output_dir.to_string(),
            compression: Compression::default(),
            staging,
            runtime,
        })
    }

    /// Final location of a file named `file_name`.
    pub fn destination(&self, file_name: &str) -> String {
        join_location(&self.output_dir, file_name)
    }

    /// Writes one artifact and returns its description.
    pub fn write(
        &self,
        slab: &Slab,
        plan: &FetchPlan,
        artifact: &PlannedArtifact,
    ) -> Result<OutputArtifact, FetchError> {
        let destination = self.destination(&artifact.file_name);

        match (&self.staging, &self.runtime) {
            (Some(staging), Some(runtime)) => {
                let local = staging.path().join(&artifact.file_name);
                write_netcdf(&local, slab, plan, artifact, &self.compression)?;
                runtime.block_on(upload(&local, &destination))?;
                fs::remove_file(&local).map_err(|e| FetchError::Write {
                    path: local.display().to_string(),
                    message: e.to_string(),
                })?;
            }
            _ => {
                let local = PathBuf::from(&destination);
                if local.exists() {
                    debug!("Overwriting {}", destination);
                }
                write_netcdf(&local, slab, plan, artifact, &self.compression)?;
            }
        }

        Ok(OutputArtifact {
            variable: artifact.variable.name.to_string(),
            level: match artifact.level {
                Some(level) => ArtifactLevel::Pressure(level.value),
                None => ArtifactLevel::Surface,
            },
            date: plan.date,
            path: destination,
            compression: self.compression,
        })
    }
}

async fn upload(local: &Path, destination: &str) -> Result<(), FetchError> {
    let data = tokio::fs::read(local).await.map_err(|e| FetchError::Write {
        path: local.display().to_string(),
        message: e.to_string(),
    })?;
    let storage = Storage::for_path(destination).await?;
    storage.write(destination, &data).await?;
    debug!("Uploaded {} bytes to {}", data.len(), destination);
    Ok(())
}

/// Writes `slab` as a NetCDF-4 file at `path`.
pub fn write_netcdf(
    path: &Path,
    slab: &Slab,
    plan: &FetchPlan,
    artifact: &PlannedArtifact,
    compression: &Compression,
) -> Result<(), FetchError> {
    debug!(
        "Writing {} with shape {:?} to {}",
        artifact.variable.name,
        slab.shape(),
        path.display()
    );

    write_netcdf_file(path, slab, plan, artifact, compression).map_err(|e| FetchError::Write {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

fn write_netcdf_file(
    path: &Path,
    slab: &Slab,
    plan: &FetchPlan,
    artifact: &PlannedArtifact,
    compression: &Compression,
) -> Result<(), netcdf::Error> {
    let mut file = netcdf::create(path)?;

    for (dim, coords) in slab.dims.iter().zip(&slab.coords) {
        file.add_dimension(dim, coords.len())?;
    }

    for (dim, coords) in slab.dims.iter().zip(&slab.coords) {
        let mut var = file.add_variable::<f64>(dim, &[dim.as_str()])?;
        match dim.as_str() {
            TIME => {
                var.put_attribute("units", plan.time_units.as_str())?;
                var.put_attribute("calendar", "proleptic_gregorian")?;
                var.put_attribute("standard_name", "time")?;
                var.put_attribute("axis", "T")?;
            }
            LEVEL => {
                var.put_attribute("units", plan.level_units.as_deref().unwrap_or("hPa"))?;
                var.put_attribute("long_name", "pressure_level")?;
                var.put_attribute("positive", "down")?;
                var.put_attribute("axis", "Z")?;
            }
            LATITUDE => {
                var.put_attribute("units", "degrees_north")?;
                var.put_attribute("standard_name", "latitude")?;
                var.put_attribute("axis", "Y")?;
            }
            LONGITUDE => {
                var.put_attribute("units", "degrees_east")?;
                var.put_attribute("standard_name", "longitude")?;
                var.put_attribute("axis", "X")?;
            }
            _ => {}
        }
        var.put_values(coords.as_slice(), ..)?;
    }

    let spec = artifact.variable;
    let info = &artifact.info;
    let dims: Vec<&str> = slab.dims.iter().map(String::as_str).collect();

    let mut var = file.add_variable::<f32>(spec.name, &dims)?;
    var.set_compression(compression.level, compression.shuffle)?;
    if let Some(fill) = info.fill_value {
        var.put_attribute("_FillValue", fill)?;
    }
    var.put_attribute("units", info.units().unwrap_or(spec.units))?;
    var.put_attribute("long_name", info.long_name().unwrap_or(spec.long_name))?;
    var.put_attribute("short_name", info.attribute_str("short_name").unwrap_or(spec.alias))?;
    if let Some(standard_name) = info.attribute_str("standard_name") {
        var.put_attribute("standard_name", standard_name)?;
    }

    // Logical order iteration is row-major whatever the memory layout
    let values: Vec<f32> = slab.data.iter().copied().collect();
    var.put_values(&values, ..)?;

    file.add_attribute("Conventions", CONVENTIONS)?;
    file.add_attribute("source", plan.store.as_str())?;
    file.add_attribute(
        "title",
        format!(
            "{} ({}) on {}",
            spec.long_name,
            artifact.level_tag(),
            plan.date.format("%Y-%m-%d")
        ),
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_compression() {
        let compression = Compression::default();
        assert_eq!(compression.codec, "zlib");
        assert!(compression.level > 0);
        assert!(compression.shuffle);
    }

    #[test]
    fn test_artifact_level_rendering() {
        assert_eq!(ArtifactLevel::Pressure(850).to_string(), "850");
        assert_eq!(ArtifactLevel::Surface.to_string(), "surface");
        assert_eq!(
            serde_json::to_string(&ArtifactLevel::Surface).unwrap(),
            "\"surface\""
        );
        assert_eq!(serde_json::to_string(&ArtifactLevel::Pressure(500)).unwrap(), "500");
    }

    #[test]
    fn test_writer_creates_local_directory() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("nested/data");
        let writer = ArtifactWriter::new(target.to_str().unwrap()).unwrap();
        assert!(target.is_dir());
        assert_eq!(
            writer.destination("t_850_20230101.nc"),
            target.join("t_850_20230101.nc").display().to_string()
        );
    }

    #[test]
    fn test_writer_s3_destination() {
        let writer = ArtifactWriter::new("s3://bucket/era5/").unwrap();
        assert_eq!(
            writer.destination("2m_temperature_sfc_20230101.nc"),
            "s3://bucket/era5/2m_temperature_sfc_20230101.nc"
        );
    }
}

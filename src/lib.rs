//! # era5fetch
//!
//! A Rust library for fetching date/variable/level/region subsets of the ERA5
//! reanalysis from its cloud-hosted Zarr store into compressed NetCDF files,
//! and for inspecting the files it produces.
//!
//! ## Features
//!
//! - **Variable catalog**: canonical store names and short aliases (`t`, `t2m`, `msl`, ...)
//! - **Validation before transfer**: unknown variables, invalid levels, dates outside the store
//!   and empty bounding boxes are all reported before any array data is read
//! - **Label-based slicing**: descending latitude and longitude boxes across the 0°/360° seam
//! - **Self-describing output**: one NetCDF-4 file per (variable, level), zlib-compressed
//! - **Inspection**: summary statistics, an annotated PNG map and a spatial-mean time series
//!   for any produced file
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use era5fetch::{process_fetch_request, request::FetchRequest};
//!
//! let request = FetchRequest {
//!     year: Some(2023),
//!     month: Some(1),
//!     day: Some(1),
//!     variables: vec!["temperature".to_string()],
//!     levels: vec![850],
//!     ..Default::default()
//! };
//!
//! let written = process_fetch_request(&request.validate()?)?;
//! for artifact in written {
//!     println!("{}", artifact.path);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Configuration Example
//!
//! ```yaml
//! year: 2023
//! month: 1
//! day: 1
//! variables: [temperature, t2m]
//! levels: [850, 500]
//! lat_min: 35.0
//! lat_max: 60.0
//! lon_min: -10.0
//! lon_max: 30.0
//! output_dir: ./data
//! ```

pub mod catalog;
pub mod cli;
pub mod dataset;
pub mod error;
pub mod extract;
pub mod figure;
pub mod inspect;
pub mod log;
pub mod output;
pub mod plan;
pub mod render;
pub mod request;
pub mod selection;
pub mod storage;
pub mod store;

#[cfg(test)]
mod cli_tests;

use crate::dataset::DatasetHandle;
use crate::error::FetchError;
use crate::extract::extract_artifact;
use crate::output::{ArtifactWriter, OutputArtifact};
use crate::plan::{FetchPlan, build_plan};
use crate::request::SelectionRequest;
use crate::store::{ArrayStore, open_store};
use ::log::info;
use indicatif::ProgressBar;

/// Resolves `request` against the coordinate metadata of `store`.
///
/// Only coordinate arrays and array metadata are read; the returned plan
/// lists every file a fetch would write.
///
/// # Errors
///
/// Returns the first resolution error: unknown variables, variables missing
/// from the store, invalid levels, a date the store does not cover or a
/// bounding box without grid points. Each error lists every offending input.
pub fn plan_fetch(
    store: &dyn ArrayStore,
    request: &SelectionRequest,
) -> Result<FetchPlan, FetchError> {
    // Aliases resolve without touching the store
    let specs = catalog::resolve(&request.variables)?;
    let dataset = DatasetHandle::open(store)?;
    build_plan(&dataset, request, specs)
}

/// Executes `plan`: reads each planned slab and writes it, one artifact at a
/// time, advancing `progress` after every file.
///
/// Files written before a failure stay on disk.
pub fn execute_plan(
    store: &dyn ArrayStore,
    plan: &FetchPlan,
    progress: &ProgressBar,
) -> Result<Vec<OutputArtifact>, FetchError> {
    let writer = ArtifactWriter::new(&plan.output_dir)?;
    let mut written = Vec::with_capacity(plan.artifacts.len());

    for artifact in &plan.artifacts {
        progress.set_message(artifact.file_name.clone());
        let slab = extract_artifact(store, plan, artifact)?;
        let output = writer.write(&slab, plan, artifact)?;
        info!("Wrote {}", output.path);
        written.push(output);
        progress.inc(1);
    }

    progress.finish_and_clear();
    Ok(written)
}

/// Opens the store named by `request`, resolves the request and writes every
/// planned file.
///
/// # Examples
///
/// ```rust,no_run
/// use era5fetch::{process_fetch_request, request::FetchRequest};
///
/// let request = FetchRequest::from_file("january.yaml")?.validate()?;
/// let written = process_fetch_request(&request)?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
///
/// # Errors
///
/// This function will return an error if:
/// - The store cannot be opened
/// - The request does not resolve against the store (see [`plan_fetch`])
/// - An array read or a file write fails
pub fn process_fetch_request(request: &SelectionRequest) -> Result<Vec<OutputArtifact>, FetchError> {
    let store = open_store(&request.store)?;
    let plan = plan_fetch(store.as_ref(), request)?;
    execute_plan(store.as_ref(), &plan, &ProgressBar::hidden())
}

//! # Request Resolution
//!
//! Resolves a [`SelectionRequest`] against the coordinate space of an open
//! [`DatasetHandle`] and produces a [`FetchPlan`]: one planned artifact per
//! (variable, level) with the index selection for every axis. Resolution
//! touches only metadata and coordinates, so every resolution error surfaces
//! before any data is transferred.

use crate::catalog::{VariableKind, VariableSpec};
use crate::dataset::{DatasetHandle, LATITUDE, LEVEL, LONGITUDE, TIME};
use crate::error::FetchError;
use crate::request::SelectionRequest;
use crate::selection::{
    AxisFilter, AxisSelection, LongitudeFilter, RangeFilter, resolve_levels, select_time,
};
use crate::store::{ArrayInfo, StoreError};
use chrono::{NaiveDate, NaiveDateTime};
use log::{debug, warn};

/// Marker used in file names of single-level variables.
pub const SURFACE_TAG: &str = "sfc";

/// Pressure level picked for one artifact.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlannedLevel {
    /// Level in hPa
    pub value: i64,
    /// Position on the store's level axis
    pub index: usize,
    /// Label as stored
    pub label: f64,
}

/// One file to be produced.
#[derive(Debug, Clone)]
pub struct PlannedArtifact {
    pub variable: &'static VariableSpec,
    pub info: ArrayInfo,
    /// `None` for surface variables
    pub level: Option<PlannedLevel>,
    pub file_name: String,
}

impl PlannedArtifact {
    /// Level as written in file names and listings.
    pub fn level_tag(&self) -> String {
        match self.level {
            Some(level) => level.value.to_string(),
            None => SURFACE_TAG.to_string(),
        }
    }
}

/// Everything needed to execute a fetch.
#[derive(Debug, Clone)]
pub struct FetchPlan {
    pub date: NaiveDate,
    pub store: String,
    pub output_dir: String,
    pub variables: Vec<&'static VariableSpec>,
    pub time: AxisSelection,
    pub timestamps: Vec<NaiveDateTime>,
    /// CF units of the time labels, copied to output files
    pub time_units: String,
    pub level_units: Option<String>,
    pub latitude: AxisSelection,
    pub longitude: AxisSelection,
    pub artifacts: Vec<PlannedArtifact>,
}

/// `{variable}_{level}_{YYYYMMDD}.nc` or `{variable}_sfc_{YYYYMMDD}.nc`.
pub fn artifact_file_name(variable: &str, level: Option<i64>, date: NaiveDate) -> String {
    let tag = match level {
        Some(level) => level.to_string(),
        None => SURFACE_TAG.to_string(),
    };
    format!("{}_{}_{}.nc", variable, tag, date.format("%Y%m%d"))
}

/// Resolves `request` against `dataset`. `specs` are the catalog entries of
/// `request.variables`, see [`crate::catalog::resolve`].
///
/// # Errors
///
/// - [`FetchError::MissingInStore`] when a known variable has no array in the store
/// - [`FetchError::InvalidLevels`] listing every level not on the level axis
/// - [`FetchError::DateNotInStore`] when no timestamp matches the date/hour
/// - [`FetchError::EmptySelection`] when the bounding box contains no grid point
pub fn build_plan(
    dataset: &DatasetHandle<'_>,
    request: &SelectionRequest,
    specs: Vec<&'static VariableSpec>,
) -> Result<FetchPlan, FetchError> {
    let infos = describe_variables(dataset, &specs)?;

    let (level_vars, surface_vars): (Vec<_>, Vec<_>) = specs
        .iter()
        .copied()
        .zip(infos)
        .partition(|(spec, _)| spec.kind == VariableKind::Level);

    let levels = plan_levels(dataset, request, !level_vars.is_empty())?;

    let (date, time) = plan_time(dataset, request)?;
    let timestamps = time
        .runs
        .iter()
        .flat_map(|run| run.clone())
        .filter_map(|i| dataset.time.timestamp(i as usize))
        .collect();

    let (latitude, longitude) = match request.bbox {
        Some(bbox) => {
            let latitude = RangeFilter::new(bbox.lat_min, bbox.lat_max).apply(&dataset.latitude);
            require_points(&latitude, LATITUDE, bbox.lat_min, bbox.lat_max, dataset.latitude.bounds())?;
            let longitude = LongitudeFilter::new(bbox.lon_min, bbox.lon_max).apply(&dataset.longitude);
            require_points(&longitude, LONGITUDE, bbox.lon_min, bbox.lon_max, dataset.longitude.bounds())?;
            (latitude, longitude)
        }
        None => (
            AxisSelection::full(&dataset.latitude),
            AxisSelection::full(&dataset.longitude),
        ),
    };

    let mut artifacts = Vec::new();
    for (spec, info) in level_vars {
        for level in &levels {
            artifacts.push(PlannedArtifact {
                variable: spec,
                info: info.clone(),
                level: Some(*level),
                file_name: artifact_file_name(spec.name, Some(level.value), date),
            });
        }
    }
    for (spec, info) in surface_vars {
        artifacts.push(PlannedArtifact {
            variable: spec,
            info,
            level: None,
            file_name: artifact_file_name(spec.name, None, date),
        });
    }

    debug!(
        "Planned {} artifacts: time={} latitude={} longitude={}",
        artifacts.len(),
        time.len(),
        latitude.len(),
        longitude.len()
    );

    Ok(FetchPlan {
        date,
        store: dataset.location().to_string(),
        output_dir: request.output_dir.clone(),
        variables: specs,
        time,
        timestamps,
        time_units: dataset.time.units.raw.clone(),
        level_units: dataset.level.as_ref().and_then(|axis| axis.units.clone()),
        latitude,
        longitude,
        artifacts,
    })
}

/// Fetches array metadata for each variable, failing with every missing one.
fn describe_variables(
    dataset: &DatasetHandle<'_>,
    specs: &[&'static VariableSpec],
) -> Result<Vec<ArrayInfo>, FetchError> {
    let mut infos = Vec::with_capacity(specs.len());
    let mut missing = Vec::new();

    for spec in specs {
        match dataset.variable(spec.name)? {
            Some(info) => {
                let mut required = vec![TIME, LATITUDE, LONGITUDE];
                if spec.kind == VariableKind::Level {
                    required.push(LEVEL);
                }
                if let Some(dim) = required.iter().copied().find(|d| !info.has_dimension(d)) {
                    return Err(StoreError::Metadata {
                        array: spec.name.to_string(),
                        message: format!(
                            "expected dimension '{}', found [{}]",
                            dim,
                            info.dimensions.join(", ")
                        ),
                    }
                    .into());
                }
                infos.push(info);
            }
            None => missing.push(spec.name.to_string()),
        }
    }

    if !missing.is_empty() {
        return Err(FetchError::MissingInStore {
            missing,
            store: dataset.location().to_string(),
        });
    }
    Ok(infos)
}

fn plan_levels(
    dataset: &DatasetHandle<'_>,
    request: &SelectionRequest,
    has_level_vars: bool,
) -> Result<Vec<PlannedLevel>, FetchError> {
    if !has_level_vars {
        if !request.levels.is_empty() {
            warn!(
                "Ignoring levels {:?}: only surface variables were requested",
                request.levels
            );
        }
        return Ok(Vec::new());
    }

    let axis = dataset.level.as_ref();
    if request.levels.is_empty() {
        let axis = axis.ok_or_else(|| StoreError::MissingArray(LEVEL.to_string()))?;
        return Ok(axis
            .labels
            .iter()
            .enumerate()
            .map(|(index, &label)| PlannedLevel {
                value: label.round() as i64,
                index,
                label,
            })
            .collect());
    }

    let resolved = resolve_levels(axis, &request.levels).map_err(|invalid| {
        FetchError::InvalidLevels {
            invalid,
            available: dataset.level_values(),
        }
    })?;

    Ok(resolved
        .into_iter()
        .map(|(value, index)| PlannedLevel {
            value,
            index,
            label: axis.map(|a| a.labels[index]).unwrap_or(value as f64),
        })
        .collect())
}

fn plan_time(
    dataset: &DatasetHandle<'_>,
    request: &SelectionRequest,
) -> Result<(NaiveDate, AxisSelection), FetchError> {
    let not_in_store = || {
        let render = |t: Option<NaiveDateTime>| {
            t.map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "unknown".to_string())
        };
        FetchError::DateNotInStore {
            date: request.date_label(),
            first: render(dataset.time.first()),
            last: render(dataset.time.last()),
        }
    };

    let date = request.date().ok_or_else(not_in_store)?;
    let time = select_time(&dataset.time, date, request.hours).ok_or_else(not_in_store)?;
    Ok((date, time))
}

fn require_points(
    selection: &AxisSelection,
    axis: &'static str,
    min: f64,
    max: f64,
    bounds: Option<(f64, f64)>,
) -> Result<(), FetchError> {
    if !selection.is_empty() {
        return Ok(());
    }
    let (axis_min, axis_max) = bounds.unwrap_or((f64::NAN, f64::NAN));
    Err(FetchError::EmptySelection {
        axis,
        min,
        max,
        axis_min,
        axis_max,
    })
}

//! # Error Types
//!
//! Errors raised while validating and resolving a fetch request. Each
//! variant corresponds to a failure category of the fetch pipeline:
//!
//! - [`ConfigError`]: the request itself is malformed (checked before any network access)
//! - [`FetchError`]: resolution against the store, remote reads and writes
//!
//! Store, storage and inspection errors live next to the code that raises them
//! ([`crate::store::StoreError`], [`crate::storage::StorageError`],
//! [`crate::inspect::InspectError`]).

use crate::storage::StorageError;
use crate::store::StoreError;
use thiserror::Error;

/// Problems with the request parameters themselves.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Month must be between 1 and 12, got {0}")]
    MonthOutOfRange(u32),

    #[error("Day must be between 1 and 31, got {0}")]
    DayOutOfRange(u32),

    #[error("Hour must be between 0 and 23, got {0}")]
    HourOutOfRange(u32),

    #[error("'hour' and 'all_hours' cannot be used together")]
    ConflictingHours,

    #[error("Bounding box requires all four of lat_min, lat_max, lon_min, lon_max (missing: {})", .missing.join(", "))]
    PartialBoundingBox { missing: Vec<&'static str> },

    #[error("Invalid {axis} range: min {min} is greater than max {max}")]
    InvertedRange { axis: &'static str, min: f64, max: f64 },

    #[error("Latitude {0} is outside [-90, 90]")]
    LatitudeOutOfRange(f64),

    #[error("Failed to read configuration file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

/// Failures of the fetch pipeline after the request has been validated.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Unknown variable(s): {}. Valid names: {}", .unknown.join(", "), .valid.join(", "))]
    UnknownVariables { unknown: Vec<String>, valid: Vec<String> },

    #[error("Variable(s) not present in store {store}: {}", .missing.join(", "))]
    MissingInStore { missing: Vec<String>, store: String },

    #[error("Invalid pressure level(s): {}. Available levels: {}", format_levels(.invalid), format_levels(.available))]
    InvalidLevels { invalid: Vec<i64>, available: Vec<i64> },

    #[error("No timestamp for {date} in store (time axis covers {first} to {last})")]
    DateNotInStore {
        date: String,
        first: String,
        last: String,
    },

    #[error("Bounding box selects no {axis} points: requested [{min}, {max}], axis covers [{axis_min}, {axis_max}]")]
    EmptySelection {
        axis: &'static str,
        min: f64,
        max: f64,
        axis_min: f64,
        axis_max: f64,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Failed to write {path}: {message}")]
    Write { path: String, message: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

fn format_levels(levels: &[i64]) -> String {
    levels
        .iter()
        .map(|l| l.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

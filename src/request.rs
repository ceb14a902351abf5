//! # Fetch Request Configuration
//!
//! Parsing and validation of fetch requests. A request can be loaded from a
//! JSON or YAML file and merged with command-line values; validation turns it
//! into a [`SelectionRequest`] before the store is contacted.
//!
//! ## Configuration Structure
//!
//! - **year / month / day**: the date to fetch (required)
//! - **hour** or **all_hours**: optional time-of-day selection
//! - **variables**: canonical names or short aliases (default: `2m_temperature`, `temperature`)
//! - **levels**: pressure levels in hPa (default: every level of the store)
//! - **lat_min / lat_max / lon_min / lon_max**: optional bounding box, all four or none
//! - **output_dir**: destination directory, local or `s3://` (default `./data`)
//! - **store**: Zarr store location (default: the public ARCO ERA5 store)
//!
//! ## Example Usage
//!
//! ```rust
//! use era5fetch::request::FetchRequest;
//!
//! let yaml = r#"
//! year: 2023
//! month: 1
//! day: 1
//! variables: [temperature]
//! levels: [850]
//! lat_min: 35.0
//! lat_max: 60.0
//! lon_min: -10.0
//! lon_max: 30.0
//! "#;
//! let request = FetchRequest::from_yaml(yaml)?;
//! let selection = request.validate()?;
//! assert_eq!(selection.output_dir, "./data");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::catalog::DEFAULT_VARIABLES;
use crate::error::ConfigError;
use crate::selection::HourSelection;
use crate::store::DEFAULT_STORE;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Default destination of fetched files.
pub const DEFAULT_OUTPUT_DIR: &str = "./data";

/// A fetch request as written in a configuration file or assembled from the
/// command line. Every field is optional so partial sources can be merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub month: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day: Option<u32>,
    /// Exact hour of day (0-23)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hour: Option<u32>,
    /// Keep every timestamp of the day
    #[serde(default, skip_serializing_if = "is_false")]
    pub all_hours: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub levels: Vec<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat_max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lon_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lon_max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store: Option<String>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Inclusive geographic box in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

/// A validated request, ready to be resolved against a store.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionRequest {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hours: HourSelection,
    /// Requested names, unresolved
    pub variables: Vec<String>,
    pub levels: Vec<i64>,
    pub bbox: Option<BoundingBox>,
    pub output_dir: String,
    pub store: String,
}

impl SelectionRequest {
    /// The calendar date, or `None` for a day that does not exist in that
    /// month (e.g. February 31).
    pub fn date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)
    }

    /// `YYYY-MM-DD` rendering that works for impossible dates too.
    pub fn date_label(&self) -> String {
        format!("{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

impl FetchRequest {
    /// Loads a request from a JSON or YAML file, chosen by extension
    /// (`.yaml`/`.yml` are YAML, everything else JSON).
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml(&content),
            _ => Self::from_json(&content),
        }
    }

    pub fn from_json(json_str: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json_str).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn from_yaml(yaml_str: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml_str).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Overlays `overrides` on `self`: set options and non-empty lists in
    /// `overrides` win.
    pub fn merge(self, overrides: FetchRequest) -> FetchRequest {
        FetchRequest {
            year: overrides.year.or(self.year),
            month: overrides.month.or(self.month),
            day: overrides.day.or(self.day),
            hour: overrides.hour.or(self.hour),
            all_hours: overrides.all_hours || self.all_hours,
            variables: if overrides.variables.is_empty() {
                self.variables
            } else {
                overrides.variables
            },
            levels: if overrides.levels.is_empty() {
                self.levels
            } else {
                overrides.levels
            },
            lat_min: overrides.lat_min.or(self.lat_min),
            lat_max: overrides.lat_max.or(self.lat_max),
            lon_min: overrides.lon_min.or(self.lon_min),
            lon_max: overrides.lon_max.or(self.lon_max),
            output_dir: overrides.output_dir.or(self.output_dir),
            store: overrides.store.or(self.store),
        }
    }

    /// Checks every field and fills in defaults.
    pub fn validate(&self) -> Result<SelectionRequest, ConfigError> {
        let year = self.year.ok_or(ConfigError::MissingField("year"))?;
        let month = self.month.ok_or(ConfigError::MissingField("month"))?;
        let day = self.day.ok_or(ConfigError::MissingField("day"))?;

        if !(1..=12).contains(&month) {
            return Err(ConfigError::MonthOutOfRange(month));
        }
        if !(1..=31).contains(&day) {
            return Err(ConfigError::DayOutOfRange(day));
        }

        let hours = match (self.hour, self.all_hours) {
            (Some(_), true) => return Err(ConfigError::ConflictingHours),
            (Some(hour), false) if hour > 23 => return Err(ConfigError::HourOutOfRange(hour)),
            (Some(hour), false) => HourSelection::Exact(hour),
            (None, true) => HourSelection::AllDay,
            (None, false) => HourSelection::First,
        };

        let variables = if self.variables.is_empty() {
            DEFAULT_VARIABLES.iter().map(|s| s.to_string()).collect()
        } else {
            self.variables.clone()
        };

        Ok(SelectionRequest {
            year,
            month,
            day,
            hours,
            variables,
            levels: self.levels.clone(),
            bbox: self.bounding_box()?,
            output_dir: self
                .output_dir
                .clone()
                .unwrap_or_else(|| DEFAULT_OUTPUT_DIR.to_string()),
            store: self.store.clone().unwrap_or_else(|| DEFAULT_STORE.to_string()),
        })
    }

    fn bounding_box(&self) -> Result<Option<BoundingBox>, ConfigError> {
        let sides = [
            ("lat_min", self.lat_min),
            ("lat_max", self.lat_max),
            ("lon_min", self.lon_min),
            ("lon_max", self.lon_max),
        ];
        let missing: Vec<&'static str> = sides
            .iter()
            .filter(|(_, v)| v.is_none())
            .map(|(name, _)| *name)
            .collect();

        let (Some(lat_min), Some(lat_max), Some(lon_min), Some(lon_max)) =
            (self.lat_min, self.lat_max, self.lon_min, self.lon_max)
        else {
            if missing.len() == sides.len() {
                return Ok(None);
            }
            return Err(ConfigError::PartialBoundingBox { missing });
        };

        for lat in [lat_min, lat_max] {
            if !(-90.0..=90.0).contains(&lat) {
                return Err(ConfigError::LatitudeOutOfRange(lat));
            }
        }
        if lat_min > lat_max {
            return Err(ConfigError::InvertedRange {
                axis: "latitude",
                min: lat_min,
                max: lat_max,
            });
        }
        if lon_min > lon_max {
            return Err(ConfigError::InvertedRange {
                axis: "longitude",
                min: lon_min,
                max: lon_max,
            });
        }

        Ok(Some(BoundingBox {
            lat_min,
            lat_max,
            lon_min,
            lon_max,
        }))
    }
}

//! # Dataset Handle
//!
//! A read-only, label-indexed view over an [`ArrayStore`]. Opening a handle
//! reads the coordinate axes (`time`, optional `level`, `latitude`,
//! `longitude`); data variables are only described on demand and never read
//! here.

use crate::store::{ArrayInfo, ArrayStore, StoreError, StoreResult};
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use log::debug;
use std::fmt;

pub const TIME: &str = "time";
pub const LEVEL: &str = "level";
pub const LATITUDE: &str = "latitude";
pub const LONGITUDE: &str = "longitude";

/// Units assumed for a time axis without a `units` attribute.
pub const DEFAULT_TIME_UNITS: &str = "hours since 1900-01-01";

/// Step of a CF time encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeStep {
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeStep {
    fn seconds(self) -> f64 {
        match self {
            TimeStep::Seconds => 1.0,
            TimeStep::Minutes => 60.0,
            TimeStep::Hours => 3600.0,
            TimeStep::Days => 86400.0,
        }
    }
}

/// Parsed CF `"<step> since <epoch>"` time units.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeUnits {
    pub step: TimeStep,
    pub epoch: NaiveDateTime,
    /// Original attribute text, written back unchanged to output files
    pub raw: String,
}

impl TimeUnits {
    pub fn parse(units: &str) -> Result<Self, String> {
        let raw = units.trim().to_string();
        let (step, epoch) = raw
            .split_once(" since ")
            .ok_or_else(|| format!("expected '<unit> since <epoch>', got '{}'", raw))?;

        let step = match step.trim().to_ascii_lowercase().as_str() {
            "seconds" | "second" | "secs" | "s" => TimeStep::Seconds,
            "minutes" | "minute" | "mins" | "min" => TimeStep::Minutes,
            "hours" | "hour" | "hrs" | "h" => TimeStep::Hours,
            "days" | "day" | "d" => TimeStep::Days,
            other => return Err(format!("unsupported time step '{}'", other)),
        };

        Ok(TimeUnits {
            step,
            epoch: parse_epoch(epoch.trim())?,
            raw,
        })
    }

    /// Converts an encoded label into a timestamp (rounded to the second).
    ///
    /// Returns `None` for non-finite labels and for labels outside the
    /// representable date range.
    pub fn decode(&self, value: f64) -> Option<NaiveDateTime> {
        let seconds = (value * self.step.seconds()).round();
        if !seconds.is_finite() || seconds.abs() >= i64::MAX as f64 {
            return None;
        }
        let offset = Duration::try_seconds(seconds as i64)?;
        self.epoch.checked_add_signed(offset)
    }

    /// Converts a timestamp into the encoded label space.
    pub fn encode(&self, timestamp: NaiveDateTime) -> f64 {
        (timestamp - self.epoch).num_seconds() as f64 / self.step.seconds()
    }
}

impl Default for TimeUnits {
    fn default() -> Self {
        TimeUnits {
            step: TimeStep::Hours,
            epoch: NaiveDate::from_ymd_opt(1900, 1, 1)
                .map(|date| date.and_time(NaiveTime::MIN))
                .unwrap_or(NaiveDateTime::MIN),
            raw: DEFAULT_TIME_UNITS.to_string(),
        }
    }
}

fn parse_epoch(text: &str) -> Result<NaiveDateTime, String> {
    // Drop a trailing timezone designator; only UTC is used in practice
    let text = text
        .trim_end_matches(" UTC")
        .trim_end_matches('Z')
        .trim_end_matches(" +00:00")
        .trim();

    for format in [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ] {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(datetime);
        }
    }

    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map(|date| date.and_time(NaiveTime::MIN))
        .map_err(|_| format!("unparseable epoch '{}'", text))
}

/// A numeric coordinate axis.
#[derive(Debug, Clone, PartialEq)]
pub struct Axis {
    pub name: String,
    pub labels: Vec<f64>,
    pub units: Option<String>,
}

impl Axis {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Smallest and largest label, regardless of axis direction.
    pub fn bounds(&self) -> Option<(f64, f64)> {
        let first = *self.labels.first()?;
        let last = *self.labels.last()?;
        Some((first.min(last), first.max(last)))
    }

    pub fn is_ascending(&self) -> bool {
        self.labels.windows(2).all(|w| w[0] <= w[1])
    }
}

/// The time axis with its decoded units.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeAxis {
    pub axis: Axis,
    pub units: TimeUnits,
}

impl TimeAxis {
    pub fn timestamp(&self, index: usize) -> Option<NaiveDateTime> {
        self.axis.labels.get(index).and_then(|&v| self.units.decode(v))
    }

    pub fn first(&self) -> Option<NaiveDateTime> {
        self.timestamp(0)
    }

    pub fn last(&self) -> Option<NaiveDateTime> {
        self.timestamp(self.axis.len().checked_sub(1)?)
    }

    /// Indices of every timestamp on `date`, in axis order. The axis must be
    /// ascending, which holds for every reanalysis store.
    pub fn indices_on(&self, date: NaiveDate) -> std::ops::Range<usize> {
        let start = self.units.encode(date.and_time(NaiveTime::MIN));
        let end = match date.succ_opt() {
            Some(next) => self.units.encode(next.and_time(NaiveTime::MIN)),
            None => f64::INFINITY,
        };
        let labels = &self.axis.labels;
        let lo = labels.partition_point(|&v| v < start);
        let hi = labels.partition_point(|&v| v < end);
        lo..hi.max(lo)
    }
}

/// Label-indexed view of the coordinate space of a store.
pub struct DatasetHandle<'s> {
    store: &'s dyn ArrayStore,
    pub time: TimeAxis,
    pub level: Option<Axis>,
    pub latitude: Axis,
    pub longitude: Axis,
}

impl<'s> DatasetHandle<'s> {
    /// Reads the coordinate axes of `store`.
    pub fn open(store: &'s dyn ArrayStore) -> StoreResult<Self> {
        debug!("Opening dataset at {}", store.location());

        let time_axis = read_axis(store, TIME)?.ok_or_else(|| StoreError::MissingArray(TIME.to_string()))?;
        let units = match time_axis.units.as_deref() {
            Some(text) => TimeUnits::parse(text).map_err(|message| StoreError::Metadata {
                array: TIME.to_string(),
                message,
            })?,
            None => TimeUnits::default(),
        };

        let level = read_axis(store, LEVEL)?;
        let latitude =
            read_axis(store, LATITUDE)?.ok_or_else(|| StoreError::MissingArray(LATITUDE.to_string()))?;
        let longitude = read_axis(store, LONGITUDE)?
            .ok_or_else(|| StoreError::MissingArray(LONGITUDE.to_string()))?;

        debug!(
            "Axes: time={} level={} latitude={} longitude={}",
            time_axis.len(),
            level.as_ref().map(Axis::len).unwrap_or(0),
            latitude.len(),
            longitude.len()
        );

        Ok(DatasetHandle {
            store,
            time: TimeAxis {
                axis: time_axis,
                units,
            },
            level,
            latitude,
            longitude,
        })
    }

    pub fn location(&self) -> &str {
        self.store.location()
    }

    /// Describes a data variable without reading it.
    pub fn variable(&self, name: &str) -> StoreResult<Option<ArrayInfo>> {
        self.store.array_info(name)
    }

    /// Level labels as integers (hPa).
    pub fn level_values(&self) -> Vec<i64> {
        self.level
            .as_ref()
            .map(|axis| axis.labels.iter().map(|&v| v.round() as i64).collect())
            .unwrap_or_default()
    }
}

impl fmt::Debug for DatasetHandle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatasetHandle")
            .field("location", &self.store.location())
            .field("time", &self.time.axis.len())
            .field("level", &self.level.as_ref().map(Axis::len))
            .field("latitude", &self.latitude.len())
            .field("longitude", &self.longitude.len())
            .finish()
    }
}

fn read_axis(store: &dyn ArrayStore, name: &str) -> StoreResult<Option<Axis>> {
    let Some(info) = store.array_info(name)? else {
        return Ok(None);
    };
    let labels = store.read_labels(name)?;
    Ok(Some(Axis {
        name: name.to_string(),
        labels,
        units: info.units().map(str::to_string),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn ymd_hms(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_time_units_parse_and_decode() {
        let units = TimeUnits::parse("hours since 1900-01-01").unwrap();
        assert_eq!(units.step, TimeStep::Hours);
        assert_eq!(units.decode(0.0), Some(ymd_hms(1900, 1, 1, 0)));
        assert_eq!(units.decode(25.0), Some(ymd_hms(1900, 1, 2, 1)));
        assert_eq!(units.encode(ymd_hms(1900, 1, 2, 1)), 25.0);

        let units = TimeUnits::parse("days since 2000-01-01 00:00:00").unwrap();
        assert_eq!(units.decode(1.5), Some(ymd_hms(2000, 1, 2, 12)));

        let units = TimeUnits::parse("seconds since 1970-01-01T00:00:00Z").unwrap();
        assert_eq!(units.decode(3600.0), Some(ymd_hms(1970, 1, 1, 1)));

        assert!(TimeUnits::parse("fortnights since 1900-01-01").is_err());
        assert!(TimeUnits::parse("hours").is_err());
    }

    #[test]
    fn test_default_time_units() {
        let units = TimeUnits::default();
        assert_eq!(units.raw, DEFAULT_TIME_UNITS);
        assert_eq!(units.decode(24.0), Some(ymd_hms(1900, 1, 2, 0)));
    }

    #[test]
    fn test_decode_rejects_unrepresentable_labels() {
        let units = TimeUnits::default();
        assert_eq!(units.decode(1e20), None);
        assert_eq!(units.decode(-1e20), None);
        assert_eq!(units.decode(f64::NAN), None);
        assert_eq!(units.decode(f64::INFINITY), None);

        let axis = TimeAxis {
            axis: Axis {
                name: TIME.to_string(),
                labels: vec![1_078_200.0, 1e20],
                units: None,
            },
            units,
        };
        assert_eq!(axis.first(), Some(ymd_hms(2023, 1, 1, 0)));
        assert_eq!(axis.last(), None);
    }

    #[test]
    fn test_indices_on_day() {
        let units = TimeUnits::parse("hours since 2023-01-01").unwrap();
        let labels: Vec<f64> = (0..72).map(|h| h as f64).collect();
        let axis = TimeAxis {
            axis: Axis {
                name: TIME.to_string(),
                labels,
                units: Some(units.raw.clone()),
            },
            units,
        };

        let day = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
        assert_eq!(axis.indices_on(day), 24..48);

        let missing = NaiveDate::from_ymd_opt(2023, 2, 1).unwrap();
        assert!(axis.indices_on(missing).is_empty());
    }

    #[test]
    fn test_open_without_level_axis() {
        let mut store = MemoryStore::new("memory://surface-only");
        store.add_coordinate(TIME, vec![0.0, 1.0], Some("hours since 2023-01-01"));
        store.add_coordinate(LATITUDE, vec![1.0, 0.0], Some("degrees_north"));
        store.add_coordinate(LONGITUDE, vec![0.0, 1.0], Some("degrees_east"));

        let dataset = DatasetHandle::open(&store).unwrap();
        assert!(dataset.level.is_none());
        assert!(dataset.level_values().is_empty());
        assert!(!dataset.latitude.is_ascending());
        assert_eq!(dataset.latitude.bounds(), Some((0.0, 1.0)));
        assert_eq!(dataset.time.last(), Some(ymd_hms(2023, 1, 1, 1)));
    }

    #[test]
    fn test_open_requires_latitude() {
        let mut store = MemoryStore::new("memory://broken");
        store.add_coordinate(TIME, vec![0.0], None);
        store.add_coordinate(LONGITUDE, vec![0.0], None);
        assert!(matches!(
            DatasetHandle::open(&store),
            Err(StoreError::MissingArray(name)) if name == LATITUDE
        ));
    }
}

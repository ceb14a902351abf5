//! # Label-Based Axis Selection
//!
//! Translates label constraints (a latitude range, a list of pressure levels,
//! a calendar day) into index runs along one axis. An [`AxisSelection`] keeps
//! the contiguous half-open index runs that must be read from the store and
//! the labels of the selected points, in output order.
//!
//! Filters:
//!
//! - [`RangeFilter`]: inclusive label range, works on ascending and descending axes
//! - [`LongitudeFilter`]: inclusive range with ±360° wrap-around
//! - [`resolve_levels`]: exact level matches, collecting every invalid level

use crate::dataset::{Axis, TimeAxis};
use chrono::NaiveDate;
use std::collections::HashSet;
use std::ops::Range;

/// Labels closer than this are treated as equal.
pub const LABEL_TOLERANCE: f64 = 1e-6;

const LONGITUDE_SHIFTS: [f64; 3] = [-360.0, 0.0, 360.0];

/// Selected points of one axis.
#[derive(Debug, Clone, PartialEq)]
pub struct AxisSelection {
    /// Half-open index runs, in output order
    pub runs: Vec<Range<u64>>,
    /// Labels of the selected points, in output order
    pub labels: Vec<f64>,
}

impl AxisSelection {
    /// Selects every point of `axis`.
    pub fn full(axis: &Axis) -> Self {
        let runs = if axis.is_empty() {
            Vec::new()
        } else {
            vec![0..axis.len() as u64]
        };
        AxisSelection {
            runs,
            labels: axis.labels.clone(),
        }
    }

    /// Selects a single point.
    pub fn single(index: usize, label: f64) -> Self {
        AxisSelection {
            runs: vec![index as u64..index as u64 + 1],
            labels: vec![label],
        }
    }

    /// Selects `indices` (in the given order) of `labels`, merging
    /// consecutive indices into runs.
    pub fn from_indices(labels: &[f64], indices: &[usize]) -> Self {
        let points: Vec<(usize, f64, f64)> = indices
            .iter()
            .map(|&i| (i, 0.0, labels[i]))
            .collect();
        Self::from_points(&points)
    }

    /// Builds runs from `(index, shift, output_label)` points.
    fn from_points(points: &[(usize, f64, f64)]) -> Self {
        let mut runs: Vec<Range<u64>> = Vec::new();
        let mut labels = Vec::with_capacity(points.len());
        let mut previous: Option<(usize, f64)> = None;

        for &(index, shift, label) in points {
            let extends = matches!(previous, Some((p, s)) if p + 1 == index && s == shift);
            match runs.last_mut() {
                Some(run) if extends => run.end += 1,
                _ => runs.push(index as u64..index as u64 + 1),
            }
            labels.push(label);
            previous = Some((index, shift));
        }

        AxisSelection { runs, labels }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// A label constraint on one axis.
pub trait AxisFilter {
    fn apply(&self, axis: &Axis) -> AxisSelection;
}

/// Inclusive `[min, max]` range on the labels, kept in axis order.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeFilter {
    pub min: f64,
    pub max: f64,
}

impl RangeFilter {
    pub fn new(min: f64, max: f64) -> Self {
        RangeFilter { min, max }
    }

    fn contains(&self, value: f64) -> bool {
        value >= self.min - LABEL_TOLERANCE && value <= self.max + LABEL_TOLERANCE
    }
}

impl AxisFilter for RangeFilter {
    fn apply(&self, axis: &Axis) -> AxisSelection {
        let indices: Vec<usize> = axis
            .labels
            .iter()
            .enumerate()
            .filter(|(_, v)| self.contains(**v))
            .map(|(i, _)| i)
            .collect();
        AxisSelection::from_indices(&axis.labels, &indices)
    }
}

/// Inclusive longitude range that also matches labels shifted by ±360°.
///
/// A box given in -180..180 against a 0..360 axis (or the reverse) selects the
/// same points as the native box. When the box crosses the seam of the axis
/// the result holds two runs whose labels are rewritten into the box's frame,
/// so the output coordinate stays monotonic.
#[derive(Debug, Clone, PartialEq)]
pub struct LongitudeFilter {
    pub range: RangeFilter,
}

impl LongitudeFilter {
    pub fn new(min: f64, max: f64) -> Self {
        LongitudeFilter {
            range: RangeFilter::new(min, max),
        }
    }
}

impl AxisFilter for LongitudeFilter {
    fn apply(&self, axis: &Axis) -> AxisSelection {
        let ascending = axis.is_ascending();
        let mut shifts = LONGITUDE_SHIFTS;
        if !ascending {
            shifts.reverse();
        }

        let mut seen = HashSet::new();
        let mut points = Vec::new();
        for shift in shifts {
            for (index, &label) in axis.labels.iter().enumerate() {
                let shifted = label + shift;
                if self.range.contains(shifted) && seen.insert(index) {
                    points.push((index, shift, shifted));
                }
            }
        }

        AxisSelection::from_points(&points)
    }
}

/// Matches requested levels against the level axis.
///
/// Returns `(level, index)` pairs in request order with duplicates removed,
/// or every level that is not on the axis. A missing axis makes every
/// requested level invalid.
pub fn resolve_levels(
    axis: Option<&Axis>,
    requested: &[i64],
) -> Result<Vec<(i64, usize)>, Vec<i64>> {
    let mut resolved = Vec::new();
    let mut invalid = Vec::new();
    let mut seen = HashSet::new();

    for &level in requested {
        if !seen.insert(level) {
            continue;
        }
        let index = axis.and_then(|axis| {
            axis.labels
                .iter()
                .position(|&v| (v - level as f64).abs() <= LABEL_TOLERANCE)
        });
        match index {
            Some(index) => resolved.push((level, index)),
            None => invalid.push(level),
        }
    }

    if invalid.is_empty() {
        Ok(resolved)
    } else {
        Err(invalid)
    }
}

/// Which timestamps of the requested day to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HourSelection {
    /// First available timestamp of the day
    #[default]
    First,
    /// The timestamp at this hour
    Exact(u32),
    /// Every timestamp of the day
    AllDay,
}

/// Selects timestamps on `date` according to `hours`. Returns `None` when the
/// store has no matching timestamp.
pub fn select_time(time: &TimeAxis, date: NaiveDate, hours: HourSelection) -> Option<AxisSelection> {
    let day = time.indices_on(date);
    if day.is_empty() {
        return None;
    }

    let labels = &time.axis.labels;
    let indices: Vec<usize> = match hours {
        HourSelection::First => vec![day.start],
        HourSelection::AllDay => day.collect(),
        HourSelection::Exact(hour) => {
            let target = time.units.encode(date.and_hms_opt(hour, 0, 0)?);
            day.into_iter()
                .find(|&i| (labels[i] - target).abs() <= LABEL_TOLERANCE)
                .into_iter()
                .collect()
        }
    };

    if indices.is_empty() {
        None
    } else {
        Some(AxisSelection::from_indices(labels, &indices))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::TimeUnits;

    fn axis(name: &str, labels: Vec<f64>) -> Axis {
        Axis {
            name: name.to_string(),
            labels,
            units: None,
        }
    }

    /// 0.25° global latitude axis, north to south.
    fn latitude_axis() -> Axis {
        axis("latitude", (0..=720).map(|i| 90.0 - i as f64 * 0.25).collect())
    }

    /// 0.25° longitude axis in [0, 360).
    fn longitude_axis() -> Axis {
        axis("longitude", (0..1440).map(|i| i as f64 * 0.25).collect())
    }

    #[test]
    fn test_range_filter_descending_axis() {
        let selection = RangeFilter::new(35.0, 60.0).apply(&latitude_axis());
        assert_eq!(selection.runs, vec![120..221]);
        assert_eq!(selection.len(), 101);
        assert_eq!(selection.labels.first(), Some(&60.0));
        assert_eq!(selection.labels.last(), Some(&35.0));
        assert!(selection.labels.iter().all(|&v| (35.0..=60.0).contains(&v)));
    }

    #[test]
    fn test_range_filter_ascending_axis_inclusive() {
        let ascending = axis("latitude", vec![-1.0, -0.5, 0.0, 0.5, 1.0]);
        let selection = RangeFilter::new(-0.5, 0.5).apply(&ascending);
        assert_eq!(selection.runs, vec![1..4]);
        assert_eq!(selection.labels, vec![-0.5, 0.0, 0.5]);
    }

    #[test]
    fn test_range_filter_between_grid_points_is_empty() {
        let selection = RangeFilter::new(10.1, 10.2).apply(&latitude_axis());
        assert!(selection.is_empty());
        assert!(selection.runs.is_empty());
    }

    #[test]
    fn test_longitude_filter_crossing_seam() {
        let selection = LongitudeFilter::new(-10.0, 30.0).apply(&longitude_axis());
        assert_eq!(selection.runs, vec![1400..1440, 0..121]);
        assert_eq!(selection.len(), 161);
        assert_eq!(selection.labels.first(), Some(&-10.0));
        assert_eq!(selection.labels.last(), Some(&30.0));
        assert!(selection.labels.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_longitude_filter_native_frame() {
        let selection = LongitudeFilter::new(10.0, 20.0).apply(&longitude_axis());
        assert_eq!(selection.runs, vec![40..81]);
        assert_eq!(selection.labels[0], 10.0);
    }

    #[test]
    fn test_longitude_filter_signed_axis_with_positive_box() {
        let signed = axis("longitude", (0..360).map(|i| -180.0 + i as f64).collect());
        let selection = LongitudeFilter::new(170.0, 190.0).apply(&signed);
        // 170..=179 natively, then -180..=-170 shifted to 180..=190
        assert_eq!(selection.runs, vec![350..360, 0..11]);
        assert_eq!(selection.labels.first(), Some(&170.0));
        assert_eq!(selection.labels.last(), Some(&190.0));
    }

    #[test]
    fn test_longitude_filter_full_circle_has_no_duplicates() {
        let selection = LongitudeFilter::new(0.0, 360.0).apply(&longitude_axis());
        assert_eq!(selection.len(), 1440);
        assert_eq!(selection.runs, vec![0..1440]);
    }

    #[test]
    fn test_resolve_levels_collects_all_invalid() {
        let levels = axis("level", vec![1.0, 500.0, 850.0, 1000.0]);
        assert_eq!(
            resolve_levels(Some(&levels), &[850, 500, 850]),
            Ok(vec![(850, 2), (500, 1)])
        );
        assert_eq!(
            resolve_levels(Some(&levels), &[850, 99999, 3]),
            Err(vec![99999, 3])
        );
        assert_eq!(resolve_levels(None, &[850]), Err(vec![850]));
    }

    #[test]
    fn test_select_time_modes() {
        let units = TimeUnits::parse("hours since 2023-01-01").unwrap();
        let time = TimeAxis {
            axis: axis("time", (0..48).map(|h| h as f64).collect()),
            units,
        };
        let day = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();

        let first = select_time(&time, day, HourSelection::First).unwrap();
        assert_eq!(first.runs, vec![24..25]);

        let exact = select_time(&time, day, HourSelection::Exact(6)).unwrap();
        assert_eq!(exact.labels, vec![30.0]);

        let all = select_time(&time, day, HourSelection::AllDay).unwrap();
        assert_eq!(all.runs, vec![24..48]);

        let missing = NaiveDate::from_ymd_opt(2023, 1, 3).unwrap();
        assert!(select_time(&time, missing, HourSelection::First).is_none());
    }

    #[test]
    fn test_select_time_exact_hour_missing() {
        let units = TimeUnits::parse("hours since 2023-01-01").unwrap();
        let six_hourly = TimeAxis {
            axis: axis("time", vec![0.0, 6.0, 12.0, 18.0]),
            units,
        };
        let day = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        assert!(select_time(&six_hourly, day, HourSelection::Exact(3)).is_none());
        assert_eq!(
            select_time(&six_hourly, day, HourSelection::Exact(12)).unwrap().labels,
            vec![12.0]
        );
    }
}

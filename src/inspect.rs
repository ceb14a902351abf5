//! # NetCDF Inspection Module
//!
//! Opens one file produced by a fetch, selects its data variable, and reports
//! summary statistics over the whole variable together with an annotated PNG
//! map of a 2-D (latitude × longitude) slice. Files with several timesteps
//! also get a chart of the spatial mean per timestep.
//!
//! Reduction rules: dimensions of length 1 are dropped; the spatial pair is
//! found by name (`latitude`/`lat`/`y` and `longitude`/`lon`/`x`, falling back
//! to the last two dimensions); every other dimension is fixed at the first
//! index combination that holds valid data, and the reduction is spelled out
//! in the caption. Statistics ignore NaN and the variable's
//! `_FillValue`/`missing_value`.

use crate::dataset::{LATITUDE, LEVEL, LONGITUDE, TIME, TimeUnits};
use crate::figure::{self, Annotation, TimeSeries};
use crate::render::{self, Colormap, Field};
use crate::storage::{Storage, StorageBackend, StorageError, is_s3_path, join_location};
use anyhow::Context;
use image::RgbaImage;
use log::{debug, warn};
use ndarray::{ArrayD, Axis, IxDyn};
use serde::Serialize;
use std::path::Path;
use thiserror::Error;

/// Errors raised while inspecting a file
#[derive(Error, Debug)]
pub enum InspectError {
    #[error("Failed to open {path}: {message}")]
    Open { path: String, message: String },

    #[error("No data variable found in {0}")]
    NoDataVariable(String),

    #[error("Several data variables in {path}: {}. Choose one with --variable", .candidates.join(", "))]
    AmbiguousVariable { path: String, candidates: Vec<String> },

    #[error("Variable '{name}' not found in {path} (available: {})", .available.join(", "))]
    UnknownVariable {
        path: String,
        name: String,
        available: Vec<String>,
    },

    #[error("Failed to read variable '{variable}': {message}")]
    Read { variable: String, message: String },

    #[error("Failed to render {path}: {message}")]
    Render { path: String, message: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Summary statistics over the valid values of a variable.
/// `None` when every value is no-data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldStats {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub valid_count: usize,
    pub total_count: usize,
}

impl FieldStats {
    pub fn compute<'a>(values: impl IntoIterator<Item = &'a f32>, fill_value: Option<f32>) -> Self {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;
        let mut valid_count = 0;
        let mut total_count = 0;

        for &value in values {
            total_count += 1;
            if is_no_data(value, fill_value) {
                continue;
            }
            let value = value as f64;
            min = min.min(value);
            max = max.max(value);
            sum += value;
            valid_count += 1;
        }

        let defined = |v: f64| (valid_count > 0).then_some(v);
        FieldStats {
            min: defined(min),
            max: defined(max),
            mean: defined(sum / valid_count.max(1) as f64),
            valid_count,
            total_count,
        }
    }

    pub fn is_defined(&self) -> bool {
        self.valid_count > 0
    }
}

fn is_no_data(value: f32, fill_value: Option<f32>) -> bool {
    !value.is_finite() || fill_value.is_some_and(|fill| value == fill)
}

/// Extent of a numeric coordinate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoordinateRange {
    pub name: String,
    pub min: f64,
    pub max: f64,
    pub len: usize,
    pub units: Option<String>,
}

/// Extent of a decoded time coordinate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeRange {
    pub start: String,
    pub end: String,
    pub len: usize,
}

/// Spatial mean of the variable at each timestep.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSeriesReport {
    /// Path of the chart, set once it has been written
    pub image: Option<String>,
    pub timestamps: Vec<String>,
    pub means: Vec<Option<f64>>,
}

/// Everything reported about an inspected file.
#[derive(Debug, Clone, Serialize)]
pub struct InspectReport {
    pub path: String,
    pub variable: String,
    pub long_name: Option<String>,
    pub units: Option<String>,
    pub dimensions: Vec<String>,
    /// Shape of the variable as stored; the statistics cover all of it
    pub shape: Vec<usize>,
    /// Shape of the 2-D slice that is rendered
    pub slice_shape: Vec<usize>,
    pub stats: FieldStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<CoordinateRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<CoordinateRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<TimeRange>,
    pub title: String,
    pub caption: String,
    pub colormap: String,
    /// Path of the rendering, `None` when it was skipped
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_series: Option<TimeSeriesReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// A variable read from the file.
struct LoadedVariable {
    name: String,
    dims: Vec<String>,
    data: ArrayD<f32>,
    fill_value: Option<f32>,
    units: Option<String>,
    long_name: Option<String>,
}

/// Encoded PNGs produced by [`analyze`].
struct Renderings {
    map: Option<Vec<u8>>,
    time_series: Option<Vec<u8>>,
}

/// Inspects `file_path` (local or `s3://`) and writes the renderings into
/// `output_dir`.
pub async fn inspect_file(
    file_path: &str,
    output_dir: &str,
    variable: Option<&str>,
) -> Result<InspectReport, InspectError> {
    // Keep the temporary copy alive until the file has been read
    let (_temp_file, local_path) = if is_s3_path(file_path) {
        let storage = Storage::for_path(file_path).await?;
        let data = storage.read(file_path).await?;
        let temp_file = tempfile::NamedTempFile::new().map_err(|e| InspectError::Open {
            path: file_path.to_string(),
            message: e.to_string(),
        })?;
        debug!("Writing S3 data to temporary path: {:?}", temp_file.path());
        tokio::fs::write(temp_file.path(), data)
            .await
            .map_err(|e| InspectError::Open {
                path: file_path.to_string(),
                message: e.to_string(),
            })?;
        let local = temp_file.path().to_string_lossy().to_string();
        (Some(temp_file), local)
    } else {
        (None, file_path.to_string())
    };

    let (mut report, renderings) = analyze(file_path, &local_path, variable)?;

    match renderings.map {
        Some(png) => {
            let image = join_location(output_dir, &image_name(file_path));
            Storage::for_path(&image).await?.write(&image, &png).await?;
            report.image = Some(image);
        }
        None => {
            let message = "every value is no-data; statistics are undefined and no image was rendered";
            warn!("{}: {}", file_path, message);
            report.warning = Some(message.to_string());
        }
    }

    if let (Some(series), Some(png)) = (report.time_series.as_mut(), renderings.time_series) {
        let chart = join_location(output_dir, &time_series_name(&report.variable));
        Storage::for_path(&chart).await?.write(&chart, &png).await?;
        series.image = Some(chart);
    }

    Ok(report)
}

/// `{base name}.png`
pub fn image_name(file_path: &str) -> String {
    let base = file_path.rsplit('/').next().unwrap_or(file_path);
    let stem = Path::new(base)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| base.to_string());
    format!("{}.png", stem)
}

/// `{variable}_time_series.png`
pub fn time_series_name(variable: &str) -> String {
    format!("{}_time_series.png", variable)
}

fn open(display_path: &str, local_path: &str) -> Result<netcdf::File, InspectError> {
    debug!("Opening NetCDF file: {}", local_path);
    netcdf::open(local_path).map_err(|e| InspectError::Open {
        path: display_path.to_string(),
        message: e.to_string(),
    })
}

/// Reads the file, computes the report and encodes the renderings (`None`
/// when there is nothing to draw).
fn analyze(
    display_path: &str,
    local_path: &str,
    requested: Option<&str>,
) -> Result<(InspectReport, Renderings), InspectError> {
    let file = open(display_path, local_path)?;
    let loaded = load_variable(&file, display_path, requested)?;
    let stats = FieldStats::compute(&loaded.data, loaded.fill_value);
    let slice = reduce(&loaded, &file);

    let latitude = coordinate_range(&file, LATITUDE);
    let longitude = coordinate_range(&file, LONGITUDE);
    let time = time_range(&file);
    let level = read_coordinate(&file, LEVEL).and_then(|(values, _)| {
        (values.len() == 1).then(|| values[0])
    });

    let mut title = match &loaded.long_name {
        Some(long_name) => format!("{} ({})", long_name, loaded.name),
        None => loaded.name.clone(),
    };
    if let Some(level) = level {
        title.push_str(&format!(" at {} hPa", level));
    }
    if let Some(units) = &loaded.units {
        title.push_str(&format!(" [{}]", units));
    }

    let caption = if slice.reductions.is_empty() {
        format!("Full {} field", slice.shape_label())
    } else {
        format!(
            "{} slice taken at {}",
            slice.shape_label(),
            slice.reductions.join(", ")
        )
    };

    let time_series = if stats.is_defined() {
        spatial_means(&loaded, &file)
    } else {
        None
    };

    let report = InspectReport {
        path: display_path.to_string(),
        variable: loaded.name.clone(),
        long_name: loaded.long_name.clone(),
        units: loaded.units.clone(),
        dimensions: loaded.dims.clone(),
        shape: loaded.data.shape().to_vec(),
        slice_shape: vec![slice.height, slice.width],
        stats,
        level,
        latitude,
        longitude,
        time,
        title,
        caption,
        colormap: Colormap::for_variable(&loaded.name).name().to_string(),
        image: None,
        time_series,
        warning: None,
    };

    let renderings = Renderings {
        map: render_slice(&report, &loaded, &slice)?,
        time_series: render_time_series(&report)?,
    };
    Ok((report, renderings))
}

fn encode_png(report: &InspectReport, image: &RgbaImage, title: &str, description: &str) -> Result<Vec<u8>, InspectError> {
    render::create_png(
        image.as_raw(),
        image.width() as usize,
        image.height() as usize,
        &[("Title", title), ("Description", description)],
    )
    .map_err(|e| InspectError::Render {
        path: report.path.clone(),
        message: e.to_string(),
    })
}

fn render_slice(
    report: &InspectReport,
    loaded: &LoadedVariable,
    slice: &Slice,
) -> Result<Option<Vec<u8>>, InspectError> {
    let (Some(min), Some(max)) = (report.stats.min, report.stats.max) else {
        return Ok(None);
    };

    let field = Field {
        values: &slice.values,
        width: slice.width,
        height: slice.height,
        fill_value: loaded.fill_value,
        flip_rows: slice.south_up,
    };
    let colormap = Colormap::for_variable(&loaded.name);
    let pixels = render::render_field(&field, colormap, min as f32, max as f32);

    let factor = render::upscale_factor(slice.width, slice.height);
    let pixels = render::upscale(&pixels, slice.width, slice.height, factor);
    let map = RgbaImage::from_raw((slice.width * factor) as u32, (slice.height * factor) as u32, pixels)
        .ok_or_else(|| InspectError::Render {
            path: report.path.clone(),
            message: "pixel buffer does not match the slice shape".to_string(),
        })?;

    let figure = figure::annotate_map(
        &map,
        &Annotation {
            title: &report.title,
            caption: &report.caption,
            units: report.units.as_deref(),
            min: min as f32,
            max: max as f32,
            colormap,
        },
    );

    encode_png(report, &figure, &report.title, &report.caption).map(Some)
}

fn render_time_series(report: &InspectReport) -> Result<Option<Vec<u8>>, InspectError> {
    let Some(series) = &report.time_series else {
        return Ok(None);
    };

    let title = format!("Spatial mean of {}", report.variable);
    let chart = figure::time_series_chart(&TimeSeries {
        title: &title,
        units: report.units.as_deref(),
        labels: &series.timestamps,
        values: &series.means,
    });

    let description = format!("{} timesteps", series.means.len());
    encode_png(report, &chart, &title, &description).map(Some)
}

/// Mean over every non-time dimension for each timestep, when the variable
/// has more than one.
fn spatial_means(loaded: &LoadedVariable, file: &netcdf::File) -> Option<TimeSeriesReport> {
    let axis = loaded.dims.iter().position(|dim| dim == TIME)?;
    let len = loaded.data.shape()[axis];
    if len < 2 {
        return None;
    }

    let means = loaded
        .data
        .axis_iter(Axis(axis))
        .map(|step| FieldStats::compute(&step, loaded.fill_value).mean)
        .collect();

    let timestamps = match time_coordinate(file) {
        Some((values, units)) if values.len() == len => {
            values.iter().map(|&v| format_time(&units, v)).collect()
        }
        _ => (0..len).map(|i| format!("{}[{}]", TIME, i)).collect(),
    };

    Some(TimeSeriesReport {
        image: None,
        timestamps,
        means,
    })
}

fn load_variable(
    file: &netcdf::File,
    display_path: &str,
    requested: Option<&str>,
) -> Result<LoadedVariable, InspectError> {
    let dimension_names: Vec<String> = file.dimensions().map(|d| d.name()).collect();
    let candidates: Vec<String> = file
        .variables()
        .map(|v| v.name())
        .filter(|name| !dimension_names.contains(name))
        .collect();

    let name = match requested {
        Some(name) => {
            if file.variable(name).is_none() {
                return Err(InspectError::UnknownVariable {
                    path: display_path.to_string(),
                    name: name.to_string(),
                    available: candidates,
                });
            }
            name.to_string()
        }
        None => match candidates.as_slice() {
            [] => return Err(InspectError::NoDataVariable(display_path.to_string())),
            [single] => single.clone(),
            _ => {
                return Err(InspectError::AmbiguousVariable {
                    path: display_path.to_string(),
                    candidates,
                });
            }
        },
    };

    let var = file
        .variable(&name)
        .ok_or_else(|| InspectError::NoDataVariable(display_path.to_string()))?;
    let read_error = |e: netcdf::Error| InspectError::Read {
        variable: name.clone(),
        message: e.to_string(),
    };

    let dims: Vec<String> = var.dimensions().iter().map(|d| d.name()).collect();
    let shape: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();
    let values = var.get_values::<f32, _>(..).map_err(read_error)?;
    let data = ArrayD::from_shape_vec(IxDyn(&shape), values).map_err(|e| InspectError::Read {
        variable: name.clone(),
        message: e.to_string(),
    })?;

    let fill_value = numeric_attribute(&var, "_FillValue").or_else(|| numeric_attribute(&var, "missing_value"));

    Ok(LoadedVariable {
        units: string_attribute(&var, "units"),
        long_name: string_attribute(&var, "long_name"),
        name,
        dims,
        data,
        fill_value,
    })
}

/// A 2-D slice of a variable, row-major.
struct Slice {
    values: Vec<f32>,
    height: usize,
    width: usize,
    /// Rows run south to north
    south_up: bool,
    /// Human-readable description of each index taken
    reductions: Vec<String>,
}

impl Slice {
    fn shape_label(&self) -> String {
        format!("{}×{}", self.height, self.width)
    }
}

fn is_latitude(dim: &str) -> bool {
    matches!(dim, "latitude" | "lat" | "y")
}

fn is_longitude(dim: &str) -> bool {
    matches!(dim, "longitude" | "lon" | "x")
}

fn reduce(loaded: &LoadedVariable, file: &netcdf::File) -> Slice {
    let mut data = loaded.data.view();
    let mut dims = loaded.dims.clone();

    // Drop length-1 dimensions, last first so indices stay valid
    for axis in (0..dims.len()).rev() {
        if data.shape()[axis] == 1 && data.ndim() > 1 {
            data = data.index_axis_move(Axis(axis), 0);
            dims.remove(axis);
        }
    }

    let row = dims.iter().position(|d| is_latitude(d));
    let column = dims.iter().position(|d| is_longitude(d));
    let spatial: Vec<usize> = match (row, column) {
        (Some(row), Some(column)) => vec![row, column],
        _ if dims.len() >= 2 => vec![dims.len() - 2, dims.len() - 1],
        _ => (0..dims.len()).collect(),
    };
    let extras: Vec<usize> = (0..dims.len()).filter(|axis| !spatial.contains(axis)).collect();

    let shape = data.shape().to_vec();
    let order: Vec<usize> = extras.iter().chain(&spatial).copied().collect();
    // Logical order iteration is row-major over the permuted axes
    let ordered: Vec<f32> = data.permuted_axes(IxDyn(&order)).iter().copied().collect();

    let plane: usize = spatial.iter().map(|&axis| shape[axis]).product();
    let slices = if plane == 0 { 0 } else { ordered.len() / plane };
    let chosen = (0..slices)
        .find(|&k| {
            ordered[k * plane..(k + 1) * plane]
                .iter()
                .any(|&v| !is_no_data(v, loaded.fill_value))
        })
        .unwrap_or(0);

    // Unravel the chosen slice into one index per extra dimension
    let mut remainder = chosen;
    let mut indices = vec![0; extras.len()];
    for (position, &axis) in extras.iter().enumerate().rev() {
        let len = shape[axis].max(1);
        indices[position] = remainder % len;
        remainder /= len;
    }
    let reductions = extras
        .iter()
        .zip(&indices)
        .map(|(&axis, &index)| describe_index(file, &dims[axis], index, shape[axis]))
        .collect();

    let (height, width) = match spatial.as_slice() {
        [row, column] => (shape[*row], shape[*column]),
        [column] => (1, shape[*column]),
        _ => (1, 1),
    };

    let south_up = spatial.len() == 2
        && is_latitude(&dims[spatial[0]])
        && read_coordinate(file, &dims[spatial[0]])
            .is_some_and(|(values, _)| values.len() > 1 && values[0] < values[values.len() - 1]);

    Slice {
        values: ordered
            .get(chosen * plane..(chosen + 1) * plane)
            .map(<[f32]>::to_vec)
            .unwrap_or_default(),
        height,
        width,
        south_up,
        reductions,
    }
}

fn describe_index(file: &netcdf::File, dim: &str, index: usize, len: usize) -> String {
    let label = match read_coordinate(file, dim) {
        Some((values, units)) => match values.get(index) {
            Some(&value) if dim == TIME => {
                let units = parse_time_units(units.as_deref());
                match units.decode(value) {
                    Some(timestamp) => format!(" = {}", timestamp.format("%Y-%m-%d %H:%M")),
                    None => format!(" = {}", value),
                }
            }
            Some(value) => format!(" = {}", value),
            None => String::new(),
        },
        None => String::new(),
    };
    format!("{}[{}]{} (of {})", dim, index, label, len)
}

fn read_coordinate(file: &netcdf::File, name: &str) -> Option<(Vec<f64>, Option<String>)> {
    let var = file.variable(name)?;
    let values = var.get_values::<f64, _>(..).ok()?;
    Some((values, string_attribute(&var, "units")))
}

fn coordinate_range(file: &netcdf::File, name: &str) -> Option<CoordinateRange> {
    let (values, units) = read_coordinate(file, name)?;
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    (!values.is_empty()).then(|| CoordinateRange {
        name: name.to_string(),
        min,
        max,
        len: values.len(),
        units,
    })
}

fn parse_time_units(units: Option<&str>) -> TimeUnits {
    units
        .and_then(|u| TimeUnits::parse(u).ok())
        .unwrap_or_default()
}

fn time_coordinate(file: &netcdf::File) -> Option<(Vec<f64>, TimeUnits)> {
    let (values, units) = read_coordinate(file, TIME)?;
    Some((values, parse_time_units(units.as_deref())))
}

fn format_time(units: &TimeUnits, value: f64) -> String {
    match units.decode(value) {
        Some(timestamp) => timestamp.format("%Y-%m-%d %H:%M").to_string(),
        None => format!("{} ({})", value, units.raw),
    }
}

fn time_range(file: &netcdf::File) -> Option<TimeRange> {
    let (values, units) = time_coordinate(file)?;
    Some(TimeRange {
        start: format_time(&units, *values.first()?),
        end: format_time(&units, *values.last()?),
        len: values.len(),
    })
}

fn string_attribute(var: &netcdf::Variable<'_>, name: &str) -> Option<String> {
    match var.attribute(name)?.value().ok()? {
        netcdf::AttributeValue::Str(value) => Some(value),
        _ => None,
    }
}

fn numeric_attribute(var: &netcdf::Variable<'_>, name: &str) -> Option<f32> {
    match var.attribute(name)?.value().ok()? {
        netcdf::AttributeValue::Float(value) => Some(value),
        netcdf::AttributeValue::Double(value) => Some(value as f32),
        netcdf::AttributeValue::Int(value) => Some(value as f32),
        netcdf::AttributeValue::Short(value) => Some(value as f32),
        _ => None,
    }
}

fn format_stat(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.4}", v))
        .unwrap_or_else(|| "undefined".to_string())
}

/// Print the report in human-readable format
pub fn print_report_human(report: &InspectReport) {
    println!("NetCDF Inspection:");
    println!("  Path: {}", report.path);
    println!("  Variable: {}", report.variable);
    if let Some(long_name) = &report.long_name {
        println!("  Long name: {}", long_name);
    }
    if let Some(units) = &report.units {
        println!("  Units: {}", units);
    }
    println!(
        "  Dimensions: [{}] shape {:?}",
        report.dimensions.join(", "),
        report.shape
    );
    println!("  Slice shape: {:?}", report.slice_shape);
    if let Some(level) = report.level {
        println!("  Level: {}", level);
    }
    for range in [&report.latitude, &report.longitude].into_iter().flatten() {
        println!(
            "  {}: {} to {} ({} points{})",
            range.name,
            range.min,
            range.max,
            range.len,
            range
                .units
                .as_ref()
                .map(|u| format!(", {}", u))
                .unwrap_or_default()
        );
    }
    if let Some(time) = &report.time {
        println!("  time: {} to {} ({} steps)", time.start, time.end, time.len);
    }
    println!("  Statistics:");
    println!("    min:  {}", format_stat(report.stats.min));
    println!("    max:  {}", format_stat(report.stats.max));
    println!("    mean: {}", format_stat(report.stats.mean));
    println!(
        "    valid values: {} of {}",
        report.stats.valid_count, report.stats.total_count
    );
    println!("  Title: {}", report.title);
    println!("  Caption: {}", report.caption);
    match &report.image {
        Some(image) => println!("  Rendering ({}): {}", report.colormap, image),
        None => println!("  Rendering: skipped"),
    }
    if let Some(series) = &report.time_series {
        println!("  Spatial mean per timestep:");
        for (timestamp, mean) in series.timestamps.iter().zip(&series.means) {
            println!("    {}: {}", timestamp, format_stat(*mean));
        }
        if let Some(image) = &series.image {
            println!("  Time series: {}", image);
        }
    }
    if let Some(warning) = &report.warning {
        println!("  Warning: {}", warning);
    }
}

/// Print the report in JSON format
pub fn print_report_json(report: &InspectReport) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

/// Print the report in YAML format
pub fn print_report_yaml(report: &InspectReport) -> anyhow::Result<()> {
    let yaml = serde_yaml::to_string(report).context("Failed to serialize report to YAML")?;
    println!("{}", yaml);
    Ok(())
}

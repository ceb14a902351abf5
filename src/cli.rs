//! # CLI Module
//!
//! This module provides the command-line interface for era5fetch, including:
//! - Argument parsing with clap
//! - Request file loading (JSON/YAML)
//! - Environment variable support with the ERA5FETCH_ prefix
//! - Merging of file, environment and command-line values
//! - Request templates and shell completions

use crate::error::ConfigError;
use crate::request::{DEFAULT_OUTPUT_DIR, FetchRequest};
use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

/// Default directory for renderings written by `inspect`.
pub const DEFAULT_PLOT_DIR: &str = "./plots";

/// Fetch subsets of the ERA5 reanalysis into compressed NetCDF files
#[derive(Parser, Debug)]
#[command(name = "era5fetch")]
#[command(about = "Fetch ERA5 reanalysis subsets from the ARCO Zarr store into NetCDF files")]
#[command(version)]
#[command(long_about = "
era5fetch retrieves date, variable, pressure-level and region subsets of the ERA5
reanalysis from its analysis-ready Zarr store and writes one compressed NetCDF-4 file
per variable and level. Produced files can be inspected and plotted.

FEATURES:
  • Variable catalog: canonical names and short aliases (t, t2m, msl, ...)
  • Validation first: unknown variables, invalid levels and empty regions fail before download
  • Regions across the 0°/360° seam and descending latitude axes
  • Request files: JSON and YAML with templates
  • Inspection: statistics and a PNG rendering of any produced file
  • Shell completions: bash, zsh, fish and PowerShell

EXAMPLES:
  # Temperature at 850 hPa over Europe
  era5fetch fetch --year 2023 --month 1 --day 1 --variables temperature \\
    --levels 850 --lat_min 35 --lat_max 60 --lon_min -10 --lon_max 30

  # Default variables, all levels, whole globe
  era5fetch fetch --year 2023 --month 1 --day 1

  # Preview the files a request would produce
  era5fetch fetch --config january.yaml --dry-run

  # Inspect a produced file
  era5fetch inspect ./data/temperature_850_20230101.nc

  # List known variables
  era5fetch variables
")]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet mode - suppress all output except errors and written paths
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Output format for structured data
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Human)]
    pub output_format: OutputFormat,

    /// Request file path (JSON or YAML)
    #[arg(short, long, global = true, env = "ERA5FETCH_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch a subset of the reanalysis into NetCDF files
    #[command(long_about = "
Fetch one day of ERA5 data into compressed NetCDF files.

One file is written per (variable, level) for pressure-level variables and one per
surface variable, named {variable}_{level}_{YYYYMMDD}.nc or {variable}_sfc_{YYYYMMDD}.nc.
Every requested level and the bounding box are validated against the store before any
data is transferred. Existing files are overwritten.

EXAMPLES:
  # Single level over a region
  era5fetch fetch --year 2023 --month 1 --day 1 --variables t --levels 850 \\
    --lat_min 35 --lat_max 60 --lon_min -10 --lon_max 30

  # Surface fields for every hour of the day
  era5fetch fetch --year 2023 --month 7 --day 14 --variables t2m msl --all_hours

  # A specific hour, written to S3
  era5fetch fetch --year 2023 --month 1 --day 1 --hour 12 --output_dir s3://bucket/era5

  # Request file with command-line overrides
  era5fetch fetch --config base.yaml --day 2
")]
    Fetch(FetchArgs),

    /// Summarize and plot a NetCDF file
    #[command(long_about = "
Inspect a NetCDF file produced by `fetch` and render it as a PNG.

The single data variable is reduced to a latitude × longitude slice: dimensions of
length 1 are dropped and index 0 is taken along any remaining extra dimension. The
summary reports min, max and mean (ignoring no-data) and the shape.

EXAMPLES:
  # Default plot directory ./plots
  era5fetch inspect ./data/2m_temperature_sfc_20230101.nc

  # Custom plot directory and JSON summary
  era5fetch inspect ./data/temperature_850_20230101.nc ./figures --format json

  # File stored in S3
  era5fetch inspect s3://bucket/era5/temperature_850_20230101.nc
")]
    Inspect {
        /// NetCDF file path (local or S3)
        file: String,

        /// Directory for the rendering
        #[arg(default_value = DEFAULT_PLOT_DIR)]
        output_dir: String,

        /// Data variable to inspect when the file has several
        #[arg(short = 'n', long)]
        variable: Option<String>,

        /// Output format for the summary
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,
    },

    /// List the known variables and their aliases
    Variables {
        /// Only list variables of this kind
        #[arg(long, value_enum)]
        kind: Option<KindFilter>,
    },

    /// Generate request templates
    #[command(long_about = "
Generate request file templates for common use cases.

Available templates:
• basic: default variables, all levels, whole globe
• regional: one pressure-level variable over a bounding box
• surface: surface variables for every hour of a day

EXAMPLES:
  # Print a JSON template
  era5fetch template basic

  # Write a YAML template and use it
  era5fetch template regional --format yaml -o europe.yaml
  era5fetch fetch --config europe.yaml
")]
    Template {
        /// Template type to generate
        #[arg(value_enum)]
        template_type: TemplateType,

        /// Output file path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Request file format
        #[arg(long, value_enum, default_value_t = ConfigFormat::Json)]
        format: ConfigFormat,
    },

    /// Generate shell completions
    #[command(long_about = "
Generate shell completion scripts for bash, zsh, fish and PowerShell.

INSTALLATION:
  # Bash
  era5fetch completions bash > ~/.bash_completion.d/era5fetch

  # Zsh
  era5fetch completions zsh > ~/.zsh/completions/_era5fetch

  # Fish
  era5fetch completions fish > ~/.config/fish/completions/era5fetch.fish
")]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,

        /// Output file path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Options of the `fetch` command. Every value may also come from the
/// request file; command-line values win.
#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct FetchArgs {
    #[arg(long)]
    pub year: Option<i32>,

    /// Month (1-12)
    #[arg(long)]
    pub month: Option<u32>,

    /// Day of month (1-31)
    #[arg(long)]
    pub day: Option<u32>,

    /// Hour of day (0-23); default is the first timestamp of the day
    #[arg(long, conflicts_with = "all_hours")]
    pub hour: Option<u32>,

    /// Keep every timestamp of the day
    #[arg(long = "all_hours", alias = "all-hours")]
    pub all_hours: bool,

    /// Variable names or aliases
    #[arg(long, num_args = 1.., value_delimiter = ',', env = "ERA5FETCH_VARIABLES")]
    pub variables: Vec<String>,

    /// Pressure levels in hPa (default: every level)
    #[arg(long, num_args = 1.., value_delimiter = ',')]
    pub levels: Vec<i64>,

    #[arg(long = "lat_min", alias = "lat-min", allow_negative_numbers = true)]
    pub lat_min: Option<f64>,

    #[arg(long = "lat_max", alias = "lat-max", allow_negative_numbers = true)]
    pub lat_max: Option<f64>,

    #[arg(long = "lon_min", alias = "lon-min", allow_negative_numbers = true)]
    pub lon_min: Option<f64>,

    #[arg(long = "lon_max", alias = "lon-max", allow_negative_numbers = true)]
    pub lon_max: Option<f64>,

    /// Output directory, local or s3:// (default ./data)
    #[arg(long = "output_dir", alias = "output-dir", env = "ERA5FETCH_OUTPUT_DIR")]
    pub output_dir: Option<String>,

    /// Zarr store location (gs://, s3://, http(s):// or a local path)
    #[arg(long, env = "ERA5FETCH_STORE")]
    pub store: Option<String>,

    /// Resolve and validate the request without downloading data
    #[arg(long, env = "ERA5FETCH_DRY_RUN")]
    pub dry_run: bool,
}

impl FetchArgs {
    /// The command-line part of a request.
    pub fn to_request(&self) -> FetchRequest {
        FetchRequest {
            year: self.year,
            month: self.month,
            day: self.day,
            hour: self.hour,
            all_hours: self.all_hours,
            variables: self.variables.clone(),
            levels: self.levels.clone(),
            lat_min: self.lat_min,
            lat_max: self.lat_max,
            lon_min: self.lon_min,
            lon_max: self.lon_max,
            output_dir: self.output_dir.clone(),
            store: self.store.clone(),
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON structured output
    Json,
    /// YAML structured output
    Yaml,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum KindFilter {
    /// Pressure-level variables
    Level,
    /// Surface variables
    Surface,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TemplateType {
    /// Default variables, all levels, whole globe
    Basic,
    /// One pressure-level variable over a region
    Regional,
    /// Surface variables for a whole day
    Surface,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigFormat {
    /// JSON request format
    Json,
    /// YAML request format
    Yaml,
}

/// Reads the `ERA5FETCH_LEVELS` environment variable ("850,500,250").
pub fn levels_from_env() -> Result<Vec<i64>, ConfigError> {
    let Ok(raw) = env::var("ERA5FETCH_LEVELS") else {
        return Ok(Vec::new());
    };

    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>().map_err(|_| {
                ConfigError::Parse(format!("Invalid level '{}' in ERA5FETCH_LEVELS", s))
            })
        })
        .collect()
}

/// Builds the fetch request from all sources.
/// Priority: command line > environment > request file.
pub fn build_request(config: Option<&Path>, args: &FetchArgs) -> Result<FetchRequest, ConfigError> {
    let base = match config {
        Some(path) => FetchRequest::from_file(path)?,
        None => FetchRequest::default(),
    };

    let from_env = FetchRequest {
        levels: levels_from_env()?,
        ..Default::default()
    };

    Ok(base.merge(from_env).merge(args.to_request()))
}

/// Example request for `template_type`.
pub fn template_request(template_type: TemplateType) -> FetchRequest {
    let date = FetchRequest {
        year: Some(2023),
        month: Some(1),
        day: Some(1),
        output_dir: Some(DEFAULT_OUTPUT_DIR.to_string()),
        ..Default::default()
    };

    match template_type {
        TemplateType::Basic => FetchRequest {
            variables: vec!["2m_temperature".to_string(), "temperature".to_string()],
            ..date
        },
        TemplateType::Regional => FetchRequest {
            variables: vec!["temperature".to_string()],
            levels: vec![850, 500],
            lat_min: Some(35.0),
            lat_max: Some(60.0),
            lon_min: Some(-10.0),
            lon_max: Some(30.0),
            ..date
        },
        TemplateType::Surface => FetchRequest {
            all_hours: true,
            variables: vec![
                "2m_temperature".to_string(),
                "mean_sea_level_pressure".to_string(),
                "total_precipitation".to_string(),
            ],
            ..date
        },
    }
}

/// Serializes a template in the chosen format.
pub fn render_template(template_type: TemplateType, format: ConfigFormat) -> anyhow::Result<String> {
    let request = template_request(template_type);
    Ok(match format {
        ConfigFormat::Json => serde_json::to_string_pretty(&request)?,
        ConfigFormat::Yaml => serde_yaml::to_string(&request)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Global mutex to ensure environment variable tests run sequentially
    static ENV_TEST_MUTEX: Mutex<()> = Mutex::new(());

    #[test]
    fn test_templates_validate() {
        for template_type in [TemplateType::Basic, TemplateType::Regional, TemplateType::Surface] {
            let request = template_request(template_type);
            assert!(request.validate().is_ok(), "{:?} template is invalid", template_type);
        }
    }

    #[test]
    fn test_template_round_trips_through_yaml() {
        let yaml = render_template(TemplateType::Regional, ConfigFormat::Yaml).unwrap();
        let parsed = FetchRequest::from_yaml(&yaml).unwrap();
        assert_eq!(parsed, template_request(TemplateType::Regional));
        assert!(yaml.contains("lon_min: -10"));
    }

    #[test]
    fn test_levels_from_env() {
        let _guard = ENV_TEST_MUTEX.lock().unwrap();
        let original = env::var("ERA5FETCH_LEVELS").ok();

        unsafe {
            env::set_var("ERA5FETCH_LEVELS", "850, 500,250");
        }
        assert_eq!(levels_from_env().unwrap(), vec![850, 500, 250]);

        unsafe {
            env::set_var("ERA5FETCH_LEVELS", "850,high");
        }
        let err = levels_from_env().unwrap_err();
        assert!(err.to_string().contains("high"));

        unsafe {
            env::remove_var("ERA5FETCH_LEVELS");
        }
        assert!(levels_from_env().unwrap().is_empty());

        unsafe {
            if let Some(value) = original {
                env::set_var("ERA5FETCH_LEVELS", value);
            }
        }
    }

    #[test]
    fn test_build_request_priority() {
        let _guard = ENV_TEST_MUTEX.lock().unwrap();
        let original = env::var("ERA5FETCH_LEVELS").ok();

        let dir = tempfile::TempDir::new().unwrap();
        let config = dir.path().join("request.yaml");
        std::fs::write(
            &config,
            "year: 2022\nmonth: 6\nday: 15\nvariables: [t2m]\nlevels: [1000]\n",
        )
        .unwrap();

        unsafe {
            env::set_var("ERA5FETCH_LEVELS", "500");
        }

        // Environment overrides the file
        let request = build_request(Some(&config), &FetchArgs::default()).unwrap();
        assert_eq!(request.year, Some(2022));
        assert_eq!(request.levels, vec![500]);
        assert_eq!(request.variables, vec!["t2m".to_string()]);

        // Command line overrides both
        let args = FetchArgs {
            day: Some(16),
            levels: vec![850],
            ..Default::default()
        };
        let request = build_request(Some(&config), &args).unwrap();
        assert_eq!(request.day, Some(16));
        assert_eq!(request.month, Some(6));
        assert_eq!(request.levels, vec![850]);

        unsafe {
            env::remove_var("ERA5FETCH_LEVELS");
            if let Some(value) = original {
                env::set_var("ERA5FETCH_LEVELS", value);
            }
        }
    }

    #[test]
    fn test_build_request_missing_config_file() {
        let result = build_request(Some(Path::new("/nonexistent/request.json")), &FetchArgs::default());
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}

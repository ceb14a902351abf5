//! # CLI Integration Tests
//!
//! Tests for command-line parsing: subcommands, global flags, option
//! spellings and conflicts.

#[cfg(test)]
mod tests {
    use clap::Parser;
    use std::path::PathBuf;
    use std::sync::Mutex;

    use crate::cli::{Cli, Commands, ConfigFormat, KindFilter, OutputFormat, TemplateType};

    // Tests that read or write ERA5FETCH_* variables run one at a time
    static ENV_TEST_MUTEX: Mutex<()> = Mutex::new(());

    /// Test basic CLI argument parsing
    #[test]
    fn test_cli_help() {
        let result = Cli::try_parse_from(["era5fetch", "--help"]);
        assert!(result.is_err()); // --help causes early exit with "error"

        let error = result.unwrap_err();
        assert!(error.to_string().contains("ERA5"));
    }

    #[test]
    fn test_cli_version() {
        let result = Cli::try_parse_from(["era5fetch", "--version"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_global_flags() {
        let cli = Cli::parse_from([
            "era5fetch",
            "--verbose",
            "--output-format",
            "json",
            "--config",
            "/path/to/request.yaml",
            "template",
            "basic",
        ]);

        assert!(cli.verbose);
        assert_eq!(cli.output_format, OutputFormat::Json);
        assert_eq!(cli.config, Some(PathBuf::from("/path/to/request.yaml")));
    }

    #[test]
    fn test_fetch_command_full() {
        let _guard = ENV_TEST_MUTEX.lock().unwrap();
        let cli = Cli::parse_from([
            "era5fetch",
            "fetch",
            "--year",
            "2023",
            "--month",
            "1",
            "--day",
            "1",
            "--variables",
            "temperature",
            "t2m",
            "--levels",
            "850",
            "500",
            "--lat_min",
            "35",
            "--lat_max",
            "60",
            "--lon_min",
            "-10",
            "--lon_max",
            "30",
            "--output_dir",
            "/tmp/era5",
        ]);

        let Commands::Fetch(args) = &cli.command else {
            panic!("Expected Fetch command");
        };
        assert_eq!(args.year, Some(2023));
        assert_eq!(args.month, Some(1));
        assert_eq!(args.day, Some(1));
        assert_eq!(args.variables, vec!["temperature", "t2m"]);
        assert_eq!(args.levels, vec![850, 500]);
        assert_eq!(args.lat_min, Some(35.0));
        assert_eq!(args.lon_min, Some(-10.0));
        assert_eq!(args.lon_max, Some(30.0));
        assert_eq!(args.output_dir, Some("/tmp/era5".to_string()));
        assert!(!args.dry_run);

        let request = args.to_request().validate().unwrap();
        assert_eq!(request.levels, vec![850, 500]);
        assert!(request.bbox.is_some());
    }

    #[test]
    fn test_fetch_comma_separated_lists() {
        let _guard = ENV_TEST_MUTEX.lock().unwrap();
        let cli = Cli::parse_from([
            "era5fetch",
            "fetch",
            "--year",
            "2023",
            "--month",
            "1",
            "--day",
            "1",
            "--variables",
            "t,q",
            "--levels",
            "1000,850",
        ]);

        if let Commands::Fetch(args) = &cli.command {
            assert_eq!(args.variables, vec!["t", "q"]);
            assert_eq!(args.levels, vec![1000, 850]);
        } else {
            panic!("Expected Fetch command");
        }
    }

    #[test]
    fn test_fetch_kebab_case_aliases() {
        let cli = Cli::parse_from([
            "era5fetch",
            "fetch",
            "--lat-min",
            "-20.5",
            "--all-hours",
            "--dry-run",
        ]);

        if let Commands::Fetch(args) = &cli.command {
            assert_eq!(args.lat_min, Some(-20.5));
            assert!(args.all_hours);
            assert!(args.dry_run);
        } else {
            panic!("Expected Fetch command");
        }
    }

    #[test]
    fn test_hour_conflicts_with_all_hours() {
        let result = Cli::try_parse_from(["era5fetch", "fetch", "--hour", "6", "--all_hours"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_level_value() {
        let result = Cli::try_parse_from(["era5fetch", "fetch", "--levels", "high"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_inspect_command_defaults() {
        let cli = Cli::parse_from(["era5fetch", "inspect", "data/t2m_sfc_20230101.nc"]);

        if let Commands::Inspect {
            file,
            output_dir,
            variable,
            format,
        } = &cli.command
        {
            assert_eq!(file, "data/t2m_sfc_20230101.nc");
            assert_eq!(output_dir, "./plots");
            assert!(variable.is_none());
            assert!(format.is_none());
        } else {
            panic!("Expected Inspect command");
        }
    }

    #[test]
    fn test_inspect_command_options() {
        let cli = Cli::parse_from([
            "era5fetch",
            "inspect",
            "s3://bucket/t_850_20230101.nc",
            "figures",
            "-n",
            "temperature",
            "--format",
            "yaml",
        ]);

        if let Commands::Inspect {
            file,
            output_dir,
            variable,
            format,
        } = &cli.command
        {
            assert_eq!(file, "s3://bucket/t_850_20230101.nc");
            assert_eq!(output_dir, "figures");
            assert_eq!(variable, &Some("temperature".to_string()));
            assert_eq!(format, &Some(OutputFormat::Yaml));
        } else {
            panic!("Expected Inspect command");
        }
    }

    #[test]
    fn test_inspect_requires_file() {
        assert!(Cli::try_parse_from(["era5fetch", "inspect"]).is_err());
    }

    #[test]
    fn test_variables_command() {
        let cli = Cli::parse_from(["era5fetch", "variables", "--kind", "surface"]);
        if let Commands::Variables { kind } = &cli.command {
            assert_eq!(kind, &Some(KindFilter::Surface));
        } else {
            panic!("Expected Variables command");
        }
    }

    #[test]
    fn test_template_command() {
        let cli = Cli::parse_from([
            "era5fetch",
            "template",
            "regional",
            "--format",
            "yaml",
            "-o",
            "europe.yaml",
        ]);

        if let Commands::Template {
            template_type,
            output,
            format,
        } = &cli.command
        {
            assert_eq!(template_type, &TemplateType::Regional);
            assert_eq!(output, &Some(PathBuf::from("europe.yaml")));
            assert_eq!(format, &ConfigFormat::Yaml);
        } else {
            panic!("Expected Template command");
        }
    }

    #[test]
    fn test_environment_variables() {
        let _guard = ENV_TEST_MUTEX.lock().unwrap();
        use std::env;

        let original_store = env::var("ERA5FETCH_STORE").ok();
        let original_output = env::var("ERA5FETCH_OUTPUT_DIR").ok();

        unsafe {
            env::set_var("ERA5FETCH_STORE", "/mnt/era5.zarr");
            env::set_var("ERA5FETCH_OUTPUT_DIR", "/mnt/out");
        }

        let cli = Cli::parse_from(["era5fetch", "fetch", "--year", "2023"]);
        if let Commands::Fetch(args) = &cli.command {
            assert_eq!(args.store, Some("/mnt/era5.zarr".to_string()));
            assert_eq!(args.output_dir, Some("/mnt/out".to_string()));
        } else {
            panic!("Expected Fetch command");
        }

        // Command line wins over the environment
        let cli = Cli::parse_from(["era5fetch", "fetch", "--store", "gs://other/store.zarr"]);
        if let Commands::Fetch(args) = &cli.command {
            assert_eq!(args.store, Some("gs://other/store.zarr".to_string()));
        } else {
            panic!("Expected Fetch command");
        }

        unsafe {
            env::remove_var("ERA5FETCH_STORE");
            env::remove_var("ERA5FETCH_OUTPUT_DIR");
            if let Some(value) = original_store {
                env::set_var("ERA5FETCH_STORE", value);
            }
            if let Some(value) = original_output {
                env::set_var("ERA5FETCH_OUTPUT_DIR", value);
            }
        }
    }

    #[test]
    fn test_output_format_values() {
        for (value, expected) in [
            ("human", OutputFormat::Human),
            ("json", OutputFormat::Json),
            ("yaml", OutputFormat::Yaml),
        ] {
            let cli = Cli::parse_from(["era5fetch", "--output-format", value, "variables"]);
            assert_eq!(cli.output_format, expected);
        }
        assert!(Cli::try_parse_from(["era5fetch", "--output-format", "csv", "variables"]).is_err());
    }

    #[test]
    fn test_verbose_quiet_conflict() {
        let result = Cli::try_parse_from(["era5fetch", "--verbose", "--quiet", "variables"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_completions_command() {
        let cli = Cli::parse_from(["era5fetch", "completions", "zsh"]);
        assert!(matches!(cli.command, Commands::Completions { .. }));
    }
}

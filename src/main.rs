use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use era5fetch::catalog::{self, VariableKind};
use era5fetch::cli::{
    Cli, Commands, FetchArgs, KindFilter, OutputFormat, build_request, render_template,
};
use era5fetch::inspect::{inspect_file, print_report_human, print_report_json, print_report_yaml};
use era5fetch::log::{
    init_logging, request_echo, show_catalog, show_farewell_with_timing, show_greeting,
    show_plan, show_written,
};
use era5fetch::plan::FetchPlan;
use era5fetch::storage::join_location;
use era5fetch::store::open_store;
use era5fetch::{execute_plan, plan_fetch};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match &cli.command {
        Commands::Fetch(args) => run_fetch(&cli, args),
        Commands::Inspect {
            file,
            output_dir,
            variable,
            format,
        } => run_inspect(
            file,
            output_dir,
            variable.as_deref(),
            format.unwrap_or(cli.output_format),
        ),
        Commands::Variables { kind } => run_variables(*kind, cli.output_format),
        Commands::Template {
            template_type,
            output,
            format,
        } => write_output(output.as_ref(), &render_template(*template_type, *format)?),
        Commands::Completions { shell, output } => {
            let mut buffer = Vec::new();
            clap_complete::generate(*shell, &mut Cli::command(), "era5fetch", &mut buffer);
            write_output(output.as_ref(), &String::from_utf8_lossy(&buffer))
        }
    }
}

/// Planned files of a dry run.
#[derive(Serialize)]
struct DryRunReport<'a> {
    date: String,
    store: &'a str,
    timestamps: Vec<String>,
    latitude_points: usize,
    longitude_points: usize,
    files: Vec<String>,
}

impl<'a> DryRunReport<'a> {
    fn new(plan: &'a FetchPlan) -> Self {
        DryRunReport {
            date: plan.date.format("%Y-%m-%d").to_string(),
            store: &plan.store,
            timestamps: plan
                .timestamps
                .iter()
                .map(|t| t.format("%Y-%m-%dT%H:%M:%S").to_string())
                .collect(),
            latitude_points: plan.latitude.len(),
            longitude_points: plan.longitude.len(),
            files: plan
                .artifacts
                .iter()
                .map(|a| join_location(&plan.output_dir, &a.file_name))
                .collect(),
        }
    }
}

fn run_fetch(cli: &Cli, args: &FetchArgs) -> Result<()> {
    let start_time = Instant::now();
    let human = cli.output_format == OutputFormat::Human && !cli.quiet;

    let request = build_request(cli.config.as_deref(), args)?
        .validate()
        .context("Invalid fetch request")?;

    if human {
        let source = cli
            .config
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "command line".to_string());
        show_greeting(&source);
        request_echo(&request);
    }

    let store = open_store(&request.store)?;
    let plan = plan_fetch(store.as_ref(), &request)?;

    if args.dry_run {
        match cli.output_format {
            OutputFormat::Human if !cli.quiet => show_plan(&plan),
            OutputFormat::Human => {}
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&DryRunReport::new(&plan))?)
            }
            OutputFormat::Yaml => print!("{}", serde_yaml::to_string(&DryRunReport::new(&plan))?),
        }
        return Ok(());
    }

    if human {
        show_plan(&plan);
    }

    let progress = if human {
        let bar = ProgressBar::new(plan.artifacts.len() as u64);
        if let Ok(style) =
            ProgressStyle::default_bar().template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
        {
            bar.set_style(style.progress_chars("##-"));
        }
        bar
    } else {
        ProgressBar::hidden()
    };

    let written = execute_plan(store.as_ref(), &plan, &progress)?;

    match cli.output_format {
        OutputFormat::Human if cli.quiet => {
            for artifact in &written {
                println!("{}", artifact.path);
            }
        }
        OutputFormat::Human => {
            show_written(&written);
            show_farewell_with_timing(start_time.elapsed());
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&written)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(&written)?),
    }

    Ok(())
}

fn run_inspect(
    file: &str,
    output_dir: &str,
    variable: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let report = runtime
        .block_on(inspect_file(file, output_dir, variable))
        .with_context(|| format!("Failed to inspect {}", file))?;

    match format {
        OutputFormat::Human => print_report_human(&report),
        OutputFormat::Json => print_report_json(&report)?,
        OutputFormat::Yaml => print_report_yaml(&report)?,
    }
    Ok(())
}

fn run_variables(kind: Option<KindFilter>, format: OutputFormat) -> Result<()> {
    let variables: Vec<_> = catalog::all()
        .iter()
        .filter(|spec| match kind {
            Some(KindFilter::Level) => spec.kind == VariableKind::Level,
            Some(KindFilter::Surface) => spec.kind == VariableKind::Surface,
            None => true,
        })
        .cloned()
        .collect();

    match format {
        OutputFormat::Human => show_catalog(&variables),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&variables)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(&variables)?),
    }
    Ok(())
}

fn write_output(path: Option<&PathBuf>, content: &str) -> Result<()> {
    match path {
        Some(path) => fs::write(path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => {
            let mut stdout = std::io::stdout();
            stdout.write_all(content.as_bytes())?;
            if !content.ends_with('\n') {
                writeln!(stdout)?;
            }
            stdout.flush()?;
        }
    }
    Ok(())
}

use crate::catalog::VariableSpec;
use crate::output::OutputArtifact;
use crate::plan::FetchPlan;
use crate::request::SelectionRequest;
use std::time::Duration;

/// Initializes `env_logger`: `warn` by default, `debug` when verbose,
/// `error` when quiet. `RUST_LOG` takes precedence.
pub fn init_logging(verbose: bool, quiet: bool) {
    let level = if verbose {
        "debug"
    } else if quiet {
        "error"
    } else {
        "warn"
    };

    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .try_init();
}

pub fn show_greeting(source: &str) {
    println!("=== ERA5 Subset Fetcher ===");
    println!("Request from: {}", source);
}

pub fn request_echo(request: &SelectionRequest) {
    println!("\nRequest:");
    println!("  Date: {}", request.date_label());
    println!("  Hours: {:?}", request.hours);
    println!("  Variables: {}", request.variables.join(", "));
    if request.levels.is_empty() {
        println!("  Levels: all");
    } else {
        let levels: Vec<String> = request.levels.iter().map(|l| l.to_string()).collect();
        println!("  Levels: {}", levels.join(", "));
    }
    match &request.bbox {
        Some(bbox) => println!(
            "  Bounding box: lat [{}, {}], lon [{}, {}]",
            bbox.lat_min, bbox.lat_max, bbox.lon_min, bbox.lon_max
        ),
        None => println!("  Bounding box: global"),
    }
    println!("  Store: {}", request.store);
    println!("  Output: {}", request.output_dir);
}

pub fn show_plan(plan: &FetchPlan) {
    println!("\nPlan:");
    println!("  Timestamps: {}", plan.timestamps.len());
    for timestamp in &plan.timestamps {
        println!("    {}", timestamp.format("%Y-%m-%d %H:%M"));
    }
    println!("  Latitude points: {}", plan.latitude.len());
    println!("  Longitude points: {}", plan.longitude.len());
    println!("  Files: {}", plan.artifacts.len());
    for artifact in &plan.artifacts {
        println!("    {}", artifact.file_name);
    }
}

pub fn show_written(written: &[OutputArtifact]) {
    println!("\nWritten files:");
    for artifact in written {
        println!("  {}", artifact.path);
    }
}

pub fn show_catalog(variables: &[VariableSpec]) {
    println!("{:<38} {:<6} {:<8} UNITS", "NAME", "ALIAS", "KIND");
    for spec in variables {
        println!(
            "{:<38} {:<6} {:<8} {}",
            spec.name, spec.alias, spec.kind, spec.units
        );
    }
}

pub fn show_farewell_with_timing(elapsed: Duration) {
    println!(
        "\n=== Fetch completed successfully in {:.2}s ===",
        elapsed.as_secs_f64()
    );
}

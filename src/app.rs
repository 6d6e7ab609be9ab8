//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that
//! parses arguments, sets up logging, runs the selected command, prints
//! reports and writes optional exports.

use std::path::Path;

use chrono::Utc;
use clap::Parser;
use tracing::info;

use crate::cli::{Cli, Command, InspectArgs, PlantsArgs, RunArgs, SynthArgs};
use crate::config::{PipelineConfig, resolve_config_path};
use crate::data::{ICPAC_COUNTRIES, SyntheticSpec, load_registry, write_synthetic_tree};
use crate::error::{AppError, PipelineError};
use crate::io::cf_time::parse_timestamp;
use crate::io::layout::describe_path;
use crate::io::{load_source, write_aligned_csv, write_estimates_csv, write_json};
use crate::report::{RunReport, format_plants, format_run_summary, format_source};

pub mod pipeline;

/// Entry point for the `repower` binary.
pub fn run() -> Result<(), AppError> {
    // A `.env` file may carry RUST_LOG / REPOWER_CONFIG.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    crate::telemetry::init_tracing(cli.log_json);

    match &cli.command {
        Command::Run(args) => handle_run(&cli, args),
        Command::Inspect(args) => handle_inspect(args),
        Command::Plants(args) => handle_plants(&cli, args),
        Command::Synth(args) => handle_synth(args),
    }
}

/// Load the configuration and apply command-line overrides.
pub fn load_config(cli: &Cli) -> Result<PipelineConfig, AppError> {
    let mut config = match resolve_config_path(cli.config.as_deref()) {
        Some(path) => PipelineConfig::load(&path)?,
        None => PipelineConfig::default(),
    };
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(method) = cli.spatial_method {
        config.alignment.spatial_method = method;
    }
    Ok(config)
}

fn handle_run(cli: &Cli, args: &RunArgs) -> Result<(), AppError> {
    let config = load_config(cli)?;
    let run = pipeline::run_pipeline(&config)?;

    println!("{}", format_run_summary(&run));

    // Exports are written even when some requests failed.
    if let Some(dir) = &args.export_dir {
        std::fs::create_dir_all(dir).map_err(|e| PipelineError::io(dir, e))?;
        for outcome in &run.outcomes {
            if let Ok(out) = &outcome.result {
                write_estimates_csv(&dir.join(format!("{}_estimates.csv", outcome.name)), &out.estimates)?;
                write_aligned_csv(&dir.join(format!("{}_aligned.csv", outcome.name)), &out.aligned)?;
            }
        }
        info!(dir = %dir.display(), "wrote exports");
    }
    if let Some(path) = &args.results {
        write_json(path, &RunReport::from_run(&run, Utc::now()))?;
        info!(path = %path.display(), "wrote run report");
    }

    match run.first_failure() {
        Some((name, err)) => {
            let base = AppError::from(err.clone());
            Err(AppError::new(
                base.exit_code(),
                format!("request `{name}` failed: {base}"),
            ))
        }
        None => Ok(()),
    }
}

fn handle_inspect(args: &InspectArgs) -> Result<(), AppError> {
    let desc = describe_path(&args.file, args.kind, args.variable.as_deref())?;
    let source = load_source(&desc)?;
    println!("File: {}", args.file.display());
    print!("{}", format_source(&source));
    Ok(())
}

fn handle_plants(cli: &Cli, args: &PlantsArgs) -> Result<(), AppError> {
    let config = load_config(cli)?;
    let path = match (&args.geojson, &config.plants) {
        (Some(p), _) => p.clone(),
        (None, Some(plants)) => plants.registry.clone(),
        (None, None) => {
            return Err(PipelineError::InvalidConfig(
                "no registry given and no [plants] section configured".to_string(),
            )
            .into());
        }
    };

    let registry = load_registry(&path)?;
    let registry = if args.all_countries {
        registry
    } else if !args.countries.is_empty() {
        registry.filter_countries(&args.countries)
    } else if let Some(plants) = &config.plants {
        registry.filter_countries(&plants.countries)
    } else {
        let icpac: Vec<String> = ICPAC_COUNTRIES.iter().map(|c| c.to_string()).collect();
        registry.filter_countries(&icpac)
    };

    print!("{}", format_plants(&registry));
    if let Some(json) = &args.json {
        write_json(json, &registry.capacity_by_country())?;
    }
    Ok(())
}

fn handle_synth(args: &SynthArgs) -> Result<(), AppError> {
    let mut spec = SyntheticSpec {
        seed: args.seed,
        hours: args.hours,
        ..SyntheticSpec::default()
    };
    if let Some(raw) = &args.start {
        spec.start = parse_timestamp(raw).ok_or_else(|| {
            AppError::from(PipelineError::InvalidConfig(format!(
                "--start `{raw}` is not an RFC 3339 timestamp"
            )))
        })?;
    }
    let out = write_synthetic_tree(&args.out, &spec)?;
    println!(
        "Wrote {} files under {}",
        out.files.len(),
        display_dir(&args.out)
    );
    println!("Config: {}", out.config_path.display());
    Ok(())
}

fn display_dir(path: &Path) -> String {
    path.canonicalize()
        .unwrap_or_else(|_| path.to_path_buf())
        .display()
        .to_string()
}

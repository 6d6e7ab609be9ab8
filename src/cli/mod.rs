//! Command-line parsing for `repower`.
//!
//! Parsing and dispatch stay separate from the pipeline stages; the handlers
//! in [`crate::app`] translate these arguments into library calls.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::{SourceKind, SpatialMethod};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "repower",
    version,
    about = "Renewable power estimates from reanalysis, forecast and climatology fields"
)]
pub struct Cli {
    /// Configuration file (falls back to $REPOWER_CONFIG, then ./repower.toml).
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the source tree root from the configuration.
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Override the spatial resampling method.
    #[arg(long, value_enum, global = true)]
    pub spatial_method: Option<SpatialMethod>,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run every configured request and print the aggregated results.
    Run(RunArgs),
    /// Load one source file and describe it.
    Inspect(InspectArgs),
    /// Summarize installed and planned capacity from a plant registry.
    Plants(PlantsArgs),
    /// Write a seeded synthetic source tree and a matching configuration.
    Synth(SynthArgs),
}

#[derive(Debug, Args, Clone)]
pub struct RunArgs {
    /// Write per-request estimate and aligned-input CSVs into this directory.
    #[arg(long)]
    pub export_dir: Option<PathBuf>,

    /// Write the run report (all aggregated results) as JSON.
    #[arg(long)]
    pub results: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct InspectArgs {
    /// Grid JSON or NetCDF file.
    pub file: PathBuf,

    /// Variable to read (inferred from the filename when omitted).
    #[arg(long)]
    pub variable: Option<String>,

    /// Source kind (inferred from the filename when omitted).
    #[arg(long, value_enum)]
    pub kind: Option<SourceKind>,
}

#[derive(Debug, Args, Clone)]
pub struct PlantsArgs {
    /// RePP-style GeoJSON file (falls back to `[plants].registry`).
    pub geojson: Option<PathBuf>,

    /// Keep only these countries (repeatable). Defaults to the ICPAC region.
    #[arg(long = "country")]
    pub countries: Vec<String>,

    /// Do not filter by country.
    #[arg(long, conflicts_with = "countries")]
    pub all_countries: bool,

    /// Also write the per-country table as JSON.
    #[arg(long)]
    pub json: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct SynthArgs {
    /// Output directory.
    #[arg(short, long, default_value = "data")]
    pub out: PathBuf,

    /// Random seed.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Period length in hours.
    #[arg(long, default_value_t = 48)]
    pub hours: u32,

    /// Period start (RFC 3339). Defaults to 2025-03-01T00:00:00Z.
    #[arg(long)]
    pub start: Option<String>,
}

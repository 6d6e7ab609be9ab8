//! End-to-end runs over a synthetic source tree.
//!
//! Each test writes a fresh tree into a temp dir, optionally breaks one file,
//! and runs the whole pipeline through the library API.

use std::fs;
use std::path::Path;

use chrono::Duration;
use repower::app::pipeline::{RunOutput, run_pipeline};
use repower::config::PipelineConfig;
use repower::data::{SyntheticSpec, write_synthetic_tree};
use repower::domain::{Provenance, SpatialMethod};
use repower::error::PipelineError;
use repower::io::layout::{ForecastName, climatology_path, forecast_path};
use repower::io::write_estimates_csv;
use repower::report::RunReport;

fn synthetic(dir: &Path) -> (SyntheticSpec, PipelineConfig) {
    let spec = SyntheticSpec::default();
    let out = write_synthetic_tree(dir, &spec).unwrap();
    let config = PipelineConfig::load(&out.config_path).unwrap();
    (spec, config)
}

fn outcome<'a>(run: &'a RunOutput, name: &str) -> &'a repower::app::pipeline::RequestOutcome {
    run.outcomes.iter().find(|o| o.name == name).unwrap()
}

// =========================================================
// Happy path
// =========================================================

#[test]
fn full_run_produces_results_for_every_request() {
    let dir = tempfile::tempdir().unwrap();
    let (_, config) = synthetic(dir.path());

    let run = run_pipeline(&config).unwrap();
    assert_eq!(run.sources_loaded, 5 * (1 + 3 + 1));
    for o in &run.outcomes {
        let out = o.result.as_ref().unwrap();
        assert!(!out.results.is_empty(), "{} has no results", o.name);
        assert!(out.results.iter().all(|r| r.value.is_finite() && r.unit == "MW"));
    }

    // Daily means plus one overall max for the solar request.
    let solar = outcome(&run, "solar-grid").result.as_ref().unwrap();
    assert_eq!(solar.results.len(), 3);
    // Two sites over 48 hourly steps.
    assert_eq!(solar.estimates.len(), 2 * 48);

    let hydro = outcome(&run, "hydro-basins").result.as_ref().unwrap();
    assert_eq!(hydro.estimates.len(), 2 * 8);
    assert!(hydro.estimates.iter().all(|e| e.power_mw > 0.0));
}

#[test]
fn forecast_outranks_climatology_at_valid_times() {
    let dir = tempfile::tempdir().unwrap();
    let (spec, config) = synthetic(dir.path());
    let run = run_pipeline(&config).unwrap();

    let solar = outcome(&run, "solar-grid").result.as_ref().unwrap();
    let ssrd = solar.aligned.variable("ssrd").unwrap();
    let issuance = spec.start + Duration::hours(i64::from(spec.hours / 2));
    let valid = issuance + Duration::hours(6);
    let t = solar.aligned.timestamps.iter().position(|ts| *ts == valid).unwrap();

    assert_eq!(
        ssrd.values[t].provenance,
        Provenance::Forecast {
            issuance,
            step_hours: 6
        }
    );
    // Last hour: past reanalysis reach and not a forecast valid time.
    let last = solar.aligned.timestamps.len() - 1;
    assert_eq!(ssrd.values[last].provenance, Provenance::Climatology);
}

#[test]
fn repeated_runs_are_identical() {
    let dir = tempfile::tempdir().unwrap();
    let (_, mut config) = synthetic(dir.path());
    config.alignment.spatial_method = SpatialMethod::Nearest;

    let a = run_pipeline(&config).unwrap();
    let b = run_pipeline(&config).unwrap();
    for (x, y) in a.outcomes.iter().zip(&b.outcomes) {
        let (x, y) = (x.result.as_ref().unwrap(), y.result.as_ref().unwrap());
        assert_eq!(x.estimates, y.estimates);
        assert_eq!(x.results, y.results);
    }
}

#[test]
fn exports_and_report_are_written() {
    let dir = tempfile::tempdir().unwrap();
    let (_, config) = synthetic(dir.path());
    let run = run_pipeline(&config).unwrap();

    let wind = outcome(&run, "wind-sites").result.as_ref().unwrap();
    let csv_path = dir.path().join("wind.csv");
    write_estimates_csv(&csv_path, &wind.estimates).unwrap();
    let text = fs::read_to_string(&csv_path).unwrap();
    assert!(text.starts_with("cell_id,lat,lon,timestamp,generation,power_mw,model_version"));
    assert_eq!(text.lines().count(), wind.estimates.len() + 1);

    let report = RunReport::from_run(&run, chrono::Utc::now());
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["requests"].as_array().unwrap().len(), 3);
    assert_eq!(json["requests"][0]["status"], "ok");
    assert!(json["requests"][0]["provenance"][0]["observed"].as_u64().unwrap() > 0);
}

// =========================================================
// Failure isolation
// =========================================================

#[test]
fn missing_climatology_is_a_coverage_gap() {
    let dir = tempfile::tempdir().unwrap();
    let (_, config) = synthetic(dir.path());
    fs::remove_file(climatology_path(dir.path(), "ssrd", "json")).unwrap();

    let run = run_pipeline(&config).unwrap();
    let err = outcome(&run, "solar-grid").result.as_ref().unwrap_err();
    assert!(matches!(err, PipelineError::CoverageGap { variable, .. } if variable == "ssrd"));
    assert!(outcome(&run, "wind-sites").result.is_ok());
    assert!(outcome(&run, "hydro-basins").result.is_ok());
}

#[test]
fn misnamed_forecast_fails_only_its_variable() {
    let dir = tempfile::tempdir().unwrap();
    let (spec, config) = synthetic(dir.path());
    let issuance = spec.start + Duration::hours(i64::from(spec.hours / 2));
    let name = |step| ForecastName {
        issuance,
        step_hours: step,
        variable: "t2m".to_string(),
    };
    // The file still says step 6 inside.
    fs::copy(
        forecast_path(dir.path(), &name(6), "json"),
        forecast_path(dir.path(), &name(7), "json"),
    )
    .unwrap();

    let run = run_pipeline(&config).unwrap();
    assert_eq!(run.load_failures.len(), 1);
    assert!(matches!(
        run.load_failures[0].1,
        PipelineError::NamingMismatch { .. }
    ));
    assert!(matches!(
        outcome(&run, "solar-grid").result,
        Err(PipelineError::NamingMismatch { .. })
    ));
    assert!(outcome(&run, "wind-sites").result.is_ok());
}

#[test]
fn empty_aggregation_window_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let (_, mut config) = synthetic(dir.path());
    let wind = config
        .requests
        .iter_mut()
        .find(|r| r.name == "wind-sites")
        .unwrap();
    // Region that contains no site.
    wind.aggregations[0].selection = repower::domain::SpatialSelection::Cells {
        region_id: "nowhere".to_string(),
        ids: vec!["site-z".to_string()],
    };

    let run = run_pipeline(&config).unwrap();
    let (name, err) = run.first_failure().unwrap();
    assert_eq!(name, "wind-sites");
    assert!(matches!(err, PipelineError::EmptySelection { .. }));
}

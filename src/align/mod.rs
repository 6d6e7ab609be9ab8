//! Temporal/spatial aligner.
//!
//! Resamples every loaded source onto one target grid and time axis and fills
//! each `(variable, cell, timestamp)` from the best available tier:
//! forecast, then reanalysis, then climatology.
//!
//! Alignment is a pure function of its inputs and thresholds. A slot that no
//! tier can fill fails the whole alignment with `CoverageGap`; no partial
//! dataset is returned.

pub mod spatial;
pub mod temporal;

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::{
    AlignedDataset, AlignedValue, AlignedVariable, LoadedSource, SpatialGrid, SpatialMethod, Unit,
};
use crate::error::{PipelineError, PipelineResult};

use spatial::build_samplers;
use temporal::{ClimatologyTier, ForecastTier, ReanalysisTier, VariableTiers};

/// Target of one alignment: where, when and what.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentRequest {
    pub grid: SpatialGrid,
    pub timestamps: Vec<DateTime<Utc>>,
    pub variables: Vec<String>,
}

/// Thresholds used by the aligner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentConfig {
    pub spatial_method: SpatialMethod,
    /// Largest forecast step (hours) that may supply a value.
    pub max_lead_gap_hours: u32,
    /// Largest distance (hours) between a target timestamp and the
    /// reanalysis sample used for it.
    pub max_reanalysis_gap_hours: u32,
    /// Search radius in degrees for nearest-node lookups and extent checks.
    pub interpolation_radius_deg: f64,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            spatial_method: SpatialMethod::Bilinear,
            max_lead_gap_hours: 72,
            max_reanalysis_gap_hours: 3,
            interpolation_radius_deg: 1.0,
        }
    }
}

/// Align `sources` onto the request grid and time axis.
///
/// Sources for variables that are not requested are ignored.
pub fn align(
    request: &AlignmentRequest,
    sources: &[LoadedSource],
    config: &AlignmentConfig,
) -> PipelineResult<AlignedDataset> {
    let variables = request
        .variables
        .iter()
        .map(|name| align_variable(name, request, sources, config))
        .collect::<PipelineResult<Vec<_>>>()?;

    Ok(AlignedDataset {
        grid: request.grid.clone(),
        timestamps: request.timestamps.clone(),
        variables,
    })
}

fn align_variable(
    name: &str,
    request: &AlignmentRequest,
    sources: &[LoadedSource],
    config: &AlignmentConfig,
) -> PipelineResult<AlignedVariable> {
    let tiers = collect_tiers(name, request, sources, config)?;
    let Some(unit) = tier_unit(name, &tiers)? else {
        return Err(first_slot_gap(name, request));
    };

    let candidates: Vec<_> = request
        .timestamps
        .iter()
        .map(|&t| tiers.candidates(t, config.max_lead_gap_hours, config.max_reanalysis_gap_hours))
        .collect();

    // One task per cell; each writes its own contiguous run of timestamps.
    let per_cell: Vec<Result<Vec<AlignedValue>, usize>> = (0..request.grid.cell_count())
        .into_par_iter()
        .map(|cell| {
            candidates
                .iter()
                .enumerate()
                .map(|(time, c)| tiers.resolve(cell, c).ok_or(time))
                .collect()
        })
        .collect();

    let mut values = Vec::with_capacity(request.grid.cell_count() * request.timestamps.len());
    for (cell, result) in per_cell.into_iter().enumerate() {
        match result {
            Ok(cell_values) => values.extend(cell_values),
            Err(time) => {
                return Err(PipelineError::CoverageGap {
                    variable: name.to_string(),
                    cell: request.grid.cell(cell).id,
                    timestamp: request.timestamps[time],
                });
            }
        }
    }

    let aligned = AlignedVariable {
        name: name.to_string(),
        unit,
        values,
    };
    let summary = aligned.provenance_summary();
    info!(
        variable = name,
        observed = summary.observed,
        forecast = summary.forecast,
        climatology = summary.climatology,
        "aligned variable"
    );
    Ok(aligned)
}

fn collect_tiers<'a>(
    name: &str,
    request: &AlignmentRequest,
    sources: &'a [LoadedSource],
    config: &AlignmentConfig,
) -> PipelineResult<VariableTiers<'a>> {
    let mut tiers = VariableTiers::default();
    let mut forecast_ids = HashSet::new();
    let samplers = |source: &LoadedSource| {
        build_samplers(
            &source.data().grid,
            &request.grid,
            config.spatial_method,
            config.interpolation_radius_deg,
            name,
        )
    };

    for source in sources.iter().filter(|s| s.variable() == name) {
        match source {
            LoadedSource::Forecast(run) => {
                if !forecast_ids.insert((run.issuance, run.step_hours)) {
                    return Err(PipelineError::naming(
                        name,
                        format!(
                            "duplicate forecast run issued {} with step {}h",
                            run.issuance, run.step_hours
                        ),
                    ));
                }
                tiers.forecasts.push(ForecastTier {
                    run,
                    samplers: samplers(source)?,
                });
            }
            LoadedSource::Reanalysis(field) => {
                if tiers.reanalysis.is_some() {
                    return Err(PipelineError::schema(
                        name,
                        "more than one reanalysis field for the same variable",
                    ));
                }
                tiers.reanalysis = Some(ReanalysisTier {
                    field,
                    samplers: samplers(source)?,
                });
            }
            LoadedSource::Climatology(profile) => {
                if tiers.climatology.is_some() {
                    return Err(PipelineError::schema(
                        name,
                        "more than one climatology profile for the same variable",
                    ));
                }
                tiers.climatology = Some(ClimatologyTier {
                    profile,
                    samplers: samplers(source)?,
                });
            }
        }
    }

    debug!(
        variable = name,
        forecasts = tiers.forecasts.len(),
        reanalysis = tiers.reanalysis.is_some(),
        climatology = tiers.climatology.is_some(),
        "collected source tiers"
    );
    Ok(tiers)
}

/// The unit shared by every tier of a variable, `None` when it has no source.
///
/// Tiers that disagree would mix units in one aligned array.
fn tier_unit(name: &str, tiers: &VariableTiers<'_>) -> PipelineResult<Option<Unit>> {
    let units = tiers
        .forecasts
        .iter()
        .map(|f| f.run.field.data.unit)
        .chain(tiers.reanalysis.iter().map(|r| r.field.data.unit))
        .chain(tiers.climatology.iter().map(|c| c.profile.data.unit));

    let mut found: Option<Unit> = None;
    for unit in units {
        match found {
            None => found = Some(unit),
            Some(u) if u != unit => {
                return Err(PipelineError::schema(
                    name,
                    format!("sources declare different units ({u} and {unit})"),
                ));
            }
            Some(_) => {}
        }
    }
    Ok(found)
}

/// Coverage gap reported for a variable with no source at all: the first slot.
fn first_slot_gap(name: &str, request: &AlignmentRequest) -> PipelineError {
    PipelineError::CoverageGap {
        variable: name.to_string(),
        cell: request
            .grid
            .cells()
            .first()
            .map(|c| c.id.clone())
            .unwrap_or_else(|| "-".to_string()),
        timestamp: request
            .timestamps
            .first()
            .copied()
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        CalendarIndex, ClimatologyProfile, FieldData, ForecastRun, GriddedField, Provenance, Site,
    };
    use chrono::{Duration, TimeZone};
    use nalgebra::DMatrix;

    fn t(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, hour, 0, 0).unwrap()
    }

    fn site_grid() -> SpatialGrid {
        SpatialGrid::Points {
            cells: vec![
                Site { id: "a".into(), lat: 0.0, lon: 36.0 },
                Site { id: "b".into(), lat: 1.0, lon: 37.0 },
            ],
        }
    }

    fn data(values: &[&[f64]]) -> FieldData {
        FieldData {
            variable: "ssrd".into(),
            unit: Unit::WattsPerSquareMetre,
            grid: site_grid(),
            frames: values.iter().map(|v| DMatrix::from_row_slice(1, 2, v)).collect(),
        }
    }

    fn climatology() -> LoadedSource {
        LoadedSource::Climatology(ClimatologyProfile {
            data: data(&[&[100.0, 200.0]]),
            calendar: vec![CalendarIndex { day_of_year: 60, hour: None }],
        })
    }

    fn forecast(step: u32, values: &[f64]) -> LoadedSource {
        let issuance = t(12) - Duration::hours(i64::from(step));
        LoadedSource::Forecast(ForecastRun::new(data(&[values]), issuance, step).unwrap())
    }

    fn request(timestamps: Vec<DateTime<Utc>>) -> AlignmentRequest {
        AlignmentRequest {
            grid: site_grid(),
            timestamps,
            variables: vec!["ssrd".into()],
        }
    }

    #[test]
    fn forecast_preferred_over_climatology() {
        let sources = vec![climatology(), forecast(6, &[500.0, f64::NAN])];
        let aligned = align(&request(vec![t(12)]), &sources, &AlignmentConfig::default()).unwrap();
        let var = aligned.variable("ssrd").unwrap();

        assert_eq!(var.values[0].value, 500.0);
        assert!(matches!(var.values[0].provenance, Provenance::Forecast { step_hours: 6, .. }));
        // Cell b has no forecast value and falls through to climatology.
        assert_eq!(var.values[1].value, 200.0);
        assert_eq!(var.values[1].provenance, Provenance::Climatology);
        assert_eq!(var.provenance_summary().forecast, 1);
    }

    #[test]
    fn known_reanalysis_value_round_trips() {
        let field = LoadedSource::Reanalysis(GriddedField {
            data: data(&[&[1.0, 2.0], &[3.0, 4.0]]),
            times: vec![t(0), t(1)],
        });
        let req = AlignmentRequest {
            grid: SpatialGrid::Points {
                cells: vec![Site { id: "b".into(), lat: 1.0, lon: 37.0 }],
            },
            timestamps: vec![t(1)],
            variables: vec!["ssrd".into()],
        };
        let aligned = align(&req, &[field], &AlignmentConfig::default()).unwrap();
        let record = aligned.record(0);
        let v = record.get("ssrd").unwrap();
        assert_eq!(v.value, 4.0);
        assert_eq!(v.provenance, Provenance::Observed);
        assert_eq!(record.cell_ref().id, "b");
    }

    #[test]
    fn no_tier_raises_coverage_gap() {
        // Climatology only covers day 60; day 61 has nothing.
        let sources = vec![climatology()];
        let day61 = Utc.with_ymd_and_hms(2025, 3, 2, 0, 0, 0).unwrap();
        let err = align(&request(vec![t(0), day61]), &sources, &AlignmentConfig::default())
            .unwrap_err();
        match err {
            PipelineError::CoverageGap { variable, cell, timestamp } => {
                assert_eq!(variable, "ssrd");
                assert_eq!(cell, "a");
                assert_eq!(timestamp, day61);
            }
            other => panic!("unexpected error {other}"),
        }

        let err = align(&request(vec![t(0)]), &[], &AlignmentConfig::default()).unwrap_err();
        assert!(matches!(err, PipelineError::CoverageGap { .. }));
    }

    #[test]
    fn duplicate_forecast_identity_is_rejected() {
        let sources = vec![forecast(6, &[1.0, 1.0]), forecast(6, &[2.0, 2.0])];
        let err = align(&request(vec![t(12)]), &sources, &AlignmentConfig::default()).unwrap_err();
        assert!(matches!(err, PipelineError::NamingMismatch { .. }));
    }

    #[test]
    fn alignment_is_deterministic() {
        let sources = vec![climatology(), forecast(6, &[500.0, f64::NAN]), forecast(12, &[450.0, 300.0])];
        let config = AlignmentConfig::default();
        let a = align(&request(vec![t(12)]), &sources, &config).unwrap();
        let b = align(&request(vec![t(12)]), &sources, &config).unwrap();
        assert_eq!(a.variables[0].values, b.variables[0].values);
        assert_eq!(a.variables[0].values[1].value, 300.0);
    }
}

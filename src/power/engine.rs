//! Power conversion engine: aligned records → power estimates.
//!
//! Units are checked for every input variable before any record is
//! converted; records are then evaluated independently in parallel.

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::{AlignedDataset, AlignedRecord, GenerationType, PowerEstimate, Unit};
use crate::error::{PipelineError, PipelineResult};
use crate::power::hydro::{self, FlowSource, HydroParams};
use crate::power::solar::{self, SolarParams};
use crate::power::wind::{self, WindParams};

/// Parameter sets for every generation type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionParams {
    pub solar: SolarParams,
    pub wind: WindParams,
    pub hydro: HydroParams,
}

/// Installed capacity (MW) per target cell id.
///
/// Cells present in the map use their own capacity instead of the configured
/// per-cell default; cells absent from it keep the default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CapacityMap {
    pub by_cell: BTreeMap<String, f64>,
}

impl CapacityMap {
    pub fn get(&self, cell_id: &str) -> Option<f64> {
        self.by_cell.get(cell_id).copied()
    }

    pub fn total_mw(&self) -> f64 {
        self.by_cell.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_cell.is_empty()
    }
}

/// Variables a generation type reads, with the unit each must carry.
pub fn required_inputs(generation: GenerationType, params: &ConversionParams) -> Vec<(String, UnitRule)> {
    match generation {
        GenerationType::Solar => {
            let mut inputs = vec![(
                params.solar.radiation_variable.clone(),
                UnitRule::Exactly(Unit::WattsPerSquareMetre),
            )];
            if let Some(t) = &params.solar.temperature_variable {
                inputs.push((t.clone(), UnitRule::Temperature));
            }
            inputs
        }
        GenerationType::Wind => params
            .wind
            .variables()
            .into_iter()
            .map(|v| (v, UnitRule::Exactly(Unit::MetresPerSecond)))
            .collect(),
        GenerationType::Hydro => {
            let unit = match params.hydro.flow {
                FlowSource::Discharge { .. } => Unit::CubicMetresPerSecond,
                FlowSource::RunoffProxy { .. } => Unit::KilogramsPerSquareMetrePerSecond,
            };
            vec![(params.hydro.flow.variable().to_string(), UnitRule::Exactly(unit))]
        }
    }
}

/// Accepted unit for a conversion input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitRule {
    Exactly(Unit),
    /// Kelvin or degrees Celsius.
    Temperature,
}

impl UnitRule {
    fn accepts(self, unit: Unit) -> bool {
        match self {
            UnitRule::Exactly(u) => u == unit,
            UnitRule::Temperature => unit.is_temperature(),
        }
    }

    fn describe(self) -> String {
        match self {
            UnitRule::Exactly(u) => u.symbol().to_string(),
            UnitRule::Temperature => "K or degC".to_string(),
        }
    }
}

/// Check every input's declared unit before converting anything.
pub fn check_units(
    dataset: &AlignedDataset,
    generation: GenerationType,
    params: &ConversionParams,
) -> PipelineResult<()> {
    for (name, rule) in required_inputs(generation, params) {
        let var = dataset.variable(&name).ok_or_else(|| {
            PipelineError::schema(
                "aligned dataset",
                format!("{} conversion needs `{name}`, which was not aligned", generation.display_name()),
            )
        })?;
        if !rule.accepts(var.unit) {
            return Err(PipelineError::UnitMismatch {
                variable: name,
                expected: rule.describe(),
                found: var.unit.symbol().to_string(),
            });
        }
    }
    Ok(())
}

/// Convert every record of `dataset`.
///
/// Output is in record order (cell-major, then time). The first failing
/// record in that order is reported.
pub fn convert_dataset(
    dataset: &AlignedDataset,
    generation: GenerationType,
    params: &ConversionParams,
    capacity: Option<&CapacityMap>,
) -> PipelineResult<Vec<PowerEstimate>> {
    check_units(dataset, generation, params)?;

    let estimates = (0..dataset.record_count())
        .into_par_iter()
        .map(|i| convert_record(&dataset.record(i), generation, params, capacity))
        .collect::<Vec<_>>()
        .into_iter()
        .collect::<PipelineResult<Vec<_>>>()?;

    let total: f64 = estimates.iter().map(|e| e.power_mw).sum();
    info!(
        generation = generation.display_name(),
        records = estimates.len(),
        total_mw = total,
        "converted records"
    );
    Ok(estimates)
}

/// Convert one aligned record. Units must already have been checked.
pub fn convert_record(
    record: &AlignedRecord<'_>,
    generation: GenerationType,
    params: &ConversionParams,
    capacity: Option<&CapacityMap>,
) -> PipelineResult<PowerEstimate> {
    let cell = record.cell_ref();
    let timestamp = record.timestamp();
    let value = |name: &str| -> PipelineResult<f64> {
        record.get(name).map(|v| v.value).ok_or_else(|| {
            PipelineError::schema("aligned dataset", format!("variable `{name}` is not aligned"))
        })
    };
    let invalid = |name: &str, detail: String| PipelineError::PhysicallyInvalidInput {
        variable: name.to_string(),
        cell: cell.id.clone(),
        timestamp,
        detail,
    };
    let cell_capacity = capacity.and_then(|c| c.get(&cell.id));

    let (power_mw, model_version) = match generation {
        GenerationType::Solar => {
            let p = &params.solar;
            let irradiance = value(&p.radiation_variable)?;
            let air_c = match &p.temperature_variable {
                Some(name) => {
                    let var = record.dataset.variable(name).map(|v| v.unit);
                    let t = value(name)?;
                    Some(match var {
                        Some(Unit::Kelvin) => t - 273.15,
                        _ => t,
                    })
                }
                None => None,
            };
            let cap = cell_capacity.unwrap_or(p.capacity_mw);
            (solar::solar_power_mw(irradiance, air_c, cap, p), solar::MODEL_VERSION)
        }
        GenerationType::Wind => {
            let p = &params.wind;
            let speed = match &p.speed_variable {
                Some(name) => {
                    let s = value(name)?;
                    if s < 0.0 {
                        return Err(invalid(name, format!("negative wind speed {s} m s-1")));
                    }
                    s
                }
                None => value(&p.u_variable)?.hypot(value(&p.v_variable)?),
            };
            let cap = cell_capacity.unwrap_or(p.rated_capacity_mw);
            let v = wind::hub_speed(speed, p);
            (wind::power_curve(v, cap, p), wind::MODEL_VERSION)
        }
        GenerationType::Hydro => {
            let p = &params.hydro;
            let name = p.flow.variable();
            let input = value(name)?;
            if input < 0.0 {
                return Err(invalid(name, format!("negative flow input {input}")));
            }
            let flow = hydro::flow_from_input(input, &p.flow);
            let ceiling = cell_capacity.or(p.capacity_mw);
            (hydro::hydro_power_mw(flow, ceiling, p), hydro::MODEL_VERSION)
        }
    };

    Ok(PowerEstimate {
        cell,
        timestamp,
        generation,
        power_mw,
        model_version: model_version.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AlignedValue, AlignedVariable, Provenance, SpatialGrid};
    use chrono::{TimeZone, Utc};

    fn dataset(vars: Vec<(&str, Unit, Vec<f64>)>) -> AlignedDataset {
        let n = vars.first().map(|v| v.2.len()).unwrap_or(0);
        AlignedDataset {
            grid: SpatialGrid::Basins {
                ids: (0..n).map(|i| format!("c{i}")).collect(),
            },
            timestamps: vec![Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()],
            variables: vars
                .into_iter()
                .map(|(name, unit, values)| AlignedVariable {
                    name: name.to_string(),
                    unit,
                    values: values
                        .into_iter()
                        .map(|value| AlignedValue {
                            value,
                            provenance: Provenance::Observed,
                        })
                        .collect(),
                })
                .collect(),
        }
    }

    fn wind_params() -> ConversionParams {
        ConversionParams {
            wind: WindParams {
                speed_variable: Some("ws100".into()),
                ..WindParams::default()
            },
            ..ConversionParams::default()
        }
    }

    #[test]
    fn wind_scenario_over_cells() {
        let ds = dataset(vec![(
            "ws100",
            Unit::MetresPerSecond,
            vec![0.0, 2.0, 5.0, 12.0, 25.0, 30.0],
        )]);
        let out = convert_dataset(&ds, GenerationType::Wind, &wind_params(), None).unwrap();
        let p: Vec<f64> = out.iter().map(|e| e.power_mw).collect();
        assert_eq!(p[0], 0.0);
        assert_eq!(p[1], 0.0);
        assert!(p[2] > 0.0 && p[2] < 2.0);
        assert_eq!(p[3], 2.0);
        assert_eq!(p[4], 0.0);
        assert_eq!(p[5], 0.0);
        assert!(out.iter().all(|e| e.model_version == wind::MODEL_VERSION));
        assert_eq!(out[3].cell.id, "c3");
    }

    #[test]
    fn negative_speed_is_physically_invalid() {
        let ds = dataset(vec![("ws100", Unit::MetresPerSecond, vec![4.0, -1.0])]);
        let err = convert_dataset(&ds, GenerationType::Wind, &wind_params(), None).unwrap_err();
        match err {
            PipelineError::PhysicallyInvalidInput { cell, .. } => assert_eq!(cell, "c1"),
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn unit_mismatch_before_any_conversion() {
        // Accumulated radiation must not be silently treated as a flux.
        let ds = dataset(vec![
            ("ssrd", Unit::JoulesPerSquareMetre, vec![3.6e6]),
            ("t2m", Unit::Kelvin, vec![300.0]),
        ]);
        let err = convert_dataset(&ds, GenerationType::Solar, &ConversionParams::default(), None)
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnitMismatch { .. }));
    }

    #[test]
    fn solar_accepts_kelvin_and_celsius_alike() {
        let params = ConversionParams::default();
        let k = dataset(vec![
            ("ssrd", Unit::WattsPerSquareMetre, vec![600.0]),
            ("t2m", Unit::Kelvin, vec![298.15]),
        ]);
        let c = dataset(vec![
            ("ssrd", Unit::WattsPerSquareMetre, vec![600.0]),
            ("t2m", Unit::Celsius, vec![25.0]),
        ]);
        let pk = convert_dataset(&k, GenerationType::Solar, &params, None).unwrap()[0].power_mw;
        let pc = convert_dataset(&c, GenerationType::Solar, &params, None).unwrap()[0].power_mw;
        assert!((pk - pc).abs() < 1e-9);
        assert!(pk >= 0.0);
    }

    #[test]
    fn hydro_negative_flow_and_capacity_map() {
        let params = ConversionParams::default();
        let ds = dataset(vec![("dis", Unit::CubicMetresPerSecond, vec![100.0, 100.0])]);
        let mut capacity = CapacityMap::default();
        capacity.by_cell.insert("c1".into(), 10.0);
        let out = convert_dataset(&ds, GenerationType::Hydro, &params, Some(&capacity)).unwrap();
        assert!((out[0].power_mw - 44.145).abs() < 1e-9);
        assert_eq!(out[1].power_mw, 10.0);

        let bad = dataset(vec![("dis", Unit::CubicMetresPerSecond, vec![-3.0])]);
        let err = convert_dataset(&bad, GenerationType::Hydro, &params, None).unwrap_err();
        assert!(matches!(err, PipelineError::PhysicallyInvalidInput { .. }));
    }

    #[test]
    fn missing_input_variable_is_schema_error() {
        let ds = dataset(vec![("t2m", Unit::Kelvin, vec![290.0])]);
        let err = convert_dataset(&ds, GenerationType::Solar, &ConversionParams::default(), None)
            .unwrap_err();
        assert!(matches!(err, PipelineError::SchemaMismatch { .. }));
    }
}

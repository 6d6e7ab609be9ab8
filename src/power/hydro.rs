//! Hydropower conversion: `P = η · ρ · g · Q · H`.

use serde::{Deserialize, Serialize};

pub const MODEL_VERSION: &str = "hydro-head-flow/1";

pub const WATER_DENSITY: f64 = 1000.0;
pub const GRAVITY: f64 = 9.81;

/// Where the flow `Q` comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FlowSource {
    /// River discharge variable in m3 s-1.
    Discharge { variable: String },
    /// `Q = precip_flux / ρ · catchment_area · runoff_coefficient`,
    /// precipitation flux in kg m-2 s-1.
    RunoffProxy {
        variable: String,
        catchment_area_m2: f64,
        runoff_coefficient: f64,
    },
}

impl FlowSource {
    pub fn variable(&self) -> &str {
        match self {
            FlowSource::Discharge { variable } | FlowSource::RunoffProxy { variable, .. } => variable,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HydroParams {
    pub hydro_efficiency: f64,
    pub head_m: f64,
    /// Output ceiling per cell (MW).
    pub capacity_mw: Option<f64>,
    pub flow: FlowSource,
}

impl Default for HydroParams {
    fn default() -> Self {
        Self {
            hydro_efficiency: 0.9,
            head_m: 50.0,
            capacity_mw: None,
            flow: FlowSource::Discharge {
                variable: "dis".to_string(),
            },
        }
    }
}

/// Flow in m3 s-1 from the configured input value.
pub fn flow_from_input(input: f64, source: &FlowSource) -> f64 {
    match source {
        FlowSource::Discharge { .. } => input,
        FlowSource::RunoffProxy {
            catchment_area_m2,
            runoff_coefficient,
            ..
        } => input / WATER_DENSITY * catchment_area_m2 * runoff_coefficient,
    }
}

/// Power in MW for a non-negative flow (m3 s-1).
pub fn hydro_power_mw(flow: f64, ceiling_mw: Option<f64>, params: &HydroParams) -> f64 {
    let mw = params.hydro_efficiency * WATER_DENSITY * GRAVITY * flow * params.head_m / 1e6;
    match ceiling_mw {
        Some(c) => mw.min(c),
        None => mw,
    }
}

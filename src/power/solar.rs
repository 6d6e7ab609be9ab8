//! Solar PV conversion.
//!
//! `P = G · A · η · f_T`, with the temperature derating
//!
//! - `T_cell = T_air + (NOCT − 20) / 800 · G`
//! - `f_T = 1 + γ (T_cell − T_ref)`
//!
//! Output is clamped to `[0, capacity]`.

use serde::{Deserialize, Serialize};

pub const MODEL_VERSION: &str = "solar-pv-derate/1";

/// Irradiance at which NOCT is specified (W m-2).
const NOCT_IRRADIANCE: f64 = 800.0;
/// Ambient temperature at which NOCT is specified (°C).
const NOCT_AMBIENT_C: f64 = 20.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolarParams {
    pub pv_efficiency: f64,
    /// Panel area per cell (m2).
    pub panel_area_m2: f64,
    /// Installed capacity per cell (MW); also the output ceiling.
    pub capacity_mw: f64,
    /// Power temperature coefficient γ (per °C, usually negative).
    pub temperature_coefficient: f64,
    pub noct_c: f64,
    pub reference_temperature_c: f64,
    /// Surface solar radiation variable (W m-2).
    pub radiation_variable: String,
    /// Air temperature variable (K or degC); no derating when unset.
    pub temperature_variable: Option<String>,
}

impl Default for SolarParams {
    fn default() -> Self {
        Self {
            pv_efficiency: 0.18,
            panel_area_m2: 60_000.0,
            capacity_mw: 10.0,
            temperature_coefficient: -0.004,
            noct_c: 45.0,
            reference_temperature_c: 25.0,
            radiation_variable: "ssrd".to_string(),
            temperature_variable: Some("t2m".to_string()),
        }
    }
}

/// Temperature derating factor, never negative.
pub fn temperature_factor(irradiance: f64, air_temperature_c: f64, params: &SolarParams) -> f64 {
    let cell_c = air_temperature_c + (params.noct_c - NOCT_AMBIENT_C) / NOCT_IRRADIANCE * irradiance;
    (1.0 + params.temperature_coefficient * (cell_c - params.reference_temperature_c)).max(0.0)
}

/// Power in MW for one cell.
///
/// `capacity_mw` is the cell's installed capacity; the panel area scales with
/// its ratio to the configured capacity.
pub fn solar_power_mw(
    irradiance: f64,
    air_temperature_c: Option<f64>,
    capacity_mw: f64,
    params: &SolarParams,
) -> f64 {
    let irradiance = irradiance.max(0.0);
    let scale = if params.capacity_mw > 0.0 {
        capacity_mw / params.capacity_mw
    } else {
        0.0
    };
    let derate = air_temperature_c
        .map(|t| temperature_factor(irradiance, t, params))
        .unwrap_or(1.0);
    let watts = irradiance * params.panel_area_m2 * scale * params.pv_efficiency * derate;
    (watts / 1e6).clamp(0.0, capacity_mw.max(0.0))
}

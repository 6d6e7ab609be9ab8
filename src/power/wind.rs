//! Wind turbine conversion: power-law shear to hub height, then a cubic
//! power curve between cut-in and rated speed.

use serde::{Deserialize, Serialize};

pub const MODEL_VERSION: &str = "wind-cubic-curve/1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindParams {
    pub turbine_cutin: f64,
    pub turbine_rated: f64,
    pub turbine_cutout: f64,
    /// Installed capacity per cell (MW).
    pub rated_capacity_mw: f64,
    pub hub_height_m: f64,
    /// Height the input wind is valid at.
    pub measurement_height_m: f64,
    /// Power-law shear exponent α.
    pub shear_exponent: f64,
    /// Wind speed variable (m s-1). When unset, `u_variable`/`v_variable` are used.
    pub speed_variable: Option<String>,
    pub u_variable: String,
    pub v_variable: String,
}

impl Default for WindParams {
    fn default() -> Self {
        Self {
            turbine_cutin: 3.0,
            turbine_rated: 12.0,
            turbine_cutout: 25.0,
            rated_capacity_mw: 2.0,
            hub_height_m: 100.0,
            measurement_height_m: 100.0,
            shear_exponent: 1.0 / 7.0,
            speed_variable: None,
            u_variable: "u100".to_string(),
            v_variable: "v100".to_string(),
        }
    }
}

impl WindParams {
    /// Input variables in the order [`crate::power::engine`] reads them.
    pub fn variables(&self) -> Vec<String> {
        match &self.speed_variable {
            Some(speed) => vec![speed.clone()],
            None => vec![self.u_variable.clone(), self.v_variable.clone()],
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        let ordered = 0.0 <= self.turbine_cutin
            && self.turbine_cutin < self.turbine_rated
            && self.turbine_rated < self.turbine_cutout;
        if !ordered {
            return Err(format!(
                "wind thresholds must satisfy 0 <= cut-in < rated < cut-out (got {}, {}, {})",
                self.turbine_cutin, self.turbine_rated, self.turbine_cutout
            ));
        }
        if !(self.hub_height_m > 0.0 && self.measurement_height_m > 0.0) {
            return Err("wind hub and measurement heights must be positive".to_string());
        }
        Ok(())
    }
}

/// Speed at hub height; identity when both heights match.
pub fn hub_speed(speed: f64, params: &WindParams) -> f64 {
    if params.hub_height_m == params.measurement_height_m {
        return speed;
    }
    speed * (params.hub_height_m / params.measurement_height_m).powf(params.shear_exponent)
}

/// Power curve (MW) at hub-height speed `v` for a turbine of `capacity_mw`.
pub fn power_curve(v: f64, capacity_mw: f64, params: &WindParams) -> f64 {
    let (ci, vr, co) = (params.turbine_cutin, params.turbine_rated, params.turbine_cutout);
    if v < ci || v >= co {
        0.0
    } else if v < vr {
        capacity_mw * (v.powi(3) - ci.powi(3)) / (vr.powi(3) - ci.powi(3))
    } else {
        capacity_mw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn curve_breakpoints() {
        let params = WindParams::default();
        let out: Vec<f64> = [0.0, 2.0, 5.0, 12.0, 25.0, 30.0]
            .iter()
            .map(|&v| power_curve(v, 2.0, &params))
            .collect();

        let ramp = 2.0 * (125.0 - 27.0) / (1728.0 - 27.0);
        assert_eq!(out[0], 0.0);
        assert_eq!(out[1], 0.0);
        assert!((out[2] - ramp).abs() < 1e-12);
        assert_eq!(out[3], 2.0);
        assert_eq!(out[4], 0.0);
        assert_eq!(out[5], 0.0);
    }

    #[test]
    fn shear_raises_speed_with_height() {
        let params = WindParams {
            hub_height_m: 100.0,
            measurement_height_m: 10.0,
            ..WindParams::default()
        };
        let v = hub_speed(5.0, &params);
        assert!((v - 5.0 * 10f64.powf(1.0 / 7.0)).abs() < 1e-12);
        assert_eq!(hub_speed(5.0, &WindParams::default()), 5.0);
    }

    #[test]
    fn thresholds_must_be_ordered() {
        let bad = WindParams {
            turbine_rated: 30.0,
            ..WindParams::default()
        };
        assert!(bad.validate().is_err());
        assert!(WindParams::default().validate().is_ok());
    }
}

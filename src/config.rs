//! Pipeline configuration (TOML).
//!
//! Every field has a default, so an empty file is a valid configuration with
//! no requests. A minimal file looks like:
//!
//! ```toml
//! data_dir = "data"
//!
//! [alignment]
//! spatial_method = "bilinear"
//! max_lead_gap_hours = 72
//!
//! [[request]]
//! name = "kenya-solar"
//! generation = "solar"
//! start = "2025-03-01T00:00:00Z"
//! end = "2025-03-02T00:00:00Z"
//! grid = { kind = "regular", lat = [0.0, -1.0], lon = [36.0, 37.0] }
//! ```
//!
//! Timestamps are RFC 3339 strings.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::align::{AlignmentConfig, AlignmentRequest};
use crate::data::plants::ICPAC_COUNTRIES;
use crate::domain::{GenerationType, Period, Reduction, SpatialGrid, SpatialSelection, TimeWindow};
use crate::error::{PipelineError, PipelineResult};
use crate::power::{
    ConversionParams, FlowSource, HydroParams, SolarParams, WindParams, required_inputs,
};

/// Environment variable naming the default configuration file.
pub const CONFIG_ENV: &str = "REPOWER_CONFIG";
/// Used when neither `--config` nor `REPOWER_CONFIG` is given and it exists.
pub const DEFAULT_CONFIG_FILE: &str = "repower.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Root of the `AIFS/`, `ERA5/` and `climatology/` source tree.
    pub data_dir: PathBuf,
    pub alignment: AlignmentConfig,
    pub solar: SolarParams,
    pub wind: WindParams,
    pub hydro: HydroParams,
    pub plants: Option<PlantsConfig>,
    #[serde(rename = "request")]
    pub requests: Vec<RequestConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            alignment: AlignmentConfig::default(),
            solar: SolarParams::default(),
            wind: WindParams::default(),
            hydro: HydroParams::default(),
            plants: None,
            requests: Vec::new(),
        }
    }
}

/// Plant registry used to derive per-cell installed capacity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlantsConfig {
    /// GeoJSON FeatureCollection (RePP layout).
    pub registry: PathBuf,
    #[serde(default = "default_countries")]
    pub countries: Vec<String>,
}

fn default_countries() -> Vec<String> {
    ICPAC_COUNTRIES.iter().map(|c| c.to_string()).collect()
}

/// One estimation request: a generation type over a grid and time axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestConfig {
    pub name: String,
    pub generation: GenerationType,
    pub grid: SpatialGrid,
    pub start: DateTime<Utc>,
    /// Exclusive.
    pub end: DateTime<Utc>,
    #[serde(default = "default_step_hours")]
    pub step_hours: u32,
    /// Take installed capacity per cell from the plant registry.
    #[serde(default)]
    pub use_plant_capacity: bool,
    #[serde(default = "default_aggregations", rename = "aggregation")]
    pub aggregations: Vec<AggregationConfig>,
}

fn default_step_hours() -> u32 {
    1
}

fn default_aggregations() -> Vec<AggregationConfig> {
    vec![AggregationConfig::default()]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    pub selection: SpatialSelection,
    pub reduction: Reduction,
    pub period: Period,
    /// Defaults to the request window.
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            selection: SpatialSelection::All,
            reduction: Reduction::Mean,
            period: Period::Total,
            start: None,
            end: None,
        }
    }
}

impl RequestConfig {
    pub fn window(&self) -> TimeWindow {
        TimeWindow {
            start: self.start,
            end: self.end,
        }
    }

    /// Target timestamps `start, start + step, ...` strictly before `end`.
    pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
        let step = Duration::hours(i64::from(self.step_hours.max(1)));
        let mut out = Vec::new();
        let mut t = self.start;
        while t < self.end {
            out.push(t);
            t += step;
        }
        out
    }

    pub fn alignment_request(&self, conversion: &ConversionParams) -> AlignmentRequest {
        AlignmentRequest {
            grid: self.grid.clone(),
            timestamps: self.timestamps(),
            variables: required_inputs(self.generation, conversion)
                .into_iter()
                .map(|(name, _)| name)
                .collect(),
        }
    }
}

impl AggregationConfig {
    pub fn window(&self, request: &RequestConfig) -> TimeWindow {
        TimeWindow {
            start: self.start.unwrap_or(request.start),
            end: self.end.unwrap_or(request.end),
        }
    }
}

impl PipelineConfig {
    /// The conversion parameter sets as one bundle.
    pub fn conversion(&self) -> ConversionParams {
        ConversionParams {
            solar: self.solar.clone(),
            wind: self.wind.clone(),
            hydro: self.hydro.clone(),
        }
    }

    /// Read and validate a TOML file.
    pub fn load(path: &Path) -> PipelineResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        let config = Self::from_toml(&text)
            .map_err(|e| PipelineError::InvalidConfig(format!("{}: {e}", path.display())))?;
        debug!(path = %path.display(), requests = config.requests.len(), "loaded configuration");
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, String> {
        let config: PipelineConfig = toml::from_str(text).map_err(|e| e.to_string())?;
        config.validate()?;
        Ok(config)
    }

    /// Every variable any request needs, deduplicated, in first-use order.
    pub fn required_variables(&self) -> Vec<String> {
        let conversion = self.conversion();
        let mut seen = HashSet::new();
        self.requests
            .iter()
            .flat_map(|r| required_inputs(r.generation, &conversion))
            .map(|(name, _)| name)
            .filter(|name| seen.insert(name.clone()))
            .collect()
    }

    pub fn validate(&self) -> Result<(), String> {
        let a = &self.alignment;
        if !(a.interpolation_radius_deg.is_finite() && a.interpolation_radius_deg > 0.0) {
            return Err("alignment.interpolation_radius_deg must be > 0".to_string());
        }

        let solar = &self.solar;
        if !(solar.pv_efficiency > 0.0 && solar.pv_efficiency <= 1.0) {
            return Err("solar.pv_efficiency must be in (0, 1]".to_string());
        }
        if !(solar.panel_area_m2 >= 0.0 && solar.capacity_mw >= 0.0) {
            return Err("solar.panel_area_m2 and solar.capacity_mw must be >= 0".to_string());
        }
        self.wind.validate()?;
        if !(self.wind.rated_capacity_mw >= 0.0) {
            return Err("wind.rated_capacity_mw must be >= 0".to_string());
        }

        let hydro = &self.hydro;
        if !(hydro.hydro_efficiency > 0.0 && hydro.hydro_efficiency <= 1.0) {
            return Err("hydro.hydro_efficiency must be in (0, 1]".to_string());
        }
        if !(hydro.head_m > 0.0) {
            return Err("hydro.head_m must be > 0".to_string());
        }
        if let Some(capacity) = hydro.capacity_mw {
            if !(capacity >= 0.0) {
                return Err("hydro.capacity_mw must be >= 0".to_string());
            }
        }
        if let FlowSource::RunoffProxy {
            catchment_area_m2,
            runoff_coefficient,
            ..
        } = &hydro.flow
        {
            if !(*catchment_area_m2 > 0.0 && (0.0..=1.0).contains(runoff_coefficient)) {
                return Err(
                    "hydro runoff proxy needs catchment_area_m2 > 0 and runoff_coefficient in [0, 1]"
                        .to_string(),
                );
            }
        }

        let mut names = HashSet::new();
        for r in &self.requests {
            if r.name.trim().is_empty() {
                return Err("request names must not be empty".to_string());
            }
            if !names.insert(r.name.as_str()) {
                return Err(format!("duplicate request name `{}`", r.name));
            }
            if r.end <= r.start {
                return Err(format!("request `{}`: end must be after start", r.name));
            }
            if r.step_hours == 0 {
                return Err(format!("request `{}`: step_hours must be > 0", r.name));
            }
            validate_grid(&r.grid).map_err(|e| format!("request `{}`: {e}", r.name))?;
            if r.use_plant_capacity && self.plants.is_none() {
                return Err(format!(
                    "request `{}` uses plant capacity but no [plants] registry is configured",
                    r.name
                ));
            }
            for agg in &r.aggregations {
                let w = agg.window(r);
                if w.end <= w.start {
                    return Err(format!("request `{}`: aggregation window is empty", r.name));
                }
                if let SpatialSelection::BoundingBox { lat_min, lat_max, .. } = &agg.selection {
                    if lat_min > lat_max {
                        return Err(format!("request `{}`: bounding box lat_min > lat_max", r.name));
                    }
                }
            }
        }
        Ok(())
    }
}

fn validate_grid(grid: &SpatialGrid) -> Result<(), String> {
    if grid.cell_count() == 0 {
        return Err("grid has no cells".to_string());
    }
    match grid {
        SpatialGrid::Regular { lat, lon } => {
            for (name, axis) in [("lat", lat), ("lon", lon)] {
                let inc = axis.windows(2).all(|w| w[1] > w[0]);
                let dec = axis.windows(2).all(|w| w[1] < w[0]);
                if !(inc || dec) || axis.iter().any(|v| !v.is_finite()) {
                    return Err(format!("grid `{name}` axis must be finite and strictly monotonic"));
                }
            }
        }
        SpatialGrid::Points { cells } => {
            let mut ids = HashSet::new();
            for c in cells {
                if !ids.insert(c.id.as_str()) {
                    return Err(format!("duplicate site id `{}`", c.id));
                }
            }
        }
        SpatialGrid::Basins { ids } => {
            let unique: HashSet<&String> = ids.iter().collect();
            if unique.len() != ids.len() {
                return Err("duplicate basin id".to_string());
            }
        }
    }
    Ok(())
}

/// Pick the config file: explicit path, then `REPOWER_CONFIG`, then
/// `repower.toml` in the working directory if present.
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = explicit {
        return Some(p.to_path_buf());
    }
    if let Ok(p) = std::env::var(CONFIG_ENV) {
        if !p.trim().is_empty() {
            return Some(PathBuf::from(p));
        }
    }
    let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
    fallback.is_file().then_some(fallback)
}

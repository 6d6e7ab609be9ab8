//! Seeded synthetic source tree for demos and end-to-end tests.
//!
//! Writes grid JSON files in the standard layout:
//!
//! - `ERA5/`: reanalysis for the first half of the period (with a few gaps)
//! - `AIFS/output/`: one forecast run issued at the half-way point
//! - `climatology/`: hourly profiles covering every day of the period
//!
//! plus a `repower.toml` with one request per generation type. The same seed
//! always produces byte-identical files.

use std::f64::consts::PI;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Timelike, Utc};
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;
use tracing::info;

use crate::error::{PipelineError, PipelineResult};
use crate::io::grid_json::{GridJsonFile, write_grid_json};
use crate::io::layout::{ForecastName, climatology_path, forecast_path, reanalysis_path};
use crate::io::raw::{AttrValue, RawCoord, RawDimension};

/// Fraction of reanalysis samples dropped to exercise gap filling.
const GAP_PROBABILITY: f64 = 0.02;

#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticSpec {
    pub seed: u64,
    pub start: DateTime<Utc>,
    pub hours: u32,
    pub lat: Vec<f64>,
    pub lon: Vec<f64>,
    pub basins: Vec<String>,
    /// Forecast steps (hours) of the single run issued at `start + hours / 2`.
    pub forecast_steps: Vec<u32>,
}

impl Default for SyntheticSpec {
    fn default() -> Self {
        Self {
            seed: 42,
            start: Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).single().unwrap_or_default(),
            hours: 48,
            lat: vec![1.0, 0.5, 0.0, -0.5, -1.0],
            lon: vec![36.0, 36.5, 37.0, 37.5, 38.0],
            basins: vec!["tana".to_string(), "athi".to_string()],
            forecast_steps: vec![6, 12, 18],
        }
    }
}

impl SyntheticSpec {
    pub fn validate(&self) -> Result<(), String> {
        if self.hours < 2 {
            return Err("synthetic period must span at least 2 hours".to_string());
        }
        if self.lat.is_empty() || self.lon.is_empty() {
            return Err("synthetic grid needs at least one latitude and longitude".to_string());
        }
        if self.basins.is_empty() {
            return Err("synthetic data needs at least one basin".to_string());
        }
        Ok(())
    }

    fn issuance(&self) -> DateTime<Utc> {
        self.start + Duration::hours(i64::from(self.hours / 2))
    }

    fn reanalysis_times(&self) -> Vec<DateTime<Utc>> {
        (0..self.hours / 2)
            .map(|h| self.start + Duration::hours(i64::from(h)))
            .collect()
    }

    fn days_of_year(&self) -> Vec<u32> {
        let end = self.start + Duration::hours(i64::from(self.hours));
        let mut days: Vec<u32> = Vec::new();
        let mut t = self.start;
        while t < end {
            if days.last() != Some(&t.ordinal()) {
                days.push(t.ordinal());
            }
            t += Duration::hours(1);
        }
        days
    }
}

/// What [`write_synthetic_tree`] produced.
#[derive(Debug, Clone)]
pub struct SyntheticOutput {
    pub files: Vec<PathBuf>,
    pub config_path: PathBuf,
}

/// The shape of one variable's field.
enum Layout<'a> {
    Regular { lat: &'a [f64], lon: &'a [f64] },
    Basins(&'a [String]),
}

impl Layout<'_> {
    fn cells(&self) -> usize {
        match self {
            Layout::Regular { lat, lon } => lat.len() * lon.len(),
            Layout::Basins(ids) => ids.len(),
        }
    }

    fn lat_of(&self, cell: usize) -> f64 {
        match self {
            Layout::Regular { lon, lat } => lat[cell / lon.len()],
            Layout::Basins(_) => 0.0,
        }
    }

    fn dims_and_coords(&self, file: &mut GridJsonFile) {
        match self {
            Layout::Regular { lat, lon } => {
                push_dim(file, "latitude", numeric(lat.to_vec(), None));
                push_dim(file, "longitude", numeric(lon.to_vec(), None));
            }
            Layout::Basins(ids) => push_dim(
                file,
                "basin",
                RawCoord {
                    labels: Some(ids.to_vec()),
                    ..RawCoord::default()
                },
            ),
        }
    }
}

struct Variable {
    name: &'static str,
    units: &'static str,
}

const SSRD: Variable = Variable { name: "ssrd", units: "W m**-2" };
const T2M: Variable = Variable { name: "t2m", units: "K" };
const U100: Variable = Variable { name: "u100", units: "m s**-1" };
const V100: Variable = Variable { name: "v100", units: "m s**-1" };
const DIS: Variable = Variable { name: "dis", units: "m3 s-1" };

/// Write the synthetic tree under `dir`.
pub fn write_synthetic_tree(dir: &Path, spec: &SyntheticSpec) -> PipelineResult<SyntheticOutput> {
    spec.validate().map_err(PipelineError::InvalidConfig)?;

    let mut rng = StdRng::seed_from_u64(spec.seed);
    let noise = Normal::new(0.0, 1.0)
        .map_err(|e| PipelineError::InvalidConfig(format!("noise distribution error: {e}")))?;
    let regular = Layout::Regular {
        lat: &spec.lat,
        lon: &spec.lon,
    };
    let basins = Layout::Basins(&spec.basins);

    let mut files = Vec::new();
    for (var, layout) in [
        (&SSRD, &regular),
        (&T2M, &regular),
        (&U100, &regular),
        (&V100, &regular),
        (&DIS, &basins),
    ] {
        let mut sample = |t: DateTime<Utc>, cell: usize| {
            value_at(var.name, t, layout.lat_of(cell), cell, noise.sample(&mut rng))
        };

        // Reanalysis, with occasional gaps.
        let times = spec.reanalysis_times();
        let mut file = new_file(var);
        push_dim(
            &mut file,
            "time",
            numeric(
                (0..times.len()).map(|h| h as f64).collect(),
                Some(format!("hours since {}", spec.start.format("%Y-%m-%d %H:%M:%S"))),
            ),
        );
        layout.dims_and_coords(&mut file);
        let mut values = Vec::with_capacity(times.len() * layout.cells());
        for &t in &times {
            for cell in 0..layout.cells() {
                let v = sample(t, cell);
                values.push(v);
            }
        }
        let mut gap_rng = StdRng::seed_from_u64(spec.seed ^ 0x9e37_79b9);
        file.values = values
            .into_iter()
            .map(|v| (!gap_rng.gen_bool(GAP_PROBABILITY)).then_some(v))
            .collect();
        let path = reanalysis_path(dir, var.name, "oper", "hourly", "json");
        write_grid_json(&path, &file)?;
        files.push(path);

        // One forecast file per step.
        for &step in &spec.forecast_steps {
            let name = ForecastName {
                issuance: spec.issuance(),
                step_hours: step,
                variable: var.name.to_string(),
            };
            let valid = name.issuance + Duration::hours(i64::from(step));
            let mut file = new_file(var);
            file.global_attrs.insert(
                "forecast_reference_time".to_string(),
                AttrValue::Text(name.issuance.to_rfc3339()),
            );
            file.global_attrs
                .insert("step".to_string(), AttrValue::Number(f64::from(step)));
            push_dim(
                &mut file,
                "time",
                RawCoord {
                    labels: Some(vec![valid.to_rfc3339()]),
                    ..RawCoord::default()
                },
            );
            layout.dims_and_coords(&mut file);
            file.values = (0..layout.cells()).map(|cell| Some(sample(valid, cell))).collect();
            let path = forecast_path(dir, &name, "json");
            write_grid_json(&path, &file)?;
            files.push(path);
        }

        // Hourly climatology without noise.
        let days = spec.days_of_year();
        let mut file = new_file(var);
        push_dim(&mut file, "dayofyear", numeric(days.iter().map(|d| f64::from(*d)).collect(), None));
        push_dim(&mut file, "hour", numeric((0..24).map(f64::from).collect(), None));
        layout.dims_and_coords(&mut file);
        let year = spec.start.year();
        for &day in &days {
            for hour in 0..24 {
                let t = NaiveDate::from_yo_opt(year, day)
                    .and_then(|d| d.and_hms_opt(hour, 0, 0))
                    .map_or(spec.start, |n| n.and_utc());
                for cell in 0..layout.cells() {
                    file.values
                        .push(Some(value_at(var.name, t, layout.lat_of(cell), cell, 0.0)));
                }
            }
        }
        let path = climatology_path(dir, var.name, "json");
        write_grid_json(&path, &file)?;
        files.push(path);
    }

    let config_path = dir.join("repower.toml");
    std::fs::write(&config_path, sample_config(dir, spec))
        .map_err(|e| PipelineError::io(&config_path, e))?;

    info!(dir = %dir.display(), files = files.len(), seed = spec.seed, "wrote synthetic source tree");
    Ok(SyntheticOutput { files, config_path })
}

/// Deterministic signal plus scaled noise `z`.
fn value_at(variable: &str, t: DateTime<Utc>, lat: f64, cell: usize, z: f64) -> f64 {
    let hour = f64::from(t.hour());
    let diurnal = ((hour - 6.0) * PI / 12.0).sin();
    match variable {
        "ssrd" => {
            let clear_sky = 1000.0 * diurnal.max(0.0) * (1.0 - 0.01 * lat.abs());
            (clear_sky * (0.85 + 0.05 * z)).max(0.0)
        }
        "t2m" => 295.0 + 6.0 * diurnal + 0.5 * z,
        "u100" => 6.0 + 2.0 * diurnal + 0.2 * cell as f64 + z,
        "v100" => 2.0 - diurnal + 0.5 * z,
        "dis" => (120.0 + 40.0 * cell as f64 + 5.0 * z).max(0.0),
        _ => 0.0,
    }
}

fn new_file(var: &Variable) -> GridJsonFile {
    let mut file = GridJsonFile {
        variable: var.name.to_string(),
        ..GridJsonFile::default()
    };
    file.attrs
        .insert("units".to_string(), AttrValue::Text(var.units.to_string()));
    file.global_attrs.insert(
        "source".to_string(),
        AttrValue::Text("repower synthetic generator".to_string()),
    );
    file
}

fn numeric(values: Vec<f64>, units: Option<String>) -> RawCoord {
    RawCoord {
        values: Some(values),
        labels: None,
        units,
    }
}

fn push_dim(file: &mut GridJsonFile, name: &str, coord: RawCoord) {
    let len = coord.len().unwrap_or(0);
    file.dims.push(RawDimension {
        name: name.to_string(),
        len,
    });
    file.coords.insert(name.to_string(), coord);
}

fn sample_config(dir: &Path, spec: &SyntheticSpec) -> String {
    let start = spec.start.to_rfc3339();
    let end = (spec.start + Duration::hours(i64::from(spec.hours))).to_rfc3339();
    let mid_lat = spec.lat[spec.lat.len() / 2];
    let mid_lon = spec.lon[spec.lon.len() / 2];
    let basins = spec
        .basins
        .iter()
        .map(|b| format!("\"{b}\""))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        r#"# Generated by `repower synth` (seed {seed}).
data_dir = "{data_dir}"

[alignment]
spatial_method = "bilinear"
max_lead_gap_hours = 72
max_reanalysis_gap_hours = 3
interpolation_radius_deg = 1.0

[solar]
pv_efficiency = 0.18
panel_area_m2 = 60000.0
capacity_mw = 10.0
radiation_variable = "ssrd"
temperature_variable = "t2m"

[wind]
turbine_cutin = 3.0
turbine_rated = 12.0
turbine_cutout = 25.0
rated_capacity_mw = 2.0
u_variable = "u100"
v_variable = "v100"

[hydro]
hydro_efficiency = 0.9
head_m = 50.0
flow = {{ kind = "discharge", variable = "dis" }}

[[request]]
name = "solar-grid"
generation = "solar"
start = "{start}"
end = "{end}"
grid = {{ kind = "points", cells = [{{ id = "site-a", lat = {lat_a:?}, lon = {lon_a:?} }}, {{ id = "site-b", lat = {mid_lat:?}, lon = {mid_lon:?} }}] }}

[[request.aggregation]]
reduction = "mean"
period = "daily"

[[request.aggregation]]
reduction = "max"

[[request]]
name = "wind-sites"
generation = "wind"
start = "{start}"
end = "{end}"
grid = {{ kind = "points", cells = [{{ id = "site-a", lat = {lat_a:?}, lon = {lon_a:?} }}] }}

[[request.aggregation]]
reduction = "sum"

[[request]]
name = "hydro-basins"
generation = "hydro"
start = "{start}"
end = "{end}"
step_hours = 6
grid = {{ kind = "basins", ids = [{basins}] }}
"#,
        seed = spec.seed,
        data_dir = dir.display().to_string().replace('\\', "/"),
        lat_a = spec.lat[0] - 0.25 * (spec.lat[0] - mid_lat).signum(),
        lon_a = spec.lon[0] + 0.25 * (mid_lon - spec.lon[0]).signum(),
    )
}

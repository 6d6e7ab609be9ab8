//! Shared domain types.
//!
//! These types flow through the pipeline in one direction:
//!
//! `GriddedField` / `ForecastRun` / `ClimatologyProfile`
//! → `AlignedDataset` → `PowerEstimate` → `AggregatedResult`
//!
//! Each is immutable once produced. Output-side types are serializable so they
//! can be exported to JSON/CSV.

use std::path::PathBuf;

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use clap::ValueEnum;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::domain::grid::{CellRef, SpatialGrid};
use crate::domain::units::Unit;

/// Which kind of dataset a source file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Reanalysis,
    Forecast,
    Climatology,
}

/// Where to find one variable of one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDescriptor {
    pub path: PathBuf,
    pub variable: String,
    pub kind: SourceKind,
}

impl SourceDescriptor {
    pub fn new(path: impl Into<PathBuf>, variable: impl Into<String>, kind: SourceKind) -> Self {
        Self {
            path: path.into(),
            variable: variable.into(),
            kind,
        }
    }

    /// File name used in error messages.
    pub fn display_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Values of one variable on one grid, one frame per index entry.
///
/// Frames have the shape given by [`SpatialGrid::frame_shape`]. Non-finite
/// values mark missing samples.
#[derive(Debug, Clone)]
pub struct FieldData {
    pub variable: String,
    pub unit: Unit,
    pub grid: SpatialGrid,
    pub frames: Vec<DMatrix<f64>>,
}

impl FieldData {
    /// Value of cell `cell` in frame `frame`, `None` when missing.
    pub fn value(&self, frame: usize, cell: usize) -> Option<f64> {
        let (r, c) = self.grid.frame_position(cell);
        let v = self.frames.get(frame)?[(r, c)];
        v.is_finite().then_some(v)
    }
}

/// A variable sampled over a grid and a strictly increasing time axis.
#[derive(Debug, Clone)]
pub struct GriddedField {
    pub data: FieldData,
    pub times: Vec<DateTime<Utc>>,
}

/// A forecast field tagged with issuance time and lead time.
///
/// Identity is `(issuance, variable, step_hours)`.
#[derive(Debug, Clone)]
pub struct ForecastRun {
    pub field: GriddedField,
    pub issuance: DateTime<Utc>,
    pub step_hours: u32,
    /// `issuance + step_hours`; also the single entry of `field.times`.
    pub valid_time: DateTime<Utc>,
}

impl ForecastRun {
    /// `None` when `issuance + step_hours` is not representable.
    pub fn new(data: FieldData, issuance: DateTime<Utc>, step_hours: u32) -> Option<Self> {
        let valid_time = issuance.checked_add_signed(Duration::hours(i64::from(step_hours)))?;
        Some(Self {
            field: GriddedField {
                data,
                times: vec![valid_time],
            },
            issuance,
            step_hours,
            valid_time,
        })
    }
}

/// Calendar position used by climatology profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CalendarIndex {
    /// Day of year, 1..=366.
    pub day_of_year: u32,
    /// Hour of day for hourly profiles.
    pub hour: Option<u32>,
}

impl CalendarIndex {
    pub fn for_timestamp(t: DateTime<Utc>, hourly: bool) -> Self {
        Self {
            day_of_year: t.ordinal(),
            hour: hourly.then(|| t.hour()),
        }
    }
}

/// Long-term mean values indexed by calendar position.
#[derive(Debug, Clone)]
pub struct ClimatologyProfile {
    pub data: FieldData,
    /// One entry per frame, unique.
    pub calendar: Vec<CalendarIndex>,
}

impl ClimatologyProfile {
    pub fn is_hourly(&self) -> bool {
        self.calendar.iter().any(|c| c.hour.is_some())
    }

    pub fn frame_for(&self, index: CalendarIndex) -> Option<usize> {
        self.calendar.iter().position(|c| *c == index)
    }
}

/// Output of the dataset loader.
#[derive(Debug, Clone)]
pub enum LoadedSource {
    Reanalysis(GriddedField),
    Forecast(ForecastRun),
    Climatology(ClimatologyProfile),
}

impl LoadedSource {
    pub fn kind(&self) -> SourceKind {
        match self {
            LoadedSource::Reanalysis(_) => SourceKind::Reanalysis,
            LoadedSource::Forecast(_) => SourceKind::Forecast,
            LoadedSource::Climatology(_) => SourceKind::Climatology,
        }
    }

    pub fn data(&self) -> &FieldData {
        match self {
            LoadedSource::Reanalysis(f) => &f.data,
            LoadedSource::Forecast(r) => &r.field.data,
            LoadedSource::Climatology(p) => &p.data,
        }
    }

    pub fn variable(&self) -> &str {
        &self.data().variable
    }
}

/// Spatial resampling method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SpatialMethod {
    Nearest,
    #[default]
    Bilinear,
}

/// Which source tier supplied an aligned value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum Provenance {
    Observed,
    Forecast {
        issuance: DateTime<Utc>,
        step_hours: u32,
    },
    Climatology,
}

impl Provenance {
    pub fn label(&self) -> &'static str {
        match self {
            Provenance::Observed => "observed",
            Provenance::Forecast { .. } => "forecast",
            Provenance::Climatology => "climatology",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlignedValue {
    pub value: f64,
    pub provenance: Provenance,
}

/// One variable on the target grid and time axis; dense, no gaps.
#[derive(Debug, Clone)]
pub struct AlignedVariable {
    pub name: String,
    pub unit: Unit,
    /// Indexed `cell * n_times + time`.
    pub values: Vec<AlignedValue>,
}

/// Provenance counts for one aligned variable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProvenanceSummary {
    pub observed: usize,
    pub forecast: usize,
    pub climatology: usize,
}

impl AlignedVariable {
    pub fn provenance_summary(&self) -> ProvenanceSummary {
        let mut out = ProvenanceSummary::default();
        for v in &self.values {
            match v.provenance {
                Provenance::Observed => out.observed += 1,
                Provenance::Forecast { .. } => out.forecast += 1,
                Provenance::Climatology => out.climatology += 1,
            }
        }
        out
    }
}

/// All required variables resampled onto one grid and time axis.
#[derive(Debug, Clone)]
pub struct AlignedDataset {
    pub grid: SpatialGrid,
    pub timestamps: Vec<DateTime<Utc>>,
    pub variables: Vec<AlignedVariable>,
}

/// Read-only view of one `(cell, timestamp)` record of an aligned dataset.
#[derive(Debug, Clone, Copy)]
pub struct AlignedRecord<'a> {
    pub dataset: &'a AlignedDataset,
    pub cell: usize,
    pub time: usize,
}

impl AlignedDataset {
    pub fn record_count(&self) -> usize {
        self.grid.cell_count() * self.timestamps.len()
    }

    pub fn variable(&self, name: &str) -> Option<&AlignedVariable> {
        self.variables.iter().find(|v| v.name == name)
    }

    /// Record `i` in `(cell, time)` order.
    pub fn record(&self, i: usize) -> AlignedRecord<'_> {
        let n_times = self.timestamps.len();
        AlignedRecord {
            dataset: self,
            cell: i / n_times,
            time: i % n_times,
        }
    }
}

impl AlignedRecord<'_> {
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.dataset.timestamps[self.time]
    }

    pub fn cell_ref(&self) -> CellRef {
        self.dataset.grid.cell(self.cell)
    }

    pub fn get(&self, variable: &str) -> Option<AlignedValue> {
        let var = self.dataset.variable(variable)?;
        var.values
            .get(self.cell * self.dataset.timestamps.len() + self.time)
            .copied()
    }
}

/// Renewable generation technology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum GenerationType {
    Solar,
    Wind,
    Hydro,
}

impl GenerationType {
    pub const ALL: [GenerationType; 3] = [
        GenerationType::Solar,
        GenerationType::Wind,
        GenerationType::Hydro,
    ];

    pub fn display_name(self) -> &'static str {
        match self {
            GenerationType::Solar => "Solar",
            GenerationType::Wind => "Wind",
            GenerationType::Hydro => "Hydro",
        }
    }
}

/// Power output for one `(cell, timestamp)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerEstimate {
    pub cell: CellRef,
    pub timestamp: DateTime<Utc>,
    pub generation: GenerationType,
    /// Power in MW.
    pub power_mw: f64,
    pub model_version: String,
}

/// Reduction applied by the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Reduction {
    Sum,
    Mean,
    Max,
}

/// Calendar period used to split an aggregation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Hourly,
    Daily,
    #[default]
    Total,
}

/// Half-open time window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t >= self.start && t < self.end
    }
}

/// Which cells an aggregation covers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SpatialSelection {
    All,
    Cells {
        region_id: String,
        ids: Vec<String>,
    },
    BoundingBox {
        region_id: String,
        lat_min: f64,
        lat_max: f64,
        lon_min: f64,
        lon_max: f64,
    },
}

impl Default for SpatialSelection {
    fn default() -> Self {
        SpatialSelection::All
    }
}

impl SpatialSelection {
    pub fn region_id(&self) -> &str {
        match self {
            SpatialSelection::All => "all",
            SpatialSelection::Cells { region_id, .. }
            | SpatialSelection::BoundingBox { region_id, .. } => region_id,
        }
    }
}

/// Reduced power over a region and window (the pipeline's final output).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedResult {
    pub region_id: String,
    pub window: TimeWindow,
    pub reduction: Reduction,
    pub generation: Option<GenerationType>,
    pub value: f64,
    pub unit: String,
    pub record_count: usize,
}

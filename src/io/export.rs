//! Export power estimates (CSV), aligned inputs (CSV) and run results (JSON).
//!
//! The CSV exports are meant to be easy to consume in spreadsheets or
//! downstream scripts: one flat row per record, RFC 3339 timestamps.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use serde::Serialize;

use crate::domain::{AlignedDataset, PowerEstimate, Provenance};
use crate::error::{PipelineError, PipelineResult};

#[derive(Debug, Serialize)]
struct EstimateRow<'a> {
    cell_id: &'a str,
    lat: Option<f64>,
    lon: Option<f64>,
    timestamp: String,
    generation: &'static str,
    power_mw: f64,
    model_version: &'a str,
}

/// Write one row per power estimate.
pub fn write_estimates_csv(path: &Path, estimates: &[PowerEstimate]) -> PipelineResult<()> {
    let mut writer = csv_writer(path)?;
    for e in estimates {
        writer
            .serialize(EstimateRow {
                cell_id: &e.cell.id,
                lat: e.cell.lat,
                lon: e.cell.lon,
                timestamp: e.timestamp.to_rfc3339(),
                generation: e.generation.display_name(),
                power_mw: e.power_mw,
                model_version: &e.model_version,
            })
            .map_err(|err| csv_error(path, err))?;
    }
    writer.flush().map_err(|err| PipelineError::io(path, err))
}

#[derive(Debug, Serialize)]
struct AlignedRow<'a> {
    cell_id: String,
    timestamp: String,
    variable: &'a str,
    unit: &'static str,
    value: f64,
    provenance: &'static str,
    issuance: Option<String>,
    step_hours: Option<u32>,
}

/// Write the aligned inputs with the tier that supplied each value.
pub fn write_aligned_csv(path: &Path, dataset: &AlignedDataset) -> PipelineResult<()> {
    let mut writer = csv_writer(path)?;
    for i in 0..dataset.record_count() {
        let record = dataset.record(i);
        let cell = record.cell_ref();
        for var in &dataset.variables {
            let Some(v) = record.get(&var.name) else {
                continue;
            };
            let (issuance, step_hours) = match v.provenance {
                Provenance::Forecast {
                    issuance,
                    step_hours,
                } => (Some(issuance.to_rfc3339()), Some(step_hours)),
                _ => (None, None),
            };
            writer
                .serialize(AlignedRow {
                    cell_id: cell.id.clone(),
                    timestamp: record.timestamp().to_rfc3339(),
                    variable: &var.name,
                    unit: var.unit.symbol(),
                    value: v.value,
                    provenance: v.provenance.label(),
                    issuance,
                    step_hours,
                })
                .map_err(|err| csv_error(path, err))?;
        }
    }
    writer.flush().map_err(|err| PipelineError::io(path, err))
}

/// Write any serializable report as pretty JSON.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> PipelineResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
    }
    let file = File::create(path).map_err(|e| PipelineError::io(path, e))?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)
        .map_err(|e| PipelineError::io(path, std::io::Error::other(e)))
}

fn csv_writer(path: &Path) -> PipelineResult<csv::Writer<File>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
    }
    csv::Writer::from_path(path).map_err(|err| csv_error(path, err))
}

fn csv_error(path: &Path, err: csv::Error) -> PipelineError {
    PipelineError::io(path, std::io::Error::other(err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CellRef, GenerationType};
    use chrono::{TimeZone, Utc};

    #[test]
    fn estimates_csv_has_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("estimates.csv");
        let estimates = vec![PowerEstimate {
            cell: CellRef {
                index: 0,
                id: "turkana".to_string(),
                lat: Some(2.5),
                lon: Some(36.8),
            },
            timestamp: Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
            generation: GenerationType::Wind,
            power_mw: 1.25,
            model_version: "wind-cubic-curve/1".to_string(),
        }];
        write_estimates_csv(&path, &estimates).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("cell_id,lat,lon,timestamp,generation,power_mw,model_version")
        );
        let row = lines.next().unwrap();
        assert!(row.starts_with("turkana,2.5,36.8,2025-03-01T12:00:00+00:00,Wind,1.25,"));
    }
}

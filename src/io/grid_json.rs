//! Grid JSON: a NetCDF-shaped JSON encoding of one gridded variable.
//!
//! ```json
//! {
//!   "variable": "ssrd",
//!   "attrs": { "units": "W m-2" },
//!   "dims": [ {"name": "time", "len": 2}, {"name": "latitude", "len": 1}, {"name": "longitude", "len": 2} ],
//!   "coords": {
//!     "time": { "values": [0, 1], "units": "hours since 2025-01-01 00:00:00" },
//!     "latitude": { "values": [0.5] },
//!     "longitude": { "values": [36.0, 36.25] }
//!   },
//!   "values": [210.0, 215.5, null, 220.0],
//!   "global_attrs": {}
//! }
//! ```
//!
//! `null` entries are missing samples.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};
use crate::io::raw::{AttrValue, RawCoord, RawDataset, RawDimension};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GridJsonFile {
    pub variable: String,
    #[serde(default)]
    pub attrs: BTreeMap<String, AttrValue>,
    pub dims: Vec<RawDimension>,
    #[serde(default)]
    pub coords: BTreeMap<String, RawCoord>,
    pub values: Vec<Option<f64>>,
    #[serde(default)]
    pub global_attrs: BTreeMap<String, AttrValue>,
}

impl From<GridJsonFile> for RawDataset {
    fn from(file: GridJsonFile) -> Self {
        RawDataset {
            variable: file.variable,
            dims: file.dims,
            values: file
                .values
                .into_iter()
                .map(|v| v.unwrap_or(f64::NAN))
                .collect(),
            attrs: file.attrs,
            coords: file.coords,
            global_attrs: file.global_attrs,
        }
    }
}

/// Read a grid JSON file.
pub fn read_grid_json(path: &Path) -> PipelineResult<RawDataset> {
    let name = path.display().to_string();
    let file = File::open(path).map_err(|e| PipelineError::io(path, e))?;
    let parsed: GridJsonFile = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| PipelineError::schema(&name, format!("invalid grid JSON: {e}")))?;
    Ok(parsed.into())
}

/// Write a grid JSON file (pretty-printed).
pub fn write_grid_json(path: &Path, grid: &GridJsonFile) -> PipelineResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
    }
    let file = File::create(path).map_err(|e| PipelineError::io(path, e))?;
    serde_json::to_writer_pretty(BufWriter::new(file), grid).map_err(|e| {
        PipelineError::io(path, std::io::Error::other(e))
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nulls_become_missing() {
        let text = r#"{
            "variable": "ws100",
            "attrs": {"units": "m s-1", "_FillValue": -9999},
            "dims": [{"name": "site", "len": 2}],
            "coords": {"site": {"labels": ["a", "b"]}},
            "values": [4.5, null]
        }"#;
        let parsed: GridJsonFile = serde_json::from_str(text).unwrap();
        let raw: RawDataset = parsed.into();
        assert_eq!(raw.values.len(), 2);
        assert!(raw.values[1].is_nan());
        assert_eq!(raw.attr_text("units"), Some("m s-1"));
        assert_eq!(raw.attr_number("_FillValue"), Some(-9999.0));
    }

    #[test]
    fn write_then_read_preserves_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("t2m_climatology.json");
        let mut grid = GridJsonFile {
            variable: "t2m".to_string(),
            dims: vec![RawDimension { name: "dayofyear".to_string(), len: 1 }],
            values: vec![Some(295.0)],
            ..Default::default()
        };
        grid.attrs.insert("units".to_string(), AttrValue::Text("K".to_string()));
        write_grid_json(&path, &grid).unwrap();

        let raw = read_grid_json(&path).unwrap();
        assert_eq!(raw.variable, "t2m");
        assert_eq!(raw.dims[0].name, "dayofyear");
        assert_eq!(raw.values, vec![295.0]);
    }
}

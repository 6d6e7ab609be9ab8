//! NetCDF reader (enabled with the `netcdf` feature).
//!
//! Reads one data variable, its dimension list, its attributes, the global
//! attributes and its coordinates: the coordinate variable of every
//! dimension, the variables named in its `coordinates` attribute, scalar
//! forecast coordinates and site latitude/longitude. String coordinates
//! (basin or site ids) become labels. Packing (`scale_factor`/`add_offset`) and fill values are left
//! to the loader so both formats go through the same path.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use netcdf::AttributeValue;

use crate::error::{PipelineError, PipelineResult};
use crate::io::raw::{AttrValue, RawCoord, RawDataset, RawDimension};

pub fn read_netcdf(path: &Path, variable: &str) -> PipelineResult<RawDataset> {
    let name = path.display().to_string();
    let file = netcdf::open(path)
        .map_err(|e| PipelineError::schema(&name, format!("cannot open NetCDF file: {e}")))?;

    let var = file.variable(variable).ok_or_else(|| {
        PipelineError::schema(&name, format!("variable `{variable}` not found"))
    })?;

    let dims: Vec<RawDimension> = var
        .dimensions()
        .iter()
        .map(|d| RawDimension {
            name: d.name(),
            len: d.len(),
        })
        .collect();

    let values: Vec<f64> = var
        .get_values::<f64, _>(..)
        .map_err(|e| PipelineError::schema(&name, format!("cannot read `{variable}`: {e}")))?;

    let attrs = collect_attrs(var.attributes());

    let mut coord_names: BTreeSet<String> = dims.iter().map(|d| d.name.clone()).collect();
    if let Some(AttrValue::Text(listed)) = attrs.get("coordinates") {
        coord_names.extend(listed.split_whitespace().map(str::to_string));
    }
    coord_names.extend(
        [
            "forecast_reference_time",
            "step",
            "valid_time",
            "time",
            "latitude",
            "longitude",
            "lat",
            "lon",
        ]
        .iter()
        .map(|n| n.to_string()),
    );

    let mut coords = BTreeMap::new();
    for coord_name in coord_names {
        if coord_name == variable {
            continue;
        }
        let Some(coord_var) = file.variable(&coord_name) else {
            continue;
        };
        if let Some(coord) = read_coord(&coord_var) {
            coords.insert(coord_name, coord);
        }
    }

    Ok(RawDataset {
        variable: variable.to_string(),
        dims,
        values,
        attrs,
        coords,
        global_attrs: collect_attrs(file.attributes()),
    })
}

/// Numeric values when the variable reads as numbers, otherwise string labels
/// for scalar and one-dimensional variables.
fn read_coord(var: &netcdf::Variable<'_>) -> Option<RawCoord> {
    let units = var
        .attribute("units")
        .and_then(|a| a.value().ok())
        .and_then(|v| match v {
            AttributeValue::Str(s) => Some(s),
            _ => None,
        });
    if let Ok(values) = var.get_values::<f64, _>(..) {
        return Some(RawCoord {
            values: Some(values),
            labels: None,
            units,
        });
    }

    let labels = match var.dimensions() {
        [] => vec![var.get_string(..).ok()?],
        [d] => (0..d.len())
            .map(|i| var.get_string([i]))
            .collect::<Result<Vec<_>, _>>()
            .ok()?,
        _ => return None,
    };
    Some(RawCoord {
        values: None,
        labels: Some(labels.into_iter().map(|l| l.trim().to_string()).collect()),
        units,
    })
}

fn collect_attrs<'a>(attrs: impl Iterator<Item = netcdf::Attribute<'a>>) -> BTreeMap<String, AttrValue> {
    attrs
        .filter_map(|a| {
            let value = convert_attr(a.value().ok()?)?;
            Some((a.name().to_string(), value))
        })
        .collect()
}

fn convert_attr(value: AttributeValue) -> Option<AttrValue> {
    let v = match value {
        AttributeValue::Str(s) => return Some(AttrValue::Text(s)),
        AttributeValue::Double(v) => v,
        AttributeValue::Float(v) => f64::from(v),
        AttributeValue::Int(v) => f64::from(v),
        AttributeValue::Short(v) => f64::from(v),
        AttributeValue::Uint(v) => f64::from(v),
        AttributeValue::Longlong(v) => v as f64,
        _ => return None,
    };
    Some(AttrValue::Number(v))
}

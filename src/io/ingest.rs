//! Dataset loader: gridded files → normalized in-memory fields.
//!
//! This module turns one source file into a `GriddedField`, `ForecastRun` or
//! `ClimatologyProfile` that downstream stages can trust.
//!
//! Design goals:
//! - **Strict schema**: dimensions, coordinates and units must agree with the
//!   data or the load fails with `SchemaMismatch`
//! - **Self-consistent forecasts**: the filename triple must match in-file
//!   metadata or the load fails with `NamingMismatch`
//! - **Read-only**: input files are never modified
//! - **Separation of concerns**: no resampling or fallback logic here

use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use nalgebra::DMatrix;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::domain::{
    CalendarIndex, ClimatologyProfile, FieldData, ForecastRun, GriddedField, LoadedSource, Site,
    SourceDescriptor, SourceKind, SpatialGrid, Unit,
};
use crate::error::{PipelineError, PipelineResult};
use crate::io::cf_time::{CfTimeUnits, duration_unit_seconds, parse_timestamp};
use crate::io::grid_json::read_grid_json;
use crate::io::layout::ForecastName;
use crate::io::raw::{RawCoord, RawDataset};

/// Role a named dimension plays in a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DimRole {
    Time,
    Step,
    DayOfYear,
    Hour,
    Lat,
    Lon,
    Site,
    Basin,
}

impl DimRole {
    fn of(name: &str) -> Option<DimRole> {
        let role = match name.to_ascii_lowercase().as_str() {
            "time" | "valid_time" => DimRole::Time,
            "step" => DimRole::Step,
            "dayofyear" | "doy" => DimRole::DayOfYear,
            "hour" => DimRole::Hour,
            "latitude" | "lat" => DimRole::Lat,
            "longitude" | "lon" => DimRole::Lon,
            "cell" | "site" | "station" => DimRole::Site,
            "basin" => DimRole::Basin,
            _ => return None,
        };
        Some(role)
    }

    fn is_spatial(self) -> bool {
        matches!(
            self,
            DimRole::Lat | DimRole::Lon | DimRole::Site | DimRole::Basin
        )
    }
}

#[derive(Debug, Clone)]
struct Dim {
    name: String,
    len: usize,
    role: DimRole,
}

/// Load every descriptor concurrently.
///
/// Each descriptor keeps its own result: one unreadable file does not affect
/// the others.
pub fn load_sources(
    descriptors: &[SourceDescriptor],
) -> Vec<(SourceDescriptor, PipelineResult<LoadedSource>)> {
    let results: Vec<(SourceDescriptor, PipelineResult<LoadedSource>)> = descriptors
        .par_iter()
        .map(|d| (d.clone(), load_source(d)))
        .collect();

    let failed = results.iter().filter(|(_, r)| r.is_err()).count();
    info!(
        sources = results.len(),
        failed, "finished loading source files"
    );
    for (d, r) in &results {
        if let Err(e) = r {
            warn!(file = %d.path.display(), kind = e.kind(), "source failed to load: {e}");
        }
    }
    results
}

/// Load and validate one source file.
pub fn load_source(desc: &SourceDescriptor) -> PipelineResult<LoadedSource> {
    let name = desc.display_name();

    // The filename triple is checked before the file is opened so that a
    // misnamed file is reported as such even if it is also unreadable.
    let forecast_name = match desc.kind {
        SourceKind::Forecast => {
            let stem = desc
                .path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let parsed = ForecastName::parse(&stem).map_err(|e| PipelineError::naming(&name, e))?;
            if parsed.variable != desc.variable {
                return Err(PipelineError::naming(
                    &name,
                    format!(
                        "filename variable `{}` differs from requested `{}`",
                        parsed.variable, desc.variable
                    ),
                ));
            }
            Some(parsed)
        }
        _ => None,
    };

    let raw = read_raw(&desc.path, &desc.variable)?;
    if raw.variable != desc.variable {
        let detail = format!(
            "file holds variable `{}`, expected `{}`",
            raw.variable, desc.variable
        );
        return Err(match desc.kind {
            SourceKind::Forecast => PipelineError::naming(&name, detail),
            _ => PipelineError::schema(&name, detail),
        });
    }

    let unit = resolve_unit(&raw, &name)?;
    let dims = classify_dims(&raw, desc.kind, &name)?;
    check_coord_lengths(&raw, &dims, &name)?;
    let values = unpack_values(&raw, &dims, &name)?;
    let grid = build_grid(&raw, &dims, &name)?;
    let frames = split_frames(&values, &grid);

    let data = FieldData {
        variable: raw.variable.clone(),
        unit,
        grid,
        frames,
    };

    let loaded = match desc.kind {
        SourceKind::Reanalysis => {
            let times = read_time_axis(&raw, &dims, &name)?;
            ensure_strictly_increasing(&times, &name)?;
            LoadedSource::Reanalysis(GriddedField { data, times })
        }
        SourceKind::Forecast => {
            let expected = forecast_name.ok_or_else(|| {
                PipelineError::naming(&name, "forecast filename could not be parsed")
            })?;
            let (issuance, step_hours) = forecast_metadata(&raw, &dims, &expected, &name)?;
            let run = ForecastRun::new(data, issuance, step_hours).ok_or_else(|| {
                PipelineError::naming(
                    &name,
                    format!("issuance {issuance} + step {step_hours}h is out of range"),
                )
            })?;
            LoadedSource::Forecast(run)
        }
        SourceKind::Climatology => {
            let calendar = read_calendar(&raw, &dims, &name)?;
            LoadedSource::Climatology(ClimatologyProfile { data, calendar })
        }
    };

    debug!(
        file = %desc.path.display(),
        variable = %desc.variable,
        kind = ?desc.kind,
        unit = %unit,
        cells = loaded.data().grid.cell_count(),
        frames = loaded.data().frames.len(),
        "loaded source"
    );
    Ok(loaded)
}

/// Read the raw variable with the reader matching the file extension.
pub fn read_raw(path: &Path, variable: &str) -> PipelineResult<RawDataset> {
    let name = path.display().to_string();
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    match ext.as_str() {
        "json" => read_grid_json(path),
        "nc" => read_netcdf(path, variable),
        other => Err(PipelineError::schema(
            name,
            format!("unsupported file extension `{other}`"),
        )),
    }
}

#[cfg(feature = "netcdf")]
fn read_netcdf(path: &Path, variable: &str) -> PipelineResult<RawDataset> {
    crate::io::netcdf_reader::read_netcdf(path, variable)
}

#[cfg(not(feature = "netcdf"))]
fn read_netcdf(path: &Path, _variable: &str) -> PipelineResult<RawDataset> {
    Err(PipelineError::schema(
        path.display().to_string(),
        "NetCDF input requires building with the `netcdf` feature",
    ))
}

fn resolve_unit(raw: &RawDataset, name: &str) -> PipelineResult<Unit> {
    let declared = raw
        .attr_text("units")
        .or_else(|| raw.attr_text("unit"))
        .ok_or_else(|| PipelineError::schema(name, "missing `units` attribute"))?;
    Unit::parse(declared)
        .ok_or_else(|| PipelineError::schema(name, format!("unrecognized unit `{declared}`")))
}

fn classify_dims(raw: &RawDataset, kind: SourceKind, name: &str) -> PipelineResult<Vec<Dim>> {
    let mut dims = Vec::with_capacity(raw.dims.len());
    for d in &raw.dims {
        let role = DimRole::of(&d.name)
            .ok_or_else(|| PipelineError::schema(name, format!("unknown dimension `{}`", d.name)))?;
        dims.push(Dim {
            name: d.name.clone(),
            len: d.len,
            role,
        });
    }

    let spatial_start = dims
        .iter()
        .position(|d| d.role.is_spatial())
        .ok_or_else(|| PipelineError::schema(name, "no spatial dimension"))?;
    let spatial: Vec<DimRole> = dims[spatial_start..].iter().map(|d| d.role).collect();
    let leading: Vec<DimRole> = dims[..spatial_start].iter().map(|d| d.role).collect();

    let spatial_ok = matches!(
        spatial.as_slice(),
        [DimRole::Lat, DimRole::Lon] | [DimRole::Site] | [DimRole::Basin]
    );
    if !spatial_ok {
        return Err(PipelineError::schema(
            name,
            format!(
                "spatial dimensions must be (latitude, longitude), (site) or (basin) and come last; got {:?}",
                dims.iter().map(|d| d.name.as_str()).collect::<Vec<_>>()
            ),
        ));
    }
    if dims.iter().any(|d| d.len == 0) {
        return Err(PipelineError::schema(name, "zero-length dimension"));
    }

    let leading_ok = match kind {
        SourceKind::Reanalysis => leading == [DimRole::Time],
        SourceKind::Forecast => {
            leading
                .iter()
                .all(|r| matches!(r, DimRole::Time | DimRole::Step))
                && dims[..spatial_start].iter().all(|d| d.len == 1)
        }
        SourceKind::Climatology => {
            leading == [DimRole::DayOfYear] || leading == [DimRole::DayOfYear, DimRole::Hour]
        }
    };
    if !leading_ok {
        let expected = match kind {
            SourceKind::Reanalysis => "(time, <spatial>)",
            SourceKind::Forecast => "optional length-1 time/step dimensions before <spatial>",
            SourceKind::Climatology => "(dayofyear[, hour], <spatial>)",
        };
        return Err(PipelineError::schema(
            name,
            format!("{kind:?} file must be laid out as {expected}"),
        ));
    }

    Ok(dims)
}

fn check_coord_lengths(raw: &RawDataset, dims: &[Dim], name: &str) -> PipelineResult<()> {
    for d in dims {
        if let Some(coord) = raw.coords.get(&d.name) {
            if let Some(len) = coord.len() {
                if len != d.len {
                    return Err(PipelineError::schema(
                        name,
                        format!(
                            "coordinate `{}` has {len} entries but the dimension declares {}",
                            d.name, d.len
                        ),
                    ));
                }
            }
        }
    }
    Ok(())
}

/// Validate the value count, then apply fill values and packing.
fn unpack_values(raw: &RawDataset, dims: &[Dim], name: &str) -> PipelineResult<Vec<f64>> {
    let declared: usize = dims.iter().map(|d| d.len).product();
    if declared != raw.values.len() {
        return Err(PipelineError::schema(
            name,
            format!(
                "dimensions declare {declared} values but the file holds {}",
                raw.values.len()
            ),
        ));
    }

    let fills: Vec<f64> = ["_FillValue", "missing_value"]
        .iter()
        .filter_map(|k| raw.attr_number(k))
        .collect();
    let scale = raw.attr_number("scale_factor").unwrap_or(1.0);
    let offset = raw.attr_number("add_offset").unwrap_or(0.0);

    Ok(raw
        .values
        .iter()
        .map(|&v| {
            if !v.is_finite() || fills.contains(&v) {
                f64::NAN
            } else {
                v * scale + offset
            }
        })
        .collect())
}

fn build_grid(raw: &RawDataset, dims: &[Dim], name: &str) -> PipelineResult<SpatialGrid> {
    let last = &dims[dims.len() - 1];
    match last.role {
        DimRole::Lon => {
            let lat_dim = &dims[dims.len() - 2];
            let lat = numeric_coord(raw, &lat_dim.name, name)?;
            let lon = numeric_coord(raw, &last.name, name)?;
            ensure_monotonic(&lat, &lat_dim.name, name)?;
            ensure_monotonic(&lon, &last.name, name)?;
            Ok(SpatialGrid::Regular { lat, lon })
        }
        DimRole::Site => {
            let lat = site_coord(raw, &["latitude", "lat"], last.len, name)?;
            let lon = site_coord(raw, &["longitude", "lon"], last.len, name)?;
            let ids = coord_ids(raw.coords.get(&last.name), last.len, "site");
            let cells = ids
                .into_iter()
                .zip(lat.into_iter().zip(lon))
                .map(|(id, (lat, lon))| Site { id, lat, lon })
                .collect();
            Ok(SpatialGrid::Points { cells })
        }
        DimRole::Basin => {
            let coord = raw.coords.get(&last.name).ok_or_else(|| {
                PipelineError::schema(name, format!("basin dimension `{}` has no id coordinate", last.name))
            })?;
            let ids = coord_ids(Some(coord), last.len, "basin");
            let unique: HashSet<&String> = ids.iter().collect();
            if unique.len() != ids.len() {
                return Err(PipelineError::schema(name, "duplicate basin ids"));
            }
            Ok(SpatialGrid::Basins { ids })
        }
        _ => Err(PipelineError::schema(name, "no spatial dimension")),
    }
}

fn numeric_coord(raw: &RawDataset, dim: &str, name: &str) -> PipelineResult<Vec<f64>> {
    raw.coords
        .get(dim)
        .and_then(|c| c.values.clone())
        .ok_or_else(|| PipelineError::schema(name, format!("missing numeric coordinate `{dim}`")))
}

fn site_coord(raw: &RawDataset, keys: &[&str], len: usize, name: &str) -> PipelineResult<Vec<f64>> {
    let values = keys
        .iter()
        .find_map(|k| raw.coords.get(*k).and_then(|c| c.values.clone()))
        .ok_or_else(|| {
            PipelineError::schema(name, format!("site grid needs a `{}` coordinate", keys[0]))
        })?;
    if values.len() != len {
        return Err(PipelineError::schema(
            name,
            format!("`{}` has {} entries for {len} sites", keys[0], values.len()),
        ));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(PipelineError::schema(name, format!("non-finite `{}` coordinate", keys[0])));
    }
    Ok(values)
}

fn coord_ids(coord: Option<&RawCoord>, len: usize, prefix: &str) -> Vec<String> {
    if let Some(labels) = coord.and_then(|c| c.labels.clone()) {
        return labels;
    }
    if let Some(values) = coord.and_then(|c| c.values.as_ref()) {
        return values
            .iter()
            .map(|v| {
                if v.fract() == 0.0 {
                    format!("{}", *v as i64)
                } else {
                    format!("{v}")
                }
            })
            .collect();
    }
    (0..len).map(|i| format!("{prefix}-{i}")).collect()
}

fn ensure_monotonic(axis: &[f64], dim: &str, name: &str) -> PipelineResult<()> {
    if axis.iter().any(|v| !v.is_finite()) {
        return Err(PipelineError::schema(name, format!("non-finite `{dim}` coordinate")));
    }
    let increasing = axis.windows(2).all(|w| w[1] > w[0]);
    let decreasing = axis.windows(2).all(|w| w[1] < w[0]);
    if !(increasing || decreasing) {
        return Err(PipelineError::schema(
            name,
            format!("`{dim}` coordinate is not strictly monotonic"),
        ));
    }
    Ok(())
}

fn split_frames(values: &[f64], grid: &SpatialGrid) -> Vec<DMatrix<f64>> {
    let (rows, cols) = grid.frame_shape();
    values
        .chunks(rows * cols)
        .map(|chunk| DMatrix::from_row_slice(rows, cols, chunk))
        .collect()
}

fn read_time_axis(raw: &RawDataset, dims: &[Dim], name: &str) -> PipelineResult<Vec<DateTime<Utc>>> {
    let dim = dims
        .iter()
        .find(|d| d.role == DimRole::Time)
        .ok_or_else(|| PipelineError::schema(name, "missing time dimension"))?;
    let coord = raw
        .coords
        .get(&dim.name)
        .ok_or_else(|| PipelineError::schema(name, format!("missing `{}` coordinate", dim.name)))?;
    decode_times(coord, &dim.name, name)
}

fn decode_times(coord: &RawCoord, dim: &str, name: &str) -> PipelineResult<Vec<DateTime<Utc>>> {
    if let Some(labels) = &coord.labels {
        return labels
            .iter()
            .map(|l| {
                parse_timestamp(l).ok_or_else(|| {
                    PipelineError::schema(name, format!("unparseable `{dim}` label `{l}`"))
                })
            })
            .collect();
    }

    let values = coord
        .values
        .as_ref()
        .ok_or_else(|| PipelineError::schema(name, format!("`{dim}` coordinate is empty")))?;
    let units_raw = coord
        .units
        .as_deref()
        .ok_or_else(|| PipelineError::schema(name, format!("`{dim}` coordinate has no units")))?;
    let units = CfTimeUnits::parse(units_raw).ok_or_else(|| {
        PipelineError::schema(name, format!("unrecognized time units `{units_raw}`"))
    })?;
    values
        .iter()
        .map(|&v| {
            units.to_datetime(v).ok_or_else(|| {
                PipelineError::schema(name, format!("`{dim}` offset {v} is out of range"))
            })
        })
        .collect()
}

fn ensure_strictly_increasing(times: &[DateTime<Utc>], name: &str) -> PipelineResult<()> {
    if let Some(w) = times.windows(2).find(|w| w[1] <= w[0]) {
        return Err(PipelineError::schema(
            name,
            format!(
                "timestamps must be strictly increasing ({} followed by {})",
                w[0], w[1]
            ),
        ));
    }
    Ok(())
}

/// Reconcile the filename triple with in-file issuance, step and valid time.
///
/// Each field is read from a global attribute first, then from a coordinate
/// variable of the same name (scalar coordinates count).
fn forecast_metadata(
    raw: &RawDataset,
    dims: &[Dim],
    expected: &ForecastName,
    name: &str,
) -> PipelineResult<(DateTime<Utc>, u32)> {
    let issuance_attr = ["forecast_reference_time", "issuance_time", "issuance"]
        .iter()
        .find_map(|k| raw.global(k).and_then(|v| v.as_text()).and_then(parse_timestamp));
    let issuance = match issuance_attr {
        Some(t) => t,
        None => scalar_time_coord(raw, dims, &["forecast_reference_time", "issuance_time"], name)?
            .ok_or_else(|| {
                PipelineError::schema(
                    name,
                    "missing `forecast_reference_time` global attribute or coordinate",
                )
            })?,
    };
    if issuance != expected.issuance {
        return Err(PipelineError::naming(
            name,
            format!(
                "filename issuance {} differs from in-file {}",
                expected.issuance, issuance
            ),
        ));
    }
    let implied = expected
        .issuance
        .checked_add_signed(Duration::hours(i64::from(expected.step_hours)))
        .ok_or_else(|| {
            PipelineError::naming(
                name,
                format!(
                    "filename step {}h puts the valid time out of range",
                    expected.step_hours
                ),
            )
        })?;

    let step_from_attr = ["step", "step_hours"]
        .iter()
        .find_map(|k| raw.global(k).and_then(|v| v.as_number()));
    let step_key = dims
        .iter()
        .find(|d| d.role == DimRole::Step)
        .map_or("step", |d| d.name.as_str());
    let step_from_coord = raw.coords.get(step_key).and_then(|c| {
        let v = c.values.as_ref()?.first().copied()?;
        let unit_seconds = match c.units.as_deref() {
            Some(u) => duration_unit_seconds(u)?,
            None => 3600,
        };
        Some(v * unit_seconds as f64 / 3600.0)
    });
    let valid_time = match dims.iter().find(|d| d.role == DimRole::Time) {
        Some(d) => match raw.coords.get(&d.name) {
            Some(coord) => decode_times(coord, &d.name, name)?.first().copied(),
            None => None,
        },
        None => scalar_time_coord(raw, dims, &["valid_time", "time"], name)?,
    };

    let in_file_step = step_from_attr.or(step_from_coord).or_else(|| {
        valid_time.map(|v| (v - issuance).num_seconds() as f64 / 3600.0)
    });
    let Some(in_file_step) = in_file_step else {
        return Err(PipelineError::schema(
            name,
            "forecast file declares neither a step nor a valid time",
        ));
    };
    if (in_file_step - f64::from(expected.step_hours)).abs() > 1e-9 {
        return Err(PipelineError::naming(
            name,
            format!(
                "filename step {}h differs from in-file step {in_file_step}h",
                expected.step_hours
            ),
        ));
    }

    if let Some(valid) = valid_time {
        if valid != implied {
            return Err(PipelineError::naming(
                name,
                format!("in-file valid time {valid} differs from issuance + step ({implied})"),
            ));
        }
    }

    Ok((issuance, expected.step_hours))
}

/// First entry of a time coordinate that is not a dimension of the data.
fn scalar_time_coord(
    raw: &RawDataset,
    dims: &[Dim],
    keys: &[&str],
    name: &str,
) -> PipelineResult<Option<DateTime<Utc>>> {
    for key in keys {
        if dims.iter().any(|d| d.name == *key) {
            continue;
        }
        if let Some(coord) = raw.coords.get(*key) {
            return Ok(decode_times(coord, key, name)?.first().copied());
        }
    }
    Ok(None)
}

fn read_calendar(raw: &RawDataset, dims: &[Dim], name: &str) -> PipelineResult<Vec<CalendarIndex>> {
    let doy_dim = dims
        .iter()
        .find(|d| d.role == DimRole::DayOfYear)
        .ok_or_else(|| PipelineError::schema(name, "missing dayofyear dimension"))?;
    let days = integer_coord(raw, &doy_dim.name, 1, 366, name)?;

    let hours = match dims.iter().find(|d| d.role == DimRole::Hour) {
        Some(h) => Some(integer_coord(raw, &h.name, 0, 23, name)?),
        None => None,
    };

    let mut calendar = Vec::new();
    for &day in &days {
        match &hours {
            Some(hours) => calendar.extend(hours.iter().map(|&h| CalendarIndex {
                day_of_year: day,
                hour: Some(h),
            })),
            None => calendar.push(CalendarIndex {
                day_of_year: day,
                hour: None,
            }),
        }
    }

    let unique: HashSet<&CalendarIndex> = calendar.iter().collect();
    if unique.len() != calendar.len() {
        return Err(PipelineError::schema(
            name,
            "climatology has more than one entry for the same calendar index",
        ));
    }
    Ok(calendar)
}

fn integer_coord(raw: &RawDataset, dim: &str, min: u32, max: u32, name: &str) -> PipelineResult<Vec<u32>> {
    let values = numeric_coord(raw, dim, name)?;
    values
        .iter()
        .map(|&v| {
            if v.fract() == 0.0 && v >= f64::from(min) && v <= f64::from(max) {
                Ok(v as u32)
            } else {
                Err(PipelineError::schema(
                    name,
                    format!("`{dim}` value {v} is outside {min}..={max}"),
                ))
            }
        })
        .collect()
}

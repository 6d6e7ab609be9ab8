//! Spatial resampling of source grids onto a target grid.
//!
//! For every `(source grid, target grid)` pair we build one [`CellSampler`]
//! per target cell up front; sampling a frame is then a lookup plus at most
//! four multiply-adds.

use tracing::debug;

use crate::domain::{FieldData, SpatialGrid, SpatialMethod, degree_distance};
use crate::error::{PipelineError, PipelineResult};

/// How one target cell reads a value out of a source frame.
#[derive(Debug, Clone, PartialEq)]
pub enum CellSampler {
    /// The source has no value for this cell (outside extent or unmatched id).
    Missing,
    /// Copy one source cell.
    Node(usize),
    /// Weighted sum of source cells; every contributing cell must be finite.
    Weighted(Vec<(usize, f64)>),
}

impl CellSampler {
    pub fn sample(&self, data: &FieldData, frame: usize) -> Option<f64> {
        match self {
            CellSampler::Missing => None,
            CellSampler::Node(i) => data.value(frame, *i),
            CellSampler::Weighted(corners) => {
                let mut acc = 0.0;
                for &(i, w) in corners {
                    acc += w * data.value(frame, i)?;
                }
                Some(acc)
            }
        }
    }
}

/// Build one sampler per target cell.
///
/// `source_name` is only used in error messages.
pub fn build_samplers(
    source: &SpatialGrid,
    target: &SpatialGrid,
    method: SpatialMethod,
    radius_deg: f64,
    source_name: &str,
) -> PipelineResult<Vec<CellSampler>> {
    if source == target {
        return Ok((0..target.cell_count()).map(CellSampler::Node).collect());
    }

    match (source, target) {
        (SpatialGrid::Basins { ids: src }, SpatialGrid::Basins { ids: dst }) => Ok(dst
            .iter()
            .map(|id| match src.iter().position(|s| s == id) {
                Some(i) => CellSampler::Node(i),
                None => CellSampler::Missing,
            })
            .collect()),
        (SpatialGrid::Basins { .. }, _) | (_, SpatialGrid::Basins { .. }) => {
            Err(PipelineError::schema(
                source_name,
                format!(
                    "cannot resample a {} grid onto a {} grid",
                    source.kind_name(),
                    target.kind_name()
                ),
            ))
        }
        (SpatialGrid::Regular { lat, lon }, _) => Ok(target
            .cells()
            .iter()
            .map(|c| {
                let (Some(tlat), Some(tlon)) = (c.lat, c.lon) else {
                    return CellSampler::Missing;
                };
                regular_sampler(lat, lon, tlat, tlon, method, radius_deg)
            })
            .collect()),
        (SpatialGrid::Points { cells }, _) => {
            if method == SpatialMethod::Bilinear {
                debug!(
                    source = source_name,
                    "bilinear is undefined for scattered sites; using nearest"
                );
            }
            Ok(target
                .cells()
                .iter()
                .map(|c| {
                    let (Some(tlat), Some(tlon)) = (c.lat, c.lon) else {
                        return CellSampler::Missing;
                    };
                    nearest_site(cells.iter().map(|s| (s.lat, s.lon)), tlat, tlon, radius_deg)
                })
                .collect())
        }
    }
}

fn regular_sampler(
    lat: &[f64],
    lon: &[f64],
    tlat: f64,
    tlon: f64,
    method: SpatialMethod,
    radius_deg: f64,
) -> CellSampler {
    let Some((i0, i1, ti)) = locate(lat, tlat, radius_deg) else {
        return CellSampler::Missing;
    };
    let Some((j0, j1, tj)) = locate_lon(lon, tlon, radius_deg) else {
        return CellSampler::Missing;
    };
    let nlon = lon.len();

    match method {
        SpatialMethod::Nearest => {
            // Ties go to the lower index.
            let i = if ti <= 0.5 { i0 } else { i1 };
            let j = if tj <= 0.5 { j0 } else { j1 };
            if degree_distance(tlat, tlon, lat[i], lon[j]) > radius_deg {
                return CellSampler::Missing;
            }
            CellSampler::Node(i * nlon + j)
        }
        SpatialMethod::Bilinear => {
            let corners: Vec<(usize, f64)> = [
                (i0, j0, (1.0 - ti) * (1.0 - tj)),
                (i0, j1, (1.0 - ti) * tj),
                (i1, j0, ti * (1.0 - tj)),
                (i1, j1, ti * tj),
            ]
            .into_iter()
            .filter(|&(_, _, w)| w > 0.0)
            .map(|(i, j, w)| (i * nlon + j, w))
            .collect();
            match corners.as_slice() {
                [(node, _)] => CellSampler::Node(*node),
                _ => CellSampler::Weighted(corners),
            }
        }
    }
}

/// Bracket `x` on a strictly monotonic axis: `(k, k + 1, t)` with
/// `x = axis[k] + t * (axis[k + 1] - axis[k])`.
///
/// Targets within `radius` outside the extent are clamped to the edge.
fn locate(axis: &[f64], x: f64, radius: f64) -> Option<(usize, usize, f64)> {
    let n = axis.len();
    let first = *axis.first()?;
    let last = axis[n - 1];
    let (lo, hi) = (first.min(last), first.max(last));
    if x < lo - radius || x > hi + radius {
        return None;
    }
    let x = x.clamp(lo, hi);
    if n == 1 {
        return Some((0, 0, 0.0));
    }
    for k in 0..n - 1 {
        let (a, b) = (axis[k], axis[k + 1]);
        if (x - a) * (x - b) <= 0.0 {
            return Some((k, k + 1, (x - a) / (b - a)));
        }
    }
    None
}

/// [`locate`] for a longitude axis. On a global axis (the gap between the
/// last and first column is about one grid spacing) a target inside that gap
/// is bracketed by those two columns.
fn locate_lon(axis: &[f64], x: f64, radius: f64) -> Option<(usize, usize, f64)> {
    let x = unwrap_lon(axis, x);
    let n = axis.len();
    if n >= 2 {
        let (first, last) = (axis[0], axis[n - 1]);
        let (lo, hi) = (first.min(last), first.max(last));
        let gap = lo + 360.0 - hi;
        let spacing = (hi - lo) / (n - 1) as f64;
        if gap > 0.0 && gap <= spacing * 1.5 + 1e-9 {
            let offset = if x > hi {
                Some(x - hi)
            } else if x < lo {
                Some(x + 360.0 - hi)
            } else {
                None
            };
            if let Some(offset) = offset {
                let (k_hi, k_lo) = if first <= last { (n - 1, 0) } else { (0, n - 1) };
                return Some((k_hi, k_lo, (offset / gap).clamp(0.0, 1.0)));
            }
        }
    }
    locate(axis, x, radius)
}

/// Shift a longitude by a multiple of 360 so it falls into (or closest to)
/// the axis extent.
fn unwrap_lon(axis: &[f64], x: f64) -> f64 {
    let (Some(&first), Some(&last)) = (axis.first(), axis.last()) else {
        return x;
    };
    let (lo, hi) = (first.min(last), first.max(last));
    let outside = |v: f64| {
        if v < lo {
            lo - v
        } else if v > hi {
            v - hi
        } else {
            0.0
        }
    };
    [x, x - 360.0, x + 360.0]
        .into_iter()
        .min_by(|a, b| outside(*a).total_cmp(&outside(*b)))
        .unwrap_or(x)
}

/// Closest site within `radius_deg`; ties go to the lower index.
pub fn nearest_site(
    sites: impl Iterator<Item = (f64, f64)>,
    tlat: f64,
    tlon: f64,
    radius_deg: f64,
) -> CellSampler {
    let mut best: Option<(usize, f64)> = None;
    for (i, (lat, lon)) in sites.enumerate() {
        let d = degree_distance(tlat, tlon, lat, lon);
        if best.is_none_or(|(_, bd)| d < bd) {
            best = Some((i, d));
        }
    }
    match best {
        Some((i, d)) if d <= radius_deg => CellSampler::Node(i),
        _ => CellSampler::Missing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Site, Unit};
    use nalgebra::DMatrix;

    fn regular() -> SpatialGrid {
        SpatialGrid::Regular {
            lat: vec![1.0, 0.0],
            lon: vec![36.0, 37.0],
        }
    }

    fn field(grid: SpatialGrid, values: &[f64]) -> FieldData {
        let (r, c) = grid.frame_shape();
        FieldData {
            variable: "t2m".into(),
            unit: Unit::Kelvin,
            grid,
            frames: vec![DMatrix::from_row_slice(r, c, values)],
        }
    }

    fn point_target(lat: f64, lon: f64) -> SpatialGrid {
        SpatialGrid::Points {
            cells: vec![Site {
                id: "p".into(),
                lat,
                lon,
            }],
        }
    }

    #[test]
    fn bilinear_centre_is_mean_of_corners() {
        let data = field(regular(), &[10.0, 20.0, 30.0, 40.0]);
        let s = build_samplers(&regular(), &point_target(0.5, 36.5), SpatialMethod::Bilinear, 1.0, "x")
            .unwrap();
        let v = s[0].sample(&data, 0).unwrap();
        assert!((v - 25.0).abs() < 1e-12);
    }

    #[test]
    fn bilinear_on_node_needs_only_that_node() {
        let data = field(regular(), &[10.0, f64::NAN, f64::NAN, f64::NAN]);
        let s = build_samplers(&regular(), &point_target(1.0, 36.0), SpatialMethod::Bilinear, 1.0, "x")
            .unwrap();
        assert_eq!(s[0], CellSampler::Node(0));
        assert_eq!(s[0].sample(&data, 0), Some(10.0));
    }

    #[test]
    fn bilinear_with_missing_corner_is_missing() {
        let data = field(regular(), &[10.0, 20.0, f64::NAN, 40.0]);
        let s = build_samplers(&regular(), &point_target(0.5, 36.5), SpatialMethod::Bilinear, 1.0, "x")
            .unwrap();
        assert_eq!(s[0].sample(&data, 0), None);
    }

    #[test]
    fn nearest_ties_to_lower_index() {
        let s = build_samplers(&regular(), &point_target(0.5, 36.5), SpatialMethod::Nearest, 1.0, "x")
            .unwrap();
        assert_eq!(s[0], CellSampler::Node(0));
    }

    #[test]
    fn longitudes_wrap() {
        let source = SpatialGrid::Regular {
            lat: vec![0.0],
            lon: vec![-1.0, 0.0, 1.0],
        };
        let s = build_samplers(&source, &point_target(0.0, 359.0), SpatialMethod::Nearest, 0.5, "x")
            .unwrap();
        assert_eq!(s[0], CellSampler::Node(0));
    }

    #[test]
    fn bilinear_interpolates_across_the_dateline_seam() {
        // 0.25 degree global axis: 0.0, 0.25, ..., 359.75.
        let lon: Vec<f64> = (0..1440).map(|k| f64::from(k) * 0.25).collect();
        let source = SpatialGrid::Regular {
            lat: vec![0.0],
            lon,
        };
        let mut values = vec![0.0; 1440];
        values[0] = 10.0;
        values[1439] = 20.0;
        let data = field(source.clone(), &values);

        let s = build_samplers(&source, &point_target(0.0, -0.1), SpatialMethod::Bilinear, 1.0, "x")
            .unwrap();
        let CellSampler::Weighted(corners) = &s[0] else {
            panic!("expected a weighted sampler, got {:?}", s[0]);
        };
        assert_eq!(corners.len(), 2);
        // 0.1 from column 0 and 0.15 from column 1439.
        let v = s[0].sample(&data, 0).unwrap();
        assert!((v - (0.6 * 10.0 + 0.4 * 20.0)).abs() < 1e-9, "{v}");

        let s = build_samplers(&source, &point_target(0.0, 359.9), SpatialMethod::Nearest, 1.0, "x")
            .unwrap();
        assert_eq!(s[0], CellSampler::Node(0));
    }

    #[test]
    fn far_outside_extent_is_missing() {
        let s = build_samplers(&regular(), &point_target(5.0, 36.5), SpatialMethod::Bilinear, 1.0, "x")
            .unwrap();
        assert_eq!(s[0], CellSampler::Missing);
    }

    #[test]
    fn scattered_sites_use_nearest_within_radius() {
        let source = SpatialGrid::Points {
            cells: vec![
                Site { id: "a".into(), lat: 0.0, lon: 36.0 },
                Site { id: "b".into(), lat: 0.0, lon: 38.0 },
            ],
        };
        let s = build_samplers(&source, &point_target(0.1, 37.8), SpatialMethod::Bilinear, 0.5, "x")
            .unwrap();
        assert_eq!(s[0], CellSampler::Node(1));
        let s = build_samplers(&source, &point_target(0.0, 37.0), SpatialMethod::Nearest, 0.5, "x")
            .unwrap();
        assert_eq!(s[0], CellSampler::Missing);
    }

    #[test]
    fn basins_match_by_id_and_refuse_coordinates() {
        let source = SpatialGrid::Basins {
            ids: vec!["tana".into(), "nile".into()],
        };
        let target = SpatialGrid::Basins {
            ids: vec!["nile".into(), "omo".into()],
        };
        let s = build_samplers(&source, &target, SpatialMethod::Nearest, 1.0, "x").unwrap();
        assert_eq!(s, vec![CellSampler::Node(1), CellSampler::Missing]);

        let err = build_samplers(&source, &regular(), SpatialMethod::Nearest, 1.0, "x").unwrap_err();
        assert!(matches!(err, PipelineError::SchemaMismatch { .. }));
    }
}

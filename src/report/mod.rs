//! Result aggregation and reporting.
//!
//! `aggregate` reduces power estimates over a spatial selection and a time
//! window. Selected records are put in a canonical order before reducing, so
//! the result does not depend on the order estimates arrive in.

pub mod format;

use std::cmp::Ordering;

use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{
    AggregatedResult, GenerationType, Period, PowerEstimate, Reduction, SpatialSelection,
    TimeWindow,
};
use crate::error::{PipelineError, PipelineResult};

pub use format::*;

pub const POWER_UNIT: &str = "MW";

/// What to reduce and how.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationQuery {
    pub selection: SpatialSelection,
    pub window: TimeWindow,
    pub reduction: Reduction,
    pub generation: Option<GenerationType>,
}

/// Reduce the estimates matching `query` to one value.
///
/// Fails with `EmptySelection` when nothing matches.
pub fn aggregate(estimates: &[PowerEstimate], query: &AggregationQuery) -> PipelineResult<AggregatedResult> {
    let mut selected: Vec<&PowerEstimate> = estimates.iter().filter(|e| selects(e, query)).collect();
    if selected.is_empty() {
        return Err(PipelineError::EmptySelection {
            detail: describe(query),
        });
    }
    selected.sort_by(|a, b| canonical_order(a, b));

    let value = reduce(selected.iter().map(|e| e.power_mw), query.reduction);
    debug!(
        region = query.selection.region_id(),
        records = selected.len(),
        value,
        "aggregated"
    );
    Ok(AggregatedResult {
        region_id: query.selection.region_id().to_string(),
        window: query.window,
        reduction: query.reduction,
        generation: query.generation,
        value,
        unit: POWER_UNIT.to_string(),
        record_count: selected.len(),
    })
}

/// Split the query window into calendar periods and reduce each non-empty one.
///
/// Periods are aligned to UTC hour/day boundaries and clipped to the window.
/// Fails with `EmptySelection` only when no period has any record.
pub fn aggregate_by_period(
    estimates: &[PowerEstimate],
    query: &AggregationQuery,
    period: Period,
) -> PipelineResult<Vec<AggregatedResult>> {
    let windows = split_window(query.window, period);
    let mut out = Vec::with_capacity(windows.len());
    for window in windows {
        let sub = AggregationQuery {
            window,
            ..query.clone()
        };
        match aggregate(estimates, &sub) {
            Ok(result) => out.push(result),
            Err(PipelineError::EmptySelection { .. }) => {}
            Err(e) => return Err(e),
        }
    }
    if out.is_empty() {
        return Err(PipelineError::EmptySelection {
            detail: describe(query),
        });
    }
    Ok(out)
}

fn selects(e: &PowerEstimate, query: &AggregationQuery) -> bool {
    if !query.window.contains(e.timestamp) {
        return false;
    }
    if query.generation.is_some_and(|g| g != e.generation) {
        return false;
    }
    match &query.selection {
        SpatialSelection::All => true,
        SpatialSelection::Cells { ids, .. } => ids.iter().any(|id| *id == e.cell.id),
        SpatialSelection::BoundingBox {
            lat_min,
            lat_max,
            lon_min,
            lon_max,
            ..
        } => match (e.cell.lat, e.cell.lon) {
            (Some(lat), Some(lon)) => {
                let lon_ok = if lon_min <= lon_max {
                    lon >= *lon_min && lon <= *lon_max
                } else {
                    // Box crossing the antimeridian.
                    lon >= *lon_min || lon <= *lon_max
                };
                lat >= *lat_min && lat <= *lat_max && lon_ok
            }
            _ => false,
        },
    }
}

fn canonical_order(a: &PowerEstimate, b: &PowerEstimate) -> Ordering {
    a.timestamp
        .cmp(&b.timestamp)
        .then(a.cell.index.cmp(&b.cell.index))
        .then(a.cell.id.cmp(&b.cell.id))
        .then(a.generation.cmp(&b.generation))
        .then(a.power_mw.total_cmp(&b.power_mw))
}

fn reduce(values: impl Iterator<Item = f64>, reduction: Reduction) -> f64 {
    let mut count = 0usize;
    let mut sum = 0.0;
    let mut max = f64::NEG_INFINITY;
    for v in values {
        count += 1;
        sum += v;
        max = max.max(v);
    }
    match reduction {
        Reduction::Sum => sum,
        Reduction::Mean => sum / count as f64,
        Reduction::Max => max,
    }
}

fn split_window(window: TimeWindow, period: Period) -> Vec<TimeWindow> {
    let step = match period {
        Period::Total => return vec![window],
        Period::Hourly => Duration::hours(1),
        Period::Daily => Duration::days(1),
    };
    let mut start: DateTime<Utc> = window.start.duration_trunc(step).unwrap_or(window.start);
    let mut out = Vec::new();
    while start < window.end {
        let end = start + step;
        out.push(TimeWindow {
            start: start.max(window.start),
            end: end.min(window.end),
        });
        start = end;
    }
    out
}

fn describe(query: &AggregationQuery) -> String {
    let generation = query
        .generation
        .map(|g| format!(" ({})", g.display_name()))
        .unwrap_or_default();
    format!(
        "region `{}`{generation} in [{}, {})",
        query.selection.region_id(),
        query.window.start.to_rfc3339(),
        query.window.end.to_rfc3339()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CellRef;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, day, hour, 0, 0).unwrap()
    }

    fn est(index: usize, lat: f64, lon: f64, t: DateTime<Utc>, p: f64) -> PowerEstimate {
        PowerEstimate {
            cell: CellRef {
                index,
                id: format!("c{index}"),
                lat: Some(lat),
                lon: Some(lon),
            },
            timestamp: t,
            generation: GenerationType::Solar,
            power_mw: p,
            model_version: "solar-pv-derate/1".into(),
        }
    }

    fn query(selection: SpatialSelection, reduction: Reduction) -> AggregationQuery {
        AggregationQuery {
            selection,
            window: TimeWindow { start: at(1, 0), end: at(3, 0) },
            reduction,
            generation: None,
        }
    }

    fn sample() -> Vec<PowerEstimate> {
        vec![
            est(0, 0.0, 36.0, at(1, 6), 1.0),
            est(1, 0.0, 37.0, at(1, 6), 3.0),
            est(0, 0.0, 36.0, at(2, 6), 5.0),
            est(1, 0.0, 37.0, at(2, 6), 7.0),
            est(1, 0.0, 37.0, at(3, 0), 100.0),
        ]
    }

    #[test]
    fn reductions_over_half_open_window() {
        let e = sample();
        let sum = aggregate(&e, &query(SpatialSelection::All, Reduction::Sum)).unwrap();
        assert_eq!(sum.value, 16.0);
        assert_eq!(sum.record_count, 4);
        assert_eq!(sum.unit, "MW");
        let mean = aggregate(&e, &query(SpatialSelection::All, Reduction::Mean)).unwrap();
        assert_eq!(mean.value, 4.0);
        let max = aggregate(&e, &query(SpatialSelection::All, Reduction::Max)).unwrap();
        assert_eq!(max.value, 7.0);
    }

    #[test]
    fn cells_and_bounding_box_selections() {
        let e = sample();
        let cells = SpatialSelection::Cells {
            region_id: "west".into(),
            ids: vec!["c0".into()],
        };
        let r = aggregate(&e, &query(cells, Reduction::Sum)).unwrap();
        assert_eq!((r.region_id.as_str(), r.value), ("west", 6.0));

        let bbox = SpatialSelection::BoundingBox {
            region_id: "east".into(),
            lat_min: -1.0,
            lat_max: 1.0,
            lon_min: 36.5,
            lon_max: 38.0,
        };
        let r = aggregate(&e, &query(bbox, Reduction::Sum)).unwrap();
        assert_eq!(r.value, 10.0);
    }

    #[test]
    fn empty_selection_is_an_error() {
        let mut q = query(SpatialSelection::All, Reduction::Mean);
        q.generation = Some(GenerationType::Wind);
        let err = aggregate(&sample(), &q).unwrap_err();
        assert!(matches!(err, PipelineError::EmptySelection { .. }));
    }

    #[test]
    fn daily_periods() {
        let out = aggregate_by_period(
            &sample(),
            &query(SpatialSelection::All, Reduction::Mean),
            Period::Daily,
        )
        .unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].value, 2.0);
        assert_eq!(out[1].value, 6.0);
        assert_eq!(out[1].window.start, at(2, 0));
        assert_eq!(out[1].window.end, at(3, 0));
    }

    fn permuted_estimates() -> impl Strategy<Value = (Vec<PowerEstimate>, Vec<PowerEstimate>)> {
        prop::collection::vec(-1.0e6f64..1.0e6, 1..60).prop_flat_map(|values| {
            let estimates: Vec<PowerEstimate> = values
                .iter()
                .enumerate()
                .map(|(i, &v)| est(i % 7, 0.0, 36.0, at(1 + (i % 2) as u32, (i % 24) as u32), v))
                .collect();
            (Just(estimates.clone()), Just(estimates).prop_shuffle())
        })
    }

    proptest! {
        #[test]
        fn reduction_is_order_independent((estimates, shuffled) in permuted_estimates()) {
            for reduction in [Reduction::Sum, Reduction::Mean, Reduction::Max] {
                let q = query(SpatialSelection::All, reduction);
                let a = aggregate(&estimates, &q).unwrap();
                let b = aggregate(&shuffled, &q).unwrap();
                prop_assert_eq!(a.value.to_bits(), b.value.to_bits());
                prop_assert_eq!(a.record_count, b.record_count);
            }
        }
    }
}

//! Temporal resolution: which source frame supplies a target timestamp.
//!
//! Priority per `(variable, cell, timestamp)`:
//!
//! 1. forecast run valid at the timestamp, smallest step first
//! 2. reanalysis sample nearest the timestamp within the gap limit
//! 3. climatology entry for the timestamp's calendar index

use chrono::{DateTime, Duration, Utc};

use crate::align::spatial::CellSampler;
use crate::domain::{
    AlignedValue, CalendarIndex, ClimatologyProfile, ForecastRun, GriddedField, Provenance,
};

/// A forecast run with its samplers onto the target grid.
#[derive(Debug)]
pub struct ForecastTier<'a> {
    pub run: &'a ForecastRun,
    pub samplers: Vec<CellSampler>,
}

#[derive(Debug)]
pub struct ReanalysisTier<'a> {
    pub field: &'a GriddedField,
    pub samplers: Vec<CellSampler>,
}

#[derive(Debug)]
pub struct ClimatologyTier<'a> {
    pub profile: &'a ClimatologyProfile,
    pub samplers: Vec<CellSampler>,
}

/// Every tier available for one variable.
#[derive(Debug, Default)]
pub struct VariableTiers<'a> {
    pub forecasts: Vec<ForecastTier<'a>>,
    pub reanalysis: Option<ReanalysisTier<'a>>,
    pub climatology: Option<ClimatologyTier<'a>>,
}

/// Candidate frames for one target timestamp, in the order they are tried.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimeCandidates {
    /// Indices into `VariableTiers::forecasts`, smallest step first.
    pub forecasts: Vec<usize>,
    /// Reanalysis frames, nearest first, earlier first on ties.
    pub reanalysis: Vec<usize>,
    pub climatology: Option<usize>,
}

impl VariableTiers<'_> {
    /// Work out the candidate frames for `t` once; they are shared by all cells.
    pub fn candidates(
        &self,
        t: DateTime<Utc>,
        max_lead_gap_hours: u32,
        max_reanalysis_gap_hours: u32,
    ) -> TimeCandidates {
        let mut forecasts: Vec<usize> = self
            .forecasts
            .iter()
            .enumerate()
            .filter(|(_, f)| f.run.valid_time == t && f.run.step_hours <= max_lead_gap_hours)
            .map(|(i, _)| i)
            .collect();
        forecasts.sort_by_key(|&i| (self.forecasts[i].run.step_hours, self.forecasts[i].run.issuance));

        let reanalysis = match &self.reanalysis {
            Some(tier) => reanalysis_frames(&tier.field.times, t, max_reanalysis_gap_hours),
            None => Vec::new(),
        };

        let climatology = self
            .climatology
            .as_ref()
            .and_then(|tier| climatology_frame(tier.profile, t));

        TimeCandidates {
            forecasts,
            reanalysis,
            climatology,
        }
    }

    /// Resolve one cell against precomputed candidates.
    pub fn resolve(&self, cell: usize, candidates: &TimeCandidates) -> Option<AlignedValue> {
        for &i in &candidates.forecasts {
            let tier = &self.forecasts[i];
            if let Some(value) = tier.samplers[cell].sample(&tier.run.field.data, 0) {
                return Some(AlignedValue {
                    value,
                    provenance: Provenance::Forecast {
                        issuance: tier.run.issuance,
                        step_hours: tier.run.step_hours,
                    },
                });
            }
        }

        if let Some(tier) = &self.reanalysis {
            for &frame in &candidates.reanalysis {
                if let Some(value) = tier.samplers[cell].sample(&tier.field.data, frame) {
                    return Some(AlignedValue {
                        value,
                        provenance: Provenance::Observed,
                    });
                }
            }
        }

        let tier = self.climatology.as_ref()?;
        let frame = candidates.climatology?;
        let value = tier.samplers[cell].sample(&tier.profile.data, frame)?;
        Some(AlignedValue {
            value,
            provenance: Provenance::Climatology,
        })
    }
}

/// Frames within `max_gap_hours` of `t`, ordered by distance then time.
fn reanalysis_frames(times: &[DateTime<Utc>], t: DateTime<Utc>, max_gap_hours: u32) -> Vec<usize> {
    let max_gap = Duration::hours(i64::from(max_gap_hours));
    let mut frames: Vec<(Duration, usize)> = times
        .iter()
        .enumerate()
        .filter_map(|(i, &ti)| {
            let gap = (ti - t).abs();
            (gap <= max_gap).then_some((gap, i))
        })
        .collect();
    // Times are strictly increasing, so on equal gaps the lower index is earlier.
    frames.sort();
    frames.into_iter().map(|(_, i)| i).collect()
}

/// Calendar frame for `t`; day 366 falls back to 365 when the profile has no
/// leap day.
fn climatology_frame(profile: &ClimatologyProfile, t: DateTime<Utc>) -> Option<usize> {
    let index = CalendarIndex::for_timestamp(t, profile.is_hourly());
    match profile.frame_for(index) {
        Some(frame) => Some(frame),
        None if index.day_of_year == 366 => profile.frame_for(CalendarIndex {
            day_of_year: 365,
            ..index
        }),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FieldData, SpatialGrid, Unit};
    use chrono::TimeZone;
    use nalgebra::DMatrix;

    fn t(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, day, hour, 0, 0).unwrap()
    }

    fn one_cell(values: &[f64]) -> FieldData {
        FieldData {
            variable: "ws".into(),
            unit: Unit::MetresPerSecond,
            grid: SpatialGrid::Basins { ids: vec!["b".into()] },
            frames: values
                .iter()
                .map(|v| DMatrix::from_row_slice(1, 1, &[*v]))
                .collect(),
        }
    }

    #[test]
    fn reanalysis_tie_goes_to_earlier_sample() {
        let times = vec![t(1, 0), t(1, 2)];
        assert_eq!(reanalysis_frames(&times, t(1, 1), 3), vec![0, 1]);
        assert_eq!(reanalysis_frames(&times, t(1, 2), 3), vec![1, 0]);
        assert!(reanalysis_frames(&times, t(1, 9), 3).is_empty());
    }

    #[test]
    fn leap_day_falls_back_to_day_365() {
        let profile = ClimatologyProfile {
            data: one_cell(&[1.0, 2.0]),
            calendar: vec![
                CalendarIndex { day_of_year: 1, hour: None },
                CalendarIndex { day_of_year: 365, hour: None },
            ],
        };
        let dec31_leap = Utc.with_ymd_and_hms(2024, 12, 31, 0, 0, 0).unwrap();
        assert_eq!(climatology_frame(&profile, dec31_leap), Some(1));
        let jun = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        assert_eq!(climatology_frame(&profile, jun), None);
    }

    #[test]
    fn forecast_beats_reanalysis_and_smaller_step_wins() {
        let run = |issuance: DateTime<Utc>, step: u32, v: f64| {
            ForecastRun::new(one_cell(&[v]), issuance, step).unwrap()
        };
        let long = run(t(1, 0), 12, 7.0);
        let short = run(t(1, 6), 6, 5.0);
        let missing = run(t(1, 12), 0, f64::NAN);
        let field = GriddedField {
            data: one_cell(&[3.0]),
            times: vec![t(1, 12)],
        };

        let tiers = VariableTiers {
            forecasts: vec![
                ForecastTier { run: &long, samplers: vec![CellSampler::Node(0)] },
                ForecastTier { run: &short, samplers: vec![CellSampler::Node(0)] },
                ForecastTier { run: &missing, samplers: vec![CellSampler::Node(0)] },
            ],
            reanalysis: Some(ReanalysisTier { field: &field, samplers: vec![CellSampler::Node(0)] }),
            climatology: None,
        };

        let c = tiers.candidates(t(1, 12), 48, 3);
        assert_eq!(c.forecasts, vec![2, 1, 0]);
        let v = tiers.resolve(0, &c).unwrap();
        assert_eq!(v.value, 5.0);
        assert_eq!(
            v.provenance,
            Provenance::Forecast { issuance: t(1, 6), step_hours: 6 }
        );

        // Lead limit excludes both usable runs, so reanalysis answers.
        let c = tiers.candidates(t(1, 12), 4, 3);
        let v = tiers.resolve(0, &c).unwrap();
        assert_eq!(v.provenance, Provenance::Observed);
        assert_eq!(v.value, 3.0);
    }
}

//! Formatted terminal output and the serializable run report.
//!
//! Formatting lives in one place so the pipeline stages stay free of
//! presentation concerns.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::app::pipeline::{RunOutput, RequestOutcome};
use crate::data::PlantRegistry;
use crate::domain::{
    AggregatedResult, GenerationType, LoadedSource, ProvenanceSummary, SourceKind,
};

/// Machine-readable summary of a run (written by `run --results`).
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub generated_at: DateTime<Utc>,
    pub sources_loaded: usize,
    pub load_failures: Vec<FailureReport>,
    pub requests: Vec<RequestReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailureReport {
    pub source: String,
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestReport {
    pub name: String,
    pub generation: GenerationType,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureReport>,
    pub records: usize,
    pub provenance: Vec<VariableProvenance>,
    pub results: Vec<AggregatedResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VariableProvenance {
    pub variable: String,
    #[serde(flatten)]
    pub counts: ProvenanceSummary,
}

impl RunReport {
    pub fn from_run(run: &RunOutput, generated_at: DateTime<Utc>) -> Self {
        Self {
            generated_at,
            sources_loaded: run.sources_loaded,
            load_failures: run
                .load_failures
                .iter()
                .map(|(desc, e)| FailureReport {
                    source: desc.display_name(),
                    kind: e.kind().to_string(),
                    message: e.to_string(),
                })
                .collect(),
            requests: run.outcomes.iter().map(request_report).collect(),
        }
    }
}

fn request_report(outcome: &RequestOutcome) -> RequestReport {
    match &outcome.result {
        Ok(out) => RequestReport {
            name: outcome.name.clone(),
            generation: outcome.generation,
            status: "ok",
            error: None,
            records: out.estimates.len(),
            provenance: out
                .provenance
                .iter()
                .map(|(variable, counts)| VariableProvenance {
                    variable: variable.clone(),
                    counts: counts.clone(),
                })
                .collect(),
            results: out.results.clone(),
        },
        Err(e) => RequestReport {
            name: outcome.name.clone(),
            generation: outcome.generation,
            status: "failed",
            error: Some(FailureReport {
                source: outcome.name.clone(),
                kind: e.kind().to_string(),
                message: e.to_string(),
            }),
            records: 0,
            provenance: Vec::new(),
            results: Vec::new(),
        },
    }
}

/// Format the full run summary: loader status, then one block per request.
pub fn format_run_summary(run: &RunOutput) -> String {
    let mut out = String::new();

    out.push_str("=== repower - renewable power estimates ===\n");
    out.push_str(&format!(
        "Sources: loaded={} failed={}\n",
        run.sources_loaded,
        run.load_failures.len()
    ));
    for (desc, e) in &run.load_failures {
        out.push_str(&format!("  ! {} [{}] {e}\n", desc.display_name(), e.kind()));
    }

    for outcome in &run.outcomes {
        out.push('\n');
        out.push_str(&format!(
            "Request `{}` ({})\n",
            outcome.name,
            outcome.generation.display_name()
        ));
        match &outcome.result {
            Ok(result) => {
                out.push_str(&format!("- records: {}\n", result.estimates.len()));
                for (variable, counts) in &result.provenance {
                    out.push_str(&format!(
                        "- {variable:<8} observed={} forecast={} climatology={}\n",
                        counts.observed, counts.forecast, counts.climatology
                    ));
                }
                out.push_str(&format_results_table(&result.results));
            }
            Err(e) => out.push_str(&format!("- FAILED [{}] {e}\n", e.kind())),
        }
    }

    out
}

/// Aggregated results as an aligned table.
pub fn format_results_table(rows: &[AggregatedResult]) -> String {
    let mut out = String::new();
    push_line(
        &mut out,
        format!(
            "{:<16} {:<20} {:<20} {:<6} {:>12} {:<4} {:>8}",
            "region", "start", "end", "reduce", "value", "unit", "records"
        ),
    );
    push_line(
        &mut out,
        format!(
            "{:-<16} {:-<20} {:-<20} {:-<6} {:-<12} {:-<4} {:-<8}",
            "", "", "", "", "", "", ""
        ),
    );
    for r in rows {
        push_line(
            &mut out,
            format!(
                "{:<16} {:<20} {:<20} {:<6} {:>12.3} {:<4} {:>8}",
                truncate(&r.region_id, 16),
                r.window.start.format("%Y-%m-%d %H:%M"),
                r.window.end.format("%Y-%m-%d %H:%M"),
                format!("{:?}", r.reduction).to_lowercase(),
                r.value,
                r.unit,
                r.record_count
            ),
        );
    }
    out
}

/// One-screen description of a loaded source file.
pub fn format_source(source: &LoadedSource) -> String {
    let data = source.data();
    let mut out = String::new();
    out.push_str(&format!("Variable: {} [{}]\n", data.variable, data.unit));
    out.push_str(&format!(
        "Kind: {}\n",
        match source.kind() {
            SourceKind::Reanalysis => "reanalysis",
            SourceKind::Forecast => "forecast",
            SourceKind::Climatology => "climatology",
        }
    ));
    let (rows, cols) = data.grid.frame_shape();
    out.push_str(&format!(
        "Grid: {} ({} cells, frame {rows}x{cols})\n",
        data.grid.kind_name(),
        data.grid.cell_count()
    ));
    match source {
        LoadedSource::Reanalysis(field) => {
            if let (Some(first), Some(last)) = (field.times.first(), field.times.last()) {
                out.push_str(&format!(
                    "Times: n={} | [{}, {}]\n",
                    field.times.len(),
                    first.to_rfc3339(),
                    last.to_rfc3339()
                ));
            }
        }
        LoadedSource::Forecast(run) => {
            out.push_str(&format!(
                "Issuance: {} | step={}h | valid={}\n",
                run.issuance.to_rfc3339(),
                run.step_hours,
                run.valid_time.to_rfc3339()
            ));
        }
        LoadedSource::Climatology(profile) => {
            out.push_str(&format!(
                "Calendar: {} entries ({})\n",
                profile.calendar.len(),
                if profile.is_hourly() { "hourly" } else { "daily" }
            ));
        }
    }

    let (mut n, mut missing, mut min, mut max) = (0usize, 0usize, f64::INFINITY, f64::NEG_INFINITY);
    for v in data.frames.iter().flat_map(|f| f.iter()) {
        n += 1;
        if v.is_finite() {
            min = min.min(*v);
            max = max.max(*v);
        } else {
            missing += 1;
        }
    }
    if missing < n {
        out.push_str(&format!(
            "Values: n={n} missing={missing} | range=[{min:.3}, {max:.3}]\n"
        ));
    } else {
        out.push_str(&format!("Values: n={n} (all missing)\n"));
    }
    out
}

/// Capacity tables for a plant registry.
pub fn format_plants(registry: &PlantRegistry) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Plants: {} (skipped: {} malformed, {} other sources)\n\n",
        registry.plants.len(),
        registry.skipped_malformed,
        registry.skipped_other_source
    ));

    push_line(
        &mut out,
        format!(
            "{:<16} {:<6} {:>6} {:>12} {:>12} {:>12}",
            "country", "type", "plants", "total_mw", "operating", "planned"
        ),
    );
    push_line(
        &mut out,
        format!("{:-<16} {:-<6} {:-<6} {:-<12} {:-<12} {:-<12}", "", "", "", "", "", ""),
    );
    for row in registry.capacity_by_country() {
        push_line(
            &mut out,
            format!(
                "{:<16} {:<6} {:>6} {:>12.1} {:>12.1} {:>12.1}",
                truncate(&row.country, 16),
                row.generation.display_name(),
                row.plants,
                row.total_mw,
                row.operating_mw,
                row.planned_mw
            ),
        );
    }

    out.push_str("\nBy status:\n");
    for t in registry.status_totals() {
        out.push_str(&format!(
            "- {:<6} operating={:.1} MW planned={:.1} MW\n",
            t.generation.display_name(),
            t.operating_mw,
            t.planned_mw
        ));
    }
    out
}

fn push_line(out: &mut String, line: String) {
    out.push_str(line.trim_end());
    out.push('\n');
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Reduction, TimeWindow};
    use chrono::TimeZone;

    #[test]
    fn results_table_has_header_and_rows() {
        let rows = vec![AggregatedResult {
            region_id: "a-very-long-region-name".to_string(),
            window: TimeWindow {
                start: Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap(),
                end: Utc.with_ymd_and_hms(2025, 3, 2, 0, 0, 0).unwrap(),
            },
            reduction: Reduction::Mean,
            generation: Some(GenerationType::Solar),
            value: 4.25,
            unit: "MW".to_string(),
            record_count: 24,
        }];
        let table = format_results_table(&rows);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("region"));
        assert!(lines[2].starts_with("a-very-long-reg."));
        assert!(lines[2].contains("4.250"));
        assert!(lines[2].contains("mean"));
    }

    #[test]
    fn truncate_keeps_short_strings() {
        assert_eq!(truncate("tana", 16), "tana");
        assert_eq!(truncate("abcdef", 4), "abc.");
    }
}

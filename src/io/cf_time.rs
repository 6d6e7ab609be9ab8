//! CF-convention time handling.
//!
//! Time coordinates arrive either as ISO-8601 labels or as numeric offsets with
//! a units attribute such as `hours since 1900-01-01 00:00:00.0`.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};

/// Parsed `<unit> since <epoch>` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CfTimeUnits {
    pub unit_seconds: i64,
    pub epoch: DateTime<Utc>,
}

impl CfTimeUnits {
    pub fn parse(raw: &str) -> Option<Self> {
        let (unit, epoch) = raw.split_once(" since ")?;
        let unit_seconds = duration_unit_seconds(unit)?;
        let epoch = parse_timestamp(epoch)?;
        Some(Self { unit_seconds, epoch })
    }

    /// Convert an offset to an absolute timestamp, rounded to the millisecond.
    pub fn to_datetime(&self, offset: f64) -> Option<DateTime<Utc>> {
        if !offset.is_finite() {
            return None;
        }
        let millis = (offset * self.unit_seconds as f64 * 1000.0).round();
        if millis.abs() > i64::MAX as f64 / 2.0 {
            return None;
        }
        self.epoch
            .checked_add_signed(Duration::milliseconds(millis as i64))
    }
}

/// Seconds per unit for CF duration names (`hours`, `hour`, `h`, ...).
pub fn duration_unit_seconds(unit: &str) -> Option<i64> {
    match unit.trim().to_ascii_lowercase().as_str() {
        "seconds" | "second" | "secs" | "sec" | "s" => Some(1),
        "minutes" | "minute" | "mins" | "min" => Some(60),
        "hours" | "hour" | "hrs" | "hr" | "h" => Some(3600),
        "days" | "day" | "d" => Some(86_400),
        _ => None,
    }
}

/// Parse an absolute timestamp in the spellings found in climate files.
///
/// Accepts RFC 3339, `YYYY-MM-DD[ T]HH:MM[:SS[.f]]` (UTC assumed), bare dates,
/// and the compact `YYYYMMDDHHMMSS` form used in forecast filenames.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }

    let s = s.trim_end_matches('Z').trim_end_matches(" UTC").trim();
    for fmt in [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
        "%Y%m%d%H%M%S",
    ] {
        if let Ok(n) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(n.and_utc());
        }
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|n| n.and_utc())
}

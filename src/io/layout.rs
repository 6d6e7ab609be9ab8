//! On-disk layout of the source tree and the filename conventions it uses.
//!
//! ```text
//! <data_dir>/
//!   AIFS/output/<YYYYMMDDHHMMSS>-<step>-<var>.{nc,json}
//!   climatology/<var>_climatology.{nc,json}
//!   ERA5/<var>_<stream>_<aggregation>.{nc,json}
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::debug;

use crate::domain::{SourceDescriptor, SourceKind};
use crate::error::{PipelineError, PipelineResult};

pub const FORECAST_DIR: &str = "AIFS/output";
pub const CLIMATOLOGY_DIR: &str = "climatology";
pub const REANALYSIS_DIR: &str = "ERA5";

const SUPPORTED_EXTENSIONS: [&str; 2] = ["json", "nc"];

/// The `(issuance, step, variable)` triple encoded in a forecast filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForecastName {
    pub issuance: DateTime<Utc>,
    pub step_hours: u32,
    pub variable: String,
}

impl ForecastName {
    /// Parse a file stem such as `20250301000000-24-ssrd`.
    pub fn parse(stem: &str) -> Result<Self, String> {
        let mut parts = stem.splitn(3, '-');
        let (Some(ts), Some(step), Some(variable)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(format!(
                "expected `<YYYYMMDDHHMMSS>-<step>-<variable>`, got `{stem}`"
            ));
        };

        if ts.len() != 14 || !ts.bytes().all(|b| b.is_ascii_digit()) {
            return Err(format!("issuance `{ts}` is not YYYYMMDDHHMMSS"));
        }
        let issuance = NaiveDateTime::parse_from_str(ts, "%Y%m%d%H%M%S")
            .map_err(|e| format!("issuance `{ts}` is not a valid timestamp: {e}"))?
            .and_utc();
        let step_hours: u32 = step
            .parse()
            .map_err(|_| format!("step `{step}` is not a whole number of hours"))?;
        if variable.is_empty() {
            return Err("empty variable name".to_string());
        }

        Ok(Self {
            issuance,
            step_hours,
            variable: variable.to_string(),
        })
    }

    pub fn file_stem(&self) -> String {
        format!(
            "{}-{}-{}",
            self.issuance.format("%Y%m%d%H%M%S"),
            self.step_hours,
            self.variable
        )
    }
}

/// The `(variable, stream, aggregation)` triple of an ERA5 filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReanalysisName {
    pub variable: String,
    pub stream: String,
    pub aggregation: String,
}

impl ReanalysisName {
    /// Parse `<variable>_<stream>_<aggregation>`; the variable may itself
    /// contain underscores.
    pub fn parse(stem: &str) -> Option<Self> {
        let mut parts = stem.rsplitn(3, '_');
        let aggregation = parts.next()?;
        let stream = parts.next()?;
        let variable = parts.next()?;
        if variable.is_empty() || stream.is_empty() || aggregation.is_empty() {
            return None;
        }
        Some(Self {
            variable: variable.to_string(),
            stream: stream.to_string(),
            aggregation: aggregation.to_string(),
        })
    }
}

/// Variable name of a `<variable>_climatology` stem.
pub fn climatology_variable(stem: &str) -> Option<&str> {
    stem.strip_suffix("_climatology").filter(|v| !v.is_empty())
}

pub fn forecast_path(data_dir: &Path, name: &ForecastName, extension: &str) -> PathBuf {
    data_dir
        .join(FORECAST_DIR)
        .join(format!("{}.{extension}", name.file_stem()))
}

pub fn climatology_path(data_dir: &Path, variable: &str, extension: &str) -> PathBuf {
    data_dir
        .join(CLIMATOLOGY_DIR)
        .join(format!("{variable}_climatology.{extension}"))
}

pub fn reanalysis_path(
    data_dir: &Path,
    variable: &str,
    stream: &str,
    aggregation: &str,
    extension: &str,
) -> PathBuf {
    data_dir
        .join(REANALYSIS_DIR)
        .join(format!("{variable}_{stream}_{aggregation}.{extension}"))
}

/// Walk the source tree and build descriptors for the requested variables.
///
/// Missing tier directories are not an error: the aligner's fallback handles
/// absent tiers. Forecast files with unparseable names are returned anyway
/// (using the stem as the variable) when the stem ends in a requested
/// variable, so the loader reports them as `NamingMismatch` instead of
/// silently dropping them.
pub fn discover_sources(data_dir: &Path, variables: &[String]) -> PipelineResult<Vec<SourceDescriptor>> {
    let wanted = |v: &str| variables.iter().any(|w| w == v);
    let mut out = Vec::new();

    for path in list_files(&data_dir.join(FORECAST_DIR))? {
        let Some(stem) = file_stem(&path) else { continue };
        match ForecastName::parse(&stem) {
            Ok(name) if wanted(&name.variable) => {
                out.push(SourceDescriptor::new(path, name.variable, SourceKind::Forecast));
            }
            Ok(_) => {}
            Err(_) => {
                if let Some(v) = variables.iter().find(|v| stem.ends_with(&format!("-{v}"))) {
                    out.push(SourceDescriptor::new(path, v.clone(), SourceKind::Forecast));
                } else {
                    debug!(file = %path.display(), "skipping unrecognized forecast file");
                }
            }
        }
    }

    for path in list_files(&data_dir.join(REANALYSIS_DIR))? {
        let Some(stem) = file_stem(&path) else { continue };
        if let Some(name) = ReanalysisName::parse(&stem) {
            if wanted(&name.variable) {
                out.push(SourceDescriptor::new(path, name.variable, SourceKind::Reanalysis));
            }
        }
    }

    for path in list_files(&data_dir.join(CLIMATOLOGY_DIR))? {
        let Some(stem) = file_stem(&path) else { continue };
        if let Some(variable) = climatology_variable(&stem) {
            if wanted(variable) {
                out.push(SourceDescriptor::new(
                    path.clone(),
                    variable,
                    SourceKind::Climatology,
                ));
            }
        }
    }

    Ok(out)
}

/// Build a descriptor for a single file from its name.
///
/// `kind` and `variable` override what the filename says; a name that fits
/// no convention needs both.
pub fn describe_path(
    path: &Path,
    kind: Option<SourceKind>,
    variable: Option<&str>,
) -> PipelineResult<SourceDescriptor> {
    let stem = file_stem(path).unwrap_or_default();
    let inferred: Option<(SourceKind, String)> = if let Ok(name) = ForecastName::parse(&stem) {
        Some((SourceKind::Forecast, name.variable))
    } else if let Some(v) = climatology_variable(&stem) {
        Some((SourceKind::Climatology, v.to_string()))
    } else {
        ReanalysisName::parse(&stem).map(|name| (SourceKind::Reanalysis, name.variable))
    };

    let kind = kind.or(inferred.as_ref().map(|(k, _)| *k));
    let variable = variable
        .map(str::to_string)
        .or(inferred.map(|(_, v)| v));
    match (kind, variable) {
        (Some(kind), Some(variable)) => Ok(SourceDescriptor::new(path, variable, kind)),
        _ => Err(PipelineError::InvalidConfig(format!(
            "cannot tell the kind and variable of `{}` from its name; pass --kind and --variable",
            path.display()
        ))),
    }
}

fn list_files(dir: &Path) -> PipelineResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        debug!(dir = %dir.display(), "source directory absent");
        return Ok(Vec::new());
    }
    let entries = fs::read_dir(dir).map_err(|e| PipelineError::io(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| PipelineError::io(dir, e))?.path();
        let supported = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| SUPPORTED_EXTENSIONS.contains(&e));
        if path.is_file() && supported {
            files.push(path);
        }
    }
    // Directory order is platform-dependent.
    files.sort();
    Ok(files)
}

fn file_stem(path: &Path) -> Option<String> {
    path.file_stem().map(|s| s.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn forecast_name_round_trips_through_stem() {
        let name = ForecastName::parse("20250301000000-24-ssrd").unwrap();
        assert_eq!(name.issuance, Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap());
        assert_eq!(name.step_hours, 24);
        assert_eq!(name.variable, "ssrd");
        assert_eq!(name.file_stem(), "20250301000000-24-ssrd");
    }

    #[test]
    fn forecast_variable_may_contain_dashes() {
        let name = ForecastName::parse("20250301000000-6-ws-100m").unwrap();
        assert_eq!(name.variable, "ws-100m");
    }

    #[test]
    fn malformed_forecast_names() {
        assert!(ForecastName::parse("2025-24-ssrd").is_err());
        assert!(ForecastName::parse("20250301000000-x-ssrd").is_err());
        assert!(ForecastName::parse("20251301000000-6-ssrd").is_err());
        assert!(ForecastName::parse("20250301000000-6").is_err());
    }

    #[test]
    fn reanalysis_name_keeps_underscored_variables() {
        let name = ReanalysisName::parse("2m_temperature_oper_hourly").unwrap();
        assert_eq!(name.variable, "2m_temperature");
        assert_eq!(name.stream, "oper");
        assert_eq!(name.aggregation, "hourly");
        assert!(ReanalysisName::parse("ssrd").is_none());
    }

    #[test]
    fn describe_path_infers_from_name() {
        let d = describe_path(Path::new("x/20250301000000-6-ssrd.json"), None, None).unwrap();
        assert_eq!((d.kind, d.variable.as_str()), (SourceKind::Forecast, "ssrd"));
        let d = describe_path(Path::new("x/t2m_climatology.nc"), None, None).unwrap();
        assert_eq!((d.kind, d.variable.as_str()), (SourceKind::Climatology, "t2m"));
        let d = describe_path(Path::new("x/dis_oper_daily.json"), None, Some("dis24")).unwrap();
        assert_eq!((d.kind, d.variable.as_str()), (SourceKind::Reanalysis, "dis24"));
        assert!(describe_path(Path::new("x/field.json"), None, None).is_err());
        assert!(describe_path(Path::new("x/field.json"), Some(SourceKind::Reanalysis), Some("ssrd")).is_ok());
    }

    #[test]
    fn discovery_filters_by_variable_and_tolerates_missing_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join(FORECAST_DIR)).unwrap();
        fs::create_dir_all(root.join(REANALYSIS_DIR)).unwrap();
        fs::write(root.join(FORECAST_DIR).join("20250301000000-6-ssrd.json"), "{}").unwrap();
        fs::write(root.join(FORECAST_DIR).join("20250301000000-6-t2m.json"), "{}").unwrap();
        fs::write(root.join(FORECAST_DIR).join("bogus-ssrd.json"), "{}").unwrap();
        fs::write(root.join(REANALYSIS_DIR).join("ssrd_oper_hourly.json"), "{}").unwrap();
        fs::write(root.join(REANALYSIS_DIR).join("README.txt"), "").unwrap();

        let found = discover_sources(root, &["ssrd".to_string()]).unwrap();
        let kinds: Vec<SourceKind> = found.iter().map(|d| d.kind).collect();
        assert_eq!(
            kinds,
            vec![SourceKind::Forecast, SourceKind::Forecast, SourceKind::Reanalysis]
        );
        assert!(found.iter().all(|d| d.variable == "ssrd"));
    }
}

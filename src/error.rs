//! Error types.
//!
//! The library reports failures through [`PipelineError`], whose variants map
//! one-to-one onto the stage that raised them. The binary converts them into
//! an [`AppError`] (exit code + message) at the very edge.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors raised by the pipeline stages.
///
/// Stages return their own variant unchanged; nothing is wrapped into a
/// generic error on the way up, so a caller can tell layout problems from
/// coverage problems from physical-unit problems.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Declared dimensions, coordinates or unit metadata disagree with the file.
    #[error("schema mismatch in {source_name}: {detail}")]
    SchemaMismatch { source_name: String, detail: String },

    /// A forecast filename does not match its in-file metadata.
    #[error("naming mismatch for {source_name}: {detail}")]
    NamingMismatch { source_name: String, detail: String },

    /// No tier (forecast, reanalysis, climatology) supplied a value.
    #[error("coverage gap: no value for `{variable}` at cell {cell} on {timestamp}")]
    CoverageGap {
        variable: String,
        cell: String,
        timestamp: DateTime<Utc>,
    },

    /// A physical input is outside its valid domain (e.g. negative flow).
    #[error("physically invalid input for `{variable}` at cell {cell} on {timestamp}: {detail}")]
    PhysicallyInvalidInput {
        variable: String,
        cell: String,
        timestamp: DateTime<Utc>,
        detail: String,
    },

    /// A variable's declared unit is not the SI unit the conversion expects.
    #[error("unit mismatch for `{variable}`: expected {expected}, found {found}")]
    UnitMismatch {
        variable: String,
        expected: String,
        found: String,
    },

    /// The aggregation filter matched no records.
    #[error("empty selection: no power estimates matched {detail}")]
    EmptySelection { detail: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    pub fn schema(source_name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            source_name: source_name.into(),
            detail: detail.into(),
        }
    }

    pub fn naming(source_name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::NamingMismatch {
            source_name: source_name.into(),
            detail: detail.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Short machine-friendly name of the error kind (used in logs and reports).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SchemaMismatch { .. } => "SchemaMismatch",
            Self::NamingMismatch { .. } => "NamingMismatch",
            Self::CoverageGap { .. } => "CoverageGap",
            Self::PhysicallyInvalidInput { .. } => "PhysicallyInvalidInput",
            Self::UnitMismatch { .. } => "UnitMismatch",
            Self::EmptySelection { .. } => "EmptySelection",
            Self::InvalidConfig(_) => "InvalidConfig",
            Self::Io { .. } => "Io",
        }
    }
}

// `std::io::Error` is not `Clone`; a cloned `Io` keeps the kind and message.
impl Clone for PipelineError {
    fn clone(&self) -> Self {
        match self {
            Self::SchemaMismatch { source_name, detail } => Self::schema(source_name, detail),
            Self::NamingMismatch { source_name, detail } => Self::naming(source_name, detail),
            Self::CoverageGap {
                variable,
                cell,
                timestamp,
            } => Self::CoverageGap {
                variable: variable.clone(),
                cell: cell.clone(),
                timestamp: *timestamp,
            },
            Self::PhysicallyInvalidInput {
                variable,
                cell,
                timestamp,
                detail,
            } => Self::PhysicallyInvalidInput {
                variable: variable.clone(),
                cell: cell.clone(),
                timestamp: *timestamp,
                detail: detail.clone(),
            },
            Self::UnitMismatch {
                variable,
                expected,
                found,
            } => Self::UnitMismatch {
                variable: variable.clone(),
                expected: expected.clone(),
                found: found.clone(),
            },
            Self::EmptySelection { detail } => Self::EmptySelection {
                detail: detail.clone(),
            },
            Self::InvalidConfig(msg) => Self::InvalidConfig(msg.clone()),
            Self::Io { path, source } => Self::io(
                path.clone(),
                std::io::Error::new(source.kind(), source.to_string()),
            ),
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Error surfaced by the `repower` binary: an exit code plus a printable message.
#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        let exit_code = match &err {
            PipelineError::CoverageGap { .. } | PipelineError::EmptySelection { .. } => 3,
            PipelineError::PhysicallyInvalidInput { .. } => 4,
            _ => 2,
        };
        AppError::new(exit_code, format!("{}: {err}", err.kind()))
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

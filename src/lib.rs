//! `repower` library crate.
//!
//! Estimates renewable power (solar, wind, hydro) from gridded climate
//! inputs. The stages run in a fixed order:
//!
//! - `io`: discover and load reanalysis, forecast and climatology files
//! - `align`: resample onto the request grid, filling gaps forecast >
//!   reanalysis > climatology
//! - `power`: convert each aligned record to MW
//! - `report`: reduce estimates over regions and windows
//!
//! The binary (`repower`) is a thin wrapper around this library so the core
//! logic is testable without spawning processes.

pub mod align;
pub mod app;
pub mod cli;
pub mod config;
pub mod data;
pub mod domain;
pub mod error;
pub mod io;
pub mod power;
pub mod report;
pub mod telemetry;

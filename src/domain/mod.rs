//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - the spatial reference (`SpatialGrid`, `CellRef`)
//! - the unit vocabulary (`Unit`)
//! - loaded fields, aligned datasets, power estimates and aggregated results

pub mod grid;
pub mod types;
pub mod units;

pub use grid::*;
pub use types::*;
pub use units::*;

//! Input/output helpers.
//!
//! - source tree layout and filename conventions (`layout`)
//! - format readers producing a `RawDataset` (`grid_json`, `netcdf_reader`)
//! - validation into loaded fields (`ingest`)
//! - result exports (CSV/JSON) (`export`)

pub mod cf_time;
pub mod export;
pub mod grid_json;
pub mod ingest;
pub mod layout;
#[cfg(feature = "netcdf")]
pub mod netcdf_reader;
pub mod raw;

pub use export::*;
pub use ingest::*;
pub use layout::discover_sources;

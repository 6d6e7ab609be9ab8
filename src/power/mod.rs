//! Power conversion models.
//!
//! Each model is a small, pure function of one aligned record and a fixed
//! parameter set; `engine` dispatches on the generation type.

pub mod engine;
pub mod hydro;
pub mod solar;
pub mod wind;

pub use engine::{CapacityMap, ConversionParams, check_units, convert_dataset, convert_record, required_inputs};
pub use hydro::{FlowSource, HydroParams};
pub use solar::SolarParams;
pub use wind::WindParams;

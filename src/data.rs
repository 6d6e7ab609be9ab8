//! Auxiliary data: the plant registry and the synthetic source generator.

pub mod plants;
pub mod synthetic;

pub use plants::{
    CountryCapacity, ICPAC_COUNTRIES, Plant, PlantRegistry, PlantStatus, StatusTotals, load_registry,
};
pub use synthetic::{SyntheticOutput, SyntheticSpec, write_synthetic_tree};

//! # chartsim-core
//! Foundation types and traits for the chartsim simulation.

pub mod constants;
pub mod error;
pub mod registry;
pub mod rng;
pub mod traits;
pub mod types;

//! # chartsim-runtime: Stateful simulation service.
//!
//! - [`config::SimConfig`]: layered TOML + environment configuration
//! - [`scheduler::DecayScheduler`]: one passive-growth pass over the registry
//! - [`simulation::Simulation`]: registry, RNG and engines behind one lock,
//!   on-demand actions, promotions, chart passes, events and the tick loop

pub mod config;
pub mod scheduler;
pub mod simulation;

pub use config::SimConfig;
pub use scheduler::{DecayScheduler, TickReport};
pub use simulation::{ChartPass, ChartRow, SimEvent, SimSnapshot, Simulation, TickOutcome};

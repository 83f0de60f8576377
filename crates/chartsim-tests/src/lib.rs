//! Integration test suite for chartsim.
//!
//! Scenario tests walk the documented simulation examples end to end;
//! property tests drive many seeded ticks and chart passes and check the
//! properties that must hold after every step.

pub mod helpers;

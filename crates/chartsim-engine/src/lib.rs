//! # chartsim-engine: Pure simulation math.
//!
//! Nothing in this crate owns state beyond its configuration; every random
//! draw goes through a caller-supplied [`RandomSource`](chartsim_core::traits::RandomSource).
//!
//! - **Tier bounds** ([`tier`]): monotonic popularity breakpoint tables per
//!   activity kind, validated at construction, with a fallback for unknown kinds.
//! - **Performance results** ([`performance`]): variance, clamp into the tier
//!   envelope, and a rare viral bonus soft-capped at twice the tier cap.
//! - **Chart ranking** ([`chart`]): three-band interpolation with per-entity
//!   noise, collision resolution into unique ranks, delta and peak bookkeeping.
//! - **Passive growth** ([`growth`]): fan-base core, exponentially decaying
//!   general interest, promotion boost and capped virality spikes.

pub mod chart;
pub mod growth;
pub mod performance;
pub mod tier;

pub use chart::ChartRankEngine;
pub use growth::{GrowthModel, GrowthParams};
pub use performance::{PerformanceCalculator, PerformanceResult};
pub use tier::{TierBreakpoint, TierResolver, TierTable};

//! Trait interfaces for chartsim.
//!
//! These traits define the contracts between crates:
//! - [`RandomSource`]: seedable randomness port (chartsim-core implements [`SimRng`](crate::rng::SimRng))
//! - [`TierLookup`]: popularity-to-bound mapping (chartsim-engine implements)

use crate::types::TierBound;

/// Source of every random draw the engines make.
///
/// Calculators and the scheduler take this by `&mut` instead of reaching for
/// thread-local randomness, so a seeded source reproduces a run exactly.
pub trait RandomSource {
    /// Sample uniformly from the closed interval `[lo, hi]`.
    ///
    /// Callers guarantee `lo <= hi` and both finite. A degenerate interval
    /// returns `lo`.
    fn uniform(&mut self, lo: f64, hi: f64) -> f64;

    /// Bernoulli trial. `p` is in `[0, 1]`.
    fn chance(&mut self, p: f64) -> bool;
}

/// Maps a popularity score and activity kind to a clamp envelope.
///
/// Implementations never fail: an unknown activity kind yields a safe
/// default bound, and every returned bound satisfies `floor <= cap`.
pub trait TierLookup: Send + Sync {
    fn resolve(&self, popularity: u64, activity_kind: &str) -> TierBound;
}

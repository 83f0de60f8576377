//! Randomized, bounded performance results.
//!
//! 1. `varied = floor(baseline * variance_mult)`, `variance_mult ~ U(variance)`
//! 2. `clamped = clamp(varied, floor, cap)`
//! 3. with probability `viral_chance`: `bonus = floor(clamped * (viral_mult - 1))`,
//!    `viral_mult ~ U(viral_multiplier)`
//! 4. `final = min(cap * 2, clamped + bonus)`
//!
//! A viral hit may exceed the tier cap, but never twice the cap.

use chartsim_core::constants::VIRAL_CEILING_FACTOR;
use chartsim_core::error::PerformanceError;
use chartsim_core::traits::RandomSource;
use chartsim_core::types::{SampleRange, TierBound};
use serde::{Deserialize, Serialize};

/// Every intermediate of one computation, for display and auditing.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct PerformanceResult {
    pub base: u64,
    pub variance_mult: f64,
    pub clamped: u64,
    pub went_viral: bool,
    pub viral_bonus: u64,
    pub final_value: u64,
}

/// Inputs that shape one computation, apart from the baseline and bound.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct PerformanceInputs {
    pub variance: SampleRange,
    pub viral_chance: f64,
    pub viral_multiplier: SampleRange,
}

impl PerformanceInputs {
    pub fn validate(&self) -> Result<(), PerformanceError> {
        if !self.variance.is_valid() {
            return Err(PerformanceError::InvalidRange {
                name: "variance",
                lo: self.variance.lo,
                hi: self.variance.hi,
            });
        }
        if !(0.0..=1.0).contains(&self.viral_chance) {
            return Err(PerformanceError::InvalidProbability(self.viral_chance));
        }
        if !self.viral_multiplier.is_valid() || self.viral_multiplier.lo < 1.0 {
            return Err(PerformanceError::InvalidRange {
                name: "viral multiplier",
                lo: self.viral_multiplier.lo,
                hi: self.viral_multiplier.hi,
            });
        }
        Ok(())
    }
}

/// Stateless calculator; all randomness comes from the caller's source.
#[derive(Debug, Clone, Copy, Default)]
pub struct PerformanceCalculator;

impl PerformanceCalculator {
    pub fn new() -> Self {
        Self
    }

    pub fn compute<R: RandomSource + ?Sized>(
        &self,
        baseline: u64,
        bound: &TierBound,
        inputs: &PerformanceInputs,
        rng: &mut R,
    ) -> Result<PerformanceResult, PerformanceError> {
        inputs.validate()?;
        if bound.floor > bound.cap {
            return Err(PerformanceError::InvertedBound {
                floor: bound.floor,
                cap: bound.cap,
            });
        }

        let variance_mult = rng.uniform(inputs.variance.lo, inputs.variance.hi);
        let varied = (baseline as f64 * variance_mult).floor() as u64;
        let clamped = varied.clamp(bound.floor, bound.cap);

        // Zero chance never touches the source, so seeded runs stay aligned.
        let went_viral = inputs.viral_chance > 0.0 && rng.chance(inputs.viral_chance);
        let viral_bonus = if went_viral {
            let mult = rng.uniform(inputs.viral_multiplier.lo, inputs.viral_multiplier.hi);
            (clamped as f64 * (mult - 1.0)).floor() as u64
        } else {
            0
        };

        let ceiling = bound.cap.saturating_mul(VIRAL_CEILING_FACTOR);
        let final_value = clamped.saturating_add(viral_bonus).min(ceiling);

        Ok(PerformanceResult {
            base: baseline,
            variance_mult,
            clamped,
            went_viral,
            viral_bonus,
            final_value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chartsim_core::rng::SimRng;
    use proptest::prelude::*;

    fn bound(floor: u64, cap: u64) -> TierBound {
        TierBound {
            floor,
            cap,
            tier: "test".into(),
        }
    }

    fn inputs(variance: (f64, f64), chance: f64, mult: (f64, f64)) -> PerformanceInputs {
        PerformanceInputs {
            variance: variance.into(),
            viral_chance: chance,
            viral_multiplier: mult.into(),
        }
    }

    #[test]
    fn fixed_variance_no_viral_is_exact() {
        let mut rng = SimRng::seeded(1);
        let r = PerformanceCalculator::new()
            .compute(1000, &bound(500, 2000), &inputs((1.0, 1.0), 0.0, (2.0, 3.0)), &mut rng)
            .unwrap();
        assert_eq!(r.final_value, 1000);
        assert_eq!(r.clamped, 1000);
        assert!(!r.went_viral);
        assert_eq!(r.viral_bonus, 0);
        assert_eq!(r.base, 1000);
    }

    #[test]
    fn clamps_into_tier() {
        let mut rng = SimRng::seeded(1);
        let calc = PerformanceCalculator::new();
        let low = calc
            .compute(10, &bound(500, 2000), &inputs((1.0, 1.0), 0.0, (1.0, 1.0)), &mut rng)
            .unwrap();
        assert_eq!(low.final_value, 500);
        let high = calc
            .compute(99_999, &bound(500, 2000), &inputs((1.0, 1.0), 0.0, (1.0, 1.0)), &mut rng)
            .unwrap();
        assert_eq!(high.final_value, 2000);
    }

    #[test]
    fn viral_bonus_is_floored_and_soft_capped() {
        let mut rng = SimRng::seeded(3);
        let calc = PerformanceCalculator::new();
        let r = calc
            .compute(1000, &bound(500, 2000), &inputs((1.0, 1.0), 1.0, (1.5, 1.5)), &mut rng)
            .unwrap();
        assert!(r.went_viral);
        assert_eq!(r.viral_bonus, 500);
        assert_eq!(r.final_value, 1500);

        let r = calc
            .compute(2000, &bound(500, 2000), &inputs((1.0, 1.0), 1.0, (5.0, 5.0)), &mut rng)
            .unwrap();
        assert_eq!(r.viral_bonus, 8000);
        assert_eq!(r.final_value, 4000);
    }

    #[test]
    fn zero_chance_consumes_no_draw() {
        let calc = PerformanceCalculator::new();
        let mut a = SimRng::seeded(11);
        let mut b = SimRng::seeded(11);
        calc.compute(1000, &bound(0, 5000), &inputs((0.5, 1.5), 0.0, (2.0, 3.0)), &mut a)
            .unwrap();
        // Only the variance draw was consumed.
        b.uniform(0.5, 1.5);
        assert_eq!(a.uniform(0.0, 1.0), b.uniform(0.0, 1.0));
    }

    #[test]
    fn seeded_runs_repeat() {
        let calc = PerformanceCalculator::new();
        let inp = inputs((0.5, 1.5), 0.3, (1.5, 3.0));
        let mut a = SimRng::seeded(99);
        let mut b = SimRng::seeded(99);
        for _ in 0..50 {
            assert_eq!(
                calc.compute(4000, &bound(100, 9000), &inp, &mut a).unwrap(),
                calc.compute(4000, &bound(100, 9000), &inp, &mut b).unwrap()
            );
        }
    }

    #[test]
    fn invalid_inputs_rejected() {
        let calc = PerformanceCalculator::new();
        let mut rng = SimRng::seeded(0);
        assert!(matches!(
            calc.compute(1, &bound(0, 1), &inputs((2.0, 1.0), 0.0, (1.0, 1.0)), &mut rng),
            Err(PerformanceError::InvalidRange { name: "variance", .. })
        ));
        assert_eq!(
            calc.compute(1, &bound(0, 1), &inputs((1.0, 1.0), 1.5, (1.0, 1.0)), &mut rng),
            Err(PerformanceError::InvalidProbability(1.5))
        );
        assert!(matches!(
            calc.compute(1, &bound(0, 1), &inputs((1.0, 1.0), 0.5, (0.5, 1.0)), &mut rng),
            Err(PerformanceError::InvalidRange { name: "viral multiplier", .. })
        ));
        assert_eq!(
            calc.compute(1, &bound(5, 1), &inputs((1.0, 1.0), 0.0, (1.0, 1.0)), &mut rng),
            Err(PerformanceError::InvertedBound { floor: 5, cap: 1 })
        );
    }

    proptest! {
        #[test]
        fn no_viral_stays_within_tier(
            seed in any::<u64>(),
            baseline in 0u64..10_000_000,
            floor in 0u64..100_000,
            width in 0u64..1_000_000,
            lo in 0.0f64..2.0,
            spread in 0.0f64..2.0,
        ) {
            let cap = floor + width;
            let mut rng = SimRng::seeded(seed);
            let r = PerformanceCalculator::new()
                .compute(baseline, &bound(floor, cap), &inputs((lo, lo + spread), 0.0, (1.0, 5.0)), &mut rng)
                .unwrap();
            prop_assert!(r.final_value >= floor && r.final_value <= cap);
        }

        #[test]
        fn certain_viral_never_exceeds_double_cap(
            seed in any::<u64>(),
            baseline in 0u64..10_000_000,
            floor in 0u64..100_000,
            width in 0u64..1_000_000,
            mult_hi in 1.0f64..20.0,
        ) {
            let cap = floor + width;
            let mut rng = SimRng::seeded(seed);
            let r = PerformanceCalculator::new()
                .compute(baseline, &bound(floor, cap), &inputs((0.5, 1.5), 1.0, (1.0, mult_hi)), &mut rng)
                .unwrap();
            prop_assert!(r.went_viral);
            prop_assert!(r.final_value <= cap * 2);
            prop_assert!(r.final_value >= r.clamped.min(cap * 2));
        }
    }
}

//! Passive metric growth for one entity over one scheduler tick.
//!
//! ```text
//! fanbase   = round(fan_base_core * U(fanbase_jitter))
//! interest  = round(general_interest * gp_weight * exp(-decay_rate * days))
//! promo     = round(promo_power * promo_weight * U(promo_jitter))   if promoting, else 0
//! virality  = min(round(organic * U(spike_range)), spike_cap)       with p = virality_potential
//! spike_cap = max(spike_cap_floor, fan_base_core * spike_cap_per_fan)
//! ```

use chartsim_core::constants::{
    DEFAULT_DECAY_RATE, DEFAULT_GP_WEIGHT, DEFAULT_PROMO_WEIGHT, FANBASE_JITTER, PROMO_JITTER,
    SPIKE_CAP_FLOOR, SPIKE_CAP_PER_FAN, SPIKE_RANGE,
};
use chartsim_core::error::GrowthError;
use chartsim_core::traits::RandomSource;
use chartsim_core::types::{GrowthBreakdown, SampleRange, SimAttributes};
use serde::{Deserialize, Serialize};

/// Tunable constants of the growth curve.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct GrowthParams {
    /// Per-day exponential decay of general interest.
    pub decay_rate: f64,
    pub gp_weight: f64,
    pub promo_weight: f64,
    pub fanbase_jitter: SampleRange,
    pub promo_jitter: SampleRange,
    pub spike_range: SampleRange,
    pub spike_cap_floor: u64,
    pub spike_cap_per_fan: u64,
}

impl Default for GrowthParams {
    fn default() -> Self {
        Self {
            decay_rate: DEFAULT_DECAY_RATE,
            gp_weight: DEFAULT_GP_WEIGHT,
            promo_weight: DEFAULT_PROMO_WEIGHT,
            fanbase_jitter: FANBASE_JITTER.into(),
            promo_jitter: PROMO_JITTER.into(),
            spike_range: SPIKE_RANGE.into(),
            spike_cap_floor: SPIKE_CAP_FLOOR,
            spike_cap_per_fan: SPIKE_CAP_PER_FAN,
        }
    }
}

impl GrowthParams {
    pub fn validate(&self) -> Result<(), GrowthError> {
        for (name, value) in [
            ("decay_rate", self.decay_rate),
            ("gp_weight", self.gp_weight),
            ("promo_weight", self.promo_weight),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(GrowthError::InvalidParameter { name, value });
            }
        }
        for (name, range) in [
            ("fanbase_jitter", self.fanbase_jitter),
            ("promo_jitter", self.promo_jitter),
            ("spike_range", self.spike_range),
        ] {
            if !range.is_valid() {
                return Err(GrowthError::InvalidParameter {
                    name,
                    value: range.lo,
                });
            }
        }
        Ok(())
    }
}

/// One tick's growth for one entity.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct GrowthOutcome {
    pub breakdown: GrowthBreakdown,
    pub virality_triggered: bool,
}

impl GrowthOutcome {
    pub fn total(&self) -> u64 {
        self.breakdown.total()
    }
}

/// Growth curve over validated [`GrowthParams`].
#[derive(Debug, Clone)]
pub struct GrowthModel {
    params: GrowthParams,
}

impl GrowthModel {
    pub fn new(params: GrowthParams) -> Result<Self, GrowthError> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &GrowthParams {
        &self.params
    }

    /// Unrounded interest multiplier after `days`: `gp_weight * exp(-decay_rate * days)`.
    pub fn interest_weight(&self, days: u64) -> f64 {
        self.params.gp_weight * (-self.params.decay_rate * days as f64).exp()
    }

    pub fn interest_component(&self, general_interest: u64, days: u64) -> u64 {
        (general_interest as f64 * self.interest_weight(days)).round() as u64
    }

    pub fn spike_cap(&self, fan_base_core: u64) -> u64 {
        fan_base_core
            .saturating_mul(self.params.spike_cap_per_fan)
            .max(self.params.spike_cap_floor)
    }

    /// Compute the increment for an entity `days` after release.
    ///
    /// Draw order: fan-base jitter, promotion jitter (only while promoting),
    /// virality trial (only when the potential is non-zero), spike multiplier.
    pub fn compute<R: RandomSource + ?Sized>(
        &self,
        attrs: &SimAttributes,
        days: u64,
        promo_active: bool,
        rng: &mut R,
    ) -> Result<GrowthOutcome, GrowthError> {
        let potential = attrs.virality_potential;
        if !(0.0..=1.0).contains(&potential) {
            return Err(GrowthError::InvalidVirality(potential));
        }
        let p = &self.params;

        let fan_jitter = rng.uniform(p.fanbase_jitter.lo, p.fanbase_jitter.hi);
        let fanbase = (attrs.fan_base_core as f64 * fan_jitter).round() as u64;

        let interest = self.interest_component(attrs.general_interest, days);

        let promo = if promo_active {
            let jitter = rng.uniform(p.promo_jitter.lo, p.promo_jitter.hi);
            (attrs.promo_power as f64 * p.promo_weight * jitter).round() as u64
        } else {
            0
        };

        let mut breakdown = GrowthBreakdown {
            fanbase,
            interest,
            promo,
            virality: 0,
        };

        let virality_triggered = potential > 0.0 && rng.chance(potential);
        if virality_triggered {
            let mult = rng.uniform(p.spike_range.lo, p.spike_range.hi);
            let spike = (breakdown.organic() as f64 * mult).round() as u64;
            breakdown.virality = spike.min(self.spike_cap(attrs.fan_base_core));
        }

        Ok(GrowthOutcome {
            breakdown,
            virality_triggered,
        })
    }
}

//! Passive-growth tick over every entity in the registry.
//!
//! One call to [`DecayScheduler::tick`] is one pass: it runs to completion
//! over every entity before returning, and the caller holds the registry
//! lock for its whole duration. Entities owned by an inactive group or marked
//! excluded are skipped silently. An entity that fails is logged and skipped;
//! the rest of the pass continues.

use chartsim_core::error::TickError;
use chartsim_core::registry::Registry;
use chartsim_core::traits::RandomSource;
use chartsim_core::types::{EntityId, HistoryEntry, MetricKind};
use chartsim_engine::growth::GrowthOutcome;
use chartsim_engine::GrowthModel;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Metric that passive growth accrues to. Charts rank by it.
pub const PASSIVE_METRIC: MetricKind = MetricKind::Streams;

/// Summary of one pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TickReport {
    pub processed: usize,
    pub skipped_inactive: usize,
    pub skipped_excluded: usize,
    pub viral_hits: usize,
    pub total_increment: u64,
    /// Entities skipped because of an error, in id order.
    pub failed: Vec<(EntityId, String)>,
}

enum Step {
    Grew(GrowthOutcome),
    Inactive,
    Excluded,
}

#[derive(Debug, Clone)]
pub struct DecayScheduler {
    model: GrowthModel,
    history_cap: usize,
}

impl DecayScheduler {
    pub fn new(model: GrowthModel, history_cap: usize) -> Self {
        Self { model, history_cap }
    }

    pub fn model(&self) -> &GrowthModel {
        &self.model
    }

    pub fn history_cap(&self) -> usize {
        self.history_cap
    }

    /// Grow every eligible entity once at time `now`.
    pub fn tick<R: RandomSource + ?Sized>(
        &self,
        registry: &mut Registry,
        rng: &mut R,
        now: DateTime<Utc>,
    ) -> TickReport {
        let mut report = TickReport::default();

        for id in registry.entity_ids() {
            match self.step(registry, id, rng, now) {
                Ok(Step::Grew(outcome)) => {
                    report.processed += 1;
                    report.total_increment = report.total_increment.saturating_add(outcome.total());
                    if outcome.virality_triggered {
                        report.viral_hits += 1;
                    }
                }
                Ok(Step::Inactive) => report.skipped_inactive += 1,
                Ok(Step::Excluded) => report.skipped_excluded += 1,
                Err(e) => {
                    warn!(entity = %id, error = %e, "passive growth failed; entity skipped");
                    report.failed.push((id, e.to_string()));
                }
            }
        }

        info!(
            processed = report.processed,
            inactive = report.skipped_inactive,
            excluded = report.skipped_excluded,
            failed = report.failed.len(),
            viral = report.viral_hits,
            increment = report.total_increment,
            "decay tick complete"
        );
        report
    }

    fn step<R: RandomSource + ?Sized>(
        &self,
        registry: &mut Registry,
        id: EntityId,
        rng: &mut R,
        now: DateTime<Utc>,
    ) -> Result<Step, TickError> {
        let (attributes, days, promo_active) = {
            let Some(entity) = registry.entity(id) else {
                return Ok(Step::Excluded);
            };
            if entity.excluded {
                return Ok(Step::Excluded);
            }
            let owner = registry.owner_of(id).ok_or(TickError::MissingOwner {
                entity: id,
                group: entity.group,
            })?;
            if !owner.active {
                return Ok(Step::Inactive);
            }
            (
                entity.attributes,
                entity.days_since_release(now),
                entity.has_active_promotion(now),
            )
        };

        let outcome = self
            .model
            .compute(&attributes, days, promo_active, rng)
            .map_err(|source| TickError::Growth { entity: id, source })?;

        let Some(entity) = registry.entity_mut(id) else {
            return Ok(Step::Excluded);
        };
        entity
            .metrics
            .checked_add(PASSIVE_METRIC, outcome.total())
            .ok_or(TickError::MetricOverflow(id))?;
        entity.push_history(
            HistoryEntry {
                timestamp: now,
                increment: outcome.total(),
                breakdown: outcome.breakdown,
                virality_triggered: outcome.virality_triggered,
            },
            self.history_cap,
        );

        debug!(
            entity = %id,
            days,
            promo = promo_active,
            increment = outcome.total(),
            viral = outcome.virality_triggered,
            "passive growth"
        );
        Ok(Step::Grew(outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chartsim_core::rng::SimRng;
    use chartsim_core::types::{DerivationParams, GroupProfile, SampleRange};
    use chartsim_engine::GrowthParams;
    use chrono::Duration;
    use proptest::prelude::*;

    fn scheduler(cap: usize) -> DecayScheduler {
        DecayScheduler::new(GrowthModel::new(GrowthParams::default()).unwrap(), cap)
    }

    fn profile() -> GroupProfile {
        GroupProfile {
            popularity: 300,
            fan_base: 50_000,
            general_interest: 80,
        }
    }

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn registry_with(n: usize) -> (Registry, Vec<EntityId>) {
        let mut reg = Registry::new();
        let g = reg.add_group("Group", profile()).unwrap();
        let ids = (0..n)
            .map(|i| {
                reg.create_entity(g, format!("Release {i}"), now(), &DerivationParams::default(), ["A"])
                    .unwrap()
            })
            .collect();
        (reg, ids)
    }

    #[test]
    fn tick_grows_and_records_history() {
        let (mut reg, ids) = registry_with(2);
        let mut rng = SimRng::seeded(1);
        let report = scheduler(96).tick(&mut reg, &mut rng, now());
        assert_eq!(report.processed, 2);
        assert!(report.failed.is_empty());
        for id in ids {
            let e = reg.entity(id).unwrap();
            assert_eq!(e.history.len(), 1);
            assert_eq!(e.metrics.streams, e.history[0].increment);
            assert_eq!(e.history[0].timestamp, now());
            assert!(e.metrics.streams > 0);
        }
        assert_eq!(
            report.total_increment,
            reg.entities().map(|e| e.metrics.streams).sum::<u64>()
        );
    }

    #[test]
    fn inactive_owner_skipped_without_history() {
        let (mut reg, ids) = registry_with(1);
        let group = reg.entity(ids[0]).unwrap().group;
        reg.set_group_active(group, false).unwrap();
        let report = scheduler(96).tick(&mut reg, &mut SimRng::seeded(1), now());
        assert_eq!(report.skipped_inactive, 1);
        assert_eq!(report.processed, 0);
        let e = reg.entity(ids[0]).unwrap();
        assert!(e.history.is_empty());
        assert_eq!(e.metrics.streams, 0);
    }

    #[test]
    fn excluded_entity_skipped() {
        let (mut reg, ids) = registry_with(2);
        reg.entity_mut(ids[0]).unwrap().excluded = true;
        let report = scheduler(96).tick(&mut reg, &mut SimRng::seeded(1), now());
        assert_eq!(report.skipped_excluded, 1);
        assert_eq!(report.processed, 1);
        assert!(reg.entity(ids[0]).unwrap().history.is_empty());
    }

    #[test]
    fn failing_entity_isolated() {
        let (mut reg, ids) = registry_with(3);
        reg.entity_mut(ids[0]).unwrap().attributes.virality_potential = 7.0;
        reg.entity_mut(ids[1]).unwrap().metrics.streams = u64::MAX;

        let report = scheduler(96).tick(&mut reg, &mut SimRng::seeded(1), now());
        assert_eq!(report.processed, 1);
        assert_eq!(report.failed.len(), 2);
        assert_eq!(report.failed[0].0, ids[0]);
        assert_eq!(report.failed[1].0, ids[1]);
        // The overflowing entity keeps its total and gains no history.
        assert_eq!(reg.entity(ids[1]).unwrap().metrics.streams, u64::MAX);
        assert!(reg.entity(ids[1]).unwrap().history.is_empty());
        assert_eq!(reg.entity(ids[2]).unwrap().history.len(), 1);
    }

    #[test]
    fn promotion_adds_promo_component() {
        let (mut reg, ids) = registry_with(2);
        reg.entity_mut(ids[0]).unwrap().promotion = Some(chartsim_core::types::PromotionWindow {
            start: now(),
            end: now() + Duration::days(7),
        });
        scheduler(96).tick(&mut reg, &mut SimRng::seeded(1), now());
        assert!(reg.entity(ids[0]).unwrap().history[0].breakdown.promo > 0);
        assert_eq!(reg.entity(ids[1]).unwrap().history[0].breakdown.promo, 0);
    }

    #[test]
    fn expired_window_gives_no_promo() {
        let (mut reg, ids) = registry_with(1);
        reg.entity_mut(ids[0]).unwrap().promotion = Some(chartsim_core::types::PromotionWindow {
            start: now() - Duration::days(10),
            end: now() - Duration::days(1),
        });
        scheduler(96).tick(&mut reg, &mut SimRng::seeded(1), now());
        assert_eq!(reg.entity(ids[0]).unwrap().history[0].breakdown.promo, 0);
    }

    #[test]
    fn certain_virality_spikes_every_tick() {
        let (mut reg, ids) = registry_with(1);
        reg.entity_mut(ids[0]).unwrap().attributes.virality_potential = 1.0;
        let s = scheduler(96);
        let mut rng = SimRng::seeded(9);
        for i in 0..20 {
            let report = s.tick(&mut reg, &mut rng, now() + Duration::minutes(15 * i));
            assert_eq!(report.viral_hits, 1);
        }
        let e = reg.entity(ids[0]).unwrap();
        let cap = s.model().spike_cap(e.attributes.fan_base_core);
        assert!(e.history.iter().all(|h| h.virality_triggered && h.breakdown.virality <= cap));
    }

    #[test]
    fn seeded_ticks_repeat() {
        let (mut a, _) = registry_with(4);
        let mut b = a.clone();
        let s = scheduler(96);
        let (mut ra, mut rb) = (SimRng::seeded(3), SimRng::seeded(3));
        for _ in 0..5 {
            assert_eq!(s.tick(&mut a, &mut ra, now()), s.tick(&mut b, &mut rb, now()));
        }
    }

    #[test]
    fn fixed_jitter_growth_is_exact() {
        let params = GrowthParams {
            fanbase_jitter: SampleRange::fixed(1.0),
            ..GrowthParams::default()
        };
        let s = DecayScheduler::new(GrowthModel::new(params).unwrap(), 96);
        let (mut reg, ids) = registry_with(1);
        {
            let e = reg.entity_mut(ids[0]).unwrap();
            e.attributes.virality_potential = 0.0;
            e.released_at = now() - Duration::days(30);
        }
        s.tick(&mut reg, &mut SimRng::seeded(0), now());
        let h = &reg.entity(ids[0]).unwrap().history[0];
        // fan_base_core = 500, general_interest = 80: 80 * 120 * e^-2.4 = 870.9
        assert_eq!(h.breakdown.fanbase, 500);
        assert_eq!(h.breakdown.interest, 871);
        assert_eq!(h.increment, 1_371);
    }

    proptest! {
        #[test]
        fn history_never_exceeds_cap(cap in 1usize..20, ticks in 0usize..60, seed in any::<u64>()) {
            let (mut reg, ids) = registry_with(1);
            let s = scheduler(cap);
            let mut rng = SimRng::seeded(seed);
            for i in 0..ticks {
                s.tick(&mut reg, &mut rng, now() + Duration::minutes(15 * i as i64));
                prop_assert!(reg.entity(ids[0]).unwrap().history.len() <= cap);
            }
            prop_assert_eq!(reg.entity(ids[0]).unwrap().history.len(), ticks.min(cap));
        }
    }
}

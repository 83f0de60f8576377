//! The simulation service.
//!
//! [`Simulation`] composes the registry, the seedable RNG, the tier resolver,
//! the chart engine and the decay scheduler. Every mutation (scheduler tick,
//! chart pass, on-demand action, promotion change) takes the registry write
//! lock for its whole duration, so a tick and an action never interleave on
//! the same entity. Lock order is registry, then RNG.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use chartsim_core::error::{ActionError, ConfigError, RegistryError, SimError};
use chartsim_core::registry::Registry;
use chartsim_core::rng::SimRng;
use chartsim_core::traits::TierLookup;
use chartsim_core::types::{
    ChartState, DeltaTag, Entity, EntityId, Group, GroupId, GroupProfile, HistoryEntry,
    MetricKind, Metrics, PromotionWindow, RankAnnotation, TierBound,
};
use chartsim_engine::{ChartRankEngine, PerformanceCalculator, PerformanceResult, TierResolver};
use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Serialize, Serializer};
use tokio::sync::broadcast;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::SimConfig;
use crate::scheduler::{DecayScheduler, TickReport, PASSIVE_METRIC};

/// Capacity of the event channel. Slow subscribers observe `Lagged`.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Observable facts published after each mutation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SimEvent {
    TickCompleted {
        timestamp: DateTime<Utc>,
        processed: usize,
        failed: usize,
        total_increment: u64,
    },
    ChartsRefreshed {
        timestamp: DateTime<Utc>,
        charted: usize,
    },
    PromotionStarted {
        entity: EntityId,
        end: DateTime<Utc>,
    },
    PromotionEnded {
        entity: EntityId,
    },
    /// Rank 1 on every configured platform at one evaluation.
    AllKill {
        entity: EntityId,
        timestamp: DateTime<Utc>,
    },
}

/// Result of one on-demand activity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionOutcome {
    pub entity: EntityId,
    pub activity: String,
    pub metric: MetricKind,
    pub tier: TierBound,
    pub result: PerformanceResult,
    /// Metric total after the result was added.
    pub new_total: u64,
}

/// One row of an entity's chart table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChartRow {
    pub platform: String,
    pub rank: Option<u32>,
    pub peak: Option<u32>,
    pub prev_rank: Option<u32>,
    #[serde(serialize_with = "as_display")]
    pub delta: DeltaTag,
}

impl ChartRow {
    fn new(platform: &str, state: ChartState) -> Self {
        Self {
            platform: platform.to_string(),
            rank: state.rank,
            peak: state.peak,
            prev_rank: state.prev_rank,
            delta: state.delta(),
        }
    }
}

fn as_display<T: fmt::Display, S: Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

/// Result of one chart pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChartPass {
    /// Entities whose promotion expired at the start of the pass.
    pub expired: Vec<EntityId>,
    /// Entity -> platform -> annotation, for every evaluated entity and
    /// every entity that dropped off a chart.
    pub annotations: BTreeMap<EntityId, BTreeMap<String, RankAnnotation>>,
    /// Entities holding a non-null rank on at least one platform.
    pub charted: usize,
    pub all_kills: Vec<EntityId>,
}

/// Result of [`Simulation::tick`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickOutcome {
    pub timestamp: DateTime<Utc>,
    pub expired: Vec<EntityId>,
    pub growth: TickReport,
    pub charts: Option<ChartPass>,
}

/// Serializable view of one entity.
#[derive(Debug, Clone, Serialize)]
pub struct EntityView {
    pub id: EntityId,
    pub name: String,
    pub group: GroupId,
    pub metrics: Metrics,
    pub promotion: Option<PromotionWindow>,
    pub charts: Vec<ChartRow>,
    pub history_len: usize,
    pub last_increment: Option<HistoryEntry>,
}

/// Serializable view of the whole simulation.
#[derive(Debug, Clone, Serialize)]
pub struct SimSnapshot {
    pub taken_at: DateTime<Utc>,
    pub groups: Vec<Group>,
    pub entities: Vec<EntityView>,
}

pub struct Simulation {
    registry: RwLock<Registry>,
    rng: Mutex<SimRng>,
    tiers: TierResolver,
    charts: ChartRankEngine,
    scheduler: DecayScheduler,
    calculator: PerformanceCalculator,
    events: broadcast::Sender<SimEvent>,
    config: SimConfig,
}

impl Simulation {
    /// Build from a configuration, seeding the RNG from `config.seed` or entropy.
    pub fn new(config: SimConfig) -> Result<Self, SimError> {
        let rng = config.seed.map_or_else(SimRng::from_entropy, SimRng::seeded);
        Self::with_rng(config, rng)
    }

    pub fn with_rng(config: SimConfig, rng: SimRng) -> Result<Self, SimError> {
        config.validate()?;
        let tiers = config.tier_resolver()?;
        let charts = config.chart_engine()?;
        let model = config.growth_model().map_err(ConfigError::from)?;
        let scheduler = DecayScheduler::new(model, config.history_cap);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            registry: RwLock::new(Registry::new()),
            rng: Mutex::new(rng),
            tiers,
            charts,
            scheduler,
            calculator: PerformanceCalculator::new(),
            events,
            config,
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn chart_engine(&self) -> &ChartRankEngine {
        &self.charts
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SimEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: SimEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }

    // --- Registry -------------------------------------------------------

    pub fn add_group(&self, name: impl Into<String>, profile: GroupProfile) -> Result<GroupId, SimError> {
        Ok(self.registry.write().add_group(name, profile)?)
    }

    /// Create an entity with a chart state for every configured platform.
    pub fn create_entity(
        &self,
        group: GroupId,
        name: impl Into<String>,
        released_at: DateTime<Utc>,
    ) -> Result<EntityId, SimError> {
        let id = self.registry.write().create_entity(
            group,
            name,
            released_at,
            &self.config.derivation,
            self.charts.platform_names(),
        )?;
        debug!(entity = %id, group = %group, "entity created");
        Ok(id)
    }

    pub fn set_group_active(&self, group: GroupId, active: bool) -> Result<(), SimError> {
        Ok(self.registry.write().set_group_active(group, active)?)
    }

    pub fn update_group_profile(&self, group: GroupId, profile: GroupProfile) -> Result<(), SimError> {
        Ok(self.registry.write().update_group_profile(group, profile)?)
    }

    pub fn rename_group(&self, group: GroupId, name: impl Into<String>) -> Result<(), SimError> {
        Ok(self.registry.write().rename_group(group, name)?)
    }

    pub fn rename_entity(&self, entity: EntityId, name: impl Into<String>) -> Result<(), SimError> {
        Ok(self.registry.write().rename_entity(entity, name)?)
    }

    /// Excluded entities receive no passive growth.
    pub fn set_excluded(&self, entity: EntityId, excluded: bool) -> Result<(), SimError> {
        let mut reg = self.registry.write();
        let e = reg
            .entity_mut(entity)
            .ok_or(RegistryError::UnknownEntity(entity))?;
        e.excluded = excluded;
        Ok(())
    }

    pub fn find_group(&self, name: &str) -> Option<GroupId> {
        self.registry.read().find_group(name)
    }

    pub fn find_entity(&self, name: &str) -> Option<EntityId> {
        self.registry.read().find_entity(name)
    }

    pub fn group(&self, id: GroupId) -> Option<Group> {
        self.registry.read().group(id).cloned()
    }

    pub fn entity(&self, id: EntityId) -> Option<Entity> {
        self.registry.read().entity(id).cloned()
    }

    pub fn entity_count(&self) -> usize {
        self.registry.read().entity_count()
    }

    /// Create every group and release listed in `config.roster`.
    ///
    /// Releases are dated `days_ago` before `now`. A release with
    /// `promotion_days` opens its window at `now`; within one group the last
    /// such release keeps its window.
    pub fn seed_roster(&self, now: DateTime<Utc>) -> Result<Vec<EntityId>, SimError> {
        let mut created = Vec::new();
        for seed in &self.config.roster {
            let group = self.add_group(seed.name.clone(), seed.profile())?;
            for release in &seed.releases {
                let released_at = now
                    .checked_sub_signed(Duration::days(i64::from(release.days_ago)))
                    .ok_or_else(|| {
                        ConfigError::Invalid(format!(
                            "release `{}`: days_ago {} predates the calendar",
                            release.name, release.days_ago
                        ))
                    })?;
                let id = self.create_entity(group, release.name.clone(), released_at)?;
                if release.promotion_days > 0 {
                    self.start_promotion(id, release.promotion_days, now)?;
                }
                created.push(id);
            }
            if !seed.active {
                self.set_group_active(group, false)?;
            }
        }
        info!(
            groups = self.config.roster.len(),
            entities = created.len(),
            "roster seeded"
        );
        Ok(created)
    }

    // --- On-demand actions ---------------------------------------------

    /// Run one activity for `entity` and add the result to the profile's metric.
    pub fn perform(&self, entity: EntityId, activity: &str) -> Result<ActionOutcome, ActionError> {
        let profile = self
            .config
            .activity(activity)
            .ok_or_else(|| ActionError::UnknownActivity(activity.to_string()))?;

        let mut reg = self.registry.write();
        let group = reg
            .entity(entity)
            .ok_or(ActionError::UnknownEntity(entity))?
            .group;
        let owner = reg
            .group(group)
            .ok_or(ActionError::MissingOwner { entity, group })?;
        if !owner.active {
            return Err(ActionError::OwnerInactive { entity, group });
        }

        let popularity = owner.popularity;
        let tier = self.tiers.resolve(popularity, activity);
        let baseline = profile.baseline(popularity);
        let result = {
            let mut rng = self.rng.lock();
            self.calculator
                .compute(baseline, &tier, &profile.inputs(), &mut *rng)?
        };

        let e = reg
            .entity_mut(entity)
            .ok_or(ActionError::UnknownEntity(entity))?;
        let new_total = e
            .metrics
            .checked_add(profile.metric, result.final_value)
            .ok_or(ActionError::MetricOverflow(entity))?;

        debug!(
            entity = %entity,
            activity,
            tier = %tier.tier,
            gained = result.final_value,
            viral = result.went_viral,
            "activity performed"
        );
        Ok(ActionOutcome {
            entity,
            activity: activity.to_ascii_lowercase(),
            metric: profile.metric,
            tier,
            result,
            new_total,
        })
    }

    // --- Promotions -----------------------------------------------------

    /// Open a `days`-long promotion window on `entity` starting at `now`.
    ///
    /// Any other promotion of the same group ends first. Chart state of every
    /// affected entity resets. `days == 0` ends the entity's promotion instead.
    pub fn start_promotion(
        &self,
        entity: EntityId,
        days: u32,
        now: DateTime<Utc>,
    ) -> Result<Option<PromotionWindow>, SimError> {
        if days == 0 {
            self.end_promotion(entity)?;
            return Ok(None);
        }

        let end = now
            .checked_add_signed(Duration::days(i64::from(days)))
            .ok_or(ActionError::PromotionTooLong { entity, days })?;
        let reset_peak = self.config.reset_peak_on_promotion_end;
        let mut ended = Vec::new();
        let window = {
            let mut reg = self.registry.write();
            let group = reg
                .entity(entity)
                .ok_or(RegistryError::UnknownEntity(entity))?
                .group;
            let owner = reg
                .group(group)
                .ok_or(ActionError::MissingOwner { entity, group })?;
            if !owner.active {
                return Err(ActionError::OwnerInactive { entity, group }.into());
            }

            let siblings: Vec<EntityId> = owner
                .entities
                .iter()
                .copied()
                .filter(|id| *id != entity)
                .collect();
            for id in siblings {
                if let Some(sibling) = reg.entity_mut(id) {
                    if sibling.promotion.take().is_some() {
                        sibling.reset_charts(reset_peak);
                        ended.push(id);
                    }
                }
            }

            let window = PromotionWindow { start: now, end };
            if let Some(e) = reg.entity_mut(entity) {
                e.promotion = Some(window);
                e.reset_charts(reset_peak);
            }
            window
        };

        info!(entity = %entity, days, end = %window.end, "promotion started");
        for id in ended {
            self.publish(SimEvent::PromotionEnded { entity: id });
        }
        self.publish(SimEvent::PromotionStarted {
            entity,
            end: window.end,
        });
        Ok(Some(window))
    }

    /// Close `entity`'s promotion and reset its chart state. Returns whether
    /// a window was open.
    pub fn end_promotion(&self, entity: EntityId) -> Result<bool, SimError> {
        let closed = {
            let mut reg = self.registry.write();
            let e = reg
                .entity_mut(entity)
                .ok_or(RegistryError::UnknownEntity(entity))?;
            let closed = e.promotion.take().is_some();
            e.reset_charts(self.config.reset_peak_on_promotion_end);
            closed
        };
        if closed {
            info!(entity = %entity, "promotion ended");
            self.publish(SimEvent::PromotionEnded { entity });
        }
        Ok(closed)
    }

    /// Close every window that ended before `now` and reset those entities' charts.
    pub fn expire_promotions(&self, now: DateTime<Utc>) -> Vec<EntityId> {
        let expired = self.expire_locked(&mut self.registry.write(), now);
        for id in &expired {
            self.publish(SimEvent::PromotionEnded { entity: *id });
        }
        expired
    }

    fn expire_locked(&self, reg: &mut Registry, now: DateTime<Utc>) -> Vec<EntityId> {
        let reset_peak = self.config.reset_peak_on_promotion_end;
        let mut expired = Vec::new();
        for entity in reg.entities_mut() {
            if entity.promotion.is_some_and(|w| w.is_expired_at(now)) {
                entity.promotion = None;
                entity.reset_charts(reset_peak);
                expired.push(entity.id);
            }
        }
        if !expired.is_empty() {
            info!(count = expired.len(), "promotions expired; chart state reset");
        }
        expired
    }

    // --- Scheduler and charts ------------------------------------------

    /// One passive-growth pass at `now`, followed by a chart pass when
    /// `rank_after_tick` is set. Expired promotions close first.
    pub fn tick(&self, now: DateTime<Utc>) -> TickOutcome {
        let outcome = {
            let mut reg = self.registry.write();
            let mut rng = self.rng.lock();
            let expired = self.expire_locked(&mut reg, now);
            let growth = self.scheduler.tick(&mut reg, &mut *rng, now);
            let charts = if self.config.rank_after_tick {
                Some(self.refresh_locked(&mut reg, &mut rng, now))
            } else {
                None
            };
            TickOutcome {
                timestamp: now,
                expired,
                growth,
                charts,
            }
        };

        for id in &outcome.expired {
            self.publish(SimEvent::PromotionEnded { entity: *id });
        }
        self.publish(SimEvent::TickCompleted {
            timestamp: now,
            processed: outcome.growth.processed,
            failed: outcome.growth.failed.len(),
            total_increment: outcome.growth.total_increment,
        });
        if let Some(pass) = &outcome.charts {
            self.publish_chart_pass(pass, now);
        }
        outcome
    }

    /// Rank every promoting entity of an active group on every platform.
    pub fn refresh_charts(&self, now: DateTime<Utc>) -> ChartPass {
        let pass = {
            let mut reg = self.registry.write();
            let mut rng = self.rng.lock();
            self.refresh_locked(&mut reg, &mut rng, now)
        };
        for id in &pass.expired {
            self.publish(SimEvent::PromotionEnded { entity: *id });
        }
        self.publish_chart_pass(&pass, now);
        pass
    }

    fn refresh_locked(&self, reg: &mut Registry, rng: &mut SimRng, now: DateTime<Utc>) -> ChartPass {
        let expired = self.expire_locked(reg, now);

        let eligible: Vec<(EntityId, u64)> = reg
            .entities()
            .filter(|e| e.has_active_promotion(now))
            .filter(|e| reg.group(e.group).is_some_and(|g| g.active))
            .map(|e| (e.id, e.metrics.get(PASSIVE_METRIC)))
            .collect();

        let mut annotations: BTreeMap<EntityId, BTreeMap<String, RankAnnotation>> = BTreeMap::new();
        for platform in self.charts.platforms() {
            let ranks = self.charts.resolve_ranks(platform, &eligible, rng);
            for (id, rank) in ranks {
                let Some(entity) = reg.entity_mut(id) else {
                    continue;
                };
                let annotation = self.charts.apply_and_annotate(entity, &platform.name, rank);
                annotations
                    .entry(id)
                    .or_default()
                    .insert(platform.name.clone(), annotation);
            }
        }

        // Anything no longer eligible drops off the chart it still sits on.
        let eligible_ids: HashSet<EntityId> = eligible.iter().map(|(id, _)| *id).collect();
        for entity in reg.entities_mut() {
            if eligible_ids.contains(&entity.id) {
                continue;
            }
            for platform in self.charts.platforms() {
                if entity.charts.get(&platform.name).is_some_and(|s| s.rank.is_some()) {
                    let annotation = self.charts.apply_and_annotate(entity, &platform.name, None);
                    annotations
                        .entry(entity.id)
                        .or_default()
                        .insert(platform.name.clone(), annotation);
                }
            }
        }

        let mut charted = 0;
        let mut all_kills = Vec::new();
        for (id, _) in &eligible {
            let Some(entity) = reg.entity(*id) else {
                continue;
            };
            if entity.charts.values().any(|s| s.rank.is_some()) {
                charted += 1;
            }
            if self.charts.is_all_kill(entity) {
                info!(entity = %id, name = %entity.name, "all-kill: rank 1 on every platform");
                all_kills.push(*id);
            }
        }

        debug!(eligible = eligible.len(), charted, "chart pass complete");
        ChartPass {
            expired,
            annotations,
            charted,
            all_kills,
        }
    }

    fn publish_chart_pass(&self, pass: &ChartPass, now: DateTime<Utc>) {
        self.publish(SimEvent::ChartsRefreshed {
            timestamp: now,
            charted: pass.charted,
        });
        for id in &pass.all_kills {
            self.publish(SimEvent::AllKill {
                entity: *id,
                timestamp: now,
            });
        }
    }

    // --- Outputs --------------------------------------------------------

    /// `{platform, rank, peak, prev_rank, delta}` per configured platform.
    pub fn chart_table(&self, entity: EntityId) -> Result<Vec<ChartRow>, RegistryError> {
        let reg = self.registry.read();
        let e = reg.entity(entity).ok_or(RegistryError::UnknownEntity(entity))?;
        Ok(self.chart_rows(e))
    }

    fn chart_rows(&self, entity: &Entity) -> Vec<ChartRow> {
        self.charts
            .platform_names()
            .map(|name| ChartRow::new(name, entity.charts.get(name).copied().unwrap_or_default()))
            .collect()
    }

    /// History log, most recent last.
    pub fn history(&self, entity: EntityId) -> Result<Vec<HistoryEntry>, RegistryError> {
        let reg = self.registry.read();
        let e = reg.entity(entity).ok_or(RegistryError::UnknownEntity(entity))?;
        Ok(e.history.iter().cloned().collect())
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> SimSnapshot {
        let reg = self.registry.read();
        SimSnapshot {
            taken_at: now,
            groups: reg.groups().cloned().collect(),
            entities: reg
                .entities()
                .map(|e| EntityView {
                    id: e.id,
                    name: e.name.clone(),
                    group: e.group,
                    metrics: e.metrics,
                    promotion: e.promotion,
                    charts: self.chart_rows(e),
                    history_len: e.history.len(),
                    last_increment: e.history.back().cloned(),
                })
                .collect(),
        }
    }

    // --- Driving --------------------------------------------------------

    /// Run `ticks` passes in virtual time, one interval apart, starting one
    /// interval after `start`. Returns the time of the last pass.
    pub fn fast_forward(&self, start: DateTime<Utc>, ticks: u32) -> DateTime<Utc> {
        let step = Duration::seconds(self.config.tick_interval_secs as i64);
        let mut now = start;
        for _ in 0..ticks {
            let Some(next) = now.checked_add_signed(step) else {
                warn!(%now, "virtual clock overflow; fast-forward stopped");
                break;
            };
            now = next;
            self.tick(now);
        }
        now
    }

    /// Tick on the wall clock forever. A pass runs to completion before the
    /// next one can start; late ticks are delayed, not bunched.
    pub async fn run(&self) {
        let period = self.config.tick_interval();
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = period.as_secs(), "simulation loop started");

        loop {
            interval.tick().await;
            self.tick(Utc::now());
        }
    }
}

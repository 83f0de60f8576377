//! Core simulation types: identifiers, entities, groups, chart state.
//!
//! Metric totals and ranks are whole numbers. Ranks are 1-based, lower is better.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{CHARTING_BEST_RANK, TOP50_WORST_RANK};
use crate::error::ChartError;

/// Stable surrogate key of an [`Entity`]. Display names are attributes, never keys.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0)
    }
}

/// Stable surrogate key of a [`Group`].
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(pub u64);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "G{}", self.0)
    }
}

/// Independent raw counters kept per entity.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Streams,
    Sales,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Streams => f.write_str("streams"),
            Self::Sales => f.write_str("sales"),
        }
    }
}

/// Raw metric totals of an entity.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Metrics {
    pub streams: u64,
    pub sales: u64,
}

impl Metrics {
    pub fn get(&self, kind: MetricKind) -> u64 {
        match kind {
            MetricKind::Streams => self.streams,
            MetricKind::Sales => self.sales,
        }
    }

    /// Add `amount` to the counter. Returns the new total, or `None` on overflow
    /// (in which case the counter is left untouched).
    pub fn checked_add(&mut self, kind: MetricKind, amount: u64) -> Option<u64> {
        let slot = match kind {
            MetricKind::Streams => &mut self.streams,
            MetricKind::Sales => &mut self.sales,
        };
        *slot = slot.checked_add(amount)?;
        Some(*slot)
    }
}

/// A closed sampling interval `[lo, hi]`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct SampleRange {
    pub lo: f64,
    pub hi: f64,
}

impl SampleRange {
    pub const fn new(lo: f64, hi: f64) -> Self {
        Self { lo, hi }
    }

    /// Degenerate range that always samples `value`.
    pub const fn fixed(value: f64) -> Self {
        Self { lo: value, hi: value }
    }

    /// Finite, non-negative and not inverted.
    pub fn is_valid(&self) -> bool {
        self.lo.is_finite() && self.hi.is_finite() && self.lo >= 0.0 && self.lo <= self.hi
    }
}

impl From<(f64, f64)> for SampleRange {
    fn from((lo, hi): (f64, f64)) -> Self {
        Self { lo, hi }
    }
}

/// Result of a tier lookup: the clamp envelope for one performance.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TierBound {
    pub floor: u64,
    pub cap: u64,
    pub tier: String,
}

/// One ranking venue: three stream thresholds and a rank capacity.
///
/// - `streams >= top10_threshold` ranks in `[1, 10]`
/// - `top50_threshold <= streams < top10_threshold` ranks in `[11, 50]`
/// - `charting_threshold <= streams < top50_threshold` ranks in `[51, max_rank]`
/// - below `charting_threshold` the entity does not chart
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PlatformConfig {
    pub name: String,
    pub charting_threshold: u64,
    pub top50_threshold: u64,
    pub top10_threshold: u64,
    pub max_rank: u32,
}

impl PlatformConfig {
    pub fn validate(&self) -> Result<(), ChartError> {
        if !(self.charting_threshold < self.top50_threshold
            && self.top50_threshold < self.top10_threshold)
        {
            return Err(ChartError::InvalidThresholds {
                platform: self.name.clone(),
            });
        }
        if self.max_rank < CHARTING_BEST_RANK {
            return Err(ChartError::InvalidCapacity {
                platform: self.name.clone(),
                max_rank: self.max_rank,
            });
        }
        Ok(())
    }

    /// The four default platforms. Capacities and thresholds differ per venue;
    /// the smaller venues chart with fewer streams but hold fewer entries.
    pub fn presets() -> Vec<PlatformConfig> {
        vec![
            Self::preset("MelOn", 50_000, 2_000_000, 8_000_000, 200),
            Self::preset("Genie", 40_000, 1_500_000, 6_000_000, 150),
            Self::preset("Bugs", 30_000, 1_000_000, 4_000_000, 100),
            Self::preset("FLO", 20_000, 800_000, 3_000_000, 80),
        ]
    }

    /// Compact venue with a 60-slot chart, charting on very few streams.
    pub fn compact(name: &str) -> PlatformConfig {
        Self::preset(name, 100, 2_000_000, 8_000_000, TOP50_WORST_RANK + 10)
    }

    fn preset(name: &str, charting: u64, top50: u64, top10: u64, max_rank: u32) -> Self {
        Self {
            name: name.to_string(),
            charting_threshold: charting,
            top50_threshold: top50,
            top10_threshold: top10,
            max_rank,
        }
    }
}

/// Movement of a rank between two evaluations.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeltaTag {
    /// First charting evaluation after not charting.
    New,
    /// Improved by this many places.
    Up(u32),
    /// Worsened by this many places.
    Down(u32),
    Same,
    /// Not charting at this evaluation.
    Unranked,
}

impl fmt::Display for DeltaTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => f.write_str("NEW"),
            Self::Up(d) => write!(f, "+{d}"),
            Self::Down(d) => write!(f, "-{d}"),
            Self::Same => f.write_str("="),
            Self::Unranked => f.write_str("N/A"),
        }
    }
}

/// Outcome of applying one evaluation to a [`ChartState`].
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct RankAnnotation {
    pub delta: DeltaTag,
    pub is_new_peak: bool,
}

/// Per-entity, per-platform chart record.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChartState {
    pub rank: Option<u32>,
    pub peak: Option<u32>,
    pub prev_rank: Option<u32>,
}

impl ChartState {
    /// Shift `rank` into `prev_rank`, store `new_rank` and fold it into `peak`.
    pub fn apply(&mut self, new_rank: Option<u32>) -> RankAnnotation {
        let old_peak = self.peak;
        self.prev_rank = self.rank;
        self.rank = new_rank;

        let mut is_new_peak = false;
        if let Some(rank) = new_rank {
            is_new_peak = old_peak.is_none_or(|p| rank < p);
            self.peak = Some(old_peak.map_or(rank, |p| p.min(rank)));
        }

        RankAnnotation {
            delta: self.delta(),
            is_new_peak,
        }
    }

    pub fn delta(&self) -> DeltaTag {
        match (self.prev_rank, self.rank) {
            (_, None) => DeltaTag::Unranked,
            (None, Some(_)) => DeltaTag::New,
            (Some(prev), Some(rank)) if prev > rank => DeltaTag::Up(prev - rank),
            (Some(prev), Some(rank)) if prev < rank => DeltaTag::Down(rank - prev),
            _ => DeltaTag::Same,
        }
    }

    /// Start a new promotion cycle. `peak` survives only when `reset_peak` is false.
    pub fn reset(&mut self, reset_peak: bool) {
        self.rank = None;
        self.prev_rank = None;
        if reset_peak {
            self.peak = None;
        }
    }
}

/// An active-promotion window, inclusive at both ends.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct PromotionWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl PromotionWindow {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.start <= now && now <= self.end
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.end
    }
}

/// Passive-growth attributes, fixed when the entity is created.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct SimAttributes {
    pub fan_base_core: u64,
    pub general_interest: u64,
    pub promo_power: u64,
    /// Per-tick probability of a virality spike, in `[0, 1]`.
    pub virality_potential: f64,
}

/// How a group's scores become a new entity's [`SimAttributes`].
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct DerivationParams {
    /// Share of the fan base that engages every tick.
    pub fan_share: f64,
    pub promo_power_per_popularity: f64,
    pub base_virality: f64,
    pub virality_per_popularity: f64,
    pub max_virality: f64,
}

impl Default for DerivationParams {
    fn default() -> Self {
        Self {
            fan_share: 0.01,
            promo_power_per_popularity: 0.1,
            base_virality: 0.01,
            virality_per_popularity: 0.000_02,
            max_virality: 0.15,
        }
    }
}

impl SimAttributes {
    pub fn derive(group: &Group, params: &DerivationParams) -> Self {
        let virality = params.base_virality
            + group.popularity as f64 * params.virality_per_popularity;
        Self {
            fan_base_core: (group.fan_base as f64 * params.fan_share).round() as u64,
            general_interest: group.general_interest,
            promo_power: (group.popularity as f64 * params.promo_power_per_popularity).round()
                as u64,
            virality_potential: virality.clamp(0.0, params.max_virality.clamp(0.0, 1.0)),
        }
    }
}

/// Per-component split of one passive-growth increment.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GrowthBreakdown {
    pub fanbase: u64,
    pub interest: u64,
    pub promo: u64,
    pub virality: u64,
}

impl GrowthBreakdown {
    /// Sum of organic components, excluding the virality spike.
    pub fn organic(&self) -> u64 {
        self.fanbase
            .saturating_add(self.interest)
            .saturating_add(self.promo)
    }

    pub fn total(&self) -> u64 {
        self.organic().saturating_add(self.virality)
    }
}

/// One scheduler increment recorded on an entity.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub increment: u64,
    pub breakdown: GrowthBreakdown,
    pub virality_triggered: bool,
}

/// Scores an external collaborator supplies for a group.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GroupProfile {
    pub popularity: u64,
    pub fan_base: u64,
    pub general_interest: u64,
}

/// Owner of entities. Holds only entity ids, never entity references.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub popularity: u64,
    pub fan_base: u64,
    pub general_interest: u64,
    pub active: bool,
    pub entities: Vec<EntityId>,
}

/// A trackable released work.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Entity {
    pub id: EntityId,
    pub group: GroupId,
    pub name: String,
    pub released_at: DateTime<Utc>,
    pub metrics: Metrics,
    /// Chart state keyed by platform name.
    pub charts: BTreeMap<String, ChartState>,
    pub promotion: Option<PromotionWindow>,
    pub attributes: SimAttributes,
    /// Most recent last.
    pub history: VecDeque<HistoryEntry>,
    /// Excluded entities receive no passive growth.
    pub excluded: bool,
}

impl Entity {
    /// Whole days since release, never negative.
    pub fn days_since_release(&self, now: DateTime<Utc>) -> u64 {
        (now - self.released_at).num_days().max(0) as u64
    }

    pub fn has_active_promotion(&self, now: DateTime<Utc>) -> bool {
        self.promotion.is_some_and(|w| w.is_active_at(now))
    }

    /// Append and evict oldest entries beyond `cap`.
    pub fn push_history(&mut self, entry: HistoryEntry, cap: usize) {
        self.history.push_back(entry);
        while self.history.len() > cap {
            self.history.pop_front();
        }
    }

    pub fn reset_charts(&mut self, reset_peak: bool) {
        for state in self.charts.values_mut() {
            state.reset(reset_peak);
        }
    }

    /// Rank 1 on every listed platform at the latest evaluation.
    pub fn is_number_one_on_all<'a>(&self, platforms: impl IntoIterator<Item = &'a str>) -> bool {
        let mut any = false;
        for name in platforms {
            any = true;
            if self.charts.get(name).and_then(|s| s.rank) != Some(1) {
                return false;
            }
        }
        any
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn entity() -> Entity {
        Entity {
            id: EntityId(1),
            group: GroupId(1),
            name: "First".into(),
            released_at: t0(),
            metrics: Metrics::default(),
            charts: BTreeMap::from([("A".to_string(), ChartState::default())]),
            promotion: None,
            attributes: SimAttributes {
                fan_base_core: 100,
                general_interest: 10,
                promo_power: 5,
                virality_potential: 0.0,
            },
            history: VecDeque::new(),
            excluded: false,
        }
    }

    fn entry(i: u64) -> HistoryEntry {
        HistoryEntry {
            timestamp: t0() + Duration::minutes(i as i64),
            increment: i,
            breakdown: GrowthBreakdown::default(),
            virality_triggered: false,
        }
    }

    #[test]
    fn delta_tags() {
        let mut s = ChartState::default();
        assert_eq!(s.apply(Some(20)).delta, DeltaTag::New);
        assert_eq!(s.apply(Some(15)).delta, DeltaTag::Up(5));
        assert_eq!(s.apply(Some(18)).delta, DeltaTag::Down(3));
        assert_eq!(s.apply(Some(18)).delta, DeltaTag::Same);
        assert_eq!(s.apply(None).delta, DeltaTag::Unranked);
        assert_eq!(s.apply(Some(30)).delta, DeltaTag::New);
    }

    #[test]
    fn delta_tag_display() {
        assert_eq!(DeltaTag::New.to_string(), "NEW");
        assert_eq!(DeltaTag::Up(4).to_string(), "+4");
        assert_eq!(DeltaTag::Down(2).to_string(), "-2");
        assert_eq!(DeltaTag::Same.to_string(), "=");
    }

    #[test]
    fn peak_only_improves() {
        let mut s = ChartState::default();
        assert!(s.apply(Some(40)).is_new_peak);
        assert!(s.apply(Some(12)).is_new_peak);
        assert!(!s.apply(Some(30)).is_new_peak);
        assert!(!s.apply(None).is_new_peak);
        assert_eq!(s.peak, Some(12));
        assert!(!s.apply(Some(12)).is_new_peak);
        assert!(s.apply(Some(3)).is_new_peak);
        assert_eq!(s.peak, Some(3));
    }

    #[test]
    fn reset_respects_peak_flag() {
        let mut s = ChartState {
            rank: Some(4),
            peak: Some(2),
            prev_rank: Some(5),
        };
        s.reset(false);
        assert_eq!(s, ChartState { rank: None, peak: Some(2), prev_rank: None });
        s.reset(true);
        assert_eq!(s, ChartState::default());
    }

    #[test]
    fn history_evicts_oldest_first() {
        let mut e = entity();
        for i in 0..10 {
            e.push_history(entry(i), 4);
        }
        let kept: Vec<u64> = e.history.iter().map(|h| h.increment).collect();
        assert_eq!(kept, vec![6, 7, 8, 9]);
    }

    #[test]
    fn history_shrinks_oversized_log() {
        let mut e = entity();
        for i in 0..10 {
            e.push_history(entry(i), 100);
        }
        e.push_history(entry(10), 3);
        assert_eq!(e.history.len(), 3);
        assert_eq!(e.history.back().map(|h| h.increment), Some(10));
    }

    #[test]
    fn days_since_release_never_negative() {
        let e = entity();
        assert_eq!(e.days_since_release(t0() - Duration::days(3)), 0);
        assert_eq!(e.days_since_release(t0() + Duration::hours(47)), 1);
        assert_eq!(e.days_since_release(t0() + Duration::days(30)), 30);
    }

    #[test]
    fn promotion_window_inclusive() {
        let w = PromotionWindow {
            start: t0(),
            end: t0() + Duration::days(7),
        };
        assert!(w.is_active_at(t0()));
        assert!(w.is_active_at(t0() + Duration::days(7)));
        assert!(!w.is_active_at(t0() + Duration::days(7) + Duration::seconds(1)));
        assert!(w.is_expired_at(t0() + Duration::days(8)));
        assert!(!w.is_expired_at(t0() + Duration::days(7)));
    }

    #[test]
    fn metrics_checked_add_leaves_total_on_overflow() {
        let mut m = Metrics {
            streams: u64::MAX - 1,
            sales: 0,
        };
        assert_eq!(m.checked_add(MetricKind::Streams, 5), None);
        assert_eq!(m.streams, u64::MAX - 1);
        assert_eq!(m.checked_add(MetricKind::Sales, 5), Some(5));
    }

    #[test]
    fn presets_are_valid() {
        for p in PlatformConfig::presets() {
            p.validate().unwrap();
        }
        PlatformConfig::compact("Compact").validate().unwrap();
    }

    #[test]
    fn platform_validation_rejects_bad_shapes() {
        let mut p = PlatformConfig::compact("X");
        p.top50_threshold = p.top10_threshold;
        assert!(matches!(p.validate(), Err(ChartError::InvalidThresholds { .. })));

        let mut p = PlatformConfig::compact("Y");
        p.max_rank = 50;
        assert!(matches!(p.validate(), Err(ChartError::InvalidCapacity { max_rank: 50, .. })));
    }

    #[test]
    fn derive_attributes_from_group() {
        let group = Group {
            id: GroupId(1),
            name: "G".into(),
            popularity: 500,
            fan_base: 200_000,
            general_interest: 80,
            active: true,
            entities: vec![],
        };
        let attrs = SimAttributes::derive(&group, &DerivationParams::default());
        assert_eq!(attrs.fan_base_core, 2_000);
        assert_eq!(attrs.general_interest, 80);
        assert_eq!(attrs.promo_power, 50);
        assert!((attrs.virality_potential - 0.02).abs() < 1e-9);
    }

    #[test]
    fn derived_virality_is_capped() {
        let group = Group {
            id: GroupId(1),
            name: "G".into(),
            popularity: 1_000_000,
            fan_base: 0,
            general_interest: 0,
            active: true,
            entities: vec![],
        };
        let attrs = SimAttributes::derive(&group, &DerivationParams::default());
        assert_eq!(attrs.virality_potential, 0.15);
    }

    #[test]
    fn number_one_on_all_requires_every_platform() {
        let mut e = entity();
        e.charts.insert("B".into(), ChartState::default());
        e.charts.get_mut("A").unwrap().apply(Some(1));
        assert!(!e.is_number_one_on_all(["A", "B"]));
        e.charts.get_mut("B").unwrap().apply(Some(1));
        assert!(e.is_number_one_on_all(["A", "B"]));
        assert!(!e.is_number_one_on_all(std::iter::empty::<&str>()));
    }

    #[test]
    fn entity_serializes() {
        let json = serde_json::to_string(&entity()).unwrap();
        assert!(json.contains("\"name\":\"First\""));
    }
}

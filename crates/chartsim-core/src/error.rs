//! Error types for the chartsim simulation.
//!
//! Capacity overflow on a chart and history overflow are not errors: the
//! former resolves to a not-charting rank, the latter to FIFO truncation.
use thiserror::Error;

use crate::types::{EntityId, GroupId};

/// Invalid tier breakpoint configuration. Raised at table construction, never at lookup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TierError {
    #[error("tier table `{kind}` is empty")] EmptyTable { kind: String },
    #[error("tier table `{kind}` defined twice")] DuplicateTable { kind: String },
    #[error("tier table `{kind}` entry {index}: cap {cap} < floor {floor}")] InvertedBound { kind: String, index: usize, floor: u64, cap: u64 },
    #[error("tier table `{kind}` entry {index}: breakpoints must be strictly increasing with a widening envelope")] NonMonotonic { kind: String, index: usize },
    #[error("tier table `{kind}` has no bracket starting at popularity 0")] MissingBaseBracket { kind: String },
    #[error("fallback tier: cap {cap} < floor {floor}")] InvertedFallback { floor: u64, cap: u64 },
    #[error("no fallback tier configured")] MissingFallback,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PerformanceError {
    #[error("invalid {name} range: [{lo}, {hi}]")] InvalidRange { name: &'static str, lo: f64, hi: f64 },
    #[error("probability out of [0, 1]: {0}")] InvalidProbability(f64),
    #[error("tier bound inverted: floor {floor} > cap {cap}")] InvertedBound { floor: u64, cap: u64 },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChartError {
    #[error("platform `{platform}`: thresholds must satisfy charting < top50 < top10")] InvalidThresholds { platform: String },
    #[error("platform `{platform}`: max rank {max_rank} leaves no charting band")] InvalidCapacity { platform: String, max_rank: u32 },
    #[error("duplicate platform: {0}")] DuplicatePlatform(String),
    #[error("no platforms configured")] NoPlatforms,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GrowthError {
    #[error("virality potential out of [0, 1]: {0}")] InvalidVirality(f64),
    #[error("invalid growth parameter {name}: {value}")] InvalidParameter { name: &'static str, value: f64 },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("unknown group: {0}")] UnknownGroup(GroupId),
    #[error("unknown entity: {0}")] UnknownEntity(EntityId),
    #[error("name already taken: {0}")] NameTaken(String),
}

/// Rejection of an on-demand action. Surfaces synchronously to the caller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ActionError {
    #[error("unknown entity: {0}")] UnknownEntity(EntityId),
    #[error("unknown activity: {0}")] UnknownActivity(String),
    #[error("owner group {group} of entity {entity} is inactive")] OwnerInactive { entity: EntityId, group: GroupId },
    #[error("owner group {group} of entity {entity} is missing")] MissingOwner { entity: EntityId, group: GroupId },
    #[error("metric overflow on entity {0}")] MetricOverflow(EntityId),
    #[error("promotion of {days} days on entity {entity} runs past the calendar")] PromotionTooLong { entity: EntityId, days: u32 },
    #[error(transparent)] Performance(#[from] PerformanceError),
}

/// Failure of a single entity during a scheduler tick. Logged and skipped.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TickError {
    #[error("owner group {group} of entity {entity} is missing")] MissingOwner { entity: EntityId, group: GroupId },
    #[error("metric overflow on entity {0}")] MetricOverflow(EntityId),
    #[error("entity {entity}: {source}")] Growth { entity: EntityId, source: GrowthError },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config load: {0}")] Load(String),
    #[error("invalid config: {0}")] Invalid(String),
    #[error(transparent)] Tier(#[from] TierError),
    #[error(transparent)] Chart(#[from] ChartError),
    #[error(transparent)] Growth(#[from] GrowthError),
}

#[derive(Error, Debug)]
pub enum SimError {
    #[error(transparent)] Config(#[from] ConfigError),
    #[error(transparent)] Registry(#[from] RegistryError),
    #[error(transparent)] Action(#[from] ActionError),
    #[error(transparent)] Tier(#[from] TierError),
    #[error(transparent)] Chart(#[from] ChartError),
}

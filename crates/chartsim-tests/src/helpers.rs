//! Shared test helpers for scenario and property tests.

use chartsim_core::rng::SimRng;
use chartsim_core::types::{EntityId, GroupId, GroupProfile, PlatformConfig, SampleRange};
use chartsim_runtime::{SimConfig, Simulation};
use chrono::{DateTime, Utc};

/// Fixed reference instant so history timestamps are reproducible.
pub fn t0() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap_or_default()
}

pub fn profile(popularity: u64, fan_base: u64, general_interest: u64) -> GroupProfile {
    GroupProfile {
        popularity,
        fan_base,
        general_interest,
    }
}

/// Default configuration on two compact platforms ("A", "B"), 60 slots each.
pub fn compact_config() -> SimConfig {
    SimConfig {
        platforms: vec![PlatformConfig::compact("A"), PlatformConfig::compact("B")],
        ..SimConfig::default()
    }
}

/// Same as [`compact_config`] with noiseless growth jitter, so ticks are
/// exact apart from virality.
pub fn quiet_config() -> SimConfig {
    let mut cfg = compact_config();
    cfg.growth.fanbase_jitter = SampleRange::fixed(1.0);
    cfg.growth.promo_jitter = SampleRange::fixed(1.0);
    cfg.derivation.base_virality = 0.0;
    cfg.derivation.virality_per_popularity = 0.0;
    cfg
}

pub fn seeded_sim(config: SimConfig, seed: u64) -> Simulation {
    match Simulation::with_rng(config, SimRng::seeded(seed)) {
        Ok(sim) => sim,
        Err(e) => panic!("test simulation rejected: {e}"),
    }
}

/// Add a group with `count` releases, all released at `t0()`.
pub fn group_with_releases(
    sim: &Simulation,
    name: &str,
    profile: GroupProfile,
    count: usize,
) -> (GroupId, Vec<EntityId>) {
    let group = match sim.add_group(name, profile) {
        Ok(g) => g,
        Err(e) => panic!("add_group {name}: {e}"),
    };
    let ids = (0..count)
        .map(|i| match sim.create_entity(group, format!("{name} #{i}"), t0()) {
            Ok(id) => id,
            Err(e) => panic!("create_entity {name} #{i}: {e}"),
        })
        .collect();
    (group, ids)
}

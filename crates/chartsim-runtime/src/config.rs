//! Simulation configuration.
//!
//! [`SimConfig`] layers an optional TOML file under `CHARTSIM_*` environment
//! variables. Nested keys use `__`, e.g. `CHARTSIM_GROWTH__DECAY_RATE=0.05`.
//! Every section has a default, so an empty or missing file is a valid
//! configuration. [`SimConfig::validate`] builds every table and engine once,
//! so bad tiers or platforms are reported at load time rather than mid-run.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chartsim_core::constants::{
    DEFAULT_HISTORY_CAP, DEFAULT_TICK_INTERVAL_SECS, MAX_TICK_INTERVAL_SECS,
};
use chartsim_core::error::{ChartError, ConfigError, GrowthError, TierError};
use chartsim_core::types::{DerivationParams, GroupProfile, MetricKind, PlatformConfig, SampleRange};
use chartsim_engine::performance::PerformanceInputs;
use chartsim_engine::tier::{default_fallback, default_tables};
use chartsim_engine::{ChartRankEngine, GrowthModel, GrowthParams, TierBreakpoint, TierResolver};
use serde::{Deserialize, Serialize};

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "CHARTSIM";

/// How an on-demand activity turns a group's popularity into a metric gain.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ActivityProfile {
    /// Metric the result is added to.
    pub metric: MetricKind,
    #[serde(default)]
    pub baseline_offset: u64,
    pub baseline_per_popularity: u64,
    pub variance: SampleRange,
    #[serde(default)]
    pub viral_chance: f64,
    pub viral_multiplier: SampleRange,
}

impl ActivityProfile {
    pub fn baseline(&self, popularity: u64) -> u64 {
        popularity
            .saturating_mul(self.baseline_per_popularity)
            .saturating_add(self.baseline_offset)
    }

    pub fn inputs(&self) -> PerformanceInputs {
        PerformanceInputs {
            variance: self.variance,
            viral_chance: self.viral_chance,
            viral_multiplier: self.viral_multiplier,
        }
    }
}

/// `streams` at 100 per popularity point and `sales` at 50.
pub fn default_activities() -> BTreeMap<String, ActivityProfile> {
    BTreeMap::from([
        (
            "streams".to_string(),
            ActivityProfile {
                metric: MetricKind::Streams,
                baseline_offset: 0,
                baseline_per_popularity: 100,
                variance: SampleRange::new(0.5, 1.5),
                viral_chance: 0.05,
                viral_multiplier: SampleRange::new(1.5, 3.0),
            },
        ),
        (
            "sales".to_string(),
            ActivityProfile {
                metric: MetricKind::Sales,
                baseline_offset: 0,
                baseline_per_popularity: 50,
                variance: SampleRange::new(0.7, 1.3),
                viral_chance: 0.03,
                viral_multiplier: SampleRange::new(1.5, 2.5),
            },
        ),
    ])
}

/// A release seeded at startup.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ReleaseSeed {
    pub name: String,
    /// Released this many days before startup.
    #[serde(default)]
    pub days_ago: u32,
    /// Open a promotion window of this many days at startup. 0 means none.
    #[serde(default)]
    pub promotion_days: u32,
}

/// A group seeded at startup with its releases.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct GroupSeed {
    pub name: String,
    #[serde(default)]
    pub popularity: u64,
    #[serde(default)]
    pub fan_base: u64,
    #[serde(default)]
    pub general_interest: u64,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub releases: Vec<ReleaseSeed>,
}

impl GroupSeed {
    pub fn profile(&self) -> GroupProfile {
        GroupProfile {
            popularity: self.popularity,
            fan_base: self.fan_base,
            general_interest: self.general_interest,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Configuration for a simulation instance.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct SimConfig {
    /// Wall-clock seconds between passive-growth ticks.
    pub tick_interval_secs: u64,
    /// Maximum history entries kept per entity.
    pub history_cap: usize,
    /// Run a chart pass after every tick.
    pub rank_after_tick: bool,
    /// Clear `peak` along with `rank` when a promotion cycle ends or restarts.
    pub reset_peak_on_promotion_end: bool,
    /// Fixed RNG seed. Entropy-seeded when absent.
    pub seed: Option<u64>,
    pub growth: GrowthParams,
    pub derivation: DerivationParams,
    pub platforms: Vec<PlatformConfig>,
    /// Activity kind -> profile. Kinds are matched ignoring ASCII case.
    pub activities: BTreeMap<String, ActivityProfile>,
    /// Activity kind -> tier breakpoints.
    pub tiers: BTreeMap<String, Vec<TierBreakpoint>>,
    /// Bound for activity kinds without a tier table.
    pub fallback_tier: Option<TierBreakpoint>,
    pub roster: Vec<GroupSeed>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: DEFAULT_TICK_INTERVAL_SECS,
            history_cap: DEFAULT_HISTORY_CAP,
            rank_after_tick: true,
            reset_peak_on_promotion_end: true,
            seed: None,
            growth: GrowthParams::default(),
            derivation: DerivationParams::default(),
            platforms: PlatformConfig::presets(),
            activities: default_activities(),
            tiers: default_tables().into_iter().collect(),
            fallback_tier: Some(default_fallback()),
            roster: Vec::new(),
        }
    }
}

impl SimConfig {
    /// `<config dir>/chartsim/chartsim.toml`.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("chartsim")
            .join("chartsim.toml")
    }

    /// Load from `path` (required) or the default path (optional), then
    /// apply `CHARTSIM_*` overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, Self::env_source())
    }

    /// [`load`](Self::load) with an explicit environment source.
    pub fn load_with_env(
        path: Option<&Path>,
        env: config::Environment,
    ) -> Result<Self, ConfigError> {
        let file = match path {
            Some(p) => config::File::from(p).required(true),
            None => config::File::from(Self::default_path()).required(false),
        };

        let cfg: SimConfig = config::Config::builder()
            .add_source(file)
            .add_source(env)
            .build()
            .map_err(|e| ConfigError::Load(e.to_string()))?
            .try_deserialize()
            .map_err(|e| ConfigError::Load(e.to_string()))?;

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn env_source() -> config::Environment {
        config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_secs == 0 || self.tick_interval_secs > MAX_TICK_INTERVAL_SECS {
            return Err(ConfigError::Invalid(format!(
                "tick_interval_secs must be in 1..={MAX_TICK_INTERVAL_SECS}, got {}",
                self.tick_interval_secs
            )));
        }
        if self.history_cap == 0 {
            return Err(ConfigError::Invalid("history_cap must be positive".into()));
        }

        let d = &self.derivation;
        for (name, value) in [
            ("fan_share", d.fan_share),
            ("promo_power_per_popularity", d.promo_power_per_popularity),
            ("base_virality", d.base_virality),
            ("virality_per_popularity", d.virality_per_popularity),
            ("max_virality", d.max_virality),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(format!("derivation.{name}: {value}")));
            }
        }

        for (kind, profile) in &self.activities {
            profile
                .inputs()
                .validate()
                .map_err(|e| ConfigError::Invalid(format!("activity `{kind}`: {e}")))?;
        }

        self.growth_model()?;
        self.tier_resolver()?;
        self.chart_engine()?;
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn tier_resolver(&self) -> Result<TierResolver, TierError> {
        TierResolver::from_breakpoints(
            self.tiers.iter().map(|(kind, bps)| (kind.as_str(), bps.clone())),
            self.fallback_tier.clone(),
        )
    }

    pub fn chart_engine(&self) -> Result<ChartRankEngine, ChartError> {
        ChartRankEngine::new(self.platforms.clone())
    }

    pub fn growth_model(&self) -> Result<GrowthModel, GrowthError> {
        GrowthModel::new(self.growth.clone())
    }

    /// Profile for `kind`, matched ignoring ASCII case.
    pub fn activity(&self, kind: &str) -> Option<&ActivityProfile> {
        self.activities.get(kind).or_else(|| {
            self.activities
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(kind))
                .map(|(_, p)| p)
        })
    }
}

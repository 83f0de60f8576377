//! Multi-platform chart ranking.
//!
//! One engine serves every platform; venues differ only by [`PlatformConfig`].
//!
//! Base ranks come from three interpolation bands, each scaled by a noise
//! factor drawn per entity per evaluation. Candidates are then sorted by
//! `(base_rank, -streams)` and walked in order: a taken slot pushes the
//! candidate to the next free one, and a candidate pushed past the platform's
//! capacity stops charting. Resolved ranks are therefore unique.

use std::collections::{BTreeMap, HashSet};

use chartsim_core::constants::{
    CHARTING_BEST_RANK, RANK_NOISE_MAX, RANK_NOISE_MIN, TOP10_BEST_RANK, TOP10_WORST_RANK,
    TOP50_BEST_RANK, TOP50_WORST_RANK,
};
use chartsim_core::error::ChartError;
use chartsim_core::traits::RandomSource;
use chartsim_core::types::{Entity, EntityId, PlatformConfig, RankAnnotation, SampleRange};
use tracing::debug;

#[derive(Debug, Clone, Copy)]
struct Candidate {
    id: EntityId,
    base: u32,
    streams: u64,
}

/// Rank resolver and chart-state annotator for a fixed set of platforms.
#[derive(Debug, Clone)]
pub struct ChartRankEngine {
    platforms: Vec<PlatformConfig>,
    noise: SampleRange,
}

impl ChartRankEngine {
    /// Validate and adopt `platforms`. Names must be unique.
    pub fn new(platforms: Vec<PlatformConfig>) -> Result<Self, ChartError> {
        if platforms.is_empty() {
            return Err(ChartError::NoPlatforms);
        }
        let mut seen = HashSet::new();
        for p in &platforms {
            p.validate()?;
            if !seen.insert(p.name.as_str()) {
                return Err(ChartError::DuplicatePlatform(p.name.clone()));
            }
        }
        Ok(Self {
            platforms,
            noise: SampleRange::new(RANK_NOISE_MIN, RANK_NOISE_MAX),
        })
    }

    /// Replace the per-entity noise range. `fixed(1.0)` makes ranking a pure
    /// function of streams.
    pub fn with_noise(mut self, noise: SampleRange) -> Self {
        self.noise = noise;
        self
    }

    pub fn platforms(&self) -> &[PlatformConfig] {
        &self.platforms
    }

    pub fn platform(&self, name: &str) -> Option<&PlatformConfig> {
        self.platforms.iter().find(|p| p.name == name)
    }

    pub fn platform_names(&self) -> impl Iterator<Item = &str> {
        self.platforms.iter().map(|p| p.name.as_str())
    }

    /// Uncontested rank for `streams` on `platform`, before collision resolution.
    pub fn base_rank(platform: &PlatformConfig, streams: u64, noise: f64) -> Option<u32> {
        if streams < platform.charting_threshold {
            return None;
        }
        let s = streams as f64;
        let top10 = platform.top10_threshold as f64;
        let top50 = platform.top50_threshold as f64;
        let charting = platform.charting_threshold as f64;

        let rank = if streams >= platform.top10_threshold {
            let ratio = s / top10;
            (11.0 - ratio * 2.0 * noise)
                .floor()
                .clamp(TOP10_BEST_RANK as f64, TOP10_WORST_RANK as f64)
        } else if streams >= platform.top50_threshold {
            let position = (s - top50) / (top10 - top50);
            let span = (TOP50_WORST_RANK - TOP50_BEST_RANK) as f64;
            (TOP50_BEST_RANK as f64 + (1.0 - position) * span * noise)
                .round()
                .clamp(TOP50_BEST_RANK as f64, TOP50_WORST_RANK as f64)
        } else {
            let position = (s - charting) / (top50 - charting);
            let span = (platform.max_rank - CHARTING_BEST_RANK) as f64;
            (CHARTING_BEST_RANK as f64 + (1.0 - position) * span * noise)
                .round()
                .clamp(CHARTING_BEST_RANK as f64, platform.max_rank as f64)
        };

        Some(rank as u32)
    }

    /// Resolve unique ranks for every `(id, streams)` entry on one platform.
    ///
    /// Every input id appears in the result; `None` means not charting,
    /// either below the charting threshold or pushed past capacity.
    pub fn resolve_ranks<R: RandomSource + ?Sized>(
        &self,
        platform: &PlatformConfig,
        entries: &[(EntityId, u64)],
        rng: &mut R,
    ) -> BTreeMap<EntityId, Option<u32>> {
        let mut resolved: BTreeMap<EntityId, Option<u32>> =
            entries.iter().map(|(id, _)| (*id, None)).collect();

        let mut candidates: Vec<Candidate> = entries
            .iter()
            .filter(|(_, streams)| *streams >= platform.charting_threshold)
            .filter_map(|&(id, streams)| {
                let noise = rng.uniform(self.noise.lo, self.noise.hi);
                Self::base_rank(platform, streams, noise).map(|base| Candidate { id, base, streams })
            })
            .collect();

        candidates.sort_by(|a, b| {
            a.base
                .cmp(&b.base)
                .then(b.streams.cmp(&a.streams))
                .then(a.id.cmp(&b.id))
        });

        let capacity = platform.max_rank as usize;
        let mut used = vec![false; capacity + 1];
        let mut overflow = 0usize;

        for c in candidates {
            let mut slot = c.base as usize;
            while slot <= capacity && used[slot] {
                slot += 1;
            }
            if slot > capacity {
                overflow += 1;
                continue;
            }
            used[slot] = true;
            resolved.insert(c.id, Some(slot as u32));
        }

        if overflow > 0 {
            debug!(
                platform = %platform.name,
                overflow,
                "chart capacity exceeded; excess entities not charting"
            );
        }

        resolved
    }

    /// Record `new_rank` on the entity's chart state for `platform`.
    pub fn apply_and_annotate(
        &self,
        entity: &mut Entity,
        platform: &str,
        new_rank: Option<u32>,
    ) -> RankAnnotation {
        entity
            .charts
            .entry(platform.to_string())
            .or_default()
            .apply(new_rank)
    }

    /// Rank 1 on every configured platform. The engine only reports it.
    pub fn is_all_kill(&self, entity: &Entity) -> bool {
        entity.is_number_one_on_all(self.platform_names())
    }
}

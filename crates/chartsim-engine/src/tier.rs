//! Popularity tier tables.
//!
//! Each activity kind owns a table of breakpoints sorted by minimum
//! popularity. A lookup picks the last breakpoint whose `min_popularity` does
//! not exceed the score. Tables are validated when built: the first bracket
//! starts at 0, brackets are strictly increasing, the floor/cap envelope only
//! widens, and every entry has `floor <= cap`. Lookups therefore never fail
//! and never return an inverted bound.

use std::collections::HashMap;

use chartsim_core::error::TierError;
use chartsim_core::traits::TierLookup;
use chartsim_core::types::TierBound;
use serde::{Deserialize, Serialize};

/// One bracket of a tier table.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TierBreakpoint {
    pub min_popularity: u64,
    pub floor: u64,
    pub cap: u64,
    pub tier: String,
}

impl TierBreakpoint {
    pub fn new(min_popularity: u64, floor: u64, cap: u64, tier: &str) -> Self {
        Self {
            min_popularity,
            floor,
            cap,
            tier: tier.to_string(),
        }
    }

    fn bound(&self) -> TierBound {
        TierBound {
            floor: self.floor,
            cap: self.cap,
            tier: self.tier.clone(),
        }
    }
}

/// Validated breakpoint table for one activity kind.
#[derive(Debug, Clone)]
pub struct TierTable {
    kind: String,
    breakpoints: Vec<TierBreakpoint>,
}

impl TierTable {
    pub fn new(kind: &str, breakpoints: Vec<TierBreakpoint>) -> Result<Self, TierError> {
        let kind = kind.to_ascii_lowercase();
        let Some(first) = breakpoints.first() else {
            return Err(TierError::EmptyTable { kind });
        };
        if first.min_popularity != 0 {
            return Err(TierError::MissingBaseBracket { kind });
        }

        for (index, bp) in breakpoints.iter().enumerate() {
            if bp.cap < bp.floor {
                return Err(TierError::InvertedBound {
                    kind,
                    index,
                    floor: bp.floor,
                    cap: bp.cap,
                });
            }
            if index > 0 {
                let prev = &breakpoints[index - 1];
                if bp.min_popularity <= prev.min_popularity
                    || bp.floor < prev.floor
                    || bp.cap < prev.cap
                {
                    return Err(TierError::NonMonotonic { kind, index });
                }
            }
        }

        Ok(Self { kind, breakpoints })
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn breakpoints(&self) -> &[TierBreakpoint] {
        &self.breakpoints
    }

    /// Bracket for `popularity`. Always exists because the first bracket starts at 0.
    pub fn lookup(&self, popularity: u64) -> &TierBreakpoint {
        let idx = self
            .breakpoints
            .partition_point(|bp| bp.min_popularity <= popularity);
        &self.breakpoints[idx.saturating_sub(1)]
    }
}

/// Tier tables for every configured activity kind plus a fallback bound.
#[derive(Debug, Clone)]
pub struct TierResolver {
    tables: HashMap<String, TierTable>,
    fallback: TierBound,
}

impl TierResolver {
    /// Build a resolver. A missing or inverted fallback is a configuration error.
    pub fn new(
        tables: impl IntoIterator<Item = TierTable>,
        fallback: Option<TierBreakpoint>,
    ) -> Result<Self, TierError> {
        let fallback = fallback.ok_or(TierError::MissingFallback)?;
        if fallback.cap < fallback.floor {
            return Err(TierError::InvertedFallback {
                floor: fallback.floor,
                cap: fallback.cap,
            });
        }

        let mut map = HashMap::new();
        for table in tables {
            let kind = table.kind.clone();
            if map.insert(kind.clone(), table).is_some() {
                return Err(TierError::DuplicateTable { kind });
            }
        }

        Ok(Self {
            tables: map,
            fallback: fallback.bound(),
        })
    }

    /// Build from raw `(kind, breakpoints)` pairs, validating each table.
    pub fn from_breakpoints<'a>(
        tables: impl IntoIterator<Item = (&'a str, Vec<TierBreakpoint>)>,
        fallback: Option<TierBreakpoint>,
    ) -> Result<Self, TierError> {
        let tables = tables
            .into_iter()
            .map(|(kind, bps)| TierTable::new(kind, bps))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(tables, fallback)
    }

    /// Resolver over [`default_tables`] and [`default_fallback`].
    pub fn standard() -> Result<Self, TierError> {
        Self::from_breakpoints(
            default_tables()
                .iter()
                .map(|(kind, bps)| (kind.as_str(), bps.clone())),
            Some(default_fallback()),
        )
    }

    pub fn has_table(&self, kind: &str) -> bool {
        self.table(kind).is_some()
    }

    pub fn fallback(&self) -> &TierBound {
        &self.fallback
    }

    fn table(&self, kind: &str) -> Option<&TierTable> {
        self.tables
            .get(kind)
            .or_else(|| self.tables.get(&kind.to_ascii_lowercase()))
    }
}

impl TierLookup for TierResolver {
    fn resolve(&self, popularity: u64, activity_kind: &str) -> TierBound {
        match self.table(activity_kind) {
            Some(table) => table.lookup(popularity).bound(),
            None => self.fallback.clone(),
        }
    }
}

/// Four popularity brackets per activity kind, each widening the envelope.
pub fn default_tables() -> Vec<(String, Vec<TierBreakpoint>)> {
    vec![
        (
            "streams".to_string(),
            vec![
                TierBreakpoint::new(0, 100, 15_000, "rookie"),
                TierBreakpoint::new(150, 2_000, 60_000, "rising"),
                TierBreakpoint::new(400, 10_000, 200_000, "established"),
                TierBreakpoint::new(800, 40_000, 600_000, "superstar"),
            ],
        ),
        (
            "sales".to_string(),
            vec![
                TierBreakpoint::new(0, 50, 7_500, "rookie"),
                TierBreakpoint::new(150, 1_000, 30_000, "rising"),
                TierBreakpoint::new(400, 5_000, 100_000, "established"),
                TierBreakpoint::new(800, 20_000, 300_000, "superstar"),
            ],
        ),
    ]
}

/// Bound used for activity kinds without a table.
pub fn default_fallback() -> TierBreakpoint {
    TierBreakpoint::new(0, 50, 10_000, "default")
}

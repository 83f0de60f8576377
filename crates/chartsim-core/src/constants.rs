//! Simulation constants. Metric totals are whole units (streams, copies sold).

/// Best rank inside the top-10 band.
pub const TOP10_BEST_RANK: u32 = 1;
/// Worst rank inside the top-10 band.
pub const TOP10_WORST_RANK: u32 = 10;
/// Best rank inside the top-50 band.
pub const TOP50_BEST_RANK: u32 = 11;
/// Worst rank inside the top-50 band.
pub const TOP50_WORST_RANK: u32 = 50;
/// Best rank inside the charting band. A platform's `max_rank` must reach it.
pub const CHARTING_BEST_RANK: u32 = 51;

/// Lower bound of the per-entity rank noise factor.
pub const RANK_NOISE_MIN: f64 = 0.9;
/// Upper bound of the per-entity rank noise factor.
pub const RANK_NOISE_MAX: f64 = 1.1;

/// A viral performance result may exceed the tier cap, but never this multiple of it.
pub const VIRAL_CEILING_FACTOR: u64 = 2;

/// Per-day decay rate of the general-public interest contribution.
pub const DEFAULT_DECAY_RATE: f64 = 0.08;
/// Weight applied to general interest before decay.
pub const DEFAULT_GP_WEIGHT: f64 = 120.0;
/// Weight applied to promotion power while a promotion window is open.
pub const DEFAULT_PROMO_WEIGHT: f64 = 150.0;

/// Jitter applied to the fan-base component each tick.
pub const FANBASE_JITTER: (f64, f64) = (0.8, 1.15);
/// Jitter applied to the promotion component each tick.
pub const PROMO_JITTER: (f64, f64) = (0.8, 1.2);
/// Multiplier range of a virality spike relative to the tick's organic growth.
pub const SPIKE_RANGE: (f64, f64) = (0.5, 2.0);
/// Minimum virality spike cap regardless of fan base.
pub const SPIKE_CAP_FLOOR: u64 = 5_000;
/// Virality spike cap per unit of fan-base core.
pub const SPIKE_CAP_PER_FAN: u64 = 20;

/// Default number of history entries retained per entity.
///
/// At the default tick interval this is a rolling 24-hour window.
pub const DEFAULT_HISTORY_CAP: usize = 96;
/// Default wall-clock interval between scheduler ticks, in seconds.
pub const DEFAULT_TICK_INTERVAL_SECS: u64 = 15 * 60;
/// Longest accepted tick interval, in seconds (one week).
pub const MAX_TICK_INTERVAL_SECS: u64 = 7 * 24 * 60 * 60;

//! Ban-duration policy.
//!
//! Repeat offenders are banned for exponentially longer each time they come
//! back: the duration grows with the number of block events, not with
//! elapsed time, and is capped by a maximum.

use std::time::Duration;

/// Default first-offense ban (3 minutes)
pub const DEFAULT_BASE: Duration = Duration::from_secs(3 * 60);

/// Default growth factor per additional block event
pub const DEFAULT_FACTOR: u32 = 24;

/// Default ceiling (5 weeks)
pub const DEFAULT_MAX: Duration = Duration::from_secs(5 * 7 * 24 * 60 * 60);

/// Ban-duration settings, mirroring the registry configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BanPolicy {
    /// Duration of the first ban
    pub base: Duration,
    /// Whether repeat offenses grow the ban
    pub increment: bool,
    /// Multiplier per additional block event
    pub factor: u32,
    /// Upper bound for any ban
    pub max: Duration,
}

impl Default for BanPolicy {
    fn default() -> Self {
        Self {
            base: DEFAULT_BASE,
            increment: true,
            factor: DEFAULT_FACTOR,
            max: DEFAULT_MAX,
        }
    }
}

impl BanPolicy {
    /// Ban duration for the given cumulative block count
    #[must_use]
    pub fn duration_for(&self, block_count: u32) -> Duration {
        compute_block_duration(block_count, self.base, self.increment, self.factor, self.max)
    }
}

/// Compute the ban duration for an IP's `block_count`-th block event.
///
/// Returns `base` when increments are disabled, otherwise
/// `min(base * factor^(block_count - 1), max_duration)`. A count of 0 is
/// treated as 1. Overflowing intermediate values saturate to `max_duration`.
#[must_use]
pub fn compute_block_duration(
    block_count: u32,
    base: Duration,
    increment_enabled: bool,
    factor: u32,
    max_duration: Duration,
) -> Duration {
    if !increment_enabled {
        return base;
    }

    let exponent = block_count.max(1) - 1;
    factor
        .checked_pow(exponent)
        .and_then(|multiplier| base.checked_mul(multiplier))
        .map_or(max_duration, |duration| duration.min(max_duration))
}

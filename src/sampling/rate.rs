/*!
 * Rate Decision
 * Importance score -> sampling probability, then global volume limiting
 */

use crate::core::limits::{
    HIGH_IMPORTANCE_SCORE, LOW_TIER_MAX_RATE, LOW_TIER_SLOPE, MEDIUM_IMPORTANCE_SCORE,
    MEDIUM_TIER_BASE_RATE, MEDIUM_TIER_SLOPE, VOLUME_HEADROOM,
};

/// Tiered mapping of an importance score to a probability
///
/// - score > 0.7: 1.0
/// - 0.3 < score <= 0.7: 0.5 + (score - 0.3) * 1.25
/// - score <= 0.3: max(min_rate, score * 1.67), capped at 0.5
#[inline]
pub fn tier_rate(score: f64, min_rate: f64) -> f64 {
    if score > HIGH_IMPORTANCE_SCORE {
        1.0
    } else if score > MEDIUM_IMPORTANCE_SCORE {
        MEDIUM_TIER_BASE_RATE + (score - MEDIUM_IMPORTANCE_SCORE) * MEDIUM_TIER_SLOPE
    } else {
        (score * LOW_TIER_SLOPE).max(min_rate).min(LOW_TIER_MAX_RATE)
    }
}

/// Global emission budget
#[derive(Debug, Clone, Copy)]
pub struct VolumeLimiter {
    max_records_per_second: f64,
}

impl VolumeLimiter {
    pub fn new(max_records_per_second: u64) -> Self {
        Self {
            max_records_per_second: max_records_per_second as f64,
        }
    }

    /// Volume at which limiting starts
    #[inline]
    pub fn threshold(&self) -> f64 {
        self.max_records_per_second * VOLUME_HEADROOM
    }

    /// Multiplier applied to every proposed rate at the given volume
    #[inline]
    pub fn factor(&self, volume: f64) -> f64 {
        if volume < self.threshold() || volume <= 0.0 {
            1.0
        } else {
            (self.max_records_per_second / volume * VOLUME_HEADROOM).min(1.0)
        }
    }

    #[inline]
    pub fn apply(&self, proposed: f64, volume: f64) -> f64 {
        proposed * self.factor(volume)
    }
}

/// Outcome of one rate decision
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateDecision {
    /// Probability the caller should sample at
    pub rate: f64,
    /// Tier rate before volume limiting
    pub demand: f64,
    pub score: f64,
    /// Estimated demand volume the limiter saw
    pub volume: f64,
    pub limited: bool,
}

/// Combines the tier mapping, the limiter and the rate bounds
#[derive(Debug, Clone, Copy)]
pub struct RateDecider {
    min_rate: f64,
    limiter: VolumeLimiter,
}

impl RateDecider {
    pub fn new(min_rate: f64, max_records_per_second: u64) -> Self {
        Self {
            min_rate,
            limiter: VolumeLimiter::new(max_records_per_second),
        }
    }

    #[inline]
    pub fn min_rate(&self) -> f64 {
        self.min_rate
    }

    #[inline]
    pub fn limiter(&self) -> &VolumeLimiter {
        &self.limiter
    }

    /// Demand rate for a score; failures always demand full capture
    #[inline]
    pub fn demand(&self, score: f64, had_error: bool) -> f64 {
        if had_error {
            1.0
        } else {
            tier_rate(score, self.min_rate)
        }
    }

    /// Decide the final probability given the current demand volume
    pub fn decide(&self, score: f64, had_error: bool, volume: f64) -> RateDecision {
        let demand = self.demand(score, had_error);
        if had_error {
            return RateDecision {
                rate: 1.0,
                demand,
                score,
                volume,
                limited: false,
            };
        }

        let factor = self.limiter.factor(volume);
        let rate = (demand * factor).clamp(self.min_rate, 1.0);
        RateDecision {
            rate,
            demand,
            score,
            volume,
            limited: factor < 1.0,
        }
    }
}

/*!
 * Adaptive Importance Sampler
 * Per-operation sampling probabilities under a global emission budget
 *
 * Strategy: score every execution from its running profile, map the score to
 * a tier rate (the operation's demand), then scale demand down when the
 * estimated aggregate volume approaches the budget
 */

use super::rate::{RateDecider, RateDecision};
use super::scoring::ImportanceScorer;
use super::stats::{OperationStats, StatsTracker};
use crate::config::SamplerConfig;
use crate::core::{OperationId, QueryMetrics, SharedClock};
use ahash::RandomState;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleDecision {
    Accept,
    Reject,
}

impl SampleDecision {
    #[inline]
    pub fn is_accept(self) -> bool {
        matches!(self, Self::Accept)
    }
}

/// Current rate of one operation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateEntry {
    /// Probability after global limiting
    pub rate: f64,
    /// Tier rate before global limiting
    pub demand: f64,
}

/// Profile plus rate, the unit exported to shared state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationSnapshot {
    pub stats: OperationStats,
    pub sample_rate: f64,
    #[serde(default)]
    pub demand_rate: f64,
}

pub struct AdaptiveSampler {
    tracker: StatsTracker,
    scorer: ImportanceScorer,
    decider: RateDecider,
    rates: RwLock<HashMap<OperationId, RateEntry, RandomState>>,
}

impl AdaptiveSampler {
    pub fn new(config: &SamplerConfig, clock: SharedClock) -> Self {
        Self {
            tracker: StatsTracker::new(clock),
            scorer: ImportanceScorer::new(config.high_cost_threshold_ms),
            decider: RateDecider::new(config.min_sample_rate, config.max_records_per_second),
            rates: RwLock::new(HashMap::with_hasher(RandomState::new())),
        }
    }

    /// Observe one execution and return the probability it should be kept at
    pub fn calculate_sample_rate(&self, operation_id: &str, metrics: &QueryMetrics) -> f64 {
        self.decide(operation_id, metrics).rate
    }

    /// Observe one execution and return the full decision
    pub fn decide(&self, operation_id: &str, metrics: &QueryMetrics) -> RateDecision {
        let stats = self.tracker.observe_scored(
            operation_id,
            metrics.duration_ms,
            metrics.has_error,
            metrics.is_critical,
            metrics.observed_at,
            |s| self.scorer.score(s, metrics),
        );

        let score = stats.importance_score;
        let demand = self.decider.demand(score, metrics.has_error);

        // Lock order is rates, then stats; nothing takes them the other way
        let mut rates = self.rates.write();
        let mut volume = 0.0;
        self.tracker.for_each(|s| {
            let d = if s.operation_id.as_str() == operation_id {
                demand
            } else {
                rates
                    .get(s.operation_id.as_str())
                    .map(|e| e.demand)
                    .unwrap_or_else(|| self.decider.demand(s.importance_score, false))
            };
            volume += s.executions_per_second() * d;
        });

        let decision = self.decider.decide(score, metrics.has_error, volume);
        rates.insert(
            OperationId::from(operation_id),
            RateEntry {
                rate: decision.rate,
                demand: decision.demand,
            },
        );
        drop(rates);

        if decision.limited {
            trace!(
                operation = %operation_id,
                score = decision.score,
                demand = decision.demand,
                rate = decision.rate,
                volume = decision.volume,
                "Sample rate limited by global volume"
            );
        }
        decision
    }

    /// Random draw against a probability
    #[inline]
    pub fn should_sample(&self, rate: f64) -> SampleDecision {
        if rate >= 1.0 {
            return SampleDecision::Accept;
        }
        if rate <= 0.0 {
            return SampleDecision::Reject;
        }
        // 53 high bits give a uniform f64 in [0, 1)
        let draw = (fast_random() >> 11) as f64 / (1u64 << 53) as f64;
        if draw < rate {
            SampleDecision::Accept
        } else {
            SampleDecision::Reject
        }
    }

    /// Last computed rate of an operation
    pub fn sample_rate(&self, operation_id: &str) -> Option<f64> {
        self.rates.read().get(operation_id).map(|e| e.rate)
    }

    pub fn rate_entry(&self, operation_id: &str) -> Option<RateEntry> {
        self.rates.read().get(operation_id).copied()
    }

    pub fn stats(&self, operation_id: &str) -> Option<OperationStats> {
        self.tracker.get(operation_id)
    }

    /// Estimated records per second actually emitted at current rates
    pub fn estimated_volume(&self) -> f64 {
        self.weighted_volume(|e| e.rate)
    }

    /// Estimated records per second the operations ask for before limiting
    pub fn demand_volume(&self) -> f64 {
        self.weighted_volume(|e| e.demand)
    }

    fn weighted_volume(&self, pick: impl Fn(&RateEntry) -> f64) -> f64 {
        let rates = self.rates.read();
        let mut volume = 0.0;
        self.tracker.for_each(|s| {
            let r = rates
                .get(s.operation_id.as_str())
                .map(&pick)
                .unwrap_or_else(|| self.decider.demand(s.importance_score, false));
            volume += s.executions_per_second() * r;
        });
        volume
    }

    /// Every profile with its current rates
    pub fn export(&self) -> Vec<OperationSnapshot> {
        let profiles = self.tracker.snapshot();
        let rates = self.rates.read();
        profiles
            .into_iter()
            .map(|stats| {
                let entry = rates.get(stats.operation_id.as_str()).copied();
                let fallback = self.decider.demand(stats.importance_score, false);
                OperationSnapshot {
                    sample_rate: entry.map(|e| e.rate).unwrap_or(fallback),
                    demand_rate: entry.map(|e| e.demand).unwrap_or(fallback),
                    stats,
                }
            })
            .collect()
    }

    /// Merge a snapshot loaded from shared state; returns whether it was taken
    pub fn restore(&self, snapshot: OperationSnapshot) -> bool {
        let id = snapshot.stats.operation_id.clone();
        if !self.tracker.restore(snapshot.stats) {
            return false;
        }

        let min = self.decider.min_rate();
        let demand = if snapshot.demand_rate > 0.0 {
            snapshot.demand_rate
        } else {
            snapshot.sample_rate
        };
        self.rates.write().insert(
            id,
            RateEntry {
                rate: snapshot.sample_rate.clamp(min, 1.0),
                demand: demand.clamp(min, 1.0),
            },
        );
        true
    }

    /// Forget operations idle for longer than `max_idle`
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let evicted = self.tracker.evict_idle(max_idle);
        if !evicted.is_empty() {
            let mut rates = self.rates.write();
            for id in &evicted {
                rates.remove(id.as_str());
            }
            debug!(count = evicted.len(), "Evicted idle sampling state");
        }
        evicted.len()
    }

    pub fn min_sample_rate(&self) -> f64 {
        self.decider.min_rate()
    }

    pub fn len(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracker.is_empty()
    }
}

impl std::fmt::Debug for AdaptiveSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveSampler")
            .field("operations", &self.tracker.len())
            .field("min_sample_rate", &self.decider.min_rate())
            .finish()
    }
}

/// Fast random number generator (xorshift)
#[inline]
fn fast_random() -> u64 {
    thread_local! {
        static STATE: std::cell::Cell<u64> = std::cell::Cell::new(
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or(std::time::Duration::from_nanos(1))
                .as_nanos() as u64
                | 1
        );
    }

    STATE.with(|state| {
        let mut x = state.get();
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        state.set(x);
        x
    })
}

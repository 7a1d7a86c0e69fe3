/*!
 * Query Statistics
 * Running per-operation profile using streaming algorithms
 *
 * Strategy: Track running duration statistics (mean, variance) with
 * Welford's online update so no execution history is stored
 */

use crate::core::limits::MIN_RATE_WINDOW;
use crate::core::time::elapsed_between;
use crate::core::{OperationId, SharedClock};
use ahash::RandomState;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, TimestampSecondsWithFrac};
use std::collections::HashMap;
use std::time::{Duration, SystemTime};
use tracing::debug;

/// Statistical profile of one operation
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationStats {
    pub operation_id: OperationId,
    pub execution_count: u64,
    /// Sum of durations in milliseconds
    pub total_duration: f64,
    pub mean_duration: f64,
    /// Sample standard deviation of durations
    pub std_dev_duration: f64,
    pub error_rate: f64,
    #[serde_as(as = "TimestampSecondsWithFrac<f64>")]
    pub first_seen: SystemTime,
    #[serde_as(as = "TimestampSecondsWithFrac<f64>")]
    pub last_seen: SystemTime,
    pub importance_score: f64,
    /// Criticality flag of the most recent observation
    #[serde(default)]
    pub critical: bool,
    /// Sum of squared deviations (Welford)
    #[serde(default)]
    m2: f64,
}

impl OperationStats {
    pub fn new(operation_id: impl Into<OperationId>, now: SystemTime) -> Self {
        Self {
            operation_id: operation_id.into(),
            execution_count: 0,
            total_duration: 0.0,
            mean_duration: 0.0,
            std_dev_duration: 0.0,
            error_rate: 0.0,
            first_seen: now,
            last_seen: now,
            importance_score: 0.0,
            critical: false,
            m2: 0.0,
        }
    }

    /// Fold one execution into the profile (Welford's online algorithm)
    pub fn record(&mut self, duration_ms: f64, had_error: bool, is_critical: bool, now: SystemTime) {
        self.execution_count += 1;
        let n = self.execution_count as f64;

        self.total_duration += duration_ms;
        let delta = duration_ms - self.mean_duration;
        self.mean_duration += delta / n;
        let delta2 = duration_ms - self.mean_duration;
        self.m2 += delta * delta2;
        self.std_dev_duration = self.variance().sqrt();

        let hit = if had_error { 1.0 } else { 0.0 };
        self.error_rate = (self.error_rate * (n - 1.0) + hit) / n;

        self.critical = is_critical;
        // Reports may arrive out of order; the window only ever widens
        if now > self.last_seen {
            self.last_seen = now;
        }
        if now < self.first_seen {
            self.first_seen = now;
        }
    }

    /// Sample variance (n - 1 denominator), zero below two observations
    pub fn variance(&self) -> f64 {
        if self.execution_count < 2 {
            0.0
        } else {
            self.m2 / (self.execution_count - 1) as f64
        }
    }

    /// Standard deviation over mean, zero when the mean is zero
    pub fn coefficient_of_variation(&self) -> f64 {
        if self.mean_duration > 0.0 {
            self.std_dev_duration / self.mean_duration
        } else {
            0.0
        }
    }

    /// Average executions per second over the observed lifetime
    pub fn executions_per_second(&self) -> f64 {
        let window = elapsed_between(self.first_seen, self.last_seen).max(MIN_RATE_WINDOW);
        self.execution_count as f64 / window.as_secs_f64()
    }

    /// Rebuild the Welford accumulator from exported aggregates
    fn rehydrate(&mut self) {
        if self.m2 == 0.0 && self.execution_count > 1 {
            self.m2 = self.std_dev_duration.powi(2) * (self.execution_count - 1) as f64;
        }
        if self.total_duration == 0.0 {
            self.total_duration = self.mean_duration * self.execution_count as f64;
        }
    }
}

/// Per-operation statistics store
#[derive(Debug)]
pub struct StatsTracker {
    stats: RwLock<HashMap<OperationId, OperationStats, RandomState>>,
    clock: SharedClock,
}

impl StatsTracker {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            stats: RwLock::new(HashMap::with_hasher(RandomState::new())),
            clock,
        }
    }

    /// Record one execution, creating the profile on first sight
    pub fn observe(
        &self,
        operation_id: &str,
        duration_ms: f64,
        had_error: bool,
        is_critical: bool,
    ) -> OperationStats {
        self.observe_scored(operation_id, duration_ms, had_error, is_critical, None, |s| {
            s.importance_score
        })
    }

    /// Record one execution and store the score computed from the updated profile
    ///
    /// `at` is the execution's completion time; the clock is read when absent.
    pub fn observe_scored<F>(
        &self,
        operation_id: &str,
        duration_ms: f64,
        had_error: bool,
        is_critical: bool,
        at: Option<SystemTime>,
        score: F,
    ) -> OperationStats
    where
        F: FnOnce(&OperationStats) -> f64,
    {
        let now = at.unwrap_or_else(|| self.clock.now());
        let mut stats = self.stats.write();
        let entry = stats
            .entry(OperationId::from(operation_id))
            .or_insert_with(|| OperationStats::new(operation_id, now));

        entry.record(duration_ms, had_error, is_critical, now);
        entry.importance_score = score(entry);
        entry.clone()
    }

    pub fn get(&self, operation_id: &str) -> Option<OperationStats> {
        self.stats.read().get(operation_id).cloned()
    }

    /// Visit every profile under one read lock
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&OperationStats),
    {
        for stats in self.stats.read().values() {
            f(stats);
        }
    }

    pub fn snapshot(&self) -> Vec<OperationStats> {
        self.stats.read().values().cloned().collect()
    }

    /// Merge a profile loaded from shared state
    ///
    /// The profile with more executions wins, so a reload never rolls back
    /// a busier local history. Returns whether the remote profile was taken.
    pub fn restore(&self, mut remote: OperationStats) -> bool {
        remote.rehydrate();
        let mut stats = self.stats.write();
        match stats.get(remote.operation_id.as_str()) {
            Some(local) if local.execution_count >= remote.execution_count => false,
            _ => {
                stats.insert(remote.operation_id.clone(), remote);
                true
            }
        }
    }

    /// Drop profiles not seen for `max_idle`; returns the evicted ids
    pub fn evict_idle(&self, max_idle: Duration) -> Vec<OperationId> {
        let now = self.clock.now();
        let mut evicted = Vec::new();
        self.stats.write().retain(|id, s| {
            let keep = elapsed_between(s.last_seen, now) <= max_idle;
            if !keep {
                evicted.push(id.clone());
            }
            keep
        });
        if !evicted.is_empty() {
            debug!(count = evicted.len(), "Evicted idle operation statistics");
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.stats.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.read().is_empty()
    }
}

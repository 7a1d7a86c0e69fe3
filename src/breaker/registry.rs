/*!
 * Disabled-Operation Registry
 * Time-bounded suppression list for operations whose backend lacks a feature
 *
 * Repeat disables escalate linearly: the n-th disable of a still-registered
 * operation suppresses it for `backoff * n` from that moment. A success
 * removes the record immediately.
 */

use crate::core::time::elapsed_between;
use crate::core::{FeatureName, OperationId, SharedClock};
use ahash::RandomState;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, TimestampSeconds};
use std::collections::HashMap;
use std::time::{Duration, SystemTime};
use time::OffsetDateTime;
use tracing::{info, warn};

/// Suppression record for one operation
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisabledOperation {
    pub operation_id: OperationId,
    pub feature: FeatureName,
    #[serde_as(as = "TimestampSeconds<i64>")]
    pub first_disabled_at: SystemTime,
    /// Time of the most recent disable
    #[serde_as(as = "TimestampSeconds<i64>")]
    pub disabled_at: SystemTime,
    #[serde_as(as = "TimestampSeconds<i64>")]
    pub reenable_at: SystemTime,
    pub last_error_message: String,
    pub attempts: u32,
}

impl DisabledOperation {
    /// Whether the suppression window is still open at `now`
    #[inline]
    pub fn is_active(&self, now: SystemTime) -> bool {
        now < self.reenable_at
    }

    /// Time left until the operation may be attempted again
    pub fn remaining(&self, now: SystemTime) -> Duration {
        elapsed_between(now, self.reenable_at)
    }
}

/// Registry of disabled operations, keyed by operation id
#[derive(Debug)]
pub struct DisabledRegistry {
    entries: RwLock<HashMap<OperationId, DisabledOperation, RandomState>>,
    clock: SharedClock,
}

impl DisabledRegistry {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            entries: RwLock::new(HashMap::with_hasher(RandomState::new())),
            clock,
        }
    }

    /// Disable an operation, escalating if it is already registered
    ///
    /// The whole read-modify-write happens under the write lock, so a second
    /// concurrent disable escalates from the first one's record.
    pub fn mark_disabled(
        &self,
        operation_id: &str,
        feature: &str,
        backoff: Duration,
        error_message: &str,
    ) -> DisabledOperation {
        let now = self.clock.now();
        let mut entries = self.entries.write();

        let record = entries
            .entry(OperationId::from(operation_id))
            .and_modify(|d| {
                d.attempts = d.attempts.saturating_add(1);
                d.feature = feature.into();
                d.disabled_at = now;
                d.reenable_at = now + scaled(backoff, d.attempts);
                d.last_error_message = error_message.to_string();
            })
            .or_insert_with(|| DisabledOperation {
                operation_id: operation_id.into(),
                feature: feature.into(),
                first_disabled_at: now,
                disabled_at: now,
                reenable_at: now + backoff,
                last_error_message: error_message.to_string(),
                attempts: 1,
            })
            .clone();
        drop(entries);

        warn!(
            operation = operation_id,
            feature = feature,
            attempts = record.attempts,
            reenable_at = %OffsetDateTime::from(record.reenable_at),
            "Operation disabled due to missing feature"
        );

        record
    }

    /// Whether the operation is inside its suppression window
    pub fn is_disabled(&self, operation_id: &str) -> bool {
        let now = self.clock.now();
        self.entries
            .read()
            .get(operation_id)
            .map(|d| d.is_active(now))
            .unwrap_or(false)
    }

    /// Active suppression record, if any
    pub fn active(&self, operation_id: &str) -> Option<DisabledOperation> {
        let now = self.clock.now();
        self.entries
            .read()
            .get(operation_id)
            .filter(|d| d.is_active(now))
            .cloned()
    }

    /// Record regardless of whether its window has passed
    pub fn get(&self, operation_id: &str) -> Option<DisabledOperation> {
        self.entries.read().get(operation_id).cloned()
    }

    /// Remove the record; called when the operation succeeds
    pub fn clear(&self, operation_id: &str) -> Option<DisabledOperation> {
        if !self.entries.read().contains_key(operation_id) {
            return None;
        }
        let removed = self.entries.write().remove(operation_id);
        if let Some(ref d) = removed {
            info!(
                operation = operation_id,
                feature = %d.feature,
                attempts = d.attempts,
                "Operation re-enabled after successful execution"
            );
        }
        removed
    }

    /// All records, ordered by operation id
    pub fn snapshot(&self) -> Vec<DisabledOperation> {
        let mut all: Vec<_> = self.entries.read().values().cloned().collect();
        all.sort_by(|a, b| a.operation_id.cmp(&b.operation_id));
        all
    }

    /// Number of records still inside their window
    pub fn active_count(&self) -> usize {
        let now = self.clock.now();
        self.entries
            .read()
            .values()
            .filter(|d| d.is_active(now))
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// Longest suppression window a record can reach
const MAX_SUPPRESSION: Duration = Duration::from_secs(365 * 24 * 60 * 60);

fn scaled(backoff: Duration, attempts: u32) -> Duration {
    backoff
        .checked_mul(attempts)
        .unwrap_or(MAX_SUPPRESSION)
        .min(MAX_SUPPRESSION)
}

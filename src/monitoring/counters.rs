/*!
 * Guard Counters
 * Lightweight counters describing what the guard has done
 */

use ahash::RandomState;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

pub const REPORTS_PROCESSED: &str = "reports_processed";
pub const SUCCESSES: &str = "successes";
pub const SHORT_CIRCUITS: &str = "short_circuits";
pub const REJECTED_ADMISSIONS: &str = "rejected_admissions";
pub const SAMPLED_IN: &str = "sampled_in";
pub const SAMPLED_OUT: &str = "sampled_out";
pub const SYNC_SUCCESSES: &str = "sync_successes";
pub const SYNC_FAILURES: &str = "sync_failures";
pub const LOAD_SUCCESSES: &str = "load_successes";
pub const LOAD_FAILURES: &str = "load_failures";

/// Prefix of per-outcome error counters (`errors.suppressed`, ...)
const ERROR_PREFIX: &str = "errors.";

/// Counter set keyed by name
///
/// # Performance
/// - Cache-line aligned to prevent false sharing with neighbouring state
#[repr(C, align(64))]
#[derive(Debug)]
pub struct GuardCounters {
    counters: DashMap<String, AtomicU64, RandomState>,
}

impl GuardCounters {
    pub fn new() -> Self {
        Self {
            counters: DashMap::with_hasher(RandomState::new()),
        }
    }

    /// Increment a counter
    pub fn inc(&self, name: &str) {
        self.add(name, 1);
    }

    pub fn add(&self, name: &str, value: u64) {
        if let Some(c) = self.counters.get(name) {
            c.fetch_add(value, Ordering::Relaxed);
            return;
        }
        self.counters
            .entry(name.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(value, Ordering::Relaxed);
    }

    /// Count one classified error by outcome kind
    pub fn inc_error(&self, kind: &str) {
        self.inc(&format!("{ERROR_PREFIX}{kind}"));
    }

    pub fn get(&self, name: &str) -> u64 {
        self.counters
            .get(name)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn errors(&self, kind: &str) -> u64 {
        self.get(&format!("{ERROR_PREFIX}{kind}"))
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        let mut counters = BTreeMap::new();
        let mut errors = BTreeMap::new();
        for entry in self.counters.iter() {
            let value = entry.value().load(Ordering::Relaxed);
            match entry.key().strip_prefix(ERROR_PREFIX) {
                Some(kind) => errors.insert(kind.to_string(), value),
                None => counters.insert(entry.key().clone(), value),
            };
        }
        CountersSnapshot { counters, errors }
    }

    pub fn reset(&self) {
        self.counters.clear();
    }
}

impl Default for GuardCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of every counter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountersSnapshot {
    pub counters: BTreeMap<String, u64>,
    /// Errors by outcome kind
    pub errors: BTreeMap<String, u64>,
}

impl CountersSnapshot {
    pub fn get(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }
}

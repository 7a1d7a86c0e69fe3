/*!
 * Shared Store
 * Narrow key-value seam for state shared between collector instances
 */

use crate::core::time::SharedClock;
use crate::core::GuardResult;
use ahash::RandomState;
use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, SystemTime};

/// Key-value store with per-entry expiry
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SharedStore: Send + Sync {
    async fn get(&self, key: &str) -> GuardResult<Option<String>>;

    /// Write a value that expires after `ttl`
    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> GuardResult<()>;

    /// Every live entry whose key starts with `prefix`
    async fn scan_prefix(&self, prefix: &str) -> GuardResult<Vec<(String, String)>>;
}

/// Store for single-instance deployments: accepts writes, never returns data
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStore;

#[async_trait]
impl SharedStore for NoopStore {
    async fn get(&self, _key: &str) -> GuardResult<Option<String>> {
        Ok(None)
    }

    async fn set_with_ttl(&self, _key: &str, _value: String, _ttl: Duration) -> GuardResult<()> {
        Ok(())
    }

    async fn scan_prefix(&self, _prefix: &str) -> GuardResult<Vec<(String, String)>> {
        Ok(Vec::new())
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: SystemTime,
}

/// In-process store honouring TTLs against the shared clock
///
/// Expired entries are dropped lazily on read and scan.
#[derive(Debug)]
pub struct MemoryStore {
    entries: DashMap<String, Entry, RandomState>,
    clock: SharedClock,
}

impl MemoryStore {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            entries: DashMap::with_hasher(RandomState::new()),
            clock,
        }
    }

    /// Number of stored entries, expired ones included until next access
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every expired entry
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, e| e.expires_at > now);
        before - self.entries.len()
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn get(&self, key: &str) -> GuardResult<Option<String>> {
        let now = self.clock.now();
        let live = match self.entries.get(key) {
            Some(e) if e.expires_at > now => return Ok(Some(e.value.clone())),
            Some(_) => false,
            None => return Ok(None),
        };
        if !live {
            self.entries.remove_if(key, |_, e| e.expires_at <= now);
        }
        Ok(None)
    }

    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> GuardResult<()> {
        let expires_at = self.clock.now() + ttl;
        self.entries
            .insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &str) -> GuardResult<Vec<(String, String)>> {
        self.purge_expired();
        let mut out: Vec<(String, String)> = self
            .entries
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| (e.key().clone(), e.value().value.clone()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }
}

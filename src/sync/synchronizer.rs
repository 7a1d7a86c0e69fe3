/*!
 * State Synchronizer
 * Shares sampling profiles between collector instances through a KV store
 *
 * Every pass runs under a deadline; failures are logged, counted and
 * returned, never retried inline. The opportunistic trigger detaches at most
 * one pass at a time onto the current tokio runtime.
 */

use super::store::SharedStore;
use crate::config::SyncConfig;
use crate::core::limits::SCAN_BATCH_SIZE;
use crate::core::time::elapsed_between;
use crate::core::{GuardError, GuardResult, SharedClock};
use crate::monitoring::counters::{
    GuardCounters, LOAD_FAILURES, LOAD_SUCCESSES, SYNC_FAILURES, SYNC_SUCCESSES,
};
use crate::monitoring::PassSpan;
use crate::sampling::{AdaptiveSampler, OperationSnapshot};
use futures::future::try_join_all;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

/// Value stored under each `<prefix><operation_id>` key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRecord {
    /// Collector instance that wrote the record
    pub instance_id: String,
    pub snapshot: OperationSnapshot,
}

pub struct StateSynchronizer {
    sampler: Arc<AdaptiveSampler>,
    store: Arc<dyn SharedStore>,
    config: SyncConfig,
    counters: Arc<GuardCounters>,
    clock: SharedClock,
    instance_id: String,
    last_sync: Mutex<SystemTime>,
    in_flight: AtomicBool,
}

impl StateSynchronizer {
    pub fn new(
        sampler: Arc<AdaptiveSampler>,
        store: Arc<dyn SharedStore>,
        config: SyncConfig,
        counters: Arc<GuardCounters>,
        clock: SharedClock,
    ) -> Self {
        let now = clock.now();
        Self {
            sampler,
            store,
            config,
            counters,
            clock,
            instance_id: Uuid::new_v4().to_string(),
            last_sync: Mutex::new(now),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn last_sync(&self) -> SystemTime {
        *self.last_sync.lock()
    }

    /// Store key of an operation's record
    pub fn key_for(&self, operation_id: &str) -> String {
        format!("{}{}", self.config.key_prefix, operation_id)
    }

    /// Whether the sync interval has elapsed since the last attempt
    pub fn sync_due(&self) -> bool {
        elapsed_between(self.last_sync(), self.clock.now()) > self.config.interval
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Export every profile with its rate; returns the number of records written
    pub async fn sync(&self) -> GuardResult<usize> {
        if !self.config.enabled {
            return Ok(0);
        }

        let pass = PassSpan::new("sync");
        let result = tokio::time::timeout(self.config.timeout, self.export_all())
            .instrument(pass.span().clone())
            .await
            .unwrap_or_else(|_| {
                Err(GuardError::Timeout(format!(
                    "state sync exceeded {:?}",
                    self.config.timeout
                )))
            });
        *self.last_sync.lock() = self.clock.now();

        match &result {
            Ok(count) => {
                pass.record_entries(*count);
                pass.record_result(true);
                self.counters.inc(SYNC_SUCCESSES);
                debug!(entries = count, instance = %self.instance_id, "Synchronized sampling state");
            }
            Err(e) => {
                pass.record_error(&e.to_string());
                self.counters.inc(SYNC_FAILURES);
                warn!(error = %e, instance = %self.instance_id, "Failed to synchronize sampling state");
            }
        }
        result
    }

    /// Rehydrate local profiles from the store; returns the number taken
    pub async fn load(&self) -> GuardResult<usize> {
        if !self.config.enabled {
            return Ok(0);
        }

        let pass = PassSpan::new("load");
        let result = tokio::time::timeout(self.config.timeout, self.load_all())
            .instrument(pass.span().clone())
            .await
            .unwrap_or_else(|_| {
                Err(GuardError::Timeout(format!(
                    "state load exceeded {:?}",
                    self.config.timeout
                )))
            });

        match &result {
            Ok(count) => {
                pass.record_entries(*count);
                pass.record_result(true);
                self.counters.inc(LOAD_SUCCESSES);
                info!(restored = count, "Loaded shared sampling state");
            }
            Err(e) => {
                pass.record_error(&e.to_string());
                self.counters.inc(LOAD_FAILURES);
                warn!(error = %e, "Failed to load shared sampling state");
            }
        }
        result
    }

    /// Detach a sync onto the current runtime when one is due
    ///
    /// Returns whether a pass was scheduled. Never waits for the pass and
    /// never schedules a second one while the first is running.
    pub fn maybe_schedule(self: &Arc<Self>) -> bool {
        if !self.config.enabled || !self.sync_due() {
            return false;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return false;
        };
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        *self.last_sync.lock() = self.clock.now();
        let this = Arc::clone(self);
        handle.spawn(async move {
            let _ = this.sync().await;
            this.in_flight.store(false, Ordering::Release);
        });
        true
    }

    async fn export_all(&self) -> GuardResult<usize> {
        let snapshots = self.sampler.export();
        let mut written = 0;
        // Writes inside one batch go out concurrently
        for batch in snapshots.chunks(SCAN_BATCH_SIZE) {
            let writes = batch.iter().map(|snapshot| async move {
                let key = self.key_for(snapshot.stats.operation_id.as_str());
                let record = SyncRecord {
                    instance_id: self.instance_id.clone(),
                    snapshot: snapshot.clone(),
                };
                let value = serde_json::to_string(&record)?;
                self.store.set_with_ttl(&key, value, self.config.ttl).await
            });
            written += try_join_all(writes).await?.len();
        }
        Ok(written)
    }

    async fn load_all(&self) -> GuardResult<usize> {
        let entries = self.store.scan_prefix(&self.config.key_prefix).await?;
        let mut restored = 0;
        for batch in entries.chunks(SCAN_BATCH_SIZE) {
            for (key, value) in batch {
                match serde_json::from_str::<SyncRecord>(value) {
                    Ok(record) => {
                        if self.sampler.restore(record.snapshot) {
                            restored += 1;
                        }
                    }
                    Err(e) => warn!(key = %key, error = %e, "Skipping unreadable shared state entry"),
                }
            }
            tokio::task::yield_now().await;
        }
        Ok(restored)
    }
}

impl std::fmt::Debug for StateSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateSynchronizer")
            .field("instance_id", &self.instance_id)
            .field("enabled", &self.config.enabled)
            .field("in_flight", &self.is_in_flight())
            .finish()
    }
}

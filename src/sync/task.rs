/*!
 * Sync Task
 * Background task that periodically exports sampling state
 *
 * # Graceful-with-Fallback Shutdown
 *
 * Drop can't be async, so the task handle offers two paths:
 *
 * 1. **Preferred:** `shutdown().await` sends a shutdown command, awaits the
 *    loop and marks the handle so Drop does nothing. Consumes self.
 * 2. **Fallback:** `Drop` aborts the loop through `JoinHandle::abort()` and
 *    logs a warning when `shutdown()` was never called.
 */

use super::synchronizer::StateSynchronizer;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

/// Control messages for the sync task
#[derive(Debug, Clone)]
pub enum SyncCommand {
    /// Change the sync period
    UpdateInterval(Duration),
    /// Stop periodic passes
    Pause,
    /// Restart periodic passes
    Resume,
    /// Run one pass now
    Trigger,
    /// Stop the task
    Shutdown,
}

/// Handle to the periodic sync task
pub struct SyncTask {
    command_tx: mpsc::UnboundedSender<SyncCommand>,
    handle: Option<tokio::task::JoinHandle<()>>,
    /// Tracks whether graceful shutdown was initiated (lock-free)
    shutdown_initiated: Arc<AtomicBool>,
}

impl SyncTask {
    /// Spawn the loop on the current runtime
    pub fn spawn(synchronizer: Arc<StateSynchronizer>) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let period = synchronizer.config().interval;

        let handle = tokio::spawn(async move {
            run_sync_loop(synchronizer, period, command_rx).await;
        });

        info!(interval_secs = period.as_secs(), "Sync task spawned");

        Self {
            command_tx,
            handle: Some(handle),
            shutdown_initiated: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn update_interval(&self, period: Duration) {
        let _ = self.command_tx.send(SyncCommand::UpdateInterval(period));
    }

    pub fn pause(&self) {
        let _ = self.command_tx.send(SyncCommand::Pause);
    }

    pub fn resume(&self) {
        let _ = self.command_tx.send(SyncCommand::Resume);
    }

    /// Request an immediate pass without waiting for it
    pub fn trigger(&self) {
        let _ = self.command_tx.send(SyncCommand::Trigger);
    }

    /// Stop the loop and wait for it to finish
    pub async fn shutdown(mut self) {
        self.shutdown_initiated.store(true, Ordering::SeqCst);
        let _ = self.command_tx.send(SyncCommand::Shutdown);

        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Sync task shutdown error");
            } else {
                info!("Sync task shutdown complete");
            }
        }
    }
}

async fn run_sync_loop(
    synchronizer: Arc<StateSynchronizer>,
    period: Duration,
    mut command_rx: mpsc::UnboundedReceiver<SyncCommand>,
) {
    let mut active = true;
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if active {
                    trace!("Periodic sync tick");
                    let _ = synchronizer.sync().await;
                }
            }

            cmd = command_rx.recv() => {
                match cmd {
                    Some(SyncCommand::UpdateInterval(p)) => {
                        info!(interval_secs = p.as_secs(), "Sync interval updated");
                        ticker = interval_at(Instant::now() + p, p);
                        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                    }
                    Some(SyncCommand::Pause) => {
                        debug!("Sync task paused");
                        active = false;
                    }
                    Some(SyncCommand::Resume) => {
                        debug!("Sync task resumed");
                        active = true;
                    }
                    Some(SyncCommand::Trigger) => {
                        let _ = synchronizer.sync().await;
                    }
                    Some(SyncCommand::Shutdown) | None => {
                        info!("Sync task shutting down");
                        break;
                    }
                }
            }
        }
    }
}

impl Drop for SyncTask {
    fn drop(&mut self) {
        if self.shutdown_initiated.load(Ordering::SeqCst) {
            return;
        }

        if let Some(handle) = self.handle.take() {
            warn!(
                "SyncTask dropped without calling shutdown() - aborting task immediately. \
                 Use `task.shutdown().await` for graceful cleanup."
            );
            handle.abort();
        }
    }
}

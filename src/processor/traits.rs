/*!
 * Processor Traits
 * Lifecycle seam between the guard and the host pipeline
 */

use super::types::Verdict;
use crate::core::{ExecutionReport, GuardResult};
use async_trait::async_trait;

/// Pipeline stage that sees every completed operation
#[async_trait]
pub trait Processor: Send + Sync {
    /// Load shared state and start background work
    async fn init(&self) -> GuardResult<()>;

    /// Run one report through the stage (synchronous hot path)
    fn process(&self, report: &ExecutionReport) -> Verdict;

    /// Stop background work and flush state
    async fn shutdown(&self) -> GuardResult<()>;
}

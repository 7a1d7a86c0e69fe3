/*!
 * Processor Types
 */

use crate::breaker::ErrorOutcome;
use crate::core::OperationId;
use crate::sampling::SampleDecision;
use serde::Serialize;

/// What the guard decided for one execution report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    pub operation_id: OperationId,
    /// Classification of the failure, for failed executions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ErrorOutcome>,
    pub sample_rate: f64,
    #[serde(skip)]
    pub decision: SampleDecision,
}

impl Verdict {
    /// Whether the caller should forward the telemetry record
    #[inline]
    pub fn should_emit(&self) -> bool {
        self.decision.is_accept()
    }

    /// Fallback operation to dispatch next time, if the failure named one
    pub fn fallback(&self) -> Option<&str> {
        self.outcome.as_ref().and_then(|o| o.fallback())
    }
}

/*!
 * Core Types
 * Common types used across the guard
 */

use serde::{Deserialize, Serialize};
use smartstring::alias::String as SmartString;
use std::time::SystemTime;

/// Stable identifier of a monitored operation (query name, check id)
///
/// Most identifiers are short enough to stay inline.
pub type OperationId = SmartString;

/// Identifier of an optional backend feature or error class
pub type FeatureName = SmartString;

/// Common result type for guard operations
pub type GuardResult<T> = Result<T, super::errors::GuardError>;

/// One completed operation, as reported by the surrounding pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub operation_id: OperationId,
    pub duration_ms: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub is_critical: bool,
    /// Completion time; the guard's clock is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<SystemTime>,
}

impl ExecutionReport {
    /// Successful execution
    pub fn success(operation_id: impl Into<OperationId>, duration_ms: f64) -> Self {
        Self {
            operation_id: operation_id.into(),
            duration_ms,
            error: None,
            is_critical: false,
            timestamp: None,
        }
    }

    /// Failed execution carrying the backend's error message
    pub fn failure(
        operation_id: impl Into<OperationId>,
        duration_ms: f64,
        error: impl Into<String>,
    ) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::success(operation_id, duration_ms)
        }
    }

    /// Mark the operation as business critical
    pub fn critical(mut self) -> Self {
        self.is_critical = true;
        self
    }

    /// Override the completion timestamp
    pub fn at(mut self, timestamp: SystemTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    #[inline]
    pub fn had_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Instantaneous metrics of one execution, fed to the sampler
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryMetrics {
    pub duration_ms: f64,
    pub has_error: bool,
    pub is_critical: bool,
    #[serde(default)]
    pub row_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// When the execution completed, if the feed says so
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_at: Option<SystemTime>,
}

impl QueryMetrics {
    pub fn new(duration_ms: f64) -> Self {
        Self {
            duration_ms,
            ..Self::default()
        }
    }

    pub fn with_error(mut self, has_error: bool) -> Self {
        self.has_error = has_error;
        self
    }

    pub fn with_critical(mut self, is_critical: bool) -> Self {
        self.is_critical = is_critical;
        self
    }

    pub fn with_rows(mut self, row_count: u64) -> Self {
        self.row_count = row_count;
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn observed_at(mut self, at: SystemTime) -> Self {
        self.observed_at = Some(at);
        self
    }
}

impl From<&ExecutionReport> for QueryMetrics {
    fn from(report: &ExecutionReport) -> Self {
        Self {
            duration_ms: report.duration_ms,
            has_error: report.had_error(),
            is_critical: report.is_critical,
            row_count: 0,
            database: None,
            observed_at: report.timestamp,
        }
    }
}

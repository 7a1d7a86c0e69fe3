/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use super::types::{FeatureName, OperationId};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Operation suppressed because the backend lacks a feature
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[error("feature error for operation {operation}: missing {feature} - {message}")]
#[diagnostic(
    code(guard::feature_unavailable),
    help("The operation stays disabled until its re-enable deadline or its next success.")
)]
pub struct FeatureError {
    pub operation: OperationId,
    pub feature: FeatureName,
    pub message: String,
}

/// Operation should be retried against its registered fallback
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[error("fallback required for operation {operation}: missing {feature} - {message} (use {fallback})")]
#[diagnostic(
    code(guard::fallback_required),
    help("Dispatch the fallback operation instead of the primary one.")
)]
pub struct FallbackError {
    pub operation: OperationId,
    pub fallback: OperationId,
    pub feature: FeatureName,
    pub message: String,
}

/// Unified guard error type with miette diagnostics
#[derive(Error, Debug, Diagnostic)]
pub enum GuardError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    FeatureUnavailable(#[from] FeatureError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    FallbackRequired(#[from] FallbackError),

    #[error("Circuit breaker open for {0}")]
    #[diagnostic(
        code(guard::breaker_open),
        help("Calls are short-circuited until the breaker cooldown elapses.")
    )]
    BreakerOpen(FeatureName),

    #[error("Operation {operation} requires {feature}, which this backend does not provide")]
    #[diagnostic(
        code(guard::missing_capability),
        help("Install or enable the capability on the backend, or register a fallback.")
    )]
    MissingCapability {
        operation: OperationId,
        feature: FeatureName,
    },

    #[error("Invalid error pattern {name}: {reason}")]
    #[diagnostic(
        code(guard::invalid_pattern),
        help("Patterns use regular-expression syntax. Check escaping of quotes and dots.")
    )]
    InvalidPattern { name: String, reason: String },

    #[error("Configuration error: {0}")]
    #[diagnostic(
        code(guard::configuration_error),
        help("Invalid configuration. Review configuration parameters.")
    )]
    InvalidConfig(String),

    #[error("Shared store error: {0}")]
    #[diagnostic(
        code(guard::store_error),
        help("The shared state store is unreachable or rejected the request.")
    )]
    Store(String),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(guard::serialization_error))]
    Serialization(String),

    #[error("Timeout: {0}")]
    #[diagnostic(
        code(guard::timeout),
        help("Operation exceeded its deadline. Check store latency or raise sync_timeout.")
    )]
    Timeout(String),

    #[error("I/O error: {0}")]
    #[diagnostic(
        code(guard::io_error),
        help("Filesystem or I/O operation failed. Check file permissions.")
    )]
    Io(String),
}

impl GuardError {
    /// Whether the caller may retry the same operation later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GuardError::BreakerOpen(_) | GuardError::Store(_) | GuardError::Timeout(_)
        )
    }
}

impl From<std::io::Error> for GuardError {
    fn from(err: std::io::Error) -> Self {
        GuardError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for GuardError {
    fn from(err: serde_json::Error) -> Self {
        GuardError::Serialization(err.to_string())
    }
}

impl From<regex::Error> for GuardError {
    fn from(err: regex::Error) -> Self {
        GuardError::InvalidPattern {
            name: "<anonymous>".to_string(),
            reason: err.to_string(),
        }
    }
}

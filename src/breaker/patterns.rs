/*!
 * Error Pattern Table
 * Declarative, ordered classification rules for backend error messages
 *
 * Each rule pairs a regular expression with the action to take when a
 * failure message matches. Evaluation is first-match-wins, so more specific
 * rules must precede broader ones.
 */

use crate::config::ErrorPatternConfig;
use crate::core::{FeatureName, GuardError, GuardResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;

/// What to do with an operation whose failure matched a pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternAction {
    /// Suppress the operation until its re-enable deadline
    #[serde(alias = "disable_query")]
    DisableOperation,
    /// Redirect to the registered fallback, or disable if there is none
    UseFallback,
    /// Count the failure against the pattern's feature breaker
    #[serde(alias = "circuit_break")]
    TripBreaker,
}

impl fmt::Display for PatternAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PatternAction::DisableOperation => "disable_operation",
            PatternAction::UseFallback => "use_fallback",
            PatternAction::TripBreaker => "trip_breaker",
        })
    }
}

/// Compiled classification rule
#[derive(Debug, Clone)]
pub struct ErrorPattern {
    pub name: String,
    pub matcher: Regex,
    pub action: PatternAction,
    pub feature: FeatureName,
    pub backoff: Duration,
    pub description: String,
}

impl ErrorPattern {
    /// Compile a rule; the pattern must be a valid regular expression
    pub fn new(
        name: impl Into<String>,
        pattern: &str,
        action: PatternAction,
        feature: impl Into<FeatureName>,
        backoff: Duration,
        description: impl Into<String>,
    ) -> GuardResult<Self> {
        let name = name.into();
        let matcher = Regex::new(pattern).map_err(|e| GuardError::InvalidPattern {
            name: name.clone(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            name,
            matcher,
            action,
            feature: feature.into(),
            backoff,
            description: description.into(),
        })
    }

    #[inline]
    pub fn matches(&self, message: &str) -> bool {
        self.matcher.is_match(message)
    }
}

impl TryFrom<&ErrorPatternConfig> for ErrorPattern {
    type Error = GuardError;

    fn try_from(cfg: &ErrorPatternConfig) -> GuardResult<Self> {
        ErrorPattern::new(
            cfg.name.as_str(),
            &cfg.pattern,
            cfg.action,
            cfg.feature.as_str(),
            cfg.backoff,
            cfg.description.as_str(),
        )
    }
}

/// Ordered list of classification rules
#[derive(Debug, Clone, Default)]
pub struct PatternTable {
    patterns: Vec<ErrorPattern>,
}

impl PatternTable {
    pub fn new(patterns: Vec<ErrorPattern>) -> Self {
        Self { patterns }
    }

    /// Compile externally supplied rules, failing on the first bad expression
    pub fn from_configs(configs: &[ErrorPatternConfig]) -> GuardResult<Self> {
        configs
            .iter()
            .map(ErrorPattern::try_from)
            .collect::<GuardResult<Vec<_>>>()
            .map(Self::new)
    }

    /// Built-in rules for PostgreSQL, MySQL and managed-cloud backends
    pub fn builtin() -> Self {
        use PatternAction::*;

        let rules: [(&str, &str, PatternAction, &str, u64, &str); 11] = [
            // PostgreSQL extensions
            (
                "pg_stat_statements_missing",
                r#"relation "pg_stat_statements" does not exist"#,
                DisableOperation,
                "pg_stat_statements",
                30 * MINUTE,
                "pg_stat_statements extension not installed",
            ),
            (
                "pg_stat_monitor_missing",
                r#"relation "pg_stat_monitor" does not exist"#,
                UseFallback,
                "pg_stat_monitor",
                5 * MINUTE,
                "pg_stat_monitor extension not installed",
            ),
            (
                "pg_wait_sampling_missing",
                r#"relation "pg_wait_sampling.*" does not exist"#,
                DisableOperation,
                "pg_wait_sampling",
                30 * MINUTE,
                "pg_wait_sampling extension not installed",
            ),
            (
                "extension_not_loaded",
                r"function .* does not exist|extension .* not installed",
                DisableOperation,
                "unknown_extension",
                HOUR,
                "Required extension not loaded",
            ),
            // MySQL Performance Schema
            (
                "performance_schema_disabled",
                r"Table 'performance_schema\..*' doesn't exist|performance_schema not enabled",
                UseFallback,
                "performance_schema",
                30 * MINUTE,
                "Performance Schema not enabled",
            ),
            (
                "events_statements_missing",
                r"Table 'performance_schema\.events_statements.*' doesn't exist",
                UseFallback,
                "perf_schema_statements_digest",
                30 * MINUTE,
                "Statement events not available",
            ),
            // Permissions
            (
                "permission_denied",
                r"permission denied|access denied|insufficient privileges",
                DisableOperation,
                "permissions",
                HOUR,
                "Insufficient permissions",
            ),
            // Connectivity
            (
                "connection_failed",
                r"connection refused|connection reset|no route to host",
                TripBreaker,
                "connection",
                30,
                "Database connection failed",
            ),
            (
                "too_many_connections",
                r"too many connections|connection limit exceeded",
                TripBreaker,
                "connection_limit",
                MINUTE,
                "Connection limit reached",
            ),
            // Timeouts
            (
                "query_timeout",
                r"statement timeout|query timeout|canceling statement due to statement timeout",
                TripBreaker,
                "query_performance",
                30,
                "Query execution timeout",
            ),
            // Managed cloud
            (
                "rds_feature_unavailable",
                r"feature not supported on.*RDS|RDS does not support",
                DisableOperation,
                "cloud_limitation",
                24 * HOUR,
                "Feature not available on RDS",
            ),
        ];

        let patterns = rules
            .iter()
            .filter_map(|(name, pattern, action, feature, backoff, description)| {
                match ErrorPattern::new(
                    *name,
                    pattern,
                    *action,
                    *feature,
                    Duration::from_secs(*backoff),
                    *description,
                ) {
                    Ok(p) => Some(p),
                    Err(e) => {
                        tracing::warn!(pattern = *name, error = %e, "Failed to compile error pattern");
                        None
                    }
                }
            })
            .collect();

        Self { patterns }
    }

    /// Append another table after this one (its rules match last)
    pub fn chain(mut self, other: PatternTable) -> Self {
        self.patterns.extend(other.patterns);
        self
    }

    /// First rule whose matcher accepts the message
    pub fn classify(&self, message: &str) -> Option<&ErrorPattern> {
        self.patterns.iter().find(|p| p.matches(message))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ErrorPattern> {
        self.patterns.iter()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/*!
 * Guard Configuration
 *
 * Declarative configuration for breakers, sampler, shared-state sync and the
 * error pattern table. Loaded from JSON; every section falls back to the
 * production collector defaults.
 */

use crate::breaker::patterns::{PatternAction, PatternTable};
use crate::core::limits::*;
use crate::core::{GuardError, GuardResult};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// Environment override for the global emission budget
pub const ENV_MAX_RECORDS_PER_SECOND: &str = "GUARD_MAX_RECORDS_PER_SECOND";

/// Environment override for the sampling floor
pub const ENV_MIN_SAMPLE_RATE: &str = "GUARD_MIN_SAMPLE_RATE";

/// Circuit breaker settings (global breaker, and template for feature breakers)
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Failures inside `failure_window` that open the breaker
    pub failure_threshold: u32,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub failure_window: Duration,
    /// Open-state cooldown before a half-open trial is admitted
    #[serde_as(as = "DurationSeconds<u64>")]
    pub open_cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            failure_window: DEFAULT_FAILURE_WINDOW,
            open_cooldown: DEFAULT_OPEN_COOLDOWN,
        }
    }
}

impl BreakerConfig {
    /// Same thresholds with a different cooldown
    pub fn with_cooldown(&self, cooldown: Duration) -> Self {
        Self {
            open_cooldown: cooldown,
            ..self.clone()
        }
    }
}

/// Adaptive sampler settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Lowest probability any operation is kept at
    pub min_sample_rate: f64,
    /// Duration (ms) at which the cost factor saturates
    pub high_cost_threshold_ms: f64,
    /// Global budget of emitted records per second
    pub max_records_per_second: u64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            min_sample_rate: DEFAULT_MIN_SAMPLE_RATE,
            high_cost_threshold_ms: DEFAULT_HIGH_COST_THRESHOLD_MS,
            max_records_per_second: DEFAULT_MAX_RECORDS_PER_SECOND,
        }
    }
}

/// Shared-state synchronization settings
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub enabled: bool,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub interval: Duration,
    /// Time-to-live of every exported entry
    #[serde_as(as = "DurationSeconds<u64>")]
    pub ttl: Duration,
    /// Deadline of one sync or load pass
    #[serde_as(as = "DurationSeconds<u64>")]
    pub timeout: Duration,
    pub key_prefix: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: DEFAULT_SYNC_INTERVAL,
            ttl: DEFAULT_SYNC_TTL,
            timeout: DEFAULT_SYNC_TIMEOUT,
            key_prefix: STATS_KEY_PREFIX.to_string(),
        }
    }
}

/// One externally supplied classification rule
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPatternConfig {
    pub name: String,
    pub pattern: String,
    pub action: PatternAction,
    pub feature: String,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub backoff: Duration,
    #[serde(default)]
    pub description: String,
}

/// Complete guard configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    pub breaker: BreakerConfig,
    pub sampler: SamplerConfig,
    pub sync: SyncConfig,
    /// Custom classification rules; empty means the built-in table
    pub patterns: Vec<ErrorPatternConfig>,
    /// Place custom rules ahead of the built-in table instead of replacing it
    pub extend_default_patterns: bool,
    /// Primary operation -> fallback operation
    pub fallbacks: HashMap<String, String>,
    /// Capabilities known to be present; `None` disables pre-validation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub features: Option<Vec<String>>,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            breaker: BreakerConfig::default(),
            sampler: SamplerConfig::default(),
            sync: SyncConfig::default(),
            patterns: Vec::new(),
            extend_default_patterns: false,
            fallbacks: HashMap::new(),
            features: None,
        }
    }
}

impl GuardConfig {
    /// Parse and validate a JSON document
    pub fn from_json(json: &str) -> GuardResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load, apply environment overrides and validate
    pub fn from_file(path: impl AsRef<Path>) -> GuardResult<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading guard configuration");
        let raw = std::fs::read_to_string(path)?;
        let mut config: Self = serde_json::from_str(&raw)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply `GUARD_*` environment overrides; unparsable values are ignored
    pub fn apply_env_overrides(&mut self) {
        if let Ok(raw) = std::env::var(ENV_MAX_RECORDS_PER_SECOND) {
            match raw.parse::<u64>() {
                Ok(v) => self.sampler.max_records_per_second = v,
                Err(e) => warn!(value = %raw, error = %e, "Ignoring invalid {}", ENV_MAX_RECORDS_PER_SECOND),
            }
        }
        if let Ok(raw) = std::env::var(ENV_MIN_SAMPLE_RATE) {
            match raw.parse::<f64>() {
                Ok(v) => self.sampler.min_sample_rate = v,
                Err(e) => warn!(value = %raw, error = %e, "Ignoring invalid {}", ENV_MIN_SAMPLE_RATE),
            }
        }
    }

    /// Check every section for out-of-range values
    pub fn validate(&self) -> GuardResult<()> {
        let b = &self.breaker;
        if b.failure_threshold == 0 {
            return Err(invalid("breaker.failure_threshold must be positive"));
        }
        if b.failure_window.is_zero() {
            return Err(invalid("breaker.failure_window must be positive"));
        }
        if b.open_cooldown.is_zero() {
            return Err(invalid("breaker.open_cooldown must be positive"));
        }

        let s = &self.sampler;
        if !(s.min_sample_rate > 0.0 && s.min_sample_rate <= LOW_TIER_MAX_RATE) {
            return Err(invalid(format!(
                "sampler.min_sample_rate must be in (0, {}], got {}",
                LOW_TIER_MAX_RATE, s.min_sample_rate
            )));
        }
        if !(s.high_cost_threshold_ms > 0.0) {
            return Err(invalid("sampler.high_cost_threshold_ms must be positive"));
        }
        if s.max_records_per_second == 0 {
            return Err(invalid("sampler.max_records_per_second must be positive"));
        }

        let y = &self.sync;
        if y.interval.is_zero() || y.ttl.is_zero() || y.timeout.is_zero() {
            return Err(invalid("sync.interval, sync.ttl and sync.timeout must be positive"));
        }
        if y.key_prefix.is_empty() {
            return Err(invalid("sync.key_prefix must not be empty"));
        }

        for p in &self.patterns {
            if p.name.is_empty() || p.feature.is_empty() {
                return Err(invalid("error patterns need a name and a feature"));
            }
        }

        Ok(())
    }

    /// Compile the effective classification table
    pub fn pattern_table(&self) -> GuardResult<PatternTable> {
        if self.patterns.is_empty() {
            return Ok(PatternTable::builtin());
        }
        let custom = PatternTable::from_configs(&self.patterns)?;
        if self.extend_default_patterns {
            Ok(custom.chain(PatternTable::builtin()))
        } else {
            Ok(custom)
        }
    }
}

fn invalid(msg: impl Into<String>) -> GuardError {
    GuardError::InvalidConfig(msg.into())
}

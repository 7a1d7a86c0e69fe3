/*!
 * Guard Limits and Constants
 *
 * Centralized location for thresholds, weights and defaults.
 * Organized by subsystem for maintainability and discoverability.
 *
 * - Values mirrored from the production collector are marked [COLLECTOR]
 * - Hot-path tuning knobs are marked [PERF]
 */

use std::time::Duration;

// =============================================================================
// IMPORTANCE SCORING
// =============================================================================

/// Weight of the cost factor (duration relative to the high-cost threshold)
pub const COST_WEIGHT: f64 = 0.4;

/// Weight of the running error rate
pub const ERROR_RATE_WEIGHT: f64 = 0.3;

/// Weight of duration variability (coefficient of variation)
pub const VARIABILITY_WEIGHT: f64 = 0.2;

/// Flat contribution of a business-critical operation
pub const CRITICALITY_SCORE: f64 = 0.1;

// =============================================================================
// RATE TIERS
// =============================================================================

/// Scores above this are always kept
pub const HIGH_IMPORTANCE_SCORE: f64 = 0.7;

/// Scores above this (and up to HIGH) interpolate into [0.5, 1.0]
pub const MEDIUM_IMPORTANCE_SCORE: f64 = 0.3;

/// Floor of the medium tier
pub const MEDIUM_TIER_BASE_RATE: f64 = 0.5;

/// Slope of the medium tier: (1.0 - 0.5) / (0.7 - 0.3)
pub const MEDIUM_TIER_SLOPE: f64 = 1.25;

/// Slope of the low tier [COLLECTOR]
pub const LOW_TIER_SLOPE: f64 = 1.67;

/// Ceiling of the low tier, keeps the mapping monotone at the 0.3 boundary
pub const LOW_TIER_MAX_RATE: f64 = 0.5;

/// Fraction of the records-per-second budget at which limiting starts
pub const VOLUME_HEADROOM: f64 = 0.8;

/// Shortest window used to turn an execution count into a per-second rate
pub const MIN_RATE_WINDOW: Duration = Duration::from_secs(1);

// =============================================================================
// SAMPLER DEFAULTS
// =============================================================================

/// Lowest probability any operation is sampled at [COLLECTOR]
pub const DEFAULT_MIN_SAMPLE_RATE: f64 = 0.1;

/// Duration (ms) at which the cost factor saturates
pub const DEFAULT_HIGH_COST_THRESHOLD_MS: f64 = 1000.0;

/// Global emission budget [COLLECTOR]
pub const DEFAULT_MAX_RECORDS_PER_SECOND: u64 = 1000;

// =============================================================================
// CIRCUIT BREAKER DEFAULTS
// =============================================================================

/// Failures inside the window that open a breaker [COLLECTOR]
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Sliding window over which failures are counted
pub const DEFAULT_FAILURE_WINDOW: Duration = Duration::from_secs(60);

/// Open-state cooldown of the global breaker [COLLECTOR]
pub const DEFAULT_OPEN_COOLDOWN: Duration = Duration::from_secs(30);

/// Cooldown for feature breakers created without a pattern backoff
pub const DEFAULT_FEATURE_COOLDOWN: Duration = Duration::from_secs(30);

// =============================================================================
// DISTRIBUTED SYNC
// =============================================================================

/// Key prefix of per-operation sampling state in the shared store
pub const STATS_KEY_PREFIX: &str = "adaptive:stats:";

/// Time-to-live of synced entries [COLLECTOR]
pub const DEFAULT_SYNC_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// How often state is pushed to the shared store
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(30);

/// Deadline for one sync or load pass
pub const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_secs(5);

/// Page size of prefix scans [PERF]
pub const SCAN_BATCH_SIZE: usize = 100;

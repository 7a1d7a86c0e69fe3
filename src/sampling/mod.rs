/*!
 * Sampling
 * Adaptive importance-based sampling of telemetry records
 */

pub mod rate;
pub mod sampler;
pub mod scoring;
pub mod stats;

pub use rate::{tier_rate, RateDecider, RateDecision, VolumeLimiter};
pub use sampler::{AdaptiveSampler, OperationSnapshot, RateEntry, SampleDecision};
pub use scoring::{ImportanceScorer, ScoreBreakdown};
pub use stats::{OperationStats, StatsTracker};

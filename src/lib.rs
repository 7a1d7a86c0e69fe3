/*!
 * Telemetry Guard Library
 * Adaptive sampling and feature-aware circuit breaking for database telemetry
 */

pub mod breaker;
pub mod config;
pub mod core;
pub mod monitoring;
pub mod processor;
pub mod sampling;
pub mod sync;

// Re-exports
pub use breaker::{
    Admission, BreakerSnapshot, BreakerState, DisabledOperation, ErrorOutcome,
    FeatureAwareBreaker, FeatureDetector, OperationRequirements, PatternAction, PatternTable,
    StaticDetector,
};
pub use config::{BreakerConfig, ErrorPatternConfig, GuardConfig, SamplerConfig, SyncConfig};
pub use crate::core::{
    system_clock, Clock, ExecutionReport, FallbackError, FeatureError, GuardError, GuardResult,
    ManualClock, OperationId, QueryMetrics, SharedClock, SystemClock,
};
pub use monitoring::{init_tracing, CountersSnapshot, GuardCounters};
pub use processor::{GuardProcessor, Processor, Verdict};
pub use sampling::{AdaptiveSampler, OperationStats, SampleDecision};
pub use sync::{MemoryStore, NoopStore, SharedStore, StateSynchronizer, SyncTask};

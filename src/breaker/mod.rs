/*!
 * Feature-Aware Circuit Breaking
 *
 * Failure classification and suppression for monitored operations:
 * - `patterns`: ordered regex rule table
 * - `state`: per-breaker Closed/Open/HalfOpen state machine
 * - `registry`: disabled operations with escalating re-enable deadlines
 * - `fallback`: primary -> alternate operation substitutions
 * - `detector`: capability pre-validation seam
 * - `feature`: the dispatcher tying them together
 */

pub mod detector;
pub mod fallback;
pub mod feature;
pub mod patterns;
pub mod registry;
pub mod state;

pub use detector::{FeatureDetector, OperationRequirements, StaticDetector};
pub use fallback::FallbackRegistry;
pub use feature::{Admission, ErrorOutcome, FeatureAwareBreaker, GLOBAL_BREAKER};
pub use patterns::{ErrorPattern, PatternAction, PatternTable};
pub use registry::{DisabledOperation, DisabledRegistry};
pub use state::{BreakerSnapshot, BreakerState, CircuitBreaker, Permit};

/*!
 * Feature-Aware Circuit Breaker
 *
 * Classifies operation failures through the pattern table and dispatches
 * one of three actions:
 * - disable the operation (missing extension, permissions, cloud limits)
 * - redirect to a registered fallback operation
 * - count the failure on a breaker scoped to the failing feature
 *
 * Unclassified failures count against the global breaker, so an error mode
 * nobody has seen before never suppresses an individual operation.
 *
 * Half-open trials handed out by `check_operation` are remembered per
 * operation and resolved by that operation's next outcome, whichever
 * breaker the outcome itself is classified to.
 */

use super::detector::{FeatureDetector, OperationRequirements};
use super::fallback::FallbackRegistry;
use super::patterns::{PatternAction, PatternTable};
use super::registry::{DisabledOperation, DisabledRegistry};
use super::state::{BreakerSnapshot, BreakerState, CircuitBreaker, Permit};
use crate::config::BreakerConfig;
use crate::core::limits::DEFAULT_FEATURE_COOLDOWN;
use crate::core::{
    FallbackError, FeatureError, FeatureName, GuardError, GuardResult, OperationId, SharedClock,
};
use ahash::RandomState;
use arc_swap::ArcSwap;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_with::{serde_as, TimestampSeconds};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, info};

/// Name of the breaker that absorbs unclassified failures
pub const GLOBAL_BREAKER: &str = "global";

/// Result of classifying one failure
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ErrorOutcome {
    /// Operation disabled until `reenable_at`
    Suppressed {
        error: FeatureError,
        #[serde_as(as = "TimestampSeconds<i64>")]
        reenable_at: SystemTime,
        attempts: u32,
    },
    /// Caller should dispatch the fallback operation instead
    Fallback(FallbackError),
    /// Failure counted against a breaker, nothing else suppressed
    PassThrough {
        breaker: FeatureName,
        state: BreakerState,
        pattern: Option<String>,
    },
    /// Feature breaker already open, classification skipped
    ShortCircuited { feature: FeatureName },
}

impl ErrorOutcome {
    /// Short label for logs and counters
    pub fn kind(&self) -> &'static str {
        match self {
            ErrorOutcome::Suppressed { .. } => "suppressed",
            ErrorOutcome::Fallback(_) => "fallback",
            ErrorOutcome::PassThrough { .. } => "pass_through",
            ErrorOutcome::ShortCircuited { .. } => "short_circuited",
        }
    }

    pub fn is_suppressed(&self) -> bool {
        matches!(self, ErrorOutcome::Suppressed { .. })
    }

    /// Fallback operation to dispatch, if any
    pub fn fallback(&self) -> Option<&str> {
        match self {
            ErrorOutcome::Fallback(f) => Some(f.fallback.as_str()),
            _ => None,
        }
    }

    /// Convert into the error a `?`-style caller would propagate
    pub fn into_result(self) -> GuardResult<()> {
        match self {
            ErrorOutcome::Suppressed { error, .. } => Err(error.into()),
            ErrorOutcome::Fallback(f) => Err(f.into()),
            ErrorOutcome::ShortCircuited { feature } => Err(GuardError::BreakerOpen(feature)),
            ErrorOutcome::PassThrough { .. } => Ok(()),
        }
    }
}

/// Pre-dispatch decision for one operation
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    Allowed,
    Disabled(DisabledOperation),
    BreakerOpen(FeatureName),
}

impl Admission {
    #[inline]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed)
    }
}

/// Circuit breaker with feature awareness
pub struct FeatureAwareBreaker {
    global: CircuitBreaker,
    config: BreakerConfig,
    clock: SharedClock,

    /// Lazily created, one per tripped feature
    feature_breakers: RwLock<HashMap<FeatureName, Arc<CircuitBreaker>, RandomState>>,
    /// Operation -> feature breaker its failures last tripped
    bindings: RwLock<HashMap<OperationId, FeatureName, RandomState>>,
    /// Operation -> breakers whose half-open trial it was admitted under
    trials: Mutex<HashMap<OperationId, Vec<FeatureName>, RandomState>>,

    patterns: ArcSwap<PatternTable>,
    fallbacks: FallbackRegistry,
    disabled: DisabledRegistry,
    detector: RwLock<Option<Arc<dyn FeatureDetector>>>,
}

impl FeatureAwareBreaker {
    pub fn new(config: BreakerConfig, patterns: PatternTable, clock: SharedClock) -> Self {
        Self {
            global: CircuitBreaker::new(GLOBAL_BREAKER, config.clone(), clock.clone()),
            disabled: DisabledRegistry::new(clock.clone()),
            config,
            clock,
            feature_breakers: RwLock::new(HashMap::with_hasher(RandomState::new())),
            bindings: RwLock::new(HashMap::with_hasher(RandomState::new())),
            trials: Mutex::new(HashMap::with_hasher(RandomState::new())),
            patterns: ArcSwap::from_pointee(patterns),
            fallbacks: FallbackRegistry::new(),
            detector: RwLock::new(None),
        }
    }

    /// Classify a failure and dispatch its action
    ///
    /// Any half-open trial the operation was admitted under is reopened.
    pub fn process_error<E>(&self, err: &E, operation_id: &str) -> ErrorOutcome
    where
        E: fmt::Display + ?Sized,
    {
        let message = err.to_string();
        let pending = self.take_trials(operation_id);
        let outcome = self.dispatch_error(&message, operation_id);

        // Breakers that already counted this failure are Open by now
        for name in pending {
            self.with_breaker(&name, |breaker| {
                breaker.fail_trial(&message);
            });
        }
        outcome
    }

    fn dispatch_error(&self, message: &str, operation_id: &str) -> ErrorOutcome {
        if let Some(feature) = self.open_binding(operation_id) {
            debug!(
                operation = operation_id,
                feature = %feature,
                "Feature breaker open, skipping classification"
            );
            return ErrorOutcome::ShortCircuited { feature };
        }

        let table = self.patterns.load();

        let Some(pattern) = table.classify(message) else {
            let state = self.global.record_failure(message);
            debug!(operation = operation_id, state = %state, "Unclassified error recorded on global breaker");
            return ErrorOutcome::PassThrough {
                breaker: GLOBAL_BREAKER.into(),
                state,
                pattern: None,
            };
        };

        info!(
            pattern = %pattern.name,
            action = %pattern.action,
            feature = %pattern.feature,
            operation = operation_id,
            "Error pattern matched"
        );

        match pattern.action {
            PatternAction::DisableOperation => self.disable(
                operation_id,
                &pattern.feature,
                pattern.backoff,
                message,
                pattern.description.clone(),
            ),
            PatternAction::UseFallback => match self.fallbacks.resolve(operation_id) {
                Some(fallback) => ErrorOutcome::Fallback(FallbackError {
                    operation: operation_id.into(),
                    fallback,
                    feature: pattern.feature.clone(),
                    message: pattern.description.clone(),
                }),
                None => self.disable(
                    operation_id,
                    &pattern.feature,
                    pattern.backoff,
                    message,
                    format!("no fallback available: {}", pattern.description),
                ),
            },
            PatternAction::TripBreaker => {
                let breaker = self.feature_breaker(&pattern.feature, pattern.backoff);
                let state = breaker.record_failure(message);
                self.bindings
                    .write()
                    .insert(operation_id.into(), pattern.feature.clone());
                ErrorOutcome::PassThrough {
                    breaker: pattern.feature.clone(),
                    state,
                    pattern: Some(pattern.name.clone()),
                }
            }
        }
    }

    /// Record a success: clears any disablement and feeds the breakers
    pub fn process_success(&self, operation_id: &str) {
        let pending = self.take_trials(operation_id);
        self.disabled.clear(operation_id);
        self.global.record_success();

        let bound = self.bindings.read().get(operation_id).cloned();
        if let Some(feature) = &bound {
            if let Some(breaker) = self.existing_breaker(feature) {
                breaker.record_success();
            }
        }

        for name in pending {
            if name.as_str() == GLOBAL_BREAKER || bound.as_ref() == Some(&name) {
                continue;
            }
            self.with_breaker(&name, |breaker| {
                breaker.record_success();
            });
        }
    }

    /// Gate an operation before it is attempted
    ///
    /// A half-open trial is only consumed when every gate admits the call.
    pub fn check_operation(&self, operation_id: &str) -> Admission {
        if let Some(record) = self.disabled.active(operation_id) {
            return Admission::Disabled(record);
        }

        if self.global.is_short_circuiting() {
            return Admission::BreakerOpen(GLOBAL_BREAKER.into());
        }

        let mut feature_trial = None;
        let bound = self.bindings.read().get(operation_id).cloned();
        if let Some(feature) = bound {
            if let Some(breaker) = self.existing_breaker(&feature) {
                match breaker.admit() {
                    Permit::Rejected => return Admission::BreakerOpen(feature),
                    Permit::Trial => feature_trial = Some((feature, breaker)),
                    Permit::Pass => {}
                }
            }
        }

        let global = self.global.admit();
        if global == Permit::Rejected {
            if let Some((_, breaker)) = &feature_trial {
                breaker.release_trial();
            }
            return Admission::BreakerOpen(GLOBAL_BREAKER.into());
        }

        let mut admitted: Vec<FeatureName> = Vec::new();
        if let Some((feature, _)) = feature_trial {
            admitted.push(feature);
        }
        if global == Permit::Trial {
            admitted.push(GLOBAL_BREAKER.into());
        }
        if !admitted.is_empty() {
            let mut trials = self.trials.lock();
            let held = trials.entry(operation_id.into()).or_default();
            for name in admitted {
                if !held.contains(&name) {
                    held.push(name);
                }
            }
        }

        Admission::Allowed
    }

    /// Validate requirements against the installed detector (if any)
    pub fn validate_operation(&self, requirements: &OperationRequirements) -> GuardResult<()> {
        match self.detector.read().as_ref() {
            Some(detector) => detector.validate(requirements),
            None => Ok(()),
        }
    }

    pub fn set_detector(&self, detector: Arc<dyn FeatureDetector>) {
        *self.detector.write() = Some(detector);
    }

    pub fn set_fallback_query(&self, primary: &str, fallback: &str) {
        self.fallbacks.register(primary, fallback);
    }

    /// Swap in a new classification table
    pub fn reload_patterns(&self, table: PatternTable) {
        info!(patterns = table.len(), "Reloaded error pattern table");
        self.patterns.store(Arc::new(table));
    }

    pub fn get_disabled_operations(&self) -> Vec<DisabledOperation> {
        self.disabled.snapshot()
    }

    pub fn is_disabled(&self, operation_id: &str) -> bool {
        self.disabled.is_disabled(operation_id)
    }

    pub fn global_breaker(&self) -> &CircuitBreaker {
        &self.global
    }

    /// Feature breaker, if one has been created
    pub fn existing_breaker(&self, feature: &str) -> Option<Arc<CircuitBreaker>> {
        self.feature_breakers.read().get(feature).cloned()
    }

    /// Global snapshot first, then feature breakers by name
    pub fn breaker_snapshots(&self) -> Vec<BreakerSnapshot> {
        let mut features: Vec<_> = self
            .feature_breakers
            .read()
            .values()
            .map(|b| b.snapshot())
            .collect();
        features.sort_by(|a, b| a.name.cmp(&b.name));

        let mut all = Vec::with_capacity(features.len() + 1);
        all.push(self.global.snapshot());
        all.extend(features);
        all
    }

    #[inline]
    pub fn now(&self) -> SystemTime {
        self.clock.now()
    }

    fn disable(
        &self,
        operation_id: &str,
        feature: &str,
        backoff: Duration,
        error_message: &str,
        description: String,
    ) -> ErrorOutcome {
        let record = self
            .disabled
            .mark_disabled(operation_id, feature, backoff, error_message);
        ErrorOutcome::Suppressed {
            error: FeatureError {
                operation: operation_id.into(),
                feature: feature.into(),
                message: description,
            },
            reenable_at: record.reenable_at,
            attempts: record.attempts,
        }
    }

    fn take_trials(&self, operation_id: &str) -> Vec<FeatureName> {
        self.trials.lock().remove(operation_id).unwrap_or_default()
    }

    /// Run `f` against the global breaker or an existing feature breaker
    fn with_breaker(&self, name: &str, f: impl FnOnce(&CircuitBreaker)) {
        if name == GLOBAL_BREAKER {
            f(&self.global);
        } else if let Some(breaker) = self.existing_breaker(name) {
            f(&breaker);
        }
    }

    /// Feature breaker bound to the operation, if it is open and cooling down
    ///
    /// A failed half-open trial must still reach the breaker, so only the
    /// Open state short-circuits.
    fn open_binding(&self, operation_id: &str) -> Option<FeatureName> {
        let feature = self.bindings.read().get(operation_id).cloned()?;
        let breaker = self.existing_breaker(&feature)?;
        breaker.is_open().then_some(feature)
    }

    /// Get or lazily create the breaker for a feature
    fn feature_breaker(&self, feature: &str, backoff: Duration) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.existing_breaker(feature) {
            return breaker;
        }

        let mut breakers = self.feature_breakers.write();
        // Another writer may have created it between the two locks
        if let Some(breaker) = breakers.get(feature) {
            return breaker.clone();
        }

        let cooldown = if backoff.is_zero() {
            DEFAULT_FEATURE_COOLDOWN
        } else {
            backoff
        };
        let breaker = Arc::new(CircuitBreaker::new(
            feature,
            self.config.with_cooldown(cooldown),
            self.clock.clone(),
        ));
        breakers.insert(feature.into(), breaker.clone());
        debug!(feature = feature, cooldown_secs = cooldown.as_secs(), "Created feature breaker");
        breaker
    }
}

impl fmt::Debug for FeatureAwareBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureAwareBreaker")
            .field("global", &self.global.state())
            .field("feature_breakers", &self.feature_breakers.read().len())
            .field("patterns", &self.patterns.load().len())
            .field("disabled", &self.disabled.len())
            .field("pending_trials", &self.trials.lock().len())
            .field("fallbacks", &self.fallbacks.len())
            .finish()
    }
}

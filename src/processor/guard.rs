/*!
 * Guard Processor
 * Runs every execution report through the breaker and the sampler
 *
 * Failures are classified first (disable, fallback or breaker trip); every
 * report, failed or not, then feeds the statistics that drive its sampling
 * rate. Shared state sync happens off the hot path.
 */

use super::traits::Processor;
use super::types::Verdict;
use crate::breaker::{
    Admission, BreakerSnapshot, DisabledOperation, ErrorOutcome, FeatureAwareBreaker,
    FeatureDetector, OperationRequirements, PatternTable, StaticDetector,
};
use crate::config::GuardConfig;
use crate::core::{ExecutionReport, GuardResult, QueryMetrics, SharedClock};
use crate::monitoring::counters::{
    CountersSnapshot, GuardCounters, REJECTED_ADMISSIONS, REPORTS_PROCESSED, SAMPLED_IN,
    SAMPLED_OUT, SHORT_CIRCUITS, SUCCESSES,
};
use crate::sampling::{AdaptiveSampler, OperationStats, SampleDecision};
use crate::sync::{NoopStore, SharedStore, StateSynchronizer, SyncTask};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct GuardProcessor {
    breaker: FeatureAwareBreaker,
    sampler: Arc<AdaptiveSampler>,
    synchronizer: Arc<StateSynchronizer>,
    counters: Arc<GuardCounters>,
    task: Mutex<Option<SyncTask>>,
}

impl GuardProcessor {
    /// Build from a validated configuration
    pub fn new(
        config: GuardConfig,
        store: Arc<dyn SharedStore>,
        clock: SharedClock,
    ) -> GuardResult<Self> {
        config.validate()?;

        let patterns = config.pattern_table()?;
        let pattern_count = patterns.len();
        let breaker = FeatureAwareBreaker::new(config.breaker.clone(), patterns, clock.clone());
        for (primary, fallback) in &config.fallbacks {
            breaker.set_fallback_query(primary, fallback);
        }
        if let Some(features) = &config.features {
            breaker.set_detector(Arc::new(StaticDetector::new(features.iter())));
        }

        let counters = Arc::new(GuardCounters::new());
        let sampler = Arc::new(AdaptiveSampler::new(&config.sampler, clock.clone()));
        let synchronizer = Arc::new(StateSynchronizer::new(
            Arc::clone(&sampler),
            store,
            config.sync.clone(),
            Arc::clone(&counters),
            clock,
        ));

        info!(
            patterns = pattern_count,
            fallbacks = config.fallbacks.len(),
            max_records_per_second = config.sampler.max_records_per_second,
            sync = config.sync.enabled,
            "Guard processor created"
        );

        Ok(Self {
            breaker,
            sampler,
            synchronizer,
            counters,
            task: Mutex::new(None),
        })
    }

    /// Defaults, no shared store, system clock
    pub fn with_defaults() -> GuardResult<Self> {
        Self::new(
            GuardConfig::default(),
            Arc::new(NoopStore),
            crate::core::system_clock(),
        )
    }

    /// Classify a failure and dispatch its action
    pub fn process_error<E>(&self, err: &E, operation_id: &str) -> ErrorOutcome
    where
        E: fmt::Display + ?Sized,
    {
        let outcome = self.breaker.process_error(err, operation_id);
        self.counters.inc_error(outcome.kind());
        if matches!(outcome, ErrorOutcome::ShortCircuited { .. }) {
            self.counters.inc(SHORT_CIRCUITS);
        }
        outcome
    }

    /// Record a success, re-enabling the operation if it was disabled
    pub fn process_success(&self, operation_id: &str) {
        self.breaker.process_success(operation_id);
        self.counters.inc(SUCCESSES);
    }

    /// Observe one execution and return its sampling probability
    ///
    /// May detach a shared-state sync when one is due.
    pub fn calculate_sample_rate(&self, operation_id: &str, metrics: &QueryMetrics) -> f64 {
        let rate = self.sampler.calculate_sample_rate(operation_id, metrics);
        if self.synchronizer.maybe_schedule() {
            debug!("Scheduled opportunistic state sync");
        }
        rate
    }

    /// Random draw against a probability
    pub fn should_sample(&self, rate: f64) -> SampleDecision {
        let decision = self.sampler.should_sample(rate);
        self.counters.inc(if decision.is_accept() {
            SAMPLED_IN
        } else {
            SAMPLED_OUT
        });
        decision
    }

    /// Gate an operation before it is attempted
    pub fn check_operation(&self, operation_id: &str) -> Admission {
        let admission = self.breaker.check_operation(operation_id);
        if !admission.is_allowed() {
            self.counters.inc(REJECTED_ADMISSIONS);
        }
        admission
    }

    pub fn validate_operation(&self, requirements: &OperationRequirements) -> GuardResult<()> {
        self.breaker.validate_operation(requirements)
    }

    pub fn set_detector(&self, detector: Arc<dyn FeatureDetector>) {
        self.breaker.set_detector(detector);
    }

    pub fn set_fallback_query(&self, primary: &str, fallback: &str) {
        self.breaker.set_fallback_query(primary, fallback);
    }

    pub fn get_disabled_operations(&self) -> Vec<DisabledOperation> {
        self.breaker.get_disabled_operations()
    }

    pub fn breaker_snapshots(&self) -> Vec<BreakerSnapshot> {
        self.breaker.breaker_snapshots()
    }

    pub fn reload_patterns(&self, table: PatternTable) {
        self.breaker.reload_patterns(table);
    }

    pub fn stats(&self, operation_id: &str) -> Option<OperationStats> {
        self.sampler.stats(operation_id)
    }

    pub fn counters(&self) -> CountersSnapshot {
        self.counters.snapshot()
    }

    pub fn breaker(&self) -> &FeatureAwareBreaker {
        &self.breaker
    }

    pub fn sampler(&self) -> &Arc<AdaptiveSampler> {
        &self.sampler
    }

    pub fn synchronizer(&self) -> &Arc<StateSynchronizer> {
        &self.synchronizer
    }

    /// Whether the periodic sync task is running
    pub fn is_running(&self) -> bool {
        self.task.lock().is_some()
    }
}

#[async_trait]
impl Processor for GuardProcessor {
    async fn init(&self) -> GuardResult<()> {
        if !self.synchronizer.config().enabled {
            info!("Shared state sync disabled");
            return Ok(());
        }

        // Load failures leave the guard with local state only
        let _ = self.synchronizer.load().await;

        let mut task = self.task.lock();
        if task.is_none() {
            *task = Some(SyncTask::spawn(Arc::clone(&self.synchronizer)));
        }
        Ok(())
    }

    fn process(&self, report: &ExecutionReport) -> Verdict {
        self.counters.inc(REPORTS_PROCESSED);
        let operation_id = report.operation_id.as_str();

        let outcome = match &report.error {
            Some(err) => Some(self.process_error(err.as_str(), operation_id)),
            None => {
                self.process_success(operation_id);
                None
            }
        };

        let sample_rate = self.calculate_sample_rate(operation_id, &QueryMetrics::from(report));
        let decision = self.should_sample(sample_rate);

        Verdict {
            operation_id: report.operation_id.clone(),
            outcome,
            sample_rate,
            decision,
        }
    }

    async fn shutdown(&self) -> GuardResult<()> {
        let task = self.task.lock().take();
        if let Some(task) = task {
            task.shutdown().await;
        }

        if self.synchronizer.config().enabled {
            if let Err(e) = self.synchronizer.sync().await {
                warn!(error = %e, "Final state sync failed");
            }
        }

        info!(
            reports = self.counters.get(REPORTS_PROCESSED),
            disabled = self.breaker.get_disabled_operations().len(),
            "Guard processor shut down"
        );
        Ok(())
    }
}

impl fmt::Debug for GuardProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardProcessor")
            .field("breaker", &self.breaker)
            .field("sampler", &self.sampler)
            .field("synchronizer", &self.synchronizer)
            .finish()
    }
}

/*!
 * Circuit Breaker State Machine
 *
 * Closed -> Open: failures inside the sliding window reach the threshold
 * Open -> HalfOpen: cooldown elapsed, one trial call admitted
 * HalfOpen -> Closed: trial succeeded
 * HalfOpen -> Open: trial failed, cooldown restarts
 *
 * The Open -> HalfOpen edge is taken lazily by whichever call first
 * observes the elapsed cooldown. A trial whose outcome never arrives is
 * forgotten after one more cooldown, so a lost report cannot pin the
 * breaker in HalfOpen.
 */

use crate::config::BreakerConfig;
use crate::core::time::elapsed_between;
use crate::core::{FeatureName, SharedClock};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds, TimestampSeconds};
use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

/// Breaker position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        })
    }
}

/// Answer of one admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permit {
    Rejected,
    /// Closed breaker, nothing to resolve afterwards
    Pass,
    /// The single half-open trial; its outcome must be recorded or released
    Trial,
}

impl Permit {
    #[inline]
    pub fn is_admitted(self) -> bool {
        !matches!(self, Permit::Rejected)
    }
}

/// Point-in-time view of one breaker
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    pub name: FeatureName,
    pub state: BreakerState,
    pub failure_count: u32,
    #[serde_as(as = "Option<TimestampSeconds<i64>>")]
    pub opened_at: Option<SystemTime>,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub cooldown: Duration,
    pub trips: u64,
    pub last_error: Option<String>,
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    /// Failure timestamps inside the window, oldest first
    failures: VecDeque<SystemTime>,
    opened_at: Option<SystemTime>,
    /// Admission time of the outstanding half-open trial
    trial_started: Option<SystemTime>,
    trips: u64,
    last_error: Option<String>,
}

/// Failure-counting breaker guarding one operation class
#[derive(Debug)]
pub struct CircuitBreaker {
    name: FeatureName,
    config: BreakerConfig,
    clock: SharedClock,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<FeatureName>, config: BreakerConfig, clock: SharedClock) -> Self {
        Self {
            name: name.into(),
            config,
            clock,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                failures: VecDeque::new(),
                opened_at: None,
                trial_started: None,
                trips: 0,
                last_error: None,
            }),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn cooldown(&self) -> Duration {
        self.config.open_cooldown
    }

    /// Current state, taking the lazy Open -> HalfOpen edge if due
    pub fn state(&self) -> BreakerState {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        self.refresh(&mut inner, now);
        inner.state
    }

    /// Admit or reject a call
    ///
    /// In HalfOpen exactly one trial is admitted until its outcome is recorded.
    pub fn allow(&self) -> bool {
        self.admit().is_admitted()
    }

    /// Admit or reject a call, telling a closed pass from the half-open trial
    pub fn admit(&self) -> Permit {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        self.refresh(&mut inner, now);

        match inner.state {
            BreakerState::Closed => Permit::Pass,
            BreakerState::Open => Permit::Rejected,
            BreakerState::HalfOpen => {
                if inner.trial_started.is_some() {
                    Permit::Rejected
                } else {
                    inner.trial_started = Some(now);
                    debug!(breaker = %self.name, "Admitting half-open trial call");
                    Permit::Trial
                }
            }
        }
    }

    /// Hand back a trial slot whose call was never attempted
    pub fn release_trial(&self) {
        let mut inner = self.inner.lock();
        if inner.state == BreakerState::HalfOpen && inner.trial_started.take().is_some() {
            debug!(breaker = %self.name, "Released unused half-open trial");
        }
    }

    /// Resolve an outstanding trial as failed, whatever the failure was blamed on
    ///
    /// Does nothing unless the breaker is HalfOpen.
    pub fn fail_trial(&self, message: &str) -> BreakerState {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        self.refresh(&mut inner, now);

        if inner.state == BreakerState::HalfOpen {
            inner.last_error = Some(message.to_string());
            warn!(breaker = %self.name, "Half-open trial failed, reopening");
            self.trip(&mut inner, now);
        }
        inner.state
    }

    /// Whether calls are currently rejected, without consuming the trial slot
    pub fn is_short_circuiting(&self) -> bool {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        self.refresh(&mut inner, now);
        match inner.state {
            BreakerState::Closed => false,
            BreakerState::Open => true,
            BreakerState::HalfOpen => inner.trial_started.is_some(),
        }
    }

    /// Open with the cooldown still running
    pub fn is_open(&self) -> bool {
        let now = self.clock.now();
        let inner = self.inner.lock();
        inner.state == BreakerState::Open && !self.cooldown_elapsed(&inner, now)
    }

    /// Record a failed call
    pub fn record_failure(&self, message: &str) -> BreakerState {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        self.refresh(&mut inner, now);
        inner.last_error = Some(message.to_string());

        match inner.state {
            BreakerState::Closed => {
                inner.failures.push_back(now);
                self.prune(&mut inner, now);
                if inner.failures.len() as u32 >= self.config.failure_threshold {
                    self.trip(&mut inner, now);
                }
            }
            BreakerState::HalfOpen => {
                warn!(breaker = %self.name, "Half-open trial failed, reopening");
                self.trip(&mut inner, now);
            }
            BreakerState::Open => {}
        }

        inner.state
    }

    /// Record a successful call
    pub fn record_success(&self) -> BreakerState {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        self.refresh(&mut inner, now);

        match inner.state {
            BreakerState::Closed => inner.failures.clear(),
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Closed;
                inner.failures.clear();
                inner.opened_at = None;
                inner.trial_started = None;
                info!(breaker = %self.name, "Circuit breaker transitioned to CLOSED");
            }
            BreakerState::Open => {}
        }

        inner.state
    }

    /// Force the breaker back to Closed
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = BreakerState::Closed;
        inner.failures.clear();
        inner.opened_at = None;
        inner.trial_started = None;
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        self.refresh(&mut inner, now);
        self.prune(&mut inner, now);

        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failures.len() as u32,
            opened_at: inner.opened_at,
            cooldown: self.config.open_cooldown,
            trips: inner.trips,
            last_error: inner.last_error.clone(),
        }
    }

    fn trip(&self, inner: &mut Inner, now: SystemTime) {
        inner.state = BreakerState::Open;
        inner.opened_at = Some(now);
        inner.trial_started = None;
        inner.trips += 1;
        warn!(
            breaker = %self.name,
            failure_count = inner.failures.len(),
            cooldown_secs = self.config.open_cooldown.as_secs(),
            trips = inner.trips,
            last_error = inner.last_error.as_deref().unwrap_or(""),
            "Circuit breaker transitioned to OPEN"
        );
    }

    fn refresh(&self, inner: &mut Inner, now: SystemTime) {
        match inner.state {
            BreakerState::Open if self.cooldown_elapsed(inner, now) => {
                inner.state = BreakerState::HalfOpen;
                inner.trial_started = None;
                info!(breaker = %self.name, "Circuit breaker transitioned to HALF-OPEN");
            }
            BreakerState::HalfOpen => {
                let stale = inner
                    .trial_started
                    .is_some_and(|at| elapsed_between(at, now) >= self.config.open_cooldown);
                if stale {
                    inner.trial_started = None;
                    warn!(breaker = %self.name, "Half-open trial outcome never arrived, slot expired");
                }
            }
            _ => {}
        }
    }

    fn cooldown_elapsed(&self, inner: &Inner, now: SystemTime) -> bool {
        inner
            .opened_at
            .map(|at| elapsed_between(at, now) >= self.config.open_cooldown)
            .unwrap_or(true)
    }

    fn prune(&self, inner: &mut Inner, now: SystemTime) {
        while let Some(&oldest) = inner.failures.front() {
            if elapsed_between(oldest, now) > self.config.failure_window {
                inner.failures.pop_front();
            } else {
                break;
            }
        }
    }
}

//! Circuit breaker for backend protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: backend assumed down, requests fail fast
//! - Half-Open: a limited number of trial calls test the backend
//!
//! # State Transitions
//! ```text
//! Closed → Open: window full and failure rate >= threshold
//! Open → Half-Open: after wait duration (checked lazily on acquire)
//! Half-Open → Closed: every trial call succeeded (window cleared)
//! Half-Open → Open: any trial call failed
//! ```
//!
//! # Design Decisions
//! - One breaker per name, created lazily in a sharded registry
//! - Each breaker has its own mutex; window append, status change and
//!   permit accounting happen in one critical section
//! - Calls go through a `CallPermit`; rejections never touch the window
//! - Outcomes from calls admitted before the last state change are
//!   recorded but do not decide a half-open trial

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;

use crate::config::schema::CircuitBreakerConfig;
use crate::error::GatewayError;
use crate::observability::metrics;

/// Breaker status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Outcome of one backend call attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Success,
    Failure,
    /// Completed, but slower than the slow-call threshold.
    SlowSuccess,
}

impl CallOutcome {
    /// Whether the outcome counts against the failure rate.
    pub fn is_failure(&self) -> bool {
        !matches!(self, CallOutcome::Success)
    }
}

/// Tuning shared by every breaker of a registry.
#[derive(Debug, Clone)]
pub struct BreakerSettings {
    pub window_size: usize,
    pub failure_rate_threshold: f32,
    pub wait_duration_in_open_state: Duration,
    pub permitted_calls_in_half_open_state: u32,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self::from(&CircuitBreakerConfig::default())
    }
}

impl From<&CircuitBreakerConfig> for BreakerSettings {
    fn from(config: &CircuitBreakerConfig) -> Self {
        Self {
            window_size: config.sliding_window_size.max(1),
            failure_rate_threshold: config.failure_rate_threshold,
            wait_duration_in_open_state: Duration::from_millis(config.wait_duration_in_open_state_ms),
            permitted_calls_in_half_open_state: config.permitted_calls_in_half_open_state.max(1),
        }
    }
}

/// Fixed-capacity record of the most recent outcomes.
#[derive(Debug)]
struct SlidingWindow {
    outcomes: VecDeque<CallOutcome>,
    capacity: usize,
    failures: usize,
}

impl SlidingWindow {
    fn new(capacity: usize) -> Self {
        Self {
            outcomes: VecDeque::with_capacity(capacity),
            capacity,
            failures: 0,
        }
    }

    fn push(&mut self, outcome: CallOutcome) {
        if self.outcomes.len() == self.capacity {
            if let Some(evicted) = self.outcomes.pop_front() {
                if evicted.is_failure() {
                    self.failures -= 1;
                }
            }
        }
        if outcome.is_failure() {
            self.failures += 1;
        }
        self.outcomes.push_back(outcome);
    }

    fn is_full(&self) -> bool {
        self.outcomes.len() >= self.capacity
    }

    fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Failure percentage over the buffered outcomes.
    fn failure_rate(&self) -> f32 {
        if self.outcomes.is_empty() {
            return 0.0;
        }
        self.failures as f32 * 100.0 / self.outcomes.len() as f32
    }

    fn clear(&mut self) {
        self.outcomes.clear();
        self.failures = 0;
    }
}

#[derive(Debug)]
struct BreakerCore {
    state: CircuitState,
    window: SlidingWindow,
    opened_at: Option<Instant>,
    half_open_permits: u32,
    half_open_successes: u32,
    /// Bumped on every transition; ties trial permits to one half-open phase.
    generation: u64,
}

/// Point-in-time view of a breaker, for the admin API.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub buffered_calls: usize,
    pub failed_calls: usize,
    pub failure_rate: f32,
    pub half_open_permits: u32,
}

/// Circuit breaker guarding one backend.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    settings: BreakerSettings,
    core: Mutex<BreakerCore>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, settings: BreakerSettings) -> Self {
        let window = SlidingWindow::new(settings.window_size);
        Self {
            name: name.into(),
            settings,
            core: Mutex::new(BreakerCore {
                state: CircuitState::Closed,
                window,
                opened_at: None,
                half_open_permits: 0,
                half_open_successes: 0,
                generation: 0,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ask to make a call.
    ///
    /// Returns a permit that must be resolved with [`CallPermit::record`],
    /// or `BreakerOpen` when the call must not reach the backend.
    pub fn try_acquire(self: &Arc<Self>) -> Result<CallPermit, GatewayError> {
        let mut core = self.lock();

        if core.state == CircuitState::Open {
            let waited = core
                .opened_at
                .map_or(true, |at| at.elapsed() >= self.settings.wait_duration_in_open_state);
            if waited {
                self.transition(&mut core, CircuitState::HalfOpen);
            }
        }

        let state = core.state;
        match state {
            CircuitState::Closed => Ok(CallPermit::new(self, core.generation, false)),
            CircuitState::HalfOpen if core.half_open_permits > 0 => {
                core.half_open_permits -= 1;
                Ok(CallPermit::new(self, core.generation, true))
            }
            _ => {
                metrics::record_breaker_rejection(&self.name);
                Err(GatewayError::BreakerOpen {
                    name: self.name.clone(),
                })
            }
        }
    }

    /// Current status as last transitioned.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let core = self.lock();
        BreakerSnapshot {
            name: self.name.clone(),
            state: core.state,
            buffered_calls: core.window.len(),
            failed_calls: core.window.failures,
            failure_rate: core.window.failure_rate(),
            half_open_permits: core.half_open_permits,
        }
    }

    fn on_outcome(&self, outcome: CallOutcome, generation: u64, trial: bool) {
        let mut core = self.lock();
        core.window.push(outcome);

        let state = core.state;
        match state {
            CircuitState::Closed => {
                if core.window.is_full()
                    && core.window.failure_rate() >= self.settings.failure_rate_threshold
                {
                    self.transition(&mut core, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen if trial && generation == core.generation => {
                if outcome.is_failure() {
                    self.transition(&mut core, CircuitState::Open);
                } else {
                    core.half_open_successes += 1;
                    if core.half_open_successes >= self.settings.permitted_calls_in_half_open_state {
                        self.transition(&mut core, CircuitState::Closed);
                    }
                }
            }
            _ => {}
        }
    }

    fn release_trial(&self, generation: u64) {
        let mut core = self.lock();
        if core.state == CircuitState::HalfOpen && core.generation == generation {
            core.half_open_permits += 1;
        }
    }

    fn transition(&self, core: &mut BreakerCore, to: CircuitState) {
        let from = core.state;
        core.state = to;
        core.generation += 1;

        match to {
            CircuitState::Open => {
                core.opened_at = Some(Instant::now());
                core.half_open_permits = 0;
                core.half_open_successes = 0;
                tracing::warn!(
                    breaker = %self.name,
                    from = from.as_str(),
                    failure_rate = core.window.failure_rate(),
                    buffered_calls = core.window.len(),
                    "Circuit breaker opened"
                );
            }
            CircuitState::HalfOpen => {
                core.half_open_permits = self.settings.permitted_calls_in_half_open_state;
                core.half_open_successes = 0;
                tracing::info!(
                    breaker = %self.name,
                    permits = core.half_open_permits,
                    "Circuit breaker half-open, probing backend"
                );
            }
            CircuitState::Closed => {
                core.opened_at = None;
                core.half_open_permits = 0;
                core.half_open_successes = 0;
                core.window.clear();
                tracing::info!(breaker = %self.name, "Circuit breaker closed");
            }
        }

        metrics::record_breaker_transition(&self.name, to.as_str());
    }

    fn lock(&self) -> MutexGuard<'_, BreakerCore> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Admission for a single call attempt.
///
/// Dropping an unrecorded half-open permit hands the trial slot back, so a
/// cancelled request cannot leave the breaker stuck half-open.
#[derive(Debug)]
pub struct CallPermit {
    breaker: Arc<CircuitBreaker>,
    generation: u64,
    trial: bool,
    recorded: bool,
}

impl CallPermit {
    fn new(breaker: &Arc<CircuitBreaker>, generation: u64, trial: bool) -> Self {
        Self {
            breaker: Arc::clone(breaker),
            generation,
            trial,
            recorded: false,
        }
    }

    /// Whether this is a half-open trial call.
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    /// Feed the call outcome into the breaker.
    pub fn record(mut self, outcome: CallOutcome) {
        self.recorded = true;
        self.breaker.on_outcome(outcome, self.generation, self.trial);
    }
}

impl Drop for CallPermit {
    fn drop(&mut self) {
        if !self.recorded && self.trial {
            self.breaker.release_trial(self.generation);
        }
    }
}

/// Breakers keyed by name, created on first use and kept for the process lifetime.
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    settings: BreakerSettings,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    pub fn new(settings: BreakerSettings) -> Self {
        Self {
            settings,
            breakers: DashMap::new(),
        }
    }

    /// Get or create the breaker for `name`.
    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.get(name) {
            return Arc::clone(&breaker);
        }

        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::debug!(breaker = %name, "Circuit breaker created");
                Arc::new(CircuitBreaker::new(name, self.settings.clone()))
            })
            .clone()
    }

    /// Look up an existing breaker without creating it.
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|b| Arc::clone(&b))
    }

    /// Snapshots of every breaker, sorted by name.
    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        let mut snapshots: Vec<BreakerSnapshot> =
            self.breakers.iter().map(|entry| entry.value().snapshot()).collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn settings(wait: Duration) -> BreakerSettings {
        BreakerSettings {
            window_size: 10,
            failure_rate_threshold: 50.0,
            wait_duration_in_open_state: wait,
            permitted_calls_in_half_open_state: 5,
        }
    }

    fn breaker(wait: Duration) -> Arc<CircuitBreaker> {
        Arc::new(CircuitBreaker::new("customer-service", settings(wait)))
    }

    fn call(cb: &Arc<CircuitBreaker>, outcome: CallOutcome) {
        cb.try_acquire().expect("call should be permitted").record(outcome);
    }

    fn open_breaker(cb: &Arc<CircuitBreaker>) {
        for _ in 0..10 {
            call(cb, CallOutcome::Failure);
        }
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn test_window_evicts_oldest() {
        let mut window = SlidingWindow::new(3);
        window.push(CallOutcome::Failure);
        window.push(CallOutcome::Success);
        window.push(CallOutcome::SlowSuccess);
        assert_eq!(window.failures, 2);

        window.push(CallOutcome::Success);
        assert_eq!(window.len(), 3);
        assert_eq!(window.failures, 1);
    }

    #[test]
    fn test_failures_then_successes_open() {
        let cb = breaker(Duration::from_secs(10));
        for _ in 0..5 {
            call(&cb, CallOutcome::Failure);
        }
        // Window not full yet.
        assert_eq!(cb.state(), CircuitState::Closed);
        for _ in 0..5 {
            call(&cb, CallOutcome::Success);
        }
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn test_below_threshold_stays_closed() {
        let cb = breaker(Duration::from_secs(10));
        for i in 0..20 {
            let outcome = if i % 3 == 0 { CallOutcome::Failure } else { CallOutcome::Success };
            call(&cb, outcome);
        }
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_slow_calls_count_as_failures() {
        let cb = breaker(Duration::from_secs(10));
        for _ in 0..5 {
            call(&cb, CallOutcome::SlowSuccess);
        }
        for _ in 0..5 {
            call(&cb, CallOutcome::Success);
        }
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn test_open_rejects_without_recording() {
        let cb = breaker(Duration::from_secs(10));
        open_breaker(&cb);

        let before = cb.snapshot().buffered_calls;
        for _ in 0..3 {
            assert!(matches!(cb.try_acquire(), Err(GatewayError::BreakerOpen { .. })));
        }
        assert_eq!(cb.snapshot().buffered_calls, before);
    }

    #[test]
    fn test_half_open_allows_exact_permits() {
        let cb = breaker(Duration::from_millis(50));
        open_breaker(&cb);
        thread::sleep(Duration::from_millis(60));

        let permits: Vec<CallPermit> = (0..5).map(|_| cb.try_acquire().unwrap()).collect();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(permits.iter().all(CallPermit::is_trial));
        assert!(cb.try_acquire().is_err());

        for permit in permits {
            permit.record(CallOutcome::Success);
        }
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.snapshot().buffered_calls, 0);
    }

    #[test]
    fn test_single_trial_failure_reopens() {
        let cb = breaker(Duration::from_millis(50));
        open_breaker(&cb);
        thread::sleep(Duration::from_millis(60));

        let mut permits: Vec<CallPermit> = (0..5).map(|_| cb.try_acquire().unwrap()).collect();
        let failing = permits.remove(2);
        for permit in permits.drain(..2) {
            permit.record(CallOutcome::Success);
        }
        failing.record(CallOutcome::Failure);
        assert_eq!(cb.state(), CircuitState::Open);

        // Late successes from the same trial round do not close it again.
        for permit in permits {
            permit.record(CallOutcome::Success);
        }
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.try_acquire().is_err());
    }

    #[test]
    fn test_dropped_trial_permit_is_returned() {
        let cb = breaker(Duration::from_millis(20));
        open_breaker(&cb);
        thread::sleep(Duration::from_millis(30));

        let abandoned = cb.try_acquire().unwrap();
        assert_eq!(cb.snapshot().half_open_permits, 4);
        drop(abandoned);
        assert_eq!(cb.snapshot().half_open_permits, 5);
    }

    #[test]
    fn test_stale_outcome_does_not_decide_trial() {
        let cb = breaker(Duration::from_millis(20));
        let stale = cb.try_acquire().unwrap();
        open_breaker(&cb);
        thread::sleep(Duration::from_millis(30));

        let trial = cb.try_acquire().unwrap();
        stale.record(CallOutcome::Failure);
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        trial.record(CallOutcome::Success);
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn test_concurrent_recording() {
        let cb = breaker(Duration::from_secs(10));
        thread::scope(|s| {
            for _ in 0..8 {
                let cb = Arc::clone(&cb);
                s.spawn(move || {
                    for _ in 0..100 {
                        if let Ok(permit) = cb.try_acquire() {
                            permit.record(CallOutcome::Success);
                        }
                    }
                });
            }
        });
        let snapshot = cb.snapshot();
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.buffered_calls, 10);
        assert_eq!(snapshot.failed_calls, 0);
    }

    #[test]
    fn test_registry_shares_instances() {
        let registry = CircuitBreakerRegistry::new(settings(Duration::from_secs(10)));
        assert!(registry.get("auth-service").is_none());

        let a = registry.get_or_create("auth-service");
        let b = registry.get_or_create("auth-service");
        let c = registry.get_or_create("customer-service");

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(registry.len(), 2);

        let names: Vec<String> = registry.snapshots().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["auth-service", "customer-service"]);
    }
}

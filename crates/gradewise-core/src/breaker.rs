//! Per-dependency circuit breakers and the registry that owns them.
//!
//! A breaker counts failures in a rolling window. Reaching the threshold
//! opens it; open breakers reject calls without touching the network. After
//! the reset timeout it goes half-open and admits exactly one trial call,
//! whose outcome closes or reopens it.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::ServiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Thresholds for a circuit breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Failures within the window that open the breaker.
    pub failure_threshold: u32,
    /// Length of the rolling failure window.
    pub monitoring_window_ms: u64,
    /// Time spent open before a trial call is admitted.
    pub reset_timeout_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            monitoring_window_ms: 5 * 60 * 1000,
            reset_timeout_ms: 60 * 1000,
        }
    }
}

impl BreakerConfig {
    pub fn monitoring_window(&self) -> Duration {
        Duration::from_millis(self.monitoring_window_ms)
    }

    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failures: VecDeque<Instant>,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

/// Circuit breaker guarding one external dependency.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: &str, config: BreakerConfig) -> Self {
        Self {
            name: name.to_string(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failures: VecDeque::new(),
                opened_at: None,
                trial_in_flight: false,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    pub fn state(&self) -> CircuitState {
        let mut inner = self.lock();
        self.refresh(&mut inner);
        inner.state
    }

    /// Ask to make a call. Fails with [`ServiceError::CircuitOpen`] while open,
    /// and while half-open with a trial already in flight.
    pub fn try_acquire(&self) -> Result<Permit<'_>, ServiceError> {
        let mut inner = self.lock();
        self.refresh(&mut inner);
        match inner.state {
            CircuitState::Closed => Ok(Permit::new(self, false)),
            CircuitState::HalfOpen if !inner.trial_in_flight => {
                inner.trial_in_flight = true;
                tracing::debug!(breaker = %self.name, "admitting trial call");
                Ok(Permit::new(self, true))
            }
            CircuitState::HalfOpen | CircuitState::Open => Err(ServiceError::CircuitOpen {
                dependency: self.name.clone(),
            }),
        }
    }

    /// Run `op` under the breaker, recording its outcome. Only retryable
    /// errors count as failures; a 404 or an unusable payload means the
    /// dependency answered.
    pub async fn call<T, F, Fut>(&self, op: F) -> Result<T, ServiceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let permit = self.try_acquire()?;
        let result = op().await;
        match &result {
            Err(e) if e.is_retryable() => permit.failure(),
            _ => permit.success(),
        }
        result
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn refresh(&self, inner: &mut BreakerInner) {
        if inner.state != CircuitState::Open {
            return;
        }
        let Some(opened_at) = inner.opened_at else {
            return;
        };
        if opened_at.elapsed() >= self.config.reset_timeout() {
            inner.state = CircuitState::HalfOpen;
            inner.trial_in_flight = false;
            tracing::info!(breaker = %self.name, "circuit half-open");
        }
    }

    fn on_success(&self, trial: bool) {
        let mut inner = self.lock();
        if inner.state == CircuitState::HalfOpen && trial {
            inner.state = CircuitState::Closed;
            inner.failures.clear();
            inner.opened_at = None;
            inner.trial_in_flight = false;
            tracing::info!(breaker = %self.name, "circuit closed");
        }
    }

    fn on_failure(&self, trial: bool) {
        let mut inner = self.lock();
        let now = Instant::now();
        match inner.state {
            CircuitState::Closed => {
                let window = self.config.monitoring_window();
                inner.failures.push_back(now);
                while inner
                    .failures
                    .front()
                    .is_some_and(|at| now.duration_since(*at) > window)
                {
                    inner.failures.pop_front();
                }
                if inner.failures.len() as u32 >= self.config.failure_threshold {
                    self.open(&mut inner, now);
                }
            }
            CircuitState::HalfOpen if trial => self.open(&mut inner, now),
            // Late results from calls admitted before the breaker opened.
            CircuitState::HalfOpen | CircuitState::Open => {}
        }
    }

    fn open(&self, inner: &mut BreakerInner, now: Instant) {
        inner.state = CircuitState::Open;
        inner.opened_at = Some(now);
        inner.failures.clear();
        inner.trial_in_flight = false;
        tracing::warn!(
            breaker = %self.name,
            reset_after_ms = self.config.reset_timeout_ms,
            "circuit opened"
        );
    }
}

/// Admission to call through a breaker. Dropping an unsettled trial permit
/// counts as a failed trial.
#[must_use]
pub struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl<'a> Permit<'a> {
    fn new(breaker: &'a CircuitBreaker, trial: bool) -> Self {
        Self {
            breaker,
            trial,
            settled: false,
        }
    }

    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn success(mut self) {
        self.settled = true;
        self.breaker.on_success(self.trial);
    }

    pub fn failure(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.trial);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.settled && self.trial {
            self.breaker.on_failure(true);
        }
    }
}

/// Process-wide set of breakers keyed by dependency name.
///
/// Built once at startup and shared by `Arc`. Breakers are created on first
/// use and live as long as the registry.
#[derive(Debug, Default)]
pub struct BreakerRegistry {
    defaults: BreakerConfig,
    overrides: HashMap<String, BreakerConfig>,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new(defaults: BreakerConfig) -> Self {
        Self {
            defaults,
            overrides: HashMap::new(),
            breakers: Mutex::new(HashMap::new()),
        }
    }

    /// Use `config` instead of the defaults for `dependency`.
    pub fn with_override(mut self, dependency: &str, config: BreakerConfig) -> Self {
        self.overrides.insert(dependency.to_string(), config);
        self
    }

    /// The breaker for `dependency`, created on first request.
    pub fn breaker(&self, dependency: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(breakers.entry(dependency.to_string()).or_insert_with(|| {
            let config = self
                .overrides
                .get(dependency)
                .cloned()
                .unwrap_or_else(|| self.defaults.clone());
            Arc::new(CircuitBreaker::new(dependency, config))
        }))
    }

    /// Current state of every breaker created so far, sorted by name.
    pub fn states(&self) -> Vec<(String, CircuitState)> {
        let breakers: Vec<Arc<CircuitBreaker>> = self
            .breakers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        let mut states: Vec<(String, CircuitState)> = breakers
            .iter()
            .map(|b| (b.name().to_string(), b.state()))
            .collect();
        states.sort_by(|a, b| a.0.cmp(&b.0));
        states
    }
}

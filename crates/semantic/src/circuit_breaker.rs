//! Per-endpoint circuit breakers for the remote tier.
//!
//! A dead base URL is skipped without another probe until its reset timeout
//! elapses, after which a single half-open attempt decides whether it closes
//! again.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Requests allowed.
    Closed,
    /// Requests rejected until the reset timeout elapses.
    Open,
    /// Trial requests allowed; one failure reopens.
    HalfOpen,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,
    /// Time spent open before a half-open trial, in milliseconds.
    #[serde(with = "crate::serde_millis")]
    pub reset_timeout: Duration,
    /// Half-open successes needed to close.
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 1,
            reset_timeout: Duration::from_secs(30),
            success_threshold: 1,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }

    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failures: u32,
    successes: u32,
    changed_at: Instant,
}

/// Breaker for a single endpoint.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failures: 0,
                successes: 0,
                changed_at: Instant::now(),
            }),
        }
    }

    // State is plain counters; a panic mid-update leaves it usable.
    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Whether a request may go through now. Moves an expired open circuit to
    /// half-open.
    pub fn allow_request(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                if inner.changed_at.elapsed() >= self.config.reset_timeout {
                    inner.state = CircuitState::HalfOpen;
                    inner.successes = 0;
                    inner.changed_at = Instant::now();
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::HalfOpen => {
                inner.successes += 1;
                if inner.successes >= self.config.success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.failures = 0;
                    inner.successes = 0;
                    inner.changed_at = Instant::now();
                }
            }
            CircuitState::Closed => inner.failures = 0,
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.failures += 1;
                inner.changed_at = Instant::now();
            }
            CircuitState::Closed => {
                inner.failures += 1;
                if inner.failures >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.changed_at = Instant::now();
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn current_state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().failures
    }
}

/// Breakers keyed by endpoint base URL.
#[derive(Debug)]
pub struct CircuitBreakerManager {
    breakers: dashmap::DashMap<String, Arc<CircuitBreaker>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreakerManager {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: dashmap::DashMap::new(),
            config,
        }
    }

    pub fn get_or_create(&self, endpoint: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(endpoint.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(self.config)))
            .clone()
    }

    /// Endpoints without a breaker yet count as healthy.
    pub fn is_healthy(&self, endpoint: &str) -> bool {
        self.breakers
            .get(endpoint)
            .map(|b| b.current_state() != CircuitState::Open)
            .unwrap_or(true)
    }

    pub fn reset_all(&self) {
        self.breakers.clear();
    }

    pub fn snapshot(&self) -> Vec<(String, CircuitState, u32)> {
        let mut stats: Vec<_> = self
            .breakers
            .iter()
            .map(|entry| {
                let (endpoint, breaker) = entry.pair();
                (
                    endpoint.clone(),
                    breaker.current_state(),
                    breaker.failure_count(),
                )
            })
            .collect();
        stats.sort_by(|a, b| a.0.cmp(&b.0));
        stats
    }
}

impl Default for CircuitBreakerManager {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

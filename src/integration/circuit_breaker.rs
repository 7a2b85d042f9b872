// SPDX-License-Identifier: MIT

//! Circuit breaker pattern for call targets
//!
//! A breaker knows nothing about which call failed; [`BreakerRegistry`] keys
//! breakers by target name so each service gets its own failure history.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation
    Closed,
    /// Calls rejected until the recovery timeout elapses
    Open,
    /// Probing whether the target recovered
    HalfOpen,
}

/// Configuration for a circuit breaker
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening
    pub failure_threshold: u32,
    /// Time to stay open before probing
    pub recovery_timeout_ms: u64,
    /// Probe calls allowed while half-open
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_ms: 30_000,
            half_open_max_calls: 1,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.recovery_timeout_ms)
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
    half_open_calls: u32,
}

/// Three-state failure gate for one target
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure: None,
                half_open_calls: 0,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        // State stays consistent even if a holder panicked mid-update
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Whether a call may proceed right now
    pub fn can_execute(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure
                    .map(|at| at.elapsed())
                    .unwrap_or(Duration::MAX);
                if elapsed >= self.config.recovery_timeout() {
                    log::info!("Circuit '{}' half-open after {:?}", self.name, elapsed);
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_calls = 0;
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if inner.half_open_calls < self.config.half_open_max_calls {
                    inner.half_open_calls += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        if inner.state == CircuitState::HalfOpen {
            log::info!("Circuit '{}' closed after successful probe", self.name);
            inner.state = CircuitState::Closed;
        }
        inner.failure_count = 0;
        inner.half_open_calls = 0;
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.failure_count = inner.failure_count.saturating_add(1);
        match inner.state {
            CircuitState::HalfOpen => {
                log::warn!("Circuit '{}' re-opened: probe failed", self.name);
                inner.state = CircuitState::Open;
                inner.last_failure = Some(Instant::now());
            }
            CircuitState::Closed if inner.failure_count >= self.config.failure_threshold => {
                log::warn!(
                    "Circuit '{}' opened after {} consecutive failures",
                    self.name,
                    inner.failure_count
                );
                inner.state = CircuitState::Open;
                inner.last_failure = Some(Instant::now());
            }
            CircuitState::Open => {
                inner.last_failure = Some(Instant::now());
            }
            CircuitState::Closed => {}
        }
    }

    /// Force the breaker closed with zeroed counters
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.half_open_calls = 0;
        inner.last_failure = None;
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }
}

/// Breakers keyed by target name, shared across runs
#[derive(Clone, Default)]
pub struct BreakerRegistry {
    config: CircuitBreakerConfig,
    breakers: Arc<RwLock<HashMap<String, Arc<CircuitBreaker>>>>,
}

impl BreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn get_or_create(&self, target: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.read().await.get(target) {
            return breaker.clone();
        }
        let mut breakers = self.breakers.write().await;
        breakers
            .entry(target.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(target, self.config.clone())))
            .clone()
    }

    pub async fn get(&self, target: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.read().await.get(target).cloned()
    }

    pub async fn reset_all(&self) {
        for breaker in self.breakers.read().await.values() {
            breaker.reset();
        }
    }

    /// Snapshot of every known target's state
    pub async fn states(&self) -> HashMap<String, CircuitState> {
        self.breakers
            .read()
            .await
            .iter()
            .map(|(name, breaker)| (name.clone(), breaker.state()))
            .collect()
    }
}

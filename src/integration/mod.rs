// SPDX-License-Identifier: MIT

//! Resilience around external calls: retry policy, circuit breakers, the
//! reliability wrapper and error normalization

pub mod circuit_breaker;
pub mod error;
pub mod reliability;
pub mod retry;
pub mod validation;

pub use circuit_breaker::{BreakerRegistry, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use error::{CallFailure, FailureKind, IntegrationError};
pub use reliability::{Reliability, ReliabilityConfig, ReliableTool};
pub use retry::{RetryOverride, RetryPolicy};

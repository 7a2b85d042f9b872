// SPDX-License-Identifier: MIT

//! Exponential backoff with jitter

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Immutable retry policy; `delay_for_attempt` is a pure function of the attempt
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub exponential_base: f64,
    pub jitter_fraction: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            exponential_base: 2.0,
            jitter_fraction: 0.1,
        }
    }
}

/// Per-step overrides as written in a workflow document
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct RetryOverride {
    pub max_retries: Option<u32>,
    pub base_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub exponential_base: Option<f64>,
    pub jitter_fraction: Option<f64>,
    /// Per-attempt timeout
    pub timeout_ms: Option<u64>,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// A policy that never waits between attempts
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            exponential_base: 1.0,
            jitter_fraction: 0.0,
        }
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_exponential_base(mut self, base: f64) -> Self {
        self.exponential_base = base;
        self
    }

    pub fn with_jitter(mut self, fraction: f64) -> Self {
        self.jitter_fraction = fraction.clamp(0.0, 1.0);
        self
    }

    /// Apply the fields set in `overrides` on top of this policy
    pub fn merged(&self, overrides: &RetryOverride) -> Self {
        Self {
            max_retries: overrides.max_retries.unwrap_or(self.max_retries),
            base_delay: overrides
                .base_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(self.base_delay),
            max_delay: overrides
                .max_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(self.max_delay),
            exponential_base: overrides.exponential_base.unwrap_or(self.exponential_base),
            jitter_fraction: overrides
                .jitter_fraction
                .map(|j| j.clamp(0.0, 1.0))
                .unwrap_or(self.jitter_fraction),
        }
    }

    /// Total attempts including the first one
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Backoff before retry number `attempt` (0-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.delay_for_attempt_with(attempt, &mut rand::thread_rng())
    }

    /// Same as [`delay_for_attempt`](Self::delay_for_attempt) with an explicit random source
    pub fn delay_for_attempt_with<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let raw = self.base_delay.as_millis() as f64 * self.exponential_base.powi(exponent);
        let capped = raw.min(self.max_delay.as_millis() as f64);
        let capped = if capped.is_finite() { capped } else { 0.0 };

        let spread = capped * self.jitter_fraction;
        let jitter = if spread > 0.0 {
            rng.gen_range(-spread..=spread)
        } else {
            0.0
        };

        Duration::from_millis((capped + jitter).max(0.0).round() as u64)
    }
}

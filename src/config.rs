// SPDX-License-Identifier: MIT

//! Engine configuration
//!
//! Built from defaults, an optional YAML file and `FLOWRUN_*` environment
//! variables, in that order of precedence (later wins).

use crate::error::FlowError;
use crate::integration::circuit_breaker::CircuitBreakerConfig;
use crate::integration::reliability::ReliabilityConfig;
use crate::integration::retry::RetryOverride;
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub const ENV_MAX_DEPTH: &str = "FLOWRUN_MAX_DEPTH";
pub const ENV_AGENT_MAX_TURNS: &str = "FLOWRUN_AGENT_MAX_TURNS";
pub const ENV_MAX_RETRIES: &str = "FLOWRUN_MAX_RETRIES";
pub const ENV_TIMEOUT_MS: &str = "FLOWRUN_TIMEOUT_MS";
pub const ENV_BREAKER_THRESHOLD: &str = "FLOWRUN_BREAKER_THRESHOLD";
pub const ENV_BREAKER_RECOVERY_MS: &str = "FLOWRUN_BREAKER_RECOVERY_MS";

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Deepest allowed sub-workflow nesting
    pub max_subworkflow_depth: usize,
    /// Turn budget for agent-driven sub-workflows without their own `max_turns`
    pub default_agent_turns: u32,
    pub reliability: ReliabilityConfig,
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_subworkflow_depth: 10,
            default_agent_turns: 10,
            reliability: ReliabilityConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

/// On-disk form; every field is optional
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    max_subworkflow_depth: Option<usize>,
    default_agent_turns: Option<u32>,
    retry: Option<RetryOverride>,
    timeout_ms: Option<u64>,
    max_retry_delay_ms: Option<u64>,
    retryable_statuses: Option<Vec<u16>>,
    circuit_breaker: Option<CircuitBreakerConfig>,
}

impl EngineConfig {
    /// Defaults overridden by the environment
    pub fn from_env() -> Result<Self, FlowError> {
        Self::default().with_env_overrides()
    }

    /// Load a YAML config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, FlowError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| FlowError::config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, FlowError> {
        let file: FileConfig = serde_yaml::from_str(content)?;
        let mut config = Self::default();

        if let Some(depth) = file.max_subworkflow_depth {
            config.max_subworkflow_depth = depth;
        }
        if let Some(turns) = file.default_agent_turns {
            config.default_agent_turns = turns;
        }
        if let Some(retry) = &file.retry {
            config.reliability = config.reliability.with_override(retry);
        }
        if let Some(ms) = file.timeout_ms {
            config.reliability.timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = file.max_retry_delay_ms {
            config.reliability.max_retry_delay = Duration::from_millis(ms);
        }
        if let Some(statuses) = file.retryable_statuses {
            config.reliability.retryable_statuses = statuses.into_iter().collect();
        }
        if let Some(breaker) = file.circuit_breaker {
            config.circuit_breaker = breaker;
        }
        Ok(config)
    }

    /// Apply `FLOWRUN_*` variables from the process environment
    pub fn with_env_overrides(self) -> Result<Self, FlowError> {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from any name → value lookup
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, FlowError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(depth) = parse_var(&lookup, ENV_MAX_DEPTH)? {
            self.max_subworkflow_depth = depth;
        }
        if let Some(turns) = parse_var(&lookup, ENV_AGENT_MAX_TURNS)? {
            self.default_agent_turns = turns;
        }
        if let Some(retries) = parse_var(&lookup, ENV_MAX_RETRIES)? {
            self.reliability.retry.max_retries = retries;
        }
        if let Some(ms) = parse_var(&lookup, ENV_TIMEOUT_MS)? {
            self.reliability.timeout = Duration::from_millis(ms);
        }
        if let Some(threshold) = parse_var(&lookup, ENV_BREAKER_THRESHOLD)? {
            self.circuit_breaker.failure_threshold = threshold;
        }
        if let Some(ms) = parse_var(&lookup, ENV_BREAKER_RECOVERY_MS)? {
            self.circuit_breaker.recovery_timeout_ms = ms;
        }
        Ok(self)
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Result<Option<T>, FlowError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| FlowError::config(format!("invalid {}='{}': {}", name, raw, e))),
    }
}

// SPDX-License-Identifier: MIT

//! Validation, retry, timeout and error normalization around external calls
//!
//! The order per invocation is fixed: the input is validated once, then each
//! attempt races the call against a timer, failures are normalized into
//! [`IntegrationError`] and the retry decision is taken on the normalized error.

use crate::integration::error::{normalize, IntegrationError, DEFAULT_RETRYABLE_STATUSES};
use crate::integration::retry::{RetryOverride, RetryPolicy};
use crate::integration::validation;
use crate::tools::Tool;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Retry/timeout settings shared by every guarded call
#[derive(Debug, Clone, PartialEq)]
pub struct ReliabilityConfig {
    pub retry: RetryPolicy,
    /// Per-attempt timeout
    pub timeout: Duration,
    /// Upper bound for server-provided retry-after waits
    pub max_retry_delay: Duration,
    pub retryable_statuses: HashSet<u16>,
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            timeout: Duration::from_millis(30_000),
            max_retry_delay: Duration::from_millis(60_000),
            retryable_statuses: DEFAULT_RETRYABLE_STATUSES.into_iter().collect(),
        }
    }
}

impl ReliabilityConfig {
    /// Copy of this config with a step's overrides applied
    pub fn with_override(&self, overrides: &RetryOverride) -> Self {
        Self {
            retry: self.retry.merged(overrides),
            timeout: overrides
                .timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(self.timeout),
            max_retry_delay: self.max_retry_delay,
            retryable_statuses: self.retryable_statuses.clone(),
        }
    }

    /// Status present: the configured set decides. Otherwise the error's own flag.
    pub fn should_retry(&self, err: &IntegrationError) -> bool {
        match err.status_code {
            Some(status) => self.retryable_statuses.contains(&status),
            None => err.retryable,
        }
    }

    /// Wait before retry number `retry_index` (0-based) following `err`
    pub fn delay_before_retry(&self, err: &IntegrationError, retry_index: u32) -> Duration {
        match err.retry_after_secs {
            Some(secs) => Duration::from_millis(secs.saturating_mul(1000)).min(self.max_retry_delay),
            None => self.retry.delay_for_attempt(retry_index),
        }
    }
}

/// Reliability wrapper with a per-action schema registry
#[derive(Clone, Default)]
pub struct Reliability {
    config: ReliabilityConfig,
    schemas: Arc<RwLock<HashMap<String, Value>>>,
}

impl Reliability {
    pub fn new(config: ReliabilityConfig) -> Self {
        Self {
            config,
            schemas: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &ReliabilityConfig {
        &self.config
    }

    /// Register the input schema checked before every call to `action_key`
    pub async fn register_schema(&self, action_key: &str, schema: Value) {
        let mut schemas = self.schemas.write().await;
        schemas.insert(action_key.to_string(), schema);
    }

    /// Register `schema` unless `action_key` already has one
    pub async fn ensure_schema(&self, action_key: &str, schema: &Value) {
        if self.schemas.read().await.contains_key(action_key) {
            return;
        }
        self.schemas
            .write()
            .await
            .entry(action_key.to_string())
            .or_insert_with(|| schema.clone());
    }

    /// Guard `call` with the wrapper's own config
    pub async fn call<F, Fut>(
        &self,
        action_key: &str,
        input: Value,
        call: F,
    ) -> Result<Value, IntegrationError>
    where
        F: FnMut(Value) -> Fut,
        Fut: Future<Output = Result<Value, Box<dyn Error + Send + Sync>>>,
    {
        self.call_with(action_key, input, &self.config, call).await
    }

    /// Guard `call` with an explicit config (per-step overrides)
    pub async fn call_with<F, Fut>(
        &self,
        action_key: &str,
        input: Value,
        config: &ReliabilityConfig,
        mut call: F,
    ) -> Result<Value, IntegrationError>
    where
        F: FnMut(Value) -> Fut,
        Fut: Future<Output = Result<Value, Box<dyn Error + Send + Sync>>>,
    {
        self.validate(action_key, &input).await?;

        let max_attempts = config.retry.max_attempts();
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let err = match tokio::time::timeout(config.timeout, call(input.clone())).await {
                Ok(Ok(output)) => {
                    if attempt > 1 {
                        log::info!("{} succeeded on attempt {}", action_key, attempt);
                    }
                    return Ok(output);
                }
                Ok(Err(raised)) => normalize(action_key, raised, &config.retryable_statuses),
                Err(_) => IntegrationError::timeout(action_key, config.timeout.as_millis()),
            };

            if attempt >= max_attempts || !config.should_retry(&err) {
                log::error!(
                    "{} failed after {} attempt(s): {}",
                    action_key,
                    attempt,
                    err.message
                );
                return Err(err);
            }

            let delay = config.delay_before_retry(&err, attempt - 1);
            log::warn!(
                "{} attempt {}/{} failed ({}), retrying in {:?}",
                action_key,
                attempt,
                max_attempts,
                err.message,
                delay
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Check `input` against the schema registered for `action_key`
    pub async fn validate(&self, action_key: &str, input: &Value) -> Result<(), IntegrationError> {
        if !input.is_object() {
            return Ok(());
        }
        let schemas = self.schemas.read().await;
        let Some(schema) = schemas.get(action_key) else {
            return Ok(());
        };
        let violations = validation::validate(schema, input);
        if violations.is_empty() {
            Ok(())
        } else {
            Err(IntegrationError::validation(action_key, &violations))
        }
    }
}

/// Decorator giving any tool the reliability wrapper's behavior
pub struct ReliableTool {
    inner: Arc<dyn Tool>,
    reliability: Reliability,
}

impl ReliableTool {
    pub fn new(inner: Arc<dyn Tool>, reliability: Reliability) -> Self {
        Self { inner, reliability }
    }
}

#[async_trait]
impl Tool for ReliableTool {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn description(&self) -> &str {
        self.inner.description()
    }

    fn schema(&self) -> &Value {
        self.inner.schema()
    }

    async fn execute(&self, input: Value) -> Result<Value, Box<dyn Error + Send + Sync>> {
        let result = self
            .reliability
            .call(self.inner.name(), input, |input| {
                let tool = Arc::clone(&self.inner);
                async move { tool.execute(input).await }
            })
            .await?;
        Ok(result)
    }
}

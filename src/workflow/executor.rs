// SPDX-License-Identifier: MIT

//! Step executor: the engine's only way of reaching the outside world

use crate::error::FlowError;
use crate::integration::circuit_breaker::BreakerRegistry;
use crate::integration::reliability::Reliability;
use crate::tools::ToolRegistry;
use crate::workflow::context::ExecutionContext;
use crate::workflow::types::ActionStep;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Runs one action step with already-resolved inputs
#[async_trait]
pub trait StepExecutor: Send + Sync {
    async fn execute(
        &self,
        step: &ActionStep,
        inputs: Value,
        ctx: &ExecutionContext,
    ) -> Result<Value, FlowError>;
}

/// Executor backed by a [`ToolRegistry`].
///
/// Each call is gated by the circuit breaker of the step's service, then
/// guarded by the reliability wrapper with the step's retry overrides.
#[derive(Clone)]
pub struct ToolStepExecutor {
    registry: ToolRegistry,
    reliability: Reliability,
    breakers: BreakerRegistry,
}

impl ToolStepExecutor {
    /// Tool schemas are registered with `reliability` on first use, so tools
    /// added to `registry` later are validated too
    pub fn new(registry: ToolRegistry, reliability: Reliability, breakers: BreakerRegistry) -> Self {
        Self {
            registry,
            reliability,
            breakers,
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn breakers(&self) -> &BreakerRegistry {
        &self.breakers
    }
}

#[async_trait]
impl StepExecutor for ToolStepExecutor {
    async fn execute(
        &self,
        step: &ActionStep,
        inputs: Value,
        ctx: &ExecutionContext,
    ) -> Result<Value, FlowError> {
        let tool = self
            .registry
            .get(&step.action)
            .await
            .ok_or_else(|| FlowError::tool_not_found(&step.action))?;

        // Rejected input never reaches the target, so it must not use up a
        // half-open trial call either
        self.reliability.ensure_schema(&step.action, tool.schema()).await;
        self.reliability.validate(&step.action, &inputs).await?;

        let breaker = self.breakers.get_or_create(step.service()).await;
        if !breaker.can_execute() {
            log::warn!(
                "[{}] step '{}' rejected: circuit '{}' is {:?}",
                ctx.run_id,
                step.id,
                breaker.name(),
                breaker.state()
            );
            return Err(FlowError::CircuitOpen {
                target: breaker.name().to_string(),
            });
        }

        let config = match &step.retry {
            Some(overrides) => self.reliability.config().with_override(overrides),
            None => self.reliability.config().clone(),
        };

        log::debug!("[{}] invoking {} for step '{}'", ctx.run_id, step.action, step.id);
        let result = self
            .reliability
            .call_with(&step.action, inputs, &config, |input| {
                let tool = Arc::clone(&tool);
                async move { tool.execute(input).await }
            })
            .await;

        match result {
            Ok(output) => {
                breaker.record_success();
                Ok(output)
            }
            Err(err) => {
                breaker.record_failure();
                Err(err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integration::circuit_breaker::{CircuitBreakerConfig, CircuitState};
    use crate::integration::error::FailureKind;
    use crate::integration::error::CallFailure;
    use crate::integration::reliability::ReliabilityConfig;
    use crate::integration::retry::{RetryOverride, RetryPolicy};
    use crate::tools::Tool;
    use once_cell::sync::Lazy;
    use serde_json::{json, Map};
    use std::error::Error;
    use std::sync::atomic::{AtomicU32, Ordering};

    static MOCK_SCHEMA: Lazy<Value> = Lazy::new(|| {
        json!({
            "type": "object",
            "properties": { "text": { "type": "string" } },
            "required": ["text"]
        })
    });

    /// Fails with `status` for the first `failures` calls, then echoes its input
    struct ScriptedTool {
        failures: u32,
        status: u16,
        calls: AtomicU32,
    }

    impl ScriptedTool {
        fn new(failures: u32, status: u16) -> Arc<Self> {
            Arc::new(Self {
                failures,
                status,
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Tool for ScriptedTool {
        fn name(&self) -> &str {
            "chat.post"
        }

        fn description(&self) -> &str {
            "Scripted test tool"
        }

        fn schema(&self) -> &Value {
            &MOCK_SCHEMA
        }

        async fn execute(&self, input: Value) -> Result<Value, Box<dyn Error + Send + Sync>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.failures {
                return Err(Box::new(
                    CallFailure::new("scripted failure").with_status(self.status),
                ));
            }
            Ok(json!({ "echo": input }))
        }
    }

    async fn executor(tool: Arc<ScriptedTool>, max_retries: u32, threshold: u32) -> ToolStepExecutor {
        let registry = ToolRegistry::new();
        registry.register(tool).await;
        let reliability = Reliability::new(ReliabilityConfig {
            retry: RetryPolicy::immediate(max_retries),
            ..ReliabilityConfig::default()
        });
        let breakers = BreakerRegistry::new(CircuitBreakerConfig {
            failure_threshold: threshold,
            ..CircuitBreakerConfig::default()
        });
        ToolStepExecutor::new(registry, reliability, breakers)
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::new("wf", Map::new())
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let tool = ScriptedTool::new(2, 503);
        let exec = executor(tool.clone(), 3, 5).await;
        let step = ActionStep::new("post", "chat.post");

        let out = exec.execute(&step, json!({"text": "hi"}), &ctx()).await.unwrap();
        assert_eq!(out, json!({"echo": {"text": "hi"}}));
        assert_eq!(tool.calls(), 3);
        let breaker = exec.breakers().get("chat").await.unwrap();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 0);
    }

    #[tokio::test]
    async fn test_step_override_limits_retries() {
        let tool = ScriptedTool::new(5, 503);
        let exec = executor(tool.clone(), 3, 5).await;
        let mut step = ActionStep::new("post", "chat.post");
        step.retry = Some(RetryOverride {
            max_retries: Some(0),
            ..RetryOverride::default()
        });

        let err = exec.execute(&step, json!({"text": "hi"}), &ctx()).await.unwrap_err();
        assert!(matches!(err, FlowError::Integration(ref e) if e.status_code == Some(503)));
        assert_eq!(tool.calls(), 1);
    }

    #[tokio::test]
    async fn test_open_breaker_rejects_without_calling() {
        let tool = ScriptedTool::new(10, 400);
        let exec = executor(tool.clone(), 3, 2).await;
        let step = ActionStep::new("post", "chat.post");

        for _ in 0..2 {
            let err = exec.execute(&step, json!({"text": "x"}), &ctx()).await.unwrap_err();
            assert!(matches!(err, FlowError::Integration(_)));
        }
        assert_eq!(tool.calls(), 2);

        let err = exec.execute(&step, json!({"text": "x"}), &ctx()).await.unwrap_err();
        assert!(matches!(err, FlowError::CircuitOpen { ref target } if target == "chat"));
        assert!(!err.is_retryable());
        assert_eq!(tool.calls(), 2);
    }

    #[tokio::test]
    async fn test_validation_failure_skips_call_and_breaker() {
        let tool = ScriptedTool::new(0, 500);
        let exec = executor(tool.clone(), 3, 1).await;
        let step = ActionStep::new("post", "chat.post");

        let err = exec.execute(&step, json!({"text": 42}), &ctx()).await.unwrap_err();
        let FlowError::Integration(inner) = err else {
            panic!("expected integration error");
        };
        assert_eq!(inner.kind, FailureKind::Validation);
        assert_eq!(tool.calls(), 0);
        assert!(exec.breakers().get("chat").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_input_does_not_hold_half_open_breaker() {
        let tool = ScriptedTool::new(1, 503);
        let exec = executor(tool.clone(), 0, 1).await;
        let step = ActionStep::new("post", "chat.post");

        exec.execute(&step, json!({"text": "hi"}), &ctx()).await.unwrap_err();
        let breaker = exec.breakers().get("chat").await.unwrap();
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::advance(std::time::Duration::from_secs(31)).await;
        for _ in 0..2 {
            let err = exec.execute(&step, json!({"text": 1}), &ctx()).await.unwrap_err();
            assert!(matches!(err, FlowError::Integration(ref e) if e.kind == FailureKind::Validation));
        }

        tokio::time::advance(std::time::Duration::from_secs(3600)).await;
        let out = exec.execute(&step, json!({"text": "hi"}), &ctx()).await.unwrap();
        assert_eq!(out, json!({"echo": {"text": "hi"}}));
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(tool.calls(), 2);
    }

    #[tokio::test]
    async fn test_tool_registered_later_is_validated() {
        let registry = ToolRegistry::new();
        let exec = ToolStepExecutor::new(
            registry.clone(),
            Reliability::new(ReliabilityConfig::default()),
            BreakerRegistry::new(CircuitBreakerConfig::default()),
        );
        let tool = ScriptedTool::new(0, 500);
        registry.register(tool.clone()).await;

        let step = ActionStep::new("post", "chat.post");
        let err = exec.execute(&step, json!({"text": 42}), &ctx()).await.unwrap_err();
        assert!(matches!(err, FlowError::Integration(ref e) if e.kind == FailureKind::Validation));
        assert_eq!(tool.calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_action() {
        let exec = executor(ScriptedTool::new(0, 500), 0, 5).await;
        let step = ActionStep::new("x", "nope.missing");
        let err = exec.execute(&step, json!({}), &ctx()).await.unwrap_err();
        assert!(matches!(err, FlowError::ToolNotFound { ref name } if name == "nope.missing"));
    }
}

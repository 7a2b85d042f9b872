// SPDX-License-Identifier: MIT

use crate::integration::reliability::{Reliability, ReliableTool};
use crate::tools::Tool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared name → tool map
#[derive(Clone)]
pub struct ToolRegistry {
    tools: Arc<RwLock<HashMap<String, Arc<dyn Tool>>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn register(&self, tool: Arc<dyn Tool>) {
        let mut tools = self.tools.write().await;
        tools.insert(tool.name().to_string(), tool);
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        let tools = self.tools.read().await;
        tools.get(name).cloned()
    }

    /// Registered action keys, sorted
    pub async fn names(&self) -> Vec<String> {
        let tools = self.tools.read().await;
        let mut names: Vec<String> = tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn tools(&self) -> Vec<Arc<dyn Tool>> {
        let tools = self.tools.read().await;
        tools.values().cloned().collect()
    }

    /// New registry whose every tool goes through `reliability`.
    ///
    /// Each tool's declared schema is registered for input validation.
    pub async fn with_reliability(&self, reliability: &Reliability) -> Self {
        let wrapped = ToolRegistry::new();
        for tool in self.tools().await {
            reliability
                .register_schema(tool.name(), tool.schema().clone())
                .await;
            wrapped
                .register(Arc::new(ReliableTool::new(tool, reliability.clone())))
                .await;
        }
        wrapped
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integration::error::{CallFailure, FailureKind, IntegrationError};
    use crate::integration::reliability::ReliabilityConfig;
    use crate::integration::retry::RetryPolicy;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::error::Error;
    use std::sync::atomic::{AtomicU32, Ordering};

    use once_cell::sync::Lazy;

    static MOCK_SCHEMA: Lazy<Value> = Lazy::new(|| {
        json!({
            "type": "object",
            "properties": {}
        })
    });

    static STRICT_SCHEMA: Lazy<Value> = Lazy::new(|| {
        json!({
            "type": "object",
            "required": ["id"],
            "properties": { "id": { "type": "string" } }
        })
    });

    /// A mock tool for testing
    struct MockTool {
        name: String,
        description: String,
    }

    impl MockTool {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                description: format!("Mock tool: {}", name),
            }
        }
    }

    #[async_trait]
    impl Tool for MockTool {
        fn name(&self) -> &str {
            &self.name
        }

        fn description(&self) -> &str {
            &self.description
        }

        fn schema(&self) -> &Value {
            &MOCK_SCHEMA
        }

        async fn execute(&self, _input: Value) -> Result<Value, Box<dyn Error + Send + Sync>> {
            Ok(json!({"result": "mock"}))
        }
    }

    /// Fails with 502 until `fail_times` calls have been made
    struct FlakyTool {
        calls: AtomicU32,
        fail_times: u32,
    }

    #[async_trait]
    impl Tool for FlakyTool {
        fn name(&self) -> &str {
            "flaky.fetch"
        }

        fn description(&self) -> &str {
            "Fails a few times before succeeding"
        }

        fn schema(&self) -> &Value {
            &STRICT_SCHEMA
        }

        async fn execute(&self, input: Value) -> Result<Value, Box<dyn Error + Send + Sync>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.fail_times {
                return Err(Box::new(CallFailure::new("bad gateway").with_status(502)));
            }
            Ok(json!({"id": input["id"], "attempt": n}))
        }
    }

    #[tokio::test]
    async fn test_register_and_get_tool() {
        let registry = ToolRegistry::new();
        let tool = Arc::new(MockTool::new("test.tool"));

        registry.register(tool).await;

        let retrieved = registry.get("test.tool").await;
        assert!(retrieved.is_some());
        assert_eq!(retrieved.unwrap().name(), "test.tool");
    }

    #[tokio::test]
    async fn test_get_nonexistent_tool() {
        let registry = ToolRegistry::new();

        let retrieved = registry.get("nonexistent").await;
        assert!(retrieved.is_none());
    }

    #[tokio::test]
    async fn test_register_overwrites_existing() {
        let registry = ToolRegistry::new();

        registry.register(Arc::new(MockTool::new("same.name"))).await;
        registry.register(Arc::new(MockTool::new("same.name"))).await;

        assert_eq!(registry.names().await, vec!["same.name".to_string()]);
    }

    #[tokio::test]
    async fn test_registry_is_clone() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(MockTool::new("tool.one"))).await;

        let cloned = registry.clone();

        // Both should see the same tools
        assert!(cloned.get("tool.one").await.is_some());

        // Registering on clone should be visible to original
        cloned.register(Arc::new(MockTool::new("tool.two"))).await;
        assert!(registry.get("tool.two").await.is_some());
    }

    #[tokio::test]
    async fn test_with_reliability_wraps_every_tool() {
        let registry = ToolRegistry::new();
        registry
            .register(Arc::new(FlakyTool {
                calls: AtomicU32::new(0),
                fail_times: 2,
            }))
            .await;
        registry.register(Arc::new(MockTool::new("mock.op"))).await;

        let reliability = Reliability::new(ReliabilityConfig {
            retry: RetryPolicy::immediate(3),
            ..ReliabilityConfig::default()
        });
        let wrapped = registry.with_reliability(&reliability).await;
        assert_eq!(wrapped.names().await, registry.names().await);

        let flaky = wrapped.get("flaky.fetch").await.unwrap();
        let output = flaky.execute(json!({"id": "a1"})).await.unwrap();
        assert_eq!(output["attempt"], 3);
    }

    #[tokio::test]
    async fn test_with_reliability_validates_declared_schema() {
        let registry = ToolRegistry::new();
        registry
            .register(Arc::new(FlakyTool {
                calls: AtomicU32::new(0),
                fail_times: 0,
            }))
            .await;

        let wrapped = registry
            .with_reliability(&Reliability::new(ReliabilityConfig::default()))
            .await;
        let err = wrapped
            .get("flaky.fetch")
            .await
            .unwrap()
            .execute(json!({"id": 5}))
            .await
            .unwrap_err();

        let normalized = err.downcast::<IntegrationError>().unwrap();
        assert_eq!(normalized.kind, FailureKind::Validation);
    }
}

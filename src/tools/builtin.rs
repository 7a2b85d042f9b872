// SPDX-License-Identifier: MIT

//! Built-in `core.*` actions

use crate::tools::{Tool, ToolRegistry};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde_json::{json, Value};
use std::error::Error;
use std::sync::Arc;

static SET_SCHEMA: Lazy<Value> = Lazy::new(|| json!({ "type": "object" }));

static LOG_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "type": "object",
        "properties": {
            "message": { "type": "string" },
            "level": { "type": "string", "enum": ["debug", "info", "warn", "error"] }
        },
        "required": ["message"]
    })
});

/// `core.set`: returns its resolved input, binding computed values to a variable
pub struct SetTool;

#[async_trait]
impl Tool for SetTool {
    fn name(&self) -> &str {
        "core.set"
    }

    fn description(&self) -> &str {
        "Returns its input unchanged"
    }

    fn schema(&self) -> &Value {
        &SET_SCHEMA
    }

    async fn execute(&self, input: Value) -> Result<Value, Box<dyn Error + Send + Sync>> {
        Ok(input)
    }
}

/// `core.log`: writes a message to the log
pub struct LogTool;

#[async_trait]
impl Tool for LogTool {
    fn name(&self) -> &str {
        "core.log"
    }

    fn description(&self) -> &str {
        "Logs a message at the given level (default info)"
    }

    fn schema(&self) -> &Value {
        &LOG_SCHEMA
    }

    async fn execute(&self, input: Value) -> Result<Value, Box<dyn Error + Send + Sync>> {
        let message = input
            .get("message")
            .and_then(Value::as_str)
            .ok_or("core.log requires a 'message' string")?;
        let level = input.get("level").and_then(Value::as_str).unwrap_or("info");

        match level {
            "debug" => log::debug!("{}", message),
            "warn" => log::warn!("{}", message),
            "error" => log::error!("{}", message),
            _ => log::info!("{}", message),
        }

        Ok(json!({ "logged": message }))
    }
}

/// Register every built-in tool
pub async fn register_builtins(registry: &ToolRegistry) {
    registry.register(Arc::new(SetTool)).await;
    registry.register(Arc::new(LogTool)).await;
}

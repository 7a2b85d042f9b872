// SPDX-License-Identifier: MIT

//! Tools are the named actions a step can invoke (`service.method`)

pub mod builtin;
pub mod http;
pub mod registry;

pub use registry::ToolRegistry;

use async_trait::async_trait;
use serde_json::Value;
use std::error::Error;

/// A callable action.
///
/// # Notes
/// - `name()` is the action key steps refer to, e.g. `slack.post`
/// - `schema()` returns `&Value` so implementations can keep a static schema
/// - Failures may be any error; the reliability layer normalizes them. Raise
///   [`CallFailure`](crate::integration::CallFailure) to expose a status code
///   and headers.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the action key (must be unique within a registry)
    fn name(&self) -> &str;

    /// Returns a human-readable description of what the tool does
    fn description(&self) -> &str;

    /// Returns the JSON schema for the tool's input
    fn schema(&self) -> &Value;

    /// Execute the tool with the given input and return the result
    async fn execute(&self, input: Value) -> Result<Value, Box<dyn Error + Send + Sync>>;
}

// SPDX-License-Identifier: MIT

//! Typed error handling for flowrun
//!
//! Every failure that leaves a step surfaces as a [`FlowError`]. External-call
//! failures are normalized into [`IntegrationError`] first, template problems
//! into [`TemplateError`], so callers can decide on retry/skip/abort without
//! inspecting strings.

use crate::integration::error::IntegrationError;
use crate::workflow::template::TemplateError;
use thiserror::Error;

/// Top-level error type for flowrun
#[derive(Debug, Error)]
pub enum FlowError {
    /// Step input could not be resolved (malformed template or condition syntax)
    #[error("Input resolution failed for step '{step_id}': {source}")]
    Template {
        step_id: String,
        #[source]
        source: TemplateError,
    },

    /// Normalized failure of an external call (validation, timeout, remote error)
    #[error(transparent)]
    Integration(#[from] IntegrationError),

    /// Circuit breaker rejected the call before it was attempted
    #[error("Circuit breaker open for '{target}'")]
    CircuitOpen { target: String },

    /// Tool not found during execution
    #[error("Tool '{name}' not found")]
    ToolNotFound { name: String },

    /// Nested workflow finished in a failed state
    #[error("Sub-workflow '{path}' failed: {message}")]
    SubWorkflow { path: String, message: String },

    /// Step executor failed during an agent conversation turn
    #[error("Agent turn {turn} failed: {source}")]
    AgentTurn {
        turn: u32,
        #[source]
        source: Box<FlowError>,
    },

    /// Max iterations/turns reached
    #[error("Max {kind} reached: {limit}")]
    MaxIterations { kind: String, limit: u32 },

    /// Configuration errors (invalid env vars, unreadable config file)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Workflow-specific errors
    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// Generic error wrapper for compatibility
    #[error("{0}")]
    Other(String),
}

/// Workflow definition and run-structure errors
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Two steps share an identifier
    #[error("Duplicate step id: {0}")]
    DuplicateStepId(String),

    /// A step was declared without an identifier
    #[error("Step at position {0} has an empty id")]
    EmptyStepId(usize),

    /// Required workflow input was not provided and has no default
    #[error("Missing required input: {0}")]
    MissingInput(String),

    /// Provided input does not match its declared type
    #[error("Input '{name}' must be of type {expected}")]
    InvalidInput { name: String, expected: String },

    /// A workflow includes itself, directly or transitively
    #[error("Circular dependency detected: {0:?}")]
    CircularDependency(Vec<String>),

    /// Sub-workflow nesting went deeper than allowed
    #[error("Sub-workflow nesting exceeds max depth {0}")]
    MaxDepthExceeded(usize),

    /// File not found when loading workflow
    #[error("Workflow file not found: {0}")]
    FileNotFound(String),
}

impl FlowError {
    /// Create a template resolution error for a step
    pub fn template(step_id: impl Into<String>, source: TemplateError) -> Self {
        Self::Template {
            step_id: step_id.into(),
            source,
        }
    }

    /// Create a tool not found error
    pub fn tool_not_found(name: impl Into<String>) -> Self {
        Self::ToolNotFound { name: name.into() }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a sub-workflow failure
    pub fn sub_workflow(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SubWorkflow {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create from a generic error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// Whether a retry of the same step could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            FlowError::Integration(e) => e.retryable,
            FlowError::AgentTurn { source, .. } => source.is_retryable(),
            _ => false,
        }
    }
}

// Allow conversion from &str for backward compatibility
impl From<&str> for FlowError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_string())
    }
}

impl From<String> for FlowError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}

// Convert from Box<dyn Error> for compatibility
impl From<Box<dyn std::error::Error + Send + Sync>> for FlowError {
    fn from(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        Self::Other(err.to_string())
    }
}

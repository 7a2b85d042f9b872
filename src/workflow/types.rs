// SPDX-License-Identifier: MIT

//! Workflow document types
//!
//! A [`Workflow`] is immutable for the duration of a run. Steps are an
//! untagged enum: serde tries each variant in declaration order and the first
//! shape that fits wins, so the distinguishing field (`action`, `workflow`,
//! `parallel`, `wait`) is required on each variant.

use crate::error::WorkflowError;
use crate::integration::retry::RetryOverride;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

/// Top-level workflow definition
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Workflow {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    /// Declared run inputs
    #[serde(default)]
    pub inputs: BTreeMap<String, InputDecl>,
    /// Declared service bindings, offered to agents by name
    #[serde(default)]
    pub tools: BTreeMap<String, ToolBinding>,
    pub steps: Vec<Step>,
    /// Output templates resolved once every step has run
    #[serde(default)]
    pub outputs: Option<Map<String, Value>>,
    /// Where the document was loaded from; sub-workflow paths are relative to it
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

/// Declared workflow input
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct InputDecl {
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    pub default: Option<Value>,
    pub description: Option<String>,
}

/// Supported input types
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
    #[default]
    Any,
}

impl FieldType {
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Number => value.is_number(),
            FieldType::Integer => value.is_i64() || value.is_u64(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Array => value.is_array(),
            FieldType::Object => value.is_object(),
            FieldType::Any => true,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Integer => "integer",
            FieldType::Boolean => "boolean",
            FieldType::Array => "array",
            FieldType::Object => "object",
            FieldType::Any => "any",
        }
    }
}

/// Declared binding to an external service
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ToolBinding {
    #[serde(default)]
    pub sdk: Option<String>,
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

/// What to do when a step fails
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OnError {
    /// Fail the run
    #[default]
    Stop,
    /// Record the failure and move on to the next step
    Continue,
}

/// One unit of work
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(untagged)]
pub enum Step {
    Action(ActionStep),
    SubWorkflow(SubWorkflowStep),
    Parallel(ParallelStep),
    Wait(WaitStep),
}

/// Call of a named action (`service.method`)
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ActionStep {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub action: String,
    #[serde(default)]
    pub inputs: Map<String, Value>,
    #[serde(default, alias = "output")]
    pub output_variable: Option<String>,
    #[serde(default)]
    pub conditions: Vec<String>,
    #[serde(default)]
    pub retry: Option<RetryOverride>,
    #[serde(default)]
    pub on_error: OnError,
}

impl ActionStep {
    /// Minimal action step, mostly for programmatic construction
    pub fn new(id: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            action: action.into(),
            inputs: Map::new(),
            output_variable: None,
            conditions: Vec::new(),
            retry: None,
            on_error: OnError::Stop,
        }
    }

    /// Service part of the action key (`slack` in `slack.post`)
    pub fn service(&self) -> &str {
        self.action.split('.').next().unwrap_or(&self.action)
    }
}

/// Invocation of a nested workflow
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SubWorkflowStep {
    pub id: String,
    /// Path of the nested workflow, relative to the parent document
    pub workflow: String,
    #[serde(default)]
    pub inputs: Map<String, Value>,
    #[serde(default, alias = "output")]
    pub output_variable: Option<String>,
    #[serde(default)]
    pub conditions: Vec<String>,
    /// Let an agent drive the nested workflow instead of running it directly
    #[serde(default)]
    pub use_subagent: bool,
    #[serde(default)]
    pub subagent_config: Option<SubagentConfig>,
    #[serde(default)]
    pub on_error: OnError,
}

/// Agent settings for agent-driven sub-workflows
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SubagentConfig {
    /// Service whose `chat` action is invoked each turn
    #[serde(default = "default_agent")]
    pub agent: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub max_turns: Option<u32>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Tool names offered to the agent; the parent's bindings when empty
    #[serde(default)]
    pub tools: Vec<String>,
}

fn default_agent() -> String {
    "agent".to_string()
}

impl Default for SubagentConfig {
    fn default() -> Self {
        Self {
            agent: default_agent(),
            model: None,
            max_turns: None,
            system_prompt: None,
            tools: Vec::new(),
        }
    }
}

/// Concurrent group of action steps, joined before the next step
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ParallelStep {
    pub id: String,
    pub parallel: Vec<ActionStep>,
    #[serde(default)]
    pub max_concurrency: Option<usize>,
    #[serde(default)]
    pub conditions: Vec<String>,
    #[serde(default)]
    pub on_error: OnError,
}

/// Pause before the next step
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WaitStep {
    pub id: String,
    pub wait: WaitSpec,
    #[serde(default)]
    pub conditions: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WaitSpec {
    pub duration_ms: u64,
}

impl Step {
    pub fn id(&self) -> &str {
        match self {
            Step::Action(s) => &s.id,
            Step::SubWorkflow(s) => &s.id,
            Step::Parallel(s) => &s.id,
            Step::Wait(s) => &s.id,
        }
    }

    pub fn conditions(&self) -> &[String] {
        match self {
            Step::Action(s) => &s.conditions,
            Step::SubWorkflow(s) => &s.conditions,
            Step::Parallel(s) => &s.conditions,
            Step::Wait(s) => &s.conditions,
        }
    }

    pub fn on_error(&self) -> OnError {
        match self {
            Step::Action(s) => s.on_error,
            Step::SubWorkflow(s) => s.on_error,
            Step::Parallel(s) => s.on_error,
            Step::Wait(_) => OnError::Stop,
        }
    }

    pub fn output_variable(&self) -> Option<&str> {
        match self {
            Step::Action(s) => s.output_variable.as_deref(),
            Step::SubWorkflow(s) => s.output_variable.as_deref(),
            Step::Parallel(_) | Step::Wait(_) => None,
        }
    }

    /// Short name of the variant, for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Step::Action(_) => "action",
            Step::SubWorkflow(_) => "sub-workflow",
            Step::Parallel(_) => "parallel",
            Step::Wait(_) => "wait",
        }
    }
}

impl Workflow {
    /// Check structural invariants: every step id non-empty and unique
    pub fn validate(&self) -> Result<(), WorkflowError> {
        let mut seen = HashSet::new();
        let mut position = 0usize;
        let mut check = |id: &str| -> Result<(), WorkflowError> {
            position += 1;
            if id.trim().is_empty() {
                return Err(WorkflowError::EmptyStepId(position - 1));
            }
            if !seen.insert(id.to_string()) {
                return Err(WorkflowError::DuplicateStepId(id.to_string()));
            }
            Ok(())
        };

        for step in &self.steps {
            check(step.id())?;
            if let Step::Parallel(group) = step {
                for branch in &group.parallel {
                    check(&branch.id)?;
                }
            }
        }
        Ok(())
    }

    /// Names of the declared tool bindings
    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(yaml: &str) -> Workflow {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_step_variants_dispatch() {
        let wf = parse(
            r##"
id: onboarding
inputs:
  email: { type: string, required: true }
tools:
  slack: { sdk: slack }
steps:
  - id: greet
    action: slack.post
    inputs: { channel: "#new", text: "Hi {{ email }}" }
    output: greeting
    retry: { max_retries: 1 }
  - id: provision
    workflow: ./provision.yaml
    use_subagent: true
    subagent_config: { max_turns: 3 }
  - id: fanout
    parallel:
      - { id: a, action: core.set }
      - { id: b, action: core.set }
    max_concurrency: 2
  - id: pause
    wait: { duration_ms: 10 }
"##,
        );

        assert_eq!(wf.steps.len(), 4);
        let Step::Action(greet) = &wf.steps[0] else {
            panic!("expected action step");
        };
        assert_eq!(greet.output_variable.as_deref(), Some("greeting"));
        assert_eq!(greet.service(), "slack");
        assert_eq!(greet.retry.as_ref().unwrap().max_retries, Some(1));

        let Step::SubWorkflow(sub) = &wf.steps[1] else {
            panic!("expected sub-workflow step");
        };
        assert!(sub.use_subagent);
        let config = sub.subagent_config.as_ref().unwrap();
        assert_eq!(config.agent, "agent");
        assert_eq!(config.max_turns, Some(3));

        assert_eq!(wf.steps[2].kind(), "parallel");
        assert_eq!(wf.steps[3].kind(), "wait");
        assert_eq!(wf.inputs["email"].field_type, FieldType::String);
        assert!(wf.inputs["email"].required);
        assert_eq!(wf.tool_names(), vec!["slack".to_string()]);
        assert!(wf.validate().is_ok());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let wf = parse(
            r#"
id: dup
steps:
  - { id: a, action: core.set }
  - id: group
    parallel:
      - { id: a, action: core.set }
"#,
        );
        assert!(matches!(
            wf.validate(),
            Err(WorkflowError::DuplicateStepId(id)) if id == "a"
        ));
    }

    #[test]
    fn test_empty_id_rejected() {
        let wf = parse(
            r#"
id: empty
steps:
  - { id: "", action: core.set }
"#,
        );
        assert!(matches!(wf.validate(), Err(WorkflowError::EmptyStepId(0))));
    }

    #[test]
    fn test_field_type_accepts() {
        assert!(FieldType::Integer.accepts(&json!(3)));
        assert!(!FieldType::Integer.accepts(&json!(3.5)));
        assert!(FieldType::Number.accepts(&json!(3.5)));
        assert!(FieldType::Any.accepts(&json!(null)));
        assert!(!FieldType::String.accepts(&json!(1)));
    }
}

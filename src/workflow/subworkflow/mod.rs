// SPDX-License-Identifier: MIT

//! Sub-workflow orchestration
//!
//! Direct mode runs the nested workflow on a fresh engine with a fresh
//! context; only the resolved inputs go in and only the final output comes
//! back. Agent mode hands the raw document to an agent instead.

pub mod agent;
pub mod reply;

pub use agent::AgentSession;
pub use reply::{AgentReply, ChatMessage, Envelope, Role, TurnOutcome};

use crate::error::FlowError;
use crate::workflow::context::ExecutionContext;
use crate::workflow::engine::{RunStatus, WorkflowEngine};
use crate::workflow::types::{SubWorkflowStep, Workflow};
use serde_json::{Map, Value};
use std::path::{Component, Path, PathBuf};

const GENERIC_FAILURE: &str = "Sub-workflow failed";

/// Location of `target` relative to the directory of `parent`
pub fn resolve_location(parent: Option<&Path>, target: &str) -> PathBuf {
    let target = Path::new(target);
    if target.is_absolute() {
        return normalize(target);
    }
    let base = parent.and_then(Path::parent).unwrap_or_else(|| Path::new(""));
    normalize(&base.join(target))
}

/// Lexical normalization: drops `.` and folds `..` where possible
pub fn normalize(path: &Path) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    out.iter().collect()
}

/// Run `step` on a nested engine and return the nested output
pub async fn run_direct(
    engine: &WorkflowEngine,
    parent: &Workflow,
    step: &SubWorkflowStep,
    inputs: Value,
) -> Result<Value, FlowError> {
    let location = resolve_location(parent.source_path.as_deref(), &step.workflow);
    let nested = engine.nested(parent, &location)?;

    let mut workflow = engine.loader().load(&location).await?;
    if workflow.source_path.is_none() {
        workflow.source_path = Some(location.clone());
    }

    log::info!(
        "Step '{}' running sub-workflow '{}' from {}",
        step.id,
        workflow.id,
        location.display()
    );
    let result = nested.run(&workflow, into_map(inputs)).await;
    match result.status {
        RunStatus::Completed => Ok(result.output),
        RunStatus::Failed => Err(FlowError::sub_workflow(
            location.display().to_string(),
            result.error.unwrap_or_else(|| GENERIC_FAILURE.to_string()),
        )),
    }
}

/// Let an agent drive the nested workflow
pub async fn run_agent(
    engine: &WorkflowEngine,
    parent: &Workflow,
    step: &SubWorkflowStep,
    inputs: Value,
    ctx: &ExecutionContext,
) -> Result<Value, FlowError> {
    let location = resolve_location(parent.source_path.as_deref(), &step.workflow);
    let document = engine.loader().load_raw(&location).await?;

    let config = step.subagent_config.clone().unwrap_or_default();
    let max_turns = config
        .max_turns
        .unwrap_or(engine.config().default_agent_turns);
    let tools = if config.tools.is_empty() {
        parent.tool_names()
    } else {
        config.tools.clone()
    };

    let session = AgentSession::new(
        &step.id,
        &location.display().to_string(),
        &config,
        max_turns,
        &document,
        &inputs,
        tools,
    );
    session.run(engine.executor(), ctx).await
}

fn into_map(inputs: Value) -> Map<String, Value> {
    match inputs {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("input".to_string(), other);
            map
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_relative_to_parent() {
        assert_eq!(
            resolve_location(Some(Path::new("flows/main.yaml")), "./sub/child.yaml"),
            PathBuf::from("flows/sub/child.yaml")
        );
        assert_eq!(
            resolve_location(Some(Path::new("flows/a/main.yaml")), "../shared.yaml"),
            PathBuf::from("flows/shared.yaml")
        );
        assert_eq!(
            resolve_location(None, "child.yaml"),
            PathBuf::from("child.yaml")
        );
        assert_eq!(
            resolve_location(Some(Path::new("flows/main.yaml")), "/abs/x.yaml"),
            PathBuf::from("/abs/x.yaml")
        );
    }

    #[test]
    fn test_normalize_keeps_leading_parent() {
        assert_eq!(normalize(Path::new("../a/./b/../c")), PathBuf::from("../a/c"));
        assert_eq!(normalize(Path::new("/../x")), PathBuf::from("/x"));
    }
}

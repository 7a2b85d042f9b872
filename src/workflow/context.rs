// SPDX-License-Identifier: MIT

//! Per-run execution state

use crate::error::WorkflowError;
use crate::workflow::types::Workflow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Outcome of one step attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Completed,
    Failed,
}

/// What the engine records after a step ran
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepMetadata {
    pub step_id: String,
    pub status: StepStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepMetadata {
    pub fn completed(step_id: &str, started_at: DateTime<Utc>) -> Self {
        Self {
            step_id: step_id.to_string(),
            status: StepStatus::Completed,
            started_at,
            completed_at: Utc::now(),
            error: None,
        }
    }

    pub fn failed(step_id: &str, started_at: DateTime<Utc>, error: impl Into<String>) -> Self {
        Self {
            step_id: step_id.to_string(),
            status: StepStatus::Failed,
            started_at,
            completed_at: Utc::now(),
            error: Some(error.into()),
        }
    }
}

/// Mutable state of one workflow run.
///
/// Inputs are fixed after [`initialize`](Self::initialize); variables only grow;
/// metadata is kept in completion order. Nested runs get their own context.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub run_id: Uuid,
    pub workflow_id: String,
    inputs: Map<String, Value>,
    variables: Map<String, Value>,
    step_metadata: Vec<StepMetadata>,
}

impl ExecutionContext {
    /// Empty context, no declared inputs checked
    pub fn new(workflow_id: impl Into<String>, inputs: Map<String, Value>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            workflow_id: workflow_id.into(),
            inputs,
            variables: Map::new(),
            step_metadata: Vec::new(),
        }
    }

    /// Build the run context from provided inputs and the workflow's declarations.
    ///
    /// Declared defaults fill gaps; required inputs without a value and values
    /// of the wrong type are rejected. Undeclared inputs are kept as-is.
    pub fn initialize(workflow: &Workflow, provided: Map<String, Value>) -> Result<Self, WorkflowError> {
        let mut inputs = provided;

        for (name, decl) in &workflow.inputs {
            let present = inputs.get(name).is_some_and(|v| !v.is_null());
            if !present {
                match &decl.default {
                    Some(default) => {
                        inputs.insert(name.clone(), default.clone());
                    }
                    None if decl.required => {
                        return Err(WorkflowError::MissingInput(name.clone()));
                    }
                    None => continue,
                }
            }

            if let Some(value) = inputs.get(name) {
                if !decl.field_type.accepts(value) {
                    return Err(WorkflowError::InvalidInput {
                        name: name.clone(),
                        expected: decl.field_type.as_str().to_string(),
                    });
                }
            }
        }

        Ok(Self::new(workflow.id.clone(), inputs))
    }

    pub fn inputs(&self) -> &Map<String, Value> {
        &self.inputs
    }

    pub fn variables(&self) -> &Map<String, Value> {
        &self.variables
    }

    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    /// Template namespace: inputs spread at the top level, variables on top,
    /// plus an explicit `inputs` key
    pub fn namespace(&self) -> Value {
        let mut ns = self.inputs.clone();
        for (key, value) in &self.variables {
            ns.insert(key.clone(), value.clone());
        }
        ns.insert("inputs".to_string(), Value::Object(self.inputs.clone()));
        Value::Object(ns)
    }

    pub fn record_output(&mut self, name: &str, value: Value) {
        self.variables.insert(name.to_string(), value);
    }

    pub fn record_step(&mut self, metadata: StepMetadata) {
        self.step_metadata.push(metadata);
    }

    pub fn step_metadata(&self) -> &[StepMetadata] {
        &self.step_metadata
    }

    /// Latest metadata recorded for `step_id`
    pub fn metadata(&self, step_id: &str) -> Option<&StepMetadata> {
        self.step_metadata.iter().rev().find(|m| m.step_id == step_id)
    }

    pub fn into_step_metadata(self) -> Vec<StepMetadata> {
        self.step_metadata
    }
}

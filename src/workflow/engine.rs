// SPDX-License-Identifier: MIT

//! Sequential workflow execution engine
//!
//! One engine value drives one level of workflow nesting. Steps run strictly
//! in order against a context owned by the run; nested workflows get a new
//! engine from [`WorkflowEngine::nested`] and a new context.

use crate::config::EngineConfig;
use crate::error::{FlowError, WorkflowError};
use crate::workflow::condition;
use crate::workflow::context::{ExecutionContext, StepMetadata};
use crate::workflow::executor::StepExecutor;
use crate::workflow::loader::WorkflowLoader;
use crate::workflow::subworkflow;
use crate::workflow::template;
use crate::workflow::types::{ActionStep, OnError, ParallelStep, Step, Workflow};
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Start time and outcome of a parallel branch, `None` when skipped
type BranchResult = Option<(DateTime<Utc>, Result<Value, FlowError>)>;

/// Terminal status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Failed,
}

/// Everything a caller learns about a finished run
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowResult {
    pub run_id: Uuid,
    pub workflow_id: String,
    pub status: RunStatus,
    pub output: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub steps: Vec<StepMetadata>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl WorkflowResult {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

/// What happened to one step
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// Conditions were not met; nothing was recorded
    Skipped,
    Completed(Value),
    /// Failed, but the step allows the run to continue
    Continued(String),
}

#[derive(Clone)]
pub struct WorkflowEngine {
    executor: Arc<dyn StepExecutor>,
    loader: Arc<dyn WorkflowLoader>,
    config: EngineConfig,
    /// Documents of the enclosing runs, outermost first
    lineage: Vec<PathBuf>,
}

impl WorkflowEngine {
    pub fn new(
        executor: Arc<dyn StepExecutor>,
        loader: Arc<dyn WorkflowLoader>,
        config: EngineConfig,
    ) -> Self {
        Self {
            executor,
            loader,
            config,
            lineage: Vec::new(),
        }
    }

    pub fn executor(&self) -> &dyn StepExecutor {
        self.executor.as_ref()
    }

    pub fn loader(&self) -> &dyn WorkflowLoader {
        self.loader.as_ref()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Nesting level: 0 for a top-level run
    pub fn depth(&self) -> usize {
        self.lineage.len()
    }

    /// Engine for a workflow at `location` nested inside `parent`.
    ///
    /// Rejects a location already on the ancestor chain and nesting deeper
    /// than the configured maximum.
    pub fn nested(&self, parent: &Workflow, location: &Path) -> Result<Self, WorkflowError> {
        let mut lineage = self.lineage.clone();
        lineage.push(
            parent
                .source_path
                .as_deref()
                .map(subworkflow::normalize)
                .unwrap_or_else(|| PathBuf::from(format!("<{}>", parent.id))),
        );

        let location = subworkflow::normalize(location);
        if lineage.contains(&location) {
            let mut chain: Vec<String> = lineage.iter().map(|p| p.display().to_string()).collect();
            chain.push(location.display().to_string());
            return Err(WorkflowError::CircularDependency(chain));
        }
        if lineage.len() > self.config.max_subworkflow_depth {
            return Err(WorkflowError::MaxDepthExceeded(self.config.max_subworkflow_depth));
        }

        Ok(Self {
            executor: Arc::clone(&self.executor),
            loader: Arc::clone(&self.loader),
            config: self.config.clone(),
            lineage,
        })
    }

    /// Run `workflow` to completion with the provided inputs
    pub fn run<'a>(
        &'a self,
        workflow: &'a Workflow,
        inputs: Map<String, Value>,
    ) -> BoxFuture<'a, WorkflowResult> {
        Box::pin(async move {
            let started_at = Utc::now();
            let mut ctx = match ExecutionContext::initialize(workflow, inputs) {
                Ok(ctx) => ctx,
                Err(e) => {
                    log::error!("Workflow '{}' rejected its inputs: {}", workflow.id, e);
                    return WorkflowResult {
                        run_id: Uuid::new_v4(),
                        workflow_id: workflow.id.clone(),
                        status: RunStatus::Failed,
                        output: Value::Null,
                        error: Some(FlowError::from(e).to_string()),
                        steps: Vec::new(),
                        started_at,
                        completed_at: Utc::now(),
                    };
                }
            };

            log::info!(
                "[{}] Running workflow '{}' ({} steps, depth {})",
                ctx.run_id,
                workflow.display_name(),
                workflow.steps.len(),
                self.depth()
            );

            let outcome = self
                .run_steps(workflow, &mut ctx)
                .await
                .and_then(|()| self.collect_output(workflow, &ctx));

            let (status, output, error) = match outcome {
                Ok(output) => {
                    log::info!("[{}] Workflow '{}' completed", ctx.run_id, workflow.id);
                    (RunStatus::Completed, output, None)
                }
                Err(e) => {
                    log::error!("[{}] Workflow '{}' failed: {}", ctx.run_id, workflow.id, e);
                    (RunStatus::Failed, Value::Null, Some(e.to_string()))
                }
            };

            WorkflowResult {
                run_id: ctx.run_id,
                workflow_id: workflow.id.clone(),
                status,
                output,
                error,
                steps: ctx.into_step_metadata(),
                started_at,
                completed_at: Utc::now(),
            }
        })
    }

    async fn run_steps(&self, workflow: &Workflow, ctx: &mut ExecutionContext) -> Result<(), FlowError> {
        for step in &workflow.steps {
            self.execute_step(step, ctx, workflow).await?;
        }
        Ok(())
    }

    /// Conditions, input resolution, dispatch and bookkeeping for one step
    pub async fn execute_step(
        &self,
        step: &Step,
        ctx: &mut ExecutionContext,
        workflow: &Workflow,
    ) -> Result<StepOutcome, FlowError> {
        if !condition::evaluate_all(step.conditions(), ctx) {
            log::info!("[{}] Skipping step '{}': conditions not met", ctx.run_id, step.id());
            return Ok(StepOutcome::Skipped);
        }

        log::info!("[{}] Executing {} step '{}'", ctx.run_id, step.kind(), step.id());
        let started_at = Utc::now();
        match self.dispatch(step, ctx, workflow).await {
            Ok(output) => {
                if let Some(name) = step.output_variable() {
                    ctx.record_output(name, output.clone());
                }
                ctx.record_step(StepMetadata::completed(step.id(), started_at));
                Ok(StepOutcome::Completed(output))
            }
            Err(e) => {
                ctx.record_step(StepMetadata::failed(step.id(), started_at, e.to_string()));
                if step.on_error() == OnError::Continue {
                    log::warn!("[{}] Step '{}' failed, continuing: {}", ctx.run_id, step.id(), e);
                    Ok(StepOutcome::Continued(e.to_string()))
                } else {
                    Err(e)
                }
            }
        }
    }

    async fn dispatch(
        &self,
        step: &Step,
        ctx: &mut ExecutionContext,
        workflow: &Workflow,
    ) -> Result<Value, FlowError> {
        match step {
            Step::Action(action) => {
                let inputs = resolve_inputs(&action.id, &action.inputs, &ctx.namespace())?;
                self.executor.execute(action, inputs, ctx).await
            }
            Step::SubWorkflow(sub) => {
                let inputs = resolve_inputs(&sub.id, &sub.inputs, &ctx.namespace())?;
                if sub.use_subagent {
                    subworkflow::run_agent(self, workflow, sub, inputs, ctx).await
                } else {
                    subworkflow::run_direct(self, workflow, sub, inputs).await
                }
            }
            Step::Parallel(group) => self.run_parallel(group, ctx).await,
            Step::Wait(wait) => {
                log::debug!("[{}] Waiting {}ms", ctx.run_id, wait.wait.duration_ms);
                tokio::time::sleep(Duration::from_millis(wait.wait.duration_ms)).await;
                Ok(Value::Null)
            }
        }
    }

    /// Run a group's branches concurrently against one snapshot of the
    /// context, then record them in declaration order
    async fn run_parallel(&self, group: &ParallelStep, ctx: &mut ExecutionContext) -> Result<Value, FlowError> {
        let namespace = ctx.namespace();
        let snapshot = ctx.clone();
        let limit = group
            .max_concurrency
            .unwrap_or(group.parallel.len())
            .max(1);

        let branches: Vec<BoxFuture<'_, BranchResult>> = group
            .parallel
            .iter()
            .map(|branch| self.run_branch(branch, &namespace, &snapshot).boxed())
            .collect();
        let results: Vec<BranchResult> = stream::iter(branches).buffered(limit).collect().await;

        let mut outputs = Map::new();
        let mut first_error = None;
        for (branch, result) in group.parallel.iter().zip(results) {
            let Some((started_at, result)) = result else {
                continue;
            };
            match result {
                Ok(output) => {
                    if let Some(name) = &branch.output_variable {
                        ctx.record_output(name, output.clone());
                    }
                    ctx.record_step(StepMetadata::completed(&branch.id, started_at));
                    outputs.insert(branch.id.clone(), output);
                }
                Err(e) => {
                    ctx.record_step(StepMetadata::failed(&branch.id, started_at, e.to_string()));
                    if branch.on_error == OnError::Continue {
                        log::warn!("[{}] Branch '{}' failed, continuing: {}", ctx.run_id, branch.id, e);
                        outputs.insert(branch.id.clone(), Value::Null);
                    } else if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(Value::Object(outputs)),
        }
    }

    /// `None` when the branch's conditions skip it
    async fn run_branch(&self, branch: &ActionStep, namespace: &Value, snapshot: &ExecutionContext) -> BranchResult {
        if !branch
            .conditions
            .iter()
            .all(|c| condition::evaluate_in(c, namespace))
        {
            log::info!("[{}] Skipping branch '{}': conditions not met", snapshot.run_id, branch.id);
            return None;
        }

        let started_at = Utc::now();
        let result = match resolve_inputs(&branch.id, &branch.inputs, namespace) {
            Ok(inputs) => self.executor.execute(branch, inputs, snapshot).await,
            Err(e) => Err(e),
        };
        Some((started_at, result))
    }

    /// Declared `outputs` resolved against the final state, else all variables
    fn collect_output(&self, workflow: &Workflow, ctx: &ExecutionContext) -> Result<Value, FlowError> {
        match &workflow.outputs {
            Some(outputs) => template::resolve(&Value::Object(outputs.clone()), ctx)
                .map_err(|e| FlowError::template("outputs", e)),
            None => Ok(Value::Object(ctx.variables().clone())),
        }
    }
}

fn resolve_inputs(step_id: &str, inputs: &Map<String, Value>, namespace: &Value) -> Result<Value, FlowError> {
    template::resolve_in(&Value::Object(inputs.clone()), namespace).map_err(|e| FlowError::template(step_id, e))
}

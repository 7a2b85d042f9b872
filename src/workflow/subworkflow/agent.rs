// SPDX-License-Identifier: MIT

//! Agent-driven sub-workflow execution
//!
//! The nested workflow is not run by the engine. Its raw document is handed to
//! an agent behind the `{agent}.chat` action, and the conversation goes on
//! until the agent reports completion or the turn budget runs out.

use super::reply::{self, ChatMessage, TurnOutcome};
use crate::error::FlowError;
use crate::workflow::context::ExecutionContext;
use crate::workflow::executor::StepExecutor;
use crate::workflow::types::{ActionStep, SubagentConfig};
use serde_json::{json, Value};

const DEFAULT_SYSTEM_PROMPT: &str = "You are executing a workflow on behalf of a parent workflow. \
Work through its steps in order, using only the tools listed. \
When every step is done, reply with a fenced JSON block of the form \
```json\n{\"completed\": true, \"output\": { ... }}\n``` \
If the workflow cannot be completed, reply with {\"completed\": false, \"error\": \"<reason>\"}. \
While work is still in progress, describe what you did and what comes next.";

const CONTINUE_PROMPT: &str = "continue";

/// Bounded conversation with one agent
pub struct AgentSession {
    step_id: String,
    workflow: String,
    chat_action: String,
    model: Option<String>,
    tools: Vec<String>,
    max_turns: u32,
    transcript: Vec<ChatMessage>,
}

impl AgentSession {
    /// Seed the transcript with the system prompt and the workflow to run
    pub fn new(
        step_id: &str,
        workflow: &str,
        config: &SubagentConfig,
        max_turns: u32,
        document: &str,
        inputs: &Value,
        tools: Vec<String>,
    ) -> Self {
        let system = config
            .system_prompt
            .clone()
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());
        let user = user_prompt(document, inputs, &tools);

        Self {
            step_id: step_id.to_string(),
            workflow: workflow.to_string(),
            chat_action: format!("{}.chat", config.agent),
            model: config.model.clone(),
            tools,
            max_turns,
            transcript: vec![ChatMessage::system(system), ChatMessage::user(user)],
        }
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    /// Run turns until the agent finishes, fails or exhausts the budget
    pub async fn run(
        mut self,
        executor: &dyn StepExecutor,
        ctx: &ExecutionContext,
    ) -> Result<Value, FlowError> {
        let chat = ActionStep::new(self.step_id.clone(), self.chat_action.clone());

        for turn in 1..=self.max_turns {
            log::info!(
                "Agent {} turn {}/{} for {}",
                self.chat_action,
                turn,
                self.max_turns,
                self.workflow
            );

            let inputs = json!({
                "messages": self.transcript,
                "model": self.model,
                "tools": self.tools,
            });
            let response = executor
                .execute(&chat, inputs, ctx)
                .await
                .map_err(|e| FlowError::AgentTurn {
                    turn,
                    source: Box::new(e),
                })?;

            match reply::classify(&response) {
                TurnOutcome::Completed(output) => {
                    log::info!("Agent completed {} after {} turn(s)", self.workflow, turn);
                    return Ok(output);
                }
                TurnOutcome::Failed(error) => {
                    log::error!("Agent reported failure for {}: {}", self.workflow, error);
                    return Err(FlowError::sub_workflow(&self.workflow, error));
                }
                TurnOutcome::Continue(message) => {
                    log::debug!("Agent turn {} reply: {}", turn, preview(&message));
                    self.transcript.push(ChatMessage::assistant(message));
                    self.transcript.push(ChatMessage::user(CONTINUE_PROMPT));
                }
                TurnOutcome::Final(output) => {
                    log::warn!(
                        "Agent gave no completion envelope for {}; using its output as final",
                        self.workflow
                    );
                    return Ok(output);
                }
            }
        }

        log::warn!(
            "Agent {} reached max turns ({}) for {}",
            self.chat_action,
            self.max_turns,
            self.workflow
        );
        Err(FlowError::MaxIterations {
            kind: "agent turns".to_string(),
            limit: self.max_turns,
        })
    }
}

fn user_prompt(document: &str, inputs: &Value, tools: &[String]) -> String {
    let inputs = serde_json::to_string_pretty(inputs).unwrap_or_else(|_| inputs.to_string());
    let tools = if tools.is_empty() {
        "(none)".to_string()
    } else {
        tools.join(", ")
    };
    format!(
        "Execute this workflow:\n```yaml\n{}\n```\n\nInputs:\n```json\n{}\n```\n\nAvailable tools: {}",
        document.trim_end(),
        inputs,
        tools
    )
}

fn preview(text: &str) -> &str {
    match text.char_indices().nth(100) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

// SPDX-License-Identifier: MIT

pub mod condition;
pub mod context;
pub mod engine;
pub mod executor;
pub mod loader;
pub mod path;
pub mod subworkflow;
pub mod template;
pub mod types;

pub use context::{ExecutionContext, StepMetadata, StepStatus};
pub use engine::{RunStatus, StepOutcome, WorkflowEngine, WorkflowResult};
pub use executor::{StepExecutor, ToolStepExecutor};
pub use loader::{WorkflowLoader, YamlWorkflowLoader};
pub use types::{Step, Workflow};

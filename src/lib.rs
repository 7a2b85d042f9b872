// SPDX-License-Identifier: MIT

pub mod config;
pub mod error;
pub mod integration;
pub mod tools;
pub mod workflow;

pub use config::EngineConfig;
pub use error::{FlowError, WorkflowError};

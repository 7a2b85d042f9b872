// SPDX-License-Identifier: MIT

//! Workflow loader - YAML file loading and parsing
//!
//! The engine only depends on the [`WorkflowLoader`] trait; the YAML loader is
//! the default file-backed implementation.

use crate::error::{FlowError, WorkflowError};
use crate::workflow::types::Workflow;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::Path;

/// Source of workflow documents
#[async_trait]
pub trait WorkflowLoader: Send + Sync {
    /// Parsed and validated workflow at `path`
    async fn load(&self, path: &Path) -> Result<Workflow, FlowError>;

    /// Raw document text at `path`, handed to agents as-is
    async fn load_raw(&self, path: &Path) -> Result<String, FlowError>;
}

/// Loads workflow definitions from YAML files
#[derive(Debug, Clone, Default)]
pub struct YamlWorkflowLoader;

impl YamlWorkflowLoader {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl WorkflowLoader for YamlWorkflowLoader {
    async fn load(&self, path: &Path) -> Result<Workflow, FlowError> {
        let content = self.load_raw(path).await?;
        let mut workflow = parse_yaml(&content)?;
        workflow.source_path = Some(path.to_path_buf());
        log::debug!(
            "Loaded workflow '{}' ({} steps) from {}",
            workflow.id,
            workflow.steps.len(),
            path.display()
        );
        Ok(workflow)
    }

    async fn load_raw(&self, path: &Path) -> Result<String, FlowError> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(WorkflowError::FileNotFound(path.display().to_string()).into())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Parse and validate a workflow definition from a YAML string
pub fn parse_yaml(content: &str) -> Result<Workflow, FlowError> {
    let workflow: Workflow = serde_yaml::from_str(content)?;
    workflow.validate()?;
    Ok(workflow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::types::Step;

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
id: release
name: Release notes
steps:
  - id: fetch
    action: github.list_commits
    inputs:
      repo: "{{ inputs.repo }}"
    output_variable: commits
  - id: post
    action: slack.post
    conditions:
      - "commits | length > 0"
    inputs:
      text: "{{ commits | length }} commits"
"#;
        let wf = parse_yaml(yaml).unwrap();
        assert_eq!(wf.display_name(), "Release notes");
        assert_eq!(wf.steps.len(), 2);
        assert!(matches!(&wf.steps[1], Step::Action(s) if s.conditions.len() == 1));
        assert!(wf.source_path.is_none());
    }

    #[test]
    fn test_parse_yaml_rejects_duplicates() {
        let yaml = r#"
id: dup
steps:
  - { id: same, action: core.set }
  - { id: same, action: core.log }
"#;
        let err = parse_yaml(yaml).unwrap_err();
        assert!(matches!(
            err,
            FlowError::Workflow(WorkflowError::DuplicateStepId(_))
        ));
    }

    #[test]
    fn test_parse_yaml_rejects_garbage() {
        assert!(matches!(parse_yaml("steps: 3"), Err(FlowError::Yaml(_))));
    }

    #[tokio::test]
    async fn test_load_sets_source_path() {
        let dir = std::env::temp_dir().join(format!("flowrun-loader-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let file = dir.join("wf.yaml");
        tokio::fs::write(&file, "id: disk\nsteps: []\n").await.unwrap();

        let loader = YamlWorkflowLoader::new();
        let wf = loader.load(&file).await.unwrap();
        assert_eq!(wf.id, "disk");
        assert_eq!(wf.source_path.as_deref(), Some(file.as_path()));
        assert!(loader.load_raw(&file).await.unwrap().contains("id: disk"));

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_file() {
        let loader = YamlWorkflowLoader::new();
        let err = loader
            .load(Path::new("/definitely/not/here.yaml"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FlowError::Workflow(WorkflowError::FileNotFound(_))
        ));
    }
}

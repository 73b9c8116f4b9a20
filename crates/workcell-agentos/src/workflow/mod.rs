//! Sequential step workflows.
//!
//! A [`Workflow`] runs its [`Step`]s in order. Each step sees the workflow
//! input and every earlier step's output; the run's content is the last
//! step's content. The first failing step ends the run with its error.

mod linter;
mod tdd;

pub use linter::{create_linter_workflow, shell_escape, LinterTool, LinterWorkflowConfig};
pub use tdd::{create_tdd_workflow, TddWorkflowConfig};

use crate::commands::CommandError;
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use workcell_contract::runner::{AgentRunError, AgentRunner};

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Agent(#[from] AgentRunError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutput {
    pub step_name: String,
    pub content: String,
}

/// What a step executor sees.
#[derive(Debug, Clone, Copy)]
pub struct StepInput<'a> {
    pub input: Option<&'a str>,
    pub previous_step_outputs: &'a [StepOutput],
}

impl StepInput<'_> {
    /// Content produced by an earlier step with this name.
    pub fn get_step_content(&self, step_name: &str) -> Option<&str> {
        self.previous_step_outputs
            .iter()
            .find(|o| o.step_name == step_name)
            .map(|o| o.content.as_str())
    }
}

#[async_trait]
pub trait StepExecutor: Send + Sync {
    async fn execute(&self, input: StepInput<'_>) -> Result<String, WorkflowError>;
}

#[derive(Clone)]
pub struct Step {
    pub name: String,
    executor: Arc<dyn StepExecutor>,
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step").field("name", &self.name).finish()
    }
}

impl Step {
    pub fn new(name: impl Into<String>, executor: Arc<dyn StepExecutor>) -> Self {
        Self {
            name: name.into(),
            executor,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowStatus {
    Completed,
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => f.write_str("COMPLETED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowRunOutput {
    pub workflow_name: String,
    pub status: WorkflowStatus,
    pub step_results: Vec<StepOutput>,
    pub content: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Workflow {
    pub name: String,
    pub description: String,
    pub steps: Vec<Step>,
}

impl Workflow {
    pub fn new(name: impl Into<String>, description: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            steps,
        }
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name.as_str()).collect()
    }

    pub async fn run(&self, input: Option<&str>) -> Result<WorkflowRunOutput, WorkflowError> {
        tracing::info!(workflow = %self.name, steps = self.steps.len(), "workflow started");
        let mut outputs: Vec<StepOutput> = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            tracing::debug!(workflow = %self.name, step = %step.name, "running step");
            let step_input = StepInput {
                input,
                previous_step_outputs: &outputs,
            };
            let content = step.executor.execute(step_input).await.map_err(|e| {
                tracing::error!(workflow = %self.name, step = %step.name, error = %e, "step failed");
                e
            })?;
            outputs.push(StepOutput {
                step_name: step.name.clone(),
                content,
            });
        }
        tracing::info!(workflow = %self.name, "workflow completed");
        Ok(WorkflowRunOutput {
            workflow_name: self.name.clone(),
            status: WorkflowStatus::Completed,
            content: outputs.last().map(|o| o.content.clone()),
            step_results: outputs,
        })
    }
}

/// `"{prompt}\n\nRepository root: {path}"` when a path is given.
pub fn with_repository_root(prompt: &str, project_path: Option<&Path>) -> String {
    match project_path {
        Some(path) => format!("{prompt}\n\nRepository root: {}", path.display()),
        None => prompt.to_string(),
    }
}

/// Text-in, text-out agent call used by workflow steps.
#[async_trait]
pub trait TextRunner: Send + Sync {
    async fn run_text(
        &self,
        prompt: &str,
        project_path: Option<&Path>,
    ) -> Result<String, WorkflowError>;
}

/// [`TextRunner`] over an [`AgentRunner`]. All calls share one
/// `"{prefix}-{uuid}"` session, and a project path is appended to the prompt
/// as `Repository root: <path>`.
pub struct AgentTextRunner {
    runner: Arc<dyn AgentRunner>,
    session_id: String,
    project_path: Option<PathBuf>,
}

impl AgentTextRunner {
    pub fn new(runner: Arc<dyn AgentRunner>, session_prefix: &str) -> Self {
        Self {
            runner,
            session_id: format!("{session_prefix}-{}", uuid::Uuid::new_v4()),
            project_path: None,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Path used when a call does not supply one.
    #[must_use]
    pub fn with_project_path(mut self, project_path: Option<PathBuf>) -> Self {
        self.project_path = project_path;
        self
    }
}

#[async_trait]
impl TextRunner for AgentTextRunner {
    async fn run_text(
        &self,
        prompt: &str,
        project_path: Option<&Path>,
    ) -> Result<String, WorkflowError> {
        let prompt = with_repository_root(prompt, project_path.or(self.project_path.as_deref()));
        let output = self.runner.run(&prompt, Some(&self.session_id)).await?;
        Ok(output.content_as_string())
    }
}

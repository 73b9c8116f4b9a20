//! Adapters exposing workcell agents and workflows to a scenario harness.

use crate::workflow::{with_repository_root, Workflow};
use async_trait::async_trait;
use clap::ValueEnum;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use workcell_contract::runner::AgentRunner;
use workcell_contract::scenario::{
    AgentAdapter, AgentAdapterError, AgentInput, AgentReturn, ScenarioConfig, ScenarioError,
};
use workcell_contract::thread::{Message, Role};
use workcell_extension_mcp::{McpSettings, McpTransportKind};

pub const CODER_FALLBACK: &str = "I have no updates.";
pub const REPOSITORY_QA_FALLBACK: &str = "Repository exploration completed.";

/// Routes the latest user message to an agent working on one repository.
///
/// The thread id doubles as the agent session, so a scenario conversation
/// keeps its history across turns.
pub struct RunnerAdapter {
    runner: Arc<dyn AgentRunner>,
    project_path: PathBuf,
    fallback: String,
}

impl RunnerAdapter {
    pub fn new(
        runner: Arc<dyn AgentRunner>,
        project_path: impl Into<PathBuf>,
        fallback: impl Into<String>,
    ) -> Self {
        Self {
            runner,
            project_path: project_path.into(),
            fallback: fallback.into(),
        }
    }

    pub fn coder(runner: Arc<dyn AgentRunner>, project_path: impl Into<PathBuf>) -> Self {
        Self::new(runner, project_path, CODER_FALLBACK)
    }

    pub fn repository_qa(runner: Arc<dyn AgentRunner>, project_path: impl Into<PathBuf>) -> Self {
        Self::new(runner, project_path, REPOSITORY_QA_FALLBACK)
    }
}

#[async_trait]
impl AgentAdapter for RunnerAdapter {
    async fn call(&self, input: AgentInput) -> Result<AgentReturn, AgentAdapterError> {
        let prompt = with_repository_root(
            &input.last_new_user_message_str(),
            Some(self.project_path.as_path()),
        );
        let output = self
            .runner
            .run(&prompt, Some(input.thread_id()))
            .await
            .map_err(|e| AgentAdapterError::Agent(e.to_string()))?;

        let mut messages = output.messages;
        if let Some(content) = output.content.filter(|c| !c.is_empty()) {
            let already_last = messages
                .last()
                .is_some_and(|m| m.role == Role::Assistant && m.content == content);
            if !already_last {
                messages.push(Message::assistant(content));
            }
        }
        if messages.is_empty() {
            messages.push(Message::assistant(self.fallback.clone()));
        }
        Ok(AgentReturn::Messages(messages))
    }
}

/// Runs a workflow on the latest user message and reports every step.
pub struct WorkflowAdapter {
    workflow: Workflow,
}

impl WorkflowAdapter {
    pub fn new(workflow: Workflow) -> Self {
        Self { workflow }
    }
}

#[async_trait]
impl AgentAdapter for WorkflowAdapter {
    async fn call(&self, input: AgentInput) -> Result<AgentReturn, AgentAdapterError> {
        let request = input.last_new_user_message_str();
        let run = self
            .workflow
            .run(Some(&request))
            .await
            .map_err(|e| AgentAdapterError::Workflow(e.to_string()))?;

        let mut lines = vec![
            "TDD workflow execution summary:".to_string(),
            format!("Status: {}", run.status),
        ];
        lines.extend(
            run.step_results
                .iter()
                .map(|step| format!("- {}: {}", step.step_name, step.content)),
        );
        if let Some(content) = run.content.filter(|c| !c.is_empty()) {
            if !lines.contains(&content) {
                lines.push(content);
            }
        }
        Ok(AgentReturn::Text(lines.join("\n")))
    }
}

/// Walker settings for scenario agents: `base` with the scenario's walker
/// overrides applied.
pub fn scenario_mcp_settings(
    base: McpSettings,
    config: &ScenarioConfig,
) -> Result<McpSettings, ScenarioError> {
    let mut settings = base;
    if let Some(command) = &config.walker_command {
        settings.lsp_walker_command = command.clone();
    }
    if let Some(transport) = &config.walker_transport {
        settings.lsp_walker_transport = McpTransportKind::from_str(transport, true)
            .map_err(|e| ScenarioError::Harness(format!("invalid walker transport: {e}")))?;
    }
    if let Some(url) = &config.walker_url {
        settings.lsp_walker_url = Some(url.clone());
    }
    tracing::debug!(
        command = %settings.lsp_walker_command,
        transport = %settings.lsp_walker_transport,
        url = ?settings.lsp_walker_url,
        "scenario walker settings"
    );
    Ok(settings)
}

/// Copy a fixture repository into `destination`, which must not exist yet.
pub fn copy_fixture_repo(template: &Path, destination: &Path) -> io::Result<()> {
    if destination.exists() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} already exists", destination.display()),
        ));
    }
    copy_dir(template, destination)
}

fn copy_dir(from: &Path, to: &Path) -> io::Result<()> {
    std::fs::create_dir_all(to)?;
    for entry in std::fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

//! The workbench: one entry point per user-facing operation.

use crate::agents::{AgentBuildError, AgentFactory, GenaiAgentFactory};
use crate::commands::{
    create_manager_from_config, CommandCategory, CommandError, TestCommandManager,
    WorkflowCommandConfig,
};
use crate::prompts::load_prompt;
use crate::settings::{AgentSettings, LlmProvider, McpSettings};
use crate::workflow::{
    create_linter_workflow, create_tdd_workflow, with_repository_root, AgentTextRunner,
    LinterWorkflowConfig, TddWorkflowConfig, TextRunner, WorkflowError, WorkflowRunOutput,
};
use std::path::Path;
use std::sync::Arc;
use workcell_contract::runner::AgentRunner;
use workcell_extension_mcp::McpError;

#[derive(Debug, thiserror::Error)]
pub enum WorkbenchError {
    /// The agent cannot be set up, usually for want of credentials.
    #[error("{0}")]
    Configuration(String),

    #[error("{0}")]
    Execution(String),

    #[error(transparent)]
    Command(#[from] CommandError),
}

impl WorkbenchError {
    pub fn missing_credentials(provider: LlmProvider) -> Self {
        let label = match provider {
            LlmProvider::Openai => "OpenAI",
            LlmProvider::AzureOpenai => "Azure OpenAI",
            LlmProvider::Anthropic => "Anthropic",
            LlmProvider::Gemini => "Gemini",
        };
        Self::Configuration(format!("{label} API key not configured."))
    }
}

impl From<AgentBuildError> for WorkbenchError {
    fn from(err: AgentBuildError) -> Self {
        match err {
            AgentBuildError::Provider(e) => Self::Configuration(e.to_string()),
            AgentBuildError::Mcp(e @ (McpError::UnsupportedProvider(_) | McpError::Walker(_))) => {
                Self::Configuration(e.to_string())
            }
            AgentBuildError::Mcp(e) => Self::Execution(e.to_string()),
        }
    }
}

impl From<WorkflowError> for WorkbenchError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::Command(e) => Self::Command(e),
            WorkflowError::Agent(e) => Self::Execution(e.to_string()),
        }
    }
}

/// Runs agents and workflows from one set of settings.
#[derive(Clone)]
pub struct Workbench {
    settings: AgentSettings,
    mcp_settings: McpSettings,
    command_config: WorkflowCommandConfig,
    factory: Arc<dyn AgentFactory>,
}

impl std::fmt::Debug for Workbench {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workbench")
            .field("settings", &self.settings)
            .field("mcp_settings", &self.mcp_settings)
            .field("command_config", &self.command_config)
            .finish_non_exhaustive()
    }
}

impl Workbench {
    pub fn new(settings: AgentSettings, mcp_settings: McpSettings) -> Self {
        Self {
            settings,
            mcp_settings,
            command_config: WorkflowCommandConfig::default(),
            factory: Arc::new(GenaiAgentFactory),
        }
    }

    #[must_use]
    pub fn with_factory(mut self, factory: Arc<dyn AgentFactory>) -> Self {
        self.factory = factory;
        self
    }

    /// Named test and lint commands available to workflows.
    #[must_use]
    pub fn with_command_config(mut self, config: WorkflowCommandConfig) -> Self {
        self.command_config = config;
        self
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    fn ensure_credentials(&self) -> Result<(), WorkbenchError> {
        if self.settings.credential_configured() {
            Ok(())
        } else {
            Err(WorkbenchError::missing_credentials(self.settings.provider))
        }
    }

    fn instructions(name: &str) -> Result<&'static str, WorkbenchError> {
        load_prompt(name).map_err(|e| WorkbenchError::Configuration(e.to_string()))
    }

    async fn run_prompt(
        runner: &dyn AgentRunner,
        prompt: &str,
    ) -> Result<String, WorkbenchError> {
        let output = runner
            .run(prompt, None)
            .await
            .map_err(|e| WorkbenchError::Execution(e.to_string()))?;
        Ok(output.content_as_string())
    }

    pub async fn run_coding_agent(&self, prompt: &str) -> Result<String, WorkbenchError> {
        self.ensure_credentials()?;
        tracing::info!(provider = %self.settings.provider, "running coding agent");
        let agent = self
            .factory
            .coding_agent(&self.settings, Self::instructions("coding_agent")?)
            .await?;
        Self::run_prompt(agent.as_ref(), prompt).await
    }

    pub async fn run_repository_qa_agent(
        &self,
        prompt: &str,
        project_path: Option<&Path>,
    ) -> Result<String, WorkbenchError> {
        self.ensure_credentials()?;
        tracing::info!(project = ?project_path, "running repository QA agent");
        let agent = self
            .factory
            .repository_qa_agent(
                &self.settings,
                &self.mcp_settings,
                Self::instructions("repository_qa_agent")?,
                project_path,
            )
            .await?;
        Self::run_prompt(agent.as_ref(), &with_repository_root(prompt, project_path)).await
    }

    pub async fn run_serena_coder_agent(
        &self,
        prompt: &str,
        project_path: Option<&Path>,
    ) -> Result<String, WorkbenchError> {
        self.ensure_credentials()?;
        tracing::info!(project = ?project_path, "running Serena coder agent");
        let agent = self
            .factory
            .serena_coder_agent(
                &self.settings,
                &self.mcp_settings,
                Self::instructions("serena_coder_agent")?,
                project_path,
            )
            .await?;
        Self::run_prompt(agent.as_ref(), &with_repository_root(prompt, project_path)).await
    }

    fn command_manager(&self, category: CommandCategory) -> TestCommandManager {
        create_manager_from_config(&self.command_config, category, None)
    }

    /// Repository QA agent explores; the Serena coder writes tests and code.
    pub async fn run_tdd_workflow(
        &self,
        config: TddWorkflowConfig,
    ) -> Result<WorkflowRunOutput, WorkbenchError> {
        self.ensure_credentials()?;
        let project_path = config.project_path.clone();
        let explorer = self
            .factory
            .repository_qa_agent(
                &self.settings,
                &self.mcp_settings,
                Self::instructions("repository_qa_agent")?,
                project_path.as_deref(),
            )
            .await?;
        let coder = self
            .factory
            .serena_coder_agent(
                &self.settings,
                &self.mcp_settings,
                Self::instructions("serena_coder_agent")?,
                project_path.as_deref(),
            )
            .await?;

        let text_runner = |runner: &Arc<dyn AgentRunner>, prefix: &str| -> Arc<dyn TextRunner> {
            Arc::new(
                AgentTextRunner::new(runner.clone(), prefix).with_project_path(project_path.clone()),
            )
        };
        let workflow = create_tdd_workflow(
            config,
            Some(self.command_manager(CommandCategory::Tests)),
            text_runner(&explorer, "tdd-explore"),
            text_runner(&coder, "tdd-tests"),
            Some(text_runner(&coder, "tdd-implement")),
        );
        Ok(workflow.run(None).await?)
    }

    /// The coding agent proposes fixes for whatever the linter reports.
    pub async fn run_linter_workflow(
        &self,
        config: LinterWorkflowConfig,
    ) -> Result<WorkflowRunOutput, WorkbenchError> {
        self.ensure_credentials()?;
        let coder = self
            .factory
            .coding_agent(&self.settings, Self::instructions("coding_agent")?)
            .await?;
        let workflow = create_linter_workflow(
            config,
            Some(self.command_manager(CommandCategory::Lint)),
            Arc::new(AgentTextRunner::new(coder, "lint-fix")),
        );
        Ok(workflow.run(None).await?)
    }
}

//! Factories for the configured agents.

use crate::llm::{create_model, LlmProviderError};
use crate::settings::{AgentSettings, McpSettings};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use workcell_agent_loop::{Agent, AgentBuilder, GenaiLlmExecutor};
use workcell_contract::runner::AgentRunner;
use workcell_extension_mcp::{create_lsp_walker, McpError};

#[derive(Debug, thiserror::Error)]
pub enum AgentBuildError {
    #[error(transparent)]
    Provider(#[from] LlmProviderError),

    #[error(transparent)]
    Mcp(#[from] McpError),
}

fn agent_builder(
    settings: &AgentSettings,
    instructions: &str,
) -> Result<AgentBuilder, AgentBuildError> {
    let binding = create_model(settings)?;
    let executor = Arc::new(GenaiLlmExecutor::new(binding.client));
    Ok(Agent::builder(binding.model, executor)
        .with_name(settings.agent_name.clone())
        .with_instructions(instructions))
}

/// Plain chat agent without tools.
pub fn create_coding_agent(
    settings: &AgentSettings,
    instructions: &str,
) -> Result<Agent, AgentBuildError> {
    Ok(agent_builder(settings, instructions)?.build())
}

/// Agent carrying the LSP walker's tools for `project_path`.
async fn create_walker_agent(
    settings: &AgentSettings,
    mcp_settings: &McpSettings,
    instructions: &str,
    project_path: Option<&Path>,
) -> Result<Agent, AgentBuildError> {
    let builder = agent_builder(settings, instructions)?;
    let walker = create_lsp_walker(mcp_settings, project_path)?;
    let toolkit = walker.create_toolkit().await?;
    tracing::info!(
        agent = %settings.agent_name,
        server = toolkit.server_name(),
        tools = toolkit.tool_ids().len(),
        project = ?walker.project_path(),
        "attached LSP walker tools"
    );
    Ok(builder.with_tools(toolkit.tools()).build())
}

pub async fn create_repository_qa_agent(
    settings: &AgentSettings,
    mcp_settings: &McpSettings,
    instructions: &str,
    project_path: Option<&Path>,
) -> Result<Agent, AgentBuildError> {
    create_walker_agent(settings, mcp_settings, instructions, project_path).await
}

pub async fn create_serena_coder_agent(
    settings: &AgentSettings,
    mcp_settings: &McpSettings,
    instructions: &str,
    project_path: Option<&Path>,
) -> Result<Agent, AgentBuildError> {
    create_walker_agent(settings, mcp_settings, instructions, project_path).await
}

/// Builds the runners used by the workbench.
#[async_trait]
pub trait AgentFactory: Send + Sync {
    async fn coding_agent(
        &self,
        settings: &AgentSettings,
        instructions: &str,
    ) -> Result<Arc<dyn AgentRunner>, AgentBuildError>;

    async fn repository_qa_agent(
        &self,
        settings: &AgentSettings,
        mcp_settings: &McpSettings,
        instructions: &str,
        project_path: Option<&Path>,
    ) -> Result<Arc<dyn AgentRunner>, AgentBuildError>;

    async fn serena_coder_agent(
        &self,
        settings: &AgentSettings,
        mcp_settings: &McpSettings,
        instructions: &str,
        project_path: Option<&Path>,
    ) -> Result<Arc<dyn AgentRunner>, AgentBuildError>;
}

/// [`AgentFactory`] backed by genai clients and the MCP walker.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenaiAgentFactory;

#[async_trait]
impl AgentFactory for GenaiAgentFactory {
    async fn coding_agent(
        &self,
        settings: &AgentSettings,
        instructions: &str,
    ) -> Result<Arc<dyn AgentRunner>, AgentBuildError> {
        Ok(Arc::new(create_coding_agent(settings, instructions)?))
    }

    async fn repository_qa_agent(
        &self,
        settings: &AgentSettings,
        mcp_settings: &McpSettings,
        instructions: &str,
        project_path: Option<&Path>,
    ) -> Result<Arc<dyn AgentRunner>, AgentBuildError> {
        let agent =
            create_repository_qa_agent(settings, mcp_settings, instructions, project_path).await?;
        Ok(Arc::new(agent))
    }

    async fn serena_coder_agent(
        &self,
        settings: &AgentSettings,
        mcp_settings: &McpSettings,
        instructions: &str,
        project_path: Option<&Path>,
    ) -> Result<Arc<dyn AgentRunner>, AgentBuildError> {
        let agent =
            create_serena_coder_agent(settings, mcp_settings, instructions, project_path).await?;
        Ok(Arc::new(agent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::LlmProvider;

    #[test]
    fn coding_agent_uses_settings() {
        let settings = AgentSettings::default().with_agent_name("Pair");
        let agent = create_coding_agent(&settings, "be helpful").unwrap();
        assert_eq!(agent.name(), "Pair");
        assert_eq!(agent.model(), "openai::gpt-4o-mini");
        assert_eq!(agent.instructions(), Some("be helpful"));
        assert!(agent.tool_ids().is_empty());
    }

    #[test]
    fn provider_errors_surface() {
        let settings = AgentSettings {
            provider: LlmProvider::AzureOpenai,
            ..AgentSettings::default()
        };
        let err = create_coding_agent(&settings, "x").unwrap_err();
        assert!(matches!(err, AgentBuildError::Provider(_)));
    }

    #[tokio::test]
    async fn unknown_walker_provider_is_rejected() {
        let mcp = McpSettings {
            lsp_walker_provider: "ctags".into(),
            ..McpSettings::default()
        };
        let err = create_repository_qa_agent(&AgentSettings::default(), &mcp, "x", None)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Unsupported LSP walker provider: ctags");
    }
}

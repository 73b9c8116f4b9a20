use crate::convert::{build_request, from_genai_tool_call};
use async_trait::async_trait;
use genai::chat::ChatOptions;
use genai::Client;
use thiserror::Error;
use workcell_contract::thread::{Message, ToolCall};
use workcell_contract::tool::ToolDescriptor;

/// What the model produced in one inference.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelTurn {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

impl ModelTurn {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            text: None,
            tool_calls: calls,
        }
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    Request(String),
}

/// One model inference over a message list.
#[async_trait]
pub trait LlmExecutor: Send + Sync {
    async fn exec_turn(
        &self,
        model: &str,
        messages: &[Message],
        tools: &[ToolDescriptor],
    ) -> Result<ModelTurn, LlmError>;
}

/// Executor calling a provider through `genai`.
#[derive(Debug, Clone)]
pub struct GenaiLlmExecutor {
    client: Client,
    chat_options: Option<ChatOptions>,
}

impl GenaiLlmExecutor {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            chat_options: None,
        }
    }

    #[must_use]
    pub fn with_chat_options(mut self, options: ChatOptions) -> Self {
        self.chat_options = Some(options);
        self
    }
}

#[async_trait]
impl LlmExecutor for GenaiLlmExecutor {
    async fn exec_turn(
        &self,
        model: &str,
        messages: &[Message],
        tools: &[ToolDescriptor],
    ) -> Result<ModelTurn, LlmError> {
        let request = build_request(messages, tools);
        let response = self
            .client
            .exec_chat(model, request, self.chat_options.as_ref())
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;

        let text = response
            .first_text()
            .map(|s| s.to_string())
            .filter(|s| !s.is_empty());
        let tool_calls = response
            .tool_calls()
            .into_iter()
            .map(from_genai_tool_call)
            .collect();

        Ok(ModelTurn { text, tool_calls })
    }
}

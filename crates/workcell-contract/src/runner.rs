use crate::thread::{Message, Role};
use async_trait::async_trait;
use thiserror::Error;

/// Output of one agent run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentRunOutput {
    /// Final assistant text, if the model produced one.
    pub content: Option<String>,
    /// Messages produced during the run (assistant turns and tool results).
    pub messages: Vec<Message>,
}

impl AgentRunOutput {
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            messages: vec![Message::assistant(text.clone())],
            content: Some(text),
        }
    }

    /// Collapse the run into plain text.
    ///
    /// Uses `content` when it is non-empty, otherwise joins the non-empty
    /// assistant message contents with blank lines.
    pub fn content_as_string(&self) -> String {
        if let Some(content) = self.content.as_deref().filter(|c| !c.is_empty()) {
            return content.to_string();
        }
        self.messages
            .iter()
            .filter(|m| m.role == Role::Assistant && !m.content.is_empty())
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[derive(Debug, Error)]
pub enum AgentRunError {
    #[error("model call failed: {0}")]
    Model(String),

    #[error("tool round budget of {0} exhausted")]
    MaxRoundsExceeded(usize),

    #[error("{0}")]
    Other(String),
}

/// Anything that turns a prompt into agent output.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    /// Run the agent. Calls sharing a `session_id` share conversation history.
    async fn run(
        &self,
        prompt: &str,
        session_id: Option<&str>,
    ) -> Result<AgentRunOutput, AgentRunError>;

    /// Display name for logs.
    fn name(&self) -> &str {
        "agent"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_wins_when_present() {
        let out = AgentRunOutput {
            content: Some("final".into()),
            messages: vec![Message::assistant("draft")],
        };
        assert_eq!(out.content_as_string(), "final");
    }

    #[test]
    fn falls_back_to_assistant_messages() {
        let out = AgentRunOutput {
            content: Some(String::new()),
            messages: vec![
                Message::assistant("first"),
                Message::tool("c1", "ignored"),
                Message::assistant(""),
                Message::assistant("second"),
            ],
        };
        assert_eq!(out.content_as_string(), "first\n\nsecond");
    }

    #[test]
    fn empty_output_is_empty_string() {
        assert_eq!(AgentRunOutput::default().content_as_string(), "");
    }
}

use crate::executor::{LlmExecutor, ModelTurn};
use async_trait::async_trait;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;
use workcell_contract::runner::{AgentRunError, AgentRunOutput, AgentRunner};
use workcell_contract::thread::{Message, ToolCall};
use workcell_contract::tool::{Tool, ToolDescriptor, ToolResult};

pub const DEFAULT_MAX_ROUNDS: usize = 10;

/// Builder for [`Agent`].
pub struct AgentBuilder {
    name: String,
    model: String,
    instructions: Option<String>,
    tools: Vec<Arc<dyn Tool>>,
    max_rounds: usize,
    executor: Arc<dyn LlmExecutor>,
}

impl AgentBuilder {
    pub fn new(model: impl Into<String>, executor: Arc<dyn LlmExecutor>) -> Self {
        Self {
            name: "agent".to_string(),
            model: model.into(),
            instructions: None,
            tools: Vec::new(),
            max_rounds: DEFAULT_MAX_ROUNDS,
            executor,
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Add a tool. A tool with the same id replaces the earlier one.
    #[must_use]
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        let id = tool.descriptor().id;
        self.tools.retain(|t| t.descriptor().id != id);
        self.tools.push(tool);
        self
    }

    #[must_use]
    pub fn with_tools(self, tools: impl IntoIterator<Item = Arc<dyn Tool>>) -> Self {
        tools.into_iter().fold(self, Self::with_tool)
    }

    /// Upper bound on model calls per run. Values below 1 are raised to 1.
    #[must_use]
    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }

    pub fn build(self) -> Agent {
        Agent {
            name: self.name,
            model: self.model,
            instructions: self.instructions,
            tools: self.tools,
            max_rounds: self.max_rounds,
            executor: self.executor,
            sessions: Mutex::new(HashMap::new()),
        }
    }
}

/// Tool-calling LLM agent with per-session memory.
pub struct Agent {
    name: String,
    model: String,
    instructions: Option<String>,
    tools: Vec<Arc<dyn Tool>>,
    max_rounds: usize,
    executor: Arc<dyn LlmExecutor>,
    sessions: Mutex<HashMap<String, SessionSlot>>,
}

/// History of one session. A run holds the lock from load to store, so runs
/// on the same session are serialised.
type SessionSlot = Arc<AsyncMutex<Vec<Message>>>;

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("model", &self.model)
            .field("tools", &self.tool_ids())
            .field("max_rounds", &self.max_rounds)
            .finish_non_exhaustive()
    }
}

impl Agent {
    pub fn builder(model: impl Into<String>, executor: Arc<dyn LlmExecutor>) -> AgentBuilder {
        AgentBuilder::new(model, executor)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn instructions(&self) -> Option<&str> {
        self.instructions.as_deref()
    }

    pub fn max_rounds(&self) -> usize {
        self.max_rounds
    }

    pub fn tool_ids(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.descriptor().id).collect()
    }

    /// Stored history for a session, excluding system instructions. Waits
    /// for a run in progress on that session to finish.
    pub async fn session_history(&self, session_id: &str) -> Vec<Message> {
        let slot = self.lock_sessions().get(session_id).cloned();
        match slot {
            Some(slot) => slot.lock().await.clone(),
            None => Vec::new(),
        }
    }

    /// Drop a session's history. Returns whether the session existed.
    pub fn clear_session(&self, session_id: &str) -> bool {
        self.lock_sessions().remove(session_id).is_some()
    }

    pub fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock_sessions().keys().cloned().collect();
        ids.sort();
        ids
    }

    fn session_slot(&self, session_id: &str) -> SessionSlot {
        self.lock_sessions()
            .entry(session_id.to_string())
            .or_default()
            .clone()
    }

    fn lock_sessions(&self) -> std::sync::MutexGuard<'_, HashMap<String, SessionSlot>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn request_messages(&self, transcript: &[Message]) -> Vec<Message> {
        self.instructions
            .iter()
            .map(Message::system)
            .chain(transcript.iter().cloned())
            .collect()
    }

    async fn execute_tool_calls(&self, calls: &[ToolCall]) -> Vec<Message> {
        let futures = calls.iter().map(|call| async move {
            let tool = self.tools.iter().find(|t| t.descriptor().id == call.name);
            let result = execute_single_tool(tool.map(|t| &**t), call).await;
            tracing::debug!(
                agent = %self.name,
                tool = %call.name,
                call_id = %call.id,
                success = result.is_success(),
                "tool call finished"
            );
            Message::tool(&call.id, result.to_model_content())
        });
        join_all(futures).await
    }
}

async fn execute_single_tool(tool: Option<&dyn Tool>, call: &ToolCall) -> ToolResult {
    let Some(tool) = tool else {
        return ToolResult::error(&call.name, format!("Tool '{}' not found", call.name));
    };
    match tool.execute(call.arguments.clone()).await {
        Ok(result) => result,
        Err(e) => ToolResult::error(&call.name, e.to_string()),
    }
}

#[async_trait]
impl AgentRunner for Agent {
    async fn run(
        &self,
        prompt: &str,
        session_id: Option<&str>,
    ) -> Result<AgentRunOutput, AgentRunError> {
        let slot = session_id.map(|id| self.session_slot(id));
        let mut history = match &slot {
            Some(slot) => Some(slot.lock().await),
            None => None,
        };
        let mut transcript = history.as_deref().cloned().unwrap_or_default();
        transcript.push(Message::user(prompt));
        let run_start = transcript.len();

        let descriptors: Vec<ToolDescriptor> = self.tools.iter().map(|t| t.descriptor()).collect();
        tracing::info!(
            agent = %self.name,
            model = %self.model,
            session = session_id.unwrap_or("-"),
            tools = descriptors.len(),
            "agent run started"
        );

        let mut final_text = None;
        for round in 1..=self.max_rounds {
            let ModelTurn { text, tool_calls } = self
                .executor
                .exec_turn(&self.model, &self.request_messages(&transcript), &descriptors)
                .await
                .map_err(|e| AgentRunError::Model(e.to_string()))?;

            if tool_calls.is_empty() {
                transcript.push(Message::assistant(text.clone().unwrap_or_default()));
                final_text = Some(text);
                break;
            }

            tracing::debug!(agent = %self.name, round, calls = tool_calls.len(), "executing tools");
            let results = self.execute_tool_calls(&tool_calls).await;
            transcript.push(Message::assistant_with_tool_calls(
                text.unwrap_or_default(),
                tool_calls,
            ));
            transcript.extend(results);
        }

        let Some(content) = final_text else {
            tracing::warn!(agent = %self.name, max_rounds = self.max_rounds, "tool round budget exhausted");
            return Err(AgentRunError::MaxRoundsExceeded(self.max_rounds));
        };

        let messages = transcript[run_start..].to_vec();
        if let Some(history) = history.as_deref_mut() {
            *history = transcript;
        }
        tracing::info!(agent = %self.name, messages = messages.len(), "agent run finished");

        Ok(AgentRunOutput { content, messages })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

//! Shared test fixtures for crates that depend on `workcell-contract`.
//!
//! Gated behind the `test-support` cargo feature so production builds are
//! unaffected.

use crate::runner::{AgentRunError, AgentRunOutput, AgentRunner};
use crate::tool::{Tool, ToolDescriptor, ToolError, ToolResult};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Mutex;

/// Runner that replays queued outputs and records every call.
pub struct ScriptedRunner {
    name: String,
    responses: Mutex<Vec<Result<AgentRunOutput, String>>>,
    calls: Mutex<Vec<(String, Option<String>)>>,
}

impl ScriptedRunner {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            responses: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Runner that answers every prompt with the same text.
    pub fn replying(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(name).then_output(AgentRunOutput::from_text(text))
    }

    pub fn then_output(self, output: AgentRunOutput) -> Self {
        self.responses.lock().expect("lock poisoned").push(Ok(output));
        self
    }

    pub fn then_text(self, text: impl Into<String>) -> Self {
        self.then_output(AgentRunOutput::from_text(text))
    }

    pub fn then_error(self, message: impl Into<String>) -> Self {
        self.responses
            .lock()
            .expect("lock poisoned")
            .push(Err(message.into()));
        self
    }

    /// Prompts received so far, with their session ids.
    pub fn calls(&self) -> Vec<(String, Option<String>)> {
        self.calls.lock().expect("lock poisoned").clone()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.calls().into_iter().map(|(p, _)| p).collect()
    }
}

#[async_trait]
impl AgentRunner for ScriptedRunner {
    async fn run(
        &self,
        prompt: &str,
        session_id: Option<&str>,
    ) -> Result<AgentRunOutput, AgentRunError> {
        self.calls
            .lock()
            .expect("lock poisoned")
            .push((prompt.to_string(), session_id.map(str::to_string)));
        let mut responses = self.responses.lock().expect("lock poisoned");
        // The last scripted response repeats once the queue is drained.
        let next = if responses.len() > 1 {
            responses.remove(0)
        } else {
            responses
                .first()
                .cloned()
                .unwrap_or_else(|| Ok(AgentRunOutput::default()))
        };
        next.map_err(AgentRunError::Other)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Tool returning a fixed value and recording its arguments.
pub struct RecordingTool {
    descriptor: ToolDescriptor,
    reply: Value,
    seen: Mutex<Vec<Value>>,
}

impl RecordingTool {
    pub fn new(id: impl Into<String>, reply: Value) -> Self {
        let id = id.into();
        Self {
            descriptor: ToolDescriptor::new(id.clone(), id, "recording test tool"),
            reply,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn seen(&self) -> Vec<Value> {
        self.seen.lock().expect("lock poisoned").clone()
    }
}

#[async_trait]
impl Tool for RecordingTool {
    fn descriptor(&self) -> ToolDescriptor {
        self.descriptor.clone()
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, ToolError> {
        self.seen.lock().expect("lock poisoned").push(args);
        Ok(ToolResult::success(
            self.descriptor.id.clone(),
            self.reply.clone(),
        ))
    }
}

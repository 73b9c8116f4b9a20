//! Tool trait for agent actions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Tool execution status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Success,
    Error,
}

/// Result of tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_name: String,
    pub status: ToolStatus,
    pub data: Value,
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

impl ToolResult {
    /// Create a success result.
    pub fn success(tool_name: impl Into<String>, data: impl Into<Value>) -> Self {
        Self {
            tool_name: tool_name.into(),
            status: ToolStatus::Success,
            data: data.into(),
            message: None,
            metadata: HashMap::new(),
        }
    }

    /// Create an error result.
    pub fn error(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            status: ToolStatus::Error,
            data: Value::Null,
            message: Some(message.into()),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Success
    }

    /// Text handed back to the model as the tool response.
    pub fn to_model_content(&self) -> String {
        match (&self.status, &self.data) {
            (ToolStatus::Success, Value::String(text)) => text.clone(),
            (ToolStatus::Success, data) => data.to_string(),
            (ToolStatus::Error, _) => format!(
                "Error: {}",
                self.message.as_deref().unwrap_or("tool execution failed")
            ),
        }
    }
}

/// Tool execution errors.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Tool descriptor containing metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Unique tool ID, also the function name exposed to the model.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    pub description: String,
    /// JSON schema for parameters.
    pub parameters: Value,
    pub category: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl ToolDescriptor {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            parameters: serde_json::json!({"type": "object", "properties": {}}),
            category: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_parameters(mut self, schema: Value) -> Self {
        self.parameters = schema;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Tool trait for implementing agent tools.
#[async_trait]
pub trait Tool: Send + Sync {
    fn descriptor(&self) -> ToolDescriptor;

    async fn execute(&self, args: Value) -> Result<ToolResult, ToolError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_string_data_is_passed_verbatim_to_model() {
        let result = ToolResult::success("read", "file body");
        assert_eq!(result.to_model_content(), "file body");
    }

    #[test]
    fn success_structured_data_is_json_encoded() {
        let result = ToolResult::success("calc", json!({"result": 6}));
        assert_eq!(result.to_model_content(), r#"{"result":6}"#);
    }

    #[test]
    fn error_result_is_prefixed() {
        let result = ToolResult::error("calc", "division by zero");
        assert!(!result.is_success());
        assert_eq!(result.to_model_content(), "Error: division by zero");
    }

    #[test]
    fn descriptor_builder_sets_fields() {
        let d = ToolDescriptor::new("lint", "Lint", "Run a linter")
            .with_category("quality")
            .with_metadata("origin", "local")
            .with_parameters(json!({"type": "object"}));
        assert_eq!(d.category.as_deref(), Some("quality"));
        assert_eq!(d.metadata["origin"], json!("local"));
        assert_eq!(d.parameters, json!({"type": "object"}));
    }
}

//! MCP integration for workcell agents: the on-disk server registry, JSON-RPC
//! client transports, tool adapters, and LSP walker factories.

mod client_transport;
pub mod config;
pub mod protocol;
pub mod walker;

use async_trait::async_trait;
use protocol::McpToolDefinition;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use workcell_contract::tool::{Tool, ToolDescriptor, ToolError, ToolResult};

pub use client_transport::{
    McpConnectionSpec, McpToolTransport, McpTransportError, McpTransportKind,
};
pub use config::{McpConfigError, McpConfigStore, McpServerEntry};
pub use walker::{create_lsp_walker, LspWalker, McpSettings, SerenaLspWalker};

const MCP_META_SERVER: &str = "mcp.server";
const MCP_META_TOOL: &str = "mcp.tool";
const MCP_META_TRANSPORT: &str = "mcp.transport";

#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("mcp transport error: {0}")]
    Transport(#[from] McpTransportError),

    #[error(transparent)]
    Config(#[from] McpConfigError),

    #[error("Unsupported LSP walker provider: {0}")]
    UnsupportedProvider(String),

    #[error("{0}")]
    Walker(String),

    #[error("invalid tool id component after sanitization: {0}")]
    InvalidToolIdComponent(String),

    #[error("tool id already registered: {0}")]
    ToolIdConflict(String),
}

struct McpTool {
    descriptor: ToolDescriptor,
    server_name: String,
    tool_name: String,
    transport: Arc<dyn McpToolTransport>,
}

impl McpTool {
    fn new(
        tool_id: String,
        server_name: &str,
        def: McpToolDefinition,
        transport: Arc<dyn McpToolTransport>,
    ) -> Self {
        let name = def.title.clone().unwrap_or_else(|| def.name.clone());
        let desc = def
            .description
            .clone()
            .unwrap_or_else(|| format!("MCP tool {}", def.name));
        let descriptor = ToolDescriptor::new(tool_id, name, desc)
            .with_parameters(def.input_schema)
            .with_category("mcp")
            .with_metadata(MCP_META_SERVER, server_name)
            .with_metadata(MCP_META_TOOL, def.name.as_str())
            .with_metadata(MCP_META_TRANSPORT, transport.transport_type().to_string());

        Self {
            descriptor,
            server_name: server_name.to_string(),
            tool_name: def.name,
            transport,
        }
    }
}

#[async_trait]
impl Tool for McpTool {
    fn descriptor(&self) -> ToolDescriptor {
        self.descriptor.clone()
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, ToolError> {
        tracing::debug!(server = %self.server_name, tool = %self.tool_name, "calling MCP tool");
        let result = match self.transport.call_tool(&self.tool_name, args).await {
            Ok(value) => ToolResult::success(self.descriptor.id.clone(), value),
            // The server ran the tool and reported a failure the model can act on.
            Err(McpTransportError::Server(message)) => {
                ToolResult::error(self.descriptor.id.clone(), message)
            }
            Err(e) => return Err(map_mcp_error(e)),
        };
        Ok(result
            .with_metadata(MCP_META_SERVER, self.server_name.as_str())
            .with_metadata(MCP_META_TOOL, self.tool_name.as_str()))
    }
}

fn map_mcp_error(e: McpTransportError) -> ToolError {
    match e {
        McpTransportError::Timeout(msg) => ToolError::ExecutionFailed(format!("timeout: {msg}")),
        other => ToolError::ExecutionFailed(other.to_string()),
    }
}

fn sanitize_component(raw: &str) -> Result<String, McpError> {
    let mut out = String::with_capacity(raw.len());
    let mut prev_underscore = false;
    for ch in raw.chars() {
        let next = if ch.is_ascii_alphanumeric() || ch == '-' {
            ch
        } else {
            '_'
        };
        if next == '_' {
            if prev_underscore {
                continue;
            }
            prev_underscore = true;
        } else {
            prev_underscore = false;
        }
        out.push(next);
    }
    let out = out.trim_matches('_').to_string();
    if out.is_empty() {
        return Err(McpError::InvalidToolIdComponent(raw.to_string()));
    }
    Ok(out)
}

/// Tools exposed by one connected MCP server.
pub struct McpToolkit {
    server_name: String,
    transport: Arc<dyn McpToolTransport>,
    tools: Vec<Arc<dyn Tool>>,
}

impl std::fmt::Debug for McpToolkit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpToolkit")
            .field("server_name", &self.server_name)
            .field("transport", &self.transport.transport_type())
            .field("tools", &self.tool_ids())
            .finish()
    }
}

impl McpToolkit {
    /// Connect to the server described by `spec` and list its tools.
    pub async fn connect(spec: &McpConnectionSpec) -> Result<Self, McpError> {
        tracing::info!(
            server = %spec.server_name,
            transport = %spec.transport,
            command = %spec.command_line(),
            "connecting MCP server"
        );
        let transport = client_transport::connect_transport(spec).await?;
        Self::from_transport(&spec.server_name, transport).await
    }

    pub async fn from_transport(
        server_name: &str,
        transport: Arc<dyn McpToolTransport>,
    ) -> Result<Self, McpError> {
        let defs = transport.list_tools().await?;
        let mut seen = HashSet::new();
        let mut tools: Vec<Arc<dyn Tool>> = Vec::with_capacity(defs.len());
        for def in defs {
            let tool_id = sanitize_component(&def.name)?;
            if !seen.insert(tool_id.clone()) {
                return Err(McpError::ToolIdConflict(tool_id));
            }
            tools.push(Arc::new(McpTool::new(
                tool_id,
                server_name,
                def,
                Arc::clone(&transport),
            )));
        }
        tracing::info!(server = server_name, tools = tools.len(), "MCP tools discovered");
        Ok(Self {
            server_name: server_name.to_string(),
            transport,
            tools,
        })
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn tools(&self) -> Vec<Arc<dyn Tool>> {
        self.tools.clone()
    }

    pub fn tool_ids(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.descriptor().id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    struct FakeTransport {
        defs: Vec<McpToolDefinition>,
        calls: Mutex<Vec<(String, Value)>>,
        fail_with: Option<String>,
    }

    impl FakeTransport {
        fn new(names: &[&str]) -> Self {
            Self {
                defs: names
                    .iter()
                    .map(|n| serde_json::from_value(json!({"name": n})).unwrap())
                    .collect(),
                calls: Mutex::new(Vec::new()),
                fail_with: None,
            }
        }
    }

    #[async_trait]
    impl McpToolTransport for FakeTransport {
        async fn list_tools(&self) -> Result<Vec<McpToolDefinition>, McpTransportError> {
            Ok(self.defs.clone())
        }

        async fn call_tool(&self, name: &str, args: Value) -> Result<Value, McpTransportError> {
            self.calls.lock().unwrap().push((name.to_string(), args));
            match &self.fail_with {
                Some(msg) => Err(McpTransportError::Server(msg.clone())),
                None => Ok(Value::String(format!("called {name}"))),
            }
        }

        fn transport_type(&self) -> McpTransportKind {
            McpTransportKind::Stdio
        }
    }

    #[tokio::test]
    async fn toolkit_wraps_each_tool_with_metadata() {
        let transport = Arc::new(FakeTransport::new(&["find_symbol", "read.file"]));
        let kit = McpToolkit::from_transport("serena", transport).await.unwrap();
        assert_eq!(kit.tool_ids(), vec!["find_symbol", "read_file"]);

        let desc = kit.tools()[1].descriptor();
        assert_eq!(desc.metadata[MCP_META_SERVER], json!("serena"));
        assert_eq!(desc.metadata[MCP_META_TOOL], json!("read.file"));
        assert_eq!(desc.metadata[MCP_META_TRANSPORT], json!("stdio"));
        assert_eq!(desc.description, "MCP tool read.file");
    }

    #[tokio::test]
    async fn tool_calls_use_original_name() {
        let transport = Arc::new(FakeTransport::new(&["read.file"]));
        let kit = McpToolkit::from_transport("s1", transport.clone())
            .await
            .unwrap();
        let result = kit.tools()[0]
            .execute(json!({"path": "a.py"}))
            .await
            .unwrap();
        assert!(result.is_success());
        assert_eq!(result.data, json!("called read.file"));
        assert_eq!(
            transport.calls.lock().unwrap()[0],
            ("read.file".to_string(), json!({"path": "a.py"}))
        );
    }

    #[tokio::test]
    async fn server_errors_become_error_results() {
        let mut fake = FakeTransport::new(&["explode"]);
        fake.fail_with = Some("boom".to_string());
        let kit = McpToolkit::from_transport("s1", Arc::new(fake)).await.unwrap();
        let result = kit.tools()[0].execute(json!({})).await.unwrap();
        assert!(!result.is_success());
        assert_eq!(result.to_model_content(), "Error: boom");
    }

    #[tokio::test]
    async fn conflicting_tool_ids_are_rejected() {
        let transport = Arc::new(FakeTransport::new(&["a-b", "a-b"]));
        let err = McpToolkit::from_transport("s1", transport).await.unwrap_err();
        assert!(matches!(err, McpError::ToolIdConflict(_)));
    }

    #[test]
    fn sanitize_rejects_empty_component() {
        assert!(matches!(
            sanitize_component("  "),
            Err(McpError::InvalidToolIdComponent(_))
        ));
    }
}

use crate::protocol::{
    initialize_params, CallToolResult, ContentItem, JsonRpcInbound, JsonRpcNotification,
    JsonRpcRequest, ListToolsResult, McpToolDefinition,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};

const CLIENT_NAME: &str = "workcell";

#[derive(Debug, Error)]
pub enum McpTransportError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("server error: {0}")]
    Server(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// How the client reaches an MCP server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum McpTransportKind {
    #[default]
    Stdio,
    Sse,
    StreamableHttp,
}

impl McpTransportKind {
    pub fn requires_url(self) -> bool {
        !matches!(self, Self::Stdio)
    }
}

impl fmt::Display for McpTransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Stdio => "stdio",
            Self::Sse => "sse",
            Self::StreamableHttp => "streamable-http",
        })
    }
}

/// Everything needed to open one MCP connection.
#[derive(Debug, Clone, PartialEq)]
pub struct McpConnectionSpec {
    pub server_name: String,
    pub transport: McpTransportKind,
    /// Program followed by its arguments. Required for stdio.
    pub command: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub url: Option<String>,
    pub timeout: Duration,
}

impl McpConnectionSpec {
    pub fn stdio(server_name: impl Into<String>, command: Vec<String>) -> Self {
        Self {
            server_name: server_name.into(),
            transport: McpTransportKind::Stdio,
            command,
            env: BTreeMap::new(),
            url: None,
            timeout: Duration::from_secs(60),
        }
    }

    /// Command rendered back into a shell string.
    pub fn command_line(&self) -> String {
        shlex::try_join(self.command.iter().map(String::as_str))
            .unwrap_or_else(|_| self.command.join(" "))
    }
}

#[async_trait]
pub trait McpToolTransport: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<McpToolDefinition>, McpTransportError>;

    /// Call a tool and return its text content.
    async fn call_tool(&self, name: &str, args: Value) -> Result<Value, McpTransportError>;

    fn transport_type(&self) -> McpTransportKind;
}

pub(crate) async fn connect_transport(
    spec: &McpConnectionSpec,
) -> Result<Arc<dyn McpToolTransport>, McpTransportError> {
    match spec.transport {
        McpTransportKind::Stdio => Ok(Arc::new(StdioTransport::connect(spec).await?)),
        McpTransportKind::Sse | McpTransportKind::StreamableHttp => {
            let transport = HttpTransport::connect(spec)?;
            transport.initialize().await?;
            Ok(Arc::new(transport))
        }
    }
}

type PendingMap = Arc<Mutex<HashMap<i64, oneshot::Sender<Result<Value, McpTransportError>>>>>;

fn lock_pending(
    pending: &PendingMap,
) -> std::sync::MutexGuard<'_, HashMap<i64, oneshot::Sender<Result<Value, McpTransportError>>>> {
    pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn map_inbound(inbound: JsonRpcInbound) -> Result<Value, McpTransportError> {
    inbound
        .into_result()
        .map_err(|e| McpTransportError::Server(format!("MCP Error {}: {}", e.code, e.message)))
}

pub(crate) fn decode_call_result(result: Value) -> Result<Value, McpTransportError> {
    let call_result: CallToolResult = serde_json::from_value(result)?;
    if call_result.is_error == Some(true) {
        let error_text = call_result
            .content
            .first()
            .and_then(ContentItem::as_text)
            .unwrap_or("Unknown error");
        return Err(McpTransportError::Server(error_text.to_string()));
    }
    let text = call_result
        .content
        .iter()
        .filter_map(ContentItem::as_text)
        .collect::<Vec<_>>()
        .join("\n");
    Ok(Value::String(text))
}

/// Newline-delimited JSON-RPC over a child process's stdio.
pub(crate) struct StdioTransport {
    write_tx: mpsc::Sender<String>,
    pending: PendingMap,
    next_id: AtomicI64,
    alive: Arc<AtomicBool>,
    _child: Arc<tokio::sync::Mutex<Child>>,
    timeout: Duration,
}

impl StdioTransport {
    pub(crate) async fn connect(spec: &McpConnectionSpec) -> Result<Self, McpTransportError> {
        let (program, args) = spec.command.split_first().ok_or_else(|| {
            McpTransportError::Transport("Stdio transport requires command".to_string())
        })?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(&spec.env)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            McpTransportError::Transport(format!("Failed to spawn process '{program}': {e}"))
        })?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpTransportError::Transport("Failed to get stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpTransportError::Transport("Failed to get stdout".to_string()))?;

        let alive = Arc::new(AtomicBool::new(true));
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));

        let (write_tx, mut write_rx) = mpsc::channel::<String>(256);
        let alive_writer = Arc::clone(&alive);
        tokio::spawn(async move {
            while let Some(line) = write_rx.recv().await {
                if !alive_writer.load(Ordering::SeqCst) {
                    break;
                }
                let written = match stdin.write_all(line.as_bytes()).await {
                    Ok(()) => stdin.flush().await,
                    Err(e) => Err(e),
                };
                if let Err(e) = written {
                    tracing::warn!(error = %e, "MCP stdio write failed");
                    alive_writer.store(false, Ordering::SeqCst);
                    break;
                }
            }
        });

        let pending_reader = Arc::clone(&pending);
        let alive_reader = Arc::clone(&alive);
        let server_name = spec.server_name.clone();
        let mut reader = BufReader::new(stdout);
        tokio::spawn(async move {
            let mut line = String::new();
            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => break,
                    Ok(_) => {
                        let trimmed = line.trim();
                        if trimmed.is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<JsonRpcInbound>(trimmed) {
                            Ok(inbound) => {
                                let Some(id) = inbound.response_id() else {
                                    continue;
                                };
                                let tx = lock_pending(&pending_reader).remove(&id);
                                if let Some(tx) = tx {
                                    let _ = tx.send(map_inbound(inbound));
                                }
                            }
                            Err(e) => {
                                tracing::debug!(
                                    server = %server_name,
                                    error = %e,
                                    line = trimmed,
                                    "ignoring unparsable MCP line"
                                );
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(server = %server_name, error = %e, "MCP stdio read failed");
                        break;
                    }
                }
            }
            alive_reader.store(false, Ordering::SeqCst);
            lock_pending(&pending_reader).clear();
        });

        let transport = Self {
            write_tx,
            pending,
            next_id: AtomicI64::new(1),
            alive,
            _child: Arc::new(tokio::sync::Mutex::new(child)),
            timeout: spec.timeout,
        };

        transport
            .send_request(
                "initialize",
                Some(initialize_params(CLIENT_NAME, env!("CARGO_PKG_VERSION"))),
            )
            .await?;
        transport
            .send_notification("notifications/initialized", None)
            .await?;

        Ok(transport)
    }

    async fn send_notification(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<(), McpTransportError> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(McpTransportError::ConnectionClosed);
        }
        let line = format!(
            "{}\n",
            serde_json::to_string(&JsonRpcNotification::new(method, params))?
        );
        self.write_tx
            .send(line)
            .await
            .map_err(|_| McpTransportError::ConnectionClosed)
    }

    async fn send_request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, McpTransportError> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(McpTransportError::ConnectionClosed);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let line = format!(
            "{}\n",
            serde_json::to_string(&JsonRpcRequest::new(id, method, params))?
        );

        let (tx, rx) = oneshot::channel();
        lock_pending(&self.pending).insert(id, tx);

        // The reader marks the transport dead before it drains `pending`.
        if !self.alive.load(Ordering::SeqCst) || self.write_tx.send(line).await.is_err() {
            lock_pending(&self.pending).remove(&id);
            return Err(McpTransportError::ConnectionClosed);
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(McpTransportError::ConnectionClosed),
            Err(_) => {
                lock_pending(&self.pending).remove(&id);
                Err(McpTransportError::Timeout(format!(
                    "{method} timed out after {:?}",
                    self.timeout
                )))
            }
        }
    }
}

#[async_trait]
impl McpToolTransport for StdioTransport {
    async fn list_tools(&self) -> Result<Vec<McpToolDefinition>, McpTransportError> {
        let result = self.send_request("tools/list", Some(json!({}))).await?;
        let list: ListToolsResult = serde_json::from_value(result)?;
        Ok(list.tools)
    }

    async fn call_tool(&self, name: &str, args: Value) -> Result<Value, McpTransportError> {
        let result = self
            .send_request("tools/call", Some(json!({"name": name, "arguments": args})))
            .await?;
        decode_call_result(result)
    }

    fn transport_type(&self) -> McpTransportKind {
        McpTransportKind::Stdio
    }
}

/// JSON-RPC over HTTP POST.
pub(crate) struct HttpTransport {
    endpoint: String,
    kind: McpTransportKind,
    client: reqwest::Client,
    next_id: AtomicI64,
}

impl HttpTransport {
    pub(crate) fn connect(spec: &McpConnectionSpec) -> Result<Self, McpTransportError> {
        let endpoint = spec.url.clone().ok_or_else(|| {
            McpTransportError::Transport(format!("{} transport requires URL", spec.transport))
        })?;
        let client = reqwest::Client::builder()
            .timeout(spec.timeout)
            .build()
            .map_err(|e| {
                McpTransportError::Transport(format!("Failed to create HTTP client: {e}"))
            })?;
        Ok(Self {
            endpoint,
            kind: spec.transport,
            client,
            next_id: AtomicI64::new(1),
        })
    }

    async fn initialize(&self) -> Result<(), McpTransportError> {
        self.send_request(
            "initialize",
            Some(initialize_params(CLIENT_NAME, env!("CARGO_PKG_VERSION"))),
        )
        .await
        .map(|_| ())
    }

    async fn send_request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, McpTransportError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest::new(id, method, params);

        let response = self
            .client
            .post(&self.endpoint)
            .header("accept", "application/json, text/event-stream")
            .json(&request)
            .send()
            .await
            .map_err(|e| McpTransportError::Transport(format!("HTTP request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(McpTransportError::Transport(format!(
                "HTTP error: {status} - {body}"
            )));
        }

        let body: Value = response.json().await.map_err(|e| {
            McpTransportError::Transport(format!("Failed to parse JSON response: {e}"))
        })?;
        decode_http_body(body, id)
    }
}

/// Pick the response for `request_id` out of a single or batched body.
pub(crate) fn decode_http_body(body: Value, request_id: i64) -> Result<Value, McpTransportError> {
    let items = match body {
        Value::Array(items) => items,
        other => vec![other],
    };
    for item in items {
        let inbound: JsonRpcInbound = serde_json::from_value(item)?;
        if inbound.response_id() == Some(request_id) {
            return map_inbound(inbound);
        }
    }
    Err(McpTransportError::Protocol(format!(
        "Missing response for request id {request_id}"
    )))
}

#[async_trait]
impl McpToolTransport for HttpTransport {
    async fn list_tools(&self) -> Result<Vec<McpToolDefinition>, McpTransportError> {
        let result = self.send_request("tools/list", Some(json!({}))).await?;
        let list: ListToolsResult = serde_json::from_value(result)?;
        Ok(list.tools)
    }

    async fn call_tool(&self, name: &str, args: Value) -> Result<Value, McpTransportError> {
        let result = self
            .send_request("tools/call", Some(json!({"name": name, "arguments": args})))
            .await?;
        decode_call_result(result)
    }

    fn transport_type(&self) -> McpTransportKind {
        self.kind
    }
}

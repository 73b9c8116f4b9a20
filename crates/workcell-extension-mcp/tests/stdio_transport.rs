use serde_json::json;
use std::time::Duration;
use workcell_contract::tool::ToolError;
use workcell_extension_mcp::{McpConnectionSpec, McpError, McpToolkit};

const FAKE_SERVER: &str = r#"
read -r line
echo '{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2024-11-05","capabilities":{},"serverInfo":{"name":"fake","version":"0"}}}'
read -r line
read -r line
echo '{"jsonrpc":"2.0","id":2,"result":{"tools":[{"name":"echo","description":"Echo text","inputSchema":{"type":"object"}}]}}'
read -r line
echo '{"jsonrpc":"2.0","method":"notifications/message","params":{}}'
echo '{"jsonrpc":"2.0","id":3,"result":{"content":[{"type":"text","text":"hello"},{"type":"text","text":"world"}]}}'
"#;

fn fake_server_spec(script: &str) -> McpConnectionSpec {
    let mut spec = McpConnectionSpec::stdio(
        "fake",
        vec!["sh".to_string(), "-c".to_string(), script.to_string()],
    );
    spec.timeout = Duration::from_secs(10);
    spec
}

#[tokio::test]
async fn stdio_toolkit_lists_and_calls_tools() {
    let kit = McpToolkit::connect(&fake_server_spec(FAKE_SERVER))
        .await
        .expect("connect");
    assert_eq!(kit.server_name(), "fake");
    assert_eq!(kit.tool_ids(), vec!["echo"]);

    let tools = kit.tools();
    let tool = &tools[0];
    assert_eq!(tool.descriptor().description, "Echo text");

    let result = tool.execute(json!({"text": "hi"})).await.expect("call");
    assert_eq!(result.data, json!("hello\nworld"));
}

#[tokio::test]
async fn missing_program_fails_to_connect() {
    let spec = McpConnectionSpec::stdio(
        "missing",
        vec!["workcell-definitely-not-a-program".to_string()],
    );
    let err = McpToolkit::connect(&spec).await.unwrap_err();
    assert!(matches!(err, McpError::Transport(_)));
    assert!(err.to_string().contains("Failed to spawn process"));
}

#[tokio::test]
async fn server_exit_closes_connection() {
    let err = McpToolkit::connect(&fake_server_spec("exit 0"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("connection closed"), "{err}");
}

const SILENT_ON_CALL: &str = r#"
read -r line
echo '{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2024-11-05","capabilities":{},"serverInfo":{"name":"fake","version":"0"}}}'
read -r line
read -r line
echo '{"jsonrpc":"2.0","id":2,"result":{"tools":[{"name":"echo","description":"Echo text","inputSchema":{"type":"object"}}]}}'
read -r line
sleep 5
"#;

#[tokio::test]
async fn unanswered_tool_calls_time_out() {
    let mut spec = fake_server_spec(SILENT_ON_CALL);
    spec.timeout = Duration::from_millis(200);
    let kit = McpToolkit::connect(&spec).await.expect("connect");
    let tools = kit.tools();

    let err = tools[0].execute(json!({"text": "hi"})).await.unwrap_err();
    assert!(
        matches!(err, ToolError::ExecutionFailed(ref m) if m.contains("tools/call timed out")),
        "{err}"
    );
}

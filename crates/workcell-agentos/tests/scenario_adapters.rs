use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use workcell_agentos::scenario::{
    copy_fixture_repo, scenario_mcp_settings, RunnerAdapter, WorkflowAdapter,
};
use workcell_agentos::workflow::{Step, StepExecutor, StepInput, Workflow, WorkflowError};
use workcell_contract::runner::AgentRunOutput;
use workcell_contract::scenario::{
    AgentAdapter, AgentInput, AgentReturn, JudgeAgent, ScenarioConfig, ScenarioRequest,
    UserSimulatorAgent,
};
use workcell_contract::testing::ScriptedRunner;
use workcell_contract::thread::{Message, ToolCall};
use workcell_extension_mcp::{McpSettings, McpTransportKind};

fn fixture_repo() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/scenario_repo")
}

fn input(thread: &str, user: &str) -> AgentInput {
    AgentInput::new(
        thread,
        vec![
            Message::user("earlier question"),
            Message::assistant("earlier answer"),
            Message::user(user),
        ],
    )
}

#[tokio::test]
async fn runner_adapter_adds_root_and_uses_thread_session() {
    let tool_call = ToolCall::new("c1", "find_symbol", serde_json::json!({"name": "multiply"}));
    let runner = Arc::new(ScriptedRunner::new("serena").then_output(AgentRunOutput {
        content: Some("multiply fixed".into()),
        messages: vec![
            Message::assistant_with_tool_calls("", vec![tool_call]),
            Message::tool("c1", "calculator.py:24"),
        ],
    }));
    let adapter = RunnerAdapter::coder(runner.clone(), "/tmp/scenario-repo");

    let out = adapter.call(input("thread-7", "Fix multiply")).await.unwrap();
    let AgentReturn::Messages(messages) = out else {
        panic!("expected messages");
    };
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[2], Message::assistant("multiply fixed"));

    let calls = runner.calls();
    assert_eq!(
        calls[0].0,
        "Fix multiply\n\nRepository root: /tmp/scenario-repo"
    );
    assert_eq!(calls[0].1.as_deref(), Some("thread-7"));
}

#[tokio::test]
async fn runner_adapter_does_not_repeat_final_answer() {
    let runner = Arc::new(ScriptedRunner::replying("qa", "calculator lives in src/"));
    let adapter = RunnerAdapter::repository_qa(runner, "/repo");
    let messages = adapter
        .call(input("t", "Where is the calculator?"))
        .await
        .unwrap()
        .into_messages();
    assert_eq!(messages, vec![Message::assistant("calculator lives in src/")]);
}

#[tokio::test]
async fn runner_adapter_falls_back_when_silent() {
    let coder = RunnerAdapter::coder(Arc::new(ScriptedRunner::new("silent")), "/repo");
    assert_eq!(
        coder.call(input("t", "status?")).await.unwrap().into_messages(),
        vec![Message::assistant("I have no updates.")]
    );

    let qa = RunnerAdapter::repository_qa(Arc::new(ScriptedRunner::new("silent")), "/repo");
    assert_eq!(
        qa.call(input("t", "status?")).await.unwrap().into_messages(),
        vec![Message::assistant("Repository exploration completed.")]
    );
}

#[tokio::test]
async fn runner_adapter_reports_agent_failures() {
    let runner = Arc::new(ScriptedRunner::new("broken").then_error("model offline"));
    let err = RunnerAdapter::coder(runner, "/repo")
        .call(input("t", "go"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("model offline"));
}

struct Reply(&'static str);

#[async_trait]
impl StepExecutor for Reply {
    async fn execute(&self, input: StepInput<'_>) -> Result<String, WorkflowError> {
        Ok(format!("{} ({})", self.0, input.input.unwrap_or_default()))
    }
}

#[tokio::test]
async fn workflow_adapter_summarises_steps() {
    let workflow = Workflow::new(
        "TDD Workflow",
        "",
        vec![
            Step::new("Explore codebase", Arc::new(Reply("explored"))),
            Step::new("Execute tests (expect success)", Arc::new(Reply("passed"))),
        ],
    );
    let adapter = WorkflowAdapter::new(workflow);

    let out = adapter.call(input("t", "fix multiply")).await.unwrap();
    assert_eq!(
        out,
        AgentReturn::Text(
            "TDD workflow execution summary:\n\
             Status: COMPLETED\n\
             - Explore codebase: explored (fix multiply)\n\
             - Execute tests (expect success): passed (fix multiply)\n\
             passed (fix multiply)"
                .to_string()
        )
    );
}

#[test]
fn fixture_repo_copies_with_known_defect() {
    let dir = TempDir::new().unwrap();
    let destination = dir.path().join("scenario-repo");
    copy_fixture_repo(&fixture_repo(), &destination).unwrap();

    let calculator =
        std::fs::read_to_string(destination.join("src/sample_package/calculator.py")).unwrap();
    assert!(calculator.contains("def multiply"));
    assert!(calculator.contains("return a + b"));
    assert!(destination.join("tests/test_calculator.py").is_file());
    assert!(destination.join("docs/architecture.md").is_file());

    let again = copy_fixture_repo(&fixture_repo(), &destination).unwrap_err();
    assert_eq!(again.kind(), std::io::ErrorKind::AlreadyExists);
}

#[test]
fn scenario_requests_are_assembled_from_adapters() {
    let adapter: Arc<dyn AgentAdapter> = Arc::new(RunnerAdapter::coder(
        Arc::new(ScriptedRunner::new("coder")),
        fixture_repo(),
    ));
    let request = ScenarioRequest::new(
        "Implement multiply helper",
        "The assistant must fix multiply so the pytest suite passes.",
    )
    .with_agent(adapter)
    .with_agent(UserSimulatorAgent::new(
        "You are a product owner requesting the multiply helper be fixed.",
    ))
    .with_agent(JudgeAgent::new([
        "Assistant fixes multiply in src/sample_package/calculator.py.",
        "Assistant runs pytest and confirms the suite passes.",
    ]))
    .with_max_turns(6);

    let config = ScenarioConfig::default();
    request.validate(&config).unwrap();
    assert_eq!(request.effective_max_turns(&config), 6);
    assert_eq!(request.judges().count(), 1);
}

#[test]
fn scenario_walker_overrides_replace_base_settings() {
    let untouched = scenario_mcp_settings(McpSettings::default(), &ScenarioConfig::default()).unwrap();
    assert_eq!(untouched, McpSettings::default());

    let config = ScenarioConfig {
        walker_command: Some("/opt/serena/bin/serena start-mcp-server".into()),
        walker_transport: Some("streamable-http".into()),
        walker_url: Some("http://localhost:9121/mcp".into()),
        ..ScenarioConfig::default()
    };
    let settings = scenario_mcp_settings(McpSettings::default(), &config).unwrap();
    assert_eq!(
        settings.lsp_walker_command,
        "/opt/serena/bin/serena start-mcp-server"
    );
    assert_eq!(settings.lsp_walker_transport, McpTransportKind::StreamableHttp);
    assert_eq!(
        settings.lsp_walker_url.as_deref(),
        Some("http://localhost:9121/mcp")
    );
    assert_eq!(settings.lsp_walker_provider, "serena");

    let bad = ScenarioConfig {
        walker_transport: Some("carrier-pigeon".into()),
        ..ScenarioConfig::default()
    };
    let err = scenario_mcp_settings(McpSettings::default(), &bad).unwrap_err();
    assert!(err.to_string().contains("invalid walker transport"), "{err}");
}

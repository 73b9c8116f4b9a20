use super::{Step, StepExecutor, StepInput, TextRunner, Workflow, WorkflowError};
use crate::commands::{CommandError, TestCommandExecutor, TestCommandManager, TestCommandResult};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use workcell_contract::tool::{Tool, ToolDescriptor, ToolError, ToolResult};

const RUN_LINTER: &str = "Run linter";
const PROPOSE_FIXES: &str = "Propose fixes for linter issues";

const DEFAULT_FIX_INSTRUCTIONS: &str = "Review the linter findings and propose precise, \
    actionable code edits to resolve all issues. Provide unified diffs for each file that \
    should be changed, and explain the rationale briefly.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinterWorkflowConfig {
    pub linter_command: String,
    pub targets: Vec<String>,
    pub project_path: Option<PathBuf>,
    pub fix_instructions: Option<String>,
}

/// Quote a value for a POSIX shell command line. Plain values pass through;
/// empty values become `''`; values with whitespace, quotes, `$` or a
/// backtick are single-quoted.
pub fn shell_escape(value: &str) -> String {
    if value.is_empty() {
        return "''".to_string();
    }
    let needs_quotes = value
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '\'' | '"' | '$' | '`'));
    if needs_quotes {
        format!("'{}'", value.replace('\'', r"'\''"))
    } else {
        value.to_string()
    }
}

fn command_with_targets(command: &str, targets: &[String]) -> String {
    let targets: Vec<String> = targets.iter().map(|t| shell_escape(t)).collect();
    if targets.is_empty() {
        command.to_string()
    } else {
        format!("{command} {}", targets.join(" "))
    }
}

fn format_lint_summary(result: &TestCommandResult) -> String {
    let verdict = if result.returncode != 0 {
        "Issues found"
    } else {
        "No issues detected"
    };
    format!(
        "Command: {}\nExit code: {} ({verdict})\nDuration: {:.2}s\n\nStdout:\n{}\n\nStderr:\n{}",
        result.command_display(),
        result.returncode,
        result.duration.as_secs_f64(),
        result.stdout.trim(),
        result.stderr.trim(),
    )
    .trim()
    .to_string()
}

enum LinterStage {
    Run,
    ProposeFixes,
}

struct LinterStep {
    stage: LinterStage,
    config: Arc<LinterWorkflowConfig>,
    executor: Arc<TestCommandExecutor>,
    fix_runner: Arc<dyn TextRunner>,
}

#[async_trait]
impl StepExecutor for LinterStep {
    async fn execute(&self, input: StepInput<'_>) -> Result<String, WorkflowError> {
        match self.stage {
            LinterStage::Run => {
                let spec = command_with_targets(&self.config.linter_command, &self.config.targets);
                let result = self.executor.run(&spec, None).await?;
                Ok(format_lint_summary(&result))
            }
            LinterStage::ProposeFixes => {
                let instructions = self
                    .config
                    .fix_instructions
                    .as_deref()
                    .filter(|i| !i.is_empty())
                    .unwrap_or(DEFAULT_FIX_INSTRUCTIONS);
                let prompt = format!(
                    "{instructions}\n\nLinter summary (raw output included):\n{}",
                    input.get_step_content(RUN_LINTER).unwrap_or_default()
                );
                self.fix_runner.run_text(&prompt, None).await
            }
        }
    }
}

/// Run the linter against the targets, then ask `fix_runner` for fixes.
pub fn create_linter_workflow(
    config: LinterWorkflowConfig,
    command_manager: Option<TestCommandManager>,
    fix_runner: Arc<dyn TextRunner>,
) -> Workflow {
    let executor = Arc::new(
        TestCommandExecutor::new(command_manager.unwrap_or_default())
            .with_cwd(config.project_path.clone()),
    );
    let config = Arc::new(config);
    let step = |name: &str, stage: LinterStage| {
        Step::new(
            name,
            Arc::new(LinterStep {
                stage,
                config: config.clone(),
                executor: executor.clone(),
                fix_runner: fix_runner.clone(),
            }),
        )
    };
    Workflow::new(
        "Linter Workflow",
        "Run the configured linter against targets and ask a coding agent to propose fixes for issues.",
        vec![
            step(RUN_LINTER, LinterStage::Run),
            step(PROPOSE_FIXES, LinterStage::ProposeFixes),
        ],
    )
}

/// Agent tool that runs a fixed linter command against model-chosen targets.
pub struct LinterTool {
    linter_command: String,
    executor: TestCommandExecutor,
}

impl LinterTool {
    pub fn new(
        linter_command: impl Into<String>,
        cwd: Option<PathBuf>,
        manager: Option<TestCommandManager>,
    ) -> Self {
        Self {
            linter_command: linter_command.into(),
            executor: TestCommandExecutor::new(manager.unwrap_or_default()).with_cwd(cwd),
        }
    }

    pub async fn run(&self, targets: &[String]) -> Result<TestCommandResult, CommandError> {
        let spec = command_with_targets(&self.linter_command, targets);
        self.executor.run(&spec, None).await
    }
}

#[async_trait]
impl Tool for LinterTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(
            "run_linter",
            "Run linter",
            format!(
                "Run `{}` against the given files or directories and report its output.",
                self.linter_command
            ),
        )
        .with_parameters(json!({
            "type": "object",
            "properties": {
                "targets": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Files or directories to lint"
                }
            }
        }))
        .with_category("lint")
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, ToolError> {
        let targets: Vec<String> = match args.get("targets") {
            None | Some(Value::Null) => Vec::new(),
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|e| ToolError::InvalidArguments(format!("targets: {e}")))?,
        };
        let result = self
            .run(&targets)
            .await
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
        Ok(ToolResult::success("run_linter", format_lint_summary(&result))
            .with_metadata("returncode", result.returncode))
    }
}

//! Named test and lint commands, and their execution without a shell.

use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;

/// Ordered commands, each a non-empty argument vector.
pub type CommandSequence = Vec<Vec<String>>;

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Command must contain at least one element")]
    EmptyCommand,

    #[error("Command specification cannot be empty")]
    EmptySpec,

    #[error("Unable to parse command: {0}")]
    Parse(String),

    #[error("{0}")]
    Config(String),

    #[error("Failed to read workflow command configuration from {path}: {message}")]
    Read { path: PathBuf, message: String },

    #[error(transparent)]
    Execution(#[from] TestCommandExecutionError),
}

/// One element of a multi-command definition.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CommandPart {
    Shell(String),
    Args(Vec<String>),
}

/// Accepted shapes for a command definition.
///
/// A string is shell-split into one command, a list of strings is one
/// command, and a list mixing strings and lists is several commands.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CommandInput {
    Shell(String),
    Args(Vec<String>),
    Many(Vec<CommandPart>),
}

impl From<&str> for CommandInput {
    fn from(value: &str) -> Self {
        Self::Shell(value.to_string())
    }
}

impl From<String> for CommandInput {
    fn from(value: String) -> Self {
        Self::Shell(value)
    }
}

impl From<Vec<String>> for CommandInput {
    fn from(value: Vec<String>) -> Self {
        Self::Args(value)
    }
}

impl From<Vec<&str>> for CommandInput {
    fn from(value: Vec<&str>) -> Self {
        Self::Args(value.into_iter().map(str::to_string).collect())
    }
}

impl From<Vec<Vec<&str>>> for CommandInput {
    fn from(value: Vec<Vec<&str>>) -> Self {
        Self::Many(
            value
                .into_iter()
                .map(|parts| CommandPart::Args(parts.into_iter().map(str::to_string).collect()))
                .collect(),
        )
    }
}

impl CommandInput {
    pub fn normalise(&self) -> Result<CommandSequence, CommandError> {
        match self {
            Self::Shell(command) => Ok(vec![split_shell(command)?]),
            Self::Args(parts) => Ok(vec![ensure_parts(parts.clone())?]),
            Self::Many(parts) => {
                if parts.is_empty() {
                    return Err(CommandError::EmptyCommand);
                }
                parts
                    .iter()
                    .map(|part| match part {
                        CommandPart::Shell(command) => split_shell(command),
                        CommandPart::Args(parts) => ensure_parts(parts.clone()),
                    })
                    .collect()
            }
        }
    }
}

fn split_shell(command: &str) -> Result<Vec<String>, CommandError> {
    let parts = shlex::split(command).ok_or_else(|| CommandError::Parse(command.to_string()))?;
    ensure_parts(parts)
}

fn ensure_parts(parts: Vec<String>) -> Result<Vec<String>, CommandError> {
    if parts.is_empty() {
        Err(CommandError::EmptyCommand)
    } else {
        Ok(parts)
    }
}

/// Shell-style rendering of an argument vector.
pub fn display_command(command: &[String]) -> String {
    shlex::try_join(command.iter().map(String::as_str)).unwrap_or_else(|_| command.join(" "))
}

/// Registry of named command aliases.
#[derive(Debug, Clone)]
pub struct TestCommandManager {
    commands: HashMap<String, CommandSequence>,
}

impl Default for TestCommandManager {
    fn default() -> Self {
        Self::new(true)
    }
}

impl TestCommandManager {
    /// With `include_defaults`, `pytest` resolves to `uv run pytest`.
    pub fn new(include_defaults: bool) -> Self {
        let mut commands = HashMap::new();
        if include_defaults {
            commands.insert(
                "pytest".to_string(),
                vec![vec!["uv".into(), "run".into(), "pytest".into()]],
            );
        }
        Self { commands }
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        command: impl Into<CommandInput>,
    ) -> Result<(), CommandError> {
        let name = name.into();
        let sequence = command.into().normalise()?;
        tracing::debug!(name = %name, command = ?sequence, "registering test command");
        self.commands.insert(name, sequence);
        Ok(())
    }

    pub fn register_many<I, K, C>(&mut self, commands: I) -> Result<(), CommandError>
    where
        I: IntoIterator<Item = (K, C)>,
        K: Into<String>,
        C: Into<CommandInput>,
    {
        commands
            .into_iter()
            .try_for_each(|(name, command)| self.register(name, command))
    }

    fn insert_sequence(&mut self, name: String, sequence: CommandSequence) {
        self.commands.insert(name, sequence);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    /// First command of the spec.
    pub fn resolve(&self, spec: &str) -> Result<Vec<String>, CommandError> {
        self.resolve_all(spec)?
            .into_iter()
            .next()
            .ok_or(CommandError::EmptySpec)
    }

    /// An alias resolves to its commands; anything else is shell-split.
    pub fn resolve_all(&self, spec: &str) -> Result<CommandSequence, CommandError> {
        if spec.is_empty() {
            return Err(CommandError::EmptySpec);
        }
        if let Some(sequence) = self.commands.get(spec) {
            return Ok(sequence.clone());
        }
        let parsed = shlex::split(spec).ok_or_else(|| CommandError::Parse(spec.to_string()))?;
        if parsed.is_empty() {
            return Err(CommandError::EmptySpec);
        }
        Ok(vec![parsed])
    }
}

/// Failure to run a command to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCommandExecutionError {
    pub command: Vec<String>,
    pub message: String,
    pub stderr: Option<String>,
}

impl TestCommandExecutionError {
    pub fn new(command: Vec<String>, message: impl Into<String>, stderr: Option<String>) -> Self {
        Self {
            command,
            message: message.into(),
            stderr,
        }
    }
}

impl fmt::Display for TestCommandExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\nCommand: {}",
            self.message,
            display_command(&self.command)
        )?;
        match self.stderr.as_deref() {
            Some(stderr) if !stderr.trim().is_empty() => write!(f, "\nStderr: {}", stderr.trim()),
            _ => Ok(()),
        }
    }
}

impl std::error::Error for TestCommandExecutionError {}

#[derive(Debug, Clone, PartialEq)]
pub struct TestCommandResult {
    pub command: Vec<String>,
    pub returncode: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl TestCommandResult {
    pub fn succeeded(&self) -> bool {
        self.returncode == 0
    }

    pub fn command_display(&self) -> String {
        display_command(&self.command)
    }

    /// Human-readable report including the duration.
    pub fn format(&self) -> String {
        let mut lines = vec![
            format!("Command: {}", self.command_display()),
            format!("Exit code: {}", self.returncode),
            format!("Duration: {:.2}s", self.duration.as_secs_f64()),
        ];
        self.push_output(&mut lines);
        lines.join("\n")
    }

    /// Compact report for embedding in prompts.
    pub fn to_prompt_block(&self) -> String {
        let mut lines = vec![
            format!("Command: {}", self.command_display()),
            format!("Exit code: {}", self.returncode),
        ];
        self.push_output(&mut lines);
        lines.join("\n")
    }

    fn push_output(&self, lines: &mut Vec<String>) {
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            lines.push(format!("Stdout:\n{stdout}"));
        }
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            lines.push(format!("Stderr:\n{stderr}"));
        }
    }
}

/// Runs resolved commands directly (no shell) and captures their output.
#[derive(Debug, Clone, Default)]
pub struct TestCommandExecutor {
    manager: TestCommandManager,
    cwd: Option<PathBuf>,
    env: Option<BTreeMap<String, String>>,
}

impl TestCommandExecutor {
    pub fn new(manager: TestCommandManager) -> Self {
        Self {
            manager,
            cwd: None,
            env: None,
        }
    }

    #[must_use]
    pub fn with_cwd(mut self, cwd: Option<PathBuf>) -> Self {
        self.cwd = cwd;
        self
    }

    /// Extra variables layered over the inherited environment.
    #[must_use]
    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = Some(env);
        self
    }

    pub fn manager(&self) -> &TestCommandManager {
        &self.manager
    }

    pub async fn run(
        &self,
        spec: &str,
        timeout: Option<Duration>,
    ) -> Result<TestCommandResult, CommandError> {
        let command = self.manager.resolve(spec)?;
        Ok(self.execute(command, timeout).await?)
    }

    /// Run every command of the spec in order, stopping at the first one
    /// that cannot be executed.
    pub async fn run_all(
        &self,
        spec: &str,
        timeout: Option<Duration>,
    ) -> Result<Vec<TestCommandResult>, CommandError> {
        let mut results = Vec::new();
        for command in self.manager.resolve_all(spec)? {
            results.push(self.execute(command, timeout).await?);
        }
        Ok(results)
    }

    async fn execute(
        &self,
        command: Vec<String>,
        timeout: Option<Duration>,
    ) -> Result<TestCommandResult, TestCommandExecutionError> {
        tracing::info!(
            command = ?command,
            cwd = ?self.cwd,
            timeout_secs = timeout.map(|t| t.as_secs_f64()),
            "running test command"
        );

        let (program, args) = command.split_first().ok_or_else(|| {
            TestCommandExecutionError::new(
                Vec::new(),
                CommandError::EmptyCommand.to_string(),
                None,
            )
        })?;
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        if let Some(env) = &self.env {
            cmd.envs(env);
        }

        let start = Instant::now();
        let mut child = cmd
            .spawn()
            .map_err(|e| TestCommandExecutionError::new(command.clone(), e.to_string(), None))?;
        let stdout = OutputCapture::spawn(child.stdout.take());
        let stderr = OutputCapture::spawn(child.stderr.take());

        let waited = match timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(waited) => waited,
                Err(_) => {
                    tracing::warn!(command = ?command, "test command timed out");
                    if let Err(e) = child.kill().await {
                        tracing::warn!(
                            command = ?command,
                            error = %e,
                            "failed to kill test command"
                        );
                    }
                    stdout.abort();
                    let partial = stderr.partial(CAPTURE_GRACE).await;
                    return Err(TestCommandExecutionError::new(
                        command,
                        "Test command timed out",
                        Some(partial),
                    ));
                }
            },
            None => child.wait().await,
        };
        let status = waited
            .map_err(|e| TestCommandExecutionError::new(command.clone(), e.to_string(), None))?;

        let result = TestCommandResult {
            returncode: exit_code(&status),
            stdout: stdout.finish().await,
            stderr: stderr.finish().await,
            duration: start.elapsed(),
            command,
        };
        tracing::info!(
            command = ?result.command,
            returncode = result.returncode,
            duration_secs = result.duration.as_secs_f64(),
            "test command finished"
        );
        Ok(result)
    }
}

/// How long a timed-out command's stderr reader may keep draining after the
/// kill. Grandchildren can hold the pipe open past that.
const CAPTURE_GRACE: Duration = Duration::from_millis(100);

/// Drains one child pipe into a shared buffer, so output read before a
/// timeout survives it.
struct OutputCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
    task: JoinHandle<()>,
}

impl OutputCapture {
    fn spawn<R>(pipe: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let sink = buffer.clone();
        let task = tokio::spawn(async move {
            let Some(mut pipe) = pipe else {
                return;
            };
            let mut chunk = [0u8; 4096];
            loop {
                match pipe.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        let mut buffer = sink
                            .lock()
                            .unwrap_or_else(|poisoned| poisoned.into_inner());
                        buffer.extend_from_slice(&chunk[..n]);
                    }
                }
            }
        });
        Self { buffer, task }
    }

    fn snapshot(&self) -> String {
        let buffer = self
            .buffer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        String::from_utf8_lossy(&buffer).into_owned()
    }

    /// Everything the pipe produced, read to end of file.
    async fn finish(mut self) -> String {
        let _ = (&mut self.task).await;
        self.snapshot()
    }

    /// Whatever arrived before `grace` runs out.
    async fn partial(mut self, grace: Duration) -> String {
        let _ = tokio::time::timeout(grace, &mut self.task).await;
        self.task.abort();
        self.snapshot()
    }

    fn abort(self) {
        self.task.abort();
    }
}

#[cfg(unix)]
fn exit_code(status: &std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|signal| -signal))
        .unwrap_or(-1)
}

#[cfg(not(unix))]
fn exit_code(status: &std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandCategory {
    Tests,
    Lint,
}

impl CommandCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tests => "tests",
            Self::Lint => "lint",
        }
    }
}

/// Named commands for the test and lint stages of workflows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkflowCommandConfig {
    pub tests: BTreeMap<String, CommandSequence>,
    pub lint: BTreeMap<String, CommandSequence>,
}

impl WorkflowCommandConfig {
    pub fn commands_for(&self, category: CommandCategory) -> &BTreeMap<String, CommandSequence> {
        match category {
            CommandCategory::Tests => &self.tests,
            CommandCategory::Lint => &self.lint,
        }
    }

    pub fn load(path: &Path) -> Result<Self, CommandError> {
        let text = std::fs::read_to_string(path).map_err(|e| CommandError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_yaml_str(&text).map_err(|e| match e {
            CommandError::Config(message) => CommandError::Config(message),
            other => CommandError::Read {
                path: path.to_path_buf(),
                message: other.to_string(),
            },
        })
    }

    /// Parse YAML with optional `tests` and `lint` mappings. An empty
    /// document yields an empty configuration.
    pub fn from_yaml_str(text: &str) -> Result<Self, CommandError> {
        let value: serde_yaml::Value =
            serde_yaml::from_str(text).map_err(|e| CommandError::Parse(e.to_string()))?;
        let root = match value {
            serde_yaml::Value::Null => return Ok(Self::default()),
            serde_yaml::Value::Mapping(root) => root,
            _ => {
                return Err(CommandError::Config(
                    "Workflow command configuration must be a mapping".to_string(),
                ))
            }
        };
        Ok(Self {
            tests: parse_section(root.get("tests"), CommandCategory::Tests)?,
            lint: parse_section(root.get("lint"), CommandCategory::Lint)?,
        })
    }
}

fn parse_section(
    value: Option<&serde_yaml::Value>,
    category: CommandCategory,
) -> Result<BTreeMap<String, CommandSequence>, CommandError> {
    let section = category.as_str();
    let mapping = match value {
        None | Some(serde_yaml::Value::Null) => return Ok(BTreeMap::new()),
        Some(serde_yaml::Value::Mapping(mapping)) => mapping,
        Some(_) => {
            return Err(CommandError::Config(format!(
                "{section} section must be a mapping of command names to commands"
            )))
        }
    };

    let mut commands = BTreeMap::new();
    for (raw_name, raw_command) in mapping {
        let serde_yaml::Value::String(name) = raw_name else {
            return Err(CommandError::Config("Command names must be strings".to_string()));
        };
        let sequence = serde_yaml::from_value::<CommandInput>(raw_command.clone())
            .map_err(|e| e.to_string())
            .and_then(|input| input.normalise().map_err(|e| e.to_string()))
            .map_err(|e| {
                CommandError::Config(format!(
                    "Invalid command definition for {section} command '{name}': {e}"
                ))
            })?;
        commands.insert(name.clone(), sequence);
    }
    Ok(commands)
}

/// Manager seeded from one category of the configuration. Defaults are
/// included for tests unless `include_defaults` says otherwise.
pub fn create_manager_from_config(
    config: &WorkflowCommandConfig,
    category: CommandCategory,
    include_defaults: Option<bool>,
) -> TestCommandManager {
    let include = include_defaults.unwrap_or(category == CommandCategory::Tests);
    let mut manager = TestCommandManager::new(include);
    for (name, sequence) in config.commands_for(category) {
        manager.insert_sequence(name.clone(), sequence.clone());
    }
    manager
}

use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use workcell_agentos::settings::{AgentSettings, LoggingSettings, McpSettings};
use workcell_agentos::workflow::{LinterWorkflowConfig, TddWorkflowConfig};
use workcell_agentos::{
    init_logging, Workbench, WorkbenchError, WorkflowCommandConfig, WorkflowRunOutput,
};
use workcell_extension_mcp::{McpConfigStore, McpServerEntry};

const WELCOME_MESSAGE: &str = "Welcome to Workcell!";
const WELCOME_HINT: &str = "Run 'workcell --help' to see available commands.";
const RULE_WIDTH: usize = 72;

#[derive(Debug, Parser)]
#[command(name = "workcell", about = "Coding-agent workbench", version)]
struct Cli {
    #[command(flatten)]
    agent: AgentSettings,

    #[command(flatten)]
    mcp: McpSettings,

    #[command(flatten)]
    logging: LoggingSettings,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Display the welcome message.
    Welcome,

    /// Send a prompt to the coding agent.
    Agent {
        /// Prompt to send to the coding agent.
        prompt: String,
    },

    /// Ask the repository QA agent about a project.
    RepoAgent {
        /// Prompt to send to the repository QA agent.
        prompt: String,

        /// Project directory to explore.
        #[arg(long = "path", short = 'p', value_parser = existing_dir)]
        project_path: Option<PathBuf>,
    },

    /// Let the Serena coder agent work on a project.
    SerenaAgent {
        /// Prompt to send to the Serena coder agent.
        prompt: String,

        /// Project directory to modify.
        #[arg(long = "path", short = 'p', value_parser = existing_dir)]
        project_path: Option<PathBuf>,
    },

    /// Run the test-driven development workflow.
    Tdd {
        /// Prompt driving the initial code exploration.
        exploration_prompt: String,

        /// Prompt for designing tests.
        test_prompt: String,

        /// Prompt for implementing production code.
        implementation_prompt: String,

        /// Test command alias (e.g. 'pytest') or a full shell command.
        #[arg(long, short = 't', default_value = "pytest")]
        test_command: String,

        /// Project directory the workflow operates in.
        #[arg(long = "path", short = 'p', value_parser = existing_dir)]
        project_path: Option<PathBuf>,

        /// YAML file with `tests` and `lint` command aliases.
        #[arg(long, env = "WORKCELL_COMMANDS_FILE")]
        commands_file: Option<PathBuf>,
    },

    /// Run a linter and ask the coding agent to propose fixes.
    Lint {
        /// Linter command or alias (e.g. 'ruff check').
        linter_command: String,

        /// Files or directories to lint.
        targets: Vec<String>,

        /// Project directory the linter runs in.
        #[arg(long = "path", short = 'p', value_parser = existing_dir)]
        project_path: Option<PathBuf>,

        /// Extra instructions for the agent when proposing fixes.
        #[arg(long)]
        fix_instructions: Option<String>,

        /// YAML file with `tests` and `lint` command aliases.
        #[arg(long, env = "WORKCELL_COMMANDS_FILE")]
        commands_file: Option<PathBuf>,
    },

    /// Manage registered MCP servers.
    #[command(subcommand)]
    Mcp(McpCommand),
}

#[derive(Debug, Subcommand)]
enum McpCommand {
    /// Register or replace an MCP server.
    Add {
        name: String,

        /// Executable that starts the server.
        command: String,

        /// Arguments passed to the server command.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,

        /// Environment variable for the server, as KEY=VALUE.
        #[arg(long = "env", value_parser = parse_env_pair)]
        env: Vec<(String, String)>,

        #[arg(long)]
        startup_timeout_sec: Option<f64>,

        #[arg(long)]
        tool_timeout_sec: Option<f64>,
    },

    /// Remove a registered MCP server.
    Remove { name: String },

    /// Print registered MCP servers as JSON.
    List,
}

fn existing_dir(raw: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(raw);
    if path.is_dir() {
        Ok(path)
    } else if path.exists() {
        Err(format!("'{raw}' is not a directory"))
    } else {
        Err(format!("directory '{raw}' does not exist"))
    }
}

fn parse_env_pair(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{raw}'")),
    }
}

fn rule(title: &str) -> String {
    format!("{:─^width$}", format!(" {title} "), width = RULE_WIDTH)
}

/// Step-by-step rendering, plus a summary when the final content is not
/// simply the last step's output.
fn render_workflow(run: &WorkflowRunOutput) -> String {
    let mut out = Vec::new();
    for step in &run.step_results {
        out.push(rule(&step.step_name));
        out.push(step.content.clone());
    }
    if let Some(content) = &run.content {
        let last = run.step_results.last().map(|s| s.content.as_str());
        if last != Some(content.as_str()) {
            out.push(rule("Workflow summary"));
            out.push(content.clone());
        }
    }
    out.join("\n")
}

fn report(err: &WorkbenchError, settings: &AgentSettings, action: &str) -> ExitCode {
    match err {
        WorkbenchError::Configuration(message) if !settings.credential_configured() => {
            tracing::error!(error = %message, "agent configuration error");
            eprintln!(
                "{message} Set the {} environment variable.",
                settings.credential_env_var()
            );
        }
        WorkbenchError::Configuration(message) => {
            tracing::error!(error = %message, "agent configuration error");
            eprintln!("{message}");
        }
        WorkbenchError::Execution(message) => {
            tracing::error!(error = %message, "agent execution failed");
            eprintln!("Failed to {action}: {message}");
        }
        WorkbenchError::Command(e) => {
            tracing::error!(error = %e, "command execution failed");
            eprintln!("{e}");
        }
    }
    ExitCode::FAILURE
}

fn load_commands(path: Option<&Path>) -> Result<Option<WorkflowCommandConfig>, ExitCode> {
    let Some(path) = path else {
        return Ok(None);
    };
    WorkflowCommandConfig::load(path).map(Some).map_err(|e| {
        eprintln!("{e}");
        ExitCode::FAILURE
    })
}

fn with_commands(bench: Workbench, commands: Option<WorkflowCommandConfig>) -> Workbench {
    match commands {
        Some(config) => bench.with_command_config(config),
        None => bench,
    }
}

fn run_mcp(command: McpCommand) -> ExitCode {
    let store = match McpConfigStore::from_env() {
        Ok(store) => store,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    let result = match command {
        McpCommand::Add {
            name,
            command,
            args,
            env,
            startup_timeout_sec,
            tool_timeout_sec,
        } => {
            let mut entry = McpServerEntry::new(command).with_args(args);
            if !env.is_empty() {
                entry = entry.with_env(env.into_iter().collect::<BTreeMap<_, _>>());
            }
            entry.startup_timeout_sec = startup_timeout_sec;
            entry.tool_timeout_sec = tool_timeout_sec;
            store
                .save(&name, &entry)
                .map(|()| format!("Saved MCP server '{name}' to {}", store.path().display()))
        }
        McpCommand::Remove { name } => store.remove(&name).map(|removed| {
            if removed {
                format!("Removed MCP server '{name}'")
            } else {
                format!("MCP server '{name}' is not configured")
            }
        }),
        McpCommand::List => store.dump_json(),
    };
    match result {
        Ok(text) => {
            println!("{text}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> ExitCode {
    let settings = cli.agent.clone();
    let bench = Workbench::new(cli.agent, cli.mcp);

    match cli.command.unwrap_or(Command::Welcome) {
        Command::Welcome => {
            println!("{WELCOME_MESSAGE}");
            println!("{WELCOME_HINT}");
            ExitCode::SUCCESS
        }
        Command::Agent { prompt } => {
            tracing::info!(%prompt, "running coding agent");
            match bench.run_coding_agent(&prompt).await {
                Ok(text) => {
                    println!("{text}");
                    ExitCode::SUCCESS
                }
                Err(e) => report(&e, &settings, "generate response"),
            }
        }
        Command::RepoAgent {
            prompt,
            project_path,
        } => {
            tracing::info!(%prompt, project_path = ?project_path, "running repository QA agent");
            match bench
                .run_repository_qa_agent(&prompt, project_path.as_deref())
                .await
            {
                Ok(text) => {
                    println!("{text}");
                    ExitCode::SUCCESS
                }
                Err(e) => report(&e, &settings, "generate response"),
            }
        }
        Command::SerenaAgent {
            prompt,
            project_path,
        } => {
            tracing::info!(%prompt, project_path = ?project_path, "running Serena coder agent");
            match bench
                .run_serena_coder_agent(&prompt, project_path.as_deref())
                .await
            {
                Ok(text) => {
                    println!("{text}");
                    ExitCode::SUCCESS
                }
                Err(e) => report(&e, &settings, "generate response"),
            }
        }
        Command::Tdd {
            exploration_prompt,
            test_prompt,
            implementation_prompt,
            test_command,
            project_path,
            commands_file,
        } => {
            let commands = match load_commands(commands_file.as_deref()) {
                Ok(commands) => commands,
                Err(code) => return code,
            };
            tracing::info!(%test_command, project_path = ?project_path, "running TDD workflow");
            let config = TddWorkflowConfig {
                exploration_prompt,
                test_prompt,
                implementation_prompt,
                test_command,
                project_path,
            };
            match with_commands(bench, commands).run_tdd_workflow(config).await {
                Ok(run) => {
                    println!("{}", render_workflow(&run));
                    ExitCode::SUCCESS
                }
                Err(e) => report(&e, &settings, "run workflow"),
            }
        }
        Command::Lint {
            linter_command,
            targets,
            project_path,
            fix_instructions,
            commands_file,
        } => {
            let commands = match load_commands(commands_file.as_deref()) {
                Ok(commands) => commands,
                Err(code) => return code,
            };
            tracing::info!(%linter_command, ?targets, project_path = ?project_path, "running linter workflow");
            let config = LinterWorkflowConfig {
                linter_command,
                targets,
                project_path,
                fix_instructions,
            };
            match with_commands(bench, commands)
                .run_linter_workflow(config)
                .await
            {
                Ok(run) => {
                    println!("{}", render_workflow(&run));
                    ExitCode::SUCCESS
                }
                Err(e) => report(&e, &settings, "run linter workflow"),
            }
        }
        Command::Mcp(command) => run_mcp(command),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_logging(&cli.logging) {
        eprintln!("failed to initialise logging: {e}");
        return ExitCode::FAILURE;
    }
    run(cli).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use workcell_agentos::workflow::StepOutput;
    use workcell_agentos::WorkflowStatus;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("workcell").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn no_subcommand_means_welcome() {
        assert!(parse(&[]).command.is_none());
    }

    #[test]
    fn tdd_defaults_to_pytest() {
        let cli = parse(&["tdd", "explore", "tests", "implement"]);
        let Some(Command::Tdd {
            test_command,
            project_path,
            ..
        }) = cli.command
        else {
            panic!("expected tdd");
        };
        assert_eq!(test_command, "pytest");
        assert!(project_path.is_none());
    }

    #[test]
    fn path_must_be_an_existing_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let ok = dir.path().to_str().unwrap();
        assert!(Cli::try_parse_from(["workcell", "repo-agent", "q", "--path", ok]).is_ok());

        let missing = dir.path().join("missing");
        let err = Cli::try_parse_from([
            "workcell",
            "repo-agent",
            "q",
            "-p",
            missing.to_str().unwrap(),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("does not exist"));

        let file = dir.path().join("file.txt");
        std::fs::write(&file, "x").unwrap();
        let err = Cli::try_parse_from(["workcell", "lint", "ruff", "-p", file.to_str().unwrap()])
            .unwrap_err();
        assert!(err.to_string().contains("is not a directory"));
    }

    #[test]
    fn lint_collects_targets() {
        let cli = parse(&["lint", "ruff check", "src", "tests", "--fix-instructions", "be brief"]);
        let Some(Command::Lint {
            linter_command,
            targets,
            fix_instructions,
            ..
        }) = cli.command
        else {
            panic!("expected lint");
        };
        assert_eq!(linter_command, "ruff check");
        assert_eq!(targets, vec!["src", "tests"]);
        assert_eq!(fix_instructions.as_deref(), Some("be brief"));
    }

    #[test]
    fn mcp_add_keeps_server_flags() {
        let cli = parse(&[
            "mcp",
            "add",
            "--env",
            "TOKEN=abc",
            "serena",
            "uvx",
            "serena",
            "start-mcp-server",
            "--context",
            "ide-assistant",
        ]);
        let Some(Command::Mcp(McpCommand::Add { args, env, .. })) = cli.command else {
            panic!("expected mcp add");
        };
        assert_eq!(args, vec!["serena", "start-mcp-server", "--context", "ide-assistant"]);
        assert_eq!(env, vec![("TOKEN".to_string(), "abc".to_string())]);
        assert!(parse_env_pair("=x").is_err());
    }

    fn step(name: &str, content: &str) -> StepOutput {
        StepOutput {
            step_name: name.to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn summary_only_when_final_content_differs() {
        let mut run = WorkflowRunOutput {
            workflow_name: "Linter Workflow".into(),
            status: WorkflowStatus::Completed,
            step_results: vec![step("Run linter", "clean"), step("Propose fixes", "none")],
            content: Some("none".into()),
        };
        let text = render_workflow(&run);
        assert!(text.contains(" Run linter "));
        assert!(!text.contains("Workflow summary"));

        run.content = Some("overall".into());
        let text = render_workflow(&run);
        assert!(text.ends_with(&format!("{}\noverall", rule("Workflow summary"))));
    }
}

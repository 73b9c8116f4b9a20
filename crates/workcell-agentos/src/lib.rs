//! Coding-agent workbench.
//!
//! [`Workbench`] is the entry point: it builds agents from [`AgentSettings`]
//! and runs them directly or inside the TDD and linter [`workflow`]s. Test and
//! lint commands are resolved and executed by [`commands`]; [`scenario`]
//! adapts agents and workflows for an external scenario harness.

pub mod agents;
pub mod commands;
pub mod llm;
pub mod logging;
pub mod orchestrator;
pub mod prompts;
pub mod scenario;
pub mod settings;
pub mod workflow;

pub use agents::{AgentBuildError, AgentFactory, GenaiAgentFactory};
pub use commands::{
    CommandCategory, CommandError, CommandInput, CommandSequence, TestCommandExecutionError,
    TestCommandExecutor, TestCommandManager, TestCommandResult, WorkflowCommandConfig,
};
pub use logging::{init_logging, LoggingError};
pub use orchestrator::{Workbench, WorkbenchError};
pub use settings::{
    AgentSettings, LlmProvider, LogFormat, LogLevel, LoggingSettings, McpSettings, SettingsError,
};
pub use workflow::{
    LinterWorkflowConfig, TddWorkflowConfig, Workflow, WorkflowError, WorkflowRunOutput,
    WorkflowStatus,
};

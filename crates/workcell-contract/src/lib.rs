//! Shared contracts for workcell agents: conversation messages, tools, agent
//! runners, and the scenario-testing surface consumed by external harnesses.
#![allow(missing_docs)]

pub mod runner;
pub mod scenario;
pub mod thread;
pub mod tool;

#[cfg(feature = "test-support")]
pub mod testing;

pub use runner::{AgentRunError, AgentRunOutput, AgentRunner};
pub use scenario::{
    AgentAdapter, AgentAdapterError, AgentInput, AgentReturn, JudgeAgent, ScenarioAgent,
    ScenarioConfig, ScenarioError, ScenarioRequest, ScenarioResult, ScenarioRunner,
    UserSimulatorAgent,
};
pub use thread::{Message, Role, ToolCall};
pub use tool::{Tool, ToolDescriptor, ToolError, ToolResult, ToolStatus};

//! Tool-calling agent loop for workcell.
//!
//! An [`Agent`] sends its instructions, session history, and the user prompt
//! to an [`LlmExecutor`], runs any requested tools, and feeds the results
//! back until the model answers without tool calls.

mod agent;
pub mod convert;
mod executor;

pub use agent::{Agent, AgentBuilder, DEFAULT_MAX_ROUNDS};
pub use executor::{GenaiLlmExecutor, LlmError, LlmExecutor, ModelTurn};

//! Scenario-testing surface.
//!
//! A scenario is a named, described conversation between an agent under test,
//! a simulated user, and a judge, bounded by a number of turns. This crate
//! only defines the shapes exchanged with a scenario harness; driving the
//! conversation is the harness's job ([`ScenarioRunner`]).

use crate::thread::{Message, Role};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

pub const DEFAULT_SCENARIO_MODEL: &str = "openai/gpt-4.1-mini";
pub const DEFAULT_SCENARIO_CACHE_KEY: &str = "workcell-scenario-suite";
pub const DEFAULT_SCENARIO_MAX_TURNS: usize = 8;

pub const SCENARIO_DEFAULT_MODEL_ENV: &str = "SCENARIO_DEFAULT_MODEL";
pub const SCENARIO_CACHE_KEY_ENV: &str = "SCENARIO_CACHE_KEY";
pub const SCENARIO_SERENA_COMMAND_ENV: &str = "SCENARIO_SERENA_COMMAND";
pub const SCENARIO_SERENA_TRANSPORT_ENV: &str = "SCENARIO_SERENA_TRANSPORT";
pub const SCENARIO_SERENA_URL_ENV: &str = "SCENARIO_SERENA_URL";

/// Read-only view of the conversation handed to an agent adapter.
#[derive(Debug, Clone)]
pub struct AgentInput {
    thread_id: String,
    messages: Vec<Message>,
}

impl AgentInput {
    pub fn new(thread_id: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            thread_id: thread_id.into(),
            messages,
        }
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Content of the most recent user message, or an empty string.
    pub fn last_new_user_message_str(&self) -> String {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default()
    }
}

/// What an adapter hands back to the harness.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentReturn {
    Text(String),
    Messages(Vec<Message>),
}

impl AgentReturn {
    /// Normalise into a message list.
    pub fn into_messages(self) -> Vec<Message> {
        match self {
            Self::Text(text) => vec![Message::assistant(text)],
            Self::Messages(messages) => messages,
        }
    }
}

#[derive(Debug, Error)]
pub enum AgentAdapterError {
    #[error("agent failed: {0}")]
    Agent(String),

    #[error("workflow failed: {0}")]
    Workflow(String),
}

/// Bridges an agent under test into a scenario.
#[async_trait]
pub trait AgentAdapter: Send + Sync {
    async fn call(&self, input: AgentInput) -> Result<AgentReturn, AgentAdapterError>;
}

/// Simulated user driven by the harness's default model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserSimulatorAgent {
    pub system_prompt: Option<String>,
    pub model: Option<String>,
}

impl UserSimulatorAgent {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: Some(system_prompt.into()),
            model: None,
        }
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// Judge evaluating the conversation against ordered criteria.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JudgeAgent {
    pub criteria: Vec<String>,
    pub model: Option<String>,
}

impl JudgeAgent {
    pub fn new<I, S>(criteria: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            criteria: criteria.into_iter().map(Into::into).collect(),
            model: None,
        }
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// One participant in a scenario.
#[derive(Clone)]
pub enum ScenarioAgent {
    Adapter(Arc<dyn AgentAdapter>),
    UserSimulator(UserSimulatorAgent),
    Judge(JudgeAgent),
}

impl fmt::Debug for ScenarioAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Adapter(_) => f.write_str("Adapter(..)"),
            Self::UserSimulator(sim) => f.debug_tuple("UserSimulator").field(sim).finish(),
            Self::Judge(judge) => f.debug_tuple("Judge").field(judge).finish(),
        }
    }
}

impl From<UserSimulatorAgent> for ScenarioAgent {
    fn from(value: UserSimulatorAgent) -> Self {
        Self::UserSimulator(value)
    }
}

impl From<JudgeAgent> for ScenarioAgent {
    fn from(value: JudgeAgent) -> Self {
        Self::Judge(value)
    }
}

impl From<Arc<dyn AgentAdapter>> for ScenarioAgent {
    fn from(value: Arc<dyn AgentAdapter>) -> Self {
        Self::Adapter(value)
    }
}

/// Harness defaults, passed explicitly to every scenario run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioConfig {
    pub default_model: String,
    pub cache_key: Option<String>,
    pub max_turns: usize,
    /// Overrides for the LSP walker the scenario agents use. Unset fields
    /// keep the walker's own settings.
    pub walker_command: Option<String>,
    pub walker_transport: Option<String>,
    pub walker_url: Option<String>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            default_model: DEFAULT_SCENARIO_MODEL.to_string(),
            cache_key: Some(DEFAULT_SCENARIO_CACHE_KEY.to_string()),
            max_turns: DEFAULT_SCENARIO_MAX_TURNS,
            walker_command: None,
            walker_transport: None,
            walker_url: None,
        }
    }
}

impl ScenarioConfig {
    /// Build from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();
        Self {
            default_model: get(SCENARIO_DEFAULT_MODEL_ENV).unwrap_or(defaults.default_model),
            cache_key: get(SCENARIO_CACHE_KEY_ENV).or(defaults.cache_key),
            max_turns: defaults.max_turns,
            walker_command: get(SCENARIO_SERENA_COMMAND_ENV),
            walker_transport: get(SCENARIO_SERENA_TRANSPORT_ENV),
            walker_url: get(SCENARIO_SERENA_URL_ENV),
        }
    }

    #[must_use]
    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }
}

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("scenario name must be non-empty")]
    EmptyName,

    #[error("scenario '{0}' has no agents")]
    NoAgents(String),

    #[error("scenario max_turns must be > 0")]
    ZeroTurns,

    #[error("scenario harness failed: {0}")]
    Harness(String),

    #[error(transparent)]
    Adapter(#[from] AgentAdapterError),
}

/// A scenario to run.
#[derive(Debug, Clone)]
pub struct ScenarioRequest {
    pub name: String,
    pub description: String,
    pub agents: Vec<ScenarioAgent>,
    pub max_turns: Option<usize>,
}

impl ScenarioRequest {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            agents: Vec::new(),
            max_turns: None,
        }
    }

    #[must_use]
    pub fn with_agent(mut self, agent: impl Into<ScenarioAgent>) -> Self {
        self.agents.push(agent.into());
        self
    }

    #[must_use]
    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = Some(max_turns);
        self
    }

    /// Turn cap for this request: its own value, else the config default.
    pub fn effective_max_turns(&self, config: &ScenarioConfig) -> usize {
        self.max_turns.unwrap_or(config.max_turns)
    }

    pub fn validate(&self, config: &ScenarioConfig) -> Result<(), ScenarioError> {
        if self.name.trim().is_empty() {
            return Err(ScenarioError::EmptyName);
        }
        if self.agents.is_empty() {
            return Err(ScenarioError::NoAgents(self.name.clone()));
        }
        if self.effective_max_turns(config) == 0 {
            return Err(ScenarioError::ZeroTurns);
        }
        Ok(())
    }

    pub fn judges(&self) -> impl Iterator<Item = &JudgeAgent> {
        self.agents.iter().filter_map(|a| match a {
            ScenarioAgent::Judge(judge) => Some(judge),
            _ => None,
        })
    }
}

/// Verdict returned by a harness.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScenarioResult {
    pub success: bool,
    pub reasoning: Option<String>,
    pub messages: Vec<Message>,
    pub passed_criteria: Vec<String>,
    pub failed_criteria: Vec<String>,
}

/// Entry point of an external scenario harness.
#[async_trait]
pub trait ScenarioRunner: Send + Sync {
    async fn run(
        &self,
        request: ScenarioRequest,
        config: &ScenarioConfig,
    ) -> Result<ScenarioResult, ScenarioError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct Echo;

    #[async_trait]
    impl AgentAdapter for Echo {
        async fn call(&self, input: AgentInput) -> Result<AgentReturn, AgentAdapterError> {
            Ok(AgentReturn::Text(input.last_new_user_message_str()))
        }
    }

    #[test]
    fn last_user_message_is_most_recent() {
        let input = AgentInput::new(
            "t1",
            vec![
                Message::user("first"),
                Message::assistant("reply"),
                Message::user("second"),
                Message::assistant("another"),
            ],
        );
        assert_eq!(input.thread_id(), "t1");
        assert_eq!(input.last_new_user_message_str(), "second");
    }

    #[test]
    fn last_user_message_defaults_to_empty() {
        let input = AgentInput::new("t1", vec![Message::assistant("hello")]);
        assert_eq!(input.last_new_user_message_str(), "");
    }

    #[test]
    fn config_lookup_trims_and_falls_back() {
        let vars: HashMap<&str, &str> = [
            (SCENARIO_DEFAULT_MODEL_ENV, "  anthropic/claude  "),
            (SCENARIO_CACHE_KEY_ENV, "   "),
        ]
        .into_iter()
        .collect();
        let config = ScenarioConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.default_model, "anthropic/claude");
        assert_eq!(config.cache_key.as_deref(), Some(DEFAULT_SCENARIO_CACHE_KEY));
        assert_eq!(config.max_turns, 8);
        assert_eq!(config.walker_command, None);
    }

    #[test]
    fn walker_overrides_come_from_env() {
        let vars: HashMap<&str, &str> = [
            (SCENARIO_SERENA_COMMAND_ENV, "serena start-mcp-server"),
            (SCENARIO_SERENA_TRANSPORT_ENV, " sse "),
            (SCENARIO_SERENA_URL_ENV, ""),
        ]
        .into_iter()
        .collect();
        let config = ScenarioConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.walker_command.as_deref(), Some("serena start-mcp-server"));
        assert_eq!(config.walker_transport.as_deref(), Some("sse"));
        assert_eq!(config.walker_url, None);
    }

    #[test]
    fn request_turns_override_config() {
        let config = ScenarioConfig::default();
        let request = ScenarioRequest::new("n", "d");
        assert_eq!(request.effective_max_turns(&config), 8);
        assert_eq!(request.with_max_turns(6).effective_max_turns(&config), 6);
    }

    #[test]
    fn validate_rejects_empty_requests() {
        let config = ScenarioConfig::default();
        assert!(matches!(
            ScenarioRequest::new(" ", "d").validate(&config),
            Err(ScenarioError::EmptyName)
        ));
        assert!(matches!(
            ScenarioRequest::new("n", "d").validate(&config),
            Err(ScenarioError::NoAgents(_))
        ));
        let zero = ScenarioRequest::new("n", "d")
            .with_agent(UserSimulatorAgent::new("ask"))
            .with_max_turns(0);
        assert!(matches!(zero.validate(&config), Err(ScenarioError::ZeroTurns)));
    }

    #[test]
    fn judges_keep_criteria_order() {
        let adapter: Arc<dyn AgentAdapter> = Arc::new(Echo);
        let request = ScenarioRequest::new("fix multiply", "d")
            .with_agent(adapter)
            .with_agent(UserSimulatorAgent::new("ask for the fix"))
            .with_agent(JudgeAgent::new(["fixes multiply", "runs pytest"]));
        assert!(request.validate(&ScenarioConfig::default()).is_ok());
        let judge = request.judges().next().unwrap();
        assert_eq!(judge.criteria, vec!["fixes multiply", "runs pytest"]);
    }

    #[tokio::test]
    async fn adapter_return_normalises_to_messages() {
        let out = Echo
            .call(AgentInput::new("t", vec![Message::user("ping")]))
            .await
            .unwrap();
        assert_eq!(out.into_messages(), vec![Message::assistant("ping")]);
    }
}

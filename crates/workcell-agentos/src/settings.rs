//! Settings values read from the environment or the command line.
//!
//! Every settings struct is a `clap::Args` so the binary can flatten it into
//! its parser; library callers load them with [`from_env`].

use clap::{ArgMatches, Args, FromArgMatches, ValueEnum};
use std::ffi::OsString;
use std::fmt;

pub use workcell_extension_mcp::McpSettings;

#[derive(Debug, thiserror::Error)]
#[error("invalid settings: {0}")]
pub struct SettingsError(#[from] clap::Error);

/// Load settings from environment variables and defaults only.
pub fn from_env<T: Args + FromArgMatches>() -> Result<T, SettingsError> {
    parse_args::<T, _, &str>([])
}

/// Parse settings from explicit flags, falling back to environment and defaults.
pub fn parse_args<T, I, S>(args: I) -> Result<T, SettingsError>
where
    T: Args + FromArgMatches,
    I: IntoIterator<Item = S>,
    S: Into<OsString> + Clone,
{
    let command = T::augment_args(clap::Command::new("settings").no_binary_name(true));
    let matches: ArgMatches = command.try_get_matches_from(args)?;
    Ok(T::from_arg_matches(&matches)?)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`.
    pub fn as_directive(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warn",
            Self::Error | Self::Critical => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Json,
    Console,
    Plain,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Args)]
#[command(next_help_heading = "Logging")]
pub struct LoggingSettings {
    #[arg(long, env = "LOG_LEVEL", value_enum, ignore_case = true, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    #[arg(long, env = "LOG_FORMAT", value_enum, ignore_case = true, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,

    /// Also write JSON logs to this file.
    #[arg(long, env = "LOG_FILE_PATH")]
    pub log_file_path: Option<std::path::PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
#[value(rename_all = "snake_case")]
pub enum LlmProvider {
    #[default]
    Openai,
    AzureOpenai,
    Anthropic,
    Gemini,
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Openai => "openai",
            Self::AzureOpenai => "azure_openai",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
        })
    }
}

/// Provider selection, credentials and model ids for agents.
#[derive(Clone, PartialEq, Eq, Args)]
#[command(next_help_heading = "Agent")]
pub struct AgentSettings {
    #[arg(long, env = "WORKCELL_PROVIDER", value_enum, default_value_t = LlmProvider::Openai)]
    pub provider: LlmProvider,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,
    #[arg(long, env = "WORKCELL_OPENAI_MODEL", default_value = "gpt-4o-mini")]
    pub openai_model: String,
    #[arg(long, env = "OPENAI_BASE_URL")]
    pub openai_base_url: Option<String>,

    #[arg(long, env = "AZURE_OPENAI_API_KEY", hide_env_values = true)]
    pub azure_openai_api_key: Option<String>,
    /// e.g. https://<name>.openai.azure.com/
    #[arg(long, env = "AZURE_OPENAI_ENDPOINT")]
    pub azure_openai_endpoint: Option<String>,
    #[arg(long, env = "AZURE_OPENAI_API_VERSION")]
    pub azure_openai_api_version: Option<String>,
    /// Deployment name, used in place of a model id.
    #[arg(long, env = "AZURE_OPENAI_DEPLOYMENT")]
    pub azure_openai_deployment: Option<String>,

    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    pub anthropic_api_key: Option<String>,
    #[arg(long, env = "WORKCELL_ANTHROPIC_MODEL", default_value = "claude-3-5-sonnet-latest")]
    pub anthropic_model: String,
    #[arg(long, env = "ANTHROPIC_BASE_URL")]
    pub anthropic_base_url: Option<String>,

    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: Option<String>,
    #[arg(long, env = "WORKCELL_GEMINI_MODEL", default_value = "gemini-1.5-pro")]
    pub gemini_model: String,
    #[arg(long, env = "GEMINI_BASE_URL")]
    pub gemini_base_url: Option<String>,

    #[arg(long, env = "WORKCELL_AGENT_NAME", default_value = "Workcell Agent")]
    pub agent_name: String,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Openai,
            openai_api_key: None,
            openai_model: "gpt-4o-mini".to_string(),
            openai_base_url: None,
            azure_openai_api_key: None,
            azure_openai_endpoint: None,
            azure_openai_api_version: None,
            azure_openai_deployment: None,
            anthropic_api_key: None,
            anthropic_model: "claude-3-5-sonnet-latest".to_string(),
            anthropic_base_url: None,
            gemini_api_key: None,
            gemini_model: "gemini-1.5-pro".to_string(),
            gemini_base_url: None,
            agent_name: "Workcell Agent".to_string(),
        }
    }
}

impl fmt::Debug for AgentSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentSettings")
            .field("provider", &self.provider)
            .field("openai_model", &self.openai_model)
            .field("azure_openai_deployment", &self.azure_openai_deployment)
            .field("anthropic_model", &self.anthropic_model)
            .field("gemini_model", &self.gemini_model)
            .field("agent_name", &self.agent_name)
            .field("credential_configured", &self.credential_configured())
            .finish_non_exhaustive()
    }
}

impl AgentSettings {
    #[must_use]
    pub fn with_agent_name(mut self, name: impl Into<String>) -> Self {
        self.agent_name = name.into();
        self
    }

    /// API key of the active provider, if set and non-blank.
    pub fn active_api_key(&self) -> Option<&str> {
        let key = match self.provider {
            LlmProvider::Openai => &self.openai_api_key,
            LlmProvider::AzureOpenai => &self.azure_openai_api_key,
            LlmProvider::Anthropic => &self.anthropic_api_key,
            LlmProvider::Gemini => &self.gemini_api_key,
        };
        key.as_deref().filter(|k| !k.trim().is_empty())
    }

    pub fn credential_configured(&self) -> bool {
        self.active_api_key().is_some()
    }

    /// Environment variable that holds the active provider's key.
    pub fn credential_env_var(&self) -> &'static str {
        match self.provider {
            LlmProvider::Openai => "OPENAI_API_KEY",
            LlmProvider::AzureOpenai => "AZURE_OPENAI_API_KEY",
            LlmProvider::Anthropic => "ANTHROPIC_API_KEY",
            LlmProvider::Gemini => "GEMINI_API_KEY",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use workcell_extension_mcp::McpTransportKind;

    #[test]
    fn agent_settings_parse_flags() {
        let settings: AgentSettings = parse_args([
            "--provider",
            "azure_openai",
            "--azure-openai-api-key",
            "secret",
            "--agent-name",
            "Scenario Explorer",
        ])
        .unwrap();
        assert_eq!(settings.provider, LlmProvider::AzureOpenai);
        assert!(settings.credential_configured());
        assert_eq!(settings.credential_env_var(), "AZURE_OPENAI_API_KEY");
        assert_eq!(settings.agent_name, "Scenario Explorer");
    }

    #[test]
    fn blank_key_is_not_a_credential() {
        let settings = AgentSettings {
            openai_api_key: Some("  ".into()),
            ..AgentSettings::default()
        };
        assert!(!settings.credential_configured());
    }

    #[test]
    fn unknown_provider_is_rejected() {
        assert!(parse_args::<AgentSettings, _, _>(["--provider", "cohere"]).is_err());
    }

    #[test]
    fn debug_output_hides_keys() {
        let settings = AgentSettings {
            openai_api_key: Some("sk-very-secret".into()),
            ..AgentSettings::default()
        };
        assert!(!format!("{settings:?}").contains("sk-very-secret"));
    }

    #[test]
    fn logging_levels_are_case_insensitive() {
        let settings: LoggingSettings =
            parse_args(["--log-level", "WARNING", "--log-format", "plain"]).unwrap();
        assert_eq!(settings.log_level, LogLevel::Warning);
        assert_eq!(settings.log_level.as_directive(), "warn");
        assert_eq!(settings.log_format, LogFormat::Plain);
        assert_eq!(LogLevel::Critical.as_directive(), "error");
    }

    #[test]
    fn mcp_settings_parse_transport_and_timeout() {
        let settings: McpSettings = parse_args([
            "--lsp-walker-transport",
            "streamable-http",
            "--lsp-walker-timeout-seconds",
            "15",
            "--lsp-walker-url",
            "http://localhost:9121/mcp",
        ])
        .unwrap();
        assert_eq!(settings.lsp_walker_transport, McpTransportKind::StreamableHttp);
        assert_eq!(settings.lsp_walker_timeout_seconds, 15);
    }

    #[test]
    fn mcp_timeout_must_be_positive() {
        assert!(parse_args::<McpSettings, _, _>(["--lsp-walker-timeout-seconds", "0"]).is_err());
    }
}

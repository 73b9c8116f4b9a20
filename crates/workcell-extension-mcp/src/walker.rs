//! LSP walkers: MCP servers that let an agent navigate a repository through
//! language-server symbols.

use crate::client_transport::{McpConnectionSpec, McpTransportKind};
use crate::{McpError, McpToolkit};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_WALKER_COMMAND: &str =
    "uvx --from git+https://github.com/oraios/serena serena start-mcp-server";

/// MCP integration settings, read from `MCP_*` environment variables.
#[derive(Debug, Clone, PartialEq, clap::Args)]
#[command(next_help_heading = "MCP")]
pub struct McpSettings {
    /// LSP walker provider.
    #[arg(long, env = "MCP_LSP_WALKER_PROVIDER", default_value = "serena")]
    pub lsp_walker_provider: String,

    /// Command used to launch the LSP walker MCP server.
    #[arg(long, env = "MCP_LSP_WALKER_COMMAND", default_value = DEFAULT_WALKER_COMMAND)]
    pub lsp_walker_command: String,

    /// Context passed to the MCP server.
    #[arg(long, env = "MCP_LSP_WALKER_CONTEXT", default_value = "ide-assistant")]
    pub lsp_walker_context: Option<String>,

    #[arg(long, env = "MCP_LSP_WALKER_TRANSPORT", value_enum, default_value_t = McpTransportKind::Stdio)]
    pub lsp_walker_transport: McpTransportKind,

    /// Read timeout for MCP requests.
    #[arg(
        long,
        env = "MCP_LSP_WALKER_TIMEOUT_SECONDS",
        default_value_t = 60,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub lsp_walker_timeout_seconds: u64,

    /// Endpoint for transports other than stdio.
    #[arg(long, env = "MCP_LSP_WALKER_URL")]
    pub lsp_walker_url: Option<String>,
}

impl Default for McpSettings {
    fn default() -> Self {
        Self {
            lsp_walker_provider: "serena".to_string(),
            lsp_walker_command: DEFAULT_WALKER_COMMAND.to_string(),
            lsp_walker_context: Some("ide-assistant".to_string()),
            lsp_walker_transport: McpTransportKind::Stdio,
            lsp_walker_timeout_seconds: 60,
            lsp_walker_url: None,
        }
    }
}

#[async_trait]
pub trait LspWalker: Send + Sync {
    /// Project the walker was pointed at, if any.
    fn project_path(&self) -> Option<&Path>;

    fn connection_spec(&self) -> Result<McpConnectionSpec, McpError>;

    /// Launch or reach the server and collect its tools.
    async fn create_toolkit(&self) -> Result<McpToolkit, McpError> {
        McpToolkit::connect(&self.connection_spec()?).await
    }
}

/// Walker backed by the Serena MCP server.
#[derive(Debug, Clone)]
pub struct SerenaLspWalker {
    settings: McpSettings,
    project_path: Option<PathBuf>,
}

impl SerenaLspWalker {
    pub fn new(settings: McpSettings, project_path: Option<&Path>) -> Self {
        Self {
            settings,
            project_path: project_path.map(resolve_path),
        }
    }

    fn resolve_project_path(&self) -> Result<PathBuf, McpError> {
        match &self.project_path {
            Some(path) => Ok(path.clone()),
            None => std::env::current_dir()
                .map(|cwd| resolve_path(&cwd))
                .map_err(|e| McpError::Walker(format!("cannot resolve current directory: {e}"))),
        }
    }

    /// Command line with `--context` and `--project` filled in.
    pub fn build_command(&self) -> Result<Option<Vec<String>>, McpError> {
        let base = self.settings.lsp_walker_command.trim();
        if base.is_empty() {
            return Ok(None);
        }
        let mut parts = shlex::split(base)
            .ok_or_else(|| McpError::Walker(format!("cannot parse walker command: {base}")))?;

        if let Some(context) = self
            .settings
            .lsp_walker_context
            .as_deref()
            .filter(|c| !c.is_empty())
        {
            if !has_flag(&parts, "--context") {
                parts.extend(["--context".to_string(), context.to_string()]);
            }
        }

        if !has_flag(&parts, "--project") {
            let project = self.resolve_project_path()?;
            parts.extend([
                "--project".to_string(),
                project.to_string_lossy().into_owned(),
            ]);
        }

        Ok(Some(parts))
    }
}

#[async_trait]
impl LspWalker for SerenaLspWalker {
    fn project_path(&self) -> Option<&Path> {
        self.project_path.as_deref()
    }

    fn connection_spec(&self) -> Result<McpConnectionSpec, McpError> {
        let command = self.build_command()?;
        let transport = self.settings.lsp_walker_transport;
        if transport == McpTransportKind::Stdio && command.is_none() {
            return Err(McpError::Walker(
                "Serena LSP walker requires a command when using stdio transport".to_string(),
            ));
        }

        Ok(McpConnectionSpec {
            server_name: "serena".to_string(),
            transport,
            command: command.unwrap_or_default(),
            env: BTreeMap::new(),
            url: self.settings.lsp_walker_url.clone(),
            timeout: Duration::from_secs(self.settings.lsp_walker_timeout_seconds),
        })
    }
}

/// Pick the walker implementation named by the settings.
pub fn create_lsp_walker(
    settings: &McpSettings,
    project_path: Option<&Path>,
) -> Result<Box<dyn LspWalker>, McpError> {
    match settings.lsp_walker_provider.to_lowercase().as_str() {
        "serena" => Ok(Box::new(SerenaLspWalker::new(settings.clone(), project_path))),
        _ => Err(McpError::UnsupportedProvider(
            settings.lsp_walker_provider.clone(),
        )),
    }
}

fn has_flag(parts: &[String], flag: &str) -> bool {
    let prefix = format!("{flag}=");
    parts
        .iter()
        .any(|part| part == flag || part.starts_with(&prefix))
}

fn resolve_path(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn settings(command: &str, context: Option<&str>) -> McpSettings {
        McpSettings {
            lsp_walker_command: command.to_string(),
            lsp_walker_context: context.map(str::to_string),
            ..McpSettings::default()
        }
    }

    #[test]
    fn appends_context_and_project() {
        let dir = TempDir::new().unwrap();
        let mut s = settings("uvx serena start-mcp-server", Some("ide-assistant"));
        s.lsp_walker_timeout_seconds = 15;
        let walker = SerenaLspWalker::new(s, Some(dir.path()));

        let spec = walker.connection_spec().unwrap();
        assert_eq!(spec.transport, McpTransportKind::Stdio);
        assert_eq!(spec.timeout, Duration::from_secs(15));

        let project = std::fs::canonicalize(dir.path()).unwrap();
        let project = project.to_string_lossy().into_owned();
        assert_eq!(
            spec.command,
            vec![
                "uvx",
                "serena",
                "start-mcp-server",
                "--context",
                "ide-assistant",
                "--project",
                project.as_str(),
            ]
        );
    }

    #[test]
    fn defaults_project_to_cwd() {
        let walker = SerenaLspWalker::new(settings("uvx serena", None), None);
        let command = walker.build_command().unwrap().unwrap();
        let cwd = std::fs::canonicalize(std::env::current_dir().unwrap()).unwrap();
        assert_eq!(command[command.len() - 1], cwd.to_string_lossy());
        assert!(!command.contains(&"--context".to_string()));
    }

    #[test]
    fn does_not_duplicate_flags() {
        let walker = SerenaLspWalker::new(
            settings(
                "uvx serena start-mcp-server --context custom --project /tmp/repo",
                Some("ignored"),
            ),
            None,
        );
        let command = walker.build_command().unwrap().unwrap();
        assert_eq!(command.iter().filter(|p| *p == "--context").count(), 1);
        assert_eq!(command.iter().filter(|p| *p == "--project").count(), 1);
        assert!(!command.contains(&"ignored".to_string()));
    }

    #[test]
    fn recognises_flag_equals_form() {
        let walker = SerenaLspWalker::new(
            settings("serena --context=desktop --project=/srv/app", Some("ide")),
            None,
        );
        let command = walker.build_command().unwrap().unwrap();
        assert_eq!(command, vec!["serena", "--context=desktop", "--project=/srv/app"]);
    }

    #[test]
    fn stdio_requires_command() {
        let walker = SerenaLspWalker::new(settings("   ", None), None);
        let err = walker.connection_spec().unwrap_err();
        assert!(err.to_string().contains("requires a command"));
    }

    #[test]
    fn http_transport_passes_url_without_command() {
        let mut s = settings("", None);
        s.lsp_walker_transport = McpTransportKind::StreamableHttp;
        s.lsp_walker_url = Some("http://localhost:9121/mcp".to_string());
        let spec = SerenaLspWalker::new(s, None).connection_spec().unwrap();
        assert!(spec.command.is_empty());
        assert_eq!(spec.url.as_deref(), Some("http://localhost:9121/mcp"));
    }

    #[test]
    fn factory_returns_serena_walker() {
        let dir = TempDir::new().unwrap();
        let walker = create_lsp_walker(&McpSettings::default(), Some(dir.path())).unwrap();
        assert_eq!(
            walker.project_path(),
            Some(std::fs::canonicalize(dir.path()).unwrap().as_path())
        );
    }

    #[test]
    fn factory_rejects_unknown_provider() {
        let s = McpSettings {
            lsp_walker_provider: "unknown".to_string(),
            ..McpSettings::default()
        };
        let err = create_lsp_walker(&s, None).err().unwrap();
        assert!(err.to_string().contains("Unsupported LSP walker provider"));
    }
}

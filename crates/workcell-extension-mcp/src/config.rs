//! Persistent registry of MCP servers stored in a TOML config file.
//!
//! The file lives at `<config home>/workcell/config.toml` and keeps servers in
//! the `mcp_servers` table. Other top-level keys are left untouched on write.

use serde_json::json;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use toml::{Table, Value};

pub const CONFIG_HOME_ENV: &str = "WORKCELL_CONFIG_HOME";
const APP_SUBDIR: &str = "workcell";
const CONFIG_FILENAME: &str = "config.toml";
const MCP_SECTION: &str = "mcp_servers";
const KNOWN_KEYS: [&str; 5] = [
    "command",
    "args",
    "env",
    "startup_timeout_sec",
    "tool_timeout_sec",
];

#[derive(Debug, Error)]
pub enum McpConfigError {
    #[error("{0}")]
    Invalid(String),

    #[error("Failed to read MCP configuration from {path}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("Failed to write config file {path}: {message}")]
    Write { path: PathBuf, message: String },

    #[error("could not determine the configuration home directory")]
    NoHome,
}

fn invalid(message: impl Into<String>) -> McpConfigError {
    McpConfigError::Invalid(message.into())
}

/// One configured MCP server.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct McpServerEntry {
    pub command: String,
    pub args: Vec<String>,
    pub env: Option<BTreeMap<String, String>>,
    pub startup_timeout_sec: Option<f64>,
    pub tool_timeout_sec: Option<f64>,
    /// Keys this crate does not interpret, preserved on write.
    pub extras: Table,
}

impl McpServerEntry {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = Some(env);
        self
    }

    pub fn from_table(raw: &Table) -> Result<Self, McpConfigError> {
        let command = raw
            .get("command")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid("MCP server entries must define a 'command' string"))?
            .to_string();

        let args = match raw.get("args") {
            None => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| invalid("'args' must be a list of strings in MCP server entries"))?,
            Some(_) => {
                return Err(invalid(
                    "'args' must be a list of strings in MCP server entries",
                ))
            }
        };

        let env = match raw.get("env") {
            None => None,
            Some(Value::Table(table)) => Some(
                table
                    .iter()
                    .map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect::<Option<BTreeMap<_, _>>>()
                    .ok_or_else(|| invalid("'env' must be a table of string key/value pairs"))?,
            ),
            Some(_) => return Err(invalid("'env' must be a table of string key/value pairs")),
        };

        let extras = raw
            .iter()
            .filter(|(key, _)| !KNOWN_KEYS.contains(&key.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Ok(Self {
            command,
            args,
            env,
            startup_timeout_sec: optional_float(raw.get("startup_timeout_sec"))?,
            tool_timeout_sec: optional_float(raw.get("tool_timeout_sec"))?,
            extras,
        })
    }

    pub fn to_table(&self) -> Table {
        let mut table = Table::new();
        table.insert("command".into(), Value::String(self.command.clone()));
        table.insert(
            "args".into(),
            Value::Array(self.args.iter().cloned().map(Value::String).collect()),
        );
        if let Some(env) = &self.env {
            let env = env
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect();
            table.insert("env".into(), Value::Table(env));
        }
        if let Some(timeout) = self.startup_timeout_sec {
            table.insert("startup_timeout_sec".into(), Value::Float(timeout));
        }
        if let Some(timeout) = self.tool_timeout_sec {
            table.insert("tool_timeout_sec".into(), Value::Float(timeout));
        }
        for (key, value) in &self.extras {
            table.insert(key.clone(), value.clone());
        }
        table
    }

    pub fn to_json(&self, name: &str) -> serde_json::Value {
        json!({
            "name": name,
            "command": self.command,
            "args": self.args,
            "env": self.env,
            "startup_timeout_sec": self.startup_timeout_sec,
            "tool_timeout_sec": self.tool_timeout_sec,
        })
    }

    /// Program followed by its arguments.
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.command.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

fn optional_float(value: Option<&Value>) -> Result<Option<f64>, McpConfigError> {
    match value {
        None => Ok(None),
        Some(Value::Integer(i)) => Ok(Some(*i as f64)),
        Some(Value::Float(f)) => Ok(Some(*f)),
        Some(_) => Err(invalid("timeout values must be numeric")),
    }
}

/// Resolve the config file path from an optional override and home directory.
pub fn resolve_config_file(
    config_home: Option<&str>,
    home: Option<&Path>,
) -> Result<PathBuf, McpConfigError> {
    let base = match config_home.map(str::trim).filter(|v| !v.is_empty()) {
        Some(dir) => absolutize(&expand_tilde(dir, home)),
        None => home.ok_or(McpConfigError::NoHome)?.join("config"),
    };
    Ok(base.join(APP_SUBDIR).join(CONFIG_FILENAME))
}

fn expand_tilde(path: &str, home: Option<&Path>) -> PathBuf {
    match (path.strip_prefix("~"), home) {
        (Some(rest), Some(home)) if rest.is_empty() || rest.starts_with('/') => {
            home.join(rest.trim_start_matches('/'))
        }
        _ => PathBuf::from(path),
    }
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

/// File-backed MCP server registry.
#[derive(Debug, Clone)]
pub struct McpConfigStore {
    path: PathBuf,
}

impl McpConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the default location, honouring `WORKCELL_CONFIG_HOME`.
    pub fn from_env() -> Result<Self, McpConfigError> {
        let config_home = std::env::var(CONFIG_HOME_ENV).ok();
        let home = std::env::var_os("HOME").map(PathBuf::from);
        resolve_config_file(config_home.as_deref(), home.as_deref()).map(Self::new)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<BTreeMap<String, McpServerEntry>, McpConfigError> {
        let raw = self.read_raw()?;
        let Some(section) = raw.get(MCP_SECTION) else {
            return Ok(BTreeMap::new());
        };
        let Value::Table(servers) = section else {
            return Err(section_error());
        };

        servers
            .iter()
            .map(|(name, entry)| match entry {
                Value::Table(table) => Ok((name.clone(), McpServerEntry::from_table(table)?)),
                _ => Err(invalid(format!("MCP server '{name}' must be a table"))),
            })
            .collect()
    }

    /// Insert or replace a server entry.
    pub fn save(&self, name: &str, entry: &McpServerEntry) -> Result<(), McpConfigError> {
        let mut raw = self.read_raw()?;
        let mut servers = match raw.remove(MCP_SECTION) {
            None => Table::new(),
            Some(Value::Table(servers)) => servers,
            Some(_) => return Err(section_error()),
        };
        servers.insert(name.to_string(), Value::Table(entry.to_table()));
        raw.insert(MCP_SECTION.to_string(), Value::Table(servers));
        self.write_raw(&raw)?;
        tracing::debug!(server = name, path = %self.path.display(), "saved MCP server");
        Ok(())
    }

    /// Remove a server entry. Returns `false` without writing when absent.
    pub fn remove(&self, name: &str) -> Result<bool, McpConfigError> {
        let mut raw = self.read_raw()?;
        let mut servers = match raw.remove(MCP_SECTION) {
            None => return Ok(false),
            Some(Value::Table(servers)) => servers,
            Some(_) => return Err(section_error()),
        };
        if servers.remove(name).is_none() {
            return Ok(false);
        }
        if !servers.is_empty() {
            raw.insert(MCP_SECTION.to_string(), Value::Table(servers));
        }
        self.write_raw(&raw)?;
        tracing::debug!(server = name, path = %self.path.display(), "removed MCP server");
        Ok(true)
    }

    /// Pretty JSON array of all servers, sorted by name.
    pub fn dump_json(&self) -> Result<String, McpConfigError> {
        let payload: Vec<_> = self
            .load()?
            .iter()
            .map(|(name, entry)| entry.to_json(name))
            .collect();
        serde_json::to_string_pretty(&payload).map_err(|e| invalid(e.to_string()))
    }

    fn read_raw(&self) -> Result<Table, McpConfigError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Table::new()),
            Err(e) => {
                return Err(McpConfigError::Read {
                    path: self.path.clone(),
                    message: e.to_string(),
                })
            }
        };
        content.parse::<Table>().map_err(|e| McpConfigError::Read {
            path: self.path.clone(),
            message: e.to_string(),
        })
    }

    fn write_raw(&self, raw: &Table) -> Result<(), McpConfigError> {
        let write_err = |message: String| McpConfigError::Write {
            path: self.path.clone(),
            message,
        };
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| write_err(e.to_string()))?;
        }
        let body = toml::to_string(raw).map_err(|e| write_err(e.to_string()))?;
        std::fs::write(&self.path, body).map_err(|e| write_err(e.to_string()))
    }
}

fn section_error() -> McpConfigError {
    invalid(format!(
        "'{MCP_SECTION}' section must be a table in the config file"
    ))
}

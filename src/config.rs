//! Layered configuration for the control center.
//!
//! Values are resolved in order: built-in defaults, `control-center.toml`,
//! environment variables (a `.env` file is read first via `dotenvy`), then
//! CLI flags applied by the `serve` command.
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 3141
//! dev_mode = false
//! static_dir = "ui/dist"
//!
//! [database]
//! backend = "sqlite"          # or "remote"
//! path = ".control-center/control.db"
//! url = "libsql://brain.example.io"
//! auth_token = "..."
//!
//! [inventory]
//! ssh_host = "aiko@brain.local"
//! brain_dir = "/home/aiko/shared-brain"
//! qmd_bin = "/home/aiko/.bun/bin/qmd"
//! qmd_collection = "shared-brain"
//! command_timeout_secs = 30
//!
//! [agent]
//! url = "http://127.0.0.1:18789"
//! token = "..."
//! status_poll_secs = 5
//!
//! [logging]
//! format = "pretty"           # or "json"
//! dir = ".control-center/logs"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default file name looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "control-center.toml";

/// Which relational backend holds quests, sessions and settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    /// Local SQLite file (default)
    #[default]
    Sqlite,
    /// Hosted libSQL database reached over the network
    Remote,
}

impl std::fmt::Display for DatabaseBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseBackend::Sqlite => write!(f, "sqlite"),
            DatabaseBackend::Remote => write!(f, "remote"),
        }
    }
}

impl std::str::FromStr for DatabaseBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqlite" => Ok(DatabaseBackend::Sqlite),
            "remote" => Ok(DatabaseBackend::Remote),
            _ => anyhow::bail!("Invalid database backend '{}'. Valid values: sqlite, remote", s),
        }
    }
}

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Permissive CORS and bind on all interfaces (local Vite dev server).
    #[serde(default)]
    pub dev_mode: bool,
    /// Directory with a pre-built SPA; served with `index.html` fallback.
    #[serde(default)]
    pub static_dir: Option<PathBuf>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3141
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            dev_mode: false,
            static_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSection {
    #[serde(default)]
    pub backend: DatabaseBackend,
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub auth_token: Option<String>,
}

fn default_db_path() -> PathBuf {
    PathBuf::from(".control-center/control.db")
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            backend: DatabaseBackend::default(),
            path: default_db_path(),
            url: None,
            auth_token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventorySection {
    /// SSH destination (`user@host`). Commands run locally when unset.
    #[serde(default)]
    pub ssh_host: Option<String>,
    #[serde(default = "default_brain_dir")]
    pub brain_dir: String,
    #[serde(default = "default_qmd_bin")]
    pub qmd_bin: String,
    /// qmd collection that indexes the brain; search hits outside it are ignored.
    #[serde(default = "default_qmd_collection")]
    pub qmd_collection: String,
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
}

fn default_brain_dir() -> String {
    "/home/aiko/shared-brain".to_string()
}

fn default_qmd_bin() -> String {
    "/home/aiko/.bun/bin/qmd".to_string()
}

fn default_qmd_collection() -> String {
    "shared-brain".to_string()
}

fn default_command_timeout() -> u64 {
    30
}

impl Default for InventorySection {
    fn default() -> Self {
        Self {
            ssh_host: None,
            brain_dir: default_brain_dir(),
            qmd_bin: default_qmd_bin(),
            qmd_collection: default_qmd_collection(),
            command_timeout_secs: default_command_timeout(),
        }
    }
}

/// Fallback agent endpoint; the `gateway_url` / `gateway_token` settings
/// rows take precedence when present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentSection {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub status_poll_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

/// Complete, resolved configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControlConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub database: DatabaseSection,
    #[serde(default)]
    pub inventory: InventorySection,
    #[serde(default)]
    pub agent: AgentSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl ControlConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse control-center.toml")
    }

    /// Resolve the full layered configuration: explicit file (must exist),
    /// else `./control-center.toml` when present, else defaults; then the
    /// process environment.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let _ = dotenvy::dotenv();

        let mut config = match explicit {
            Some(path) => Self::load(path)?,
            None => {
                let default_path = Path::new(CONFIG_FILE_NAME);
                if default_path.exists() {
                    Self::load(default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env_from(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Overlay `CONTROL_*` variables. The lookup is injected so tests do
    /// not have to mutate the process environment.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("CONTROL_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("CONTROL_PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("CONTROL_PORT is not a valid port: {}", port))?;
        }
        if let Some(backend) = lookup("CONTROL_DB_BACKEND") {
            self.database.backend = backend.parse()?;
        }
        if let Some(path) = lookup("CONTROL_DB_PATH") {
            self.database.path = PathBuf::from(path);
        }
        if let Some(url) = lookup("CONTROL_DB_URL") {
            self.database.url = Some(url);
        }
        if let Some(token) = lookup("CONTROL_DB_TOKEN") {
            self.database.auth_token = Some(token);
        }
        if let Some(host) = lookup("CONTROL_SSH_HOST") {
            self.inventory.ssh_host = Some(host).filter(|h| !h.is_empty());
        }
        if let Some(dir) = lookup("CONTROL_BRAIN_DIR") {
            self.inventory.brain_dir = dir;
        }
        if let Some(url) = lookup("CONTROL_AGENT_URL") {
            self.agent.url = Some(url);
        }
        if let Some(token) = lookup("CONTROL_AGENT_TOKEN") {
            self.agent.token = Some(token);
        }
        Ok(())
    }

    /// Return a list of configuration problems. Empty means valid.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.server.port == 0 {
            problems.push("server.port must be non-zero".to_string());
        }
        if self.database.backend == DatabaseBackend::Remote && self.database.url.is_none() {
            problems.push("database.url is required when database.backend = \"remote\"".to_string());
        }
        if self.inventory.command_timeout_secs == 0 {
            problems.push("inventory.command_timeout_secs must be greater than 0".to_string());
        }
        if self.inventory.qmd_collection.trim().is_empty() {
            problems.push("inventory.qmd_collection must not be empty".to_string());
        }
        if self.agent.status_poll_secs == Some(0) {
            problems.push("agent.status_poll_secs must be greater than 0".to_string());
        }
        if !self.inventory.brain_dir.starts_with('/') {
            problems.push(format!(
                "inventory.brain_dir must be an absolute path, got '{}'",
                self.inventory.brain_dir
            ));
        }

        problems
    }

    /// Serialize for display with secrets replaced.
    pub fn to_redacted_toml(&self) -> Result<String> {
        let mut copy = self.clone();
        if copy.database.auth_token.is_some() {
            copy.database.auth_token = Some("<redacted>".to_string());
        }
        if copy.agent.token.is_some() {
            copy.agent.token = Some("<redacted>".to_string());
        }
        toml::to_string_pretty(&copy).context("Failed to serialize configuration")
    }
}

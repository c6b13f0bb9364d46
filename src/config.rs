//! Global configuration parsing, validation, and credential loading.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::models::mode::ConfirmationMode;
use crate::{AppError, Result};

/// Keychain service name under which the API credential is stored.
pub const KEYRING_SERVICE: &str = "acp-bridge";

/// Agent engine process settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct EngineConfig {
    /// Engine binary launched once per session.
    pub command: String,
    /// Arguments passed to the engine binary.
    #[serde(default)]
    pub args: Vec<String>,
    /// Maximum time to wait for the engine's ready line.
    #[serde(default = "default_startup_timeout")]
    pub startup_timeout_seconds: u64,
}

fn default_startup_timeout() -> u64 {
    30
}

/// External login routine invoked by `authenticate`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AuthConfig {
    /// Login binary.
    #[serde(default = "default_login_command")]
    pub login_command: String,
    /// Arguments for the login binary.
    #[serde(default = "default_login_args")]
    pub login_args: Vec<String>,
    /// Environment variable consulted when the keychain has no credential.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

fn default_login_command() -> String {
    "agent".into()
}

fn default_login_args() -> Vec<String> {
    vec!["login".into()]
}

fn default_api_key_env() -> String {
    "AGENT_API_KEY".into()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            login_command: default_login_command(),
            login_args: default_login_args(),
            api_key_env: default_api_key_env(),
        }
    }
}

fn default_cancel_timeout() -> u64 {
    10
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Working directory used when the client does not send one.
    pub work_dir: PathBuf,
    /// Agent settings file; its absence means the agent is not configured.
    pub agent_settings_path: PathBuf,
    /// Directory where the engine persists conversations.
    pub conversations_dir: PathBuf,
    /// Optional MCP server file merged into every new session.
    #[serde(default)]
    pub mcp_config_path: Option<PathBuf>,
    /// Confirmation mode applied to newly created sessions.
    #[serde(default)]
    pub confirmation_mode: ConfirmationMode,
    /// Emit notifications token-by-token instead of per event.
    #[serde(default)]
    pub streaming_enabled: bool,
    /// Bounded wait for a cancelled run cycle before forcing it down.
    #[serde(default = "default_cancel_timeout")]
    pub cancel_timeout_seconds: u64,
    /// Engine process settings.
    pub engine: EngineConfig,
    /// Login routine settings.
    #[serde(default)]
    pub auth: AuthConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and normalize paths.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Whether the agent settings file exists.
    #[must_use]
    pub fn is_agent_configured(&self) -> bool {
        self.agent_settings_path.is_file()
    }

    /// Load the MCP servers declared in `mcp_config_path`, keyed by name.
    ///
    /// A missing file yields an empty map.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file exists but is not valid JSON
    /// or has no `mcpServers` object.
    pub fn load_mcp_servers(&self) -> Result<Map<String, Value>> {
        let Some(path) = self.mcp_config_path.as_ref() else {
            return Ok(Map::new());
        };
        if !path.exists() {
            debug!(path = %path.display(), "mcp config file absent");
            return Ok(Map::new());
        }

        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read mcp config: {err}")))?;
        let value: Value = serde_json::from_str(&raw)
            .map_err(|err| AppError::Config(format!("invalid mcp config: {err}")))?;

        match value.get("mcpServers") {
            Some(Value::Object(servers)) => Ok(servers.clone()),
            None => Ok(Map::new()),
            Some(_) => Err(AppError::Config(
                "invalid mcp config: `mcpServers` must be an object".into(),
            )),
        }
    }

    /// Load the engine API credential from OS keychain with env-var fallback.
    ///
    /// Returns `None` when neither source provides a non-empty value.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the keychain task panics.
    pub async fn load_api_key(&self) -> Result<Option<String>> {
        load_credential("api_key", &self.auth.api_key_env).await
    }

    fn validate(&mut self) -> Result<()> {
        if self.engine.command.trim().is_empty() {
            return Err(AppError::Config("engine.command must not be empty".into()));
        }

        if self.cancel_timeout_seconds == 0 {
            return Err(AppError::Config(
                "cancel_timeout_seconds must be greater than zero".into(),
            ));
        }

        if !self.work_dir.is_absolute() {
            return Err(AppError::Config(format!(
                "work_dir must be absolute: {}",
                self.work_dir.display()
            )));
        }

        if let Ok(canonical) = self.work_dir.canonicalize() {
            self.work_dir = canonical;
        }

        Ok(())
    }
}

/// Load a single credential from OS keychain with env-var fallback.
async fn load_credential(keyring_key: &str, env_key: &str) -> Result<Option<String>> {
    let key = keyring_key.to_owned();

    // keyring is synchronous I/O.
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new(KEYRING_SERVICE, &key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Config(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.is_empty() => return Ok(Some(value)),
        Ok(_) => {
            warn!(key = keyring_key, "keychain entry is empty, trying env var");
        }
        Err(err) => {
            debug!(key = keyring_key, ?err, "keychain lookup failed, trying env var");
        }
    }

    Ok(env::var(env_key).ok().filter(|value| !value.is_empty()))
}

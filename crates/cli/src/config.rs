//! Configuration loading from gangway.toml.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use mcp::LaunchConfig;
use runtime::HostConfig;
use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub host: HostSettings,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub audit: AuditConfig,

    /// Tool providers, started in this order.
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

/// Backend provider configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Provider name (currently only "anthropic" supported).
    pub provider: String,

    pub model: String,

    /// Falls back to `ANTHROPIC_API_KEY` when unset.
    pub api_key: Option<String>,

    pub max_tokens: Option<u32>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            api_key: None,
            max_tokens: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HostSettings {
    /// Conversation entries given to the planner as context.
    pub context_messages: usize,

    /// Seconds a proposal waits for a decision; 0 disables expiry.
    pub proposal_ttl_secs: u64,

    /// Per-request provider timeout in seconds.
    pub tool_timeout_secs: u64,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            context_messages: 6,
            proposal_ttl_secs: 900,
            tool_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogFormat::Compact,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AuditConfig {
    /// SQLite database path. Defaults to the platform data directory.
    pub path: Option<PathBuf>,
}

/// One tool provider process.
///
/// Either `command` (with `args`) or `script` must be set. A script is a
/// Python provider launched with `uv`.
#[derive(Debug, Default, Deserialize)]
pub struct ProviderConfig {
    pub name: Option<String>,
    pub command: Option<String>,
    pub script: Option<PathBuf>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    pub cwd: Option<PathBuf>,
}

impl ProviderConfig {
    /// Build the launch settings, resolving relative paths against `base`.
    pub fn launch_config(&self, base: &Path, timeout: Duration) -> Result<LaunchConfig, ConfigError> {
        let mut launch = match (&self.command, &self.script) {
            (Some(command), None) => {
                let name = self.name.clone().unwrap_or_else(|| file_stem(command));
                LaunchConfig::new(name, command).with_args(self.args.iter().cloned())
            }
            (None, Some(script)) => {
                let mut launch = LaunchConfig::uv_script(base.join(script))
                    .map_err(|e| ConfigError::Provider(e.to_string()))?;
                launch.args.extend(self.args.iter().cloned());
                if let Some(name) = &self.name {
                    launch.name = name.clone();
                }
                launch
            }
            (Some(_), Some(_)) => {
                return Err(ConfigError::Provider(
                    "set either command or script, not both".to_string(),
                ));
            }
            (None, None) => {
                return Err(ConfigError::Provider(
                    "provider needs a command or a script".to_string(),
                ));
            }
        };

        launch.env.extend(self.env.clone());
        if let Some(cwd) = &self.cwd {
            launch.cwd = Some(base.join(cwd));
        }
        Ok(launch.with_timeout(timeout))
    }
}

fn file_stem(command: &str) -> String {
    Path::new(command)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(command)
        .to_string()
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))?;
        if config.backend.provider != "anthropic" {
            return Err(ConfigError::UnsupportedBackend(config.backend.provider));
        }
        Ok(config)
    }

    /// The API key from the config file, else from the environment.
    pub fn api_key(&self) -> Result<String, ConfigError> {
        self.backend
            .api_key
            .clone()
            .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
            .filter(|key| !key.is_empty())
            .ok_or(ConfigError::MissingApiKey)
    }

    pub fn host_config(&self) -> HostConfig {
        HostConfig {
            context_messages: self.host.context_messages,
            proposal_ttl: match self.host.proposal_ttl_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        }
    }

    /// Launch settings for every provider, in configured order.
    pub fn launch_configs(&self, base: &Path) -> Result<Vec<LaunchConfig>, ConfigError> {
        let timeout = Duration::from_secs(self.host.tool_timeout_secs);
        self.providers
            .iter()
            .map(|provider| provider.launch_config(base, timeout))
            .collect()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("unsupported backend provider '{0}' (only 'anthropic' is available)")]
    UnsupportedBackend(String),

    #[error("API key not configured: set backend.api_key or ANTHROPIC_API_KEY")]
    MissingApiKey,

    #[error("invalid provider: {0}")]
    Provider(String),
}

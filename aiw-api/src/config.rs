use aiw_orchestrator::{IdStrategy, OrchestratorSettings};
use aiw_provider::ProviderConfig;
use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Service configuration.
///
/// Every field falls back to an environment variable, so a YAML file named by
/// `AIW_API_CONFIG` only needs the keys it wants to pin.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Separate listener for `/ws`. Unset serves it on `bind_addr`.
    #[serde(default = "default_ws_bind_addr")]
    pub ws_bind_addr: Option<String>,

    /// SQLite file for workspace records. Unset keeps them in memory.
    #[serde(default = "default_db_path")]
    pub db_path: Option<PathBuf>,

    #[serde(default = "default_janitor_interval")]
    pub janitor_interval_secs: u64,

    /// Ready workspaces idle longer than this are stopped. 0 disables.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    #[serde(default = "default_chat_timeout")]
    pub chat_timeout_secs: u64,

    #[serde(default = "default_provision_timeout")]
    pub provision_timeout_secs: u64,

    #[serde(default = "default_id_strategy")]
    pub id_strategy: IdStrategy,

    #[serde(default)]
    pub provider: ProviderConfig,
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_u64(key: &str, default: u64) -> u64 {
    env_opt(key).and_then(|s| s.parse().ok()).unwrap_or(default)
}

fn default_bind_addr() -> String {
    env_opt("AIW_API_BIND").unwrap_or_else(|| "0.0.0.0:3001".to_string())
}

fn default_ws_bind_addr() -> Option<String> {
    env_opt("AIW_API_WS_BIND")
}

fn default_db_path() -> Option<PathBuf> {
    env_opt("AIW_API_DB_PATH").map(PathBuf::from)
}

fn default_janitor_interval() -> u64 {
    env_u64("AIW_API_JANITOR_INTERVAL", 300) // 5 minutes
}

fn default_idle_timeout() -> u64 {
    env_u64("AIW_API_IDLE_TIMEOUT", 0)
}

fn default_chat_timeout() -> u64 {
    env_u64("AIW_CHAT_TIMEOUT", 300)
}

fn default_provision_timeout() -> u64 {
    env_u64("AIW_PROVISION_TIMEOUT", 900)
}

fn default_id_strategy() -> IdStrategy {
    env_opt("AIW_ID_STRATEGY")
        .and_then(|s| s.parse().ok())
        .unwrap_or_default()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            ws_bind_addr: default_ws_bind_addr(),
            db_path: default_db_path(),
            janitor_interval_secs: default_janitor_interval(),
            idle_timeout_secs: default_idle_timeout(),
            chat_timeout_secs: default_chat_timeout(),
            provision_timeout_secs: default_provision_timeout(),
            id_strategy: default_id_strategy(),
            provider: ProviderConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Read `AIW_API_CONFIG` if it is set, otherwise the environment alone.
    pub fn load() -> anyhow::Result<Self> {
        match env_opt("AIW_API_CONFIG") {
            Some(path) => Self::from_file(Path::new(&path)),
            None => Ok(Self::from_env()),
        }
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml(&contents)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_yaml(contents: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml_ng::from_str(contents)?)
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            chat_timeout: Duration::from_secs(self.chat_timeout_secs),
            provision_timeout: Duration::from_secs(self.provision_timeout_secs),
            id_strategy: self.id_strategy,
        }
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }
}

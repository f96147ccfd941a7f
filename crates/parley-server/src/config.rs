use std::{fs, path::Path, time::Duration};

use parley_core::{SearchConfig, SearchConfigError};
use parley_oracle::{OracleConfig, OracleConfigError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_SERVER_CONFIG_YAML: &str = include_str!("../config/server.default.yaml");

/// Everything the server needs: listen address, session policy and the
/// nested search and oracle settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    pub visualization_url: Option<String>,
    pub sessions: SessionConfig,
    pub search: SearchConfig,
    pub oracle: OracleConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: "127.0.0.1".to_string(),
            port: 8000,
            visualization_url: None,
            sessions: SessionConfig::default(),
            search: SearchConfig::default(),
            oracle: OracleConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub idle_timeout_secs: u64,
    pub reap_interval_secs: u64,
    pub event_buffer: usize,
    pub publish_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            idle_timeout_secs: 900,
            reap_interval_secs: 30,
            event_buffer: 256,
            publish_timeout_ms: 250,
        }
    }
}

impl SessionConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }
}

impl ServerConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: ServerConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let yaml = fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml)
    }

    /// Return the default YAML config included with this crate.
    pub fn default_yaml() -> &'static str {
        DEFAULT_SERVER_CONFIG_YAML
    }

    pub fn from_default_yaml() -> Result<Self, ConfigError> {
        Self::from_yaml_str(Self::default_yaml())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.search.validate()?;
        self.oracle.validate()?;
        if self.sessions.event_buffer == 0 {
            return Err(ConfigError::Invalid(
                "sessions.event_buffer must be greater than 0".to_string(),
            ));
        }
        if self.sessions.idle_timeout_secs == 0 || self.sessions.reap_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "sessions idle timeout and reap interval must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Search(#[from] SearchConfigError),

    #[error(transparent)]
    Oracle(#[from] OracleConfigError),

    #[error("invalid server config: {0}")]
    Invalid(String),
}

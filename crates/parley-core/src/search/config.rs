use std::{fmt, fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::tree::search_tree::SearchLimits;

const DEFAULT_SEARCH_CONFIG_YAML: &str = include_str!("../../config/search.default.yaml");

/// Search configuration for MCTS iterations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub iterations: usize,
    pub exploration: f64,
    pub branching_factor: usize,
    pub max_search_depth: u32,
    pub time_budget_ms: u64,
    pub default_max_turns: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            iterations: 12,
            exploration: 1.4,
            branching_factor: 3,
            max_search_depth: 2,
            time_budget_ms: 60_000,
            default_max_turns: 5,
        }
    }
}

impl SearchConfig {
    /// Parse a search config from YAML text.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, SearchConfigError> {
        let config: SearchConfig = serde_yaml::from_str(yaml).map_err(SearchConfigError::Yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a search config from a YAML file path.
    pub fn from_yaml_path(path: impl AsRef<Path>) -> Result<Self, SearchConfigError> {
        let yaml = fs::read_to_string(path).map_err(SearchConfigError::Io)?;
        Self::from_yaml_str(&yaml)
    }

    /// Return the default YAML config included with this crate.
    pub fn default_yaml() -> &'static str {
        DEFAULT_SEARCH_CONFIG_YAML
    }

    /// Parse the default YAML config included with this crate.
    pub fn from_default_yaml() -> Result<Self, SearchConfigError> {
        Self::from_yaml_str(Self::default_yaml())
    }

    pub fn validate(&self) -> Result<(), SearchConfigError> {
        if self.iterations == 0 {
            return Err(SearchConfigError::Invalid(
                "iterations must be greater than 0".to_string(),
            ));
        }
        if !self.exploration.is_finite() || self.exploration < 0.0 {
            return Err(SearchConfigError::Invalid(
                "exploration must be finite and >= 0".to_string(),
            ));
        }
        if self.branching_factor == 0 {
            return Err(SearchConfigError::Invalid(
                "branching_factor must be greater than 0".to_string(),
            ));
        }
        if self.max_search_depth == 0 {
            return Err(SearchConfigError::Invalid(
                "max_search_depth must be greater than 0".to_string(),
            ));
        }
        if self.time_budget_ms == 0 {
            return Err(SearchConfigError::Invalid(
                "time_budget_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn time_budget(&self) -> Duration {
        Duration::from_millis(self.time_budget_ms)
    }

    /// Limits for a search rooted `remaining_turns` turns before the turn limit.
    pub(crate) fn limits(&self, remaining_turns: u32) -> SearchLimits {
        SearchLimits {
            branching_factor: self.branching_factor,
            max_depth: self.max_search_depth.min(remaining_turns),
        }
    }
}

/// Error type for loading and validating `SearchConfig`.
#[derive(Debug)]
pub enum SearchConfigError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
    Invalid(String),
}

impl fmt::Display for SearchConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchConfigError::Io(err) => write!(f, "failed to read config file: {err}"),
            SearchConfigError::Yaml(err) => write!(f, "failed to parse config YAML: {err}"),
            SearchConfigError::Invalid(err) => write!(f, "invalid search config: {err}"),
        }
    }
}

impl std::error::Error for SearchConfigError {}

//! Store configuration loaded from TOML.
//!
//! Every field has a default, so an empty file (or no file) is valid:
//!
//! ```toml
//! storage_dir = "/home/me/.local/share/stratgraph"
//! autosave_ms = 2000
//! label_debounce_ms = 300
//! condition_debounce_ms = 500
//! variable_debounce_ms = 1000
//! history_limit = 100
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use stratgraph_core::debounce::DebounceConfig;
use stratgraph_core::graph::DEFAULT_HISTORY_LIMIT;

use crate::autosave::DEFAULT_AUTOSAVE_MS;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Root of the file-backed store. `None` lets the caller pick a default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_dir: Option<PathBuf>,
    pub autosave_ms: u64,
    pub label_debounce_ms: u64,
    pub condition_debounce_ms: u64,
    pub variable_debounce_ms: u64,
    pub history_limit: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            storage_dir: None,
            autosave_ms: DEFAULT_AUTOSAVE_MS,
            label_debounce_ms: 300,
            condition_debounce_ms: 500,
            variable_debounce_ms: 1000,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl StoreConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history_limit == 0 {
            return Err(ConfigError::Invalid("history_limit must be at least 1".into()));
        }
        let periods = [
            ("autosave_ms", self.autosave_ms),
            ("label_debounce_ms", self.label_debounce_ms),
            ("condition_debounce_ms", self.condition_debounce_ms),
            ("variable_debounce_ms", self.variable_debounce_ms),
        ];
        if let Some((name, _)) = periods.iter().find(|(_, ms)| *ms == 0) {
            return Err(ConfigError::Invalid(format!("{name} must be positive")));
        }
        Ok(())
    }

    pub fn debounce(&self) -> DebounceConfig {
        DebounceConfig {
            label: Duration::from_millis(self.label_debounce_ms),
            condition: Duration::from_millis(self.condition_debounce_ms),
            variable: Duration::from_millis(self.variable_debounce_ms),
        }
    }

    pub fn autosave_period(&self) -> Duration {
        Duration::from_millis(self.autosave_ms)
    }
}

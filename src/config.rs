//! Runtime settings
//!
//! Layered lowest to highest: built-in defaults, a YAML file, environment
//! variables, then whatever the CLI overrides on the returned value.

use crate::agent::DEFAULT_MODEL_ID;
use crate::llm::{ModelError, OpenAiChat, DEFAULT_BASE_URL};
use crate::session::Workspace;
use crate::workflow::{WorkflowConfig, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_ITERATIONS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const ENV_SCRATCH_DIR: &str = "CHUNKFLOW_SCRATCH_DIR";
pub const ENV_BIND: &str = "CHUNKFLOW_BIND";
pub const ENV_DB: &str = "CHUNKFLOW_DB";
pub const ENV_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_BASE_URL: &str = "OPENAI_BASE_URL";

/// Errors raised while loading settings
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Hosted model endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub base_url: String,
    /// Usually supplied through `OPENAI_API_KEY` rather than the file
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    /// Model used when a request does not name one
    pub default_model: String,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            timeout_secs: 120,
            default_model: DEFAULT_MODEL_ID.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Address the HTTP server listens on
    pub bind: String,
    /// Directory for materialized inputs and output artifacts
    pub scratch_dir: PathBuf,
    /// Session database; `<scratch_dir>/chunkflow.db` when unset
    pub database: Option<PathBuf>,
    pub chunk_size: usize,
    pub max_iterations: usize,
    pub model: ModelSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
            scratch_dir: PathBuf::from("tmp"),
            database: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            model: ModelSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from `path` (or the per-user default file if it exists)
    /// and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path().filter(|p| p.is_file()) {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };
        settings.apply_env(|key| std::env::var(key).ok());
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }

    /// Overlay environment variables read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(dir) = lookup(ENV_SCRATCH_DIR) {
            self.scratch_dir = PathBuf::from(dir);
        }
        if let Some(bind) = lookup(ENV_BIND) {
            self.bind = bind;
        }
        if let Some(db) = lookup(ENV_DB) {
            self.database = Some(PathBuf::from(db));
        }
        if let Some(key) = lookup(ENV_API_KEY) {
            self.model.api_key = Some(key);
        }
        if let Some(url) = lookup(ENV_BASE_URL) {
            self.model.base_url = url;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid {
                key: "chunk_size",
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.max_iterations == 0 {
            return Err(ConfigError::Invalid {
                key: "max_iterations",
                reason: "must be greater than 0".to_string(),
            });
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.database
            .clone()
            .unwrap_or_else(|| self.scratch_dir.join("chunkflow.db"))
    }

    pub fn workspace(&self) -> Workspace {
        Workspace::new(&self.scratch_dir)
    }

    pub fn workflow(&self) -> WorkflowConfig {
        WorkflowConfig {
            chunk_size: self.chunk_size,
            max_iterations: self.max_iterations,
        }
    }

    /// Build the hosted chat client described by these settings.
    pub fn chat_client(&self) -> Result<OpenAiChat, ModelError> {
        OpenAiChat::new(
            self.model.base_url.clone(),
            self.model.api_key.clone(),
            Duration::from_secs(self.model.timeout_secs),
        )
    }
}

/// Per-user config file (`~/.config/chunkflow/config.yaml` on Linux).
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("chunkflow").join("config.yaml"))
}

//! Runtime configuration.
//!
//! Supports loading configuration from:
//! 1. A YAML file (`~/.qxm/config.yaml` by default)
//! 2. Environment variables (with `QXM_` prefix)
//!
//! Precedence (highest to lowest): environment, file, defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::backend::BackendConfig;
use crate::context::ExecutionContext;
use crate::error::ManagerResult;
use crate::resolution;
use crate::tracing_config::init_tracing;

/// What to do with qudits still live when a manager is torn down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeakPolicy {
    /// Log a warning.
    #[default]
    Warn,
    /// Log an error. Callers that opt in also get a failure from
    /// `ExecutionManager::check_leaks`.
    Error,
}

impl std::str::FromStr for LeakPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "warn" => Ok(LeakPolicy::Warn),
            "error" => Ok(LeakPolicy::Error),
            other => Err(ConfigError::ValidationError(format!(
                "Invalid leak policy: {other}"
            ))),
        }
    }
}

/// Complete runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Symbolic name of the backend to activate
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Backend-specific options, passed through as `BackendConfig::extra`
    #[serde(default)]
    pub backend_options: serde_json::Map<String, serde_json::Value>,

    /// Teardown leak handling
    #[serde(default)]
    pub leak_policy: LeakPolicy,

    /// Shots used when a context does not set its own
    #[serde(default = "default_shots")]
    pub default_shots: usize,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "console" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_backend() -> String {
    "statevector".to_string()
}

fn default_shots() -> usize {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "console".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            backend: default_backend(),
            backend_options: serde_json::Map::new(),
            leak_policy: LeakPolicy::default(),
            default_shots: default_shots(),
            logging: LoggingConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from YAML text.
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = serde_yaml_ng::from_str(contents)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Default configuration file location, `~/.qxm/config.yaml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".qxm").join("config.yaml"))
    }

    /// Load configuration with the following precedence:
    /// 1. The default file, if it exists
    /// 2. Environment variable overrides
    pub fn load() -> Result<Self, ConfigError> {
        let config = match Self::default_path() {
            Some(path) if path.exists() => Self::from_file(path)?,
            _ => RuntimeConfig::default(),
        };
        let config = config.merge_env();
        config.validate()?;
        Ok(config)
    }

    /// Apply `QXM_*` environment variables.
    pub fn merge_env(self) -> Self {
        self.merge_vars(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable source. Only variables
    /// that are present change the configuration; unparsable numbers are
    /// ignored.
    pub fn merge_vars(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = lookup("QXM_BACKEND") {
            self.backend = v;
        }
        if let Some(v) = lookup("QXM_LEAK_POLICY") {
            if let Ok(policy) = v.parse() {
                self.leak_policy = policy;
            }
        }
        if let Some(v) = lookup("QXM_DEFAULT_SHOTS") {
            if let Ok(val) = v.parse() {
                self.default_shots = val;
            }
        }
        if let Some(v) = lookup("QXM_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = lookup("QXM_LOG_FORMAT") {
            self.logging.format = v;
        }
        self
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "backend name must not be empty".to_string(),
            ));
        }

        if self.default_shots == 0 {
            return Err(ConfigError::ValidationError(
                "default_shots must be greater than 0".to_string(),
            ));
        }

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log level: {other}"
                )));
            }
        }

        match self.logging.format.as_str() {
            "console" | "json" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log format: {other}"
                )));
            }
        }

        Ok(())
    }

    /// Install tracing and make [`RuntimeConfig::backend`] the default
    /// backend. The backend must already be registered.
    pub fn activate(&self) -> ManagerResult<()> {
        if let Err(e) = init_tracing(&self.logging) {
            debug!("Tracing not reinstalled: {}", e);
        }
        resolution::activate_execution_manager(self.backend_config(), self.leak_policy)
    }

    /// A fresh execution context of `kind` using [`RuntimeConfig::default_shots`].
    pub fn context(&self, kind: &str) -> ExecutionContext {
        ExecutionContext::new(kind).with_shots(self.default_shots)
    }

    /// Backend configuration for the selected backend.
    pub fn backend_config(&self) -> BackendConfig {
        BackendConfig {
            name: self.backend.clone(),
            extra: self.backend_options.clone(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

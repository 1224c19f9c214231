//! Configuration loading, validation, and management for toolstream.
//!
//! Loads configuration from `~/.toolstream/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use toolstream_core::tool::ToolSpec;

/// The root configuration structure.
///
/// Maps directly to `~/.toolstream/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Agent loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Tools the model may call, in the order they are offered
    #[serde(default)]
    pub tools: Vec<ToolSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Upper bound on model calls per run; the last one is forced-final
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Base system prompt; tool instructions are appended to it
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Name of the tag that groups several tool calls
    #[serde(default = "default_bundle_wrapper")]
    pub bundle_wrapper: String,
}

fn default_max_iterations() -> usize {
    10
}
fn default_system_prompt() -> String {
    "You are a helpful assistant. Use the available tools when they help you answer accurately."
        .into()
}
fn default_bundle_wrapper() -> String {
    "tool_calls".into()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            system_prompt: default_system_prompt(),
            bundle_wrapper: default_bundle_wrapper(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.toolstream/config.toml).
    ///
    /// Environment variables take precedence over the file:
    /// - `TOOLSTREAM_MAX_ITERATIONS`
    /// - `TOOLSTREAM_SYSTEM_PROMPT`
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_env(&Self::config_path())
    }

    /// Load `path` and apply the environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (normally the process
    /// environment).
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(raw) = lookup("TOOLSTREAM_MAX_ITERATIONS") {
            self.agent.max_iterations = raw.trim().parse().map_err(|_| ConfigError::InvalidOverride {
                var: "TOOLSTREAM_MAX_ITERATIONS".into(),
                value: raw.clone(),
            })?;
        }

        if let Some(prompt) = lookup("TOOLSTREAM_SYSTEM_PROMPT") {
            self.agent.system_prompt = prompt;
        }

        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".toolstream")
    }

    /// Path of the default config file.
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be at least 1".into(),
            ));
        }

        let wrapper = self.agent.bundle_wrapper.trim();
        if wrapper.is_empty() || wrapper.contains(|c: char| c == '<' || c == '>' || c.is_whitespace()) {
            return Err(ConfigError::ValidationError(format!(
                "agent.bundle_wrapper \"{}\" is not a valid tag name",
                self.agent.bundle_wrapper
            )));
        }

        let mut seen = HashSet::new();
        for tool in &self.tools {
            if tool.name.trim().is_empty() {
                return Err(ConfigError::ValidationError("tool name must not be empty".into()));
            }
            if tool.name == self.agent.bundle_wrapper {
                return Err(ConfigError::ValidationError(format!(
                    "tool \"{}\" collides with the bundle wrapper",
                    tool.name
                )));
            }
            if !seen.insert(tool.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "tool \"{}\" is declared more than once",
                    tool.name
                )));
            }
            tool.check_defaults().map_err(ConfigError::ValidationError)?;
        }

        Ok(())
    }

    /// Generate a default config TOML string (for `config show`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Invalid value for {var}: \"{value}\"")]
    InvalidOverride { var: String, value: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

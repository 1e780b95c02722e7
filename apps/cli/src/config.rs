//! CLI configuration file support.
//!
//! Configuration precedence:
//! 1. CLI arguments (handled by clap)
//! 2. Environment variables (`GEMINI_API_KEY`, `GOOGLE_AI_API_KEY`)
//! 3. Local config file (./.gemlinkrc)
//! 4. Global config file (~/.gemlink/config.toml)
//! 5. Defaults

use gemlink_abstraction::Credentials;
use gemlink_orchestrator::OrchestratorConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variables checked for an API key, in order.
pub const API_KEY_ENV_VARS: [&str; 2] = ["GEMINI_API_KEY", "GOOGLE_AI_API_KEY"];

const FLAG_SOURCE: &str = "--api-key";
const CONFIG_SOURCE: &str = "config:api_key";

/// CLI configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CliConfig {
    /// Gemini API key
    #[serde(default)]
    pub api_key: Option<String>,

    /// API base URL
    #[serde(default)]
    pub base_url: Option<String>,

    /// Log level
    #[serde(default)]
    pub log_level: Option<String>,

    /// Retry and fallback settings
    #[serde(default)]
    pub orchestrator: Option<OrchestratorConfig>,
}

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum CliConfigError {
    /// Configuration file not found.
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    /// Failed to read configuration file.
    #[error("Failed to read configuration file: {0}")]
    ReadError(String),

    /// Failed to parse configuration file.
    #[error("Failed to parse configuration file: {0}")]
    ParseError(String),
}

/// Result type for configuration operations.
pub type CliConfigResult<T> = std::result::Result<T, CliConfigError>;

impl CliConfig {
    /// Load configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> CliConfigResult<Self> {
        if !path.exists() {
            return Err(CliConfigError::NotFound(path.display().to_string()));
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| CliConfigError::ReadError(format!("{}: {}", path.display(), e)))?;

        toml::from_str(&content)
            .map_err(|e| CliConfigError::ParseError(format!("{}: {}", path.display(), e)))
    }

    /// Get default global configuration file path.
    pub fn default_global_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".gemlink")
            .join("config.toml")
    }

    /// Get default local configuration file path.
    pub fn default_local_path() -> PathBuf {
        PathBuf::from(".gemlinkrc")
    }

    /// Discover and load the global and local configuration files.
    pub fn discover_and_load() -> CliConfigResult<Self> {
        Self::load_layers(&[Self::default_global_path(), Self::default_local_path()])
    }

    /// Loads each existing file in order, later files overriding earlier ones.
    ///
    /// Missing files are skipped; unreadable or malformed files are errors.
    pub fn load_layers(paths: &[PathBuf]) -> CliConfigResult<Self> {
        let mut config = Self::default();
        for path in paths {
            match Self::load_from_file(path) {
                Ok(layer) => config.merge(layer),
                Err(CliConfigError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(config)
    }

    /// Merge another configuration into this one.
    ///
    /// Values from `other` override values in `self` if they are Some.
    pub fn merge(&mut self, other: Self) {
        if other.api_key.is_some() {
            self.api_key = other.api_key;
        }
        if other.base_url.is_some() {
            self.base_url = other.base_url;
        }
        if other.log_level.is_some() {
            self.log_level = other.log_level;
        }
        if other.orchestrator.is_some() {
            self.orchestrator = other.orchestrator;
        }
    }
}

/// Resolves the API key: flag, then environment, then config file.
pub fn resolve_credentials<F>(flag: Option<&str>, config: &CliConfig, env: F) -> Credentials
where
    F: Fn(&str) -> Option<String>,
{
    let sources = [FLAG_SOURCE, API_KEY_ENV_VARS[0], API_KEY_ENV_VARS[1], CONFIG_SOURCE];
    Credentials::from_lookup(&sources, |source| match source {
        FLAG_SOURCE => flag.map(str::to_string),
        CONFIG_SOURCE => config.api_key.clone(),
        var => env(var),
    })
}

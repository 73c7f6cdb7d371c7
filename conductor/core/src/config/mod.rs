//! TOML Configuration File Support
//!
//! Centralized configuration loading for the chat conductor, supporting a
//! TOML configuration file at `~/.config/neurorad/config.toml`.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. CLI arguments (via [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [backend]
//! url = "http://localhost:11434"
//! model = "gemma3:12b-it-qat"
//! connect_timeout_secs = 10
//!
//! [identity]
//! url = "http://127.0.0.1:8090"
//!
//! [chat]
//! require_image = false
//! max_input_length = 32768    # 0 = unlimited
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `OLLAMA_HOST` | `backend.url` (full URL or bare host) |
//! | `OLLAMA_PORT` | port used with a bare `OLLAMA_HOST` |
//! | `NEURORAD_MODEL` | `backend.model` |
//! | `NEURORAD_CONNECT_TIMEOUT` | `backend.connect_timeout_secs` |
//! | `POCKETBASE_URL` | `identity.url` |
//! | `NEURORAD_REQUIRE_IMAGE` | `chat.require_image` |
//! | `NEURORAD_MAX_INPUT` | `chat.max_input_length` (`0` disables the limit) |

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::{normalize_base_url, BackendConfig, DEFAULT_OLLAMA_URL};
use crate::identity::{IdentityConfig, DEFAULT_IDENTITY_URL};

/// Default generation model
pub const DEFAULT_MODEL: &str = "gemma3:12b-it-qat";

/// Default connect timeout for the generation endpoint, in seconds
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default maximum input length in characters
pub const DEFAULT_MAX_INPUT_LENGTH: usize = 32768;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {}: {source}", path.display())]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Backend section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendToml {
    /// Generation endpoint base URL
    pub url: Option<String>,

    /// Model name
    pub model: Option<String>,

    /// Connect timeout in seconds
    pub connect_timeout_secs: Option<u64>,
}

/// Identity section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityToml {
    /// Identity service base URL
    pub url: Option<String>,
}

/// Chat section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatToml {
    /// Refuse to send a prompt without an attached image
    pub require_image: Option<bool>,

    /// Maximum input length in characters (0 = unlimited)
    pub max_input_length: Option<usize>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NeuroradToml {
    /// Backend configuration section
    pub backend: BackendToml,

    /// Identity configuration section
    pub identity: IdentityToml,

    /// Chat configuration section
    pub chat: ChatToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Resolved configuration
///
/// Use [`load_config`] to load configuration with proper priority handling.
#[derive(Clone, Debug)]
pub struct NeuroradConfig {
    /// Generation endpoint base URL
    pub ollama_url: String,

    /// Model name sent with every request
    pub model: String,

    /// Connect timeout for the generation endpoint
    pub connect_timeout: Duration,

    /// Identity service base URL
    pub identity_url: String,

    /// Refuse to send a prompt without an attached image
    pub require_image: bool,

    /// Maximum input length in characters (0 = unlimited)
    pub max_input_length: usize,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    source: ConfigSource,
}

impl Default for NeuroradConfig {
    fn default() -> Self {
        Self {
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            identity_url: DEFAULT_IDENTITY_URL.to_string(),
            require_image: false,
            max_input_length: DEFAULT_MAX_INPUT_LENGTH,
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl NeuroradConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the highest-priority source that contributed a value
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Connection settings for the generation backend
    #[must_use]
    pub fn backend_config(&self) -> BackendConfig {
        BackendConfig {
            url: self.ollama_url.clone(),
            connect_timeout: self.connect_timeout,
        }
    }

    /// Connection settings for the identity service
    #[must_use]
    pub fn identity_config(&self) -> IdentityConfig {
        IdentityConfig {
            url: self.identity_url.clone(),
            ..IdentityConfig::default()
        }
    }

    /// Check values that cannot be expressed by the types
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] naming the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::ValidationError("model must not be empty".into()));
        }
        for (name, url) in [("backend.url", &self.ollama_url), ("identity.url", &self.identity_url)] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must be an http(s) URL, got {url:?}"
                )));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/neurorad/config.toml` or
/// `~/.config/neurorad/config.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("neurorad").join("config.toml"))
}

/// Load configuration from the default path, environment and defaults
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed.
/// A missing config file is not an error (defaults are used).
pub fn load_config() -> Result<NeuroradConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read, parsed or
/// validated.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<NeuroradConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration with a custom environment lookup
///
/// # Errors
///
/// As [`load_config_from_path`].
pub fn load_config_with_env<F>(path: Option<PathBuf>, env: F) -> Result<NeuroradConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = NeuroradConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: NeuroradToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, env);
    config.validate()?;

    Ok(config)
}

fn apply_toml_config(config: &mut NeuroradConfig, toml: &NeuroradToml) {
    if let Some(ref url) = toml.backend.url {
        config.ollama_url = normalize_base_url(url, None);
    }
    if let Some(ref model) = toml.backend.model {
        config.model = model.clone();
    }
    if let Some(secs) = toml.backend.connect_timeout_secs {
        config.connect_timeout = Duration::from_secs(secs);
    }

    if let Some(ref url) = toml.identity.url {
        config.identity_url = url.trim_end_matches('/').to_string();
    }

    if let Some(required) = toml.chat.require_image {
        config.require_image = required;
    }
    if let Some(length) = toml.chat.max_input_length {
        config.max_input_length = length;
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Option<T> {
    let parsed = value.trim().parse().ok();
    if parsed.is_none() {
        tracing::warn!(key = key, value = value, "Ignoring unparseable environment value");
    }
    parsed
}

fn parse_flag(value: &str) -> bool {
    let value = value.trim().to_lowercase();
    !(value.is_empty() || value == "0" || value == "false" || value == "no")
}

fn apply_env_config<F>(config: &mut NeuroradConfig, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    let port = env("OLLAMA_PORT").and_then(|p| parse_env::<u16>("OLLAMA_PORT", &p));
    match env("OLLAMA_HOST") {
        Some(host) => {
            config.ollama_url = normalize_base_url(&host, port);
            config.source = ConfigSource::Env;
        }
        None => {
            if let Some(port) = port {
                config.ollama_url = normalize_base_url("localhost", Some(port));
                config.source = ConfigSource::Env;
            }
        }
    }

    if let Some(model) = env("NEURORAD_MODEL") {
        config.model = model;
        config.source = ConfigSource::Env;
    }
    if let Some(secs) = env("NEURORAD_CONNECT_TIMEOUT")
        .and_then(|v| parse_env::<u64>("NEURORAD_CONNECT_TIMEOUT", &v))
    {
        config.connect_timeout = Duration::from_secs(secs);
        config.source = ConfigSource::Env;
    }

    if let Some(url) = env("POCKETBASE_URL") {
        config.identity_url = url.trim_end_matches('/').to_string();
        config.source = ConfigSource::Env;
    }

    if let Some(required) = env("NEURORAD_REQUIRE_IMAGE") {
        config.require_image = parse_flag(&required);
        config.source = ConfigSource::Env;
    }
    if let Some(length) =
        env("NEURORAD_MAX_INPUT").and_then(|v| parse_env::<usize>("NEURORAD_MAX_INPUT", &v))
    {
        config.max_input_length = length;
        config.source = ConfigSource::Env;
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Backend URL override
    pub ollama_url: Option<String>,

    /// Model override
    pub model: Option<String>,

    /// Require-image override
    pub require_image: Option<bool>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set backend URL override
    #[must_use]
    pub fn with_ollama_url(mut self, url: impl Into<String>) -> Self {
        self.ollama_url = Some(url.into());
        self
    }

    /// Set model override
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set require-image override
    #[must_use]
    pub fn with_require_image(mut self, required: bool) -> Self {
        self.require_image = Some(required);
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut NeuroradConfig) {
        if self.ollama_url.is_some() || self.model.is_some() || self.require_image.is_some() {
            config.source = ConfigSource::Cli;
        }

        if let Some(ref url) = self.ollama_url {
            config.ollama_url = normalize_base_url(url, None);
        }
        if let Some(ref model) = self.model {
            config.model = model.clone();
        }
        if let Some(required) = self.require_image {
            config.require_image = required;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

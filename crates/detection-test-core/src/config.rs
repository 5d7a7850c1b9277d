//! Configuration loader for detection-test.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// File name looked up next to detection files.
pub const CONFIG_FILE_NAME: &str = "detection-test.config.yaml";

/// Errors that can occur during config loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yml::Error),
    #[error("endpoint must be an http(s) URL, got '{0}'")]
    InvalidEndpoint(String),
    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),
}

/// Settings for talking to the execution service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DetectionTestConfig {
    /// Base URL of the execution service (default: `http://localhost:8080`).
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Request timeout in milliseconds (default: 60000).
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Connect timeout in milliseconds (default: 5000).
    #[serde(rename = "connect-timeout", default = "default_connect_timeout")]
    pub connect_timeout: u64,

    /// Bearer token sent with each request.
    #[serde(rename = "api-token", default)]
    pub api_token: Option<String>,
}

fn default_endpoint() -> String {
    "http://localhost:8080".to_string()
}

const fn default_timeout() -> u64 {
    60_000
}

const fn default_connect_timeout() -> u64 {
    5_000
}

impl Default for DetectionTestConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            timeout: default_timeout(),
            connect_timeout: default_connect_timeout(),
            api_token: None,
        }
    }
}

/// Load configuration from `detection-test.config.yaml` in `dir`.
///
/// If the file doesn't exist, returns default configuration.
///
/// # Errors
/// Returns an error if:
/// - The file exists but cannot be read
/// - The YAML is invalid
/// - The endpoint is not an http(s) URL or a timeout is zero
pub fn load_config(dir: &Path) -> Result<DetectionTestConfig, ConfigError> {
    let config_path = dir.join(CONFIG_FILE_NAME);

    let config = if config_path.exists() {
        let content = std::fs::read_to_string(&config_path)?;
        serde_yml::from_str(&content)?
    } else {
        DetectionTestConfig::default()
    };

    validate_config(&config)?;
    Ok(config)
}

/// Validate the configuration.
///
/// # Errors
/// Returns `ConfigError::InvalidEndpoint` or `ConfigError::ZeroTimeout`.
pub fn validate_config(config: &DetectionTestConfig) -> Result<(), ConfigError> {
    if !(config.endpoint.starts_with("http://") || config.endpoint.starts_with("https://")) {
        return Err(ConfigError::InvalidEndpoint(config.endpoint.clone()));
    }
    if config.timeout == 0 {
        return Err(ConfigError::ZeroTimeout("timeout"));
    }
    if config.connect_timeout == 0 {
        return Err(ConfigError::ZeroTimeout("connect-timeout"));
    }
    Ok(())
}

/// CLI override options for configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub endpoint: Option<String>,
    pub timeout: Option<u64>,
    pub api_token: Option<String>,
}

/// Apply CLI overrides to a configuration.
#[must_use]
pub fn apply_overrides(
    mut config: DetectionTestConfig,
    overrides: &ConfigOverrides,
) -> DetectionTestConfig {
    if let Some(ref endpoint) = overrides.endpoint {
        config.endpoint.clone_from(endpoint);
    }
    if let Some(timeout) = overrides.timeout {
        config.timeout = timeout;
    }
    if let Some(ref token) = overrides.api_token {
        config.api_token = Some(token.clone());
    }
    config
}

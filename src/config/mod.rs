//! Configuration module for the upload orchestrator
//!
//! Handles loading and parsing of YAML configuration files with support for
//! environment variable expansion and validation. The storage base URL is the
//! only required setting; everything else has defaults.
//!
//! # Example
//!
//! ```yaml
//! transport:
//!   base_url: "${STORAGE_URL:-http://localhost:3333}"
//!   timeout_seconds: 300
//! compression:
//!   max_width: 1000
//!   max_height: 1000
//!   quality: 0.8
//! logging:
//!   level: "info"
//!   format: "json"
//! ```

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::compress::CompressionOptions;
use crate::transport::http::{HttpTransportConfig, DEFAULT_CHUNK_SIZE};

mod loader;

pub use loader::ConfigLoader;

// ============================================================================
// Environment Variable Expansion
// ============================================================================

lazy_static! {
    static ref ENV_VAR_RE: regex_lite::Regex =
        regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}")
            .expect("env var pattern is valid");
}

/// Expand environment variables in a string.
///
/// Supports two syntaxes:
/// - `${VAR_NAME}` - Simple expansion, keeps placeholder if var not found
/// - `${VAR_NAME:-default}` - Expansion with default value
///
/// ```ignore
/// std::env::set_var("STORAGE_HOST", "files.internal");
/// assert_eq!(expand_env_vars("http://${STORAGE_HOST}"), "http://files.internal");
/// assert_eq!(expand_env_vars("${MISSING:-fallback}"), "fallback");
/// ```
pub(crate) fn expand_env_vars(s: &str) -> String {
    let mut last_match = 0;
    let mut result = String::with_capacity(s.len());

    for cap in ENV_VAR_RE.captures_iter(s) {
        let Some(full_match) = cap.get(0) else {
            continue;
        };
        let var_name = &cap[1];

        result.push_str(&s[last_match..full_match.start()]);

        let value = match std::env::var(var_name) {
            Ok(val) => val,
            Err(_) => match cap.get(2) {
                Some(default) => default.as_str().to_string(),
                // No env var and no default. Keep the original placeholder.
                None => full_match.as_str().to_string(),
            },
        };
        result.push_str(&value);

        last_match = full_match.end();
    }

    result.push_str(&s[last_match..]);
    result
}

/// Validate that a URL starts with http:// or https://
fn is_valid_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub transport: TransportConfig,
    #[serde(default)]
    pub compression: CompressionOptions,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    /// Default configuration pointing at `base_url`
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            transport: TransportConfig {
                base_url: base_url.into(),
                timeout_seconds: None,
                chunk_size: DEFAULT_CHUNK_SIZE,
            },
            compression: CompressionOptions::default(),
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }

    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Parse configuration from YAML text, expanding environment variables
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        ConfigLoader::parse(content)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_valid_http_url(&self.transport.base_url) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid transport base_url '{}': must start with http:// or https://",
                self.transport.base_url
            )));
        }

        if self.transport.chunk_size == 0 {
            return Err(ConfigError::ValidationError(
                "transport.chunk_size must be greater than 0".into(),
            ));
        }

        if self.transport.timeout_seconds == Some(0) {
            return Err(ConfigError::ValidationError(
                "transport.timeout_seconds must be greater than 0 when set".into(),
            ));
        }

        if self.compression.max_width == 0 || self.compression.max_height == 0 {
            return Err(ConfigError::ValidationError(
                "compression bounds must be greater than 0".into(),
            ));
        }

        if !(self.compression.quality > 0.0 && self.compression.quality <= 1.0) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid compression quality {}: must be in (0.0, 1.0]",
                self.compression.quality
            )));
        }

        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "logging.level cannot be empty".into(),
            ));
        }

        Ok(())
    }

    /// Settings for [`HttpTransport`](crate::transport::HttpTransport)
    pub fn http_transport(&self) -> HttpTransportConfig {
        HttpTransportConfig {
            base_url: self.transport.base_url.clone(),
            timeout: self.transport.timeout_seconds.map(Duration::from_secs),
            chunk_size: self.transport.chunk_size,
        }
    }
}

/// Storage transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Storage service base URL; uploads go to `{base_url}/uploads`.
    /// Supports ${VAR} and ${VAR:-default} expansion.
    pub base_url: String,
    /// Whole-request timeout. Default: none
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    /// Body chunk size in bytes, which is also the progress granularity.
    /// Default: 64KB
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when RUST_LOG is not set. Default: "info"
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}

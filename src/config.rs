//! Configuration module for Axon.
//!
//! Loads configuration from TOML files with environment variable substitution.
//!
//! # Example
//!
//! ```toml
//! [collector]
//! base_url = "${AXON_COLLECTOR_URL}"
//! account_id = "acct-1234"
//! org_id = "org-1102"
//!
//! [batching]
//! batch_size = 50
//!
//! [retry]
//! base_delay_ms = 1000
//! max_delay_ms = 60000
//! ```

use regex::Regex;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AxonConfig {
    #[serde(default)]
    pub collector: CollectorConfig,

    #[serde(default)]
    pub batching: BatchingConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub log: LogConfig,
}

/// Collector endpoint configuration
#[derive(Debug, Deserialize, Clone)]
pub struct CollectorConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub account_id: String,

    #[serde(default)]
    pub org_id: String,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            account_id: String::new(),
            org_id: String::new(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_timeout_ms() -> u64 {
    30000
}

/// Batching configuration
#[derive(Debug, Deserialize, Clone)]
pub struct BatchingConfig {
    /// Maximum events per transport call
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

fn default_batch_size() -> usize {
    crate::DEFAULT_BATCH_SIZE
}

/// Retry and backoff configuration
#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    /// Base delay for exponential backoff
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Ceiling for the backoff interval
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// HTTP statuses eligible for retry
    #[serde(default = "default_retry_statuses")]
    pub retry_statuses: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            retry_statuses: default_retry_statuses(),
        }
    }
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    60000
}

fn default_retry_statuses() -> Vec<u16> {
    vec![401, 408, 429, 500, 502, 503, 504]
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    /// Log filter level: "error", "warn", "info", "debug", "trace"
    #[serde(default = "default_debug_level")]
    pub debug_level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            debug_level: default_debug_level(),
        }
    }
}

fn default_debug_level() -> String {
    "info".to_string()
}

impl AxonConfig {
    /// Load configuration from the default path or AXON_CONFIG env var.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            env::var("AXON_CONFIG").unwrap_or_else(|_| "config/axon.toml".to_string());

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            info!(
                path = %path.display(),
                "Config file not found, using defaults"
            );
            return Ok(Self::default());
        }

        info!(path = %path.display(), "Loading configuration");

        let content = fs::read_to_string(path)?;
        let content = substitute_env_vars(&content);

        debug!("Parsing TOML configuration");
        let config: AxonConfig = toml::from_str(&content)?;

        config.validate()?;

        info!(
            base_url = %config.collector.base_url,
            batch_size = config.batching.batch_size,
            retry_statuses = config.retry.retry_statuses.len(),
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.collector.base_url.starts_with("http://")
            && !self.collector.base_url.starts_with("https://")
        {
            return Err(ConfigError::ValidationError(format!(
                "Collector base_url must start with http:// or https://, got '{}'",
                self.collector.base_url
            )));
        }

        if self.collector.base_url.contains("${") {
            return Err(ConfigError::ValidationError(format!(
                "Collector base_url contains unsubstituted environment variable: {}",
                self.collector.base_url
            )));
        }

        if self.batching.batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "batch_size must be at least 1".to_string(),
            ));
        }

        if self.retry.base_delay_ms == 0 {
            return Err(ConfigError::ValidationError(
                "base_delay_ms must be at least 1".to_string(),
            ));
        }

        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(ConfigError::ValidationError(format!(
                "max_delay_ms ({}) must be >= base_delay_ms ({})",
                self.retry.max_delay_ms, self.retry.base_delay_ms
            )));
        }

        match self.log.debug_level.as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "debug_level must be one of error/warn/info/debug/trace, got '{}'",
                    other
                )));
            }
        }

        Ok(())
    }

    /// Base delay as a Duration.
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.retry.base_delay_ms)
    }

    /// Max delay as a Duration.
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.retry.max_delay_ms)
    }

    /// Transport timeout as a Duration.
    pub fn transport_timeout(&self) -> Duration {
        Duration::from_millis(self.collector.timeout_ms)
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(content: &str) -> String {
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap();

    re.replace_all(content, |caps: &regex::Captures| {
        let var_name = &caps[1];
        match env::var(var_name) {
            Ok(value) => value,
            Err(_) => {
                debug!(var = %var_name, "Environment variable not set, keeping placeholder");
                caps[0].to_string()
            }
        }
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_substitution() {
        env::set_var("AXON_TEST_VAR", "substituted_value");
        let input = "base_url = \"${AXON_TEST_VAR}\"";
        let output = substitute_env_vars(input);
        assert_eq!(output, "base_url = \"substituted_value\"");
        env::remove_var("AXON_TEST_VAR");
    }

    #[test]
    fn test_env_var_not_set() {
        let input = "base_url = \"${AXON_NONEXISTENT_VAR}\"";
        let output = substitute_env_vars(input);
        assert_eq!(output, "base_url = \"${AXON_NONEXISTENT_VAR}\"");
    }

    #[test]
    fn test_defaults() {
        let config = AxonConfig::default();
        assert_eq!(config.batching.batch_size, 50);
        assert_eq!(config.retry.base_delay_ms, 1000);
        assert_eq!(config.retry.max_delay_ms, 60000);
        assert_eq!(
            config.retry.retry_statuses,
            vec![401, 408, 429, 500, 502, 503, 504]
        );
        assert_eq!(config.log.debug_level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_minimal_config() {
        let toml = r#"
            [collector]
            base_url = "https://collect.example.com"
            account_id = "acct-1"
            org_id = "org-1"
        "#;

        let config: AxonConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.collector.base_url, "https://collect.example.com");
        assert_eq!(config.collector.account_id, "acct-1");
        // sections not present fall back to defaults
        assert_eq!(config.batching.batch_size, 50);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            [collector]
            base_url = "https://collect.example.com"
            timeout_ms = 5000

            [batching]
            batch_size = 25

            [retry]
            base_delay_ms = 500
            max_delay_ms = 30000
            retry_statuses = [429, 503]

            [log]
            debug_level = "debug"
        "#;

        let config: AxonConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.collector.timeout_ms, 5000);
        assert_eq!(config.batching.batch_size, 25);
        assert_eq!(config.retry.base_delay_ms, 500);
        assert_eq!(config.retry.retry_statuses, vec![429, 503]);
        assert_eq!(config.log.debug_level, "debug");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_invalid_url() {
        let toml = r#"
            [collector]
            base_url = "not-a-url"
        "#;

        let config: AxonConfig = toml::from_str(toml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_zero_batch_size() {
        let toml = r#"
            [batching]
            batch_size = 0
        "#;

        let config: AxonConfig = toml::from_str(toml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_backoff_bounds() {
        let toml = r#"
            [retry]
            base_delay_ms = 5000
            max_delay_ms = 1000
        "#;

        let config: AxonConfig = toml::from_str(toml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_bad_debug_level() {
        let toml = r#"
            [log]
            debug_level = "verbose"
        "#;

        let config: AxonConfig = toml::from_str(toml).unwrap();
        assert!(config.validate().is_err());
    }
}

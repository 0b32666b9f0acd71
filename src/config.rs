//! Application Configuration
//!
//! This module provides configuration management for the application,
//! supporting YAML configuration files with sensible defaults and a handful
//! of environment overrides for deployment secrets. The configuration is read
//! once at startup and never mutated afterwards.

use std::env;
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;
use crate::storage::config::StorageBackend;

/// Environment variable naming an alternative config file
pub const CONFIG_PATH_ENV: &str = "DROPBIN_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Ingress limits
    pub limits: LimitsConfig,
    /// Expiration worker configuration
    pub expiration: ExpirationConfig,
    /// Object store configuration
    pub storage: StorageConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
    /// Longest a request waits for rate-limiter admission, in seconds
    pub admission_timeout: u64,
    /// Deadline for the store call of a single request, in seconds
    pub request_timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 80,
            workers: 4,
            admission_timeout: 60,
            request_timeout: 60,
        }
    }
}

/// Ingress limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Admitted requests per second, also the burst size. 0 disables.
    pub rate_limit: i64,
    /// Largest accepted upload in bytes. 0 or less disables the check.
    pub size_limit: i64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            rate_limit: 1,
            size_limit: 10 * 1024 * 1024, // 10MiB
        }
    }
}

/// Expiration worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpirationConfig {
    pub enabled: bool,
    /// Retention of a day-bucket in seconds
    pub default_ttl: u64,
    /// Seconds between sweeps
    pub interval: u64,
}

impl Default for ExpirationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl: 7 * 24 * 60 * 60,
            interval: 600,
        }
    }
}

/// Object store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Bucket endpoint, e.g. `https://<bucket>.cos.<region>.myqcloud.com`
    pub bucket_url: String,
    /// Credentials in `key:secret:session` form
    pub os_secret: String,
    /// Signing region, derived from the bucket url when absent
    pub region: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::S3,
            bucket_url: String::new(),
            os_secret: "::".to_string(),
            region: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Path to log4rs configuration file
    pub config_file: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            config_file: "server_log.yaml".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn admission_timeout(&self) -> Duration {
        Duration::from_secs(self.admission_timeout)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }
}

impl LimitsConfig {
    /// Effective upload limit, `None` when disabled
    pub fn size_limit(&self) -> Option<u64> {
        (self.size_limit > 0).then_some(self.size_limit as u64)
    }
}

impl ExpirationConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval.max(1))
    }
}

/// Where a loaded configuration came from. Loading happens before logging
/// is set up, so callers log this once the logger exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(String),
    /// The named file did not exist
    Defaults(String),
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::File(path) => write!(f, "Loaded configuration from {}", path),
            ConfigSource::Defaults(path) => write!(f, "Config file {} not found, using defaults", path),
        }
    }
}

impl AppConfig {
    /// Load configuration from `DROPBIN_CONFIG` or `config.yaml`, then apply
    /// environment overrides
    pub fn load() -> Result<(Self, ConfigSource), ConfigurationError> {
        let path = env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let (mut config, source) = Self::load_from(&path)?;
        config.apply_env()?;
        Ok((config, source))
    }

    /// Load configuration from file, use defaults if not found
    pub fn load_from(config_path: &str) -> Result<(Self, ConfigSource), ConfigurationError> {
        if !Path::new(config_path).exists() {
            return Ok((Self::default(), ConfigSource::Defaults(config_path.to_string())));
        }

        let content = fs::read_to_string(config_path).map_err(|source| ConfigurationError::Read {
            path: config_path.to_string(),
            source,
        })?;
        let config: AppConfig = serde_yaml::from_str(&content).map_err(|source| ConfigurationError::Parse {
            path: config_path.to_string(),
            source,
        })?;
        Ok((config, ConfigSource::File(config_path.to_string())))
    }

    /// Override fields from the process environment
    pub fn apply_env(&mut self) -> Result<(), ConfigurationError> {
        if let Some(secret) = env_value(&["OS_SECRET", "os_secret"]) {
            self.storage.os_secret = secret;
        }
        if let Some(url) = env_value(&["BUCKET_URL", "bucket_url"]) {
            self.storage.bucket_url = url;
        }
        if let Some(backend) = env_value(&["STORAGE_BACKEND"]) {
            self.storage.backend = backend
                .parse()
                .map_err(|_| invalid_env("STORAGE_BACKEND", &backend))?;
        }
        if let Some(rate) = env_value(&["RATE_LIMIT"]) {
            self.limits.rate_limit = rate.parse().map_err(|_| invalid_env("RATE_LIMIT", &rate))?;
        }
        if let Some(size) = env_value(&["SIZE_LIMIT"]) {
            self.limits.size_limit = size.parse().map_err(|_| invalid_env("SIZE_LIMIT", &size))?;
        }
        if let Some(ttl) = env_value(&["DEFAULT_TTL"]) {
            self.expiration.default_ttl = ttl.parse().map_err(|_| invalid_env("DEFAULT_TTL", &ttl))?;
        }
        Ok(())
    }
}

fn env_value(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| env::var(name).ok())
        .find(|value| !value.is_empty())
}

fn invalid_env(name: &str, value: &str) -> ConfigurationError {
    ConfigurationError::InvalidEnv {
        name: name.to_string(),
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    const ENV_VARS: &[&str] = &[
        "OS_SECRET",
        "os_secret",
        "BUCKET_URL",
        "bucket_url",
        "STORAGE_BACKEND",
        "RATE_LIMIT",
        "SIZE_LIMIT",
        "DEFAULT_TTL",
    ];

    fn clear_env() {
        for name in ENV_VARS {
            env::remove_var(name);
        }
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.expiration.default_ttl(), Duration::from_secs(604_800));
        assert_eq!(config.expiration.interval(), Duration::from_secs(600));
        assert_eq!(config.limits.rate_limit, 1);
        assert_eq!(config.limits.size_limit(), Some(10_485_760));
        assert_eq!(config.server.admission_timeout(), Duration::from_secs(60));
        assert_eq!(config.storage.os_secret, "::");
        assert_eq!(config.storage.backend, StorageBackend::S3);
    }

    #[test]
    fn test_size_limit_disabled() {
        let mut limits = LimitsConfig::default();
        limits.size_limit = 0;
        assert_eq!(limits.size_limit(), None);
        limits.size_limit = -1;
        assert_eq!(limits.size_limit(), None);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let (config, source) = AppConfig::load_from("/nonexistent/dropbin.yaml").unwrap();
        assert_eq!(config.server.port, 80);
        assert_eq!(source, ConfigSource::Defaults("/nonexistent/dropbin.yaml".to_string()));
        assert_eq!(
            source.to_string(),
            "Config file /nonexistent/dropbin.yaml not found, using defaults"
        );
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "limits:\n  rate_limit: 20\nstorage:\n  backend: memory\nexpiration:\n  default_ttl: 86400"
        )
        .unwrap();

        let path = file.path().to_str().unwrap();
        let (config, source) = AppConfig::load_from(path).unwrap();
        assert_eq!(source, ConfigSource::File(path.to_string()));
        assert_eq!(config.limits.rate_limit, 20);
        assert_eq!(config.limits.size_limit, 10 * 1024 * 1024);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.expiration.default_ttl(), Duration::from_secs(86_400));
        assert_eq!(config.expiration.interval, 600);
        assert_eq!(config.server.port, 80);
    }

    #[test]
    fn test_malformed_yaml_is_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "limits: [not, a, map").unwrap();
        let err = AppConfig::load_from(file.path().to_str().unwrap()).unwrap_err();
        assert!(matches!(err, ConfigurationError::Parse { .. }));
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        env::set_var("os_secret", "AKID:secret:session");
        env::set_var("BUCKET_URL", "https://files.cos.ap-beijing.myqcloud.com");
        env::set_var("RATE_LIMIT", "50");
        env::set_var("SIZE_LIMIT", "-1");
        env::set_var("STORAGE_BACKEND", "memory");

        let mut config = AppConfig::default();
        config.apply_env().unwrap();
        clear_env();

        assert_eq!(config.storage.os_secret, "AKID:secret:session");
        assert_eq!(config.storage.bucket_url, "https://files.cos.ap-beijing.myqcloud.com");
        assert_eq!(config.limits.rate_limit, 50);
        assert_eq!(config.limits.size_limit(), None);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
    }

    #[test]
    #[serial]
    fn test_invalid_env_value_is_error() {
        clear_env();
        env::set_var("RATE_LIMIT", "fast");
        let mut config = AppConfig::default();
        let err = config.apply_env().unwrap_err();
        clear_env();
        assert!(matches!(err, ConfigurationError::InvalidEnv { .. }));
    }
}

//! Query Configuration
//!
//! Settings for the backend connection and the dispatcher, loaded from an
//! optional TOML file at `~/.config/prom-query/config.toml`.
//!
//! # Configuration Priority
//!
//! Values are resolved with the following priority (highest first):
//! 1. CLI arguments (applied by the binary through [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Environment Variables
//!
//! - `PROMETHEUS_SERVER_ENDPOINT`: backend base URL
//! - `PROMETHEUS_AUTH_TOKEN`: bearer token
//! - `PROM_QUERY_MAX_CONCURRENCY`: admission gate capacity
//! - `PROM_QUERY_TIMEOUT_SECS`: per-request timeout
//!
//! # Example Configuration
//!
//! ```toml
//! [prometheus]
//! endpoint = "http://prometheus-server.monitoring:9090"
//!
//! [query]
//! max_concurrency = 20
//! timeout_secs = 120
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::client::DEFAULT_REQUEST_TIMEOUT;
use crate::gate::DEFAULT_CAPACITY;

/// Default backend endpoint
pub const DEFAULT_ENDPOINT: &str = "http://localhost:9090";

/// Environment variable naming the backend endpoint
pub const ENV_ENDPOINT: &str = "PROMETHEUS_SERVER_ENDPOINT";
/// Environment variable holding the bearer token
pub const ENV_AUTH_TOKEN: &str = "PROMETHEUS_AUTH_TOKEN";
/// Environment variable setting the admission gate capacity
pub const ENV_MAX_CONCURRENCY: &str = "PROM_QUERY_MAX_CONCURRENCY";
/// Environment variable setting the request timeout in seconds
pub const ENV_TIMEOUT_SECS: &str = "PROM_QUERY_TIMEOUT_SECS";

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
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
// TOML Configuration Structures
// =============================================================================

/// `[prometheus]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PrometheusToml {
    /// Backend base URL
    pub endpoint: Option<String>,

    /// Bearer token
    pub auth_token: Option<String>,
}

/// `[query]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryToml {
    /// Admission gate capacity
    pub max_concurrency: Option<usize>,

    /// Per-request timeout in seconds
    pub timeout_secs: Option<u64>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigToml {
    /// Backend section
    pub prometheus: PrometheusToml,

    /// Dispatcher section
    pub query: QueryToml,
}

// =============================================================================
// Resolved Configuration
// =============================================================================

/// Resolved settings for a query session
#[derive(Clone, PartialEq, Eq)]
pub struct QueryConfig {
    /// Backend base URL
    pub endpoint: String,
    /// Maximum backend requests in flight
    pub max_concurrency: usize,
    /// Time budget for one backend call
    pub request_timeout: Duration,
    /// Bearer token, if the backend requires one
    pub auth_token: Option<String>,
}

impl std::fmt::Debug for QueryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryConfig")
            .field("endpoint", &self.endpoint)
            .field("max_concurrency", &self.max_concurrency)
            .field("request_timeout", &self.request_timeout)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            max_concurrency: DEFAULT_CAPACITY,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            auth_token: None,
        }
    }
}

impl QueryConfig {
    /// Defaults overlaid with the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Overlay values from a TOML document
    pub fn apply_toml(&mut self, toml: &ConfigToml) {
        if let Some(endpoint) = &toml.prometheus.endpoint {
            self.endpoint.clone_from(endpoint);
        }
        if let Some(token) = &toml.prometheus.auth_token {
            self.auth_token = Some(token.clone());
        }
        if let Some(max_concurrency) = toml.query.max_concurrency {
            self.max_concurrency = max_concurrency;
        }
        if let Some(secs) = toml.query.timeout_secs {
            self.request_timeout = Duration::from_secs(secs);
        }
    }

    /// Overlay values from environment variables
    ///
    /// `lookup` resolves a variable name; the process environment is used by
    /// [`from_env`](Self::from_env) and tests supply a map.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(endpoint) = lookup(ENV_ENDPOINT) {
            self.endpoint = endpoint;
        }
        if let Some(token) = lookup(ENV_AUTH_TOKEN) {
            self.auth_token = Some(token);
        }
        if let Some(value) = lookup(ENV_MAX_CONCURRENCY) {
            self.max_concurrency = parse_env(ENV_MAX_CONCURRENCY, &value)?;
        }
        if let Some(value) = lookup(ENV_TIMEOUT_SECS) {
            self.request_timeout = Duration::from_secs(parse_env(ENV_TIMEOUT_SECS, &value)?);
        }
        Ok(())
    }

    /// Overlay explicit overrides (typically CLI arguments)
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(endpoint) = &overrides.endpoint {
            self.endpoint.clone_from(endpoint);
        }
        if let Some(max_concurrency) = overrides.max_concurrency {
            self.max_concurrency = max_concurrency;
        }
        if let Some(timeout) = overrides.request_timeout {
            self.request_timeout = timeout;
        }
    }

    /// Check that every value is usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.request_timeout < Duration::from_secs(1) {
            return Err(ConfigError::ValidationError(
                "request timeout must be at least 1 second".to_string(),
            ));
        }
        let url = reqwest::Url::parse(&self.endpoint).map_err(|e| {
            ConfigError::ValidationError(format!("endpoint {:?}: {e}", self.endpoint))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::ValidationError(format!(
                "endpoint {:?} must use http or https",
                self.endpoint
            )));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::ValidationError(format!("{key}={value:?} is not a valid number")))
}

/// Explicit values that take precedence over every other source
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Backend base URL
    pub endpoint: Option<String>,
    /// Admission gate capacity
    pub max_concurrency: Option<usize>,
    /// Per-request timeout
    pub request_timeout: Option<Duration>,
}

// =============================================================================
// Loading
// =============================================================================

/// Default configuration file path (`$XDG_CONFIG_HOME/prom-query/config.toml`)
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("prom-query").join("config.toml"))
}

/// Parse a TOML configuration file
pub fn load_config_from_path(path: &Path) -> Result<ConfigToml, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(toml::from_str(&contents)?)
}

/// Resolve configuration from file, environment and overrides
///
/// An explicit `path` must exist. Without one, the default path is used if
/// present and silently skipped otherwise.
pub fn load_config(
    path: Option<&Path>,
    overrides: &ConfigOverrides,
) -> Result<QueryConfig, ConfigError> {
    load_config_with_env(path, overrides, |key| std::env::var(key).ok())
}

/// [`load_config`] with an explicit environment lookup
pub fn load_config_with_env<F>(
    path: Option<&Path>,
    overrides: &ConfigOverrides,
    lookup: F,
) -> Result<QueryConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = QueryConfig::default();

    let file = match path {
        Some(path) => Some(load_config_from_path(path)?),
        None => match default_config_path() {
            Some(default) if default.exists() => Some(load_config_from_path(&default)?),
            Some(default) => {
                debug!(path = ?default, "No config file found, using defaults");
                None
            }
            None => {
                warn!("Could not determine config directory");
                None
            }
        },
    };

    if let Some(file) = &file {
        config.apply_toml(file);
    }
    config.apply_env(lookup)?;
    config.apply_overrides(overrides);
    config.validate()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    fn config_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = QueryConfig::default();
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.max_concurrency, 20);
        assert_eq!(config.request_timeout, Duration::from_secs(120));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_priority_file_env_overrides() {
        let file = config_file(
            r#"
            [prometheus]
            endpoint = "http://from-file:9090"
            auth_token = "file-token"

            [query]
            max_concurrency = 5
            timeout_secs = 30
            "#,
        );

        // File only
        let config = load_config_with_env(Some(file.path()), &ConfigOverrides::default(), env(&[]))
            .unwrap();
        assert_eq!(config.endpoint, "http://from-file:9090");
        assert_eq!(config.auth_token.as_deref(), Some("file-token"));
        assert_eq!(config.max_concurrency, 5);
        assert_eq!(config.request_timeout, Duration::from_secs(30));

        // Environment beats file
        let config = load_config_with_env(
            Some(file.path()),
            &ConfigOverrides::default(),
            env(&[(ENV_ENDPOINT, "http://from-env:9090"), (ENV_MAX_CONCURRENCY, "8")]),
        )
        .unwrap();
        assert_eq!(config.endpoint, "http://from-env:9090");
        assert_eq!(config.max_concurrency, 8);
        assert_eq!(config.request_timeout, Duration::from_secs(30));

        // Overrides beat environment
        let overrides = ConfigOverrides {
            max_concurrency: Some(2),
            ..Default::default()
        };
        let config = load_config_with_env(
            Some(file.path()),
            &overrides,
            env(&[(ENV_MAX_CONCURRENCY, "8")]),
        )
        .unwrap();
        assert_eq!(config.max_concurrency, 2);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let err = load_config_with_env(
            Some(Path::new("/nonexistent/prom-query.toml")),
            &ConfigOverrides::default(),
            env(&[]),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::ReadError { .. }));
    }

    #[test]
    fn test_invalid_toml() {
        let file = config_file("[query]\nmax_concurrency = \"lots\"\n");
        let err = load_config_from_path(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_invalid_env_value() {
        let mut config = QueryConfig::default();
        let err = config
            .apply_env(env(&[(ENV_TIMEOUT_SECS, "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_TIMEOUT_SECS));
    }

    #[test]
    fn test_validation() {
        let config = QueryConfig {
            max_concurrency: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));

        let config = QueryConfig {
            request_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = QueryConfig {
            endpoint: "prometheus:9090".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = QueryConfig {
            auth_token: Some("super-secret-token".to_string()),
            ..Default::default()
        };
        assert!(!format!("{config:?}").contains("super-secret-token"));
    }
}

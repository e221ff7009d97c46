//! Configuration management
//!
//! This module handles loading, validation, and management of the Vigil configuration.
//! Configuration is stored in TOML format at ~/.vigil/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Log level, data directory
//! - **wazuh**: Manager API and indexer endpoints, TLS and timeout settings
//! - **cache**: Result cache enablement and database location
//! - **limits**: Result-size caps applied to every fetch
//! - **orchestrator**: Fan-out width of one aggregate run
//! - **sources**: Per-source parameter overrides (optional)
//!
//! Credentials are never stored in this file. See [`crate::secrets`].
//!
//! # Environment Overrides
//!
//! `WAZUH_API` and `WAZUH_INDEXER_API` replace the configured endpoints.
//!
//! # Examples
//!
//! ```no_run
//! use vigil_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//!
//! println!("Manager API: {}", config.wazuh.api_url);
//! println!("Cache file: {:?}", config.cache_path());
//! # Ok(())
//! # }
//! ```

use sdk::errors::EngineError;
use sdk::types::ResultLimits;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding `wazuh.api_url`
pub const ENV_API_URL: &str = "WAZUH_API";

/// Environment variable overriding `wazuh.indexer_url`
pub const ENV_INDEXER_URL: &str = "WAZUH_INDEXER_API";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Core engine settings
    pub core: CoreConfig,

    /// Wazuh endpoints
    #[serde(default)]
    pub wazuh: WazuhConfig,

    /// Result cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Result-size limits
    #[serde(default)]
    pub limits: ResultLimits,

    /// Orchestrator settings
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Parameter overrides keyed by source name
    #[serde(default)]
    pub sources: BTreeMap<String, BTreeMap<String, String>>,
}

/// Core engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// Wazuh manager and indexer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WazuhConfig {
    /// Base URL of the manager REST API
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Base URL of the indexer (OpenSearch) API
    #[serde(default = "default_indexer_url")]
    pub indexer_url: String,

    /// Verify TLS certificates. Self-signed managers need `false`.
    #[serde(default = "default_true")]
    pub verify_tls: bool,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    // Note: credentials come from the environment or OS keychain
}

/// Result cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Persist fetch results and reuse them on later runs
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// SQLite file; defaults to `<data_dir>/vigil.db`
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Orchestrator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Sources fetched concurrently within one run (1 = sequential)
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

impl Default for WazuhConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            indexer_url: default_indexer_url(),
            verify_tls: true,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.vigil")
}

fn default_api_url() -> String {
    "https://127.0.0.1:55000".to_string()
}

fn default_indexer_url() -> String {
    "https://127.0.0.1:9200".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_concurrency() -> usize {
    6
}

impl Config {
    /// Load configuration from the default location (~/.vigil/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml_str(&contents)
    }

    /// Parse, apply environment overrides and validate a TOML document
    pub fn from_toml_str(contents: &str) -> Result<Self, EngineError> {
        let mut config: Config = toml::from_str(contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.apply_env_overrides();
        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let config = Self::default_config();

        // Written before processing so `~` stays portable in the file
        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        let mut config = config;
        config.apply_env_overrides();
        config.validate_and_process()?;

        Ok(config)
    }

    /// Get the default configuration file path (~/.vigil/config.toml)
    fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".vigil").join("config.toml"))
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            core: CoreConfig {
                log_level: default_log_level(),
                data_dir: default_data_dir(),
            },
            wazuh: WazuhConfig::default(),
            cache: CacheConfig::default(),
            limits: ResultLimits::default(),
            orchestrator: OrchestratorConfig::default(),
            sources: BTreeMap::new(),
        }
    }

    /// Resolved location of the result cache database
    pub fn cache_path(&self) -> PathBuf {
        self.cache
            .path
            .clone()
            .unwrap_or_else(|| self.core.data_dir.join("vigil.db"))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(ENV_API_URL) {
            if !url.trim().is_empty() {
                self.wazuh.api_url = url.trim().to_string();
            }
        }
        if let Ok(url) = std::env::var(ENV_INDEXER_URL) {
            if !url.trim().is_empty() {
                self.wazuh.indexer_url = url.trim().to_string();
            }
        }
    }

    /// Validate and process configuration
    ///
    /// This method:
    /// - Validates log level, endpoints and numeric bounds
    /// - Strips trailing slashes from endpoints
    /// - Expands ~ in paths
    /// - Creates the data directory if it doesn't exist
    fn validate_and_process(&mut self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        self.wazuh.api_url = validate_url("wazuh.api_url", &self.wazuh.api_url)?;
        self.wazuh.indexer_url = validate_url("wazuh.indexer_url", &self.wazuh.indexer_url)?;

        if self.wazuh.timeout_secs == 0 {
            return Err(EngineError::Config(
                "wazuh.timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.limits.max_items == 0 || self.limits.max_fields == 0 {
            return Err(EngineError::Config(
                "limits.max_items and limits.max_fields must be at least 1".to_string(),
            ));
        }
        if self.orchestrator.max_concurrency == 0 {
            return Err(EngineError::Config(
                "orchestrator.max_concurrency must be at least 1".to_string(),
            ));
        }

        self.core.data_dir = expand_path(&self.core.data_dir)?;
        if let Some(path) = &self.cache.path {
            self.cache.path = Some(expand_path(path)?);
        }

        if !self.core.data_dir.exists() {
            fs::create_dir_all(&self.core.data_dir).map_err(|e| {
                EngineError::Config(format!("Failed to create data directory: {}", e))
            })?;
        }

        Ok(())
    }
}

fn validate_url(field: &str, url: &str) -> Result<String, EngineError> {
    let url = url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(EngineError::Config(format!(
            "{} must start with http:// or https:// (got '{}')",
            field, url
        )));
    }
    Ok(url.trim_end_matches('/').to_string())
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn minimal_toml(data_dir: &Path) -> String {
        format!(
            r#"
[core]
log_level = "debug"
data_dir = "{}"
"#,
            data_dir.display()
        )
    }

    #[test]
    fn test_default_config_creation() {
        let config = Config::default_config();

        assert_eq!(config.core.log_level, "info");
        assert_eq!(config.limits, ResultLimits::default());
        assert_eq!(config.orchestrator.max_concurrency, 6);
        assert!(config.cache.enabled);
        assert!(config.wazuh.verify_tls);
        assert!(config.sources.is_empty());
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let path = PathBuf::from("~/test");
        let expanded = expand_path(&path).unwrap();

        let home = dirs::home_dir().unwrap();
        assert_eq!(expanded, home.join("test"));
    }

    #[test]
    fn test_expand_path_without_tilde() {
        let path = PathBuf::from("/absolute/path");
        let expanded = expand_path(&path).unwrap();

        assert_eq!(expanded, path);
    }

    #[test]
    fn test_minimal_config_uses_section_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::from_toml_str(&minimal_toml(dir.path())).unwrap();

        assert_eq!(config.core.log_level, "debug");
        assert_eq!(config.limits.max_items, 10);
        assert_eq!(config.limits.max_fields, 6);
        assert_eq!(config.cache_path(), dir.path().join("vigil.db"));
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        let dir = TempDir::new().unwrap();
        let toml = minimal_toml(dir.path()).replace("debug", "loud");
        let err = Config::from_toml_str(&toml).unwrap_err();
        assert!(err.to_string().contains("Invalid log level"));
    }

    #[test]
    fn test_zero_limits_rejected() {
        let dir = TempDir::new().unwrap();
        let toml = format!("{}\n[limits]\nmax_items = 0\n", minimal_toml(dir.path()));
        assert!(Config::from_toml_str(&toml).is_err());
    }

    #[test]
    fn test_validate_url() {
        assert_eq!(
            validate_url("x", "https://wazuh.local:55000/").unwrap(),
            "https://wazuh.local:55000"
        );
        assert!(validate_url("x", "wazuh.local:55000").is_err());
    }

    #[test]
    fn test_source_overrides_parsed() {
        let dir = TempDir::new().unwrap();
        let toml = format!(
            "{}\n[sources.get_wazuh_processes]\nagent_id = \"007\"\n",
            minimal_toml(dir.path())
        );
        let config = Config::from_toml_str(&toml).unwrap();
        assert_eq!(
            config.sources["get_wazuh_processes"]["agent_id"],
            "007".to_string()
        );
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default_config();
        let toml_string = toml::to_string(&config).unwrap();

        let deserialized: Config = toml::from_str(&toml_string).unwrap();
        assert_eq!(config.core.log_level, deserialized.core.log_level);
        assert_eq!(config.wazuh.api_url, deserialized.wazuh.api_url);
        assert_eq!(config.limits, deserialized.limits);
    }
}

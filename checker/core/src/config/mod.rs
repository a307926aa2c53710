//! TOML Configuration File Support
//!
//! Centralized configuration loading for the symptom checker, supporting a
//! TOML configuration file at `~/.config/symptom-checker/checker.toml`.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. CLI arguments (via [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # XDG Base Directory Compliance
//!
//! - `$XDG_CONFIG_HOME/symptom-checker/checker.toml`
//!   (typically `~/.config/symptom-checker/checker.toml`)
//!
//! # Example Configuration
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 7810
//!
//! [backend]
//! api_key = "..."
//! models = ["gemini-2.0-flash-exp", "gemini-1.5-flash", "gemini-1.5-pro"]
//! temperature = 0.2
//! max_output_tokens = 1000
//! call_timeout_secs = 30
//!
//! [storage]
//! database_path = "./database.sqlite"
//!
//! [limits]
//! max_input_length = 1000
//! default_history_limit = 50
//! max_history_limit = 500
//!
//! [pipeline]
//! persistence = "strict"
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::DEFAULT_GEMINI_BASE_URL;
use crate::invoker::CandidateChain;
use crate::pipeline::PersistencePolicy;
use crate::store::DatabaseLocation;

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
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    #[default]
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

/// Server section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerToml {
    /// Bind address
    pub host: Option<String>,

    /// Listen port
    pub port: Option<u16>,
}

/// Backend section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendToml {
    /// Gemini API key
    pub api_key: Option<String>,

    /// API base URL
    pub base_url: Option<String>,

    /// Ordered model candidates
    pub models: Option<Vec<String>>,

    /// Sampling temperature
    pub temperature: Option<f32>,

    /// Output length cap in tokens
    pub max_output_tokens: Option<u32>,

    /// Per-candidate call timeout in seconds
    pub call_timeout_secs: Option<u64>,
}

/// Storage section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageToml {
    /// Database file path, or `:memory:`
    pub database_path: Option<String>,
}

/// Limits section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsToml {
    /// Maximum symptom description length in characters
    pub max_input_length: Option<usize>,

    /// History page size when the client gives none
    pub default_history_limit: Option<usize>,

    /// Largest history page a client may request
    pub max_history_limit: Option<usize>,
}

/// Pipeline section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineToml {
    /// What a persistence failure does to the request
    pub persistence: Option<PersistencePolicy>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckerToml {
    /// Server section
    pub server: ServerToml,

    /// Backend section
    pub backend: BackendToml,

    /// Storage section
    pub storage: StorageToml,

    /// Limits section
    pub limits: LimitsToml,

    /// Pipeline section
    pub pipeline: PipelineToml,
}

// =============================================================================
// Effective Settings
// =============================================================================

/// HTTP listener settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerSettings {
    /// Bind address
    pub host: String,
    /// Listen port
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 7810,
        }
    }
}

/// Generative backend settings
#[derive(Clone, Debug)]
pub struct BackendSettings {
    /// API credential; `None` means no backend is available
    pub api_key: Option<String>,
    /// API base URL
    pub base_url: String,
    /// Ordered model candidates
    pub models: Vec<String>,
    /// Sampling temperature
    pub temperature: f32,
    /// Output length cap in tokens
    pub max_output_tokens: u32,
    /// Per-candidate call timeout
    pub call_timeout: Duration,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            models: CandidateChain::DEFAULT_MODELS
                .iter()
                .map(|m| (*m).to_string())
                .collect(),
            temperature: 0.2,
            max_output_tokens: 1000,
            call_timeout: Duration::from_secs(30),
        }
    }
}

/// Persistence settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageSettings {
    /// Database file path, or `:memory:`
    pub database_path: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            database_path: "./database.sqlite".to_string(),
        }
    }
}

impl StorageSettings {
    /// Where the store should live
    #[must_use]
    pub fn location(&self) -> DatabaseLocation {
        DatabaseLocation::parse(&self.database_path)
    }
}

/// Input and paging limits
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Limits {
    /// Maximum symptom description length in characters
    pub max_input_length: usize,
    /// History page size when the client gives none
    pub default_history_limit: usize,
    /// Largest history page a client may request
    pub max_history_limit: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_input_length: 1000,
            default_history_limit: 50,
            max_history_limit: 500,
        }
    }
}

/// Pipeline behavior settings
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineSettings {
    /// What a persistence failure does to the request
    pub persistence: PersistencePolicy,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Centralized configuration for the symptom checker
///
/// Consolidates configuration from every source and tracks where the
/// effective values came from. Use [`load_config`] to load configuration with
/// proper priority handling.
#[derive(Clone, Debug, Default)]
pub struct CheckerConfig {
    /// HTTP listener
    pub server: ServerSettings,

    /// Generative backend
    pub backend: BackendSettings,

    /// Persistence
    pub storage: StorageSettings,

    /// Input and paging limits
    pub limits: Limits,

    /// Pipeline behavior
    pub pipeline: PipelineSettings,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: ConfigSource,
}

impl CheckerConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Check that the effective values are usable
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "server.port must be non-zero".to_string(),
            ));
        }

        CandidateChain::new(self.backend.models.clone())
            .map_err(|e| ConfigError::ValidationError(format!("backend.models: {e}")))?;

        if !(0.0..=1.0).contains(&self.backend.temperature) {
            return Err(ConfigError::ValidationError(format!(
                "backend.temperature must be within 0.0-1.0, got {}",
                self.backend.temperature
            )));
        }
        if self.backend.call_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "backend.call_timeout_secs must be non-zero".to_string(),
            ));
        }

        let limits = &self.limits;
        for (name, value) in [
            ("limits.max_input_length", limits.max_input_length),
            ("limits.default_history_limit", limits.default_history_limit),
            ("limits.max_history_limit", limits.max_history_limit),
        ] {
            if value == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must be non-zero"
                )));
            }
        }
        if limits.default_history_limit > limits.max_history_limit {
            return Err(ConfigError::ValidationError(format!(
                "limits.default_history_limit ({}) exceeds limits.max_history_limit ({})",
                limits.default_history_limit, limits.max_history_limit
            )));
        }

        if self.storage.database_path.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "storage.database_path must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/symptom-checker/checker.toml` or
/// `~/.config/symptom-checker/checker.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("symptom-checker").join("checker.toml"))
}

/// Load configuration from all sources with proper priority
///
/// CLI overrides are not handled here; apply [`ConfigOverrides`] afterwards.
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed.
/// A missing config file is not an error (defaults are used).
pub fn load_config() -> Result<CheckerConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// # Arguments
///
/// * `path` - Optional path to the configuration file. If `None`, only defaults
///   and environment variables are used.
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<CheckerConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration, reading environment variables through `env`
fn load_config_with_env<F>(path: Option<PathBuf>, env: F) -> Result<CheckerConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = CheckerConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: CheckerToml = toml::from_str(&toml_content)?;
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

    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut CheckerConfig, toml: &CheckerToml) {
    // Server
    if let Some(ref host) = toml.server.host {
        config.server.host = host.clone();
    }
    if let Some(port) = toml.server.port {
        config.server.port = port;
    }

    // Backend
    if let Some(ref key) = toml.backend.api_key {
        config.backend.api_key = non_blank(key);
    }
    if let Some(ref url) = toml.backend.base_url {
        config.backend.base_url = url.clone();
    }
    if let Some(ref models) = toml.backend.models {
        config.backend.models = models.clone();
    }
    if let Some(temperature) = toml.backend.temperature {
        config.backend.temperature = temperature;
    }
    if let Some(tokens) = toml.backend.max_output_tokens {
        config.backend.max_output_tokens = tokens;
    }
    if let Some(secs) = toml.backend.call_timeout_secs {
        config.backend.call_timeout = Duration::from_secs(secs);
    }

    // Storage
    if let Some(ref path) = toml.storage.database_path {
        config.storage.database_path = path.clone();
    }

    // Limits
    if let Some(length) = toml.limits.max_input_length {
        config.limits.max_input_length = length;
    }
    if let Some(limit) = toml.limits.default_history_limit {
        config.limits.default_history_limit = limit;
    }
    if let Some(limit) = toml.limits.max_history_limit {
        config.limits.max_history_limit = limit;
    }

    // Pipeline
    if let Some(policy) = toml.pipeline.persistence {
        config.pipeline.persistence = policy;
    }
}

/// Apply environment variable overrides to the config
fn apply_env_config<F>(config: &mut CheckerConfig, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    // Server
    if let Some(host) = env("HOST") {
        config.server.host = host;
        config.source = ConfigSource::Env;
    }
    if let Some(port) = env("PORT") {
        if let Ok(p) = port.parse::<u16>() {
            config.server.port = p;
            config.source = ConfigSource::Env;
        }
    }

    // Backend
    if let Some(key) = env("GOOGLE_API_KEY") {
        config.backend.api_key = non_blank(&key);
        config.source = ConfigSource::Env;
    }
    if let Some(url) = env("GEMINI_BASE_URL") {
        config.backend.base_url = url;
        config.source = ConfigSource::Env;
    }
    if let Some(models) = env("CHECKER_MODELS") {
        let models = parse_model_list(&models);
        if !models.is_empty() {
            config.backend.models = models;
            config.source = ConfigSource::Env;
        }
    }
    if let Some(timeout) = env("CHECKER_CALL_TIMEOUT_SECS") {
        if let Ok(secs) = timeout.parse::<u64>() {
            config.backend.call_timeout = Duration::from_secs(secs);
            config.source = ConfigSource::Env;
        }
    }

    // Storage; production deployments keep history in memory only
    if env("NODE_ENV").is_some_and(|mode| mode.trim() == "production") {
        config.storage.database_path = ":memory:".to_string();
        config.source = ConfigSource::Env;
    } else if let Some(path) = env("DB_PATH") {
        config.storage.database_path = path;
        config.source = ConfigSource::Env;
    }

    // Limits
    if let Some(length) = env("CHECKER_MAX_INPUT_LENGTH") {
        if let Ok(l) = length.parse::<usize>() {
            config.limits.max_input_length = l;
            config.source = ConfigSource::Env;
        }
    }

    // Pipeline
    if let Some(policy) = env("CHECKER_PERSISTENCE") {
        match policy.parse::<PersistencePolicy>() {
            Ok(p) => {
                config.pipeline.persistence = p;
                config.source = ConfigSource::Env;
            }
            Err(e) => tracing::warn!(value = %policy, error = %e, "Ignoring CHECKER_PERSISTENCE"),
        }
    }
}

/// Split a comma-separated model list, dropping blanks
fn parse_model_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(String::from)
        .collect()
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Bind address override
    pub host: Option<String>,

    /// Port override
    pub port: Option<u16>,

    /// Database location override
    pub database_path: Option<String>,

    /// Model candidate list override (replaces the whole list)
    pub models: Option<Vec<String>>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set bind address override
    #[must_use]
    pub fn with_host(mut self, host: String) -> Self {
        self.host = Some(host);
        self
    }

    /// Set port override
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set database location override
    #[must_use]
    pub fn with_database_path(mut self, path: String) -> Self {
        self.database_path = Some(path);
        self
    }

    /// Set model list override
    #[must_use]
    pub fn with_models(mut self, models: Vec<String>) -> Self {
        self.models = Some(models);
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut CheckerConfig) {
        if self.host.is_some()
            || self.port.is_some()
            || self.database_path.is_some()
            || self.models.is_some()
        {
            config.source = ConfigSource::Cli;
        }

        if let Some(ref host) = self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(ref path) = self.database_path {
            config.storage.database_path = path.clone();
        }
        if let Some(ref models) = self.models {
            config.backend.models = models.clone();
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn write_toml(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    // =========================================================================
    // Default Configuration Tests
    // =========================================================================

    #[test]
    fn test_default_config() {
        let config = CheckerConfig::default();

        assert_eq!(config.server.port, 7810);
        assert!(config.backend.api_key.is_none());
        assert_eq!(
            config.backend.models,
            vec!["gemini-2.0-flash-exp", "gemini-1.5-flash", "gemini-1.5-pro"]
        );
        assert!((config.backend.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(config.backend.max_output_tokens, 1000);
        assert_eq!(config.backend.call_timeout, Duration::from_secs(30));
        assert_eq!(config.limits.max_input_length, 1000);
        assert_eq!(config.limits.default_history_limit, 50);
        assert_eq!(config.pipeline.persistence, PersistencePolicy::Strict);
        assert_eq!(config.source(), ConfigSource::Default);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_config_path() {
        if let Some(p) = default_config_path() {
            assert!(p.to_string_lossy().contains("symptom-checker"));
            assert!(p.to_string_lossy().ends_with("checker.toml"));
        }
    }

    // =========================================================================
    // TOML Parsing Tests
    // =========================================================================

    #[test]
    fn test_parse_valid_toml() {
        let file = write_toml(
            r#"
[server]
host = "127.0.0.1"
port = 9000

[backend]
api_key = "file-key"
models = ["gemini-1.5-pro"]
temperature = 0.5
call_timeout_secs = 5

[storage]
database_path = ":memory:"

[limits]
max_input_length = 2000
max_history_limit = 100

[pipeline]
persistence = "best_effort"
"#,
        );

        let config = load_config_with_env(Some(file.path().to_path_buf()), no_env).unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.backend.api_key.as_deref(), Some("file-key"));
        assert_eq!(config.backend.models, vec!["gemini-1.5-pro"]);
        assert_eq!(config.backend.call_timeout, Duration::from_secs(5));
        assert_eq!(config.storage.location(), DatabaseLocation::Memory);
        assert_eq!(config.limits.max_input_length, 2000);
        assert_eq!(config.limits.max_history_limit, 100);
        // Unspecified values keep defaults
        assert_eq!(config.limits.default_history_limit, 50);
        assert_eq!(config.pipeline.persistence, PersistencePolicy::BestEffort);
        assert_eq!(config.source(), ConfigSource::File);
        assert_eq!(config.config_file_path.as_deref(), Some(file.path()));
    }

    #[test]
    fn test_missing_file_graceful() {
        let path = PathBuf::from("/nonexistent/path/checker.toml");
        let config = load_config_with_env(Some(path), no_env).unwrap();

        assert_eq!(config.source(), ConfigSource::Default);
        assert!(config.config_file_path.is_none());
    }

    #[test]
    fn test_malformed_toml_error() {
        let file = write_toml("[server\nport = \"nope\"\n");

        let result = load_config_with_env(Some(file.path().to_path_buf()), no_env);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_unknown_persistence_policy_is_parse_error() {
        let file = write_toml("[pipeline]\npersistence = \"sometimes\"\n");

        let result = load_config_with_env(Some(file.path().to_path_buf()), no_env);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    // =========================================================================
    // Priority Ordering Tests
    // =========================================================================

    #[test]
    fn test_env_overrides_file() {
        let file = write_toml("[server]\nport = 9000\n\n[storage]\ndatabase_path = \"file.db\"\n");

        let env = env_from(&[
            ("PORT", "9100"),
            ("DB_PATH", ":memory:"),
            ("GOOGLE_API_KEY", "env-key"),
            ("CHECKER_MODELS", "gemini-1.5-flash, gemini-1.5-pro,"),
            ("CHECKER_PERSISTENCE", "best-effort"),
        ]);
        let config = load_config_with_env(Some(file.path().to_path_buf()), env).unwrap();

        assert_eq!(config.server.port, 9100);
        assert_eq!(config.storage.database_path, ":memory:");
        assert_eq!(config.backend.api_key.as_deref(), Some("env-key"));
        assert_eq!(
            config.backend.models,
            vec!["gemini-1.5-flash", "gemini-1.5-pro"]
        );
        assert_eq!(config.pipeline.persistence, PersistencePolicy::BestEffort);
        assert_eq!(config.source(), ConfigSource::Env);
    }

    #[test]
    fn test_env_unparsable_values_ignored() {
        let env = env_from(&[
            ("PORT", "not-a-port"),
            ("CHECKER_CALL_TIMEOUT_SECS", "soon"),
            ("CHECKER_MODELS", " , "),
            ("CHECKER_PERSISTENCE", "sometimes"),
        ]);
        let config = load_config_with_env(None, env).unwrap();

        assert_eq!(config.server.port, 7810);
        assert_eq!(config.backend.call_timeout, Duration::from_secs(30));
        assert_eq!(config.backend.models.len(), 3);
        assert_eq!(config.pipeline.persistence, PersistencePolicy::Strict);
        assert_eq!(config.source(), ConfigSource::Default);
    }

    #[test]
    fn test_production_mode_uses_memory_database() {
        let env = env_from(&[("NODE_ENV", "production"), ("DB_PATH", "/var/lib/checker.db")]);
        let config = load_config_with_env(None, env).unwrap();
        assert_eq!(config.storage.database_path, ":memory:");
        assert_eq!(config.storage.location(), DatabaseLocation::Memory);

        let env = env_from(&[("NODE_ENV", "development"), ("DB_PATH", "/var/lib/checker.db")]);
        let config = load_config_with_env(None, env).unwrap();
        assert_eq!(config.storage.database_path, "/var/lib/checker.db");
    }

    #[test]
    fn test_blank_api_key_means_unconfigured() {
        let config = load_config_with_env(None, env_from(&[("GOOGLE_API_KEY", "  ")])).unwrap();
        assert!(config.backend.api_key.is_none());
    }

    #[test]
    fn test_cli_overrides_env() {
        let mut config =
            load_config_with_env(None, env_from(&[("PORT", "9100"), ("HOST", "10.0.0.1")]))
                .unwrap();
        assert_eq!(config.source(), ConfigSource::Env);

        ConfigOverrides::new()
            .with_port(9200)
            .with_models(vec!["gemini-1.5-pro".to_string()])
            .apply(&mut config);

        assert_eq!(config.server.port, 9200);
        assert_eq!(config.server.host, "10.0.0.1");
        assert_eq!(config.backend.models, vec!["gemini-1.5-pro"]);
        assert_eq!(config.source(), ConfigSource::Cli);
    }

    #[test]
    fn test_config_overrides_empty_no_change() {
        let mut config = CheckerConfig::default();
        ConfigOverrides::new().apply(&mut config);
        assert_eq!(config.source(), ConfigSource::Default);
    }

    // =========================================================================
    // Validation Tests
    // =========================================================================

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = CheckerConfig::default();
        config.backend.models.clear();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));

        let mut config = CheckerConfig::default();
        config.backend.models = vec!["a".into(), "a".into()];
        assert!(config.validate().is_err());

        let mut config = CheckerConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = CheckerConfig::default();
        config.backend.temperature = 1.5;
        assert!(config.validate().is_err());

        let mut config = CheckerConfig::default();
        config.limits.max_input_length = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_input_length"));

        let mut config = CheckerConfig::default();
        config.limits.default_history_limit = 600;
        assert!(config.validate().is_err());

        let mut config = CheckerConfig::default();
        config.backend.call_timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    // =========================================================================
    // Misc
    // =========================================================================

    #[test]
    fn test_config_source_display() {
        assert_eq!(format!("{}", ConfigSource::Cli), "CLI");
        assert_eq!(format!("{}", ConfigSource::Env), "environment");
        assert_eq!(format!("{}", ConfigSource::File), "config file");
        assert_eq!(format!("{}", ConfigSource::Default), "default");
    }

    #[test]
    fn test_toml_round_trip() {
        let original = CheckerToml {
            backend: BackendToml {
                models: Some(vec!["m1".to_string(), "m2".to_string()]),
                call_timeout_secs: Some(12),
                ..Default::default()
            },
            pipeline: PipelineToml {
                persistence: Some(PersistencePolicy::BestEffort),
            },
            ..Default::default()
        };

        let toml_string = toml::to_string(&original).unwrap();
        let parsed: CheckerToml = toml::from_str(&toml_string).unwrap();

        assert_eq!(parsed.backend.models, original.backend.models);
        assert_eq!(parsed.backend.call_timeout_secs, Some(12));
        assert_eq!(
            parsed.pipeline.persistence,
            Some(PersistencePolicy::BestEffort)
        );
    }

    #[test]
    fn test_config_error_display() {
        let read_err = ConfigError::ReadError {
            path: PathBuf::from("/test/path"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        let msg = format!("{read_err}");
        assert!(msg.contains("/test/path"));
        assert!(msg.contains("Failed to read"));
    }
}

//! Configuration loading, validation, and management for medctx.
//!
//! Loads configuration from `~/.medctx/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.medctx/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Aggregation settings (budget, timeouts, cache)
    #[serde(default)]
    pub context: ContextConfig,

    /// Clinical store backend
    #[serde(default)]
    pub store: StoreConfig,

    /// Knowledge base contributor tuning
    #[serde(default)]
    pub knowledge: KnowledgeConfig,

    /// Cross-patient intelligence contributor tuning
    #[serde(default)]
    pub intelligence: IntelligenceConfig,

    /// Service classifier overrides
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Ceiling on the estimated tokens of the consolidated summary
    #[serde(default = "default_token_budget")]
    pub token_budget: usize,

    /// Per-contributor time limit
    #[serde(default = "default_contributor_timeout_ms")]
    pub contributor_timeout_ms: u64,

    /// How long an aggregate stays cached
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Restrict the registered contributors (empty = all built-ins)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enabled_contributors: Vec<String>,
}

fn default_token_budget() -> usize {
    2000
}
fn default_contributor_timeout_ms() -> u64 {
    2000
}
fn default_cache_ttl_secs() -> u64 {
    300
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            token_budget: default_token_budget(),
            contributor_timeout_ms: default_contributor_timeout_ms(),
            cache_ttl_secs: default_cache_ttl_secs(),
            enabled_contributors: vec![],
        }
    }
}

impl ContextConfig {
    pub fn contributor_timeout(&self) -> Duration {
        Duration::from_millis(self.contributor_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// "memory" or "sqlite"
    #[serde(default = "default_store_backend")]
    pub backend: String,

    /// SQLite database path (ignored by the memory backend)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// JSON seed file imported at startup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_file: Option<String>,
}

fn default_store_backend() -> String {
    "memory".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            path: None,
            seed_file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    #[serde(default = "default_specialty_cache_ttl_secs")]
    pub specialty_cache_ttl_secs: u64,

    /// Entries scoring at or below this are not considered relevant
    #[serde(default = "default_min_entry_relevance")]
    pub min_entry_relevance: f64,
}

fn default_specialty_cache_ttl_secs() -> u64 {
    3600
}
fn default_min_entry_relevance() -> f64 {
    0.3
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            specialty_cache_ttl_secs: default_specialty_cache_ttl_secs(),
            min_entry_relevance: default_min_entry_relevance(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntelligenceConfig {
    /// How far back similar cases are searched
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
}

fn default_lookback_days() -> u32 {
    90
}

impl Default for IntelligenceConfig {
    fn default() -> Self {
        Self {
            lookback_days: default_lookback_days(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Measured accuracy per service type (0.0–1.0), overriding built-ins
    #[serde(default)]
    pub accuracy: HashMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    8787
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.medctx/config.toml).
    ///
    /// Environment overrides (highest priority):
    /// - `MEDCTX_TOKEN_BUDGET`
    /// - `MEDCTX_CONTRIBUTOR_TIMEOUT_MS`
    /// - `MEDCTX_CACHE_TTL_SECS`
    /// - `MEDCTX_STORE_PATH`
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_env(&Self::config_dir().join("config.toml"))
    }

    /// Load from `path`, then apply the same environment overrides as
    /// [`AppConfig::load`].
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    fn load_with(
        path: &Path,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env_overrides(lookup)?;
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

    /// Apply overrides from a variable lookup (the process environment in
    /// production, a map in tests).
    fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(v) = lookup("MEDCTX_TOKEN_BUDGET") {
            self.context.token_budget = parse_env("MEDCTX_TOKEN_BUDGET", &v)?;
        }
        if let Some(v) = lookup("MEDCTX_CONTRIBUTOR_TIMEOUT_MS") {
            self.context.contributor_timeout_ms = parse_env("MEDCTX_CONTRIBUTOR_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("MEDCTX_CACHE_TTL_SECS") {
            self.context.cache_ttl_secs = parse_env("MEDCTX_CACHE_TTL_SECS", &v)?;
        }
        if let Some(v) = lookup("MEDCTX_STORE_PATH") {
            self.store.backend = "sqlite".into();
            self.store.path = Some(v);
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".medctx")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.context.token_budget == 0 {
            return Err(ConfigError::ValidationError(
                "context.token_budget must be > 0".into(),
            ));
        }
        if self.context.contributor_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "context.contributor_timeout_ms must be > 0".into(),
            ));
        }
        if self.context.cache_ttl_secs == 0 {
            return Err(ConfigError::ValidationError(
                "context.cache_ttl_secs must be > 0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.knowledge.min_entry_relevance) {
            return Err(ConfigError::ValidationError(
                "knowledge.min_entry_relevance must be between 0.0 and 1.0".into(),
            ));
        }
        if let Some((name, _)) = self
            .classifier
            .accuracy
            .iter()
            .find(|(_, v)| !(0.0..=1.0).contains(*v))
        {
            return Err(ConfigError::ValidationError(format!(
                "classifier.accuracy.{name} must be between 0.0 and 1.0"
            )));
        }
        match self.store.backend.as_str() {
            "memory" => {}
            "sqlite" if self.store.path.is_some() => {}
            "sqlite" => {
                return Err(ConfigError::ValidationError(
                    "store.path is required for the sqlite backend".into(),
                ));
            }
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "unknown store.backend '{other}' (expected 'memory' or 'sqlite')"
                )));
            }
        }
        Ok(())
    }

    /// Generate a default config TOML string (for the `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::ValidationError(format!("{key}='{value}' is not a valid number")))
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

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

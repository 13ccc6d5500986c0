//! Configuration loading for pubrank.
//! Reads pubrank.toml from the current directory or the path in the PUBRANK_CONFIG env var.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const CONFIG_ENV: &str = "PUBRANK_CONFIG";
pub const API_KEY_ENV: &str = "PUBRANK_SCOPUS_API_KEY";
pub const DEFAULT_CONFIG_PATH: &str = "pubrank.toml";

/// Upper bounds accepted by [`Config::validate`]: a century of cache age and
/// retention, a day for any timeout.
pub const MAX_AGE_HOURS: u64 = 100 * 365 * 24;
pub const MAX_RETENTION_DAYS: u64 = 100 * 365;
pub const MAX_TIMEOUT_SECS: u64 = 24 * 3600;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML in config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scopus: ScopusConfig,
    #[serde(default)]
    pub ranking: RankingConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub aggregation: AggregationConfig,
    #[serde(default)]
    pub accounts: AccountsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopusConfig {
    #[serde(default = "default_scopus_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    pub inst_token: Option<String>,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_view")]
    pub view: String,
}

fn default_scopus_url() -> String { "https://api.elsevier.com/content/search/scopus".to_string() }
fn default_page_size()  -> usize  { 25 }
fn default_timeout_secs() -> u64  { 30 }
fn default_view()       -> String { "STANDARD".to_string() }

impl Default for ScopusConfig {
    fn default() -> Self {
        Self {
            base_url: default_scopus_url(),
            api_key: String::new(),
            inst_token: None,
            page_size: default_page_size(),
            request_timeout_secs: default_timeout_secs(),
            view: default_view(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingConfig {
    /// A dataset file, or a directory of yearly `*.csv` files.
    #[serde(default = "default_dataset_path")]
    pub dataset_path: PathBuf,
    #[serde(default = "bool_true")]
    pub require_rankings: bool,
}

fn default_dataset_path() -> PathBuf { PathBuf::from("./data/scimagojr") }
fn bool_true()            -> bool    { true }

impl Default for RankingConfig {
    fn default() -> Self {
        Self { dataset_path: default_dataset_path(), require_rankings: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Memory,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub backend: CacheBackend,
    /// Used by the `json` backend.
    #[serde(default = "default_cache_dir")]
    pub directory: PathBuf,
    #[serde(default = "default_max_age_hours")]
    pub max_age_hours: u64,
    /// Entries older than this are purged on every cache write.
    pub retention_days: Option<u64>,
}

fn default_cache_dir()     -> PathBuf { PathBuf::from("./cache/publications") }
fn default_max_age_hours() -> u64     { 24 }

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::default(),
            directory: default_cache_dir(),
            max_age_hours: default_max_age_hours(),
            retention_days: None,
        }
    }
}

impl CacheConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_hours.saturating_mul(3600))
    }

    pub fn retention(&self) -> Option<Duration> {
        self.retention_days.map(|d| Duration::from_secs(d.saturating_mul(24 * 3600)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// Per-identifier bound on a source call.
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Deadline for a whole aggregation request.
    pub overall_timeout_secs: Option<u64>,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self { request_timeout_secs: default_timeout_secs(), overall_timeout_secs: None }
    }
}

impl AggregationConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn overall_timeout(&self) -> Option<Duration> {
        self.overall_timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountsConfig {
    /// TOML file of `[[accounts]]` entries; no account references resolve without it.
    pub directory_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String { "info".to_string() }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level() }
    }
}


impl Config {
    /// Load configuration from pubrank.toml.
    /// Checks PUBRANK_CONFIG env var first, then current directory.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        if !Path::new(&path).exists() {
            return Err(ConfigError::Invalid(format!(
                "Config file not found: {path}\n\
                 Copy pubrank.example.toml to pubrank.toml and edit it."
            )));
        }

        let mut config = Self::from_path(Path::new(&path))?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply environment overrides. `lookup` is `std::env::var` outside tests.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup(API_KEY_ENV).filter(|k| !k.trim().is_empty()) {
            self.scopus.api_key = key;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scopus.page_size == 0 {
            return Err(ConfigError::Invalid("scopus.page_size must be at least 1".to_string()));
        }
        if self.scopus.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid("scopus.request_timeout_secs must be at least 1".to_string()));
        }
        if self.aggregation.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid("aggregation.request_timeout_secs must be at least 1".to_string()));
        }
        if self.aggregation.overall_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid("aggregation.overall_timeout_secs must be at least 1".to_string()));
        }
        if self.cache.retention_days == Some(0) {
            return Err(ConfigError::Invalid("cache.retention_days must be at least 1".to_string()));
        }
        if self.cache.max_age_hours > MAX_AGE_HOURS {
            return Err(ConfigError::Invalid(format!("cache.max_age_hours must be at most {MAX_AGE_HOURS}")));
        }
        if self.cache.retention_days.is_some_and(|d| d > MAX_RETENTION_DAYS) {
            return Err(ConfigError::Invalid(format!("cache.retention_days must be at most {MAX_RETENTION_DAYS}")));
        }
        for (name, secs) in [
            ("scopus.request_timeout_secs", Some(self.scopus.request_timeout_secs)),
            ("aggregation.request_timeout_secs", Some(self.aggregation.request_timeout_secs)),
            ("aggregation.overall_timeout_secs", self.aggregation.overall_timeout_secs),
        ] {
            if secs.is_some_and(|s| s > MAX_TIMEOUT_SECS) {
                return Err(ConfigError::Invalid(format!("{name} must be at most {MAX_TIMEOUT_SECS}")));
            }
        }
        Ok(())
    }
}

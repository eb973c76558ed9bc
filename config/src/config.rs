//! # Configuration Structures
//!
//! All structures deserialize with defaults for every field, so a partial
//! TOML/YAML file or an empty environment yields a usable in-memory setup.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use strum::{Display, EnumString};
use validator::{Validate, ValidationError};

/// Top-level configuration for the identity bridge.
///
/// ## Fields
/// - `cache`: read-through cache settings (prefix, TTL, backend)
/// - `directory`: directory client behavior (paging, callback URLs)
/// - `provider`: identity provider transport (project, credentials, retry)
/// - `local`: local record store (key column, backend, table)
///
/// ## Validation
/// Nested structures validate their own ranges; the top level checks that a
/// selected backend has its connection URL.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default, PartialEq)]
#[validate(schema(function = "validate_backends"))]
pub struct BridgeConfig {
    #[serde(default)]
    #[validate(nested)]
    pub cache: CacheConfig,

    #[serde(default)]
    #[validate(nested)]
    pub directory: DirectoryConfig,

    #[serde(default)]
    #[validate(nested)]
    pub provider: ProviderConfig,

    #[serde(default)]
    #[validate(nested)]
    pub local: LocalStoreConfig
}

fn validate_backends(config: &BridgeConfig) -> Result<(), ValidationError> {
    if config.cache.backend == CacheBackend::Redis && config.cache.redis_url.is_none() {
        return Err(ValidationError::new("redis_url_required"));
    }
    if config.local.backend == LocalBackend::Postgres && config.local.database_url.is_none() {
        return Err(ValidationError::new("database_url_required"));
    }
    Ok(())
}

fn validate_sql_identifier(value: &str) -> Result<(), ValidationError> {
    if utils::is_valid_sql_identifier(value) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_identifier"))
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum CacheBackend {
    #[default]
    Memory,
    Redis
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum LocalBackend {
    #[default]
    Memory,
    Postgres
}

/// Read-through cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct CacheConfig {
    /// Prefix prepended to every cache key
    #[serde(default = "default_key_prefix")]
    #[validate(length(min = 1, max = 64))]
    pub key_prefix: String,

    /// Time-to-live for finite cache entries (all but the per-entity cache)
    #[serde(default = "default_cache_ttl")]
    #[validate(range(min = 1, max = 604800))]
    pub ttl_seconds: u64,

    #[serde(default)]
    pub backend: CacheBackend,

    #[serde(default)]
    #[validate(url)]
    pub redis_url: Option<String>,

    /// Capacity of the in-memory backend before LRU eviction
    #[serde(default = "default_max_entries")]
    #[validate(range(min = 1))]
    pub max_entries: usize
}

fn default_key_prefix() -> String {
    "fauth".to_string()
}

fn default_cache_ttl() -> u64 {
    3600
}

fn default_max_entries() -> usize {
    10000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            key_prefix: default_key_prefix(),
            ttl_seconds: default_cache_ttl(),
            backend: CacheBackend::default(),
            redis_url: None,
            max_entries: default_max_entries()
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

/// Directory client configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct DirectoryConfig {
    /// Page size used when listing the whole directory
    #[serde(default = "default_page_size")]
    #[validate(range(min = 1, max = 1000))]
    pub page_size: u32,

    /// Maximum keys per batched delete
    #[serde(default = "default_delete_batch_size")]
    #[validate(range(min = 1, max = 1000))]
    pub delete_batch_size: usize,

    /// Continue URL attached to password reset emails
    #[serde(default)]
    #[validate(url)]
    pub login_url: Option<String>,

    /// Callback URL attached to verification emails
    #[serde(default)]
    #[validate(url)]
    pub verify_url: Option<String>,

    #[serde(default = "default_verify_link_ttl")]
    #[validate(range(min = 60, max = 604800))]
    pub verify_link_ttl_seconds: u64
}

fn default_page_size() -> u32 {
    500
}

fn default_delete_batch_size() -> usize {
    1000
}

fn default_verify_link_ttl() -> u64 {
    3600
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            delete_batch_size: default_delete_batch_size(),
            login_url: None,
            verify_url: None,
            verify_link_ttl_seconds: default_verify_link_ttl()
        }
    }
}

impl DirectoryConfig {
    pub fn verify_link_ttl(&self) -> Duration {
        Duration::from_secs(self.verify_link_ttl_seconds)
    }
}

/// Identity provider transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct ProviderConfig {
    #[serde(default)]
    pub project_id: String,

    /// Web API key, required for password sign-in
    #[serde(default)]
    pub api_key: Option<String>,

    /// OAuth2 bearer token for the admin endpoints
    #[serde(default)]
    pub access_token: Option<String>,

    #[serde(default = "default_base_url")]
    #[validate(url)]
    pub base_url: String,

    #[serde(default = "default_timeout")]
    #[validate(range(min = 1, max = 300))]
    pub timeout_seconds: u64,

    #[serde(default)]
    #[validate(nested)]
    pub retry: RetryConfig
}

fn default_base_url() -> String {
    "https://identitytoolkit.googleapis.com".to_string()
}

fn default_timeout() -> u64 {
    30
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            api_key: None,
            access_token: None,
            base_url: default_base_url(),
            timeout_seconds: default_timeout(),
            retry: RetryConfig::default()
        }
    }
}

impl ProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Transport retry policy for rate-limited and 5xx responses.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    #[validate(range(max = 10))]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff")]
    #[validate(range(min = 1))]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff")]
    #[validate(range(min = 1))]
    pub max_backoff_ms: u64
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff() -> u64 {
    100
}

fn default_max_backoff() -> u64 {
    5000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff()
        }
    }
}

/// Local record store configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct LocalStoreConfig {
    /// Local column holding the identity key
    #[serde(default = "default_key_name")]
    #[validate(custom(function = "validate_sql_identifier"))]
    pub key_name: String,

    #[serde(default)]
    pub backend: LocalBackend,

    #[serde(default)]
    pub database_url: Option<String>,

    #[serde(default = "default_table")]
    #[validate(custom(function = "validate_sql_identifier"))]
    pub table: String
}

fn default_key_name() -> String {
    "uid".to_string()
}

fn default_table() -> String {
    "identity_users".to_string()
}

impl Default for LocalStoreConfig {
    fn default() -> Self {
        Self {
            key_name: default_key_name(),
            backend: LocalBackend::default(),
            database_url: None,
            table: default_table()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = BridgeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cache.key_prefix, "fauth");
        assert_eq!(config.cache.ttl(), Duration::from_secs(3600));
        assert_eq!(config.local.key_name, "uid");
        assert_eq!(config.directory.page_size, 500);
    }

    #[test]
    fn test_redis_backend_requires_url() {
        let mut config = BridgeConfig::default();
        config.cache.backend = CacheBackend::Redis;
        assert!(config.validate().is_err());

        config.cache.redis_url = Some("redis://localhost:6379".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_postgres_backend_requires_database_url() {
        let mut config = BridgeConfig::default();
        config.local.backend = LocalBackend::Postgres;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_table_name_rejected() {
        let mut config = BridgeConfig::default();
        config.local.table = "users; drop table users".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_out_of_range_values_rejected() {
        let mut config = BridgeConfig::default();
        config.directory.page_size = 0;
        assert!(config.validate().is_err());

        let mut config = BridgeConfig::default();
        config.provider.retry.max_retries = 50;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backend_parsing() {
        assert_eq!("Redis".parse::<CacheBackend>().unwrap(), CacheBackend::Redis);
        assert_eq!("postgres".parse::<LocalBackend>().unwrap(), LocalBackend::Postgres);
        assert!("sqlite".parse::<LocalBackend>().is_err());
    }
}

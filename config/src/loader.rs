//! # Environment Variable Loader
//!
//! Loads configuration from `IDP_*` environment variables following
//! 12-factor app principles. Unset variables keep their defaults.

use crate::config::{
    BridgeConfig, CacheConfig, DirectoryConfig, LocalStoreConfig, ProviderConfig, RetryConfig
};
use std::env;

/// Load configuration from environment variables.
///
/// ## Environment Variables
/// ### Cache (`IDP_CACHE_*`)
/// - `IDP_CACHE_PREFIX`: cache key prefix (default: "fauth")
/// - `IDP_CACHE_TTL_SECONDS`: finite entry TTL (default: 3600)
/// - `IDP_CACHE_BACKEND`: memory/redis (default: memory)
/// - `IDP_CACHE_MAX_ENTRIES`: in-memory capacity (default: 10000)
/// - `IDP_REDIS_URL`: Redis connection URL
///
/// ### Directory
/// - `IDP_PAGE_SIZE`: listing page size (default: 500)
/// - `IDP_DELETE_BATCH_SIZE`: keys per batched delete (default: 1000)
/// - `IDP_LOGIN_URL`: password reset continue URL
/// - `IDP_VERIFY_URL`: verification callback URL
/// - `IDP_VERIFY_LINK_TTL_SECONDS`: verification link lifetime (default: 3600)
///
/// ### Provider
/// - `IDP_PROJECT_ID`, `IDP_API_KEY`, `IDP_ACCESS_TOKEN`
/// - `IDP_BASE_URL`: API base (default: Identity Toolkit)
/// - `IDP_TIMEOUT_SECONDS`: request timeout (default: 30)
/// - `IDP_MAX_RETRIES`: retries for rate-limited/5xx responses (default: 3)
///
/// ### Local store
/// - `IDP_KEY_NAME`: local identity key column (default: "uid")
/// - `IDP_LOCAL_BACKEND`: memory/postgres (default: memory)
/// - `IDP_DATABASE_URL`: PostgreSQL URL
/// - `IDP_LOCAL_TABLE`: table name (default: "identity_users")
pub fn load_from_env() -> Result<BridgeConfig, Box<dyn std::error::Error>> {
    let config = BridgeConfig {
        cache: load_cache_from_env()?,
        directory: load_directory_from_env()?,
        provider: load_provider_from_env()?,
        local: load_local_from_env()?
    };

    Ok(config)
}

fn load_cache_from_env() -> Result<CacheConfig, Box<dyn std::error::Error>> {
    let defaults = CacheConfig::default();
    Ok(CacheConfig {
        key_prefix: env::var("IDP_CACHE_PREFIX").unwrap_or(defaults.key_prefix),
        ttl_seconds: parse_optional_env("IDP_CACHE_TTL_SECONDS")?.unwrap_or(defaults.ttl_seconds),
        backend: parse_optional_env("IDP_CACHE_BACKEND")?.unwrap_or(defaults.backend),
        redis_url: env::var("IDP_REDIS_URL").ok(),
        max_entries: parse_optional_env("IDP_CACHE_MAX_ENTRIES")?.unwrap_or(defaults.max_entries)
    })
}

fn load_directory_from_env() -> Result<DirectoryConfig, Box<dyn std::error::Error>> {
    let defaults = DirectoryConfig::default();
    Ok(DirectoryConfig {
        page_size: parse_optional_env("IDP_PAGE_SIZE")?.unwrap_or(defaults.page_size),
        delete_batch_size: parse_optional_env("IDP_DELETE_BATCH_SIZE")?
            .unwrap_or(defaults.delete_batch_size),
        login_url: env::var("IDP_LOGIN_URL").ok(),
        verify_url: env::var("IDP_VERIFY_URL").ok(),
        verify_link_ttl_seconds: parse_optional_env("IDP_VERIFY_LINK_TTL_SECONDS")?
            .unwrap_or(defaults.verify_link_ttl_seconds)
    })
}

fn load_provider_from_env() -> Result<ProviderConfig, Box<dyn std::error::Error>> {
    let defaults = ProviderConfig::default();
    Ok(ProviderConfig {
        project_id: env::var("IDP_PROJECT_ID").unwrap_or_default(),
        api_key: env::var("IDP_API_KEY").ok(),
        access_token: env::var("IDP_ACCESS_TOKEN").ok(),
        base_url: env::var("IDP_BASE_URL").unwrap_or(defaults.base_url),
        timeout_seconds: parse_optional_env("IDP_TIMEOUT_SECONDS")?
            .unwrap_or(defaults.timeout_seconds),
        retry: RetryConfig {
            max_retries: parse_optional_env("IDP_MAX_RETRIES")?
                .unwrap_or(defaults.retry.max_retries),
            ..defaults.retry
        }
    })
}

fn load_local_from_env() -> Result<LocalStoreConfig, Box<dyn std::error::Error>> {
    let defaults = LocalStoreConfig::default();
    Ok(LocalStoreConfig {
        key_name: env::var("IDP_KEY_NAME").unwrap_or(defaults.key_name),
        backend: parse_optional_env("IDP_LOCAL_BACKEND")?.unwrap_or(defaults.backend),
        database_url: env::var("IDP_DATABASE_URL").ok(),
        table: env::var("IDP_LOCAL_TABLE").unwrap_or(defaults.table)
    })
}

/// Parses `key` when set; a set-but-malformed value is an error.
fn parse_optional_env<T>(key: &str) -> Result<Option<T>, Box<dyn std::error::Error>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + 'static
{
    match env::var(key) {
        Ok(s) => s
            .parse::<T>()
            .map(Some)
            .map_err(|e| format!("invalid value for {key}: {e}").into()),
        Err(_) => Ok(None)
    }
}

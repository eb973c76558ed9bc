//! # Storage Layer
//!
//! Cache and local-record backends for the identity bridge.
//!
//! - [`InMemoryCacheStore`] and [`RedisCacheStore`] implement
//!   [`idp_core::CacheStore`]
//! - [`InMemoryLocalStore`] and [`PostgresLocalStore`] implement
//!   [`idp_core::LocalStore`]
//!
//! [`connect_cache`] and [`connect_local`] build the backend selected in
//! configuration.

pub mod cache;
pub mod local;
pub mod postgres;
pub mod redis;

pub use cache::InMemoryCacheStore;
pub use local::InMemoryLocalStore;
pub use postgres::PostgresLocalStore;
pub use redis::RedisCacheStore;

use config::{CacheBackend, CacheConfig, LocalBackend, LocalStoreConfig};
use errors::{CacheError, StorageError};
use idp_core::{CacheStore, LocalStore};
use std::sync::Arc;

/// Builds the cache backend selected by `config.backend`.
pub async fn connect_cache(config: &CacheConfig) -> Result<Arc<dyn CacheStore>, CacheError> {
    match config.backend {
        CacheBackend::Memory => Ok(Arc::new(InMemoryCacheStore::with_max_entries(
            config.max_entries
        ))),
        CacheBackend::Redis => {
            let url = config
                .redis_url
                .as_deref()
                .ok_or_else(|| CacheError::Connection {
                    backend: "Redis".to_string(),
                    reason: "redis_url is not configured".to_string()
                })?;
            let store = RedisCacheStore::new(url).await?;
            tracing::info!("Connected Redis cache store");
            Ok(Arc::new(store))
        }
    }
}

/// Builds the local store selected by `config.backend`, creating the table
/// when the Postgres backend is used.
pub async fn connect_local(config: &LocalStoreConfig) -> Result<Arc<dyn LocalStore>, StorageError> {
    match config.backend {
        LocalBackend::Memory => Ok(Arc::new(InMemoryLocalStore::new())),
        LocalBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .ok_or_else(|| StorageError::ConnectionError {
                    backend: "PostgreSQL".to_string(),
                    reason: "database_url is not configured".to_string()
                })?;
            let store = PostgresLocalStore::connect(url, &config.table).await?;
            store.initialize_schema().await?;
            tracing::info!(table = %config.table, "Initialized PostgreSQL local store");
            Ok(Arc::new(store))
        }
    }
}

//! Redis-backed cache store.

use async_trait::async_trait;
use errors::CacheError;
use idp_core::CacheStore;
use redis::AsyncCommands;
use std::time::Duration;

const BACKEND: &str = "Redis";

fn operation_error(e: &redis::RedisError) -> CacheError {
    CacheError::Operation {
        backend: BACKEND.to_string(),
        reason: e.to_string()
    }
}

/// Cache store over a shared Redis connection manager.
///
/// Finite entries use `SETEX` (rounded up to a whole second); indefinite
/// entries use a plain `SET`.
pub struct RedisCacheStore {
    connection_manager: redis::aio::ConnectionManager
}

impl RedisCacheStore {
    pub async fn new(connection_string: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(connection_string).map_err(|e| CacheError::Connection {
            backend: BACKEND.to_string(),
            reason: e.to_string()
        })?;

        let connection_manager =
            client
                .get_connection_manager()
                .await
                .map_err(|e| CacheError::Connection {
                    backend: BACKEND.to_string(),
                    reason: e.to_string()
                })?;

        Ok(Self { connection_manager })
    }
}

fn ttl_seconds(ttl: Duration) -> u64 {
    let secs = ttl.as_secs();
    if ttl.subsec_nanos() > 0 || secs == 0 {
        secs + 1
    } else {
        secs
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection_manager.clone();
        conn.get(key).await.map_err(|e| operation_error(&e))
    }

    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        let mut conn = self.connection_manager.clone();
        match ttl {
            Some(ttl) => conn
                .set_ex::<_, _, ()>(key, value, ttl_seconds(ttl))
                .await
                .map_err(|e| operation_error(&e)),
            None => conn
                .set::<_, _, ()>(key, value)
                .await
                .map_err(|e| operation_error(&e))
        }
    }

    async fn forget(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.connection_manager.clone();
        let removed: i64 = conn.del(key).await.map_err(|e| operation_error(&e))?;
        Ok(removed > 0)
    }
}

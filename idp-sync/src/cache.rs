//! Read-through cache over an injected [`CacheStore`].

use crate::telemetry;
use dashmap::DashMap;
use errors::{CacheError, IdentityResult};
use idp_core::CacheStore;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Keyed read-through cache for identity data.
///
/// Values are stored as JSON. A failing cache backend never fails a read: the
/// lookup is logged and the value is computed live. Explicit invalidation
/// ([`forget`](Self::forget)) does propagate backend errors, since a silently
/// missed invalidation would leave stale data behind.
///
/// Concurrent misses on the same key inside one process are collapsed: the
/// first caller computes while the others wait on a per-key lock and then
/// read the stored value.
pub struct ReadThroughCache {
    store: Arc<dyn CacheStore>,
    prefix: String,
    ttl: Duration,
    inflight: DashMap<String, Arc<Mutex<()>>>
}

impl ReadThroughCache {
    pub fn new(store: Arc<dyn CacheStore>, prefix: impl Into<String>, ttl: Duration) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            ttl,
            inflight: DashMap::new()
        }
    }

    pub fn from_config(store: Arc<dyn CacheStore>, config: &config::CacheConfig) -> Self {
        Self::new(store, config.key_prefix.clone(), config.ttl())
    }

    /// Time-to-live applied to every finite entry.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Per-entity key for an identity record.
    pub fn identity_key(&self, key: &str) -> String {
        format!("{}:user:{key}", self.prefix)
    }

    /// Key of the email-to-identity-key lookup.
    pub fn email_key(&self, email: &str) -> String {
        format!("{}:email:{}", self.prefix, email.to_lowercase())
    }

    /// Deterministic key for an operation and its argument list.
    pub fn fingerprint_key<A: Serialize + ?Sized>(
        &self,
        operation: &str,
        args: &A
    ) -> IdentityResult<String> {
        let fingerprint =
            utils::fingerprint(operation, args).map_err(|e| CacheError::Serialization {
                reason: e.to_string()
            })?;
        Ok(format!("{}:{fingerprint}", self.prefix))
    }

    /// Returns the cached value for `key` or computes, stores (for `ttl`) and
    /// returns it. Errors from `compute` are returned and nothing is stored.
    pub async fn remember<T, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        compute: F
    ) -> IdentityResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = IdentityResult<T>>
    {
        self.read_through(key, Some(ttl), compute, |_| true).await
    }

    /// Like [`remember`](Self::remember) without expiry. Empty results are
    /// not stored, so a record created later is picked up on the next read.
    pub async fn remember_forever<T, F, Fut>(
        &self,
        key: &str,
        compute: F
    ) -> IdentityResult<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = IdentityResult<Option<T>>>
    {
        self.read_through(key, None, compute, Option::is_some).await
    }

    /// Removes `key`, returning whether an entry existed.
    pub async fn forget(&self, key: &str) -> IdentityResult<bool> {
        let removed = self.store.forget(key).await?;
        debug!(key, removed, "Cache entry invalidated");
        Ok(removed)
    }

    async fn read_through<T, F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        compute: F,
        should_store: fn(&T) -> bool
    ) -> IdentityResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = IdentityResult<T>>
    {
        let operation = self.operation_label(key).to_string();

        if let Some(value) = self.lookup(key).await {
            telemetry::record_cache_hit(&operation);
            return Ok(value);
        }

        let lock = self
            .inflight
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock().await;

        let result = match self.lookup(key).await {
            Some(value) => {
                telemetry::record_cache_hit(&operation);
                Ok(value)
            }
            None => {
                telemetry::record_cache_miss(&operation);
                debug!(key, "Cache miss");
                let computed = compute().await;
                if let Ok(value) = &computed
                    && should_store(value)
                {
                    self.store_value(key, value, ttl).await;
                }
                computed
            }
        };

        drop(guard);
        drop(lock);
        self.inflight
            .remove_if(key, |_, lock| Arc::strong_count(lock) == 1);

        result
    }

    async fn lookup<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.store.get(key).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(key, error = %e, "Cache lookup failed, reading live");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "Discarding undecodable cache entry");
                None
            }
        }
    }

    async fn store_value<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key, error = %e, "Failed to encode cache entry");
                return;
            }
        };

        if let Err(e) = self.store.put(key, &raw, ttl).await {
            warn!(key, error = %e, "Failed to store cache entry");
        }
    }

    /// Metric label: the key segment after the prefix (`user`, `email`,
    /// `find_many`, ...).
    fn operation_label<'a>(&self, key: &'a str) -> &'a str {
        key.strip_prefix(self.prefix.as_str())
            .and_then(|rest| rest.strip_prefix(':'))
            .and_then(|rest| rest.split(':').next())
            .unwrap_or("other")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use storage::InMemoryCacheStore;

    fn cache() -> ReadThroughCache {
        ReadThroughCache::new(
            Arc::new(InMemoryCacheStore::new()),
            "fauth",
            Duration::from_secs(60)
        )
    }

    #[tokio::test]
    async fn test_remember_computes_once() {
        let cache = cache();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value: Vec<String> = cache
                .remember("fauth:query:abc", cache.ttl(), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(vec!["u1".to_string()])
                })
                .await
                .unwrap();
            assert_eq!(value, vec!["u1"]);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_remember_does_not_store_errors() {
        let cache = cache();

        let failed: IdentityResult<u32> = cache
            .remember("fauth:count", cache.ttl(), || async {
                Err(errors::IdentityError::validation("x", "boom"))
            })
            .await;
        assert!(failed.is_err());

        let value: u32 = cache
            .remember("fauth:count", cache.ttl(), || async { Ok(5) })
            .await
            .unwrap();
        assert_eq!(value, 5);
    }

    #[tokio::test]
    async fn test_remember_stores_null_marker() {
        let cache = cache();
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            let value: Option<String> = cache
                .remember("fauth:email:none@ex.com", cache.ttl(), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(None)
                })
                .await
                .unwrap();
            assert!(value.is_none());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_remember_forever_skips_empty_results() {
        let cache = cache();
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            let value: Option<String> = cache
                .remember_forever("fauth:user:u1", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(None)
                })
                .await
                .unwrap();
            assert!(value.is_none());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let stored: Option<String> = cache
            .remember_forever("fauth:user:u1", || async { Ok(Some("u1".to_string())) })
            .await
            .unwrap();
        assert_eq!(stored.as_deref(), Some("u1"));

        let cached: Option<String> = cache
            .remember_forever("fauth:user:u1", || async { Ok(Some("other".to_string())) })
            .await
            .unwrap();
        assert_eq!(cached.as_deref(), Some("u1"));
    }

    #[tokio::test]
    async fn test_forget_forces_recompute() {
        let cache = cache();
        let key = cache.identity_key("u1");

        let _: Option<u32> = cache.remember_forever(&key, || async { Ok(Some(1)) }).await.unwrap();
        assert!(cache.forget(&key).await.unwrap());
        assert!(!cache.forget(&key).await.unwrap());

        let value: Option<u32> = cache.remember_forever(&key, || async { Ok(Some(2)) }).await.unwrap();
        assert_eq!(value, Some(2));
    }

    #[tokio::test]
    async fn test_concurrent_misses_compute_once() {
        let cache = Arc::new(cache());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .remember("fauth:search:same", Duration::from_secs(60), || async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(42u32)
                    })
                    .await
                    .unwrap()
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.inflight.is_empty());
    }

    #[test]
    fn test_keys() {
        let cache = cache();
        assert_eq!(cache.identity_key("u1"), "fauth:user:u1");
        assert_eq!(cache.email_key("A@Ex.com"), "fauth:email:a@ex.com");

        let a = cache.fingerprint_key("find_many", &["u1", "u2"]).unwrap();
        let b = cache.fingerprint_key("find_many", &["u1", "u2"]).unwrap();
        let c = cache.fingerprint_key("find_many", &["u2", "u1"]).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("fauth:find_many:"));
        assert_eq!(cache.operation_label(&a), "find_many");
        assert_eq!(cache.operation_label("elsewhere"), "other");
    }
}

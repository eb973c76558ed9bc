//! In-process cache store with per-entry expiry and LRU eviction.

use async_trait::async_trait;
use errors::CacheError;
use idp_core::CacheStore;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::RwLock;

struct Entry {
    value: String,
    /// Unix timestamp in milliseconds; `None` never expires
    expires_at: Option<i64>
}

impl Entry {
    fn is_live(&self, now: i64) -> bool {
        self.expires_at.is_none_or(|expires_at| now < expires_at)
    }
}

pub struct InMemoryCacheStore {
    entries: RwLock<HashMap<String, Entry>>,
    access_order: RwLock<VecDeque<String>>,
    max_entries: usize
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::with_max_entries(10000)
    }

    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            access_order: RwLock::new(VecDeque::new()),
            max_entries: max_entries.max(1)
        }
    }

    pub async fn len(&self) -> usize {
        let now = chrono::Utc::now().timestamp_millis();
        self.entries
            .read()
            .await
            .values()
            .filter(|e| e.is_live(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn evict_lru_if_needed(&self, incoming: &str) {
        let entries = self.entries.read().await;
        if entries.len() < self.max_entries || entries.contains_key(incoming) {
            return;
        }
        drop(entries);

        let mut entries = self.entries.write().await;
        let mut access_order = self.access_order.write().await;

        while entries.len() >= self.max_entries {
            if let Some(oldest_key) = access_order.pop_front() {
                entries.remove(&oldest_key);
            } else {
                break;
            }
        }
    }

    async fn touch(&self, key: &str) {
        let mut access_order = self.access_order.write().await;
        access_order.retain(|k| k != key);
        access_order.push_back(key.to_string());
    }
}

impl Default for InMemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = chrono::Utc::now().timestamp_millis();
        let entries = self.entries.read().await;
        let found = entries
            .get(key)
            .map(|entry| (entry.is_live(now), entry.value.clone()));
        drop(entries);

        let value = match found {
            Some((true, value)) => value,
            Some((false, _)) => {
                self.forget(key).await?;
                return Ok(None);
            }
            None => return Ok(None)
        };

        self.touch(key).await;
        Ok(Some(value))
    }

    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        self.evict_lru_if_needed(key).await;

        let expires_at = ttl.map(|ttl| {
            chrono::Utc::now().timestamp_millis()
                + i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX / 2)
        });

        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at
            }
        );
        drop(entries);

        self.touch(key).await;
        Ok(())
    }

    async fn forget(&self, key: &str) -> Result<bool, CacheError> {
        let mut entries = self.entries.write().await;
        let removed = entries.remove(key).is_some();
        drop(entries);

        let mut access_order = self.access_order.write().await;
        access_order.retain(|k| k != key);
        Ok(removed)
    }
}

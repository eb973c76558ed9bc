//! Local entity repository with explicit lifecycle hook points.

use crate::cache::ReadThroughCache;
use crate::directory::IdentityDirectory;
use crate::entity::LocalRecord;
use crate::hook::IdentitySync;
use async_trait::async_trait;
use errors::{IdentityError, IdentityResult};
use idp_core::LocalStore;
use std::sync::Arc;
use tracing::debug;

/// Callbacks around the local record lifecycle.
///
/// `saving` and `deleting` run before the local write; an error aborts it.
#[async_trait]
pub trait LifecycleHook: Send + Sync {
    async fn retrieved(&self, _record: &mut LocalRecord) -> IdentityResult<()> {
        Ok(())
    }

    async fn saving(&self, _record: &mut LocalRecord) -> IdentityResult<()> {
        Ok(())
    }

    async fn saved(&self, _record: &mut LocalRecord) -> IdentityResult<()> {
        Ok(())
    }

    async fn deleting(&self, _record: &mut LocalRecord) -> IdentityResult<()> {
        Ok(())
    }

    async fn deleted(&self, _record: &LocalRecord) -> IdentityResult<()> {
        Ok(())
    }
}

struct EmailLookup {
    directory: Arc<dyn IdentityDirectory>,
    cache: Arc<ReadThroughCache>
}

/// Loads, saves and deletes [`LocalRecord`]s, running registered hooks in
/// registration order.
pub struct EntityRepository {
    store: Arc<dyn LocalStore>,
    key_name: String,
    hooks: Vec<Arc<dyn LifecycleHook>>,
    lookup: Option<EmailLookup>
}

impl EntityRepository {
    pub fn new(store: Arc<dyn LocalStore>, key_name: impl Into<String>) -> Self {
        Self {
            store,
            key_name: key_name.into(),
            hooks: Vec::new(),
            lookup: None
        }
    }

    /// Repository kept in sync with `directory`: registers [`IdentitySync`]
    /// and enables [`find_by_email`](Self::find_by_email).
    pub fn synced(
        store: Arc<dyn LocalStore>,
        key_name: impl Into<String>,
        directory: Arc<dyn IdentityDirectory>,
        cache: Arc<ReadThroughCache>
    ) -> Self {
        let sync = Arc::new(IdentitySync::new(directory.clone(), cache.clone()));
        Self::new(store, key_name)
            .with_hook(sync)
            .with_email_lookup(directory, cache)
    }

    pub fn with_hook(mut self, hook: Arc<dyn LifecycleHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn with_email_lookup(
        mut self,
        directory: Arc<dyn IdentityDirectory>,
        cache: Arc<ReadThroughCache>
    ) -> Self {
        self.lookup = Some(EmailLookup { directory, cache });
        self
    }

    pub fn key_name(&self) -> &str {
        &self.key_name
    }

    /// A fresh, unsaved record.
    pub fn new_record(&self) -> LocalRecord {
        LocalRecord::new(self.key_name.clone())
    }

    pub async fn find_by_key(&self, key: &str) -> IdentityResult<Option<LocalRecord>> {
        if key.is_empty() {
            return Ok(None);
        }
        let Some(row) = self.store.find_by(&self.key_name, key).await? else {
            return Ok(None);
        };

        let mut record = LocalRecord::from_row(self.key_name.clone(), row);
        for hook in &self.hooks {
            hook.retrieved(&mut record).await?;
        }
        Ok(Some(record))
    }

    /// Resolves the identity key for `email` through the directory, then
    /// loads the local record by key.
    ///
    /// With `use_cache`, the resolved key (or its absence) is remembered for
    /// the cache TTL.
    pub async fn find_by_email(
        &self,
        email: &str,
        use_cache: bool
    ) -> IdentityResult<Option<LocalRecord>> {
        let lookup = self.lookup.as_ref().ok_or_else(|| {
            IdentityError::validation("directory", "No identity directory is registered.")
        })?;
        if email.is_empty() {
            return Ok(None);
        }

        let resolve = || async {
            Ok::<_, IdentityError>(
                lookup
                    .directory
                    .find_by_email(email)
                    .await?
                    .map(|record| record.key)
            )
        };

        let key: Option<String> = if use_cache {
            let cache_key = lookup.cache.email_key(email);
            lookup
                .cache
                .remember(&cache_key, lookup.cache.ttl(), resolve)
                .await?
        } else {
            resolve().await?
        };

        match key {
            Some(key) => self.find_by_key(&key).await,
            None => Ok(None)
        }
    }

    /// Runs `saving` hooks, persists, then runs `saved` hooks. A failing
    /// `saving` hook leaves the store untouched.
    pub async fn save(&self, record: &mut LocalRecord) -> IdentityResult<()> {
        for hook in &self.hooks {
            hook.saving(record).await?;
        }

        let row = self.store.save(record.attributes()).await?;
        record.set_raw_attributes(row, true);
        record.mark_exists(true);
        debug!(id = ?record.id(), "Local record saved");

        for hook in &self.hooks {
            hook.saved(record).await?;
        }
        Ok(())
    }

    /// Runs `deleting` hooks, removes the row, then runs `deleted` hooks.
    pub async fn delete(&self, record: &mut LocalRecord) -> IdentityResult<bool> {
        for hook in &self.hooks {
            hook.deleting(record).await?;
        }

        let removed = self.store.delete(record.attributes()).await?;
        record.mark_exists(false);
        debug!(id = ?record.id(), removed, "Local record deleted");

        for hook in &self.hooks {
            hook.deleted(record).await?;
        }
        Ok(removed)
    }
}

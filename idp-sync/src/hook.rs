//! Keeps local records and directory identities consistent.

use crate::cache::ReadThroughCache;
use crate::directory::{DeleteTarget, IdentityDirectory};
use crate::entity::LocalRecord;
use crate::mapper::AttributeMapper;
use crate::repository::LifecycleHook;
use crate::telemetry;
use async_trait::async_trait;
use errors::IdentityResult;
use std::sync::Arc;
use tracing::{debug, warn};

/// Lifecycle hook synchronizing a local record with its identity.
///
/// - `retrieved`: attaches the identity, cached without expiry under the
///   record's key
/// - `saving`: always upserts the changed remote-owned fields (an unknown
///   key becomes a create), adopts the canonical key and strips
///   remote-owned fields from the local payload
/// - `deleting`: deletes the identity before the local row goes
///
/// Cache entries are invalidated only after the directory accepted the
/// write. Directory failures propagate and abort the local write; a failed
/// invalidation after a committed save is logged and the save proceeds.
pub struct IdentitySync {
    directory: Arc<dyn IdentityDirectory>,
    cache: Arc<ReadThroughCache>
}

impl IdentitySync {
    pub fn new(directory: Arc<dyn IdentityDirectory>, cache: Arc<ReadThroughCache>) -> Self {
        Self { directory, cache }
    }

    /// Upserts even when nothing remote-owned changed, so a stale key is
    /// recreated under a fresh canonical key.
    async fn sync_before_save(&self, record: &mut LocalRecord) -> IdentityResult<()> {
        let changes = AttributeMapper::to_remote(&record.dirty());
        let current_key = record.key().map(str::to_string);

        let identity = self
            .directory
            .upsert(current_key.as_deref(), &changes)
            .await?;

        if current_key.as_deref() != Some(identity.key.as_str()) {
            debug!(
                old_key = ?current_key,
                new_key = %identity.key,
                "Adopting canonical identity key"
            );
            record.set_key(identity.key.clone());
        }

        if let Some(old_key) = &current_key {
            self.invalidate_committed(old_key).await;
        }
        self.invalidate_committed(&identity.key).await;

        record.attach_identity(Some(identity));
        record.strip_remote_owned();
        Ok(())
    }

    /// The directory write has already committed, so a failed invalidation
    /// must not abort the local write.
    async fn invalidate_committed(&self, key: &str) {
        if let Err(e) = self.cache.forget(&self.cache.identity_key(key)).await {
            warn!(key, error = %e, "Failed to invalidate identity cache after directory write");
        }
    }

    async fn sync_before_delete(&self, record: &LocalRecord) -> IdentityResult<()> {
        let Some(key) = record.key() else {
            return Ok(());
        };
        self.directory.delete(DeleteTarget::from(key)).await?;
        self.invalidate_committed(key).await;
        Ok(())
    }
}

#[async_trait]
impl LifecycleHook for IdentitySync {
    async fn retrieved(&self, record: &mut LocalRecord) -> IdentityResult<()> {
        if record.has_identity() {
            return Ok(());
        }
        let Some(key) = record.key().map(str::to_string) else {
            return Ok(());
        };

        let identity = self
            .cache
            .remember_forever(&self.cache.identity_key(&key), || self.directory.find(&key))
            .await;
        telemetry::record_hook_event("retrieved", identity.is_ok());

        record.attach_identity(identity?);
        Ok(())
    }

    async fn saving(&self, record: &mut LocalRecord) -> IdentityResult<()> {
        let result = self.sync_before_save(record).await;
        telemetry::record_hook_event("saving", result.is_ok());
        result
    }

    async fn deleting(&self, record: &mut LocalRecord) -> IdentityResult<()> {
        let result = self.sync_before_delete(record).await;
        telemetry::record_hook_event("deleting", result.is_ok());
        result
    }
}

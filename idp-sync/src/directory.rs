//! Identity directory contract and its provider-backed client.

use crate::cache::ReadThroughCache;
use crate::entity::LocalRecord;
use crate::error::absent_as_none;
use crate::mapper::AttributeMapper;
use crate::{messages, telemetry};
use async_trait::async_trait;
use config::DirectoryConfig;
use errors::{IdentityError, IdentityResult, ProviderError};
use idp_core::{
    ActionCodeSettings, Attributes, Credentials, IdentityProvider, IdentityRecord,
    UserProperties, UserQuery
};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Token returned by [`IdentityDirectory::send_reset_link`].
pub const RESET_LINK_SENT: &str = "RESET_LINK_SENT";

/// Target of a delete: one key or an ordered batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteTarget {
    One(String),
    Many(Vec<String>)
}

impl From<&str> for DeleteTarget {
    fn from(key: &str) -> Self {
        Self::One(key.to_string())
    }
}

impl From<String> for DeleteTarget {
    fn from(key: String) -> Self {
        Self::One(key)
    }
}

impl From<Vec<String>> for DeleteTarget {
    fn from(keys: Vec<String>) -> Self {
        Self::Many(keys)
    }
}

impl From<&[&str]> for DeleteTarget {
    fn from(keys: &[&str]) -> Self {
        Self::Many(keys.iter().map(|k| (*k).to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for DeleteTarget {
    fn from(keys: [&str; N]) -> Self {
        Self::Many(keys.iter().map(|k| (*k).to_string()).collect())
    }
}

/// Everything application code may ask of the identity directory.
///
/// Lookups that find nothing return `None` (or an empty/`false` result),
/// never an error; [`update_password`](Self::update_password) is the one
/// exception and reports an unknown email as a validation error.
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    async fn find(&self, key: &str) -> IdentityResult<Option<IdentityRecord>>;

    async fn find_by_email(&self, email: &str) -> IdentityResult<Option<IdentityRecord>>;

    async fn find_by_phone(&self, phone: &str) -> IdentityResult<Option<IdentityRecord>>;

    /// One entry per input key, in input order; unknown keys map to `None`.
    async fn find_many(
        &self,
        keys: &[String],
        use_cache: bool
    ) -> IdentityResult<Vec<Option<IdentityRecord>>>;

    /// Creates an identity. Claims given under `options` (or
    /// `customClaims`) are applied as part of the same logical operation.
    async fn create(&self, attributes: &Attributes) -> IdentityResult<IdentityRecord>;

    /// Updates an identity; `None` when `key` does not resolve.
    async fn update(
        &self,
        key: &str,
        attributes: &Attributes
    ) -> IdentityResult<Option<IdentityRecord>>;

    /// Updates when `key` resolves, otherwise creates. An unknown key
    /// silently becomes a create.
    async fn upsert(
        &self,
        key: Option<&str>,
        attributes: &Attributes
    ) -> IdentityResult<IdentityRecord>;

    /// Single key: whether the identity is gone afterwards (an absent key
    /// counts as deleted). Batch: whether at least one deletion succeeded.
    async fn delete(&self, target: DeleteTarget) -> IdentityResult<bool>;

    /// Deletes every identity and returns how many were removed.
    async fn delete_all(&self) -> IdentityResult<usize>;

    async fn update_password(&self, email: &str, password: &str) -> IdentityResult<IdentityRecord>;

    async fn query(&self, query: &UserQuery, use_cache: bool) -> IdentityResult<Vec<IdentityRecord>>;

    async fn all(&self) -> IdentityResult<Vec<IdentityRecord>>;

    async fn count(&self) -> IdentityResult<usize>;

    /// Filters one page (`offset` floored at 0, `limit` floored at 1) by a
    /// case-insensitive match on display name and email and a plain match on
    /// phone number.
    async fn search(
        &self,
        term: &str,
        offset: i64,
        limit: i64,
        use_cache: bool
    ) -> IdentityResult<Vec<IdentityRecord>>;

    async fn send_reset_link(&self, email: &str) -> IdentityResult<&'static str>;

    async fn send_verification_email(
        &self,
        record: &LocalRecord,
        settings: ActionCodeSettings
    ) -> IdentityResult<()>;

    fn message(&self, code: &str, default: Option<&str>) -> String;

    /// Whether the credentials sign in. Never fails.
    async fn check(&self, email: &str, password: &str) -> bool;

    /// Signs in and returns the identity; `None` when the credentials are
    /// rejected.
    async fn attempt(&self, credentials: &Credentials) -> IdentityResult<Option<IdentityRecord>>;

    async fn enable(&self, key: &str) -> IdentityResult<Option<IdentityRecord>>;

    async fn disable(&self, key: &str) -> IdentityResult<Option<IdentityRecord>>;
}

/// Page window used by `search`.
pub(crate) fn search_window(offset: i64, limit: i64) -> UserQuery {
    let offset = u32::try_from(offset.max(0)).unwrap_or(u32::MAX);
    let limit = u32::try_from(limit.max(1)).unwrap_or(u32::MAX);
    UserQuery::page(offset, limit)
}

pub(crate) fn filter_search(records: Vec<IdentityRecord>, term: &str) -> Vec<IdentityRecord> {
    records
        .into_iter()
        .filter(|record| record.matches_search(term))
        .collect()
}

/// Lines up fetched records with the requested keys.
pub(crate) fn align_to_keys(
    keys: &[String],
    records: Vec<IdentityRecord>
) -> Vec<Option<IdentityRecord>> {
    let by_key: HashMap<String, IdentityRecord> =
        records.into_iter().map(|r| (r.key.clone(), r)).collect();
    keys.iter().map(|key| by_key.get(key).cloned()).collect()
}

/// Splits claims out of a payload so they can be applied separately.
pub(crate) fn split_claims(properties: &mut UserProperties) -> Option<Attributes> {
    properties.custom_claims.take().filter(|claims| !claims.is_empty())
}

/// Validates a credential pair, naming the first missing field.
pub(crate) fn require_credentials(credentials: &Credentials) -> IdentityResult<(&str, &str)> {
    let email = credentials
        .email
        .as_deref()
        .filter(|e| !e.is_empty())
        .ok_or_else(|| IdentityError::validation("email", "The email field is required."))?;
    let password = credentials
        .password
        .as_deref()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| IdentityError::validation("password", "The password field is required."))?;
    Ok((email, password))
}

pub(crate) fn email_not_found(email: &str) -> IdentityError {
    IdentityError::validation("email", format!("User with email {email} was not found."))
}

pub(crate) fn disabled_attributes(disabled: bool) -> Attributes {
    let mut attributes = Attributes::new();
    attributes.insert("disabled".to_string(), Value::Bool(disabled));
    attributes
}

/// Directory client over an [`IdentityProvider`].
///
/// Reads of `find_many`, `query` and `search` go through the shared
/// [`ReadThroughCache`] with its finite TTL unless the caller bypasses it.
/// Every write invalidates the per-entity cache entry of the keys it touched
/// once the provider has accepted the write.
pub struct DirectoryClient {
    provider: Arc<dyn IdentityProvider>,
    cache: Arc<ReadThroughCache>,
    config: DirectoryConfig
}

impl DirectoryClient {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        cache: Arc<ReadThroughCache>,
        config: DirectoryConfig
    ) -> Self {
        Self {
            provider,
            cache,
            config
        }
    }

    pub fn cache(&self) -> &Arc<ReadThroughCache> {
        &self.cache
    }

    async fn invalidate(&self, key: &str) -> IdentityResult<()> {
        self.cache.forget(&self.cache.identity_key(key)).await?;
        Ok(())
    }

    async fn apply_claims(
        &self,
        record: &mut IdentityRecord,
        claims: Option<Attributes>
    ) -> IdentityResult<()> {
        if let Some(claims) = claims {
            let result = self.provider.set_custom_claims(&record.key, &claims).await;
            telemetry::record_directory_call("set_custom_claims", &result);
            result?;
            record.custom_claims = claims;
        }
        Ok(())
    }

    /// Payload and claims to send separately (none when the provider takes
    /// claims on the write itself).
    fn prepare(&self, attributes: &Attributes) -> IdentityResult<(UserProperties, Option<Attributes>)> {
        let mut properties = AttributeMapper::to_properties(attributes)?;
        let claims = if self.provider.accepts_claims_on_write() {
            None
        } else {
            split_claims(&mut properties)
        };
        Ok((properties, claims))
    }

    async fn list_page(&self, query: &UserQuery) -> IdentityResult<Vec<IdentityRecord>> {
        let result = self.provider.query_users(query).await;
        telemetry::record_directory_call("query", &result);
        Ok(result?)
    }

    async fn delete_batch(&self, keys: &[String], force: bool) -> IdentityResult<usize> {
        let mut deleted = 0;
        for chunk in keys.chunks(self.config.delete_batch_size.max(1)) {
            let result = self.provider.delete_users(chunk, force).await;
            telemetry::record_directory_call("delete_users", &result);
            let outcome = result?;
            if outcome.failure_count > 0 {
                debug!(
                    failures = outcome.failure_count,
                    "Batch delete left some identities in place"
                );
            }
            deleted += outcome.success_count;
        }
        for key in keys {
            self.invalidate(key).await?;
        }
        Ok(deleted)
    }

    fn verification_url(&self, key: &str) -> IdentityResult<Option<String>> {
        let Some(base) = &self.config.verify_url else {
            return Ok(None);
        };
        let mut url = reqwest::Url::parse(base)
            .map_err(|e| IdentityError::validation("verify_url", e.to_string()))?;
        let expires = chrono::Utc::now()
            + chrono::Duration::seconds(
                i64::try_from(self.config.verify_link_ttl_seconds).unwrap_or(i64::MAX / 1000)
            );
        url.query_pairs_mut()
            .append_pair("uid", key)
            .append_pair("expires", &expires.timestamp().to_string());
        Ok(Some(url.to_string()))
    }
}

#[async_trait]
impl IdentityDirectory for DirectoryClient {
    async fn find(&self, key: &str) -> IdentityResult<Option<IdentityRecord>> {
        if key.is_empty() {
            return Ok(None);
        }
        let result = self.provider.get_user(key).await;
        telemetry::record_directory_call("get_user", &result);
        absent_as_none(result)
    }

    async fn find_by_email(&self, email: &str) -> IdentityResult<Option<IdentityRecord>> {
        if email.is_empty() {
            return Ok(None);
        }
        let result = self.provider.get_user_by_email(email).await;
        telemetry::record_directory_call("get_user_by_email", &result);
        absent_as_none(result)
    }

    async fn find_by_phone(&self, phone: &str) -> IdentityResult<Option<IdentityRecord>> {
        if phone.is_empty() {
            return Ok(None);
        }
        let result = self.provider.get_user_by_phone(phone).await;
        telemetry::record_directory_call("get_user_by_phone", &result);
        absent_as_none(result)
    }

    async fn find_many(
        &self,
        keys: &[String],
        use_cache: bool
    ) -> IdentityResult<Vec<Option<IdentityRecord>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let fetch = || async {
            let result = self.provider.get_users(keys).await;
            telemetry::record_directory_call("get_users", &result);
            Ok::<_, IdentityError>(align_to_keys(keys, result?))
        };

        if !use_cache {
            return fetch().await;
        }
        let cache_key = self.cache.fingerprint_key("find_many", keys)?;
        self.cache.remember(&cache_key, self.cache.ttl(), fetch).await
    }

    #[instrument(skip(self, attributes))]
    async fn create(&self, attributes: &Attributes) -> IdentityResult<IdentityRecord> {
        let (properties, claims) = self.prepare(attributes)?;

        let result = self.provider.create_user(&properties).await;
        telemetry::record_directory_call("create_user", &result);
        let mut record = result?;

        self.apply_claims(&mut record, claims).await?;
        debug!(key = %record.key, "Identity created");
        Ok(record)
    }

    #[instrument(skip(self, attributes))]
    async fn update(
        &self,
        key: &str,
        attributes: &Attributes
    ) -> IdentityResult<Option<IdentityRecord>> {
        if key.is_empty() {
            return Ok(None);
        }
        let (properties, claims) = self.prepare(attributes)?;

        let result = self.provider.update_user(key, &properties).await;
        telemetry::record_directory_call("update_user", &result);
        let Some(mut record) = absent_as_none(result)? else {
            return Ok(None);
        };

        self.apply_claims(&mut record, claims).await?;
        self.invalidate(key).await?;
        Ok(Some(record))
    }

    async fn upsert(
        &self,
        key: Option<&str>,
        attributes: &Attributes
    ) -> IdentityResult<IdentityRecord> {
        if let Some(key) = key.filter(|k| !k.is_empty())
            && let Some(record) = self.update(key, attributes).await?
        {
            return Ok(record);
        }
        self.create(attributes).await
    }

    #[instrument(skip(self))]
    async fn delete(&self, target: DeleteTarget) -> IdentityResult<bool> {
        match target {
            DeleteTarget::One(key) => {
                if key.is_empty() {
                    return Ok(false);
                }
                let result = self.provider.delete_user(&key).await;
                telemetry::record_directory_call("delete_user", &result);
                absent_as_none(result)?;
                self.invalidate(&key).await?;
                Ok(true)
            }
            DeleteTarget::Many(keys) => {
                if keys.is_empty() {
                    return Ok(false);
                }
                Ok(self.delete_batch(&keys, false).await? > 0)
            }
        }
    }

    #[instrument(skip(self))]
    async fn delete_all(&self) -> IdentityResult<usize> {
        let batch = u32::try_from(self.config.delete_batch_size).unwrap_or(u32::MAX);
        let mut total = 0;

        loop {
            let keys: Vec<String> = self
                .list_page(&UserQuery::page(0, batch))
                .await?
                .into_iter()
                .map(|record| record.key)
                .collect();
            if keys.is_empty() {
                break;
            }

            let deleted = self.delete_batch(&keys, true).await?;
            if deleted == 0 {
                warn!(
                    remaining = keys.len(),
                    "Batch delete made no progress, stopping"
                );
                break;
            }
            total += deleted;
        }

        info!(total, "Deleted all identities");
        Ok(total)
    }

    #[instrument(skip(self, password))]
    async fn update_password(&self, email: &str, password: &str) -> IdentityResult<IdentityRecord> {
        if password.is_empty() {
            return Err(IdentityError::validation(
                "password",
                "The password field is required."
            ));
        }

        let wrap = |e: ProviderError| IdentityError::Directory {
            message: format!("Failed to update password: {}", e.message),
            code: e.code
        };

        let lookup = self.provider.get_user_by_email(email).await;
        telemetry::record_directory_call("get_user_by_email", &lookup);
        let record = match lookup {
            Ok(record) => record,
            Err(e) if e.is_not_found() => return Err(email_not_found(email)),
            Err(e) => return Err(wrap(e))
        };

        let result = self.provider.change_password(&record.key, password).await;
        telemetry::record_directory_call("change_password", &result);
        let updated = result.map_err(wrap)?;

        self.invalidate(&updated.key).await?;
        Ok(updated)
    }

    async fn query(&self, query: &UserQuery, use_cache: bool) -> IdentityResult<Vec<IdentityRecord>> {
        if !use_cache {
            return self.list_page(query).await;
        }
        let cache_key = self.cache.fingerprint_key("query", query)?;
        self.cache
            .remember(&cache_key, self.cache.ttl(), || self.list_page(query))
            .await
    }

    async fn all(&self) -> IdentityResult<Vec<IdentityRecord>> {
        let page_size = self.config.page_size.max(1);
        let mut records = Vec::new();
        let mut offset = 0u32;

        loop {
            let page = self.list_page(&UserQuery::page(offset, page_size)).await?;
            let fetched = u32::try_from(page.len()).unwrap_or(u32::MAX);
            records.extend(page);
            if fetched < page_size {
                break;
            }
            offset = offset.saturating_add(fetched);
        }

        Ok(records)
    }

    async fn count(&self) -> IdentityResult<usize> {
        Ok(self.all().await?.len())
    }

    async fn search(
        &self,
        term: &str,
        offset: i64,
        limit: i64,
        use_cache: bool
    ) -> IdentityResult<Vec<IdentityRecord>> {
        let window = search_window(offset, limit);
        let fetch = || async {
            Ok::<_, IdentityError>(filter_search(self.list_page(&window).await?, term))
        };

        if !use_cache {
            return fetch().await;
        }
        let cache_key = self
            .cache
            .fingerprint_key("search", &json!([term, window.limit, window.offset]))?;
        self.cache.remember(&cache_key, self.cache.ttl(), fetch).await
    }

    async fn send_reset_link(&self, email: &str) -> IdentityResult<&'static str> {
        let mut settings = ActionCodeSettings::default();
        if let Some(login_url) = &self.config.login_url {
            settings = settings.with_continue_url(login_url.clone());
        }

        let result = self.provider.send_password_reset_link(email, &settings).await;
        telemetry::record_directory_call("send_password_reset_link", &result);
        result?;
        Ok(RESET_LINK_SENT)
    }

    async fn send_verification_email(
        &self,
        record: &LocalRecord,
        mut settings: ActionCodeSettings
    ) -> IdentityResult<()> {
        let email = record
            .email()
            .filter(|e| !e.is_empty())
            .ok_or_else(|| IdentityError::validation("email", "The record has no email address."))?;

        if let Some(key) = record.key()
            && let Some(url) = self.verification_url(key)?
        {
            settings = settings.with_continue_url(url);
        }

        let result = self
            .provider
            .send_email_verification_link(&email, &settings)
            .await;
        telemetry::record_directory_call("send_email_verification_link", &result);
        Ok(result?)
    }

    fn message(&self, code: &str, default: Option<&str>) -> String {
        messages::message(code, default)
    }

    async fn check(&self, email: &str, password: &str) -> bool {
        if email.is_empty() || password.is_empty() {
            return false;
        }
        let result = self.provider.sign_in_with_password(email, password).await;
        telemetry::record_directory_call("sign_in_with_password", &result);
        result.is_ok_and(|key| !key.is_empty())
    }

    async fn attempt(&self, credentials: &Credentials) -> IdentityResult<Option<IdentityRecord>> {
        let (email, password) = require_credentials(credentials)?;

        let result = self.provider.sign_in_with_password(email, password).await;
        telemetry::record_directory_call("sign_in_with_password", &result);
        match result {
            Ok(_) => self.find_by_email(email).await,
            Err(e) if e.is_credential_rejection() => Ok(None),
            Err(e) => Err(e.into())
        }
    }

    async fn enable(&self, key: &str) -> IdentityResult<Option<IdentityRecord>> {
        self.update(key, &disabled_attributes(false)).await
    }

    async fn disable(&self, key: &str) -> IdentityResult<Option<IdentityRecord>> {
        self.update(key, &disabled_attributes(true)).await
    }
}

//! Capability traits for the identity bridge's external collaborators

use crate::types::{
    ActionCodeSettings, Attributes, BatchDeleteOutcome, IdentityRecord, UserProperties, UserQuery
};
use async_trait::async_trait;
use errors::{CacheError, ProviderError, StorageError};
use std::time::Duration;

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Remote identity provider transport.
///
/// Lookups of absent identities fail with a not-found [`ProviderError`]
/// (`USER_NOT_FOUND`); translating that into empty results is the directory
/// client's job, not the transport's.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn get_user(&self, key: &str) -> ProviderResult<IdentityRecord>;

    async fn get_user_by_email(&self, email: &str) -> ProviderResult<IdentityRecord>;

    async fn get_user_by_phone(&self, phone: &str) -> ProviderResult<IdentityRecord>;

    /// Records for the keys that exist, in any order.
    async fn get_users(&self, keys: &[String]) -> ProviderResult<Vec<IdentityRecord>>;

    async fn create_user(&self, properties: &UserProperties) -> ProviderResult<IdentityRecord>;

    async fn update_user(
        &self,
        key: &str,
        properties: &UserProperties
    ) -> ProviderResult<IdentityRecord>;

    async fn set_custom_claims(&self, key: &str, claims: &Attributes) -> ProviderResult<()>;

    async fn delete_user(&self, key: &str) -> ProviderResult<()>;

    async fn delete_users(&self, keys: &[String], force: bool)
    -> ProviderResult<BatchDeleteOutcome>;

    async fn query_users(&self, query: &UserQuery) -> ProviderResult<Vec<IdentityRecord>>;

    async fn change_password(&self, key: &str, password: &str) -> ProviderResult<IdentityRecord>;

    /// Verifies an email/password pair and returns the signed-in identity key.
    async fn sign_in_with_password(&self, email: &str, password: &str) -> ProviderResult<String>;

    async fn send_password_reset_link(
        &self,
        email: &str,
        settings: &ActionCodeSettings
    ) -> ProviderResult<()>;

    async fn send_email_verification_link(
        &self,
        email: &str,
        settings: &ActionCodeSettings
    ) -> ProviderResult<()>;

    /// Whether create/update accept custom claims in the same call. When
    /// false, claims are applied with a follow-up [`set_custom_claims`].
    ///
    /// [`set_custom_claims`]: IdentityProvider::set_custom_claims
    fn accepts_claims_on_write(&self) -> bool {
        false
    }
}

/// Keyed string cache.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Stores `value`; `ttl = None` keeps it until explicitly forgotten.
    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError>;

    /// Removes `key`, returning whether an entry existed.
    async fn forget(&self, key: &str) -> Result<bool, CacheError>;
}

/// Local relational record store.
///
/// Rows are attribute bags; the store assigns the local primary key under
/// `"id"` on first save.
#[async_trait]
pub trait LocalStore: Send + Sync {
    async fn find_by(&self, column: &str, value: &str) -> Result<Option<Attributes>, StorageError>;

    /// Inserts (no `"id"`) or updates (with `"id"`) a row and returns the
    /// stored row.
    async fn save(&self, attributes: &Attributes) -> Result<Attributes, StorageError>;

    async fn delete(&self, attributes: &Attributes) -> Result<bool, StorageError>;
}

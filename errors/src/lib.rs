//! # Identity Bridge Errors
//!
//! Error taxonomy shared by every crate of the identity bridge.
//!
//! - [`IdentityError`] is what application code sees from the directory
//!   client, the read-through cache and the synchronization hook.
//! - [`ProviderError`] is what an identity provider transport reports; the
//!   directory client translates it into an [`IdentityError`].
//! - [`CacheError`] and [`StorageError`] come from the cache and local-store
//!   backends.

use thiserror::Error;

/// Result alias used throughout the identity bridge.
pub type IdentityResult<T> = Result<T, IdentityError>;

/// Provider codes meaning "no such identity".
const NOT_FOUND_CODES: &[&str] = &["USER_NOT_FOUND", "EMAIL_NOT_FOUND", "PHONE_NUMBER_NOT_FOUND"];

/// Provider codes meaning the submitted credentials were refused.
const CREDENTIAL_REJECTION_CODES: &[&str] = &[
    "EMAIL_NOT_FOUND",
    "INVALID_PASSWORD",
    "INVALID_LOGIN_CREDENTIALS",
    "INVALID_EMAIL",
    "MISSING_PASSWORD",
    "USER_DISABLED"
];

/// Errors surfaced by the identity bridge.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Identity not found: {key}")]
    NotFound { key: String },

    #[error("Directory request failed: {code} - {message}")]
    Directory { code: String, message: String },

    #[error("Validation failed on {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError)
}

impl IdentityError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into()
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Provider error code, when the error originated at the directory.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Directory { code, .. } => Some(code),
            _ => None
        }
    }
}

impl From<ProviderError> for IdentityError {
    fn from(err: ProviderError) -> Self {
        Self::Directory {
            code: err.code,
            message: err.message
        }
    }
}

/// Failure reported by an identity provider transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Provider error {code}: {message}")]
pub struct ProviderError {
    pub code: String,
    pub message: String,
    pub status: Option<u16>
}

impl ProviderError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            status: None
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn user_not_found(subject: &str) -> Self {
        Self::new(
            "USER_NOT_FOUND",
            format!("No user record found for {subject}")
        )
        .with_status(404)
    }

    /// Leading code word; Identity Toolkit appends details after `" : "`.
    pub fn base_code(&self) -> &str {
        self.code.split(':').next().unwrap_or_default().trim()
    }

    pub fn is_not_found(&self) -> bool {
        NOT_FOUND_CODES.contains(&self.base_code())
    }

    pub fn is_credential_rejection(&self) -> bool {
        CREDENTIAL_REJECTION_CODES.contains(&self.base_code())
    }

    pub fn is_retryable(&self) -> bool {
        match self.status {
            Some(429) => true,
            Some(status) => status >= 500,
            None => matches!(
                self.base_code(),
                "TOO_MANY_ATTEMPTS_TRY_LATER" | "NETWORK_ERROR"
            )
        }
    }
}

/// Cache backend errors
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache connection to {backend} failed: {reason}")]
    Connection { backend: String, reason: String },

    #[error("Cache operation on {backend} failed: {reason}")]
    Operation { backend: String, reason: String },

    #[error("Cache serialization error: {reason}")]
    Serialization { reason: String }
}

/// Local storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Connection to {backend} failed: {reason}")]
    ConnectionError { backend: String, reason: String },

    #[error("Query on {backend} failed: {reason}")]
    QueryError { backend: String, reason: String },

    #[error("Serialization error: {error_type} - {reason}")]
    SerializationError { error_type: String, reason: String },

    #[error("Not found on {backend}:{id}")]
    NotFound { backend: String, id: String }
}

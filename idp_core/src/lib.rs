//! # Identity Bridge Core
//!
//! Shared types and the capability traits the identity bridge consumes.
//!
//! This crate provides:
//! - [`IdentityRecord`], the canonical remote identity snapshot
//! - Request shapes for the provider: [`UserProperties`], [`UserQuery`],
//!   [`ActionCodeSettings`], [`Credentials`]
//! - Capability traits for the external collaborators: [`IdentityProvider`]
//!   (remote transport), [`CacheStore`] (keyed cache), [`LocalStore`] (local
//!   relational record)

pub mod traits;
pub mod types;

pub use traits::{CacheStore, IdentityProvider, LocalStore, ProviderResult};
pub use types::{
    ActionCodeSettings, Attributes, BatchDeleteFailure, BatchDeleteOutcome, Credentials,
    FilterField, IdentityRecord, QueryFilter, SortField, UserProperties, UserQuery
};

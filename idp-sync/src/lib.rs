//! # Identity Directory Bridge
//!
//! Keeps a local record store in step with a remote identity directory.
//!
//! - [`AttributeMapper`]: fixed two-way dictionary between local and
//!   directory field names
//! - [`IdentityDirectory`] / [`DirectoryClient`]: the directory contract and
//!   its provider-backed implementation
//! - [`ReadThroughCache`]: keyed read-through cache with explicit
//!   invalidation
//! - [`FakeDirectory`]: in-memory test double recording every call
//! - [`IdentitySync`]: lifecycle hook syncing local records on
//!   retrieve/save/delete, driven by [`EntityRepository`]
//! - [`IdentityToolkitProvider`]: Identity Toolkit v1 REST transport

pub mod bridge;
pub mod cache;
pub mod directory;
pub mod entity;
pub mod error;
pub mod fake;
pub mod hook;
pub mod mapper;
pub mod messages;
pub mod repository;
pub mod rest;
pub mod telemetry;

pub use bridge::IdentityBridge;
pub use cache::ReadThroughCache;
pub use directory::{DeleteTarget, DirectoryClient, IdentityDirectory, RESET_LINK_SENT};
pub use entity::LocalRecord;
pub use error::{IdentityError, IdentityResult};
pub use fake::{CallRecord, FakeDirectory};
pub use hook::IdentitySync;
pub use mapper::{ATTRIBUTE_MAP, AttributeMapper};
pub use repository::{EntityRepository, LifecycleHook};
pub use rest::IdentityToolkitProvider;

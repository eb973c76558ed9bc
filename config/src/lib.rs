//! # Configuration System
//!
//! Configuration for the identity bridge: cache, directory client, provider
//! transport and local store.
//!
//! This crate provides:
//! - Configuration structures with `serde` defaults
//! - Environment variable loading (`IDP_*`)
//! - Configuration file loading (TOML/YAML)
//! - Validation through the `validator` crate

pub mod config;
pub mod file_loader;
pub mod loader;

pub use config::{
    BridgeConfig, CacheBackend, CacheConfig, DirectoryConfig, LocalBackend, LocalStoreConfig,
    ProviderConfig, RetryConfig
};
pub use file_loader::{ConfigFileError, load_from_file, load_from_toml, load_from_yaml};
pub use loader::load_from_env;
pub use validator::Validate;

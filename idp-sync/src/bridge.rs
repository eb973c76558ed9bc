//! Wires the bridge components from a [`BridgeConfig`].

use crate::cache::ReadThroughCache;
use crate::directory::{DirectoryClient, IdentityDirectory};
use crate::repository::EntityRepository;
use crate::rest::IdentityToolkitProvider;
use config::{BridgeConfig, Validate};
use errors::{IdentityError, IdentityResult};
use idp_core::IdentityProvider;
use std::sync::Arc;
use tracing::info;

/// Directory client, shared cache and synced repository built from one
/// configuration.
pub struct IdentityBridge {
    pub directory: Arc<DirectoryClient>,
    pub cache: Arc<ReadThroughCache>,
    pub repository: EntityRepository
}

impl IdentityBridge {
    /// Builds the bridge over the Identity Toolkit REST provider.
    pub async fn connect(config: &BridgeConfig) -> IdentityResult<Self> {
        let provider = IdentityToolkitProvider::new(config.provider.clone())?;
        Self::with_provider(config, Arc::new(provider)).await
    }

    /// Builds the bridge over any provider transport.
    pub async fn with_provider(
        config: &BridgeConfig,
        provider: Arc<dyn IdentityProvider>
    ) -> IdentityResult<Self> {
        config
            .validate()
            .map_err(|e| IdentityError::validation("config", e.to_string()))?;

        let store = storage::connect_cache(&config.cache).await?;
        let cache = Arc::new(ReadThroughCache::from_config(store, &config.cache));
        let directory = Arc::new(DirectoryClient::new(
            provider,
            cache.clone(),
            config.directory.clone()
        ));

        let local = storage::connect_local(&config.local).await?;
        let repository = EntityRepository::synced(
            local,
            config.local.key_name.clone(),
            directory.clone() as Arc<dyn IdentityDirectory>,
            cache.clone()
        );

        info!(
            cache_backend = %config.cache.backend,
            local_backend = %config.local.backend,
            "Identity bridge initialized"
        );

        Ok(Self {
            directory,
            cache,
            repository
        })
    }
}

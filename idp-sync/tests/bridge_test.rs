use config::{BridgeConfig, CacheBackend};
use idp_core::IdentityProvider;
use idp_sync::{IdentityBridge, IdentityDirectory};
use std::sync::Arc;
use testing::{MemoryIdentityProvider, identity};

#[tokio::test]
async fn test_bridge_wires_memory_backends() {
    let provider = Arc::new(MemoryIdentityProvider::new());
    provider.seed(identity("u1", "a@ex.com", "Alpha", "+111"));

    let bridge = IdentityBridge::with_provider(
        &BridgeConfig::default(),
        provider.clone() as Arc<dyn IdentityProvider>
    )
    .await
    .unwrap();

    let mut record = bridge.repository.new_record();
    record.set_attribute("name", "Beta");
    record.set_attribute("email", "b@ex.com");
    bridge.repository.save(&mut record).await.unwrap();

    let key = record.key().unwrap().to_string();
    let loaded = bridge.repository.find_by_key(&key).await.unwrap().unwrap();
    assert_eq!(loaded.name().as_deref(), Some("Beta"));

    assert_eq!(bridge.directory.count().await.unwrap(), 2);
    assert!(bridge.cache.identity_key(&key).starts_with("fauth:user:"));
}

#[tokio::test]
async fn test_bridge_rejects_invalid_config() {
    let mut config = BridgeConfig::default();
    config.cache.backend = CacheBackend::Redis;

    let result = IdentityBridge::with_provider(
        &config,
        Arc::new(MemoryIdentityProvider::new()) as Arc<dyn IdentityProvider>
    )
    .await;

    assert!(result.is_err());
}

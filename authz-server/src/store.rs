use crate::config::{AppConfig, StoreBackend};
use crate::errors::StartupError;
use authz_engine::store::redis::RedisStore;
use authz_engine::Store;
use log::info;

/// Creates the store backend selected by the configuration
pub async fn create_store(config: &AppConfig) -> Result<Store, StartupError> {
    match config.store.backend {
        StoreBackend::InMemory => {
            info!("Using in-memory store");
            Ok(Store::in_memory())
        }
        StoreBackend::Redis => {
            let url = config
                .store
                .redis_url
                .as_deref()
                .filter(|url| !url.is_empty())
                .ok_or_else(|| {
                    StartupError::Store("Redis URL is required for the redis store".to_string())
                })?;
            let store = RedisStore::new(url).await.map_err(StartupError::Store)?;
            info!("Using Redis store");
            Ok(Store::Redis(store))
        }
    }
}

use crate::config::AppConfig;
use authz_engine::{AuthorizationService, Store};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub service: AuthorizationService,
}

impl AppState {
    pub fn new(config: &AppConfig, store: Store) -> Self {
        Self {
            service: AuthorizationService::new(store, config.service_settings()),
            config: Arc::new(config.clone()),
        }
    }

    /// Check if the store is reachable
    pub async fn health_check(&self) -> Result<(), String> {
        self.service.store().health_check().await
    }
}

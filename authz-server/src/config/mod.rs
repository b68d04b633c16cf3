pub(crate) use crate::config::bootstrap::BootstrapConfig;
pub(crate) use crate::config::store::{StoreBackend, StoreConfig};
pub(crate) use crate::config::tokens::TokensConfig;
use authz_engine::ServiceSettings;
use confique::Config;
use std::time::Duration;

pub mod bootstrap;
pub mod store;
pub mod tokens;

/// Main configuration structure for the authorization server
#[derive(Debug, Config, Clone)]
pub struct AppConfig {
    /// The port the server will listen to (default: 9000)
    #[config(env = "AUTHZ_PORT", default = 9000)]
    pub port: u16,

    /// Issuer identifier reported by introspection (default: http://localhost:9000)
    #[config(env = "AUTHZ_ISSUER", default = "http://localhost:9000")]
    pub issuer: String,

    /// Credential lifetimes and refresh behaviour
    #[config(nested)]
    pub tokens: TokensConfig,

    /// Storage configuration
    #[config(nested)]
    pub store: StoreConfig,

    /// Authorization endpoint configuration
    #[config(nested)]
    pub authorize: AuthorizeConfig,

    /// Development client registered at start-up
    #[config(nested)]
    pub bootstrap: BootstrapConfig,
}

/// Configuration of the authorization endpoint
#[derive(Debug, Config, Clone)]
pub struct AuthorizeConfig {
    /// Header carrying the end user authenticated by the fronting proxy
    /// (default: x-authenticated-user)
    #[config(
        env = "AUTHZ_AUTHORIZE_SUBJECT_HEADER",
        default = "x-authenticated-user"
    )]
    pub subject_header: String,
}

impl AppConfig {
    /// Creates a new Config instance from environment variables
    pub fn new() -> Result<Self, String> {
        let config = Self::builder().env().load().map_err(|e| e.to_string())?;
        config.validate()?;
        Ok(config)
    }

    /// Settings handed to the authorization service
    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            tokens: self.tokens.token_settings(),
            rotate_refresh_tokens: self.tokens.rotate_refresh_tokens,
            issuer: Some(self.issuer.clone()).filter(|issuer| !issuer.is_empty()),
            client_cache_ttl: Duration::from_secs(self.store.client_cache_ttl),
            client_cache_capacity: self.store.client_cache_capacity,
        }
    }

    fn validate(&self) -> Result<(), String> {
        self.tokens.validate()?;
        self.store.validate()?;
        if self.authorize.subject_header.trim().is_empty() {
            return Err("AUTHZ_AUTHORIZE_SUBJECT_HEADER must not be empty".to_string());
        }
        Ok(())
    }

    #[cfg(test)]
    pub fn for_test() -> Self {
        let mut config = Self::builder()
            .load()
            .unwrap_or_else(|e| panic!("default configuration should load: {e}"));
        config.port = 0;
        config.store.sweep_interval = 0;
        config.store.client_cache_ttl = 0;
        config
    }
}

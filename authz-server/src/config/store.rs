use confique::Config;
use serde::{Deserialize, Deserializer};
use std::str::FromStr;
use std::time::Duration;

/// Which storage backend holds clients and authorization records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    InMemory,
    Redis,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in-memory" => Ok(StoreBackend::InMemory),
            "redis" => Ok(StoreBackend::Redis),
            other => Err(format!(
                "unknown store backend '{other}', expected 'in-memory' or 'redis'"
            )),
        }
    }
}

impl<'de> Deserialize<'de> for StoreBackend {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

/// Configuration of the storage subsystem
#[derive(Debug, Config, Clone)]
pub struct StoreConfig {
    /// Store backend: "in-memory" or "redis" (default: in-memory)
    #[config(env = "AUTHZ_STORE_BACKEND", default = "in-memory")]
    pub backend: StoreBackend,

    /// Redis connection URL, required by the redis backend
    #[config(env = "AUTHZ_STORE_REDIS_URL")]
    pub redis_url: Option<String>,

    /// Seconds between expiry sweeps, 0 disables the sweeper (default: 60)
    #[config(env = "AUTHZ_STORE_SWEEP_INTERVAL", default = 60)]
    pub sweep_interval: u64,

    /// Client lookup cache TTL in seconds, 0 disables the cache (default: 30)
    #[config(env = "AUTHZ_STORE_CLIENT_CACHE_TTL", default = 30)]
    pub client_cache_ttl: u64,

    /// Maximum number of cached clients (default: 1024)
    #[config(env = "AUTHZ_STORE_CLIENT_CACHE_CAPACITY", default = 1024)]
    pub client_cache_capacity: u64,
}

impl StoreConfig {
    /// The sweep period, `None` when the sweeper is disabled
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval > 0).then(|| Duration::from_secs(self.sweep_interval))
    }

    pub(super) fn validate(&self) -> Result<(), String> {
        if self.backend == StoreBackend::Redis
            && self.redis_url.as_deref().is_none_or(str::is_empty)
        {
            return Err("AUTHZ_STORE_REDIS_URL is required for the redis backend".to_string());
        }
        Ok(())
    }
}

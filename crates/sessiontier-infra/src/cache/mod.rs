//! Cache tier implementations.
//!
//! `RedisCacheTier` is the shared tier for multi-worker deployments.
//! `MemoryCacheTier` keeps entries in the current process only and suits a
//! single worker or tests. `ConfiguredCache` picks one from configuration.

pub mod memory;
pub mod redis;

use std::time::Duration;

use sessiontier_core::storage::cache_tier::CacheTier;
use sessiontier_types::error::CacheError;
use tracing::info;

use crate::config::{CacheBackend, CacheSettings};

pub use self::memory::MemoryCacheTier;
pub use self::redis::RedisCacheTier;

/// The cache tier selected by `[cache] backend`.
pub enum ConfiguredCache {
    Memory(MemoryCacheTier),
    Redis(RedisCacheTier),
}

impl ConfiguredCache {
    pub async fn connect(settings: &CacheSettings) -> Result<Self, CacheError> {
        match settings.backend {
            CacheBackend::Memory => {
                info!("using in-process cache tier");
                Ok(Self::Memory(MemoryCacheTier::new()))
            }
            CacheBackend::Redis => Ok(Self::Redis(RedisCacheTier::connect(&settings.redis_url).await?)),
        }
    }

    pub fn backend(&self) -> CacheBackend {
        match self {
            Self::Memory(_) => CacheBackend::Memory,
            Self::Redis(_) => CacheBackend::Redis,
        }
    }
}

impl CacheTier for ConfiguredCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        match self {
            Self::Memory(cache) => cache.get(key).await,
            Self::Redis(cache) => cache.get(key).await,
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        match self {
            Self::Memory(cache) => cache.set(key, value, ttl).await,
            Self::Redis(cache) => cache.set(key, value, ttl).await,
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        match self {
            Self::Memory(cache) => cache.delete(key).await,
            Self::Redis(cache) => cache.delete(key).await,
        }
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, CacheError> {
        match self {
            Self::Memory(cache) => cache.set_if_absent(key, value, ttl).await,
            Self::Redis(cache) => cache.set_if_absent(key, value, ttl).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_backend_selected_by_default() {
        let cache = ConfiguredCache::connect(&CacheSettings::default()).await.unwrap();
        assert_eq!(cache.backend(), CacheBackend::Memory);

        cache.set("k", "v", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));
        assert!(!cache.set_if_absent("k", "w", Duration::from_secs(60)).await.unwrap());
        assert!(cache.delete("k").await.unwrap());
    }
}

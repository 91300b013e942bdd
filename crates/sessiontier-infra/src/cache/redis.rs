//! Redis cache tier.
//!
//! Shared by every worker process pointed at the same Redis instance. Uses a
//! `ConnectionManager`, which reconnects transparently; a request that hits a
//! dropped connection fails with `CacheError::Unavailable` and the session
//! layer degrades accordingly.

use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError};
use sessiontier_core::storage::cache_tier::CacheTier;
use sessiontier_types::error::CacheError;
use tracing::{debug, error, info};

/// `CacheTier` backed by Redis.
#[derive(Clone)]
pub struct RedisCacheTier {
    connection_manager: ConnectionManager,
}

impl RedisCacheTier {
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        info!(url, "connecting to Redis");

        let client = Client::open(url).map_err(|e| {
            error!(error = %e, "invalid Redis URL");
            CacheError::Unavailable(format!("failed to create Redis client: {e}"))
        })?;

        let connection_manager = ConnectionManager::new(client).await.map_err(|e| {
            error!(error = %e, "failed to connect to Redis");
            CacheError::Unavailable(format!("failed to create Redis connection manager: {e}"))
        })?;

        Ok(Self { connection_manager })
    }

    /// Round-trip a PING.
    pub async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.connection_manager.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await.map_err(map_redis)?;
        Ok(())
    }
}

fn map_redis(e: RedisError) -> CacheError {
    if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout() {
        CacheError::Unavailable(e.to_string())
    } else {
        CacheError::Operation(e.to_string())
    }
}

/// Redis `PX` argument; never zero, which Redis rejects.
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

impl CacheTier for RedisCacheTier {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection_manager.clone();
        let value: Option<String> = conn.get(key).await.map_err(map_redis)?;
        debug!(key, hit = value.is_some(), "redis get");
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.connection_manager.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(map_redis)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.connection_manager.clone();
        let deleted: u32 = conn.del(key).await.map_err(map_redis)?;
        Ok(deleted > 0)
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, CacheError> {
        let mut conn = self.connection_manager.clone();
        // Replies "OK" when stored, nil when the key already exists.
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(map_redis)?;
        Ok(reply.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_millis_never_zero() {
        assert_eq!(ttl_millis(Duration::ZERO), 1);
        assert_eq!(ttl_millis(Duration::from_secs(30)), 30_000);
    }

    #[tokio::test]
    async fn test_invalid_url_is_unavailable() {
        let err = RedisCacheTier::connect("not-a-url").await.err().unwrap();
        assert!(matches!(err, CacheError::Unavailable(_)));
    }
}

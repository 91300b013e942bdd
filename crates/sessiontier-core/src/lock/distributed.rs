//! Cluster-wide action lock backed by the shared cache tier.
//!
//! Uses the cache's conditional set-if-absent with a TTL, so a duplicate
//! trigger arriving at a different worker is also rejected. The TTL bounds
//! how long a crashed holder can block an action.

use std::sync::Arc;
use std::time::Duration;

use sessiontier_types::error::CacheError;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::storage::cache_tier::CacheTier;

const LOCK_KEY_PREFIX: &str = "lock:";

/// Result of trying to mark an action active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockAcquisition {
    Acquired,
    /// Another holder (possibly on another worker) has the action in flight.
    AlreadyActive,
}

/// Action lock shared by every worker that talks to the same cache tier.
///
/// Each instance carries an owner token; `mark_inactive` only deletes locks
/// that this instance stored.
pub struct CacheActionLock<C: CacheTier> {
    cache: Arc<C>,
    ttl: Duration,
    owner: String,
}

impl<C: CacheTier> CacheActionLock<C> {
    pub fn new(cache: Arc<C>, ttl: Duration) -> Self {
        Self {
            cache,
            ttl,
            owner: Uuid::now_v7().to_string(),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    fn key(action_id: &str) -> String {
        format!("{LOCK_KEY_PREFIX}{action_id}")
    }

    pub async fn is_active(&self, action_id: &str) -> Result<bool, CacheError> {
        Ok(self.cache.get(&Self::key(action_id)).await?.is_some())
    }

    pub async fn mark_active(&self, action_id: &str) -> Result<LockAcquisition, CacheError> {
        let stored = self
            .cache
            .set_if_absent(&Self::key(action_id), &self.owner, self.ttl)
            .await?;
        if stored {
            Ok(LockAcquisition::Acquired)
        } else {
            debug!(action_id, "duplicate action rejected by shared lock");
            Ok(LockAcquisition::AlreadyActive)
        }
    }

    /// Release an action held by this instance. Returns whether a lock was removed.
    ///
    /// The ownership check and delete are two round trips; a lock that expires
    /// and is re-acquired in between can be deleted by a stale holder.
    pub async fn mark_inactive(&self, action_id: &str) -> Result<bool, CacheError> {
        let key = Self::key(action_id);
        match self.cache.get(&key).await? {
            Some(holder) if holder == self.owner => self.cache.delete(&key).await,
            Some(_) => {
                warn!(action_id, "not releasing action held by another owner");
                Ok(false)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemoryCache;

    #[tokio::test]
    async fn acquire_and_release() {
        let cache = Arc::new(MemoryCache::new());
        let lock = CacheActionLock::new(cache, Duration::from_secs(30));

        assert!(!lock.is_active("x").await.unwrap());
        assert_eq!(lock.mark_active("x").await.unwrap(), LockAcquisition::Acquired);
        assert!(lock.is_active("x").await.unwrap());
        assert!(lock.mark_inactive("x").await.unwrap());
        assert!(!lock.is_active("x").await.unwrap());
    }

    #[tokio::test]
    async fn second_worker_is_rejected() {
        let cache = Arc::new(MemoryCache::new());
        let worker_a = CacheActionLock::new(Arc::clone(&cache), Duration::from_secs(30));
        let worker_b = CacheActionLock::new(Arc::clone(&cache), Duration::from_secs(30));

        assert_eq!(worker_a.mark_active("x").await.unwrap(), LockAcquisition::Acquired);
        assert_eq!(
            worker_b.mark_active("x").await.unwrap(),
            LockAcquisition::AlreadyActive
        );
        assert!(worker_b.is_active("x").await.unwrap());
    }

    #[tokio::test]
    async fn release_by_non_owner_is_ignored() {
        let cache = Arc::new(MemoryCache::new());
        let worker_a = CacheActionLock::new(Arc::clone(&cache), Duration::from_secs(30));
        let worker_b = CacheActionLock::new(Arc::clone(&cache), Duration::from_secs(30));

        worker_a.mark_active("x").await.unwrap();
        assert!(!worker_b.mark_inactive("x").await.unwrap());
        assert!(worker_a.is_active("x").await.unwrap());
    }

    #[tokio::test]
    async fn cache_outage_surfaces_as_error() {
        let cache = Arc::new(MemoryCache::new());
        let lock = CacheActionLock::new(Arc::clone(&cache), Duration::from_secs(30));
        cache.set_offline(true);
        assert!(matches!(
            lock.mark_active("x").await,
            Err(CacheError::Unavailable(_))
        ));
    }
}

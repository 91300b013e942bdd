//! Cache tier trait.
//!
//! The cache tier is a fast key-value store shared by every worker process.
//! It holds the most recent encoded state per subject with a TTL and is the
//! cross-process visibility mechanism: a write here is seen by the next read
//! on any worker.

use std::time::Duration;

use sessiontier_types::error::CacheError;

/// Trait for the shared, TTL-bounded string cache.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
/// Implementations live in sessiontier-infra.
pub trait CacheTier: Send + Sync {
    /// Get a value by key. Returns None if absent or expired.
    fn get(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<Option<String>, CacheError>> + Send;

    /// Set a value with a TTL, overwriting unconditionally.
    fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> impl std::future::Future<Output = Result<(), CacheError>> + Send;

    /// Delete a key. Returns whether a live entry was removed.
    fn delete(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<bool, CacheError>> + Send;

    /// Set a value only if the key is absent (or expired).
    ///
    /// Returns `true` when this call stored the value.
    fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> impl std::future::Future<Output = Result<bool, CacheError>> + Send;
}

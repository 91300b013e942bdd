//! In-process cache tier with per-entry TTL.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use sessiontier_core::storage::cache_tier::CacheTier;
use sessiontier_types::error::CacheError;

#[derive(Debug, Clone)]
struct CachedValue {
    value: String,
    /// `None` when the TTL runs past what `Instant` can represent.
    expires_at: Option<Instant>,
}

impl CachedValue {
    fn new(value: &str, ttl: Duration) -> Self {
        Self {
            value: value.to_string(),
            expires_at: Instant::now().checked_add(ttl),
        }
    }

    fn is_live(&self) -> bool {
        self.expires_at.is_none_or(|at| Instant::now() < at)
    }
}

/// `CacheTier` backed by a `DashMap` in the current process.
///
/// Expired entries are dropped lazily on access or by `purge_expired`.
#[derive(Debug, Default)]
pub struct MemoryCacheTier {
    entries: DashMap<String, CachedValue>,
}

impl MemoryCacheTier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, v| v.is_live());
        before - self.entries.len()
    }
}

impl CacheTier for MemoryCacheTier {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let hit = self
            .entries
            .get(key)
            .map(|entry| (entry.is_live(), entry.value.clone()));
        match hit {
            Some((true, value)) => Ok(Some(value)),
            Some((false, _)) => {
                self.entries.remove_if(key, |_, v| !v.is_live());
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        self.entries.insert(key.to_string(), CachedValue::new(value, ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, v)| v.is_live()))
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, CacheError> {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_live() {
                    Ok(false)
                } else {
                    occupied.insert(CachedValue::new(value, ttl));
                    Ok(true)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(CachedValue::new(value, ttl));
                Ok(true)
            }
        }
    }
}

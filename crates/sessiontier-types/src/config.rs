//! Session layer configuration.
//!
//! `SessionConfig` is the `[session]` table of `config.toml`. Every option is
//! named and defaulted; there is no positional or implicit configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cleanup::CleanupRule;
use crate::state::{LAST_COMPLETED_AT, LAST_COMPLETED_OPERATION_ID, TENANT_ID, TENANT_NAME};

/// Tuning options for the cache, write-back batcher, locks, and cleanup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// TTL of cache-tier entries, in seconds.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Prefix prepended to the subject to form a cache key.
    #[serde(default = "default_cache_key_prefix")]
    pub cache_key_prefix: String,

    /// Freshness window of the process-local fallback copy, in seconds.
    #[serde(default = "default_fallback_ttl_secs")]
    pub fallback_ttl_secs: u64,

    /// Timer tick of the write-back batcher, in milliseconds.
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    /// Number of pending subjects that triggers a flush before the timer.
    #[serde(default = "default_flush_threshold")]
    pub flush_threshold: usize,

    /// Maximum concurrent durable upserts within one flush.
    #[serde(default = "default_flush_concurrency")]
    pub flush_concurrency: usize,

    /// Upper bound on a single durable read, in milliseconds.
    #[serde(default = "default_durable_read_timeout_ms")]
    pub durable_read_timeout_ms: u64,

    /// TTL of cluster-wide action locks held in the cache tier, in seconds.
    #[serde(default = "default_lock_ttl_secs")]
    pub lock_ttl_secs: u64,

    /// Fields that survive `reset_state`.
    #[serde(default = "default_retained_fields")]
    pub retained_fields: Vec<String>,

    /// Entry points served by the fast partial loader.
    #[serde(default = "default_fast_path_entry_points")]
    pub fast_path_entry_points: Vec<String>,

    /// Field cleanup rules applied on transitions and by age.
    #[serde(default)]
    pub cleanup_rules: Vec<CleanupRule>,
}

fn default_cache_ttl_secs() -> u64 {
    1800
}

fn default_cache_key_prefix() -> String {
    "session:".to_string()
}

fn default_fallback_ttl_secs() -> u64 {
    60
}

fn default_flush_interval_ms() -> u64 {
    2000
}

fn default_flush_threshold() -> usize {
    50
}

fn default_flush_concurrency() -> usize {
    5
}

fn default_durable_read_timeout_ms() -> u64 {
    5000
}

fn default_lock_ttl_secs() -> u64 {
    30
}

fn default_retained_fields() -> Vec<String> {
    [
        TENANT_ID,
        TENANT_NAME,
        LAST_COMPLETED_OPERATION_ID,
        LAST_COMPLETED_AT,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_fast_path_entry_points() -> Vec<String> {
    vec!["start".to_string()]
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl_secs(),
            cache_key_prefix: default_cache_key_prefix(),
            fallback_ttl_secs: default_fallback_ttl_secs(),
            flush_interval_ms: default_flush_interval_ms(),
            flush_threshold: default_flush_threshold(),
            flush_concurrency: default_flush_concurrency(),
            durable_read_timeout_ms: default_durable_read_timeout_ms(),
            lock_ttl_secs: default_lock_ttl_secs(),
            retained_fields: default_retained_fields(),
            fast_path_entry_points: default_fast_path_entry_points(),
            cleanup_rules: Vec::new(),
        }
    }
}

impl SessionConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn fallback_ttl(&self) -> Duration {
        Duration::from_secs(self.fallback_ttl_secs)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms.max(1))
    }

    pub fn durable_read_timeout(&self) -> Duration {
        Duration::from_millis(self.durable_read_timeout_ms)
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_secs)
    }

    /// Flush concurrency, never below one.
    pub fn effective_flush_concurrency(&self) -> usize {
        self.flush_concurrency.max(1)
    }

    pub fn is_fast_path(&self, entry_point: &str) -> bool {
        self.fast_path_entry_points.iter().any(|e| e == entry_point)
    }

    pub fn cache_key(&self, subject: &str) -> String {
        format!("{}{}", self.cache_key_prefix, subject)
    }
}

//! Session manager.
//!
//! Reads are cache-aside: the shared cache tier first, then the durable
//! store, populating the cache on the way back. Writes go to the cache
//! synchronously and to the durable store asynchronously through the
//! write-back batcher. Reads never fail; any storage failure degrades to the
//! empty default blob.
//!
//! There is no version check on `save_state`. Two workers mutating the same
//! subject concurrently are last-writer-wins at both the cache and the batcher.

use std::sync::Arc;

use chrono::Utc;
use sessiontier_types::config::SessionConfig;
use sessiontier_types::error::{RepositoryError, SessionError};
use sessiontier_types::state::StateBlob;
use sessiontier_types::storage::StoredState;
use sessiontier_types::subject::Subject;
use tracing::{debug, error, warn};

use crate::codec::PayloadCodec;
use crate::lock::{ActionGuard, ProcessLockRegistry};
use crate::session::batcher::{FlushHandle, FlushReport, WriteBackBatcher};
use crate::session::cleanup::StateCleanupPolicy;
use crate::session::fallback::FallbackCache;
use crate::storage::cache_tier::CacheTier;
use crate::storage::durable_store::DurableStore;

/// Per-subject state access over a cache tier and a durable store.
///
/// Generic over `CacheTier` and `DurableStore` so sessiontier-core never
/// depends on sessiontier-infra. One instance is shared by every request in
/// a worker process.
pub struct SessionManager<C: CacheTier, D: DurableStore> {
    cache: Arc<C>,
    store: Arc<D>,
    batcher: Arc<WriteBackBatcher<D>>,
    fallback: FallbackCache,
    cleanup: StateCleanupPolicy,
    locks: ProcessLockRegistry,
    config: SessionConfig,
}

impl<C: CacheTier, D: DurableStore> SessionManager<C, D> {
    pub fn new(cache: Arc<C>, store: Arc<D>, config: SessionConfig) -> Self {
        let batcher = Arc::new(WriteBackBatcher::new(Arc::clone(&store), &config));
        Self {
            cache,
            store,
            batcher,
            fallback: FallbackCache::new(config.fallback_ttl()),
            cleanup: StateCleanupPolicy::new(config.cleanup_rules.clone()),
            locks: ProcessLockRegistry::new(),
            config,
        }
    }

    pub fn cache(&self) -> &Arc<C> {
        &self.cache
    }

    pub fn store(&self) -> &Arc<D> {
        &self.store
    }

    pub fn batcher(&self) -> &Arc<WriteBackBatcher<D>> {
        &self.batcher
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn cleanup_policy(&self) -> &StateCleanupPolicy {
        &self.cleanup
    }

    pub fn locks(&self) -> &ProcessLockRegistry {
        &self.locks
    }

    // --- Read path ---

    /// Current state of a subject.
    ///
    /// Order of lookup: cache tier, then (cache miss) the batcher's pending
    /// write, then the durable store. When the cache tier is unreachable the
    /// process-local fallback copy is consulted before the durable store.
    /// Returns the empty default blob if nothing is found or every tier fails.
    pub async fn get_state(&self, subject: &Subject) -> StateBlob {
        let key = self.config.cache_key(subject.as_str());

        let cache_reachable = match self.cache.get(&key).await {
            Ok(Some(payload)) => match PayloadCodec::decode(&payload) {
                Ok(blob) => {
                    self.fallback.put(subject.clone(), blob.clone());
                    return blob;
                }
                Err(e) => {
                    warn!(subject = %subject, error = %e, "corrupt cache entry, treating as miss");
                    true
                }
            },
            Ok(None) => {
                debug!(subject = %subject, "cache miss");
                true
            }
            Err(e) => {
                warn!(subject = %subject, error = %e, "cache tier unavailable, using fallbacks");
                false
            }
        };

        if let Some(blob) = self.batcher.pending_for(subject) {
            debug!(subject = %subject, "serving queued write");
            if cache_reachable {
                self.populate_cache(subject, &key, &blob).await;
            }
            return blob;
        }

        if !cache_reachable {
            if let Some(blob) = self.fallback.get(subject) {
                debug!(subject = %subject, "serving fallback copy");
                return blob;
            }
        }

        let row = match self.load_durable(subject).await {
            Ok(Some(row)) => row,
            Ok(None) => return StateBlob::new(),
            Err(e) => {
                error!(subject = %subject, error = %e, "durable read failed, using empty state");
                return StateBlob::new();
            }
        };

        match PayloadCodec::decode(&row.payload) {
            Ok(blob) => {
                if cache_reachable {
                    self.populate_cache(subject, &key, &blob).await;
                }
                self.fallback.put(subject.clone(), blob.clone());
                blob
            }
            Err(e) => {
                warn!(subject = %subject, error = %e, "corrupt durable payload, using empty state");
                StateBlob::new()
            }
        }
    }

    async fn load_durable(&self, subject: &Subject) -> Result<Option<StoredState>, RepositoryError> {
        let limit = self.config.durable_read_timeout();
        match tokio::time::timeout(limit, self.store.load(subject)).await {
            Ok(result) => result,
            Err(_) => Err(RepositoryError::Timeout(limit)),
        }
    }

    async fn populate_cache(&self, subject: &Subject, key: &str, blob: &StateBlob) {
        let payload = match PayloadCodec::encode(blob) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(subject = %subject, error = %e, "failed to encode state for cache");
                return;
            }
        };
        if let Err(e) = self.cache.set(key, &payload, self.config.cache_ttl()).await {
            warn!(subject = %subject, error = %e, "failed to populate cache");
        }
    }

    // --- Write path ---

    /// Store a complete blob for a subject.
    ///
    /// The cache write completes before this returns, so the next
    /// `get_state` on any worker sees `blob`. A cache failure is logged and
    /// skipped. Durable persistence is queued and happens on the next flush.
    pub async fn save_state(&self, subject: &Subject, blob: &StateBlob) -> Result<(), SessionError> {
        if blob.is_partial() {
            return Err(SessionError::PartialState(subject.clone()));
        }
        let payload = PayloadCodec::encode(blob)?;

        let key = self.config.cache_key(subject.as_str());
        if let Err(e) = self.cache.set(&key, &payload, self.config.cache_ttl()).await {
            warn!(subject = %subject, error = %e, "cache write skipped");
        }

        self.fallback.put(subject.clone(), blob.clone());
        self.batcher.enqueue(subject.clone(), blob.clone());
        debug!(subject = %subject, fields = blob.len(), "state saved");
        Ok(())
    }

    /// Replace a subject's state with only its retained fields.
    ///
    /// Returns the new blob.
    pub async fn reset_state(&self, subject: &Subject) -> Result<StateBlob, SessionError> {
        let current = self.get_state(subject).await;
        let reset = current.retain_only(&self.config.retained_fields);
        self.save_state(subject, &reset).await?;
        debug!(
            subject = %subject,
            dropped = current.len() - reset.len(),
            "state reset"
        );
        Ok(reset)
    }

    /// Apply cleanup rules for a workflow transition.
    ///
    /// Event and age rules are applied to `blob`, which is returned; the
    /// caller saves it. The process-local fallback copy is cleaned only where
    /// a rule's field has outlived the fallback freshness window; removed
    /// fields the copy keeps are carried through the caller's next save.
    pub fn on_flow_transition(&self, subject: &Subject, mut blob: StateBlob, event: &str) -> StateBlob {
        let now = Utc::now();
        let mut removed = self.cleanup.apply_on_transition(&mut blob, event);
        removed.extend(self.cleanup.apply_on_age(&mut blob, now));

        let freshness = self.config.fallback_ttl();
        self.fallback.update(subject, |copy| {
            self.cleanup.apply_to_fallback(copy, event, now, freshness);
        });
        self.fallback.carry(subject, &removed);

        if !removed.is_empty() {
            debug!(subject = %subject, event, removed = ?removed, "cleanup removed fields");
        }
        blob
    }

    // --- Action locks ---

    pub fn is_process_active(&self, action_id: &str) -> bool {
        self.locks.is_active(action_id)
    }

    /// Mark an action in flight. Returns `false` if it already was.
    pub fn mark_process_active(&self, action_id: &str) -> bool {
        self.locks.mark_active(action_id)
    }

    pub fn mark_process_inactive(&self, action_id: &str) -> bool {
        self.locks.mark_inactive(action_id)
    }

    /// Mark an action in flight for the lifetime of the returned guard.
    pub fn try_acquire_process(&self, action_id: &str) -> Option<ActionGuard> {
        self.locks.try_acquire(action_id)
    }

    // --- Flushing ---

    /// Force a flush of every queued write.
    pub async fn flush_now(&self) -> FlushReport {
        self.batcher.flush_now().await
    }
}

impl<C: CacheTier, D: DurableStore + 'static> SessionManager<C, D> {
    /// Spawn the batcher's background flush loop.
    pub fn start_background_flush(&self) -> FlushHandle {
        self.batcher.start()
    }
}

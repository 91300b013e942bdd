//! Coalescing write-back batcher.
//!
//! Pending writes are keyed by subject: a newer write for the same subject
//! replaces the older one, so a flush persists only the latest value. A flush
//! cycle runs on a timer tick or when the queue reaches its size threshold,
//! whichever comes first. At most one flush is in flight; writes arriving
//! during a flush wait for the next cycle. A drained write stays readable
//! through `pending_for` until its upsert returns, so a cache miss during a
//! flush never falls through to the older durable row.
//!
//! Pending writes live only in memory. Anything not yet flushed is lost if the
//! process dies; `FlushHandle::shutdown` performs a final flush on graceful exit.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures_util::StreamExt;
use futures_util::stream;
use sessiontier_types::config::SessionConfig;
use sessiontier_types::state::StateBlob;
use sessiontier_types::storage::{IdentityProjection, PendingWrite};
use sessiontier_types::subject::Subject;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::codec::PayloadCodec;
use crate::storage::durable_store::DurableStore;

/// Outcome of one flush cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Coalesced writes drained from the queue.
    pub attempted: usize,
    pub written: usize,
    /// Writes dropped after a durable failure. They are not retried.
    pub failed: usize,
}

/// In-memory queue of pending writes flushed to the durable store.
pub struct WriteBackBatcher<D: DurableStore> {
    store: Arc<D>,
    pending: DashMap<Subject, PendingWrite>,
    /// Drained writes whose upsert has not returned yet.
    in_flight: DashMap<Subject, PendingWrite>,
    /// Held for the duration of a flush.
    flush_gate: Mutex<()>,
    wake: Notify,
    threshold: usize,
    concurrency: usize,
    interval: Duration,
}

impl<D: DurableStore> WriteBackBatcher<D> {
    pub fn new(store: Arc<D>, config: &SessionConfig) -> Self {
        Self {
            store,
            pending: DashMap::new(),
            in_flight: DashMap::new(),
            flush_gate: Mutex::new(()),
            wake: Notify::new(),
            threshold: config.flush_threshold.max(1),
            concurrency: config.effective_flush_concurrency(),
            interval: config.flush_interval(),
        }
    }

    /// Queue a write, replacing any pending write for the same subject.
    ///
    /// Partial blobs are refused and `false` is returned. Never blocks.
    pub fn enqueue(&self, subject: Subject, blob: StateBlob) -> bool {
        if blob.is_partial() {
            warn!(subject = %subject, "refusing to queue partial state for durable write");
            return false;
        }
        let replaced = self
            .pending
            .insert(subject.clone(), PendingWrite::new(subject, blob))
            .is_some();
        if replaced {
            debug!("coalesced pending write");
        }
        if self.pending.len() >= self.threshold {
            self.wake.notify_one();
        }
        true
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// The newest blob for a subject not yet confirmed by the durable store.
    ///
    /// Checks the queue first, then writes drained by a flush still in flight.
    pub fn pending_for(&self, subject: &Subject) -> Option<StateBlob> {
        if let Some(write) = self.pending.get(subject) {
            return Some(write.blob.clone());
        }
        self.in_flight.get(subject).map(|w| w.blob.clone())
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    /// Run a flush cycle now, waiting for any in-flight flush to finish first.
    pub async fn flush_now(&self) -> FlushReport {
        let _gate = self.flush_gate.lock().await;
        self.run_flush().await
    }

    /// Run a flush cycle unless one is already in flight.
    pub async fn flush_if_idle(&self) -> Option<FlushReport> {
        let _gate = self.flush_gate.try_lock().ok()?;
        Some(self.run_flush().await)
    }

    /// Move every queued write to `in_flight` and return the batch.
    ///
    /// Each write is published to `in_flight` before it leaves `pending`, so
    /// `pending_for` sees it at every point. A write replaced by `enqueue`
    /// mid-drain stays queued for the next cycle.
    fn drain(&self) -> Vec<PendingWrite> {
        let snapshot: Vec<PendingWrite> = self.pending.iter().map(|w| w.value().clone()).collect();
        let mut batch = Vec::with_capacity(snapshot.len());
        for write in snapshot {
            self.in_flight.insert(write.subject.clone(), write.clone());
            let taken = self
                .pending
                .remove_if(&write.subject, |_, queued| is_same_write(queued, &write))
                .is_some();
            if taken {
                batch.push(write);
            } else {
                self.in_flight.remove(&write.subject);
            }
        }
        batch.sort_by_key(|w| w.enqueued_at);
        batch
    }

    async fn run_flush(&self) -> FlushReport {
        let batch = self.drain();
        if batch.is_empty() {
            return FlushReport::default();
        }

        let attempted = batch.len();
        let writes: Vec<_> = batch.into_iter().map(|write| self.persist(write)).collect();
        let outcomes: Vec<bool> = stream::iter(writes)
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let written = outcomes.iter().filter(|ok| **ok).count();
        let report = FlushReport {
            attempted,
            written,
            failed: attempted - written,
        };
        if report.failed > 0 {
            warn!(
                attempted = report.attempted,
                written = report.written,
                failed = report.failed,
                "flush completed with dropped writes"
            );
        } else {
            debug!(written = report.written, "flush completed");
        }
        report
    }

    async fn persist(&self, write: PendingWrite) -> bool {
        let ok = self.upsert(&write).await;
        self.in_flight
            .remove_if(&write.subject, |_, held| is_same_write(held, &write));
        ok
    }

    async fn upsert(&self, write: &PendingWrite) -> bool {
        let payload = match PayloadCodec::encode(&write.blob) {
            Ok(payload) => payload,
            Err(e) => {
                error!(subject = %write.subject, error = %e, "failed to encode pending write");
                return false;
            }
        };
        let projection = IdentityProjection::from_blob(&write.blob);
        match self
            .store
            .upsert(&write.subject, &payload, &projection, write.enqueued_at)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(subject = %write.subject, error = %e, "durable write failed, dropping");
                false
            }
        }
    }
}

fn is_same_write(a: &PendingWrite, b: &PendingWrite) -> bool {
    a.enqueued_at == b.enqueued_at && a.blob == b.blob
}

impl<D: DurableStore + 'static> WriteBackBatcher<D> {
    /// Spawn the background flush loop.
    ///
    /// The loop flushes on every timer tick and whenever `enqueue` reports the
    /// threshold was reached. Must be called from within a Tokio runtime.
    pub fn start(self: &Arc<Self>) -> FlushHandle {
        let batcher = Arc::clone(self);
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(batcher.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval.tick().await; // Skip first immediate tick

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        let report = batcher.flush_now().await;
                        info!(
                            written = report.written,
                            failed = report.failed,
                            "write-back batcher stopped after final flush"
                        );
                        break;
                    }
                    _ = interval.tick() => {
                        batcher.flush_if_idle().await;
                    }
                    _ = batcher.wake.notified() => {
                        batcher.flush_if_idle().await;
                    }
                }
            }
        });

        FlushHandle { cancel, task }
    }
}

/// Handle to a running flush loop.
#[derive(Debug)]
pub struct FlushHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl FlushHandle {
    /// Stop the loop after one final flush and wait for it to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            error!(error = %e, "flush loop terminated abnormally");
        }
    }
}

//! Fast partial loader for latency-critical entry points.
//!
//! Reads only the identity projection straight from the durable store,
//! skipping the cache tier and full payload decoding. The result is always
//! tagged partial.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Map;
use sessiontier_types::state::StateBlob;
use sessiontier_types::subject::Subject;
use tracing::{debug, warn};

use crate::storage::durable_store::DurableStore;

pub struct FastPathLoader<D: DurableStore> {
    store: Arc<D>,
    timeout: Duration,
}

impl<D: DurableStore> FastPathLoader<D> {
    pub fn new(store: Arc<D>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Load the identity projection of a subject as a partial blob.
    ///
    /// Missing rows, read failures and timeouts all yield an empty partial blob.
    pub async fn load(&self, subject: &Subject) -> StateBlob {
        match tokio::time::timeout(self.timeout, self.store.load_projection(subject)).await {
            Ok(Ok(Some(projection))) => projection.into_partial_blob(),
            Ok(Ok(None)) => {
                debug!(subject = %subject, "no durable row for fast path");
                StateBlob::partial(Map::new())
            }
            Ok(Err(e)) => {
                warn!(subject = %subject, error = %e, "fast path read failed");
                StateBlob::partial(Map::new())
            }
            Err(_) => {
                warn!(subject = %subject, timeout = ?self.timeout, "fast path read timed out");
                StateBlob::partial(Map::new())
            }
        }
    }
}

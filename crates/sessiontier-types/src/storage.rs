//! Storage-facing types.
//!
//! These types model what the durable store holds per subject, the narrow
//! identity projection read by the fast path, and the pending writes queued
//! by the write-back batcher.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::state::{StateBlob, TENANT_ID, TENANT_NAME};
use crate::subject::Subject;

/// One durable row: the encoded blob of a subject plus its last update time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredState {
    pub subject: Subject,
    pub payload: String,
    pub updated_at: DateTime<Utc>,
}

/// Listing row for operator inspection (no payload).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredStateSummary {
    pub subject: Subject,
    pub tenant_id: Option<String>,
    pub tenant_name: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// The identity fields the fast path reads without materializing the full blob.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityProjection {
    pub tenant_id: Option<String>,
    pub tenant_name: Option<String>,
}

impl IdentityProjection {
    /// Extract the projection columns from a complete blob.
    pub fn from_blob(blob: &StateBlob) -> Self {
        Self {
            tenant_id: blob.tenant_id().map(str::to_string),
            tenant_name: blob.tenant_name().map(str::to_string),
        }
    }

    /// Build a blob tagged partial from this projection.
    pub fn into_partial_blob(self) -> StateBlob {
        let mut fields = Map::new();
        if let Some(id) = self.tenant_id {
            fields.insert(TENANT_ID.to_string(), Value::String(id));
        }
        if let Some(name) = self.tenant_name {
            fields.insert(TENANT_NAME.to_string(), Value::String(name));
        }
        StateBlob::partial(fields)
    }
}

/// A write accepted by the session layer but not yet persisted durably.
///
/// At most one exists per subject; a newer write replaces the older one.
#[derive(Debug, Clone)]
pub struct PendingWrite {
    pub subject: Subject,
    pub blob: StateBlob,
    pub enqueued_at: DateTime<Utc>,
}

impl PendingWrite {
    pub fn new(subject: Subject, blob: StateBlob) -> Self {
        Self {
            subject,
            blob,
            enqueued_at: Utc::now(),
        }
    }
}

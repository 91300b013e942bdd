//! The per-subject state blob.
//!
//! A `StateBlob` is an open mapping of named fields to JSON values. The session
//! layer treats it as opaque except for a handful of recognized fields used by
//! the fast path, the reset whitelist, and cleanup rules.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value};

/// Tenant identifier field, part of the fast-path projection.
pub const TENANT_ID: &str = "tenantId";

/// Tenant display name field, part of the fast-path projection.
pub const TENANT_NAME: &str = "tenantName";

/// Current workflow status of the conversation.
pub const STATUS: &str = "status";

/// Identifier of an operation started but not yet confirmed.
pub const PENDING_OPERATION_ID: &str = "pendingOperationId";

/// Identifier of the last operation that completed.
pub const LAST_COMPLETED_OPERATION_ID: &str = "lastCompletedOperationId";

/// Timestamp of the last completed operation.
pub const LAST_COMPLETED_AT: &str = "lastCompletedAt";

/// Mutable state associated with one subject.
///
/// A blob marked `partial` holds only a projection of the real state (see the
/// fast-path loader). It must never be persisted as if it were complete; the
/// session manager rejects such writes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateBlob {
    fields: Map<String, Value>,
    partial: bool,
}

impl StateBlob {
    /// An empty, complete blob. This is the default state of a new subject.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self {
            fields,
            partial: false,
        }
    }

    /// A blob carrying only a projection of the subject's state.
    pub fn partial(fields: Map<String, Value>) -> Self {
        Self {
            fields,
            partial: true,
        }
    }

    pub fn is_partial(&self) -> bool {
        self.partial
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// String value of a field, if present and a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// Insert or overwrite a field, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn tenant_id(&self) -> Option<&str> {
        self.get_str(TENANT_ID)
    }

    pub fn tenant_name(&self) -> Option<&str> {
        self.get_str(TENANT_NAME)
    }

    /// A new complete blob holding only the whitelisted fields that are present.
    pub fn retain_only<S: AsRef<str>>(&self, whitelist: &[S]) -> StateBlob {
        let fields = whitelist
            .iter()
            .filter_map(|key| {
                let key = key.as_ref();
                self.fields.get(key).map(|v| (key.to_string(), v.clone()))
            })
            .collect();
        StateBlob::from_fields(fields)
    }

    /// Parse a timestamp field.
    ///
    /// Accepts epoch milliseconds (integer) or an RFC 3339 string. Anything
    /// else yields `None`.
    pub fn timestamp(&self, key: &str) -> Option<DateTime<Utc>> {
        match self.fields.get(key)? {
            Value::Number(n) => n
                .as_i64()
                .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
            Value::String(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            _ => None,
        }
    }
}

impl From<Map<String, Value>> for StateBlob {
    fn from(fields: Map<String, Value>) -> Self {
        Self::from_fields(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn blob(value: Value) -> StateBlob {
        match value {
            Value::Object(map) => StateBlob::from_fields(map),
            _ => panic!("test blob must be an object"),
        }
    }

    #[test]
    fn test_new_blob_is_empty_and_complete() {
        let state = StateBlob::new();
        assert!(state.is_empty());
        assert!(!state.is_partial());
    }

    #[test]
    fn test_insert_and_get() {
        let mut state = StateBlob::new();
        assert!(state.insert("esperando", "file_upload").is_none());
        assert_eq!(state.get_str("esperando"), Some("file_upload"));
        let previous = state.insert("esperando", "confirm");
        assert_eq!(previous, Some(json!("file_upload")));
    }

    #[test]
    fn test_tenant_accessors() {
        let state = blob(json!({"tenantId": "T1", "tenantName": "Acme"}));
        assert_eq!(state.tenant_id(), Some("T1"));
        assert_eq!(state.tenant_name(), Some("Acme"));
    }

    #[test]
    fn test_retain_only_keeps_whitelisted_fields() {
        let state = blob(json!({
            "tenantId": "T1",
            "esperando": "file_upload",
            "rows": [1, 2, 3],
        }));
        let kept = state.retain_only(&[TENANT_ID, TENANT_NAME]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept.tenant_id(), Some("T1"));
        assert!(!kept.contains_key("esperando"));
        assert!(!kept.is_partial());
    }

    #[test]
    fn test_retain_only_from_partial_is_complete() {
        let mut fields = Map::new();
        fields.insert(TENANT_ID.to_string(), json!("T1"));
        let partial = StateBlob::partial(fields);
        assert!(partial.is_partial());
        assert!(!partial.retain_only(&[TENANT_ID]).is_partial());
    }

    #[test]
    fn test_timestamp_from_millis_and_rfc3339() {
        let state = blob(json!({
            "millis": 1_700_000_000_000_i64,
            "text": "2024-01-02T03:04:05Z",
            "garbage": "yesterday",
        }));
        assert_eq!(
            state.timestamp("millis").unwrap().timestamp_millis(),
            1_700_000_000_000
        );
        assert_eq!(
            state.timestamp("text").unwrap().to_rfc3339(),
            "2024-01-02T03:04:05+00:00"
        );
        assert!(state.timestamp("garbage").is_none());
        assert!(state.timestamp("missing").is_none());
    }
}

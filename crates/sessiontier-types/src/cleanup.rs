//! Declarative cleanup rules for bounding state blob size.

use serde::{Deserialize, Serialize};

/// When a cleanup rule fires.
///
/// Serialized externally tagged, e.g. `trigger = { on_event = "switch_vendor" }`
/// or `trigger = { max_age_ms = 600000 }` in TOML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupTrigger {
    /// Fires unconditionally when the named flow-transition event occurs.
    OnEvent(String),
    /// Fires when the field's timestamp is older than this many milliseconds.
    MaxAgeMs(u64),
}

/// Removes one field from a state blob when its trigger fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupRule {
    /// Field removed when the rule fires.
    pub field: String,
    pub trigger: CleanupTrigger,
    /// Field holding the timestamp that ages `field`. Defaults to `{field}At`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_field: Option<String>,
}

impl CleanupRule {
    pub fn on_event(field: impl Into<String>, event: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            trigger: CleanupTrigger::OnEvent(event.into()),
            timestamp_field: None,
        }
    }

    pub fn max_age(field: impl Into<String>, max_age_ms: u64) -> Self {
        Self {
            field: field.into(),
            trigger: CleanupTrigger::MaxAgeMs(max_age_ms),
            timestamp_field: None,
        }
    }

    pub fn with_timestamp_field(mut self, timestamp_field: impl Into<String>) -> Self {
        self.timestamp_field = Some(timestamp_field.into());
        self
    }

    /// Name of the field carrying this rule's timestamp.
    pub fn timestamp_field(&self) -> String {
        self.timestamp_field
            .clone()
            .unwrap_or_else(|| format!("{}At", self.field))
    }

    pub fn fires_on(&self, event: &str) -> bool {
        matches!(&self.trigger, CleanupTrigger::OnEvent(e) if e == event)
    }
}

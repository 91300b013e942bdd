//! Field cleanup policy.
//!
//! Removes heavy or optional fields from a state blob when a workflow
//! transition event fires or when a timestamped field grows too old. Rules
//! are declarative (`CleanupRule`) and come from configuration; a field with
//! no rule is never removed.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sessiontier_types::cleanup::{CleanupRule, CleanupTrigger};
use sessiontier_types::state::StateBlob;

/// Applies a fixed set of cleanup rules to state blobs.
#[derive(Debug, Clone, Default)]
pub struct StateCleanupPolicy {
    rules: Vec<CleanupRule>,
}

impl StateCleanupPolicy {
    pub fn new(rules: Vec<CleanupRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[CleanupRule] {
        &self.rules
    }

    /// Remove every field whose rule fires on `event`. Returns the removed field names.
    pub fn apply_on_transition(&self, blob: &mut StateBlob, event: &str) -> Vec<String> {
        let mut removed = Vec::new();
        for rule in self.rules.iter().filter(|r| r.fires_on(event)) {
            if blob.remove(&rule.field).is_some() {
                removed.push(rule.field.clone());
            }
        }
        removed
    }

    /// Remove every field whose age exceeds its rule's `max_age_ms` as of `now`.
    ///
    /// Fields without a parseable timestamp are kept.
    pub fn apply_on_age(&self, blob: &mut StateBlob, now: DateTime<Utc>) -> Vec<String> {
        let mut removed = Vec::new();
        for rule in &self.rules {
            let CleanupTrigger::MaxAgeMs(max_age_ms) = rule.trigger else {
                continue;
            };
            if !blob.contains_key(&rule.field) {
                continue;
            }
            let Some(age) = field_age(blob, rule, now) else {
                continue;
            };
            if age > Duration::from_millis(max_age_ms) {
                blob.remove(&rule.field);
                removed.push(rule.field.clone());
            }
        }
        removed
    }

    /// Clean a second-tier fallback copy.
    ///
    /// Age rules apply as usual. Event rules only remove a field once it is
    /// older than `freshness` (or carries no timestamp), so the copy keeps
    /// serving data that is still inside its own freshness window.
    pub fn apply_to_fallback(
        &self,
        blob: &mut StateBlob,
        event: &str,
        now: DateTime<Utc>,
        freshness: Duration,
    ) -> Vec<String> {
        let mut removed = self.apply_on_age(blob, now);
        for rule in self.rules.iter().filter(|r| r.fires_on(event)) {
            if !blob.contains_key(&rule.field) {
                continue;
            }
            let stale = match field_age(blob, rule, now) {
                Some(age) => age > freshness,
                None => true,
            };
            if stale {
                blob.remove(&rule.field);
                removed.push(rule.field.clone());
            }
        }
        removed
    }
}

fn field_age(blob: &StateBlob, rule: &CleanupRule, now: DateTime<Utc>) -> Option<Duration> {
    let stamped = blob.timestamp(&rule.timestamp_field())?;
    Some((now - stamped).to_std().unwrap_or_default())
}

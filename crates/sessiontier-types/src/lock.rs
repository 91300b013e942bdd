//! Action lock records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An in-flight logical action held by this process.
///
/// Created on `mark_active`, destroyed on `mark_inactive`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessLock {
    pub action_id: String,
    pub acquired_at: DateTime<Utc>,
}

impl ProcessLock {
    pub fn new(action_id: impl Into<String>) -> Self {
        Self {
            action_id: action_id.into(),
            acquired_at: Utc::now(),
        }
    }

    /// How long the lock has been held as of `now` (zero if `now` is earlier).
    pub fn held_for(&self, now: DateTime<Utc>) -> chrono::Duration {
        (now - self.acquired_at).max(chrono::Duration::zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_held_for() {
        let lock = ProcessLock::new("confirm-invoice:U1");
        let later = lock.acquired_at + chrono::Duration::seconds(5);
        assert_eq!(lock.held_for(later).num_seconds(), 5);
        let earlier = lock.acquired_at - chrono::Duration::seconds(5);
        assert_eq!(lock.held_for(earlier), chrono::Duration::zero());
    }
}

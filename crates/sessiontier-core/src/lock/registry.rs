//! Per-process registry of in-flight action identifiers.
//!
//! Every `mark_active` must be matched by exactly one `mark_inactive`, on the
//! error path too, or the id stays locked for the process lifetime. Prefer
//! `try_acquire`, whose guard releases on drop.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use sessiontier_types::lock::ProcessLock;
use tracing::{debug, warn};

/// Process-local set of action ids currently being executed.
///
/// Cloning produces a shared view of the same registry (backed by `Arc`).
/// Two different processes never see each other's locks.
#[derive(Debug, Clone, Default)]
pub struct ProcessLockRegistry {
    active: Arc<DashMap<String, ProcessLock>>,
}

impl ProcessLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self, action_id: &str) -> bool {
        self.active.contains_key(action_id)
    }

    /// Mark an action as in flight.
    ///
    /// Returns `false` when the action was already active; that is the normal
    /// "already in progress" signal for a duplicate trigger, not an error.
    pub fn mark_active(&self, action_id: &str) -> bool {
        match self.active.entry(action_id.to_string()) {
            Entry::Occupied(_) => {
                debug!(action_id, "duplicate action rejected");
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(ProcessLock::new(action_id));
                true
            }
        }
    }

    /// Release an action. Returns whether it was held.
    pub fn mark_inactive(&self, action_id: &str) -> bool {
        let released = self.active.remove(action_id).is_some();
        if !released {
            warn!(action_id, "released an action that was not active");
        }
        released
    }

    /// Acquire an action for the lifetime of the returned guard.
    ///
    /// Returns `None` if the action is already in flight.
    pub fn try_acquire(&self, action_id: &str) -> Option<ActionGuard> {
        if self.mark_active(action_id) {
            Some(ActionGuard {
                registry: self.clone(),
                action_id: action_id.to_string(),
                released: false,
            })
        } else {
            None
        }
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Snapshot of all active action ids.
    pub fn active_ids(&self) -> Vec<String> {
        self.active.iter().map(|r| r.key().clone()).collect()
    }

    /// Locks held for longer than `age`, oldest first. Useful for spotting leaks.
    pub fn held_longer_than(&self, age: Duration) -> Vec<ProcessLock> {
        let now = Utc::now();
        let mut stale: Vec<ProcessLock> = self
            .active
            .iter()
            .filter(|r| r.value().held_for(now).to_std().unwrap_or_default() > age)
            .map(|r| r.value().clone())
            .collect();
        stale.sort_by_key(|lock| lock.acquired_at);
        stale
    }
}

/// Holds an action id active until dropped or explicitly released.
#[derive(Debug)]
pub struct ActionGuard {
    registry: ProcessLockRegistry,
    action_id: String,
    released: bool,
}

impl ActionGuard {
    pub fn action_id(&self) -> &str {
        &self.action_id
    }

    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if !self.released {
            self.released = true;
            self.registry.mark_inactive(&self.action_id);
        }
    }
}

impl Drop for ActionGuard {
    fn drop(&mut self) {
        self.release_inner();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_active_then_inactive() {
        let locks = ProcessLockRegistry::new();
        assert!(!locks.is_active("x"));
        assert!(locks.mark_active("x"));
        assert!(locks.is_active("x"));
        assert!(locks.mark_inactive("x"));
        assert!(!locks.is_active("x"));
    }

    #[test]
    fn duplicate_mark_active_is_rejected() {
        let locks = ProcessLockRegistry::new();
        assert!(locks.mark_active("confirm:U1"));
        assert!(!locks.mark_active("confirm:U1"));
        assert_eq!(locks.active_count(), 1);
    }

    #[test]
    fn mark_inactive_unknown_returns_false() {
        let locks = ProcessLockRegistry::new();
        assert!(!locks.mark_inactive("never-held"));
    }

    #[test]
    fn guard_releases_on_drop() {
        let locks = ProcessLockRegistry::new();
        {
            let guard = locks.try_acquire("x").unwrap();
            assert_eq!(guard.action_id(), "x");
            assert!(locks.is_active("x"));
            assert!(locks.try_acquire("x").is_none());
        }
        assert!(!locks.is_active("x"));
    }

    #[test]
    fn guard_releases_on_error_path() {
        fn failing_action(locks: &ProcessLockRegistry) -> Result<(), String> {
            let _guard = locks.try_acquire("x").ok_or("busy")?;
            Err("downstream failure".to_string())
        }

        let locks = ProcessLockRegistry::new();
        assert!(failing_action(&locks).is_err());
        assert!(!locks.is_active("x"));
    }

    #[test]
    fn explicit_release_is_not_doubled_by_drop() {
        let locks = ProcessLockRegistry::new();
        let guard = locks.try_acquire("x").unwrap();
        guard.release();
        assert!(!locks.is_active("x"));
        // Reacquire and make sure the earlier guard's drop did not free it.
        let _second = locks.try_acquire("x").unwrap();
        assert!(locks.is_active("x"));
    }

    #[test]
    fn clone_shares_registry() {
        let locks = ProcessLockRegistry::new();
        let other = locks.clone();
        locks.mark_active("x");
        assert!(other.is_active("x"));
    }

    #[test]
    fn held_longer_than_filters_fresh_locks() {
        let locks = ProcessLockRegistry::new();
        locks.mark_active("fresh");
        assert!(locks.held_longer_than(Duration::from_secs(60)).is_empty());
        let all = locks.held_longer_than(Duration::ZERO);
        // A lock acquired in the same millisecond may report zero age.
        assert!(all.len() <= 1);
    }

    #[tokio::test]
    async fn concurrent_triggers_admit_exactly_one() {
        let locks = ProcessLockRegistry::new();
        let mut handles = Vec::new();
        for _ in 0..32 {
            let locks = locks.clone();
            handles.push(tokio::spawn(async move { locks.mark_active("double-click") }));
        }
        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1);
    }
}

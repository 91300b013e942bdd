//! Short-lived process-local copy of recently seen state.
//!
//! Consulted only when the shared cache tier is unreachable. Entries expire
//! after the configured freshness window. Values are cloned on read so no
//! `DashMap` guard is held across `.await`.
//!
//! Fields that cleanup removed from the live state but that are still fresh
//! can be carried: later `put`s for the subject keep them in the copy until
//! one freshness window has passed since they were carried.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use sessiontier_types::state::StateBlob;
use sessiontier_types::subject::Subject;

#[derive(Debug, Clone)]
struct CarriedFields {
    fields: Vec<String>,
    since: Instant,
}

#[derive(Debug)]
struct FallbackEntry {
    blob: StateBlob,
    stored_at: Instant,
    carried: Option<CarriedFields>,
}

/// Second-tier cache of the last blob read or saved per subject.
#[derive(Debug)]
pub struct FallbackCache {
    entries: DashMap<Subject, FallbackEntry>,
    ttl: Duration,
}

impl FallbackCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Fresh copy for a subject, if any. Expired entries are evicted.
    pub fn get(&self, subject: &Subject) -> Option<StateBlob> {
        let fresh = self
            .entries
            .get(subject)
            .map(|entry| (entry.stored_at.elapsed() < self.ttl, entry.blob.clone()));
        match fresh {
            Some((true, blob)) => Some(blob),
            Some((false, _)) => {
                self.entries.remove(subject);
                None
            }
            None => None,
        }
    }

    /// Store the latest blob for a subject, keeping any carried fields the
    /// new blob lacks.
    pub fn put(&self, subject: Subject, mut blob: StateBlob) {
        if self.ttl.is_zero() {
            return;
        }
        match self.entries.entry(subject) {
            Entry::Occupied(mut occupied) => {
                let previous = occupied.get();
                let carried = previous
                    .carried
                    .clone()
                    .filter(|c| c.since.elapsed() < self.ttl);
                if let Some(carried) = &carried {
                    for field in &carried.fields {
                        if blob.contains_key(field) {
                            continue;
                        }
                        if let Some(value) = previous.blob.get(field) {
                            blob.insert(field.clone(), value.clone());
                        }
                    }
                }
                occupied.insert(FallbackEntry {
                    blob,
                    stored_at: Instant::now(),
                    carried,
                });
            }
            Entry::Vacant(vacant) => {
                vacant.insert(FallbackEntry {
                    blob,
                    stored_at: Instant::now(),
                    carried: None,
                });
            }
        }
    }

    /// Keep `fields` in the subject's copy across later `put`s.
    ///
    /// Only fields the copy still holds are carried. No-op without a copy.
    pub fn carry(&self, subject: &Subject, fields: &[String]) {
        if let Some(mut entry) = self.entries.get_mut(subject) {
            let kept: Vec<String> = fields
                .iter()
                .filter(|f| entry.blob.contains_key(f))
                .cloned()
                .collect();
            entry.carried = if kept.is_empty() {
                None
            } else {
                Some(CarriedFields {
                    fields: kept,
                    since: Instant::now(),
                })
            };
        }
    }

    /// Mutate an existing copy in place without refreshing its age.
    pub fn update<F: FnOnce(&mut StateBlob)>(&self, subject: &Subject, f: F) {
        if let Some(mut entry) = self.entries.get_mut(subject) {
            f(&mut entry.blob);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

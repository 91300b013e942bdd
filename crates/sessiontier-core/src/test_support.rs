//! In-memory test doubles for the storage ports.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sessiontier_types::error::{CacheError, RepositoryError};
use sessiontier_types::storage::{IdentityProjection, StoredState, StoredStateSummary};
use sessiontier_types::subject::Subject;

use crate::storage::cache_tier::CacheTier;
use crate::storage::durable_store::DurableStore;

/// Cache double that ignores TTLs and can be switched offline.
#[derive(Default)]
pub(crate) struct MemoryCache {
    entries: DashMap<String, String>,
    offline: AtomicBool,
    sets: AtomicUsize,
}

impl MemoryCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub(crate) fn set_count(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    pub(crate) fn raw(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|r| r.value().clone())
    }

    pub(crate) fn put_raw(&self, key: &str, value: &str) {
        self.entries.insert(key.to_string(), value.to_string());
    }

    fn check(&self) -> Result<(), CacheError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(CacheError::Unavailable("cache offline".to_string()))
        } else {
            Ok(())
        }
    }
}

impl CacheTier for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.check()?;
        Ok(self.raw(key))
    }

    async fn set(&self, key: &str, value: &str, _ttl: Duration) -> Result<(), CacheError> {
        self.check()?;
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.put_raw(key, value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        self.check()?;
        Ok(self.entries.remove(key).is_some())
    }

    async fn set_if_absent(&self, key: &str, value: &str, _ttl: Duration) -> Result<bool, CacheError> {
        self.check()?;
        let mut inserted = false;
        self.entries.entry(key.to_string()).or_insert_with(|| {
            inserted = true;
            value.to_string()
        });
        Ok(inserted)
    }
}

/// Durable store double that records every upsert.
#[derive(Default)]
pub(crate) struct MemoryStore {
    rows: DashMap<Subject, (StoredState, IdentityProjection)>,
    upserts: Mutex<Vec<(Subject, String)>>,
    failing: DashMap<Subject, ()>,
    offline: AtomicBool,
    read_delay: Option<Duration>,
    write_delay: Option<Duration>,
}

impl MemoryStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_read_delay(delay: Duration) -> Self {
        Self {
            read_delay: Some(delay),
            ..Self::default()
        }
    }

    pub(crate) fn with_write_delay(delay: Duration) -> Self {
        Self {
            write_delay: Some(delay),
            ..Self::default()
        }
    }

    pub(crate) fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub(crate) fn fail_writes_for(&self, subject: &Subject) {
        self.failing.insert(subject.clone(), ());
    }

    /// Seed a row directly, bypassing the upsert log.
    pub(crate) fn seed(&self, subject: &Subject, payload: &str, projection: IdentityProjection) {
        let row = StoredState {
            subject: subject.clone(),
            payload: payload.to_string(),
            updated_at: Utc::now(),
        };
        self.rows.insert(subject.clone(), (row, projection));
    }

    pub(crate) fn payload(&self, subject: &Subject) -> Option<String> {
        self.rows.get(subject).map(|r| r.value().0.payload.clone())
    }

    pub(crate) fn upserts(&self) -> Vec<(Subject, String)> {
        self.upserts.lock().unwrap().clone()
    }

    pub(crate) fn upserts_for(&self, subject: &Subject) -> usize {
        self.upserts()
            .iter()
            .filter(|(s, _)| s == subject)
            .count()
    }

    async fn before_read(&self) -> Result<(), RepositoryError> {
        if let Some(delay) = self.read_delay {
            tokio::time::sleep(delay).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(RepositoryError::Connection);
        }
        Ok(())
    }
}

impl DurableStore for MemoryStore {
    async fn load(&self, subject: &Subject) -> Result<Option<StoredState>, RepositoryError> {
        self.before_read().await?;
        Ok(self.rows.get(subject).map(|r| r.value().0.clone()))
    }

    async fn load_projection(
        &self,
        subject: &Subject,
    ) -> Result<Option<IdentityProjection>, RepositoryError> {
        self.before_read().await?;
        Ok(self.rows.get(subject).map(|r| r.value().1.clone()))
    }

    async fn upsert(
        &self,
        subject: &Subject,
        payload: &str,
        projection: &IdentityProjection,
        updated_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        if let Some(delay) = self.write_delay {
            tokio::time::sleep(delay).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(RepositoryError::Connection);
        }
        if self.failing.contains_key(subject) {
            return Err(RepositoryError::Query("injected failure".to_string()));
        }
        let row = StoredState {
            subject: subject.clone(),
            payload: payload.to_string(),
            updated_at,
        };
        self.rows
            .insert(subject.clone(), (row, projection.clone()));
        self.upserts
            .lock()
            .unwrap()
            .push((subject.clone(), payload.to_string()));
        Ok(())
    }

    async fn list_recent(&self, limit: u32) -> Result<Vec<StoredStateSummary>, RepositoryError> {
        let mut rows: Vec<StoredStateSummary> = self
            .rows
            .iter()
            .map(|r| {
                let (row, projection) = r.value();
                StoredStateSummary {
                    subject: row.subject.clone(),
                    tenant_id: projection.tenant_id.clone(),
                    tenant_name: projection.tenant_name.clone(),
                    updated_at: row.updated_at,
                }
            })
            .collect();
        rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        rows.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(rows)
    }
}

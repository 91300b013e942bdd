//! SQLite durable store implementation.
//!
//! Implements `DurableStore` from `sessiontier-core`. One row per subject in
//! `session_state`; the identity projection is kept in its own columns so the
//! fast path never touches the payload.

use chrono::{DateTime, SecondsFormat, Utc};
use sessiontier_core::storage::durable_store::DurableStore;
use sessiontier_types::error::RepositoryError;
use sessiontier_types::storage::{IdentityProjection, StoredState, StoredStateSummary};
use sessiontier_types::subject::Subject;
use sqlx::Row;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `DurableStore`.
#[derive(Clone)]
pub struct SqliteDurableStore {
    pool: DatabasePool,
}

impl SqliteDurableStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn map_sqlx(e: sqlx::Error) -> RepositoryError {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            RepositoryError::Connection
        }
        other => RepositoryError::Query(other.to_string()),
    }
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

/// Fixed-width UTC form so `ORDER BY updated_at` sorts chronologically.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn summary_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<StoredStateSummary, RepositoryError> {
    let subject: String = row.try_get("subject").map_err(map_sqlx)?;
    let updated_at: String = row.try_get("updated_at").map_err(map_sqlx)?;
    Ok(StoredStateSummary {
        subject: Subject::new(subject),
        tenant_id: row.try_get("tenant_id").map_err(map_sqlx)?,
        tenant_name: row.try_get("tenant_name").map_err(map_sqlx)?,
        updated_at: parse_datetime(&updated_at)?,
    })
}

// ---------------------------------------------------------------------------
// DurableStore implementation
// ---------------------------------------------------------------------------

impl DurableStore for SqliteDurableStore {
    async fn load(&self, subject: &Subject) -> Result<Option<StoredState>, RepositoryError> {
        let row = sqlx::query("SELECT payload, updated_at FROM session_state WHERE subject = ?")
            .bind(subject.as_str())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(map_sqlx)?;

        match row {
            Some(row) => {
                let payload: String = row.try_get("payload").map_err(map_sqlx)?;
                let updated_at: String = row.try_get("updated_at").map_err(map_sqlx)?;
                Ok(Some(StoredState {
                    subject: subject.clone(),
                    payload,
                    updated_at: parse_datetime(&updated_at)?,
                }))
            }
            None => Ok(None),
        }
    }

    async fn load_projection(
        &self,
        subject: &Subject,
    ) -> Result<Option<IdentityProjection>, RepositoryError> {
        let row = sqlx::query("SELECT tenant_id, tenant_name FROM session_state WHERE subject = ?")
            .bind(subject.as_str())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(map_sqlx)?;

        match row {
            Some(row) => Ok(Some(IdentityProjection {
                tenant_id: row.try_get("tenant_id").map_err(map_sqlx)?,
                tenant_name: row.try_get("tenant_name").map_err(map_sqlx)?,
            })),
            None => Ok(None),
        }
    }

    async fn upsert(
        &self,
        subject: &Subject,
        payload: &str,
        projection: &IdentityProjection,
        updated_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO session_state (subject, tenant_id, tenant_name, payload, updated_at)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT (subject) DO UPDATE SET
                   tenant_id = excluded.tenant_id,
                   tenant_name = excluded.tenant_name,
                   payload = excluded.payload,
                   updated_at = excluded.updated_at"#,
        )
        .bind(subject.as_str())
        .bind(projection.tenant_id.as_deref())
        .bind(projection.tenant_name.as_deref())
        .bind(payload)
        .bind(format_datetime(&updated_at))
        .execute(&self.pool.writer)
        .await
        .map_err(map_sqlx)?;

        Ok(())
    }

    async fn list_recent(&self, limit: u32) -> Result<Vec<StoredStateSummary>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT subject, tenant_id, tenant_name, updated_at FROM session_state ORDER BY updated_at DESC LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool.reader)
        .await
        .map_err(map_sqlx)?;

        rows.iter().map(summary_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::cache::memory::MemoryCacheTier;
    use sessiontier_core::codec::PayloadCodec;
    use sessiontier_core::session::{RequestHandler, RequestContext, RequestMiddleware, SessionManager};
    use sessiontier_types::config::SessionConfig;
    use sessiontier_types::state::StateBlob;

    async fn test_store() -> (SqliteDurableStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display());
        let pool = DatabasePool::new(&url).await.unwrap();
        (SqliteDurableStore::new(pool), dir)
    }

    fn projection(tenant_id: &str, tenant_name: Option<&str>) -> IdentityProjection {
        IdentityProjection {
            tenant_id: Some(tenant_id.to_string()),
            tenant_name: tenant_name.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_load_missing_subject() {
        let (store, _dir) = test_store().await;
        let subject = Subject::from("nobody");
        assert!(store.load(&subject).await.unwrap().is_none());
        assert!(store.load_projection(&subject).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_then_load() {
        let (store, _dir) = test_store().await;
        let subject = Subject::from("U1");
        let now = Utc::now();

        store
            .upsert(&subject, r#"{"tenantId":"T1"}"#, &projection("T1", None), now)
            .await
            .unwrap();

        let row = store.load(&subject).await.unwrap().unwrap();
        assert_eq!(row.payload, r#"{"tenantId":"T1"}"#);
        assert_eq!(row.updated_at.timestamp_millis(), now.timestamp_millis());
    }

    #[tokio::test]
    async fn test_upsert_replaces_row_and_projection() {
        let (store, _dir) = test_store().await;
        let subject = Subject::from("U1");

        store
            .upsert(&subject, r#"{"v":1}"#, &projection("T1", Some("Acme")), Utc::now())
            .await
            .unwrap();
        store
            .upsert(&subject, r#"{"v":2}"#, &IdentityProjection::default(), Utc::now())
            .await
            .unwrap();

        assert_eq!(store.load(&subject).await.unwrap().unwrap().payload, r#"{"v":2}"#);
        assert_eq!(
            store.load_projection(&subject).await.unwrap(),
            Some(IdentityProjection::default())
        );
        assert_eq!(store.list_recent(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_recent_newest_first() {
        let (store, _dir) = test_store().await;
        let base = Utc::now();
        for (i, name) in ["U1", "U2", "U3"].iter().enumerate() {
            store
                .upsert(
                    &Subject::from(*name),
                    "{}",
                    &projection("T1", None),
                    base + chrono::Duration::seconds(i as i64),
                )
                .await
                .unwrap();
        }

        let recent = store.list_recent(2).await.unwrap();
        let subjects: Vec<&str> = recent.iter().map(|s| s.subject.as_str()).collect();
        assert_eq!(subjects, vec!["U3", "U2"]);
        assert_eq!(recent[0].tenant_id.as_deref(), Some("T1"));
        assert!(store.list_recent(0).await.unwrap().is_empty());
    }

    // -----------------------------------------------------------------------
    // End-to-end scenarios against SQLite and the in-process cache tier
    // -----------------------------------------------------------------------

    type Manager = SessionManager<MemoryCacheTier, SqliteDurableStore>;

    fn manager_over(cache: &Arc<MemoryCacheTier>, store: &SqliteDurableStore) -> Manager {
        SessionManager::new(
            Arc::clone(cache),
            Arc::new(store.clone()),
            SessionConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_new_subject_visible_to_second_worker_then_durable() {
        let (store, _dir) = test_store().await;
        let cache = Arc::new(MemoryCacheTier::new());
        let worker_a = manager_over(&cache, &store);
        let worker_b = manager_over(&cache, &store);
        let subject = Subject::from("U1");

        let mut state = worker_a.get_state(&subject).await;
        assert!(state.is_empty());
        state.insert("esperando", "file_upload");
        state.insert("tenantId", "T1");
        worker_a.save_state(&subject, &state).await.unwrap();

        let seen = worker_b.get_state(&subject).await;
        assert_eq!(seen, state);

        assert_eq!(worker_a.flush_now().await.written, 1);
        let row = store.load(&subject).await.unwrap().unwrap();
        assert_eq!(PayloadCodec::decode(&row.payload).unwrap(), state);
        assert_eq!(
            store.load_projection(&subject).await.unwrap(),
            Some(projection("T1", None))
        );
    }

    #[tokio::test]
    async fn test_later_write_wins_after_flush() {
        let (store, _dir) = test_store().await;
        let cache = Arc::new(MemoryCacheTier::new());
        let manager = manager_over(&cache, &store);
        let subject = Subject::from("U1");

        let mut v1 = StateBlob::new();
        v1.insert("v", 1);
        let mut v2 = StateBlob::new();
        v2.insert("v", 2);
        manager.save_state(&subject, &v1).await.unwrap();
        manager.save_state(&subject, &v2).await.unwrap();

        let report = manager.flush_now().await;
        assert_eq!(report.attempted, 1);
        let row = store.load(&subject).await.unwrap().unwrap();
        assert_eq!(PayloadCodec::decode(&row.payload).unwrap(), v2);
    }

    struct Peek;

    impl RequestHandler<MemoryCacheTier, SqliteDurableStore> for Peek {
        type Output = Option<String>;
        type Error = String;

        async fn handle(
            &self,
            ctx: &mut RequestContext<MemoryCacheTier, SqliteDurableStore>,
        ) -> Result<Option<String>, String> {
            Ok(ctx.state().tenant_name().map(str::to_string))
        }
    }

    #[tokio::test]
    async fn test_fast_path_request_never_writes() {
        let (store, _dir) = test_store().await;
        let subject = Subject::from("U1");
        let stamp = Utc::now() - chrono::Duration::hours(1);
        store
            .upsert(
                &subject,
                r#"{"tenantId":"T1","tenantName":"Acme","rows":[1,2]}"#,
                &projection("T1", Some("Acme")),
                stamp,
            )
            .await
            .unwrap();

        let cache = Arc::new(MemoryCacheTier::new());
        let manager = Arc::new(manager_over(&cache, &store));
        let middleware = RequestMiddleware::new(Arc::clone(&manager));

        let name = middleware.run(subject.clone(), "start", &Peek).await.unwrap();
        assert_eq!(name.as_deref(), Some("Acme"));
        assert_eq!(manager.batcher().pending_len(), 0);
        assert_eq!(manager.flush_now().await.attempted, 0);

        let row = store.load(&subject).await.unwrap().unwrap();
        assert_eq!(row.updated_at.timestamp_millis(), stamp.timestamp_millis());
        assert!(row.payload.contains("rows"));
    }
}

//! Durable store trait.
//!
//! The durable store is the slower, authoritative relational copy: one row per
//! subject holding the encoded blob, its identity projection, and `updated_at`.

use chrono::{DateTime, Utc};
use sessiontier_types::error::RepositoryError;
use sessiontier_types::storage::{IdentityProjection, StoredState, StoredStateSummary};
use sessiontier_types::subject::Subject;

/// Trait for the per-subject durable state table.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
/// Implementations live in sessiontier-infra.
pub trait DurableStore: Send + Sync {
    /// Load the full row for a subject. Returns None if no row exists.
    fn load(
        &self,
        subject: &Subject,
    ) -> impl std::future::Future<Output = Result<Option<StoredState>, RepositoryError>> + Send;

    /// Load only the identity projection (narrow query for the fast path).
    fn load_projection(
        &self,
        subject: &Subject,
    ) -> impl std::future::Future<Output = Result<Option<IdentityProjection>, RepositoryError>> + Send;

    /// Insert or replace the row for a subject.
    fn upsert(
        &self,
        subject: &Subject,
        payload: &str,
        projection: &IdentityProjection,
        updated_at: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Most recently updated subjects, newest first.
    fn list_recent(
        &self,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<StoredStateSummary>, RepositoryError>> + Send;
}

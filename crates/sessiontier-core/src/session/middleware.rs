//! Per-request state middleware.
//!
//! `RequestMiddleware::begin` loads state (partial via the fast path for
//! designated entry points, full otherwise) and snapshots its encoded form.
//! `finish` saves only when the state is complete and differs from the
//! snapshot. `run` wraps a `RequestHandler` with both steps; a handler error
//! skips persistence.

use std::future::Future;
use std::sync::Arc;

use sessiontier_types::state::StateBlob;
use sessiontier_types::subject::Subject;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::codec::PayloadCodec;
use crate::session::fast_path::FastPathLoader;
use crate::session::manager::SessionManager;
use crate::storage::cache_tier::CacheTier;
use crate::storage::durable_store::DurableStore;

/// What `finish` did with the request's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    Saved,
    Unchanged,
    /// State was still partial at request end.
    SkippedPartial,
    Failed,
}

/// State and identity of one in-flight request.
pub struct RequestContext<C: CacheTier, D: DurableStore> {
    pub request_id: Uuid,
    subject: Subject,
    entry_point: String,
    state: StateBlob,
    snapshot: Option<String>,
    manager: Arc<SessionManager<C, D>>,
}

impl<C: CacheTier, D: DurableStore> RequestContext<C, D> {
    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    pub fn state(&self) -> &StateBlob {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut StateBlob {
        &mut self.state
    }

    pub fn is_partial(&self) -> bool {
        self.state.is_partial()
    }

    pub fn manager(&self) -> &Arc<SessionManager<C, D>> {
        &self.manager
    }

    /// Replace a partial state with the full state of the subject.
    ///
    /// Must be called before mutating state loaded by the fast path. Any
    /// edits made to the partial blob are discarded. No-op if already full.
    pub async fn upgrade_to_full(&mut self) -> &mut StateBlob {
        if self.state.is_partial() {
            self.state = self.manager.get_state(&self.subject).await;
            self.snapshot = snapshot_of(&self.state);
            debug!(request_id = %self.request_id, "upgraded partial state");
        }
        &mut self.state
    }

    /// Apply cleanup rules for a workflow transition to the request's state.
    pub fn transition(&mut self, event: &str) {
        let state = std::mem::take(&mut self.state);
        self.state = self.manager.on_flow_transition(&self.subject, state, event);
    }
}

/// A request handler run inside `RequestMiddleware::run`.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
pub trait RequestHandler<C: CacheTier, D: DurableStore>: Send + Sync {
    type Output: Send;
    type Error: Send + std::fmt::Display;

    fn handle(
        &self,
        ctx: &mut RequestContext<C, D>,
    ) -> impl Future<Output = Result<Self::Output, Self::Error>> + Send;
}

pub struct RequestMiddleware<C: CacheTier, D: DurableStore> {
    manager: Arc<SessionManager<C, D>>,
    fast_path: FastPathLoader<D>,
}

impl<C: CacheTier, D: DurableStore> RequestMiddleware<C, D> {
    pub fn new(manager: Arc<SessionManager<C, D>>) -> Self {
        let fast_path = FastPathLoader::new(
            Arc::clone(manager.store()),
            manager.config().durable_read_timeout(),
        );
        Self { manager, fast_path }
    }

    pub fn manager(&self) -> &Arc<SessionManager<C, D>> {
        &self.manager
    }

    /// Load state for a request and snapshot it.
    pub async fn begin(&self, subject: Subject, entry_point: &str) -> RequestContext<C, D> {
        let state = if self.manager.config().is_fast_path(entry_point) {
            self.fast_path.load(&subject).await
        } else {
            self.manager.get_state(&subject).await
        };
        let request_id = Uuid::now_v7();
        debug!(
            request_id = %request_id,
            subject = %subject,
            entry_point,
            partial = state.is_partial(),
            "request state loaded"
        );
        RequestContext {
            request_id,
            snapshot: snapshot_of(&state),
            subject,
            entry_point: entry_point.to_string(),
            state,
            manager: Arc::clone(&self.manager),
        }
    }

    /// Persist the request's state if it is complete and changed.
    pub async fn finish(&self, ctx: RequestContext<C, D>) -> PersistOutcome {
        if ctx.state.is_partial() {
            debug!(request_id = %ctx.request_id, "partial state not persisted");
            return PersistOutcome::SkippedPartial;
        }

        let current = snapshot_of(&ctx.state);
        if current.is_some() && current == ctx.snapshot {
            return PersistOutcome::Unchanged;
        }

        match self.manager.save_state(&ctx.subject, &ctx.state).await {
            Ok(()) => PersistOutcome::Saved,
            Err(e) => {
                error!(request_id = %ctx.request_id, subject = %ctx.subject, error = %e, "failed to persist request state");
                PersistOutcome::Failed
            }
        }
    }

    /// Run a handler between `begin` and `finish`.
    pub async fn run<H>(&self, subject: Subject, entry_point: &str, handler: &H) -> Result<H::Output, H::Error>
    where
        H: RequestHandler<C, D>,
    {
        let mut ctx = self.begin(subject, entry_point).await;
        match handler.handle(&mut ctx).await {
            Ok(output) => {
                self.finish(ctx).await;
                Ok(output)
            }
            Err(e) => {
                warn!(request_id = %ctx.request_id, error = %e, "handler failed, state not persisted");
                Err(e)
            }
        }
    }
}

fn snapshot_of(state: &StateBlob) -> Option<String> {
    PayloadCodec::encode(state).ok()
}

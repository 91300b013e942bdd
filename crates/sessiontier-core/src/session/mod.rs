//! Session state orchestration.
//!
//! `SessionManager` is the cache-aside read path and write-through-cache
//! write path. It hands complete writes to the `WriteBackBatcher`, which
//! persists them to the durable store in coalesced batches. `RequestMiddleware`
//! wraps handlers with load, diff and save.

pub mod batcher;
pub mod cleanup;
pub mod fallback;
pub mod fast_path;
pub mod manager;
pub mod middleware;

pub use batcher::{FlushHandle, FlushReport, WriteBackBatcher};
pub use cleanup::StateCleanupPolicy;
pub use fallback::FallbackCache;
pub use fast_path::FastPathLoader;
pub use manager::SessionManager;
pub use middleware::{PersistOutcome, RequestContext, RequestHandler, RequestMiddleware};

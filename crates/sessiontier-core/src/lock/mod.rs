//! Idempotency locks for suppressing duplicate concurrent actions.
//!
//! `ProcessLockRegistry` is the per-process set of in-flight action ids. It
//! only sees triggers arriving at the same worker. `CacheActionLock` offers
//! the same surface backed by the shared cache tier, so it holds across
//! worker processes.

pub mod distributed;
pub mod registry;

pub use distributed::{CacheActionLock, LockAcquisition};
pub use registry::{ActionGuard, ProcessLockRegistry};

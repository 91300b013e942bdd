//! Session orchestration and port trait definitions for sessiontier.
//!
//! This crate defines the "ports" (`CacheTier`, `DurableStore`) that the
//! infrastructure layer implements, plus everything that runs on top of them:
//! the cache-aside session manager, the coalescing write-back batcher, the
//! fast partial loader, field cleanup, action locks, and the request
//! middleware. It depends only on `sessiontier-types` -- never on
//! `sessiontier-infra` or any database/network crate.

pub mod codec;
pub mod lock;
pub mod session;
pub mod storage;

#[cfg(test)]
pub(crate) mod test_support;

//! Infrastructure layer for sessiontier.
//!
//! Contains implementations of the storage traits defined in `sessiontier-core`:
//! the SQLite durable store, the Redis and in-process cache tiers, and the
//! TOML configuration loader.

pub mod cache;
pub mod config;
pub mod sqlite;

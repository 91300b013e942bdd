//! Shared domain types for sessiontier.
//!
//! This crate contains the types that flow between the session layer and its
//! collaborators: subjects, state blobs, pending writes, locks, cleanup rules,
//! configuration, and their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, chrono, thiserror.

pub mod cleanup;
pub mod config;
pub mod error;
pub mod lock;
pub mod state;
pub mod storage;
pub mod subject;

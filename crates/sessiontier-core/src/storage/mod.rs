//! Storage abstractions for sessiontier.
//!
//! Defines the fast shared cache tier and the authoritative durable store.
//! Implementations live in sessiontier-infra.

pub mod cache_tier;
pub mod durable_store;

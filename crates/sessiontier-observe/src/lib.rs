//! Observability setup for sessiontier binaries.

pub mod tracing_setup;

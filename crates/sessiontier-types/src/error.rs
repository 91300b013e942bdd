use std::time::Duration;

use thiserror::Error;

use crate::subject::Subject;

/// Errors from the shared cache tier.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    #[error("cache operation failed: {0}")]
    Operation(String),
}

/// Errors from durable store operations (used by trait definitions in sessiontier-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
}

/// Errors encoding or decoding a state payload.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("payload is not an object (found {0})")]
    NotAnObject(&'static str),
}

/// Caller-visible session errors.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("refusing to persist partial state for subject '{0}'")]
    PartialState(Subject),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

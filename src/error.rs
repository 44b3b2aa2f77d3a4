use thiserror::Error;

use crate::feed::{FetchError, ParseError};
use crate::storage::{DatabaseError, PersistenceError};

/// Errors surfaced by [`FeedManager`](crate::FeedManager) operations.
///
/// Synchronous callers receive these directly. Queued requests only ever see
/// them through [`Callback::on_load_failed`](crate::Callback::on_load_failed).
#[derive(Debug, Error)]
pub enum FeedError {
    /// The request was rejected before any I/O (e.g. empty URL).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// The backing database could not be opened.
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

pub type Result<T, E = FeedError> = std::result::Result<T, E>;

//! Core library errors.

use thiserror::Error;

/// Errors raised by a collaborator store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage lock error: {0}")]
    Lock(String),

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Record not found: {0}")]
    NotFound(String),
}

/// Errors that can occur while reconciling a single control event.
///
/// None of these escape [`GroupProcessor::process`](crate::app::GroupProcessor::process):
/// they are logged there and turned into "no thread".
#[derive(Debug, Error)]
pub enum CoreError {
    /// The event is missing its group identifier. Rejected before classification.
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// The event matched none of the reconciliation rules.
    #[error("Unknown event shape: {0}")]
    UnknownEventShape(String),

    /// A store write failed; nothing from this event was persisted by that store.
    #[error("Persistence failure: {0}")]
    Persistence(#[from] StorageError),

    /// Wire payload could not be decoded.
    #[error("Message error: {0}")]
    Message(#[from] prost::DecodeError),
}

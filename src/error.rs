//! Error taxonomy for wiki operations.
//!
//! Four caller-visible categories: validation failures abort before any
//! mutation, not-found maps to a 404 at the edge, precondition failures
//! (purge on an active node, restore on an active node) leave state
//! unchanged, and database/IO errors propagate. Best-effort media failures
//! live in [`crate::media::MediaError`] and never surface through here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WikiError {
    /// Input rejected before any mutation (missing title, bad file type).
    #[error("{0}")]
    Validation(String),

    /// No row for the given identifier.
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: i64 },

    /// Operation rejected because the node is in the wrong lifecycle state.
    #[error("{0}")]
    Precondition(String),

    #[error(transparent)]
    Db(#[from] sqlx::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl WikiError {
    pub fn not_found(kind: &'static str, id: i64) -> Self {
        WikiError::NotFound { kind, id }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        WikiError::Validation(msg.into())
    }

    pub fn precondition(msg: impl Into<String>) -> Self {
        WikiError::Precondition(msg.into())
    }
}

pub type WikiResult<T> = Result<T, WikiError>;

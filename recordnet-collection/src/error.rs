//! Collection error types.

use recordnet_protocol::DispatchError;
use thiserror::Error;

/// Errors from the record collection.
#[derive(Debug, Error)]
pub enum CollectionError {
    #[error("record not found: {id}")]
    RecordNotFound { id: u64 },

    #[error("invalid record id: {value}")]
    InvalidId { value: String },

    #[error("invalid record: {reason}")]
    InvalidRecord { reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CollectionError {
    /// Returns an error code suitable for logs and responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            CollectionError::RecordNotFound { .. } => "RECORD_NOT_FOUND",
            CollectionError::InvalidId { .. } => "BAD_REQUEST",
            CollectionError::InvalidRecord { .. } => "BAD_REQUEST",
            CollectionError::Json(_) => "BAD_REQUEST",
        }
    }
}

impl From<CollectionError> for DispatchError {
    fn from(err: CollectionError) -> Self {
        match err {
            CollectionError::RecordNotFound { id } => {
                DispatchError::NotFound(format!("record {}", id))
            }
            CollectionError::InvalidId { .. }
            | CollectionError::InvalidRecord { .. }
            | CollectionError::Json(_) => DispatchError::InvalidArgument(err.to_string()),
        }
    }
}

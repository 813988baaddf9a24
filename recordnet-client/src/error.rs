//! Client error types.

use thiserror::Error;

/// Client errors.
///
/// `ClientSession::send_and_wait` collapses all of these to `None`; they are
/// visible through `try_send_and_wait` for callers that want the reason.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] recordnet_protocol::ProtocolError),

    #[error("not connected")]
    NotConnected,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("request timeout")]
    Timeout,

    #[error("session closed")]
    Closed,
}

impl ClientError {
    /// Returns whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Io(_) => true,
            ClientError::Timeout => true,
            ClientError::ConnectionClosed => true,
            ClientError::NotConnected => true,
            ClientError::Protocol(_) => false,
            ClientError::Closed => false,
        }
    }
}

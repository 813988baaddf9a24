//! Server error types.

use thiserror::Error;

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] recordnet_protocol::ProtocolError),

    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("server I/O thread panicked")]
    ThreadPanicked,
}

impl ServerError {
    /// Returns whether this error means the peer broke frame synchronisation.
    pub fn is_framing(&self) -> bool {
        matches!(self, ServerError::Protocol(e) if e.is_framing())
    }

    /// Returns whether this error is an ordinary disconnect by the peer.
    pub fn is_disconnect(&self) -> bool {
        use std::io::ErrorKind;
        matches!(
            self,
            ServerError::Io(e) if matches!(
                e.kind(),
                ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::BrokenPipe
                    | ErrorKind::UnexpectedEof
            )
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recordnet_protocol::ProtocolError;
    use std::io;

    #[test]
    fn test_error_classification() {
        let framing = ServerError::from(ProtocolError::FrameTooLarge { size: 11, max: 10 });
        assert!(framing.is_framing());
        assert!(!framing.is_disconnect());

        let reset = ServerError::from(io::Error::from(io::ErrorKind::ConnectionReset));
        assert!(reset.is_disconnect());
        assert!(!reset.is_framing());

        let other = ServerError::from(io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(!other.is_disconnect());
    }
}

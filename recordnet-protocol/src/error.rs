//! Protocol error types.

use thiserror::Error;

/// Errors raised while framing, assembling or decoding messages.
///
/// `FrameTooLarge` is a framing violation and is fatal for the connection
/// it was read from. `Json` and `InvalidUtf8` describe a well-framed payload
/// that could not be decoded; the frame boundary is intact.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: u64, max: u32 },

    #[error("frame assembler is unusable after a framing error")]
    AssemblerFailed,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid UTF-8 in payload")]
    InvalidUtf8,
}

impl ProtocolError {
    /// Returns whether this error breaks frame synchronisation.
    ///
    /// A connection that reports a framing error must be closed; the stream
    /// is never resynchronised.
    pub fn is_framing(&self) -> bool {
        matches!(
            self,
            ProtocolError::FrameTooLarge { .. } | ProtocolError::AssemblerFailed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_framing_classification() {
        assert!(ProtocolError::FrameTooLarge { size: 11, max: 10 }.is_framing());
        assert!(ProtocolError::AssemblerFailed.is_framing());
        assert!(!ProtocolError::InvalidUtf8.is_framing());

        let json_err = serde_json::from_str::<u32>("nope").unwrap_err();
        assert!(!ProtocolError::from(json_err).is_framing());
    }

    #[test]
    fn test_protocol_error_display() {
        let err = ProtocolError::FrameTooLarge { size: 100, max: 50 };
        assert!(err.to_string().contains("100"));
        assert!(err.to_string().contains("50"));

        let err = ProtocolError::InvalidUtf8;
        assert!(err.to_string().contains("UTF-8"));
    }
}

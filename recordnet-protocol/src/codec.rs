//! Encoder and decoder for recordnet messages.
//!
//! The encoder produces complete wire frames. The decoder works on payloads
//! that a [`crate::FrameAssembler`] has already cut out of the stream, so a
//! decode failure never affects frame synchronisation.

use crate::error::ProtocolError;
use crate::frame::Frame;
use crate::message::{Request, Response};
use crate::MAX_FRAME_BYTES;
use bytes::BytesMut;

/// Encodes requests and responses into frames.
pub struct Encoder;

impl Encoder {
    /// Encodes a request into a frame.
    pub fn encode_request(request: &Request) -> Result<BytesMut, ProtocolError> {
        Self::encode_json(request)
    }

    /// Encodes a response into a frame.
    pub fn encode_response(response: &Response) -> Result<BytesMut, ProtocolError> {
        Self::encode_json(response)
    }

    /// Encodes a request, rejecting payloads above `max` bytes.
    pub fn encode_request_with_limit(
        request: &Request,
        max: u32,
    ) -> Result<BytesMut, ProtocolError> {
        Frame::from_json(request)?.encode_with_limit(max)
    }

    /// Encodes a response, rejecting payloads above `max` bytes.
    pub fn encode_response_with_limit(
        response: &Response,
        max: u32,
    ) -> Result<BytesMut, ProtocolError> {
        Frame::from_json(response)?.encode_with_limit(max)
    }

    /// Encodes any JSON-serializable value into a frame.
    pub fn encode_json<T: serde::Serialize>(value: &T) -> Result<BytesMut, ProtocolError> {
        Frame::from_json(value)?.encode_with_limit(MAX_FRAME_BYTES)
    }
}

/// Decodes assembled payloads into requests and responses.
pub struct Decoder;

impl Decoder {
    /// Decodes a request payload.
    pub fn decode_request(payload: &[u8]) -> Result<Request, ProtocolError> {
        Self::decode_json(payload)
    }

    /// Decodes a response payload.
    pub fn decode_response(payload: &[u8]) -> Result<Response, ProtocolError> {
        Self::decode_json(payload)
    }

    /// Decodes any JSON payload. The payload must be valid UTF-8.
    pub fn decode_json<T: serde::de::DeserializeOwned>(payload: &[u8]) -> Result<T, ProtocolError> {
        let text = std::str::from_utf8(payload).map_err(|_| ProtocolError::InvalidUtf8)?;
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::FrameAssembler;
    use crate::message::Credentials;

    #[test]
    fn test_request_through_assembler() {
        let mut request = Request::new(["show"]).with_auth(Credentials::new("ann", "pw"));
        request.id = 42;
        let encoded = Encoder::encode_request(&request).unwrap();

        let mut assembler = FrameAssembler::new();
        let payloads = assembler.feed_all(&encoded).unwrap();
        assert_eq!(payloads.len(), 1);

        let decoded = Decoder::decode_request(&payloads[0]).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn test_partial_frame_decoding() {
        let response = Response::text("ok").with_id(3);
        let encoded = Encoder::encode_response(&response).unwrap();

        let mut assembler = FrameAssembler::new();
        assert!(assembler.feed_all(&encoded[..10]).unwrap().is_empty());

        let payloads = assembler.feed_all(&encoded[10..]).unwrap();
        let decoded = Decoder::decode_response(&payloads[0]).unwrap();
        assert_eq!(decoded.id, 3);
        assert_eq!(decoded.text, "ok");
    }

    #[test]
    fn test_invalid_utf8_payload() {
        let result = Decoder::decode_request(&[0xC3, 0x28]);
        assert!(matches!(result, Err(ProtocolError::InvalidUtf8)));
    }

    #[test]
    fn test_malformed_json_is_not_framing() {
        let err = Decoder::decode_request(b"{\"body\":").unwrap_err();
        assert!(matches!(err, ProtocolError::Json(_)));
        assert!(!err.is_framing());
    }

    #[test]
    fn test_request_missing_body_rejected() {
        assert!(Decoder::decode_request(br#"{"id":1}"#).is_err());
    }

    #[test]
    fn test_encode_with_limit() {
        let response = Response::text("x".repeat(64));
        let result = Encoder::encode_response_with_limit(&response, 32);
        assert!(matches!(result, Err(ProtocolError::FrameTooLarge { .. })));

        assert!(Encoder::encode_response_with_limit(&response, 1024).is_ok());
    }

    #[test]
    fn test_encode_json_generic() {
        #[derive(serde::Serialize)]
        struct CustomMsg {
            action: String,
        }

        let msg = CustomMsg {
            action: "test".to_string(),
        };
        let encoded = Encoder::encode_json(&msg).unwrap();
        assert_eq!(&encoded[..4], &(encoded.len() as u32 - 4).to_be_bytes());
    }
}

//! Binary frame format.
//!
//! ```text
//! +----------------+------------------------+
//! | length (4B BE) | payload (length bytes) |
//! +----------------+------------------------+
//! ```
//!
//! `length` counts payload bytes only and never exceeds the frame limit
//! (10 MiB unless configured lower). Encoding and decoding here are pure;
//! assembling a frame across partial reads lives in [`crate::assembler`].

use crate::error::ProtocolError;
use crate::MAX_FRAME_BYTES;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Validates a declared payload length against a frame limit.
pub(crate) fn check_length(size: u64, max: u32) -> Result<(), ProtocolError> {
    if size > u64::from(max) {
        return Err(ProtocolError::FrameTooLarge { size, max });
    }
    Ok(())
}

/// A single length-prefixed message unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame payload, opaque to the framing layer.
    pub payload: Bytes,
}

impl Frame {
    /// Creates a new frame with the given payload.
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// Creates a new frame from a JSON-serializable value.
    pub fn from_json<T: serde::Serialize>(value: &T) -> Result<Self, ProtocolError> {
        let payload = serde_json::to_vec(value)?;
        Ok(Self::new(payload))
    }

    /// Encodes the frame using the protocol-wide frame limit.
    pub fn encode(&self) -> Result<BytesMut, ProtocolError> {
        self.encode_with_limit(MAX_FRAME_BYTES)
    }

    /// Encodes the frame, rejecting payloads larger than `max` bytes.
    pub fn encode_with_limit(&self, max: u32) -> Result<BytesMut, ProtocolError> {
        check_length(self.payload.len() as u64, max)?;

        let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + self.payload.len());
        buf.put_u32(self.payload.len() as u32);
        buf.put_slice(&self.payload);
        Ok(buf)
    }

    /// Decodes a frame from bytes using the protocol-wide frame limit.
    ///
    /// Returns `Ok(Some(frame))` and consumes the frame's bytes if a complete
    /// frame is buffered, `Ok(None)` if more data is needed, or `Err` if the
    /// length prefix is out of range.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Self>, ProtocolError> {
        Self::decode_with_limit(buf, MAX_FRAME_BYTES)
    }

    /// Decodes a frame from bytes, rejecting lengths above `max`.
    pub fn decode_with_limit(buf: &mut BytesMut, max: u32) -> Result<Option<Self>, ProtocolError> {
        if buf.len() < LENGTH_PREFIX_SIZE {
            return Ok(None);
        }

        let length = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        check_length(u64::from(length), max)?;

        let total_len = LENGTH_PREFIX_SIZE + length as usize;
        if buf.len() < total_len {
            return Ok(None);
        }

        buf.advance(LENGTH_PREFIX_SIZE);
        let payload = buf.split_to(length as usize).freeze();
        Ok(Some(Self { payload }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_frame_layout() {
        let frame = Frame::new(Bytes::from_static(b"abc"));
        let encoded = frame.encode().unwrap();
        assert_eq!(&encoded[..], b"\x00\x00\x00\x03abc");
    }

    #[test]
    fn test_empty_payload() {
        let encoded = Frame::new(Bytes::new()).encode().unwrap();
        assert_eq!(&encoded[..], &[0, 0, 0, 0]);

        let mut buf = encoded;
        let decoded = Frame::decode(&mut buf).unwrap().unwrap();
        assert!(decoded.payload.is_empty());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_incomplete_frame() {
        let mut buf = BytesMut::from(&b"\x00\x00"[..]);
        assert!(Frame::decode(&mut buf).unwrap().is_none());

        let mut buf = BytesMut::from(&b"\x00\x00\x00\x05ab"[..]);
        assert!(Frame::decode(&mut buf).unwrap().is_none());
        // Nothing consumed while incomplete
        assert_eq!(buf.len(), 6);
    }

    #[test]
    fn test_frame_too_large_on_encode() {
        let frame = Frame::new(vec![0u8; 17]);
        let result = frame.encode_with_limit(16);
        assert!(matches!(
            result,
            Err(ProtocolError::FrameTooLarge { size: 17, max: 16 })
        ));
    }

    #[test]
    fn test_max_size_payload_is_accepted() {
        let frame = Frame::new(vec![7u8; MAX_FRAME_BYTES as usize]);
        let mut encoded = frame.encode().unwrap();
        let decoded = Frame::decode(&mut encoded).unwrap().unwrap();
        assert_eq!(decoded.payload.len(), MAX_FRAME_BYTES as usize);

        let frame = Frame::new(vec![7u8; MAX_FRAME_BYTES as usize + 1]);
        assert!(frame.encode().is_err());
    }

    #[test]
    fn test_oversized_length_prefix_rejected() {
        // 0xFFFFFFFF would be -1 for a signed peer; both readings are invalid.
        let mut buf = BytesMut::from(&b"\xFF\xFF\xFF\xFF"[..]);
        let result = Frame::decode(&mut buf);
        assert!(matches!(result, Err(ProtocolError::FrameTooLarge { .. })));

        let mut buf = BytesMut::new();
        buf.put_u32(MAX_FRAME_BYTES + 1);
        assert!(Frame::decode(&mut buf).is_err());
    }

    #[test]
    fn test_multiple_frames_in_buffer() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&Frame::new(Bytes::from("one")).encode().unwrap());
        buf.extend_from_slice(&Frame::new(Bytes::from("two")).encode().unwrap());

        let first = Frame::decode(&mut buf).unwrap().unwrap();
        let second = Frame::decode(&mut buf).unwrap().unwrap();
        assert_eq!(first.payload, Bytes::from("one"));
        assert_eq!(second.payload, Bytes::from("two"));
        assert!(Frame::decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_frame_from_json() {
        #[derive(serde::Serialize)]
        struct TestMsg {
            value: i32,
        }
        let frame = Frame::from_json(&TestMsg { value: 42 }).unwrap();
        assert_eq!(&frame.payload[..], br#"{"value":42}"#);
    }

    proptest! {
        #[test]
        fn prop_frame_roundtrip(payload in proptest::collection::vec(any::<u8>(), 0..4096)) {
            let mut encoded = Frame::new(payload.clone()).encode().unwrap();
            prop_assert_eq!(encoded.len(), LENGTH_PREFIX_SIZE + payload.len());
            let decoded = Frame::decode(&mut encoded).unwrap().unwrap();
            prop_assert_eq!(&decoded.payload[..], &payload[..]);
            prop_assert!(encoded.is_empty());
        }
    }
}
